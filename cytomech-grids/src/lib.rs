pub mod grid;
pub mod rasterizer;

pub use grid::UniformGrid;
