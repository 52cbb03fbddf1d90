pub mod blas;
pub mod matrix;
pub mod quaternion;
pub mod random;
pub mod rototranslation;
pub mod solver;
pub mod testing_macros;
pub mod tridiag;
pub mod vec3;

pub use matrix::{Matrix1, Matrix2, Matrix3x3};
pub use quaternion::Quaternion;
pub use random::SimRng;
pub use rototranslation::Rototranslation;
pub use tridiag::TridiagLdl;
pub use vec3::Vec3;
