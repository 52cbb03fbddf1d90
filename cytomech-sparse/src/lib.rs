//! Sparse symmetric matrices for the mechanical assembler.
//!
//! The matrix lives in two representations:
//! - an *authoring* form optimised for random element insertion, used while
//!   interactions are deposited;
//! - a compiled *multiply* form in the classic `sa`/`ija` sparse layout,
//!   rebuilt by [`SparseSymmetric::prepare_for_multiply`] and used by the
//!   matrix-vector products of the iterative solver.
//!
//! Only the lower triangle is stored; every accessor folds `(i, j)` into
//! canonical order, so the matrix is symmetric by construction.

mod matsym;

pub use matsym::SparseSymmetric;
