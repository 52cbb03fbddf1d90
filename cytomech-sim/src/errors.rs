use thiserror::Error;

use cytomech_numerical::solver::Outcome;

/// Errors that may appear while configuring or running a simulation.
///
/// Invariant violations of the core itself (chain contiguity, list
/// membership, matrix symmetry) are programming errors and fail through
/// assertions rather than through this enum. Stochastic events never fail:
/// a vetoed attachment simply leaves the objects unchanged.
#[derive(Debug, Error)]
pub enum SimError {
    /// Malformed input: reported with position, parsing aborts.
    #[error("syntax error in {file}:{line}:{column}: {message}")]
    InvalidSyntax {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },

    /// A value outside its physically admissible range, or an unresolved
    /// named reference.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// File system failure or corrupted stored data.
    #[error("i/o failure: {0}")]
    InvalidIO(String),

    /// The iterative solver produced NaN, or stopped without reaching the
    /// requested tolerance.
    #[error("solver failed ({outcome:?}) after {iterations} iterations, residual {residual:.3e}")]
    NumericDivergence {
        outcome: Outcome,
        iterations: usize,
        residual: f64,
    },
}

impl SimError {
    pub fn parameter(msg: impl Into<String>) -> SimError {
        SimError::InvalidParameter(msg.into())
    }
}
