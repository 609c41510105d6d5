//! Unified error types for the trajopt workspace
//!
//! [`TrajError`] covers every failure that aborts a transcription or solve:
//! configuration problems detected before solving, guess loading failures,
//! and errors raised by the model while a grid point is being evaluated.
//! Solver non-convergence is *not* an error; it is reported through the
//! status carried by a solution.
//!
//! # Example
//!
//! ```ignore
//! use trajopt_core::{TrajError, TrajResult};
//!
//! fn prepare(solver: &mut CollocationSolver) -> TrajResult<()> {
//!     solver.set_guess_file("walk.guess.csv");
//!     let guess = solver.get_guess()?;
//!     println!("guess has {} samples", guess.num_times());
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all trajopt operations.
#[derive(Error, Debug)]
pub enum TrajError {
    /// I/O errors (file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid solver or problem configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A variable whose lower bound exceeds its upper bound (or is NaN)
    #[error("Invalid bounds for '{name}': lower {lower} > upper {upper}")]
    InvalidBounds { name: String, lower: f64, upper: f64 },

    /// The problem has a structure the transcription cannot handle
    #[error("Unsupported problem structure: {0}")]
    UnsupportedStructure(String),

    /// An operation needed a registered problem but none was registered
    #[error("Problem not ready: call reset_problem() before {0}")]
    ProblemNotReady(String),

    /// A guess was required but neither an API guess nor a guess file is set
    #[error("No guess available: set a guess or a guess file first")]
    NoGuess,

    /// A guess was configured but could not be materialized
    #[error("Failed to load guess from '{path}': {message}")]
    GuessLoad { path: PathBuf, message: String },

    /// A guess was materialized but does not fit the problem
    #[error("Incompatible guess: {0}")]
    IncompatibleGuess(String),

    /// A problem snapshot could not be constructed
    #[error("Failed to construct problem snapshot: {0}")]
    Snapshot(String),

    /// The model raised an error while being evaluated
    #[error("Evaluation failed at grid point {point}: {message}")]
    Evaluation { point: usize, message: String },

    /// The NLP backend failed in a way that produced no usable iterate
    #[error("Solver error: {0}")]
    Solver(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using TrajError.
pub type TrajResult<T> = Result<T, TrajError>;

impl TrajError {
    /// Whether this error was detected before any solve attempt.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TrajError::Config(_)
                | TrajError::InvalidBounds { .. }
                | TrajError::UnsupportedStructure(_)
                | TrajError::ProblemNotReady(_)
        )
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for TrajError {
    fn from(err: anyhow::Error) -> Self {
        TrajError::Other(format!("{err:#}"))
    }
}

impl From<String> for TrajError {
    fn from(s: String) -> Self {
        TrajError::Other(s)
    }
}

impl From<&str> for TrajError {
    fn from(s: &str) -> Self {
        TrajError::Other(s.to_string())
    }
}

impl From<csv::Error> for TrajError {
    fn from(err: csv::Error) -> Self {
        TrajError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrajError::InvalidBounds {
            name: "/jointset/knee/q".into(),
            lower: 1.0,
            upper: -1.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid bounds"));
        assert!(msg.contains("/jointset/knee/q"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TrajError = io_err.into();
        assert!(matches!(err, TrajError::Io(_)));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(TrajError::Config("bad".into()).is_configuration());
        assert!(TrajError::ProblemNotReady("create_guess".into()).is_configuration());
        assert!(!TrajError::NoGuess.is_configuration());
        assert!(!TrajError::Evaluation {
            point: 3,
            message: "nan".into()
        }
        .is_configuration());
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> TrajResult<()> {
            Err(TrajError::Config("test".into()))
        }

        fn outer() -> TrajResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
