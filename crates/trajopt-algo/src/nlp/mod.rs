//! Seam between the transcription and a generic NLP solver.
//!
//! A transcribed problem is presented as
//!
//! ```text
//! minimize    J(x)
//! subject to  g_lo ≤ g(x) ≤ g_hi
//!             x_lo ≤ x    ≤ x_hi
//! ```
//!
//! through [`NlpProblem`]. An [`NlpBackend`] consumes it together with an
//! initial point and returns a [`RawSolution`]. Non-convergence is a
//! [`SolveStatus`], not an error; errors are reserved for failures that
//! leave no usable iterate (for instance a model that raises mid-solve).

pub mod finite_diff;
pub mod penalty;

pub use finite_diff::FiniteDifferenceScheme;
pub use penalty::PenaltyLbfgsBackend;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use trajopt_core::TrajResult;

/// A constrained nonlinear program over a flat variable vector.
pub trait NlpProblem {
    fn num_variables(&self) -> usize;

    fn num_constraints(&self) -> usize;

    fn variable_lower(&self) -> &[f64];

    fn variable_upper(&self) -> &[f64];

    fn constraint_lower(&self) -> &[f64];

    fn constraint_upper(&self) -> &[f64];

    fn objective(&self, x: &[f64]) -> TrajResult<f64>;

    /// Write `g(x)` into `out` (length [`num_constraints`](Self::num_constraints)).
    fn constraints(&self, x: &[f64], out: &mut [f64]) -> TrajResult<()>;

    /// Objective and constraints together. Implementations that share work
    /// between the two should override this.
    fn evaluate(&self, x: &[f64], constraints: &mut [f64]) -> TrajResult<f64> {
        self.constraints(x, constraints)?;
        self.objective(x)
    }
}

/// Terminal status reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// Constraint violation within tolerance.
    Success,
    /// Iteration budget exhausted before reaching feasibility.
    IterationLimit,
    /// Wall-clock budget exhausted before reaching feasibility.
    TimeLimit,
    /// Budget remained but the method could not reduce the violation.
    Infeasible,
    /// Non-finite values, or no inner solve made progress.
    NumericalError,
}

impl SolveStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SolveStatus::Success)
    }

    /// Whether the solve stopped on a budget rather than on its own.
    pub fn is_limit(&self) -> bool {
        matches!(self, SolveStatus::IterationLimit | SolveStatus::TimeLimit)
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveStatus::Success => write!(f, "success"),
            SolveStatus::IterationLimit => write!(f, "iteration_limit"),
            SolveStatus::TimeLimit => write!(f, "time_limit"),
            SolveStatus::Infeasible => write!(f, "infeasible"),
            SolveStatus::NumericalError => write!(f, "numerical_error"),
        }
    }
}

/// Options passed to a backend.
#[derive(Debug, Clone)]
pub struct NlpOptions {
    pub max_iterations: usize,
    /// Gradient-norm tolerance for the inner minimization
    pub convergence_tolerance: f64,
    /// Largest acceptable bound or constraint violation
    pub constraint_tolerance: f64,
    pub time_limit: Option<Duration>,
    pub finite_difference: FiniteDifferenceScheme,
}

impl Default for NlpOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            convergence_tolerance: 1e-6,
            constraint_tolerance: 1e-4,
            time_limit: None,
            finite_difference: FiniteDifferenceScheme::Central,
        }
    }
}

/// What a backend hands back.
#[derive(Debug, Clone)]
pub struct RawSolution {
    pub x: Vec<f64>,
    pub objective: f64,
    pub status: SolveStatus,
    pub iterations: usize,
    /// Largest bound or constraint violation at `x`
    pub max_violation: f64,
}

/// A generic NLP solver.
pub trait NlpBackend: Send + Sync {
    /// Short identifier, e.g. "penalty-lbfgs"
    fn id(&self) -> &str;

    fn solve(
        &self,
        problem: &dyn NlpProblem,
        x0: &[f64],
        options: &NlpOptions,
    ) -> TrajResult<RawSolution>;
}

/// Largest violation of `lo ≤ v ≤ hi` over all components.
pub fn max_violation(values: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    values
        .iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&lo, &hi))| {
            if v < lo {
                lo - v
            } else if v > hi {
                v - hi
            } else {
                0.0
            }
        })
        .fold(0.0, f64::max)
}

/// Combined bound and constraint violation of `x` with constraint values `g`.
pub fn problem_violation(problem: &dyn NlpProblem, x: &[f64], g: &[f64]) -> f64 {
    max_violation(x, problem.variable_lower(), problem.variable_upper()).max(max_violation(
        g,
        problem.constraint_lower(),
        problem.constraint_upper(),
    ))
}
