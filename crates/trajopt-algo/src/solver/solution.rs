use serde::Serialize;
use trajopt_core::{Diagnostics, Iterate};

use crate::nlp::SolveStatus;

/// Result of one solve.
///
/// A solve that ran but did not converge still yields a `Solution`; check
/// [`status`](Self::status) before trusting the trajectory.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    /// Sampled on the solver's grid
    pub trajectory: Iterate,
    pub objective: f64,
    pub status: SolveStatus,
    pub iterations: usize,
    pub solve_time_ms: u64,
    pub max_violation: f64,
    /// Identifier of the NLP backend that produced this solution
    pub backend: String,
    pub diagnostics: Diagnostics,
}

impl Solution {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Everything except the trajectory samples.
    pub fn summary(&self) -> SolutionSummary<'_> {
        SolutionSummary {
            status: self.status,
            objective: self.objective,
            iterations: self.iterations,
            solve_time_ms: self.solve_time_ms,
            max_violation: self.max_violation,
            backend: &self.backend,
            num_times: self.trajectory.num_times(),
            initial_time: self.trajectory.initial_time(),
            final_time: self.trajectory.final_time(),
            warnings: self.diagnostics.warning_count(),
            errors: self.diagnostics.error_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionSummary<'a> {
    pub status: SolveStatus,
    pub objective: f64,
    pub iterations: usize,
    pub solve_time_ms: u64,
    pub max_violation: f64,
    pub backend: &'a str,
    pub num_times: usize,
    pub initial_time: f64,
    pub final_time: f64,
    pub warnings: usize,
    pub errors: usize,
}
