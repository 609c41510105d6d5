//! # Penalty Method with L-BFGS
//!
//! Built-in [`NlpBackend`] that needs nothing beyond objective and
//! constraint values. The constrained program is replaced by a sequence of
//! unconstrained ones:
//!
//! ```text
//! P_μ(x) = J(π(x)) + μ · Σ_i dist(g_i(π(x)), [g_lo,i, g_hi,i])²
//!                  + μ · Σ_j dist(x_j,       [x_lo,j, x_hi,j])²
//! ```
//!
//! where `π` clamps `x` onto the variable bounds, so the problem is only
//! ever evaluated inside its bounds even when a line search overshoots.
//!
//! each minimized with L-BFGS (argmin, More-Thuente line search) from the
//! previous minimizer, with μ growing geometrically until the violation is
//! within tolerance.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  x ← project(x0)                                             │
//! │  for μ = μ0, μ0·γ, μ0·γ², ...   (at most `max_penalty_iters`)│
//! │      x ← project(L-BFGS(P_μ, x)) (finite-difference ∇P_μ)    │
//! │      if violation(x) ≤ tol: stop                             │
//! │  x ← project(x)                 (bounds hold exactly)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Gradients are finite differences of `P_μ`, so every gradient costs
//! `n + 1` (one-sided) or `2n` (central) full evaluations. Fine for the
//! problem sizes this backend targets; larger problems should plug in a
//! second-order backend through [`NlpBackend`].
//!
//! ## Status mapping
//!
//! | condition after the final projection              | status           |
//! |---------------------------------------------------|------------------|
//! | non-finite objective, point or violation          | `NumericalError` |
//! | violation ≤ constraint tolerance                  | `Success`        |
//! | every inner L-BFGS run failed                     | `NumericalError` |
//! | wall-clock budget exhausted                       | `TimeLimit`      |
//! | last inner run stopped on its iteration budget    | `IterationLimit` |
//! | otherwise (penalty schedule exhausted)            | `Infeasible`     |
//!
//! ## References
//!
//! - Nocedal & Wright (2006), "Numerical Optimization", 2nd ed., ch. 17
//! - Liu & Nocedal (1989), "On the Limited Memory BFGS Method for Large
//!   Scale Optimization", Math. Programming 45(1)

use super::{problem_violation, FiniteDifferenceScheme, NlpBackend, NlpOptions, NlpProblem};
use super::{RawSolution, SolveStatus};
use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use std::cell::RefCell;
use std::time::Instant;
use tracing::{debug, warn};
use trajopt_core::{TrajError, TrajResult};

// ============================================================================
// PENALTY FUNCTION WRAPPER
// ============================================================================

struct PenaltyProblem<'a> {
    nlp: &'a dyn NlpProblem,
    penalty: f64,
    scheme: FiniteDifferenceScheme,
    /// First evaluation error raised inside argmin. argmin only carries
    /// opaque errors, so the typed error is parked here and re-raised after
    /// the run.
    failure: &'a RefCell<Option<TrajError>>,
}

impl PenaltyProblem<'_> {
    fn penalized(&self, x: &[f64]) -> TrajResult<f64> {
        let mut projected = x.to_vec();
        project_onto_bounds(
            &mut projected,
            self.nlp.variable_lower(),
            self.nlp.variable_upper(),
        );
        let mut g = vec![0.0; self.nlp.num_constraints()];
        let mut cost = self.nlp.evaluate(&projected, &mut g)?;
        cost += self.penalty
            * squared_distance(&g, self.nlp.constraint_lower(), self.nlp.constraint_upper());
        cost += self.penalty
            * squared_distance(x, self.nlp.variable_lower(), self.nlp.variable_upper());
        Ok(cost)
    }

    fn park<T>(&self, result: TrajResult<T>) -> Result<T, argmin::core::Error> {
        result.map_err(|err| {
            let message = err.to_string();
            self.failure.borrow_mut().get_or_insert(err);
            anyhow::anyhow!(message)
        })
    }
}

impl CostFunction for PenaltyProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        self.park(self.penalized(x))
    }
}

impl Gradient for PenaltyProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let grad = self.scheme.gradient(|p| self.penalized(p), x, None);
        self.park(grad)
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Σ dist(v_i, [lo_i, hi_i])²
fn squared_distance(values: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    values
        .iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&lo, &hi))| {
            let d = if v < lo {
                lo - v
            } else if v > hi {
                v - hi
            } else {
                0.0
            };
            d * d
        })
        .sum()
}

/// Clamp each component into `[lb_i, ub_i]`.
fn project_onto_bounds(x: &mut [f64], lb: &[f64], ub: &[f64]) {
    for ((xi, &lo), &hi) in x.iter_mut().zip(lb).zip(ub) {
        *xi = xi.max(lo).min(hi);
    }
}

// ============================================================================
// BACKEND
// ============================================================================

/// Quadratic-penalty outer loop around argmin's L-BFGS.
#[derive(Debug, Clone)]
pub struct PenaltyLbfgsBackend {
    /// μ for the first outer iteration
    pub initial_penalty: f64,
    /// Factor applied to μ after each infeasible outer iteration
    pub penalty_increase: f64,
    pub max_penalty_iterations: usize,
    /// L-BFGS history length
    pub memory: usize,
}

impl Default for PenaltyLbfgsBackend {
    fn default() -> Self {
        Self {
            initial_penalty: 1000.0,
            penalty_increase: 10.0,
            max_penalty_iterations: 5,
            memory: 7,
        }
    }
}

impl PenaltyLbfgsBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NlpBackend for PenaltyLbfgsBackend {
    fn id(&self) -> &str {
        "penalty-lbfgs"
    }

    fn solve(
        &self,
        problem: &dyn NlpProblem,
        x0: &[f64],
        options: &NlpOptions,
    ) -> TrajResult<RawSolution> {
        let start = Instant::now();
        let n = problem.num_variables();
        if x0.len() != n {
            return Err(TrajError::Solver(format!(
                "initial point has {} entries, problem has {} variables",
                x0.len(),
                n
            )));
        }
        if self.max_penalty_iterations == 0 {
            return Err(TrajError::Config(
                "penalty backend needs at least one penalty iteration".into(),
            ));
        }

        let lb = problem.variable_lower();
        let ub = problem.variable_upper();
        let mut x = x0.to_vec();
        project_onto_bounds(&mut x, lb, ub);

        let mut g = vec![0.0; problem.num_constraints()];
        let mut penalty = self.initial_penalty;
        let inner_max_iter = (options.max_iterations / self.max_penalty_iterations).max(1) as u64;
        let failure = RefCell::new(None);

        let mut total_iterations = 0;
        let mut successful_runs = 0;
        let mut hit_iteration_limit = false;
        let mut hit_time_limit = false;

        // ====================================================================
        // OUTER LOOP: PENALTY ITERATION
        // ====================================================================

        for outer in 0..self.max_penalty_iterations {
            let remaining = match options.time_limit {
                Some(limit) => match limit.checked_sub(start.elapsed()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => {
                        hit_time_limit = true;
                        break;
                    }
                },
                None => None,
            };

            let penalty_problem = PenaltyProblem {
                nlp: problem,
                penalty,
                scheme: options.finite_difference,
                failure: &failure,
            };
            let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.memory)
                .with_tolerance_grad(options.convergence_tolerance)
                .map_err(|e| TrajError::Config(format!("{e:#}")))?;

            let mut executor = Executor::new(penalty_problem, solver).configure(|state| {
                state
                    .param(x.clone())
                    .max_iters(inner_max_iter)
                    .target_cost(f64::NEG_INFINITY)
            });
            if let Some(left) = remaining {
                executor = executor.timeout(left);
            }

            let result = executor.run();
            if let Some(err) = failure.borrow_mut().take() {
                return Err(err);
            }

            match result {
                Ok(res) => {
                    let state = res.state();
                    total_iterations += state.get_iter() as usize;
                    if let Some(best) = state.get_best_param() {
                        x = best.clone();
                    }
                    successful_runs += 1;
                    hit_iteration_limit = matches!(
                        state.get_termination_reason(),
                        Some(TerminationReason::MaxItersReached)
                    );
                    if matches!(
                        state.get_termination_reason(),
                        Some(TerminationReason::Timeout)
                    ) {
                        hit_time_limit = true;
                    }
                }
                Err(err) => {
                    // Usually a line-search breakdown; a larger μ may still help.
                    warn!(outer, penalty, "L-BFGS run failed: {err:#}");
                }
            }

            project_onto_bounds(&mut x, lb, ub);
            let objective = problem.evaluate(&x, &mut g)?;
            let violation = problem_violation(problem, &x, &g);
            debug!(
                outer,
                penalty,
                objective,
                violation,
                iterations = total_iterations,
                "penalty iteration"
            );

            if violation <= options.constraint_tolerance || hit_time_limit {
                break;
            }
            penalty *= self.penalty_increase;
        }

        // ====================================================================
        // POST-PROCESSING
        // ====================================================================

        project_onto_bounds(&mut x, lb, ub);
        let objective = problem.evaluate(&x, &mut g)?;
        let max_violation = problem_violation(problem, &x, &g);

        let finite =
            objective.is_finite() && max_violation.is_finite() && x.iter().all(|v| v.is_finite());
        let status = if !finite {
            SolveStatus::NumericalError
        } else if max_violation <= options.constraint_tolerance {
            SolveStatus::Success
        } else if successful_runs == 0 {
            SolveStatus::NumericalError
        } else if hit_time_limit {
            SolveStatus::TimeLimit
        } else if hit_iteration_limit {
            SolveStatus::IterationLimit
        } else {
            SolveStatus::Infeasible
        };

        debug!(
            %status,
            objective,
            max_violation,
            iterations = total_iterations,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "penalty backend finished"
        );

        Ok(RawSolution {
            x,
            objective,
            status,
            iterations: total_iterations,
            max_violation,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// minimize (x0 - 3)² + (x1 + 1)²  s.t.  x0 + x1 = 1,  0 ≤ x0 ≤ 10
    struct Toy {
        lower: Vec<f64>,
        upper: Vec<f64>,
        g_lower: Vec<f64>,
        g_upper: Vec<f64>,
    }

    impl Toy {
        fn new() -> Self {
            Self {
                lower: vec![0.0, f64::NEG_INFINITY],
                upper: vec![10.0, f64::INFINITY],
                g_lower: vec![1.0],
                g_upper: vec![1.0],
            }
        }
    }

    impl NlpProblem for Toy {
        fn num_variables(&self) -> usize {
            2
        }
        fn num_constraints(&self) -> usize {
            1
        }
        fn variable_lower(&self) -> &[f64] {
            &self.lower
        }
        fn variable_upper(&self) -> &[f64] {
            &self.upper
        }
        fn constraint_lower(&self) -> &[f64] {
            &self.g_lower
        }
        fn constraint_upper(&self) -> &[f64] {
            &self.g_upper
        }
        fn objective(&self, x: &[f64]) -> TrajResult<f64> {
            Ok((x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2))
        }
        fn constraints(&self, x: &[f64], out: &mut [f64]) -> TrajResult<()> {
            out[0] = x[0] + x[1];
            Ok(())
        }
    }

    struct Exploding;

    impl NlpProblem for Exploding {
        fn num_variables(&self) -> usize {
            1
        }
        fn num_constraints(&self) -> usize {
            0
        }
        fn variable_lower(&self) -> &[f64] {
            &[f64::NEG_INFINITY]
        }
        fn variable_upper(&self) -> &[f64] {
            &[f64::INFINITY]
        }
        fn constraint_lower(&self) -> &[f64] {
            &[]
        }
        fn constraint_upper(&self) -> &[f64] {
            &[]
        }
        fn objective(&self, _x: &[f64]) -> TrajResult<f64> {
            Err(TrajError::Evaluation {
                point: 0,
                message: "singular mass matrix".into(),
            })
        }
        fn constraints(&self, _x: &[f64], _out: &mut [f64]) -> TrajResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_equality_constrained_quadratic() {
        let backend = PenaltyLbfgsBackend::default();
        let options = NlpOptions {
            max_iterations: 500,
            ..Default::default()
        };
        let sol = backend.solve(&Toy::new(), &[0.0, 0.0], &options).unwrap();

        // Analytic optimum: x = (2.5, -1.5)
        assert!((sol.x[0] - 2.5).abs() < 1e-2, "x0 = {}", sol.x[0]);
        assert!((sol.x[1] + 1.5).abs() < 1e-2, "x1 = {}", sol.x[1]);
        assert!(sol.max_violation < 1e-2);
    }

    #[test]
    fn test_result_respects_bounds() {
        let sol = PenaltyLbfgsBackend::default()
            .solve(&Toy::new(), &[-5.0, 3.0], &NlpOptions::default())
            .unwrap();
        assert!(sol.x[0] >= 0.0 && sol.x[0] <= 10.0);
    }

    #[test]
    fn test_evaluation_error_aborts_solve() {
        let err = PenaltyLbfgsBackend::default()
            .solve(&Exploding, &[1.0], &NlpOptions::default())
            .unwrap_err();
        assert!(matches!(err, TrajError::Evaluation { .. }));
    }

    #[test]
    fn test_rejects_wrong_initial_length() {
        let err = PenaltyLbfgsBackend::default()
            .solve(&Toy::new(), &[0.0], &NlpOptions::default())
            .unwrap_err();
        assert!(matches!(err, TrajError::Solver(_)));
    }

    #[test]
    fn test_squared_distance_and_projection() {
        let lo = [0.0, 1.0];
        let hi = [1.0, 1.0];
        assert_eq!(squared_distance(&[2.0, 0.0], &lo, &hi), 2.0);
        let mut x = [-3.0, 5.0];
        project_onto_bounds(&mut x, &lo, &hi);
        assert_eq!(x, [0.0, 1.0]);
    }
}
