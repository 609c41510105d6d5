//! # Collocation Solver
//!
//! Orchestrates one solve:
//!
//! ```text
//! validate problem ─► resolve guess ─► transcribe ─► NLP backend ─► Solution
//!                     (API → file →      (grid,        (penalty
//!                      bounds default)    pool)         L-BFGS)
//! ```
//!
//! The solver owns the registered problem, the guess configuration and the
//! representation pool. The pool outlives individual solves so snapshots
//! are reused; it is rebuilt when the problem or the worker count changes.
//!
//! Cloning a solver keeps its settings, problem and API guess. Anything
//! cached (the loaded guess file, the pool) starts empty in the clone.

mod settings;
mod solution;

pub use settings::{property_doc, PropertyDoc, SolverSettings, PROPERTIES};
pub use solution::{Solution, SolutionSummary};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use trajopt_core::{ContinuousProblem, Diagnostics, Iterate, TrajError, TrajResult};

use crate::cache::RepresentationPool;
use crate::guess::{
    bounds_guess, fit_to_grid, guess_horizon, random_guess, time_stepping_guess, GuessKind,
    GuessManager, ResetOnClone,
};
use crate::nlp::{NlpBackend, NlpProblem, PenaltyLbfgsBackend};
use crate::parallel::{parallelism_from_env, Parallelism};
use crate::transcription::DiscreteProblem;

/// Observable lifecycle of a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Uninitialized,
    ProblemRegistered,
    GuessConfigured,
}

#[derive(Clone)]
pub struct CollocationSolver {
    settings: SolverSettings,
    problem: Option<Arc<dyn ContinuousProblem>>,
    guess: GuessManager,
    backend: Arc<dyn NlpBackend>,
    pool: ResetOnClone<Mutex<Option<Arc<RepresentationPool>>>>,
}

impl Default for CollocationSolver {
    fn default() -> Self {
        Self::new(SolverSettings::default())
    }
}

impl CollocationSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self {
            settings,
            problem: None,
            guess: GuessManager::new(),
            backend: Arc::new(PenaltyLbfgsBackend::default()),
            pool: ResetOnClone::default(),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn NlpBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SolverSettings {
        &mut self.settings
    }

    pub fn backend_id(&self) -> &str {
        self.backend.id()
    }

    /// Register the problem to solve. The guess configuration is kept.
    pub fn reset_problem(&mut self, problem: Arc<dyn ContinuousProblem>) -> TrajResult<()> {
        problem.info().validate()?;
        debug!(problem = %problem.info().name, "registered problem");
        self.problem = Some(problem);
        *self.pool.lock() = None;
        Ok(())
    }

    pub fn problem(&self) -> Option<&Arc<dyn ContinuousProblem>> {
        self.problem.as_ref()
    }

    fn require_problem(&self, operation: &str) -> TrajResult<&Arc<dyn ContinuousProblem>> {
        self.problem
            .as_ref()
            .ok_or_else(|| TrajError::ProblemNotReady(operation.to_string()))
    }

    pub fn state(&self) -> SolverState {
        match (&self.problem, self.guess.is_configured()) {
            (None, _) => SolverState::Uninitialized,
            (Some(_), false) => SolverState::ProblemRegistered,
            (Some(_), true) => SolverState::GuessConfigured,
        }
    }

    // ========================================================================
    // GUESSES
    // ========================================================================

    /// Synthesize a guess on the solver's current grid.
    pub fn create_guess(&self, kind: GuessKind) -> TrajResult<Iterate> {
        let problem = self.require_problem("create_guess()")?;
        let info = problem.info();
        let grid = self
            .settings
            .transcription_options(Parallelism::Serial)
            .build_grid()?;
        let (t0, tf) = guess_horizon(info);
        let times = grid.times(t0, tf);

        match kind {
            GuessKind::Bounds => bounds_guess(info, times),
            GuessKind::Random => {
                let mut rng = match self.settings.random_seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                random_guess(info, times, &mut rng)
            }
            GuessKind::TimeStepping => {
                warn!("time-stepping guesses are unreliable; states may leave their bounds");
                let parallelism = parallelism_from_env(self.settings.parallel)?;
                let pool = self.pool_for(problem, parallelism.workers());
                let mut rep = pool.acquire()?;
                let result = time_stepping_guess(info, times, &mut *rep);
                if result.is_err() {
                    pool.discard(rep);
                }
                result
            }
        }
    }

    /// Install a guess, replacing any guess file.
    pub fn set_guess(&mut self, guess: Iterate) {
        self.guess.set_guess(guess);
    }

    pub fn set_guess_kind(&mut self, kind: GuessKind) -> TrajResult<()> {
        let guess = self.create_guess(kind)?;
        self.guess.set_created_guess(kind, guess);
        Ok(())
    }

    /// Use a guess file, read on first use. An empty path clears it.
    pub fn set_guess_file(&mut self, path: impl AsRef<Path>) {
        self.guess.set_guess_file(path);
    }

    pub fn clear_guess(&mut self) {
        self.guess.clear_guess();
    }

    pub fn guess_manager(&self) -> &GuessManager {
        &self.guess
    }

    /// The guess a solve would start from: the API guess, else the guess
    /// file, else a bounds guess.
    pub fn get_guess(&self) -> TrajResult<Iterate> {
        match self.guess.configured()? {
            Some(guess) => Ok(guess.clone()),
            None => self.create_guess(GuessKind::Bounds),
        }
    }

    // ========================================================================
    // TRANSCRIPTION AND SOLVE
    // ========================================================================

    /// Build the discrete problem for the registered problem and current
    /// settings.
    pub fn transcribe(&self) -> TrajResult<DiscreteProblem> {
        let problem = self.require_problem("transcribe()")?;
        self.settings.validate()?;
        let parallelism = parallelism_from_env(self.settings.parallel)?;
        let options = self.settings.transcription_options(parallelism);
        let pool = self.pool_for(problem, parallelism.workers());
        DiscreteProblem::new(pool, &options)
    }

    /// The current representation pool, if one has been built.
    pub fn representation_pool(&self) -> Option<Arc<RepresentationPool>> {
        self.pool.lock().clone()
    }

    fn pool_for(
        &self,
        problem: &Arc<dyn ContinuousProblem>,
        capacity: usize,
    ) -> Arc<RepresentationPool> {
        let mut slot = self.pool.lock();
        if let Some(pool) = slot.as_ref() {
            if pool.capacity() == capacity.max(1) {
                return Arc::clone(pool);
            }
        }
        debug!(capacity, "building representation pool");
        let pool = Arc::new(RepresentationPool::new(Arc::clone(problem), capacity));
        *slot = Some(Arc::clone(&pool));
        pool
    }

    /// Transcribe, solve and translate the result.
    ///
    /// Returns `Err` for configuration, guess and evaluation failures. A
    /// solve that runs but does not converge returns `Ok` with a
    /// non-success status.
    pub fn solve(&self) -> TrajResult<Solution> {
        let start = Instant::now();
        self.require_problem("solve()")?;
        let discrete = self.transcribe()?;
        let info = discrete.info();
        let grid = discrete.grid();
        let mut diagnostics = Diagnostics::new();

        let synthesized;
        let guess = match self.guess.configured()? {
            Some(guess) => guess,
            None => {
                debug!("no guess configured; starting from bounds");
                let (t0, tf) = guess_horizon(info);
                synthesized = bounds_guess(info, grid.times(t0, tf))?;
                &synthesized
            }
        };
        if self.guess.api_guess_kind() == Some(GuessKind::TimeStepping) {
            diagnostics.warn(
                "guess",
                "started from a time-stepping guess; states may violate their bounds",
            );
        }
        let fitted = fit_to_grid(info, grid, guess, &mut diagnostics)?;
        let x0 = discrete.layout().pack(info, grid, &fitted)?;

        info!(
            problem = %info.name,
            scheme = %grid.scheme(),
            grid_points = grid.num_points(),
            variables = discrete.num_variables(),
            constraints = discrete.num_constraints(),
            backend = self.backend.id(),
            "starting solve"
        );

        let raw = self
            .backend
            .solve(&discrete, &x0, &self.settings.nlp_options())?;
        let trajectory = discrete.layout().unpack(info, grid, &raw.x)?;

        if !raw.status.is_success() {
            warn!(
                status = %raw.status,
                max_violation = raw.max_violation,
                "solver did not converge"
            );
            diagnostics.error(
                "solver",
                &format!(
                    "stopped with status {} (max violation {:.3e})",
                    raw.status, raw.max_violation
                ),
            );
        }

        let solve_time_ms = start.elapsed().as_millis() as u64;
        info!(
            status = %raw.status,
            objective = raw.objective,
            iterations = raw.iterations,
            solve_time_ms,
            "solve finished"
        );

        Ok(Solution {
            trajectory,
            objective: raw.objective,
            status: raw.status,
            iterations: raw.iterations,
            solve_time_ms,
            max_violation: raw.max_violation,
            backend: self.backend.id().to_string(),
            diagnostics,
        })
    }
}

impl std::fmt::Debug for CollocationSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollocationSolver")
            .field("settings", &self.settings)
            .field("problem", &self.problem.as_ref().map(|p| &p.info().name))
            .field("guess", &self.guess)
            .field("backend", &self.backend.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Pendulum, SlidingMass};
    use crate::nlp::{problem_violation, NlpOptions, RawSolution, SolveStatus};

    /// Returns the initial point unchanged.
    struct EchoBackend;

    impl NlpBackend for EchoBackend {
        fn id(&self) -> &str {
            "echo"
        }

        fn solve(
            &self,
            problem: &dyn NlpProblem,
            x0: &[f64],
            _options: &NlpOptions,
        ) -> TrajResult<RawSolution> {
            let mut g = vec![0.0; problem.num_constraints()];
            let objective = problem.evaluate(x0, &mut g)?;
            Ok(RawSolution {
                x: x0.to_vec(),
                objective,
                status: SolveStatus::IterationLimit,
                iterations: 0,
                max_violation: problem_violation(problem, x0, &g),
            })
        }
    }

    fn small_settings() -> SolverSettings {
        SolverSettings {
            num_mesh_intervals: 4,
            parallel: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut solver = CollocationSolver::new(small_settings());
        assert_eq!(solver.state(), SolverState::Uninitialized);
        solver
            .reset_problem(Arc::new(SlidingMass::default()))
            .unwrap();
        assert_eq!(solver.state(), SolverState::ProblemRegistered);
        solver.set_guess_kind(GuessKind::Bounds).unwrap();
        assert_eq!(solver.state(), SolverState::GuessConfigured);
        solver.clear_guess();
        assert_eq!(solver.state(), SolverState::ProblemRegistered);
    }

    #[test]
    fn test_guess_needs_problem() {
        let solver = CollocationSolver::default();
        assert!(matches!(
            solver.create_guess(GuessKind::Random),
            Err(TrajError::ProblemNotReady(_))
        ));
        assert!(matches!(solver.solve(), Err(TrajError::ProblemNotReady(_))));
    }

    #[test]
    fn test_created_guess_matches_grid() {
        let mut settings = small_settings();
        settings.transcription_scheme = crate::transcription::TranscriptionScheme::HermiteSimpson;
        let mut solver = CollocationSolver::new(settings);
        solver.reset_problem(Arc::new(Pendulum::default())).unwrap();

        for kind in [GuessKind::Bounds, GuessKind::Random, GuessKind::TimeStepping] {
            let guess = solver.create_guess(kind).unwrap();
            assert_eq!(guess.num_times(), 9, "{kind}");
            assert_eq!(guess.initial_time(), 0.0);
            assert_eq!(guess.final_time(), 1.0);
        }
    }

    #[test]
    fn test_get_guess_falls_back_to_bounds() {
        let mut solver = CollocationSolver::new(small_settings());
        solver
            .reset_problem(Arc::new(SlidingMass::default()))
            .unwrap();
        let default = solver.get_guess().unwrap();
        assert_eq!(default.state("x").unwrap(), vec![0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_solve_starts_from_api_guess() {
        let mut solver =
            CollocationSolver::new(small_settings()).with_backend(Arc::new(EchoBackend));
        solver
            .reset_problem(Arc::new(SlidingMass::default()))
            .unwrap();

        // Two samples onto five grid points.
        let guess = Iterate::new(
            vec![0.0, 1.0],
            vec!["x".into(), "v".into()],
            vec![vec![0.0, 0.0], vec![1.0, 0.0]],
            vec!["F".into()],
            vec![vec![2.0], vec![2.0]],
        )
        .unwrap();
        solver.set_guess(guess);

        let solution = solver.solve().unwrap();
        assert_eq!(solution.backend, "echo");
        assert_eq!(
            solution.trajectory.state("x").unwrap(),
            vec![0.0, 0.25, 0.5, 0.75, 1.0]
        );
        // ∫ F² dt over [0, 1] with F = 2
        assert!((solution.objective - 4.0).abs() < 1e-12);
        assert!(!solution.is_success());
        assert!(solution.diagnostics.has_errors());
    }

    #[test]
    fn test_time_stepping_guess_is_flagged() {
        let mut solver =
            CollocationSolver::new(small_settings()).with_backend(Arc::new(EchoBackend));
        solver.reset_problem(Arc::new(Pendulum::default())).unwrap();

        solver.set_guess_kind(GuessKind::TimeStepping).unwrap();
        assert_eq!(
            solver.guess_manager().api_guess_kind(),
            Some(GuessKind::TimeStepping)
        );
        let solution = solver.solve().unwrap();
        assert_eq!(solution.diagnostics.warning_count(), 1);
        let warning = &solution.diagnostics.warnings[0];
        assert_eq!(warning.source, "guess");
        assert!(warning.message.contains("time-stepping"));

        solver.set_guess_kind(GuessKind::Bounds).unwrap();
        assert_eq!(solver.solve().unwrap().diagnostics.warning_count(), 0);

        // A plain API guess carries no strategy.
        let guess = solver.get_guess().unwrap();
        solver.set_guess(guess);
        assert_eq!(solver.guess_manager().api_guess_kind(), None);
    }

    #[test]
    fn test_clone_resets_caches() {
        let mut solver = CollocationSolver::new(small_settings());
        solver
            .reset_problem(Arc::new(SlidingMass::default()))
            .unwrap();
        solver.transcribe().unwrap();
        assert!(solver.representation_pool().is_some());

        let copy = solver.clone();
        assert!(copy.representation_pool().is_none());
        assert_eq!(copy.state(), SolverState::ProblemRegistered);
    }

    #[test]
    fn test_pool_reused_across_transcriptions() {
        let mut solver = CollocationSolver::new(small_settings());
        solver
            .reset_problem(Arc::new(SlidingMass::default()))
            .unwrap();
        let first = solver.transcribe().unwrap();
        let second = solver.transcribe().unwrap();
        assert!(Arc::ptr_eq(first.pool(), second.pool()));

        solver.settings_mut().parallel = Some(3);
        let third = solver.transcribe().unwrap();
        assert_eq!(third.pool().capacity(), 3);
    }
}
