//! # trajopt-algo: Direct Collocation for Optimal Control
//!
//! Turns a [`ContinuousProblem`](trajopt_core::ContinuousProblem) into a
//! nonlinear program, solves it and hands back a sampled trajectory.
//!
//! ## Pipeline
//!
//! | Stage | Module | Role |
//! |-------|--------|------|
//! | Snapshots | [`cache`] | Bounded pool of per-worker problem snapshots |
//! | Guess | [`guess`] | Bounds, random and time-stepping guesses; guess files |
//! | Transcription | [`transcription`] | Grid, decision layout, defects, quadrature |
//! | NLP | [`nlp`] | Backend trait and the penalty L-BFGS backend |
//! | Orchestration | [`solver`] | Settings, lifecycle and the solve itself |
//!
//! Grid-point evaluation runs on a rayon pool sized by the `parallel`
//! setting or the `TRAJOPT_PARALLEL` environment variable (see
//! [`parallel`]).
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trajopt_algo::models::SlidingMass;
//! use trajopt_algo::{CollocationSolver, SolverSettings};
//!
//! let settings = SolverSettings {
//!     num_mesh_intervals: 10,
//!     ..Default::default()
//! };
//! let mut solver = CollocationSolver::new(settings);
//! solver.reset_problem(Arc::new(SlidingMass::default()))?;
//!
//! let solution = solver.solve()?;
//! println!("{}: objective {:.4}", solution.status, solution.objective);
//! # Ok::<(), trajopt_core::TrajError>(())
//! ```

pub mod cache;
pub mod guess;
pub mod models;
pub mod nlp;
pub mod parallel;
pub mod solver;
pub mod transcription;

pub use cache::{PooledRep, RepresentationPool};
pub use guess::{GuessKind, GuessManager};
pub use nlp::{
    FiniteDifferenceScheme, NlpBackend, NlpOptions, NlpProblem, PenaltyLbfgsBackend, RawSolution,
    SolveStatus,
};
pub use parallel::{Parallelism, PARALLEL_ENV_VAR};
pub use solver::{CollocationSolver, Solution, SolverSettings, SolverState};
pub use transcription::{
    ConstraintKind, ConstraintLabel, DiscreteProblem, TranscriptionOptions, TranscriptionScheme,
};
