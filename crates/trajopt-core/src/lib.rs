//! # trajopt-core: Optimal Control Problem Description
//!
//! Shared data structures for the direct-collocation pipeline:
//!
//! - [`ProblemInfo`] / [`VariableInfo`] - names and bounds of every state,
//!   control, parameter and path constraint, plus the time bounds
//! - [`ContinuousProblem`] / [`ProblemRep`] - the model seam: an immutable
//!   problem that can produce independently evaluatable snapshots
//! - [`Iterate`] - a named, time-sampled trajectory (guesses and solutions)
//! - [`Bounds`] - closed intervals with optional infinite ends
//! - [`TrajError`] - the error taxonomy shared by all crates
//!
//! ## Quick Start
//!
//! ```rust
//! use trajopt_core::*;
//!
//! let info = ProblemInfo::new("sliding_mass")
//!     .with_time_bounds(Bounds::fixed(0.0), Bounds::new(0.5, 5.0))
//!     .with_coordinate(
//!         VariableInfo::new("x", Bounds::new(-5.0, 5.0))
//!             .with_initial(Bounds::fixed(0.0))
//!             .with_final(Bounds::fixed(1.0)),
//!         VariableInfo::new("v", Bounds::new(-50.0, 50.0))
//!             .with_initial(Bounds::fixed(0.0))
//!             .with_final(Bounds::fixed(0.0)),
//!     )
//!     .with_control(VariableInfo::new("F", Bounds::new(-50.0, 50.0)));
//!
//! assert!(info.validate().is_ok());
//! assert_eq!(info.state_names(), vec!["x", "v"]);
//! ```
//!
//! ## Modules
//!
//! - [`problem`] - problem description and model traits
//! - [`iterate`] - trajectories, interpolation and CSV storage
//! - [`diagnostics`] - non-fatal issues reported with a solution

pub mod bounds;
pub mod diagnostics;
pub mod error;
pub mod iterate;
pub mod problem;

pub use bounds::Bounds;
pub use diagnostics::{Diagnostics, Issue};
pub use error::{TrajError, TrajResult};
pub use iterate::Iterate;
pub use problem::{
    ContinuousProblem, PathConstraintInfo, PointInput, ProblemInfo, ProblemRep, VariableInfo,
};
