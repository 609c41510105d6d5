//! Degree-of-parallelism resolution for grid-point evaluation.
//!
//! The setting is an integer with three meanings:
//!
//! | value | meaning                                   |
//! |-------|-------------------------------------------|
//! | `0`   | evaluate serially on the calling thread   |
//! | `1`   | one worker per hardware thread (default)  |
//! | `n>1` | exactly `n` workers                       |
//!
//! An explicit per-solver value wins; otherwise the `TRAJOPT_PARALLEL`
//! environment variable is consulted, so users sharing a machine can split
//! cores across simultaneous solves without touching setup files. The
//! result is resolved once per solve.

use trajopt_core::{TrajError, TrajResult};

/// Environment variable consulted when no explicit setting is given.
pub const PARALLEL_ENV_VAR: &str = "TRAJOPT_PARALLEL";

/// Resolved evaluation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Serial,
    Threads(usize),
}

impl Parallelism {
    /// Interpret a raw setting value.
    pub fn from_setting(value: usize) -> Self {
        match value {
            0 => Parallelism::Serial,
            1 => Parallelism::Threads(num_cpus::get().max(1)),
            n => Parallelism::Threads(n),
        }
    }

    /// Number of snapshots the evaluation needs at most.
    pub fn workers(&self) -> usize {
        match self {
            Parallelism::Serial => 1,
            Parallelism::Threads(n) => *n,
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Parallelism::Threads(_))
    }
}

impl std::fmt::Display for Parallelism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Parallelism::Serial => write!(f, "serial"),
            Parallelism::Threads(n) => write!(f, "{n} threads"),
        }
    }
}

/// Merge an explicit setting with the environment value.
///
/// An empty or whitespace-only environment value counts as unset. Anything
/// else that is not a non-negative integer is a configuration error.
pub fn resolve_parallelism(explicit: Option<usize>, env: Option<&str>) -> TrajResult<Parallelism> {
    if let Some(value) = explicit {
        return Ok(Parallelism::from_setting(value));
    }
    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .parse::<usize>()
            .map(Parallelism::from_setting)
            .map_err(|_| {
                TrajError::Config(format!(
                    "{PARALLEL_ENV_VAR} must be a non-negative integer, got '{raw}'"
                ))
            }),
        None => Ok(Parallelism::from_setting(1)),
    }
}

/// [`resolve_parallelism`] against the current process environment.
pub fn parallelism_from_env(explicit: Option<usize>) -> TrajResult<Parallelism> {
    let env = std::env::var(PARALLEL_ENV_VAR).ok();
    resolve_parallelism(explicit, env.as_deref())
}
