//! TOML setup files.
//!
//! ```toml
//! model = "pendulum"
//! guess_file = "walk_guess.csv"   # optional, relative to this file
//! guess = "bounds"                # optional: bounds | random | time-stepping
//!
//! [solver]
//! num_mesh_intervals = 20
//! transcription_scheme = "hermite-simpson"
//! ```

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use trajopt_algo::models::{self, BUILTIN_MODELS};
use trajopt_algo::{CollocationSolver, GuessKind, SolverSettings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Setup {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guess_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guess: Option<GuessKind>,
    #[serde(default)]
    pub solver: SolverSettings,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            model: BUILTIN_MODELS[0].to_string(),
            guess_file: None,
            guess: None,
            solver: SolverSettings::default(),
        }
    }
}

impl Setup {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading setup file '{}'", path.display()))?;
        let mut setup: Setup = toml::from_str(&text)
            .with_context(|| format!("parsing setup file '{}'", path.display()))?;
        if let (Some(file), Some(dir)) = (&setup.guess_file, path.parent()) {
            if file.is_relative() {
                setup.guess_file = Some(dir.join(file));
            }
        }
        Ok(setup)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing setup")
    }

    /// A solver with this setup's problem, settings and guess.
    pub fn build_solver(&self) -> Result<CollocationSolver> {
        if self.guess_file.is_some() && self.guess.is_some() {
            bail!("setup sets both 'guess_file' and 'guess'; pick one");
        }
        let problem = models::builtin(&self.model).ok_or_else(|| {
            anyhow!(
                "unknown model '{}' (available: {})",
                self.model,
                BUILTIN_MODELS.join(", ")
            )
        })?;

        self.solver.validate()?;
        let mut solver = CollocationSolver::new(self.solver.clone());
        solver.reset_problem(problem)?;
        if let Some(file) = &self.guess_file {
            solver.set_guess_file(file);
        }
        if let Some(kind) = self.guess {
            solver
                .set_guess_kind(kind)
                .with_context(|| format!("creating {kind} guess"))?;
        }
        Ok(solver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_setup_round_trips_through_toml() {
        let setup = Setup::default();
        let text = setup.to_toml().unwrap();
        assert!(text.contains("model = \"sliding_mass\""));
        assert!(text.contains("[solver]"));
        let back: Setup = toml::from_str(&text).unwrap();
        assert_eq!(back, setup);
    }

    #[test]
    fn test_minimal_setup() {
        let setup: Setup = toml::from_str(
            r#"
            model = "pendulum"
            guess = "time-stepping"

            [solver]
            num_mesh_intervals = 6
            parallel = 0
            "#,
        )
        .unwrap();
        assert_eq!(setup.guess, Some(GuessKind::TimeStepping));
        assert_eq!(setup.solver.num_mesh_intervals, 6);

        let solver = setup.build_solver().unwrap();
        assert!(solver.guess_manager().api_guess().is_some());
    }

    #[test]
    fn test_unknown_model() {
        let setup = Setup {
            model: "cart_pole".into(),
            ..Default::default()
        };
        let err = setup.build_solver().unwrap_err();
        assert!(err.to_string().contains("cart_pole"));
    }

    #[test]
    fn test_relative_guess_file_resolves_next_to_setup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.toml");
        fs::write(&path, "model = \"sliding_mass\"\nguess_file = \"guess.csv\"\n").unwrap();
        let setup = Setup::load(&path).unwrap();
        assert_eq!(setup.guess_file, Some(dir.path().join("guess.csv")));
    }
}
