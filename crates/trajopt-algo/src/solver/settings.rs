//! Solver settings and their documentation.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use trajopt_core::{TrajError, TrajResult};

use crate::nlp::{FiniteDifferenceScheme, NlpOptions};
use crate::parallel::Parallelism;
use crate::transcription::{validate_mesh, TranscriptionOptions, TranscriptionScheme};

/// User-facing settings of the collocation solver.
///
/// Every field has a default, so a setup file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverSettings {
    pub num_mesh_intervals: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<Vec<f64>>,
    pub transcription_scheme: TranscriptionScheme,
    pub interpolate_control_midpoints: bool,
    pub finite_difference_scheme: FiniteDifferenceScheme,
    /// 0 serial, 1 all hardware threads, n > 1 exactly n threads.
    /// Unset defers to `TRAJOPT_PARALLEL`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<usize>,
    pub optim_max_iterations: usize,
    pub optim_convergence_tolerance: f64,
    pub optim_constraint_tolerance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optim_time_limit_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        let nlp = NlpOptions::default();
        Self {
            num_mesh_intervals: 100,
            mesh: None,
            transcription_scheme: TranscriptionScheme::default(),
            interpolate_control_midpoints: true,
            finite_difference_scheme: FiniteDifferenceScheme::default(),
            parallel: None,
            optim_max_iterations: nlp.max_iterations,
            optim_convergence_tolerance: nlp.convergence_tolerance,
            optim_constraint_tolerance: nlp.constraint_tolerance,
            optim_time_limit_secs: None,
            random_seed: None,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> TrajResult<()> {
        match &self.mesh {
            Some(mesh) => validate_mesh(mesh)?,
            None if self.num_mesh_intervals == 0 => {
                return Err(TrajError::Config(
                    "num_mesh_intervals must be at least 1".into(),
                ))
            }
            None => {}
        }
        if self.optim_max_iterations == 0 {
            return Err(TrajError::Config(
                "optim_max_iterations must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("optim_convergence_tolerance", self.optim_convergence_tolerance),
            ("optim_constraint_tolerance", self.optim_constraint_tolerance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrajError::Config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if let Some(secs) = self.optim_time_limit_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(TrajError::Config(format!(
                    "optim_time_limit_secs must be positive, got {secs}"
                )));
            }
        }
        Ok(())
    }

    /// Number of grid points the current mesh settings produce.
    pub fn num_grid_points(&self) -> usize {
        let intervals = self
            .mesh
            .as_ref()
            .map_or(self.num_mesh_intervals, |m| m.len().saturating_sub(1));
        match self.transcription_scheme {
            TranscriptionScheme::Trapezoidal => intervals + 1,
            TranscriptionScheme::HermiteSimpson => 2 * intervals + 1,
        }
    }

    pub fn transcription_options(&self, parallelism: Parallelism) -> TranscriptionOptions {
        TranscriptionOptions {
            scheme: self.transcription_scheme,
            num_mesh_intervals: self.num_mesh_intervals,
            mesh: self.mesh.clone(),
            interpolate_control_midpoints: self.interpolate_control_midpoints,
            parallelism,
        }
    }

    pub fn nlp_options(&self) -> NlpOptions {
        NlpOptions {
            max_iterations: self.optim_max_iterations,
            convergence_tolerance: self.optim_convergence_tolerance,
            constraint_tolerance: self.optim_constraint_tolerance,
            time_limit: self.optim_time_limit_secs.map(Duration::from_secs_f64),
            finite_difference: self.finite_difference_scheme,
        }
    }
}

/// Documentation of one setting, as printed by `trajopt property-info`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PropertyDoc {
    pub name: &'static str,
    pub default: &'static str,
    pub description: &'static str,
}

pub const PROPERTIES: &[PropertyDoc] = &[
    PropertyDoc {
        name: "num_mesh_intervals",
        default: "100",
        description: "Number of uniform mesh intervals. Ignored when `mesh` is set.",
    },
    PropertyDoc {
        name: "mesh",
        default: "unset",
        description: "Normalized mesh points: strictly increasing, from 0.0 to 1.0.",
    },
    PropertyDoc {
        name: "transcription_scheme",
        default: "trapezoidal",
        description: "Collocation rule: 'trapezoidal' or 'hermite-simpson'.",
    },
    PropertyDoc {
        name: "interpolate_control_midpoints",
        default: "true",
        description: "Hermite-Simpson only: constrain midpoint controls to the average \
                      of the interval's end controls.",
    },
    PropertyDoc {
        name: "finite_difference_scheme",
        default: "central",
        description: "Gradient approximation: 'central', 'forward' or 'backward'.",
    },
    PropertyDoc {
        name: "parallel",
        default: "unset",
        description: "0 serial, 1 all hardware threads, n > 1 exactly n threads. When unset \
                      the TRAJOPT_PARALLEL environment variable applies, then 1.",
    },
    PropertyDoc {
        name: "optim_max_iterations",
        default: "1000",
        description: "Iteration budget of the NLP solver.",
    },
    PropertyDoc {
        name: "optim_convergence_tolerance",
        default: "1e-6",
        description: "Gradient-norm tolerance of the inner minimization.",
    },
    PropertyDoc {
        name: "optim_constraint_tolerance",
        default: "1e-4",
        description: "Largest bound or constraint violation counted as feasible.",
    },
    PropertyDoc {
        name: "optim_time_limit_secs",
        default: "unset",
        description: "Wall-clock budget of the NLP solver in seconds.",
    },
    PropertyDoc {
        name: "random_seed",
        default: "unset",
        description: "Seed for random guesses. Unset draws from system entropy.",
    },
];

pub fn property_doc(name: &str) -> Option<&'static PropertyDoc> {
    PROPERTIES.iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SolverSettings::default();
        assert_eq!(settings.num_mesh_intervals, 100);
        assert_eq!(settings.finite_difference_scheme, FiniteDifferenceScheme::Central);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.num_grid_points(), 101);
    }

    #[test]
    fn test_partial_deserialization() {
        let settings: SolverSettings = serde_json::from_str(
            r#"{"num_mesh_intervals": 8, "transcription_scheme": "hermite-simpson", "parallel": 0}"#,
        )
        .unwrap();
        assert_eq!(settings.num_grid_points(), 17);
        assert_eq!(settings.parallel, Some(0));
        assert!(settings.interpolate_control_midpoints);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = serde_json::from_str::<SolverSettings>(r#"{"num_mesh_interval": 8}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut settings = SolverSettings {
            num_mesh_intervals: 0,
            ..Default::default()
        };
        assert!(settings.validate().unwrap_err().is_configuration());

        settings.mesh = Some(vec![0.0, 0.4, 1.0]);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.num_grid_points(), 3);

        settings.optim_time_limit_secs = Some(-1.0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_every_field_is_documented() {
        let value = serde_json::to_value(SolverSettings {
            mesh: Some(vec![0.0, 1.0]),
            parallel: Some(1),
            optim_time_limit_secs: Some(1.0),
            random_seed: Some(1),
            ..Default::default()
        })
        .unwrap();
        let fields = value.as_object().unwrap();
        assert_eq!(fields.len(), PROPERTIES.len());
        for key in fields.keys() {
            assert!(property_doc(key).is_some(), "{key}");
        }
    }
}
