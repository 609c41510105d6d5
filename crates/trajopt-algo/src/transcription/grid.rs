//! Mesh, grid points and quadrature weights.
//!
//! Everything here lives on the normalized horizon `τ ∈ [0, 1]`; physical
//! time is `t = t0 + (tf - t0)·τ`, so the grid stays valid while the
//! optimizer moves free initial and final times.
//!
//! ```text
//! mesh            τ_0 ─────── τ_1 ─────── τ_2          (N + 1 points)
//! trapezoidal     ●           ●           ●            K = N + 1
//! hermite-simpson ●     ○     ●     ○     ●            K = 2N + 1
//!                       └ interval midpoints
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use trajopt_core::{TrajError, TrajResult};

/// Collocation rule used to build the defect constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscriptionScheme {
    #[default]
    Trapezoidal,
    HermiteSimpson,
}

impl TranscriptionScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptionScheme::Trapezoidal => "trapezoidal",
            TranscriptionScheme::HermiteSimpson => "hermite-simpson",
        }
    }
}

impl FromStr for TranscriptionScheme {
    type Err = TrajError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trapezoidal" => Ok(TranscriptionScheme::Trapezoidal),
            "hermite-simpson" | "hermite_simpson" => Ok(TranscriptionScheme::HermiteSimpson),
            other => Err(TrajError::Config(format!(
                "unknown transcription scheme '{other}' (expected trapezoidal or hermite-simpson)"
            ))),
        }
    }
}

impl std::fmt::Display for TranscriptionScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized mesh, uniform with `num_intervals` intervals.
pub fn uniform_mesh(num_intervals: usize) -> TrajResult<Vec<f64>> {
    if num_intervals == 0 {
        return Err(TrajError::Config(
            "num_mesh_intervals must be at least 1".into(),
        ));
    }
    let mut mesh: Vec<f64> = (0..=num_intervals)
        .map(|i| i as f64 / num_intervals as f64)
        .collect();
    mesh[num_intervals] = 1.0;
    Ok(mesh)
}

/// Check a user-supplied normalized mesh: at least two points, starts at
/// 0, ends at 1, finite and strictly increasing.
pub fn validate_mesh(mesh: &[f64]) -> TrajResult<()> {
    if mesh.len() < 2 {
        return Err(TrajError::Config(
            "mesh must contain at least two points".into(),
        ));
    }
    if mesh[0] != 0.0 || mesh[mesh.len() - 1] != 1.0 {
        return Err(TrajError::Config(format!(
            "mesh must start at 0 and end at 1, got [{}, {}]",
            mesh[0],
            mesh[mesh.len() - 1]
        )));
    }
    if mesh.iter().any(|t| !t.is_finite()) {
        return Err(TrajError::Config("mesh points must be finite".into()));
    }
    if let Some(w) = mesh.windows(2).find(|w| w[1] <= w[0]) {
        return Err(TrajError::Config(format!(
            "mesh must be strictly increasing ({} followed by {})",
            w[0], w[1]
        )));
    }
    Ok(())
}

/// Grid points for one scheme on one mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    scheme: TranscriptionScheme,
    mesh: Vec<f64>,
    points: Vec<f64>,
    weights: Vec<f64>,
}

impl Grid {
    pub fn new(scheme: TranscriptionScheme, mesh: Vec<f64>) -> TrajResult<Self> {
        validate_mesh(&mesh)?;
        let n = mesh.len() - 1;

        let (points, weights) = match scheme {
            TranscriptionScheme::Trapezoidal => {
                let mut weights = vec![0.0; n + 1];
                for i in 0..n {
                    let h = mesh[i + 1] - mesh[i];
                    weights[i] += 0.5 * h;
                    weights[i + 1] += 0.5 * h;
                }
                (mesh.clone(), weights)
            }
            TranscriptionScheme::HermiteSimpson => {
                let mut points = Vec::with_capacity(2 * n + 1);
                let mut weights = vec![0.0; 2 * n + 1];
                for i in 0..n {
                    let h = mesh[i + 1] - mesh[i];
                    points.push(mesh[i]);
                    points.push(0.5 * (mesh[i] + mesh[i + 1]));
                    weights[2 * i] += h / 6.0;
                    weights[2 * i + 1] += 4.0 * h / 6.0;
                    weights[2 * i + 2] += h / 6.0;
                }
                points.push(mesh[n]);
                (points, weights)
            }
        };

        Ok(Self {
            scheme,
            mesh,
            points,
            weights,
        })
    }

    pub fn scheme(&self) -> TranscriptionScheme {
        self.scheme
    }

    /// Normalized mesh points.
    pub fn mesh(&self) -> &[f64] {
        &self.mesh
    }

    pub fn num_intervals(&self) -> usize {
        self.mesh.len() - 1
    }

    /// Normalized times of all grid points.
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Quadrature weights on the normalized horizon (they sum to 1).
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Whether grid point `k` lies on the mesh (as opposed to an interval
    /// midpoint).
    pub fn is_mesh_point(&self, k: usize) -> bool {
        match self.scheme {
            TranscriptionScheme::Trapezoidal => true,
            TranscriptionScheme::HermiteSimpson => k % 2 == 0,
        }
    }

    /// Grid indices `(start, midpoint, end)` of interval `i`. The midpoint
    /// is `None` for trapezoidal grids.
    pub fn interval_points(&self, i: usize) -> (usize, Option<usize>, usize) {
        match self.scheme {
            TranscriptionScheme::Trapezoidal => (i, None, i + 1),
            TranscriptionScheme::HermiteSimpson => (2 * i, Some(2 * i + 1), 2 * i + 2),
        }
    }

    /// Physical times of all grid points for a horizon `[t0, tf]`.
    pub fn times(&self, t0: f64, tf: f64) -> Vec<f64> {
        self.points.iter().map(|tau| t0 + (tf - t0) * tau).collect()
    }
}
