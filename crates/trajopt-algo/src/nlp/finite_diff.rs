//! Finite-difference gradients.
//!
//! ```text
//! forward:   ∂f/∂x_i ≈ [f(x + h·e_i) - f(x)] / h
//! backward:  ∂f/∂x_i ≈ [f(x) - f(x - h·e_i)] / h
//! central:   ∂f/∂x_i ≈ [f(x + h·e_i) - f(x - h·e_i)] / 2h
//! ```
//!
//! The step is scaled by `max(1, |x_i|)`. Central differences cost twice as
//! many evaluations but are second-order accurate.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use trajopt_core::TrajError;

const ONE_SIDED_STEP: f64 = 1e-7;
const CENTRAL_STEP: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FiniteDifferenceScheme {
    #[default]
    Central,
    Forward,
    Backward,
}

impl FiniteDifferenceScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            FiniteDifferenceScheme::Central => "central",
            FiniteDifferenceScheme::Forward => "forward",
            FiniteDifferenceScheme::Backward => "backward",
        }
    }

    fn step(&self, xi: f64) -> f64 {
        let base = match self {
            FiniteDifferenceScheme::Central => CENTRAL_STEP,
            _ => ONE_SIDED_STEP,
        };
        base * xi.abs().max(1.0)
    }

    /// Gradient of `f` at `x`. `fx` is `f(x)` when the caller already has it.
    pub fn gradient<F, E>(&self, f: F, x: &[f64], fx: Option<f64>) -> Result<Vec<f64>, E>
    where
        F: Fn(&[f64]) -> Result<f64, E>,
    {
        let n = x.len();
        let mut grad = vec![0.0; n];
        let mut shifted = x.to_vec();

        let f0 = match (self, fx) {
            (FiniteDifferenceScheme::Central, _) => 0.0,
            (_, Some(v)) => v,
            (_, None) => f(x)?,
        };

        for i in 0..n {
            let h = self.step(x[i]);
            grad[i] = match self {
                FiniteDifferenceScheme::Forward => {
                    shifted[i] = x[i] + h;
                    (f(&shifted)? - f0) / h
                }
                FiniteDifferenceScheme::Backward => {
                    shifted[i] = x[i] - h;
                    (f0 - f(&shifted)?) / h
                }
                FiniteDifferenceScheme::Central => {
                    shifted[i] = x[i] + h;
                    let plus = f(&shifted)?;
                    shifted[i] = x[i] - h;
                    let minus = f(&shifted)?;
                    (plus - minus) / (2.0 * h)
                }
            };
            shifted[i] = x[i];
        }

        Ok(grad)
    }
}

impl FromStr for FiniteDifferenceScheme {
    type Err = TrajError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "central" => Ok(FiniteDifferenceScheme::Central),
            "forward" => Ok(FiniteDifferenceScheme::Forward),
            "backward" => Ok(FiniteDifferenceScheme::Backward),
            other => Err(TrajError::Config(format!(
                "unknown finite difference scheme '{other}' (expected central, forward or backward)"
            ))),
        }
    }
}

impl std::fmt::Display for FiniteDifferenceScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic(x: &[f64]) -> Result<f64, ()> {
        Ok(3.0 * x[0] * x[0] + x[0] * x[1] - 2.0 * x[1])
    }

    #[test]
    fn test_all_schemes_approximate_gradient() {
        let x = [1.5, -2.0];
        // ∇f = [6x0 + x1, x0 - 2]
        let exact = [7.0, -0.5];
        for scheme in [
            FiniteDifferenceScheme::Central,
            FiniteDifferenceScheme::Forward,
            FiniteDifferenceScheme::Backward,
        ] {
            let g = scheme.gradient(quadratic, &x, None).unwrap();
            for (gi, ei) in g.iter().zip(exact) {
                assert!((gi - ei).abs() < 1e-4, "{scheme}: {gi} vs {ei}");
            }
        }
    }

    #[test]
    fn test_errors_propagate() {
        let failing = |_: &[f64]| -> Result<f64, &'static str> { Err("boom") };
        let err = FiniteDifferenceScheme::Forward
            .gradient(failing, &[0.0], None)
            .unwrap_err();
        assert_eq!(err, "boom");
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "Central".parse::<FiniteDifferenceScheme>().unwrap(),
            FiniteDifferenceScheme::Central
        );
        assert_eq!(
            "forward".parse::<FiniteDifferenceScheme>().unwrap(),
            FiniteDifferenceScheme::Forward
        );
        assert!("exact".parse::<FiniteDifferenceScheme>().is_err());
    }
}
