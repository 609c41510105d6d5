//! Closed intervals used for variable, constraint, and time bounds.
//!
//! An infinite endpoint means the side is unbounded. A bound is *fixed*
//! when both endpoints are equal.

use crate::error::{TrajError, TrajResult};
use serde::{Deserialize, Serialize};

/// Closed interval `[lower, upper]` with optionally infinite endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Bounds {
    /// Create bounds from explicit endpoints. Validation happens separately
    /// in [`Bounds::validate`] so malformed bounds are reported with a name.
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn fixed(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub fn at_least(lower: f64) -> Self {
        Self {
            lower,
            upper: f64::INFINITY,
        }
    }

    pub fn at_most(upper: f64) -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper,
        }
    }

    pub fn has_lower(&self) -> bool {
        self.lower.is_finite()
    }

    pub fn has_upper(&self) -> bool {
        self.upper.is_finite()
    }

    pub fn is_fixed(&self) -> bool {
        self.lower == self.upper
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Representative value used by bounds-based guesses.
    ///
    /// - both sides finite: the midpoint
    /// - one side finite: that bound
    /// - unbounded: zero
    pub fn midpoint(&self) -> f64 {
        match (self.has_lower(), self.has_upper()) {
            (true, true) => 0.5 * (self.lower + self.upper),
            (true, false) => self.lower,
            (false, true) => self.upper,
            (false, false) => 0.0,
        }
    }

    /// Intersect with another interval (used for initial/final bounds,
    /// which tighten the general bounds at the endpoints).
    pub fn intersect(&self, other: &Bounds) -> Bounds {
        Bounds {
            lower: self.lower.max(other.lower),
            upper: self.upper.min(other.upper),
        }
    }

    /// Clamp a value into the interval.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }

    /// Amount by which `value` lies outside the interval (0 inside).
    pub fn violation(&self, value: f64) -> f64 {
        if value < self.lower {
            self.lower - value
        } else if value > self.upper {
            value - self.upper
        } else {
            0.0
        }
    }

    /// Reject NaN endpoints and `lower > upper`.
    pub fn validate(&self, name: &str) -> TrajResult<()> {
        if self.lower.is_nan() || self.upper.is_nan() || self.lower > self.upper {
            return Err(TrajError::InvalidBounds {
                name: name.to_string(),
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }
}

impl From<(f64, f64)> for Bounds {
    fn from((lower, upper): (f64, f64)) -> Self {
        Bounds::new(lower, upper)
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint_two_sided() {
        assert_eq!(Bounds::new(-2.0, 4.0).midpoint(), 1.0);
        assert_eq!(
            Bounds::new(-std::f64::consts::PI, std::f64::consts::PI).midpoint(),
            0.0
        );
    }

    #[test]
    fn test_midpoint_one_sided_uses_the_bound() {
        assert_eq!(Bounds::at_least(3.5).midpoint(), 3.5);
        assert_eq!(Bounds::at_most(-1.25).midpoint(), -1.25);
        assert_eq!(Bounds::unbounded().midpoint(), 0.0);
    }

    #[test]
    fn test_validate_rejects_inverted_and_nan() {
        assert!(Bounds::new(1.0, 0.0).validate("x").is_err());
        assert!(Bounds::new(f64::NAN, 0.0).validate("x").is_err());
        assert!(Bounds::fixed(2.0).validate("x").is_ok());
        assert!(Bounds::unbounded().validate("x").is_ok());
    }

    #[test]
    fn test_violation_and_clamp() {
        let b = Bounds::new(0.0, 1.0);
        assert_eq!(b.violation(0.5), 0.0);
        assert_eq!(b.violation(1.5), 0.5);
        assert_eq!(b.violation(-0.25), 0.25);
        assert_eq!(b.clamp(7.0), 1.0);
    }

    #[test]
    fn test_intersect() {
        let general = Bounds::new(-10.0, 10.0);
        let initial = Bounds::fixed(0.0);
        assert_eq!(general.intersect(&initial), Bounds::fixed(0.0));
        assert_eq!(
            general.intersect(&Bounds::unbounded()),
            Bounds::new(-10.0, 10.0)
        );
    }
}
