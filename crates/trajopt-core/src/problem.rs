//! # Continuous Optimal Control Problem Interface
//!
//! The model layer hands the solver a [`ContinuousProblem`]: an immutable
//! description of the variables ([`ProblemInfo`]) plus a factory for
//! [`ProblemRep`] snapshots. A snapshot owns whatever scratch state the model
//! needs while evaluating (cached kinematics, muscle states, work buffers),
//! so every evaluation method takes `&mut self`. The solver never shares a
//! snapshot between threads; it keeps a pool of them and checks one out per
//! concurrent evaluation.
//!
//! ## State Layout
//!
//! States are always ordered as
//!
//! ```text
//! x = [ q_1..q_n,  v_1..v_n,  z_1..z_m ]
//!     |<coords>|  |<speeds>| |<auxiliary>|
//! ```
//!
//! The transcription assumes `q̇ = v` for the multibody block, so a model must
//! declare exactly as many speeds as coordinates. Models with quaternion
//! coordinates (where `q̇ = N(q)·v`) are rejected during validation.
//!
//! A snapshot's [`ProblemRep::dynamics`] only computes `[v̇, ż]`; the
//! kinematic block `q̇ = v` is supplied by the transcription.

use crate::bounds::Bounds;
use crate::error::{TrajError, TrajResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name and bounds of one decision variable of the continuous problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    /// Bounds applied at every grid point.
    pub bounds: Bounds,
    /// Additional bounds applied at the first grid point only.
    pub initial_bounds: Option<Bounds>,
    /// Additional bounds applied at the last grid point only.
    pub final_bounds: Option<Bounds>,
}

impl VariableInfo {
    pub fn new(name: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            name: name.into(),
            bounds,
            initial_bounds: None,
            final_bounds: None,
        }
    }

    pub fn with_initial(mut self, bounds: Bounds) -> Self {
        self.initial_bounds = Some(bounds);
        self
    }

    pub fn with_final(mut self, bounds: Bounds) -> Self {
        self.final_bounds = Some(bounds);
        self
    }

    /// Bounds at the first grid point (general bounds tightened by the
    /// initial bounds, if any).
    pub fn effective_initial(&self) -> Bounds {
        match &self.initial_bounds {
            Some(b) => self.bounds.intersect(b),
            None => self.bounds,
        }
    }

    /// Bounds at the last grid point.
    pub fn effective_final(&self) -> Bounds {
        match &self.final_bounds {
            Some(b) => self.bounds.intersect(b),
            None => self.bounds,
        }
    }

    fn validate(&self) -> TrajResult<()> {
        self.bounds.validate(&self.name)?;
        if let Some(b) = &self.initial_bounds {
            b.validate(&format!("{} (initial)", self.name))?;
            self.effective_initial()
                .validate(&format!("{} (initial ∩ general)", self.name))?;
        }
        if let Some(b) = &self.final_bounds {
            b.validate(&format!("{} (final)", self.name))?;
            self.effective_final()
                .validate(&format!("{} (final ∩ general)", self.name))?;
        }
        Ok(())
    }
}

/// A scalar path constraint `lower ≤ g(t, x, u, p) ≤ upper`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConstraintInfo {
    pub name: String,
    pub bounds: Bounds,
}

impl PathConstraintInfo {
    pub fn new(name: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            name: name.into(),
            bounds,
        }
    }
}

/// Immutable description of a continuous optimal control problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemInfo {
    pub name: String,
    pub initial_time: Bounds,
    pub final_time: Bounds,
    pub coordinates: Vec<VariableInfo>,
    pub speeds: Vec<VariableInfo>,
    pub auxiliary_states: Vec<VariableInfo>,
    pub controls: Vec<VariableInfo>,
    pub parameters: Vec<VariableInfo>,
    pub path_constraints: Vec<PathConstraintInfo>,
}

impl ProblemInfo {
    /// Create an empty problem on the fixed time horizon `[0, 1]`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_time: Bounds::fixed(0.0),
            final_time: Bounds::fixed(1.0),
            coordinates: Vec::new(),
            speeds: Vec::new(),
            auxiliary_states: Vec::new(),
            controls: Vec::new(),
            parameters: Vec::new(),
            path_constraints: Vec::new(),
        }
    }

    pub fn with_time_bounds(mut self, initial: Bounds, final_: Bounds) -> Self {
        self.initial_time = initial;
        self.final_time = final_;
        self
    }

    /// Add a generalized coordinate together with its speed (`q̇ = v`).
    pub fn with_coordinate(mut self, coordinate: VariableInfo, speed: VariableInfo) -> Self {
        self.coordinates.push(coordinate);
        self.speeds.push(speed);
        self
    }

    pub fn with_auxiliary_state(mut self, state: VariableInfo) -> Self {
        self.auxiliary_states.push(state);
        self
    }

    pub fn with_control(mut self, control: VariableInfo) -> Self {
        self.controls.push(control);
        self
    }

    pub fn with_parameter(mut self, parameter: VariableInfo) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_path_constraint(mut self, constraint: PathConstraintInfo) -> Self {
        self.path_constraints.push(constraint);
        self
    }

    pub fn num_coordinates(&self) -> usize {
        self.coordinates.len()
    }

    pub fn num_speeds(&self) -> usize {
        self.speeds.len()
    }

    pub fn num_auxiliary_states(&self) -> usize {
        self.auxiliary_states.len()
    }

    pub fn num_states(&self) -> usize {
        self.coordinates.len() + self.speeds.len() + self.auxiliary_states.len()
    }

    pub fn num_controls(&self) -> usize {
        self.controls.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn num_path_constraints(&self) -> usize {
        self.path_constraints.len()
    }

    /// Length of the slice written by [`ProblemRep::dynamics`].
    pub fn num_dynamics_outputs(&self) -> usize {
        self.speeds.len() + self.auxiliary_states.len()
    }

    /// All states in layout order `[q, v, z]`.
    pub fn states(&self) -> impl Iterator<Item = &VariableInfo> {
        self.coordinates
            .iter()
            .chain(self.speeds.iter())
            .chain(self.auxiliary_states.iter())
    }

    pub fn state_names(&self) -> Vec<String> {
        self.states().map(|s| s.name.clone()).collect()
    }

    pub fn control_names(&self) -> Vec<String> {
        self.controls.iter().map(|c| c.name.clone()).collect()
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Check everything the transcription relies on.
    ///
    /// Fails with [`TrajError::UnsupportedStructure`] when the `q̇ = v`
    /// assumption cannot hold, [`TrajError::InvalidBounds`] for malformed
    /// bounds and [`TrajError::Config`] for duplicate or empty names.
    pub fn validate(&self) -> TrajResult<()> {
        if self.coordinates.len() != self.speeds.len() {
            return Err(TrajError::UnsupportedStructure(format!(
                "problem '{}' has {} coordinates but {} speeds; only systems with q̇ = v \
                 (no quaternions) can be transcribed",
                self.name,
                self.coordinates.len(),
                self.speeds.len()
            )));
        }
        if self.num_states() == 0 {
            return Err(TrajError::UnsupportedStructure(format!(
                "problem '{}' has no states",
                self.name
            )));
        }

        self.initial_time.validate("initial_time")?;
        self.final_time.validate("final_time")?;
        if self.initial_time.lower > self.final_time.upper {
            return Err(TrajError::Config(format!(
                "initial time lower bound {} exceeds final time upper bound {}",
                self.initial_time.lower, self.final_time.upper
            )));
        }
        if self.initial_time.is_fixed()
            && self.final_time.is_fixed()
            && self.initial_time.lower >= self.final_time.lower
        {
            return Err(TrajError::Config(format!(
                "fixed time horizon [{}, {}] is empty",
                self.initial_time.lower, self.final_time.lower
            )));
        }

        let mut seen = HashSet::new();
        for var in self
            .states()
            .chain(self.controls.iter())
            .chain(self.parameters.iter())
        {
            if var.name.is_empty() {
                return Err(TrajError::Config("variable names must be non-empty".into()));
            }
            if !seen.insert(var.name.as_str()) {
                return Err(TrajError::Config(format!(
                    "duplicate variable name '{}'",
                    var.name
                )));
            }
            var.validate()?;
        }

        for pc in &self.path_constraints {
            pc.bounds.validate(&pc.name)?;
        }

        Ok(())
    }
}

/// Inputs to a single pointwise evaluation.
#[derive(Debug, Clone, Copy)]
pub struct PointInput<'a> {
    pub time: f64,
    pub states: &'a [f64],
    pub controls: &'a [f64],
    pub parameters: &'a [f64],
}

/// An independently evaluatable snapshot of a continuous problem.
///
/// Implementations may mutate internal scratch state during evaluation;
/// the solver guarantees a snapshot is used by one thread at a time.
pub trait ProblemRep: Send {
    /// Write `[v̇, ż]` (length `num_speeds + num_auxiliary_states`) into `out`.
    fn dynamics(&mut self, input: &PointInput<'_>, out: &mut [f64]) -> anyhow::Result<()>;

    /// Integrand `L(t, x, u, p)` of the integral cost.
    fn integral_cost_integrand(&mut self, _input: &PointInput<'_>) -> anyhow::Result<f64> {
        Ok(0.0)
    }

    /// Endpoint (Mayer) cost.
    fn endpoint_cost(
        &mut self,
        _initial: &PointInput<'_>,
        _final: &PointInput<'_>,
    ) -> anyhow::Result<f64> {
        Ok(0.0)
    }

    /// Write the path constraint values (length `num_path_constraints`).
    fn path_constraints(&mut self, _input: &PointInput<'_>, _out: &mut [f64]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A continuous optimal control problem as seen by the solver.
pub trait ContinuousProblem: Send + Sync {
    fn info(&self) -> &ProblemInfo;

    /// Build a new evaluatable snapshot. May be expensive; the solver calls
    /// it lazily and reuses snapshots across grid points and solves.
    fn create_rep(&self) -> anyhow::Result<Box<dyn ProblemRep>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_state() -> ProblemInfo {
        ProblemInfo::new("slider")
            .with_coordinate(
                VariableInfo::new("x", Bounds::new(-5.0, 5.0)),
                VariableInfo::new("v", Bounds::new(-10.0, 10.0)),
            )
            .with_control(VariableInfo::new("f", Bounds::new(-50.0, 50.0)))
    }

    #[test]
    fn test_state_layout_order() {
        let info = two_state().with_auxiliary_state(VariableInfo::new("a", Bounds::new(0.0, 1.0)));
        assert_eq!(info.state_names(), vec!["x", "v", "a"]);
        assert_eq!(info.num_dynamics_outputs(), 2);
    }

    #[test]
    fn test_validate_accepts_well_formed_problem() {
        assert!(two_state().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_mismatched_speeds() {
        let mut info = two_state();
        info.speeds.push(VariableInfo::new("w", Bounds::unbounded()));
        let err = info.validate().unwrap_err();
        assert!(matches!(err, TrajError::UnsupportedStructure(_)));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let info = two_state().with_control(VariableInfo::new("g", Bounds::new(2.0, 1.0)));
        assert!(matches!(
            info.validate(),
            Err(TrajError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_disjoint_initial_bounds() {
        let info = ProblemInfo::new("p").with_coordinate(
            VariableInfo::new("x", Bounds::new(0.0, 1.0)).with_initial(Bounds::fixed(3.0)),
            VariableInfo::new("v", Bounds::unbounded()),
        );
        assert!(matches!(
            info.validate(),
            Err(TrajError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let info = two_state().with_control(VariableInfo::new("x", Bounds::unbounded()));
        assert!(matches!(info.validate(), Err(TrajError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_fixed_horizon() {
        let info = two_state().with_time_bounds(Bounds::fixed(1.0), Bounds::fixed(1.0));
        assert!(matches!(info.validate(), Err(TrajError::Config(_))));
    }
}
