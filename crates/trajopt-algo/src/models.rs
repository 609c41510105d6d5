//! Small reference problems.
//!
//! Used by the tests and by the CLI's `solve` command. Both are one-degree-
//! of-freedom systems so every solve stays cheap.

use std::f64::consts::PI;
use trajopt_core::{
    Bounds, ContinuousProblem, PathConstraintInfo, PointInput, ProblemInfo, ProblemRep,
    VariableInfo,
};

const GRAVITY: f64 = 9.81;

// ============================================================================
// SLIDING MASS
// ============================================================================

/// A point mass pushed along a line from rest at `x = 0` to rest at `x = 1`.
///
/// ```text
/// ẋ = v,   v̇ = F / m,   minimize ∫ F² dt
/// ```
///
/// Optionally the mass is a free parameter and the mechanical work
/// `W = ∫ F·v dt` is carried as an auxiliary state.
#[derive(Debug, Clone)]
pub struct SlidingMass {
    info: ProblemInfo,
    mass: f64,
    mass_is_parameter: bool,
    track_work: bool,
}

impl Default for SlidingMass {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl SlidingMass {
    pub fn new(mass: f64) -> Self {
        let info = ProblemInfo::new("sliding_mass")
            .with_time_bounds(Bounds::fixed(0.0), Bounds::fixed(1.0))
            .with_coordinate(
                VariableInfo::new("x", Bounds::new(-5.0, 5.0))
                    .with_initial(Bounds::fixed(0.0))
                    .with_final(Bounds::fixed(1.0)),
                VariableInfo::new("v", Bounds::new(-50.0, 50.0))
                    .with_initial(Bounds::fixed(0.0))
                    .with_final(Bounds::fixed(0.0)),
            )
            .with_control(VariableInfo::new("F", Bounds::new(-50.0, 50.0)));
        Self {
            info,
            mass,
            mass_is_parameter: false,
            track_work: false,
        }
    }

    /// Let the optimizer pick the horizon within `final_time`.
    pub fn with_final_time(mut self, final_time: Bounds) -> Self {
        self.info.final_time = final_time;
        self
    }

    /// Make the mass a decision parameter.
    pub fn with_mass_parameter(mut self, bounds: Bounds) -> Self {
        self.info = self.info.with_parameter(VariableInfo::new("mass", bounds));
        self.mass_is_parameter = true;
        self
    }

    /// Add the auxiliary state `work` with `ẇ = F·v`.
    pub fn with_work_state(mut self) -> Self {
        self.info = self.info.with_auxiliary_state(
            VariableInfo::new("work", Bounds::unbounded()).with_initial(Bounds::fixed(0.0)),
        );
        self.track_work = true;
        self
    }
}

struct SlidingMassRep {
    mass: f64,
    mass_is_parameter: bool,
    track_work: bool,
}

impl SlidingMassRep {
    fn mass(&self, input: &PointInput<'_>) -> anyhow::Result<f64> {
        let m = if self.mass_is_parameter {
            input.parameters[0]
        } else {
            self.mass
        };
        if m <= 0.0 {
            anyhow::bail!("mass must be positive, got {m}");
        }
        Ok(m)
    }
}

impl ProblemRep for SlidingMassRep {
    fn dynamics(&mut self, input: &PointInput<'_>, out: &mut [f64]) -> anyhow::Result<()> {
        let force = input.controls[0];
        out[0] = force / self.mass(input)?;
        if self.track_work {
            out[1] = force * input.states[1];
        }
        Ok(())
    }

    fn integral_cost_integrand(&mut self, input: &PointInput<'_>) -> anyhow::Result<f64> {
        Ok(input.controls[0] * input.controls[0])
    }
}

impl ContinuousProblem for SlidingMass {
    fn info(&self) -> &ProblemInfo {
        &self.info
    }

    fn create_rep(&self) -> anyhow::Result<Box<dyn ProblemRep>> {
        Ok(Box::new(SlidingMassRep {
            mass: self.mass,
            mass_is_parameter: self.mass_is_parameter,
            track_work: self.track_work,
        }))
    }
}

// ============================================================================
// PENDULUM
// ============================================================================

/// Torque-driven simple pendulum.
///
/// ```text
/// q̇ = v,   v̇ = (τ - m·g·l·sin q - d·v) / (m·l²),   minimize ∫ τ² dt
/// ```
///
/// The angle is bounded to `[-π, π]`. Boundary conditions are optional so
/// the same model serves guess tests (no boundary conditions) and swing-up
/// solves.
#[derive(Debug, Clone)]
pub struct Pendulum {
    info: ProblemInfo,
    mass: f64,
    length: f64,
    damping: f64,
}

impl Default for Pendulum {
    fn default() -> Self {
        let info = ProblemInfo::new("pendulum")
            .with_time_bounds(Bounds::fixed(0.0), Bounds::fixed(1.0))
            .with_coordinate(
                VariableInfo::new("q", Bounds::new(-PI, PI)),
                VariableInfo::new("v", Bounds::new(-50.0, 50.0)),
            )
            .with_control(VariableInfo::new("tau", Bounds::new(-10.0, 10.0)));
        Self {
            info,
            mass: 1.0,
            length: 1.0,
            damping: 0.0,
        }
    }
}

impl Pendulum {
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Start at rest hanging down and end at rest at angle `target`.
    pub fn with_swing(mut self, target: f64) -> Self {
        let q = &mut self.info.coordinates[0];
        q.initial_bounds = Some(Bounds::fixed(0.0));
        q.final_bounds = Some(Bounds::fixed(target));
        let v = &mut self.info.speeds[0];
        v.initial_bounds = Some(Bounds::fixed(0.0));
        v.final_bounds = Some(Bounds::fixed(0.0));
        self
    }

    /// Bound the mechanical power `|τ·v|` at every mesh point.
    pub fn with_effort_limit(mut self, limit: f64) -> Self {
        self.info = self
            .info
            .with_path_constraint(PathConstraintInfo::new("power", Bounds::new(-limit, limit)));
        self
    }
}

struct PendulumRep {
    mass: f64,
    length: f64,
    damping: f64,
}

impl ProblemRep for PendulumRep {
    fn dynamics(&mut self, input: &PointInput<'_>, out: &mut [f64]) -> anyhow::Result<()> {
        let (q, v) = (input.states[0], input.states[1]);
        let tau = input.controls[0];
        let inertia = self.mass * self.length * self.length;
        out[0] = (tau - self.mass * GRAVITY * self.length * q.sin() - self.damping * v) / inertia;
        Ok(())
    }

    fn integral_cost_integrand(&mut self, input: &PointInput<'_>) -> anyhow::Result<f64> {
        Ok(input.controls[0] * input.controls[0])
    }

    fn path_constraints(&mut self, input: &PointInput<'_>, out: &mut [f64]) -> anyhow::Result<()> {
        if let Some(power) = out.first_mut() {
            *power = input.controls[0] * input.states[1];
        }
        Ok(())
    }
}

impl ContinuousProblem for Pendulum {
    fn info(&self) -> &ProblemInfo {
        &self.info
    }

    fn create_rep(&self) -> anyhow::Result<Box<dyn ProblemRep>> {
        Ok(Box::new(PendulumRep {
            mass: self.mass,
            length: self.length,
            damping: self.damping,
        }))
    }
}

/// Built-in model by name, as used by setup files.
pub fn builtin(name: &str) -> Option<std::sync::Arc<dyn ContinuousProblem>> {
    match name {
        "sliding_mass" => Some(std::sync::Arc::new(SlidingMass::default())),
        "pendulum" => Some(std::sync::Arc::new(Pendulum::default().with_swing(PI / 2.0))),
        _ => None,
    }
}

/// Names accepted by [`builtin`].
pub const BUILTIN_MODELS: &[&str] = &["sliding_mass", "pendulum"];
