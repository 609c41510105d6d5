//! # Direct Collocation Transcription
//!
//! Turns a [`ContinuousProblem`] and a mesh into a finite-dimensional
//! [`NlpProblem`].
//!
//! ## Dynamics
//!
//! With states ordered `x = [q, v, z]` the state derivative is
//!
//! ```text
//! f(t, x, u, p) = [ v,  v̇(t, x, u, p),  ż(t, x, u, p) ]
//!                   └┬┘ └────────── from the model ──────┘
//!                 q̇ = v
//! ```
//!
//! ## Defects
//!
//! For interval `i` with physical width `h = (tf - t0)·(τ_{i+1} - τ_i)`:
//!
//! ```text
//! trapezoidal:      x_{k+1} - x_k - h/2·(f_k + f_{k+1})                = 0
//!
//! hermite-simpson:  x_{k+1} - x_k - h/6·(f_k + 4·f_m + f_{k+1})        = 0
//!                   x_m - (x_k + x_{k+1})/2 - h/8·(f_k - f_{k+1})      = 0
//!                   u_m - (u_k + u_{k+1})/2                            = 0   (optional)
//! ```
//!
//! ## Constraint order
//!
//! ```text
//! [ defects, interval 0 .. N-1 | control midpoints, interval 0 .. N-1 | path, mesh point 0 .. ]
//! ```
//!
//! The order depends only on the problem and the grid, never on how many
//! workers evaluated the points.
//!
//! ## Cost
//!
//! ```text
//! J = φ(t0, x_0, u_0, tf, x_{K-1}, u_{K-1}, p) + (tf - t0)·Σ_k w_k·L_k
//! ```
//!
//! with trapezoidal or Simpson weights `w_k` on the normalized horizon,
//! summed in grid order.
//!
//! ## Parallel evaluation
//!
//! Per-point work (dynamics, integrand, path constraints) runs on a rayon
//! pool sized to the resolved parallelism; each task checks out one
//! snapshot from the [`RepresentationPool`]. Results are collected in grid
//! order and assembled on the calling thread.

pub mod grid;
pub mod layout;

pub use grid::{uniform_mesh, validate_mesh, Grid, TranscriptionScheme};
pub use layout::VariableLayout;

use crate::cache::RepresentationPool;
use crate::nlp::NlpProblem;
use crate::parallel::Parallelism;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;
use tracing::debug;
use trajopt_core::{ContinuousProblem, PointInput, ProblemInfo, ProblemRep, TrajError, TrajResult};

/// How to build the discrete problem.
#[derive(Debug, Clone)]
pub struct TranscriptionOptions {
    pub scheme: TranscriptionScheme,
    /// Used when `mesh` is `None`
    pub num_mesh_intervals: usize,
    /// Normalized mesh overriding `num_mesh_intervals`
    pub mesh: Option<Vec<f64>>,
    pub interpolate_control_midpoints: bool,
    pub parallelism: Parallelism,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            scheme: TranscriptionScheme::Trapezoidal,
            num_mesh_intervals: 100,
            mesh: None,
            interpolate_control_midpoints: true,
            parallelism: Parallelism::Serial,
        }
    }
}

impl TranscriptionOptions {
    pub fn build_grid(&self) -> TrajResult<Grid> {
        let mesh = match &self.mesh {
            Some(mesh) => mesh.clone(),
            None => uniform_mesh(self.num_mesh_intervals)?,
        };
        Grid::new(self.scheme, mesh)
    }
}

/// Which family a constraint row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// Trapezoidal or Simpson defect of one interval
    Defect,
    /// Hermite interpolation defect at an interval midpoint
    InterpolationDefect,
    /// Midpoint control equals the average of the interval's end controls
    ControlMidpoint,
    Path,
}

/// Identity of one constraint row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstraintLabel {
    pub kind: ConstraintKind,
    /// Interval index for defects and control midpoints, grid point index
    /// for path constraints
    pub index: usize,
    /// State, control or path constraint name
    pub name: String,
}

impl std::fmt::Display for ConstraintLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ConstraintKind::Defect => "defect",
            ConstraintKind::InterpolationDefect => "interpolation",
            ConstraintKind::ControlMidpoint => "control_midpoint",
            ConstraintKind::Path => "path",
        };
        write!(f, "{kind}[{}]:{}", self.index, self.name)
    }
}

/// Everything computed at one grid point.
#[derive(Debug, Clone, Default)]
struct PointEval {
    /// Full state derivative `[v, v̇, ż]`
    derivatives: Vec<f64>,
    integrand: f64,
    /// Empty for points where path constraints are not enforced
    path: Vec<f64>,
}

/// The transcribed problem for one solve.
pub struct DiscreteProblem {
    info: ProblemInfo,
    pool: Arc<RepresentationPool>,
    grid: Grid,
    layout: VariableLayout,
    interpolate_controls: bool,
    workers: Option<ThreadPool>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    constraint_lower: Vec<f64>,
    constraint_upper: Vec<f64>,
    labels: Vec<ConstraintLabel>,
}

impl DiscreteProblem {
    /// Validate the problem and lay out variables and constraints. No model
    /// evaluation happens here.
    pub fn new(pool: Arc<RepresentationPool>, options: &TranscriptionOptions) -> TrajResult<Self> {
        let info = pool.problem().info().clone();
        info.validate()?;

        let grid = options.build_grid()?;
        let layout = VariableLayout::new(&info, grid.num_points());
        let (lower, upper) = layout.bounds(&info);
        let interpolate_controls = options.interpolate_control_midpoints
            && grid.scheme() == TranscriptionScheme::HermiteSimpson;

        let labels = build_labels(&info, &grid, interpolate_controls);
        let (constraint_lower, constraint_upper) = constraint_bounds(&info, &labels);

        let workers = match options.parallelism {
            Parallelism::Serial => None,
            Parallelism::Threads(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("trajopt-eval-{i}"))
                    .build()
                    .map_err(|e| TrajError::Config(format!("building rayon thread pool: {e}")))?,
            ),
        };

        debug!(
            problem = %info.name,
            scheme = %grid.scheme(),
            points = grid.num_points(),
            variables = layout.num_variables(),
            constraints = labels.len(),
            parallelism = %options.parallelism,
            "transcribed problem"
        );

        Ok(Self {
            info,
            pool,
            grid,
            layout,
            interpolate_controls,
            workers,
            lower,
            upper,
            constraint_lower,
            constraint_upper,
            labels,
        })
    }

    /// Convenience constructor that builds its own snapshot pool.
    pub fn from_problem(
        problem: Arc<dyn ContinuousProblem>,
        options: &TranscriptionOptions,
    ) -> TrajResult<Self> {
        let pool = Arc::new(RepresentationPool::new(
            problem,
            options.parallelism.workers(),
        ));
        Self::new(pool, options)
    }

    pub fn info(&self) -> &ProblemInfo {
        &self.info
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    pub fn labels(&self) -> &[ConstraintLabel] {
        &self.labels
    }

    pub fn pool(&self) -> &Arc<RepresentationPool> {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    fn point_input<'a>(&self, x: &'a [f64], k: usize) -> PointInput<'a> {
        let t0 = x[VariableLayout::INITIAL_TIME];
        let tf = x[VariableLayout::FINAL_TIME];
        PointInput {
            time: t0 + (tf - t0) * self.grid.points()[k],
            states: self.layout.states(x, k),
            controls: self.layout.controls(x, k),
            parameters: self.layout.parameters(x),
        }
    }

    fn evaluate_point(
        &self,
        rep: &mut dyn ProblemRep,
        x: &[f64],
        k: usize,
    ) -> anyhow::Result<PointEval> {
        let input = self.point_input(x, k);
        let nq = self.info.num_coordinates();

        let mut derivatives = vec![0.0; self.layout.num_states];
        derivatives[..nq].copy_from_slice(&input.states[nq..2 * nq]);
        rep.dynamics(&input, &mut derivatives[nq..])?;

        let integrand = rep.integral_cost_integrand(&input)?;

        let path = if self.grid.is_mesh_point(k) && self.info.num_path_constraints() > 0 {
            let mut values = vec![0.0; self.info.num_path_constraints()];
            rep.path_constraints(&input, &mut values)?;
            values
        } else {
            Vec::new()
        };

        Ok(PointEval {
            derivatives,
            integrand,
            path,
        })
    }

    /// Evaluate one grid point on a checked-out snapshot. A snapshot that
    /// raised is discarded rather than returned to the pool.
    fn evaluate_checked_out(&self, x: &[f64], k: usize) -> TrajResult<PointEval> {
        let mut rep = self.pool.acquire()?;
        match self.evaluate_point(&mut *rep, x, k) {
            Ok(eval) => Ok(eval),
            Err(err) => {
                self.pool.discard(rep);
                Err(TrajError::Evaluation {
                    point: k,
                    message: format!("{err:#}"),
                })
            }
        }
    }

    fn evaluate_points(&self, x: &[f64]) -> TrajResult<Vec<PointEval>> {
        let k = self.grid.num_points();
        match &self.workers {
            Some(pool) => pool.install(|| {
                (0..k)
                    .into_par_iter()
                    .map(|i| self.evaluate_checked_out(x, i))
                    .collect()
            }),
            None => (0..k).map(|i| self.evaluate_checked_out(x, i)).collect(),
        }
    }

    fn endpoint_cost(&self, x: &[f64]) -> TrajResult<f64> {
        let last = self.grid.num_points() - 1;
        let mut rep = self.pool.acquire()?;
        let initial = self.point_input(x, 0);
        let final_ = self.point_input(x, last);
        match rep.endpoint_cost(&initial, &final_) {
            Ok(cost) => Ok(cost),
            Err(err) => {
                self.pool.discard(rep);
                Err(TrajError::Evaluation {
                    point: last,
                    message: format!("endpoint cost: {err:#}"),
                })
            }
        }
    }

    fn cost_from(&self, x: &[f64], evals: &[PointEval]) -> TrajResult<f64> {
        let duration = x[VariableLayout::FINAL_TIME] - x[VariableLayout::INITIAL_TIME];
        let quadrature: f64 = evals
            .iter()
            .zip(self.grid.weights())
            .map(|(e, w)| w * e.integrand)
            .sum();
        Ok(self.endpoint_cost(x)? + duration * quadrature)
    }

    fn assemble_constraints(&self, x: &[f64], evals: &[PointEval], out: &mut [f64]) {
        let ns = self.layout.num_states;
        let nc = self.layout.num_controls;
        let duration = x[VariableLayout::FINAL_TIME] - x[VariableLayout::INITIAL_TIME];
        let mesh = self.grid.mesh();
        let mut row = 0;

        for i in 0..self.grid.num_intervals() {
            let h = duration * (mesh[i + 1] - mesh[i]);
            let (a, mid, b) = self.grid.interval_points(i);
            let (xa, xb) = (self.layout.states(x, a), self.layout.states(x, b));
            let (fa, fb) = (&evals[a].derivatives, &evals[b].derivatives);

            match mid {
                None => {
                    for s in 0..ns {
                        out[row] = xb[s] - xa[s] - 0.5 * h * (fa[s] + fb[s]);
                        row += 1;
                    }
                }
                Some(m) => {
                    let xm = self.layout.states(x, m);
                    let fm = &evals[m].derivatives;
                    for s in 0..ns {
                        out[row] = xb[s] - xa[s] - h / 6.0 * (fa[s] + 4.0 * fm[s] + fb[s]);
                        row += 1;
                    }
                    for s in 0..ns {
                        out[row] = xm[s] - 0.5 * (xa[s] + xb[s]) - h / 8.0 * (fa[s] - fb[s]);
                        row += 1;
                    }
                }
            }
        }

        if self.interpolate_controls {
            for i in 0..self.grid.num_intervals() {
                let (a, mid, b) = self.grid.interval_points(i);
                if let Some(m) = mid {
                    let (ua, um, ub) = (
                        self.layout.controls(x, a),
                        self.layout.controls(x, m),
                        self.layout.controls(x, b),
                    );
                    for j in 0..nc {
                        out[row] = um[j] - 0.5 * (ua[j] + ub[j]);
                        row += 1;
                    }
                }
            }
        }

        for eval in evals {
            for &value in &eval.path {
                out[row] = value;
                row += 1;
            }
        }

        debug_assert_eq!(row, out.len());
    }
}

fn build_labels(info: &ProblemInfo, grid: &Grid, interpolate_controls: bool) -> Vec<ConstraintLabel> {
    let state_names = info.state_names();
    let mut labels = Vec::new();

    for i in 0..grid.num_intervals() {
        let (_, mid, _) = grid.interval_points(i);
        let mut push = |kind| {
            labels.extend(state_names.iter().map(|name| ConstraintLabel {
                kind,
                index: i,
                name: name.clone(),
            }))
        };
        push(ConstraintKind::Defect);
        if mid.is_some() {
            push(ConstraintKind::InterpolationDefect);
        }
    }

    if interpolate_controls {
        for i in 0..grid.num_intervals() {
            labels.extend(info.controls.iter().map(|c| ConstraintLabel {
                kind: ConstraintKind::ControlMidpoint,
                index: i,
                name: c.name.clone(),
            }));
        }
    }

    for k in (0..grid.num_points()).filter(|&k| grid.is_mesh_point(k)) {
        labels.extend(info.path_constraints.iter().map(|pc| ConstraintLabel {
            kind: ConstraintKind::Path,
            index: k,
            name: pc.name.clone(),
        }));
    }

    labels
}

/// Defects and midpoint rows are equalities; path rows take the declared
/// bounds, cycling through the declarations once per mesh point.
fn constraint_bounds(info: &ProblemInfo, labels: &[ConstraintLabel]) -> (Vec<f64>, Vec<f64>) {
    let mut lower = vec![0.0; labels.len()];
    let mut upper = vec![0.0; labels.len()];
    let declared = &info.path_constraints;
    let path_rows = labels
        .iter()
        .enumerate()
        .filter(|(_, l)| l.kind == ConstraintKind::Path)
        .map(|(row, _)| row);
    for (n, row) in path_rows.enumerate() {
        let bounds = declared[n % declared.len()].bounds;
        lower[row] = bounds.lower;
        upper[row] = bounds.upper;
    }
    (lower, upper)
}

impl NlpProblem for DiscreteProblem {
    fn num_variables(&self) -> usize {
        self.layout.num_variables()
    }

    fn num_constraints(&self) -> usize {
        self.labels.len()
    }

    fn variable_lower(&self) -> &[f64] {
        &self.lower
    }

    fn variable_upper(&self) -> &[f64] {
        &self.upper
    }

    fn constraint_lower(&self) -> &[f64] {
        &self.constraint_lower
    }

    fn constraint_upper(&self) -> &[f64] {
        &self.constraint_upper
    }

    fn objective(&self, x: &[f64]) -> TrajResult<f64> {
        let evals = self.evaluate_points(x)?;
        self.cost_from(x, &evals)
    }

    fn constraints(&self, x: &[f64], out: &mut [f64]) -> TrajResult<()> {
        let evals = self.evaluate_points(x)?;
        self.assemble_constraints(x, &evals, out);
        Ok(())
    }

    fn evaluate(&self, x: &[f64], constraints: &mut [f64]) -> TrajResult<f64> {
        let evals = self.evaluate_points(x)?;
        self.assemble_constraints(x, &evals, constraints);
        self.cost_from(x, &evals)
    }
}

impl std::fmt::Debug for DiscreteProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscreteProblem")
            .field("problem", &self.info.name)
            .field("scheme", &self.grid.scheme())
            .field("points", &self.grid.num_points())
            .field("variables", &self.layout.num_variables())
            .field("constraints", &self.labels.len())
            .finish()
    }
}
