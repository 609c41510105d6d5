//! Initial guesses: synthesis, storage, lazy file loading and fitting.
//!
//! A guess comes from one of three places, in priority order:
//!
//! 1. an iterate handed over through the API ([`GuessManager::set_guess`])
//! 2. a guess file ([`GuessManager::set_guess_file`]), read on first use and
//!    cached until the path changes
//! 3. nothing, in which case the solver synthesizes a bounds guess
//!
//! Whatever the source, [`fit_to_grid`] maps the guess onto the solver's grid
//! by variable name and linear interpolation, so the guess's sample count is
//! independent of the mesh.

use once_cell::sync::OnceCell;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};
use trajopt_core::{
    Bounds, Diagnostics, Iterate, PointInput, ProblemInfo, ProblemRep, TrajError, TrajResult,
    VariableInfo,
};

use crate::transcription::Grid;

/// Strategy for synthesizing a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuessKind {
    /// Midpoint of each variable's bounds (the bound itself when one-sided)
    #[default]
    Bounds,
    /// Uniform samples within the bounds
    Random,
    /// Forward simulation under bounds-midpoint controls. Not reliable:
    /// the simulated states often leave their bounds.
    TimeStepping,
}

impl FromStr for GuessKind {
    type Err = TrajError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bounds" => Ok(GuessKind::Bounds),
            "random" => Ok(GuessKind::Random),
            "time-stepping" | "time_stepping" => Ok(GuessKind::TimeStepping),
            other => Err(TrajError::Config(format!(
                "unknown guess type '{other}' (expected bounds, random or time-stepping)"
            ))),
        }
    }
}

impl std::fmt::Display for GuessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuessKind::Bounds => write!(f, "bounds"),
            GuessKind::Random => write!(f, "random"),
            GuessKind::TimeStepping => write!(f, "time-stepping"),
        }
    }
}

// ============================================================================
// STORAGE
// ============================================================================

/// A field that comes back empty when its owner is cloned.
#[derive(Debug, Default)]
pub struct ResetOnClone<T: Default>(pub T);

impl<T: Default> Clone for ResetOnClone<T> {
    fn clone(&self) -> Self {
        Self(T::default())
    }
}

impl<T: Default> std::ops::Deref for ResetOnClone<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Holds the configured guess.
///
/// Cloning keeps the API guess and the file path but drops whatever was
/// loaded from the file; the clone reloads it on demand.
#[derive(Debug, Clone, Default)]
pub struct GuessManager {
    from_api: Option<Iterate>,
    /// Strategy that produced `from_api`, when it was synthesized.
    api_kind: Option<GuessKind>,
    file: Option<PathBuf>,
    from_file: ResetOnClone<OnceCell<Iterate>>,
}

impl GuessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an API guess. Clears any guess file.
    pub fn set_guess(&mut self, guess: Iterate) {
        self.from_api = Some(guess);
        self.api_kind = None;
        self.file = None;
        self.from_file = ResetOnClone::default();
    }

    /// Record a guess file without reading it. An empty path clears the
    /// file. Either way any API guess is dropped.
    pub fn set_guess_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.file = if path.as_os_str().is_empty() {
            None
        } else {
            Some(path.to_path_buf())
        };
        self.from_api = None;
        self.api_kind = None;
        self.from_file = ResetOnClone::default();
    }

    /// Forget the API guess and the guess file.
    pub fn clear_guess(&mut self) {
        self.from_api = None;
        self.api_kind = None;
        self.file = None;
        self.from_file = ResetOnClone::default();
    }

    /// Install a guess synthesized with `kind`, as [`set_guess`](Self::set_guess).
    pub fn set_created_guess(&mut self, kind: GuessKind, guess: Iterate) {
        self.set_guess(guess);
        self.api_kind = Some(kind);
    }

    /// Strategy behind the API guess, if it was synthesized.
    pub fn api_guess_kind(&self) -> Option<GuessKind> {
        self.api_kind
    }

    pub fn guess_file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn api_guess(&self) -> Option<&Iterate> {
        self.from_api.as_ref()
    }

    /// Whether the guess file has been read into the cache.
    pub fn is_file_loaded(&self) -> bool {
        self.from_file.get().is_some()
    }

    pub fn is_configured(&self) -> bool {
        self.from_api.is_some() || self.file.is_some()
    }

    /// The configured guess, reading the file on first access.
    ///
    /// `Ok(None)` means nothing is configured and the caller should use a
    /// default; `Err(GuessLoad)` means a file is configured but unusable.
    pub fn configured(&self) -> TrajResult<Option<&Iterate>> {
        if let Some(guess) = &self.from_api {
            return Ok(Some(guess));
        }
        let Some(path) = &self.file else {
            return Ok(None);
        };
        self.from_file
            .get_or_try_init(|| {
                debug!(path = %path.display(), "loading guess file");
                Iterate::read_csv(path).map_err(|err| TrajError::GuessLoad {
                    path: path.clone(),
                    message: err.to_string(),
                })
            })
            .map(Some)
    }

    /// Like [`configured`](Self::configured) but treats "nothing
    /// configured" as [`TrajError::NoGuess`].
    pub fn require_guess(&self) -> TrajResult<&Iterate> {
        self.configured()?.ok_or(TrajError::NoGuess)
    }
}

/// Relative tolerance for treating guess times as grid times.
const GRID_TIME_TOLERANCE: f64 = 1e-9;

// ============================================================================
// SYNTHESIS
// ============================================================================

/// Representative horizon `(t0, tf)` for synthesized guesses: the time
/// bounds' midpoints, widened to a unit span if they coincide.
pub fn guess_horizon(info: &ProblemInfo) -> (f64, f64) {
    let t0 = info.initial_time.midpoint();
    let mut tf = info.final_time.midpoint();
    if tf <= t0 {
        tf = info.final_time.clamp(t0 + 1.0);
        if tf <= t0 {
            tf = t0 + 1.0;
        }
    }
    (t0, tf)
}

/// Bounds at sample `k` of `n`: initial/final bounds at the ends when the
/// variable declares them.
fn bounds_at(var: &VariableInfo, k: usize, n: usize) -> Bounds {
    if k == 0 {
        var.effective_initial()
    } else if k + 1 == n {
        var.effective_final()
    } else {
        var.bounds
    }
}

fn synthesize(
    info: &ProblemInfo,
    times: Vec<f64>,
    mut value: impl FnMut(Bounds) -> f64,
) -> TrajResult<Iterate> {
    let n = times.len();
    let states = (0..n)
        .map(|k| info.states().map(|s| value(bounds_at(s, k, n))).collect())
        .collect();
    let controls = (0..n)
        .map(|k| info.controls.iter().map(|c| value(bounds_at(c, k, n))).collect())
        .collect();
    let parameters = info.parameters.iter().map(|p| value(p.bounds)).collect();

    Iterate::new(
        times,
        info.state_names(),
        states,
        info.control_names(),
        controls,
    )?
    .with_parameters(info.parameter_names(), parameters)
}

/// Every variable at its bounds midpoint, or at its single finite bound.
pub fn bounds_guess(info: &ProblemInfo, times: Vec<f64>) -> TrajResult<Iterate> {
    synthesize(info, times, |b| b.midpoint())
}

/// Uniform sample from `[lo, hi]`; one-sided bounds sample a unit interval
/// on the feasible side, unbounded variables sample `[-1, 1]`.
pub fn sample_within<R: Rng>(bounds: Bounds, rng: &mut R) -> f64 {
    match (bounds.has_lower(), bounds.has_upper()) {
        (true, true) if bounds.is_fixed() => bounds.lower,
        (true, true) => rng.gen_range(bounds.lower..=bounds.upper),
        (true, false) => bounds.lower + rng.gen::<f64>(),
        (false, true) => bounds.upper - rng.gen::<f64>(),
        (false, false) => rng.gen_range(-1.0..=1.0),
    }
}

/// Every variable sampled independently within its bounds.
pub fn random_guess<R: Rng>(
    info: &ProblemInfo,
    times: Vec<f64>,
    rng: &mut R,
) -> TrajResult<Iterate> {
    synthesize(info, times, |b| sample_within(b, rng))
}

/// Integrate the dynamics with classic RK4 from the bounds-guess initial
/// state, holding controls and parameters at their bounds midpoints.
pub fn time_stepping_guess(
    info: &ProblemInfo,
    times: Vec<f64>,
    rep: &mut dyn ProblemRep,
) -> TrajResult<Iterate> {
    let mut guess = bounds_guess(info, times)?;
    let nq = info.num_coordinates();
    let ns = info.num_states();
    let parameters = guess.parameters().to_vec();
    let controls: Vec<Vec<f64>> = (0..guess.num_times())
        .map(|k| guess.controls_at(k).to_vec())
        .collect();

    let mut f = |t: f64, x: &[f64], u: &[f64], point: usize| -> TrajResult<Vec<f64>> {
        let mut dx = vec![0.0; ns];
        dx[..nq].copy_from_slice(&x[nq..2 * nq]);
        let input = PointInput {
            time: t,
            states: x,
            controls: u,
            parameters: &parameters,
        };
        rep.dynamics(&input, &mut dx[nq..])
            .map_err(|err| TrajError::Evaluation {
                point,
                message: format!("{err:#}"),
            })?;
        Ok(dx)
    };

    let axpy = |x: &[f64], a: f64, d: &[f64]| -> Vec<f64> {
        x.iter().zip(d).map(|(xi, di)| xi + a * di).collect()
    };

    let time = guess.time().to_vec();
    let mut x = guess.states_at(0).to_vec();
    for k in 0..time.len() - 1 {
        let (t, h) = (time[k], time[k + 1] - time[k]);
        // Midpoint control for the half steps.
        let um: Vec<f64> = controls[k]
            .iter()
            .zip(&controls[k + 1])
            .map(|(a, b)| 0.5 * (a + b))
            .collect();
        let k1 = f(t, &x, &controls[k], k)?;
        let k2 = f(t + 0.5 * h, &axpy(&x, 0.5 * h, &k1), &um, k)?;
        let k3 = f(t + 0.5 * h, &axpy(&x, 0.5 * h, &k2), &um, k)?;
        let k4 = f(t + h, &axpy(&x, h, &k3), &controls[k + 1], k + 1)?;
        for i in 0..ns {
            x[i] += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(TrajError::Evaluation {
                point: k + 1,
                message: "forward simulation diverged".into(),
            });
        }
        guess.states_at_mut(k + 1).copy_from_slice(&x);
    }
    Ok(guess)
}

// ============================================================================
// FITTING
// ============================================================================

/// Resample `guess` onto `grid` and check it names every problem variable.
///
/// The guess keeps its own horizon; grid points are placed on it by their
/// normalized position. Columns the problem does not know are ignored and
/// reported in `diagnostics`.
///
/// A guess whose times already sit on the grid is used as is. Any other
/// guess is interpolated, even when the sample count matches.
pub fn fit_to_grid(
    info: &ProblemInfo,
    grid: &Grid,
    guess: &Iterate,
    diagnostics: &mut Diagnostics,
) -> TrajResult<Iterate> {
    let missing: Vec<&str> = info
        .states()
        .filter(|s| !guess.state_names().contains(&s.name))
        .chain(
            info.controls
                .iter()
                .filter(|c| !guess.control_names().contains(&c.name)),
        )
        .chain(
            info.parameters
                .iter()
                .filter(|p| !guess.parameter_names().contains(&p.name)),
        )
        .map(|v| v.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(TrajError::IncompatibleGuess(format!(
            "guess is missing {}",
            missing.join(", ")
        )));
    }

    let known: HashSet<&str> = info
        .states()
        .chain(info.controls.iter())
        .chain(info.parameters.iter())
        .map(|v| v.name.as_str())
        .collect();
    for extra in guess
        .state_names()
        .iter()
        .chain(guess.control_names())
        .chain(guess.parameter_names())
        .filter(|name| !known.contains(name.as_str()))
    {
        warn!(column = %extra, "guess column does not match any problem variable; ignoring");
        diagnostics.warn_about("guess", "column ignored: no such problem variable", extra);
    }

    let (t0, tf) = if guess.num_times() > 1 {
        (guess.initial_time(), guess.final_time())
    } else {
        guess_horizon(info)
    };
    let target = grid.times(t0, tf);
    let on_grid = guess.num_times() == target.len()
        && guess
            .time()
            .iter()
            .zip(&target)
            .all(|(a, b)| (a - b).abs() <= GRID_TIME_TOLERANCE * (tf - t0).abs().max(1.0));
    let fitted = if on_grid {
        guess.clone()
    } else {
        debug!(
            from = guess.num_times(),
            to = grid.num_points(),
            "interpolating guess onto grid"
        );
        guess.resample(&target)?
    };
    Ok(fitted)
}
