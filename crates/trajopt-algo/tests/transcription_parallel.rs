//! Parallel grid-point evaluation must not change what the NLP sees.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use trajopt_algo::guess::{fit_to_grid, random_guess};
use trajopt_algo::models::{Pendulum, SlidingMass};
use trajopt_algo::{
    DiscreteProblem, NlpProblem, Parallelism, RepresentationPool, TranscriptionOptions,
    TranscriptionScheme,
};
use trajopt_core::{ContinuousProblem, Diagnostics, PointInput, ProblemInfo, ProblemRep};

fn options(scheme: TranscriptionScheme, parallelism: Parallelism) -> TranscriptionOptions {
    TranscriptionOptions {
        scheme,
        num_mesh_intervals: 12,
        parallelism,
        ..Default::default()
    }
}

/// Objective and constraints at a fixed random point.
fn evaluate_at_random_point(
    problem: Arc<dyn ContinuousProblem>,
    options: &TranscriptionOptions,
) -> (f64, Vec<f64>, Vec<String>) {
    let discrete = DiscreteProblem::from_problem(problem, options).unwrap();
    let info = discrete.info();
    let grid = discrete.grid();
    let mut rng = StdRng::seed_from_u64(2024);
    let guess = random_guess(info, grid.times(0.0, 1.0), &mut rng).unwrap();
    let guess = fit_to_grid(info, grid, &guess, &mut Diagnostics::new()).unwrap();
    let x = discrete.layout().pack(info, grid, &guess).unwrap();

    let mut g = vec![0.0; discrete.num_constraints()];
    let objective = discrete.evaluate(&x, &mut g).unwrap();
    let labels = discrete.labels().iter().map(|l| l.to_string()).collect();
    (objective, g, labels)
}

#[test]
fn constraint_order_is_independent_of_parallelism() {
    for scheme in [
        TranscriptionScheme::Trapezoidal,
        TranscriptionScheme::HermiteSimpson,
    ] {
        let problem: Arc<dyn ContinuousProblem> = Arc::new(
            Pendulum::default()
                .with_damping(0.3)
                .with_effort_limit(5.0),
        );
        let serial = evaluate_at_random_point(
            Arc::clone(&problem),
            &options(scheme, Parallelism::from_setting(0)),
        );
        for setting in [1, 4] {
            let parallel = evaluate_at_random_point(
                Arc::clone(&problem),
                &options(scheme, Parallelism::from_setting(setting)),
            );
            assert_eq!(serial.2, parallel.2, "{scheme} labels, parallel = {setting}");
            assert_eq!(serial.1, parallel.1, "{scheme} constraints, parallel = {setting}");
            assert_eq!(serial.0, parallel.0, "{scheme} objective, parallel = {setting}");
        }
    }
}

#[test]
fn path_constraints_follow_defects() {
    let problem: Arc<dyn ContinuousProblem> = Arc::new(Pendulum::default().with_effort_limit(5.0));
    let (_, _, labels) = evaluate_at_random_point(
        problem,
        &options(TranscriptionScheme::Trapezoidal, Parallelism::Serial),
    );
    // 12 intervals × 2 states of defects, then 13 mesh points of power.
    assert_eq!(labels.len(), 24 + 13);
    assert!(labels[..24].iter().all(|l| l.starts_with("defect")));
    assert!(labels[24..].iter().all(|l| l.starts_with("path")));
    assert_eq!(labels[24], "path[0]:power");
    assert_eq!(labels[36], "path[12]:power");
}

struct Counted {
    inner: SlidingMass,
    built: Arc<AtomicUsize>,
}

impl ContinuousProblem for Counted {
    fn info(&self) -> &ProblemInfo {
        self.inner.info()
    }

    fn create_rep(&self) -> anyhow::Result<Box<dyn ProblemRep>> {
        self.built.fetch_add(1, Ordering::SeqCst);
        self.inner.create_rep()
    }
}

#[test]
fn snapshots_are_bounded_by_workers_and_reused() {
    let built = Arc::new(AtomicUsize::new(0));
    let problem = Arc::new(Counted {
        inner: SlidingMass::default(),
        built: Arc::clone(&built),
    });
    let pool = Arc::new(RepresentationPool::new(problem, 3));
    let discrete = DiscreteProblem::new(
        Arc::clone(&pool),
        &options(TranscriptionScheme::HermiteSimpson, Parallelism::Threads(3)),
    )
    .unwrap();

    let x: Vec<f64> = discrete
        .variable_lower()
        .iter()
        .zip(discrete.variable_upper())
        .map(|(lo, hi)| 0.5 * (lo + hi))
        .collect();
    let mut g = vec![0.0; discrete.num_constraints()];
    for _ in 0..5 {
        discrete.evaluate(&x, &mut g).unwrap();
    }

    let count = built.load(Ordering::SeqCst);
    assert!((1..=3).contains(&count), "built {count} snapshots");
    assert_eq!(pool.created(), count);
    assert_eq!(pool.available(), count);
}

struct FailsAtMidHorizon {
    info: ProblemInfo,
    built: AtomicUsize,
}

impl FailsAtMidHorizon {
    fn new() -> Self {
        Self {
            info: SlidingMass::default().info().clone(),
            built: AtomicUsize::new(0),
        }
    }
}

struct FailsAtMidHorizonRep;

impl ProblemRep for FailsAtMidHorizonRep {
    fn dynamics(&mut self, input: &PointInput<'_>, out: &mut [f64]) -> anyhow::Result<()> {
        if (input.time - 0.5).abs() < 1e-12 {
            anyhow::bail!("singular configuration");
        }
        out[0] = input.controls[0];
        Ok(())
    }
}

impl ContinuousProblem for FailsAtMidHorizon {
    fn info(&self) -> &ProblemInfo {
        &self.info
    }

    fn create_rep(&self) -> anyhow::Result<Box<dyn ProblemRep>> {
        self.built.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FailsAtMidHorizonRep))
    }
}

#[test]
fn evaluation_failure_names_the_grid_point() {
    for parallelism in [Parallelism::Serial, Parallelism::Threads(2)] {
        let discrete = DiscreteProblem::from_problem(
            Arc::new(FailsAtMidHorizon::new()),
            &TranscriptionOptions {
                num_mesh_intervals: 4,
                parallelism,
                ..Default::default()
            },
        )
        .unwrap();
        let mut x = vec![0.0; discrete.num_variables()];
        x[1] = 1.0;
        let mut g = vec![0.0; discrete.num_constraints()];
        let err = discrete.evaluate(&x, &mut g).unwrap_err();
        assert!(
            matches!(err, trajopt_core::TrajError::Evaluation { point: 2, .. }),
            "{err}"
        );
    }
}

#[test]
fn failed_evaluation_discards_its_snapshot() {
    let problem = Arc::new(FailsAtMidHorizon::new());
    let discrete = DiscreteProblem::from_problem(
        problem.clone(),
        &TranscriptionOptions {
            num_mesh_intervals: 4,
            parallelism: Parallelism::Serial,
            ..Default::default()
        },
    )
    .unwrap();
    let mut x = vec![0.0; discrete.num_variables()];
    x[1] = 1.0;
    let mut g = vec![0.0; discrete.num_constraints()];

    assert!(discrete.evaluate(&x, &mut g).is_err());
    assert_eq!(problem.built.load(Ordering::SeqCst), 1);
    assert_eq!(discrete.pool().created(), 0);
    assert_eq!(discrete.pool().available(), 0);

    // The next checkout builds a fresh snapshot instead of reusing the failed one.
    let rep = discrete.pool().acquire().unwrap();
    assert_eq!(problem.built.load(Ordering::SeqCst), 2);
    drop(rep);
    assert_eq!(discrete.pool().available(), 1);
}

#[test]
fn failed_parallel_evaluation_discards_its_snapshot() {
    let problem = Arc::new(FailsAtMidHorizon::new());
    let discrete = DiscreteProblem::from_problem(
        problem.clone(),
        &TranscriptionOptions {
            num_mesh_intervals: 4,
            parallelism: Parallelism::Threads(2),
            ..Default::default()
        },
    )
    .unwrap();
    let mut x = vec![0.0; discrete.num_variables()];
    x[1] = 1.0;
    let mut g = vec![0.0; discrete.num_constraints()];

    assert!(discrete.evaluate(&x, &mut g).is_err());
    let built = problem.built.load(Ordering::SeqCst);
    let alive = discrete.pool().created();
    assert!(built - alive >= 1, "built {built}, alive {alive}");
    assert_eq!(discrete.pool().available(), alive);
}
