//! Index arithmetic for the flat decision vector.
//!
//! ```text
//! x = [ t0, tf, p_0..p_P, (x_0, u_0), (x_1, u_1), ..., (x_{K-1}, u_{K-1}) ]
//! ```

use trajopt_core::{Bounds, Iterate, ProblemInfo, TrajError, TrajResult};

use super::grid::Grid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableLayout {
    pub num_states: usize,
    pub num_controls: usize,
    pub num_parameters: usize,
    pub num_points: usize,
}

impl VariableLayout {
    pub fn new(info: &ProblemInfo, num_points: usize) -> Self {
        Self {
            num_states: info.num_states(),
            num_controls: info.num_controls(),
            num_parameters: info.num_parameters(),
            num_points,
        }
    }

    pub const INITIAL_TIME: usize = 0;
    pub const FINAL_TIME: usize = 1;

    pub fn parameter_offset(&self) -> usize {
        2
    }

    fn point_width(&self) -> usize {
        self.num_states + self.num_controls
    }

    pub fn point_offset(&self, k: usize) -> usize {
        self.parameter_offset() + self.num_parameters + k * self.point_width()
    }

    pub fn state_index(&self, k: usize, i: usize) -> usize {
        self.point_offset(k) + i
    }

    pub fn control_index(&self, k: usize, j: usize) -> usize {
        self.point_offset(k) + self.num_states + j
    }

    pub fn num_variables(&self) -> usize {
        self.point_offset(self.num_points)
    }

    pub fn parameters<'a>(&self, x: &'a [f64]) -> &'a [f64] {
        let p = self.parameter_offset();
        &x[p..p + self.num_parameters]
    }

    pub fn states<'a>(&self, x: &'a [f64], k: usize) -> &'a [f64] {
        let o = self.point_offset(k);
        &x[o..o + self.num_states]
    }

    pub fn controls<'a>(&self, x: &'a [f64], k: usize) -> &'a [f64] {
        let o = self.point_offset(k) + self.num_states;
        &x[o..o + self.num_controls]
    }

    /// Variable bounds `(lower, upper)`. Initial and final bounds tighten
    /// the general bounds at the first and last grid point.
    pub fn bounds(&self, info: &ProblemInfo) -> (Vec<f64>, Vec<f64>) {
        let n = self.num_variables();
        let mut lower = vec![0.0; n];
        let mut upper = vec![0.0; n];
        let mut set = |idx: usize, b: Bounds| {
            lower[idx] = b.lower;
            upper[idx] = b.upper;
        };

        set(Self::INITIAL_TIME, info.initial_time);
        set(Self::FINAL_TIME, info.final_time);
        for (j, p) in info.parameters.iter().enumerate() {
            set(self.parameter_offset() + j, p.bounds);
        }

        let last = self.num_points - 1;
        for k in 0..self.num_points {
            let pick = |v: &trajopt_core::VariableInfo| {
                if k == 0 {
                    v.effective_initial()
                } else if k == last {
                    v.effective_final()
                } else {
                    v.bounds
                }
            };
            for (i, s) in info.states().enumerate() {
                set(self.state_index(k, i), pick(s));
            }
            for (j, c) in info.controls.iter().enumerate() {
                set(self.control_index(k, j), pick(c));
            }
        }
        (lower, upper)
    }

    /// Flatten an iterate already sampled on this grid. Columns are looked
    /// up by name so the iterate's column order does not matter.
    pub fn pack(&self, info: &ProblemInfo, grid: &Grid, iterate: &Iterate) -> TrajResult<Vec<f64>> {
        if iterate.num_times() != self.num_points {
            return Err(TrajError::IncompatibleGuess(format!(
                "iterate has {} samples, grid has {} points",
                iterate.num_times(),
                self.num_points
            )));
        }
        debug_assert_eq!(grid.num_points(), self.num_points);

        let mut x = vec![0.0; self.num_variables()];
        x[Self::INITIAL_TIME] = iterate.initial_time();
        x[Self::FINAL_TIME] = iterate.final_time();

        let column = |names: &[String], name: &str, kind: &str| {
            names.iter().position(|n| n == name).ok_or_else(|| {
                TrajError::IncompatibleGuess(format!("guess has no {kind} '{name}'"))
            })
        };

        for (j, p) in info.parameters.iter().enumerate() {
            let c = column(iterate.parameter_names(), &p.name, "parameter")?;
            x[self.parameter_offset() + j] = iterate.parameters()[c];
        }

        let state_cols = info
            .states()
            .map(|s| column(iterate.state_names(), &s.name, "state"))
            .collect::<TrajResult<Vec<_>>>()?;
        let control_cols = info
            .controls
            .iter()
            .map(|c| column(iterate.control_names(), &c.name, "control"))
            .collect::<TrajResult<Vec<_>>>()?;

        for k in 0..self.num_points {
            let states = iterate.states_at(k);
            for (i, &c) in state_cols.iter().enumerate() {
                x[self.state_index(k, i)] = states[c];
            }
            let controls = iterate.controls_at(k);
            for (j, &c) in control_cols.iter().enumerate() {
                x[self.control_index(k, j)] = controls[c];
            }
        }
        Ok(x)
    }

    /// Rebuild an iterate from a decision vector.
    pub fn unpack(&self, info: &ProblemInfo, grid: &Grid, x: &[f64]) -> TrajResult<Iterate> {
        let t0 = x[Self::INITIAL_TIME];
        let tf = x[Self::FINAL_TIME];
        let states = (0..self.num_points)
            .map(|k| self.states(x, k).to_vec())
            .collect();
        let controls = (0..self.num_points)
            .map(|k| self.controls(x, k).to_vec())
            .collect();
        Iterate::new(
            grid.times(t0, tf),
            info.state_names(),
            states,
            info.control_names(),
            controls,
        )?
        .with_parameters(info.parameter_names(), self.parameters(x).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::grid::{uniform_mesh, TranscriptionScheme};
    use trajopt_core::VariableInfo;

    fn info() -> ProblemInfo {
        ProblemInfo::new("layout")
            .with_time_bounds(Bounds::fixed(0.0), Bounds::new(1.0, 2.0))
            .with_coordinate(
                VariableInfo::new("q", Bounds::new(-1.0, 1.0)).with_initial(Bounds::fixed(0.0)),
                VariableInfo::new("v", Bounds::new(-5.0, 5.0)).with_final(Bounds::fixed(0.0)),
            )
            .with_control(VariableInfo::new("u", Bounds::new(-2.0, 2.0)))
            .with_parameter(VariableInfo::new("m", Bounds::new(0.5, 3.0)))
    }

    #[test]
    fn test_offsets() {
        let layout = VariableLayout::new(&info(), 3);
        assert_eq!(layout.point_offset(0), 3);
        assert_eq!(layout.state_index(1, 1), 3 + 3 + 1);
        assert_eq!(layout.control_index(2, 0), 3 + 6 + 2);
        assert_eq!(layout.num_variables(), 3 + 9);
    }

    #[test]
    fn test_endpoint_bounds_apply_only_at_ends() {
        let info = info();
        let layout = VariableLayout::new(&info, 3);
        let (lo, hi) = layout.bounds(&info);

        assert_eq!((lo[1], hi[1]), (1.0, 2.0));
        assert_eq!((lo[2], hi[2]), (0.5, 3.0));
        // q fixed at the first point only
        assert_eq!((lo[layout.state_index(0, 0)], hi[layout.state_index(0, 0)]), (0.0, 0.0));
        assert_eq!((lo[layout.state_index(1, 0)], hi[layout.state_index(1, 0)]), (-1.0, 1.0));
        // v fixed at the last point only
        assert_eq!((lo[layout.state_index(2, 1)], hi[layout.state_index(2, 1)]), (0.0, 0.0));
        assert_eq!((lo[layout.state_index(0, 1)], hi[layout.state_index(0, 1)]), (-5.0, 5.0));
    }

    #[test]
    fn test_pack_unpack_by_name() {
        let info = info();
        let grid = Grid::new(TranscriptionScheme::Trapezoidal, uniform_mesh(2).unwrap()).unwrap();
        let layout = VariableLayout::new(&info, grid.num_points());

        // Columns deliberately in a different order than the problem.
        let guess = Iterate::new(
            vec![0.0, 0.75, 1.5],
            vec!["v".into(), "q".into()],
            vec![vec![1.0, 0.1], vec![2.0, 0.2], vec![3.0, 0.3]],
            vec!["u".into()],
            vec![vec![-1.0], vec![0.0], vec![1.0]],
        )
        .unwrap()
        .with_parameters(vec!["m".into()], vec![1.25])
        .unwrap();

        let x = layout.pack(&info, &grid, &guess).unwrap();
        assert_eq!(x[VariableLayout::FINAL_TIME], 1.5);
        assert_eq!(layout.states(&x, 1), &[0.2, 2.0]);
        assert_eq!(layout.parameters(&x), &[1.25]);

        let back = layout.unpack(&info, &grid, &x).unwrap();
        assert_eq!(back.state("q").unwrap(), vec![0.1, 0.2, 0.3]);
        assert_eq!(back.time(), &[0.0, 0.75, 1.5]);
    }

    #[test]
    fn test_pack_reports_missing_column() {
        let info = info();
        let grid = Grid::new(TranscriptionScheme::Trapezoidal, uniform_mesh(1).unwrap()).unwrap();
        let layout = VariableLayout::new(&info, 2);
        let guess = Iterate::uniform(0.0, 1.0, 2, vec!["q".into()], vec!["u".into()]).unwrap();
        assert!(matches!(
            layout.pack(&info, &grid, &guess),
            Err(TrajError::IncompatibleGuess(_))
        ));
    }
}
