//! Time-sampled trajectories used as guesses and solutions.
//!
//! An [`Iterate`] stores named state and control columns sampled at strictly
//! increasing times, plus time-invariant parameter values. Its length is
//! independent of any mesh; [`Iterate::resample`] linearly interpolates it
//! onto whatever times the solver needs.
//!
//! ## File format
//!
//! Iterates are stored as CSV with one row per sample:
//!
//! ```text
//! time,state:q,state:v,control:tau,parameter:mass
//! 0.0,0.0,0.0,1.5,2.0
//! 0.5,0.1,0.4,1.1,2.0
//! ```
//!
//! Parameter columns repeat their constant value on every row.

use crate::error::{TrajError, TrajResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;

const TIME_COLUMN: &str = "time";
const STATE_PREFIX: &str = "state";
const CONTROL_PREFIX: &str = "control";
const PARAMETER_PREFIX: &str = "parameter";

/// Named, time-sampled trajectory of states and controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iterate {
    time: Vec<f64>,
    state_names: Vec<String>,
    control_names: Vec<String>,
    parameter_names: Vec<String>,
    /// One row per time sample.
    states: Vec<Vec<f64>>,
    /// One row per time sample.
    controls: Vec<Vec<f64>>,
    parameters: Vec<f64>,
}

impl Iterate {
    /// Build an iterate, checking that times are finite and strictly
    /// increasing and that every row matches its column names.
    pub fn new(
        time: Vec<f64>,
        state_names: Vec<String>,
        states: Vec<Vec<f64>>,
        control_names: Vec<String>,
        controls: Vec<Vec<f64>>,
    ) -> TrajResult<Self> {
        let iterate = Self {
            time,
            state_names,
            control_names,
            parameter_names: Vec::new(),
            states,
            controls,
            parameters: Vec::new(),
        };
        iterate.validate()?;
        Ok(iterate)
    }

    /// Zero-filled iterate with `num_times` samples evenly spread on
    /// `[initial_time, final_time]`.
    pub fn uniform(
        initial_time: f64,
        final_time: f64,
        num_times: usize,
        state_names: Vec<String>,
        control_names: Vec<String>,
    ) -> TrajResult<Self> {
        let time = linspace(initial_time, final_time, num_times)?;
        let states = vec![vec![0.0; state_names.len()]; time.len()];
        let controls = vec![vec![0.0; control_names.len()]; time.len()];
        Self::new(time, state_names, states, control_names, controls)
    }

    /// Attach time-invariant parameter values.
    pub fn with_parameters(mut self, names: Vec<String>, values: Vec<f64>) -> TrajResult<Self> {
        if names.len() != values.len() {
            return Err(TrajError::Config(format!(
                "{} parameter names but {} values",
                names.len(),
                values.len()
            )));
        }
        self.parameter_names = names;
        self.parameters = values;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> TrajResult<()> {
        if self.time.is_empty() {
            return Err(TrajError::Config("iterate must have at least one time".into()));
        }
        if self.time.iter().any(|t| !t.is_finite()) {
            return Err(TrajError::Config("iterate times must be finite".into()));
        }
        if let Some(w) = self.time.windows(2).find(|w| w[1] <= w[0]) {
            return Err(TrajError::Config(format!(
                "iterate times must be strictly increasing ({} followed by {})",
                w[0], w[1]
            )));
        }
        check_rows("state", &self.state_names, &self.states, self.time.len())?;
        check_rows("control", &self.control_names, &self.controls, self.time.len())?;

        let mut seen = HashSet::new();
        for name in self
            .state_names
            .iter()
            .chain(self.control_names.iter())
            .chain(self.parameter_names.iter())
        {
            if !seen.insert(name.as_str()) {
                return Err(TrajError::Config(format!(
                    "duplicate iterate column '{name}'"
                )));
            }
        }
        Ok(())
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn num_times(&self) -> usize {
        self.time.len()
    }

    pub fn initial_time(&self) -> f64 {
        self.time[0]
    }

    pub fn final_time(&self) -> f64 {
        self.time[self.time.len() - 1]
    }

    pub fn state_names(&self) -> &[String] {
        &self.state_names
    }

    pub fn control_names(&self) -> &[String] {
        &self.control_names
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    /// State row at sample `index`.
    pub fn states_at(&self, index: usize) -> &[f64] {
        &self.states[index]
    }

    /// Control row at sample `index`.
    pub fn controls_at(&self, index: usize) -> &[f64] {
        &self.controls[index]
    }

    pub fn states_at_mut(&mut self, index: usize) -> &mut [f64] {
        &mut self.states[index]
    }

    pub fn controls_at_mut(&mut self, index: usize) -> &mut [f64] {
        &mut self.controls[index]
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        let idx = self.parameter_names.iter().position(|n| n == name)?;
        Some(self.parameters[idx])
    }

    /// Values of one state over time.
    pub fn state(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.state_names.iter().position(|n| n == name)?;
        Some(self.states.iter().map(|row| row[idx]).collect())
    }

    /// Values of one control over time.
    pub fn control(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.control_names.iter().position(|n| n == name)?;
        Some(self.controls.iter().map(|row| row[idx]).collect())
    }

    /// Overwrite one state column.
    pub fn set_state(&mut self, name: &str, values: &[f64]) -> TrajResult<()> {
        let idx = column_index("state", &self.state_names, name)?;
        set_column(&mut self.states, idx, values)
    }

    /// Overwrite one control column.
    pub fn set_control(&mut self, name: &str, values: &[f64]) -> TrajResult<()> {
        let idx = column_index("control", &self.control_names, name)?;
        set_column(&mut self.controls, idx, values)
    }

    pub fn set_parameter(&mut self, name: &str, value: f64) -> TrajResult<()> {
        let idx = column_index("parameter", &self.parameter_names, name)?;
        self.parameters[idx] = value;
        Ok(())
    }

    /// Linearly interpolate onto `new_time`. Times outside the sampled
    /// range take the nearest sample value. A single-sample iterate
    /// resamples to a constant trajectory.
    pub fn resample(&self, new_time: &[f64]) -> TrajResult<Iterate> {
        let states = new_time
            .iter()
            .map(|&t| interpolate_row(&self.time, &self.states, t))
            .collect();
        let controls = new_time
            .iter()
            .map(|&t| interpolate_row(&self.time, &self.controls, t))
            .collect();
        let mut out = Iterate::new(
            new_time.to_vec(),
            self.state_names.clone(),
            states,
            self.control_names.clone(),
            controls,
        )?;
        out.parameter_names = self.parameter_names.clone();
        out.parameters = self.parameters.clone();
        Ok(out)
    }

    /// Resample onto `num_times` evenly spaced samples over this iterate's
    /// own time range.
    pub fn resample_uniform(&self, num_times: usize) -> TrajResult<Iterate> {
        let time = if self.num_times() == 1 {
            // A single sample carries no duration; spread over a unit span.
            linspace(self.initial_time(), self.initial_time() + 1.0, num_times)?
        } else {
            linspace(self.initial_time(), self.final_time(), num_times)?
        };
        self.resample(&time)
    }

    // ------------------------------------------------------------------
    // CSV I/O
    // ------------------------------------------------------------------

    /// Write the iterate as CSV to any writer.
    pub fn write_to<W: Write>(&self, writer: W) -> TrajResult<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec![TIME_COLUMN.to_string()];
        header.extend(self.state_names.iter().map(|n| format!("{STATE_PREFIX}:{n}")));
        header.extend(
            self.control_names
                .iter()
                .map(|n| format!("{CONTROL_PREFIX}:{n}")),
        );
        header.extend(
            self.parameter_names
                .iter()
                .map(|n| format!("{PARAMETER_PREFIX}:{n}")),
        );
        wtr.write_record(&header)?;

        for k in 0..self.num_times() {
            let mut record = Vec::with_capacity(header.len());
            record.push(self.time[k].to_string());
            record.extend(self.states[k].iter().map(|v| v.to_string()));
            record.extend(self.controls[k].iter().map(|v| v.to_string()));
            record.extend(self.parameters.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write the iterate to a CSV file.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> TrajResult<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_to(file)
    }

    /// Parse an iterate from CSV.
    pub fn read_from<R: Read>(reader: R) -> TrajResult<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let header = rdr.headers()?.clone();

        if header.get(0) != Some(TIME_COLUMN) {
            return Err(TrajError::Parse(format!(
                "first column must be '{TIME_COLUMN}'"
            )));
        }

        enum Column {
            State,
            Control,
            Parameter,
        }

        let mut kinds = Vec::with_capacity(header.len());
        let mut state_names = Vec::new();
        let mut control_names = Vec::new();
        let mut parameter_names = Vec::new();
        for label in header.iter().skip(1) {
            let (prefix, name) = label.split_once(':').ok_or_else(|| {
                TrajError::Parse(format!(
                    "column '{label}' must be prefixed with state:, control: or parameter:"
                ))
            })?;
            match prefix {
                STATE_PREFIX => {
                    kinds.push(Column::State);
                    state_names.push(name.to_string());
                }
                CONTROL_PREFIX => {
                    kinds.push(Column::Control);
                    control_names.push(name.to_string());
                }
                PARAMETER_PREFIX => {
                    kinds.push(Column::Parameter);
                    parameter_names.push(name.to_string());
                }
                other => {
                    return Err(TrajError::Parse(format!(
                        "unknown column kind '{other}' in '{label}'"
                    )))
                }
            }
        }

        let mut time = Vec::new();
        let mut states = Vec::new();
        let mut controls = Vec::new();
        let mut parameters: Option<Vec<f64>> = None;

        for (row_idx, record) in rdr.records().enumerate() {
            let record = record?;
            if record.len() != header.len() {
                return Err(TrajError::Parse(format!(
                    "row {} has {} fields, expected {}",
                    row_idx + 1,
                    record.len(),
                    header.len()
                )));
            }
            let values = record
                .iter()
                .zip(header.iter())
                .map(|(field, label)| {
                    let value = field.parse::<f64>().map_err(|e| {
                        TrajError::Parse(format!(
                            "row {}: '{}' is not a number ({e})",
                            row_idx + 1,
                            field
                        ))
                    })?;
                    if !value.is_finite() {
                        return Err(TrajError::Parse(format!(
                            "row {}: column '{label}' is not finite ({field})",
                            row_idx + 1
                        )));
                    }
                    Ok(value)
                })
                .collect::<TrajResult<Vec<f64>>>()?;

            time.push(values[0]);
            let mut s = Vec::with_capacity(state_names.len());
            let mut c = Vec::with_capacity(control_names.len());
            let mut p = Vec::with_capacity(parameter_names.len());
            for (kind, value) in kinds.iter().zip(values.iter().skip(1)) {
                match kind {
                    Column::State => s.push(*value),
                    Column::Control => c.push(*value),
                    Column::Parameter => p.push(*value),
                }
            }
            states.push(s);
            controls.push(c);
            match &parameters {
                None => parameters = Some(p),
                Some(first) => {
                    // Parameters are constant over the trajectory.
                    if let Some(i) = (0..p.len()).find(|&i| p[i] != first[i]) {
                        return Err(TrajError::Parse(format!(
                            "row {}: parameter '{}' is {} but row 1 has {}",
                            row_idx + 1,
                            parameter_names[i],
                            p[i],
                            first[i]
                        )));
                    }
                }
            }
        }

        if time.is_empty() {
            return Err(TrajError::Parse("iterate file contains no samples".into()));
        }

        Iterate::new(time, state_names, states, control_names, controls)?
            .with_parameters(parameter_names, parameters.unwrap_or_default())
    }

    /// Read an iterate from a CSV file.
    pub fn read_csv(path: impl AsRef<Path>) -> TrajResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::read_from(file)
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> TrajResult<Vec<f64>> {
    match n {
        0 => Err(TrajError::Config("cannot sample zero times".into())),
        1 => Ok(vec![start]),
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            out[n - 1] = end;
            Ok(out)
        }
    }
}

/// Piecewise-linear interpolation with constant extrapolation.
///
/// `xs` must be strictly increasing and the same length as `ys`.
pub fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    let n = xs.len();
    if n == 1 || x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }
    // First index with xs[i] > x; the bracket is [i - 1, i].
    let i = xs.partition_point(|&xi| xi <= x);
    let (x0, x1) = (xs[i - 1], xs[i]);
    let (y0, y1) = (ys[i - 1], ys[i]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

fn interpolate_row(time: &[f64], rows: &[Vec<f64>], t: f64) -> Vec<f64> {
    let width = rows.first().map_or(0, Vec::len);
    (0..width)
        .map(|j| {
            let column: Vec<f64> = rows.iter().map(|row| row[j]).collect();
            interpolate(time, &column, t)
        })
        .collect()
}

fn check_rows(kind: &str, names: &[String], rows: &[Vec<f64>], num_times: usize) -> TrajResult<()> {
    if rows.len() != num_times {
        return Err(TrajError::Config(format!(
            "{} {kind} rows for {num_times} times",
            rows.len()
        )));
    }
    if let Some((k, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != names.len()) {
        return Err(TrajError::Config(format!(
            "{kind} row {k} has {} values for {} names",
            row.len(),
            names.len()
        )));
    }
    Ok(())
}

fn column_index(kind: &str, names: &[String], name: &str) -> TrajResult<usize> {
    names
        .iter()
        .position(|n| n == name)
        .ok_or_else(|| TrajError::Config(format!("no {kind} named '{name}'")))
}

fn set_column(rows: &mut [Vec<f64>], idx: usize, values: &[f64]) -> TrajResult<()> {
    if values.len() != rows.len() {
        return Err(TrajError::Config(format!(
            "expected {} values, got {}",
            rows.len(),
            values.len()
        )));
    }
    for (row, &v) in rows.iter_mut().zip(values) {
        row[idx] = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn ramp() -> Iterate {
        Iterate::new(
            vec![0.0, 1.0, 2.0],
            names(&["q"]),
            vec![vec![0.0], vec![2.0], vec![4.0]],
            names(&["u"]),
            vec![vec![1.0], vec![1.0], vec![-1.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_non_increasing_time() {
        let err = Iterate::new(
            vec![0.0, 0.0],
            names(&["q"]),
            vec![vec![0.0], vec![1.0]],
            vec![],
            vec![vec![], vec![]],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_row_width_mismatch() {
        let err = Iterate::new(
            vec![0.0, 1.0],
            names(&["q", "v"]),
            vec![vec![0.0], vec![1.0]],
            vec![],
            vec![vec![], vec![]],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_resample_interpolates_linearly() {
        let fine = ramp().resample(&[0.5, 1.5]).unwrap();
        assert_eq!(fine.state("q").unwrap(), vec![1.0, 3.0]);
        assert_eq!(fine.control("u").unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_resample_extrapolates_with_endpoint_values() {
        let out = ramp().resample(&[-1.0, 5.0]).unwrap();
        assert_eq!(out.state("q").unwrap(), vec![0.0, 4.0]);
    }

    #[test]
    fn test_resample_uniform_changes_length() {
        let out = ramp().resample_uniform(5).unwrap();
        assert_eq!(out.num_times(), 5);
        assert_eq!(out.time(), &[0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(out.state("q").unwrap(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_single_sample_resamples_to_constant() {
        let single = Iterate::new(
            vec![0.0],
            names(&["q"]),
            vec![vec![7.0]],
            vec![],
            vec![vec![]],
        )
        .unwrap();
        let out = single.resample_uniform(4).unwrap();
        assert_eq!(out.state("q").unwrap(), vec![7.0; 4]);
    }

    #[test]
    fn test_csv_roundtrip_preserves_parameters() {
        let it = ramp()
            .with_parameters(names(&["mass"]), vec![2.5])
            .unwrap();
        let mut buf = Vec::new();
        it.write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("time,state:q,control:u,parameter:mass"));

        let back = Iterate::read_from(buf.as_slice()).unwrap();
        assert_eq!(back, it);
        assert_eq!(back.parameter("mass"), Some(2.5));
    }

    #[test]
    fn test_read_rejects_unprefixed_columns() {
        let data = "time,q\n0,1\n";
        assert!(matches!(
            Iterate::read_from(data.as_bytes()),
            Err(TrajError::Parse(_))
        ));
    }

    #[test]
    fn test_read_rejects_empty_body() {
        let data = "time,state:q\n";
        assert!(Iterate::read_from(data.as_bytes()).is_err());
    }

    #[test]
    fn test_set_state_column() {
        let mut it = ramp();
        it.set_state("q", &[9.0, 8.0, 7.0]).unwrap();
        assert_eq!(it.states_at(2), &[7.0]);
        assert!(it.set_state("missing", &[0.0, 0.0, 0.0]).is_err());
        assert!(it.set_state("q", &[0.0]).is_err());
    }

    #[test]
    fn test_interpolate_helper() {
        let xs = [0.0, 1.0, 3.0];
        let ys = [0.0, 10.0, 30.0];
        assert_eq!(interpolate(&xs, &ys, 2.0), 20.0);
        assert_eq!(interpolate(&xs, &ys, 1.0), 10.0);
        assert_eq!(interpolate(&xs, &ys, -5.0), 0.0);
    }
}
