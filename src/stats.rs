use serde::{Deserialize, Serialize};
use std::iter;

/// Online accumulator of a single quantity across trials.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    n_vals: usize,
    sum: f64,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub sum: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;
        self.sum += val;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn n_vals(&self) -> usize {
        self.n_vals
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            sum: self.sum,
            mean: if self.n_vals > 0 {
                self.sum / self.n_vals as f64
            } else {
                f64::NAN
            },
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

/// Summary of a correlated time series after discarding its transient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesReport {
    pub mean: f64,
    pub std_dev: f64,
    pub sem: f64,
    /// Index of the first value considered equilibrated.
    pub i_equil: usize,
    pub is_equil: bool,
}

pub struct TimeSeries<'a> {
    vals: &'a [f64],
}

impl<'a> TimeSeries<'a> {
    pub fn new(vals: &'a [f64]) -> Self {
        Self { vals }
    }

    pub fn report(&self) -> TimeSeriesReport {
        if self.vals.is_empty() {
            return TimeSeriesReport {
                mean: f64::NAN,
                std_dev: f64::NAN,
                sem: f64::NAN,
                i_equil: 0,
                is_equil: false,
            };
        }

        let i_equil = equilibration_index(self.vals);
        let tail = &self.vals[i_equil..];
        TimeSeriesReport {
            mean: mean(tail),
            std_dev: variance(tail).sqrt(),
            sem: blocking_sem(tail),
            i_equil,
            is_equil: i_equil != self.vals.len() / 2,
        }
    }
}

fn mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

fn variance(vals: &[f64]) -> f64 {
    let n_vals = vals.len();
    if n_vals < 2 {
        return f64::NAN;
    }
    let mean = mean(vals);
    vals.iter().map(|&val| (val - mean).powi(2)).sum::<f64>() / (n_vals - 1) as f64
}

/// Standard error of the mean by Flyvbjerg-Petersen blocking.
///
/// Each blocking level halves the series by averaging neighbours. The chosen
/// level is the first whose squared error estimate lies above the lower bound
/// of every coarser level.
fn blocking_sem(vals: &[f64]) -> f64 {
    let levels: Vec<(f64, f64)> = iter::successors(Some(vals.to_vec()), |blocks| {
        Some(
            blocks
                .chunks_exact(2)
                .map(|pair| (pair[0] + pair[1]) / 2.0)
                .collect(),
        )
    })
    .take_while(|blocks| blocks.len() >= 2)
    .map(|blocks| {
        let n_blocks = blocks.len() as f64;
        let sem2 = variance(&blocks) / n_blocks;
        (sem2, sem2 * (2.0 / (n_blocks - 1.0)).sqrt())
    })
    .collect();

    // Highest lower bound over each level and all coarser ones.
    let mut floor = f64::NEG_INFINITY;
    let mut floors: Vec<f64> = levels
        .iter()
        .rev()
        .map(|&(sem2, err)| {
            floor = floor.max(sem2 - err);
            floor
        })
        .collect();
    floors.reverse();

    levels
        .iter()
        .zip(&floors)
        .find(|&(&(sem2, _), &floor)| sem2 > floor)
        .map(|(level, _)| level)
        .or(levels.last())
        .map_or(f64::NAN, |&(sem2, _)| sem2.sqrt())
}

/// Equilibration index by the marginal standard error rule, searched over
/// the start points `n / 2^k`. Falls back to `n / 2` when no start point
/// has a defined error.
fn equilibration_index(vals: &[f64]) -> usize {
    let n_vals = vals.len();
    let n_cands = n_vals.ilog2() + 1;

    (1..=n_cands)
        .rev()
        .map(|k| n_vals >> k)
        .map(|start| (start, marginal_sq_error(&vals[start..])))
        .fold((n_vals / 2, f64::INFINITY), |best, cand| {
            if cand.1 < best.1 { cand } else { best }
        })
        .0
}

fn marginal_sq_error(tail: &[f64]) -> f64 {
    let n_tail = tail.len();
    variance(tail) * (n_tail - 1) as f64 / n_tail.pow(2) as f64
}
