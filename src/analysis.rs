use crate::engine::Trajectory;
use crate::stats::{AccumulatorReport, TimeSeries, TimeSeriesReport};
use anyhow::{Context, Result};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Summary of a window of a mean population trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    /// First step of the window.
    pub start: usize,
    /// One past the last step of the window.
    pub end: usize,

    pub steady_state: TimeSeriesReport,

    pub peak: f64,
    pub peak_step: usize,

    pub last: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    pub n_trials: usize,

    /// Total population windows, split at the prescription step if any.
    pub total_pop: Vec<WindowReport>,

    /// Resistant population windows, split like `total_pop`.
    pub resist_pop: Vec<WindowReport>,

    /// Resistant share of the mean population at the last step.
    pub final_resist_frac: Option<f64>,
}

pub struct Analyzer {
    trajectory: Trajectory,
}

impl Analyzer {
    pub fn new(trajectory: Trajectory) -> Result<Self> {
        trajectory.validate().context("invalid trajectory")?;
        Ok(Self { trajectory })
    }

    /// Load the trajectory to analyze from a MessagePack file.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let trajectory =
            decode::from_read(&mut reader).context("failed to deserialize trajectory")?;
        Self::new(trajectory)
    }

    pub fn results(&self) -> Result<Results> {
        let trajectory = &self.trajectory;
        trajectory.validate().context("invalid trajectory")?;

        let bounds = window_bounds(trajectory.total_pop.len(), trajectory.prescription_step);

        let total_pop = analyze_windows(&trajectory.total_pop, &bounds);
        let resist_pop = match &trajectory.resist_pop {
            Some(resist_pop) => analyze_windows(resist_pop, &bounds),
            None => Vec::new(),
        };

        let final_resist_frac = trajectory.resist_pop.as_ref().and_then(|resist_pop| {
            let total = trajectory.total_pop.last()?.mean;
            let resist = resist_pop.last()?.mean;
            Some(if total > 0.0 { resist / total } else { f64::NAN })
        });

        Ok(Results {
            n_trials: trajectory.n_trials,
            total_pop,
            resist_pop,
            final_resist_frac,
        })
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let results = self.results()?;
        log::info!("{results:#?}");

        encode::write_named(&mut writer, &results).context("failed to serialize results")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}

fn window_bounds(n_steps: usize, prescription_step: Option<usize>) -> Vec<(usize, usize)> {
    match prescription_step {
        Some(step) if step > 0 && step < n_steps => vec![(0, step), (step, n_steps)],
        _ => vec![(0, n_steps)],
    }
}

fn analyze_windows(reports: &[AccumulatorReport], bounds: &[(usize, usize)]) -> Vec<WindowReport> {
    bounds
        .iter()
        .map(|&(start, end)| {
            let means: Vec<f64> = reports[start..end].iter().map(|report| report.mean).collect();

            let (peak_offset, peak) = means
                .iter()
                .copied()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (idx, val)| {
                    if val > best.1 { (idx, val) } else { best }
                });

            WindowReport {
                start,
                end,
                steady_state: TimeSeries::new(&means).report(),
                peak,
                peak_step: start + peak_offset,
                last: means.last().copied().unwrap_or(f64::NAN),
            }
        })
        .collect()
}
