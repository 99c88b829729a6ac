use crate::config::{Config, TreatmentConfig};
use crate::model::{ResistantVirus, SimpleVirus};
use crate::patient::{Patient, TreatedPatient};
use crate::stats::{Accumulator, AccumulatorReport};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::slice;

/// Trial-averaged population trajectories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Number of trials averaged.
    pub n_trials: usize,

    /// Step at which the drug was prescribed, if any.
    pub prescription_step: Option<usize>,

    /// Total virus population after each step.
    pub total_pop: Vec<AccumulatorReport>,

    /// Population resistant to the prescribed drug after each step.
    pub resist_pop: Option<Vec<AccumulatorReport>>,
}

impl Trajectory {
    /// Check that every series covers the same steps.
    pub fn validate(&self) -> Result<()> {
        let n_steps = self.total_pop.len();
        if let Some(resist_pop) = &self.resist_pop
            && resist_pop.len() != n_steps
        {
            bail!(
                "resistant population has {} steps, but total population has {n_steps}",
                resist_pop.len()
            );
        }
        if let Some(step) = self.prescription_step
            && step > n_steps
        {
            bail!("prescription step {step} is past the last step {n_steps}");
        }
        Ok(())
    }
}

/// Population counts of a single trial.
struct TrialCounts {
    total_pop: Vec<usize>,
    resist_pop: Vec<usize>,
}

/// Simulation engine.
///
/// Holds the configuration and the random number generator shared by every
/// trial, and runs the configured scenario.
pub struct Engine {
    cfg: Config,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine`, seeding the generator from `cfg.run.seed` or the OS.
    pub fn new(cfg: Config) -> Result<Self> {
        cfg.validate().context("failed to validate config")?;

        let rng = match cfg.run.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        Ok(Self { cfg, rng })
    }

    /// Run every trial of the configured scenario and average the results.
    pub fn perform_simulation(&mut self) -> Result<Trajectory> {
        match self.cfg.treatment.clone() {
            None => self
                .simulate_without_drug()
                .context("failed to simulate without drug"),
            Some(treatment) => self
                .simulate_with_drug(&treatment)
                .context("failed to simulate with drug"),
        }
    }

    fn simulate_without_drug(&mut self) -> Result<Trajectory> {
        let n_trials = self.cfg.run.n_trials;
        let mut total_accs = vec![Accumulator::new(); self.cfg.run.n_steps];

        for i_trial in 0..n_trials {
            let counts = self
                .perform_trial_without_drug()
                .with_context(|| format!("failed to perform trial {i_trial}"))?;
            merge_counts(&mut total_accs, &counts);

            log_progress(i_trial, n_trials);
        }

        Ok(Trajectory {
            n_trials,
            prescription_step: None,
            total_pop: report_all(&total_accs),
            resist_pop: None,
        })
    }

    fn perform_trial_without_drug(&mut self) -> Result<Vec<usize>> {
        let model = &self.cfg.model;
        let virus = SimpleVirus::new(model.max_birth_prob, model.clear_prob)?;
        let mut patient = Patient::new(vec![virus; model.n_viruses], model.max_pop)?;

        let mut counts = Vec::with_capacity(self.cfg.run.n_steps);
        for _ in 0..self.cfg.run.n_steps {
            counts.push(patient.update(&mut self.rng)?);
        }

        Ok(counts)
    }

    fn simulate_with_drug(&mut self, treatment: &TreatmentConfig) -> Result<Trajectory> {
        let n_trials = self.cfg.run.n_trials;
        let mut total_accs = vec![Accumulator::new(); self.cfg.run.n_steps];
        let mut resist_accs = vec![Accumulator::new(); self.cfg.run.n_steps];

        for i_trial in 0..n_trials {
            let counts = self
                .perform_trial_with_drug(treatment)
                .with_context(|| format!("failed to perform trial {i_trial}"))?;
            merge_counts(&mut total_accs, &counts.total_pop);
            merge_counts(&mut resist_accs, &counts.resist_pop);

            log_progress(i_trial, n_trials);
        }

        Ok(Trajectory {
            n_trials,
            prescription_step: Some(treatment.prescription_step),
            total_pop: report_all(&total_accs),
            resist_pop: Some(report_all(&resist_accs)),
        })
    }

    fn perform_trial_with_drug(&mut self, treatment: &TreatmentConfig) -> Result<TrialCounts> {
        let model = &self.cfg.model;
        let virus = ResistantVirus::new(
            model.max_birth_prob,
            model.clear_prob,
            treatment.resistances.clone(),
            treatment.mut_prob,
        )?;
        let mut patient = TreatedPatient::new(vec![virus; model.n_viruses], model.max_pop)?;
        let resist_drugs = slice::from_ref(&treatment.drug);

        let n_steps = self.cfg.run.n_steps;
        let mut counts = TrialCounts {
            total_pop: Vec::with_capacity(n_steps),
            resist_pop: Vec::with_capacity(n_steps),
        };
        for step in 0..n_steps {
            if step == treatment.prescription_step {
                patient.add_prescription(&treatment.drug);
                log::debug!("prescribed {} at step {step}", treatment.drug);
            }

            counts.total_pop.push(patient.update(&mut self.rng)?);
            counts.resist_pop.push(patient.resist_pop(resist_drugs));
        }

        Ok(counts)
    }
}

fn merge_counts(accs: &mut [Accumulator], counts: &[usize]) {
    for (acc, &count) in accs.iter_mut().zip(counts) {
        acc.add(count as f64);
    }
}

fn report_all(accs: &[Accumulator]) -> Vec<AccumulatorReport> {
    accs.iter().map(Accumulator::report).collect()
}

fn log_progress(i_trial: usize, n_trials: usize) {
    let progress = 100.0 * (i_trial + 1) as f64 / n_trials as f64;
    log::info!("completed {progress:06.2}%");
}
