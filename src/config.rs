use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Virus and host parameters.
    pub model: ModelConfig,

    /// Drug treatment parameters. Selects the treated scenario when present.
    #[serde(default)]
    pub treatment: Option<TreatmentConfig>,

    /// Trial schedule.
    pub run: RunConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Initial number of viruses.
    pub n_viruses: usize,
    /// Maximum virus population of the host.
    pub max_pop: usize,

    /// Reproduction probability at zero population density.
    pub max_birth_prob: f64,
    /// Clearance probability.
    pub clear_prob: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreatmentConfig {
    /// Drug prescribed during the simulation.
    #[serde(default = "default_drug")]
    pub drug: String,
    /// Step at which the drug is prescribed.
    #[serde(default = "default_prescription_step")]
    pub prescription_step: usize,

    /// Initial resistance of the viruses to each drug.
    pub resistances: BTreeMap<String, bool>,
    /// Probability of each resistance trait flipping in an offspring.
    pub mut_prob: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Number of independent trials averaged together.
    pub n_trials: usize,
    /// Number of steps per trial.
    #[serde(default = "default_n_steps")]
    pub n_steps: usize,

    /// Base seed of the random number generator (taken from the OS if absent).
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_drug() -> String {
    "guttagonol".to_string()
}

fn default_prescription_step() -> usize {
    150
}

fn default_n_steps() -> usize {
    300
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_num(self.model.n_viruses, 1..).context("invalid initial number of viruses")?;
        check_num(self.model.max_pop, 1..).context("invalid maximum population")?;
        check_num(self.model.max_birth_prob, 0.0..=1.0)
            .context("invalid maximum birth probability")?;
        check_num(self.model.clear_prob, 0.0..=1.0).context("invalid clearance probability")?;

        check_num(self.run.n_trials, 1..).context("invalid number of trials")?;
        check_num(self.run.n_steps, 1..).context("invalid number of steps")?;

        if let Some(treatment) = &self.treatment {
            if treatment.drug.is_empty() {
                bail!("drug name must not be empty");
            }
            check_num(treatment.prescription_step, 0..=self.run.n_steps)
                .context("invalid prescription step")?;
            check_num(treatment.mut_prob, 0.0..=1.0).context("invalid mutation probability")?;
        }

        Ok(())
    }
}

pub fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
