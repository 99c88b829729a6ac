use crate::analysis::Analyzer;
use crate::config::Config;
use crate::engine::{Engine, Trajectory};
use anyhow::{Context, Result};
use glob::glob;
use rmp_serde::encode;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg = Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    pub fn run_simulation(&self) -> Result<()> {
        let run_idx = self.next_run_idx().context("failed to find next run index")?;

        let run_dir = self.run_dir(run_idx);
        fs::create_dir(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        let mut cfg = self.cfg.clone();
        // Offset the base seed so that runs differ but stay reproducible.
        cfg.run.seed = cfg.run.seed.map(|seed| seed.wrapping_add(run_idx as u64));
        let mut engine = Engine::new(cfg).context("failed to construct engine")?;

        let trajectory = engine
            .perform_simulation()
            .context("failed to perform simulation")?;

        let trajectory_file = run_dir.join(TRAJECTORY_FILE);
        save_trajectory(&trajectory, &trajectory_file)
            .with_context(|| format!("failed to save {trajectory_file:?}"))?;
        log::info!("wrote {trajectory_file:?}");

        Ok(())
    }

    pub fn run_analysis(&self) -> Result<()> {
        for run_dir in self.run_dirs().context("failed to list run dirs")? {
            let trajectory_file = run_dir.join(TRAJECTORY_FILE);
            let analyzer = Analyzer::from_file(&trajectory_file)
                .with_context(|| format!("failed to load {trajectory_file:?}"))?;

            let results_file = run_dir.join(RESULTS_FILE);
            analyzer
                .save_results(&results_file)
                .context("failed to save results")?;
            log::info!("wrote {results_file:?}");
        }

        Ok(())
    }

    pub fn clean_sim(&self) -> Result<()> {
        for run_dir in self.run_dirs().context("failed to list run dirs")? {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }

        Ok(())
    }

    fn run_dirs(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let mut run_dirs: Vec<PathBuf> = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .collect();
        run_dirs.sort();
        Ok(run_dirs)
    }

    /// One past the highest existing run index, so gaps are never reused.
    fn next_run_idx(&self) -> Result<usize> {
        let max_idx = self
            .run_dirs()?
            .iter()
            .filter_map(|run_dir| run_idx(run_dir))
            .max();
        Ok(max_idx.map_or(0, |idx| idx + 1))
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }
}

const TRAJECTORY_FILE: &str = "trajectory.msgpack";
const RESULTS_FILE: &str = "results.msgpack";

fn run_idx(run_dir: &Path) -> Option<usize> {
    run_dir
        .file_name()?
        .to_str()?
        .strip_prefix("run-")?
        .parse()
        .ok()
}

fn save_trajectory(trajectory: &Trajectory, file: &Path) -> Result<()> {
    let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(file);
    encode::write_named(&mut writer, trajectory).context("failed to serialize trajectory")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}
