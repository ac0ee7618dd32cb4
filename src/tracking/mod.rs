//! Local experiment tracking
//!
//! A tracked run writes everything into `<output_dir>/<run_name>/`:
//!
//! ```text
//! config.json                 full run configuration
//! metrics.jsonl               one object per iteration: metric names as keys,
//!                             plus global_step and timestamp
//! progress.csv                global_step,game_score,rewards_mean,traj_len,entropy
//! traces.jsonl                intrinsic-reward traces of single episodes
//! models/model.safetensors    agent + RND predictor weights
//! ```

use std::{
    collections::BTreeMap,
    fs::{File, create_dir_all},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};

pub mod trace;

pub use trace::{CuriosityTrace, TraceRecorder};

/// Columns of `progress.csv` after `global_step`, as metric names
pub const PROGRESS_COLUMNS: [&str; 4] =
    ["charts/game_score", "rewards/rewards_mean", "charts/traj_len", "losses/entropy"];

/// `<env_id>__<exp_name>__<seed>_lr<lr>_<unix time><suffix>`
pub fn run_name(env_id: &str, exp_name: &str, seed: u64, learning_rate: f64, suffix: &str) -> String {
    format!("{}__{}__{}_lr{}_{}{}", env_id, exp_name, seed, learning_rate, Utc::now().timestamp(), suffix)
}

/// Named scalars of one iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    values: BTreeMap<String, f64>,
}

impl Metrics {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`
    pub fn record(&mut self, name: impl Into<String>, value: f64) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Value of `name`
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Number of metrics
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no metric was recorded
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Metrics in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Merge another set in, overwriting duplicates
    pub fn extend(&mut self, other: Metrics) {
        self.values.extend(other.values);
    }

    /// JSON record with `global_step` and `timestamp`
    ///
    /// Non-finite values are written as `null`.
    pub fn to_json(&self, global_step: usize) -> Value {
        let mut record = Map::new();
        record.insert("global_step".to_string(), json!(global_step));
        record.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        for (name, value) in &self.values {
            record.insert(name.clone(), Value::from(*value));
        }
        Value::Object(record)
    }
}

/// Output files of one tracked run
#[derive(Debug)]
pub struct RunDir {
    root: PathBuf,
    metrics: BufWriter<File>,
    progress: BufWriter<File>,
    traces: BufWriter<File>,
}

impl RunDir {
    /// Create `<base>/<run_name>/` and write `config.json`
    pub fn create<C: Serialize>(base: impl AsRef<Path>, run_name: &str, config: &C) -> Result<Self> {
        let root = base.as_ref().join(run_name);
        create_dir_all(&root).with_context(|| format!("creating run directory {}", root.display()))?;

        let config_json = serde_json::to_string_pretty(config)?;
        std::fs::write(root.join("config.json"), config_json)?;

        let open = |name: &str| -> Result<BufWriter<File>> {
            let path = root.join(name);
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            Ok(BufWriter::new(file))
        };
        let metrics = open("metrics.jsonl")?;
        let mut progress = open("progress.csv")?;
        let traces = open("traces.jsonl")?;
        writeln!(progress, "global_step,game_score,rewards_mean,traj_len,entropy")?;

        tracing::info!("Tracking run in {}", root.display());
        Ok(Self { root, metrics, progress, traces })
    }

    /// Run directory
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Where the trained weights go
    pub fn model_path(&self) -> PathBuf {
        model_path(&self.root)
    }

    /// Append one iteration to `metrics.jsonl` and `progress.csv`
    pub fn log(&mut self, global_step: usize, metrics: &Metrics) -> Result<()> {
        serde_json::to_writer(&mut self.metrics, &metrics.to_json(global_step))?;
        writeln!(self.metrics)?;

        let columns: Vec<String> = PROGRESS_COLUMNS
            .iter()
            .map(|name| metrics.get(name).map_or_else(String::new, |v| v.to_string()))
            .collect();
        writeln!(self.progress, "{},{}", global_step, columns.join(","))?;
        Ok(())
    }

    /// Append a trace to `traces.jsonl`
    pub fn log_trace(&mut self, global_step: usize, trace: &CuriosityTrace) -> Result<()> {
        let record = json!({ "global_step": global_step, "int_rewards_plot": trace });
        serde_json::to_writer(&mut self.traces, &record)?;
        writeln!(self.traces)?;
        Ok(())
    }

    /// Flush every file
    pub fn flush(&mut self) -> Result<()> {
        self.metrics.flush()?;
        self.progress.flush()?;
        self.traces.flush()?;
        Ok(())
    }
}

impl Drop for RunDir {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!("failed to flush run files: {}", e);
        }
    }
}

/// `<run_dir>/models/model.safetensors`
pub fn model_path(run_dir: &Path) -> PathBuf {
    run_dir.join("models").join("model.safetensors")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_name_format() {
        let name = run_name("TreasureMaze-v0", "ppo_rnd", 1, 3e-4, "");
        assert!(name.starts_with("TreasureMaze-v0__ppo_rnd__1_lr0.0003_"), "{}", name);

        let noisy = run_name("Pendulum-v1", "ppo_norm_rew", 11, 0.0026, "-bi");
        assert!(noisy.ends_with("-bi"));
    }

    #[test]
    fn test_metrics_json() {
        let mut metrics = Metrics::new();
        metrics.record("charts/SPS", 100.0).record("losses/approx_kl", f64::NAN);
        let json = metrics.to_json(512);

        assert_eq!(json["global_step"], 512);
        assert_eq!(json["charts/SPS"], 100.0);
        assert!(json["losses/approx_kl"].is_null());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_run_dir_files() {
        let base = std::env::temp_dir().join(format!("ppo_rnd_tracking_{}", std::process::id()));
        let mut metrics = Metrics::new();
        metrics.record("charts/game_score", 2.5).record("losses/entropy", 1.0);

        {
            let mut run = RunDir::create(&base, "run", &json!({ "seed": 1 })).unwrap();
            run.log(128, &metrics).unwrap();
            run.log_trace(128, &CuriosityTrace::from_rewards(&[1.0, 2.0], 0.99)).unwrap();
            assert_eq!(run.model_path(), base.join("run/models/model.safetensors"));
        }

        let progress = std::fs::read_to_string(base.join("run/progress.csv")).unwrap();
        let lines: Vec<&str> = progress.lines().collect();
        assert_eq!(lines[0], "global_step,game_score,rewards_mean,traj_len,entropy");
        assert_eq!(lines[1], "128,2.5,,,1");

        let jsonl = std::fs::read_to_string(base.join("run/metrics.jsonl")).unwrap();
        let record: Value = serde_json::from_str(jsonl.lines().next().unwrap()).unwrap();
        assert_eq!(record["charts/game_score"], 2.5);

        let config: Value =
            serde_json::from_str(&std::fs::read_to_string(base.join("run/config.json")).unwrap()).unwrap();
        assert_eq!(config["seed"], 1);

        std::fs::remove_dir_all(&base).ok();
    }
}
