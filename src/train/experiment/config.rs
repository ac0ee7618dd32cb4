//! Run-level configuration
//!
//! [`ExperimentConfig`] bundles everything a run needs besides the
//! environment factory and the networks. It is written to `config.json`
//! of tracked runs.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{
    tracking,
    train::ppo::{PpoConfig, ReturnNoiseConfig, RndConfig},
};

/// Experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Environment id
    pub env_id: String,

    /// Experiment name, part of the run name
    pub exp_name: String,

    /// Seed of environments, libtorch and minibatch shuffling
    pub seed: u64,

    /// Write a run directory
    pub track: bool,

    /// Save the trained weights at the end of the run
    pub save_model: bool,

    /// Evaluate every this many iterations, `0` disables evaluation
    pub eval_interval: usize,

    /// Environments of the evaluation pool
    pub num_eval_envs: usize,

    /// Episodes per evaluation
    pub num_eval_episodes: usize,

    /// Record an intrinsic-reward trace every this many iterations, `0`
    /// disables recording
    pub capture_interval: usize,

    /// Finished episodes kept for the return and length charts
    pub episode_window: usize,

    /// Parent directory of run directories
    pub output_dir: PathBuf,

    /// PPO hyperparameters
    pub ppo: PpoConfig,

    /// RND hyperparameters, `None` for plain PPO with normalized rewards
    pub rnd: Option<RndConfig>,

    /// Value-target noise
    pub noise: Option<ReturnNoiseConfig>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            env_id: "TreasureMaze-v0".to_string(),
            exp_name: "ppo_rnd".to_string(),
            seed: 1,
            track: false,
            save_model: false,
            eval_interval: 0,
            num_eval_envs: 32,
            num_eval_episodes: 32,
            capture_interval: 10,
            episode_window: 128,
            output_dir: PathBuf::from("results"),
            ppo: PpoConfig::default(),
            rnd: Some(RndConfig::default()),
            noise: None,
        }
    }
}

impl ExperimentConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.ppo.validate()?;
        if let Some(rnd) = &self.rnd {
            rnd.validate()?;
        }
        if let Some(noise) = &self.noise {
            noise.validate()?;
        }
        if self.eval_interval > 0 && (self.num_eval_envs == 0 || self.num_eval_episodes == 0) {
            return Err(anyhow!("evaluation needs at least one environment and one episode"));
        }
        if self.episode_window == 0 {
            return Err(anyhow!("episode_window must be positive"));
        }
        Ok(())
    }

    /// Run name, with the noise suffix when noise is on
    pub fn run_name(&self) -> String {
        let suffix = self.noise.as_ref().map(ReturnNoiseConfig::run_suffix).unwrap_or_default();
        tracking::run_name(&self.env_id, &self.exp_name, self.seed, self.ppo.learning_rate, &suffix)
    }

    /// Whether extrinsic rewards are scaled by their discounted std
    ///
    /// Always on without RND.
    pub fn normalize_ext_rewards(&self) -> bool {
        self.rnd.as_ref().is_none_or(|rnd| rnd.normalize_ext_rewards)
    }

    /// Set environment id
    pub fn env_id(mut self, env_id: impl Into<String>) -> Self {
        self.env_id = env_id.into();
        self
    }

    /// Set experiment name
    pub fn exp_name(mut self, name: impl Into<String>) -> Self {
        self.exp_name = name.into();
        self
    }

    /// Set seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable tracking
    pub fn track(mut self, enabled: bool) -> Self {
        self.track = enabled;
        self
    }

    /// Enable or disable saving the model
    pub fn save_model(mut self, enabled: bool) -> Self {
        self.save_model = enabled;
        self
    }

    /// Set evaluation schedule
    pub fn eval(mut self, interval: usize, num_envs: usize, num_episodes: usize) -> Self {
        self.eval_interval = interval;
        self.num_eval_envs = num_envs;
        self.num_eval_episodes = num_episodes;
        self
    }

    /// Set trace interval
    pub fn capture_interval(mut self, interval: usize) -> Self {
        self.capture_interval = interval;
        self
    }

    /// Set episode window size
    pub fn episode_window(mut self, size: usize) -> Self {
        self.episode_window = size;
        self
    }

    /// Set output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set PPO hyperparameters
    pub fn ppo(mut self, ppo: PpoConfig) -> Self {
        self.ppo = ppo;
        self
    }

    /// Set RND hyperparameters
    pub fn rnd(mut self, rnd: Option<RndConfig>) -> Self {
        self.rnd = rnd;
        self
    }

    /// Set value-target noise
    pub fn noise(mut self, noise: Option<ReturnNoiseConfig>) -> Self {
        self.noise = noise;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExperimentConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.normalize_ext_rewards());
        assert!(config.run_name().starts_with("TreasureMaze-v0__ppo_rnd__1_lr0.0003_"));
    }

    #[test]
    fn test_plain_ppo_always_normalizes() {
        let rnd = RndConfig { normalize_ext_rewards: false, ..Default::default() };
        assert!(!ExperimentConfig::new().rnd(Some(rnd)).normalize_ext_rewards());
        assert!(ExperimentConfig::new().rnd(None).normalize_ext_rewards());
    }

    #[test]
    fn test_noise_suffix() {
        let config = ExperimentConfig::new().noise(Some(ReturnNoiseConfig::default()));
        assert!(config.run_name().ends_with("-max-uncertainty-rate0.1"));
    }

    #[test]
    fn test_validation() {
        assert!(ExperimentConfig::new().eval(5, 0, 8).validate().is_err());
        assert!(ExperimentConfig::new().episode_window(0).validate().is_err());
        assert!(ExperimentConfig::new().eval(5, 2, 8).validate().is_ok());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = ExperimentConfig::new().ppo(PpoConfig::control()).rnd(Some(RndConfig::control()));
        let json = serde_json::to_string(&config).unwrap();
        let back: ExperimentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
