//! Command-line flags shared by the training binaries
//!
//! Hyperparameter flags are optional: anything left unset keeps the value of
//! the preset the binary starts from.

#![allow(dead_code)]

use std::path::PathBuf;

use clap::Args;
use ppo_rnd::train::{ExperimentConfig, PpoConfig, ReturnNoiseConfig, RndConfig};
use tch::Device;
use tracing_subscriber::EnvFilter;

/// Run-level flags
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Name of this experiment
    #[arg(long)]
    pub exp_name: Option<String>,

    /// Seed of the experiment
    #[arg(long)]
    pub seed: Option<u64>,

    /// Use CUDA when available
    #[arg(long, default_value_t = true, num_args = 0..=1, default_missing_value = "true")]
    pub cuda: bool,

    /// CUDA device ordinal
    #[arg(long, default_value_t = 0)]
    pub gpu_id: usize,

    /// Write a run directory with config, metrics and traces
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub track: Option<bool>,

    /// Parent directory of run directories
    #[arg(long, env = "PPO_RND_RESULTS", default_value = "results")]
    pub output_dir: PathBuf,

    /// Save the weights at the end of the run
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub save_model: Option<bool>,

    /// Iterations between evaluations (0 to skip)
    #[arg(long, default_value_t = 0)]
    pub eval_interval: usize,

    /// Environments of the evaluation pool
    #[arg(long, default_value_t = 32)]
    pub num_eval_envs: usize,

    /// Episodes per evaluation
    #[arg(long, default_value_t = 32)]
    pub num_eval_episodes: usize,

    /// Iterations between intrinsic-reward traces (0 to skip)
    #[arg(long, default_value_t = 10)]
    pub capture_interval: usize,
}

/// PPO flags
#[derive(Debug, Args)]
pub struct PpoArgs {
    /// Total timesteps of the experiment
    #[arg(long)]
    pub total_timesteps: Option<usize>,

    /// Learning rate of the optimizer
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Number of parallel environments
    #[arg(long)]
    pub num_envs: Option<usize>,

    /// Steps per environment per rollout
    #[arg(long)]
    pub num_steps: Option<usize>,

    /// Anneal the learning rate linearly to zero
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub anneal_lr: Option<bool>,

    /// Discount factor of the extrinsic reward
    #[arg(long)]
    pub gamma: Option<f64>,

    /// GAE lambda
    #[arg(long)]
    pub gae_lambda: Option<f64>,

    /// Minibatches per epoch
    #[arg(long)]
    pub num_minibatches: Option<usize>,

    /// Epochs per update
    #[arg(long)]
    pub update_epochs: Option<usize>,

    /// Normalize advantages per minibatch
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub norm_adv: Option<bool>,

    /// Surrogate clipping coefficient
    #[arg(long)]
    pub clip_coef: Option<f64>,

    /// Clip the extrinsic value loss
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub clip_vloss: Option<bool>,

    /// Entropy coefficient
    #[arg(long)]
    pub ent_coef: Option<f64>,

    /// Value loss coefficient
    #[arg(long)]
    pub vf_coef: Option<f64>,

    /// Gradient clipping norm
    #[arg(long)]
    pub max_grad_norm: Option<f64>,

    /// KL threshold for skipping the remaining epochs
    #[arg(long)]
    pub target_kl: Option<f64>,
}

impl PpoArgs {
    /// Override the preset with the flags that were given
    pub fn apply(&self, mut ppo: PpoConfig) -> PpoConfig {
        if let Some(v) = self.total_timesteps {
            ppo.total_timesteps = v;
        }
        if let Some(v) = self.learning_rate {
            ppo.learning_rate = v;
        }
        if let Some(v) = self.num_envs {
            ppo.num_envs = v;
        }
        if let Some(v) = self.num_steps {
            ppo.num_steps = v;
        }
        if let Some(v) = self.anneal_lr {
            ppo.anneal_lr = v;
        }
        if let Some(v) = self.gamma {
            ppo.gamma = v;
        }
        if let Some(v) = self.gae_lambda {
            ppo.gae_lambda = v;
        }
        if let Some(v) = self.num_minibatches {
            ppo.num_minibatches = v;
        }
        if let Some(v) = self.update_epochs {
            ppo.update_epochs = v;
        }
        if let Some(v) = self.norm_adv {
            ppo.norm_adv = v;
        }
        if let Some(v) = self.clip_coef {
            ppo.clip_coef = v;
        }
        if let Some(v) = self.clip_vloss {
            ppo.clip_vloss = v;
        }
        if let Some(v) = self.ent_coef {
            ppo.ent_coef = v;
        }
        if let Some(v) = self.vf_coef {
            ppo.vf_coef = v;
        }
        if let Some(v) = self.max_grad_norm {
            ppo.max_grad_norm = v;
        }
        if self.target_kl.is_some() {
            ppo.target_kl = self.target_kl;
        }
        ppo
    }
}

/// RND flags
#[derive(Debug, Args)]
pub struct RndArgs {
    /// Fraction of each minibatch used for the predictor loss
    #[arg(long)]
    pub update_proportion: Option<f64>,

    /// Intrinsic advantage coefficient
    #[arg(long)]
    pub int_coef: Option<f64>,

    /// Extrinsic advantage coefficient
    #[arg(long)]
    pub ext_coef: Option<f64>,

    /// Discount factor of the intrinsic reward
    #[arg(long)]
    pub int_gamma: Option<f64>,

    /// Random-action iterations for the observation statistics
    #[arg(long)]
    pub num_iterations_obs_norm_init: Option<usize>,

    /// Scale extrinsic rewards by the std of their discounted sum
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub normalize_ext_rewards: Option<bool>,
}

impl RndArgs {
    /// Override the preset with the flags that were given
    pub fn apply(&self, mut rnd: RndConfig) -> RndConfig {
        if let Some(v) = self.update_proportion {
            rnd.update_proportion = v;
        }
        if let Some(v) = self.int_coef {
            rnd.int_coef = v;
        }
        if let Some(v) = self.ext_coef {
            rnd.ext_coef = v;
        }
        if let Some(v) = self.int_gamma {
            rnd.int_gamma = v;
        }
        if let Some(v) = self.num_iterations_obs_norm_init {
            rnd.num_iterations_obs_norm_init = v;
        }
        if let Some(v) = self.normalize_ext_rewards {
            rnd.normalize_ext_rewards = v;
        }
        rnd
    }
}

/// Value-target noise flags
#[derive(Debug, Args)]
pub struct NoiseArgs {
    /// Perturb the value targets of the most uncertain samples
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub add_noise: Option<bool>,

    /// Draw noise of either sign
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub bi_noise: Option<bool>,

    /// Fraction of samples perturbed
    #[arg(long)]
    pub rate: Option<f64>,

    /// Noise std
    #[arg(long)]
    pub std: Option<f64>,

    /// Noise mean
    #[arg(long)]
    pub mean: Option<f64>,

    /// Decay of the noise weight over the run
    #[arg(long)]
    pub decay_scale: Option<f64>,

    /// Initial noise weight
    #[arg(long)]
    pub noise_w: Option<f64>,
}

impl NoiseArgs {
    /// Noise configuration, `None` unless enabled (or `enabled_by_default`)
    pub fn config(&self, enabled_by_default: bool) -> Option<ReturnNoiseConfig> {
        if !self.add_noise.unwrap_or(enabled_by_default) {
            return None;
        }
        let mut noise = ReturnNoiseConfig::default();
        if let Some(v) = self.bi_noise {
            noise.bi_noise = v;
        }
        if let Some(v) = self.rate {
            noise.rate = v;
        }
        if let Some(v) = self.std {
            noise.std = v;
        }
        if let Some(v) = self.mean {
            noise.mean = v;
        }
        if let Some(v) = self.decay_scale {
            noise.decay_scale = v;
        }
        if let Some(v) = self.noise_w {
            noise.noise_w = v;
        }
        Some(noise)
    }
}

impl RunArgs {
    /// Experiment configuration without the algorithm sections
    pub fn experiment(&self, env_id: &str, exp_name: &str, seed: u64) -> ExperimentConfig {
        ExperimentConfig::new()
            .env_id(env_id)
            .exp_name(self.exp_name.clone().unwrap_or_else(|| exp_name.to_string()))
            .seed(self.seed.unwrap_or(seed))
            .track(self.track.unwrap_or(false))
            .save_model(self.save_model.unwrap_or(false))
            .eval(self.eval_interval, self.num_eval_envs, self.num_eval_episodes)
            .capture_interval(self.capture_interval)
            .output_dir(&self.output_dir)
    }

    /// CUDA device when requested and available, CPU otherwise
    pub fn device(&self) -> Device {
        if self.cuda && tch::Cuda::is_available() {
            Device::Cuda(self.gpu_id)
        } else {
            if self.cuda {
                tracing::warn!("CUDA not available, training on CPU");
            }
            Device::Cpu
        }
    }
}

/// Install the console subscriber, `RUST_LOG` overrides `info`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
