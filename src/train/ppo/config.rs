//! PPO and RND configuration and hyperparameters
//!
//! This module defines the configuration parameters for PPO training,
//! the RND exploration bonus and provides validation and builder pattern
//! methods.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// PPO configuration parameters
///
/// Default values are the ones used for pixel games with 128 parallel
/// environments. [`PpoConfig::control`] gives the large-batch settings
/// used for continuous control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpoConfig {
    /// Total environment steps of the run
    pub total_timesteps: usize,

    /// Learning rate for the agent and the RND predictor
    pub learning_rate: f64,

    /// Number of parallel environments
    pub num_envs: usize,

    /// Steps per environment per rollout
    pub num_steps: usize,

    /// Anneal the learning rate linearly to zero over the run
    pub anneal_lr: bool,

    /// Discount factor (gamma)
    pub gamma: f64,

    /// GAE lambda parameter
    pub gae_lambda: f64,

    /// Number of minibatches per epoch
    pub num_minibatches: usize,

    /// Number of training epochs per rollout
    pub update_epochs: usize,

    /// Normalize advantages per minibatch
    pub norm_adv: bool,

    /// PPO clipping parameter (epsilon), also used for value clipping
    pub clip_coef: f64,

    /// Clip the extrinsic value loss around the old values
    pub clip_vloss: bool,

    /// Entropy bonus coefficient
    pub ent_coef: f64,

    /// Value function loss coefficient
    pub vf_coef: f64,

    /// Maximum gradient norm for clipping
    pub max_grad_norm: f64,

    /// Target KL divergence for early stopping, `None` disables it
    pub target_kl: Option<f64>,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            total_timesteps: 40_000_000,
            learning_rate: 3e-4,
            num_envs: 128,
            num_steps: 128,
            anneal_lr: false,
            gamma: 0.999,
            gae_lambda: 0.95,
            num_minibatches: 4,
            update_epochs: 4,
            norm_adv: true,
            clip_coef: 0.1,
            clip_vloss: true,
            ent_coef: 0.001,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            target_kl: None,
        }
    }
}

impl PpoConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for vectorized continuous control
    pub fn control() -> Self {
        Self {
            total_timesteps: 40_000_000,
            learning_rate: 0.0026,
            num_envs: 4096,
            num_steps: 16,
            anneal_lr: false,
            gamma: 0.99,
            gae_lambda: 0.95,
            num_minibatches: 2,
            update_epochs: 4,
            norm_adv: true,
            clip_coef: 0.2,
            clip_vloss: false,
            ent_coef: 0.0,
            vf_coef: 2.0,
            max_grad_norm: 1.0,
            target_kl: None,
        }
    }

    /// Samples per rollout, `num_envs * num_steps`
    pub fn batch_size(&self) -> usize {
        self.num_envs * self.num_steps
    }

    /// Samples per minibatch, `batch_size / num_minibatches`
    pub fn minibatch_size(&self) -> usize {
        self.batch_size() / self.num_minibatches.max(1)
    }

    /// Number of rollout/update iterations in the run
    pub fn num_updates(&self) -> usize {
        self.total_timesteps / self.batch_size().max(1)
    }

    /// Learning rate for iteration `update` (1-based)
    pub fn learning_rate_at(&self, update: usize) -> f64 {
        if !self.anneal_lr {
            return self.learning_rate;
        }
        let num_updates = self.num_updates().max(1) as f64;
        let frac = 1.0 - (update.saturating_sub(1)) as f64 / num_updates;
        frac * self.learning_rate
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(anyhow!("learning_rate must be positive"));
        }
        if self.num_envs == 0 {
            return Err(anyhow!("num_envs must be positive"));
        }
        if self.num_steps == 0 {
            return Err(anyhow!("num_steps must be positive"));
        }
        if self.num_minibatches == 0 || self.minibatch_size() == 0 {
            return Err(anyhow!("num_minibatches must be in 1..=batch_size"));
        }
        if self.update_epochs == 0 {
            return Err(anyhow!("update_epochs must be positive"));
        }
        if self.num_updates() == 0 {
            return Err(anyhow!(
                "total_timesteps ({}) is smaller than one batch ({})",
                self.total_timesteps,
                self.batch_size()
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(anyhow!("gamma must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(anyhow!("gae_lambda must be in [0, 1]"));
        }
        if self.clip_coef <= 0.0 {
            return Err(anyhow!("clip_coef must be positive"));
        }
        if self.vf_coef < 0.0 {
            return Err(anyhow!("vf_coef must be non-negative"));
        }
        if self.ent_coef < 0.0 {
            return Err(anyhow!("ent_coef must be non-negative"));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(anyhow!("max_grad_norm must be positive"));
        }
        if self.target_kl.is_some_and(|kl| kl < 0.0) {
            return Err(anyhow!("target_kl must be non-negative"));
        }
        Ok(())
    }

    /// Set total environment steps
    pub fn total_timesteps(mut self, steps: usize) -> Self {
        self.total_timesteps = steps;
        self
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set rollout shape
    pub fn rollout(mut self, num_envs: usize, num_steps: usize) -> Self {
        self.num_envs = num_envs;
        self.num_steps = num_steps;
        self
    }

    /// Enable or disable learning-rate annealing
    pub fn anneal_lr(mut self, enabled: bool) -> Self {
        self.anneal_lr = enabled;
        self
    }

    /// Set discount factor
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set GAE lambda
    pub fn gae_lambda(mut self, lambda: f64) -> Self {
        self.gae_lambda = lambda;
        self
    }

    /// Set number of minibatches
    pub fn num_minibatches(mut self, n: usize) -> Self {
        self.num_minibatches = n;
        self
    }

    /// Set number of training epochs
    pub fn update_epochs(mut self, epochs: usize) -> Self {
        self.update_epochs = epochs;
        self
    }

    /// Set PPO clipping parameter
    pub fn clip_coef(mut self, clip: f64) -> Self {
        self.clip_coef = clip;
        self
    }

    /// Enable or disable value clipping
    pub fn clip_vloss(mut self, enabled: bool) -> Self {
        self.clip_vloss = enabled;
        self
    }

    /// Set entropy bonus coefficient
    pub fn ent_coef(mut self, coef: f64) -> Self {
        self.ent_coef = coef;
        self
    }

    /// Set value function loss coefficient
    pub fn vf_coef(mut self, coef: f64) -> Self {
        self.vf_coef = coef;
        self
    }

    /// Set maximum gradient norm
    pub fn max_grad_norm(mut self, norm: f64) -> Self {
        self.max_grad_norm = norm;
        self
    }

    /// Set target KL divergence
    pub fn target_kl(mut self, kl: Option<f64>) -> Self {
        self.target_kl = kl;
        self
    }
}

/// Random Network Distillation hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RndConfig {
    /// Fraction of samples used for each predictor update
    pub update_proportion: f64,

    /// Intrinsic advantage coefficient
    pub int_coef: f64,

    /// Extrinsic advantage coefficient
    pub ext_coef: f64,

    /// Discount of the intrinsic stream
    pub int_gamma: f64,

    /// Rollouts of random actions used to initialize the observation
    /// statistics
    pub num_iterations_obs_norm_init: usize,

    /// Scale extrinsic rewards by the std of their discounted sum
    pub normalize_ext_rewards: bool,
}

impl Default for RndConfig {
    fn default() -> Self {
        Self {
            update_proportion: 0.25,
            int_coef: 1.0,
            ext_coef: 2.0,
            int_gamma: 0.99,
            num_iterations_obs_norm_init: 50,
            normalize_ext_rewards: true,
        }
    }
}

impl RndConfig {
    /// Settings for vectorized continuous control
    pub fn control() -> Self {
        Self { update_proportion: 0.0625, int_coef: 0.5, ext_coef: 1.0, ..Self::default() }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.update_proportion) {
            return Err(anyhow!("update_proportion must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.int_gamma) {
            return Err(anyhow!("int_gamma must be in [0, 1]"));
        }
        if self.int_coef < 0.0 || self.ext_coef < 0.0 {
            return Err(anyhow!("advantage coefficients must be non-negative"));
        }
        Ok(())
    }

    /// Set predictor update proportion
    pub fn update_proportion(mut self, p: f64) -> Self {
        self.update_proportion = p;
        self
    }

    /// Set advantage coefficients
    pub fn coefs(mut self, ext_coef: f64, int_coef: f64) -> Self {
        self.ext_coef = ext_coef;
        self.int_coef = int_coef;
        self
    }

    /// Set intrinsic discount
    pub fn int_gamma(mut self, gamma: f64) -> Self {
        self.int_gamma = gamma;
        self
    }

    /// Set number of warm-up rollouts
    pub fn num_iterations_obs_norm_init(mut self, n: usize) -> Self {
        self.num_iterations_obs_norm_init = n;
        self
    }
}
