//! Rollout buffer for storing and processing trajectories
//!
//! This module implements experience storage for PPO training, including:
//! - Trajectory storage (observations, actions, both reward streams)
//! - GAE (Generalized Advantage Estimation) computation in [`gae`]
//! - Minibatch sampling in [`sampling`]
//!
//! # Buffer Layout
//!
//! The buffer uses a `[num_steps, num_envs]` layout where:
//! - `num_steps`: Number of timesteps per rollout (16 to 128 here)
//! - `num_envs`: Number of parallel environments
//!
//! Observations and actions stay as tensors on the training device, one
//! per step. Scalars (rewards, values, dones) are kept host-side because
//! reward normalization and GAE run step by step on the CPU.

use anyhow::{Result, bail};
use tch::{Device, Kind, Tensor};

pub mod gae;
pub mod sampling;
mod storage;


pub use gae::Advantages;
pub use storage::{AdvantageMix, TrainingBatch};

/// Everything recorded for one step of every environment
#[derive(Debug)]
pub struct Transition {
    /// Observations the actions were taken in, `[num_envs, ...]`
    pub observation: Tensor,

    /// Done flags of those observations (`1.0` if the previous step ended
    /// an episode)
    pub done: Vec<f32>,

    /// Actions taken
    pub action: Tensor,

    /// Log-probabilities of the actions
    pub log_prob: Vec<f32>,

    /// Extrinsic value estimates
    pub ext_value: Vec<f32>,

    /// Intrinsic value estimates, when the agent has an intrinsic head
    pub int_value: Option<Vec<f32>>,

    /// Training rewards
    pub reward: Vec<f32>,

    /// Unmodified rewards
    pub true_reward: Vec<f32>,

    /// RND novelty of the next observations
    pub curiosity: Option<Vec<f32>>,
}

/// Rollout buffer for PPO training
#[derive(Debug)]
pub struct RolloutBuffer {
    /// Number of steps per rollout
    num_steps: usize,

    /// Number of parallel environments
    num_envs: usize,

    /// Storage kind of observations (`Uint8` for frames)
    obs_kind: Kind,

    /// Device the tensors live on
    device: Device,

    /// Observations: num_steps x `[num_envs, ...]`
    observations: Vec<Tensor>,

    /// Actions: num_steps x `[num_envs, ...]`
    actions: Vec<Tensor>,

    log_probs: Vec<Vec<f32>>,
    rewards: Vec<Vec<f32>>,
    true_rewards: Vec<Vec<f32>>,
    curiosity_rewards: Vec<Vec<f32>>,
    dones: Vec<Vec<f32>>,
    ext_values: Vec<Vec<f32>>,
    int_values: Vec<Vec<f32>>,

    /// Number of steps written since the last reset
    pos: usize,
}

impl RolloutBuffer {
    /// Create a new rollout buffer
    ///
    /// # Arguments
    ///
    /// * `num_steps` - Number of timesteps per rollout
    /// * `num_envs` - Number of parallel environments
    /// * `obs_kind` - Kind observations are stored as
    /// * `device` - Device observation and action tensors are kept on
    pub fn new(num_steps: usize, num_envs: usize, obs_kind: Kind, device: Device) -> Self {
        Self {
            num_steps,
            num_envs,
            obs_kind,
            device,
            observations: Vec::with_capacity(num_steps),
            actions: Vec::with_capacity(num_steps),
            log_probs: Vec::with_capacity(num_steps),
            rewards: Vec::with_capacity(num_steps),
            true_rewards: Vec::with_capacity(num_steps),
            curiosity_rewards: Vec::with_capacity(num_steps),
            dones: Vec::with_capacity(num_steps),
            ext_values: Vec::with_capacity(num_steps),
            int_values: Vec::with_capacity(num_steps),
            pos: 0,
        }
    }

    /// Store one step of all environments
    ///
    /// Steps must be added in order, `step == len_steps()`.
    pub fn add(&mut self, step: usize, transition: Transition) -> Result<()> {
        if step != self.pos || step >= self.num_steps {
            bail!("step {} out of order (next is {}, capacity {})", step, self.pos, self.num_steps);
        }
        let n = self.num_envs;
        let scalar_lens = [
            transition.done.len(),
            transition.log_prob.len(),
            transition.ext_value.len(),
            transition.reward.len(),
            transition.true_reward.len(),
        ];
        if scalar_lens.iter().any(|&len| len != n)
            || transition.int_value.as_ref().is_some_and(|v| v.len() != n)
            || transition.curiosity.as_ref().is_some_and(|v| v.len() != n)
        {
            bail!("transition does not hold {} environments", n);
        }
        if transition.observation.size().first() != Some(&(n as i64)) {
            bail!("observation batch {:?} does not hold {} environments", transition.observation.size(), n);
        }

        self.observations.push(transition.observation.to_device(self.device).to_kind(self.obs_kind));
        self.actions.push(transition.action.to_device(self.device));
        self.log_probs.push(transition.log_prob);
        self.rewards.push(transition.reward);
        self.true_rewards.push(transition.true_reward);
        self.curiosity_rewards.push(transition.curiosity.unwrap_or_else(|| vec![0.0; n]));
        self.dones.push(transition.done);
        self.ext_values.push(transition.ext_value);
        self.int_values.push(transition.int_value.unwrap_or_else(|| vec![0.0; n]));
        self.pos += 1;
        Ok(())
    }

    /// Whether every step of the rollout has been written
    pub fn is_full(&self) -> bool {
        self.pos == self.num_steps
    }

    /// Reset buffer for new rollout collection
    pub fn reset(&mut self) {
        self.observations.clear();
        self.actions.clear();
        self.log_probs.clear();
        self.rewards.clear();
        self.true_rewards.clear();
        self.curiosity_rewards.clear();
        self.dones.clear();
        self.ext_values.clear();
        self.int_values.clear();
        self.pos = 0;
    }

    /// `(num_steps, num_envs)`
    pub fn shape(&self) -> (usize, usize) {
        (self.num_steps, self.num_envs)
    }

    /// Number of steps written
    pub fn len_steps(&self) -> usize {
        self.pos
    }

    /// Number of samples currently in buffer
    pub fn len(&self) -> usize {
        self.pos * self.num_envs
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Training rewards `[step][env]`
    pub fn rewards(&self) -> &[Vec<f32>] {
        &self.rewards
    }

    /// Mutable training rewards, for in-place normalization
    pub fn rewards_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.rewards
    }

    /// Unmodified rewards `[step][env]`
    pub fn true_rewards(&self) -> &[Vec<f32>] {
        &self.true_rewards
    }

    /// Intrinsic rewards `[step][env]`
    pub fn curiosity_rewards(&self) -> &[Vec<f32>] {
        &self.curiosity_rewards
    }

    /// Mutable intrinsic rewards, for in-place normalization
    pub fn curiosity_rewards_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.curiosity_rewards
    }

    /// Done flags `[step][env]`
    pub fn dones(&self) -> &[Vec<f32>] {
        &self.dones
    }

    /// Extrinsic values `[step][env]`
    pub fn ext_values(&self) -> &[Vec<f32>] {
        &self.ext_values
    }

    /// Intrinsic values `[step][env]` (zeros without an intrinsic head)
    pub fn int_values(&self) -> &[Vec<f32>] {
        &self.int_values
    }

    /// Stacked observations `[num_steps * num_envs, ...]`
    pub fn flat_observations(&self) -> Result<Tensor> {
        self.ensure_full()?;
        Ok(Tensor::stack(&self.observations, 0).flatten(0, 1))
    }

    /// Flatten the rollout into a training batch
    ///
    /// The batch advantage is `int_adv * int_coef + ext_adv * ext_coef`;
    /// without an intrinsic stream it is the extrinsic advantage times
    /// `ext_coef`.
    pub fn training_batch(
        &self,
        ext: &Advantages,
        int: Option<&Advantages>,
        mix: AdvantageMix,
    ) -> Result<TrainingBatch> {
        self.ensure_full()?;

        let observations = self.flat_observations()?;
        let actions = Tensor::stack(&self.actions, 0).flatten(0, 1);
        let combined: Vec<f32> = match int {
            Some(int) => ext
                .flat_advantages()
                .iter()
                .zip(int.flat_advantages())
                .map(|(e, i)| i * mix.int_coef + e * mix.ext_coef)
                .collect(),
            None => ext.flat_advantages().iter().map(|e| e * mix.ext_coef).collect(),
        };

        let tensor = |values: &[f32]| Tensor::from_slice(values).to_device(self.device);
        Ok(TrainingBatch {
            observations,
            actions,
            log_probs: tensor(&self.log_probs.concat()),
            advantages: tensor(&combined),
            ext_returns: tensor(&ext.flat_returns()),
            int_returns: int.map(|int| tensor(&int.flat_returns())),
            ext_values: tensor(&self.ext_values.concat()),
        })
    }

    fn ensure_full(&self) -> Result<()> {
        if !self.is_full() {
            bail!("rollout holds {} of {} steps", self.pos, self.num_steps);
        }
        Ok(())
    }
}
