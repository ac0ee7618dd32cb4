//! Generalized Advantage Estimation (GAE) computation
//!
//! This module implements GAE for computing advantages from trajectories,
//! and the discounted-return reward scaling applied before it.
//!
//! # Mathematical Formula
//! ```text
//! δ_t = r_t + γ * V_{t+1} * nnt_{t+1} - V_t
//! A_t = δ_t + γ * λ * nnt_{t+1} * A_{t+1}
//! ```
//!
//! where `nnt_{t+1}` is `1 - done` of the observation at `t + 1` (the
//! bootstrap `next_done` at the last step).

use crate::utils::{RewardForwardFilter, RunningMeanStd};

/// Advantages and returns in `[num_steps][num_envs]` layout
#[derive(Debug, Clone, PartialEq)]
pub struct Advantages {
    /// GAE advantages
    pub advantages: Vec<Vec<f32>>,

    /// `advantages + values`
    pub returns: Vec<Vec<f32>>,
}

impl Advantages {
    /// Advantages flattened step-major
    pub fn flat_advantages(&self) -> Vec<f32> {
        self.advantages.concat()
    }

    /// Returns flattened step-major
    pub fn flat_returns(&self) -> Vec<f32> {
        self.returns.concat()
    }
}

/// GAE for an episodic reward stream
///
/// # Arguments
/// * `rewards`, `values`, `dones` - `[num_steps][num_envs]`
/// * `next_value` - Bootstrap values of the observation after the rollout
/// * `next_done` - Done flags of that observation
/// * `gamma` - Discount factor (0 < gamma <= 1)
/// * `gae_lambda` - GAE lambda parameter (0 < lambda <= 1)
pub fn compute_gae(
    rewards: &[Vec<f32>],
    values: &[Vec<f32>],
    dones: &[Vec<f32>],
    next_value: &[f32],
    next_done: &[f32],
    gamma: f32,
    gae_lambda: f32,
) -> Advantages {
    let num_steps = rewards.len();
    let num_envs = next_value.len();
    debug_assert_eq!(values.len(), num_steps);
    debug_assert_eq!(dones.len(), num_steps);
    debug_assert_eq!(next_done.len(), num_envs);

    let mut out = Advantages {
        advantages: vec![vec![0.0; num_envs]; num_steps],
        returns: vec![vec![0.0; num_envs]; num_steps],
    };

    let mut env_advantages = vec![0.0; num_steps];
    let mut env_returns = vec![0.0; num_steps];
    for env_id in 0..num_envs {
        let column = |rows: &[Vec<f32>]| rows.iter().map(|row| row[env_id]).collect::<Vec<f32>>();

        compute_gae_single_env(
            &column(rewards),
            &column(values),
            &column(dones),
            next_value[env_id],
            next_done[env_id],
            gamma,
            gae_lambda,
            &mut env_advantages,
            &mut env_returns,
        );

        for step in 0..num_steps {
            out.advantages[step][env_id] = env_advantages[step];
            out.returns[step][env_id] = env_returns[step];
        }
    }
    out
}

/// GAE for a non-episodic stream (the intrinsic reward)
///
/// Every step is treated as non-terminal, so novelty keeps flowing across
/// game ends.
pub fn compute_gae_continuing(
    rewards: &[Vec<f32>],
    values: &[Vec<f32>],
    next_value: &[f32],
    gamma: f32,
    gae_lambda: f32,
) -> Advantages {
    let dones = vec![vec![0.0; next_value.len()]; rewards.len()];
    let next_done = vec![0.0; next_value.len()];
    compute_gae(rewards, values, &dones, next_value, &next_done, gamma, gae_lambda)
}

/// Compute GAE for a single environment
#[allow(clippy::too_many_arguments)]
pub(crate) fn compute_gae_single_env(
    rewards: &[f32],
    values: &[f32],
    dones: &[f32],
    next_value: f32,
    next_done: f32,
    gamma: f32,
    gae_lambda: f32,
    advantages: &mut [f32],
    returns: &mut [f32],
) {
    let num_steps = rewards.len();
    debug_assert_eq!(values.len(), num_steps);
    debug_assert_eq!(dones.len(), num_steps);

    let mut last_gae = 0.0;
    for t in (0..num_steps).rev() {
        let (next_non_terminal, next_values) = if t == num_steps - 1 {
            (1.0 - next_done, next_value)
        } else {
            (1.0 - dones[t + 1], values[t + 1])
        };

        let delta = rewards[t] + gamma * next_values * next_non_terminal - values[t];
        last_gae = delta + gamma * gae_lambda * next_non_terminal * last_gae;

        advantages[t] = last_gae;
        returns[t] = last_gae + values[t];
    }
}

/// Scale a reward stream by the std of its discounted sum
///
/// Each step is fed to `filter` with `not_done = 1 - dones[step]`, `rms`
/// is updated with every filter output of the rollout, and the rewards are
/// divided in place by `sqrt(rms.var)`. Pass all-zero dones for a
/// continuing stream.
pub fn normalize_rewards(
    rewards: &mut [Vec<f32>],
    dones: &[Vec<f32>],
    filter: &mut RewardForwardFilter,
    rms: &mut RunningMeanStd,
) {
    let mut discounted = Vec::with_capacity(rewards.len() * rewards.first().map_or(0, Vec::len));
    for (step_rewards, step_dones) in rewards.iter().zip(dones) {
        let not_done: Vec<f32> = step_dones.iter().map(|d| 1.0 - d).collect();
        discounted.extend(filter.update(step_rewards, &not_done).into_iter().map(|r| r as f32));
    }
    rms.update(&discounted);

    let scale = rms.var()[0].sqrt() as f32;
    for r in rewards.iter_mut().flatten() {
        *r /= scale;
    }
}
