//! Vectorized environment pool for parallel execution
//!
//! Every environment of the pool is stepped in parallel with Rayon. An
//! environment whose game ends is reset in place and its reset observation
//! is returned in its slot, so the learner always sees a live batch.
//! Episode statistics are recorded per slot as games finish.
//!
//! # Example
//!
//! ```rust,no_run
//! use ppo_rnd::env::{control, pool::EnvPool};
//!
//! let mut pool = EnvPool::new(|i| control::mountain_car(1.0, 7 + i as u64), 4).unwrap();
//! let observations = pool.reset().unwrap();
//! assert_eq!(observations.len(), 4);
//! ```

use anyhow::{Result, bail};
use rand::Rng;
use rayon::prelude::*;

use crate::env::{
    Environment, SpaceInfo, SpaceType, StepResult,
    episode::{EpisodeRecorder, FinishedEpisode},
};

/// A pool of environments for parallel execution
///
/// For N environments with average step time T, a pool step costs roughly
/// `O(T)` instead of `O(N * T)` while N stays below the number of cores.
pub struct EnvPool<E: Environment> {
    /// Vector of environment instances
    envs: Vec<E>,

    /// Per-slot return and length accumulators
    recorder: EpisodeRecorder,
}

/// Result of stepping every environment of a pool once
#[derive(Debug, Clone)]
pub struct PoolStep {
    /// Next observation per slot (the reset observation after a game end)
    pub observations: Vec<Vec<f32>>,

    /// Training rewards per slot
    pub rewards: Vec<f32>,

    /// Unmodified rewards per slot
    pub true_rewards: Vec<f32>,

    /// Learner episode boundaries (game end or life loss)
    pub dones: Vec<bool>,

    /// Game ends (terminated or truncated)
    pub game_overs: Vec<bool>,

    /// Episodes completed on this step
    pub finished: Vec<FinishedEpisode>,
}

impl PoolStep {
    /// Observations concatenated row-major into one buffer
    pub fn flat_observations(&self) -> Vec<f32> {
        self.observations.concat()
    }

    /// Done flags as `0.0` / `1.0`
    pub fn done_mask(&self) -> Vec<f32> {
        self.dones.iter().map(|&d| if d { 1.0 } else { 0.0 }).collect()
    }
}

impl<E: Environment + Send> EnvPool<E> {
    /// Create a new environment pool
    ///
    /// # Arguments
    ///
    /// * `env_fn` - Factory called with the slot index, used to seed each
    ///   environment differently
    /// * `num_envs` - Number of parallel environments
    pub fn new<F>(env_fn: F, num_envs: usize) -> Result<Self>
    where
        F: Fn(usize) -> Result<E>,
    {
        if num_envs == 0 {
            bail!("an environment pool needs at least one environment");
        }
        let envs = (0..num_envs).map(env_fn).collect::<Result<Vec<_>>>()?;
        Ok(Self { envs, recorder: EpisodeRecorder::new(num_envs) })
    }

    /// Reset all environments in parallel
    ///
    /// Returns one initial observation per environment and clears the
    /// episode accumulators.
    pub fn reset(&mut self) -> Result<Vec<Vec<f32>>> {
        self.recorder.reset();
        self.envs.par_iter_mut().map(|env| env.reset()).collect()
    }

    /// Step all environments in parallel with given actions
    ///
    /// Environments whose game ended are reset before returning.
    ///
    /// # Errors
    ///
    /// Fails when the number of actions does not match the number of
    /// environments or when any environment fails to step.
    pub fn step(&mut self, actions: &[E::Action]) -> Result<PoolStep> {
        if actions.len() != self.envs.len() {
            bail!(
                "Number of actions ({}) must match number of environments ({})",
                actions.len(),
                self.envs.len()
            );
        }

        let results: Vec<StepResult> = self
            .envs
            .par_iter_mut()
            .zip(actions.par_iter())
            .map(|(env, action)| {
                let mut result = env.step(action)?;
                if result.game_over() {
                    result.observation = env.reset()?;
                }
                Ok(result)
            })
            .collect::<Result<_>>()?;

        let n = results.len();
        let mut step = PoolStep {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            true_rewards: Vec::with_capacity(n),
            dones: Vec::with_capacity(n),
            game_overs: Vec::with_capacity(n),
            finished: Vec::new(),
        };

        for (env_id, result) in results.into_iter().enumerate() {
            let game_over = result.game_over();
            if let Some(episode) =
                self.recorder.record(env_id, result.reward, result.info.true_reward, game_over)
            {
                step.finished.push(episode);
            }
            step.rewards.push(result.reward);
            step.true_rewards.push(result.info.true_reward);
            step.dones.push(result.done());
            step.game_overs.push(game_over);
            step.observations.push(result.observation);
        }

        Ok(step)
    }

    /// Draw one uniformly random action per environment
    pub fn sample_random_actions<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<E::Action>
    where
        E::Action: RandomAction,
    {
        let space = self.action_space();
        (0..self.envs.len()).map(|_| E::Action::random(&space, rng)).collect()
    }

    /// Get the number of environments in the pool
    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// Get observation space information from first environment
    pub fn observation_space(&self) -> SpaceInfo {
        self.envs[0].observation_space()
    }

    /// Get action space information from first environment
    pub fn action_space(&self) -> SpaceInfo {
        self.envs[0].action_space()
    }
}

/// Actions that can be drawn uniformly from an action space
pub trait RandomAction: Sized {
    /// Sample one action
    fn random<R: Rng + ?Sized>(space: &SpaceInfo, rng: &mut R) -> Self;
}

impl RandomAction for i64 {
    fn random<R: Rng + ?Sized>(space: &SpaceInfo, rng: &mut R) -> Self {
        match space.dtype {
            SpaceType::Discrete(n) => rng.gen_range(0..n.max(1)) as i64,
            SpaceType::Continuous { .. } => 0,
        }
    }
}

impl RandomAction for Vec<f32> {
    fn random<R: Rng + ?Sized>(space: &SpaceInfo, rng: &mut R) -> Self {
        match space.dtype {
            SpaceType::Continuous { low, high } => {
                (0..space.numel()).map(|_| rng.gen_range(low..=high)).collect()
            }
            SpaceType::Discrete(_) => vec![0.0; space.numel()],
        }
    }
}
