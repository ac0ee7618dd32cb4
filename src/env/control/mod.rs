//! Low-dimensional continuous-control tasks
//!
//! Classic-control dynamics vectorized through [`EnvPool`](crate::env::pool::EnvPool).
//! Every task reports its unshaped reward in
//! [`StepInfo::true_reward`](crate::env::StepInfo) and trains on the reward
//! multiplied by a configurable scale.

use anyhow::{Result, bail};

use crate::env::{Environment, SpaceInfo, StepResult};

pub mod mountain_car;
pub mod pendulum;

pub use mountain_car::MountainCarContinuous;
pub use pendulum::Pendulum;

/// Task ids understood by [`make`]
pub const TASK_IDS: &[&str] = &["MountainCarContinuous-v0", "Pendulum-v1"];

#[derive(Debug, Clone)]
enum Task {
    MountainCar(MountainCarContinuous),
    Pendulum(Pendulum),
}

/// A continuous-control task with reward scaling
#[derive(Debug, Clone)]
pub struct ControlEnv {
    task: Task,
    reward_scaler: f32,
}

impl ControlEnv {
    /// Training-reward multiplier
    pub fn reward_scaler(&self) -> f32 {
        self.reward_scaler
    }
}

impl Environment for ControlEnv {
    type Action = Vec<f32>;

    fn reset(&mut self) -> Result<Vec<f32>> {
        match &mut self.task {
            Task::MountainCar(env) => env.reset(),
            Task::Pendulum(env) => env.reset(),
        }
    }

    fn step(&mut self, action: &Vec<f32>) -> Result<StepResult> {
        let mut result = match &mut self.task {
            Task::MountainCar(env) => env.step(action)?,
            Task::Pendulum(env) => env.step(action)?,
        };
        result.reward = result.info.true_reward * self.reward_scaler;
        Ok(result)
    }

    fn observation_space(&self) -> SpaceInfo {
        match &self.task {
            Task::MountainCar(env) => env.observation_space(),
            Task::Pendulum(env) => env.observation_space(),
        }
    }

    fn action_space(&self) -> SpaceInfo {
        match &self.task {
            Task::MountainCar(env) => env.action_space(),
            Task::Pendulum(env) => env.action_space(),
        }
    }
}

/// Create a task by id
///
/// # Errors
///
/// Fails for unknown ids.
pub fn make(env_id: &str, reward_scaler: f32, seed: u64) -> Result<ControlEnv> {
    let task = match env_id {
        "MountainCarContinuous-v0" => Task::MountainCar(MountainCarContinuous::new(seed)),
        "Pendulum-v1" => Task::Pendulum(Pendulum::new(seed)),
        other => bail!("unknown control task '{}' (known: {})", other, TASK_IDS.join(", ")),
    };
    Ok(ControlEnv { task, reward_scaler })
}

/// Shorthand for `make("MountainCarContinuous-v0", ..)`
pub fn mountain_car(reward_scaler: f32, seed: u64) -> Result<ControlEnv> {
    make("MountainCarContinuous-v0", reward_scaler, seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_known_tasks() {
        for id in TASK_IDS {
            let mut env = make(id, 1.0, 0).unwrap();
            let obs = env.reset().unwrap();
            assert_eq!(obs.len(), env.observation_space().numel());
            assert_eq!(env.action_space().shape, vec![1]);
        }
        assert!(make("Humanoid", 1.0, 0).is_err());
    }

    #[test]
    fn test_reward_scaler_keeps_true_reward() {
        let mut env = make("Pendulum-v1", 0.5, 3).unwrap();
        env.reset().unwrap();
        let step = env.step(&vec![1.0]).unwrap();
        assert!(step.info.true_reward < 0.0);
        assert!((step.reward - 0.5 * step.info.true_reward).abs() < 1e-6);
        assert_eq!(env.reward_scaler(), 0.5);
    }
}
