//! Continuous mountain car
//!
//! An under-powered car must rock back and forth to climb the right hill.
//! Reaching the flag pays +100, every step costs `0.1 * a^2`, so a
//! cautious policy learns to stand still unless it explores.

use anyhow::{Result, bail};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::env::{Environment, SpaceInfo, SpaceType, StepInfo, StepResult};

const MIN_POSITION: f32 = -1.2;
const MAX_POSITION: f32 = 0.6;
const MAX_SPEED: f32 = 0.07;
const GOAL_POSITION: f32 = 0.45;
const GOAL_VELOCITY: f32 = 0.0;
const POWER: f32 = 0.0015;

/// Steps before truncation
pub const MAX_EPISODE_STEPS: usize = 999;

/// Continuous mountain car state
#[derive(Debug, Clone)]
pub struct MountainCarContinuous {
    position: f32,
    velocity: f32,
    steps: usize,
    rng: StdRng,
}

impl MountainCarContinuous {
    /// Create a car seeded with `seed`
    pub fn new(seed: u64) -> Self {
        Self { position: -0.5, velocity: 0.0, steps: 0, rng: StdRng::seed_from_u64(seed) }
    }

    /// Current `(position, velocity)`
    pub fn state(&self) -> (f32, f32) {
        (self.position, self.velocity)
    }

    /// Overwrite the state (for tests and scripted starts)
    pub fn set_state(&mut self, position: f32, velocity: f32) {
        self.position = position;
        self.velocity = velocity;
    }
}

impl Environment for MountainCarContinuous {
    type Action = Vec<f32>;

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.position = self.rng.gen_range(-0.6..-0.4);
        self.velocity = 0.0;
        self.steps = 0;
        Ok(vec![self.position, self.velocity])
    }

    fn step(&mut self, action: &Vec<f32>) -> Result<StepResult> {
        let Some(&a) = action.first() else {
            bail!("mountain car expects a 1-dimensional action");
        };
        let force = a.clamp(-1.0, 1.0);

        self.velocity += force * POWER - 0.0025 * (3.0 * self.position).cos();
        self.velocity = self.velocity.clamp(-MAX_SPEED, MAX_SPEED);
        self.position += self.velocity;
        self.position = self.position.clamp(MIN_POSITION, MAX_POSITION);
        if self.position == MIN_POSITION && self.velocity < 0.0 {
            self.velocity = 0.0;
        }
        self.steps += 1;

        let terminated = self.position >= GOAL_POSITION && self.velocity >= GOAL_VELOCITY;
        let mut reward = if terminated { 100.0 } else { 0.0 };
        reward -= a * a * 0.1;

        Ok(StepResult {
            observation: vec![self.position, self.velocity],
            reward,
            terminated,
            truncated: !terminated && self.steps >= MAX_EPISODE_STEPS,
            info: StepInfo { true_reward: reward, ..Default::default() },
        })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo {
            shape: vec![2],
            dtype: SpaceType::Continuous { low: MIN_POSITION, high: MAX_POSITION },
        }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![1], dtype: SpaceType::Continuous { low: -1.0, high: 1.0 } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_range() {
        let mut env = MountainCarContinuous::new(0);
        for _ in 0..20 {
            let obs = env.reset().unwrap();
            assert!((-0.6..-0.4).contains(&obs[0]));
            assert_eq!(obs[1], 0.0);
        }
    }

    #[test]
    fn test_action_cost() {
        let mut env = MountainCarContinuous::new(0);
        env.reset().unwrap();
        let step = env.step(&vec![0.5]).unwrap();
        assert!((step.reward + 0.025).abs() < 1e-6);
        assert!(!step.terminated);
    }

    #[test]
    fn test_goal_pays_bonus() {
        let mut env = MountainCarContinuous::new(0);
        env.reset().unwrap();
        env.set_state(0.44, 0.05);
        let step = env.step(&vec![0.0]).unwrap();
        assert!(step.terminated);
        assert_eq!(step.reward, 100.0);
        assert_eq!(step.info.true_reward, 100.0);
    }

    #[test]
    fn test_left_wall_stops_car() {
        let mut env = MountainCarContinuous::new(0);
        env.reset().unwrap();
        env.set_state(-1.19, -0.07);
        env.step(&vec![-1.0]).unwrap();
        assert_eq!(env.state(), (MIN_POSITION, 0.0));
    }

    #[test]
    fn test_time_limit() {
        let mut env = MountainCarContinuous::new(0);
        env.reset().unwrap();
        let mut last = None;
        for _ in 0..MAX_EPISODE_STEPS {
            last = Some(env.step(&vec![0.0]).unwrap());
        }
        let last = last.unwrap();
        assert!(last.truncated);
        assert!(!last.terminated);
    }

    #[test]
    fn test_empty_action_rejected() {
        let mut env = MountainCarContinuous::new(0);
        env.reset().unwrap();
        assert!(env.step(&vec![]).is_err());
    }
}
