//! Inverted pendulum swing-up
//!
//! Dense negative cost on angle, angular velocity and torque. It never
//! terminates and is truncated after [`MAX_EPISODE_STEPS`] steps.

use std::f32::consts::PI;

use anyhow::{Result, bail};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::env::{Environment, SpaceInfo, SpaceType, StepInfo, StepResult};

const MAX_SPEED: f32 = 8.0;
const MAX_TORQUE: f32 = 2.0;
const DT: f32 = 0.05;
const G: f32 = 10.0;
const MASS: f32 = 1.0;
const LENGTH: f32 = 1.0;

/// Steps before truncation
pub const MAX_EPISODE_STEPS: usize = 200;

/// Pendulum state
#[derive(Debug, Clone)]
pub struct Pendulum {
    theta: f32,
    theta_dot: f32,
    steps: usize,
    rng: StdRng,
}

fn angle_normalize(x: f32) -> f32 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

impl Pendulum {
    /// Create a pendulum seeded with `seed`
    pub fn new(seed: u64) -> Self {
        Self { theta: 0.0, theta_dot: 0.0, steps: 0, rng: StdRng::seed_from_u64(seed) }
    }

    fn observation(&self) -> Vec<f32> {
        vec![self.theta.cos(), self.theta.sin(), self.theta_dot]
    }
}

impl Environment for Pendulum {
    type Action = Vec<f32>;

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.theta = self.rng.gen_range(-PI..PI);
        self.theta_dot = self.rng.gen_range(-1.0..1.0);
        self.steps = 0;
        Ok(self.observation())
    }

    fn step(&mut self, action: &Vec<f32>) -> Result<StepResult> {
        let Some(&a) = action.first() else {
            bail!("pendulum expects a 1-dimensional action");
        };
        let u = a.clamp(-MAX_TORQUE, MAX_TORQUE);

        let cost = angle_normalize(self.theta).powi(2)
            + 0.1 * self.theta_dot.powi(2)
            + 0.001 * u.powi(2);

        let accel = 3.0 * G / (2.0 * LENGTH) * self.theta.sin() + 3.0 / (MASS * LENGTH * LENGTH) * u;
        self.theta_dot = (self.theta_dot + accel * DT).clamp(-MAX_SPEED, MAX_SPEED);
        self.theta += self.theta_dot * DT;
        self.steps += 1;

        Ok(StepResult {
            observation: self.observation(),
            reward: -cost,
            terminated: false,
            truncated: self.steps >= MAX_EPISODE_STEPS,
            info: StepInfo { true_reward: -cost, ..Default::default() },
        })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![3], dtype: SpaceType::Continuous { low: -MAX_SPEED, high: MAX_SPEED } }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![1], dtype: SpaceType::Continuous { low: -MAX_TORQUE, high: MAX_TORQUE } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_normalize() {
        assert!((angle_normalize(0.5) - 0.5).abs() < 1e-6);
        assert!((angle_normalize(2.0 * PI + 0.5) - 0.5).abs() < 1e-5);
        assert!((angle_normalize(-PI - 0.5) - (PI - 0.5)).abs() < 1e-5);
    }

    #[test]
    fn test_upright_is_cheapest() {
        let mut env = Pendulum::new(0);
        env.reset().unwrap();
        env.theta = 0.0;
        env.theta_dot = 0.0;
        let step = env.step(&vec![0.0]).unwrap();
        assert_eq!(step.reward, 0.0);
        assert_eq!(step.observation[0], 1.0);
    }

    #[test]
    fn test_truncates_after_limit() {
        let mut env = Pendulum::new(1);
        env.reset().unwrap();
        for t in 1..=MAX_EPISODE_STEPS {
            let step = env.step(&vec![0.0]).unwrap();
            assert!(!step.terminated);
            assert_eq!(step.truncated, t == MAX_EPISODE_STEPS);
        }
    }
}
