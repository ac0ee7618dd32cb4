//! Environment traits and implementations
//!
//! This module defines the core environment interface shared by the two
//! simulation backends:
//! - [`arcade`]: pixel games with frame stacking and discrete actions
//! - [`control`]: low-dimensional continuous-control tasks
//!
//! Environments are stepped in batches through [`pool::EnvPool`].

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod arcade;
pub mod control;
pub mod episode;
pub mod pool;

/// Core trait for RL environments
///
/// Observations are always flat `f32` vectors; their logical shape is
/// reported by [`observation_space`](Environment::observation_space).
pub trait Environment {
    /// Action type (`i64` for discrete, `Vec<f32>` for continuous)
    type Action: Clone + Send + Sync;

    /// Reset the environment and return the initial observation
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Step the environment with an action
    fn step(&mut self, action: &Self::Action) -> Result<StepResult>;

    /// Get the observation space dimensions
    fn observation_space(&self) -> SpaceInfo;

    /// Get the action space dimensions
    fn action_space(&self) -> SpaceInfo;
}

/// Result of an environment step
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next observation
    pub observation: Vec<f32>,

    /// Training reward (after clipping or scaling)
    pub reward: f32,

    /// Whether the game is over
    pub terminated: bool,

    /// Whether the episode hit its time limit
    pub truncated: bool,

    /// Additional info
    pub info: StepInfo,
}

impl StepResult {
    /// Whether the game itself ended (terminated or truncated)
    pub fn game_over(&self) -> bool {
        self.terminated || self.truncated
    }

    /// Episode boundary as seen by the learner
    ///
    /// Includes life losses when the environment reports them.
    pub fn done(&self) -> bool {
        self.game_over() || self.info.life_lost
    }
}

/// Additional step information
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    /// Unmodified reward, used for score reporting
    pub true_reward: f32,

    /// Remaining lives, `0` for games without lives
    pub lives: u32,

    /// A life was lost on this step while the game continues
    pub life_lost: bool,
}

/// Space information for observations and actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceInfo {
    /// Shape of the space
    pub shape: Vec<usize>,

    /// Data type
    pub dtype: SpaceType,
}

impl SpaceInfo {
    /// Number of scalar elements in one sample
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Shape as `i64` for tensor construction
    pub fn shape_i64(&self) -> Vec<i64> {
        self.shape.iter().map(|&d| d as i64).collect()
    }
}

/// Space data types
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpaceType {
    /// Discrete space with n options
    Discrete(usize),

    /// Continuous box with the same bounds on every dimension
    Continuous {
        /// Lower bound
        low: f32,
        /// Upper bound
        high: f32,
    },
}
