//! Experience storage for on-policy training
//!
//! [`rollout::RolloutBuffer`] collects one rollout in `[num_steps,
//! num_envs]` layout, [`rollout::gae`] turns rewards and values into
//! advantages, and [`rollout::TrainingBatch`] is the flattened view the
//! trainer samples minibatches from.

pub mod rollout;

pub use rollout::{RolloutBuffer, TrainingBatch, Transition};
