//! Proximal Policy Optimization (PPO) algorithm
//!
//! This module implements the PPO update used by every experiment, with
//! the two extensions they rely on:
//! - a second (intrinsic) value head trained alongside the extrinsic one,
//!   plus the RND predictor loss in the same optimizer step
//! - optional noise on the value targets of the samples with the largest
//!   TD error ([`noise`])
//!
//! # Algorithm Overview
//!
//! ```text
//! For each iteration:
//!   1. Collect a rollout using the current policy
//!   2. Compute advantages using GAE (per reward stream)
//!   3. For update_epochs epochs:
//!      a. Shuffle the batch into minibatches
//!      b. Compute PPO loss (clipped objective), value losses, RND loss
//!      c. Clip the gradient norm and take an Adam step
//!      d. Stop early once the KL estimate passes target_kl
//! ```
//!
//! # References
//!
//! - [Proximal Policy Optimization Algorithms](https://arxiv.org/abs/1707.06347)
//! - [Exploration by Random Network Distillation](https://arxiv.org/abs/1810.12894)

pub mod config;
pub mod loss;
pub mod noise;
pub mod stats;
pub mod trainer;

pub use config::{PpoConfig, RndConfig};
pub use loss::{PolicyDiagnostics, compute_policy_loss, compute_value_loss, normalize_advantages};
pub use noise::ReturnNoiseConfig;
pub use stats::TrainingStats;
pub use trainer::{PpoTrainer, RndUpdate};
