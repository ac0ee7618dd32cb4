//! # ppo-rnd
//!
//! Proximal Policy Optimization with Random Network Distillation
//! exploration, on pixel arcade games and vectorized continuous control.
//!
//! The crate is organized as one pipeline:
//!
//! - [`env`]: environments behind one trait, stepped in parallel by a pool
//! - [`policy`]: actor-critic networks with extrinsic and intrinsic heads
//! - [`rnd`]: predictor/target networks producing the novelty bonus
//! - [`buffer`]: rollout storage, GAE and reward normalization
//! - [`train`]: the PPO update and the experiment loop driving it
//! - [`tracking`]: run directories, metrics and intrinsic-reward traces
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ppo_rnd::prelude::*;
//! use tch::nn;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ExperimentConfig::new()
//!     .env_id("MountainCarContinuous-v0")
//!     .ppo(PpoConfig::control().rollout(64, 16).total_timesteps(100_000))
//!     .rnd(Some(RndConfig::control()));
//!
//! let vs = nn::VarStore::new(tch::Device::Cpu);
//! let agent = GaussianAgent::new(&(vs.root() / "agent"), 2, 1, CriticHeads::Dual);
//! let rnd = RndModel::mlp(&(vs.root() / "rnd_predictor"), 2);
//! let learner = Learner::new(vs, agent).with_rnd(rnd);
//!
//! let mut experiment = Experiment::new(config, |seed| control::mountain_car(1.0, seed), learner)?;
//! let summary = experiment.run()?;
//! println!("game score: {:.2}", summary.game_score);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Environment trait, native games and tasks, and the parallel pool
pub mod env;

/// Actor-critic networks
pub mod policy;

/// Random Network Distillation
pub mod rnd;

/// Rollout storage and advantage estimation
pub mod buffer;

/// PPO and the experiment driver
pub mod train;

/// Run directories and metrics
pub mod tracking;

/// Running statistics and small numeric helpers
pub mod utils;

/// Prelude module for convenient imports
///
/// This module re-exports commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::{
        env::{Environment, arcade, control, pool::EnvPool},
        policy::{ActorCritic, CriticHeads, GaussianAgent, PixelAgent},
        rnd::RndModel,
        train::{
            Experiment, ExperimentConfig, Learner, PpoConfig, PpoTrainer, ReturnNoiseConfig,
            RndConfig, RunSummary, TrainingStats,
        },
    };
}

/// Current version of ppo-rnd
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
