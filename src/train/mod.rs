//! Training algorithms
//!
//! [`ppo`] holds the PPO update, [`experiment`] the rollout and evaluation
//! loop that drives it.

pub mod experiment;
pub mod ppo;

pub use experiment::{Experiment, ExperimentConfig, Learner, RunSummary};
pub use ppo::{PpoConfig, PpoTrainer, ReturnNoiseConfig, RndConfig, TrainingStats};
