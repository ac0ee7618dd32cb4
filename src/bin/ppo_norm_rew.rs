//! Train plain PPO with normalized rewards and value-target noise
//!
//! The RND-free baseline: extrinsic rewards are scaled by the std of their
//! discounted sums and, unless `--add-noise false` is given, the value
//! targets of the most uncertain samples are perturbed.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin ppo_norm_rew -- --add-noise false --track
//! ```

use anyhow::Result;
use clap::Parser;
use ppo_rnd::{
    env::{Environment, control},
    policy::{CriticHeads, GaussianAgent},
    train::{Experiment, Learner, PpoConfig},
};
use tch::{Kind, nn};

mod common;

use common::{NoiseArgs, PpoArgs, RunArgs};

#[derive(Debug, Parser)]
#[command(about = "PPO with reward normalization and value-target noise")]
struct Cli {
    /// Task id
    #[arg(long, default_value = "MountainCarContinuous-v0")]
    env_id: String,

    /// Scale factor applied to the reward during training
    #[arg(long, default_value_t = 1.0)]
    reward_scaler: f32,

    #[command(flatten)]
    run: RunArgs,

    #[command(flatten)]
    ppo: PpoArgs,

    #[command(flatten)]
    noise: NoiseArgs,
}

fn main() -> Result<()> {
    common::init_tracing();
    let cli = Cli::parse();

    let preset = PpoConfig::control().total_timesteps(300_000_000);
    let config = cli
        .run
        .experiment(&cli.env_id, "ppo_norm_rew", 11)
        .ppo(cli.ppo.apply(preset))
        .rnd(None)
        .episode_window(512)
        .noise(cli.noise.config(true));
    tch::manual_seed(config.seed as i64);

    let probe = control::make(&cli.env_id, cli.reward_scaler, config.seed)?;
    let obs_dim = probe.observation_space().numel() as i64;
    let act_dim = probe.action_space().numel() as i64;

    let device = cli.run.device();
    tracing::info!("Environment: {}", cli.env_id);
    tracing::info!("  Observation dim: {}", obs_dim);
    tracing::info!("  Action dim: {}", act_dim);
    match &config.noise {
        Some(noise) => tracing::info!("  Value-target noise: rate {}, weight {}", noise.rate, noise.noise_w),
        None => tracing::info!("  Value-target noise: off"),
    }

    let vs = nn::VarStore::new(device);
    let agent = GaussianAgent::new(&(vs.root() / "agent"), obs_dim, act_dim, CriticHeads::Single);
    let learner = Learner::new(vs, agent);

    let (env_id, reward_scaler) = (cli.env_id.clone(), cli.reward_scaler);
    let mut experiment =
        Experiment::new(config, move |seed| control::make(&env_id, reward_scaler, seed), learner)?;
    let summary = experiment.run()?;

    let action_std = experiment.agent().action_std().mean(Kind::Float).double_value(&[]);
    tracing::info!(
        "{}: {} steps, game score {:.2}, action std {:.3} ({:.0}s)",
        summary.run_name,
        summary.global_step,
        summary.game_score,
        action_std,
        summary.elapsed
    );
    Ok(())
}
