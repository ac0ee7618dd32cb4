//! Train PPO + RND on a continuous-control task
//!
//! Thousands of vectorized environments, a Gaussian MLP policy with
//! extrinsic and intrinsic value heads, and an MLP RND model on the full
//! observation.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin ppo_rnd_control -- --env-id Pendulum-v1 --num-envs 256
//! ```

use anyhow::Result;
use clap::Parser;
use ppo_rnd::{
    env::{Environment, control},
    policy::{CriticHeads, GaussianAgent},
    rnd::RndModel,
    train::{Experiment, Learner, PpoConfig, RndConfig},
};
use tch::{Kind, nn};

mod common;

use common::{NoiseArgs, PpoArgs, RndArgs, RunArgs};

#[derive(Debug, Parser)]
#[command(about = "PPO with Random Network Distillation on continuous control")]
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
    rnd: RndArgs,

    #[command(flatten)]
    noise: NoiseArgs,
}

fn main() -> Result<()> {
    common::init_tracing();
    let cli = Cli::parse();

    let config = cli
        .run
        .experiment(&cli.env_id, "ppo_rnd_control", 1)
        .ppo(cli.ppo.apply(PpoConfig::control()))
        .rnd(Some(cli.rnd.apply(RndConfig::control())))
        .episode_window(512)
        .noise(cli.noise.config(false));
    tch::manual_seed(config.seed as i64);

    let probe = control::make(&cli.env_id, cli.reward_scaler, config.seed)?;
    let obs_dim = probe.observation_space().numel() as i64;
    let act_dim = probe.action_space().numel() as i64;

    let device = cli.run.device();
    tracing::info!("Environment: {}", cli.env_id);
    tracing::info!("  Observation dim: {}", obs_dim);
    tracing::info!("  Action dim: {}", act_dim);
    tracing::info!("  Reward scaler: {}", cli.reward_scaler);

    let vs = nn::VarStore::new(device);
    let agent = GaussianAgent::new(&(vs.root() / "agent"), obs_dim, act_dim, CriticHeads::Dual);
    let rnd = RndModel::mlp(&(vs.root() / "rnd_predictor"), obs_dim);
    let learner = Learner::new(vs, agent).with_rnd(rnd);

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
