//! Train PPO + RND on a pixel arcade game
//!
//! Frame-stacked 84x84 observations, a categorical CNN policy with
//! extrinsic and intrinsic value heads, and a convolutional RND model on
//! the newest frame.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin ppo_rnd_arcade -- --track --total-timesteps 10000000
//! ```

use anyhow::{Result, bail};
use clap::Parser;
use ppo_rnd::{
    env::{
        Environment, SpaceType,
        arcade::{self, ArcadeConfig, FRAME_SIZE},
    },
    policy::PixelAgent,
    rnd::RndModel,
    train::{Experiment, Learner, PpoConfig, RndConfig},
};
use tch::{Kind, nn};

mod common;

use common::{NoiseArgs, PpoArgs, RndArgs, RunArgs};

#[derive(Debug, Parser)]
#[command(about = "PPO with Random Network Distillation on pixel games")]
struct Cli {
    /// Game id
    #[arg(long, default_value = "TreasureMaze-v0")]
    env_id: String,

    /// Probability of repeating the previous action
    #[arg(long, default_value_t = 0.25)]
    repeat_action_probability: f64,

    /// Truncate games after this many agent steps
    #[arg(long, default_value_t = 27_000)]
    max_episode_steps: usize,

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
        .experiment(&cli.env_id, "ppo_rnd_arcade", 1)
        .ppo(cli.ppo.apply(PpoConfig::default()))
        .rnd(Some(cli.rnd.apply(RndConfig::default())))
        .noise(cli.noise.config(false));
    tch::manual_seed(config.seed as i64);

    let arcade = ArcadeConfig::default()
        .repeat_action_probability(cli.repeat_action_probability)
        .max_episode_steps(cli.max_episode_steps);
    arcade.validate()?;

    let probe = arcade::make(&cli.env_id, &arcade, config.seed)?;
    let frames = probe.observation_space().shape[0] as i64;
    let num_actions = match probe.action_space().dtype {
        SpaceType::Discrete(n) => n as i64,
        SpaceType::Continuous { .. } => bail!("{} does not have a discrete action space", cli.env_id),
    };

    let device = cli.run.device();
    tracing::info!("Environment: {}", cli.env_id);
    tracing::info!("  Observation shape: [{}, {}, {}]", frames, FRAME_SIZE, FRAME_SIZE);
    tracing::info!("  Actions: {}", num_actions);
    tracing::info!("  Device: {:?}", device);

    let vs = nn::VarStore::new(device);
    let agent = PixelAgent::new(&(vs.root() / "agent"), frames, num_actions);
    let rnd = RndModel::pixel(&(vs.root() / "rnd_predictor"), FRAME_SIZE as i64);
    let learner = Learner::new(vs, agent).with_rnd(rnd).store_observations_as(Kind::Uint8);

    let env_id = cli.env_id.clone();
    let mut experiment =
        Experiment::new(config, move |seed| arcade::make(&env_id, &arcade, seed), learner)?;
    let summary = experiment.run()?;

    tracing::info!(
        "{}: {} steps, game score {:.2}, episode return {:.2} ({:.0}s)",
        summary.run_name,
        summary.global_step,
        summary.game_score,
        summary.episode_return,
        summary.elapsed
    );
    Ok(())
}
