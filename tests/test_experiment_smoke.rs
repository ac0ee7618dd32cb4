//! Tiny end-to-end training runs
//!
//! Each run takes a couple of iterations on CPU and checks the wiring:
//! warm-up, rollout, update, evaluation, tracking files and saved weights.

use std::{fs, path::PathBuf};

use ppo_rnd::{
    env::{
        arcade::{self, ArcadeConfig, FRAME_SIZE},
        control,
    },
    policy::{CriticHeads, GaussianAgent, PixelAgent},
    rnd::RndModel,
    train::{Experiment, ExperimentConfig, Learner, PpoConfig, ReturnNoiseConfig, RndConfig},
};
use tch::{Device, Kind, nn};

fn output_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ppo_rnd_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn test_control_rnd_run_writes_run_dir() {
    tch::manual_seed(0);
    let dir = output_dir("control");
    let config = ExperimentConfig::new()
        .env_id("Pendulum-v1")
        .exp_name("smoke")
        .seed(3)
        .track(true)
        .save_model(true)
        .eval(2, 2, 2)
        .capture_interval(1)
        .output_dir(&dir)
        .ppo(PpoConfig::control().rollout(4, 8).total_timesteps(64))
        .rnd(Some(RndConfig::control().num_iterations_obs_norm_init(1)));

    let vs = nn::VarStore::new(Device::Cpu);
    let agent = GaussianAgent::new(&(vs.root() / "agent"), 3, 1, CriticHeads::Dual);
    let rnd = RndModel::mlp(&(vs.root() / "rnd_predictor"), 3);
    let learner = Learner::new(vs, agent).with_rnd(rnd);

    let mut experiment =
        Experiment::new(config, |seed| control::make("Pendulum-v1", 1.0, seed), learner).unwrap();
    let summary = experiment.run().unwrap();

    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.global_step, 64);
    assert_eq!(experiment.global_step(), 64);
    assert!(summary.last_update.epochs > 0);
    assert!(summary.last_update.forward_loss >= 0.0);

    // Pendulum games last 200 steps, so two evaluation episodes end together
    let eval = summary.last_eval.unwrap();
    assert_eq!(eval.num_episodes, 2);
    assert_eq!(eval.ep_len, 200.0);

    let run_dir = summary.run_dir.unwrap();
    assert!(run_dir.join("config.json").exists());
    let metrics = fs::read_to_string(run_dir.join("metrics.jsonl")).unwrap();
    assert_eq!(metrics.lines().count(), 2);
    let last: serde_json::Value = serde_json::from_str(metrics.lines().last().unwrap()).unwrap();
    assert_eq!(last["global_step"], 64);
    for key in ["losses/fwd_loss", "rewards/intrinsic_rewards_mean", "returns/ret_int", "eval/score"] {
        assert!(last.get(key).is_some(), "missing {}", key);
    }

    let progress = fs::read_to_string(run_dir.join("progress.csv")).unwrap();
    assert_eq!(progress.lines().next(), Some("global_step,game_score,rewards_mean,traj_len,entropy"));
    assert_eq!(progress.lines().count(), 3);

    let model_path = summary.model_path.unwrap();
    assert!(model_path.exists());
    assert!(model_path.with_file_name("rnd_target.safetensors").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_plain_ppo_with_noise() {
    tch::manual_seed(1);
    let config = ExperimentConfig::new()
        .env_id("MountainCarContinuous-v0")
        .exp_name("ppo_norm_rew")
        .seed(11)
        .ppo(PpoConfig::control().rollout(4, 8).total_timesteps(96))
        .rnd(None)
        .noise(Some(ReturnNoiseConfig::default()));

    let vs = nn::VarStore::new(Device::Cpu);
    let agent = GaussianAgent::new(&(vs.root() / "agent"), 2, 1, CriticHeads::Single);
    let mut experiment =
        Experiment::new(config, |seed| control::mountain_car(1.0, seed), Learner::new(vs, agent)).unwrap();
    assert!(experiment.run_name().ends_with("-max-uncertainty-rate0.1"));

    let summary = experiment.run().unwrap();
    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.last_update.int_value_loss, 0.0);
    assert!(summary.run_dir.is_none());
    assert!(summary.model_path.is_none());
}

#[test]
fn test_rnd_requires_intrinsic_head() {
    let config = ExperimentConfig::new()
        .env_id("MountainCarContinuous-v0")
        .ppo(PpoConfig::control().rollout(2, 4).total_timesteps(8))
        .rnd(Some(RndConfig::control()));

    let vs = nn::VarStore::new(Device::Cpu);
    let agent = GaussianAgent::new(&(vs.root() / "agent"), 2, 1, CriticHeads::Single);
    let rnd = RndModel::mlp(&(vs.root() / "rnd_predictor"), 2);
    let learner = Learner::new(vs, agent).with_rnd(rnd);
    assert!(Experiment::new(config, |seed| control::mountain_car(1.0, seed), learner).is_err());

    // An RND configuration without a model is rejected too
    let config = ExperimentConfig::new()
        .ppo(PpoConfig::control().rollout(2, 4).total_timesteps(8))
        .rnd(Some(RndConfig::control()));
    let vs = nn::VarStore::new(Device::Cpu);
    let agent = GaussianAgent::new(&(vs.root() / "agent"), 2, 1, CriticHeads::Dual);
    assert!(
        Experiment::new(config, |seed| control::mountain_car(1.0, seed), Learner::new(vs, agent)).is_err()
    );
}

#[test]
fn test_arcade_rnd_run() {
    tch::manual_seed(2);
    let arcade_config = ArcadeConfig::default().max_episode_steps(50);
    let config = ExperimentConfig::new()
        .env_id("TreasureMaze-v0")
        .ppo(PpoConfig::default().rollout(2, 8).total_timesteps(32).num_minibatches(2).update_epochs(1))
        .rnd(Some(RndConfig::default().num_iterations_obs_norm_init(1)));

    let vs = nn::VarStore::new(Device::Cpu);
    let agent = PixelAgent::new(&(vs.root() / "agent"), arcade_config.frame_stack as i64, 5);
    let rnd = RndModel::pixel(&(vs.root() / "rnd_predictor"), FRAME_SIZE as i64);
    let learner = Learner::new(vs, agent).with_rnd(rnd).store_observations_as(Kind::Uint8);

    let mut experiment = Experiment::new(
        config,
        move |seed| arcade::make("TreasureMaze-v0", &arcade_config, seed),
        learner,
    )
    .unwrap();
    let summary = experiment.run().unwrap();

    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.global_step, 32);
    assert!(summary.last_update.forward_loss.is_finite());
    assert!(summary.last_update.int_value_loss.is_finite());
}
