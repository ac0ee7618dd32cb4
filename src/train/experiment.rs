//! Rollout-then-update training driver
//!
//! An [`Experiment`] owns the environment pool, the networks and the PPO
//! trainer, and runs the loop shared by every binary:
//!
//! ```text
//! warm up RND observation statistics with random actions
//! for update in 1..=num_updates:
//!     anneal learning rate
//!     roll out num_steps steps (intrinsic reward on the next observation)
//!     normalize rewards by the std of their discounted sums
//!     GAE per reward stream, mix advantages
//!     update RND observation statistics with the rollout
//!     PPO (+ RND predictor) update
//!     evaluate, log metrics
//! save weights
//! ```
//!
//! Without an RND model the same loop runs plain PPO on normalized
//! extrinsic rewards.

use std::{path::PathBuf, time::Instant};

use anyhow::{Result, bail};
use rand::{SeedableRng, rngs::StdRng};
use tch::{Device, Kind, Tensor, nn};

mod config;
mod curiosity;
pub mod eval;

pub use config::ExperimentConfig;
pub use eval::EvalSummary;

use crate::{
    buffer::{
        RolloutBuffer, Transition,
        rollout::{
            AdvantageMix,
            gae::{compute_gae, compute_gae_continuing, normalize_rewards},
        },
    },
    env::{
        Environment,
        episode::EpisodeWindow,
        pool::{EnvPool, RandomAction},
    },
    policy::{ActorCritic, PolicyAction},
    rnd::RndModel,
    tracking::{self, CuriosityTrace, Metrics, RunDir, TraceRecorder},
    train::ppo::{PpoTrainer, RndUpdate, TrainingStats, loss::scalar},
    utils::{self, RewardForwardFilter, RunningMeanStd},
};
use curiosity::Curiosity;

/// Copy a tensor to a flat host vector
pub(crate) fn host_vec(t: &Tensor) -> Result<Vec<f32>> {
    let flat = t.to_device(Device::Cpu).to_kind(Kind::Float).contiguous().view([-1]);
    Ok(Vec::<f32>::try_from(&flat)?)
}

/// Stack per-environment observations into `[n, ...obs_shape]`
fn batch_tensor(rows: &[Vec<f32>], obs_shape: &[i64], device: Device) -> Tensor {
    let mut shape = Vec::with_capacity(obs_shape.len() + 1);
    shape.push(rows.len() as i64);
    shape.extend_from_slice(obs_shape);
    Tensor::from_slice(&rows.concat()).view(shape.as_slice()).to_device(device)
}

/// Trainable networks of a run
#[derive(Debug)]
pub struct Learner<A> {
    /// Store holding every trainable parameter
    pub vs: nn::VarStore,

    /// Actor-critic agent
    pub agent: A,

    /// RND model whose predictor lives in `vs`
    pub rnd: Option<RndModel>,

    /// Kind observations are stored as in the rollout buffer
    pub obs_kind: Kind,
}

impl<A: ActorCritic> Learner<A> {
    /// Agent trained without RND
    pub fn new(vs: nn::VarStore, agent: A) -> Self {
        Self { vs, agent, rnd: None, obs_kind: Kind::Float }
    }

    /// Add an RND model
    pub fn with_rnd(mut self, rnd: RndModel) -> Self {
        self.rnd = Some(rnd);
        self
    }

    /// Store rollout observations as `kind` (`Uint8` for frames)
    pub fn store_observations_as(mut self, kind: Kind) -> Self {
        self.obs_kind = kind;
        self
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Run name
    pub run_name: String,

    /// Iterations completed
    pub iterations: usize,

    /// Environment steps taken, all environments counted
    pub global_step: usize,

    /// Games finished
    pub episodes: usize,

    /// Mean game score over the episode window
    pub game_score: f64,

    /// Mean training-reward return over the episode window
    pub episode_return: f64,

    /// Statistics of the last PPO update
    pub last_update: TrainingStats,

    /// Last evaluation, if any ran
    pub last_eval: Option<EvalSummary>,

    /// Wall-clock seconds
    pub elapsed: f64,

    /// Run directory of tracked runs
    pub run_dir: Option<PathBuf>,

    /// Saved weights
    pub model_path: Option<PathBuf>,
}

/// Pool observations and flags carried between iterations
struct RolloutState {
    buffer: RolloutBuffer,
    next_obs: Vec<Vec<f32>>,
    next_done: Vec<f32>,
}

type EnvFactory<E> = Box<dyn Fn(u64) -> Result<E>>;

/// One training run
pub struct Experiment<E: Environment, A> {
    config: ExperimentConfig,
    run_name: String,
    make_env: EnvFactory<E>,
    envs: EnvPool<E>,
    obs_shape: Vec<i64>,
    vs: nn::VarStore,
    agent: A,
    obs_kind: Kind,
    curiosity: Option<Curiosity>,
    trainer: PpoTrainer,
    ext_filter: RewardForwardFilter,
    ext_rms: RunningMeanStd,
    window: EpisodeWindow,
    traces: TraceRecorder,
    rng: StdRng,
    run: Option<RunDir>,
    global_step: usize,
}

impl<E, A> Experiment<E, A>
where
    E: Environment + Send,
    E::Action: PolicyAction + RandomAction,
    A: ActorCritic,
{
    /// Build the environment pool, trainer and run directory
    ///
    /// # Arguments
    ///
    /// * `config` - Run configuration
    /// * `make_env` - Environment factory, called with `seed + env_index`
    /// * `learner` - Networks, with an RND model exactly when `config.rnd`
    ///   is set
    pub fn new<F>(config: ExperimentConfig, make_env: F, learner: Learner<A>) -> Result<Self>
    where
        F: Fn(u64) -> Result<E> + 'static,
    {
        config.validate()?;
        let Learner { vs, agent, rnd, obs_kind } = learner;
        if config.rnd.is_some() != rnd.is_some() {
            bail!("an RND configuration needs an RND model and vice versa");
        }
        if rnd.is_some() && !agent.has_intrinsic_head() {
            bail!("RND needs an agent with an intrinsic value head");
        }

        let seed = config.seed;
        let envs = EnvPool::new(|i| make_env(seed + i as u64), config.ppo.num_envs)?;
        let obs_shape = envs.observation_space().shape_i64();

        let trainer = PpoTrainer::new(config.ppo.clone(), config.noise.clone(), &vs, seed)?;
        let int_gamma = config.rnd.as_ref().map_or(config.ppo.gamma, |rnd| rnd.int_gamma);
        let curiosity = rnd.map(|model| Curiosity::new(model, int_gamma));

        let run_name = config.run_name();
        let run = if config.track { Some(RunDir::create(&config.output_dir, &run_name, &config)?) } else { None };

        Ok(Self {
            run_name,
            make_env: Box::new(make_env),
            envs,
            obs_shape,
            vs,
            agent,
            obs_kind,
            curiosity,
            trainer,
            ext_filter: RewardForwardFilter::new(config.ppo.gamma),
            ext_rms: RunningMeanStd::scalar(),
            window: EpisodeWindow::new(config.episode_window),
            traces: TraceRecorder::new(config.capture_interval, int_gamma),
            rng: StdRng::seed_from_u64(seed),
            run,
            global_step: 0,
            config,
        })
    }

    /// Run name
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Configuration
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// The agent being trained
    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// Store holding the agent and RND predictor
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Environment steps taken so far
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Train for `total_timesteps / batch_size` iterations
    pub fn run(&mut self) -> Result<RunSummary> {
        let start = Instant::now();
        let num_updates = self.config.ppo.num_updates();
        let (num_steps, num_envs) = (self.config.ppo.num_steps, self.config.ppo.num_envs);
        tracing::info!("Starting {}", self.run_name);
        tracing::info!("  Device: {:?}", self.agent.device());
        tracing::info!("  Num envs: {} x {} steps", num_envs, num_steps);
        tracing::info!("  Updates: {}", num_updates);

        self.warm_up()?;

        let mut state = RolloutState {
            buffer: RolloutBuffer::new(num_steps, num_envs, self.obs_kind, self.agent.device()),
            next_obs: self.envs.reset()?,
            next_done: vec![0.0; num_envs],
        };

        let mut last_update = TrainingStats::zeros();
        let mut last_eval = None;
        for update in 1..=num_updates {
            let it_start = Instant::now();
            let (stats, mut metrics, trace) = self.iterate(update, num_updates, &mut state, start)?;

            if self.config.eval_interval > 0 && update % self.config.eval_interval == 0 {
                let summary = self.evaluate()?;
                metrics.extend(summary.metrics());
                last_eval = Some(summary);
            }
            metrics.record("charts/time_per_it", it_start.elapsed().as_secs_f64());

            tracing::info!(
                "Update {}/{} | Steps: {} | SPS: {} | Score: {:.2} | PL: {:.3} | VL: {:.3} | Ent: {:.3} | KL: {:.4}",
                update,
                num_updates,
                self.global_step,
                metrics.get("charts/SPS").unwrap_or(0.0),
                metrics.get("charts/game_score").unwrap_or(0.0),
                stats.policy_loss,
                stats.value_loss(),
                stats.entropy,
                stats.approx_kl,
            );

            if let Some(run) = self.run.as_mut() {
                run.log(self.global_step, &metrics)?;
                if let Some(trace) = &trace {
                    run.log_trace(self.global_step, trace)?;
                }
            }
            last_update = stats;
        }

        let model_path = if self.config.save_model { Some(self.save()?) } else { None };
        if let Some(run) = self.run.as_mut() {
            run.flush()?;
        }

        let summary = RunSummary {
            run_name: self.run_name.clone(),
            iterations: num_updates,
            global_step: self.global_step,
            episodes: self.window.total(),
            game_score: self.window.true_returns().mean,
            episode_return: self.window.returns().mean,
            last_update,
            last_eval,
            elapsed: start.elapsed().as_secs_f64(),
            run_dir: self.run.as_ref().map(|run| run.path().to_path_buf()),
            model_path,
        };
        tracing::info!("Training complete!");
        tracing::info!("  Total steps: {}", summary.global_step);
        tracing::info!("  Total episodes: {}", summary.episodes);
        Ok(summary)
    }

    /// Initialize the RND observation statistics with random actions
    ///
    /// Runs `num_steps * num_iterations_obs_norm_init` steps and updates
    /// the statistics once per `num_steps` steps.
    fn warm_up(&mut self) -> Result<()> {
        let iterations = self.config.rnd.as_ref().map_or(0, |rnd| rnd.num_iterations_obs_norm_init);
        let num_steps = self.config.ppo.num_steps;
        let device = self.agent.device();
        let Some(curiosity) = self.curiosity.as_mut() else {
            return Ok(());
        };
        if iterations == 0 {
            return Ok(());
        }

        tracing::info!("Initializing observation normalization ({} random steps)...", num_steps * iterations);
        let start = Instant::now();
        self.envs.reset()?;
        let mut pending = Vec::with_capacity(num_steps);
        for step in 0..num_steps * iterations {
            let actions = self.envs.sample_random_actions(&mut self.rng);
            let out = self.envs.step(&actions)?;
            pending.push(curiosity.project(&batch_tensor(&out.observations, &self.obs_shape, device)));

            if (step + 1) % num_steps == 0 {
                curiosity.update_stats(&Tensor::cat(&pending, 0))?;
                pending.clear();
            }
        }
        tracing::info!("  Finished in {:.1}s", start.elapsed().as_secs_f64());
        Ok(())
    }

    /// One rollout and update
    fn iterate(
        &mut self,
        update: usize,
        num_updates: usize,
        state: &mut RolloutState,
        start: Instant,
    ) -> Result<(TrainingStats, Metrics, Option<CuriosityTrace>)> {
        let (num_steps, num_envs) = (self.config.ppo.num_steps, self.config.ppo.num_envs);
        let device = self.agent.device();
        self.traces.begin_iteration(update);
        let learning_rate = self.trainer.anneal(update);

        state.buffer.reset();
        let mut trace = None;
        for step in 0..num_steps {
            self.global_step += num_envs;
            let obs = batch_tensor(&state.next_obs, &self.obs_shape, device);
            let sample = tch::no_grad(|| self.agent.act(&obs, false));
            let actions = E::Action::from_tensor(&sample.actions)?;
            let out = self.envs.step(&actions)?;

            let curiosity = match &self.curiosity {
                Some(c) => Some(c.reward(&batch_tensor(&out.observations, &self.obs_shape, device))?),
                None => None,
            };
            if let Some(rewards) = &curiosity {
                if let Some(finished) = self.traces.observe(rewards[0], out.game_overs[0]) {
                    tracing::info!("Recorded intrinsic rewards of a {}-step episode", finished.len());
                    trace = Some(finished);
                }
            }
            for episode in &out.finished {
                self.window.push(episode);
            }

            state.buffer.add(
                step,
                Transition {
                    observation: obs,
                    done: std::mem::replace(&mut state.next_done, out.done_mask()),
                    action: sample.actions,
                    log_prob: host_vec(&sample.log_probs)?,
                    ext_value: host_vec(&sample.values.ext)?,
                    int_value: sample.values.int.as_ref().map(host_vec).transpose()?,
                    reward: out.rewards,
                    true_reward: out.true_rewards,
                    curiosity,
                },
            )?;
            state.next_obs = out.observations;
        }

        let dones = state.buffer.dones().to_vec();
        if self.config.normalize_ext_rewards() {
            normalize_rewards(state.buffer.rewards_mut(), &dones, &mut self.ext_filter, &mut self.ext_rms);
        }
        if let Some(curiosity) = self.curiosity.as_mut() {
            curiosity.normalize_rewards(state.buffer.curiosity_rewards_mut(), &dones);
        }

        // Bootstrap from the observation after the rollout
        let next_obs = batch_tensor(&state.next_obs, &self.obs_shape, device);
        let next_values = tch::no_grad(|| self.agent.values(&next_obs));
        let ppo = &self.config.ppo;
        let ext = compute_gae(
            state.buffer.rewards(),
            state.buffer.ext_values(),
            &dones,
            &host_vec(&next_values.ext)?,
            &state.next_done,
            ppo.gamma as f32,
            ppo.gae_lambda as f32,
        );
        let int = match (&self.config.rnd, &next_values.int) {
            (Some(rnd), Some(next_int)) => Some(compute_gae_continuing(
                state.buffer.curiosity_rewards(),
                state.buffer.int_values(),
                &host_vec(next_int)?,
                rnd.int_gamma as f32,
                ppo.gae_lambda as f32,
            )),
            _ => None,
        };
        let mix = self.config.rnd.as_ref().map_or(AdvantageMix::EXTRINSIC, |rnd| AdvantageMix {
            ext_coef: rnd.ext_coef as f32,
            int_coef: rnd.int_coef as f32,
        });
        let mut batch = state.buffer.training_batch(&ext, int.as_ref(), mix)?;
        let advantages_mean = scalar(&batch.advantages.mean(Kind::Float));

        let rnd_inputs = match self.curiosity.as_mut() {
            Some(curiosity) => {
                let projected = curiosity.project(&batch.observations);
                curiosity.update_stats(&projected)?;
                Some(curiosity.whiten(&projected))
            }
            None => None,
        };
        let rnd_update = match (&self.curiosity, &rnd_inputs, &self.config.rnd) {
            (Some(curiosity), Some(inputs), Some(rnd)) => {
                Some(RndUpdate { model: &curiosity.model, inputs, update_proportion: rnd.update_proportion })
            }
            _ => None,
        };
        let stats = self.trainer.update(&self.agent, &mut batch, rnd_update, update, num_updates)?;

        let mut metrics = Metrics::new();
        let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);
        metrics
            .record("charts/iterations", update as f64)
            .record("charts/learning_rate", learning_rate)
            .record("charts/SPS", (self.global_step as f64 / elapsed).floor())
            .record("losses/ext_value_loss", stats.ext_value_loss)
            .record("losses/policy_loss", stats.policy_loss)
            .record("losses/entropy", stats.entropy)
            .record("losses/old_approx_kl", stats.old_approx_kl)
            .record("losses/approx_kl", stats.approx_kl)
            .record("losses/clipfrac", stats.clip_fraction)
            .record("losses/all_loss", stats.total_loss)
            .record(
                "losses/explained_variance",
                utils::explained_variance(&state.buffer.ext_values().concat(), &ext.flat_returns()),
            );
        if self.curiosity.is_some() {
            metrics
                .record("losses/int_value_loss", stats.int_value_loss)
                .record("losses/fwd_loss", stats.forward_loss);
        } else {
            metrics.record("losses/value_loss", stats.ext_value_loss);
        }
        if self.config.noise.is_some() {
            metrics.record("losses/td_shift", stats.noise_td_shift);
        }

        record_extremes(&mut metrics, "rewards/rewards", &state.buffer.rewards().concat());
        record_extremes(&mut metrics, "rewards/true_rewards", &state.buffer.true_rewards().concat());
        let positive = (0..num_envs)
            .filter(|&env| state.buffer.rewards().iter().map(|step| step[env]).sum::<f32>() > 0.0)
            .count();
        metrics.record("rewards/num_envs_with_pos_rews", positive as f64);

        metrics
            .record("returns/advantages", advantages_mean)
            .record("returns/ext_advantages", utils::mean(&ext.flat_advantages()))
            .record("returns/ret_ext", utils::mean(&ext.flat_returns()))
            .record("returns/values_ext", utils::mean(&state.buffer.ext_values().concat()));
        if let Some(int) = &int {
            record_extremes(&mut metrics, "rewards/intrinsic_rewards", &state.buffer.curiosity_rewards().concat());
            metrics
                .record("returns/int_advantages", utils::mean(&int.flat_advantages()))
                .record("returns/ret_int", utils::mean(&int.flat_returns()))
                .record("returns/values_int", utils::mean(&state.buffer.int_values().concat()));
        }

        let lengths = self.window.lengths();
        let scores = self.window.true_returns();
        let returns = self.window.returns();
        metrics
            .record("charts/traj_len", lengths.mean)
            .record("charts/max_traj_len", lengths.max)
            .record("charts/min_traj_len", lengths.min)
            .record("charts/game_score", scores.mean)
            .record("charts/max_game_score", scores.max)
            .record("charts/min_game_score", scores.min)
            .record("charts/episode_return", returns.mean)
            .record("charts/max_episode_return", returns.max)
            .record("charts/min_episode_return", returns.min);

        Ok((stats, metrics, trace))
    }

    /// Play the deterministic policy in a fresh pool
    ///
    /// Runs `num_eval_envs` environments until at least
    /// `num_eval_episodes` games have finished.
    pub fn evaluate(&self) -> Result<EvalSummary> {
        let start = Instant::now();
        let seed = self.config.seed;
        let device = self.agent.device();
        let mut pool = EnvPool::new(|i| (self.make_env)(seed + i as u64), self.config.num_eval_envs)?;

        tracing::info!("Evaluating at step {}...", self.global_step);
        let mut obs = pool.reset()?;
        let (mut scores, mut lengths) = (Vec::new(), Vec::new());
        while scores.len() < self.config.num_eval_episodes {
            let sample = tch::no_grad(|| self.agent.act(&batch_tensor(&obs, &self.obs_shape, device), true));
            let out = pool.step(&E::Action::from_tensor(&sample.actions)?)?;
            for episode in &out.finished {
                scores.push(episode.true_return);
                lengths.push(episode.length as f32);
            }
            obs = out.observations;
        }

        let summary = EvalSummary::from_episodes(&scores, &lengths, start.elapsed().as_secs_f64());
        tracing::info!(
            "Evaluation finished in {:.1}s: score {:.2} over {} episodes",
            summary.time,
            summary.score,
            summary.num_episodes
        );
        Ok(summary)
    }

    /// Save the trainable store (and the RND target next to it)
    pub fn save(&self) -> Result<PathBuf> {
        let path = tracking::model_path(&self.config.output_dir.join(&self.run_name));
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        self.vs.save(&path)?;
        if let Some(curiosity) = &self.curiosity {
            curiosity.model.target_store().save(path.with_file_name("rnd_target.safetensors"))?;
        }
        tracing::info!("  Saved model: {}", path.display());
        Ok(path)
    }
}

/// `<prefix>_mean`, `_max` and `_min` of a non-empty slice
fn record_extremes(metrics: &mut Metrics, prefix: &str, values: &[f32]) {
    if values.is_empty() {
        return;
    }
    metrics
        .record(format!("{prefix}_mean"), utils::mean(values))
        .record(format!("{prefix}_max"), utils::max_or(values, f64::NEG_INFINITY))
        .record(format!("{prefix}_min"), utils::min_or(values, f64::INFINITY));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_tensor_shape() {
        let rows = vec![vec![0.0; 6], vec![1.0; 6]];
        let t = batch_tensor(&rows, &[2, 3], Device::Cpu);
        assert_eq!(t.size(), vec![2, 2, 3]);
        assert_eq!(host_vec(&t.get(1)).unwrap(), vec![1.0; 6]);
    }

    #[test]
    fn test_record_extremes() {
        let mut metrics = Metrics::new();
        record_extremes(&mut metrics, "rewards/rewards", &[-1.0, 2.0, 5.0]);
        assert_eq!(metrics.get("rewards/rewards_mean"), Some(2.0));
        assert_eq!(metrics.get("rewards/rewards_max"), Some(5.0));
        assert_eq!(metrics.get("rewards/rewards_min"), Some(-1.0));

        record_extremes(&mut metrics, "rewards/empty", &[]);
        assert_eq!(metrics.len(), 3);
    }
}
