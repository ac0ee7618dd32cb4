//! PPO Trainer implementation
//!
//! This module contains the main [`PpoTrainer`] struct and its update loop.

use super::{
    config::PpoConfig,
    loss::{compute_policy_loss, compute_value_loss, normalize_advantages, scalar},
    noise::ReturnNoiseConfig,
    stats::TrainingStats,
};
use crate::{
    buffer::{
        TrainingBatch,
        rollout::sampling::{generate_minibatch_indices, index_tensor},
    },
    policy::ActorCritic,
    rnd::RndModel,
};
use anyhow::{Result, bail};
use rand::{SeedableRng, rngs::StdRng};
use tch::{Kind, Tensor, nn, nn::OptimizerConfig};

/// Predictor side of an update: the RND model and its whitened inputs
///
/// `inputs` must be row-aligned with the [`TrainingBatch`] being trained on.
#[derive(Debug)]
pub struct RndUpdate<'a> {
    /// Model whose predictor is trained
    pub model: &'a RndModel,

    /// Normalized RND inputs for the whole batch
    pub inputs: &'a Tensor,

    /// Fraction of each minibatch used for the predictor loss
    pub update_proportion: f64,
}

/// PPO Trainer for policy optimization
///
/// Owns one Adam optimizer over a `VarStore` holding the agent and, with
/// RND, the predictor network. Manages optimizer setup, learning rate
/// annealing, minibatch shuffling and parameter updates.
#[derive(Debug)]
pub struct PpoTrainer {
    config: PpoConfig,
    noise: Option<ReturnNoiseConfig>,
    optimizer: nn::Optimizer,
    rng: StdRng,
    learning_rate: f64,
    total_updates: usize,
}

impl PpoTrainer {
    /// Adam epsilon
    pub const ADAM_EPS: f64 = 1e-5;

    /// Create a new PPO trainer
    ///
    /// # Arguments
    ///
    /// * `config` - PPO configuration parameters
    /// * `noise` - Value-target noise, `None` to train without it
    /// * `vs` - Store holding every trainable parameter
    /// * `seed` - Seed of the minibatch shuffle
    pub fn new(
        config: PpoConfig,
        noise: Option<ReturnNoiseConfig>,
        vs: &nn::VarStore,
        seed: u64,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(noise) = &noise {
            noise.validate()?;
        }

        let adam = nn::Adam { eps: Self::ADAM_EPS, ..Default::default() };
        let optimizer = adam.build(vs, config.learning_rate)?;

        Ok(Self {
            learning_rate: config.learning_rate,
            config,
            noise,
            optimizer,
            rng: StdRng::seed_from_u64(seed),
            total_updates: 0,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    /// Current learning rate
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Total gradient steps taken
    pub fn total_updates(&self) -> usize {
        self.total_updates
    }

    /// Override the learning rate
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
        self.optimizer.set_lr(lr);
    }

    /// Apply the annealing schedule for iteration `update` (1-based)
    ///
    /// Returns the learning rate in effect.
    pub fn anneal(&mut self, update: usize) -> f64 {
        if self.config.anneal_lr {
            self.set_learning_rate(self.config.learning_rate_at(update));
        }
        self.learning_rate
    }

    /// Run the PPO epochs over one rollout
    ///
    /// Each epoch shuffles the batch into `num_minibatches` minibatches and
    /// takes one gradient step per minibatch on
    /// `pg_loss - ent_coef * entropy + vf_coef * (ext_v_loss + int_v_loss) + fwd_loss`.
    /// After an epoch whose last minibatch exceeded `target_kl`, the
    /// remaining epochs are skipped.
    ///
    /// With return noise enabled, the perturbed value targets are written
    /// back into `batch.ext_returns` and carry over to later epochs.
    ///
    /// # Arguments
    ///
    /// * `agent` - Policy being trained
    /// * `batch` - Flattened rollout
    /// * `rnd` - Predictor inputs, `None` without RND
    /// * `update` - Current iteration (1-based), for the noise decay
    /// * `num_updates` - Iterations in the run
    pub fn update<A: ActorCritic + ?Sized>(
        &mut self,
        agent: &A,
        batch: &mut TrainingBatch,
        rnd: Option<RndUpdate<'_>>,
        update: usize,
        num_updates: usize,
    ) -> Result<TrainingStats> {
        let batch_size = batch.len();
        if batch_size == 0 {
            bail!("cannot train on an empty batch");
        }
        if let Some(rnd) = &rnd {
            if rnd.inputs.size().first().copied() != Some(batch_size as i64) {
                bail!("RND inputs {:?} do not match batch of {}", rnd.inputs.size(), batch_size);
            }
        }

        let minibatch_size = (batch_size / self.config.num_minibatches.max(1)).max(1);
        let noise_scale = self.noise.as_ref().map(|noise| noise.scale(update, num_updates));
        let value_clip = self.config.clip_vloss.then_some(self.config.clip_coef);
        let device = batch.log_probs.device();

        let mut stats_sum = TrainingStats::zeros();
        for _epoch in 0..self.config.update_epochs {
            let minibatches = generate_minibatch_indices(batch_size, minibatch_size, &mut self.rng);
            let mut last_kl = 0.0;

            for indices in &minibatches {
                let idx = index_tensor(indices, device);
                let mb = batch.select(&idx);
                let eval = agent.evaluate(&mb.observations, &mb.actions);

                let mut mb_advantages = mb.advantages.shallow_clone();
                let mut mb_returns = mb.ext_returns.shallow_clone();
                let mut td_shift = 0.0;
                if let (Some(noise), Some(scale)) = (&self.noise, noise_scale) {
                    let delta = noise.perturbation(&eval.values.ext, &mb.ext_returns, scale);
                    td_shift = scalar(&(-&delta).mean(Kind::Float));
                    mb_returns = &mb.ext_returns + &delta;
                    mb_advantages = &mb.advantages + &delta;
                    let _ = batch.ext_returns.index_copy_(0, &idx, &mb_returns);
                }
                if self.config.norm_adv {
                    mb_advantages = normalize_advantages(&mb_advantages);
                }

                let (policy_loss, diagnostics) =
                    compute_policy_loss(&eval.log_probs, &mb.log_probs, &mb_advantages, self.config.clip_coef);
                let ext_value_loss = compute_value_loss(&eval.values.ext, &mb.ext_values, &mb_returns, value_clip);
                let int_value_loss = match (&eval.values.int, &mb.int_returns) {
                    (Some(values), Some(returns)) => Some(compute_value_loss(values, values, returns, None)),
                    _ => None,
                };
                let entropy = eval.entropy.mean(Kind::Float);
                let forward_loss = rnd.as_ref().map(|rnd| {
                    rnd.model.forward_loss(&rnd.inputs.index_select(0, &idx), rnd.update_proportion)
                });

                let value_loss = match &int_value_loss {
                    Some(int) => &ext_value_loss + int,
                    None => ext_value_loss.shallow_clone(),
                };
                let mut loss =
                    &policy_loss - &entropy * self.config.ent_coef + value_loss * self.config.vf_coef;
                if let Some(fwd) = &forward_loss {
                    loss = loss + fwd;
                }

                self.optimizer.zero_grad();
                loss.backward();
                self.optimizer.clip_grad_norm(self.config.max_grad_norm);
                self.optimizer.step();
                self.total_updates += 1;

                stats_sum.add(&TrainingStats {
                    policy_loss: scalar(&policy_loss),
                    ext_value_loss: scalar(&ext_value_loss),
                    int_value_loss: int_value_loss.as_ref().map(scalar).unwrap_or(0.0),
                    entropy: scalar(&entropy),
                    forward_loss: forward_loss.as_ref().map(scalar).unwrap_or(0.0),
                    total_loss: scalar(&loss),
                    clip_fraction: diagnostics.clip_fraction,
                    old_approx_kl: diagnostics.old_approx_kl,
                    approx_kl: diagnostics.approx_kl,
                    noise_td_shift: td_shift,
                    num_updates: 1,
                    ..Default::default()
                });
                last_kl = diagnostics.approx_kl;
            }

            stats_sum.epochs += 1;
            if let Some(target_kl) = self.config.target_kl {
                if last_kl > target_kl {
                    tracing::debug!(last_kl, target_kl, epoch = stats_sum.epochs, "KL target reached");
                    stats_sum.early_stopped = true;
                    break;
                }
            }
        }

        Ok(stats_sum.average())
    }
}

#[cfg(test)]
mod tests {
    use tch::{Device, nn::VarStore};

    use super::*;
    use crate::policy::{CriticHeads, GaussianAgent};

    const OBS_DIM: i64 = 3;
    const BATCH: i64 = 16;

    fn config() -> PpoConfig {
        PpoConfig::control()
            .rollout(4, 4)
            .total_timesteps(64)
            .num_minibatches(2)
            .update_epochs(3)
            .learning_rate(0.01)
    }

    fn batch(agent: &GaussianAgent, dual: bool) -> TrainingBatch {
        let observations = Tensor::randn([BATCH, OBS_DIM], (Kind::Float, Device::Cpu));
        let sample = agent.act(&observations, false);
        let ext_returns = Tensor::randn([BATCH], (Kind::Float, Device::Cpu));
        TrainingBatch {
            advantages: (&ext_returns - &sample.values.ext).detach(),
            ext_values: sample.values.ext.detach(),
            int_returns: dual.then(|| Tensor::ones([BATCH], (Kind::Float, Device::Cpu))),
            observations,
            actions: sample.actions.detach(),
            log_probs: sample.log_probs.detach(),
            ext_returns,
        }
    }

    fn agent(vs: &VarStore, heads: CriticHeads) -> GaussianAgent {
        GaussianAgent::new(&(vs.root() / "agent"), OBS_DIM, 1, heads)
    }

    #[test]
    fn test_update_runs_all_epochs() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let agent = agent(&vs, CriticHeads::Single);
        let mut trainer = PpoTrainer::new(config(), None, &vs, 0).unwrap();
        let mut batch = batch(&agent, false);

        let before = agent.values(&batch.observations).ext.detach().copy();
        let stats = trainer.update(&agent, &mut batch, None, 1, 4).unwrap();
        println!("{:?}", stats);

        assert_eq!(stats.num_updates, 6);
        assert_eq!(stats.epochs, 3);
        assert!(!stats.early_stopped);
        assert_eq!(trainer.total_updates(), 6);
        assert!(stats.policy_loss.is_finite());
        assert!(stats.ext_value_loss > 0.0);
        assert_eq!(stats.int_value_loss, 0.0);
        assert_eq!(stats.forward_loss, 0.0);
        assert_eq!(stats.noise_td_shift, 0.0);

        let after = agent.values(&batch.observations).ext;
        assert!(scalar(&(after - before).abs().sum(Kind::Float)) > 0.0, "parameters should move");
    }

    #[test]
    fn test_kl_early_stop() {
        tch::manual_seed(1);
        let vs = VarStore::new(Device::Cpu);
        let agent = agent(&vs, CriticHeads::Single);
        let mut trainer = PpoTrainer::new(config().target_kl(Some(0.0)), None, &vs, 0).unwrap();
        let mut batch = batch(&agent, false);

        let stats = trainer.update(&agent, &mut batch, None, 1, 4).unwrap();
        assert!(stats.early_stopped);
        assert_eq!(stats.epochs, 1);
        assert_eq!(stats.num_updates, 2);
    }

    #[test]
    fn test_noise_persists_in_returns() {
        tch::manual_seed(2);
        let vs = VarStore::new(Device::Cpu);
        let agent = agent(&vs, CriticHeads::Single);
        let noise = ReturnNoiseConfig { rate: 1.0, std: 0.0, mean: 0.5, ..Default::default() };
        let mut trainer = PpoTrainer::new(config(), Some(noise), &vs, 0).unwrap();
        let mut batch = batch(&agent, false);
        let original = batch.ext_returns.copy();

        // Scale at the first iteration is noise_w = 0.1: +0.05 per epoch
        let stats = trainer.update(&agent, &mut batch, None, 0, 4).unwrap();
        let shift = scalar(&(&batch.ext_returns - original).mean(Kind::Float));
        assert!((shift - 0.15).abs() < 1e-5, "shift {}", shift);
        assert!((stats.noise_td_shift + 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_rnd_and_intrinsic_head_are_trained() {
        tch::manual_seed(3);
        let vs = VarStore::new(Device::Cpu);
        let agent = agent(&vs, CriticHeads::Dual);
        let rnd = RndModel::mlp(&(vs.root() / "rnd_predictor"), OBS_DIM);
        let mut trainer = PpoTrainer::new(config(), None, &vs, 0).unwrap();
        let mut batch = batch(&agent, true);
        let inputs = batch.observations.shallow_clone();

        let loss_before = scalar(&rnd.forward_loss(&inputs, 1.0));
        let update = RndUpdate { model: &rnd, inputs: &inputs, update_proportion: 1.0 };
        let stats = trainer.update(&agent, &mut batch, Some(update), 1, 4).unwrap();

        assert!(stats.int_value_loss > 0.0);
        assert!(stats.forward_loss > 0.0);
        assert!(scalar(&rnd.forward_loss(&inputs, 1.0)) < loss_before);

        let misaligned = inputs.narrow(0, 0, 4);
        let update = RndUpdate { model: &rnd, inputs: &misaligned, update_proportion: 1.0 };
        assert!(trainer.update(&agent, &mut batch, Some(update), 2, 4).is_err());
    }

    #[test]
    fn test_learning_rate_annealing() {
        let vs = VarStore::new(Device::Cpu);
        let _agent = agent(&vs, CriticHeads::Single);
        let mut trainer = PpoTrainer::new(config().anneal_lr(true), None, &vs, 0).unwrap();
        assert_eq!(trainer.anneal(1), 0.01);
        assert!((trainer.anneal(3) - 0.005).abs() < 1e-12);

        let mut fixed = PpoTrainer::new(config(), None, &vs, 0).unwrap();
        assert_eq!(fixed.anneal(3), 0.01);
    }
}
