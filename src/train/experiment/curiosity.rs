//! Run-time state of the RND bonus

use anyhow::Result;
use tch::Tensor;

use super::host_vec;
use crate::{
    buffer::rollout::gae::normalize_rewards,
    rnd::{ObsNormalizer, RndModel},
    utils::{RewardForwardFilter, RunningMeanStd},
};

/// RND model with its input and reward statistics
#[derive(Debug)]
pub(crate) struct Curiosity {
    pub(crate) model: RndModel,
    normalizer: ObsNormalizer,
    filter: RewardForwardFilter,
    reward_rms: RunningMeanStd,
}

impl Curiosity {
    pub(crate) fn new(model: RndModel, int_gamma: f64) -> Self {
        let normalizer = ObsNormalizer::new(model.input_shape());
        Self { model, normalizer, filter: RewardForwardFilter::new(int_gamma), reward_rms: RunningMeanStd::scalar() }
    }

    /// RND view of a batch of agent observations
    pub(crate) fn project(&self, obs: &Tensor) -> Tensor {
        self.model.project(obs)
    }

    /// Update the input statistics with projected observations
    pub(crate) fn update_stats(&mut self, projected: &Tensor) -> Result<()> {
        self.normalizer.update(projected)
    }

    /// Whiten projected observations
    pub(crate) fn whiten(&self, projected: &Tensor) -> Tensor {
        self.normalizer.normalize(projected)
    }

    /// Intrinsic reward of each agent observation
    pub(crate) fn reward(&self, obs: &Tensor) -> Result<Vec<f32>> {
        host_vec(&self.model.intrinsic_reward(&self.whiten(&self.project(obs))))
    }

    /// Scale a rollout of intrinsic rewards by their discounted std
    pub(crate) fn normalize_rewards(&mut self, rewards: &mut [Vec<f32>], dones: &[Vec<f32>]) {
        normalize_rewards(rewards, dones, &mut self.filter, &mut self.reward_rms);
    }
}
