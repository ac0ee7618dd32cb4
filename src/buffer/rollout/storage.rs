//! Flattened training data
//!
//! A [`TrainingBatch`] holds one rollout as `[num_steps * num_envs]`
//! tensors on the training device. Minibatches are views selected by index.

use tch::Tensor;

/// Weights of the two advantage streams in the policy loss
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvantageMix {
    /// Extrinsic advantage coefficient
    pub ext_coef: f32,

    /// Intrinsic advantage coefficient
    pub int_coef: f32,
}

impl AdvantageMix {
    /// Extrinsic advantages only
    pub const EXTRINSIC: Self = Self { ext_coef: 1.0, int_coef: 0.0 };
}

/// Flattened rollout ready for PPO updates
#[derive(Debug)]
pub struct TrainingBatch {
    /// Observations `[batch, ...]`
    pub observations: Tensor,

    /// Actions `[batch]` or `[batch, act_dim]`
    pub actions: Tensor,

    /// Log-probabilities at collection time
    pub log_probs: Tensor,

    /// Combined advantages
    pub advantages: Tensor,

    /// Extrinsic value targets
    pub ext_returns: Tensor,

    /// Intrinsic value targets
    pub int_returns: Option<Tensor>,

    /// Extrinsic values at collection time (for value clipping)
    pub ext_values: Tensor,
}

impl TrainingBatch {
    /// Get batch size
    pub fn len(&self) -> usize {
        self.log_probs.size()[0] as usize
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Select the samples at `indices` (an int64 tensor)
    pub fn select(&self, indices: &Tensor) -> TrainingBatch {
        let pick = |t: &Tensor| t.index_select(0, indices);
        TrainingBatch {
            observations: pick(&self.observations),
            actions: pick(&self.actions),
            log_probs: pick(&self.log_probs),
            advantages: pick(&self.advantages),
            ext_returns: pick(&self.ext_returns),
            int_returns: self.int_returns.as_ref().map(pick),
            ext_values: pick(&self.ext_values),
        }
    }
}
