//! Training statistics for PPO
//!
//! This module defines structures for tracking and aggregating
//! training metrics during PPO training.

use std::ops::AddAssign;

/// Training statistics for a PPO update
///
/// Tracks various metrics from a single training step including
/// losses, KL divergence, and other diagnostic information. Summed over
/// minibatches with [`add`](Self::add) and turned into per-minibatch means
/// with [`average`](Self::average).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingStats {
    /// Clipped surrogate policy loss
    pub policy_loss: f64,

    /// Extrinsic value loss
    pub ext_value_loss: f64,

    /// Intrinsic value loss (zero without an intrinsic head)
    pub int_value_loss: f64,

    /// Mean policy entropy
    pub entropy: f64,

    /// RND predictor loss (zero without RND)
    pub forward_loss: f64,

    /// Total loss
    pub total_loss: f64,

    /// Fraction of clipped policy updates
    pub clip_fraction: f64,

    /// `mean(-logratio)`
    pub old_approx_kl: f64,

    /// Approximate KL divergence between old and new policies
    pub approx_kl: f64,

    /// Mean change of `value - target` caused by return noise
    pub noise_td_shift: f64,

    /// Number of gradient updates performed
    pub num_updates: usize,

    /// Epochs completed before the KL early stop (or all of them)
    pub epochs: usize,

    /// Whether the KL target stopped the update early
    pub early_stopped: bool,
}

impl TrainingStats {
    /// Create zero-initialized statistics
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Total value loss of both streams
    pub fn value_loss(&self) -> f64 {
        self.ext_value_loss + self.int_value_loss
    }

    /// Add another statistics instance to this one
    pub fn add(&mut self, other: &TrainingStats) {
        self.policy_loss += other.policy_loss;
        self.ext_value_loss += other.ext_value_loss;
        self.int_value_loss += other.int_value_loss;
        self.entropy += other.entropy;
        self.forward_loss += other.forward_loss;
        self.total_loss += other.total_loss;
        self.clip_fraction += other.clip_fraction;
        self.old_approx_kl += other.old_approx_kl;
        self.approx_kl += other.approx_kl;
        self.noise_td_shift += other.noise_td_shift;
        self.num_updates += other.num_updates;
    }

    /// Compute average statistics across multiple updates
    ///
    /// Epoch count and early-stop flag are carried over unchanged.
    pub fn average(&self) -> Self {
        let scale = self.num_updates as f64;
        if scale == 0.0 {
            return Self::zeros();
        }

        Self {
            policy_loss: self.policy_loss / scale,
            ext_value_loss: self.ext_value_loss / scale,
            int_value_loss: self.int_value_loss / scale,
            entropy: self.entropy / scale,
            forward_loss: self.forward_loss / scale,
            total_loss: self.total_loss / scale,
            clip_fraction: self.clip_fraction / scale,
            old_approx_kl: self.old_approx_kl / scale,
            approx_kl: self.approx_kl / scale,
            noise_td_shift: self.noise_td_shift / scale,
            num_updates: self.num_updates,
            epochs: self.epochs,
            early_stopped: self.early_stopped,
        }
    }
}

impl AddAssign<&TrainingStats> for TrainingStats {
    fn add_assign(&mut self, other: &TrainingStats) {
        self.add(other);
    }
}
