//! Loss computation functions for PPO
//!
//! This module contains the clipped surrogate policy loss, the value
//! losses of both reward streams and the advantage normalization used in
//! every minibatch.

use tch::{Kind, Tensor};

/// KL and clipping diagnostics of one minibatch
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolicyDiagnostics {
    /// `mean(-logratio)`
    pub old_approx_kl: f64,

    /// `mean((ratio - 1) - logratio)`, the low-variance estimator
    pub approx_kl: f64,

    /// Fraction of samples whose ratio left `[1 - clip, 1 + clip]`
    pub clip_fraction: f64,
}

/// Read a scalar tensor, `NaN` if it cannot be read
pub(crate) fn scalar(t: &Tensor) -> f64 {
    f64::try_from(t).unwrap_or(f64::NAN)
}

/// Compute PPO policy loss with clipping
///
/// `pg_loss = mean(max(-A * ratio, -A * clamp(ratio, 1 - clip, 1 + clip)))`
///
/// # Arguments
/// * `log_probs` - Log probabilities of actions under current policy
/// * `old_log_probs` - Log probabilities of actions under old policy
/// * `advantages` - Advantages (already normalized if requested)
/// * `clip_coef` - PPO clipping parameter (epsilon)
pub fn compute_policy_loss(
    log_probs: &Tensor,
    old_log_probs: &Tensor,
    advantages: &Tensor,
    clip_coef: f64,
) -> (Tensor, PolicyDiagnostics) {
    let logratio = log_probs - old_log_probs;
    let ratio = logratio.exp();

    let diagnostics = tch::no_grad(|| PolicyDiagnostics {
        old_approx_kl: scalar(&(-&logratio).mean(Kind::Float)),
        approx_kl: scalar(&((&ratio - 1.0) - &logratio).mean(Kind::Float)),
        clip_fraction: scalar(&(&ratio - 1.0).abs().gt(clip_coef).to_kind(Kind::Float).mean(Kind::Float)),
    });

    let pg_loss1 = -advantages * &ratio;
    let pg_loss2 = -advantages * ratio.clamp(1.0 - clip_coef, 1.0 + clip_coef);
    let policy_loss = pg_loss1.maximum(&pg_loss2).mean(Kind::Float);

    (policy_loss, diagnostics)
}

/// Compute value function loss with optional clipping
///
/// With `clip` set the loss is `0.5 * mean(max(unclipped, clipped))`, the
/// clipped prediction being `old + clamp(new - old, -clip, clip)`.
/// Otherwise it is `0.5 * MSE`.
pub fn compute_value_loss(
    values: &Tensor,
    old_values: &Tensor,
    returns: &Tensor,
    clip: Option<f64>,
) -> Tensor {
    let unclipped = (values - returns).square();
    match clip {
        Some(clip) => {
            let values_clipped = old_values + (values - old_values).clamp(-clip, clip);
            let clipped = (values_clipped - returns).square();
            unclipped.maximum(&clipped).mean(Kind::Float) * 0.5
        }
        None => unclipped.mean(Kind::Float) * 0.5,
    }
}

/// Normalize advantages to zero mean and unit (sample) std
pub fn normalize_advantages(advantages: &Tensor) -> Tensor {
    let mean = advantages.mean(Kind::Float);
    let std = advantages.std(true);
    (advantages - mean) / (std + 1e-8)
}

#[cfg(test)]
mod tests {
    use tch::Device;

    use super::*;

    fn t(values: &[f32]) -> Tensor {
        Tensor::from_slice(values)
    }

    #[test]
    fn test_policy_loss_unchanged_policy() {
        let log_probs = t(&[-0.5, -1.0, -2.0]);
        let advantages = t(&[1.0, -1.0, 2.0]);

        let (loss, diag) = compute_policy_loss(&log_probs, &log_probs, &advantages, 0.2);

        // ratio == 1: loss is -mean(A)
        assert!((scalar(&loss) + 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(diag.clip_fraction, 0.0);
        assert!(diag.approx_kl.abs() < 1e-7);
        assert!(diag.old_approx_kl.abs() < 1e-7);
    }

    #[test]
    fn test_policy_loss_clipping() {
        // ratio = e^0.5 ~ 1.65 for a positive advantage: clipped at 1.2
        let old = t(&[0.0]);
        let new = t(&[0.5]);
        let (loss, diag) = compute_policy_loss(&new, &old, &t(&[1.0]), 0.2);
        assert!((scalar(&loss) + 1.2).abs() < 1e-6);
        assert_eq!(diag.clip_fraction, 1.0);
        assert!((diag.old_approx_kl + 0.5).abs() < 1e-6);
        assert!((diag.approx_kl - (0.5f64.exp() - 1.0 - 0.5)).abs() < 1e-6);

        // Negative advantage: the pessimistic (unclipped) term wins
        let (loss, _) = compute_policy_loss(&new, &old, &t(&[-1.0]), 0.2);
        assert!((scalar(&loss) - 0.5f64.exp()).abs() < 1e-5);
    }

    #[test]
    fn test_policy_loss_has_gradient() {
        let log_probs = Tensor::zeros([4], (Kind::Float, Device::Cpu)).set_requires_grad(true);
        let (loss, _) = compute_policy_loss(&log_probs, &log_probs.detach(), &t(&[1.0, 1.0, -1.0, 0.5]), 0.2);
        loss.backward();
        assert!(log_probs.grad().defined());
    }

    #[test]
    fn test_value_loss() {
        let values = t(&[1.0, 3.0]);
        let returns = t(&[0.0, 0.0]);

        // 0.5 * mean(1, 9)
        let mse = compute_value_loss(&values, &values, &returns, None);
        assert!((scalar(&mse) - 2.5).abs() < 1e-6);

        // Old values of 0 clip the prediction to 0.2, the max keeps the unclipped error
        let old = t(&[0.0, 0.0]);
        let clipped = compute_value_loss(&values, &old, &returns, Some(0.2));
        assert!((scalar(&clipped) - 2.5).abs() < 1e-6);

        // Here the clipped error is larger
        let values = t(&[0.5]);
        let old = t(&[2.0]);
        let returns = t(&[0.0]);
        let clipped = compute_value_loss(&values, &old, &returns, Some(0.2));
        assert!((scalar(&clipped) - 0.5 * 1.8 * 1.8).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_advantages() {
        let normalized = normalize_advantages(&t(&[1.0, 2.0, 3.0, 4.0]));
        assert!(scalar(&normalized.mean(Kind::Float)).abs() < 1e-6);
        assert!((scalar(&normalized.std(true)) - 1.0).abs() < 1e-4);
    }
}
