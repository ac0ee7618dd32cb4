//! Value-target noise for the reward-normalized PPO variant
//!
//! Within every minibatch the samples with the largest |TD error| (current
//! value minus target) get Gaussian noise added to their value target and
//! to their advantage. The perturbation is clamped to `[-1, 1]` and decays
//! over training with `noise_w * exp(-(update / (num_updates *
//! decay_scale))^2)`.
//!
//! The bi-directional variant only perturbs samples the critic
//! under-estimates (`td < 0`) and always pushes their targets toward the
//! minibatch mean target.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

/// Return-noise hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnNoiseConfig {
    /// Fraction of each minibatch that is perturbed
    pub rate: f64,

    /// Standard deviation of the raw noise
    pub std: f64,

    /// Mean of the raw noise
    pub mean: f64,

    /// Width of the decay, as a fraction of the run
    pub decay_scale: f64,

    /// Initial noise weight
    pub noise_w: f64,

    /// Push targets toward the minibatch mean instead of random directions
    pub bi_noise: bool,
}

impl Default for ReturnNoiseConfig {
    fn default() -> Self {
        Self { rate: 0.1, std: 1.0, mean: 0.0, decay_scale: 0.5, noise_w: 0.1, bi_noise: false }
    }
}

impl ReturnNoiseConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.rate) {
            return Err(anyhow!("noise rate must be in [0, 1]"));
        }
        if self.std < 0.0 {
            return Err(anyhow!("noise std must be non-negative"));
        }
        if self.decay_scale <= 0.0 {
            return Err(anyhow!("decay_scale must be positive"));
        }
        Ok(())
    }

    /// Noise weight at iteration `update` of `num_updates`
    pub fn scale(&self, update: usize, num_updates: usize) -> f64 {
        let x = update as f64 / (num_updates.max(1) as f64 * self.decay_scale);
        self.noise_w * (-(x * x)).exp()
    }

    /// Suffix appended to the run name
    pub fn run_suffix(&self) -> String {
        if self.bi_noise { "-bi".to_string() } else { format!("-max-uncertainty-rate{}", self.rate) }
    }

    /// Scaled perturbation of one minibatch of value targets
    ///
    /// Returns a `[minibatch]` tensor that is zero outside the top
    /// `rate * len` samples by |`values - returns`|.
    pub fn perturbation(&self, values: &Tensor, returns: &Tensor, scale: f64) -> Tensor {
        tch::no_grad(|| {
            let n = returns.size()[0];
            let k = (n as f64 * self.rate) as i64;
            let delta = returns.zeros_like();
            if k == 0 || scale == 0.0 {
                return delta;
            }

            let td = values.detach() - returns;
            let (_, top_k) = td.abs().topk(k, 0, true, true);

            let mut noise = returns.randn_like() * self.std + self.mean;
            if self.bi_noise {
                let mean = f64::try_from(returns.mean(Kind::Float)).unwrap_or(0.0);
                let under = td.lt(0.0);
                let above = returns.gt(mean).logical_and(&under);
                let below = returns.le(mean).logical_and(&under);
                let magnitude = noise.abs();
                noise = (-&magnitude).where_self(&above, &magnitude.where_self(&below, &delta));
            }

            let noise = noise.clamp(-1.0, 1.0) * scale;
            delta.index_copy(0, &top_k, &noise.index_select(0, &top_k))
        })
    }
}

#[cfg(test)]
mod tests {
    use tch::Device;

    use super::*;

    fn nonzero(t: &Tensor) -> Vec<usize> {
        let values: Vec<f32> = Vec::try_from(t).unwrap();
        values.iter().enumerate().filter(|(_, v)| **v != 0.0).map(|(i, _)| i).collect()
    }

    #[test]
    fn test_scale_decays() {
        let config = ReturnNoiseConfig::default();
        assert!((config.scale(0, 100) - 0.1).abs() < 1e-12);
        // At half the run (decay_scale 0.5) the weight is noise_w / e
        assert!((config.scale(50, 100) - 0.1 / std::f64::consts::E).abs() < 1e-12);
        assert!(config.scale(100, 100) < config.scale(50, 100));
    }

    #[test]
    fn test_run_suffix() {
        assert_eq!(ReturnNoiseConfig::default().run_suffix(), "-max-uncertainty-rate0.1");
        let bi = ReturnNoiseConfig { bi_noise: true, ..Default::default() };
        assert_eq!(bi.run_suffix(), "-bi");
    }

    #[test]
    fn test_only_top_k_are_perturbed() {
        let config = ReturnNoiseConfig { rate: 0.2, std: 0.0, mean: 0.5, ..Default::default() };
        let returns = Tensor::zeros([10], (Kind::Float, Device::Cpu));
        let values = Tensor::from_slice(&[0.0f32, 0.1, -3.0, 0.2, 0.0, 5.0, 0.0, 0.1, 0.0, 0.0]);

        let delta = config.perturbation(&values, &returns, 1.0);
        assert_eq!(nonzero(&delta), vec![2, 5]);
        let values: Vec<f32> = Vec::try_from(&delta).unwrap();
        assert!((values[5] - 0.5).abs() < 1e-6);

        // Too small a minibatch for any sample
        let delta = config.perturbation(&values_of(4), &Tensor::zeros([4], (Kind::Float, Device::Cpu)), 1.0);
        assert!(nonzero(&delta).is_empty());
    }

    fn values_of(n: i64) -> Tensor {
        Tensor::ones([n], (Kind::Float, Device::Cpu))
    }

    #[test]
    fn test_noise_is_clamped_and_scaled() {
        let config = ReturnNoiseConfig { rate: 1.0, std: 0.0, mean: 4.0, ..Default::default() };
        let returns = Tensor::zeros([3], (Kind::Float, Device::Cpu));
        let delta = config.perturbation(&values_of(3), &returns, 0.1);
        let values: Vec<f32> = Vec::try_from(&delta).unwrap();
        assert!(values.iter().all(|v| (v - 0.1).abs() < 1e-6));
    }

    #[test]
    fn test_bi_noise_pushes_toward_mean() {
        let config = ReturnNoiseConfig { rate: 1.0, std: 1.0, mean: 0.0, bi_noise: true, ..Default::default() };
        let returns = Tensor::from_slice(&[2.0f32, -2.0, 2.0, -2.0]);
        // td = values - returns: negative for 0 and 1, positive for 2 and 3
        let values = Tensor::from_slice(&[1.0f32, -3.0, 3.0, -1.0]);

        let delta: Vec<f32> = Vec::try_from(&config.perturbation(&values, &returns, 1.0)).unwrap();
        assert!(delta[0] <= 0.0);
        assert!(delta[1] >= 0.0);
        assert_eq!(delta[2], 0.0);
        assert_eq!(delta[3], 0.0);
    }
}
