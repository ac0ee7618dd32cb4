//! Random Network Distillation
//!
//! A predictor network is trained to match the output of a fixed, randomly
//! initialized target network. Its error is large on observations unlike
//! those seen during training and serves as the intrinsic reward.
//!
//! The predictor lives under a caller-owned path (normally next to the
//! agent, so one optimizer trains both). The target owns a private,
//! frozen `VarStore`.
//!
//! Inputs are whitened with an [`ObsNormalizer`] before reaching either
//! network: `clip((x - mean) / sqrt(var), -5, 5)`. Pixel models only see
//! the newest frame of the stack.

use anyhow::{Result, bail};
use tch::{Device, Kind, Tensor, nn, nn::Module};

use crate::{
    policy::{HIDDEN_GAIN, conv, linear, pixel::CONV_OUT},
    utils::RunningMeanStd,
};

/// Clip applied to whitened RND inputs
pub const OBS_CLIP: f64 = 5.0;

/// Which part of an observation the RND networks see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RndView {
    /// The whole observation vector
    Full,
    /// Only the newest frame of a `[B, C, H, W]` stack, as `[B, 1, H, W]`
    LastFrame,
}

impl RndView {
    /// Select the RND input from a batch of agent observations
    pub fn project(self, obs: &Tensor) -> Tensor {
        match self {
            RndView::Full => obs.to_kind(Kind::Float),
            RndView::LastFrame => {
                let channels = obs.size()[1];
                obs.narrow(1, channels - 1, 1).to_kind(Kind::Float)
            }
        }
    }
}

/// Predictor / target network pair
pub struct RndModel {
    predictor: nn::Sequential,
    target: nn::Sequential,
    target_vs: nn::VarStore,
    view: RndView,
    input_shape: Vec<i64>,
}

impl std::fmt::Debug for RndModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RndModel")
            .field("view", &self.view)
            .field("input_shape", &self.input_shape)
            .finish()
    }
}

fn pixel_trunk(path: nn::Path) -> nn::Sequential {
    nn::seq()
        .add(conv(&path / "conv1", 1, 32, 8, 4, HIDDEN_GAIN))
        .add_fn(|x| x.leaky_relu())
        .add(conv(&path / "conv2", 32, 64, 4, 2, HIDDEN_GAIN))
        .add_fn(|x| x.leaky_relu())
        .add(conv(&path / "conv3", 64, 64, 3, 1, HIDDEN_GAIN))
        .add_fn(|x| x.leaky_relu())
        .add_fn(|x| x.flat_view())
}

impl RndModel {
    /// Output feature size of the pixel networks
    pub const PIXEL_FEATURES: i64 = 512;

    /// Output feature size of the vector networks
    pub const MLP_FEATURES: i64 = 256;

    /// Convolutional model for 84x84 frames
    pub fn pixel(path: &nn::Path, frame_size: i64) -> Self {
        let out = Self::PIXEL_FEATURES;
        let predictor = pixel_trunk(path / "conv")
            .add(linear(path / "fc1", CONV_OUT, out, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add(linear(path / "fc2", out, out, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add(linear(path / "fc3", out, out, HIDDEN_GAIN));

        let target_vs = nn::VarStore::new(path.device());
        let root = target_vs.root() / "rnd_target";
        let target = pixel_trunk(&root / "conv").add(linear(&root / "fc1", CONV_OUT, out, HIDDEN_GAIN));

        Self::with_target(predictor, target, target_vs, RndView::LastFrame, vec![1, frame_size, frame_size])
    }

    /// MLP model for flat observation vectors
    pub fn mlp(path: &nn::Path, obs_dim: i64) -> Self {
        let (width, target_width, out) = (256, 64, Self::MLP_FEATURES);
        let predictor = nn::seq()
            .add(linear(path / "fc1", obs_dim, width, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add(linear(path / "fc2", width, width, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add(linear(path / "fc3", width, out, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add(linear(path / "fc4", out, out, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add(linear(path / "fc5", out, out, 0.01));

        let target_vs = nn::VarStore::new(path.device());
        let root = target_vs.root() / "rnd_target";
        let target = nn::seq()
            .add(linear(&root / "fc1", obs_dim, target_width, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add(linear(&root / "fc2", target_width, target_width, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add(linear(&root / "fc3", target_width, out, HIDDEN_GAIN));

        Self::with_target(predictor, target, target_vs, RndView::Full, vec![obs_dim])
    }

    fn with_target(
        predictor: nn::Sequential,
        target: nn::Sequential,
        mut target_vs: nn::VarStore,
        view: RndView,
        input_shape: Vec<i64>,
    ) -> Self {
        target_vs.freeze();
        Self { predictor, target, target_vs, view, input_shape }
    }

    /// Input view
    pub fn view(&self) -> RndView {
        self.view
    }

    /// Shape of one RND input sample
    pub fn input_shape(&self) -> &[i64] {
        &self.input_shape
    }

    /// Select the RND input from a batch of agent observations
    pub fn project(&self, obs: &Tensor) -> Tensor {
        self.view.project(obs)
    }

    /// The frozen target store
    pub fn target_store(&self) -> &nn::VarStore {
        &self.target_vs
    }

    /// Predictor and target features for normalized inputs
    pub fn features(&self, inputs: &Tensor) -> (Tensor, Tensor) {
        let target = tch::no_grad(|| self.target.forward(inputs));
        (self.predictor.forward(inputs), target)
    }

    /// Novelty of each input: `sum((target - predictor)^2) / 2`
    ///
    /// Computed without gradients. Returns `[batch]`.
    pub fn intrinsic_reward(&self, inputs: &Tensor) -> Tensor {
        tch::no_grad(|| {
            let (predicted, target) = self.features(inputs);
            (target - predicted).square().sum_dim_intlist(1, false, Kind::Float) / 2.0
        })
    }

    /// Masked predictor loss on a minibatch of normalized inputs
    ///
    /// Each sample takes part with probability `update_proportion`. The
    /// loss is the sum of per-sample MSEs over the kept samples divided by
    /// their count (at least one).
    pub fn forward_loss(&self, inputs: &Tensor, update_proportion: f64) -> Tensor {
        let (predicted, target) = self.features(inputs);
        let per_sample = (predicted - target).square().mean_dim(-1, false, Kind::Float);

        let n = per_sample.size()[0];
        let mask = Tensor::rand([n], (Kind::Float, per_sample.device()))
            .lt(update_proportion)
            .to_kind(Kind::Float);
        let kept = mask.sum(Kind::Float).clamp_min(1.0);
        (per_sample * mask).sum(Kind::Float) / kept
    }
}

/// Running whitening statistics for RND inputs
#[derive(Debug, Clone)]
pub struct ObsNormalizer {
    rms: RunningMeanStd,
    shape: Vec<i64>,
}

impl ObsNormalizer {
    /// Normalizer for samples of `shape`
    pub fn new(shape: &[i64]) -> Self {
        let numel = shape.iter().product::<i64>().max(0) as usize;
        Self { rms: RunningMeanStd::new(numel), shape: shape.to_vec() }
    }

    /// Underlying statistics
    pub fn rms(&self) -> &RunningMeanStd {
        &self.rms
    }

    /// Update the statistics with a batch of projected inputs
    pub fn update(&mut self, inputs: &Tensor) -> Result<()> {
        let numel = self.rms.dim() as i64;
        let size = inputs.size();
        let per_sample: i64 = size.iter().skip(1).product();
        if size.is_empty() || per_sample != numel {
            bail!("RND input shape {:?} does not match {:?}", size, self.shape);
        }
        let flat = inputs.to_device(Device::Cpu).to_kind(Kind::Float).contiguous().view([-1]);
        self.rms.update(&Vec::<f32>::try_from(&flat)?);
        Ok(())
    }

    /// Whiten and clip a batch of projected inputs
    pub fn normalize(&self, inputs: &Tensor) -> Tensor {
        let device = inputs.device();
        let mut shape = vec![1];
        shape.extend_from_slice(&self.shape);

        let mean: Vec<f32> = self.rms.mean().iter().map(|&m| m as f32).collect();
        let std: Vec<f32> = self.rms.std().iter().map(|&s| s as f32).collect();
        let mean = Tensor::from_slice(&mean).view(shape.as_slice()).to_device(device);
        let std = Tensor::from_slice(&std).view(shape.as_slice()).to_device(device);

        ((inputs.to_kind(Kind::Float) - mean) / std).clamp(-OBS_CLIP, OBS_CLIP)
    }
}
