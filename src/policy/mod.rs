//! Actor-critic networks
//!
//! Two agents share the [`ActorCritic`] interface used by the trainer:
//! - [`pixel::PixelAgent`]: convolutional agent with a categorical policy
//!   for stacked 84x84 frames
//! - [`gaussian::GaussianAgent`]: MLP agent with a diagonal Gaussian
//!   policy for low-dimensional continuous control
//!
//! Agents are built under an `nn::Path` of a caller-owned `VarStore`, so the
//! agent and the RND predictor can be trained by one optimizer.

use anyhow::{Result, bail};
use tch::{Device, Kind, Tensor, nn, nn::Init};

pub mod gaussian;
pub mod pixel;

pub use gaussian::{CriticHeads, GaussianAgent};
pub use pixel::PixelAgent;

/// Value estimates of both reward streams, shape `[batch]`
#[derive(Debug)]
pub struct Values {
    /// Extrinsic value
    pub ext: Tensor,

    /// Intrinsic value, `None` for agents without an intrinsic head
    pub int: Option<Tensor>,
}

/// Output of [`ActorCritic::act`]
#[derive(Debug)]
pub struct ActionSample {
    /// Actions: `[batch]` int64 for discrete, `[batch, act_dim]` for continuous
    pub actions: Tensor,

    /// Log-probability of each action, `[batch]`
    pub log_probs: Tensor,

    /// Values of the observations the actions were taken in
    pub values: Values,
}

/// Output of [`ActorCritic::evaluate`]
#[derive(Debug)]
pub struct Evaluation {
    /// Log-probability of the given actions under the current policy
    pub log_probs: Tensor,

    /// Per-sample policy entropy, `[batch]`
    pub entropy: Tensor,

    /// Current value estimates
    pub values: Values,
}

/// Actor-critic interface shared by the pixel and continuous agents
pub trait ActorCritic {
    /// Sample (or pick the most likely) action for each observation
    fn act(&self, obs: &Tensor, deterministic: bool) -> ActionSample;

    /// Value estimates only
    fn values(&self, obs: &Tensor) -> Values;

    /// Re-evaluate stored actions for the PPO update
    fn evaluate(&self, obs: &Tensor, actions: &Tensor) -> Evaluation;

    /// Device the parameters live on
    fn device(&self) -> Device;

    /// Whether the agent has an intrinsic value head
    fn has_intrinsic_head(&self) -> bool;
}

/// Linear layer with orthogonal weights scaled by `gain` and zero bias
pub fn linear(path: nn::Path, in_dim: i64, out_dim: i64, gain: f64) -> nn::Linear {
    let config = nn::LinearConfig {
        ws_init: Init::Orthogonal { gain },
        bs_init: Some(Init::Const(0.0)),
        bias: true,
    };
    nn::linear(path, in_dim, out_dim, config)
}

/// 2D convolution with orthogonal weights scaled by `gain` and zero bias
pub fn conv(
    path: nn::Path,
    in_channels: i64,
    out_channels: i64,
    kernel: i64,
    stride: i64,
    gain: f64,
) -> nn::Conv2D {
    let config = nn::ConvConfig {
        stride,
        ws_init: Init::Orthogonal { gain },
        bs_init: Init::Const(0.0),
        ..Default::default()
    };
    nn::conv2d(path, in_channels, out_channels, kernel, config)
}

/// Default gain for hidden layers, `sqrt(2)`
pub const HIDDEN_GAIN: f64 = std::f64::consts::SQRT_2;

/// Environment actions that can be decoded from a policy output tensor
pub trait PolicyAction: Sized + Clone + Send + Sync {
    /// Split a batch of actions into one value per environment
    fn from_tensor(actions: &Tensor) -> Result<Vec<Self>>;
}

impl PolicyAction for i64 {
    fn from_tensor(actions: &Tensor) -> Result<Vec<Self>> {
        let flat = actions.to_device(Device::Cpu).to_kind(Kind::Int64).view([-1]);
        Ok(Vec::<i64>::try_from(&flat)?)
    }
}

impl PolicyAction for Vec<f32> {
    fn from_tensor(actions: &Tensor) -> Result<Vec<Self>> {
        let size = actions.size();
        if size.len() != 2 {
            bail!("continuous actions must be [batch, act_dim], got {:?}", size);
        }
        let dim = size[1] as usize;
        let flat = actions.to_device(Device::Cpu).to_kind(Kind::Float).contiguous().view([-1]);
        let values = Vec::<f32>::try_from(&flat)?;
        Ok(values.chunks(dim.max(1)).map(<[f32]>::to_vec).collect())
    }
}
