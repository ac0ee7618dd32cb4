//! Diagonal Gaussian actor-critic for continuous control
//!
//! The actor predicts the action mean; the log standard deviation is a
//! learned, state-independent parameter. Actor and critic do not share
//! layers.

use tch::{Device, Kind, Tensor, nn, nn::Module};

use super::{ActionSample, ActorCritic, Evaluation, HIDDEN_GAIN, Values, linear};

const HIDDEN: i64 = 256;

/// `ln(sqrt(2 pi))`
const LOG_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Which value heads sit on top of the critic trunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticHeads {
    /// Extrinsic and intrinsic heads (PPO + RND)
    Dual,
    /// Extrinsic head only (plain PPO)
    Single,
}

/// Gaussian policy with a tanh MLP actor and critic
#[derive(Debug)]
pub struct GaussianAgent {
    critic_base: nn::Sequential,
    critic_ext: nn::Linear,
    critic_int: Option<nn::Linear>,
    actor_mean: nn::Sequential,
    actor_logstd: Tensor,
    device: Device,
}

impl GaussianAgent {
    /// Build the agent under `path`
    pub fn new(path: &nn::Path, obs_dim: i64, act_dim: i64, heads: CriticHeads) -> Self {
        let critic_base = nn::seq()
            .add(linear(path / "critic_fc1", obs_dim, HIDDEN, HIDDEN_GAIN))
            .add_fn(|x| x.tanh())
            .add(linear(path / "critic_fc2", HIDDEN, HIDDEN, HIDDEN_GAIN))
            .add_fn(|x| x.tanh());

        let actor_mean = nn::seq()
            .add(linear(path / "actor_fc1", obs_dim, HIDDEN, HIDDEN_GAIN))
            .add_fn(|x| x.tanh())
            .add(linear(path / "actor_fc2", HIDDEN, HIDDEN, HIDDEN_GAIN))
            .add_fn(|x| x.tanh())
            .add(linear(path / "actor_out", HIDDEN, act_dim, 0.01));

        let critic_ext = linear(path / "critic_ext", HIDDEN, 1, 1.0);
        let critic_int = match heads {
            CriticHeads::Dual => Some(linear(path / "critic_int", HIDDEN, 1, 1.0)),
            CriticHeads::Single => None,
        };
        let actor_logstd = path.zeros("actor_logstd", &[1, act_dim]);

        Self { critic_base, critic_ext, critic_int, actor_mean, actor_logstd, device: path.device() }
    }

    /// Current per-dimension standard deviation, `[1, act_dim]`
    pub fn action_std(&self) -> Tensor {
        self.actor_logstd.exp()
    }

    fn distribution(&self, obs: &Tensor) -> (Tensor, Tensor) {
        let mean = self.actor_mean.forward(obs);
        let logstd = self.actor_logstd.expand_as(&mean);
        (mean, logstd)
    }

    fn log_prob(mean: &Tensor, logstd: &Tensor, actions: &Tensor) -> Tensor {
        let var = (logstd * 2.0).exp();
        let per_dim = -(actions - mean).square() / (var * 2.0) - logstd - LOG_SQRT_2PI;
        per_dim.sum_dim_intlist(1, false, Kind::Float)
    }
}

impl ActorCritic for GaussianAgent {
    fn act(&self, obs: &Tensor, deterministic: bool) -> ActionSample {
        let (mean, logstd) = self.distribution(obs);
        let actions = if deterministic {
            mean.shallow_clone()
        } else {
            &mean + logstd.exp() * mean.randn_like()
        };
        let log_probs = Self::log_prob(&mean, &logstd, &actions);
        ActionSample { actions, log_probs, values: self.values(obs) }
    }

    fn values(&self, obs: &Tensor) -> Values {
        let hidden = self.critic_base.forward(obs);
        Values {
            ext: self.critic_ext.forward(&hidden).squeeze_dim(-1),
            int: self.critic_int.as_ref().map(|head| head.forward(&hidden).squeeze_dim(-1)),
        }
    }

    fn evaluate(&self, obs: &Tensor, actions: &Tensor) -> Evaluation {
        let (mean, logstd) = self.distribution(obs);
        let log_probs = Self::log_prob(&mean, &logstd, actions);
        let entropy = (logstd + 0.5 + LOG_SQRT_2PI).sum_dim_intlist(1, false, Kind::Float);
        Evaluation { log_probs, entropy, values: self.values(obs) }
    }

    fn device(&self) -> Device {
        self.device
    }

    fn has_intrinsic_head(&self) -> bool {
        self.critic_int.is_some()
    }
}
