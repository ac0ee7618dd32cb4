//! Convolutional actor-critic for stacked pixel frames
//!
//! # Architecture
//!
//! ```text
//! frames [B, 4, 84, 84] / 255
//!         |
//!  Conv 32 8x8 /4, Conv 64 4x4 /2, Conv 64 3x3 /1 (ReLU)
//!         |
//!  Dense(256), Dense(448) (ReLU)  = hidden
//!      /              \
//!  actor            extra layer Dense(448) = features
//!  Dense(448)          |
//!  Dense(n)     features + hidden
//!                  /        \
//!            critic_ext  critic_int
//! ```

use tch::{Device, Kind, Tensor, nn, nn::Module};

use super::{ActionSample, ActorCritic, Evaluation, HIDDEN_GAIN, Values, conv, linear};

/// Flattened size of the conv trunk output for 84x84 inputs
pub const CONV_OUT: i64 = 64 * 7 * 7;

const HIDDEN: i64 = 448;

/// Categorical actor-critic with extrinsic and intrinsic value heads
#[derive(Debug)]
pub struct PixelAgent {
    network: nn::Sequential,
    extra_layer: nn::Sequential,
    actor: nn::Sequential,
    critic_ext: nn::Linear,
    critic_int: nn::Linear,
    num_actions: i64,
    device: Device,
}

impl PixelAgent {
    /// Build the agent under `path`
    ///
    /// # Arguments
    /// * `path` - Variable store path owning the parameters
    /// * `in_channels` - Number of stacked frames
    /// * `num_actions` - Size of the discrete action space
    pub fn new(path: &nn::Path, in_channels: i64, num_actions: i64) -> Self {
        let network = nn::seq()
            .add(conv(path / "conv1", in_channels, 32, 8, 4, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add(conv(path / "conv2", 32, 64, 4, 2, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add(conv(path / "conv3", 64, 64, 3, 1, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add_fn(|x| x.flat_view())
            .add(linear(path / "fc1", CONV_OUT, 256, HIDDEN_GAIN))
            .add_fn(|x| x.relu())
            .add(linear(path / "fc2", 256, HIDDEN, HIDDEN_GAIN))
            .add_fn(|x| x.relu());

        let extra_layer = nn::seq()
            .add(linear(path / "extra", HIDDEN, HIDDEN, 0.1))
            .add_fn(|x| x.relu());

        let actor = nn::seq()
            .add(linear(path / "actor_fc", HIDDEN, HIDDEN, 0.01))
            .add_fn(|x| x.relu())
            .add(linear(path / "actor_out", HIDDEN, num_actions, 0.01));

        let critic_ext = linear(path / "critic_ext", HIDDEN, 1, 0.01);
        let critic_int = linear(path / "critic_int", HIDDEN, 1, 0.01);

        Self {
            network,
            extra_layer,
            actor,
            critic_ext,
            critic_int,
            num_actions,
            device: path.device(),
        }
    }

    /// Number of discrete actions
    pub fn num_actions(&self) -> i64 {
        self.num_actions
    }

    fn hidden(&self, obs: &Tensor) -> Tensor {
        self.network.forward(&(obs.to_kind(Kind::Float) / 255.0))
    }

    fn heads(&self, hidden: &Tensor) -> Values {
        let features = self.extra_layer.forward(hidden) + hidden;
        Values {
            ext: self.critic_ext.forward(&features).squeeze_dim(-1),
            int: Some(self.critic_int.forward(&features).squeeze_dim(-1)),
        }
    }
}

impl ActorCritic for PixelAgent {
    fn act(&self, obs: &Tensor, deterministic: bool) -> ActionSample {
        let hidden = self.hidden(obs);
        let log_probs_all = self.actor.forward(&hidden).log_softmax(-1, Kind::Float);

        let actions = if deterministic {
            log_probs_all.argmax(-1, false)
        } else {
            log_probs_all.exp().multinomial(1, true).squeeze_dim(-1)
        };
        let log_probs = log_probs_all.gather(-1, &actions.unsqueeze(-1), false).squeeze_dim(-1);

        ActionSample { actions, log_probs, values: self.heads(&hidden) }
    }

    fn values(&self, obs: &Tensor) -> Values {
        self.heads(&self.hidden(obs))
    }

    fn evaluate(&self, obs: &Tensor, actions: &Tensor) -> Evaluation {
        let hidden = self.hidden(obs);
        let log_probs_all = self.actor.forward(&hidden).log_softmax(-1, Kind::Float);
        let log_probs = log_probs_all
            .gather(-1, &actions.to_kind(Kind::Int64).unsqueeze(-1), false)
            .squeeze_dim(-1);
        let entropy = -(log_probs_all.exp() * &log_probs_all).sum_dim_intlist(-1, false, Kind::Float);

        Evaluation { log_probs, entropy, values: self.heads(&hidden) }
    }

    fn device(&self) -> Device {
        self.device
    }

    fn has_intrinsic_head(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> (nn::VarStore, PixelAgent) {
        let vs = nn::VarStore::new(Device::Cpu);
        let agent = PixelAgent::new(&(vs.root() / "agent"), 4, 5);
        (vs, agent)
    }

    fn frames(batch: i64) -> Tensor {
        Tensor::rand([batch, 4, 84, 84], (Kind::Float, Device::Cpu)) * 255.0
    }

    #[test]
    fn test_act_shapes() {
        let (_vs, agent) = build();
        let sample = agent.act(&frames(3), false);

        assert_eq!(sample.actions.size(), vec![3]);
        assert_eq!(sample.log_probs.size(), vec![3]);
        assert_eq!(sample.values.ext.size(), vec![3]);
        assert_eq!(sample.values.int.as_ref().unwrap().size(), vec![3]);

        let actions: Vec<i64> = Vec::try_from(&sample.actions).unwrap();
        assert!(actions.iter().all(|a| (0..5).contains(a)));
    }

    #[test]
    fn test_deterministic_action_is_argmax() {
        let (_vs, agent) = build();
        let obs = frames(4);
        let a = agent.act(&obs, true);
        let b = agent.act(&obs, true);
        assert!(a.actions.equal(&b.actions));

        let eval = agent.evaluate(&obs, &a.actions);
        let diff = (&eval.log_probs - &a.log_probs).abs().max();
        assert!(f64::try_from(diff).unwrap() < 1e-5);
    }

    #[test]
    fn test_initial_policy_is_near_uniform() {
        let (_vs, agent) = build();
        let eval = agent.evaluate(&frames(8), &Tensor::zeros([8], (Kind::Int64, Device::Cpu)));
        assert_eq!(eval.entropy.size(), vec![8]);

        // Output layers start with gain 0.01, so the entropy is close to ln(5)
        let entropy = f64::try_from(eval.entropy.mean(Kind::Float)).unwrap();
        assert!((entropy - 5f64.ln()).abs() < 0.05);
    }

    #[test]
    fn test_save_load() {
        let (vs, agent) = build();
        let path = std::env::temp_dir().join("ppo_rnd_test_pixel_agent.safetensors");
        let obs = frames(2);
        let before = agent.values(&obs).ext;
        vs.save(&path).unwrap();

        let (mut vs2, agent2) = build();
        vs2.load(&path).unwrap();
        let after = agent2.values(&obs).ext;

        let diff = f64::try_from((before - after).abs().max()).unwrap();
        assert!(diff < 1e-6);
        std::fs::remove_file(path).ok();
    }
}
