//! Verify the RND bonus separates familiar from novel observations
//!
//! The predictor is trained on a cluster of observations around +1. After
//! training, the intrinsic reward of that cluster should be well below the
//! reward of a cluster around -1 the predictor has never seen.

use ppo_rnd::rnd::{ObsNormalizer, RndModel};
use tch::{Device, Kind, Tensor, nn, nn::OptimizerConfig};

fn cluster(center: f64, n: i64) -> Tensor {
    Tensor::randn([n, 4], (Kind::Float, Device::Cpu)) * 0.1 + center
}

#[test]
fn test_predictor_learns_familiar_states() {
    tch::manual_seed(0);
    let vs = nn::VarStore::new(Device::Cpu);
    let rnd = RndModel::mlp(&(vs.root() / "rnd_predictor"), 4);
    let mut optimizer = nn::Adam::default().build(&vs, 1e-3).unwrap();

    let familiar = cluster(1.0, 256);
    let novel = cluster(-1.0, 256);

    // Whitening statistics cover both clusters, as the warm-up would
    let mut normalizer = ObsNormalizer::new(rnd.input_shape());
    normalizer.update(&Tensor::cat(&[&familiar, &novel], 0)).unwrap();
    let familiar = normalizer.normalize(&familiar);
    let novel = normalizer.normalize(&novel);

    let before = rnd.intrinsic_reward(&familiar).mean(Kind::Float).double_value(&[]);
    for _ in 0..300 {
        let loss = rnd.forward_loss(&familiar, 1.0);
        optimizer.backward_step(&loss);
    }
    let after = rnd.intrinsic_reward(&familiar).mean(Kind::Float).double_value(&[]);
    let unseen = rnd.intrinsic_reward(&novel).mean(Kind::Float).double_value(&[]);

    println!("familiar: {:.5} -> {:.5}, novel: {:.5}", before, after, unseen);
    assert!(after < before * 0.5, "predictor did not fit the familiar cluster");
    assert!(unseen > after * 2.0, "novel states are not more rewarding than familiar ones");
}

#[test]
fn test_target_is_frozen() {
    tch::manual_seed(1);
    let vs = nn::VarStore::new(Device::Cpu);
    let rnd = RndModel::mlp(&(vs.root() / "rnd_predictor"), 3);
    let mut optimizer = nn::Adam::default().build(&vs, 1e-2).unwrap();

    let inputs = Tensor::randn([32, 3], (Kind::Float, Device::Cpu));
    let (_, target_before) = rnd.features(&inputs);
    for _ in 0..10 {
        optimizer.backward_step(&rnd.forward_loss(&inputs, 1.0));
    }
    let (_, target_after) = rnd.features(&inputs);

    assert!(target_before.allclose(&target_after, 0.0, 0.0, false));
    assert!(rnd.target_store().trainable_variables().iter().all(|t| !t.requires_grad()));
}
