//! Minibatch sampling for PPO epochs

use rand::{Rng, seq::SliceRandom};
use tch::{Device, Tensor};

/// Generate minibatch indices for PPO training
///
/// Shuffles `0..buffer_size` and splits it into chunks of `minibatch_size`.
/// The last chunk is shorter when the sizes do not divide.
///
/// # Arguments
/// * `buffer_size` - Total number of samples in the batch
/// * `minibatch_size` - Desired size of each minibatch
/// * `rng` - Source of the shuffle
pub fn generate_minibatch_indices<R: Rng + ?Sized>(
    buffer_size: usize,
    minibatch_size: usize,
    rng: &mut R,
) -> Vec<Vec<i64>> {
    let mut indices: Vec<i64> = (0..buffer_size as i64).collect();
    indices.shuffle(rng);

    indices.chunks(minibatch_size.max(1)).map(<[i64]>::to_vec).collect()
}

/// Upload one minibatch of indices
pub fn index_tensor(indices: &[i64], device: Device) -> Tensor {
    Tensor::from_slice(indices).to_device(device)
}
