//! Running statistics for observation and reward normalization
//!
//! RND needs whitened observations for the predictor/target pair and both
//! reward streams are scaled by the standard deviation of their discounted
//! sums. Both use the same per-dimension accumulator.

/// Running mean and variance tracker
///
/// Merges batch moments with the parallel-axis formula, so feeding the
/// same data in one batch or in many gives the same result. Statistics are
/// kept in `f64` because pixel observations accumulate millions of
/// samples per dimension.
#[derive(Debug, Clone)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    var: Vec<f64>,
    count: f64,
}

impl RunningMeanStd {
    /// Create a tracker for `size`-dimensional samples
    ///
    /// Starts at mean 0, variance 1 and a pseudo-count of `1e-4`.
    pub fn new(size: usize) -> Self {
        Self { mean: vec![0.0; size], var: vec![1.0; size], count: 1e-4 }
    }

    /// Tracker for a stream of scalars
    pub fn scalar() -> Self {
        Self::new(1)
    }

    /// Dimension of a single sample
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Update with a flat batch of samples laid out row-major
    ///
    /// `batch.len()` must be a multiple of [`dim`](Self::dim). Empty
    /// batches are ignored.
    pub fn update(&mut self, batch: &[f32]) {
        let dim = self.dim();
        if batch.is_empty() || dim == 0 {
            return;
        }
        debug_assert_eq!(batch.len() % dim, 0, "batch length not a multiple of dim");

        let rows = batch.len() / dim;
        let n = rows as f64;

        let mut batch_mean = vec![0.0f64; dim];
        for row in batch.chunks_exact(dim) {
            for (acc, &x) in batch_mean.iter_mut().zip(row) {
                *acc += x as f64;
            }
        }
        for m in &mut batch_mean {
            *m /= n;
        }

        // Population variance, matching numpy's default
        let mut batch_var = vec![0.0f64; dim];
        for row in batch.chunks_exact(dim) {
            for ((acc, &x), m) in batch_var.iter_mut().zip(row).zip(&batch_mean) {
                let d = x as f64 - m;
                *acc += d * d;
            }
        }
        for v in &mut batch_var {
            *v /= n;
        }

        self.update_from_moments(&batch_mean, &batch_var, n);
    }

    /// Merge precomputed batch moments into the running statistics
    pub fn update_from_moments(&mut self, batch_mean: &[f64], batch_var: &[f64], batch_count: f64) {
        debug_assert_eq!(batch_mean.len(), self.dim());
        debug_assert_eq!(batch_var.len(), self.dim());

        let total = self.count + batch_count;
        for i in 0..self.dim() {
            let delta = batch_mean[i] - self.mean[i];
            let m_a = self.var[i] * self.count;
            let m_b = batch_var[i] * batch_count;
            let m2 = m_a + m_b + delta * delta * self.count * batch_count / total;

            self.mean[i] += delta * batch_count / total;
            self.var[i] = m2 / total;
        }
        self.count = total;
    }

    /// Whiten a flat batch and clip every element to `[-clip, clip]`
    ///
    /// Computes `(x - mean) / sqrt(var)` per dimension.
    pub fn normalize_clipped(&self, batch: &[f32], clip: f32) -> Vec<f32> {
        let dim = self.dim();
        let std: Vec<f64> = self.var.iter().map(|v| v.sqrt()).collect();
        batch
            .chunks_exact(dim)
            .flat_map(|row| {
                row.iter().zip(&self.mean).zip(&std).map(move |((&x, &m), &s)| {
                    (((x as f64 - m) / s) as f32).clamp(-clip, clip)
                })
            })
            .collect()
    }

    /// Current mean
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Current variance
    pub fn var(&self) -> &[f64] {
        &self.var
    }

    /// Current standard deviation
    pub fn std(&self) -> Vec<f64> {
        self.var.iter().map(|v| v.sqrt()).collect()
    }

    /// Number of samples seen (including the initial pseudo-count)
    pub fn count(&self) -> f64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let rms = RunningMeanStd::new(3);
        assert_eq!(rms.mean(), &[0.0, 0.0, 0.0]);
        assert_eq!(rms.var(), &[1.0, 1.0, 1.0]);
        assert_eq!(rms.count(), 1e-4);
    }

    #[test]
    fn test_update_matches_batch_moments() {
        let mut rms = RunningMeanStd::new(2);
        rms.update(&[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);

        assert!((rms.mean()[0] - 2.0).abs() < 1e-3);
        assert!((rms.mean()[1] - 4.0).abs() < 1e-3);
        // Population variance of [1,2,3] is 2/3, of [2,4,6] is 8/3
        assert!((rms.var()[0] - 2.0 / 3.0).abs() < 1e-3);
        assert!((rms.var()[1] - 8.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_incremental_equals_single_batch() {
        let data: Vec<f32> = (0..20).map(|i| (i as f32 * 0.37).sin() * 5.0).collect();

        let mut once = RunningMeanStd::scalar();
        once.update(&data);

        let mut chunked = RunningMeanStd::scalar();
        for chunk in data.chunks(7) {
            chunked.update(chunk);
        }

        assert!((once.mean()[0] - chunked.mean()[0]).abs() < 1e-6);
        assert!((once.var()[0] - chunked.var()[0]).abs() < 1e-6);
        assert!((once.count() - chunked.count()).abs() < 1e-9);
    }

    #[test]
    fn test_empty_update_is_noop() {
        let mut rms = RunningMeanStd::scalar();
        rms.update(&[]);
        assert_eq!(rms.count(), 1e-4);
    }

    #[test]
    fn test_normalize_clipped() {
        let mut rms = RunningMeanStd::scalar();
        rms.update(&[-1.0, 1.0]);

        let out = rms.normalize_clipped(&[0.0, 1.0, 100.0, -100.0], 5.0);
        assert!(out[0].abs() < 1e-3);
        assert!((out[1] - 1.0).abs() < 1e-3);
        assert_eq!(out[2], 5.0);
        assert_eq!(out[3], -5.0);
    }
}
