//! Discounted reward filter used for reward scaling
//!
//! Rewards are divided by the standard deviation of a running discounted
//! sum rather than of the raw rewards. This keeps the scale of the value
//! targets roughly constant as the reward density changes.

/// Per-environment discounted reward accumulator
#[derive(Debug, Clone)]
pub struct RewardForwardFilter {
    gamma: f64,
    rewems: Option<Vec<f64>>,
}

impl RewardForwardFilter {
    /// Create a filter with discount `gamma`
    pub fn new(gamma: f64) -> Self {
        Self { gamma, rewems: None }
    }

    /// Discount factor
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Feed one step of rewards for every environment
    ///
    /// The first call stores the rewards as-is. Afterwards only the
    /// environments whose `not_done` flag is `1.0` are advanced with
    /// `rewem * gamma + reward`; the others keep their previous sum.
    /// Returns a copy of the current sums.
    pub fn update(&mut self, rewards: &[f32], not_done: &[f32]) -> Vec<f64> {
        debug_assert_eq!(rewards.len(), not_done.len());

        match self.rewems.as_mut() {
            None => {
                self.rewems = Some(rewards.iter().map(|&r| r as f64).collect());
            }
            Some(rewems) => {
                for ((acc, &r), &nd) in rewems.iter_mut().zip(rewards).zip(not_done) {
                    if nd == 1.0 {
                        *acc = *acc * self.gamma + r as f64;
                    }
                }
            }
        }

        self.rewems.clone().unwrap_or_default()
    }

    /// Feed one step without episode boundaries
    pub fn update_continuing(&mut self, rewards: &[f32]) -> Vec<f64> {
        let ones = vec![1.0; rewards.len()];
        self.update(rewards, &ones)
    }

    /// Current sums, if any step has been fed
    pub fn current(&self) -> Option<&[f64]> {
        self.rewems.as_deref()
    }
}
