//! Intrinsic-reward traces of single episodes
//!
//! Every `interval` iterations the [`TraceRecorder`] waits for environment
//! 0 to finish its current game, then records the intrinsic reward of each
//! step of the following game. The very first game of a run is always
//! recorded.

use serde::Serialize;

/// Intrinsic rewards of one episode and their running sums
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CuriosityTrace {
    /// Reward per step
    pub rewards: Vec<f64>,

    /// `sum(r[..=i])`
    pub cumulative_rewards: Vec<f64>,

    /// `sum(gamma^j * r[j] for j <= i)`
    pub discounted_cumulative_rewards: Vec<f64>,

    /// `sum(r[i..])`
    pub return_to_go: Vec<f64>,

    /// `sum(gamma^(j - i) * r[j] for j >= i)`
    pub discounted_return_to_go: Vec<f64>,
}

impl CuriosityTrace {
    /// Build all series from per-step rewards
    pub fn from_rewards(rewards: &[f32], gamma: f64) -> Self {
        let rewards: Vec<f64> = rewards.iter().map(|&r| r as f64).collect();
        let n = rewards.len();

        let mut cumulative_rewards = Vec::with_capacity(n);
        let mut discounted_cumulative_rewards = Vec::with_capacity(n);
        let (mut sum, mut discounted, mut discount) = (0.0, 0.0, 1.0);
        for &r in &rewards {
            sum += r;
            discounted += discount * r;
            discount *= gamma;
            cumulative_rewards.push(sum);
            discounted_cumulative_rewards.push(discounted);
        }

        let mut return_to_go = vec![0.0; n];
        let mut discounted_return_to_go = vec![0.0; n];
        let (mut rtg, mut drtg) = (0.0, 0.0);
        for i in (0..n).rev() {
            rtg += rewards[i];
            drtg = rewards[i] + gamma * drtg;
            return_to_go[i] = rtg;
            discounted_return_to_go[i] = drtg;
        }

        Self { rewards, cumulative_rewards, discounted_cumulative_rewards, return_to_go, discounted_return_to_go }
    }

    /// Episode length
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Check if the trace has no steps
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Total intrinsic reward of the episode
    pub fn total(&self) -> f64 {
        self.cumulative_rewards.last().copied().unwrap_or(0.0)
    }
}

/// State machine choosing which episode of environment 0 to record
#[derive(Debug, Clone)]
pub struct TraceRecorder {
    interval: usize,
    gamma: f64,
    armed: bool,
    recording: bool,
    rewards: Vec<f32>,
}

impl TraceRecorder {
    /// Record every `interval` iterations, `0` disables recording
    pub fn new(interval: usize, gamma: f64) -> Self {
        Self { interval, gamma, armed: false, recording: interval > 0, rewards: Vec::new() }
    }

    /// Whether an episode is being recorded
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Called at the start of iteration `update`
    pub fn begin_iteration(&mut self, update: usize) {
        if self.interval > 0 && update % self.interval == 0 && !self.recording {
            self.armed = true;
        }
    }

    /// Feed one step of environment 0
    ///
    /// Returns the finished trace when the recorded game ends.
    pub fn observe(&mut self, reward: f32, game_over: bool) -> Option<CuriosityTrace> {
        if self.recording {
            self.rewards.push(reward);
            if game_over {
                self.recording = false;
                let rewards = std::mem::take(&mut self.rewards);
                return Some(CuriosityTrace::from_rewards(&rewards, self.gamma));
            }
        } else if self.armed && game_over {
            self.armed = false;
            self.recording = true;
        }
        None
    }
}
