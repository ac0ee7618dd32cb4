//! Episode statistics for vectorized environments
//!
//! [`EpisodeRecorder`] accumulates returns and lengths per environment and
//! emits a [`FinishedEpisode`] whenever a game ends. [`EpisodeWindow`]
//! keeps the most recent episodes for the per-iteration charts.

use std::collections::VecDeque;

use crate::utils;

/// Summary of one completed game
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishedEpisode {
    /// Environment slot that finished
    pub env_id: usize,

    /// Sum of training rewards
    pub episode_return: f32,

    /// Sum of unmodified rewards (the game score)
    pub true_return: f32,

    /// Number of steps in the game
    pub length: usize,
}

/// Per-environment return and length accumulators
#[derive(Debug, Clone)]
pub struct EpisodeRecorder {
    returns: Vec<f32>,
    true_returns: Vec<f32>,
    lengths: Vec<usize>,
}

impl EpisodeRecorder {
    /// Create accumulators for `num_envs` environments
    pub fn new(num_envs: usize) -> Self {
        Self {
            returns: vec![0.0; num_envs],
            true_returns: vec![0.0; num_envs],
            lengths: vec![0; num_envs],
        }
    }

    /// Zero every accumulator
    pub fn reset(&mut self) {
        self.returns.iter_mut().for_each(|r| *r = 0.0);
        self.true_returns.iter_mut().for_each(|r| *r = 0.0);
        self.lengths.iter_mut().for_each(|l| *l = 0);
    }

    /// Record one step of environment `env_id`
    ///
    /// Returns the finished episode when `game_over` is set. Life losses
    /// are not game ends and keep accumulating.
    pub fn record(
        &mut self,
        env_id: usize,
        reward: f32,
        true_reward: f32,
        game_over: bool,
    ) -> Option<FinishedEpisode> {
        self.returns[env_id] += reward;
        self.true_returns[env_id] += true_reward;
        self.lengths[env_id] += 1;

        if !game_over {
            return None;
        }

        let finished = FinishedEpisode {
            env_id,
            episode_return: self.returns[env_id],
            true_return: self.true_returns[env_id],
            length: self.lengths[env_id],
        };
        self.returns[env_id] = 0.0;
        self.true_returns[env_id] = 0.0;
        self.lengths[env_id] = 0;
        Some(finished)
    }
}

/// Bounded window over the most recent finished episodes
#[derive(Debug, Clone)]
pub struct EpisodeWindow {
    capacity: usize,
    returns: VecDeque<f32>,
    true_returns: VecDeque<f32>,
    lengths: VecDeque<f32>,
    total: usize,
}

/// Mean / max / min of one windowed quantity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowSummary {
    /// Mean, `0` for an empty window
    pub mean: f64,
    /// Maximum, floored at `0`
    pub max: f64,
    /// Minimum, capped at `0`
    pub min: f64,
}

impl EpisodeWindow {
    /// Create a window keeping at most `capacity` episodes
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            returns: VecDeque::with_capacity(capacity),
            true_returns: VecDeque::with_capacity(capacity),
            lengths: VecDeque::with_capacity(capacity),
            total: 0,
        }
    }

    /// Push a finished episode, evicting the oldest when full
    pub fn push(&mut self, episode: &FinishedEpisode) {
        if self.capacity == 0 {
            return;
        }
        if self.returns.len() == self.capacity {
            self.returns.pop_front();
            self.true_returns.pop_front();
            self.lengths.pop_front();
        }
        self.returns.push_back(episode.episode_return);
        self.true_returns.push_back(episode.true_return);
        self.lengths.push_back(episode.length as f32);
        self.total += 1;
    }

    /// Number of episodes currently in the window
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    /// Whether no episode has finished yet
    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// Episodes pushed since creation
    pub fn total(&self) -> usize {
        self.total
    }

    /// Training-reward returns
    pub fn returns(&self) -> WindowSummary {
        summarize(&self.returns)
    }

    /// Game scores
    pub fn true_returns(&self) -> WindowSummary {
        summarize(&self.true_returns)
    }

    /// Episode lengths
    pub fn lengths(&self) -> WindowSummary {
        summarize(&self.lengths)
    }
}

fn summarize(values: &VecDeque<f32>) -> WindowSummary {
    let (front, back) = values.as_slices();
    let all: Vec<f32> = front.iter().chain(back).copied().collect();
    WindowSummary {
        mean: utils::mean(&all),
        max: utils::max_or(&all, 0.0),
        min: utils::min_or(&all, 0.0),
    }
}
