//! Deterministic-policy evaluation results

use crate::{tracking::Metrics, utils};

/// Scores and lengths of the episodes played by one evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalSummary {
    /// Mean game score
    pub score: f64,
    /// Lowest game score
    pub min_score: f64,
    /// Highest game score
    pub max_score: f64,
    /// Mean episode length
    pub ep_len: f64,
    /// Shortest episode
    pub min_ep_len: f64,
    /// Longest episode
    pub max_ep_len: f64,
    /// Episodes played
    pub num_episodes: usize,
    /// Wall-clock seconds
    pub time: f64,
}

impl EvalSummary {
    /// Summarize finished episodes
    pub fn from_episodes(scores: &[f32], lengths: &[f32], time: f64) -> Self {
        Self {
            score: utils::mean(scores),
            min_score: extreme(scores, f64::min),
            max_score: extreme(scores, f64::max),
            ep_len: utils::mean(lengths),
            min_ep_len: extreme(lengths, f64::min),
            max_ep_len: extreme(lengths, f64::max),
            num_episodes: scores.len(),
            time,
        }
    }

    /// `eval/*` metrics
    pub fn metrics(&self) -> Metrics {
        let mut metrics = Metrics::new();
        metrics
            .record("eval/score", self.score)
            .record("eval/min_score", self.min_score)
            .record("eval/max_score", self.max_score)
            .record("eval/ep_len", self.ep_len)
            .record("eval/min_ep_len", self.min_ep_len)
            .record("eval/max_ep_len", self.max_ep_len)
            .record("eval/num_episodes", self.num_episodes as f64)
            .record("eval/time", self.time);
        metrics
    }
}

fn extreme(values: &[f32], pick: fn(f64, f64) -> f64) -> f64 {
    values.iter().map(|&v| v as f64).reduce(pick).unwrap_or(0.0)
}
