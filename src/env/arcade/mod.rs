//! Batched pixel games with Atari-style preprocessing
//!
//! Games render 84x84 grayscale frames and expose a small discrete action
//! set. [`ArcadeEnv`] wraps a game with the usual preprocessing pipeline:
//!
//! - sticky actions (the previous action is repeated with probability `p`)
//! - reward clipping to `{-1, 0, 1}` (the raw reward stays in
//!   [`StepInfo::true_reward`])
//! - episodic life (a lost life is reported as an episode boundary while
//!   the game keeps running)
//! - time-limit truncation
//! - frame stacking, channels first, oldest frame first

use std::collections::VecDeque;

use anyhow::{Result, bail};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::env::{Environment, SpaceInfo, SpaceType, StepInfo, StepResult};

pub mod maze;

pub use maze::TreasureMaze;

/// Side length of a rendered frame in pixels
pub const FRAME_SIZE: usize = 84;

/// Number of pixels in one frame
pub const FRAME_PIXELS: usize = FRAME_SIZE * FRAME_SIZE;

/// Game ids understood by [`make`]
pub const GAME_IDS: &[&str] = &["TreasureMaze-v0"];

/// Outcome of advancing a game by one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GameStep {
    /// Raw game reward
    pub reward: f32,

    /// The game is over (no lives left or goal reached)
    pub game_over: bool,
}

/// A single-player pixel game
pub trait ArcadeGame: Send {
    /// Size of the discrete action set
    fn num_actions(&self) -> usize;

    /// Start a new game
    fn reset(&mut self, rng: &mut StdRng);

    /// Advance by one frame
    fn act(&mut self, action: usize) -> GameStep;

    /// Draw the current screen into `frame` (`FRAME_PIXELS` bytes)
    fn render(&self, frame: &mut [u8]);

    /// Remaining lives
    fn lives(&self) -> u32;
}

/// Preprocessing options for [`ArcadeEnv`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcadeConfig {
    /// Report life losses as episode boundaries
    pub episodic_life: bool,

    /// Clip training rewards to their sign
    pub reward_clip: bool,

    /// Truncate games after this many agent steps
    pub max_episode_steps: usize,

    /// Probability of repeating the previous action
    pub repeat_action_probability: f64,

    /// Number of stacked frames per observation
    pub frame_stack: usize,
}

impl Default for ArcadeConfig {
    fn default() -> Self {
        Self {
            episodic_life: true,
            reward_clip: true,
            max_episode_steps: 108_000 / 4,
            repeat_action_probability: 0.25,
            frame_stack: 4,
        }
    }
}

impl ArcadeConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_episode_steps == 0 {
            bail!("max_episode_steps must be positive");
        }
        if !(0.0..=1.0).contains(&self.repeat_action_probability) {
            bail!("repeat_action_probability must be in [0, 1]");
        }
        if self.frame_stack == 0 {
            bail!("frame_stack must be positive");
        }
        Ok(())
    }

    /// Set sticky-action probability
    pub fn repeat_action_probability(mut self, p: f64) -> Self {
        self.repeat_action_probability = p;
        self
    }

    /// Set the time limit
    pub fn max_episode_steps(mut self, steps: usize) -> Self {
        self.max_episode_steps = steps;
        self
    }

    /// Toggle episodic life
    pub fn episodic_life(mut self, enabled: bool) -> Self {
        self.episodic_life = enabled;
        self
    }

    /// Toggle reward clipping
    pub fn reward_clip(mut self, enabled: bool) -> Self {
        self.reward_clip = enabled;
        self
    }
}

/// A pixel game with Atari-style preprocessing
pub struct ArcadeEnv<G: ArcadeGame> {
    game: G,
    config: ArcadeConfig,
    rng: StdRng,
    frames: VecDeque<Vec<u8>>,
    last_action: usize,
    elapsed: usize,
    lives: u32,
}

impl<G: ArcadeGame> ArcadeEnv<G> {
    /// Wrap `game`, seeding sticky actions and game randomness with `seed`
    pub fn new(game: G, config: ArcadeConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let frames = VecDeque::with_capacity(config.frame_stack);
        Ok(Self {
            game,
            config,
            rng: StdRng::seed_from_u64(seed),
            frames,
            last_action: 0,
            elapsed: 0,
            lives: 0,
        })
    }

    /// The wrapped game
    pub fn game(&self) -> &G {
        &self.game
    }

    fn push_frame(&mut self) {
        let mut frame = if self.frames.len() == self.config.frame_stack {
            self.frames.pop_front().unwrap_or_default()
        } else {
            Vec::new()
        };
        frame.resize(FRAME_PIXELS, 0);
        self.game.render(&mut frame);
        self.frames.push_back(frame);
    }

    fn observation(&self) -> Vec<f32> {
        self.frames.iter().flat_map(|f| f.iter().map(|&p| p as f32)).collect()
    }
}

impl<G: ArcadeGame> Environment for ArcadeEnv<G> {
    type Action = i64;

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.game.reset(&mut self.rng);
        self.elapsed = 0;
        self.last_action = 0;
        self.lives = self.game.lives();

        self.frames.clear();
        self.push_frame();
        while self.frames.len() < self.config.frame_stack {
            let first = self.frames[0].clone();
            self.frames.push_front(first);
        }
        Ok(self.observation())
    }

    fn step(&mut self, action: &i64) -> Result<StepResult> {
        let n = self.game.num_actions();
        if *action < 0 || *action as usize >= n {
            bail!("action {} out of range for {} actions", action, n);
        }

        let mut action = *action as usize;
        if self.rng.gen_bool(self.config.repeat_action_probability) {
            action = self.last_action;
        }
        self.last_action = action;

        let outcome = self.game.act(action);
        self.elapsed += 1;

        let lives = self.game.lives();
        let life_lost =
            self.config.episodic_life && lives < self.lives && !outcome.game_over;
        self.lives = lives;

        let truncated = !outcome.game_over && self.elapsed >= self.config.max_episode_steps;
        let reward = if self.config.reward_clip { clip_reward(outcome.reward) } else { outcome.reward };

        self.push_frame();

        Ok(StepResult {
            observation: self.observation(),
            reward,
            terminated: outcome.game_over,
            truncated,
            info: StepInfo { true_reward: outcome.reward, lives, life_lost },
        })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo {
            shape: vec![self.config.frame_stack, FRAME_SIZE, FRAME_SIZE],
            dtype: SpaceType::Continuous { low: 0.0, high: 255.0 },
        }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![], dtype: SpaceType::Discrete(self.game.num_actions()) }
    }
}

/// Clip a reward to its sign
pub fn clip_reward(reward: f32) -> f32 {
    if reward > 0.0 {
        1.0
    } else if reward < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Create a preprocessed game by id
///
/// # Errors
///
/// Fails for unknown ids and invalid configurations.
pub fn make(env_id: &str, config: &ArcadeConfig, seed: u64) -> Result<ArcadeEnv<TreasureMaze>> {
    match env_id {
        "TreasureMaze-v0" => ArcadeEnv::new(TreasureMaze::new(), config.clone(), seed),
        other => bail!("unknown arcade game '{}' (known: {})", other, GAME_IDS.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted game: reward 5 on every step, a life lost on step 2,
    /// game over on step 4
    struct Scripted {
        t: usize,
        lives: u32,
        actions: Vec<usize>,
    }

    impl ArcadeGame for Scripted {
        fn num_actions(&self) -> usize {
            3
        }

        fn reset(&mut self, _rng: &mut StdRng) {
            self.t = 0;
            self.lives = 2;
        }

        fn act(&mut self, action: usize) -> GameStep {
            self.t += 1;
            self.actions.push(action);
            if self.t == 2 {
                self.lives -= 1;
            }
            GameStep { reward: 5.0, game_over: self.t >= 4 }
        }

        fn render(&self, frame: &mut [u8]) {
            frame.iter_mut().for_each(|p| *p = self.t as u8);
        }

        fn lives(&self) -> u32 {
            self.lives
        }
    }

    fn scripted(config: ArcadeConfig) -> ArcadeEnv<Scripted> {
        ArcadeEnv::new(Scripted { t: 0, lives: 2, actions: Vec::new() }, config, 0).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ArcadeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_episode_steps, 27_000);
        assert!(ArcadeConfig::default().repeat_action_probability(1.5).validate().is_err());
    }

    #[test]
    fn test_frame_stack_oldest_first() {
        let mut env = scripted(ArcadeConfig::default().repeat_action_probability(0.0));
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), 4 * FRAME_PIXELS);
        assert!(obs.iter().all(|&p| p == 0.0));

        env.step(&1).unwrap();
        let obs = env.step(&1).unwrap().observation;
        assert_eq!(obs[0], 0.0);
        assert_eq!(obs[2 * FRAME_PIXELS], 1.0);
        assert_eq!(obs[3 * FRAME_PIXELS], 2.0);
    }

    #[test]
    fn test_reward_clip_and_life_loss() {
        let mut env = scripted(ArcadeConfig::default().repeat_action_probability(0.0));
        env.reset().unwrap();

        let first = env.step(&0).unwrap();
        assert_eq!(first.reward, 1.0);
        assert_eq!(first.info.true_reward, 5.0);
        assert!(!first.done());

        let second = env.step(&0).unwrap();
        assert!(second.info.life_lost);
        assert!(second.done() && !second.game_over());

        env.step(&0).unwrap();
        let last = env.step(&0).unwrap();
        assert!(last.terminated && !last.info.life_lost);
    }

    #[test]
    fn test_episodic_life_disabled() {
        let mut env = scripted(
            ArcadeConfig::default().repeat_action_probability(0.0).episodic_life(false).reward_clip(false),
        );
        env.reset().unwrap();
        env.step(&0).unwrap();
        let second = env.step(&0).unwrap();
        assert!(!second.done());
        assert_eq!(second.reward, 5.0);
    }

    #[test]
    fn test_time_limit_truncates() {
        let mut env = scripted(ArcadeConfig::default().repeat_action_probability(0.0).max_episode_steps(2));
        env.reset().unwrap();
        assert!(!env.step(&0).unwrap().truncated);
        let step = env.step(&0).unwrap();
        assert!(step.truncated && !step.terminated);
    }

    #[test]
    fn test_sticky_actions_repeat_previous() {
        let mut env = scripted(ArcadeConfig::default().repeat_action_probability(1.0));
        env.reset().unwrap();
        env.step(&2).unwrap();
        env.step(&1).unwrap();
        // With p = 1 the initial noop is repeated forever
        assert_eq!(env.game().actions, vec![0, 0]);
    }

    #[test]
    fn test_invalid_action() {
        let mut env = scripted(ArcadeConfig::default());
        env.reset().unwrap();
        assert!(env.step(&3).is_err());
        assert!(env.step(&-1).is_err());
    }

    #[test]
    fn test_make() {
        let env = make("TreasureMaze-v0", &ArcadeConfig::default(), 1).unwrap();
        assert_eq!(env.observation_space().shape, vec![4, 84, 84]);
        assert_eq!(env.action_space().dtype, SpaceType::Discrete(5));
        assert!(make("Pong-v5", &ArcadeConfig::default(), 1).is_err());
    }
}
