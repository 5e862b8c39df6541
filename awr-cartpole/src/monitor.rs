//! Episode statistics and the failure reward.
use anyhow::Result;
use awr_core::{Env, Step};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Configuration of [`EpisodeMonitor`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EpisodeMonitorConfig<C> {
    /// Configuration of the wrapped environment.
    pub env_config: C,

    /// Reward of the last step of an episode that ended before the step limit.
    pub failure_reward: f32,

    /// Number of recent episodes averaged in the log.
    pub window: usize,
}

impl<C> EpisodeMonitorConfig<C> {
    /// Wraps the configuration of an environment with the default settings.
    pub fn new(env_config: C) -> Self {
        Self {
            env_config,
            failure_reward: -1.0,
            window: 100,
        }
    }

    /// Sets the failure reward.
    pub fn failure_reward(mut self, v: f32) -> Self {
        self.failure_reward = v;
        self
    }
}

/// Wraps an environment, penalizing failures and logging episode returns.
///
/// When an episode ends before the wrapped environment's step limit, the reward of its
/// last step is replaced with `failure_reward`. Episodes cut by the step limit keep their
/// reward. Returns are accumulated from the unmodified rewards, and at the end of each
/// episode `[Episode n] Reward: r  Recent Reward: m` is logged, `m` being the mean return
/// over the last `window` episodes.
pub struct EpisodeMonitor<E: Env> {
    env: E,
    failure_reward: f32,
    window: usize,
    steps: usize,
    episode_return: f32,
    n_episodes: usize,
    recent_returns: VecDeque<f32>,
}

impl<E: Env> EpisodeMonitor<E> {
    /// Number of finished episodes.
    pub fn n_episodes(&self) -> usize {
        self.n_episodes
    }

    /// Mean return over the recent episodes, `0.0` before the first episode ends.
    pub fn recent_mean(&self) -> f32 {
        match self.recent_returns.len() {
            0 => 0.0,
            n => self.recent_returns.iter().sum::<f32>() / n as f32,
        }
    }
}

impl<E: Env> Env for EpisodeMonitor<E> {
    type Config = EpisodeMonitorConfig<E::Config>;
    type Info = E::Info;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        Ok(Self {
            env: E::build(&config.env_config, seed)?,
            failure_reward: config.failure_reward,
            window: config.window.max(1),
            steps: 0,
            episode_return: 0.0,
            n_episodes: 0,
            recent_returns: VecDeque::new(),
        })
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.steps = 0;
        self.episode_return = 0.0;
        self.env.reset()
    }

    fn step(&mut self, act: usize) -> Result<Step<Self>> {
        let step = self.env.step(act)?;
        self.steps += 1;
        self.episode_return += step.reward;

        let mut reward = step.reward;
        if step.is_done() {
            let limit = self.env.max_episode_steps().unwrap_or(usize::MAX);
            if self.steps < limit {
                reward = self.failure_reward;
            }

            self.n_episodes += 1;
            if self.recent_returns.len() == self.window {
                self.recent_returns.pop_front();
            }
            self.recent_returns.push_back(self.episode_return);
            info!(
                "[Episode {}] Reward: {}  Recent Reward: {}",
                self.n_episodes,
                self.episode_return,
                self.recent_mean()
            );
        }

        Ok(Step::new(
            step.obs,
            act,
            reward,
            step.is_terminated,
            step.is_truncated,
            step.info,
        ))
    }

    fn max_episode_steps(&self) -> Option<usize> {
        self.env.max_episode_steps()
    }
}
