//! Experience sampling.
use crate::{
    record::{Record, RecordValue},
    Env, ExperienceBufferBase, Policy, Transition,
};
use anyhow::Result;
use log::debug;

/// Runs the policy on the environment and pushes the resulting transitions into a buffer.
///
/// The environment is reset lazily: on the first call, after an episode ends, and after
/// [`Sampler::reset`] was called because the environment failed.
pub struct Sampler<E: Env> {
    env: E,

    /// Observation the next action is chosen from.
    prev_obs: Option<Vec<f32>>,

    episode_return: f32,
    episode_length: usize,
    n_episodes: usize,
}

impl<E: Env> Sampler<E> {
    /// Creates a new sampler with the given environment.
    pub fn new(env: E) -> Self {
        Self {
            env,
            prev_obs: None,
            episode_return: 0.0,
            episode_length: 0,
            n_episodes: 0,
        }
    }

    /// Discards the current episode; the next call of
    /// [`sample_and_push`](Sampler::sample_and_push) resets the environment.
    pub fn reset(&mut self) {
        self.prev_obs = None;
        self.episode_return = 0.0;
        self.episode_length = 0;
    }

    /// The number of finished episodes.
    pub fn n_episodes(&self) -> usize {
        self.n_episodes
    }

    /// Samples a transition and pushes it to the buffer.
    ///
    /// Returns a record, non-empty at the end of an episode, and whether the episode ended.
    pub fn sample_and_push<P, B>(&mut self, policy: &mut P, buffer: &mut B) -> Result<(Record, bool)>
    where
        P: Policy + ?Sized,
        B: ExperienceBufferBase<Item = Transition>,
    {
        let state = match self.prev_obs.take() {
            Some(obs) => obs,
            None => self.env.reset()?,
        };

        let act = policy.sample(&state)?;
        let step = match self.env.step_with_reset(act) {
            Ok(step) => step,
            Err(e) => {
                // Keep the observation so that a caller may retry
                self.prev_obs = Some(state);
                return Err(e);
            }
        };
        let is_done = step.is_done();

        self.episode_return += step.reward;
        self.episode_length += 1;

        self.prev_obs = match is_done {
            true => step.init_obs.clone(),
            false => Some(step.obs.clone()),
        };
        buffer.push(Transition::new(state, act, step.reward, step.obs, is_done))?;

        let mut record = Record::empty();
        if is_done {
            self.n_episodes += 1;
            debug!(
                "Episode {} finished after {} steps, return {}",
                self.n_episodes, self.episode_length, self.episode_return
            );
            record.insert("episode", RecordValue::Scalar(self.n_episodes as f32));
            record.insert("episode_return", RecordValue::Scalar(self.episode_return));
            record.insert(
                "episode_length",
                RecordValue::Scalar(self.episode_length as f32),
            );
            self.episode_return = 0.0;
            self.episode_length = 0;
        }

        Ok((record, is_done))
    }
}
