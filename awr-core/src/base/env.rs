//! Environment.
use super::{Info, Step};
use anyhow::Result;

/// Represents an environment with a real-valued observation vector and a discrete action set.
///
/// An implementation is an external collaborator of the training core: it is only reached
/// through [`Env::reset`] and [`Env::step`], which block until the next observation is
/// available.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Information in the [`Step`] object.
    type Info: Info;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Resets the environment and returns the initial observation.
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Performes an environment step.
    fn step(&mut self, act: usize) -> Result<Step<Self>>
    where
        Self: Sized;

    /// The number of steps after which an episode is cut off, if any.
    ///
    /// This is used to tell an episode that ended by failure from one that reached
    /// the step limit.
    fn max_episode_steps(&self) -> Option<usize>;

    /// Performes an environment step and resets the environment if the episode ends.
    ///
    /// The initial observation of the next episode is stored in [`Step::init_obs`].
    fn step_with_reset(&mut self, act: usize) -> Result<Step<Self>>
    where
        Self: Sized,
    {
        let mut step = self.step(act)?;
        if step.is_done() {
            step.init_obs = Some(self.reset()?);
        }
        Ok(step)
    }
}
