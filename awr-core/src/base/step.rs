//! Environment step.
use super::Env;

/// Additional information to the observation and the reward.
pub trait Info {}

impl Info for () {}

/// Represents an action, observation and reward tuple `(a_t, o_t+1, r_t)`
/// with some additional information.
///
/// An environment emits [`Step`] object at every interaction steps.
/// The [`Sampler`](crate::Sampler) turns it into a [`Transition`](crate::Transition)
/// `(o_t, a_t, r_t, o_t+1, done_t)`.
pub struct Step<E: Env> {
    /// Action.
    pub act: usize,

    /// Observation.
    pub obs: Vec<f32>,

    /// Reward.
    pub reward: f32,

    /// Flag denoting if episode is terminated.
    pub is_terminated: bool,

    /// Flag denoting if episode is truncated by the step limit.
    pub is_truncated: bool,

    /// Information defined by user.
    pub info: E::Info,

    /// Initial observation of the next episode, set by [`Env::step_with_reset`].
    pub init_obs: Option<Vec<f32>>,
}

impl<E: Env> Step<E> {
    /// Constructs a [`Step`] object.
    pub fn new(
        obs: Vec<f32>,
        act: usize,
        reward: f32,
        is_terminated: bool,
        is_truncated: bool,
        info: E::Info,
    ) -> Self {
        Step {
            act,
            obs,
            reward,
            is_terminated,
            is_truncated,
            info,
            init_obs: None,
        }
    }

    #[inline]
    /// Terminated or truncated.
    pub fn is_done(&self) -> bool {
        self.is_terminated || self.is_truncated
    }
}
