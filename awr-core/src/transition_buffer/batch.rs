//! Transitions and batches of them.
use crate::error::AwrError;
use anyhow::Result;

/// A transition `(o_t, a_t, r_t, o_t+1, done_t)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation before the action.
    pub state: Vec<f32>,

    /// Index of the action taken.
    pub action: usize,

    /// Reward.
    pub reward: f32,

    /// Observation after the action.
    pub next_state: Vec<f32>,

    /// `true` if the episode ended with this transition.
    pub done: bool,
}

impl Transition {
    /// Constructs a transition.
    pub fn new(
        state: Vec<f32>,
        action: usize,
        reward: f32,
        next_state: Vec<f32>,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}

/// An ordered set of transitions stored as parallel sequences.
///
/// All five sequences must have the same length, see [`Batch::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// `o_t`.
    pub states: Vec<Vec<f32>>,

    /// `a_t`.
    pub actions: Vec<usize>,

    /// `r_t`.
    pub rewards: Vec<f32>,

    /// `o_t+1`.
    pub next_states: Vec<Vec<f32>>,

    /// `done_t`.
    pub dones: Vec<bool>,
}

impl Batch {
    /// Creates an empty batch with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            states: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            next_states: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
        }
    }

    /// Appends a transition.
    pub fn push(&mut self, tr: Transition) {
        self.states.push(tr.state);
        self.actions.push(tr.action);
        self.rewards.push(tr.reward);
        self.next_states.push(tr.next_state);
        self.dones.push(tr.done);
    }

    /// Number of transitions, taken from the reward sequence.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Returns `true` if the batch has no transition.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks that the five sequences are aligned.
    pub fn validate(&self) -> Result<()> {
        let n = self.rewards.len();
        let lens = [
            ("states", self.states.len()),
            ("actions", self.actions.len()),
            ("next_states", self.next_states.len()),
            ("dones", self.dones.len()),
        ];
        for (name, len) in lens.iter() {
            if *len != n {
                return Err(AwrError::Config(format!(
                    "batch is not aligned: {} has {} elements, rewards has {}",
                    name, len, n
                ))
                .into());
            }
        }
        Ok(())
    }
}

impl FromIterator<Transition> for Batch {
    fn from_iter<T: IntoIterator<Item = Transition>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let mut batch = Batch::with_capacity(iter.size_hint().0);
        iter.for_each(|tr| batch.push(tr));
        batch
    }
}
