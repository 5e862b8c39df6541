//! Agent.
use super::{Policy, ReplayBufferBase};
use crate::record::Record;
use anyhow::Result;

/// Represents a trainable policy.
pub trait Agent<R: ReplayBufferBase>: Policy {
    /// Set the policy to training mode.
    fn train(&mut self);

    /// Set the policy to evaluation mode.
    fn eval(&mut self);

    /// Return if it is in training mode.
    fn is_train(&self) -> bool;

    /// Performs a training pass.
    ///
    /// `buffer` is the buffer from which transitions will be taken
    /// for updating model parameters.
    fn opt(&mut self, buffer: &mut R) -> Result<()> {
        self.opt_with_record(buffer).map(|_| ())
    }

    /// Performs a training pass and returns some information.
    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record>;
}
