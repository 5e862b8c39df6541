//! Buffer interfaces.
//!
//! Writing to a buffer and reading batches from it are separate traits, so that the
//! collection loop only needs [`ExperienceBufferBase`] and the agent only needs
//! [`ReplayBufferBase`].
use anyhow::Result;

/// Interface for buffers that store experiences from environments.
pub trait ExperienceBufferBase {
    /// The type of items stored in the buffer.
    type Item;

    /// Pushes a new experience into the buffer.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// Returns the current number of experiences in the buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer holds no experience.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface for buffers that generate batches for training.
pub trait ReplayBufferBase {
    /// Configuration parameters for the buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch;

    /// Builds a new buffer from the given configuration.
    fn build(config: &Self::Config) -> Self;

    /// Samples `size` experiences without replacement.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;

    /// Returns all stored experiences in insertion order, without mutating the buffer.
    fn snapshot(&self) -> Self::Batch;
}
