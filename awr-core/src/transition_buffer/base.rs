//! FIFO transition buffer.
use super::{Batch, Transition, TransitionBufferConfig};
use crate::{error::AwrError, ExperienceBufferBase, ReplayBufferBase};
use anyhow::Result;
use rand::{rngs::StdRng, seq::index, SeedableRng};
use std::collections::VecDeque;

/// A bounded buffer of transitions with ring-buffer semantics.
///
/// Pushing into a full buffer evicts the oldest transition first, so `len()` never
/// exceeds the capacity. The buffer has a single writer (the collection loop) and
/// [`snapshot()`](ReplayBufferBase::snapshot) hands out an owned copy, so a batch in use
/// is never mutated by later pushes.
pub struct TransitionBuffer {
    capacity: usize,
    buf: VecDeque<Transition>,
    n_pushed: usize,
    rng: StdRng,
}

impl TransitionBuffer {
    /// The maximum number of transitions held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of transitions pushed since construction, including evicted ones.
    pub fn n_pushed(&self) -> usize {
        self.n_pushed
    }

    /// Iterates over the stored transitions from the oldest.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buf.iter()
    }
}

impl ExperienceBufferBase for TransitionBuffer {
    type Item = Transition;

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        if self.capacity == 0 {
            return Err(AwrError::Config(
                "cannot push into a transition buffer of capacity 0".to_string(),
            )
            .into());
        }
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(tr);
        self.n_pushed += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.buf.len()
    }
}

impl ReplayBufferBase for TransitionBuffer {
    type Config = TransitionBufferConfig;
    type Batch = Batch;

    fn build(config: &Self::Config) -> Self {
        Self {
            capacity: config.capacity,
            buf: VecDeque::with_capacity(config.capacity),
            n_pushed: 0,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        if size > self.buf.len() {
            return Err(AwrError::Config(format!(
                "batch size {} exceeds the number of stored transitions {}",
                size,
                self.buf.len()
            ))
            .into());
        }
        let ixs = index::sample(&mut self.rng, self.buf.len(), size);
        Ok(ixs.iter().map(|ix| self.buf[ix].clone()).collect())
    }

    fn snapshot(&self) -> Self::Batch {
        self.buf.iter().cloned().collect()
    }
}
