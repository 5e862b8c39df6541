//! Configuration of [`TransitionBuffer`](super::TransitionBuffer).
use crate::error::AwrError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`TransitionBuffer`](super::TransitionBuffer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TransitionBufferConfig {
    /// Maximum number of transitions kept in the buffer (`max_replay`).
    pub capacity: usize,

    /// Seed of the random generator used in [`batch()`](crate::ReplayBufferBase::batch).
    pub seed: u64,
}

impl Default for TransitionBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 50000,
            seed: 42,
        }
    }
}

impl TransitionBufferConfig {
    /// Sets the capacity of the buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks the configuration.
    pub fn check(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(AwrError::Config(
                "capacity of the transition buffer must be positive".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Constructs [`TransitionBufferConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b: Self = serde_yaml::from_reader(rdr)?;
        b.check()?;
        Ok(b)
    }

    /// Saves [`TransitionBufferConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
