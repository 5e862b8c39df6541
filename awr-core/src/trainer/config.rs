//! Configuration of [`Trainer`](super::Trainer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`](super::Trainer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// Minimum number of new transitions collected before a training pass.
    ///
    /// A training pass starts at the first episode end after this many transitions.
    pub num_sample: usize,

    /// The number of training passes after which training stops.
    pub max_opts: usize,

    /// Optional limit on the number of environment steps.
    pub max_env_steps: Option<usize>,

    /// The number of consecutive environment failures tolerated before training aborts.
    pub max_env_failures: usize,

    /// Seed given to [`Env::build`](crate::Env::build).
    pub env_seed: i64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_sample: 2048,
            max_opts: 1000,
            max_env_steps: None,
            max_env_failures: 3,
            env_seed: 0,
        }
    }
}

impl TrainerConfig {
    /// Sets the minimum number of new transitions per training pass.
    pub fn num_sample(mut self, v: usize) -> Self {
        self.num_sample = v;
        self
    }

    /// Sets the number of training passes.
    pub fn max_opts(mut self, v: usize) -> Self {
        self.max_opts = v;
        self
    }

    /// Sets the limit on environment steps.
    pub fn max_env_steps(mut self, v: usize) -> Self {
        self.max_env_steps = Some(v);
        self
    }

    /// Sets the number of consecutive environment failures tolerated.
    pub fn max_env_failures(mut self, v: usize) -> Self {
        self.max_env_failures = v;
        self
    }

    /// Sets the seed of the environment.
    pub fn env_seed(mut self, v: i64) -> Self {
        self.env_seed = v;
        self
    }

    /// Constructs [`TrainerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
