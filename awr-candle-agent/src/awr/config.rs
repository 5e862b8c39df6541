//! Configuration of AWR agent.
use crate::{mlp::MlpConfig, opt::OptimizerConfig, util::CriticLoss, Device};
use anyhow::Result;
use awr_core::{error::AwrError, TrainerConfig, TransitionBufferConfig};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Awr`](super::Awr).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct AwrConfig {
    /// Dimension of the state vector.
    pub input_size: usize,

    /// Number of discrete actions.
    pub output_size: usize,

    /// Discount factor.
    pub gamma: f64,

    /// GAE smoothing factor.
    pub lambda: f64,

    /// Temperature of the exponential advantage weights.
    pub beta: f64,

    /// Upper bound of the advantage weights.
    pub max_weight: f64,

    /// Minibatch size of both the critic and the actor updates.
    pub batch_size: usize,

    /// Number of critic gradient steps per training pass.
    pub critic_update_iter: usize,

    /// Number of actor gradient steps per training pass.
    pub actor_update_iter: usize,

    /// Capacity of the transition buffer.
    pub max_replay: usize,

    /// Minimum number of new transitions between two training passes.
    pub num_sample: usize,

    /// Hidden units of both the actor and the critic networks.
    pub units: Vec<usize>,

    /// Optimizer of the policy network.
    pub actor_opt_config: OptimizerConfig,

    /// Optimizer of the value network.
    pub critic_opt_config: OptimizerConfig,

    /// Type of critic loss function.
    pub critic_loss: CriticLoss,

    /// If `true`, the policy network is built from noisy linear layers.
    pub use_noisy_net: bool,

    /// Device used for the actor and critic models.
    pub device: Device,

    /// Random seed for action sampling and minibatch sampling.
    pub seed: u64,
}

impl Default for AwrConfig {
    fn default() -> Self {
        Self {
            input_size: 0,
            output_size: 0,
            gamma: 0.99,
            lambda: 0.95,
            beta: 1.0,
            max_weight: 20.0,
            batch_size: 256,
            critic_update_iter: 500,
            actor_update_iter: 1000,
            max_replay: 50000,
            num_sample: 2048,
            units: vec![64, 64],
            actor_opt_config: OptimizerConfig::Sgd {
                lr: 5e-5,
                momentum: 0.9,
            },
            critic_opt_config: OptimizerConfig::Sgd {
                lr: 1e-3,
                momentum: 0.9,
            },
            critic_loss: CriticLoss::Mse,
            use_noisy_net: false,
            device: Device::Cpu,
            seed: 42,
        }
    }
}

impl AwrConfig {
    /// Sets the dimensions of the state vector and the action set.
    pub fn dims(mut self, input_size: usize, output_size: usize) -> Self {
        self.input_size = input_size;
        self.output_size = output_size;
        self
    }

    /// Discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// GAE smoothing factor.
    pub fn lambda(mut self, v: f64) -> Self {
        self.lambda = v;
        self
    }

    /// Temperature of the advantage weights.
    pub fn beta(mut self, v: f64) -> Self {
        self.beta = v;
        self
    }

    /// Upper bound of the advantage weights.
    pub fn max_weight(mut self, v: f64) -> Self {
        self.max_weight = v;
        self
    }

    /// Batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Number of critic and actor gradient steps per training pass.
    pub fn update_iters(mut self, critic_update_iter: usize, actor_update_iter: usize) -> Self {
        self.critic_update_iter = critic_update_iter;
        self.actor_update_iter = actor_update_iter;
        self
    }

    /// Capacity of the transition buffer.
    pub fn max_replay(mut self, v: usize) -> Self {
        self.max_replay = v;
        self
    }

    /// Number of new transitions between training passes.
    pub fn num_sample(mut self, v: usize) -> Self {
        self.num_sample = v;
        self
    }

    /// Hidden units.
    pub fn units(mut self, v: Vec<usize>) -> Self {
        self.units = v;
        self
    }

    /// Optimizer of the policy network.
    pub fn actor_opt_config(mut self, v: OptimizerConfig) -> Self {
        self.actor_opt_config = v;
        self
    }

    /// Optimizer of the value network.
    pub fn critic_opt_config(mut self, v: OptimizerConfig) -> Self {
        self.critic_opt_config = v;
        self
    }

    /// Critic loss.
    pub fn critic_loss(mut self, v: CriticLoss) -> Self {
        self.critic_loss = v;
        self
    }

    /// Noisy policy network.
    pub fn use_noisy_net(mut self, v: bool) -> Self {
        self.use_noisy_net = v;
        self
    }

    /// Device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Configuration of the policy network.
    pub fn actor_mlp_config(&self) -> MlpConfig {
        MlpConfig::new(self.input_size, self.units.clone(), self.output_size, false)
            .noisy(self.use_noisy_net)
    }

    /// Configuration of the value network.
    pub fn critic_mlp_config(&self) -> MlpConfig {
        MlpConfig::new(self.input_size, self.units.clone(), 1, false)
    }

    /// Configuration of the transition buffer the agent is trained from.
    pub fn buffer_config(&self) -> TransitionBufferConfig {
        TransitionBufferConfig::default()
            .capacity(self.max_replay)
            .seed(self.seed)
    }

    /// Trainer configuration with the agent's `num_sample`.
    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig::default().num_sample(self.num_sample)
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(AwrError::Config(msg).into()) };

        if self.input_size == 0 || self.output_size == 0 {
            return fail(format!(
                "input_size and output_size must be positive, got {} and {}",
                self.input_size, self.output_size
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return fail(format!("gamma must be in [0, 1], got {}", self.gamma));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return fail(format!("lambda must be in [0, 1], got {}", self.lambda));
        }
        if !(self.beta > 0.0 && self.beta.is_finite()) {
            return fail(format!("beta must be positive, got {}", self.beta));
        }
        if !(self.max_weight > 0.0 && self.max_weight.is_finite()) {
            return fail(format!("max_weight must be positive, got {}", self.max_weight));
        }
        if self.batch_size == 0 {
            return fail("batch_size must be positive".to_string());
        }
        if self.batch_size > self.num_sample || self.num_sample > self.max_replay {
            return fail(format!(
                "batch_size <= num_sample <= max_replay is required, got {}, {} and {}",
                self.batch_size, self.num_sample, self.max_replay
            ));
        }
        if self.units.iter().any(|&u| u == 0) {
            return fail(format!("units must be positive, got {:?}", self.units));
        }
        for (name, opt) in [
            ("actor", &self.actor_opt_config),
            ("critic", &self.critic_opt_config),
        ] {
            if !(opt.lr() > 0.0 && opt.lr().is_finite()) {
                return fail(format!("{} learning rate must be positive", name));
            }
        }

        Ok(())
    }

    /// Constructs [`AwrConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of AWR agent from {:?}", path_);
        Ok(b)
    }

    /// Saves [`AwrConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of AWR agent into {:?}", path_);
        Ok(())
    }
}
