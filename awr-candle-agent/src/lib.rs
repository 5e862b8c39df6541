//! Advantage-weighted regression (AWR) agent implemented with
//! [candle](https://crates.io/crates/candle-core).
//!
//! The agent owns a state-value network (critic) and a categorical policy network (actor),
//! both [`Mlp`](mlp::Mlp)s, and trains them on whole batches taken from an
//! [`awr_core::TransitionBuffer`].
pub mod awr;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod util;
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The GPU device with the given ordinal.
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl Device {
    /// Opens the device.
    ///
    /// Fails when candle was built without CUDA support or the ordinal does not exist.
    pub fn open(&self) -> Result<candle_core::Device> {
        match self {
            Self::Cpu => Ok(candle_core::Device::Cpu),
            Self::Cuda(n) => Ok(candle_core::Device::new_cuda(*n)?),
        }
    }
}
