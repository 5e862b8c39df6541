//! Multilayer perceptron.
mod base;
mod config;
mod noisy;
pub use base::Mlp;
pub use config::MlpConfig;
pub use noisy::NoisyLinear;
