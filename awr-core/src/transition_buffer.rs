//! Bounded FIFO buffer of transitions.
mod base;
mod batch;
mod config;
pub use base::TransitionBuffer;
pub use batch::{Batch, Transition};
pub use config::TransitionBufferConfig;
