#![warn(missing_docs)]
//! Core of the advantage-weighted regression (AWR) training loop.
//!
//! This crate is independent of any neural-network backend. It provides
//!
//! * the interfaces exchanged between an agent and an environment
//!   ([`Env`], [`Step`], [`Policy`], [`Agent`]),
//! * the bounded FIFO [`TransitionBuffer`] the agent is trained from,
//! * [`Record`](record::Record)s returned from training passes, and
//! * the collection-then-train driver ([`Trainer`]).
pub mod error;
pub mod record;
pub mod transition_buffer;

mod base;
pub use base::{
    Agent, Configurable, Env, ExperienceBufferBase, Info, Policy, ReplayBufferBase, Step,
};
pub use transition_buffer::{Batch, Transition, TransitionBuffer, TransitionBufferConfig};

mod trainer;
pub use trainer::{Sampler, Trainer, TrainerConfig};
