//! Advantage-weighted regression (AWR) agent.
//!
//! A training pass on a batch of transitions
//!
//! 1. estimates discounted returns with GAE using the current critic,
//! 2. regresses the critic toward those returns ([`Awr::update_critic`]),
//! 3. re-estimates the advantages with the updated critic, and
//! 4. fits the policy by maximizing the log-likelihood of the taken actions weighted by
//!    `min(exp(advantage / beta), max_weight)`.
mod actor;
mod advantage;
mod base;
mod config;
mod critic;
pub use actor::Actor;
pub use advantage::{discount_return, exp_advantage_weight, sample_categorical};
pub use base::Awr;
pub use config::AwrConfig;
pub use critic::Critic;
