//! Environments for the AWR agent.
//!
//! * [`CartPole`]: the classic cart-pole balancing task, in pure Rust.
//! * [`EpisodeMonitor`]: replaces the reward of a failed episode's last step and logs
//!   episode returns.
//! * [`ThreadedEnv`]: runs any [`Env`](awr_core::Env) in its own thread behind a blocking
//!   request/response channel with a timeout.
mod cartpole;
mod monitor;
mod threaded;
pub use cartpole::{CartPole, CartPoleConfig};
pub use monitor::{EpisodeMonitor, EpisodeMonitorConfig};
pub use threaded::{ThreadedEnv, ThreadedEnvConfig};
