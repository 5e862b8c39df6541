//! Types and traits for recording values during training.
//!
//! A [`Record`] is a set of named values. The agent returns one from every training pass
//! and the [`Sampler`](crate::Sampler) returns one at the end of every episode.
//! [`Recorder`]s decide where records go.
//!
//! ```rust
//! use awr_core::record::{Record, RecordValue};
//!
//! let mut record = Record::empty();
//! record.insert("loss_critic", RecordValue::Scalar(0.5));
//! record.insert("episode_length", RecordValue::Scalar(21.0));
//! assert_eq!(record.get_scalar("loss_critic").unwrap(), 0.5);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
