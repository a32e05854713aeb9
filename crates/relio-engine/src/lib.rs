//! The worker engine: a handler registry plus the bounded-concurrency,
//! five-stage pipeline (Provider, Scheduler, Executor, Sender, Acker)
//! that drains a [`relio_transport::Transport`] and runs registered
//! [`Handler`]s against what it delivers.
//!
//! This crate owns no persistent state of its own; durability is the
//! transport's job.

mod error;
mod handler;
mod manager;
mod metrics;
mod stages;

pub use error::ManagerError;
pub use handler::{Handler, HandlerRegistry};
pub use manager::{Manager, ManagerConfig};
pub use metrics::MetricsSnapshot;
