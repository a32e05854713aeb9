//! The five pipeline stages that make up a running worker: Provider,
//! Scheduler, Executor, Sender, and Acker. Each is a free function spawned
//! as its own task by [`crate::Manager::run_worker`]; none of them is
//! exposed outside this crate.

pub(crate) mod acker;
pub(crate) mod executor;
pub(crate) mod provider;
pub(crate) mod scheduler;
pub(crate) mod sender;
