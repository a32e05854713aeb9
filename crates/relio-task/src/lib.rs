//! Task descriptor data model, fluent builder, and serialization.
//!
//! This crate holds the part of the design that is a contract between
//! worker binaries: the [`Descriptor`] shape, its wire [`codec::Codec`],
//! and the handler-facing error/failure types. It depends on
//! [`relio_retry`] for the `RetryPolicy` embedded in every descriptor, but
//! knows nothing about transports or the worker engine.

mod codec;
mod descriptor;
mod error;
mod failure;
mod id;

pub use codec::{Codec, CodecError, JsonCodec};
pub use descriptor::{create_descriptor, create_descriptor_with, Descriptor};
pub use error::TaskError;
pub use failure::{is_retry_requested, HandlerError, RetryRequested, TaskFailure};
pub use id::{IdGenerator, RandomIdGenerator};

pub use relio_retry::{Definition as RetryPolicyDefinition, RetryPolicy, RetryPolicyError};
