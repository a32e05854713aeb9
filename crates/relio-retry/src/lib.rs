//! Polymorphic retry-delay policies.
//!
//! A [`RetryPolicy`] computes the delay before the next attempt of a task.
//! It round-trips through a [`Definition`], the on-wire shape
//! `{"type": tag, "params": {...}}`, so a worker process built from a
//! different binary can decode a policy chosen by another.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod exponential;
mod fixed;

pub use exponential::ExponentialBackoff;
pub use fixed::FixedDelay;

/// Wire tag for [`FixedDelay`].
pub const FIXED_DELAY_TAG: &str = "fixed_delay";
/// Wire tag for [`ExponentialBackoff`].
pub const EXPONENTIAL_BACKOFF_TAG: &str = "exponential_backoff";

/// On-wire encoding of a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    #[serde(rename = "type")]
    pub tag: String,
    pub params: BTreeMap<String, String>,
}

/// Errors that can occur when decoding a [`Definition`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryPolicyError {
    #[error("unknown retry policy type: {0:?}")]
    UnknownRetryPolicy(String),
    #[error("invalid retry policy params: {0}")]
    InvalidPolicyParams(String),
    #[error("invalid duration in retry policy params: {0}")]
    InvalidDuration(String),
}

/// A strategy for computing the delay before retrying a failed task.
///
/// `attempt` is the descriptor's `current_try` after the failed
/// invocation, so attempt 1 is the delay before the second run. Per the
/// contract, attempts 0 and 1 both return the policy's floor delay.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    FixedDelay(FixedDelay),
    ExponentialBackoff(ExponentialBackoff),
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self::FixedDelay(FixedDelay::new(delay))
    }

    pub fn exponential(factor: f64, jitter: bool, min: Duration, max: Duration) -> Self {
        Self::ExponentialBackoff(ExponentialBackoff::new(factor, jitter, min, max))
    }

    /// Compute the delay before attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::FixedDelay(p) => p.delay_for(attempt),
            Self::ExponentialBackoff(p) => p.delay_for(attempt),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::FixedDelay(_) => FIXED_DELAY_TAG,
            Self::ExponentialBackoff(_) => EXPONENTIAL_BACKOFF_TAG,
        }
    }

    pub fn encode(&self) -> Definition {
        match self {
            Self::FixedDelay(p) => p.encode(),
            Self::ExponentialBackoff(p) => p.encode(),
        }
    }

    pub fn decode(def: &Definition) -> Result<Self, RetryPolicyError> {
        match def.tag.as_str() {
            FIXED_DELAY_TAG => Ok(Self::FixedDelay(FixedDelay::decode(def)?)),
            EXPONENTIAL_BACKOFF_TAG => {
                Ok(Self::ExponentialBackoff(ExponentialBackoff::decode(def)?))
            }
            other => Err(RetryPolicyError::UnknownRetryPolicy(other.to_string())),
        }
    }
}

impl Default for RetryPolicy {
    /// Twenty-second fixed delay, matching the reference implementation's
    /// default retry countdown.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(20))
    }
}

impl Serialize for RetryPolicy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.encode().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RetryPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let def = Definition::deserialize(deserializer)?;
        Self::decode(&def).map_err(serde::de::Error::custom)
    }
}

pub(crate) fn parse_duration_param(
    params: &BTreeMap<String, String>,
    key: &str,
) -> Result<Duration, RetryPolicyError> {
    let raw = params
        .get(key)
        .ok_or_else(|| RetryPolicyError::InvalidPolicyParams(format!("missing {key:?}")))?;
    humantime::parse_duration(raw)
        .map_err(|e| RetryPolicyError::InvalidDuration(format!("{key}={raw:?}: {e}")))
}

pub(crate) fn parse_f64_param(
    params: &BTreeMap<String, String>,
    key: &str,
) -> Result<f64, RetryPolicyError> {
    let raw = params
        .get(key)
        .ok_or_else(|| RetryPolicyError::InvalidPolicyParams(format!("missing {key:?}")))?;
    raw.parse::<f64>().map_err(|_| {
        RetryPolicyError::InvalidPolicyParams(format!("{key}={raw:?} is not a number"))
    })
}

pub(crate) fn parse_bool_param(
    params: &BTreeMap<String, String>,
    key: &str,
) -> Result<bool, RetryPolicyError> {
    let raw = params
        .get(key)
        .ok_or_else(|| RetryPolicyError::InvalidPolicyParams(format!("missing {key:?}")))?;
    raw.parse::<bool>()
        .map_err(|_| RetryPolicyError::InvalidPolicyParams(format!("{key}={raw:?} is not a bool")))
}

/// Uniform random jitter in `[0.5, 1.5)`, factored out so tests can
/// exercise the deterministic (unjittered) path reliably.
pub(crate) fn jitter_factor() -> f64 {
    rand::rng().random_range(0.5..1.5)
}
