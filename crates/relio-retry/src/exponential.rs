use std::collections::BTreeMap;
use std::time::Duration;

use crate::{
    jitter_factor, parse_bool_param, parse_duration_param, parse_f64_param, Definition,
    RetryPolicyError, EXPONENTIAL_BACKOFF_TAG,
};

/// Exponential backoff with optional jitter, clamped to `[min, max]`.
///
/// For attempt `k >= 1`: `delay = clamp(min * factor^(k-1), min, max)`,
/// multiplied by a uniform `[0.5, 1.5)` factor first when `jitter` is set.
/// Attempts 0 and 1 both return `min`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    pub factor: f64,
    pub jitter: bool,
    pub min: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(factor: f64, jitter: bool, min: Duration, max: Duration) -> Self {
        Self {
            factor,
            jitter,
            min,
            max,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let k = attempt.max(1);
        let exponent = (k - 1) as i32;
        let base = self.min.as_secs_f64() * self.factor.powi(exponent);
        let jittered = if self.jitter {
            base * jitter_factor()
        } else {
            base
        };
        let clamped = jittered.clamp(self.min.as_secs_f64(), self.max.as_secs_f64());
        Duration::from_secs_f64(clamped)
    }

    pub fn encode(&self) -> Definition {
        let mut params = BTreeMap::new();
        params.insert("factor".to_string(), self.factor.to_string());
        params.insert("jitter".to_string(), self.jitter.to_string());
        params.insert(
            "min".to_string(),
            humantime::format_duration(self.min).to_string(),
        );
        params.insert(
            "max".to_string(),
            humantime::format_duration(self.max).to_string(),
        );
        Definition {
            tag: EXPONENTIAL_BACKOFF_TAG.to_string(),
            params,
        }
    }

    pub fn decode(def: &Definition) -> Result<Self, RetryPolicyError> {
        Ok(Self::new(
            parse_f64_param(&def.params, "factor")?,
            parse_bool_param(&def.params, "jitter")?,
            parse_duration_param(&def.params, "min")?,
            parse_duration_param(&def.params, "max")?,
        ))
    }
}
