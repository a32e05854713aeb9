use std::collections::BTreeMap;
use std::time::Duration;

use crate::{parse_duration_param, Definition, RetryPolicyError, FIXED_DELAY_TAG};

/// Always wait the same duration before retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay_for(&self, _attempt: u32) -> Duration {
        self.delay
    }

    pub fn encode(&self) -> Definition {
        let mut params = BTreeMap::new();
        params.insert(
            "delay".to_string(),
            humantime::format_duration(self.delay).to_string(),
        );
        Definition {
            tag: FIXED_DELAY_TAG.to_string(),
            params,
        }
    }

    pub fn decode(def: &Definition) -> Result<Self, RetryPolicyError> {
        Ok(Self::new(parse_duration_param(&def.params, "delay")?))
    }
}
