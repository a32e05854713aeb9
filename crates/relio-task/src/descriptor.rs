use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relio_retry::RetryPolicy;

use crate::failure::TaskFailure;
use crate::id::{IdGenerator, RandomIdGenerator};

mod payload_b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// The unit of work sent across a [`relio_transport::Transport`] and
/// processed by the worker engine.
///
/// `id` is stable across retries; `running_id` is re-minted for every
/// transport enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub id: String,
    #[serde(default)]
    pub running_id: String,
    pub name: String,
    #[serde(with = "payload_b64")]
    pub payload: Vec<u8>,
    pub serializer_tag: String,
    pub queued_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub done_at: Option<DateTime<Utc>>,
    pub eta: DateTime<Utc>,
    /// Non-negative retry limit, or -1 for unlimited.
    pub max_retry: i64,
    pub current_try: u32,
    pub retry_on_any_error: bool,
    pub retry_policy: RetryPolicy,
    pub last_error: Option<TaskFailure>,
    pub link_error: Option<Box<Descriptor>>,
    pub children: Vec<Descriptor>,
    pub parent: Option<Box<Descriptor>>,
}

/// Create a new descriptor, generating its `id` with the default
/// [`RandomIdGenerator`]. `running_id` is left empty until submission.
pub fn create_descriptor(name: impl Into<String>, payload: Vec<u8>) -> Descriptor {
    create_descriptor_with(&RandomIdGenerator, name, payload)
}

/// Create a new descriptor using a caller-supplied [`IdGenerator`].
pub fn create_descriptor_with(
    id_gen: &dyn IdGenerator,
    name: impl Into<String>,
    payload: Vec<u8>,
) -> Descriptor {
    Descriptor {
        id: id_gen.generate(),
        running_id: String::new(),
        name: name.into(),
        payload,
        serializer_tag: "json".to_string(),
        queued_at: None,
        executed_at: None,
        done_at: None,
        eta: Utc::now(),
        max_retry: 0,
        current_try: 0,
        retry_on_any_error: false,
        retry_policy: RetryPolicy::default(),
        last_error: None,
        link_error: None,
        children: Vec::new(),
        parent: None,
    }
}

impl Descriptor {
    pub fn set_max_retry(mut self, max_retry: i64) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn set_current_try(mut self, current_try: u32) -> Self {
        self.current_try = current_try;
        self
    }

    pub fn set_retry_on_any_error(mut self, retry_on_any_error: bool) -> Self {
        self.retry_on_any_error = retry_on_any_error;
        self
    }

    pub fn set_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn set_eta(mut self, eta: DateTime<Utc>) -> Self {
        self.eta = eta;
        self
    }

    pub fn set_link_error(mut self, link_error: Descriptor) -> Self {
        self.link_error = Some(Box::new(link_error));
        self
    }

    pub fn add_child(mut self, child: Descriptor) -> Self {
        self.children.push(child);
        self
    }

    /// Whether this descriptor is eligible to run now (I3: `now >= eta`).
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        now >= self.eta
    }

    /// Whether `max_retry` allows another attempt after the current one.
    /// `max_retry < 0` means unlimited.
    pub fn retries_remaining(&self) -> bool {
        self.max_retry < 0 || (self.current_try as i64) <= self.max_retry
    }

    /// A shallow, single-hop snapshot of this descriptor suitable for the
    /// `parent` field of a dispatched child or link-error task.
    ///
    /// Clears `parent`, `children`, and `link_error` on the snapshot so
    /// fan-out never recurses past one hop and a parent/child/link-error
    /// graph can never be serialized unboundedly.
    pub fn snapshot(&self) -> Descriptor {
        let mut snap = self.clone();
        snap.parent = None;
        snap.children = Vec::new();
        snap.link_error = None;
        snap
    }
}
