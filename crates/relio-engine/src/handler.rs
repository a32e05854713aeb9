use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use relio_task::{Descriptor, HandlerError, TaskError};

/// Application code that knows how to execute one named kind of task.
///
/// Handlers are ordinary, possibly-panicking application code; the engine
/// catches a panic and runs it through the same retry/link-error decision
/// as a returned error, so a handler never needs to guard against its own
/// panics.
///
/// # Object safety
///
/// Object-safe, so the registry stores `Arc<dyn Handler>`.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, descriptor: &Descriptor) -> Result<(), HandlerError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Handler) {}
};

/// A named collection of [`Handler`] implementations.
///
/// Registration is rejected once the registry has been frozen by
/// [`crate::Manager::run_worker`], so a handler can never be added after
/// the worker has started reading it.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Result<(), TaskError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(TaskError::DuplicateHandler(name));
        }
        self.handlers.insert(name, Arc::new(handler));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relio_task::create_descriptor;

    struct Noop;

    #[async_trait]
    impl Handler for Noop {
        async fn handle(&self, _descriptor: &Descriptor) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn handler_is_object_safe() {
        let handler: Arc<dyn Handler> = Arc::new(Noop);
        let _ = handler;
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = HandlerRegistry::new();
        registry.register("send_email", Noop).unwrap();
        let err = registry.register("send_email", Noop).unwrap_err();
        assert_eq!(err, TaskError::DuplicateHandler("send_email".to_string()));
    }

    #[tokio::test]
    async fn registered_handler_runs() {
        let mut registry = HandlerRegistry::new();
        registry.register("noop", Noop).unwrap();
        let handler = registry.get("noop").unwrap();
        let descriptor = create_descriptor("noop", Vec::new());
        assert!(handler.handle(&descriptor).await.is_ok());
    }

    #[test]
    fn unknown_name_is_absent() {
        let registry = HandlerRegistry::new();
        assert!(registry.get("missing").is_none());
        assert!(registry.is_empty());
    }
}
