//! Lifecycle observers and the access gate.
//!
//! Observers are advisory: they receive notifications at fixed points of the
//! pipeline and cannot influence processing. The access gate is the one hook
//! that can stop a request, and it does so with a caller-chosen HTTP status.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::IiifError;
use crate::iiif::ImageRequest;

/// Point in the pipeline at which observers are notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The request was received; nothing has been validated yet
    BeforeProcess,
    /// All five parameters validated
    AfterValidation,
    /// A derivative was produced or served from cache
    AfterProcess,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleEvent::BeforeProcess => "before_process",
            LifecycleEvent::AfterValidation => "after_validation",
            LifecycleEvent::AfterProcess => "after_process",
        })
    }
}

/// Receives lifecycle notifications.
///
/// Called synchronously on the request task; implementations should return
/// quickly.
pub trait LifecycleObserver: Send + Sync {
    fn notify(&self, event: LifecycleEvent, identifier: &str);
}

impl<F> LifecycleObserver for F
where
    F: Fn(LifecycleEvent, &str) + Send + Sync,
{
    fn notify(&self, event: LifecycleEvent, identifier: &str) {
        self(event, identifier)
    }
}

/// Observer that writes every event to the `debug` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn notify(&self, event: LifecycleEvent, identifier: &str) {
        debug!(event = %event, identifier = %identifier, "Lifecycle event");
    }
}

/// Rejection from an [`AccessGate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub status: u16,
    pub message: String,
}

impl AccessDenied {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, message)
    }
}

impl From<AccessDenied> for IiifError {
    fn from(denied: AccessDenied) -> Self {
        IiifError::AccessDenied {
            status: denied.status,
            message: denied.message,
        }
    }
}

/// Decides whether a request may proceed, before any processing.
pub trait AccessGate: Send + Sync {
    fn check(&self, request: &ImageRequest) -> Result<(), AccessDenied>;
}

impl<F> AccessGate for F
where
    F: Fn(&ImageRequest) -> Result<(), AccessDenied> + Send + Sync,
{
    fn check(&self, request: &ImageRequest) -> Result<(), AccessDenied> {
        self(request)
    }
}

/// Registered observers plus the optional gate.
#[derive(Clone, Default)]
pub struct Hooks {
    observers: Vec<Arc<dyn LifecycleObserver>>,
    gate: Option<Arc<dyn AccessGate>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Observers run in registration order.
    pub fn with_observer(mut self, observer: impl LifecycleObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Install the access gate, replacing any previous one.
    pub fn with_gate(mut self, gate: impl AccessGate + 'static) -> Self {
        self.gate = Some(Arc::new(gate));
        self
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn has_gate(&self) -> bool {
        self.gate.is_some()
    }

    /// Notify every observer.
    pub fn emit(&self, event: LifecycleEvent, identifier: &str) {
        for observer in &self.observers {
            observer.notify(event, identifier);
        }
    }

    /// Run the gate, if any.
    pub fn authorize(&self, request: &ImageRequest) -> Result<(), IiifError> {
        match &self.gate {
            Some(gate) => gate.check(request).map_err(IiifError::from),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("observers", &self.observers.len())
            .field("gate", &self.gate.is_some())
            .finish()
    }
}
