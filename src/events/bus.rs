//! In-process event bus.
//!
//! # Dispatch
//! ```text
//! emit(event)
//!     → snapshot handlers registered for event.event_type
//!     → claim and remove `once` handlers
//!     → async mode: one task per handler, joined; failures logged, isolated
//!     → sync mode: handlers awaited in registration order; first error returned
//! ```
//!
//! # Design Decisions
//! - Registry is a concurrent map; dispatch iterates a snapshot so handlers
//!   may subscribe or unsubscribe while an emit is in progress
//! - No lock is held while handlers run; concurrent emits never block each other
//! - One bus per composition root, shared by `Arc`; no global instance

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture};
use thiserror::Error;

use crate::config::EventBusConfig;
use crate::events::event::Event;
use crate::observability::metrics;

/// Error type handlers return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A subscriber failed while handling an event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("handler {subscription} for '{event_type}' failed: {message}")]
pub struct HandlerError {
    pub event_type: String,
    pub subscription: SubscriptionId,
    pub message: String,
}

type Handler<T> = Arc<dyn Fn(Arc<Event<T>>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

struct Registration<T> {
    id: SubscriptionId,
    handler: Handler<T>,
    once: bool,
    fired: AtomicBool,
}

impl<T> Registration<T> {
    /// False if this is a `once` handler that already fired.
    fn claim(&self) -> bool {
        !self.once || !self.fired.swap(true, Ordering::AcqRel)
    }
}

struct Registry<T> {
    handlers: DashMap<String, Vec<Arc<Registration<T>>>>,
}

impl<T> Registry<T> {
    fn snapshot(&self, event_type: &str) -> Vec<Arc<Registration<T>>> {
        self.handlers
            .get(event_type)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn remove(&self, event_type: &str, id: SubscriptionId) -> bool {
        let removed = match self.handlers.get_mut(event_type) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|r| r.id != id);
                entry.len() != before
            }
            None => false,
        };
        self.handlers.remove_if(event_type, |_, list| list.is_empty());
        removed
    }
}

trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool;
}

impl<T: 'static> Unsubscribe for Registry<T> {
    fn unsubscribe(&self, event_type: &str, id: SubscriptionId) -> bool {
        self.remove(event_type, id)
    }
}

/// Capability to remove exactly one handler.
///
/// Dropping it leaves the handler registered.
pub struct Subscription {
    id: SubscriptionId,
    event_type: String,
    registry: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Remove the handler. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.unsubscribe(&self.event_type, self.id))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .finish()
    }
}

/// Typed publish/subscribe registry.
pub struct EventBus<T> {
    registry: Arc<Registry<T>>,
    config: EventBusConfig,
}

impl<T> EventBus<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            registry: Arc::new(Registry {
                handlers: DashMap::new(),
            }),
            config,
        }
    }

    /// Register `handler` for `event_type`.
    pub fn on<F, Fut>(&self, event_type: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(Arc<Event<T>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.register(event_type.into(), handler, false)
    }

    /// Register `handler` for the next `event_type` emission only.
    ///
    /// The handler is removed before it runs, whatever its outcome.
    pub fn once<F, Fut>(&self, event_type: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(Arc<Event<T>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.register(event_type.into(), handler, true)
    }

    fn register<F, Fut>(&self, event_type: String, handler: F, once: bool) -> Subscription
    where
        F: Fn(Arc<Event<T>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let id = SubscriptionId::next();
        let handler: Handler<T> =
            Arc::new(move |event| -> BoxFuture<'static, Result<(), BoxError>> { Box::pin(handler(event)) });

        let count = {
            let mut entry = self.registry.handlers.entry(event_type.clone()).or_default();
            entry.push(Arc::new(Registration {
                id,
                handler,
                once,
                fired: AtomicBool::new(false),
            }));
            entry.len()
        };

        if count > self.config.max_listeners {
            tracing::warn!(
                event_type = %event_type,
                listeners = count,
                max_listeners = self.config.max_listeners,
                "Possible listener leak: listener count exceeds max_listeners"
            );
        }
        if self.config.enable_logging {
            tracing::debug!(event_type = %event_type, subscription = %id, once, "Subscription added");
        }

        let registry: Weak<dyn Unsubscribe> = Arc::downgrade(&self.registry) as Weak<dyn Unsubscribe>;
        Subscription {
            id,
            event_type,
            registry,
        }
    }

    /// Dispatch `event` to every handler registered for its type.
    ///
    /// In async mode this never fails; handler errors and panics are logged.
    /// In sync mode the first handler error stops dispatch and is returned.
    pub async fn emit(&self, event: Event<T>) -> Result<(), HandlerError> {
        let event = Arc::new(event);
        let event_type = event.event_type.as_str();

        let registrations: Vec<_> = self
            .registry
            .snapshot(event_type)
            .into_iter()
            .filter(|registration| {
                if !registration.claim() {
                    return false;
                }
                if registration.once {
                    self.registry.remove(event_type, registration.id);
                }
                true
            })
            .collect();

        if self.config.enable_logging {
            tracing::debug!(
                event_type = %event_type,
                event_id = %event.metadata.event_id,
                correlation_id = %event.metadata.correlation_id,
                listeners = registrations.len(),
                "Emitting event"
            );
        }

        if self.config.async_mode {
            let tasks: Vec<_> = registrations
                .iter()
                .map(|registration| {
                    let id = registration.id;
                    let task = tokio::spawn((registration.handler)(Arc::clone(&event)));
                    async move { (id, task.await) }
                })
                .collect();

            for (id, outcome) in join_all(tasks).await {
                let message = match outcome {
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) => e.to_string(),
                    Err(join_error) => format!("handler panicked: {join_error}"),
                };
                let err = HandlerError {
                    event_type: event_type.to_string(),
                    subscription: id,
                    message,
                };
                metrics::record_handler_error(event_type);
                tracing::warn!(
                    event_id = %event.metadata.event_id,
                    error = %err,
                    "Event handler failed; isolated from other handlers"
                );
            }
            Ok(())
        } else {
            for registration in registrations {
                if let Err(e) = (registration.handler)(Arc::clone(&event)).await {
                    metrics::record_handler_error(event_type);
                    return Err(HandlerError {
                        event_type: event_type.to_string(),
                        subscription: registration.id,
                        message: e.to_string(),
                    });
                }
            }
            Ok(())
        }
    }

    /// Build and emit an event in one step.
    pub async fn publish(&self, event_type: impl Into<String>, data: T) -> Result<(), HandlerError> {
        self.emit(Event::new(event_type, data)).await
    }

    /// Remove every handler for `event_type`, or for all types when `None`.
    pub fn remove_all_listeners(&self, event_type: Option<&str>) {
        match event_type {
            Some(event_type) => {
                self.registry.handlers.remove(event_type);
            }
            None => self.registry.handlers.clear(),
        }
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.registry
            .handlers
            .get(event_type)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Event types with at least one handler, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .registry
            .handlers
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        types.sort();
        types
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl<T> Default for EventBus<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl<T> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.registry.handlers.len())
            .field("config", &self.config)
            .finish()
    }
}
