//! Synchronous publish/subscribe channel between the engine and its consumers.
//!
//! One `EventBus` is created when the process starts, wrapped in an `Arc`
//! and handed to every component that publishes or listens; there is no
//! global instance. It lives until the last `Arc` is dropped at shutdown.
//!
//! Publication is synchronous: `publish` calls every matching subscriber on
//! the publishing thread, in subscription order. Each subscriber runs under
//! `catch_unwind`, so a panicking subscriber is logged and skipped and the
//! remaining subscribers still receive the event. The subscriber list is
//! snapshotted before dispatch, which lets handlers publish or subscribe
//! re-entrantly.

use crate::error::FileErrorKind;
use crate::unorganize::{OperationSelector, UnorganizeMode};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Everything that travels over the bus.
///
/// Progress and error events carry file names only, never full paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    OrganizationStarted {
        operation_id: String,
        source_dir: PathBuf,
        destination_dir: PathBuf,
        strategy: String,
    },
    OrganizationProgress {
        operation_id: String,
        processed: usize,
        total: usize,
        file_name: String,
    },
    OrganizationFileError {
        operation_id: String,
        file_name: String,
        error_kind: FileErrorKind,
    },
    OrganizationCompleted {
        operation_id: String,
        succeeded: usize,
        failed: usize,
    },
    UnorganizeStarted {
        operation_id: String,
        source_operation_id: String,
        target_dir: PathBuf,
        mode: String,
    },
    UnorganizeProgress {
        operation_id: String,
        processed: usize,
        total: usize,
        file_name: String,
    },
    UnorganizeFileError {
        operation_id: String,
        file_name: String,
        error_kind: FileErrorKind,
    },
    UnorganizeCompleted {
        operation_id: String,
        reversed: usize,
        skipped: usize,
        failed: usize,
    },
    HistoryUpdated {
        operation_id: String,
    },
    /// Request consumed by the background worker.
    OrganizeRequested {
        source_dir: PathBuf,
        destination_dir: PathBuf,
        strategy: Option<String>,
    },
    /// Request consumed by the background worker.
    UnorganizeRequested {
        operation: OperationSelector,
        target_dir: PathBuf,
        mode: UnorganizeMode,
    },
    /// A requested run failed before producing a result.
    RequestFailed {
        request: String,
        error: String,
    },
}

impl Event {
    /// Wire name of the event, e.g. `organization_progress`.
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrganizationStarted { .. } => "organization_started",
            Event::OrganizationProgress { .. } => "organization_progress",
            Event::OrganizationFileError { .. } => "organization_file_error",
            Event::OrganizationCompleted { .. } => "organization_completed",
            Event::UnorganizeStarted { .. } => "unorganize_started",
            Event::UnorganizeProgress { .. } => "unorganize_progress",
            Event::UnorganizeFileError { .. } => "unorganize_file_error",
            Event::UnorganizeCompleted { .. } => "unorganize_completed",
            Event::HistoryUpdated { .. } => "history_updated",
            Event::OrganizeRequested { .. } => "organize_requested",
            Event::UnorganizeRequested { .. } => "unorganize_requested",
            Event::RequestFailed { .. } => "request_failed",
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    filter: Option<&'static str>,
    handler: Handler,
}

pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribes to every event.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(handler))
    }

    /// Subscribes to events whose [`Event::name`] equals `name`.
    pub fn subscribe_to<F>(&self, name: &'static str, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(Some(name), Arc::new(handler))
    }

    fn add(&self, filter: Option<&'static str>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                filter,
                handler,
            });
        id
    }

    /// Removes a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `event` to every matching subscriber and returns how many
    /// handled it without panicking.
    pub fn publish(&self, event: Event) -> usize {
        let name = event.name();
        let handlers: Vec<Handler> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.filter.is_none_or(|f| f == name))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        let mut delivered = 0;
        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(event = name, "event subscriber panicked; skipping it"),
            }
        }
        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
