//! Request handling on top of the organizer and unorganize engine.
//!
//! [`Engine`] bundles both engines around one history store and one bus.
//! [`Worker`] runs an engine on a background thread and feeds it from
//! `organize_requested` / `unorganize_requested` events, one request at a
//! time in arrival order.

use crate::config::Config;
use crate::error::{RequestError, SetupError};
use crate::events::{Event, EventBus, SubscriptionId};
use crate::history::HistoryStore;
use crate::logging::sanitize_message;
use crate::organizer::{CancellationToken, OrganizationResult, Organizer};
use crate::unorganize::{OperationSelector, UnorganizeEngine, UnorganizeMode, UnorganizeResult};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Organize {
        source_dir: PathBuf,
        destination_dir: PathBuf,
        /// Falls back to the configured default strategy.
        strategy: Option<String>,
    },
    Unorganize {
        operation: OperationSelector,
        target_dir: PathBuf,
        mode: UnorganizeMode,
    },
}

impl Request {
    /// Extracts a request from a `*_requested` event.
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::OrganizeRequested {
                source_dir,
                destination_dir,
                strategy,
            } => Some(Request::Organize {
                source_dir: source_dir.clone(),
                destination_dir: destination_dir.clone(),
                strategy: strategy.clone(),
            }),
            Event::UnorganizeRequested {
                operation,
                target_dir,
                mode,
            } => Some(Request::Unorganize {
                operation: operation.clone(),
                target_dir: target_dir.clone(),
                mode: mode.clone(),
            }),
            _ => None,
        }
    }

    /// Short label used in `request_failed` events.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Organize { .. } => "organize",
            Request::Unorganize { .. } => "unorganize",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunReport {
    Organized(OrganizationResult),
    Unorganized(UnorganizeResult),
}

pub struct Engine {
    organizer: Organizer,
    unorganizer: UnorganizeEngine,
    history: Arc<HistoryStore>,
    default_strategy: String,
}

impl Engine {
    /// Opens the configured history file and wires both engines.
    pub fn from_config(config: &Config, bus: Arc<EventBus>) -> Result<Self, SetupError> {
        config.validate()?;
        let history = HistoryStore::open_file(config.history_path()?, config.history.retention_limit)?;
        Self::with_history(config, Arc::new(history), bus)
    }

    pub fn with_history(
        config: &Config,
        history: Arc<HistoryStore>,
        bus: Arc<EventBus>,
    ) -> Result<Self, SetupError> {
        let default_strategy = config.default_strategy()?.name().to_string();
        let organizer = Organizer::from_config(config, Arc::clone(&history), Arc::clone(&bus))?;
        let unorganizer = UnorganizeEngine::from_config(config, Arc::clone(&history), bus);
        Ok(Self {
            organizer,
            unorganizer,
            history,
            default_strategy,
        })
    }

    pub fn organizer(&self) -> &Organizer {
        &self.organizer
    }

    pub fn unorganizer(&self) -> &UnorganizeEngine {
        &self.unorganizer
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn default_strategy(&self) -> &str {
        &self.default_strategy
    }

    pub fn handle(&self, request: Request) -> Result<RunReport, RequestError> {
        self.handle_with_cancel(request, &CancellationToken::new())
    }

    pub fn handle_with_cancel(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RequestError> {
        match request {
            Request::Organize {
                source_dir,
                destination_dir,
                strategy,
            } => {
                let strategy = strategy.as_deref().unwrap_or(&self.default_strategy);
                let result =
                    self.organizer
                        .run_with_cancel(&source_dir, &destination_dir, strategy, cancel)?;
                Ok(RunReport::Organized(result))
            }
            Request::Unorganize {
                operation,
                target_dir,
                mode,
            } => {
                let result = self
                    .unorganizer
                    .unorganize(&operation, &target_dir, mode, cancel)?;
                Ok(RunReport::Unorganized(result))
            }
        }
    }
}

/// Background thread executing requests published on the bus.
pub struct Worker {
    bus: Arc<EventBus>,
    sender: Option<Sender<Request>>,
    subscriptions: Vec<SubscriptionId>,
    handle: Option<JoinHandle<()>>,
    /// Token of the request currently running; replaced for every request.
    current: Arc<Mutex<CancellationToken>>,
}

impl Worker {
    pub fn spawn(engine: Arc<Engine>, bus: Arc<EventBus>) -> Result<Self, SetupError> {
        let (sender, receiver) = mpsc::channel::<Request>();
        let current = Arc::new(Mutex::new(CancellationToken::new()));

        let thread_bus = Arc::clone(&bus);
        let thread_current = Arc::clone(&current);
        let handle = thread::Builder::new()
            .name("refile-worker".to_string())
            .spawn(move || {
                for request in receiver {
                    let kind = request.kind();
                    debug!(request = kind, "handling request");
                    let cancel = CancellationToken::new();
                    *thread_current.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();

                    if let Err(e) = engine.handle_with_cancel(request, &cancel) {
                        let message = sanitize_message(&e.to_string());
                        error!(request = kind, "request failed: {}", message);
                        thread_bus.publish(Event::RequestFailed {
                            request: kind.to_string(),
                            error: message,
                        });
                    }
                }
                debug!("worker channel closed");
            })
            .map_err(SetupError::Worker)?;

        let subscriptions = ["organize_requested", "unorganize_requested"]
            .into_iter()
            .map(|name| {
                let sender = sender.clone();
                bus.subscribe_to(name, move |event| {
                    if let Some(request) = Request::from_event(event) {
                        // Fails only once the worker is gone.
                        let _ = sender.send(request);
                    }
                })
            })
            .collect();

        info!("worker started");
        Ok(Self {
            bus,
            sender: Some(sender),
            subscriptions,
            handle: Some(handle),
            current,
        })
    }

    /// Queues a request directly, bypassing the bus. Returns false if the
    /// worker has shut down.
    pub fn submit(&self, request: Request) -> bool {
        self.sender
            .as_ref()
            .is_some_and(|sender| sender.send(request).is_ok())
    }

    /// Asks the running request to stop after its current file. Queued
    /// requests are not affected and run normally; calling this while idle
    /// does nothing.
    pub fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Stops accepting requests, drains the queue and joins the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
        self.sender.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("worker thread panicked");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine_for(bus: &Arc<EventBus>) -> Arc<Engine> {
        let config = Config::default();
        let history = Arc::new(HistoryStore::in_memory(50));
        Arc::new(Engine::with_history(&config, history, Arc::clone(bus)).expect("engine"))
    }

    #[test]
    fn test_request_from_event() {
        let event = Event::OrganizeRequested {
            source_dir: PathBuf::from("/in"),
            destination_dir: PathBuf::from("/out"),
            strategy: None,
        };
        let request = Request::from_event(&event).expect("request event");
        assert_eq!(request.kind(), "organize");
        assert!(Request::from_event(&Event::HistoryUpdated {
            operation_id: "x".into()
        })
        .is_none());
    }

    #[test]
    fn test_engine_uses_default_strategy() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (source, destination) = (temp_dir.path().join("in"), temp_dir.path().join("out"));
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&destination).unwrap();
        fs::write(source.join("a.txt"), b"a").unwrap();

        let bus = Arc::new(EventBus::new());
        let engine = engine_for(&bus);
        let report = engine
            .handle(Request::Organize {
                source_dir: source,
                destination_dir: destination,
                strategy: None,
            })
            .expect("organize");
        match report {
            RunReport::Organized(result) => assert_eq!(result.strategy_name, "date"),
            other => panic!("unexpected report: {other:?}"),
        }
    }

    #[test]
    fn test_worker_runs_published_requests() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (source, destination) = (temp_dir.path().join("in"), temp_dir.path().join("out"));
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&destination).unwrap();
        fs::write(source.join("a.jpg"), b"a").unwrap();

        let bus = Arc::new(EventBus::new());
        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);
        bus.subscribe(move |event| {
            if matches!(
                event,
                Event::OrganizationCompleted { .. } | Event::RequestFailed { .. }
            ) {
                let _ = done_tx.lock().unwrap().send(event.clone());
            }
        });

        let worker = Worker::spawn(engine_for(&bus), Arc::clone(&bus)).expect("spawn");
        bus.publish(Event::OrganizeRequested {
            source_dir: temp_dir.path().join("missing"),
            destination_dir: destination.clone(),
            strategy: None,
        });
        bus.publish(Event::OrganizeRequested {
            source_dir: source,
            destination_dir: destination.clone(),
            strategy: Some("type".into()),
        });

        let first = done_rx.recv_timeout(Duration::from_secs(10)).expect("first");
        let second = done_rx.recv_timeout(Duration::from_secs(10)).expect("second");
        worker.shutdown();

        assert!(matches!(first, Event::RequestFailed { request, .. } if request == "organize"));
        assert!(matches!(
            second,
            Event::OrganizationCompleted { succeeded: 1, failed: 0, .. }
        ));
        assert!(destination.join("Images").join("a.jpg").exists());
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_request_failed_redacts_home() {
        let Ok(home) = std::env::var("HOME") else {
            return;
        };
        if home.is_empty() || home == "/" {
            return;
        }
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let missing = PathBuf::from(&home).join("refile-test-missing-source-dir");

        let bus = Arc::new(EventBus::new());
        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);
        bus.subscribe_to("request_failed", move |event| {
            let _ = done_tx.lock().unwrap().send(event.clone());
        });

        let worker = Worker::spawn(engine_for(&bus), Arc::clone(&bus)).expect("spawn");
        worker.submit(Request::Organize {
            source_dir: missing,
            destination_dir: temp_dir.path().to_path_buf(),
            strategy: None,
        });
        let failed = done_rx.recv_timeout(Duration::from_secs(10)).expect("failed");
        worker.shutdown();

        match failed {
            Event::RequestFailed { error, .. } => {
                assert!(error.contains("<USER_HOME>"), "{error}");
                assert!(!error.contains(&home), "{error}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_cancel_does_not_stick_to_later_requests() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (source, destination) = (temp_dir.path().join("in"), temp_dir.path().join("out"));
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&destination).unwrap();
        fs::write(source.join("a.jpg"), b"a").unwrap();

        let bus = Arc::new(EventBus::new());
        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);
        bus.subscribe_to("organization_completed", move |event| {
            let _ = done_tx.lock().unwrap().send(event.clone());
        });

        let engine = engine_for(&bus);
        let worker = Worker::spawn(Arc::clone(&engine), Arc::clone(&bus)).expect("spawn");
        worker.cancel();
        assert!(worker.submit(Request::Organize {
            source_dir: source.clone(),
            destination_dir: destination.clone(),
            strategy: Some("type".into()),
        }));

        let done = done_rx.recv_timeout(Duration::from_secs(10)).expect("completed");
        worker.shutdown();

        assert!(matches!(
            done,
            Event::OrganizationCompleted { succeeded: 1, failed: 0, .. }
        ));
        assert!(!source.join("a.jpg").exists());
        let latest = engine.history().latest().expect("recorded");
        assert!(!latest.result.cancelled);
        assert_eq!(latest.result.processed, 1);
    }
}
