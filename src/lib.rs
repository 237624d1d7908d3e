//! refile - organize files into date and type based layouts, and undo it.
//!
//! The engine scans a source tree, asks a [`strategy::Strategy`] where each
//! file belongs, moves it there without ever overwriting, and records the run
//! in a bounded [`history::HistoryStore`]. A recorded run can later be
//! reversed by the [`unorganize::UnorganizeEngine`] in flatten, restore or
//! selective mode. Progress is reported over an [`events::EventBus`].

pub mod category;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod error;
pub mod events;
pub mod file_mover;
pub mod history;
pub mod logging;
pub mod metadata;
pub mod organizer;
pub mod output;
pub mod safety;
pub mod scan;
pub mod service;
pub mod strategy;
pub mod unorganize;

pub use config::{CompiledFilters, Config};
pub use error::{
    ConfigError, FileErrorKind, HistoryError, OrganizeError, PreconditionError, RejectionReason,
    UnorganizeError,
};
pub use events::{Event, EventBus};
pub use history::{HistoryStore, OperationHistoryEntry};
pub use organizer::{CancellationToken, FileOperationRecord, OrganizationResult, Organizer};
pub use service::{Engine, Request, Worker};
pub use strategy::Strategy;
pub use unorganize::{OperationSelector, UnorganizeEngine, UnorganizeMode, UnorganizeResult};
