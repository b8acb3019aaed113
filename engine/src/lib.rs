//! # fsmon-engine
//!
//! A directory-tree watch engine. One engine instance owns one base
//! directory: it performs a full recursive baseline walk to seed a
//! per-path metric store, then reconciles filesystem change events into
//! that store until it is cancelled or every watched directory is gone.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        WatchEngine                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  baseline walk ──► MetricStore ◄── event reconciliation      │
//! │       │                                   ▲                  │
//! │       ▼                                   │                  │
//! │  WatchRegistry ◄── register/retire ── event loop             │
//! │       │                                   ▲                  │
//! │       ▼                                   │                  │
//! │  WatchBackend (notify, or scripted in tests)                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The walk registers each directory with the registry *before*
//! enumerating its entries, so nothing created in between is lost; the
//! same invariant holds for directories discovered through create
//! events. Overflowed event batches trigger a corrective re-walk of the
//! affected subtree instead of silently losing updates.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod registry;
pub mod store;
pub mod walker;

#[cfg(test)]
pub(crate) mod support;

pub use backend::{NotifyBackend, WatchBackend, WatchToken};
pub use config::WatchTarget;
pub use engine::{EngineState, WatchEngine};
pub use error::{EngineError, Result};
pub use event::{BackendEvent, ChangeKind, WatchEvent};
pub use filter::PathFilter;
pub use registry::WatchRegistry;
pub use store::{MetricRecord, MetricStore, Snapshot};
pub use walker::WalkStats;
