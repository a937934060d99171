//! # liftsync Sync Engine
//!
//! Offline-first reconciliation between a device-local store and a remote
//! authoritative store for training records.
//!
//! This crate provides:
//! - Store contracts (`LocalStore`, `RemoteStore`) and in-memory implementations
//! - Retry with exponential backoff around each phase
//! - Per-entity push/pull reconciliation with last-write-wins and sticky tombstones
//! - The `SyncEngine` orchestrator with a per-user single-flight guard
//! - A REST remote store over an abstract HTTP client
//!
//! ## Architecture
//!
//! `sync_all(user)` runs one phase per entity kind, parents first:
//!
//! ```text
//! Plan ──▶ Session ──▶ Exercise ──▶ Set
//!  │
//!  └─ phase = retry(push(user) then pull(user))
//! ```
//!
//! 1. Push every dirty local record (tombstones included) as an idempotent upsert
//! 2. Pull remote records and apply them with last-write-wins
//!
//! ## Key Invariants
//!
//! - Push always happens before pull within a phase
//! - Parents are reconciled before children
//! - A local tombstone is never resurrected by a pull
//! - Pull-driven writes never dirty a record
//! - One failing record never blocks its siblings
//! - Retrying a phase is harmless because every store operation is idempotent

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod memory;
mod reconciler;
mod retry;
mod store;

pub use config::{RestConfig, RetryConfig, SyncConfig};
pub use engine::{PhaseReport, SyncEngine, SyncReport, SyncState, SyncStats};
pub use error::{RemoteError, RemoteResult, StoreError, SyncError, SyncResult};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RestRemoteStore};
pub use memory::{MemoryLocalStore, MemoryRemoteStore};
pub use reconciler::{PullOutcome, PushOutcome, Reconciler};
pub use retry::{Exhausted, NoopObserver, RetryEvent, RetryExecutor, RetryObserver, Retryable};
pub use store::{LocalBackend, LocalStore, LocalUpdate, PullScope, RemoteBackend, RemoteStore};
