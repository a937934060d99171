//! # liftsync Model
//!
//! Data model for the liftsync offline-first sync engine.
//!
//! This crate provides:
//! - `SyncMeta`, the bookkeeping shared by every synced record
//! - The four training entities: `Plan`, `Session`, `Exercise`, `ExerciseSet`
//! - The `SyncEntity` trait tying each entity to its remote table and row shape
//! - ISO-8601 timestamp helpers used at the remote boundary
//! - A `Clock` abstraction so timestamps are deterministic in tests
//!
//! This is a pure model crate with no I/O operations.
//!
//! ## Hierarchy
//!
//! ```text
//! Plan ─┬─ Session ─┬─ Exercise ─┬─ ExerciseSet
//!       │           │            └─ ...
//!       │           └─ ...
//!       └─ ...
//! ```
//!
//! A child may reference a soft-deleted parent, but never a missing one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod entity;
mod error;
mod exercise;
mod id;
mod meta;
mod plan;
mod session;
mod set;
pub mod timestamp;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{EntityKind, SyncEntity};
pub use error::{ModelError, ModelResult, ValidationError};
pub use exercise::{Exercise, ExerciseRow};
pub use id::{EntityId, UserId};
pub use meta::SyncMeta;
pub use plan::{Plan, PlanRow};
pub use session::{Session, SessionRow};
pub use set::{ExerciseSet, ExerciseSetRow};
