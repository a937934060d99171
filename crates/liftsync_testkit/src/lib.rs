//! # liftsync Testkit
//!
//! Test utilities for liftsync.
//!
//! This crate provides:
//! - A `TestBackend` bundling in-memory stores with a manual clock
//! - Hierarchy fixtures (plan, session, exercise, set)
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use liftsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_sync() {
//!     let backend = TestBackend::new();
//!     let tree = backend.seed_hierarchy().await;
//!     backend.engine().sync_all(&backend.user).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
