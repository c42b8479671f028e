//! # ShelfDB Testkit
//!
//! Test utilities for ShelfDB.
//!
//! This crate provides:
//! - Temporary collections on either backend, cleaned up on drop
//! - Property-based test generators using proptest
//! - A harness that mirrors a collection in memory and checks it
//!
//! ## Usage
//!
//! ```rust
//! use shelfdb_testkit::prelude::*;
//! use serde_json::json;
//!
//! with_each_backend(|c| {
//!     c.create("k", &json!({"a": 1})).unwrap();
//!     assert_eq!(c.keys().unwrap(), vec!["k"]);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
