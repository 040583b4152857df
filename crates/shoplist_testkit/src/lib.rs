//! # Shoplist Testkit
//!
//! Test utilities for shoplist.
//!
//! This crate provides:
//! - Property-based generators for list edits ([`generators`])
//! - A deterministic in-process replica harness ([`integration`])
//! - Temporary stores and loopback clusters of real nodes ([`fixtures`])
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shoplist_testkit::prelude::*;
//!
//! #[test]
//! fn lists_reach_every_replica() {
//!     let cluster = TestCluster::start(2, 2).unwrap();
//!     let api = cluster.api();
//!     let list = api.create_list("Weekly").unwrap();
//!     // ...
//! }
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
