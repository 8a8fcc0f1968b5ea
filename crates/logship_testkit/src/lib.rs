//! # logship testkit
//!
//! Test utilities for the segment marker.
//!
//! This crate provides:
//! - Temporary WAL directories with marker helpers
//! - Marker file corruption and crash-recovery checks
//! - Property-based generators for delivery workloads
//! - Concurrent stress drivers for the handler
//!
//! ## Usage
//!
//! ```rust,ignore
//! use logship_testkit::prelude::*;
//!
//! #[test]
//! fn resumes_from_marker() {
//!     let dir = TestMarkerDir::new();
//!     dir.write_marker(10);
//!     let handler = dir.handler();
//!     assert_eq!(handler.last_marked_segment(), Some(10));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
