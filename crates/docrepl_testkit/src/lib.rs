//! # DocRepl Testkit
//!
//! Test utilities for DocRepl.
//!
//! This crate provides:
//! - Fixed change histories with chosen etags and transaction markers
//! - Property-based test generators using proptest
//! - A reference destination that applies batches and acknowledges them
//! - An in-process loopback transport wired to that destination
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docrepl_testkit::prelude::*;
//!
//! let source = FixtureSource::new()
//!     .with_document(document(10, "users/1", 5, "{}", cv(&[(node(1), 10)])));
//! let mut transport = LoopbackTransport::new();
//! // drive a session over `transport`, then inspect
//! let receiver = transport.receiver();
//! assert_eq!(receiver.lock().last_etag_accepted(), 10);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod loopback;
pub mod receiver;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::loopback::*;
    pub use crate::receiver::*;
}

pub use fixtures::*;
pub use generators::*;
pub use loopback::*;
pub use receiver::*;
