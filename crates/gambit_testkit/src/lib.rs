//! # Gambit Testkit
//!
//! Test utilities for Gambit clients.
//!
//! This crate provides:
//! - Loopback HTTP and channel adapters onto the reference server
//! - A multi-player harness with deterministic push delivery
//! - Scripted opening lines
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gambit_testkit::prelude::*;
//!
//! #[test]
//! fn two_players() {
//!     let harness = Harness::new();
//!     let alice = harness.add_player("alice");
//!     let bob = harness.add_player("bob");
//!     harness.pair_via_queue(&alice, &bob).unwrap();
//!     harness.play_line(&alice, &bob, FOOLS_MATE).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod harness;
pub mod lines;
pub mod loopback;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::harness::*;
    pub use crate::lines::*;
    pub use crate::loopback::*;
}

pub use harness::*;
pub use lines::*;
pub use loopback::*;
