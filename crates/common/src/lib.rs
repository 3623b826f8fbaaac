//! swiftcheck common library
//!
//! Fixture model and fixture tables shared by the swiftcheck harness.

pub mod error;
pub mod fixture;

pub use error::{FixtureError, Result};
pub use fixture::{EntryMode, Fixture, FixtureSet, SizeClass};

/// swiftcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
