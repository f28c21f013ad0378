//! # Picoware Platform
//!
//! Shared types for the Picoware SSH engine.
//!
//! This crate provides the unified error type (`PicoError`, `PicoResult`)
//! used by every protocol layer.
//!
//! # Examples
//!
//! ```
//! use picoware_platform::{PicoError, PicoResult};
//!
//! fn parse_port(value: &str) -> PicoResult<u16> {
//!     value
//!         .parse()
//!         .map_err(|_| PicoError::Config(format!("invalid port: {}", value)))
//! }
//!
//! # fn main() -> PicoResult<()> {
//! assert_eq!(parse_port("22")?, 22);
//! assert!(parse_port("ssh").is_err());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{PicoError, PicoResult};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
