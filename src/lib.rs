//! The geolocate library: annotate IPv4 addresses in text with where they are.
//!
//! Addresses are found with [`ipv4_scan`], resolved by the locators of a
//! [`LocatorRegistry`] in the user's order of preference, and written back
//! into each line by a [`LineRewriter`].
//!
//! # Examples
//!
//! Annotating text with a custom locator:
//!
//! ```rust
//! use geolocate::{GeoLocator, GeoRecord, LineRewriter, LocationFormatter, Verbosity};
//! use geolocate::input::LineSource;
//!
//! struct Everywhere;
//!
//! impl GeoLocator for Everywhere {
//!     fn locate(&self, _address: &str) -> geolocate::Result<GeoRecord> {
//!         Ok(GeoRecord {
//!             continent: Some("Europe".to_string()),
//!             ..GeoRecord::default()
//!         })
//!     }
//! }
//!
//! let formatter = LocationFormatter::new(Verbosity::Continent);
//! let mut lines = LineRewriter::new(LineSource::text("from 80.58.61.250"), &Everywhere, formatter);
//! let line = lines.next().unwrap().unwrap();
//! assert_eq!(line, b"from 80.58.61.250 [Europe]");
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod input;
pub mod locator;
pub mod logging;
pub mod registry;
pub mod rewriter;

pub use crate::config::{ConfigStore, Configuration};
pub use crate::error::{Error, Result};
pub use crate::format::{LocationFormatter, Verbosity};
pub use crate::locator::{GeoLocator, GeoRecord, Locator, LocatorTag};
pub use crate::registry::LocatorRegistry;
pub use crate::rewriter::{LineRewriter, NOT_FOUND_MESSAGE};
