//! Geolocation backends.
//!
//! Every backend implements [`GeoLocator`]. The set of backends is closed:
//! [`Locator`] is the sum type the registry stores, one variant per
//! [`LocatorTag`].

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub mod http;
pub mod local;
pub mod maintenance;
pub mod webservice;

pub use self::local::LocalDatabaseLocator;
pub use self::webservice::WebServiceLocator;

/// Stable identifiers for the known locators, as written in configuration
/// files and on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocatorTag {
    /// MaxMind GeoIP2 precision web service.
    WebService,
    /// Offline GeoLite2 City database file.
    Local,
}

impl LocatorTag {
    /// Every known tag, in default preference order.
    pub const ALL: [LocatorTag; 2] = [LocatorTag::WebService, LocatorTag::Local];

    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorTag::WebService => "geoip2_webservice",
            LocatorTag::Local => "geoip2_local",
        }
    }

    /// Parse a whole preference list, reporting every unknown name at once.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<LocatorTag>> {
        let mut tags = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            match name.as_ref().parse::<LocatorTag>() {
                Ok(tag) => tags.push(tag),
                Err(_) => unknown.push(name.as_ref().to_string()),
            }
        }
        if unknown.is_empty() {
            Ok(tags)
        } else {
            Err(Error::UnknownLocators { locators: unknown })
        }
    }
}

impl fmt::Display for LocatorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocatorTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LocatorTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| Error::UnknownLocators {
                locators: vec![s.to_string()],
            })
    }
}

/// Geolocation data for one address. Every field may be unknown.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeoRecord {
    pub continent: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Something that can resolve an address to a [`GeoRecord`].
pub trait GeoLocator {
    /// Resolve `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AddressNotFound`] when the backend has no record for
    /// the address. Implementations may return other errors for backend
    /// failures; callers doing fallback treat every error alike.
    fn locate(&self, address: &str) -> Result<GeoRecord>;
}

/// The closed set of locator backends.
#[derive(Debug)]
pub enum Locator {
    Local(LocalDatabaseLocator),
    WebService(WebServiceLocator),
}

impl Locator {
    pub fn tag(&self) -> LocatorTag {
        match self {
            Locator::Local(_) => LocatorTag::Local,
            Locator::WebService(_) => LocatorTag::WebService,
        }
    }
}

impl GeoLocator for Locator {
    fn locate(&self, address: &str) -> Result<GeoRecord> {
        match self {
            Locator::Local(locator) => locator.locate(address),
            Locator::WebService(locator) => locator.locate(address),
        }
    }
}
