//! Preference-ordered set of locators with per-lookup fallback.

use tracing::{debug, trace};

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::locator::http::{Downloader, HttpDownloader};
use crate::locator::{
    GeoLocator, GeoRecord, LocalDatabaseLocator, Locator, LocatorTag, WebServiceLocator,
};

/// Holds one locator per configured backend and tries them in preference
/// order on every lookup.
///
/// The local database locator always exists. The webservice locator exists
/// only when both credentials are configured.
#[derive(Debug)]
pub struct LocatorRegistry<L = Locator> {
    local: L,
    webservice: Option<L>,
    preference: Vec<LocatorTag>,
}

impl LocatorRegistry<Locator> {
    /// Build every locator `config` enables, downloading the local database
    /// over HTTP if it is missing or stale.
    ///
    /// # Errors
    ///
    /// Fails when the local database cannot be opened, even after a refresh.
    pub fn build(config: &Configuration) -> Result<Self> {
        Self::build_with(config, &HttpDownloader::default())
    }

    /// Like [`LocatorRegistry::build`] with a caller supplied downloader.
    pub fn build_with(config: &Configuration, downloader: &dyn Downloader) -> Result<Self> {
        let webservice = config.webservice_configured().then(|| {
            debug!("webservice locator enabled for user {}", config.user_id());
            Locator::WebService(WebServiceLocator::new(config.user_id(), config.license_key()))
        });
        let local = Locator::Local(LocalDatabaseLocator::open(config, downloader)?);
        Ok(Self::from_parts(
            local,
            webservice,
            config.locators_preference().to_vec(),
        ))
    }
}

impl<L: GeoLocator> LocatorRegistry<L> {
    pub fn from_parts(local: L, webservice: Option<L>, preference: Vec<LocatorTag>) -> Self {
        Self {
            local,
            webservice,
            preference,
        }
    }

    /// The locator registered under `tag`, if it was instantiated.
    pub fn get(&self, tag: LocatorTag) -> Option<&L> {
        match tag {
            LocatorTag::Local => Some(&self.local),
            LocatorTag::WebService => self.webservice.as_ref(),
        }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    /// # Errors
    ///
    /// Returns [`Error::WebServiceNotConfigured`] when no credentials were set.
    pub fn webservice(&self) -> Result<&L> {
        self.webservice.as_ref().ok_or(Error::WebServiceNotConfigured)
    }

    pub fn preference(&self) -> &[LocatorTag] {
        &self.preference
    }

    pub fn set_preference(&mut self, preference: Vec<LocatorTag>) {
        self.preference = preference;
    }

    /// Ask each preferred locator in turn; the first record wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AddressNotFound`] once every preferred locator has
    /// failed, whatever the individual failures were.
    pub fn locate(&self, address: &str) -> Result<GeoRecord> {
        for tag in &self.preference {
            let Some(locator) = self.get(*tag) else {
                trace!("{} not available, skipping", tag);
                continue;
            };
            match locator.locate(address) {
                Ok(record) => {
                    trace!("{} located by {}", address, tag);
                    return Ok(record);
                }
                Err(e) => debug!("{} could not locate {}: {}", tag, address, e),
            }
        }
        Err(Error::not_found(address))
    }
}

impl<L: GeoLocator> GeoLocator for LocatorRegistry<L> {
    fn locate(&self, address: &str) -> Result<GeoRecord> {
        LocatorRegistry::locate(self, address)
    }
}
