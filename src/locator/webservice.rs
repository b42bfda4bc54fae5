use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;
use ureq::Agent;

use super::{GeoLocator, GeoRecord};
use crate::error::{Error, Result};

/// Public endpoint of the GeoIP2 precision web service.
pub const DEFAULT_ENDPOINT: &str = "https://geoip.maxmind.com/geoip/v2.1/city";

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Locator querying the MaxMind GeoIP2 City web service.
///
/// Any failure, from a bad address to an exhausted query quota, reads as
/// "not found" so the registry moves on to the next locator.
pub struct WebServiceLocator {
    agent: Agent,
    endpoint: String,
    authorization: String,
}

impl WebServiceLocator {
    pub fn new(user_id: &str, license_key: &str) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .build()
            .into();
        let credentials = STANDARD.encode(format!("{user_id}:{license_key}"));
        Self {
            agent,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            authorization: format!("Basic {credentials}"),
        }
    }

    /// Point the locator at another service root, e.g. a local mirror.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn query(&self, address: &str) -> std::result::Result<CityResponse, ureq::Error> {
        let url = format!("{}/{}", self.endpoint, address);
        self.agent
            .get(&url)
            .header("Authorization", &self.authorization)
            .header("Accept", "application/json")
            .call()?
            .into_body()
            .read_json::<CityResponse>()
    }
}

impl GeoLocator for WebServiceLocator {
    fn locate(&self, address: &str) -> Result<GeoRecord> {
        match self.query(address) {
            Ok(response) => Ok(response.into()),
            Err(e) => {
                debug!("webservice lookup of {} failed: {}", address, e);
                Err(Error::not_found(address))
            }
        }
    }
}

impl fmt::Debug for WebServiceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebServiceLocator")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// The parts of a City response the formatter uses.
#[derive(Debug, Default, Deserialize)]
struct CityResponse {
    #[serde(default)]
    continent: Named,
    #[serde(default)]
    country: Named,
    #[serde(default)]
    city: Named,
    #[serde(default)]
    location: Location,
}

#[derive(Debug, Default, Deserialize)]
struct Named {
    #[serde(default)]
    names: HashMap<String, String>,
}

impl Named {
    fn english(mut self) -> Option<String> {
        self.names.remove("en")
    }
}

#[derive(Debug, Default, Deserialize)]
struct Location {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<CityResponse> for GeoRecord {
    fn from(response: CityResponse) -> Self {
        GeoRecord {
            continent: response.continent.english(),
            country: response.country.english(),
            city: response.city.english(),
            latitude: response.location.latitude,
            longitude: response.location.longitude,
        }
    }
}
