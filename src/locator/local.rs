use std::fmt;
use std::net::IpAddr;

use camino::{Utf8Path, Utf8PathBuf};
use maxminddb::{geoip2, Reader};
use tracing::{debug, warn};

use super::http::Downloader;
use super::maintenance::DatabaseMaintainer;
use super::{GeoLocator, GeoRecord};
use crate::config::Configuration;
use crate::error::{Error, Result};

/// Locator backed by an offline GeoLite2 City database file.
///
/// Opening refreshes the file first when it is missing or older than the
/// configured update interval.
pub struct LocalDatabaseLocator {
    reader: Reader<Vec<u8>>,
    path: Utf8PathBuf,
}

impl LocalDatabaseLocator {
    /// Refresh the database if needed, then open it.
    ///
    /// A failed refresh is only logged: an outdated database is still
    /// better than none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocalDatabaseNotFound`] when no file is present after
    /// the refresh attempt and [`Error::InvalidLocalDatabase`] when the file
    /// cannot be parsed.
    pub fn open(config: &Configuration, downloader: &dyn Downloader) -> Result<Self> {
        let path = config.local_database_path();
        let maintainer = DatabaseMaintainer::new(config.download_url(), &path, downloader);
        if maintainer.needs_refresh(config.update_interval()) {
            if let Err(e) = maintainer.refresh() {
                warn!("could not update local database {}: {:#}", path, e);
            }
        }
        Self::open_path(&path)
    }

    /// Open the database at `path` as it is, without any refresh.
    pub fn open_path(path: &Utf8Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::LocalDatabaseNotFound {
                path: path.to_path_buf(),
            });
        }
        let reader =
            Reader::open_readfile(path.as_std_path()).map_err(|source| Error::InvalidLocalDatabase {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("opened local database {}", path);
        Ok(Self {
            reader,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn lookup(&self, ip: IpAddr) -> std::result::Result<Option<GeoRecord>, maxminddb::MaxMindDbError> {
        let result = self.reader.lookup(ip)?;
        Ok(result.decode::<geoip2::City>()?.map(|city| GeoRecord {
            continent: city.continent.names.english.map(str::to_string),
            country: city.country.names.english.map(str::to_string),
            city: city.city.names.english.map(str::to_string),
            latitude: city.location.latitude,
            longitude: city.location.longitude,
        }))
    }
}

impl GeoLocator for LocalDatabaseLocator {
    fn locate(&self, address: &str) -> Result<GeoRecord> {
        let ip: IpAddr = address.parse().map_err(|_| Error::not_found(address))?;
        match self.lookup(ip) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(Error::not_found(address)),
            Err(e) => {
                debug!("local lookup of {} failed: {}", address, e);
                Err(Error::not_found(address))
            }
        }
    }
}

impl fmt::Debug for LocalDatabaseLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDatabaseLocator")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    struct OfflineDownloader;

    impl Downloader for OfflineDownloader {
        fn download(&self, url: &str, _dest: &mut dyn Write) -> Result<u64> {
            Err(Error::Download {
                url: url.to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    fn config_in(dir: &Utf8Path) -> Configuration {
        let mut config = Configuration::default();
        config.set_local_database_folder(dir.as_str()).unwrap();
        config
    }

    #[test]
    fn missing_database_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();

        let err = LocalDatabaseLocator::open(&config_in(dir), &OfflineDownloader).unwrap_err();

        assert!(matches!(err, Error::LocalDatabaseNotFound { .. }));
    }

    #[test]
    fn garbage_database_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let config = config_in(dir);
        fs::write(config.local_database_path(), b"definitely not a maxmind database").unwrap();

        // Fresh file: no refresh attempted, parsing fails.
        let err = LocalDatabaseLocator::open(&config, &OfflineDownloader).unwrap_err();

        assert!(matches!(err, Error::InvalidLocalDatabase { .. }));
    }

    #[test]
    fn open_path_without_file() {
        let err = LocalDatabaseLocator::open_path(Utf8Path::new("/nonexistent/GeoLite2-City.mmdb"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/GeoLite2-City.mmdb"));
    }
}
