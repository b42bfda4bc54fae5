//! User configuration and its on-disk form.
//!
//! Everything lives under one root directory, `~/.geolocate` by default:
//!
//! ```text
//! ~/.geolocate/
//! ├── etc/geolocate.conf     INI settings
//! ├── etc/license_key        webservice license key, owner-only
//! └── local_database/        GeoLite2 City database
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use ini::Ini;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::locator::LocatorTag;

pub const CONFIG_FILE: &str = "etc/geolocate.conf";
pub const LICENSE_KEY_FILE: &str = "etc/license_key";

pub const DEFAULT_DOWNLOAD_URL: &str =
    "http://geolite.maxmind.com/download/geoip/database/GeoLite2-City.mmdb.gz";
pub const DEFAULT_UPDATE_INTERVAL: u32 = 35;
pub const DEFAULT_DATABASE_FOLDER: &str = "local_database";
pub const DEFAULT_DATABASE_NAME: &str = "GeoLite2-City.mmdb";
pub const DEFAULT_LOCATORS_PREFERENCE: [LocatorTag; 2] = LocatorTag::ALL;

const SECTION_WEBSERVICE: &str = "webservice";
const SECTION_LOCAL_DATABASE: &str = "local_database";
const SECTION_PREFERENCE: &str = "locators_preference";

/// `~/.geolocate`, or `./.geolocate` when no home directory is known.
pub fn default_config_root() -> Utf8PathBuf {
    let home = dirs::home_dir()
        .and_then(|home| Utf8PathBuf::from_path_buf(home).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("."));
    home.join(".geolocate")
}

/// Validated settings. Setters check their input and leave the value
/// untouched on error.
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    user_id: String,
    license_key: String,
    download_url: String,
    update_interval: u32,
    local_database_folder: Utf8PathBuf,
    local_database_name: String,
    locators_preference: Vec<LocatorTag>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::with_root(&default_config_root())
    }
}

impl Configuration {
    /// Defaults, with the database folder placed under `root`.
    pub fn with_root(root: &Utf8Path) -> Self {
        Self {
            user_id: String::new(),
            license_key: String::new(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            local_database_folder: root.join(DEFAULT_DATABASE_FOLDER),
            local_database_name: DEFAULT_DATABASE_NAME.to_string(),
            locators_preference: DEFAULT_LOCATORS_PREFERENCE.to_vec(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn set_user_id(&mut self, user_id: &str) -> Result<()> {
        validate_value("user_id", user_id)?;
        self.user_id = user_id.to_string();
        Ok(())
    }

    pub fn license_key(&self) -> &str {
        &self.license_key
    }

    pub fn set_license_key(&mut self, license_key: &str) -> Result<()> {
        validate_value("license_key", license_key)?;
        self.license_key = license_key.to_string();
        Ok(())
    }

    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    pub fn set_download_url(&mut self, download_url: &str) -> Result<()> {
        let parsed = url::Url::parse(download_url)
            .map_err(|e| Error::invalid("download_url", download_url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::invalid(
                "download_url",
                download_url,
                "only http and https URLs are supported",
            ));
        }
        self.download_url = download_url.to_string();
        Ok(())
    }

    /// Days a local database is used before it is downloaded again.
    pub fn update_interval(&self) -> u32 {
        self.update_interval
    }

    pub fn set_update_interval(&mut self, days: &str) -> Result<()> {
        match days.trim().parse::<u32>() {
            Ok(days) if days > 0 => {
                self.update_interval = days;
                Ok(())
            }
            _ => Err(Error::invalid(
                "update_interval",
                days,
                "must be a positive number of days",
            )),
        }
    }

    pub fn local_database_folder(&self) -> &Utf8Path {
        &self.local_database_folder
    }

    /// Relative folders are taken from the current directory. The folder
    /// must already exist.
    pub fn set_local_database_folder(&mut self, folder: &str) -> Result<()> {
        let folder_path = Utf8Path::new(folder);
        let absolute = if folder_path.is_absolute() {
            folder_path.to_path_buf()
        } else {
            let cwd = std::env::current_dir()?;
            Utf8PathBuf::try_from(cwd.join(folder_path))
                .map_err(|_| Error::invalid("local_database_folder", folder, "path is not UTF-8"))?
        };
        if !absolute.is_dir() {
            return Err(Error::invalid(
                "local_database_folder",
                folder,
                "folder does not exist",
            ));
        }
        self.local_database_folder = absolute;
        Ok(())
    }

    pub fn local_database_name(&self) -> &str {
        &self.local_database_name
    }

    pub fn set_local_database_name(&mut self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::invalid(
                "local_database_name",
                name,
                "cannot be empty",
            ));
        }
        self.local_database_name = name.to_string();
        Ok(())
    }

    pub fn local_database_path(&self) -> Utf8PathBuf {
        self.local_database_folder.join(&self.local_database_name)
    }

    /// Enabled locators, most preferred first.
    pub fn locators_preference(&self) -> &[LocatorTag] {
        &self.locators_preference
    }

    pub fn set_locators_preference<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        self.locators_preference = LocatorTag::parse_list(names)?;
        Ok(())
    }

    pub fn reset_locators_preference(&mut self) {
        self.locators_preference = DEFAULT_LOCATORS_PREFERENCE.to_vec();
    }

    /// Known locators missing from the preference list.
    pub fn disabled_locators(&self) -> Vec<LocatorTag> {
        LocatorTag::ALL
            .into_iter()
            .filter(|tag| !self.locators_preference.contains(tag))
            .collect()
    }

    pub fn webservice_configured(&self) -> bool {
        !self.user_id.is_empty() && !self.license_key.is_empty()
    }
}

fn validate_value(parameter: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        Err(Error::invalid(parameter, value, "cannot be empty"))
    } else if value.chars().any(char::is_whitespace) {
        Err(Error::invalid(parameter, value, "cannot contain spaces"))
    } else {
        Ok(())
    }
}

/// Reads and writes the configuration under a root directory.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    root: Utf8PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(default_config_root())
    }
}

impl ConfigStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn config_path(&self) -> Utf8PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn credentials(&self) -> CredentialStore {
        CredentialStore::new(self.root.join(LICENSE_KEY_FILE))
    }

    /// Load the saved configuration, writing a default one first if there
    /// is none yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigCorrupted`] when the file holds missing or
    /// invalid values.
    pub fn load(&self) -> Result<Configuration> {
        fs::create_dir_all(self.root.join(DEFAULT_DATABASE_FOLDER))?;
        let path = self.config_path();
        if !path.is_file() {
            info!("no configuration at {}, writing defaults", path);
            let defaults = Configuration::with_root(&self.root);
            self.save(&defaults)?;
            return Ok(defaults);
        }

        debug!("loading configuration from {}", path);
        let ini = Ini::load_from_file(&path)?;
        let mut config = parse_ini(&ini, &self.root).map_err(|e| Error::ConfigCorrupted {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let license_key = self.credentials().load()?;
        if !license_key.is_empty() {
            config
                .set_license_key(&license_key)
                .map_err(|e| Error::ConfigCorrupted {
                    path: self.credentials().path().to_path_buf(),
                    reason: e.to_string(),
                })?;
        }
        Ok(config)
    }

    pub fn save(&self, config: &Configuration) -> Result<()> {
        let path = self.config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        to_ini(config).write_to_file(&path)?;
        self.credentials().save(config.license_key())?;
        debug!("configuration saved to {}", path);
        Ok(())
    }

    /// Load, apply `change`, then save whatever state the configuration is
    /// left in, even when `change` fails. Returns the result of `change`.
    pub fn update<T>(&self, change: impl FnOnce(&mut Configuration) -> Result<T>) -> Result<T> {
        let mut config = self.load()?;
        let outcome = change(&mut config);
        self.save(&config)?;
        outcome
    }
}

fn required<'a>(ini: &'a Ini, section: &str, key: &str) -> Result<&'a str> {
    ini.section(Some(section))
        .and_then(|s| s.get(key))
        .ok_or_else(|| Error::invalid("configuration", "", format!("missing [{section}] {key}")))
}

fn parse_ini(ini: &Ini, root: &Utf8Path) -> Result<Configuration> {
    let mut config = Configuration::with_root(root);

    let user_id = required(ini, SECTION_WEBSERVICE, "user_id")?;
    if !user_id.is_empty() {
        config.set_user_id(user_id)?;
    }

    config.set_download_url(required(ini, SECTION_LOCAL_DATABASE, "download_url")?)?;
    config.set_update_interval(required(ini, SECTION_LOCAL_DATABASE, "update_interval")?)?;
    config.set_local_database_folder(required(
        ini,
        SECTION_LOCAL_DATABASE,
        "local_database_folder",
    )?)?;
    config.set_local_database_name(required(
        ini,
        SECTION_LOCAL_DATABASE,
        "local_database_name",
    )?)?;

    let preference: Vec<&str> = required(ini, SECTION_PREFERENCE, "preference")?
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    config.set_locators_preference(&preference)?;

    Ok(config)
}

fn to_ini(config: &Configuration) -> Ini {
    let preference: Vec<&str> = config
        .locators_preference()
        .iter()
        .map(LocatorTag::as_str)
        .collect();

    let mut ini = Ini::new();
    ini.with_section(Some(SECTION_WEBSERVICE))
        .set("user_id", config.user_id());
    ini.with_section(Some(SECTION_LOCAL_DATABASE))
        .set("download_url", config.download_url())
        .set("update_interval", config.update_interval().to_string())
        .set("local_database_folder", config.local_database_folder().as_str())
        .set("local_database_name", config.local_database_name());
    ini.with_section(Some(SECTION_PREFERENCE))
        .set("preference", preference.join(","));
    ini
}

/// Keeps the webservice license key in its own owner-only file.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: Utf8PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The stored key, or an empty string when none was saved.
    pub fn load(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(key) => Ok(key.trim().to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Store `key`. An empty key removes the file.
    pub fn save(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(key.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}
