use camino::Utf8PathBuf;
use std::path::PathBuf;

/// Error types for the geolocate library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration value was rejected on assignment.
    #[error("there is a problem with parameter {parameter}, you gave {value:?} as value: {reason}")]
    ParameterNotValid {
        parameter: &'static str,
        value: String,
        reason: String,
    },

    /// A locator preference names locators that do not exist.
    #[error("you tried to use not implemented locators: {}", .locators.join(" "))]
    UnknownLocators { locators: Vec<String> },

    /// The configuration file exists but holds values that cannot be used.
    #[error("configuration file {path} is corrupted: {reason}")]
    ConfigCorrupted { path: Utf8PathBuf, reason: String },

    /// No local database file exists, even after trying to download one.
    #[error("local database not found: {path}")]
    LocalDatabaseNotFound { path: Utf8PathBuf },

    /// The local database file exists but is not a readable MMDB file.
    #[error("invalid local database: {path}")]
    InvalidLocalDatabase {
        path: Utf8PathBuf,
        #[source]
        source: maxminddb::MaxMindDbError,
    },

    /// The refresh download left no compressed archive behind.
    #[error("problem decompressing updated database: no compressed file found in {}", .dir.display())]
    CompressedFileNotFound { dir: PathBuf },

    /// Decompression produced no file with the database extension.
    #[error("no .{extension} database file found in {}", .dir.display())]
    NotValidDatabaseFileFound { dir: PathBuf, extension: String },

    /// Fetching the compressed database failed.
    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    /// The webservice locator was requested but no credentials are set.
    #[error("webservice locator is not configured, set a user id and license key first")]
    WebServiceNotConfigured,

    /// No enabled locator has a record for the address.
    #[error("the address {address} is not in the database")]
    AddressNotFound { address: String },

    /// The configuration file could not be parsed as INI.
    #[error(transparent)]
    Ini(#[from] ini::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::ParameterNotValid`] built from displayable parts.
    pub(crate) fn invalid(
        parameter: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::ParameterNotValid {
            parameter,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::AddressNotFound`].
    pub(crate) fn not_found(address: &str) -> Self {
        Error::AddressNotFound {
            address: address.to_string(),
        }
    }
}

/// Convenience type alias for Results using the library error.
pub type Result<T> = std::result::Result<T, Error>;
