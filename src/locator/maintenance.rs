//! Lifecycle of the offline database file.
//!
//! A refresh runs inside a private temporary directory:
//!
//! 1. download the compressed archive,
//! 2. find it again on disk,
//! 3. gunzip it next to itself under its inner file name,
//! 4. find the decompressed file by its extension,
//! 5. move the new one into place, replacing the previous database if any.
//!
//! The temporary directory is removed when the refresh returns, whatever the
//! outcome. Step 5 stages the copy in the destination folder and renames it
//! over the target, so the database path never holds a partial file and the
//! old database stays readable until the rename.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use camino::Utf8Path;
use chrono::{DateTime, Local, NaiveDate};
use flate2::read::GzDecoder;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

use super::http::Downloader;
use crate::error::{Error, Result};

/// Extension of a usable database file.
pub const DATABASE_EXTENSION: &str = "mmdb";

/// Extension of the downloaded archive.
pub const COMPRESSED_EXTENSION: &str = "gz";

/// Keeps the local database file present and fresh.
pub struct DatabaseMaintainer<'a> {
    download_url: &'a str,
    database_path: &'a Utf8Path,
    downloader: &'a dyn Downloader,
    scratch_root: Option<PathBuf>,
}

impl<'a> DatabaseMaintainer<'a> {
    pub fn new(
        download_url: &'a str,
        database_path: &'a Utf8Path,
        downloader: &'a dyn Downloader,
    ) -> Self {
        Self {
            download_url,
            database_path,
            downloader,
            scratch_root: None,
        }
    }

    /// Create refresh scratch directories under `root` instead of the
    /// system temporary directory.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Whether the database is missing or older than `update_interval` days.
    pub fn needs_refresh(&self, update_interval: u32) -> bool {
        is_stale(self.database_path, update_interval, Local::now().date_naive())
    }

    /// Download, decompress and install a new database.
    ///
    /// # Errors
    ///
    /// Any failure aborts the refresh and leaves the previous database, if
    /// there was one, untouched.
    pub fn refresh(&self) -> Result<()> {
        let scratch = self.scratch_dir()?;
        info!(
            "refreshing local database {} from {}",
            self.database_path, self.download_url
        );

        self.download_into(scratch.path())?;
        decompress_archive(scratch.path())?;
        let new_database = find_database_file(scratch.path(), DATABASE_EXTENSION)?;
        install_database(&new_database, self.database_path)?;

        info!("local database {} updated", self.database_path);
        Ok(())
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("geolocate-");
        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    fn download_into(&self, dir: &Path) -> Result<PathBuf> {
        let archive = dir.join(archive_file_name(self.download_url, self.database_path));
        let mut out = BufWriter::new(File::create(&archive)?);
        self.downloader.download(self.download_url, &mut out)?;
        out.flush()?;
        Ok(archive)
    }
}

/// Pick a file name for the downloaded archive: the last URL path segment
/// when it looks like a gzip file, otherwise the database name plus `.gz`.
fn archive_file_name(download_url: &str, database_path: &Utf8Path) -> String {
    let from_url = url::Url::parse(download_url).ok().and_then(|url| {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| name.ends_with(&format!(".{COMPRESSED_EXTENSION}")))
            .map(str::to_string)
    });
    from_url.unwrap_or_else(|| {
        let name = database_path.file_name().unwrap_or("database");
        format!("{name}.{COMPRESSED_EXTENSION}")
    })
}

/// Whether the file at `path` is missing or was last modified more than
/// `update_interval` days before `today`.
pub fn is_stale(path: &Utf8Path, update_interval: u32, today: NaiveDate) -> bool {
    match last_modification(path) {
        Ok(modified) => (today - modified).num_days() > i64::from(update_interval),
        Err(_) => true,
    }
}

/// Local calendar date of the file's last modification.
///
/// # Errors
///
/// Returns [`Error::LocalDatabaseNotFound`] when the file does not exist.
pub fn last_modification(path: &Utf8Path) -> Result<NaiveDate> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::LocalDatabaseNotFound {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    })?;
    let modified: DateTime<Local> = metadata.modified()?.into();
    Ok(modified.date_naive())
}

/// Find the compressed archive inside `dir`.
///
/// # Errors
///
/// Returns [`Error::CompressedFileNotFound`] when `dir` holds no `.gz` file.
pub fn find_compressed_file(dir: &Path) -> Result<PathBuf> {
    find_by_extension(dir, COMPRESSED_EXTENSION)?.ok_or_else(|| Error::CompressedFileNotFound {
        dir: dir.to_path_buf(),
    })
}

/// Find the decompressed database inside `dir`.
///
/// # Errors
///
/// Returns [`Error::NotValidDatabaseFileFound`] when no file has `extension`.
pub fn find_database_file(dir: &Path, extension: &str) -> Result<PathBuf> {
    find_by_extension(dir, extension)?.ok_or_else(|| Error::NotValidDatabaseFileFound {
        dir: dir.to_path_buf(),
        extension: extension.to_string(),
    })
}

fn find_by_extension(dir: &Path, extension: &str) -> Result<Option<PathBuf>> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches.into_iter().next())
}

/// Gunzip the archive found in `dir` into the same directory.
///
/// The output keeps the file name stored in the gzip header when there is
/// one, else the archive name minus its `.gz` suffix.
pub fn decompress_archive(dir: &Path) -> Result<PathBuf> {
    let archive = find_compressed_file(dir)?;
    let mut decoder = GzDecoder::new(BufReader::new(File::open(&archive)?));

    let inner_name = decoder
        .header()
        .and_then(|header| header.filename())
        .and_then(|raw| std::str::from_utf8(raw).ok())
        .and_then(|name| Path::new(name).file_name())
        .map(|name| dir.join(name))
        .filter(|path| *path != archive);
    let target = inner_name.unwrap_or_else(|| uncompressed_file_name(&archive));

    debug!("decompressing {} into {}", archive.display(), target.display());
    let mut out = BufWriter::new(File::create(&target)?);
    io::copy(&mut decoder, &mut out)?;
    out.flush()?;
    Ok(target)
}

/// `/tmp/x/GeoLite2-City.mmdb.gz` becomes `/tmp/x/GeoLite2-City.mmdb`.
pub fn uncompressed_file_name(compressed: &Path) -> PathBuf {
    match compressed.extension() {
        Some(ext) if ext == COMPRESSED_EXTENSION => compressed.with_extension(""),
        _ => compressed.to_path_buf(),
    }
}

fn install_database(new_database: &Path, target: &Utf8Path) -> Result<()> {
    let folder = match target.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(folder)?;

    let mut staged = NamedTempFile::new_in(folder)?;
    io::copy(&mut File::open(new_database)?, staged.as_file_mut())?;
    staged.as_file().sync_all()?;

    // The rename replaces any previous database in one step.
    let replacing = target.exists();
    staged.persist(target).map_err(|e| e.error)?;
    if replacing {
        debug!("replaced previous database {}", target);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use flate2::write::GzEncoder;
    use flate2::{Compression, GzBuilder};
    use std::time::{Duration, SystemTime};

    const URL: &str = "http://localhost:2014/GeoLite2-City.mmdb.gz";

    struct FakeDownloader {
        payload: Vec<u8>,
    }

    impl Downloader for FakeDownloader {
        fn download(&self, _url: &str, dest: &mut dyn Write) -> Result<u64> {
            dest.write_all(&self.payload)?;
            Ok(self.payload.len() as u64)
        }
    }

    struct FailingDownloader;

    impl Downloader for FailingDownloader {
        fn download(&self, url: &str, _dest: &mut dyn Write) -> Result<u64> {
            Err(Error::Download {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn utf8(path: PathBuf) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path).unwrap()
    }

    fn set_age(path: &Utf8Path, days: u64) {
        let when = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    #[test]
    fn refresh_installs_first_database() {
        let folder = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let db = utf8(folder.path().join("GeoLite2-City.mmdb"));
        let downloader = FakeDownloader {
            payload: gzip(b"fresh database"),
        };

        DatabaseMaintainer::new(URL, &db, &downloader)
            .with_scratch_root(scratch.path())
            .refresh()
            .unwrap();

        assert_eq!(fs::read(&db).unwrap(), b"fresh database");
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn refresh_replaces_previous_database() {
        let folder = tempfile::tempdir().unwrap();
        let db = utf8(folder.path().join("GeoLite2-City.mmdb"));
        fs::write(&db, b"old database").unwrap();
        let downloader = FakeDownloader {
            payload: gzip(b"new database"),
        };

        DatabaseMaintainer::new(URL, &db, &downloader).refresh().unwrap();

        assert_eq!(fs::read(&db).unwrap(), b"new database");
        // Only the database itself is left in its folder.
        assert_eq!(fs::read_dir(folder.path()).unwrap().count(), 1);
    }

    #[test]
    fn install_over_existing_database() {
        let folder = tempfile::tempdir().unwrap();
        let db = utf8(folder.path().join("GeoLite2-City.mmdb"));
        let new_database = folder.path().join("incoming.mmdb");
        fs::write(&db, b"old database").unwrap();
        fs::write(&new_database, b"new database").unwrap();

        install_database(&new_database, &db).unwrap();

        assert_eq!(fs::read(&db).unwrap(), b"new database");
        assert_eq!(fs::read_dir(folder.path()).unwrap().count(), 2);
    }

    #[test]
    fn failed_install_leaves_target_alone() {
        let folder = tempfile::tempdir().unwrap();
        let db = utf8(folder.path().join("GeoLite2-City.mmdb"));
        // A non-empty directory in the way cannot be renamed over.
        fs::create_dir(&db).unwrap();
        fs::write(db.join("keep"), b"kept").unwrap();
        let new_database = tempfile::NamedTempFile::new().unwrap();

        assert!(install_database(new_database.path(), &db).is_err());

        assert_eq!(fs::read(db.join("keep")).unwrap(), b"kept");
        // The staged copy is cleaned up.
        assert_eq!(fs::read_dir(folder.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_download_keeps_old_database_and_cleans_up() {
        let folder = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let db = utf8(folder.path().join("GeoLite2-City.mmdb"));
        fs::write(&db, b"old database").unwrap();

        let err = DatabaseMaintainer::new(URL, &db, &FailingDownloader)
            .with_scratch_root(scratch.path())
            .refresh()
            .unwrap_err();

        assert!(matches!(err, Error::Download { .. }));
        assert_eq!(fs::read(&db).unwrap(), b"old database");
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn corrupt_archive_keeps_old_database() {
        let folder = tempfile::tempdir().unwrap();
        let db = utf8(folder.path().join("GeoLite2-City.mmdb"));
        fs::write(&db, b"old database").unwrap();
        let downloader = FakeDownloader {
            payload: b"this is not gzip".to_vec(),
        };

        assert!(DatabaseMaintainer::new(URL, &db, &downloader)
            .refresh()
            .is_err());
        assert_eq!(fs::read(&db).unwrap(), b"old database");
    }

    #[test]
    fn archive_without_database_extension_is_rejected() {
        let folder = tempfile::tempdir().unwrap();
        let db = utf8(folder.path().join("GeoLite2-City.mmdb"));
        let downloader = FakeDownloader {
            payload: gzip(b"data"),
        };
        let url = "http://localhost:2014/GeoLite2-City.tar.gz";

        let err = DatabaseMaintainer::new(url, &db, &downloader)
            .refresh()
            .unwrap_err();

        assert!(matches!(err, Error::NotValidDatabaseFileFound { .. }));
        assert!(!db.exists());
    }

    #[test]
    fn find_compressed_file_in_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_compressed_file(dir.path()),
            Err(Error::CompressedFileNotFound { .. })
        ));
        fs::write(dir.path().join("GeoLite2-City.mmdb.gz"), gzip(b"")).unwrap();
        assert_eq!(
            find_compressed_file(dir.path()).unwrap(),
            dir.path().join("GeoLite2-City.mmdb.gz")
        );
    }

    #[test]
    fn decompress_empty_dir_reports_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let err = decompress_archive(dir.path()).unwrap_err();
        assert!(err.to_string().contains("problem decompressing updated database"));
    }

    #[test]
    fn find_database_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_database_file(dir.path(), DATABASE_EXTENSION),
            Err(Error::NotValidDatabaseFileFound { .. })
        ));
        fs::write(dir.path().join("GeoLite2-City.mmdb"), b"").unwrap();
        assert_eq!(
            find_database_file(dir.path(), DATABASE_EXTENSION).unwrap(),
            dir.path().join("GeoLite2-City.mmdb")
        );
    }

    #[test]
    fn decompress_uses_inner_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = GzBuilder::new()
            .filename("Inner-Name.mmdb")
            .write(Vec::new(), Compression::default());
        encoder.write_all(b"payload").unwrap();
        fs::write(dir.path().join("download.gz"), encoder.finish().unwrap()).unwrap();

        let out = decompress_archive(dir.path()).unwrap();

        assert_eq!(out, dir.path().join("Inner-Name.mmdb"));
        assert_eq!(fs::read(out).unwrap(), b"payload");
    }

    #[test]
    fn decompress_strips_gz_without_inner_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("GeoLite2-City.mmdb.gz"), gzip(b"payload")).unwrap();

        let out = decompress_archive(dir.path()).unwrap();

        assert_eq!(out, dir.path().join("GeoLite2-City.mmdb"));
    }

    #[test]
    fn uncompressed_name() {
        assert_eq!(
            uncompressed_file_name(Path::new("/home/dante/downloads/GeoLite2-City.mmdb.gz")),
            PathBuf::from("/home/dante/downloads/GeoLite2-City.mmdb")
        );
    }

    #[test]
    fn archive_name_falls_back_to_database_name() {
        let db = Utf8Path::new("/var/db/GeoLite2-City.mmdb");
        assert_eq!(archive_file_name(URL, db), "GeoLite2-City.mmdb.gz");
        assert_eq!(
            archive_file_name("https://example.com/download?edition=city", db),
            "GeoLite2-City.mmdb.gz"
        );
    }

    #[test]
    fn staleness_follows_update_interval() {
        let folder = tempfile::tempdir().unwrap();
        let db = utf8(folder.path().join("GeoLite2-City.mmdb"));
        fs::write(&db, b"db").unwrap();
        let today = Local::now().date_naive();

        set_age(&db, 40);
        assert!(is_stale(&db, 35, today));

        set_age(&db, 10);
        assert!(!is_stale(&db, 35, today));
    }

    #[test]
    fn missing_database_is_stale() {
        let folder = tempfile::tempdir().unwrap();
        let db = utf8(folder.path().join("absent.mmdb"));
        assert!(is_stale(&db, 35, Local::now().date_naive()));
        assert!(matches!(
            last_modification(&db),
            Err(Error::LocalDatabaseNotFound { .. })
        ));
    }
}
