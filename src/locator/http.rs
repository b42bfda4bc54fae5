//! HTTP plumbing shared by the locators.
//!
//! The download side sits behind [`Downloader`] so the database maintenance
//! cycle can run against an in-memory fake in tests.

use std::io::{self, Write};
use std::time::Duration;

use tracing::debug;
use ureq::Agent;

use crate::error::{Error, Result};

/// How long to wait for a server to accept a connection.
const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Fetches a remote resource into a writer.
pub trait Downloader {
    /// Stream the body found at `url` into `dest`, returning the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Download`] for transport or HTTP status failures and
    /// [`Error::Io`] when writing to `dest` fails.
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64>;
}

/// Blocking downloader backed by a `ureq` agent.
#[derive(Clone)]
pub struct HttpDownloader {
    agent: Agent,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        // Only the connect phase is bounded: database archives are tens of
        // megabytes and may take a while on slow links.
        let agent = Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(CONNECT_TIMEOUT_SECS)))
            .build()
            .into();
        Self { agent }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
        debug!("downloading {}", url);
        let response = self.agent.get(url).call().map_err(|e| Error::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut body = response.into_body().into_reader();
        let written = io::copy(&mut body, dest)?;
        debug!("downloaded {} bytes from {}", written, url);
        Ok(written)
    }
}
