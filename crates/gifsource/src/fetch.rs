use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::debug;
use wallgrid::{decode_image, FetchError, FetchImage, GifImage};

/// Upper bound on any single gif download. Without it a hung connection
/// would pin its queue slot and its row forever.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(20);

/// Downloads and decodes gifs on the queue's worker threads.
pub struct HttpImageFetcher {
    http: Client,
}

impl HttpImageFetcher {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .context("failed to construct gif download client")?;
        Ok(Self { http })
    }
}

impl FetchImage for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Result<GifImage, FetchError> {
        let http_error = |reason: String| FetchError::Http {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .send()
            .map_err(|err| http_error(err.to_string()))?
            .error_for_status()
            .map_err(|err| http_error(err.to_string()))?;
        let bytes = response
            .bytes()
            .map_err(|err| http_error(err.to_string()))?;
        debug!(%url, bytes = bytes.len(), "downloaded gif");

        decode_image(&bytes).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
