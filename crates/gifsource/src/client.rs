use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

/// Listing requests that take longer than this are treated as failures; the
/// wall then starts empty instead of hanging at boot.
const LISTING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub api_base: Url,
    pub count: usize,
    pub safe: bool,
}

impl FeedConfig {
    pub fn new(api_base: &str, count: usize, safe: bool) -> Result<Self> {
        let trimmed = api_base.trim();
        if trimmed.is_empty() {
            bail!("gif api base url must not be empty");
        }
        // a trailing slash keeps Url::join from eating the last path segment
        let normalized = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        Ok(Self {
            api_base: Url::parse(&normalized)
                .with_context(|| format!("invalid gif api base url '{trimmed}'"))?,
            count,
            safe,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FeedClient {
    http: Client,
    config: FeedConfig,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Result<Self> {
        let http = Client::builder().timeout(LISTING_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    /// Fetches the candidate URL list. Queried once per session; relative
    /// paths in the response are resolved against the api base.
    pub fn fetch_urls(&self) -> Result<Vec<String>> {
        let url = self.listing_url()?;
        debug!(%url, "requesting gif listing");
        let response = self
            .http
            .get(url.clone())
            .send()
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .context("gif listing returned an error status")?;
        let body = response.text()?;

        // Try to decode the happy path first.
        if let Ok(payload) = serde_json::from_str::<GifsResponse>(&body) {
            return payload
                .urls
                .iter()
                .map(|src| self.resolve(src))
                .collect();
        }
        // Then the error shape the backend emits.
        if let Ok(err) = serde_json::from_str::<ApiError>(&body) {
            bail!("gif listing error: {} (while requesting {url})", err.error);
        }
        let snippet = body.chars().take(200).collect::<String>();
        bail!("unexpected gif listing response; could not find 'urls' field. First 200 bytes: {snippet}")
    }

    fn listing_url(&self) -> Result<Url> {
        let mut url = self.config.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("invalid gif api base url"))?;
            segments.pop_if_empty();
            segments.push("api");
            segments.push("gifs");
        }
        url.set_query(Some(&format!(
            "n={}&safe={}",
            self.config.count,
            if self.config.safe { "yes" } else { "no" }
        )));
        Ok(url)
    }

    fn resolve(&self, src: &str) -> Result<String> {
        if src.starts_with("http://") || src.starts_with("https://") {
            return Ok(src.to_string());
        }
        let trimmed = src.trim_start_matches('/');
        Ok(self
            .config
            .api_base
            .join(trimmed)
            .with_context(|| format!("joining gif url '{src}'"))?
            .to_string())
    }
}

#[derive(Debug, Deserialize)]
struct GifsResponse {
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(alias = "Error")]
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str, safe: bool) -> FeedClient {
        FeedClient::new(FeedConfig::new(base, 25, safe).unwrap()).unwrap()
    }

    #[test]
    fn listing_url_carries_count_and_safety() {
        let naughty = client("http://localhost:3001", false);
        assert_eq!(
            naughty.listing_url().unwrap().as_str(),
            "http://localhost:3001/api/gifs?n=25&safe=no"
        );

        // trailing slash on the base makes no difference
        let safe = client("http://localhost:3001/", true);
        assert_eq!(
            safe.listing_url().unwrap().as_str(),
            "http://localhost:3001/api/gifs?n=25&safe=yes"
        );
    }

    #[test]
    fn relative_paths_resolve_against_the_base() {
        let client = client("http://localhost:3001", true);
        assert_eq!(
            client.resolve("/api/gif/dancing_baby.gif").unwrap(),
            "http://localhost:3001/api/gif/dancing_baby.gif"
        );
        assert_eq!(
            client.resolve("https://cdn.example.net/x.gif").unwrap(),
            "https://cdn.example.net/x.gif"
        );
    }

    #[test]
    fn response_shapes_decode() {
        let payload: GifsResponse =
            serde_json::from_str(r#"{"urls": ["/api/gif/a.gif", "/api/gif/b.gif"]}"#).unwrap();
        assert_eq!(payload.urls.len(), 2);

        let err: ApiError = serde_json::from_str(r#"{"error": "File not found"}"#).unwrap();
        assert_eq!(err.error, "File not found");
        let err: ApiError = serde_json::from_str(r#"{"Error": "File not found"}"#).unwrap();
        assert_eq!(err.error, "File not found");
    }

    #[test]
    fn empty_base_is_rejected() {
        assert!(FeedConfig::new("  ", 10, true).is_err());
    }
}
