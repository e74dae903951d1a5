//! Access tokens for the Pub/Sub API.

use std::time::Duration;

use serde::Deserialize;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

use super::{config::Config, error::SinkError};

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Where bearer tokens come from.
#[derive(Debug)]
pub enum TokenSource {
    /// Emulator: requests are sent without authorization.
    Anonymous,

    /// Token supplied through configuration.
    Static(String),

    /// Token minted by the metadata server, cached until shortly before it
    /// expires.
    Metadata(MetadataToken),
}

impl TokenSource {
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        if config.emulator_host.as_deref().is_some_and(|h| !h.is_empty()) {
            return TokenSource::Anonymous;
        }
        match config.access_token.as_deref() {
            Some(token) if !token.is_empty() => TokenSource::Static(token.to_string()),
            _ => TokenSource::Metadata(MetadataToken::new(http, &config.metadata_endpoint)),
        }
    }

    /// Token to attach to the next request, if any.
    pub async fn token(&self) -> Result<Option<String>, SinkError> {
        match self {
            TokenSource::Anonymous => Ok(None),
            TokenSource::Static(token) => Ok(Some(token.clone())),
            TokenSource::Metadata(source) => source.token().await.map(Some),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TokenSource::Anonymous => "anonymous",
            TokenSource::Static(_) => "static token",
            TokenSource::Metadata(_) => "metadata server",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Metadata server token with caching.
#[derive(Debug)]
pub struct MetadataToken {
    http: reqwest::Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataToken {
    pub fn new(http: reqwest::Client, metadata_endpoint: &str) -> Self {
        Self {
            http,
            url: format!("{}{}", metadata_endpoint.trim_end_matches('/'), TOKEN_PATH),
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached token or fetches a new one.
    ///
    /// The lock is held across the fetch so concurrent publishes share one
    /// refresh.
    pub async fn token(&self) -> Result<String, SinkError> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.refresh_at {
                return Ok(entry.token.clone());
            }
        }

        let fresh = self.fetch().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(REFRESH_MARGIN);
        debug!("Fetched access token, valid for {}s", fresh.expires_in);

        let token = fresh.access_token;
        *cached = Some(CachedToken {
            token: token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token)
    }

    async fn fetch(&self) -> Result<TokenResponse, SinkError> {
        let response = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| SinkError::Auth(format!("metadata server unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Auth(format!(
                "metadata server returned status {}",
                status.as_u16()
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| SinkError::Auth(format!("invalid token response: {e}")))
    }
}
