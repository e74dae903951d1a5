//! Pub/Sub REST publisher.
//!
//! Each call to [`Sink::publish`] sends one `topics.publish` request carrying
//! a single message. The payload is base64 encoded into the `data` field and
//! otherwise untouched; no attributes or ordering keys are set.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

use super::{auth::TokenSource, config::Config, error::SinkError, sink::Sink};

#[derive(Serialize)]
struct PublishRequest<'a> {
    messages: [PubsubMessage<'a>; 1],
}

#[derive(Serialize)]
struct PubsubMessage<'a> {
    data: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Publishes to Google Cloud Pub/Sub over HTTPS.
///
/// Cheap to share: the underlying `reqwest::Client` pools connections and
/// the token source caches credentials.
#[derive(Debug)]
pub struct PubSubSink {
    http: reqwest::Client,
    endpoint: String,
    auth: TokenSource,
}

impl PubSubSink {
    /// Builds the HTTP client and selects the credential source.
    ///
    /// # Errors
    /// `SinkError::ConfigError` if validation fails, `SinkError::Setup` if
    /// the HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self, SinkError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SinkError::Setup(format!("Failed to build HTTP client: {e}")))?;

        let auth = TokenSource::from_config(config, http.clone());
        let endpoint = config.effective_endpoint();
        info!("Pub/Sub sink ready: endpoint={} auth={}", endpoint, auth.kind());

        Ok(Self {
            http,
            endpoint,
            auth,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn publish_url(&self, destination: &str) -> String {
        format!("{}/v1/{}:publish", self.endpoint, destination)
    }
}

#[async_trait]
impl Sink for PubSubSink {
    async fn publish(&self, destination: &str, payload: Bytes) -> Result<String, SinkError> {
        let data = STANDARD.encode(&payload);
        let body = PublishRequest {
            messages: [PubsubMessage { data: &data }],
        };

        let mut request = self.http.post(self.publish_url(destination)).json(&body);
        if let Some(token) = self.auth.token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let parsed: PublishResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Decode(e.to_string()))?;

        let message_id = parsed
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| SinkError::Decode("response carried no message id".into()))?;

        debug!("Published {} bytes to {} as {}", payload.len(), destination, message_id);
        Ok(message_id)
    }
}
