//! Identity-linking backend client
//!
//! Associates a Discord identity with the connected wallet address. The
//! backend is an opaque collaborator: we POST JSON and read one identifier
//! field back.

use crate::config::IdentityConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body sent when linking an identity to an address
#[derive(Debug, Clone, Serialize)]
pub struct LinkRequest<'a> {
    pub discord_id: &'a str,
    pub ethereum_address: &'a str,
}

/// Backend response. The identifier field name differs between deployments.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityResponse {
    #[serde(default, alias = "user_id", alias = "id")]
    pub discord_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// HTTP client for the identity backend
#[derive(Debug, Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl IdentityClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint: url::Url = endpoint
            .parse()
            .map_err(|e| Error::Config(format!("Invalid identity endpoint '{}': {}", endpoint, e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    /// `Ok(None)` if no endpoint is configured
    pub fn from_config(config: &IdentityConfig) -> Result<Option<Self>> {
        config.endpoint.as_deref().map(Self::new).transpose()
    }

    async fn post<B: Serialize + ?Sized>(&self, body: &B) -> Result<IdentityResponse> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Identity(format!("HTTP {}: {}", status, text)));
        }

        Ok(response.json().await?)
    }

    /// Ask the backend which Discord user this browser session belongs to
    pub async fn resolve_discord_id(&self) -> Result<String> {
        let response = self.post(&Map::new()).await?;
        response
            .discord_id
            .ok_or_else(|| Error::Identity("Response carried no user identifier".to_string()))
    }

    /// Link a Discord user to a wallet address
    pub async fn link(&self, discord_id: &str, ethereum_address: &str) -> Result<IdentityResponse> {
        tracing::info!(discord_id, ethereum_address, "Linking identity to wallet");
        let response = self
            .post(&LinkRequest {
                discord_id,
                ethereum_address,
            })
            .await?;
        tracing::debug!(user = ?response.discord_id, "Identity backend acknowledged link");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn link_posts_expected_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/main").json_body(json!({
                    "discord_id": "80351110224678912",
                    "ethereum_address": "0xabc"
                }));
                then.status(200)
                    .json_body(json!({"user_id": "80351110224678912", "created": true}));
            })
            .await;

        let client = IdentityClient::new(&server.url("/api/main")).unwrap();
        let response = client.link("80351110224678912", "0xabc").await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.discord_id.as_deref(), Some("80351110224678912"));
        assert_eq!(response.extra["created"], json!(true));
    }

    #[tokio::test]
    async fn resolve_reads_discord_id() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).json_body(json!({}));
                then.status(200).json_body(json!({"discord_id": "42"}));
            })
            .await;

        let client = IdentityClient::new(&server.base_url()).unwrap();
        assert_eq!(client.resolve_discord_id().await.unwrap(), "42");
    }

    #[tokio::test]
    async fn resolve_without_identifier_fails() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({"ok": true}));
            })
            .await;

        let client = IdentityClient::new(&server.base_url()).unwrap();
        let err = client.resolve_discord_id().await.unwrap_err();
        assert!(matches!(err, Error::Identity(_)));
    }

    #[tokio::test]
    async fn http_failure_is_identity_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(500).body("firestore unavailable");
            })
            .await;

        let client = IdentityClient::new(&server.base_url()).unwrap();
        let err = client.link("1", "0xabc").await.unwrap_err();
        assert!(err.to_string().contains("firestore unavailable"));
    }

    #[test]
    fn from_config_without_endpoint() {
        assert!(IdentityClient::from_config(&IdentityConfig::default())
            .unwrap()
            .is_none());
    }
}
