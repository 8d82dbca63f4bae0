//! AI classification relay.
//!
//! The browser cannot call the text-generation API directly (CORS), so it
//! posts `{apiKey, requestBody}` here and gets the upstream answer back
//! untouched. Nothing in this module looks inside the model output.

use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Missing API Key")]
    MissingApiKey,
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

/// Body accepted by the relay endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub request_body: Value,
}

/// Upstream status and raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Forwards classification requests to the configured upstream.
#[derive(Clone)]
pub struct AiRelay {
    client: Client,
    endpoint: String,
}

impl AiRelay {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// POST the request body upstream with the caller's key as bearer token.
    ///
    /// No retries; transport failures surface as [`RelayError::Transport`].
    pub async fn relay(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        let api_key = request.api_key.trim();
        if api_key.is_empty() {
            warn!("ai_relay_missing_api_key");
            return Err(RelayError::MissingApiKey);
        }

        info!(
            endpoint = %self.endpoint,
            api_key_length = api_key.len(),
            "ai_relay_request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::AUTHORIZATION, format!("Bearer {}", api_key))
            .json(&request.request_body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        info!(status = status, body_length = body.len(), "ai_relay_response");

        Ok(RelayResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn relay_to(server: &MockServer) -> AiRelay {
        AiRelay::new(Client::new(), format!("{}/generation", server.uri()))
    }

    #[tokio::test]
    async fn test_relay_forwards_key_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generation"))
            .and(header_eq("authorization", "Bearer sk-test"))
            .and(body_json(json!({"model": "qwen-turbo"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"output":{"text":"ok"}}"#))
            .expect(1)
            .mount(&server)
            .await;

        let response = relay_to(&server)
            .relay(RelayRequest {
                api_key: "sk-test".to_string(),
                request_body: json!({"model": "qwen-turbo"}),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"output":{"text":"ok"}}"#.to_vec());
    }

    #[tokio::test]
    async fn test_relay_passes_upstream_errors_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"code":"InvalidApiKey"}"#))
            .mount(&server)
            .await;

        let response = relay_to(&server)
            .relay(RelayRequest {
                api_key: "sk-bad".to_string(),
                request_body: json!({}),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.body, br#"{"code":"InvalidApiKey"}"#.to_vec());
    }

    #[tokio::test]
    async fn test_relay_requires_api_key() {
        let relay = AiRelay::new(Client::new(), "http://127.0.0.1:9/unused");
        let err = relay
            .relay(RelayRequest {
                api_key: "  ".to_string(),
                request_body: json!({}),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_relay_transport_failure() {
        // Bind then drop a listener so the port is known to be closed.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let relay = AiRelay::new(Client::new(), format!("http://{}/generation", addr));
        let err = relay
            .relay(RelayRequest {
                api_key: "sk-test".to_string(),
                request_body: json!({}),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Transport(_)));
    }
}
