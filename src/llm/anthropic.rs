use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Completion, CompletionBackend, CompletionRequest};
use crate::config::AiParserConfig;
use crate::error::RemoteError;

/// Error bodies longer than this are cut in messages.
const MAX_ERROR_BODY: usize = 500;

/// Messages-API transport: one JSON POST per request.
pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    text: Option<String>,
}

impl AnthropicBackend {
    pub fn new(config: &AiParserConfig) -> Result<Self, RemoteError> {
        if config.api_key.trim().is_empty() {
            return Err(RemoteError::NotConfigured(
                "API key is missing. Set AI_API_KEY or ai.api_key in the config file".into(),
            ));
        }
        if config.api_endpoint.trim().is_empty() {
            return Err(RemoteError::NotConfigured("API endpoint is empty".into()));
        }

        Ok(Self {
            client: Client::new(),
            api_key: config.api_key.trim().to_string(),
            model: config.model.clone(),
            endpoint: config.api_endpoint.trim().to_string(),
        })
    }

    async fn send(&self, request: &CompletionRequest) -> Result<Completion, RemoteError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.user,
            }],
        };
        let secs = request.timeout.as_secs();

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::from_transport(&e, secs))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body: error_text.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let response: MessagesResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.kind.is_empty() || block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.trim().is_empty() {
            return Err(RemoteError::InvalidResponse("no text content in response".into()));
        }
        Ok(Completion {
            text,
            stop_reason: response.stop_reason,
        })
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, RemoteError> {
        // The timer covers connect, upload and the whole response body.
        match tokio::time::timeout(request.timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(request.timeout.as_secs())),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_not_configured() {
        let config = AiParserConfig::default();
        assert!(matches!(AnthropicBackend::new(&config), Err(RemoteError::NotConfigured(_))));
    }

    #[test]
    fn test_response_envelope() {
        let raw = r#"{"content":[{"type":"text","text":"{\"trails\":"},{"type":"text","text":"[]}"}],"stop_reason":"max_tokens"}"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.stop_reason.as_deref(), Some("max_tokens"));
        let text: String = response.content.into_iter().filter_map(|b| b.text).collect();
        assert_eq!(text, r#"{"trails":[]}"#);
    }

    #[tokio::test]
    async fn test_refused_connection_is_reported() {
        let config = AiParserConfig {
            enabled: true,
            api_endpoint: "http://127.0.0.1:9/v1/messages".into(),
            api_key: "sk-test".into(),
            model: "m".into(),
        };
        let backend = AnthropicBackend::new(&config).unwrap();
        let request = CompletionRequest {
            system: String::new(),
            user: "ping".into(),
            max_tokens: 8,
            timeout: std::time::Duration::from_secs(5),
        };
        let err = backend.complete(&request).await.unwrap_err();
        assert!(
            matches!(err, RemoteError::ConnectionRefused(_) | RemoteError::Network(_) | RemoteError::Timeout(_)),
            "{:?}",
            err
        );
    }
}
