use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::clients::traits::{ChatRequest, ChatTransport, TransportReply};
use crate::config::GatewayConfig;
use crate::error::{CoachError, Result};

/// reqwest transport for the DeepSeek (OpenAI-compatible) chat completions endpoint
pub struct DeepSeekTransport {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl DeepSeekTransport {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.attempt_timeout_secs.max(1)))
            .build()
            .map_err(|e| CoachError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ChatTransport for DeepSeekTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportReply> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(CoachError::Config {
                message: "DEEPSEEK_API_KEY not set".to_string(),
            });
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(TransportReply { status, body })
    }
}

/// Transport that refuses every request, forcing the canned/fallback path
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTransport;

#[async_trait]
impl ChatTransport for OfflineTransport {
    async fn send(&self, _request: &ChatRequest) -> Result<TransportReply> {
        Err(CoachError::Config {
            message: "offline mode".to_string(),
        })
    }
}
