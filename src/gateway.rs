//! Resilient call layer in front of the generative service.
//!
//! `invoke` is total: every attempt failure (transport error, timeout, non-2xx status,
//! empty or non-JSON body, no usable choice) is retried with a fixed delay, and once
//! the attempt budget is spent the prompt is answered from the canned table in
//! [`crate::mock`].

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::clients::deepseek::DeepSeekTransport;
use crate::clients::traits::{CallResult, ChatMessage, ChatRequest, ChatTransport, TransportReply};
use crate::config::GatewayConfig;
use crate::error::{CoachError, Result};
use crate::mock;

pub struct ExternalCallGateway {
    transport: Arc<dyn ChatTransport>,
    config: GatewayConfig,
}

/// First `max` characters of `text`, for log lines
pub fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push_str("...");
    }
    out
}

impl ExternalCallGateway {
    pub fn new(config: GatewayConfig, transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport, config }
    }

    /// Gateway backed by the reqwest transport described by `config`
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let transport = DeepSeekTransport::new(config)?;
        Ok(Self::new(config.clone(), Arc::new(transport)))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn build_request(&self, prompt: &str, system_prompt: Option<&str>) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));
        ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Never fails; the result always holds at least one non-empty choice.
    pub async fn invoke(&self, prompt: &str, system_prompt: Option<&str>) -> CallResult {
        match self.try_invoke(prompt, system_prompt).await {
            Ok(result) => result,
            Err(e) => {
                error!("All attempts failed ({}), serving canned payload", e);
                mock::mock_response(prompt)
            }
        }
    }

    async fn try_invoke(&self, prompt: &str, system_prompt: Option<&str>) -> Result<CallResult> {
        let request = self.build_request(prompt, system_prompt);
        let attempts = self.config.max_attempts.max(1);
        let mut last_err: Option<CoachError> = None;

        for attempt in 1..=attempts {
            debug!(
                "Sending prompt to generative service: {} (attempt {}/{})",
                preview(prompt, 100),
                attempt,
                attempts
            );
            match self.attempt(&request).await {
                Ok(result) => {
                    info!("Generative service answered on attempt {}/{}", attempt, attempts);
                    return Ok(result);
                }
                Err(e) if !e.is_retryable() => {
                    warn!("Attempt {}/{} failed without retry: {}", attempt, attempts, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                    last_err = Some(e);
                    if attempt < attempts {
                        debug!("Waiting {:?} before retrying", self.config.retry_delay());
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CoachError::Internal {
            message: "no attempt was made".to_string(),
        }))
    }

    async fn attempt(&self, request: &ChatRequest) -> Result<CallResult> {
        let timeout = self.config.attempt_timeout();
        let reply = match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(reply) => reply?,
            Err(_) => {
                return Err(CoachError::Timeout {
                    operation: "chat completion request".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };
        parse_reply(reply)
    }
}

/// Classifies a raw HTTP reply as a usable completion or a retryable failure
pub fn parse_reply(reply: TransportReply) -> Result<CallResult> {
    if !(200..300).contains(&reply.status) {
        return Err(CoachError::MalformedResponse {
            message: format!("status {}: {}", reply.status, preview(&reply.body, 200)),
        });
    }
    if reply.body.trim().is_empty() {
        return Err(CoachError::MalformedResponse {
            message: "empty body".to_string(),
        });
    }
    let result: CallResult =
        serde_json::from_str(&reply.body).map_err(|e| CoachError::MalformedResponse {
            message: format!("body is not JSON: {}", e),
        })?;
    if !result.has_content() {
        return Err(CoachError::MalformedResponse {
            message: "no choice with non-empty content".to_string(),
        });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: u16, body: &str) -> TransportReply {
        TransportReply {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn parse_reply_rejects_each_failure_shape() {
        assert!(parse_reply(reply(500, "{}")).is_err());
        assert!(parse_reply(reply(200, "   ")).is_err());
        assert!(parse_reply(reply(200, "<html>")).is_err());
        assert!(parse_reply(reply(200, r#"{"choices": []}"#)).is_err());
        assert!(parse_reply(reply(200, r#"{"choices": [{"message": {"content": ""}}]}"#)).is_err());
    }

    #[test]
    fn parse_reply_accepts_string_and_object_content() {
        let r = parse_reply(reply(200, r#"{"choices": [{"message": {"content": "hi"}}]}"#)).unwrap();
        assert_eq!(r.content_text(), "hi");
        let r = parse_reply(reply(
            200,
            r#"{"choices": [{"message": {"content": {"level": "CET4"}}}]}"#,
        ))
        .unwrap();
        assert!(r.first_content().unwrap().is_object());
    }

    #[test]
    fn request_puts_system_message_first() {
        let gw = ExternalCallGateway::new(
            GatewayConfig::default(),
            Arc::new(crate::clients::OfflineTransport),
        );
        let req = gw.build_request("u", Some("s"));
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(req.messages[1].role, "user");
        assert_eq!(req.model, "deepseek-chat");
        let req = gw.build_request("u", None);
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        assert_eq!(preview("分析用户", 2), "分析...");
        assert_eq!(preview("ab", 5), "ab");
    }
}
