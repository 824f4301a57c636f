use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body of an OpenAI-compatible `/chat/completions` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Raw HTTP outcome; the gateway decides whether it counts as a success.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChoiceMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Usually a string, occasionally an already-structured JSON value
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    #[serde(default)]
    pub message: ChoiceMessage,
}

impl Choice {
    pub fn has_content(&self) -> bool {
        match &self.message.content {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            _ => true,
        }
    }
}

/// Parsed completion: one or more choices, each carrying content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallResult {
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Set when the gateway served a canned payload instead of a model reply.
    #[serde(skip)]
    pub is_mock: bool,
}

impl CallResult {
    pub fn from_content(content: Value) -> Self {
        Self {
            choices: vec![Choice {
                message: ChoiceMessage {
                    role: Some("assistant".to_string()),
                    content,
                },
            }],
            is_mock: false,
        }
    }

    pub fn has_content(&self) -> bool {
        self.choices.iter().any(Choice::has_content)
    }

    /// Content of the first non-empty choice
    pub fn first_content(&self) -> Option<&Value> {
        self.choices
            .iter()
            .find(|c| c.has_content())
            .map(|c| &c.message.content)
    }

    /// First non-empty content as text; structured content is rendered as JSON
    pub fn content_text(&self) -> String {
        match self.first_content() {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<TransportReply>;
}
