//! Scripted in-memory transport shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use listening_coach::ListeningCoach;
use listening_coach::clients::{ChatRequest, ChatTransport, TransportReply};
use listening_coach::config::Config;
use listening_coach::error::{CoachError, Result};
use listening_coach::gateway::ExternalCallGateway;

pub enum Step {
    Reply(u16, String),
    Fail,
    Hang,
}

/// A 200 reply whose single choice carries `content`
pub fn content(text: &str) -> Step {
    Step::Reply(200, envelope(text))
}

pub fn envelope(text: &str) -> String {
    json!({"choices": [{"message": {"role": "assistant", "content": text}}]}).to_string()
}

/// Plays back `steps` in order; once they run out every request fails.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn system_prompts(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                r.messages
                    .iter()
                    .find(|m| m.role == "system")
                    .map(|m| m.content.clone())
            })
            .collect()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportReply> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(status, body)) => Ok(TransportReply { status, body }),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(CoachError::Network {
                    message: "hung connection finally closed".to_string(),
                })
            }
            Some(Step::Fail) | None => Err(CoachError::Network {
                message: "connection refused".to_string(),
            }),
        }
    }
}

pub fn gateway(transport: Arc<ScriptedTransport>) -> ExternalCallGateway {
    ExternalCallGateway::new(Config::default().gateway, transport)
}

pub fn coach(transport: Arc<ScriptedTransport>) -> ListeningCoach {
    ListeningCoach::with_transport(&Config::default(), transport)
}
