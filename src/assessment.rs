//! Listening-level assessment from a learner's answer history.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{CoachError, Result};
use crate::extractor::content_to_value;
use crate::gateway::ExternalCallGateway;
use crate::prompts::{self, LEVEL_SYSTEM_PROMPT};
use crate::schemas::{LevelAssessment, UserAnswer};

pub struct ListeningLevelAssessor {
    gateway: Arc<ExternalCallGateway>,
}

impl ListeningLevelAssessor {
    pub fn new(gateway: Arc<ExternalCallGateway>) -> Self {
        Self { gateway }
    }

    pub async fn evaluate(&self, answers: &[UserAnswer]) -> LevelAssessment {
        info!("Assessing listening level from {} answers", answers.len());
        match self.try_evaluate(answers).await {
            Ok(assessment) => {
                info!("Listening level assessed as {}", assessment.level);
                assessment
            }
            Err(e) => {
                warn!("Level assessment unusable ({}), using default", e);
                default_assessment()
            }
        }
    }

    async fn try_evaluate(&self, answers: &[UserAnswer]) -> Result<LevelAssessment> {
        let prompt = prompts::level_prompt(answers);
        let result = self.gateway.invoke(&prompt, Some(LEVEL_SYSTEM_PROMPT)).await;
        let content = result.first_content().ok_or_else(|| CoachError::JsonExtraction {
            message: "empty content".to_string(),
        })?;
        let parsed = content_to_value(content)?;
        let assessment: LevelAssessment = serde_json::from_value(parsed)?;
        if assessment.level.trim().is_empty() {
            return Err(CoachError::SchemaValidation {
                missing: vec!["level".to_string()],
            });
        }
        Ok(assessment)
    }
}

pub fn default_assessment() -> LevelAssessment {
    LevelAssessment {
        level: "CET4".to_string(),
        recommended_material: "cet4_001".to_string(),
        analysis: "无法获取完整分析，建议从基础难度开始训练。".to_string(),
    }
}
