pub mod assessment;
pub mod clients;
pub mod config;
pub mod deserializers;
pub mod error;
pub mod extractor;
pub mod feedback;
pub mod gateway;
pub mod mock;
pub mod prompts;
pub mod recommendation;
pub mod schemas;
pub mod speaking;
pub mod topics;

use std::sync::Arc;

use serde_json::Value;

use crate::assessment::ListeningLevelAssessor;
use crate::clients::ChatTransport;
use crate::config::Config;
use crate::feedback::FeedbackSynthesizer;
use crate::gateway::ExternalCallGateway;
use crate::recommendation::RecommendationPipeline;
use crate::schemas::{
    FeedbackReport, LevelAssessment, Material, MaterialCatalogEntry, RecommendationOutcome,
    SpeakingEvaluation, SpeakingTaskSet, UserAnswer,
};
use crate::speaking::{SpeakingEvaluator, SpeakingTaskSynthesizer};

/// Every coaching operation wired to one shared gateway.
pub struct ListeningCoach {
    feedback: FeedbackSynthesizer,
    speaking: SpeakingTaskSynthesizer,
    evaluator: SpeakingEvaluator,
    assessor: ListeningLevelAssessor,
    recommendations: RecommendationPipeline,
}

impl ListeningCoach {
    /// Coach backed by the HTTP transport described by `config.gateway`
    pub fn from_config(config: &Config) -> error::Result<Self> {
        let gateway = ExternalCallGateway::from_config(&config.gateway)?;
        Ok(Self::with_gateway(config, Arc::new(gateway)))
    }

    pub fn with_transport(config: &Config, transport: Arc<dyn ChatTransport>) -> Self {
        let gateway = ExternalCallGateway::new(config.gateway.clone(), transport);
        Self::with_gateway(config, Arc::new(gateway))
    }

    fn with_gateway(config: &Config, gateway: Arc<ExternalCallGateway>) -> Self {
        let synthesis = &config.synthesis;
        Self {
            feedback: FeedbackSynthesizer::new(gateway.clone(), synthesis.feedback_attempts),
            speaking: SpeakingTaskSynthesizer::new(gateway.clone(), synthesis.speaking_attempts),
            evaluator: SpeakingEvaluator::new(gateway.clone()),
            assessor: ListeningLevelAssessor::new(gateway.clone()),
            recommendations: RecommendationPipeline::new(gateway, synthesis.clone()),
        }
    }

    pub async fn learning_feedback(
        &self,
        material: &Material,
        answers: &[UserAnswer],
        transcript: Option<&Value>,
    ) -> FeedbackReport {
        self.feedback.generate(material, answers, transcript).await
    }

    pub async fn speaking_tasks(
        &self,
        material: &Material,
        answers: Option<&[UserAnswer]>,
        score: Option<u32>,
    ) -> SpeakingTaskSet {
        self.speaking.generate(material, answers, score).await
    }

    pub async fn evaluate_speaking(
        &self,
        transcription: &str,
        question: &str,
        reference: Option<&str>,
    ) -> SpeakingEvaluation {
        self.evaluator.evaluate(transcription, question, reference).await
    }

    pub async fn assess_level(&self, answers: &[UserAnswer]) -> LevelAssessment {
        self.assessor.evaluate(answers).await
    }

    pub async fn recommend(
        &self,
        answers: &[UserAnswer],
        catalog: &[MaterialCatalogEntry],
    ) -> RecommendationOutcome {
        self.recommendations.run(answers, catalog).await
    }
}
