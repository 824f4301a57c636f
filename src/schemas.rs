//! Data model shared by the synthesizers and the recommendation pipeline.
//!
//! Outputs serialize with the snake_case field names the platform's consumers read
//! (`mistakes_analysis`, `match_score`, ...). Inputs additionally accept the camelCase
//! spellings the web client sends (`isCorrect`, `questionTopic`, `materialId`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::deserializers::{
    de_lossy_string, de_match_score, de_number, de_option_id, de_score_0_100, de_string_list,
};

fn is_false(b: &bool) -> bool {
    !*b
}

/// A listening material as handed to the synthesizers. Unknown fields are kept so the
/// material can be embedded in prompts in full.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Material {
    #[serde(default, deserialize_with = "de_option_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, alias = "topics", deserialize_with = "de_string_list")]
    pub topic: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Material {
    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

/// One answered question from a listening exercise.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserAnswer {
    #[serde(
        default,
        alias = "questionId",
        deserialize_with = "de_option_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub question_id: Option<String>,
    #[serde(default, alias = "isCorrect", skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(default, alias = "questionTopic", skip_serializing_if = "Option::is_none")]
    pub question_topic: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserAnswer {
    /// Only an explicit `false` counts as wrong; a missing flag is treated as correct.
    pub fn is_wrong(&self) -> bool {
        self.is_correct == Some(false)
    }
}

pub fn wrong_answers(answers: &[UserAnswer]) -> Vec<&UserAnswer> {
    answers.iter().filter(|a| a.is_wrong()).collect()
}

/// Per-question narrative feedback, or one overall narrative when nothing was wrong.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MistakesAnalysis {
    PerQuestion(BTreeMap<String, String>),
    Overall(String),
}

impl MistakesAnalysis {
    pub fn is_mapping(&self) -> bool {
        matches!(self, MistakesAnalysis::PerQuestion(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackReport {
    pub vocabulary: Vec<String>,
    pub expressions: Vec<String>,
    pub background: String,
    pub structure: String,
    pub mistakes_analysis: MistakesAnalysis,
    /// Set when the report came from canned gateway output or the deterministic fallback
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_mock_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeakingTask {
    #[serde(rename = "type")]
    pub task_type: String,
    pub prompt: String,
    pub reference: String,
}

impl SpeakingTask {
    pub fn new(
        task_type: impl Into<String>,
        prompt: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            prompt: prompt.into(),
            reference: reference.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeakingTaskSet {
    pub questions: Vec<SpeakingTask>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_mock_data: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecommendationCriteria {
    #[serde(default, alias = "focusTags", deserialize_with = "de_string_list")]
    pub focus_tags: Vec<String>,
    #[serde(default, alias = "preferredTopics", deserialize_with = "de_string_list")]
    pub preferred_topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    #[serde(alias = "weakAreas", deserialize_with = "de_string_list")]
    pub weak_areas: Vec<String>,
    #[serde(alias = "strongAreas", deserialize_with = "de_string_list")]
    pub strong_areas: Vec<String>,
    #[serde(default, alias = "errorPatterns", deserialize_with = "de_lossy_string")]
    pub error_patterns: String,
    #[serde(alias = "performanceScore", deserialize_with = "de_score_0_100")]
    pub performance_score: u8,
    #[serde(default, alias = "recommendationCriteria")]
    pub recommendation_criteria: RecommendationCriteria,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationEntry {
    pub id: String,
    /// Mirror of `id` kept for older clients
    #[serde(rename = "materialId")]
    pub material_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "de_lossy_string")]
    pub reason: String,
    #[serde(default, alias = "matchScore", deserialize_with = "de_match_score")]
    pub match_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationOutcome {
    pub weak_areas: Vec<String>,
    pub strong_areas: Vec<String>,
    pub performance_score: u8,
    pub recommendations: Vec<RecommendationEntry>,
    pub improvement_suggestions: String,
}

/// Read-only catalog row supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MaterialCatalogEntry {
    #[serde(default, deserialize_with = "de_required_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, alias = "topics", deserialize_with = "de_string_list")]
    pub topic: Vec<String>,
}

impl MaterialCatalogEntry {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            difficulty: None,
            topic: Vec::new(),
        }
    }
}

fn de_required_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(de_option_id(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelAssessment {
    #[serde(deserialize_with = "de_lossy_string")]
    pub level: String,
    #[serde(default, alias = "recommendedMaterial", deserialize_with = "de_lossy_string")]
    pub recommended_material: String,
    #[serde(default, deserialize_with = "de_lossy_string")]
    pub analysis: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeakingEvaluation {
    #[serde(default, deserialize_with = "de_lossy_string")]
    pub pronunciation: String,
    #[serde(default, deserialize_with = "de_lossy_string")]
    pub fluency: String,
    #[serde(default, deserialize_with = "de_lossy_string")]
    pub content: String,
    #[serde(alias = "overallScore", deserialize_with = "de_number")]
    pub overall_score: f64,
    #[serde(default, alias = "improvementSuggestions", deserialize_with = "de_string_list")]
    pub improvement_suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answers_accept_both_casings() {
        let a: UserAnswer = serde_json::from_value(json!({
            "questionId": 2,
            "isCorrect": false,
            "questionTopic": "数字信息",
            "user_answer": "B"
        }))
        .unwrap();
        assert_eq!(a.question_id.as_deref(), Some("2"));
        assert!(a.is_wrong());
        assert_eq!(a.question_topic.as_deref(), Some("数字信息"));
        assert_eq!(a.extra.get("user_answer"), Some(&json!("B")));

        let b: UserAnswer = serde_json::from_value(json!({"question_id": "5"})).unwrap();
        assert!(!b.is_wrong());

        let both = [a, b];
        let wrong = wrong_answers(&both);
        assert_eq!(wrong.len(), 1);
        assert_eq!(wrong[0].question_id.as_deref(), Some("2"));
    }

    #[test]
    fn material_keeps_unknown_fields_and_topic_alias() {
        let m: Material = serde_json::from_value(json!({
            "id": "cet4_001",
            "title": "校园生活",
            "topics": ["教育", "校园"],
            "questions": [{"id": 1}]
        }))
        .unwrap();
        assert_eq!(m.topic, vec!["教育", "校园"]);
        let out = serde_json::to_value(&m).unwrap();
        assert_eq!(out["topic"], json!(["教育", "校园"]));
        assert_eq!(out["questions"], json!([{"id": 1}]));
    }

    #[test]
    fn mistakes_analysis_is_untagged() {
        let per: MistakesAnalysis = serde_json::from_value(json!({"2": "x"})).unwrap();
        assert!(per.is_mapping());
        let overall: MistakesAnalysis = serde_json::from_value(json!("好")).unwrap();
        assert!(!overall.is_mapping());
        assert_eq!(serde_json::to_value(&overall).unwrap(), json!("好"));
    }

    #[test]
    fn recommendation_entry_mirrors_material_id_on_the_wire() {
        let e = RecommendationEntry {
            id: "a".into(),
            material_id: "a".into(),
            title: "A".into(),
            reason: "r".into(),
            match_score: 0.7,
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["materialId"], json!("a"));
        assert_eq!(v["match_score"], json!(0.7));
    }

    #[test]
    fn analysis_requires_core_fields() {
        let missing = serde_json::from_value::<AnalysisResult>(json!({"weak_areas": []}));
        assert!(missing.is_err());
        let ok: AnalysisResult = serde_json::from_value(json!({
            "weak_areas": ["细节理解"],
            "strong_areas": "主旨理解",
            "performance_score": "72"
        }))
        .unwrap();
        assert_eq!(ok.performance_score, 72);
        assert_eq!(ok.strong_areas, vec!["主旨理解"]);
        assert!(ok.recommendation_criteria.focus_tags.is_empty());
    }
}
