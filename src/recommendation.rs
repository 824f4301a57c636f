//! Two-stage material recommendation: analyze the learner, then pick catalog entries.
//!
//! Each stage falls back to a canned result on its own, and the final list is always
//! checked against the caller's catalog, so the outcome never names an unknown material.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::config::SynthesisConfig;
use crate::deserializers::{match_score, number_from_value, string_list, value_to_text};
use crate::error::{CoachError, Result};
use crate::extractor::content_to_value;
use crate::gateway::ExternalCallGateway;
use crate::prompts::{self, ANALYSIS_SYSTEM_PROMPT, RECOMMENDATION_SYSTEM_PROMPT};
use crate::schemas::{
    AnalysisResult, MaterialCatalogEntry, RecommendationCriteria, RecommendationEntry,
    RecommendationOutcome, UserAnswer,
};

const DEFAULT_REASON: &str = "系统推荐的基础听力材料";
const REQUIRED_ANALYSIS_FIELDS: &[(&str, &str)] = &[
    ("weak_areas", "weakAreas"),
    ("strong_areas", "strongAreas"),
    ("performance_score", "performanceScore"),
];

/// Stage-recommend output before it is checked against the catalog.
#[derive(Debug, Clone)]
pub struct RecommendationDraft {
    pub candidates: Vec<Value>,
    pub improvement_suggestions: String,
}

pub struct RecommendationPipeline {
    gateway: Arc<ExternalCallGateway>,
    config: SynthesisConfig,
}

impl RecommendationPipeline {
    pub fn new(gateway: Arc<ExternalCallGateway>, config: SynthesisConfig) -> Self {
        Self { gateway, config }
    }

    /// Analyze, then recommend, then validate. Always structurally complete.
    pub async fn run(
        &self,
        answers: &[UserAnswer],
        catalog: &[MaterialCatalogEntry],
    ) -> RecommendationOutcome {
        info!(
            "Recommendation pipeline started ({} answers, {} catalog entries)",
            answers.len(),
            catalog.len()
        );
        let analysis = self.analyze(answers).await;
        let draft = self.recommend(&analysis, catalog).await;
        let recommendations = validate_recommendations(draft.candidates, catalog, &self.config);

        info!(
            "Recommendation pipeline finished: {} recommendations, score {}",
            recommendations.len(),
            analysis.performance_score
        );
        RecommendationOutcome {
            weak_areas: analysis.weak_areas,
            strong_areas: analysis.strong_areas,
            performance_score: analysis.performance_score,
            recommendations,
            improvement_suggestions: draft.improvement_suggestions,
        }
    }

    pub async fn analyze(&self, answers: &[UserAnswer]) -> AnalysisResult {
        match self.try_analyze(answers).await {
            Ok(analysis) => {
                info!(
                    "Analysis stage done, weak areas: {:?}, score {}",
                    analysis.weak_areas, analysis.performance_score
                );
                analysis
            }
            Err(e) => {
                warn!("Analysis stage failed ({}), using canned analysis", e);
                canned_analysis()
            }
        }
    }

    async fn try_analyze(&self, answers: &[UserAnswer]) -> Result<AnalysisResult> {
        let prompt = prompts::analysis_prompt(answers);
        let parsed = self.call(&prompt, ANALYSIS_SYSTEM_PROMPT).await?;
        let obj = parsed.as_object().ok_or_else(|| CoachError::JsonExtraction {
            message: "analysis is not a JSON object".to_string(),
        })?;

        let missing: Vec<String> = REQUIRED_ANALYSIS_FIELDS
            .iter()
            .filter(|(snake, camel)| !obj.contains_key(*snake) && !obj.contains_key(*camel))
            .map(|(snake, _)| snake.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CoachError::SchemaValidation { missing });
        }

        Ok(serde_json::from_value(parsed)?)
    }

    pub async fn recommend(
        &self,
        analysis: &AnalysisResult,
        catalog: &[MaterialCatalogEntry],
    ) -> RecommendationDraft {
        match self.try_recommend(analysis, catalog).await {
            Ok(draft) => {
                info!("Recommend stage produced {} candidates", draft.candidates.len());
                draft
            }
            Err(e) => {
                warn!("Recommend stage failed ({}), using canned recommendations", e);
                canned_recommendations()
            }
        }
    }

    async fn try_recommend(
        &self,
        analysis: &AnalysisResult,
        catalog: &[MaterialCatalogEntry],
    ) -> Result<RecommendationDraft> {
        let prompt =
            prompts::recommendation_prompt(analysis, catalog, self.config.max_recommendations);
        let parsed = self.call(&prompt, RECOMMENDATION_SYSTEM_PROMPT).await?;

        let candidates = match parsed.get("recommendations") {
            Some(Value::Array(items)) => items.clone(),
            _ => {
                return Err(CoachError::SchemaValidation {
                    missing: vec!["recommendations".to_string()],
                });
            }
        };

        let improvement_suggestions = parsed
            .get("improvement_suggestions")
            .or_else(|| parsed.get("improvementSuggestions"))
            .map(|v| match v {
                Value::Array(_) => string_list(v).join("\n"),
                other => value_to_text(other),
            })
            .unwrap_or_default();

        Ok(RecommendationDraft {
            candidates,
            improvement_suggestions,
        })
    }

    async fn call(&self, prompt: &str, system_prompt: &str) -> Result<Value> {
        let result = self.gateway.invoke(prompt, Some(system_prompt)).await;
        let content = result.first_content().ok_or_else(|| CoachError::JsonExtraction {
            message: "empty content".to_string(),
        })?;
        content_to_value(content)
    }
}

pub fn canned_analysis() -> AnalysisResult {
    AnalysisResult {
        weak_areas: vec!["细节理解".to_string(), "数字信息".to_string()],
        strong_areas: vec!["主旨理解".to_string(), "推理判断".to_string()],
        error_patterns: "用户在涉及具体数字和细节的题目上表现较弱".to_string(),
        performance_score: 65,
        recommendation_criteria: RecommendationCriteria {
            focus_tags: vec!["细节理解".to_string(), "数字信息".to_string()],
            preferred_topics: vec!["环保".to_string(), "教育".to_string()],
        },
    }
}

pub fn canned_recommendations() -> RecommendationDraft {
    RecommendationDraft {
        candidates: vec![
            json!({
                "id": "cet6_001",
                "title": "CET6 听力训练 - 科技创新",
                "reason": "该套题包含多个细节理解题型，特别关注数字信息的理解，与您的薄弱环节匹配度高。",
                "match_score": 0.92
            }),
            json!({
                "id": "2022_06",
                "title": "2022年六月四级听力真题第一套",
                "reason": "这套材料专注于训练细节捕捉能力，包含大量需要理解具体数字和事实的题目。",
                "match_score": 0.85
            }),
            json!({
                "id": "cet4_001",
                "title": "CET4 听力训练 - 校园生活",
                "reason": "该材料包含多个环保主题的听力段落，与您的兴趣领域匹配，同时侧重于细节理解能力的培养。",
                "match_score": 0.78
            }),
        ],
        improvement_suggestions: "建议在听力练习中特别注意记录关键数字信息，培养快速捕捉细节的能力。"
            .to_string(),
    }
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .map(value_to_text)
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

/// Keeps only candidates whose id is in `catalog`, mirroring `id` and `materialId`.
/// When nothing survives, the first catalog entries are recommended instead.
pub fn validate_recommendations(
    candidates: Vec<Value>,
    catalog: &[MaterialCatalogEntry],
    config: &SynthesisConfig,
) -> Vec<RecommendationEntry> {
    let known: HashSet<&str> = catalog
        .iter()
        .map(|m| m.id.as_str())
        .filter(|id| !id.is_empty())
        .collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut entries = Vec::new();

    for candidate in candidates {
        let Some(obj) = candidate.as_object() else {
            warn!("Dropping recommendation that is not an object: {}", candidate);
            continue;
        };
        let Some(id) = text_field(obj, &["id", "materialId", "material_id"]) else {
            warn!("Dropping recommendation without id: {}", candidate);
            continue;
        };
        if !known.contains(id.as_str()) {
            warn!("Recommended material {} is not in the catalog, dropped", id);
            continue;
        }
        if !seen.insert(id.clone()) {
            debug!("Duplicate recommendation {} dropped", id);
            continue;
        }

        let title = text_field(obj, &["title"])
            .or_else(|| {
                catalog
                    .iter()
                    .find(|m| m.id == id)
                    .map(|m| m.title.clone())
                    .filter(|t| !t.is_empty())
            })
            .unwrap_or_else(|| format!("听力材料 - {}", id));
        let score = obj
            .get("match_score")
            .or_else(|| obj.get("matchScore"))
            .and_then(number_from_value)
            .map(match_score)
            .unwrap_or(config.default_match_score);

        entries.push(RecommendationEntry {
            material_id: id.clone(),
            id,
            title,
            reason: text_field(obj, &["reason"]).unwrap_or_default(),
            match_score: score,
        });
    }

    if entries.is_empty() {
        warn!("No recommended material is in the catalog, using default recommendations");
        entries = catalog
            .iter()
            .filter(|m| !m.id.is_empty())
            .take(config.max_recommendations)
            .map(|m| RecommendationEntry {
                id: m.id.clone(),
                material_id: m.id.clone(),
                title: if m.title.is_empty() {
                    format!("听力材料 - {}", m.id)
                } else {
                    m.title.clone()
                },
                reason: DEFAULT_REASON.to_string(),
                match_score: config.default_match_score,
            })
            .collect();
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(ids: &[&str]) -> Vec<MaterialCatalogEntry> {
        ids.iter()
            .map(|id| MaterialCatalogEntry::new(*id, format!("Title {}", id)))
            .collect()
    }

    #[test]
    fn material_id_is_copied_and_mirrored() {
        let out = validate_recommendations(
            vec![
                json!({"materialId": "b", "reason": "r", "match_score": 85}),
                json!({"title": "no id"}),
                json!({"id": "zzz"}),
                json!({"id": "b"}),
            ],
            &catalog(&["a", "b"]),
            &SynthesisConfig::default(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "b");
        assert_eq!(out[0].material_id, "b");
        assert_eq!(out[0].title, "Title b");
        assert!((out[0].match_score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn defaults_take_first_three_catalog_entries() {
        let mut cat = catalog(&["a", "b", "c", "d"]);
        cat[1].title.clear();
        let out = validate_recommendations(
            canned_recommendations().candidates,
            &cat,
            &SynthesisConfig::default(),
        );
        let ids: Vec<_> = out.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(out[1].title, "听力材料 - b");
        assert!(out.iter().all(|e| e.match_score == 0.7 && e.reason == DEFAULT_REASON));
    }

    #[test]
    fn empty_catalog_yields_no_recommendations() {
        let out = validate_recommendations(
            canned_recommendations().candidates,
            &[],
            &SynthesisConfig::default(),
        );
        assert!(out.is_empty());
    }
}
