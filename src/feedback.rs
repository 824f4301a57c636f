//! Learning-feedback synthesis for one completed listening exercise.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::extractor::{content_to_value, normalize_report, validate_feedback};
use crate::gateway::{ExternalCallGateway, preview};
use crate::prompts::{self, FEEDBACK_STRICT_SYSTEM_PROMPT, FEEDBACK_SYSTEM_PROMPT};
use crate::schemas::{FeedbackReport, Material, MistakesAnalysis, UserAnswer};
use crate::topics::{self, TopicFamily};

const ALL_CORRECT_FEEDBACK: &str = "您的答题表现很好！继续保持，可以尝试更高难度的听力材料。";

pub struct FeedbackSynthesizer {
    gateway: Arc<ExternalCallGateway>,
    attempts: u32,
}

impl FeedbackSynthesizer {
    pub fn new(gateway: Arc<ExternalCallGateway>, attempts: u32) -> Self {
        Self {
            gateway,
            attempts: attempts.max(1),
        }
    }

    /// Always returns a complete report. Model output is backfilled field by field; if no
    /// attempt yields parseable JSON the topic-aware fallback is returned instead.
    pub async fn generate(
        &self,
        material: &Material,
        answers: &[UserAnswer],
        transcript: Option<&Value>,
    ) -> FeedbackReport {
        let prompt = prompts::feedback_prompt(material, answers, transcript);
        let has_wrong = answers.iter().any(UserAnswer::is_wrong);
        let mut system_prompt = FEEDBACK_SYSTEM_PROMPT;

        for attempt in 1..=self.attempts {
            info!(
                "Generating learning feedback for '{}' (attempt {}/{})",
                material.title_or_default(),
                attempt,
                self.attempts
            );
            let result = self.gateway.invoke(&prompt, Some(system_prompt)).await;
            let Some(content) = result.first_content() else {
                warn!("Feedback response carried no content");
                continue;
            };
            debug!("Feedback content: {}", preview(&result.content_text(), 100));

            match content_to_value(content) {
                Ok(parsed) => {
                    let mut report =
                        validate_feedback(&parsed, has_wrong, || fallback_report(material, answers));
                    report.is_mock_data |= result.is_mock;
                    return normalize_report(report);
                }
                Err(e) => {
                    warn!("Feedback content is not JSON ({}), retrying with strict prompt", e);
                    system_prompt = FEEDBACK_STRICT_SYSTEM_PROMPT;
                }
            }
        }

        warn!("Feedback attempts exhausted, using fallback report");
        fallback_report(material, answers)
    }
}

struct FeedbackBundle {
    vocabulary: &'static [&'static str],
    expressions: &'static [&'static str],
    background: &'static str,
    structure: &'static str,
}

fn bundle(family: TopicFamily) -> FeedbackBundle {
    match family {
        TopicFamily::Education => FeedbackBundle {
            vocabulary: &["curriculum", "academic", "assessment", "faculty", "enrollment"],
            expressions: &["in accordance with", "with respect to", "take into account"],
            background: "该材料围绕教育体系和校园生活展开，探讨了现代教育理念和学生发展需求。",
            structure: "对话从校园环境描述开始，逐步深入讨论教育改革和学生参与度问题，最后提出改进建议。",
        },
        TopicFamily::Technology => FeedbackBundle {
            vocabulary: &["innovation", "algorithm", "interface", "deployment", "optimization"],
            expressions: &["cutting-edge", "state-of-the-art", "breakthrough in"],
            background: "该材料探讨了最新科技发展趋势及其对社会的影响，特别是人工智能和自动化领域的进展。",
            structure: "讲座从技术定义开始，然后介绍历史发展，接着分析当前应用，最后展望未来发展方向。",
        },
        TopicFamily::General => FeedbackBundle {
            vocabulary: &["significant", "trend", "sustainable", "innovation", "comprehensive"],
            expressions: &["in terms of", "due to", "as a result of"],
            background: "该材料讨论了相关领域的发展趋势与挑战。请多听此类材料以提高理解能力。",
            structure: "材料采用了总-分-总的结构，先引入主题，然后展开讨论，最后总结观点。",
        },
    }
}

/// Keys each wrong answer by its question id, or by its 1-based position when the id is missing.
fn fallback_mistakes(answers: &[UserAnswer]) -> MistakesAnalysis {
    let mistakes: BTreeMap<String, String> = answers
        .iter()
        .enumerate()
        .filter(|(_, a)| a.is_wrong())
        .map(|(i, a)| {
            let n = a
                .question_id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| (i + 1).to_string());
            let text = format!(
                "您在第{}题的回答有误。请注意听力中的关键词和细节信息，特别是事实类信息和数字部分。建议多听几遍，集中注意力。",
                n
            );
            (n, text)
        })
        .collect();

    if mistakes.is_empty() {
        MistakesAnalysis::Overall(ALL_CORRECT_FEEDBACK.to_string())
    } else {
        MistakesAnalysis::PerQuestion(mistakes)
    }
}

/// Deterministic report chosen by the material's topic tags.
pub fn fallback_report(material: &Material, answers: &[UserAnswer]) -> FeedbackReport {
    let family = topics::classify(&material.topic);
    debug!("Building fallback feedback for topic family {:?}", family);
    let b = bundle(family);
    FeedbackReport {
        vocabulary: b.vocabulary.iter().map(|s| s.to_string()).collect(),
        expressions: b.expressions.iter().map(|s| s.to_string()).collect(),
        background: b.background.to_string(),
        structure: b.structure.to_string(),
        mistakes_analysis: fallback_mistakes(answers),
        is_mock_data: true,
    }
}
