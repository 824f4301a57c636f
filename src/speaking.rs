//! Speaking practice: task generation, answer evaluation and the first-visit sample set.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::deserializers::value_to_text;
use crate::error::CoachError;
use crate::extractor::{content_to_value, extract_json, strip_code_fences};
use crate::gateway::{ExternalCallGateway, preview};
use crate::prompts::{self, SPEAKING_GENERIC_SYSTEM_PROMPT, SPEAKING_TARGETED_SYSTEM_PROMPT};
use crate::schemas::{
    Material, SpeakingEvaluation, SpeakingTask, SpeakingTaskSet, UserAnswer, wrong_answers,
};
use crate::topics::{self, TopicFamily};

const TASK_LIST_ALIASES: &[&str] = &["speaking_tasks", "tasks", "oral_practice", "exercises", "items"];
const DEFAULT_TASK_TYPE: &str = "retell";
const MISSING_REFERENCE: &str = "Reference answer not provided";

/// Best effort only: values containing quotes, escapes or braces inside a field defeat it.
static TRIPLE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["'](type|prompt|reference)["']\s*:\s*["']([^"']+)["']"#)
        .expect("valid triple regex")
});

pub struct SpeakingTaskSynthesizer {
    gateway: Arc<ExternalCallGateway>,
    attempts: u32,
}

impl SpeakingTaskSynthesizer {
    pub fn new(gateway: Arc<ExternalCallGateway>, attempts: u32) -> Self {
        Self {
            gateway,
            attempts: attempts.max(1),
        }
    }

    /// Targeted tasks when prior answers are supplied, generic ones otherwise. Never empty.
    pub async fn generate(
        &self,
        material: &Material,
        answers: Option<&[UserAnswer]>,
        score: Option<u32>,
    ) -> SpeakingTaskSet {
        let answers = answers.filter(|a| !a.is_empty());
        let (prompt, system_prompt) = match answers {
            Some(answers) => {
                let errors = wrong_answers(answers);
                let error_topics = error_topics(answers);
                info!(
                    "Generating targeted speaking tasks ({} wrong answers, topics: {:?})",
                    errors.len(),
                    error_topics
                );
                (
                    prompts::speaking_targeted_prompt(material, &errors, &error_topics, score),
                    SPEAKING_TARGETED_SYSTEM_PROMPT,
                )
            }
            None => {
                info!("Generating generic speaking tasks for '{}'", material.title_or_default());
                (prompts::speaking_generic_prompt(material), SPEAKING_GENERIC_SYSTEM_PROMPT)
            }
        };

        for attempt in 1..=self.attempts {
            let result = self.gateway.invoke(&prompt, Some(system_prompt)).await;
            let Some(content) = result.first_content() else {
                warn!("Speaking response carried no content (attempt {}/{})", attempt, self.attempts);
                continue;
            };
            let raw = match content {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            debug!("Speaking content: {}", preview(&raw, 100));

            let questions = recover_tasks(content, &raw);
            if !questions.is_empty() {
                info!("Recovered {} speaking tasks on attempt {}", questions.len(), attempt);
                return SpeakingTaskSet {
                    questions,
                    is_mock_data: result.is_mock,
                };
            }
            warn!(
                "No speaking tasks recoverable from response (attempt {}/{})",
                attempt, self.attempts
            );
        }

        warn!("Speaking attempts exhausted, using default task set");
        fallback_tasks(material, answers.unwrap_or_default())
    }
}

/// Distinct, non-empty topics of the wrong answers in first-seen order.
pub fn error_topics(answers: &[UserAnswer]) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    for topic in answers
        .iter()
        .filter(|a| a.is_wrong())
        .filter_map(|a| a.question_topic.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        if !topics.iter().any(|t| t == topic) {
            topics.push(topic.to_string());
        }
    }
    topics
}

fn parse_content(content: &Value, raw: &str) -> Option<Value> {
    if let Value::String(_) = content {
        // A bare list would otherwise be narrowed to its first object by the brace slice.
        let stripped = strip_code_fences(raw);
        if stripped.starts_with('[')
            && let Ok(v) = serde_json::from_str::<Value>(stripped)
        {
            return Some(v);
        }
        return extract_json(raw).ok();
    }
    content_to_value(content).ok()
}

fn task_from_object(obj: &Map<String, Value>) -> Option<SpeakingTask> {
    let prompt = obj.get("prompt").map(value_to_text)?;
    if prompt.trim().is_empty() {
        return None;
    }
    let task_type = obj
        .get("type")
        .map(value_to_text)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TASK_TYPE.to_string());
    let reference = obj
        .get("reference")
        .map(value_to_text)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| MISSING_REFERENCE.to_string());
    Some(SpeakingTask::new(task_type, prompt, reference))
}

fn tasks_from_list(v: &Value) -> Vec<SpeakingTask> {
    v.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(task_from_object)
                .collect()
        })
        .unwrap_or_default()
}

/// Applies each recovery strategy in turn and returns the first non-empty task list.
pub fn recover_tasks(content: &Value, raw: &str) -> Vec<SpeakingTask> {
    if let Some(parsed) = parse_content(content, raw) {
        if let Value::Object(obj) = &parsed {
            if let Some(list) = obj.get("questions") {
                let tasks = tasks_from_list(list);
                if !tasks.is_empty() {
                    return tasks;
                }
            }

            for alias in TASK_LIST_ALIASES {
                if let Some(list) = obj.get(*alias) {
                    let tasks = tasks_from_list(list);
                    if !tasks.is_empty() {
                        debug!("Speaking tasks found under '{}'", alias);
                        return tasks;
                    }
                }
            }
        }

        if parsed.is_array() {
            let tasks = tasks_from_list(&parsed);
            if !tasks.is_empty() {
                debug!("Speaking response was a bare task list");
                return tasks;
            }
        }

        if let Value::Object(obj) = &parsed {
            let tasks: Vec<SpeakingTask> = obj
                .values()
                .filter_map(Value::as_object)
                .filter(|o| o.contains_key("prompt"))
                .filter_map(task_from_object)
                .collect();
            if !tasks.is_empty() {
                debug!("Speaking tasks synthesized from nested objects");
                return tasks;
            }
        }
    }

    let tasks = tasks_from_raw_text(raw);
    if !tasks.is_empty() {
        warn!("Speaking tasks recovered by pattern scan of raw text");
    }
    tasks
}

/// Rebuilds tasks from `"type"`/`"prompt"`/`"reference"` pairs in raw text. Every `{`
/// opens a new task; a triple left incomplete at the next `{`, or with a field seen
/// twice, is dropped.
pub fn tasks_from_raw_text(raw: &str) -> Vec<SpeakingTask> {
    raw.split('{').filter_map(task_from_chunk).collect()
}

fn task_from_chunk(chunk: &str) -> Option<SpeakingTask> {
    let (mut task_type, mut prompt, mut reference): (Option<String>, Option<String>, Option<String>) =
        (None, None, None);

    for cap in TRIPLE_FIELD.captures_iter(chunk) {
        let slot = match &cap[1] {
            "type" => &mut task_type,
            "prompt" => &mut prompt,
            _ => &mut reference,
        };
        if slot.is_some() {
            debug!("Field repeated inside one task chunk, dropping it");
            return None;
        }
        *slot = Some(cap[2].to_string());
    }

    match (task_type, prompt, reference) {
        (Some(t), Some(p), Some(r)) => Some(SpeakingTask::new(t, p, r)),
        (None, None, None) => None,
        _ => {
            debug!("Dropping incomplete task triple");
            None
        }
    }
}

/// Deterministic task set: aimed at the wrong-answer topics when there are any, else
/// chosen by the material's topic family.
pub fn fallback_tasks(material: &Material, answers: &[UserAnswer]) -> SpeakingTaskSet {
    let topics = error_topics(answers);
    let questions = if let Some(first) = topics.first() {
        let pair = topics.iter().take(2).cloned().collect::<Vec<_>>().join(", ");
        vec![
            SpeakingTask::new(
                "retell",
                format!("请复述听力材料中关于{}的部分。", first),
                format!("The part about {} in the material discusses...", first),
            ),
            SpeakingTask::new(
                "summary",
                format!("请总结听力材料中关于{}的关键信息。", pair),
                format!("The key information about {} includes...", pair),
            ),
            SpeakingTask::new(
                "opinion",
                format!("针对{}这个话题，请表达你的观点。", first),
                format!("Regarding {}, I believe that...", first),
            ),
        ]
    } else {
        match topics::classify(&material.topic) {
            TopicFamily::Education => vec![
                SpeakingTask::new(
                    "retell",
                    "请复述这段教育相关材料的主要内容。",
                    "The material discusses educational reforms and campus life...",
                ),
                SpeakingTask::new(
                    "summary",
                    "请总结本段材料中提到的主要教育理念。",
                    "The main educational concepts mentioned include...",
                ),
                SpeakingTask::new(
                    "opinion",
                    "你认为如何提高学生的学习参与度？",
                    "To improve student engagement, we could...",
                ),
            ],
            TopicFamily::Technology => vec![
                SpeakingTask::new(
                    "retell",
                    "请复述这段关于科技发展的材料内容。",
                    "The material covers recent technological developments...",
                ),
                SpeakingTask::new(
                    "summary",
                    "请总结材料中提到的技术创新的主要优势。",
                    "The main advantages of the technological innovations mentioned are...",
                ),
                SpeakingTask::new(
                    "opinion",
                    "你认为这些新技术会如何影响人们的日常生活？",
                    "These new technologies will affect daily life by...",
                ),
            ],
            TopicFamily::General => vec![
                SpeakingTask::new(
                    "retell",
                    format!("请复述《{}》的主要内容。", material.title_or_default()),
                    "The material discusses...",
                ),
                SpeakingTask::new(
                    "summary",
                    "请总结听力材料中的关键观点。",
                    "The key points made in the material are...",
                ),
                SpeakingTask::new(
                    "opinion",
                    "你对材料中讨论的话题有什么看法？",
                    "In my opinion, the topic discussed in the material...",
                ),
            ],
        }
    };
    SpeakingTaskSet {
        questions,
        is_mock_data: true,
    }
}

/// Fixed tasks offered before a learner has completed any material.
pub fn sample_tasks() -> Vec<SpeakingTask> {
    vec![
        SpeakingTask::new(
            "self_introduction",
            "请简单介绍一下你自己，包括你的名字、学校、专业和兴趣爱好。",
            "Hello, my name is [Name]. I am a student at [University] majoring in [Major]. In my free time, I enjoy [Hobbies].",
        ),
        SpeakingTask::new(
            "topic_discussion",
            "谈谈你认为学习英语的最佳方法是什么？",
            "I believe the best way to learn English is through consistent practice and immersion. This includes listening to English content, speaking with others, reading books, and writing regularly.",
        ),
        SpeakingTask::new(
            "picture_description",
            "描述一个你最近去过的地方，包括它的特点和你的感受。",
            "Recently, I visited [Place]. It is characterized by [Features]. During my visit, I felt [Emotions] because [Reasons].",
        ),
    ]
}

pub struct SpeakingEvaluator {
    gateway: Arc<ExternalCallGateway>,
}

impl SpeakingEvaluator {
    pub fn new(gateway: Arc<ExternalCallGateway>) -> Self {
        Self { gateway }
    }

    /// Scores an already-transcribed answer; unparseable output yields [`placeholder_evaluation`].
    pub async fn evaluate(
        &self,
        transcription: &str,
        question: &str,
        reference: Option<&str>,
    ) -> SpeakingEvaluation {
        info!("Evaluating speaking answer for: {}", preview(question, 30));
        let prompt = prompts::speaking_evaluation_prompt(question, transcription, reference);
        let result = self
            .gateway
            .invoke(&prompt, Some(prompts::SPEAKING_EVALUATION_SYSTEM_PROMPT))
            .await;

        let parsed = result
            .first_content()
            .ok_or_else(|| CoachError::JsonExtraction {
                message: "empty content".to_string(),
            })
            .and_then(content_to_value)
            .and_then(|v| serde_json::from_value::<SpeakingEvaluation>(v).map_err(Into::into));

        match parsed {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!("Speaking evaluation unusable ({}), using placeholder", e);
                placeholder_evaluation()
            }
        }
    }
}

pub fn placeholder_evaluation() -> SpeakingEvaluation {
    SpeakingEvaluation {
        pronunciation: "发音评价".to_string(),
        fluency: "流利度评价".to_string(),
        content: "内容准确性评价".to_string(),
        overall_score: 7.0,
        improvement_suggestions: vec![
            "改进建议1".to_string(),
            "改进建议2".to_string(),
            "改进建议3".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recover(raw: &str) -> Vec<SpeakingTask> {
        recover_tasks(&Value::String(raw.to_string()), raw)
    }

    #[test]
    fn alias_lists_are_accepted() {
        let tasks = recover(r#"{"oral_practice": [{"type": "summary", "prompt": "P", "reference": "R"}]}"#);
        assert_eq!(tasks, vec![SpeakingTask::new("summary", "P", "R")]);
    }

    #[test]
    fn bare_list_is_wrapped() {
        let tasks = recover(r#"```json
[{"prompt": "only prompt"}]
```"#);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_type, "retell");
        assert_eq!(tasks[0].reference, MISSING_REFERENCE);
    }

    #[test]
    fn nested_objects_with_prompt_become_tasks() {
        let tasks = recover(r#"{"task1": {"prompt": "A"}, "task2": {"type": "opinion", "prompt": "B"}, "note": "x"}"#);
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().any(|t| t.prompt == "B" && t.task_type == "opinion"));
    }

    #[test]
    fn raw_scan_keeps_only_complete_triples() {
        let raw = r#"broken {"type": "retell", "prompt": "P1", "reference": "R1"}, {"type": "summary", "prompt": "P2"}, {"type": "opinion", "prompt": "P3", "reference": "R3" oops"#;
        let tasks = recover(raw);
        assert_eq!(
            tasks,
            vec![
                SpeakingTask::new("retell", "P1", "R1"),
                SpeakingTask::new("opinion", "P3", "R3"),
            ]
        );
    }

    #[test]
    fn raw_scan_does_not_borrow_fields_across_objects() {
        let raw = r#"{"prompt":"P1","reference":"R1"}, {"type":"opinion","prompt":"P2","reference":"R2"}"#;
        assert_eq!(
            tasks_from_raw_text(raw),
            vec![SpeakingTask::new("opinion", "P2", "R2")]
        );
    }

    #[test]
    fn empty_questions_recover_nothing() {
        assert!(recover("```json\n{\"questions\": []}\n```").is_empty());
        assert!(recover("no tasks at all").is_empty());
    }

    #[test]
    fn structured_content_is_used_directly() {
        let content = json!({"questions": [{"type": "retell", "prompt": "P", "reference": "R"}]});
        let tasks = recover_tasks(&content, &content.to_string());
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn fallback_targets_error_topics_in_order() {
        let answers: Vec<UserAnswer> = serde_json::from_value(json!([
            {"isCorrect": false, "questionTopic": "环保"},
            {"isCorrect": false, "questionTopic": "数字信息"},
            {"isCorrect": false, "questionTopic": "环保"},
            {"isCorrect": true, "questionTopic": "教育"}
        ]))
        .unwrap();
        let set = fallback_tasks(&Material::default(), &answers);
        assert!(set.is_mock_data);
        assert_eq!(set.questions[0].prompt, "请复述听力材料中关于环保的部分。");
        assert_eq!(set.questions[1].prompt, "请总结听力材料中关于环保, 数字信息的关键信息。");
        assert_eq!(set.questions[2].task_type, "opinion");
    }

    #[test]
    fn fallback_uses_title_for_generic_material() {
        let m: Material = serde_json::from_value(json!({"title": "Ocean Life", "topic": ["自然"]})).unwrap();
        let set = fallback_tasks(&m, &[]);
        assert_eq!(set.questions[0].prompt, "请复述《Ocean Life》的主要内容。");
        let m: Material = serde_json::from_value(json!({"topic": ["Technology"]})).unwrap();
        assert_eq!(fallback_tasks(&m, &[]).questions[0].prompt, "请复述这段关于科技发展的材料内容。");
    }

    #[test]
    fn sample_tasks_are_fixed() {
        let kinds: Vec<_> = sample_tasks().into_iter().map(|t| t.task_type).collect();
        assert_eq!(kinds, ["self_introduction", "topic_discussion", "picture_description"]);
    }
}
