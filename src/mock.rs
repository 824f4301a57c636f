//! Canned payloads the gateway returns once every attempt has failed.
//!
//! Selection is a deterministic scan of the prompt for the cue strings below. Each
//! prompt builder in [`crate::prompts`] embeds its own cue so the canned payload that
//! answers it has the shape its caller expects.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

use crate::clients::traits::CallResult;
use crate::topics::{self, TopicFamily};

pub const CUE_ANSWER_ANALYSIS: &[&str] = &["分析用户的答题情况", "analyze user"];
pub const CUE_RECOMMENDATION: &[&str] = &["推荐最合适的听力材料", "recommend materials"];
pub const CUE_LISTENING_LEVEL: &[&str] = &["evaluate_listening_level"];
pub const CUE_LEARNING_FEEDBACK: &[&str] = &["learning_feedback"];
pub const CUE_SPEAKING_TASKS: &[&str] = &["speaking_tasks"];
pub const CUE_SPEAKING_EVALUATION: &[&str] = &["evaluate_speaking"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockKind {
    AnswerAnalysis,
    Recommendation,
    ListeningLevel,
    LearningFeedback(TopicFamily),
    SpeakingTasks,
    SpeakingEvaluation,
    Generic,
}

static TOPIC_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""topics?"\s*:\s*(\[[^\]]*\])"#).expect("valid topic regex"));

fn contains_any(prompt: &str, cues: &[&str]) -> bool {
    cues.iter().any(|c| prompt.contains(c))
}

/// Topic tags from the first `"topic": [...]` / `"topics": [...]` array embedded in a prompt
pub fn sniff_topics(prompt: &str) -> Vec<String> {
    TOPIC_ARRAY
        .captures(prompt)
        .and_then(|c| c.get(1))
        .map(|m| {
            serde_json::from_str::<Vec<String>>(m.as_str()).unwrap_or_else(|_| {
                m.as_str()
                    .trim_matches(['[', ']'])
                    .split(',')
                    .map(|t| t.trim().trim_matches(['"', '\'', ' ']).to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
        })
        .unwrap_or_default()
}

pub fn classify(prompt: &str) -> MockKind {
    if contains_any(prompt, CUE_ANSWER_ANALYSIS) {
        MockKind::AnswerAnalysis
    } else if contains_any(prompt, CUE_RECOMMENDATION) {
        MockKind::Recommendation
    } else if contains_any(prompt, CUE_LISTENING_LEVEL) {
        MockKind::ListeningLevel
    } else if contains_any(prompt, CUE_LEARNING_FEEDBACK) {
        MockKind::LearningFeedback(topics::classify(&sniff_topics(prompt)))
    } else if contains_any(prompt, CUE_SPEAKING_TASKS) {
        MockKind::SpeakingTasks
    } else if contains_any(prompt, CUE_SPEAKING_EVALUATION) {
        MockKind::SpeakingEvaluation
    } else {
        MockKind::Generic
    }
}

/// Always yields a result with exactly one choice whose content is a JSON string.
pub fn mock_response(prompt: &str) -> CallResult {
    let kind = classify(prompt);
    tracing::info!("Serving canned payload {:?}", kind);
    CallResult {
        is_mock: true,
        ..CallResult::from_content(Value::String(payload(kind).to_string()))
    }
}

pub fn payload(kind: MockKind) -> Value {
    match kind {
        MockKind::AnswerAnalysis => json!({
            "weak_areas": ["细节理解", "数字信息", "词汇理解"],
            "strong_areas": ["主旨理解", "推理判断", "语法结构"],
            "error_patterns": "用户在涉及具体数字和细节的题目上表现较弱，特别是在快速对话和学术讲座中容易错过关键信息。",
            "performance_score": 75,
            "recommendation_criteria": {
                "focus_tags": ["细节理解", "数字信息", "词汇理解"],
                "preferred_topics": ["教育", "科技", "环保"]
            }
        }),
        MockKind::Recommendation => json!({
            "recommendations": [
                {
                    "id": "cet6_001",
                    "title": "CET6 听力训练 - 科技发展",
                    "reason": "该套题包含多个细节理解题型，特别关注数字信息的理解，与您的薄弱环节匹配度高。",
                    "match_score": 0.92
                },
                {
                    "id": "2022_06",
                    "title": "2022年六月四级听力真题第一套",
                    "reason": "这套材料专注于训练细节捕捉能力，包含大量需要理解具体数字和事实的题目。",
                    "match_score": 0.85
                },
                {
                    "id": "cet4_001",
                    "title": "CET4 听力训练 - 校园生活",
                    "reason": "该材料包含多个教育主题的听力段落，与您的兴趣领域匹配，同时侧重于细节理解能力的培养。",
                    "match_score": 0.78
                }
            ],
            "improvement_suggestions": "建议在听力练习中特别注意记录关键数字信息，培养快速捕捉细节的能力。可以尝试使用笔记技巧，如使用符号和缩写记录听到的数字和关键词。同时，建议扩大词汇量，特别是常见听力材料中出现的专业词汇。"
        }),
        MockKind::ListeningLevel => json!({
            "level": "CET4",
            "recommended_material": "cet4_003",
            "analysis": "用户在基础听力理解方面表现良好，但在细节把握和高级词汇理解方面有待提高。建议从CET4难度的材料开始训练。"
        }),
        MockKind::LearningFeedback(family) => learning_feedback(family),
        MockKind::SpeakingTasks => json!({
            "questions": [
                {"type": "retell", "prompt": "请复述听力材料的主要内容。", "reference": "The material discusses the importance of renewable energy..."},
                {"type": "summary", "prompt": "请总结文章的主要观点。", "reference": "The main points are..."},
                {"type": "detail", "prompt": "演讲者提到了哪些可再生能源的例子？", "reference": "The speaker mentioned solar, wind, and hydroelectric power..."}
            ]
        }),
        MockKind::SpeakingEvaluation => json!({
            "pronunciation": "发音清晰，但在重音和语调方面需要改进。",
            "fluency": "流利度良好，但有些停顿需要注意。",
            "content": "内容准确，但可以增加更多细节和例子来丰富回答。",
            "overall_score": 7.5,
            "improvement_suggestions": ["注意th和r的发音", "练习连读和弱读", "增加回答的具体例子"]
        }),
        MockKind::Generic => json!({
            "response": "这是一个模拟响应，实际部署时请配置正确的DeepSeek API。",
            "timestamp": chrono::Utc::now().timestamp()
        }),
    }
}

fn learning_feedback(family: TopicFamily) -> Value {
    match family {
        TopicFamily::Education => json!({
            "vocabulary": ["curriculum", "academic", "assessment", "faculty", "enrollment"],
            "expressions": ["in accordance with", "with respect to", "take into account"],
            "background": "该材料围绕教育体系和校园生活展开，探讨了现代教育理念和学生发展需求。",
            "structure": "对话从校园环境描述开始，逐步深入讨论教育改革和学生参与度问题，最后提出改进建议。",
            "mistakes_analysis": {
                "2": "在这道题中，你选择了错误选项。听力中明确提到学生需要更多实践机会，但你可能被其他信息干扰。建议在听力时做好关键词笔记，尤其是表达观点和态度的部分。",
                "5": "这道题需要抓住具体数字信息。听力中提到'recreated 500 copies'，但你可能忽略了这个数字细节。建议在听数字信息时特别集中注意力，可以采用快速记数字的方法。"
            }
        }),
        TopicFamily::Technology => json!({
            "vocabulary": ["innovation", "algorithm", "interface", "deployment", "optimization"],
            "expressions": ["cutting-edge", "state-of-the-art", "breakthrough in"],
            "background": "该材料探讨了最新科技发展趋势及其对社会的影响，特别是人工智能和自动化领域的进展。",
            "structure": "讲座从技术定义开始，然后介绍历史发展，接着分析当前应用，最后展望未来发展方向。",
            "mistakes_analysis": {
                "3": "这道题考查了关于技术发明的细节理解。听力中描述了发明的功能，但你可能对这部分信息理解不充分。建议在听描述性内容时，注意听清楚功能、特点等关键信息。",
                "7": "这道题涉及到专有名词来源，需要对文化背景知识有一定了解。听力明确提到这些名称来源于罗马神话，但你可能错过了这个信息点。建议平时多积累一些背景知识，并在听力中注意这类细节信息。"
            }
        }),
        TopicFamily::General => json!({
            "vocabulary": ["significant", "trend", "sustainable", "innovation", "comprehensive"],
            "expressions": ["in terms of", "due to", "as a result of"],
            "background": "该材料讨论了可再生能源的发展趋势与挑战。",
            "structure": "新闻采用了问题-解决方案的结构，先介绍能源危机，再讨论可再生能源的解决方案。",
            "mistakes_analysis": {
                "8": "这道题考察了对对话中问题的识别。听力中男士问及'arm exercises raise blood pressure?'，女士回答'That they do'，表示确认这个问题。你可能对这种简短的肯定回答方式不够熟悉，建议多注意英语中各种表示肯定的表达方式。",
                "16": "这道题涉及到对数字信息的准确理解。听力中提到'more than 11 million undocumented people'，你需要从选项中找到最接近的数字。建议在听数字信息时，立即记下来，并在答题时仔细对比选项。"
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cues_select_matching_payloads() {
        assert_eq!(classify("请分析用户的答题情况"), MockKind::AnswerAnalysis);
        assert_eq!(classify("please recommend materials"), MockKind::Recommendation);
        assert_eq!(classify("task evaluate_listening_level"), MockKind::ListeningLevel);
        assert_eq!(classify("speaking_tasks for x"), MockKind::SpeakingTasks);
        assert_eq!(classify("evaluate_speaking now"), MockKind::SpeakingEvaluation);
        assert_eq!(classify("hello"), MockKind::Generic);
    }

    #[test]
    fn feedback_payload_follows_embedded_topics() {
        let prompt = r#"learning_feedback {"id":"m1","topic":["科技","AI"]}"#;
        assert_eq!(
            classify(prompt),
            MockKind::LearningFeedback(TopicFamily::Technology)
        );
        let prompt = r#"learning_feedback {"topics": ["Education"]}"#;
        assert_eq!(
            classify(prompt),
            MockKind::LearningFeedback(TopicFamily::Education)
        );
        assert_eq!(
            classify("learning_feedback no tags"),
            MockKind::LearningFeedback(TopicFamily::General)
        );
    }

    #[test]
    fn sniff_topics_tolerates_single_quotes() {
        assert_eq!(sniff_topics(r#""topic": ['校园', '生活']"#), vec!["校园", "生活"]);
    }

    #[test]
    fn every_payload_is_a_non_empty_string_choice() {
        for prompt in ["分析用户的答题情况", "recommend materials", "learning_feedback", "x"] {
            let r = mock_response(prompt);
            let text = r.content_text();
            assert!(!text.is_empty());
            assert!(serde_json::from_str::<Value>(&text).unwrap().is_object());
        }
    }
}
