//! Prompt builders and fixed system prompts for every generation task.
//!
//! Each user prompt carries the cue its canned payload in [`crate::mock`] is keyed on,
//! so a gateway that has exhausted its attempts answers with the right shape.

use serde::Serialize;
use serde_json::Value;

use crate::deserializers::value_to_text;
use crate::schemas::{AnalysisResult, Material, MaterialCatalogEntry, UserAnswer};

pub const FEEDBACK_SYSTEM_PROMPT: &str = r#"你是一个专业的英语听力教师，擅长分析听力理解问题并提供针对性的学习反馈。
请根据用户的学习材料、听力原文和答题情况，提供有价值的学习反馈，特别是针对用户答错的题目提供详细的解释和学习建议。
你的反馈应该既有针对性又有教育意义，帮助用户理解他们的错误并改进听力技能。

请确保输出为有效的JSON格式，但mistakes_analysis字段中的内容应该是自然流畅的教师点评，而不是结构化数据。
为每个错题提供详细分析时，请使用自然语言描述问题所在、关键信息和改进建议，语气亲切专业。

示例格式：
{
  "vocabulary": ["单词1", "单词2"],
  "expressions": ["表达1", "表达2"],
  "background": "背景知识...",
  "structure": "结构分析...",
  "mistakes_analysis": {
    "1": "这道题你选错了，主要是因为... 听力原文中其实提到... 建议你下次...",
    "5": "这道题的关键在于... 听力中明确说到... 提高这方面能力可以..."
  }
}"#;

/// Used for the retry after the first answer could not be parsed as JSON
pub const FEEDBACK_STRICT_SYSTEM_PROMPT: &str = r#"你是一个专业的英语听力教师。
只输出一个合法的JSON对象，不要输出任何其他文字、解释或Markdown代码块标记。
JSON对象必须且只能包含以下字段：vocabulary（字符串数组）、expressions（字符串数组）、background（字符串）、structure（字符串）、mistakes_analysis（以题号为键、自然语言点评为值的对象）。"#;

pub const SPEAKING_GENERIC_SYSTEM_PROMPT: &str =
    "你是一个专业的英语口语教练，请严格按照JSON格式要求，设计与材料内容紧密相关、由浅入深的口语练习题目。";

pub const SPEAKING_TARGETED_SYSTEM_PROMPT: &str =
    "你是一个专业的英语口语教练，请严格按照JSON格式要求，设计针对用户听力弱点的口语练习题目，帮助用户提高这些方面的能力。";

pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"你是一个专业的英语听力分析专家。请找出用户听力理解的薄弱环节。

请分析用户的错题模式，找出共同特征。考虑以下方面:
1. 题目类型(如细节理解、主旨理解、推理判断等)
2. 题目内容领域(如教育、环保、科技等)
3. 题目难度
4. 错误模式(如混淆选项、遗漏关键信息等)

输出JSON格式，包含以下字段:
- weak_areas: 用户的薄弱领域列表
- strong_areas: 用户的强项领域列表
- error_patterns: 错误模式分析描述
- performance_score: 整体表现评分(0-100)
- recommendation_criteria: 推荐标准，包含focus_tags(应该关注的标签)和preferred_topics(偏好的主题)"#;

pub const RECOMMENDATION_SYSTEM_PROMPT: &str = r#"你是一个专业的英语听力学习推荐专家。请根据用户的能力分析，从可用的材料中选择学习材料套题。

对于每个推荐，请提供:
1. 材料ID(id)和标题(title)
2. 推荐理由(reason)
3. 匹配度评分(match_score, 0-1)

输出JSON格式，包含recommendations字段(推荐列表)和improvement_suggestions字段(改进建议)。
推荐的id必须来自可用材料库。"#;

pub const LEVEL_SYSTEM_PROMPT: &str =
    "你是一个专业的英语听力水平评估助手，请根据用户的答题情况给出客观评价和合适的难度推荐。";

pub const SPEAKING_EVALUATION_SYSTEM_PROMPT: &str =
    "你是一个专业的英语口语评估师，请对用户的口语表现给出客观、全面的评价，并提供有针对性的改进建议。";

const SPEAKING_FORMAT: &str = r#"返回格式必须是以下JSON格式，且包含questions字段：
{
  "questions": [
    {
      "type": "retell|summary|opinion",
      "prompt": "口语练习问题...",
      "reference": "参考答案..."
    }
  ]
}"#;

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Flattens a `{sections: [{description, passages: [{passage_id, content}]}]}` transcript
/// into labelled text; any other shape is embedded as-is.
pub fn render_transcript(transcript: &Value) -> String {
    match transcript {
        Value::Object(obj) if obj.contains_key("sections") => obj
            .get("sections")
            .and_then(Value::as_array)
            .map(|sections| {
                sections
                    .iter()
                    .map(|section| {
                        let description = section
                            .get("description")
                            .map(value_to_text)
                            .filter(|d| !d.is_empty())
                            .unwrap_or_else(|| "部分".to_string());
                        let mut text = format!("## {}\n\n", description);
                        for passage in section
                            .get("passages")
                            .and_then(Value::as_array)
                            .into_iter()
                            .flatten()
                        {
                            let id = passage.get("passage_id").map(value_to_text).unwrap_or_default();
                            let content = passage.get("content").map(value_to_text).unwrap_or_default();
                            text.push_str(&format!("### 段落 {}\n{}\n\n", id, content));
                        }
                        text
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default(),
        Value::String(s) => s.clone(),
        other => to_json(other),
    }
}

pub fn feedback_prompt(
    material: &Material,
    answers: &[UserAnswer],
    transcript: Option<&Value>,
) -> String {
    let mut parts: Vec<String> = vec![
        "任务类型：learning_feedback".to_string(),
        "作为英语听力学习助手，请根据以下信息为用户生成详细的学习反馈。".to_string(),
        "用户已完成听力理解练习，现在需要针对性的反馈来提高听力能力。".to_string(),
        "请认真分析用户的答题表现，特别关注错误回答，找出听力理解的薄弱环节。".to_string(),
        String::new(),
        "请以JSON格式输出，包含以下字段：".to_string(),
        "- vocabulary: 材料中的重要词汇列表（5-10个单词）".to_string(),
        "- expressions: 重要表达或短语列表（3-5个）".to_string(),
        "- background: 材料相关背景知识（100-200字）".to_string(),
        "- structure: 听力结构分析（80-150字）".to_string(),
        "- mistakes_analysis: 针对用户答错题目的详细分析和建议".to_string(),
    ];

    let wrong = answers.iter().filter(|a| a.is_wrong()).count();
    if wrong > 0 {
        parts.push(format!(
            "\n用户有{}道题回答错误，请针对每道错题提供具体分析。",
            wrong
        ));
        parts.push("对于每道错题，请提供以下分析（直接用自然语言描述，不要使用JSON格式）：".to_string());
        parts.push("1. 用户选错的原因（可能的理解障碍）".to_string());
        parts.push("2. 听力中包含的关键信息".to_string());
        parts.push("3. 具体的改进建议和听力技巧".to_string());
        parts.push(
            "\n请确保分析语言通顺自然，像专业教师的点评一样，而不是机器生成的格式化文本。"
                .to_string(),
        );
    } else {
        parts.push("\n用户全部回答正确，请提供整体的听力技巧和进阶建议。".to_string());
    }

    if let Some(transcript) = transcript.filter(|t| !t.is_null()) {
        parts.push("\n听力原文：".to_string());
        parts.push(render_transcript(transcript));
    }

    parts.push("\n听力材料：".to_string());
    parts.push(to_json(material));
    parts.push("\n用户答题情况：".to_string());
    parts.push(to_json(answers));

    parts.join("\n")
}

pub fn speaking_generic_prompt(material: &Material) -> String {
    format!(
        "任务类型：speaking_tasks\n请根据以下听力材料，生成与内容相关的口语试题，包括复述任务、总结任务和细节问题，提供参考答案。\n\n{}\n\n听力材料：\n{}",
        SPEAKING_FORMAT,
        to_json(material)
    )
}

pub fn speaking_targeted_prompt(
    material: &Material,
    errors: &[&UserAnswer],
    error_topics: &[String],
    score: Option<u32>,
) -> String {
    let score = score.map(|s| s.to_string()).unwrap_or_else(|| "未知".to_string());
    format!(
        "任务类型：speaking_tasks\n请根据以下听力材料和用户的错误点，生成针对性的口语练习题。\n\n{}\n\n听力材料：\n{}\n\n用户得分：{}\n\n用户错误点：\n{}\n\n错误涉及的主题：{}",
        SPEAKING_FORMAT,
        to_json(material),
        score,
        to_json(errors),
        error_topics.join(", ")
    )
}

pub fn analysis_prompt(answers: &[UserAnswer]) -> String {
    format!(
        "请分析用户的答题情况：根据以下用户的听力答题数据，分析用户的听力能力特点和薄弱环节。\n\n用户答题数据:\n{}",
        to_json_pretty(answers)
    )
}

pub fn recommendation_prompt(
    analysis: &AnalysisResult,
    catalog: &[MaterialCatalogEntry],
    max_recommendations: usize,
) -> String {
    format!(
        "根据用户的能力分析，从可用的材料中推荐最合适的听力材料套题。\n\n用户能力分析:\n{}\n\n可用材料库:\n{}\n\n请根据用户的薄弱领域和错误模式，推荐{}个最适合的听力材料套题。这些套题应该针对用户的薄弱环节，帮助用户提高相关能力。",
        to_json_pretty(analysis),
        to_json_pretty(catalog),
        max_recommendations
    )
}

pub fn level_prompt(answers: &[UserAnswer]) -> String {
    format!(
        "任务类型：evaluate_listening_level\n根据以下用户的听力答题数据，评估其英语听力水平，并推荐适合的难度等级（CET4、CET6、IELTS、TOEFL）。\n输出JSON格式，包含level（难度等级）、recommended_material（推荐材料ID）和analysis（分析）。\n\n用户答题数据：\n{}",
        to_json(answers)
    )
}

pub fn speaking_evaluation_prompt(
    question: &str,
    transcription: &str,
    reference: Option<&str>,
) -> String {
    let mut prompt = format!(
        "任务类型：evaluate_speaking\n评估以下口语回答的发音、流利度和内容准确性，提供改进建议。输出JSON格式，包含pronunciation、fluency、content、overall_score（0-10）和improvement_suggestions（字符串数组）。\n\n问题：{}\n\n用户回答（转录）：{}",
        question, transcription
    );
    if let Some(reference) = reference.filter(|r| !r.trim().is_empty()) {
        prompt.push_str(&format!("\n参考答案：{}", reference));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockKind};
    use crate::schemas::wrong_answers;
    use crate::topics::TopicFamily;
    use serde_json::json;

    fn material() -> Material {
        serde_json::from_value(json!({
            "id": "cet4_001",
            "title": "校园生活",
            "topic": ["教育"]
        }))
        .unwrap()
    }

    fn answers() -> Vec<UserAnswer> {
        serde_json::from_value(json!([
            {"question_id": 1, "is_correct": true},
            {"question_id": 2, "is_correct": false},
            {"question_id": 3, "is_correct": false}
        ]))
        .unwrap()
    }

    #[test]
    fn feedback_prompt_counts_wrong_answers() {
        let p = feedback_prompt(&material(), &answers(), None);
        assert!(p.contains("用户有2道题回答错误"));
        assert!(!p.contains("听力原文"));
        assert!(p.contains(r#""id":"cet4_001""#));

        let p = feedback_prompt(&material(), &answers()[..1], None);
        assert!(p.contains("用户全部回答正确"));
    }

    #[test]
    fn transcript_sections_are_flattened() {
        let t = json!({"sections": [
            {"description": "Section A", "passages": [
                {"passage_id": 1, "content": "First passage."},
                {"passage_id": 2, "content": "Second passage."}
            ]},
            {"passages": []}
        ]});
        let text = render_transcript(&t);
        assert!(text.starts_with("## Section A\n\n### 段落 1\nFirst passage.\n\n"));
        assert!(text.contains("### 段落 2\nSecond passage."));
        assert!(text.contains("## 部分"));
        assert_eq!(render_transcript(&json!("raw text")), "raw text");
        assert_eq!(render_transcript(&json!({"id": "t1"})), r#"{"id":"t1"}"#);
    }

    #[test]
    fn every_prompt_routes_to_its_canned_payload() {
        let m = material();
        let a = answers();
        assert_eq!(
            mock::classify(&feedback_prompt(&m, &a, None)),
            MockKind::LearningFeedback(TopicFamily::Education)
        );
        assert_eq!(mock::classify(&speaking_generic_prompt(&m)), MockKind::SpeakingTasks);
        let errors = wrong_answers(&a);
        assert_eq!(
            mock::classify(&speaking_targeted_prompt(&m, &errors, &[], Some(60))),
            MockKind::SpeakingTasks
        );
        assert_eq!(mock::classify(&analysis_prompt(&a)), MockKind::AnswerAnalysis);
        let analysis: AnalysisResult = serde_json::from_value(json!({
            "weak_areas": ["细节理解"], "strong_areas": [], "performance_score": 50
        }))
        .unwrap();
        assert_eq!(
            mock::classify(&recommendation_prompt(&analysis, &[], 3)),
            MockKind::Recommendation
        );
        assert_eq!(mock::classify(&level_prompt(&a)), MockKind::ListeningLevel);
        assert_eq!(
            mock::classify(&speaking_evaluation_prompt("q", "a", Some("r"))),
            MockKind::SpeakingEvaluation
        );
    }
}
