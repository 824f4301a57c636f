//! Pulls JSON out of free-form model output and repairs what comes back.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::deserializers::{string_list, value_to_text};
use crate::error::{CoachError, Result};
use crate::schemas::{FeedbackReport, MistakesAnalysis};

const STRUCTURED_KEYS: &[&str] = &["\"why_wrong\"", "\"key_information\"", "\"suggestion\""];

/// Removes a leading ```` ```json ````/```` ``` ```` and a trailing ```` ``` ```` marker.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```JSON") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Parses the first `{` .. last `}` slice, falling back to the whole (fence-stripped) text.
pub fn extract_json(raw: &str) -> Result<Value> {
    let text = strip_code_fences(raw);

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}'))
        && start < end
    {
        match serde_json::from_str::<Value>(&text[start..=end]) {
            Ok(v) => return Ok(v),
            Err(e) => debug!("Brace slice did not parse ({}), trying whole text", e),
        }
    }

    serde_json::from_str::<Value>(text).map_err(|e| CoachError::JsonExtraction {
        message: format!("{} (content starts: {})", e, crate::gateway::preview(text, 100)),
    })
}

/// Model content that is already structured is used as-is; strings go through [`extract_json`].
pub fn content_to_value(content: &Value) -> Result<Value> {
    match content {
        Value::String(s) => extract_json(s),
        Value::Null => Err(CoachError::JsonExtraction {
            message: "empty content".to_string(),
        }),
        other => Ok(other.clone()),
    }
}

/// JavaScript-style truthiness, which is what the model's "missing" fields look like
pub fn is_falsy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
    }
}

fn field<'a>(obj: &'a Map<String, Value>, snake: &str, camel: &str) -> Option<&'a Value> {
    obj.get(snake).or_else(|| obj.get(camel))
}

/// Reads a model-provided mistakes analysis. Object values that are not strings are kept
/// as JSON text so [`normalize_mistakes_analysis`] can turn them into narrative.
fn mistakes_from_value(v: &Value) -> Option<MistakesAnalysis> {
    match v {
        Value::Object(obj) => {
            let map: BTreeMap<String, String> = obj
                .iter()
                .map(|(k, v)| (k.clone(), value_to_text(v)))
                .filter(|(_, v)| !v.trim().is_empty())
                .collect();
            (!map.is_empty()).then_some(MistakesAnalysis::PerQuestion(map))
        }
        Value::Array(items) => {
            let map: BTreeMap<String, String> = items
                .iter()
                .enumerate()
                .map(|(i, v)| ((i + 1).to_string(), value_to_text(v)))
                .filter(|(_, v)| !v.trim().is_empty())
                .collect();
            (!map.is_empty()).then_some(MistakesAnalysis::PerQuestion(map))
        }
        Value::String(s) if !s.trim().is_empty() => Some(MistakesAnalysis::Overall(s.clone())),
        _ => None,
    }
}

/// Turns a parsed model response into a complete report, backfilling from `fallback`.
///
/// Each of `vocabulary`, `expressions`, `background`, `structure` that is absent or falsy
/// is copied from the fallback. `mistakes_analysis` is replaced wholesale when it is
/// missing, or when wrong answers exist but it is not a non-empty per-question mapping.
/// `fallback` runs at most once.
pub fn validate_feedback<F>(parsed: &Value, has_wrong_answers: bool, fallback: F) -> FeedbackReport
where
    F: FnOnce() -> FeedbackReport,
{
    let empty = Map::new();
    let obj = parsed.as_object().unwrap_or(&empty);

    let mut fallback = Some(fallback);
    let mut cached: Option<FeedbackReport> = None;
    let mut backup = || {
        cached
            .get_or_insert_with(|| fallback.take().map_or_else(empty_report, |f| f()))
            .clone()
    };

    let mut missing: Vec<&str> = Vec::new();

    let vocabulary = match obj.get("vocabulary").map(string_list) {
        Some(list) if !list.is_empty() => list,
        _ => {
            missing.push("vocabulary");
            backup().vocabulary
        }
    };
    let expressions = match obj.get("expressions").map(string_list) {
        Some(list) if !list.is_empty() => list,
        _ => {
            missing.push("expressions");
            backup().expressions
        }
    };
    let background = match obj.get("background") {
        Some(v) if !is_falsy(Some(v)) => value_to_text(v),
        _ => {
            missing.push("background");
            backup().background
        }
    };
    let structure = match obj.get("structure") {
        Some(v) if !is_falsy(Some(v)) => value_to_text(v),
        _ => {
            missing.push("structure");
            backup().structure
        }
    };

    if !missing.is_empty() {
        warn!("Feedback response missing fields {:?}, backfilling", missing);
    }

    let provided = field(obj, "mistakes_analysis", "mistakesAnalysis").and_then(mistakes_from_value);
    let mistakes_analysis = match provided {
        Some(m) if !has_wrong_answers || m.is_mapping() => m,
        Some(_) => {
            warn!("Mistakes analysis is not per-question although answers were wrong, replacing");
            backup().mistakes_analysis
        }
        None => {
            if has_wrong_answers {
                warn!("Feedback response has no mistakes analysis, adding fallback analysis");
            }
            backup().mistakes_analysis
        }
    };

    FeedbackReport {
        vocabulary,
        expressions,
        background,
        structure,
        mistakes_analysis,
        is_mock_data: missing.len() == 4,
    }
}

fn empty_report() -> FeedbackReport {
    FeedbackReport {
        vocabulary: Vec::new(),
        expressions: Vec::new(),
        background: String::new(),
        structure: String::new(),
        mistakes_analysis: MistakesAnalysis::Overall(String::new()),
        is_mock_data: true,
    }
}

fn looks_structured(text: &str) -> bool {
    text.trim_start().starts_with('{') || STRUCTURED_KEYS.iter().any(|k| text.contains(k))
}

/// One rewrite step; `None` when the text is left as it is.
fn narrate_once(text: &str) -> Option<String> {
    if !looks_structured(text) {
        return None;
    }
    // Only the entry as a whole is parsed; prose around an embedded object is kept verbatim.
    let body = strip_code_fences(text);
    if !body.starts_with('{') {
        return None;
    }
    let parsed = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(obj)) => obj,
        Ok(_) => return None,
        Err(e) => {
            debug!("Mistake analysis entry is not JSON, keeping text: {}", e);
            return None;
        }
    };

    let mut parts: Vec<String> = Vec::new();
    if let Some(v) = parsed.get("why_wrong") {
        parts.push(value_to_text(v));
    }
    if let Some(v) = parsed.get("key_information") {
        parts.push(format!("关键信息：{}", value_to_text(v)));
    }
    if let Some(v) = parsed.get("suggestion") {
        parts.push(format!("提升建议：{}", value_to_text(v)));
    }
    if parts.is_empty() {
        return None;
    }
    let narrative = parts.join("\n\n");
    (narrative != text).then_some(narrative)
}

/// Rewrites a JSON-looking analysis string into narrative text.
///
/// Every successful rewrite strictly shortens the text, so iterating to a fixpoint
/// terminates and makes the function idempotent even for nested JSON.
pub fn narrate_analysis(text: &str) -> String {
    let mut current = text.to_string();
    while let Some(next) = narrate_once(&current) {
        if next.chars().count() >= current.chars().count() {
            break;
        }
        current = next;
    }
    current
}

pub fn normalize_mistakes_analysis(map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), narrate_analysis(v)))
        .collect()
}

/// Applies [`normalize_mistakes_analysis`] to the per-question form; overall text passes through.
pub fn normalize_report(mut report: FeedbackReport) -> FeedbackReport {
    if let MistakesAnalysis::PerQuestion(map) = &report.mistakes_analysis {
        report.mistakes_analysis = MistakesAnalysis::PerQuestion(normalize_mistakes_analysis(map));
    }
    report
}
