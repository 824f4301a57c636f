//! Custom deserializers for loosely-typed model output and caller input.
//!
//! The generative service rarely honours a schema exactly: scores arrive as strings,
//! tag lists arrive as a single comma-separated string, question ids arrive as numbers.
//! These helpers accept the common variants while keeping the Rust types strict.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Renders any JSON scalar as text; strings are returned without quotes.
pub fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Collects a list of strings from a JSON value.
///
/// # Accepted Formats
///
/// * **Array**: `["a", "b"]`; non-string items are rendered as text, objects with a
///   `word`/`term`/`phrase`/`expression`/`text` key contribute that key's value
/// * **String**: `"a, b"` or `"a，b"` is split on ASCII and full-width commas
/// * **Null / missing**: empty list
pub fn string_list(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let text = match item {
                    Value::Object(obj) => ["word", "term", "phrase", "expression", "text"]
                        .iter()
                        .find_map(|k| obj.get(*k).and_then(|x| x.as_str()))
                        .map(str::to_string)
                        .unwrap_or_else(|| item.to_string()),
                    other => value_to_text(other),
                };
                let text = text.trim().to_string();
                (!text.is_empty()).then_some(text)
            })
            .collect(),
        Value::String(s) => s
            .split([',', '，', '、'])
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Serde adapter for [`string_list`].
pub fn de_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    Ok(string_list(&v))
}

/// Accepts a question identifier given as a string or a number.
///
/// ```json
/// { "question_id": 3 }     // → Some("3")
/// { "question_id": "q3" }  // → Some("q3")
/// ```
pub fn de_option_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let opt = Option::<Value>::deserialize(deserializer)?;
    match opt {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "invalid type for identifier: {}",
            other
        ))),
    }
}

/// Parses a number that may be wrapped in a string (`"0.85"`, `"85%"`).
pub fn number_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if let Some(pct) = s.strip_suffix('%') {
                pct.trim().parse::<f64>().ok().map(|p| p / 100.0)
            } else {
                s.parse::<f64>().ok()
            }
        }
        _ => None,
    }
    .filter(|f| f.is_finite())
}

/// Deserializes a plain number that may arrive as a string.
pub fn de_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let v = Value::deserialize(deserializer)?;
    number_from_value(&v).ok_or_else(|| D::Error::custom(format!("invalid number: {}", v)))
}

/// Deserializes a 0-100 performance score, rounding and clamping.
///
/// Fractions in `0.0..=1.0` that are not whole numbers are read as ratios
/// (`0.65` → 65); everything else is taken on the 0-100 scale.
pub fn de_score_0_100<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let v = Value::deserialize(deserializer)?;
    let raw = number_from_value(&v)
        .ok_or_else(|| D::Error::custom(format!("invalid performance score: {}", v)))?;
    Ok(score_0_100(raw))
}

pub fn score_0_100(raw: f64) -> u8 {
    let scaled = if raw > 0.0 && raw < 1.0 { raw * 100.0 } else { raw };
    scaled.round().clamp(0.0, 100.0) as u8
}

/// Deserializes a 0-1 match score; values above 1 are read as percentages.
pub fn de_match_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    Ok(number_from_value(&v).map(match_score).unwrap_or(0.0))
}

pub fn match_score(raw: f64) -> f64 {
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 1.0)
}

/// Deserializes free text; non-string values are rendered rather than rejected.
pub fn de_lossy_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    Ok(match &v {
        Value::Array(_) => string_list(&v).join("\n"),
        other => value_to_text(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_list_accepts_arrays_and_comma_strings() {
        assert_eq!(string_list(&json!(["a", " b ", ""])), vec!["a", "b"]);
        assert_eq!(string_list(&json!("细节理解，数字信息, 推理")), vec![
            "细节理解",
            "数字信息",
            "推理"
        ]);
        assert!(string_list(&json!(null)).is_empty());
    }

    #[test]
    fn string_list_pulls_word_from_objects() {
        let v = json!([{"word": "curriculum", "meaning": "课程"}, 42]);
        assert_eq!(string_list(&v), vec!["curriculum", "42"]);
    }

    #[test]
    fn scores_are_coerced() {
        assert_eq!(score_0_100(65.4), 65);
        assert_eq!(score_0_100(0.65), 65);
        assert_eq!(score_0_100(140.0), 100);
        assert_eq!(score_0_100(-3.0), 0);
        assert_eq!(match_score(92.0), 0.92);
        assert_eq!(match_score(0.7), 0.7);
        assert_eq!(number_from_value(&json!("85%")), Some(0.85));
        assert_eq!(number_from_value(&json!("abc")), None);
    }

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "de_option_id")]
        id: Option<String>,
    }

    #[test]
    fn ids_accept_numbers_and_strings() {
        let p: Probe = serde_json::from_value(json!({"id": 7})).unwrap();
        assert_eq!(p.id.as_deref(), Some("7"));
        let p: Probe = serde_json::from_value(json!({"id": " q2 "})).unwrap();
        assert_eq!(p.id.as_deref(), Some("q2"));
        let p: Probe = serde_json::from_value(json!({})).unwrap();
        assert!(p.id.is_none());
        assert!(serde_json::from_value::<Probe>(json!({"id": [1]})).is_err());
    }
}
