mod common;

use proptest::prelude::*;
use serde_json::{Value, json};

use common::{ScriptedTransport, coach, content};
use listening_coach::config::SynthesisConfig;
use listening_coach::recommendation::validate_recommendations;
use listening_coach::schemas::{MaterialCatalogEntry, UserAnswer};

fn answers() -> Vec<UserAnswer> {
    serde_json::from_value(json!([
        {"question_id": 1, "isCorrect": false, "questionTopic": "数字信息"},
        {"question_id": 2, "isCorrect": true, "questionTopic": "主旨理解"}
    ]))
    .unwrap()
}

fn catalog(ids: &[&str]) -> Vec<MaterialCatalogEntry> {
    ids.iter()
        .map(|id| MaterialCatalogEntry::new(*id, format!("Material {}", id)))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn ids_outside_catalog_are_replaced_by_defaults() {
    let transport = ScriptedTransport::new(vec![
        content(r#"{"weak_areas": ["数字信息"], "strong_areas": ["主旨理解"], "performance_score": 50}"#),
        content(
            r#"```json
{"recommendations": [{"id": "x1", "title": "X", "reason": "r", "match_score": 0.9}, {"materialId": "y2"}],
 "improvement_suggestions": "多练习数字听写"}
```"#,
        ),
    ]);
    let outcome = coach(transport.clone())
        .recommend(&answers(), &catalog(&["a", "b", "c", "d"]))
        .await;

    assert_eq!(transport.calls(), 2);
    assert_eq!(outcome.weak_areas, vec!["数字信息"]);
    assert_eq!(outcome.performance_score, 50);
    assert_eq!(outcome.improvement_suggestions, "多练习数字听写");
    let ids: Vec<_> = outcome.recommendations.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);
    assert!(outcome.recommendations.iter().all(|r| r.match_score == 0.7));
    assert!(outcome.recommendations.iter().all(|r| r.material_id == r.id));
}

#[tokio::test(start_paused = true)]
async fn incomplete_analysis_uses_canned_result() {
    let transport = ScriptedTransport::new(vec![
        content(r#"{"weak_areas": ["听力"], "strong_areas": []}"#),
        content(r#"{"recommendations": [{"id": "b", "reason": "fits", "match_score": "88"}]}"#),
    ]);
    let outcome = coach(transport)
        .recommend(&answers(), &catalog(&["a", "b"]))
        .await;

    assert_eq!(outcome.performance_score, 65);
    assert_eq!(outcome.weak_areas, vec!["细节理解", "数字信息"]);
    assert_eq!(outcome.strong_areas, vec!["主旨理解", "推理判断"]);
    assert_eq!(outcome.recommendations.len(), 1);
    assert_eq!(outcome.recommendations[0].title, "Material b");
    assert!((outcome.recommendations[0].match_score - 0.88).abs() < 1e-9);
    assert_eq!(outcome.improvement_suggestions, "");
}

#[tokio::test(start_paused = true)]
async fn missing_recommendations_field_uses_canned_list() {
    let transport = ScriptedTransport::new(vec![
        content(r#"{"weak_areas": ["a"], "strong_areas": ["b"], "performance_score": 0.8}"#),
        content(r#"{"suggestions": "none"}"#),
    ]);
    let outcome = coach(transport)
        .recommend(&answers(), &catalog(&["cet4_001", "2022_06", "other"]))
        .await;

    assert_eq!(outcome.performance_score, 80);
    let ids: Vec<_> = outcome.recommendations.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["2022_06", "cet4_001"]);
    assert_eq!(
        outcome.improvement_suggestions,
        "建议在听力练习中特别注意记录关键数字信息，培养快速捕捉细节的能力。"
    );
}

#[tokio::test(start_paused = true)]
async fn unreachable_service_still_produces_outcome() {
    let transport = ScriptedTransport::new(vec![]);
    let outcome = coach(transport.clone())
        .recommend(&answers(), &catalog(&["cet6_001", "cet4_001"]))
        .await;

    // both stages are answered by the canned payloads after 3 attempts each
    assert_eq!(transport.calls(), 6);
    assert_eq!(outcome.performance_score, 75);
    let ids: Vec<_> = outcome.recommendations.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["cet6_001", "cet4_001"]);

    let wire = serde_json::to_value(&outcome).unwrap();
    assert_eq!(wire["recommendations"][0]["materialId"], "cet6_001");
}

#[tokio::test(start_paused = true)]
async fn empty_catalog_gives_empty_recommendations() {
    let transport = ScriptedTransport::new(vec![]);
    let outcome = coach(transport).recommend(&answers(), &[]).await;
    assert!(outcome.recommendations.is_empty());
    assert!(!outcome.weak_areas.is_empty());
}

fn candidate() -> impl Strategy<Value = Value> {
    let id = || prop::sample::select(vec!["a", "b", "c", "d", "e", "f", ""]);
    (id(), id(), any::<bool>(), 0.0f64..150.0).prop_map(|(id, material_id, use_id, score)| {
        let mut obj = serde_json::Map::new();
        if use_id && !id.is_empty() {
            obj.insert("id".into(), json!(id));
        }
        if !material_id.is_empty() {
            obj.insert("materialId".into(), json!(material_id));
        }
        obj.insert("match_score".into(), json!(score));
        Value::Object(obj)
    })
}

proptest! {
    #[test]
    fn validated_ids_always_come_from_catalog(
        candidates in prop::collection::vec(candidate(), 0..8),
        catalog_ids in prop::sample::subsequence(vec!["a", "b", "c", "d"], 0..=4),
    ) {
        let cat = catalog(&catalog_ids);
        let out = validate_recommendations(candidates, &cat, &SynthesisConfig::default());

        prop_assert!(out.len() <= cat.len());
        for entry in &out {
            prop_assert!(catalog_ids.contains(&entry.id.as_str()));
            prop_assert_eq!(&entry.id, &entry.material_id);
            prop_assert!((0.0..=1.0).contains(&entry.match_score));
        }
        if !cat.is_empty() {
            prop_assert!(!out.is_empty());
        }
    }
}
