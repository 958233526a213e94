//! End-to-end dialogue tests against the shipped laptop schema and
//! special-case catalogue

use advisor_agent::{
    DialogueAction, DialogueEngine, DialogueEngineBuilder, ForceReason, InMemorySessionStore,
};
use advisor_config::{SchemaConfig, Settings};
use advisor_core::{CatalogSearch, DialogueStage, ExtractionMethod, SearchRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

fn config_path(relative: &str) -> String {
    format!("{}/../../config/{}", env!("CARGO_MANIFEST_DIR"), relative)
}

fn settings() -> Settings {
    Settings {
        schema_path: config_path("slots/laptop.yaml"),
        special_cases_path: config_path("special_cases.yaml"),
        ..Settings::default()
    }
}

fn builder() -> DialogueEngineBuilder {
    DialogueEngineBuilder::from_settings(&settings()).expect("shipped config loads")
}

fn engine() -> DialogueEngine {
    builder().build().expect("engine builds")
}

#[derive(Default)]
struct RecordingCatalog {
    requests: Mutex<Vec<SearchRequest>>,
}

#[async_trait]
impl CatalogSearch for RecordingCatalog {
    async fn submit(&self, request: &SearchRequest) -> advisor_core::Result<()> {
        self.requests.lock().push(request.clone());
        Ok(())
    }
}

struct FailingCatalog;

#[async_trait]
impl CatalogSearch for FailingCatalog {
    async fn submit(&self, _request: &SearchRequest) -> advisor_core::Result<()> {
        Err(advisor_core::Error::Catalog("catalog offline".to_string()))
    }
}

#[test]
fn test_shipped_schema_is_valid() {
    let schema = SchemaConfig::load(config_path("slots/laptop.yaml")).unwrap();
    assert_eq!(schema.required_slots(), vec!["usage_purpose", "budget_range"]);
}

#[tokio::test]
async fn test_gaming_laptop_request() {
    let engine = engine();
    let outcome = engine.process_turn("a", "我想要一台遊戲筆電").await.unwrap();

    let extraction = outcome.extraction.unwrap();
    let usage = extraction.slot("usage_purpose").unwrap();
    assert_eq!(usage.value, "gaming");
    assert!(usage.confidence > 0.3);
    assert_eq!(extraction.extraction_method, Some(ExtractionMethod::PatternMatch));
    assert_eq!(ExtractionMethod::PatternMatch.as_str(), "pattern_match");
}

#[tokio::test]
async fn test_two_turns_reach_ready() {
    let engine = engine();

    let first = engine.process_turn("b", "文書處理").await.unwrap();
    assert_eq!(first.slots["usage_purpose"], "office");
    match &first.action {
        DialogueAction::Elicit { slots, .. } => assert_eq!(slots, &vec!["budget_range".to_string()]),
        other => panic!("unexpected action {:?}", other),
    }

    let second = engine.process_turn("b", "3-4萬").await.unwrap();
    assert_eq!(second.slots["usage_purpose"], "office");
    assert_eq!(second.slots["budget_range"], "30k_40k");
    assert_eq!(second.stage, DialogueStage::Ready);
    let request = second.action.search_request().unwrap();
    assert!(!request.forced);
    assert!(request.defaulted.is_empty());
}

#[tokio::test]
async fn test_empty_input_leaves_session_unchanged() {
    let engine = engine();
    engine.process_turn("c", "文書處理").await.unwrap();
    let before = engine.session("c").await.unwrap().unwrap();

    let outcome = engine.process_turn("c", "").await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.changes.is_empty());

    let after = engine.session("c").await.unwrap().unwrap();
    assert_eq!(after.turns.len(), before.turns.len());
    assert_eq!(after.slot_map(), before.slot_map());
    assert_eq!(after.elicitation_counts, before.elicitation_counts);
}

#[tokio::test]
async fn test_gaming_requires_gpu_and_accepts_ordinal() {
    let engine = engine();

    let first = engine.process_turn("g", "想買電競筆電").await.unwrap();
    assert_eq!(first.slots["usage_purpose"], "gaming");
    // implied by the gaming rule
    assert_eq!(first.slots["portability"], "standard");

    let second = engine.process_turn("g", "3萬5左右").await.unwrap();
    assert_eq!(second.slots["budget_range"], "30k_40k");
    match &second.action {
        DialogueAction::Elicit { slots, options, .. } => {
            assert_eq!(slots, &vec!["gpu_level".to_string()]);
            assert_eq!(options.len(), 3);
        },
        other => panic!("unexpected action {:?}", other),
    }

    let third = engine.process_turn("g", "2").await.unwrap();
    assert_eq!(third.slots["gpu_level"], "entry");
    assert_eq!(
        third.extraction.unwrap().extraction_method,
        Some(ExtractionMethod::OptionSelection)
    );
    assert_eq!(third.stage, DialogueStage::Ready);
}

#[tokio::test]
async fn test_option_reply_to_first_question() {
    let engine = engine();
    let first = engine.process_turn("o", "嗯").await.unwrap();
    assert!(matches!(first.action, DialogueAction::Elicit { ref options, .. } if !options.is_empty()));

    let second = engine.process_turn("o", "第一個").await.unwrap();
    assert_eq!(second.slots["usage_purpose"], "gaming");
}

#[tokio::test]
async fn test_repeated_vague_answer_terminates() {
    let engine = engine();

    let first = engine.process_turn("loop", "不知道").await.unwrap();
    assert!(matches!(first.action, DialogueAction::Clarify { .. }));
    assert!(first.response.starts_with("沒關係"));

    let second = engine.process_turn("loop", "不知道").await.unwrap();
    assert!(matches!(second.action, DialogueAction::Clarify { .. }));

    let third = engine.process_turn("loop", "不知道").await.unwrap();
    assert_eq!(third.forced, Some(ForceReason::LoopBreaker));
    assert_eq!(third.stage, DialogueStage::Ready);
    let request = third.action.search_request().unwrap();
    assert!(request.forced);
    assert_eq!(request.slots["usage_purpose"], "office");
}

#[tokio::test]
async fn test_elicitation_is_bounded() {
    let engine = engine();
    let max_attempts = engine.matcher().schema().collection_strategy.max_attempts_per_slot as usize;

    let replies = ["嗯", "讓我想想", "這個嘛", "還在考慮"];
    let mut searched_at = None;
    for (i, reply) in replies.iter().enumerate() {
        let outcome = engine.process_turn("bounded", reply).await.unwrap();
        if outcome.action.is_search() {
            assert_eq!(outcome.forced, Some(ForceReason::MaxAttempts));
            searched_at = Some(i + 1);
            break;
        }
    }
    assert_eq!(searched_at, Some(max_attempts + 1));
}

#[tokio::test]
async fn test_just_recommend_forces_search() {
    let engine = engine();
    let outcome = engine.process_turn("r", "隨便推薦就好").await.unwrap();

    assert_eq!(outcome.forced, Some(ForceReason::SpecialCase));
    assert!(outcome.response.contains("熱門機種"));
    let request = outcome.action.search_request().unwrap();
    assert_eq!(request.slots["usage_purpose"], "office");
    assert!(request.defaulted.contains(&"usage_purpose".to_string()));
    assert!(!request.slots.contains_key("budget_range"));
}

#[tokio::test]
async fn test_student_case_fills_and_infers() {
    let engine = engine();
    let outcome = engine.process_turn("s", "我是學生").await.unwrap();

    let extraction = outcome.extraction.as_ref().unwrap();
    assert_eq!(extraction.case_id.as_deref(), Some("student_budget"));
    assert_eq!(extraction.extraction_method, Some(ExtractionMethod::SpecialCaseKnowledge));
    assert_eq!(outcome.slots["usage_purpose"], "student");
    assert_eq!(outcome.slots["budget_range"], "20k_30k");
    assert_eq!(outcome.slots["portability"], "light");
    assert_eq!(outcome.stage, DialogueStage::Ready);

    let stats = engine.knowledge_base().stats("student_budget").unwrap();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.successes, 1);
}

#[tokio::test]
async fn test_same_input_twice_changes_nothing() {
    let engine = engine();
    let first = engine.process_turn("i", "文書處理").await.unwrap();
    assert_eq!(first.changes.len(), 1);

    let second = engine.process_turn("i", "文書處理").await.unwrap();
    assert!(second.changes.is_empty());
    assert_eq!(second.slots, first.slots);
}

#[tokio::test]
async fn test_weaker_value_does_not_overwrite() {
    let engine = engine();
    engine.process_turn("w", "文書處理").await.unwrap();

    let outcome = engine.process_turn("w", "遊戲").await.unwrap();
    assert_eq!(outcome.slots["usage_purpose"], "office");
    let extraction = outcome.extraction.unwrap();
    assert!(extraction.rejected.iter().any(|m| m.value == "gaming"));
}

#[tokio::test]
async fn test_explicit_correction_replaces_value() {
    let engine = engine();
    engine.process_turn("fix", "文書處理").await.unwrap();

    let outcome = engine.process_turn("fix", "不對，我其實是要玩遊戲的電競筆電").await.unwrap();
    assert_eq!(outcome.slots["usage_purpose"], "gaming");
    assert!(outcome.changes.iter().any(|c| c.slot_name == "usage_purpose"));
}

#[tokio::test]
async fn test_ambiguous_answer_after_ready_clarifies() {
    let engine = engine();
    let first = engine.process_turn("rc", "隨便推薦就好").await.unwrap();
    assert_eq!(first.stage, DialogueStage::Ready);

    let second = engine.process_turn("rc", "剪片跟寫程式都會用").await.unwrap();
    assert_eq!(second.stage, DialogueStage::Clarifying);
    match &second.action {
        DialogueAction::Clarify { slot, options, .. } => {
            assert_eq!(slot.as_deref(), Some("usage_purpose"));
            let ids: Vec<&str> = options.iter().map(|o| o.id.as_str()).collect();
            assert!(ids.contains(&"creator") && ids.contains(&"programming"));
        },
        other => panic!("unexpected action {:?}", other),
    }
}

#[tokio::test]
async fn test_new_requirement_after_ready_collects() {
    let engine = engine();
    let first = engine.process_turn("rn", "隨便推薦就好").await.unwrap();
    assert_eq!(first.stage, DialogueStage::Ready);

    let second = engine.process_turn("rn", "想買電競筆電").await.unwrap();
    assert_eq!(second.slots["usage_purpose"], "gaming");
    assert_eq!(second.stage, DialogueStage::Collecting);
    assert!(matches!(second.action, DialogueAction::Elicit { .. }));
}

#[tokio::test]
async fn test_indifferent_brand_answer_is_not_learned() {
    let engine = engine();
    for (i, text) in ["牌子都可以", "品牌沒有特別偏好", "Recommend a light one"].iter().enumerate() {
        let outcome = engine.process_turn(&format!("nb{}", i), text).await.unwrap();
        assert!(!outcome.slots.contains_key("brand"), "brand learned from '{}'", text);
    }
    assert!(engine.matcher().learning_history().is_empty());
}

#[tokio::test]
async fn test_idle_sessions_release_loop_state() {
    let store = Arc::new(InMemorySessionStore::new().with_idle_timeout(std::time::Duration::from_millis(1)));
    let engine = builder().session_store(store.clone()).build().unwrap();

    for i in 0..10 {
        engine.process_turn(&format!("idle{}", i), "不知道").await.unwrap();
    }
    assert_eq!(engine.knowledge_base().tracked_sessions(), 10);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(engine.purge_expired_sessions().await.unwrap(), 10);
    assert!(store.is_empty());
    assert_eq!(engine.knowledge_base().tracked_sessions(), 0);
}

#[tokio::test]
async fn test_filled_values_are_allowed() {
    let engine = engine();
    let schema = Arc::clone(engine.matcher().schema());

    for text in ["想買電競筆電", "預算4萬以下", "要輕薄一點", "14吋就好", "牌子要華碩", "要有背光鍵盤"] {
        let outcome = engine.process_turn("m", text).await.unwrap();
        for (slot, value) in &outcome.slots {
            assert!(
                schema.is_allowed_value(slot, value),
                "{} = {} after '{}'",
                slot,
                value,
                text
            );
        }
    }
}

#[tokio::test]
async fn test_learned_brand_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("learned.json");
    let mut settings = settings();
    settings.learning.store_path = Some(store_path.display().to_string());

    let engine = DialogueEngineBuilder::from_settings(&settings).unwrap().build().unwrap();
    let outcome = engine.process_turn("l1", "我想要Framework的筆電").await.unwrap();
    assert_eq!(outcome.slots["brand"], "framework");

    // persistence runs in the background
    for _ in 0..100 {
        if store_path.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(store_path.exists());

    let restarted = DialogueEngineBuilder::from_settings(&settings).unwrap().build().unwrap();
    assert!(restarted.matcher().is_allowed("brand", "framework"));
}

#[tokio::test]
async fn test_catalog_receives_request() {
    let catalog = Arc::new(RecordingCatalog::default());
    let engine = builder().catalog(catalog.clone()).build().unwrap();

    engine.process_turn("cat", "文書處理").await.unwrap();
    assert!(catalog.requests.lock().is_empty());

    engine.process_turn("cat", "3-4萬").await.unwrap();
    let requests = catalog.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].session_id, "cat");
    assert_eq!(requests[0].slots["budget_range"], "30k_40k");
}

#[tokio::test]
async fn test_catalog_failure_does_not_fail_turn() {
    let engine = builder().catalog(Arc::new(FailingCatalog)).build().unwrap();
    engine.process_turn("f", "文書處理").await.unwrap();

    let outcome = engine.process_turn("f", "3-4萬").await.unwrap();
    assert!(outcome.action.is_search());
    assert_eq!(engine.session("f").await.unwrap().unwrap().stage, DialogueStage::Ready);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let engine = Arc::new(engine());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let session = format!("p{}", i);
                engine.process_turn(&session, "文書處理").await.unwrap();
                engine.process_turn(&session, "3-4萬").await.unwrap()
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.stage, DialogueStage::Ready);
        assert_eq!(outcome.slots.len(), 2);
    }
}
