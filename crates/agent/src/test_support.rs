//! Shared fixtures for unit tests

use advisor_config::{SchemaConfig, SpecialCasesConfig};
use advisor_text_processing::PatternMatcher;
use std::sync::Arc;

use crate::special_cases::SpecialCaseKnowledgeBase;

pub(crate) const SCHEMA: &str = r#"
metadata:
  name: laptop-test
slots:
  usage_purpose:
    type: enum
    description: Main use
    required: true
    priority: 1
    default: office
    prompt: 請問主要用途是？
    options_in_prompt: true
    values:
      - id: gaming
        display: 遊戲
        keywords: [遊戲, 電競, gaming]
        examples: [晚上想打遊戲]
      - id: office
        display: 文書處理
        keywords: [文書, 上班]
        examples: [寫報告用]
      - id: creator
        display: 影音創作
        keywords: [剪片, 修圖]
    synonyms:
      打電動: gaming
  budget_range:
    type: numeric_range
    description: Budget
    required: true
    priority: 2
    prompt: 預算大概多少？
    values:
      - { id: under_30k, display: 3萬以下, max: 29999 }
      - { id: 30k_40k, display: 3-4萬, min: 30000, max: 40000 }
      - { id: over_40k, display: 4萬以上, min: 40001 }
  gpu_level:
    type: enum
    description: Graphics
    priority: 3
    prompt: 需要獨立顯卡嗎？
    values:
      - { id: integrated, display: 內顯, keywords: [內顯] }
      - { id: dedicated, display: 獨顯, keywords: [獨顯, 獨立顯卡] }
  portability:
    type: enum
    description: Weight class
    priority: 4
    values:
      - { id: light, display: 輕薄, keywords: [輕薄, 輕一點] }
      - { id: standard, display: 一般, keywords: [一般重量] }
  brand:
    type: enum
    description: Preferred brand
    priority: 5
    learnable: true
    indicator_keywords: [品牌, 牌子]
    values:
      - { id: asus, display: 華碩, keywords: [asus] }
      - { id: acer, display: 宏碁, keywords: [acer] }
  notes:
    type: text
    description: Anything else
    priority: 9
    prompt: 還有其他需求嗎？
collection_strategy:
  max_turns: 10
  max_attempts_per_slot: 2
dependencies:
  usage_purpose:
    influences: [gpu_level, portability, budget_range]
    rules:
      - when: gaming
        set: { portability: standard }
        suggest: { budget_range: 30k_40k }
        narrow: { budget_range: [30k_40k, over_40k] }
        require: [gpu_level]
  portability:
    influences: [gpu_level]
    rules:
      - when: light
        make_optional: [gpu_level]
validation_rules:
  min_confidence: 0.3
fallback_strategy: {}
"#;

pub(crate) const CASES: &str = r#"
repeat_threshold: 2
history_window: 8
cases:
  - id: just_recommend
    examples: [隨便推薦就好, 你幫我選]
    directive:
      response: 好的，我先幫您挑熱門款。
      force_search: true
  - id: dont_know
    examples: [不知道, 不清楚]
    directive:
      response: 沒關係，我換個方式問。
      clarify: true
  - id: student
    examples: [我是學生]
    inferred_slots: { budget_range: under_30k }
"#;

pub(crate) fn schema() -> Arc<SchemaConfig> {
    Arc::new(SchemaConfig::from_yaml_str(SCHEMA).expect("test schema is valid"))
}

pub(crate) fn matcher() -> Arc<PatternMatcher> {
    Arc::new(PatternMatcher::new(schema()))
}

pub(crate) fn kb() -> Arc<SpecialCaseKnowledgeBase> {
    let config = SpecialCasesConfig::from_yaml_str(CASES).expect("test cases are valid");
    Arc::new(SpecialCaseKnowledgeBase::new(&config))
}
