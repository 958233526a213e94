//! Shared schema fixture for unit tests

use advisor_config::SchemaConfig;

pub(crate) const SCHEMA: &str = r#"
metadata:
  name: laptop-test
slots:
  usage_purpose:
    type: enum
    description: Main use
    required: true
    priority: 1
    prompt: 請問主要用途？
    values:
      - id: gaming
        display: 遊戲
        keywords: [遊戲, 電競, gaming]
        patterns: ["玩.{0,4}(game|遊戲)"]
        examples: [想打遊戲]
      - id: office
        display: 文書處理
        keywords: [文書, 上班]
        examples: [寫報告用]
    synonyms:
      打電動: gaming
  budget_range:
    type: numeric_range
    description: Budget
    required: true
    priority: 2
    prompt: 預算多少？
    values:
      - { id: under_30k, display: 3萬以下, max: 29999 }
      - { id: 30k_40k, display: 3-4萬, min: 30000, max: 40000 }
      - { id: over_40k, display: 4萬以上, min: 40001 }
  brand:
    type: enum
    description: Preferred brand
    priority: 3
    learnable: true
    indicator_keywords: [品牌, 牌子, brand]
    values:
      - { id: asus, display: 華碩, keywords: [asus] }
      - { id: acer, display: 宏碁, keywords: [acer] }
      - { id: apple, display: 蘋果, keywords: [apple, mac] }
collection_strategy:
  max_turns: 8
dependencies: {}
validation_rules:
  min_confidence: 0.3
fallback_strategy: {}
"#;

pub(crate) fn schema() -> SchemaConfig {
    SchemaConfig::from_yaml_str(SCHEMA).expect("test schema is valid")
}
