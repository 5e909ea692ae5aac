//! 자산(asset) 정의 타입 — 카탈로그와 빌더가 교환하는 데이터 구조
//!
//! 환경(environment)은 디코더/룰/필터/출력 자산의 목록으로 정의됩니다.
//! 각 자산의 `content`는 검증이 끝난 JSON 문서이며, `name`과 `parents`
//! 필드 및 스테이지별 필드(`check`, `normalize` 등)를 담습니다.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 자산 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// 원시 이벤트를 구조화하는 디코더
    Decoder,
    /// 이벤트를 평가하고 주석을 추가하는 룰
    Rule,
    /// 이벤트를 선별적으로 차단하는 필터
    Filter,
    /// 이벤트 부수효과를 기록하는 출력
    Output,
}

impl AssetType {
    /// 문자열에서 자산 종류를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "decoder" => Some(Self::Decoder),
            "rule" => Some(Self::Rule),
            "filter" => Some(Self::Filter),
            "output" => Some(Self::Output),
            _ => None,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decoder => write!(f, "decoder"),
            Self::Rule => write!(f, "rule"),
            Self::Filter => write!(f, "filter"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// 자산 정의 — 종류와 검증된 내용 문서
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDefinition {
    /// 자산 종류
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    /// 자산 내용 (`name`, `parents`, 스테이지 필드)
    pub content: Value,
}

impl AssetDefinition {
    /// 새 자산 정의를 생성합니다.
    pub fn new(asset_type: AssetType, content: Value) -> Self {
        Self {
            asset_type,
            content,
        }
    }

    /// 내용 문서의 `name` 필드를 반환합니다.
    pub fn name(&self) -> Option<&str> {
        self.content.get("name").and_then(Value::as_str)
    }
}

/// 환경 정의 — 이름과 자산 목록
///
/// 목록의 순서는 의미를 갖지 않습니다. 빌더가 종류별로 분류합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDefinition {
    /// 환경 이름
    pub name: String,
    /// 자산 목록
    pub assets: Vec<AssetDefinition>,
}

impl EnvironmentDefinition {
    /// 새 환경 정의를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assets: Vec::new(),
        }
    }

    /// 자산을 추가하고 자신을 반환합니다 (빌더 스타일).
    pub fn with_asset(mut self, asset_type: AssetType, content: Value) -> Self {
        self.assets.push(AssetDefinition::new(asset_type, content));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn asset_type_display() {
        assert_eq!(AssetType::Decoder.to_string(), "decoder");
        assert_eq!(AssetType::Rule.to_string(), "rule");
        assert_eq!(AssetType::Filter.to_string(), "filter");
        assert_eq!(AssetType::Output.to_string(), "output");
    }

    #[test]
    fn asset_type_from_str_loose() {
        assert_eq!(AssetType::from_str_loose("DECODER"), Some(AssetType::Decoder));
        assert_eq!(AssetType::from_str_loose("Rule"), Some(AssetType::Rule));
        assert_eq!(AssetType::from_str_loose("unknown"), None);
    }

    #[test]
    fn asset_type_serde_uses_snake_case() {
        let json = serde_json::to_string(&AssetType::Output).unwrap();
        assert_eq!(json, "\"output\"");
        let back: AssetType = serde_json::from_str("\"filter\"").unwrap();
        assert_eq!(back, AssetType::Filter);
    }

    #[test]
    fn asset_definition_name() {
        let asset = AssetDefinition::new(
            AssetType::Decoder,
            json!({"name": "syslog", "parents": []}),
        );
        assert_eq!(asset.name(), Some("syslog"));

        let unnamed = AssetDefinition::new(AssetType::Decoder, json!({}));
        assert_eq!(unnamed.name(), None);
    }

    #[test]
    fn environment_definition_builder() {
        let def = EnvironmentDefinition::new("prod")
            .with_asset(AssetType::Decoder, json!({"name": "d1"}))
            .with_asset(AssetType::Output, json!({"name": "o1"}));
        assert_eq!(def.name, "prod");
        assert_eq!(def.assets.len(), 2);
        assert_eq!(def.assets[0].asset_type, AssetType::Decoder);
    }

    #[test]
    fn environment_definition_deserialize() {
        let def: EnvironmentDefinition = serde_json::from_value(json!({
            "name": "test",
            "assets": [
                {"type": "decoder", "content": {"name": "d1"}},
                {"type": "filter", "content": {"name": "f1", "parents": ["d1"]}}
            ]
        }))
        .unwrap();
        assert_eq!(def.assets.len(), 2);
        assert_eq!(def.assets[1].asset_type, AssetType::Filter);
        assert_eq!(def.assets[1].name(), Some("f1"));
    }
}
