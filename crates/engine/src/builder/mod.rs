//! 자산 빌더 — 카탈로그 내용 문서를 connectable로 컴파일
//!
//! [`Registry`]는 자산 종류별 빌더 함수의 테이블입니다. 기본 빌더는
//! `decoder`/`rule`/`filter`/`output` 네 종류를 처리하며, 임베더는
//! [`register`](Registry::register)로 교체하거나 추가할 수 있습니다.
//!
//! 각 빌더는 내용 문서의 `name`과 `parents`를 읽고, 스테이지 필드
//! (`check`, `normalize`)를 연산 체인으로 컴파일하여 리프트 함수로
//! 감쌉니다. 스테이지/연산 빌더의 실패는 자산 이름과 함께 래핑되어
//! 전파됩니다.

mod ops;

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use millrace_core::AssetType;

use crate::connectable::{Connectable, NodeKind};
use crate::error::EngineError;
use crate::stream::{lift_unit, Tracer, UnitOp};

use ops::{chain, stage_check, stage_normalize};

/// 자산 빌더 함수 타입
///
/// 검증된 내용 문서를 받아 connectable을 생성합니다.
pub type AssetBuilder = fn(&Value) -> Result<Connectable, EngineError>;

/// 자산 종류 → 빌더 함수 테이블
pub struct Registry {
    builders: HashMap<AssetType, AssetBuilder>,
}

impl Registry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// 기본 빌더 세트가 등록된 레지스트리를 생성합니다.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(AssetType::Decoder, build_decoder);
        registry.register(AssetType::Rule, build_rule);
        registry.register(AssetType::Filter, build_filter);
        registry.register(AssetType::Output, build_output);
        registry
    }

    /// 빌더를 등록합니다. 기존 등록은 교체됩니다.
    pub fn register(&mut self, asset_type: AssetType, builder: AssetBuilder) {
        self.builders.insert(asset_type, builder);
    }

    /// 자산 종류에 맞는 빌더로 connectable을 생성합니다.
    pub fn build(&self, asset_type: AssetType, content: &Value) -> Result<Connectable, EngineError> {
        let builder = self
            .builders
            .get(&asset_type)
            .ok_or_else(|| EngineError::UnknownAssetKind(asset_type.to_string()))?;
        builder(content)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// 내용 문서에서 필수 `name` 필드를 읽습니다.
fn content_name(content: &Value) -> Result<String, EngineError> {
    content
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| EngineError::Asset {
            name: "<unnamed>".to_owned(),
            reason: "content is missing a 'name' string field".to_owned(),
        })
}

/// 내용 문서에서 선택적 `parents` 배열을 읽습니다.
fn content_parents(content: &Value, name: &str) -> Result<BTreeSet<String>, EngineError> {
    let Some(parents) = content.get("parents") else {
        return Ok(BTreeSet::new());
    };
    let items = parents.as_array().ok_or_else(|| EngineError::Asset {
        name: name.to_owned(),
        reason: "'parents' must be an array of strings".to_owned(),
    })?;

    let mut set = BTreeSet::new();
    for item in items {
        let parent = item.as_str().ok_or_else(|| EngineError::Asset {
            name: name.to_owned(),
            reason: "'parents' must be an array of strings".to_owned(),
        })?;
        set.insert(parent.to_owned());
    }
    Ok(set)
}

fn asset_error(name: &str, err: EngineError) -> EngineError {
    EngineError::Asset {
        name: name.to_owned(),
        reason: err.to_string(),
    }
}

/// `check` 게이트와 `normalize` 체인으로 구성되는 자산의 공통 빌드 경로
fn build_checked_asset(content: &Value, kind: NodeKind) -> Result<Connectable, EngineError> {
    let name = content_name(content)?;
    let parents = content_parents(content, &name)?;
    let tracer = Tracer::new(name.clone());

    let mut ops: Vec<UnitOp> = Vec::new();
    if let Some(check) = content.get("check") {
        ops.push(stage_check(check, &tracer).map_err(|e| asset_error(&name, e))?);
    }
    if let Some(normalize) = content.get("normalize") {
        ops.push(stage_normalize(normalize, &tracer).map_err(|e| asset_error(&name, e))?);
    }

    let lift = lift_unit(chain(ops), tracer.clone());
    Ok(Connectable::new(name, kind, parents, tracer, Some(lift)))
}

/// 디코더 자산 빌더
///
/// 선택적 `check` 게이트 뒤에 선택적 `normalize` 체인이 이어집니다.
/// 둘 다 없으면 항등 통과입니다.
pub fn build_decoder(content: &Value) -> Result<Connectable, EngineError> {
    build_checked_asset(content, NodeKind::Decoder)
}

/// 룰 자산 빌더
///
/// 매칭된 이벤트에 `normalize`로 주석을 추가합니다. 매칭되지 않은
/// 이벤트는 룰 분기에서만 제외될 뿐, 출력 스테이지는 디코더 원본
/// 스트림으로도 이벤트를 수신합니다.
pub fn build_rule(content: &Value) -> Result<Connectable, EngineError> {
    build_checked_asset(content, NodeKind::Rule)
}

/// 필터 자산 빌더
///
/// `check` 스테이지가 필수이며, 조건에 맞지 않는 이벤트를 폐기합니다.
pub fn build_filter(content: &Value) -> Result<Connectable, EngineError> {
    let name = content_name(content)?;
    let parents = content_parents(content, &name)?;
    let tracer = Tracer::new(name.clone());

    let check = content.get("check").ok_or_else(|| EngineError::Asset {
        name: name.clone(),
        reason: "filter requires a 'check' stage".to_owned(),
    })?;
    let op = stage_check(check, &tracer).map_err(|e| asset_error(&name, e))?;

    let lift = lift_unit(op, tracer.clone());
    Ok(Connectable::new(
        name,
        NodeKind::Filter,
        parents,
        tracer,
        Some(lift),
    ))
}

/// 출력 자산 빌더
///
/// 선택적 `check` 게이트를 통과한 이벤트를 JSON으로 직렬화하여 자신의
/// 트레이스 싱크에 기록합니다. 이벤트는 변경 없이 하류로 통과합니다.
pub fn build_output(content: &Value) -> Result<Connectable, EngineError> {
    let name = content_name(content)?;
    let parents = content_parents(content, &name)?;
    let tracer = Tracer::new(name.clone());

    let mut ops: Vec<UnitOp> = Vec::new();
    if let Some(check) = content.get("check") {
        ops.push(stage_check(check, &tracer).map_err(|e| asset_error(&name, e))?);
    }

    let sink = tracer.clone();
    ops.push(Box::new(move |event| {
        sink.trace(event.to_string());
        Ok(Some(event))
    }));

    let lift = lift_unit(chain(ops), tracer.clone());
    Ok(Connectable::new(
        name,
        NodeKind::Output,
        parents,
        tracer,
        Some(lift),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_with_defaults_builds_all_kinds() {
        let registry = Registry::with_defaults();
        for (asset_type, kind) in [
            (AssetType::Decoder, NodeKind::Decoder),
            (AssetType::Rule, NodeKind::Rule),
            (AssetType::Output, NodeKind::Output),
        ] {
            let conn = registry
                .build(asset_type, &json!({"name": "a1"}))
                .unwrap();
            assert_eq!(conn.kind(), kind);
        }
    }

    #[test]
    fn empty_registry_reports_unknown_kind() {
        let registry = Registry::new();
        let err = registry
            .build(AssetType::Decoder, &json!({"name": "d1"}))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownAssetKind(kind) if kind == "decoder"));
    }

    #[test]
    fn builder_requires_name() {
        let err = build_decoder(&json!({"parents": []})).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn builder_reads_parents() {
        let conn = build_decoder(&json!({"name": "d2", "parents": ["d1", "d0"]})).unwrap();
        let parents: Vec<&str> = conn.parents().iter().map(String::as_str).collect();
        assert_eq!(parents, vec!["d0", "d1"]);
    }

    #[test]
    fn builder_rejects_non_string_parents() {
        let err = build_decoder(&json!({"name": "d1", "parents": [1, 2]})).unwrap_err();
        assert!(matches!(err, EngineError::Asset { .. }));
    }

    #[test]
    fn filter_without_check_is_rejected() {
        let err = build_filter(&json!({"name": "f1", "parents": ["d1"]})).unwrap_err();
        assert!(err.to_string().contains("check"));
    }

    #[test]
    fn stage_failure_is_wrapped_with_asset_name() {
        let err = build_decoder(&json!({
            "name": "d1",
            "check": {"not": "an array"}
        }))
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("d1"));
        assert!(msg.contains("check"));
    }
}
