//! 연산 빌더 — 조건/매핑 문서를 이벤트 단위 연산으로 컴파일
//!
//! 스테이지 빌더(`check`, `normalize`)는 연산 빌더를 배열 단위로 체이닝
//! 합니다. 정규식 패턴은 빌드 시점에 한 번만 컴파일됩니다.

use regex::Regex;
use serde_json::Value;

use millrace_core::Event;

use crate::error::EngineError;
use crate::stream::{Tracer, UnitOp};

/// 조건 매처 — 빌드 시점에 결정되는 비교 방식
enum CondMatcher {
    /// JSON 값 동등 비교
    Equals(Value),
    /// 정규식 매칭 (`"r:<pattern>"`)
    Regex(Regex),
    /// 필드 존재 확인 (`"+exists"`)
    Exists,
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn stage_error(stage: &str, reason: impl Into<String>) -> EngineError {
    EngineError::Stage {
        stage: stage.to_owned(),
        reason: reason.into(),
    }
}

/// 조건 연산을 빌드합니다.
///
/// 문서는 객체이며 모든 `field: value` 쌍이 성립해야 이벤트가 통과합니다.
/// 문자열 값은 `r:` 접두사로 정규식 매칭, `+exists`로 존재 확인을
/// 지정할 수 있고 그 외에는 동등 비교입니다. 조건 불일치는 해당 필드명을
/// 트레이서에 남기고 이벤트를 폐기합니다.
pub(crate) fn op_condition(def: &Value, tracer: Tracer) -> Result<UnitOp, EngineError> {
    let object = def
        .as_object()
        .ok_or_else(|| stage_error("condition", format!("expected object but got {}", value_kind(def))))?;

    let mut checks = Vec::with_capacity(object.len());
    for (field, value) in object {
        let matcher = match value.as_str() {
            Some("+exists") => CondMatcher::Exists,
            Some(s) => match s.strip_prefix("r:") {
                Some(pattern) => {
                    let regex = Regex::new(pattern).map_err(|e| {
                        stage_error("condition", format!("invalid regex for field '{field}': {e}"))
                    })?;
                    CondMatcher::Regex(regex)
                }
                None => CondMatcher::Equals(value.clone()),
            },
            None => CondMatcher::Equals(value.clone()),
        };
        checks.push((field.clone(), matcher));
    }

    Ok(Box::new(move |event: Event| {
        for (field, matcher) in &checks {
            let passed = match (event.get(field), matcher) {
                (Some(_), CondMatcher::Exists) => true,
                (Some(actual), CondMatcher::Equals(want)) => actual == want,
                (Some(actual), CondMatcher::Regex(regex)) => actual
                    .as_str()
                    .is_some_and(|s| regex.is_match(s)),
                (None, _) => false,
            };
            if !passed {
                tracer.trace(format!("check [{field}] failed"));
                return Ok(None);
            }
        }
        Ok(Some(event))
    }))
}

/// 매핑 연산을 빌드합니다.
///
/// 문서는 객체이며 모든 `field: value` 쌍을 이벤트에 기록합니다.
/// 기록은 copy-on-write이므로 상류가 보는 문서는 변하지 않습니다.
pub(crate) fn op_map(def: &Value, tracer: Tracer) -> Result<UnitOp, EngineError> {
    let object = def
        .as_object()
        .ok_or_else(|| stage_error("map", format!("expected object but got {}", value_kind(def))))?;

    let entries: Vec<(String, Value)> = object
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(Box::new(move |event: Event| {
        let mapped = event.with_fields(entries.iter().cloned());
        tracer.trace(format!("map applied: {} field(s)", entries.len()));
        Ok(Some(mapped))
    }))
}

/// 연산들을 순차 합성합니다.
///
/// 앞선 연산이 이벤트를 폐기하면 나머지는 실행되지 않습니다.
pub(crate) fn chain(ops: Vec<UnitOp>) -> UnitOp {
    Box::new(move |event: Event| {
        let mut current = event;
        for op in &ops {
            match op(current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    })
}

/// `check` 스테이지를 빌드합니다. 조건 문서의 배열이어야 합니다.
pub(crate) fn stage_check(def: &Value, tracer: &Tracer) -> Result<UnitOp, EngineError> {
    let items = def
        .as_array()
        .ok_or_else(|| stage_error("check", format!("expected array but got {}", value_kind(def))))?;

    let mut conditions = Vec::with_capacity(items.len());
    for item in items {
        let condition = op_condition(item, tracer.clone())
            .map_err(|e| stage_error("check", e.to_string()))?;
        conditions.push(condition);
    }
    Ok(chain(conditions))
}

/// `normalize` 스테이지를 빌드합니다. 매핑 문서의 배열이어야 합니다.
pub(crate) fn stage_normalize(def: &Value, tracer: &Tracer) -> Result<UnitOp, EngineError> {
    let items = def
        .as_array()
        .ok_or_else(|| stage_error("normalize", format!("expected array but got {}", value_kind(def))))?;

    let mut mappings = Vec::with_capacity(items.len());
    for item in items {
        let mapping = op_map(item, tracer.clone())
            .map_err(|e| stage_error("normalize", e.to_string()))?;
        mappings.push(mapping);
    }
    Ok(chain(mappings))
}
