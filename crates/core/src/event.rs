//! 이벤트 문서 — 파이프라인을 흐르는 기본 단위
//!
//! [`Event`]는 불변 JSON 문서입니다. 노드 간에는 참조(`Arc`)로 전달되며,
//! 필드 추가는 copy-on-write로 새 문서를 생성합니다. 한 노드의 수정이
//! 다른 노드가 보는 뷰에 영향을 주지 않습니다.
//!
//! 와이어 형식 `queue ":" location ":" message`의 파싱은
//! [`Event::from_wire`]가 담당합니다.

use std::fmt;
use std::sync::Arc;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseError;

/// 이벤트 필드 맵 타입 별칭
pub type Fields = serde_json::Map<String, Value>;

// 와이어 형식의 고정 필드명
const FIELD_QUEUE: &str = "queue";
const FIELD_LOCATION: &str = "location";
const FIELD_MESSAGE: &str = "message";

/// 불변 이벤트 문서
///
/// 내부적으로 `Arc<Map>`을 공유하므로 clone은 참조 카운트 증가만 수행합니다.
/// 디코더/룰이 필드를 추가할 때는 [`with_field`](Event::with_field) 또는
/// [`with_fields`](Event::with_fields)로 새 문서를 만듭니다.
#[derive(Debug, Clone, Default)]
pub struct Event {
    fields: Arc<Fields>,
}

impl Event {
    /// 빈 이벤트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 필드 맵으로부터 이벤트를 생성합니다.
    pub fn from_fields(fields: Fields) -> Self {
        Self {
            fields: Arc::new(fields),
        }
    }

    /// 와이어 형식 `queue ":" location ":" message`를 파싱합니다.
    ///
    /// - 첫 `:` 앞은 부호 있는 정수 `queue`여야 합니다.
    /// - 첫 `:`와 둘째 `:` 사이가 `location`입니다.
    /// - 둘째 `:` 뒤 전체가 `message`입니다. 둘째 `:`가 없으면 나머지가
    ///   `location`이 되고 `message`는 빈 문자열입니다.
    pub fn from_wire(raw: &str) -> Result<Self, ParseError> {
        let queue_end = raw.find(':').ok_or(ParseError::Truncated)?;
        let queue: i64 = raw[..queue_end].parse().map_err(|_| ParseError::QueueId {
            input: raw[..queue_end].to_owned(),
        })?;

        let rest = &raw[queue_end + 1..];
        let (location, message) = match rest.find(':') {
            Some(loc_end) => (&rest[..loc_end], &rest[loc_end + 1..]),
            None => (rest, ""),
        };

        let mut fields = Fields::new();
        fields.insert(FIELD_QUEUE.to_owned(), Value::from(queue));
        fields.insert(FIELD_LOCATION.to_owned(), Value::from(location));
        fields.insert(FIELD_MESSAGE.to_owned(), Value::from(message));
        Ok(Self::from_fields(fields))
    }

    /// 필드 값을 조회합니다.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// 정수 필드 값을 조회합니다.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    /// 문자열 필드 값을 조회합니다.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// `queue` 필드 (와이어 형식 고정 필드)
    pub fn queue(&self) -> Option<i64> {
        self.get_i64(FIELD_QUEUE)
    }

    /// `location` 필드 (와이어 형식 고정 필드)
    pub fn location(&self) -> Option<&str> {
        self.get_str(FIELD_LOCATION)
    }

    /// `message` 필드 (와이어 형식 고정 필드)
    pub fn message(&self) -> Option<&str> {
        self.get_str(FIELD_MESSAGE)
    }

    /// 필드를 추가한 새 이벤트를 반환합니다. 원본은 변경되지 않습니다.
    pub fn with_field(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = Fields::clone(&self.fields);
        fields.insert(key.into(), value.into());
        Self::from_fields(fields)
    }

    /// 여러 필드를 한 번에 추가한 새 이벤트를 반환합니다.
    ///
    /// 맵 복사를 한 번만 수행하므로 필드를 여럿 추가할 때는
    /// [`with_field`](Event::with_field) 반복보다 저렴합니다.
    pub fn with_fields<I>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut fields = Fields::clone(&self.fields);
        for (key, value) in entries {
            fields.insert(key, value);
        }
        Self::from_fields(fields)
    }

    /// 전체 필드 맵에 대한 참조를 반환합니다.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Event {}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self.fields.as_ref()) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("{}"),
        }
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Fields::deserialize(deserializer).map(Self::from_fields)
    }
}
