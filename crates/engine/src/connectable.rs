//! Connectable — 그래프를 구성하는 이름 있는 처리 단위
//!
//! 하나의 connectable은 리프트 함수 하나, 선언된 부모 이름 집합,
//! 트레이서 싱크를 가집니다. 파이프라인 구체화 단계에서 부모들의 출력
//! 스트림이 입력으로 연결되고, [`connect`](Connectable::connect)가
//! `lift(merge(inputs))`를 계산합니다.

use std::collections::BTreeSet;
use std::fmt;

use millrace_core::AssetType;

use crate::error::EngineError;
use crate::stream::{merge, EventRx, Lift, Tracer};

/// 그래프 노드의 종류
///
/// 자산 종류별 variant와 합성 입출력 노드용 [`Junction`](NodeKind::Junction)을
/// 구분합니다. 필터 주입이나 검증 시 전수 매칭에 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// 디코더 자산
    Decoder,
    /// 룰 자산
    Rule,
    /// 필터 자산
    Filter,
    /// 출력 자산
    Output,
    /// 합성 입출력 노드 (INPUT_*/OUTPUT_*)
    Junction,
}

impl From<AssetType> for NodeKind {
    fn from(asset_type: AssetType) -> Self {
        match asset_type {
            AssetType::Decoder => Self::Decoder,
            AssetType::Rule => Self::Rule,
            AssetType::Filter => Self::Filter,
            AssetType::Output => Self::Output,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decoder => write!(f, "decoder"),
            Self::Rule => write!(f, "rule"),
            Self::Filter => write!(f, "filter"),
            Self::Output => write!(f, "output"),
            Self::Junction => write!(f, "junction"),
        }
    }
}

/// 이름 있는 처리 단위
///
/// 리프트가 없는 connectable은 항등 변환으로 동작합니다.
/// `inputs`는 파이프라인 구체화 중에 채워집니다.
pub struct Connectable {
    name: String,
    kind: NodeKind,
    /// 선언된 부모 이름 집합. 빌드 완료 후에는 간선 집합과 일치합니다.
    pub(crate) parents: BTreeSet<String>,
    inputs: Vec<EventRx>,
    tracer: Tracer,
    lift: Option<Lift>,
}

impl Connectable {
    /// 새 connectable을 생성합니다.
    pub fn new(
        name: impl Into<String>,
        kind: NodeKind,
        parents: BTreeSet<String>,
        tracer: Tracer,
        lift: Option<Lift>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            parents,
            inputs: Vec::new(),
            tracer,
            lift,
        }
    }

    /// 합성 입출력 노드를 생성합니다. 부모 없음, 항등 리프트.
    pub fn junction(name: impl Into<String>) -> Self {
        let name = name.into();
        let tracer = Tracer::new(name.clone());
        Self::new(name, NodeKind::Junction, BTreeSet::new(), tracer, None)
    }

    /// 노드 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 노드 종류
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// 선언된 부모 이름 집합
    pub fn parents(&self) -> &BTreeSet<String> {
        &self.parents
    }

    /// 트레이서 핸들
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// 현재 연결된 입력 수
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// 입력이 모두 연결되었는지 확인합니다.
    ///
    /// 부모가 없는 그래프 루트는 외부에서 공급된 입력 하나가 필요합니다.
    pub fn inputs_complete(&self) -> bool {
        if self.parents.is_empty() {
            self.inputs.len() == 1
        } else {
            self.inputs.len() == self.parents.len()
        }
    }

    /// 상류 스트림을 입력 목록에 추가합니다.
    ///
    /// 입력 수가 부모 수를 넘어서는 연결은 프로그래밍 오류이며
    /// `InputOverflow`로 거부됩니다.
    pub fn add_input(&mut self, input: EventRx) -> Result<(), EngineError> {
        let limit = self.parents.len().max(1);
        if self.inputs.len() >= limit {
            return Err(EngineError::InputOverflow {
                name: self.name.clone(),
                limit,
            });
        }
        self.inputs.push(input);
        Ok(())
    }

    /// `lift(merge(inputs))`를 계산하여 출력 스트림을 반환합니다.
    ///
    /// 모든 부모의 입력이 연결되기 전의 호출은 `MissingInputs` 에러입니다.
    /// 입력과 리프트는 소비되므로 노드당 한 번만 호출할 수 있습니다.
    pub fn connect(&mut self) -> Result<EventRx, EngineError> {
        if !self.inputs_complete() {
            return Err(EngineError::MissingInputs {
                name: self.name.clone(),
                have: self.inputs.len(),
                want: self.parents.len().max(1),
            });
        }

        let merged = merge(std::mem::take(&mut self.inputs));
        Ok(match self.lift.take() {
            Some(lift) => lift(merged),
            None => merged,
        })
    }
}

impl fmt::Debug for Connectable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connectable")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parents", &self.parents)
            .field("inputs", &self.inputs.len())
            .field("lift", &self.lift.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millrace_core::Event;
    use tokio::sync::mpsc;

    fn channel() -> (mpsc::Sender<Event>, EventRx) {
        mpsc::channel(8)
    }

    #[test]
    fn junction_has_no_parents_and_no_lift() {
        let node = Connectable::junction("INPUT_DECODER");
        assert_eq!(node.name(), "INPUT_DECODER");
        assert_eq!(node.kind(), NodeKind::Junction);
        assert!(node.parents().is_empty());
    }

    #[test]
    fn add_input_rejects_overflow() {
        let mut node = Connectable::junction("root");
        let (_tx1, rx1) = channel();
        let (_tx2, rx2) = channel();

        node.add_input(rx1).unwrap();
        let err = node.add_input(rx2).unwrap_err();
        assert!(matches!(err, EngineError::InputOverflow { .. }));
    }

    #[test]
    fn add_input_allows_one_per_parent() {
        let parents: BTreeSet<String> = ["a".to_owned(), "b".to_owned()].into();
        let tracer = Tracer::new("n");
        let mut node = Connectable::new("n", NodeKind::Decoder, parents, tracer, None);

        let (_tx1, rx1) = channel();
        let (_tx2, rx2) = channel();
        node.add_input(rx1).unwrap();
        assert!(!node.inputs_complete());
        node.add_input(rx2).unwrap();
        assert!(node.inputs_complete());
    }

    #[test]
    fn connect_before_inputs_complete_is_an_error() {
        let parents: BTreeSet<String> = ["a".to_owned()].into();
        let tracer = Tracer::new("n");
        let mut node = Connectable::new("n", NodeKind::Rule, parents, tracer, None);

        let err = node.connect().unwrap_err();
        assert!(matches!(err, EngineError::MissingInputs { want: 1, .. }));
    }

    #[tokio::test]
    async fn connect_without_lift_is_identity() {
        let mut node = Connectable::junction("root");
        let (tx, rx) = channel();
        node.add_input(rx).unwrap();

        let mut out = node.connect().unwrap();
        tx.send(Event::new().with_field("k", 1)).await.unwrap();
        drop(tx);

        assert_eq!(out.recv().await.unwrap().get_i64("k"), Some(1));
        assert!(out.recv().await.is_none());
    }

    #[test]
    fn node_kind_from_asset_type() {
        assert_eq!(NodeKind::from(AssetType::Decoder), NodeKind::Decoder);
        assert_eq!(NodeKind::from(AssetType::Output), NodeKind::Output);
    }
}
