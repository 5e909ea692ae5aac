//! 반응형 기반 계층 — 채널 기반 이벤트 스트림 프리미티브
//!
//! 그래프의 간선은 `tokio::sync::mpsc` 채널이며, 노드의 리프트 함수는
//! 스트림을 스트림으로 변환합니다. 팬아웃 지점에서는 이벤트를 복제
//! (`Arc` 참조 카운트 증가)하여 각 자식에게 전달하므로, 상류 리프트는
//! 하류 구독자 수와 무관하게 이벤트당 한 번만 실행됩니다.
//!
//! 취소는 drop 기반입니다. 환경의 ingress 송신자가 사라지면 채널이
//! 닫히면서 모든 노드 태스크가 순차적으로 종료됩니다.

use tokio::sync::{broadcast, mpsc};

use millrace_core::Event;

use crate::error::EngineError;

/// 노드 간 이벤트 채널 용량
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// 노드별 트레이스 채널 용량
pub const TRACE_CHANNEL_CAPACITY: usize = 256;

/// 이벤트 스트림의 수신측
pub type EventRx = mpsc::Receiver<Event>;

/// 리프트 함수 — 이벤트 스트림을 이벤트 스트림으로 변환
///
/// connectable의 연산 핵심입니다. 한 번 소비되어 파이프라인에
/// 편입됩니다.
pub type Lift = Box<dyn FnOnce(EventRx) -> EventRx + Send>;

/// 이벤트 단위 연산
///
/// `Ok(Some)` = 통과/변환, `Ok(None)` = 폐기, `Err` = 노드 경계에서
/// 포착되어 트레이서로 기록되고 해당 이벤트는 폐기됩니다.
pub type UnitOp = Box<dyn Fn(Event) -> Result<Option<Event>, EngineError> + Send + Sync>;

/// 노드별 진단 텍스트 채널
///
/// 리프트 함수가 호출하는 송신측과 구독 가능한 수신측을 제공합니다.
/// 전송은 논블로킹이며 구독자가 없거나 뒤처지면 메시지를 버립니다.
/// 상류 파이프라인을 지연시키지 않습니다.
#[derive(Debug, Clone)]
pub struct Tracer {
    name: String,
    tx: broadcast::Sender<String>,
}

impl Tracer {
    /// 자산 이름으로 트레이서를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(TRACE_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            tx,
        }
    }

    /// 자산 이름을 반환합니다.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 트레이스 메시지를 기록합니다. 구독자가 없으면 버려집니다.
    pub fn trace(&self, message: impl Into<String>) {
        let _ = self.tx.send(message.into());
    }

    /// 트레이스 스트림을 구독합니다.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

/// 여러 입력 스트림을 하나로 병합합니다.
///
/// 입력이 하나면 그대로 반환합니다. 모든 입력이 닫히면 결과 스트림도
/// 닫힙니다. 병합 순서는 도착 순서를 따릅니다.
pub fn merge(mut inputs: Vec<EventRx>) -> EventRx {
    if inputs.len() == 1 {
        return inputs.remove(0);
    }

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    for mut input in inputs {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = input.recv().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
    }
    rx
}

/// 스트림을 `count`개의 출력으로 팬아웃합니다.
///
/// 이벤트 복제는 `Arc` 참조 카운트 증가이므로 저렴합니다. 모든 하류
/// 수신자가 사라지면 팬아웃 태스크가 종료되어 상류도 따라 닫힙니다.
pub fn fan_out(mut input: EventRx, count: usize) -> Vec<EventRx> {
    let mut senders = Vec::with_capacity(count);
    let mut receivers = Vec::with_capacity(count);
    for _ in 0..count {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        senders.push(tx);
        receivers.push(rx);
    }

    tokio::spawn(async move {
        while let Some(event) = input.recv().await {
            let mut delivered = false;
            for tx in &senders {
                if tx.send(event.clone()).await.is_ok() {
                    delivered = true;
                }
            }
            if !delivered {
                break;
            }
        }
    });

    receivers
}

/// 리프 노드의 출력 스트림을 소비합니다.
///
/// 출력 스테이지는 부수효과를 리프트 안에서 수행하므로 리프 출력 자체는
/// 외부에서 사용되지 않습니다. 소비하지 않으면 채널이 가득 차
/// 파이프라인이 정체됩니다.
pub fn drain(mut input: EventRx) {
    tokio::spawn(async move { while input.recv().await.is_some() {} });
}

/// 이벤트 단위 연산을 리프트 함수로 감쌉니다.
///
/// 연산 에러는 노드 경계에서 포착되어 트레이서로 기록되고 해당 이벤트는
/// 폐기됩니다. 스트림은 계속 흐릅니다.
pub fn lift_unit(op: UnitOp, tracer: Tracer) -> Lift {
    Box::new(move |mut input: EventRx| {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(event) = input.recv().await {
                match op(event) {
                    Ok(Some(next)) => {
                        if tx.send(next).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracer.trace(format!("operation failed: {e}")),
                }
            }
        });
        rx
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn sample_event(queue: i64) -> Event {
        Event::new().with_field("queue", queue)
    }

    #[tokio::test]
    async fn merge_single_input_passes_through() {
        let (tx, rx) = mpsc::channel(8);
        let mut merged = merge(vec![rx]);

        tx.send(sample_event(1)).await.unwrap();
        drop(tx);

        assert_eq!(merged.recv().await.unwrap().get_i64("queue"), Some(1));
        assert!(merged.recv().await.is_none());
    }

    #[tokio::test]
    async fn merge_combines_all_inputs() {
        let (tx1, rx1) = mpsc::channel(8);
        let (tx2, rx2) = mpsc::channel(8);
        let mut merged = merge(vec![rx1, rx2]);

        tx1.send(sample_event(1)).await.unwrap();
        tx2.send(sample_event(2)).await.unwrap();
        drop(tx1);
        drop(tx2);

        let mut queues = vec![
            merged.recv().await.unwrap().get_i64("queue").unwrap(),
            merged.recv().await.unwrap().get_i64("queue").unwrap(),
        ];
        queues.sort_unstable();
        assert_eq!(queues, vec![1, 2]);
        assert!(merged.recv().await.is_none());
    }

    #[tokio::test]
    async fn fan_out_delivers_to_every_branch() {
        let (tx, rx) = mpsc::channel(8);
        let mut branches = fan_out(rx, 3);

        tx.send(sample_event(7)).await.unwrap();
        drop(tx);

        for branch in &mut branches {
            assert_eq!(branch.recv().await.unwrap().get_i64("queue"), Some(7));
        }
        for branch in &mut branches {
            assert!(branch.recv().await.is_none());
        }
    }

    #[tokio::test]
    async fn lift_unit_applies_op_per_event() {
        let tracer = Tracer::new("test");
        let op: UnitOp = Box::new(|event| Ok(Some(event.with_field("seen", true))));
        let lift = lift_unit(op, tracer);

        let (tx, rx) = mpsc::channel(8);
        let mut out = lift(rx);

        tx.send(sample_event(1)).await.unwrap();
        drop(tx);

        let event = out.recv().await.unwrap();
        assert_eq!(event.get("seen"), Some(&serde_json::Value::Bool(true)));
    }

    #[tokio::test]
    async fn lift_unit_drops_on_none() {
        let tracer = Tracer::new("test");
        let op: UnitOp = Box::new(|event| {
            if event.get_i64("queue") == Some(1) {
                Ok(Some(event))
            } else {
                Ok(None)
            }
        });
        let lift = lift_unit(op, tracer);

        let (tx, rx) = mpsc::channel(8);
        let mut out = lift(rx);

        tx.send(sample_event(2)).await.unwrap();
        tx.send(sample_event(1)).await.unwrap();
        drop(tx);

        assert_eq!(out.recv().await.unwrap().get_i64("queue"), Some(1));
        assert!(out.recv().await.is_none());
    }

    #[tokio::test]
    async fn lift_unit_traces_op_errors_and_continues() {
        let tracer = Tracer::new("test");
        let mut traces = tracer.subscribe();
        let op: UnitOp = Box::new(|event| {
            if event.get_i64("queue") == Some(666) {
                Err(EngineError::Op {
                    reason: "bad event".to_owned(),
                })
            } else {
                Ok(Some(event))
            }
        });
        let lift = lift_unit(op, tracer);

        let (tx, rx) = mpsc::channel(8);
        let mut out = lift(rx);

        tx.send(sample_event(666)).await.unwrap();
        tx.send(sample_event(1)).await.unwrap();
        drop(tx);

        // 에러 이벤트는 폐기되고 다음 이벤트는 통과
        assert_eq!(out.recv().await.unwrap().get_i64("queue"), Some(1));
        let trace = traces.recv().await.unwrap();
        assert!(trace.contains("bad event"));
    }

    #[test]
    fn tracer_trace_without_subscribers_does_not_block() {
        let tracer = Tracer::new("lonely");
        for _ in 0..(TRACE_CHANNEL_CAPACITY * 2) {
            tracer.trace("nobody is listening");
        }
    }
}
