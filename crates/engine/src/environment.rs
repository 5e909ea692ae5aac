//! 환경 빌더 — 환경 정의를 실행 가능한 파이프라인으로 컴파일
//!
//! 빌드는 두 단계입니다. 먼저 자산 목록을 종류별 서브그래프로 분류하여
//! 고정 위상(디코더 → 룰/출력, 필터 스플라이스)으로 결합하고, 그 다음
//! 그래프를 BFS로 순회하며 각 노드를 채널 파이프라인으로 구체화합니다.
//!
//! # 위상
//! ```text
//! INPUT_DECODER → … → OUTPUT_DECODER → INPUT_RULE → … → OUTPUT_RULE ┐
//!                              └────────────────────→ INPUT_OUTPUT ←┘
//!                                                        └ … → OUTPUT_OUTPUT
//! ```
//!
//! 출력 스테이지는 디코더 원본 스트림과 룰 주석 스트림을 모두 수신
//! 합니다. 룰은 이벤트를 풍부하게 할 뿐 차단하지 않습니다. 차단은
//! 필터의 몫입니다.

use std::collections::{BTreeMap, VecDeque};

use metrics::counter;
use tokio::sync::{broadcast, mpsc};

use millrace_core::metrics::ENGINE_BUILDS_TOTAL;
use millrace_core::{AssetType, EnvironmentDefinition, Event};

use crate::builder::Registry;
use crate::connectable::NodeKind;
use crate::error::EngineError;
use crate::graph::Graph;
use crate::stream::{drain, fan_out, Tracer, EVENT_CHANNEL_CAPACITY, TRACE_CHANNEL_CAPACITY};

/// 디코더 서브그래프 합성 입력 노드명
pub const INPUT_DECODER: &str = "INPUT_DECODER";
/// 디코더 서브그래프 합성 출력 노드명
pub const OUTPUT_DECODER: &str = "OUTPUT_DECODER";
/// 룰 서브그래프 합성 입력 노드명
pub const INPUT_RULE: &str = "INPUT_RULE";
/// 룰 서브그래프 합성 출력 노드명
pub const OUTPUT_RULE: &str = "OUTPUT_RULE";
/// 출력 서브그래프 합성 입력 노드명
pub const INPUT_OUTPUT: &str = "INPUT_OUTPUT";
/// 출력 서브그래프 합성 출력 노드명
pub const OUTPUT_OUTPUT: &str = "OUTPUT_OUTPUT";

/// 환경 정의로부터 실행 그래프를 조립합니다.
///
/// 1. 자산을 종류별 서브그래프로 분류
/// 2. 디코더/룰/출력이 모두 비어 있으면 실패
/// 3. 비어 있지 않은 서브그래프를 합성 입출력 노드로 감싸기
/// 4. 디코더 → 룰 → 출력 순서로 결합 (빈 서브그래프는 건너뜀)
/// 5. 필터를 선언된 부모와 그 자식들 사이에 스플라이스
/// 6. 세 스테이지가 모두 있으면 `OUTPUT_DECODER → INPUT_OUTPUT` 브릿지 추가
pub fn build_graph(
    def: &EnvironmentDefinition,
    registry: &Registry,
) -> Result<Graph, EngineError> {
    let mut decoders = Graph::new();
    let mut rules = Graph::new();
    let mut outputs = Graph::new();
    let mut filters = Graph::new();

    for asset in &def.assets {
        let conn = registry.build(asset.asset_type, &asset.content)?;
        match asset.asset_type {
            AssetType::Decoder => decoders.add_node(conn)?,
            AssetType::Rule => rules.add_node(conn)?,
            AssetType::Output => outputs.add_node(conn)?,
            AssetType::Filter => filters.add_node(conn)?,
        }
    }

    if decoders.is_empty() && rules.is_empty() && outputs.is_empty() {
        return Err(EngineError::EmptyEnvironment);
    }

    let has_all_stages = !decoders.is_empty() && !rules.is_empty() && !outputs.is_empty();

    let stages = [
        (INPUT_DECODER, OUTPUT_DECODER, decoders),
        (INPUT_RULE, OUTPUT_RULE, rules),
        (INPUT_OUTPUT, OUTPUT_OUTPUT, outputs),
    ];

    let mut graph = Graph::new();
    let mut prev_output = "";
    for (input, output, mut sub) in stages {
        if sub.is_empty() {
            continue;
        }
        sub.add_parent_edges(input, output)?;
        graph = graph.join(sub, prev_output, input)?;
        prev_output = output;
    }

    // 필터는 디코더/룰 노드에만 붙는 것이 정상이다
    filters.visit(|filter| {
        for parent in filter.parents() {
            if let Some(node) = graph.node(parent) {
                if !matches!(node.kind(), NodeKind::Decoder | NodeKind::Rule) {
                    tracing::warn!(
                        filter = filter.name(),
                        parent = parent.as_str(),
                        kind = %node.kind(),
                        "filter attached to a non decoder/rule parent"
                    );
                }
            }
        }
    });
    let mut graph = graph.inject(filters)?;

    if has_all_stages {
        graph.add_edge(OUTPUT_DECODER, INPUT_OUTPUT)?;
        if let Some(node) = graph.node_mut(INPUT_OUTPUT) {
            node.parents.insert(OUTPUT_DECODER.to_owned());
        }
    }

    Ok(graph)
}

/// 구체화 시작점을 결정합니다. 체인 순서상 첫 합성 입력 노드입니다.
fn pipeline_root(graph: &Graph) -> Result<&'static str, EngineError> {
    for name in [INPUT_DECODER, INPUT_RULE, INPUT_OUTPUT] {
        if graph.node(name).is_some() {
            return Ok(name);
        }
    }
    Err(EngineError::MissingNode {
        name: INPUT_DECODER.to_owned(),
    })
}

/// 그래프를 채널 파이프라인으로 구체화합니다.
///
/// 루트부터 BFS로 순회하며, 입력이 모두 연결된 노드를 `connect`하고
/// 그 출력을 자식들에게 전달합니다. 자식이 둘 이상이면 팬아웃으로
/// 감싸 리프트가 이벤트당 한 번만 실행되도록 합니다. 리프 출력은
/// 소비 태스크로 흘려보냅니다.
fn materialize(graph: &mut Graph, source: mpsc::Receiver<Event>) -> Result<(), EngineError> {
    let root = pipeline_root(graph)?;
    graph
        .node_mut(root)
        .ok_or_else(|| EngineError::MissingNode {
            name: root.to_owned(),
        })?
        .add_input(source)?;

    let mut queue = VecDeque::from([root.to_owned()]);
    while let Some(name) = queue.pop_front() {
        let children: Vec<String> = graph
            .children(&name)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default();

        let node = graph
            .node_mut(&name)
            .ok_or_else(|| EngineError::MissingNode { name: name.clone() })?;
        let output = node.connect()?;

        if children.is_empty() {
            drain(output);
            continue;
        }

        let branches = if children.len() > 1 {
            fan_out(output, children.len())
        } else {
            vec![output]
        };

        for (child, branch) in children.iter().zip(branches) {
            let child_node = graph
                .node_mut(child)
                .ok_or_else(|| EngineError::MissingNode { name: child.clone() })?;
            child_node.add_input(branch)?;
            if child_node.inputs_complete() {
                queue.push_back(child.clone());
            }
        }
    }
    Ok(())
}

/// 컴파일된 실행 가능 환경
///
/// ingress 송신자, 자산별 트레이스 싱크, 조립된 그래프 위상을 소유
/// 합니다. 환경이 drop되면 ingress 채널이 닫히며 그래프에 뿌리를 둔
/// 모든 노드 태스크가 연쇄적으로 종료되고 트레이스 싱크도 닫힙니다.
pub struct Environment {
    name: String,
    ingress: mpsc::Sender<Event>,
    trace_sinks: BTreeMap<String, Tracer>,
    graph: Graph,
}

impl Environment {
    /// 환경 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// ingress 송신자를 복제하여 반환합니다.
    pub fn ingress(&self) -> mpsc::Sender<Event> {
        self.ingress.clone()
    }

    /// 이벤트를 환경에 발행합니다.
    pub async fn publish(&self, event: Event) -> Result<(), EngineError> {
        self.ingress
            .send(event)
            .await
            .map_err(|e| EngineError::Channel(e.to_string()))
    }

    /// 조립된 그래프 위상
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// 자산의 트레이스 싱크를 구독합니다.
    pub fn subscribe_trace_sink(
        &self,
        asset: &str,
    ) -> Result<broadcast::Receiver<String>, EngineError> {
        self.trace_sinks
            .get(asset)
            .map(Tracer::subscribe)
            .ok_or_else(|| EngineError::AssetNotFound {
                environment: self.name.clone(),
                asset: asset.to_owned(),
            })
    }

    /// 모든 자산의 트레이스 싱크를 하나의 스트림으로 구독합니다.
    pub fn subscribe_all_trace_sinks(&self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(TRACE_CHANNEL_CAPACITY);
        for tracer in self.trace_sinks.values() {
            let mut sub = tracer.subscribe();
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    match sub.recv().await {
                        Ok(message) => {
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
        rx
    }

    /// 트레이스 싱크를 가진 자산 이름 목록
    pub fn trace_sink_names(&self) -> impl Iterator<Item = &str> {
        self.trace_sinks.keys().map(String::as_str)
    }
}

/// 환경 정의를 빌드하여 실행 중인 파이프라인을 반환합니다.
pub fn build_environment(
    def: &EnvironmentDefinition,
    registry: &Registry,
) -> Result<Environment, EngineError> {
    let mut graph = build_graph(def, registry)?;
    tracing::debug!(
        environment = %def.name,
        graph = %graph.print(),
        "environment graph assembled"
    );

    let mut trace_sinks = BTreeMap::new();
    graph.visit(|node| {
        trace_sinks.insert(node.name().to_owned(), node.tracer().clone());
    });

    let (ingress, source) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    materialize(&mut graph, source)?;

    counter!(ENGINE_BUILDS_TOTAL).increment(1);
    tracing::info!(
        environment = %def.name,
        nodes = graph.node_count(),
        "environment built"
    );

    Ok(Environment {
        name: def.name.clone(),
        ingress,
        trace_sinks,
        graph,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::with_defaults()
    }

    fn children(graph: &Graph, name: &str) -> Vec<String> {
        graph
            .children(name)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn empty_definition_fails_to_build() {
        let def = EnvironmentDefinition::new("empty");
        let err = build_graph(&def, &registry()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyEnvironment));
    }

    #[test]
    fn filters_alone_are_not_a_valid_environment() {
        let def = EnvironmentDefinition::new("filters-only").with_asset(
            AssetType::Filter,
            json!({"name": "f1", "parents": ["d1"], "check": [{"queue": 1}]}),
        );
        let err = build_graph(&def, &registry()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyEnvironment));
    }

    #[test]
    fn decoder_and_output_chain_through_elided_rules() {
        // 룰 스테이지가 비면 디코더 출력이 바로 출력 스테이지 입력이 된다
        let def = EnvironmentDefinition::new("s1")
            .with_asset(AssetType::Decoder, json!({"name": "d1"}))
            .with_asset(AssetType::Output, json!({"name": "o1"}));
        let graph = build_graph(&def, &registry()).unwrap();

        assert_eq!(children(&graph, INPUT_DECODER), vec!["d1"]);
        assert_eq!(children(&graph, "d1"), vec![OUTPUT_DECODER]);
        assert_eq!(children(&graph, OUTPUT_DECODER), vec![INPUT_OUTPUT]);
        assert_eq!(children(&graph, INPUT_OUTPUT), vec!["o1"]);
        assert_eq!(children(&graph, "o1"), vec![OUTPUT_OUTPUT]);
    }

    #[test]
    fn chained_decoders_follow_declared_parents() {
        let def = EnvironmentDefinition::new("s2")
            .with_asset(AssetType::Decoder, json!({"name": "d1"}))
            .with_asset(AssetType::Decoder, json!({"name": "d2", "parents": ["d1"]}));
        let graph = build_graph(&def, &registry()).unwrap();

        assert_eq!(children(&graph, INPUT_DECODER), vec!["d1"]);
        assert_eq!(children(&graph, "d1"), vec!["d2"]);
        assert_eq!(children(&graph, "d2"), vec![OUTPUT_DECODER]);
    }

    #[test]
    fn filter_is_spliced_between_parent_and_children() {
        let def = EnvironmentDefinition::new("s3")
            .with_asset(AssetType::Decoder, json!({"name": "d1"}))
            .with_asset(AssetType::Decoder, json!({"name": "d2", "parents": ["d1"]}))
            .with_asset(
                AssetType::Filter,
                json!({"name": "f", "parents": ["d1"], "check": [{"queue": 1}]}),
            );
        let graph = build_graph(&def, &registry()).unwrap();

        assert_eq!(children(&graph, "d1"), vec!["f"]);
        assert_eq!(children(&graph, "f"), vec!["d2"]);
        let d2_parents = graph.node("d2").unwrap().parents();
        assert!(d2_parents.contains("f"));
        assert!(!d2_parents.contains("d1"));
    }

    #[test]
    fn triple_stage_bridge_feeds_outputs_from_both_streams() {
        let def = EnvironmentDefinition::new("s4")
            .with_asset(AssetType::Decoder, json!({"name": "d1"}))
            .with_asset(AssetType::Rule, json!({"name": "r1"}))
            .with_asset(AssetType::Output, json!({"name": "o1"}));
        let graph = build_graph(&def, &registry()).unwrap();

        let input_output_parents = graph.node(INPUT_OUTPUT).unwrap().parents();
        assert!(input_output_parents.contains(OUTPUT_DECODER));
        assert!(input_output_parents.contains(OUTPUT_RULE));

        assert!(children(&graph, OUTPUT_DECODER).contains(&INPUT_RULE.to_owned()));
        assert!(children(&graph, OUTPUT_DECODER).contains(&INPUT_OUTPUT.to_owned()));
        assert!(children(&graph, OUTPUT_RULE).contains(&INPUT_OUTPUT.to_owned()));
    }

    #[test]
    fn built_graph_admits_topological_order() {
        // 비순환성: Kahn 알고리즘으로 전 노드 정렬 가능해야 한다
        let def = EnvironmentDefinition::new("acyclic")
            .with_asset(AssetType::Decoder, json!({"name": "d1"}))
            .with_asset(AssetType::Decoder, json!({"name": "d2", "parents": ["d1"]}))
            .with_asset(AssetType::Rule, json!({"name": "r1"}))
            .with_asset(AssetType::Output, json!({"name": "o1"}))
            .with_asset(
                AssetType::Filter,
                json!({"name": "f", "parents": ["d1"], "check": [{"queue": 1}]}),
            );
        let graph = build_graph(&def, &registry()).unwrap();

        let mut in_degree: BTreeMap<String, usize> = BTreeMap::new();
        graph.visit(|node| {
            in_degree.entry(node.name().to_owned()).or_insert(0);
        });
        graph.visit(|node| {
            if let Some(children) = graph.children(node.name()) {
                for child in children {
                    *in_degree.entry(child.clone()).or_insert(0) += 1;
                }
            }
        });

        let mut ready: VecDeque<String> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| n.clone())
            .collect();
        let mut sorted = 0;
        while let Some(name) = ready.pop_front() {
            sorted += 1;
            if let Some(children) = graph.children(&name) {
                for child in children {
                    let degree = in_degree.get_mut(child).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(child.clone());
                    }
                }
            }
        }
        assert_eq!(sorted, graph.node_count());
    }

    #[tokio::test]
    async fn built_environment_delivers_events_to_output() {
        let def = EnvironmentDefinition::new("flow")
            .with_asset(AssetType::Decoder, json!({"name": "d1"}))
            .with_asset(AssetType::Output, json!({"name": "o1"}));
        let env = build_environment(&def, &registry()).unwrap();

        let mut traces = env.subscribe_trace_sink("o1").unwrap();
        env.publish(Event::from_wire("2:loc:msg").unwrap())
            .await
            .unwrap();

        let line = traces.recv().await.unwrap();
        assert!(line.contains("\"queue\":2"));
    }

    #[tokio::test]
    async fn trace_sink_subscription_fails_for_unknown_asset() {
        let def = EnvironmentDefinition::new("flow")
            .with_asset(AssetType::Decoder, json!({"name": "d1"}));
        let env = build_environment(&def, &registry()).unwrap();

        let err = env.subscribe_trace_sink("missing").unwrap_err();
        assert!(matches!(err, EngineError::AssetNotFound { .. }));
    }

    #[tokio::test]
    async fn trace_sinks_cover_every_node_including_junctions() {
        let def = EnvironmentDefinition::new("sinks")
            .with_asset(AssetType::Decoder, json!({"name": "d1"}));
        let env = build_environment(&def, &registry()).unwrap();

        let names: Vec<&str> = env.trace_sink_names().collect();
        assert!(names.contains(&"d1"));
        assert!(names.contains(&INPUT_DECODER));
        assert!(names.contains(&OUTPUT_DECODER));
    }
}
