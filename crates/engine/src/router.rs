//! 라우터 — 단일 ingress 스트림을 조건별로 여러 환경에 분배
//!
//! 라우터는 환경들을 소유하고, 이름 있는 라우트(조건 + 대상 환경)로
//! ingress 멀티캐스트를 환경별 필터링 서브스트림으로 팬아웃합니다.
//! 활성화된 환경이 없으면 수신한 이벤트는 폐기됩니다.
//!
//! 라우트는 환경을 이름으로만 참조합니다. 환경은 그 환경을 가리키는
//! 마지막 라우트가 제거될 때 함께 해제됩니다.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use millrace_core::metrics::{
    ENGINE_ENVIRONMENTS_ACTIVE, ROUTER_EVENTS_DROPPED_TOTAL, ROUTER_EVENTS_ROUTED_TOTAL,
    ROUTER_PARSE_ERRORS_TOTAL, ROUTER_ROUTES_ACTIVE,
};
use millrace_core::Event;

use crate::builder::Registry;
use crate::catalog::Catalog;
use crate::environment::{build_environment, Environment};
use crate::error::EngineError;
use crate::stream::EVENT_CHANNEL_CAPACITY;

/// 라우트 조건 함수 타입
pub type RoutePredicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// 라우트 — 이름, 대상 환경, 구독 핸들
///
/// 구독은 라우트가 독점 소유합니다. 라우트가 drop되면 전달 태스크가
/// 취소되어 구독이 해제됩니다.
struct Route {
    target: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Drop for Route {
    fn drop(&mut self) {
        // 취소는 멱등. abort까지 해야 drop 이후의 전달이 없음을 보장한다.
        self.cancel.cancel();
        self.task.abort();
    }
}

/// 이벤트 라우터
///
/// 카탈로그를 통해 환경을 지연 빌드하고, 라우트 추가/제거와 이벤트
/// 주입, 트레이스 싱크 구독을 제공합니다.
pub struct Router<C: Catalog> {
    catalog: C,
    registry: Registry,
    environments: HashMap<String, Environment>,
    routes: HashMap<String, Route>,
    ingress: broadcast::Sender<Event>,
}

impl<C: Catalog> Router<C> {
    /// 외부 카탈로그를 참조하는 라우터를 생성합니다.
    pub fn new(catalog: C) -> Self {
        Self::with_registry(catalog, Registry::with_defaults())
    }

    /// 사용자 정의 빌더 레지스트리로 라우터를 생성합니다.
    pub fn with_registry(catalog: C, registry: Registry) -> Self {
        let (ingress, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            catalog,
            registry,
            environments: HashMap::new(),
            routes: HashMap::new(),
            ingress,
        }
    }

    /// 라우트를 추가합니다.
    ///
    /// 대상 환경이 아직 없으면 카탈로그에서 정의를 가져와 빌드합니다.
    /// `predicate`가 `None`이면 모든 이벤트가 전달됩니다.
    pub fn add(
        &mut self,
        route: &str,
        environment: &str,
        predicate: Option<RoutePredicate>,
    ) -> Result<(), EngineError> {
        if self.routes.contains_key(route) {
            return Err(EngineError::RouteExists(route.to_owned()));
        }

        if !self.environments.contains_key(environment) {
            let def = self.catalog.environment_definition(environment)?;
            let env = build_environment(&def, &self.registry)?;
            self.environments.insert(environment.to_owned(), env);
            gauge!(ENGINE_ENVIRONMENTS_ACTIVE).set(self.environments.len() as f64);
        }

        let predicate = predicate.unwrap_or_else(|| Arc::new(|_| true));
        let env_ingress = self.environments[environment].ingress();
        let mut subscription = self.ingress.subscribe();
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let cancel = cancel.clone();
            let route_name = route.to_owned();
            async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = subscription.recv() => match received {
                            Ok(event) => {
                                if predicate(&event)
                                    && env_ingress.send(event).await.is_err()
                                {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(
                                    route = %route_name,
                                    skipped,
                                    "route subscription lagged, events dropped"
                                );
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }
            }
        });

        self.routes.insert(
            route.to_owned(),
            Route {
                target: environment.to_owned(),
                cancel,
                task,
            },
        );
        gauge!(ROUTER_ROUTES_ACTIVE).set(self.routes.len() as f64);
        tracing::info!(route, environment, "route added");
        Ok(())
    }

    /// 라우트를 제거합니다.
    ///
    /// 구독이 해제되며, 대상 환경을 가리키는 라우트가 더 이상 없으면
    /// 환경도 함께 해제됩니다.
    pub fn remove(&mut self, route: &str) -> Result<(), EngineError> {
        let removed = self
            .routes
            .remove(route)
            .ok_or_else(|| EngineError::RouteNotFound(route.to_owned()))?;

        let target = removed.target.clone();
        drop(removed); // 구독 해제

        if !self.routes.values().any(|r| r.target == target) {
            self.environments.remove(&target);
            gauge!(ENGINE_ENVIRONMENTS_ACTIVE).set(self.environments.len() as f64);
            tracing::info!(environment = %target, "environment released");
        }

        gauge!(ROUTER_ROUTES_ACTIVE).set(self.routes.len() as f64);
        tracing::info!(route, "route removed");
        Ok(())
    }

    /// 원시 이벤트 문자열을 파싱하여 ingress에 발행합니다.
    ///
    /// 파싱 실패는 해당 이벤트만 폐기하며 ingress 스트림은 계속됩니다.
    pub fn route_event(&self, raw: &str) -> Result<(), EngineError> {
        let event = Event::from_wire(raw).map_err(|e| {
            counter!(ROUTER_PARSE_ERRORS_TOTAL).increment(1);
            EngineError::Parse(e)
        })?;
        self.publish(event);
        Ok(())
    }

    /// 파싱된 이벤트를 ingress에 발행합니다.
    ///
    /// 구독 중인 라우트가 없으면 이벤트는 폐기됩니다.
    pub fn publish(&self, event: Event) {
        counter!(ROUTER_EVENTS_ROUTED_TOTAL).increment(1);
        if self.ingress.send(event).is_err() {
            counter!(ROUTER_EVENTS_DROPPED_TOTAL).increment(1);
            tracing::trace!("no routes subscribed, event dropped");
        }
    }

    /// 환경 내 자산의 트레이스 싱크를 구독합니다.
    pub fn subscribe_trace_sink(
        &self,
        environment: &str,
        asset: &str,
    ) -> Result<broadcast::Receiver<String>, EngineError> {
        self.environment(environment)?.subscribe_trace_sink(asset)
    }

    /// 환경의 모든 트레이스 싱크를 하나의 스트림으로 구독합니다.
    pub fn subscribe_all_trace_sinks(
        &self,
        environment: &str,
    ) -> Result<tokio::sync::mpsc::Receiver<String>, EngineError> {
        Ok(self.environment(environment)?.subscribe_all_trace_sinks())
    }

    /// 환경을 조회합니다.
    pub fn environment(&self, name: &str) -> Result<&Environment, EngineError> {
        self.environments
            .get(name)
            .ok_or_else(|| EngineError::EnvironmentNotFound(name.to_owned()))
    }

    /// 활성 라우트 이름 목록
    pub fn route_names(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    /// 활성 환경 이름 목록
    pub fn environment_names(&self) -> Vec<&str> {
        self.environments.keys().map(String::as_str).collect()
    }
}
