//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `millrace_`
//! - 모듈명: `router_`, `engine_`, `ingest_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 환경 이름 레이블 키
pub const LABEL_ENVIRONMENT: &str = "environment";

/// 라우트 이름 레이블 키
pub const LABEL_ROUTE: &str = "route";

// ─── Router 메트릭 ──────────────────────────────────────────────────

/// Router: 수신하여 라우팅된 이벤트 수 (counter)
pub const ROUTER_EVENTS_ROUTED_TOTAL: &str = "millrace_router_events_routed_total";

/// Router: 파싱 실패로 폐기된 이벤트 수 (counter)
pub const ROUTER_PARSE_ERRORS_TOTAL: &str = "millrace_router_parse_errors_total";

/// Router: 수신자가 없어 폐기된 이벤트 수 (counter)
pub const ROUTER_EVENTS_DROPPED_TOTAL: &str = "millrace_router_events_dropped_total";

/// Router: 활성 라우트 수 (gauge)
pub const ROUTER_ROUTES_ACTIVE: &str = "millrace_router_routes_active";

// ─── Engine 메트릭 ──────────────────────────────────────────────────

/// Engine: 빌드된 환경 수 (counter)
pub const ENGINE_BUILDS_TOTAL: &str = "millrace_engine_builds_total";

/// Engine: 활성 환경 수 (gauge)
pub const ENGINE_ENVIRONMENTS_ACTIVE: &str = "millrace_engine_environments_active";

// ─── Ingest 메트릭 ──────────────────────────────────────────────────

/// Ingest: 디코딩된 프레임 수 (counter)
pub const INGEST_FRAMES_TOTAL: &str = "millrace_ingest_frames_total";

/// Ingest: 프레이밍 에러 수 (counter)
pub const INGEST_FRAME_ERRORS_TOTAL: &str = "millrace_ingest_frame_errors_total";

/// Ingest: 활성 TCP 연결 수 (gauge)
pub const INGEST_CONNECTIONS_ACTIVE: &str = "millrace_ingest_connections_active";

/// Ingest: 수신 바이트 수 (counter)
pub const INGEST_BYTES_TOTAL: &str = "millrace_ingest_bytes_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `millrace-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Router
    describe_counter!(
        ROUTER_EVENTS_ROUTED_TOTAL,
        "Total number of events parsed and published to the router ingress"
    );
    describe_counter!(
        ROUTER_PARSE_ERRORS_TOTAL,
        "Total number of events dropped due to wire-format parse failures"
    );
    describe_counter!(
        ROUTER_EVENTS_DROPPED_TOTAL,
        "Total number of events dropped because no route was subscribed"
    );
    describe_gauge!(ROUTER_ROUTES_ACTIVE, "Number of currently active routes");

    // Engine
    describe_counter!(
        ENGINE_BUILDS_TOTAL,
        "Total number of environments built from catalog definitions"
    );
    describe_gauge!(
        ENGINE_ENVIRONMENTS_ACTIVE,
        "Number of environments currently owned by the router"
    );

    // Ingest
    describe_counter!(
        INGEST_FRAMES_TOTAL,
        "Total number of complete frames decoded from the byte stream"
    );
    describe_counter!(
        INGEST_FRAME_ERRORS_TOTAL,
        "Total number of framing errors (oversized or malformed frames)"
    );
    describe_gauge!(
        INGEST_CONNECTIONS_ACTIVE,
        "Number of currently open ingest TCP connections"
    );
    describe_counter!(INGEST_BYTES_TOTAL, "Total bytes received by the ingest listener");
}
