//! 엔진 에러 타입
//!
//! [`EngineError`]는 그래프 구성, 환경 빌드, 라우팅에서 발생하는 모든
//! 에러를 표현합니다. `From<EngineError> for MillraceError` 변환이
//! 구현되어 있어 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use millrace_core::error::{MillraceError, ParseError, PipelineError};

/// 엔진 도메인 에러
///
/// 그래프 구성 실패는 해당 빌드 호출에만 치명적이며 라우터나 프로세스를
/// 중단시키지 않습니다. 파싱 실패는 해당 이벤트만 폐기합니다.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 동일 이름의 노드가 이미 그래프에 존재
    #[error("connectable '{name}' is already in the graph")]
    DuplicateNode { name: String },

    /// 노드가 그래프에 없음
    #[error("connectable '{name}' is not in the graph")]
    MissingNode { name: String },

    /// 간선이 이미 존재
    #[error("connectable '{to}' is already a child of '{from}'")]
    DuplicateEdge { from: String, to: String },

    /// 간선이 존재하지 않음
    #[error("connectable '{to}' is not a child of '{from}'")]
    MissingEdge { from: String, to: String },

    /// 디코더/룰/출력이 모두 비어 있는 환경
    #[error("at least one subgraph must be defined")]
    EmptyEnvironment,

    /// 등록되지 않은 자산 종류
    #[error("no builder registered for asset kind '{0}'")]
    UnknownAssetKind(String),

    /// 자산 빌드 실패 (스테이지 빌더 에러 포함)
    #[error("asset build error: {name}: {reason}")]
    Asset { name: String, reason: String },

    /// 스테이지 빌드 실패 (연산 빌더 에러 포함)
    #[error("stage build error: {stage}: {reason}")]
    Stage { stage: String, reason: String },

    /// 부모 수를 초과하는 입력 연결 시도
    #[error("connectable '{name}' already has all {limit} inputs")]
    InputOverflow { name: String, limit: usize },

    /// 입력이 모두 연결되기 전의 connect 호출
    #[error("connectable '{name}' has {have} inputs but needs {want}")]
    MissingInputs {
        name: String,
        have: usize,
        want: usize,
    },

    /// 카탈로그 로딩 실패
    #[error("catalog error: {reason}")]
    Catalog { reason: String },

    /// 환경 조회 실패
    #[error("environment '{0}' does not exist")]
    EnvironmentNotFound(String),

    /// 라우트 조회 실패
    #[error("route '{0}' is not registered")]
    RouteNotFound(String),

    /// 동일 이름의 라우트가 이미 존재
    #[error("route '{0}' is already in use")]
    RouteExists(String),

    /// 트레이스 싱크 구독 실패
    #[error("environment '{environment}' does not contain asset '{asset}'")]
    AssetNotFound {
        environment: String,
        asset: String,
    },

    /// 이벤트 문자열 파싱 실패
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 연산 실행 실패 (노드 경계에서 포착되어 트레이스로 기록됨)
    #[error("operation failed: {reason}")]
    Op { reason: String },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<EngineError> for MillraceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Parse(e) => MillraceError::Parse(e),
            other => MillraceError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
