//! 에러 타입 — 도메인별 에러 정의

/// Millrace 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum MillraceError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 이벤트 문자열 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 프레임 디코딩 에러
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 이벤트 문자열 파싱 에러
///
/// 와이어 형식 `queue ":" location ":" message` 파싱 중 발생하는 에러입니다.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// queue 필드가 정수가 아님
    #[error("invalid queue id: '{input}'")]
    QueueId { input: String },

    /// 구분자가 없어 queue 필드를 잘라낼 수 없음
    #[error("missing field separator in event string")]
    Truncated,
}

/// 프레임 디코딩 에러
///
/// 길이 접두사 프레이밍(little-endian u32 + payload) 처리 중 발생하는 에러입니다.
/// 에러 발생 시 리더는 초기 상태로 리셋되며 스트림은 계속 소비 가능합니다.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// 프레임 길이가 허용 한도를 초과
    #[error("frame too large: {size} bytes (max: {max})")]
    Oversized { size: usize, max: usize },

    /// 페이로드 조립 실패 (UTF-8 디코딩 등)
    #[error("invalid frame payload: {reason}")]
    InvalidPayload { reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),
}
