//! 수신 계층 에러 타입
//!
//! [`IngestError`]는 프레임 디코딩과 TCP 수신에서 발생하는 모든 에러를
//! 표현합니다. `From<IngestError> for MillraceError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use millrace_core::error::{FrameError, MillraceError, PipelineError};

/// 수신 계층 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 프레임 디코딩 실패
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// 리스너 에러 (바인드, accept, 읽기 등)
    #[error("listener error: {reason}")]
    Listener { reason: String },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IngestError> for MillraceError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Frame(e) => MillraceError::Frame(e),
            IngestError::Io(e) => MillraceError::Io(e),
            other => MillraceError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
