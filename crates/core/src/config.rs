//! 설정 관리 — millrace.toml 파싱 및 검증

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Millrace 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MillraceConfig {
    /// 일반 설정
    pub general: GeneralConfig,
    /// 이벤트 수신 서버 설정
    pub server: ServerConfig,
    /// 엔진 설정
    pub engine: EngineConfig,
    /// 메트릭 설정
    pub metrics: MetricsConfig,
}

impl MillraceConfig {
    /// 설정 파일을 로드합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::FileNotFound {
                path: path.display().to_string(),
            })?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })
    }

    /// 설정 값을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.general.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!(
                    "unknown format '{}', expected 'json' or 'pretty'",
                    self.general.log_format
                ),
            });
        }
        if self.server.bind_addr.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server.bind_addr".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if self.server.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_connections".to_owned(),
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.server.max_frame_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_frame_size".to_owned(),
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.engine.catalog_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "engine.catalog_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        for route in &self.engine.routes {
            if route.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "engine.routes.name".to_owned(),
                    reason: "route name must not be empty".to_owned(),
                });
            }
            if route.environment.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "engine.routes.environment".to_owned(),
                    reason: format!("route '{}' has no target environment", route.name),
                });
            }
        }
        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 미사용)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 이벤트 수신 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인드 주소 (예: "0.0.0.0:1514")
    pub bind_addr: String,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 최대 프레임 페이로드 크기 (바이트)
    pub max_frame_size: usize,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:1514".to_owned(),
            max_connections: 256,
            max_frame_size: 1 << 20, // 1MB
            connection_timeout_secs: 300,
        }
    }
}

/// 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 환경 정의 카탈로그 디렉토리
    pub catalog_dir: String,
    /// 시작 시 구성할 라우트 목록
    pub routes: Vec<RouteConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog_dir: "/etc/millrace/catalog".to_owned(),
            routes: Vec::new(),
        }
    }
}

/// 라우트 설정
///
/// `queue`가 지정되면 해당 queue 값의 이벤트만 환경으로 전달되고,
/// 생략하면 모든 이벤트가 전달됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// 라우트 이름
    pub name: String,
    /// 대상 환경 이름
    pub environment: String,
    /// queue 값 기반 선별 (선택)
    #[serde(default)]
    pub queue: Option<i64>,
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// Prometheus HTTP 리스너 주소
    pub bind_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: "127.0.0.1:9690".to_owned(),
        }
    }
}
