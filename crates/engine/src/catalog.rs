//! 카탈로그 — 환경 정의 공급자
//!
//! 라우터는 [`Catalog`] trait을 통해 환경 정의를 지연 조회합니다.
//! [`DirCatalog`]는 디렉토리 내의 YAML 환경 파일을 스캔하고 파싱합니다.
//! 개별 파일 파싱 실패는 경고 로그를 남기고 건너뜁니다.

use std::collections::HashMap;
use std::path::Path;

use millrace_core::EnvironmentDefinition;

use crate::error::EngineError;

/// 환경 정의 공급자 trait
///
/// 라우터 관점에서 카탈로그는 읽기 전용입니다.
pub trait Catalog: Send + Sync {
    /// 이름으로 환경 정의를 조회합니다.
    fn environment_definition(&self, name: &str) -> Result<EnvironmentDefinition, EngineError>;
}

/// 메모리 카탈로그 — 테스트 및 임베딩용
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    definitions: HashMap<String, EnvironmentDefinition>,
}

impl MemoryCatalog {
    /// 빈 카탈로그를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 환경 정의를 추가합니다. 동일 이름은 교체됩니다.
    pub fn insert(&mut self, def: EnvironmentDefinition) {
        self.definitions.insert(def.name.clone(), def);
    }

    /// 환경 정의를 추가하고 자신을 반환합니다 (빌더 스타일).
    pub fn with(mut self, def: EnvironmentDefinition) -> Self {
        self.insert(def);
        self
    }
}

impl Catalog for MemoryCatalog {
    fn environment_definition(&self, name: &str) -> Result<EnvironmentDefinition, EngineError> {
        self.definitions
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::EnvironmentNotFound(name.to_owned()))
    }
}

/// 디렉토리 카탈로그 — YAML 환경 정의 파일 로더
///
/// `.yml`/`.yaml` 확장자를 가진 파일만 처리합니다. 파일당 환경 하나이며,
/// 환경 이름은 파일 내용의 `name` 필드를 따릅니다.
#[derive(Debug, Default)]
pub struct DirCatalog {
    definitions: HashMap<String, EnvironmentDefinition>,
}

impl DirCatalog {
    /// 디렉토리에서 모든 YAML 환경 정의를 로드합니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    ///
    /// 개별 파일 파싱 실패와 중복 환경 이름은 경고 로그를 남기고
    /// 건너뜁니다.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let dir = dir.as_ref();

        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            EngineError::Catalog {
                reason: format!("failed to read directory {}: {e}", dir.display()),
            }
        })?;

        let mut definitions = HashMap::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            EngineError::Catalog {
                reason: format!("failed to read directory entry in {}: {e}", dir.display()),
            }
        })? {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if !is_yaml {
                continue;
            }

            match Self::load_file(&path).await {
                Ok(def) => {
                    if definitions.contains_key(&def.name) {
                        tracing::warn!(
                            environment = %def.name,
                            path = %path.display(),
                            "duplicate environment name, skipping"
                        );
                        continue;
                    }
                    definitions.insert(def.name.clone(), def);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load environment file, skipping"
                    );
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            count = definitions.len(),
            "loaded environment definitions"
        );
        Ok(Self { definitions })
    }

    async fn load_file(path: &Path) -> Result<EnvironmentDefinition, EngineError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::Catalog {
                reason: format!("failed to read file: {e}"),
            })?;
        serde_yaml::from_str(&text).map_err(|e| EngineError::Catalog {
            reason: format!("failed to parse yaml: {e}"),
        })
    }

    /// 로드된 환경 이름 목록을 반환합니다.
    pub fn environment_names(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    /// 로드된 환경 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// 환경이 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Catalog for DirCatalog {
    fn environment_definition(&self, name: &str) -> Result<EnvironmentDefinition, EngineError> {
        self.definitions
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::EnvironmentNotFound(name.to_owned()))
    }
}
