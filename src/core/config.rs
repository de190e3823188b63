// 목적:
// - 환경 변수 기반 실행 설정을 적재/검증한다.
//
// 설명:
// - 필수 항목 누락과 숫자 파싱 실패를 기동 시점에 Config 오류로 만든다.
// - 배치 크기/풀 크기/타임아웃은 합리적 기본값을 가진다.
//
// 디자인 패턴:
// - 설정 객체(Configuration Object).
//
// 참조:
// - src/core/errors.rs
// - src/core/sync_pipeline.rs

use std::str::FromStr;

use crate::core::errors::{CoreError, CoreResult};
use crate::core::storage_adapter::BackendChoice;

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub dsn: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub dimension: usize,
    pub batch_size: usize,
    pub max_token_estimate: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct TypesenseSettings {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub collection: String,
    pub timeout_secs: u64,
}

impl TypesenseSettings {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub source_page_size: i64,
    pub sink_batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: BackendChoice,
    /// 듀얼 모드의 읽기 기준 백엔드 재정의. 없으면 레거시가 기본이다.
    pub read_from: Option<BackendChoice>,
    pub legacy_dataset_path: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub embedding: EmbeddingSettings,
    pub typesense: TypesenseSettings,
    pub sync: SyncSettings,
    pub storage: StorageSettings,
}

impl Settings {
    /// 프로세스 환경 변수에서 설정을 적재한다.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 주어진 조회 함수로 설정을 적재한다. 테스트에서 맵을 주입한다.
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = DatabaseSettings {
            dsn: required(&lookup, "DATABASE_URL")?,
            pool_min: parsed_or(&lookup, "DATABASE_POOL_MIN", 1)?,
            pool_max: parsed_or(&lookup, "DATABASE_POOL_MAX", 10)?,
            acquire_timeout_ms: parsed_or(&lookup, "DATABASE_ACQUIRE_TIMEOUT_MS", 30_000)?,
        };

        let embedding = EmbeddingSettings {
            base_url: required(&lookup, "EMBEDDINGS_API_URL")?,
            api_key: optional(&lookup, "EMBEDDINGS_API_KEY"),
            dimension: parsed_or(&lookup, "EMBEDDING_DIMENSION", 768)?,
            batch_size: parsed_or(&lookup, "EMBEDDING_BATCH_SIZE", 100)?,
            max_token_estimate: parsed_or(&lookup, "EMBEDDING_MAX_TOKEN_ESTIMATE", 512)?,
            timeout_secs: parsed_or(&lookup, "EMBEDDING_TIMEOUT_SECS", 120)?,
        };

        let typesense = TypesenseSettings {
            protocol: optional(&lookup, "TYPESENSE_PROTOCOL").unwrap_or_else(|| "http".to_string()),
            host: required(&lookup, "TYPESENSE_HOST")?,
            port: parsed_or(&lookup, "TYPESENSE_PORT", 8108)?,
            api_key: required(&lookup, "TYPESENSE_API_KEY")?,
            collection: required(&lookup, "TYPESENSE_COLLECTION")?,
            timeout_secs: parsed_or(&lookup, "TYPESENSE_TIMEOUT_SECS", 10)?,
        };

        let sync = SyncSettings {
            source_page_size: parsed_or(&lookup, "SYNC_SOURCE_PAGE_SIZE", 5_000)?,
            sink_batch_size: parsed_or(&lookup, "SYNC_SINK_BATCH_SIZE", 1_000)?,
        };

        let backend = match optional(&lookup, "STORAGE_BACKEND") {
            Some(value) => BackendChoice::parse(&value)?,
            None => BackendChoice::Legacy,
        };
        let read_from = match optional(&lookup, "STORAGE_READ_FROM") {
            Some(value) => Some(BackendChoice::parse(&value)?),
            None => None,
        };
        let storage = StorageSettings {
            backend,
            read_from,
            legacy_dataset_path: optional(&lookup, "LEGACY_DATASET_PATH")
                .unwrap_or_else(|| "data/news.jsonl".to_string()),
        };

        let settings = Self {
            database,
            embedding,
            typesense,
            sync,
            storage,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.database.pool_min > self.database.pool_max {
            return Err(CoreError::Config(format!(
                "DATABASE_POOL_MIN({})은 DATABASE_POOL_MAX({})보다 클 수 없습니다",
                self.database.pool_min, self.database.pool_max
            )));
        }
        if self.embedding.batch_size == 0
            || self.embedding.dimension == 0
            || self.embedding.max_token_estimate == 0
        {
            return Err(CoreError::Config(
                "임베딩 배치/차원/토큰 추정치는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.sync.source_page_size <= 0 || self.sync.sink_batch_size == 0 {
            return Err(CoreError::Config(
                "동기화 페이지/배치 크기는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.storage.read_from == Some(BackendChoice::Dual) {
            return Err(CoreError::Config(
                "STORAGE_READ_FROM은 단일 백엔드여야 합니다".to_string(),
            ));
        }
        Ok(())
    }
}

fn required<F>(lookup: &F, name: &str) -> CoreResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, name) {
        Some(value) => Ok(value),
        None => Err(CoreError::Config(format!(
            "필수 환경 변수가 없습니다: {}",
            name
        ))),
    }
}

fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_or<F, T>(lookup: &F, name: &str, default: T) -> CoreResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(lookup, name) {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|error| {
            CoreError::Config(format!("{} 파싱 실패 ({}): {}", name, value, error))
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/news"),
            ("EMBEDDINGS_API_URL", "http://localhost:8000"),
            ("TYPESENSE_HOST", "localhost"),
            ("TYPESENSE_API_KEY", "secret"),
            ("TYPESENSE_COLLECTION", "news"),
        ])
    }

    fn load(env: &HashMap<&str, &str>) -> CoreResult<Settings> {
        Settings::from_lookup(|name| env.get(name).map(|value| value.to_string()))
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = load(&base_env()).unwrap();
        assert_eq!(settings.database.pool_min, 1);
        assert_eq!(settings.database.pool_max, 10);
        assert_eq!(settings.embedding.dimension, 768);
        assert_eq!(settings.embedding.batch_size, 100);
        assert_eq!(settings.embedding.max_token_estimate, 512);
        assert_eq!(settings.embedding.timeout_secs, 120);
        assert_eq!(settings.typesense.timeout_secs, 10);
        assert_eq!(settings.typesense.base_url(), "http://localhost:8108");
        assert_eq!(settings.sync.source_page_size, 5_000);
        assert_eq!(settings.sync.sink_batch_size, 1_000);
        assert_eq!(settings.storage.backend, BackendChoice::Legacy);
        assert_eq!(settings.storage.read_from, None);
        assert_eq!(settings.storage.legacy_dataset_path, "data/news.jsonl");
    }

    #[test]
    fn missing_required_variable_is_a_config_error() {
        let mut env = base_env();
        env.remove("DATABASE_URL");
        let error = load(&env).unwrap_err();
        assert!(matches!(error, CoreError::Config(_)));
    }

    #[test]
    fn malformed_number_is_a_config_error() {
        let mut env = base_env();
        env.insert("EMBEDDING_BATCH_SIZE", "many");
        assert!(load(&env).is_err());
    }

    #[test]
    fn backend_name_is_parsed() {
        let mut env = base_env();
        env.insert("STORAGE_BACKEND", "dual");
        let settings = load(&env).unwrap();
        assert_eq!(settings.storage.backend, BackendChoice::Dual);

        env.insert("STORAGE_BACKEND", "sqlite");
        assert!(load(&env).is_err());
    }

    #[test]
    fn read_override_must_be_a_single_backend() {
        let mut env = base_env();
        env.insert("STORAGE_BACKEND", "dual");
        env.insert("STORAGE_READ_FROM", "relational");
        let settings = load(&env).unwrap();
        assert_eq!(settings.storage.read_from, Some(BackendChoice::Relational));

        env.insert("STORAGE_READ_FROM", "dual");
        assert!(load(&env).is_err());
    }

    #[test]
    fn pool_bounds_are_checked() {
        let mut env = base_env();
        env.insert("DATABASE_POOL_MIN", "20");
        env.insert("DATABASE_POOL_MAX", "10");
        assert!(load(&env).is_err());
    }
}
