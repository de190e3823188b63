// 목적:
// - 저장 어댑터의 듀얼 라이트 의미론을 실제 파일 백엔드로 검증한다.
//
// 설명:
// - 레거시 JSONL 백엔드와 실패를 주입하는 모의 백엔드를 조합해
//   부분 실패/전원 실패/치명 오류 전파를 확인한다.
//
// 참조:
// - src/core/storage_adapter.rs
// - src/index/legacy_store.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use newsvec_pipeline::core::storage_adapter::{
    BackendChoice, LegacyBackend, NewsBackend, StorageAdapter,
};
use newsvec_pipeline::index::legacy_store::{LegacyDatasetStore, LegacyNewsRow};
use newsvec_pipeline::{CoreError, CoreResult};

enum FailureMode {
    None,
    Recoverable,
    Fatal,
}

/// 실패를 주입할 수 있는 모의 백엔드다.
struct MockBackend {
    failure: FailureMode,
    inserts: AtomicU64,
}

impl MockBackend {
    fn new(failure: FailureMode) -> Self {
        Self {
            failure,
            inserts: AtomicU64::new(0),
        }
    }

    fn check(&self) -> CoreResult<()> {
        match self.failure {
            FailureMode::None => Ok(()),
            FailureMode::Recoverable => {
                Err(CoreError::Db("의도된 실패".to_string()))
            }
            FailureMode::Fatal => Err(CoreError::Fatal("연결 불가".to_string())),
        }
    }
}

#[async_trait]
impl NewsBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn insert(&self, records: &[LegacyNewsRow], _allow_update: bool) -> CoreResult<u64> {
        self.check()?;
        self.inserts.fetch_add(records.len() as u64, Ordering::SeqCst);
        Ok(records.len() as u64)
    }

    async fn update(&self, _unique_id: &str, _fields: &Map<String, Value>) -> CoreResult<bool> {
        self.check()?;
        Ok(true)
    }

    async fn fetch(
        &self,
        _min_date: &str,
        _max_date: &str,
        _agency: Option<&str>,
    ) -> CoreResult<Vec<LegacyNewsRow>> {
        self.check()?;
        Ok(Vec::new())
    }
}

fn sample_row(unique_id: &str) -> LegacyNewsRow {
    LegacyNewsRow {
        unique_id: unique_id.to_string(),
        agency: Some("ministry-health".to_string()),
        title: Some("보도자료".to_string()),
        published_datetime: Some("2025-01-15T09:00:00+00:00".to_string()),
        ..LegacyNewsRow::default()
    }
}

fn legacy_backend(dir: &tempfile::TempDir) -> Arc<dyn NewsBackend> {
    Arc::new(LegacyBackend::new(LegacyDatasetStore::new(
        dir.path().join("news.jsonl"),
    )))
}

#[tokio::test]
async fn dual_write_survives_one_backend_failure() {
    let dir = tempfile::tempdir().unwrap();
    let flaky: Arc<dyn NewsBackend> = Arc::new(MockBackend::new(FailureMode::Recoverable));
    let adapter =
        StorageAdapter::with_mode(BackendChoice::Dual, None, legacy_backend(&dir), flaky).unwrap();

    let affected = adapter.insert(&[sample_row("a-1")], false).await.unwrap();
    assert_eq!(affected, 1);

    // 읽기 기준은 레거시 백엔드다.
    let rows = adapter
        .fetch("2025-01-15", "2025-01-15", None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].unique_id, "a-1");
}

#[tokio::test]
async fn dual_write_fails_only_when_all_backends_fail() {
    let first: Arc<dyn NewsBackend> = Arc::new(MockBackend::new(FailureMode::Recoverable));
    let second: Arc<dyn NewsBackend> = Arc::new(MockBackend::new(FailureMode::Recoverable));
    let adapter = StorageAdapter::new(vec![first.clone(), second], first).unwrap();

    let error = adapter.insert(&[sample_row("a-1")], false).await.unwrap_err();
    assert!(matches!(error, CoreError::Db(_)));
}

#[tokio::test]
async fn fatal_error_propagates_even_in_dual_mode() {
    let dir = tempfile::tempdir().unwrap();
    let fatal: Arc<dyn NewsBackend> = Arc::new(MockBackend::new(FailureMode::Fatal));
    let adapter =
        StorageAdapter::with_mode(BackendChoice::Dual, None, legacy_backend(&dir), fatal).unwrap();

    let error = adapter.insert(&[sample_row("a-1")], false).await.unwrap_err();
    assert!(error.is_fatal());
}

#[tokio::test]
async fn single_backend_error_is_propagated_as_is() {
    let flaky: Arc<dyn NewsBackend> = Arc::new(MockBackend::new(FailureMode::Recoverable));
    let adapter = StorageAdapter::new(vec![flaky.clone()], flaky).unwrap();

    let error = adapter.insert(&[sample_row("a-1")], false).await.unwrap_err();
    assert!(matches!(error, CoreError::Db(_)));
}

#[tokio::test]
async fn legacy_mode_round_trips_insert_update_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = legacy_backend(&dir);
    let adapter =
        StorageAdapter::with_mode(BackendChoice::Legacy, None, legacy.clone(), legacy).unwrap();

    adapter
        .insert(&[sample_row("a-1"), sample_row("a-2")], false)
        .await
        .unwrap();

    let mut fields = Map::new();
    fields.insert("summary".to_string(), json!("갱신된 요약"));
    assert!(adapter.update("a-1", &fields).await.unwrap());

    let rows = adapter
        .fetch("2025-01-01", "2025-01-31", Some("ministry-health"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    let updated = rows.iter().find(|row| row.unique_id == "a-1").unwrap();
    assert_eq!(updated.summary.as_deref(), Some("갱신된 요약"));
}

#[tokio::test]
async fn read_backend_can_be_overridden_in_dual_mode() {
    let dir = tempfile::tempdir().unwrap();
    let mock: Arc<dyn NewsBackend> = Arc::new(MockBackend::new(FailureMode::None));
    let adapter = StorageAdapter::with_mode(
        BackendChoice::Dual,
        Some(BackendChoice::Relational),
        legacy_backend(&dir),
        mock,
    )
    .unwrap();

    adapter.insert(&[sample_row("a-1")], false).await.unwrap();

    // 읽기 재정의가 모의 백엔드를 향하므로 레거시에 쓴 행이 보이지 않는다.
    let rows = adapter
        .fetch("2025-01-15", "2025-01-15", None)
        .await
        .unwrap();
    assert!(rows.is_empty());

    assert!(StorageAdapter::with_mode(
        BackendChoice::Dual,
        Some(BackendChoice::Dual),
        legacy_backend(&dir),
        Arc::new(MockBackend::new(FailureMode::None)),
    )
    .is_err());
}

#[tokio::test]
async fn adapter_requires_at_least_one_write_backend() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = legacy_backend(&dir);
    assert!(StorageAdapter::new(Vec::new(), legacy).is_err());
}
