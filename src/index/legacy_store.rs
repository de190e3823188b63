// 목적:
// - 레거시 평면 데이터셋(JSONL 파일) 백엔드를 제공한다.
//
// 설명:
// - 한 줄에 한 문서인 평면 JSON 레코드를 파일로 유지한다.
// - 이관 기간 동안 관계형 저장소와 나란히 동작하는 호환 경로다.
// - 쓰기는 임시 파일에 기록한 뒤 원자적으로 교체한다.
//
// 디자인 패턴:
// - 파일 기반 저장소(File-backed Repository).
//
// 참조:
// - src/core/storage_adapter.rs
// - src/index/news_store.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::core::errors::{CoreError, CoreResult};
use crate::index::sql::validate_date;

/// 레거시 평면 포맷의 뉴스 레코드다. 필드 이름은 기존 데이터셋을 따른다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyNewsRow {
    pub unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editorial_lead: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_datetime: Option<String>,
    #[serde(
        default,
        rename = "theme_1_level_1_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub theme_l1_code: Option<String>,
    #[serde(
        default,
        rename = "theme_1_level_2_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub theme_l2_code: Option<String>,
    #[serde(
        default,
        rename = "theme_1_level_3_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub theme_l3_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_specific_theme_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_embedding: Option<Value>,
}

pub struct LegacyDatasetStore {
    path: PathBuf,
}

impl LegacyDatasetStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 데이터셋 전체를 읽는다. 파일이 없으면 빈 데이터셋으로 본다.
    async fn load(&self) -> CoreResult<Vec<Value>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "데이터셋 파일이 없어 빈 상태로 시작합니다");
                return Ok(Vec::new());
            }
            Err(error) => {
                return Err(CoreError::Db(format!(
                    "데이터셋 읽기 실패 ({}): {}",
                    self.path.display(),
                    error
                )))
            }
        };

        let mut rows = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(value) => rows.push(value),
                Err(error) => {
                    warn!(
                        path = %self.path.display(),
                        line = line_no + 1,
                        %error,
                        "파싱 불가능한 행을 건너뜁니다"
                    );
                }
            }
        }
        Ok(rows)
    }

    /// 데이터셋을 임시 파일에 쓴 뒤 원자적으로 교체한다.
    async fn save(&self, rows: &[Value]) -> CoreResult<()> {
        let mut body = String::new();
        for row in rows {
            let line = serde_json::to_string(row).map_err(|error| {
                CoreError::Serialization(format!("레코드 직렬화 실패: {}", error))
            })?;
            body.push_str(&line);
            body.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|error| {
                    CoreError::Db(format!("데이터셋 디렉터리 생성 실패: {}", error))
                })?;
            }
        }

        let tmp_path = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp_path, body.as_bytes())
            .await
            .map_err(|error| CoreError::Db(format!("데이터셋 쓰기 실패: {}", error)))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|error| CoreError::Db(format!("데이터셋 교체 실패: {}", error)))?;
        Ok(())
    }

    /// 레코드를 추가한다. 기존 unique_id는 allow_update일 때만 교체한다.
    pub async fn insert(&self, records: &[LegacyNewsRow], allow_update: bool) -> CoreResult<u64> {
        if records.is_empty() {
            return Err(CoreError::Validation(
                "뉴스 목록은 비어 있을 수 없습니다".to_string(),
            ));
        }

        let mut rows = self.load().await?;
        let mut index_by_id = HashMap::new();
        for (index, row) in rows.iter().enumerate() {
            if let Some(unique_id) = row.get("unique_id").and_then(Value::as_str) {
                index_by_id.insert(unique_id.to_string(), index);
            }
        }

        let mut affected = 0u64;
        for record in records {
            let value = serde_json::to_value(record).map_err(|error| {
                CoreError::Serialization(format!("레코드 직렬화 실패: {}", error))
            })?;

            match index_by_id.get(&record.unique_id) {
                Some(&existing) if allow_update => {
                    rows[existing] = value;
                    affected += 1;
                }
                Some(_) => {
                    debug!(unique_id = %record.unique_id, "기존 레코드를 건너뜁니다");
                }
                None => {
                    index_by_id.insert(record.unique_id.clone(), rows.len());
                    rows.push(value);
                    affected += 1;
                }
            }
        }

        self.save(&rows).await?;
        info!(
            path = %self.path.display(),
            affected, allow_update, "레거시 데이터셋에 기록했습니다"
        );
        Ok(affected)
    }

    /// 단일 레코드의 필드를 병합 갱신한다. 일치 행 존재 여부를 반환한다.
    pub async fn update(&self, unique_id: &str, fields: &Map<String, Value>) -> CoreResult<bool> {
        if fields.is_empty() {
            return Err(CoreError::Validation(
                "갱신 필드 목록은 비어 있을 수 없습니다".to_string(),
            ));
        }

        let mut rows = self.load().await?;
        let mut matched = false;
        for row in rows.iter_mut() {
            let is_target = row
                .get("unique_id")
                .and_then(Value::as_str)
                .map(|id| id == unique_id)
                .unwrap_or(false);
            if !is_target {
                continue;
            }
            if let Some(object) = row.as_object_mut() {
                for (key, value) in fields {
                    object.insert(key.clone(), value.clone());
                }
                matched = true;
            }
            break;
        }

        if matched {
            self.save(&rows).await?;
            debug!(unique_id, "레거시 레코드를 갱신했습니다");
        } else {
            warn!(unique_id, "갱신 대상 레거시 레코드가 없습니다");
        }
        Ok(matched)
    }

    /// 날짜 범위(양끝 포함)와 기관 필터로 레코드를 조회한다.
    pub async fn fetch(
        &self,
        min_date: &str,
        max_date: &str,
        agency: Option<&str>,
    ) -> CoreResult<Vec<LegacyNewsRow>> {
        validate_date(min_date, "min_date")?;
        validate_date(max_date, "max_date")?;

        let rows = self.load().await?;
        let mut matched = Vec::new();
        for row in rows {
            let date = row
                .get("published_datetime")
                .and_then(Value::as_str)
                .map(|value| value.chars().take(10).collect::<String>());
            let in_window = match date {
                Some(date) => date.as_str() >= min_date && date.as_str() <= max_date,
                None => false,
            };
            if !in_window {
                continue;
            }

            if let Some(agency) = agency {
                let row_agency = row.get("agency").and_then(Value::as_str);
                if row_agency != Some(agency) {
                    continue;
                }
            }

            match serde_json::from_value::<LegacyNewsRow>(row) {
                Ok(record) => matched.push(record),
                Err(error) => {
                    warn!(%error, "역직렬화 불가능한 레거시 행을 건너뜁니다");
                }
            }
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(unique_id: &str, date: &str) -> LegacyNewsRow {
        LegacyNewsRow {
            unique_id: unique_id.to_string(),
            agency: Some("ministry-health".to_string()),
            title: Some("title".to_string()),
            published_datetime: Some(format!("{}T09:00:00+00:00", date)),
            theme_l1_code: Some("ECO".to_string()),
            ..LegacyNewsRow::default()
        }
    }

    #[test]
    fn legacy_field_names_survive_serialization() {
        let row = sample_row("a-1", "2025-01-15");
        let value = serde_json::to_value(&row).unwrap();
        assert!(value.get("theme_1_level_1_code").is_some());
        assert!(value.get("theme_l1_code").is_none());
        assert!(value.get("content").is_none());
    }

    #[tokio::test]
    async fn insert_skips_existing_unless_update_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LegacyDatasetStore::new(dir.path().join("news.jsonl"));

        let affected = store
            .insert(&[sample_row("a-1", "2025-01-15")], false)
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let mut changed = sample_row("a-1", "2025-01-15");
        changed.title = Some("changed".to_string());

        let affected = store.insert(&[changed.clone()], false).await.unwrap();
        assert_eq!(affected, 0);

        let affected = store.insert(&[changed], true).await.unwrap();
        assert_eq!(affected, 1);

        let rows = store.fetch("2025-01-15", "2025-01-15", None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title.as_deref(), Some("changed"));
    }

    #[tokio::test]
    async fn fetch_filters_by_window_and_agency() {
        let dir = tempfile::tempdir().unwrap();
        let store = LegacyDatasetStore::new(dir.path().join("news.jsonl"));

        let mut other_agency = sample_row("b-1", "2025-01-16");
        other_agency.agency = Some("city-hall".to_string());
        store
            .insert(
                &[
                    sample_row("a-1", "2025-01-15"),
                    other_agency,
                    sample_row("a-2", "2025-02-01"),
                ],
                false,
            )
            .await
            .unwrap();

        let rows = store.fetch("2025-01-01", "2025-01-31", None).await.unwrap();
        assert_eq!(rows.len(), 2);

        let rows = store
            .fetch("2025-01-01", "2025-01-31", Some("ministry-health"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].unique_id, "a-1");
    }

    #[tokio::test]
    async fn update_merges_fields_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = LegacyDatasetStore::new(dir.path().join("news.jsonl"));
        store
            .insert(&[sample_row("a-1", "2025-01-15")], false)
            .await
            .unwrap();

        let mut fields = Map::new();
        fields.insert("summary".to_string(), serde_json::json!("요약"));
        assert!(store.update("a-1", &fields).await.unwrap());
        assert!(!store.update("missing", &fields).await.unwrap());

        let rows = store.fetch("2025-01-15", "2025-01-15", None).await.unwrap();
        assert_eq!(rows[0].summary.as_deref(), Some("요약"));
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LegacyDatasetStore::new(dir.path().join("absent.jsonl"));
        let rows = store.fetch("2025-01-01", "2025-12-31", None).await.unwrap();
        assert!(rows.is_empty());
    }
}
