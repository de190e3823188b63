// 목적:
// - 레거시 파일 백엔드와 관계형 백엔드를 단일 쓰기 계약 뒤에 묶는다.
//
// 설명:
// - 이관 기간 동안 쓰기를 두 백엔드에 복제(듀얼 라이트)하고,
//   읽기는 하나의 기준 백엔드에서만 수행한다.
// - 단일 백엔드 오류는 그대로 전파하고, 듀얼에서는 모든 백엔드가
//   실패했을 때만 오류로 본다. 치명 오류는 즉시 전파한다.
//
// 디자인 패턴:
// - 어댑터 패턴(Adapter Pattern) + 전략 패턴(Strategy Pattern).
//
// 참조:
// - src/index/legacy_store.rs
// - src/index/news_store.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::errors::{CoreError, CoreResult};
use crate::index::cache::ReferenceCache;
use crate::index::legacy_store::{LegacyDatasetStore, LegacyNewsRow};
use crate::index::news_store::{FieldValue, NewsInsertRecord, NewsStore, StoredNewsRow};
use crate::index::vector::decode_embedding_value;

/// 타임스탬프로 해석하는 관계형 컬럼.
const TIMESTAMP_COLUMNS: &[&str] = &[
    "published_at",
    "updated_datetime",
    "extracted_at",
    "embedding_generated_at",
];

/// 쓰기 경로의 저장 백엔드 계약이다. 레거시 평면 포맷을 경계 표현으로 쓴다.
#[async_trait]
pub trait NewsBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn insert(&self, records: &[LegacyNewsRow], allow_update: bool) -> CoreResult<u64>;

    async fn update(&self, unique_id: &str, fields: &Map<String, Value>) -> CoreResult<bool>;

    async fn fetch(
        &self,
        min_date: &str,
        max_date: &str,
        agency: Option<&str>,
    ) -> CoreResult<Vec<LegacyNewsRow>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    Legacy,
    Relational,
    Dual,
}

impl BackendChoice {
    pub fn parse(value: &str) -> CoreResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "relational" => Ok(Self::Relational),
            "dual" => Ok(Self::Dual),
            other => Err(CoreError::Config(format!(
                "알 수 없는 저장 백엔드입니다: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Relational => "relational",
            Self::Dual => "dual",
        }
    }
}

/// 레거시 JSONL 파일 백엔드 어댑터다.
pub struct LegacyBackend {
    store: LegacyDatasetStore,
}

impl LegacyBackend {
    pub fn new(store: LegacyDatasetStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NewsBackend for LegacyBackend {
    fn name(&self) -> &'static str {
        "legacy"
    }

    async fn insert(&self, records: &[LegacyNewsRow], allow_update: bool) -> CoreResult<u64> {
        self.store.insert(records, allow_update).await
    }

    async fn update(&self, unique_id: &str, fields: &Map<String, Value>) -> CoreResult<bool> {
        self.store.update(unique_id, fields).await
    }

    async fn fetch(
        &self,
        min_date: &str,
        max_date: &str,
        agency: Option<&str>,
    ) -> CoreResult<Vec<LegacyNewsRow>> {
        self.store.fetch(min_date, max_date, agency).await
    }
}

/// PostgreSQL 백엔드 어댑터다. 경계의 평면 포맷을 참조 캐시로
/// 숫자 외래키 표현과 상호 변환한다.
pub struct RelationalBackend {
    store: Arc<NewsStore>,
}

impl RelationalBackend {
    pub fn new(store: Arc<NewsStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NewsBackend for RelationalBackend {
    fn name(&self) -> &'static str {
        "relational"
    }

    async fn insert(&self, records: &[LegacyNewsRow], allow_update: bool) -> CoreResult<u64> {
        let cache = self.store.reference_cache().await?;

        let mut converted = Vec::with_capacity(records.len());
        for record in records {
            if let Some(insert_record) = to_insert_record(record, &cache)? {
                converted.push(insert_record);
            }
        }

        if converted.is_empty() {
            warn!("변환 가능한 레코드가 없어 삽입을 건너뜁니다");
            return Ok(0);
        }
        self.store.insert(&converted, allow_update).await
    }

    async fn update(&self, unique_id: &str, fields: &Map<String, Value>) -> CoreResult<bool> {
        let cache = self.store.reference_cache().await?;
        let updates = to_field_updates(fields, &cache)?;
        if updates.is_empty() {
            warn!(unique_id, "변환 가능한 갱신 필드가 없어 건너뜁니다");
            return Ok(false);
        }
        self.store.update(unique_id, &updates).await
    }

    async fn fetch(
        &self,
        min_date: &str,
        max_date: &str,
        agency: Option<&str>,
    ) -> CoreResult<Vec<LegacyNewsRow>> {
        let cache = self.store.reference_cache().await?;
        let rows = self.store.fetch_rows(min_date, max_date, agency).await?;
        Ok(rows
            .into_iter()
            .map(|row| to_legacy_row(row, &cache))
            .collect())
    }
}

/// 설정된 모드에 따라 쓰기/읽기 백엔드를 중개하는 어댑터다.
pub struct StorageAdapter {
    writes: Vec<Arc<dyn NewsBackend>>,
    read: Arc<dyn NewsBackend>,
}

impl StorageAdapter {
    pub fn new(writes: Vec<Arc<dyn NewsBackend>>, read: Arc<dyn NewsBackend>) -> CoreResult<Self> {
        if writes.is_empty() {
            return Err(CoreError::Config(
                "쓰기 백엔드가 하나 이상 필요합니다".to_string(),
            ));
        }
        Ok(Self { writes, read })
    }

    /// 모드별 표준 구성을 만든다. 읽기 기준은 재정의가 없으면
    /// 듀얼 모드에서 레거시, 단일 모드에서 쓰기 백엔드 자신이다.
    pub fn with_mode(
        mode: BackendChoice,
        read_from: Option<BackendChoice>,
        legacy: Arc<dyn NewsBackend>,
        relational: Arc<dyn NewsBackend>,
    ) -> CoreResult<Self> {
        let read_choice = match read_from {
            Some(BackendChoice::Dual) => {
                return Err(CoreError::Config(
                    "읽기 백엔드는 단일 백엔드여야 합니다".to_string(),
                ))
            }
            Some(choice) => choice,
            None => match mode {
                BackendChoice::Dual => BackendChoice::Legacy,
                single => single,
            },
        };
        let read = match read_choice {
            BackendChoice::Legacy => legacy.clone(),
            _ => relational.clone(),
        };

        match mode {
            BackendChoice::Legacy => Self::new(vec![legacy], read),
            BackendChoice::Relational => Self::new(vec![relational], read),
            BackendChoice::Dual => Self::new(vec![legacy, relational], read),
        }
    }

    pub async fn insert(&self, records: &[LegacyNewsRow], allow_update: bool) -> CoreResult<u64> {
        self.fan_out(|backend| {
            let records = records.to_vec();
            async move { backend.insert(&records, allow_update).await }
        })
        .await
    }

    pub async fn update(&self, unique_id: &str, fields: &Map<String, Value>) -> CoreResult<bool> {
        let unique_id = unique_id.to_string();
        let fields = fields.clone();
        self.fan_out(move |backend| {
            let unique_id = unique_id.clone();
            let fields = fields.clone();
            async move { backend.update(&unique_id, &fields).await }
        })
        .await
    }

    pub async fn fetch(
        &self,
        min_date: &str,
        max_date: &str,
        agency: Option<&str>,
    ) -> CoreResult<Vec<LegacyNewsRow>> {
        self.read.fetch(min_date, max_date, agency).await
    }

    /// 쓰기 연산을 모든 백엔드에 복제한다. 단일 백엔드 구성에서는
    /// 오류를 그대로 전파하고, 다중 구성에서는 전원 실패 시에만
    /// 오류로 본다. 치명 오류는 구성과 무관하게 즉시 전파한다.
    async fn fan_out<T, F, Fut>(&self, operation: F) -> CoreResult<T>
    where
        F: Fn(Arc<dyn NewsBackend>) -> Fut,
        Fut: std::future::Future<Output = CoreResult<T>>,
    {
        if self.writes.len() == 1 {
            return operation(self.writes[0].clone()).await;
        }

        let mut first_success = None;
        let mut failures = Vec::new();
        for backend in &self.writes {
            match operation(backend.clone()).await {
                Ok(result) => {
                    if first_success.is_none() {
                        first_success = Some(result);
                    }
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(backend = backend.name(), %error, "백엔드 쓰기 실패");
                    failures.push(format!("{}: {}", backend.name(), error));
                }
            }
        }

        match first_success {
            Some(result) => Ok(result),
            None => Err(CoreError::Db(format!(
                "모든 백엔드 쓰기가 실패했습니다: {}",
                failures.join("; ")
            ))),
        }
    }
}

/// 평면 레코드를 관계형 삽입 레코드로 변환한다.
/// 미지의 기관은 치명 오류가 아니라 건너뛰기(None)다.
fn to_insert_record(
    record: &LegacyNewsRow,
    cache: &ReferenceCache,
) -> CoreResult<Option<NewsInsertRecord>> {
    let agency_key = match record.agency.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => key,
        _ => {
            warn!(unique_id = %record.unique_id, "기관이 없는 레코드를 건너뜁니다");
            return Ok(None);
        }
    };

    let agency = match cache.agency_by_key(agency_key) {
        Some(agency) => agency,
        None => {
            warn!(
                unique_id = %record.unique_id,
                agency = agency_key,
                "미등록 기관 레코드를 건너뜁니다"
            );
            return Ok(None);
        }
    };

    let published_at = record
        .published_datetime
        .as_deref()
        .and_then(parse_timestamp)
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "발행 시각을 해석할 수 없습니다 (unique_id={})",
                record.unique_id
            ))
        })?;

    Ok(Some(NewsInsertRecord {
        unique_id: record.unique_id.clone(),
        agency_id: agency.id,
        agency_key: agency.key.clone(),
        agency_name: agency.name.clone(),
        theme_l1_id: cache.resolve_theme_id(record.theme_l1_code.as_deref()),
        theme_l2_id: cache.resolve_theme_id(record.theme_l2_code.as_deref()),
        theme_l3_id: cache.resolve_theme_id(record.theme_l3_code.as_deref()),
        most_specific_theme_id: cache.resolve_theme_id(record.most_specific_theme_code.as_deref()),
        title: record.title.clone().unwrap_or_default(),
        url: record.url.clone(),
        image_url: record.image.clone(),
        video_url: record.video_url.clone(),
        category: record.category.clone(),
        tags: record.tags.clone().unwrap_or_default(),
        content: record.content.clone(),
        editorial_lead: record.editorial_lead.clone(),
        subtitle: record.subtitle.clone(),
        summary: record.summary.clone(),
        published_at,
        updated_datetime: record.updated_datetime.as_deref().and_then(parse_timestamp),
        extracted_at: record
            .extracted_datetime
            .as_deref()
            .and_then(parse_timestamp),
    }))
}

/// 관계형 원본 행을 레거시 평면 포맷으로 되돌린다.
fn to_legacy_row(row: StoredNewsRow, cache: &ReferenceCache) -> LegacyNewsRow {
    LegacyNewsRow {
        unique_id: row.unique_id,
        agency: row.agency_key,
        title: row.title,
        url: row.url,
        image: row.image_url,
        video_url: row.video_url,
        category: row.category,
        tags: row.tags,
        content: row.content,
        editorial_lead: row.editorial_lead,
        subtitle: row.subtitle,
        summary: row.summary,
        published_datetime: row.published_at.map(|ts| ts.to_rfc3339()),
        updated_datetime: row.updated_datetime.map(|ts| ts.to_rfc3339()),
        extracted_datetime: row.extracted_at.map(|ts| ts.to_rfc3339()),
        theme_l1_code: cache.theme_code_for_id(row.theme_l1_id),
        theme_l2_code: cache.theme_code_for_id(row.theme_l2_id),
        theme_l3_code: cache.theme_code_for_id(row.theme_l3_id),
        most_specific_theme_code: cache.theme_code_for_id(row.most_specific_theme_id),
        content_embedding: row.content_embedding.map(Value::String),
    }
}

/// 레거시 갱신 필드를 관계형 컬럼/값으로 변환한다.
/// 매핑 불가능한 필드는 경고 후 건너뛴다.
fn to_field_updates(
    fields: &Map<String, Value>,
    cache: &ReferenceCache,
) -> CoreResult<Vec<(String, FieldValue)>> {
    let theme_columns: HashMap<&str, &str> = HashMap::from([
        ("theme_1_level_1_code", "theme_l1_id"),
        ("theme_1_level_2_code", "theme_l2_id"),
        ("theme_1_level_3_code", "theme_l3_id"),
        ("most_specific_theme_code", "most_specific_theme_id"),
    ]);

    let mut updates = Vec::new();
    for (field, value) in fields {
        if let Some(&column) = theme_columns.get(field.as_str()) {
            let resolved = value.as_str().and_then(|code| cache.resolve_theme_id(Some(code)));
            match resolved {
                Some(theme_id) => {
                    updates.push((column.to_string(), FieldValue::Integer(theme_id as i64)))
                }
                None => updates.push((column.to_string(), FieldValue::Null)),
            }
            continue;
        }

        let column = match relational_column_for(field) {
            Some(column) => column,
            None => {
                warn!(field, "관계형 백엔드가 모르는 필드를 건너뜁니다");
                continue;
            }
        };

        let converted = convert_field_value(column, value)?;
        match converted {
            Some(field_value) => updates.push((column.to_string(), field_value)),
            None => warn!(field, "변환 불가능한 값을 건너뜁니다"),
        }
    }
    Ok(updates)
}

fn relational_column_for(legacy_field: &str) -> Option<&'static str> {
    match legacy_field {
        "image" => Some("image_url"),
        "published_datetime" => Some("published_at"),
        "updated_datetime" => Some("updated_datetime"),
        "extracted_datetime" => Some("extracted_at"),
        "title" => Some("title"),
        "url" => Some("url"),
        "video_url" => Some("video_url"),
        "category" => Some("category"),
        "tags" => Some("tags"),
        "content" => Some("content"),
        "editorial_lead" => Some("editorial_lead"),
        "subtitle" => Some("subtitle"),
        "summary" => Some("summary"),
        "content_embedding" => Some("content_embedding"),
        _ => None,
    }
}

fn convert_field_value(column: &str, value: &Value) -> CoreResult<Option<FieldValue>> {
    if value.is_null() {
        return Ok(Some(FieldValue::Null));
    }

    if column == "content_embedding" {
        return match decode_embedding_value(value) {
            Some(values) => Ok(Some(FieldValue::Vector(values))),
            None => Err(CoreError::Validation(
                "임베딩 값을 디코딩할 수 없습니다".to_string(),
            )),
        };
    }

    if TIMESTAMP_COLUMNS.contains(&column) {
        let parsed = value.as_str().and_then(parse_timestamp).ok_or_else(|| {
            CoreError::Validation(format!("{} 값을 시각으로 해석할 수 없습니다", column))
        })?;
        return Ok(Some(FieldValue::Timestamp(parsed)));
    }

    let converted = match value {
        Value::String(text) => Some(FieldValue::Text(text.clone())),
        Value::Number(number) if number.is_i64() => {
            number.as_i64().map(FieldValue::Integer)
        }
        Value::Number(number) => number.as_f64().map(FieldValue::Real),
        Value::Array(items) => {
            let mut strings = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(text) => strings.push(text.to_string()),
                    None => return Ok(None),
                }
            }
            Some(FieldValue::TextArray(strings))
        }
        _ => None,
    };
    Ok(converted)
}

/// RFC3339 우선으로 시각 문자열을 해석한다. 시간대 없는 표기는 UTC로 본다.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return parsed.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}
