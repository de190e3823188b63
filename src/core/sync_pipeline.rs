// 목적:
// - PostgreSQL → Typesense 검색 인덱스 동기화 파이프라인을 실행한다.
//
// 설명:
// - 날짜 윈도우의 뉴스를 주제 라벨이 붙은 형태로 읽어 검색 문서로
//   변환하고, 벌크 업서트로 인덱스에 반영한다.
// - 증분 모드는 마지막 성공 워터마크 이후 벡터가 생성된 행만 다룬다.
// - 워터마크는 실행이 끝까지 완료된 뒤에만 기록한다.
//
// 디자인 패턴:
// - 파이프라인 패턴(Pipeline Pattern).
//
// 참조:
// - src/index/news_store.rs
// - src/index/typesense.rs
// - src/core/batch.rs

use std::sync::Arc;

use chrono::{DateTime, Datelike};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::core::batch::{process_in_batches, OnBatchError};
use crate::core::errors::{CoreError, CoreResult};
use crate::index::news_store::{EnrichedNewsRow, NewsStore};
use crate::index::typesense::TypesenseClient;
use crate::index::vector::{decode_embedding, RawEmbedding};

/// sync_log에 기록되는 작업 식별자.
pub const SYNC_OPERATION: &str = "typesense_embeddings_sync";

/// 인덱스 스키마의 벡터 필드 이름.
pub const VECTOR_FIELD: &str = "content_embedding";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// 윈도우 전체를 다시 업서트한다.
    Full,
    /// 워터마크 이후 벡터가 생성된 행만 업서트한다.
    Incremental,
}

impl SyncMode {
    pub fn parse(value: &str) -> CoreResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            other => Err(CoreError::Config(format!(
                "알 수 없는 동기화 모드입니다: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

/// 한 번의 동기화 실행 결과다. processed == successful + failed가 항상 성립한다.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn is_consistent(&self) -> bool {
        self.processed == self.successful + self.failed
    }
}

pub struct SyncPipeline {
    store: Arc<NewsStore>,
    typesense: Arc<TypesenseClient>,
    collection: String,
    source_page_size: i64,
    sink_batch_size: usize,
}

impl SyncPipeline {
    pub fn new(
        store: Arc<NewsStore>,
        typesense: Arc<TypesenseClient>,
        collection: &str,
        source_page_size: i64,
        sink_batch_size: usize,
    ) -> CoreResult<Self> {
        if collection.trim().is_empty() {
            return Err(CoreError::Config(
                "typesense.collection은 비어 있을 수 없습니다".to_string(),
            ));
        }
        if source_page_size <= 0 {
            return Err(CoreError::Config(
                "sync.source_page_size는 1 이상이어야 합니다".to_string(),
            ));
        }
        if sink_batch_size == 0 {
            return Err(CoreError::Config(
                "sync.sink_batch_size는 1 이상이어야 합니다".to_string(),
            ));
        }

        Ok(Self {
            store,
            typesense,
            collection: collection.trim().to_string(),
            source_page_size,
            sink_batch_size,
        })
    }

    /// 동기화를 실행한다. limit가 있으면 한 번에 적재하고,
    /// 없으면 소스 페이지 단위로 스트리밍한다.
    pub async fn execute(
        &self,
        mode: SyncMode,
        start_date: &str,
        end_date: &str,
        limit: Option<i64>,
    ) -> CoreResult<SyncReport> {
        info!(
            mode = mode.as_str(),
            start_date, end_date, ?limit, "인덱스 동기화를 시작합니다"
        );

        self.typesense
            .ensure_collection(&self.collection, VECTOR_FIELD)
            .await?;

        let watermark = match mode {
            SyncMode::Incremental => self.store.last_sync_completed_at(SYNC_OPERATION).await?,
            SyncMode::Full => None,
        };

        let mut report = SyncReport::default();

        if let Some(limit) = limit {
            let rows = self
                .store
                .fetch_for_window(start_date, end_date, watermark, Some(limit))
                .await?;
            if !rows.is_empty() {
                self.sync_rows(rows, &mut report).await?;
            }
        } else {
            let mut cursor = self
                .store
                .stream_for_window(start_date, end_date, watermark, self.source_page_size)
                .await?;
            while let Some(rows) = cursor.next_page().await? {
                self.sync_rows(rows, &mut report).await?;
            }
        }

        self.store.record_sync_completed(SYNC_OPERATION).await?;

        if report.failed > 0 {
            warn!(
                processed = report.processed,
                successful = report.successful,
                failed = report.failed,
                "동기화가 일부 실패와 함께 완료되었습니다"
            );
        } else {
            info!(
                processed = report.processed,
                successful = report.successful,
                "동기화 완료"
            );
        }
        Ok(report)
    }

    async fn sync_rows(
        &self,
        rows: Vec<EnrichedNewsRow>,
        report: &mut SyncReport,
    ) -> CoreResult<()> {
        let documents = rows.iter().map(prepare_document).collect::<Vec<_>>();

        let typesense = self.typesense.clone();
        let collection = self.collection.clone();
        let outcome = process_in_batches(
            documents,
            self.sink_batch_size,
            OnBatchError::Continue,
            move |batch| {
                let typesense = typesense.clone();
                let collection = collection.clone();
                async move {
                    let result = typesense.import_documents(&collection, &batch).await?;
                    Ok(result.successful)
                }
            },
        )
        .await?;

        report.processed += outcome.total as u64;
        report.successful += outcome.successful as u64;
        report.failed += outcome.failed as u64;
        report.errors.extend(outcome.errors);
        Ok(())
    }
}

/// 내보내기 행을 검색 문서로 변환한다.
/// 존재하는 문자열 필드는 공백을 정리해 싣고, 없는 필드는 생략한다.
/// 벡터는 디코딩 가능한 경우에만 싣는다.
pub fn prepare_document(row: &EnrichedNewsRow) -> Value {
    let mut doc = Map::new();
    // 자연키는 unique_id 필드로 싣고, 업서트 문서 키(id)로도 복제한다.
    doc.insert("id".to_string(), json!(row.unique_id));
    doc.insert("unique_id".to_string(), json!(row.unique_id));

    put_optional(&mut doc, "agency", &row.agency);
    put_optional(&mut doc, "title", &row.title);
    put_optional(&mut doc, "url", &row.url);
    put_optional(&mut doc, "image", &row.image);
    put_optional(&mut doc, "video_url", &row.video_url);
    put_optional(&mut doc, "category", &row.category);
    put_optional(&mut doc, "content", &row.content);
    put_optional(&mut doc, "summary", &row.summary);
    put_optional(&mut doc, "subtitle", &row.subtitle);
    put_optional(&mut doc, "editorial_lead", &row.editorial_lead);

    let published_at = row.published_at_ts.unwrap_or(0);
    doc.insert("published_at".to_string(), json!(published_at));

    // 추출 시각은 0(미상)일 때 패싯에서 제외한다.
    if let Some(extracted_at) = row.extracted_at_ts.filter(|ts| *ts > 0) {
        doc.insert("extracted_at".to_string(), json!(extracted_at));
    }

    if let Some(year) = row.published_year {
        doc.insert("published_year".to_string(), json!(year));
    }
    if let Some(month) = row.published_month {
        doc.insert("published_month".to_string(), json!(month));
    }
    if let Some(week) = iso_week_of(published_at) {
        doc.insert("published_week".to_string(), json!(week));
    }

    put_optional(&mut doc, "theme_l1_code", &row.theme_l1_code);
    put_optional(&mut doc, "theme_l1_label", &row.theme_l1_label);
    put_optional(&mut doc, "theme_l2_code", &row.theme_l2_code);
    put_optional(&mut doc, "theme_l2_label", &row.theme_l2_label);
    put_optional(&mut doc, "theme_l3_code", &row.theme_l3_code);
    put_optional(&mut doc, "theme_l3_label", &row.theme_l3_label);
    put_optional(&mut doc, "most_specific_theme_code", &row.most_specific_theme_code);
    put_optional(&mut doc, "most_specific_theme_label", &row.most_specific_theme_label);

    if let Some(raw) = &row.content_embedding {
        if let Some(values) = decode_embedding(&RawEmbedding::Text(raw.clone())) {
            if !values.is_empty() {
                doc.insert(VECTOR_FIELD.to_string(), json!(values));
            }
        }
    }

    Value::Object(doc)
}

// 빈 문자열은 null과 같이 "없음"이지만, 공백만 있는 문자열은 존재하는
// 것으로 보고 빈 문자열로 정리해 싣는다. 배포된 인덱스와의 호환 동작이다.
fn put_optional(doc: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        if value.is_empty() {
            return;
        }
        doc.insert(key.to_string(), json!(value.trim()));
    }
}

/// 발행 주차를 ISO 기준 YYYYWW 정수로 만든다. 연말/연초 주는
/// 달력 연도가 아니라 ISO 주차 연도를 따른다.
fn iso_week_of(epoch_secs: i64) -> Option<i64> {
    if epoch_secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(epoch_secs, 0).map(|dt| {
        let week = dt.iso_week();
        week.year() as i64 * 100 + week.week() as i64
    })
}
