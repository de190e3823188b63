// 목적:
// - PostgreSQL 기반 뉴스 저장소 접근을 담당한다.
//
// 설명:
// - 바운디드 커넥션 풀, 참조 데이터 캐시, 배치 insert/upsert,
//   부분 update, 날짜 윈도우 count/조회, 스트리밍 페이지 내보내기,
//   임베딩 후보 선택/영속화, 동기화 워터마크 기록을 제공한다.
// - 날짜 윈도우는 항상 반개구간 [start, end + 1 day)로 해석한다.
//
// 디자인 패턴:
// - 저장소 패턴(Repository Pattern).
//
// 참조:
// - src/index/sql.rs
// - src/index/cache.rs
// - src/core/sync_pipeline.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::core::errors::{CoreError, CoreResult};
use crate::index::cache::{Agency, ReferenceCache, Theme};
use crate::index::sql::{to_pgvector_literal, validate_date, validate_identifier};

/// news 테이블 삽입 컬럼. 바인딩 순서와 반드시 일치해야 한다.
const INSERT_COLUMNS: &[&str] = &[
    "unique_id",
    "agency_id",
    "theme_l1_id",
    "theme_l2_id",
    "theme_l3_id",
    "most_specific_theme_id",
    "title",
    "url",
    "image_url",
    "video_url",
    "category",
    "tags",
    "content",
    "editorial_lead",
    "subtitle",
    "summary",
    "published_at",
    "updated_datetime",
    "extracted_at",
    "agency_key",
    "agency_name",
];

/// upsert 시 덮어쓰지 않는 정체성 인접 컬럼.
const IMMUTABLE_COLUMNS: &[&str] = &["unique_id", "agency_id", "published_at"];

const WINDOW_CLAUSE: &str =
    " WHERE n.published_at >= $1::date AND n.published_at < $2::date + INTERVAL '1 day'";

const EXPORT_SELECT: &str = "\
    SELECT \
        n.unique_id, \
        n.agency_key AS agency, \
        n.title, \
        n.url, \
        n.image_url AS image, \
        n.video_url, \
        n.category, \
        n.content, \
        n.summary, \
        n.subtitle, \
        n.editorial_lead, \
        EXTRACT(EPOCH FROM n.published_at)::bigint AS published_at_ts, \
        EXTRACT(EPOCH FROM n.extracted_at)::bigint AS extracted_at_ts, \
        EXTRACT(YEAR FROM n.published_at)::int AS published_year, \
        EXTRACT(MONTH FROM n.published_at)::int AS published_month, \
        t1.code AS theme_l1_code, \
        t1.label AS theme_l1_label, \
        t2.code AS theme_l2_code, \
        t2.label AS theme_l2_label, \
        t3.code AS theme_l3_code, \
        t3.label AS theme_l3_label, \
        tm.code AS most_specific_theme_code, \
        tm.label AS most_specific_theme_label, \
        n.content_embedding::text AS content_embedding \
    FROM news n \
    LEFT JOIN themes t1 ON n.theme_l1_id = t1.id \
    LEFT JOIN themes t2 ON n.theme_l2_id = t2.id \
    LEFT JOIN themes t3 ON n.theme_l3_id = t3.id \
    LEFT JOIN themes tm ON n.most_specific_theme_id = tm.id";

/// 적재용 뉴스 레코드다. 자연키(unique_id)로 중복/충돌을 해석한다.
#[derive(Debug, Clone)]
pub struct NewsInsertRecord {
    pub unique_id: String,
    pub agency_id: i32,
    pub agency_key: String,
    pub agency_name: String,
    pub theme_l1_id: Option<i32>,
    pub theme_l2_id: Option<i32>,
    pub theme_l3_id: Option<i32>,
    pub most_specific_theme_id: Option<i32>,
    pub title: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub content: Option<String>,
    pub editorial_lead: Option<String>,
    pub subtitle: Option<String>,
    pub summary: Option<String>,
    pub published_at: DateTime<Utc>,
    pub updated_datetime: Option<DateTime<Utc>>,
    pub extracted_at: Option<DateTime<Utc>>,
}

/// 부분 update에 쓰이는 타입 지정 값이다.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Real(f64),
    TextArray(Vec<String>),
    Timestamp(DateTime<Utc>),
    Vector(Vec<f32>),
    Null,
}

/// 검색 인덱스 내보내기용으로 주제 라벨과 파생 필드를 붙인 행이다.
#[derive(Debug, Clone, Default)]
pub struct EnrichedNewsRow {
    pub unique_id: String,
    pub agency: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    pub video_url: Option<String>,
    pub category: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub subtitle: Option<String>,
    pub editorial_lead: Option<String>,
    pub published_at_ts: Option<i64>,
    pub extracted_at_ts: Option<i64>,
    pub published_year: Option<i32>,
    pub published_month: Option<i32>,
    pub theme_l1_code: Option<String>,
    pub theme_l1_label: Option<String>,
    pub theme_l2_code: Option<String>,
    pub theme_l2_label: Option<String>,
    pub theme_l3_code: Option<String>,
    pub theme_l3_label: Option<String>,
    pub most_specific_theme_code: Option<String>,
    pub most_specific_theme_label: Option<String>,
    pub content_embedding: Option<String>,
}

/// 임베딩이 없는 후보 행이다.
#[derive(Debug, Clone)]
pub struct EmbeddingCandidate {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
}

/// 듀얼 라이트 읽기 경로에서 쓰는 news 원본 행이다.
#[derive(Debug, Clone)]
pub struct StoredNewsRow {
    pub unique_id: String,
    pub agency_key: Option<String>,
    pub theme_l1_id: Option<i32>,
    pub theme_l2_id: Option<i32>,
    pub theme_l3_id: Option<i32>,
    pub most_specific_theme_id: Option<i32>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub content: Option<String>,
    pub editorial_lead: Option<String>,
    pub subtitle: Option<String>,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_datetime: Option<DateTime<Utc>>,
    pub extracted_at: Option<DateTime<Utc>>,
    pub content_embedding: Option<String>,
    pub embedding_generated_at: Option<DateTime<Utc>>,
}

pub struct NewsStore {
    pool: PgPool,
    cache: OnceCell<Arc<ReferenceCache>>,
}

impl NewsStore {
    pub async fn from_settings(
        settings: &crate::core::config::DatabaseSettings,
    ) -> CoreResult<Self> {
        Self::connect(
            &settings.dsn,
            settings.pool_min,
            settings.pool_max,
            settings.acquire_timeout_ms,
        )
        .await
    }

    pub async fn connect(
        dsn: &str,
        pool_min: u32,
        pool_max: u32,
        acquire_timeout_ms: u64,
    ) -> CoreResult<Self> {
        if dsn.trim().is_empty() {
            return Err(CoreError::Config(
                "database.dsn은 비어 있을 수 없습니다".to_string(),
            ));
        }

        info!(pool_min, pool_max, "커넥션 풀을 생성합니다");
        let pool = PgPoolOptions::new()
            .min_connections(pool_min)
            .max_connections(pool_max.max(pool_min))
            .acquire_timeout(std::time::Duration::from_millis(acquire_timeout_ms.max(1)))
            .connect(dsn)
            .await
            .map_err(|error| CoreError::Fatal(format!("Postgres 연결 실패: {}", error)))?;

        Ok(Self {
            pool,
            cache: OnceCell::new(),
        })
    }

    /// 풀을 닫는다. 모든 작업이 끝난 뒤 한 번 호출한다.
    pub async fn close(&self) {
        info!("모든 데이터베이스 커넥션을 닫습니다");
        self.pool.close().await;
    }

    /// 참조 데이터 캐시를 반환한다. 최초 호출에서만 적재하며 멱등이다.
    pub async fn reference_cache(&self) -> CoreResult<Arc<ReferenceCache>> {
        let cache = self
            .cache
            .get_or_try_init(|| async { self.load_reference_cache().await.map(Arc::new) })
            .await?;
        Ok(cache.clone())
    }

    async fn load_reference_cache(&self) -> CoreResult<ReferenceCache> {
        info!("기관/주제 참조 데이터를 캐시에 적재합니다");

        let agency_rows = sqlx::query("SELECT id, key, name, parent_key FROM agencies")
            .fetch_all(&self.pool)
            .await
            .map_err(|error| CoreError::Db(format!("agencies 조회 실패: {}", error)))?;
        let agencies = agency_rows
            .into_iter()
            .map(map_agency_row)
            .collect::<CoreResult<Vec<_>>>()?;

        let theme_rows = sqlx::query("SELECT id, code, label, level, parent_code FROM themes")
            .fetch_all(&self.pool)
            .await
            .map_err(|error| CoreError::Db(format!("themes 조회 실패: {}", error)))?;
        let themes = theme_rows
            .into_iter()
            .map(map_theme_row)
            .collect::<CoreResult<Vec<_>>>()?;

        let cache = ReferenceCache::from_rows(agencies, themes);
        info!(
            agencies = cache.agency_count(),
            themes = cache.theme_count(),
            "참조 데이터 캐시 적재 완료"
        );
        Ok(cache)
    }

    /// 뉴스 레코드를 배치 삽입한다. 자연키 기준 keep-first 중복 제거 후
    /// 한 번의 다중 행 INSERT를 실행한다.
    pub async fn insert(&self, records: &[NewsInsertRecord], allow_update: bool) -> CoreResult<u64> {
        if records.is_empty() {
            return Err(CoreError::Validation(
                "뉴스 목록은 비어 있을 수 없습니다".to_string(),
            ));
        }

        let deduped = dedup_keep_first(records);
        if deduped.len() < records.len() {
            info!(
                removed = records.len() - deduped.len(),
                "unique_id 기준 중복 항목을 제거했습니다"
            );
        }

        info!(count = deduped.len(), allow_update, "뉴스 레코드를 삽입합니다");

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO news ({}) ",
            INSERT_COLUMNS.join(", ")
        ));

        builder.push_values(deduped.iter(), |mut bind, record| {
            bind.push_bind(record.unique_id.clone())
                .push_bind(record.agency_id)
                .push_bind(record.theme_l1_id)
                .push_bind(record.theme_l2_id)
                .push_bind(record.theme_l3_id)
                .push_bind(record.most_specific_theme_id)
                .push_bind(record.title.clone())
                .push_bind(record.url.clone())
                .push_bind(record.image_url.clone())
                .push_bind(record.video_url.clone())
                .push_bind(record.category.clone())
                .push_bind(record.tags.clone())
                .push_bind(record.content.clone())
                .push_bind(record.editorial_lead.clone())
                .push_bind(record.subtitle.clone())
                .push_bind(record.summary.clone())
                .push_bind(record.published_at)
                .push_bind(record.updated_datetime)
                .push_bind(record.extracted_at)
                .push_bind(record.agency_key.clone())
                .push_bind(record.agency_name.clone());
        });

        if allow_update {
            builder.push(format!(
                " ON CONFLICT (unique_id) DO UPDATE SET {}, updated_at = NOW()",
                conflict_update_clause()
            ));
        } else {
            builder.push(" ON CONFLICT (unique_id) DO NOTHING");
        }

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|error| CoreError::Db(format!("뉴스 삽입 실패: {}", error)))?;

        info!(affected = result.rows_affected(), "뉴스 삽입/갱신 완료");
        Ok(result.rows_affected())
    }

    /// 자연키로 단일 레코드를 부분 갱신한다. 일치 행 존재 여부를 반환한다.
    pub async fn update(&self, unique_id: &str, updates: &[(String, FieldValue)]) -> CoreResult<bool> {
        if updates.is_empty() {
            return Err(CoreError::Validation(
                "갱신 필드 목록은 비어 있을 수 없습니다".to_string(),
            ));
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE news SET ");
        let mut first = true;
        for (column, value) in updates {
            validate_identifier(column, "news 갱신 컬럼")?;
            if !first {
                builder.push(", ");
            }
            first = false;
            builder.push(column.as_str());
            builder.push(" = ");
            match value {
                FieldValue::Text(text) => {
                    builder.push_bind(text.clone());
                }
                FieldValue::Integer(number) => {
                    builder.push_bind(*number);
                }
                FieldValue::Real(number) => {
                    builder.push_bind(*number);
                }
                FieldValue::TextArray(items) => {
                    builder.push_bind(items.clone());
                }
                FieldValue::Timestamp(ts) => {
                    builder.push_bind(*ts);
                }
                FieldValue::Vector(values) => {
                    builder.push_bind(to_pgvector_literal(values)?);
                    builder.push("::vector");
                }
                FieldValue::Null => {
                    builder.push("NULL");
                }
            }
        }
        builder.push(", updated_at = NOW() WHERE unique_id = ");
        builder.push_bind(unique_id.to_string());

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|error| CoreError::Db(format!("뉴스 {} 갱신 실패: {}", unique_id, error)))?;

        let matched = result.rows_affected() > 0;
        if matched {
            debug!(unique_id, "뉴스 레코드를 갱신했습니다");
        } else {
            warn!(unique_id, "갱신 대상 뉴스가 없습니다");
        }
        Ok(matched)
    }

    /// 반개구간 [start, end + 1 day) 윈도우의 레코드 수를 센다.
    pub async fn count_for_window(&self, start_date: &str, end_date: &str) -> CoreResult<i64> {
        validate_date(start_date, "start_date")?;
        validate_date(end_date, "end_date")?;

        let row = sqlx::query(
            "SELECT COUNT(*) FROM news \
             WHERE published_at >= $1::date AND published_at < $2::date + INTERVAL '1 day'",
        )
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| CoreError::Db(format!("뉴스 count 실패: {}", error)))?;

        row.try_get::<i64, _>(0)
            .map_err(|error| CoreError::Db(format!("count 컬럼 파싱 실패: {}", error)))
    }

    /// 윈도우 전체를 한 번에 메모리로 적재하는 즉시 조회다.
    /// 대용량 윈도우는 stream_for_window를 사용한다.
    pub async fn fetch_for_window(
        &self,
        start_date: &str,
        end_date: &str,
        watermark: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> CoreResult<Vec<EnrichedNewsRow>> {
        validate_date(start_date, "start_date")?;
        validate_date(end_date, "end_date")?;

        let sql = build_export_sql(watermark.is_some(), limit.is_some(), false);
        let mut query = sqlx::query(&sql).bind(start_date).bind(end_date);
        if let Some(watermark) = watermark {
            query = query.bind(watermark);
        }
        if let Some(limit) = limit {
            query = query.bind(limit);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|error| CoreError::Db(format!("뉴스 내보내기 조회 실패: {}", error)))?;

        info!(count = rows.len(), start_date, end_date, "내보내기 행을 조회했습니다");
        rows.into_iter()
            .map(map_enriched_row)
            .collect::<CoreResult<Vec<_>>>()
    }

    /// 윈도우 전체를 LIMIT/OFFSET 페이지로 덮는 커서를 만든다.
    /// 각 페이지는 독립적이며 이전 페이지를 메모리에 유지할 필요가 없다.
    pub async fn stream_for_window(
        &self,
        start_date: &str,
        end_date: &str,
        watermark: Option<DateTime<Utc>>,
        page_size: i64,
    ) -> CoreResult<NewsPageCursor<'_>> {
        validate_date(start_date, "start_date")?;
        validate_date(end_date, "end_date")?;
        if page_size <= 0 {
            return Err(CoreError::Validation(
                "page_size는 1 이상이어야 합니다".to_string(),
            ));
        }

        let total = self.count_for_window(start_date, end_date).await?;
        info!(total, start_date, end_date, "내보내기 대상 전체 건수를 계산했습니다");

        Ok(NewsPageCursor {
            store: self,
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
            watermark,
            page_size,
            offset: 0,
            total,
            page_num: 0,
        })
    }

    async fn fetch_export_page(
        &self,
        start_date: &str,
        end_date: &str,
        watermark: Option<DateTime<Utc>>,
        page_size: i64,
        offset: i64,
    ) -> CoreResult<Vec<EnrichedNewsRow>> {
        let sql = build_export_sql(watermark.is_some(), true, true);
        let mut query = sqlx::query(&sql).bind(start_date).bind(end_date);
        if let Some(watermark) = watermark {
            query = query.bind(watermark);
        }
        let rows = query
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| CoreError::Db(format!("내보내기 페이지 조회 실패: {}", error)))?;

        rows.into_iter()
            .map(map_enriched_row)
            .collect::<CoreResult<Vec<_>>>()
    }

    /// 윈도우 안에서 벡터가 없는 후보를 발행 시각 내림차순으로 선택한다.
    pub async fn select_embedding_candidates(
        &self,
        start_date: &str,
        end_date: &str,
        limit: Option<i64>,
    ) -> CoreResult<Vec<EmbeddingCandidate>> {
        validate_date(start_date, "start_date")?;
        validate_date(end_date, "end_date")?;

        let mut sql = String::from(
            "SELECT id::bigint AS id, COALESCE(title, '') AS title, summary, content \
             FROM news \
             WHERE published_at >= $1::date AND published_at < $2::date + INTERVAL '1 day' \
               AND content_embedding IS NULL \
             ORDER BY published_at DESC",
        );
        if limit.is_some() {
            sql.push_str(" LIMIT $3");
        }

        let mut query = sqlx::query(&sql).bind(start_date).bind(end_date);
        if let Some(limit) = limit {
            query = query.bind(limit);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|error| CoreError::Db(format!("임베딩 후보 조회 실패: {}", error)))?;

        info!(
            count = rows.len(),
            start_date, end_date, "임베딩이 없는 뉴스를 조회했습니다"
        );
        rows.into_iter()
            .map(map_candidate_row)
            .collect::<CoreResult<Vec<_>>>()
    }

    /// 한 배치의 벡터와 생성 시각을 단일 트랜잭션으로 영속화한다.
    /// 오류 시 그 배치 전체가 롤백된다.
    pub async fn persist_embeddings(&self, ids: &[i64], vectors: &[Vec<f32>]) -> CoreResult<u64> {
        if ids.is_empty() || ids.len() != vectors.len() {
            return Err(CoreError::Validation(format!(
                "id/벡터 수가 일치해야 합니다: ids={}, vectors={}",
                ids.len(),
                vectors.len()
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| CoreError::Db(format!("트랜잭션 시작 실패: {}", error)))?;

        let mut affected = 0u64;
        for (id, vector) in ids.iter().zip(vectors.iter()) {
            let literal = to_pgvector_literal(vector)?;
            let result = sqlx::query(
                "UPDATE news \
                 SET content_embedding = $1::vector, embedding_generated_at = NOW() \
                 WHERE id = $2",
            )
            .bind(literal)
            .bind(*id)
            .execute(&mut *tx)
            .await
            .map_err(|error| CoreError::Db(format!("임베딩 갱신 실패 (id={}): {}", id, error)))?;
            affected = affected.saturating_add(result.rows_affected());
        }

        tx.commit()
            .await
            .map_err(|error| CoreError::Db(format!("임베딩 커밋 실패: {}", error)))?;

        Ok(affected)
    }

    /// 마지막 성공 동기화 시각(워터마크)을 읽는다. 없으면 최초 동기화다.
    pub async fn last_sync_completed_at(
        &self,
        operation: &str,
    ) -> CoreResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT completed_at FROM sync_log \
             WHERE operation = $1 AND status = 'completed' \
             ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(operation)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| CoreError::Db(format!("sync_log 조회 실패: {}", error)))?;

        match row {
            Some(row) => {
                let completed_at = row
                    .try_get::<DateTime<Utc>, _>("completed_at")
                    .map_err(|error| {
                        CoreError::Db(format!("sync_log.completed_at 파싱 실패: {}", error))
                    })?;
                info!(%completed_at, "마지막 동기화 워터마크를 찾았습니다");
                Ok(Some(completed_at))
            }
            None => {
                info!("이전 동기화 기록이 없어 최초 동기화로 처리합니다");
                Ok(None)
            }
        }
    }

    /// 동기화 완료 항목을 append-only 로그에 기록한다.
    pub async fn record_sync_completed(&self, operation: &str) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO sync_log (operation, status, completed_at) VALUES ($1, 'completed', NOW())",
        )
        .bind(operation)
        .execute(&self.pool)
        .await
        .map_err(|error| CoreError::Db(format!("sync_log 기록 실패: {}", error)))?;

        info!(operation, "동기화 워터마크를 기록했습니다");
        Ok(())
    }

    /// 윈도우/기관 필터로 news 원본 행을 조회한다. 듀얼 라이트 읽기 경로다.
    pub async fn fetch_rows(
        &self,
        min_date: &str,
        max_date: &str,
        agency_key: Option<&str>,
    ) -> CoreResult<Vec<StoredNewsRow>> {
        validate_date(min_date, "min_date")?;
        validate_date(max_date, "max_date")?;

        let mut sql = String::from(
            "SELECT unique_id, agency_key, theme_l1_id, theme_l2_id, theme_l3_id, \
                    most_specific_theme_id, title, url, image_url, video_url, category, tags, \
                    content, editorial_lead, subtitle, summary, published_at, updated_datetime, \
                    extracted_at, content_embedding::text AS content_embedding, \
                    embedding_generated_at \
             FROM news \
             WHERE published_at >= $1::date AND published_at < $2::date + INTERVAL '1 day'",
        );
        if agency_key.is_some() {
            sql.push_str(" AND agency_key = $3");
        }
        sql.push_str(" ORDER BY published_at DESC");

        let mut query = sqlx::query(&sql).bind(min_date).bind(max_date);
        if let Some(agency_key) = agency_key {
            query = query.bind(agency_key.to_string());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|error| CoreError::Db(format!("뉴스 조회 실패: {}", error)))?;

        rows.into_iter()
            .map(map_stored_row)
            .collect::<CoreResult<Vec<_>>>()
    }
}

/// 윈도우 내보내기 SQL을 조립한다. 워터마크/LIMIT/OFFSET 절은 선택적이다.
fn build_export_sql(with_watermark: bool, with_limit: bool, with_offset: bool) -> String {
    let mut sql = String::from(EXPORT_SELECT);
    sql.push_str(WINDOW_CLAUSE);

    let mut next_param = 3;
    if with_watermark {
        sql.push_str(&format!(
            " AND n.content_embedding IS NOT NULL AND n.embedding_generated_at > ${}",
            next_param
        ));
        next_param += 1;
    }
    sql.push_str(" ORDER BY n.published_at DESC");
    if with_limit {
        sql.push_str(&format!(" LIMIT ${}", next_param));
        next_param += 1;
    }
    if with_offset {
        sql.push_str(&format!(" OFFSET ${}", next_param));
    }
    sql
}

/// 입력 리스트를 자연키 기준으로 중복 제거한다. 첫 등장을 유지한다.
/// 동시 페이지 스크랩이 만든 소스 중복을 흡수하는 경로다.
pub fn dedup_keep_first(records: &[NewsInsertRecord]) -> Vec<&NewsInsertRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .iter()
        .filter(|record| seen.insert(record.unique_id.as_str()))
        .collect()
}

fn conflict_update_clause() -> String {
    INSERT_COLUMNS
        .iter()
        .filter(|column| !IMMUTABLE_COLUMNS.contains(column))
        .map(|column| format!("{} = EXCLUDED.{}", column, column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 스트리밍 내보내기 커서다. 오프셋 기준으로 재시작 가능하다.
pub struct NewsPageCursor<'a> {
    store: &'a NewsStore,
    start_date: String,
    end_date: String,
    watermark: Option<DateTime<Utc>>,
    page_size: i64,
    offset: i64,
    total: i64,
    page_num: usize,
}

impl<'a> NewsPageCursor<'a> {
    pub fn total(&self) -> i64 {
        self.total
    }

    /// 다음 페이지를 조회한다. 윈도우를 모두 소진하면 None을 반환한다.
    pub async fn next_page(&mut self) -> CoreResult<Option<Vec<EnrichedNewsRow>>> {
        if self.offset >= self.total {
            return Ok(None);
        }

        let rows = self
            .store
            .fetch_export_page(
                &self.start_date,
                &self.end_date,
                self.watermark,
                self.page_size,
                self.offset,
            )
            .await?;

        if rows.is_empty() {
            self.offset = self.total;
            return Ok(None);
        }

        self.page_num += 1;
        debug!(
            page = self.page_num,
            count = rows.len(),
            offset = self.offset,
            total = self.total,
            "내보내기 페이지를 조회했습니다"
        );
        self.offset += self.page_size;
        Ok(Some(rows))
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> CoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<T, _>(name)
        .map_err(|error| CoreError::Db(format!("{} 컬럼 파싱 실패: {}", name, error)))
}

fn map_agency_row(row: PgRow) -> CoreResult<Agency> {
    Ok(Agency {
        id: column(&row, "id")?,
        key: column(&row, "key")?,
        name: column(&row, "name")?,
        parent_key: column(&row, "parent_key")?,
    })
}

fn map_theme_row(row: PgRow) -> CoreResult<Theme> {
    Ok(Theme {
        id: column(&row, "id")?,
        code: column(&row, "code")?,
        label: column(&row, "label")?,
        level: column(&row, "level")?,
        parent_code: column(&row, "parent_code")?,
    })
}

fn map_candidate_row(row: PgRow) -> CoreResult<EmbeddingCandidate> {
    Ok(EmbeddingCandidate {
        id: column(&row, "id")?,
        title: column(&row, "title")?,
        summary: column(&row, "summary")?,
        content: column(&row, "content")?,
    })
}

fn map_enriched_row(row: PgRow) -> CoreResult<EnrichedNewsRow> {
    Ok(EnrichedNewsRow {
        unique_id: column(&row, "unique_id")?,
        agency: column(&row, "agency")?,
        title: column(&row, "title")?,
        url: column(&row, "url")?,
        image: column(&row, "image")?,
        video_url: column(&row, "video_url")?,
        category: column(&row, "category")?,
        content: column(&row, "content")?,
        summary: column(&row, "summary")?,
        subtitle: column(&row, "subtitle")?,
        editorial_lead: column(&row, "editorial_lead")?,
        published_at_ts: column(&row, "published_at_ts")?,
        extracted_at_ts: column(&row, "extracted_at_ts")?,
        published_year: column(&row, "published_year")?,
        published_month: column(&row, "published_month")?,
        theme_l1_code: column(&row, "theme_l1_code")?,
        theme_l1_label: column(&row, "theme_l1_label")?,
        theme_l2_code: column(&row, "theme_l2_code")?,
        theme_l2_label: column(&row, "theme_l2_label")?,
        theme_l3_code: column(&row, "theme_l3_code")?,
        theme_l3_label: column(&row, "theme_l3_label")?,
        most_specific_theme_code: column(&row, "most_specific_theme_code")?,
        most_specific_theme_label: column(&row, "most_specific_theme_label")?,
        content_embedding: column(&row, "content_embedding")?,
    })
}

fn map_stored_row(row: PgRow) -> CoreResult<StoredNewsRow> {
    Ok(StoredNewsRow {
        unique_id: column(&row, "unique_id")?,
        agency_key: column(&row, "agency_key")?,
        theme_l1_id: column(&row, "theme_l1_id")?,
        theme_l2_id: column(&row, "theme_l2_id")?,
        theme_l3_id: column(&row, "theme_l3_id")?,
        most_specific_theme_id: column(&row, "most_specific_theme_id")?,
        title: column(&row, "title")?,
        url: column(&row, "url")?,
        image_url: column(&row, "image_url")?,
        video_url: column(&row, "video_url")?,
        category: column(&row, "category")?,
        tags: column(&row, "tags")?,
        content: column(&row, "content")?,
        editorial_lead: column(&row, "editorial_lead")?,
        subtitle: column(&row, "subtitle")?,
        summary: column(&row, "summary")?,
        published_at: column(&row, "published_at")?,
        updated_datetime: column(&row, "updated_datetime")?,
        extracted_at: column(&row, "extracted_at")?,
        content_embedding: column(&row, "content_embedding")?,
        embedding_generated_at: column(&row, "embedding_generated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(unique_id: &str) -> NewsInsertRecord {
        NewsInsertRecord {
            unique_id: unique_id.to_string(),
            agency_id: 1,
            agency_key: "agency".to_string(),
            agency_name: "Agency".to_string(),
            theme_l1_id: None,
            theme_l2_id: None,
            theme_l3_id: None,
            most_specific_theme_id: None,
            title: "title".to_string(),
            url: None,
            image_url: None,
            video_url: None,
            category: None,
            tags: Vec::new(),
            content: None,
            editorial_lead: None,
            subtitle: None,
            summary: None,
            published_at: Utc::now(),
            updated_datetime: None,
            extracted_at: None,
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut first = sample_record("a");
        first.title = "first".to_string();
        let mut second = sample_record("a");
        second.title = "second".to_string();
        let third = sample_record("b");

        let records = [first, second, third];
        let deduped = dedup_keep_first(&records);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "first");
        assert_eq!(deduped[1].unique_id, "b");
    }

    #[test]
    fn conflict_update_excludes_identity_columns() {
        let clause = conflict_update_clause();
        assert!(!clause.contains("unique_id ="));
        assert!(!clause.contains("agency_id ="));
        assert!(!clause.contains("published_at ="));
        assert!(clause.contains("title = EXCLUDED.title"));
        assert!(clause.contains("summary = EXCLUDED.summary"));
    }

    #[test]
    fn window_clause_is_half_open() {
        let sql = build_export_sql(false, false, false);
        assert!(sql.contains("n.published_at >= $1::date"));
        assert!(sql.contains("n.published_at < $2::date + INTERVAL '1 day'"));
    }

    #[test]
    fn watermark_clause_filters_embedding_generated_at() {
        let sql = build_export_sql(true, true, true);
        assert!(sql.contains("n.embedding_generated_at > $3"));
        assert!(sql.contains("content_embedding IS NOT NULL"));
        assert!(sql.contains("LIMIT $4"));
        assert!(sql.contains("OFFSET $5"));

        let without = build_export_sql(false, true, true);
        assert!(!without.contains("embedding_generated_at >"));
        assert!(without.contains("LIMIT $3"));
        assert!(without.contains("OFFSET $4"));
    }
}
