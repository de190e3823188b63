// 목적:
// - 임베딩이 없는 뉴스의 벡터 백필(backfill) 파이프라인을 실행한다.
//
// 설명:
// - 날짜 윈도우에서 후보를 선택하고, 입력 텍스트를 구성하고,
//   임베딩 서비스 호출과 벡터 영속화를 배치 단위로 반복한다.
// - 한 배치의 실패는 집계만 하고 다음 배치로 진행한다.
//
// 디자인 패턴:
// - 파이프라인 패턴(Pipeline Pattern).
//
// 참조:
// - src/core/batch.rs
// - src/core/embedding_http.rs
// - src/index/news_store.rs

use std::sync::Arc;

use tracing::{info, warn};

use crate::core::batch::{process_in_batches, BatchOutcome, OnBatchError};
use crate::core::embedding_http::EmbeddingHttpClient;
use crate::core::errors::{CoreError, CoreResult};
use crate::index::news_store::NewsStore;

/// 내용 발췌에 쓰는 본문 앞부분 길이(문자 수).
const CONTENT_SNIPPET_CHARS: usize = 500;

pub struct EmbeddingPipeline {
    store: Arc<NewsStore>,
    client: Arc<EmbeddingHttpClient>,
    batch_size: usize,
    max_token_estimate: usize,
}

impl EmbeddingPipeline {
    pub fn new(
        store: Arc<NewsStore>,
        client: Arc<EmbeddingHttpClient>,
        batch_size: usize,
        max_token_estimate: usize,
    ) -> CoreResult<Self> {
        if batch_size == 0 {
            return Err(CoreError::Config(
                "embedding.batch_size는 1 이상이어야 합니다".to_string(),
            ));
        }
        if max_token_estimate == 0 {
            return Err(CoreError::Config(
                "embedding.max_token_estimate는 1 이상이어야 합니다".to_string(),
            ));
        }

        Ok(Self {
            store,
            client,
            batch_size,
            max_token_estimate,
        })
    }

    /// 윈도우의 벡터 없는 뉴스를 백필한다. 배치별 성공/실패를 집계해 반환한다.
    pub async fn run(
        &self,
        start_date: &str,
        end_date: &str,
        limit: Option<i64>,
    ) -> CoreResult<BatchOutcome> {
        info!(start_date, end_date, ?limit, "임베딩 백필을 시작합니다");

        // 행을 하나라도 처리하기 전의 접근 불가는 치명 오류다.
        self.client.health_check().await.map_err(|error| {
            CoreError::Fatal(format!("임베딩 서비스에 접근할 수 없습니다: {}", error))
        })?;

        let candidates = self
            .store
            .select_embedding_candidates(start_date, end_date, limit)
            .await?;

        if candidates.is_empty() {
            info!("백필 대상이 없습니다");
            return Ok(BatchOutcome::default());
        }

        let store = self.store.clone();
        let client = self.client.clone();
        let max_token_estimate = self.max_token_estimate;

        let outcome = process_in_batches(
            candidates,
            self.batch_size,
            OnBatchError::Continue,
            move |batch| {
                let store = store.clone();
                let client = client.clone();
                async move {
                    let ids = batch.iter().map(|row| row.id).collect::<Vec<_>>();
                    let texts = batch
                        .iter()
                        .map(|row| {
                            prepare_text(
                                &row.title,
                                row.summary.as_deref(),
                                row.content.as_deref(),
                                max_token_estimate,
                            )
                        })
                        .collect::<Vec<_>>();

                    let vectors = client.embed_batch(&texts).await?;
                    let affected = store.persist_embeddings(&ids, &vectors).await?;
                    Ok(affected as usize)
                }
            },
        )
        .await?;

        if outcome.failed > 0 {
            warn!(
                successful = outcome.successful,
                failed = outcome.failed,
                "임베딩 백필이 일부 실패와 함께 완료되었습니다"
            );
        } else {
            info!(successful = outcome.successful, "임베딩 백필 완료");
        }
        Ok(outcome)
    }
}

/// 임베딩 입력 텍스트를 구성한다. 제목에 요약을 잇고,
/// 요약이 없으면 본문 앞부분을 잇는다. 전체 길이는 토큰 추정치의
/// 4배 문자 수로 상한을 둔다.
pub fn prepare_text(
    title: &str,
    summary: Option<&str>,
    content: Option<&str>,
    max_token_estimate: usize,
) -> String {
    let mut text = title.trim().to_string();

    let summary = summary.map(str::trim).filter(|value| !value.is_empty());
    match summary {
        Some(summary) => {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(summary);
        }
        None => {
            if let Some(content) = content.map(str::trim).filter(|value| !value.is_empty()) {
                let snippet = content.chars().take(CONTENT_SNIPPET_CHARS).collect::<String>();
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&snippet);
            }
        }
    }

    let max_chars = max_token_estimate.saturating_mul(4);
    if text.chars().count() > max_chars {
        text = text.chars().take(max_chars).collect();
    }
    text
}
