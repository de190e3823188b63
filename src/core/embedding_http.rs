// 목적:
// - 외부 임베딩 서비스와의 HTTP 통신을 담당한다.
//
// 설명:
// - 텍스트 배치를 전송하고 문장 벡터 배치를 돌려받는다.
// - 응답의 행 수와 차원을 호출 측 기대값과 대조해 저장 전에 거른다.
//
// 디자인 패턴:
// - 원격 프록시(Remote Proxy).
//
// 참조:
// - src/core/embedding_pipeline.rs
// - src/core/errors.rs

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::errors::{CoreError, CoreResult};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
}

pub struct EmbeddingHttpClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    dimension: usize,
}

impl EmbeddingHttpClient {
    pub fn from_settings(settings: &crate::core::config::EmbeddingSettings) -> CoreResult<Self> {
        Self::new(
            &settings.base_url,
            settings.api_key.as_deref(),
            settings.dimension,
            settings.timeout_secs,
        )
    }

    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        dimension: usize,
        timeout_secs: u64,
    ) -> CoreResult<Self> {
        if base_url.trim().is_empty() {
            return Err(CoreError::Config(
                "embedding.base_url은 비어 있을 수 없습니다".to_string(),
            ));
        }
        if dimension == 0 {
            return Err(CoreError::Config(
                "embedding.dimension은 1 이상이어야 합니다".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| {
                CoreError::Fatal(format!("임베딩 HTTP 클라이언트 생성 실패: {}", error))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(|key| key.to_string()),
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 서비스 가용성을 확인한다. 파이프라인 시작 전에 한 번 호출한다.
    pub async fn health_check(&self) -> CoreResult<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|error| CoreError::Upstream(format!("임베딩 서비스 연결 실패: {}", error)))?;

        if !response.status().is_success() {
            return Err(CoreError::Upstream(format!(
                "임베딩 서비스 상태 확인 실패: HTTP {}",
                response.status()
            )));
        }

        let health = response
            .json::<HealthResponse>()
            .await
            .map_err(|error| CoreError::Upstream(format!("상태 응답 파싱 실패: {}", error)))?;
        debug!(status = %health.status, "임베딩 서비스 상태 확인 완료");
        Ok(())
    }

    /// 텍스트 배치를 임베딩한다. 입력 순서와 출력 순서는 일대일 대응한다.
    pub async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(CoreError::Validation(
                "임베딩할 텍스트 목록은 비어 있을 수 없습니다".to_string(),
            ));
        }

        let url = format!("{}/generate", self.base_url);
        debug!(count = texts.len(), "임베딩 생성을 요청합니다");

        let mut request = self.client.post(&url).json(&EmbedRequest { texts });
        if let Some(api_key) = &self.api_key {
            request = request.header("X-API-Key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| CoreError::Upstream(format!("임베딩 요청 실패: {}", error)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "임베딩 서비스가 오류를 반환했습니다");
            return Err(CoreError::Upstream(format!(
                "임베딩 서비스 오류: HTTP {} ({})",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed = response
            .json::<EmbedResponse>()
            .await
            .map_err(|error| CoreError::Upstream(format!("임베딩 응답 파싱 실패: {}", error)))?;

        if let Some(dimension) = parsed.dimension {
            if dimension != self.dimension {
                return Err(CoreError::Validation(format!(
                    "응답 dimension 필드 불일치: 기대 {}, 실제 {}",
                    self.dimension, dimension
                )));
            }
        }
        if let Some(count) = parsed.count {
            if count != texts.len() {
                return Err(CoreError::Validation(format!(
                    "응답 count 필드 불일치: 기대 {}, 실제 {}",
                    texts.len(),
                    count
                )));
            }
        }
        validate_embeddings(&parsed.embeddings, texts.len(), self.dimension)?;
        info!(count = parsed.embeddings.len(), "임베딩 생성 완료");
        Ok(parsed.embeddings)
    }
}

/// 응답 벡터의 행 수/차원을 검증한다. 불일치 벡터는 저장 전에 거부한다.
fn validate_embeddings(
    embeddings: &[Vec<f32>],
    expected_rows: usize,
    expected_dim: usize,
) -> CoreResult<()> {
    if embeddings.len() != expected_rows {
        return Err(CoreError::Validation(format!(
            "임베딩 응답 행 수 불일치: 기대 {}, 실제 {}",
            expected_rows,
            embeddings.len()
        )));
    }

    for (index, embedding) in embeddings.iter().enumerate() {
        if embedding.len() != expected_dim {
            return Err(CoreError::Validation(format!(
                "임베딩 차원 불일치 (index={}): 기대 {}, 실제 {}",
                index,
                expected_dim,
                embedding.len()
            )));
        }
    }

    Ok(())
}
