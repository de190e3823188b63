// 목적:
// - Typesense 검색 인덱스와의 HTTP 통신을 담당한다.
//
// 설명:
// - 컬렉션 존재/스키마 확인과 JSONL 벌크 업서트 임포트를 제공한다.
// - 임포트 응답은 행 단위 JSON이며, 성공/실패를 집계해 돌려준다.
//
// 디자인 패턴:
// - 원격 프록시(Remote Proxy).
//
// 참조:
// - src/core/sync_pipeline.rs
// - src/core/errors.rs

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::errors::{CoreError, CoreResult};

/// 임포트 실패 행을 로그로 남기는 상한.
const FAILURE_LOG_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
struct CollectionSchema {
    #[serde(default)]
    fields: Vec<CollectionField>,
    #[serde(default)]
    num_documents: i64,
}

#[derive(Debug, Deserialize)]
struct CollectionField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ImportLine {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    document: Option<String>,
}

/// 벌크 임포트 한 번의 집계 결과다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub successful: usize,
    pub failed: usize,
    pub first_failures: Vec<String>,
}

pub struct TypesenseClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TypesenseClient {
    pub fn from_settings(settings: &crate::core::config::TypesenseSettings) -> CoreResult<Self> {
        Self::new(&settings.base_url(), &settings.api_key, settings.timeout_secs)
    }

    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> CoreResult<Self> {
        if base_url.trim().is_empty() {
            return Err(CoreError::Config(
                "typesense.base_url은 비어 있을 수 없습니다".to_string(),
            ));
        }
        if api_key.trim().is_empty() {
            return Err(CoreError::Config(
                "typesense.api_key는 비어 있을 수 없습니다".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| {
                CoreError::Fatal(format!("Typesense 클라이언트 생성 실패: {}", error))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// 대상 컬렉션이 존재하는지 확인한다. 없으면 동기화를 계속할 수 없다.
    /// 벡터 필드가 스키마에 없으면 경고만 남긴다.
    pub async fn ensure_collection(&self, collection: &str, vector_field: &str) -> CoreResult<()> {
        let url = format!("{}/collections/{}", self.base_url, collection);
        let response = self
            .client
            .get(&url)
            .header("X-TYPESENSE-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(|error| CoreError::Upstream(format!("Typesense 연결 실패: {}", error)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CoreError::Fatal(format!(
                "Typesense 컬렉션이 존재하지 않습니다: {}",
                collection
            ))),
            status if !status.is_success() => Err(CoreError::Upstream(format!(
                "Typesense 컬렉션 확인 실패: HTTP {}",
                status
            ))),
            _ => {
                let schema = response.json::<CollectionSchema>().await.map_err(|error| {
                    CoreError::Upstream(format!("컬렉션 스키마 파싱 실패: {}", error))
                })?;

                let has_vector_field = schema
                    .fields
                    .iter()
                    .any(|field| field.name == vector_field);
                if !has_vector_field {
                    warn!(
                        collection,
                        vector_field, "컬렉션 스키마에 벡터 필드가 없습니다. 벡터 검색이 비활성화됩니다"
                    );
                }

                info!(
                    collection,
                    documents = schema.num_documents,
                    "Typesense 컬렉션 확인 완료"
                );
                Ok(())
            }
        }
    }

    /// 문서 배치를 JSONL로 벌크 업서트한다. 행 단위 성공/실패를 집계한다.
    pub async fn import_documents(
        &self,
        collection: &str,
        documents: &[Value],
    ) -> CoreResult<ImportReport> {
        if documents.is_empty() {
            return Err(CoreError::Validation(
                "임포트할 문서 목록은 비어 있을 수 없습니다".to_string(),
            ));
        }

        let mut body = String::new();
        for document in documents {
            let line = serde_json::to_string(document).map_err(|error| {
                CoreError::Serialization(format!("문서 직렬화 실패: {}", error))
            })?;
            body.push_str(&line);
            body.push('\n');
        }

        let url = format!(
            "{}/collections/{}/documents/import?action=upsert",
            self.base_url, collection
        );
        debug!(collection, count = documents.len(), "문서 배치를 임포트합니다");

        let response = self
            .client
            .post(&url)
            .header("X-TYPESENSE-API-KEY", &self.api_key)
            .header("Content-Type", "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|error| CoreError::Upstream(format!("Typesense 임포트 실패: {}", error)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Upstream(format!(
                "Typesense 임포트 오류: HTTP {} ({})",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|error| CoreError::Upstream(format!("임포트 응답 읽기 실패: {}", error)))?;

        let report = parse_import_results(&body);
        for failure in &report.first_failures {
            warn!(collection, failure, "문서 임포트 실패");
        }
        if report.failed > 0 {
            warn!(
                collection,
                successful = report.successful,
                failed = report.failed,
                "임포트가 일부 실패와 함께 완료되었습니다"
            );
        }
        Ok(report)
    }
}

/// JSONL 임포트 응답을 집계한다. 파싱 불가능한 행은 실패로 센다.
fn parse_import_results(body: &str) -> ImportReport {
    let mut report = ImportReport::default();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ImportLine>(line) {
            Ok(parsed) if parsed.success => report.successful += 1,
            Ok(parsed) => {
                report.failed += 1;
                if report.first_failures.len() < FAILURE_LOG_LIMIT {
                    let reason = parsed.error.unwrap_or_else(|| "원인 미상".to_string());
                    let doc = parsed.document.unwrap_or_default();
                    report.first_failures.push(format!(
                        "{}: {}",
                        reason,
                        doc.chars().take(120).collect::<String>()
                    ));
                }
            }
            Err(_) => {
                report.failed += 1;
                if report.first_failures.len() < FAILURE_LOG_LIMIT {
                    report
                        .first_failures
                        .push(format!("응답 행 파싱 실패: {}", line));
                }
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_successes_and_failures() {
        let body = "{\"success\":true}\n{\"success\":false,\"error\":\"bad field\"}\n{\"success\":true}\n";
        let report = parse_import_results(body);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.first_failures.len(), 1);
        assert!(report.first_failures[0].contains("bad field"));
    }

    #[test]
    fn keeps_only_first_five_failures() {
        let body = "{\"success\":false,\"error\":\"e\"}\n".repeat(9);
        let report = parse_import_results(&body);
        assert_eq!(report.failed, 9);
        assert_eq!(report.first_failures.len(), FAILURE_LOG_LIMIT);
    }

    #[test]
    fn malformed_lines_count_as_failures() {
        let body = "not json\n{\"success\":true}\n\n";
        let report = parse_import_results(body);
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn rejects_blank_configuration() {
        assert!(TypesenseClient::new("", "key", 10).is_err());
        assert!(TypesenseClient::new("http://localhost:8108", " ", 10).is_err());
    }
}
