// 목적:
// - 크레이트 전역에서 사용하는 표준 오류 타입을 정의한다.
//
// 설명:
// - 입력 검증/설정/DB/업스트림 HTTP/직렬화/치명 오류를 명시적으로 구분한다.
// - 배치 루프는 Fatal을 제외한 오류를 배치 단위로 집계하고 계속 진행한다.
//
// 디자인 패턴:
// - 도메인 오류 열거형(Domain Error Enum).
//
// 참조:
// - src/core/batch.rs
// - src/core/embedding_pipeline.rs
// - src/core/sync_pipeline.rs

use thiserror::Error;

/// 크레이트 공통 오류 열거형이다.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("입력값이 유효하지 않습니다: {0}")]
    Validation(String),
    #[error("설정값이 유효하지 않습니다: {0}")]
    Config(String),
    #[error("데이터베이스 작업에 실패했습니다: {0}")]
    Db(String),
    #[error("업스트림 서비스 호출에 실패했습니다: {0}")]
    Upstream(String),
    #[error("직렬화/역직렬화에 실패했습니다: {0}")]
    Serialization(String),
    #[error("복구 불가능한 오류가 발생했습니다: {0}")]
    Fatal(String),
}

impl CoreError {
    /// 배치 단위 집계 대상이 아닌, 즉시 전파해야 하는 오류인지 판정한다.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Fatal(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
