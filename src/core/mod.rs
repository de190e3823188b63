// 목적:
// - 핵심 런타임 계층 모듈을 선언한다.
//
// 설명:
// - 임베딩/인덱스 동기화 파이프라인, 배치 실행기, 저장소 어댑터와
//   공통 오류·설정 모델을 분리해 유지보수성을 높인다.
//
// 디자인 패턴:
// - 명시적 오류 모델(Explicit Error Model).
//
// 참조:
// - src/core/errors.rs
// - src/core/embedding_pipeline.rs
// - src/core/sync_pipeline.rs

pub mod batch;
pub mod config;
pub mod embedding_http;
pub mod embedding_pipeline;
pub mod errors;
pub mod storage_adapter;
pub mod sync_pipeline;
pub mod telemetry;
