// 목적:
// - 뉴스 임베딩/검색 인덱스 동기화 파이프라인 크레이트의 진입점을 제공한다.
//
// 설명:
// - core 계층은 파이프라인/배치 실행/오류 모델을, index 계층은
//   PostgreSQL 저장소와 Typesense·레거시 파일 백엔드 접근을 담당한다.
//
// 디자인 패턴:
// - 계층형 모듈 구조(core/index).
//
// 참조:
// - src/core/mod.rs
// - src/index/mod.rs

pub mod core;
pub mod index;

pub use crate::core::errors::{CoreError, CoreResult};
