// 목적:
// - 저장소/인덱스 계층 모듈을 선언한다.
//
// 설명:
// - PostgreSQL 저장소, 참조 데이터 캐시, 벡터 코덱, Typesense 클라이언트,
//   레거시 데이터셋 파일 백엔드를 분리해 유지보수성을 확보한다.
//
// 디자인 패턴:
// - 저장소 패턴(Repository Pattern).
//
// 참조:
// - src/index/news_store.rs
// - src/index/typesense.rs

pub mod cache;
pub mod legacy_store;
pub mod news_store;
pub mod sql;
pub mod typesense;
pub mod vector;
