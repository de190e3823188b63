// 목적:
// - 구조화 로깅 구독자를 초기화한다.
//
// 설명:
// - RUST_LOG 환경 변수를 우선하고, 없으면 주어진 기본 필터를 쓴다.
// - 재초기화 시도는 오류 대신 무시한다(테스트에서 반복 호출됨).
//
// 디자인 패턴:
// - 초기화 함수(Initialization Function).
//
// 참조:
// - src/core/config.rs

use tracing_subscriber::{fmt, EnvFilter};

/// 전역 로깅 구독자를 설치한다. 프로세스 기동 시 한 번 호출한다.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_tracing("info");
        init_tracing("debug");
    }
}
