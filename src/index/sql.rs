// 목적:
// - SQL 관련 공통 유틸리티를 제공한다.
//
// 설명:
// - 동적 컬럼명 검증, 날짜 문자열 검증, pgvector 리터럴 변환 등
//   DB 안전성 경계를 담당한다.
//
// 디자인 패턴:
// - 가드 함수(Guard Function).
//
// 참조:
// - src/index/news_store.rs

use chrono::NaiveDate;

use crate::core::errors::{CoreError, CoreResult};

/// SQL 식별자의 허용 문자를 검증한다.
pub fn validate_identifier(value: &str, field_name: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "{}는 비어 있을 수 없습니다",
            field_name
        )));
    }

    let valid = value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');

    if !valid {
        return Err(CoreError::Validation(format!(
            "{}에는 영문/숫자/밑줄만 사용할 수 있습니다: {}",
            field_name, value
        )));
    }

    Ok(())
}

/// YYYY-MM-DD 형식의 날짜 문자열을 검증하고 파싱한다.
/// 제로 패딩이 빠진 날짜도 거부한다.
pub fn validate_date(value: &str, field_name: &str) -> CoreResult<NaiveDate> {
    let trimmed = value.trim();
    let parsed = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|error| {
        CoreError::Validation(format!(
            "{}는 YYYY-MM-DD 형식이어야 합니다: {} ({})",
            field_name, value, error
        ))
    })?;

    if parsed.format("%Y-%m-%d").to_string() != trimmed {
        return Err(CoreError::Validation(format!(
            "{}는 YYYY-MM-DD 형식이어야 합니다: {}",
            field_name, value
        )));
    }

    Ok(parsed)
}

/// float 벡터를 pgvector 문자열 리터럴로 변환한다.
pub fn to_pgvector_literal(values: &[f32]) -> CoreResult<String> {
    if values.is_empty() {
        return Err(CoreError::Validation(
            "벡터는 최소 1개 이상의 값을 가져야 합니다".to_string(),
        ));
    }

    let parts = values
        .iter()
        .map(|value| format!("{:.8}", value))
        .collect::<Vec<_>>();

    Ok(format!("[{}]", parts.join(",")))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("news")]
    #[case("theme_l1_id")]
    #[case("updated_at")]
    fn accepts_valid_identifiers(#[case] value: &str) {
        assert!(validate_identifier(value, "column").is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("news; DROP TABLE news")]
    #[case("a-b")]
    fn rejects_invalid_identifiers(#[case] value: &str) {
        assert!(validate_identifier(value, "column").is_err());
    }

    #[rstest]
    #[case("2025-01-15", true)]
    #[case("2025-1-15", false)]
    #[case("15/01/2025", false)]
    #[case("", false)]
    fn validates_date_format(#[case] value: &str, #[case] ok: bool) {
        assert_eq!(validate_date(value, "start_date").is_ok(), ok);
    }

    #[test]
    fn pgvector_literal_shape() {
        let literal = to_pgvector_literal(&[1.0, -0.5]).unwrap();
        assert!(literal.starts_with('['));
        assert!(literal.ends_with(']'));
        assert_eq!(literal.matches(',').count(), 1);
    }

    #[test]
    fn pgvector_literal_rejects_empty() {
        assert!(to_pgvector_literal(&[]).is_err());
    }
}
