// 목적:
// - 저장 경계를 넘나드는 임베딩 벡터 표현을 디코딩/인코딩한다.
//
// 설명:
// - JSON 문자열, 메모리 내 float 리스트, pgvector 바이너리
//   (2바이트 big-endian 차원 헤더 + 4바이트 big-endian float 나열)의
//   세 가지 표현을 평탄한 float 리스트로 정규화한다.
// - 알 수 없는 표현은 오류가 아니라 "없음"으로 처리한다(필드 생략).
//
// 디자인 패턴:
// - 전수 매칭 디코더(Exhaustive-Match Decoder).
//
// 참조:
// - src/core/sync_pipeline.rs
// - src/core/storage_adapter.rs

use serde_json::Value;

/// 저장소에서 올 수 있는 임베딩 원시 표현이다.
#[derive(Debug, Clone)]
pub enum RawEmbedding {
    Text(String),
    Floats(Vec<f32>),
    Binary(Vec<u8>),
}

/// 원시 표현을 float 리스트로 디코딩한다. 디코딩 불가능하면 None을 반환한다.
pub fn decode_embedding(raw: &RawEmbedding) -> Option<Vec<f32>> {
    match raw {
        RawEmbedding::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            serde_json::from_str::<Vec<f32>>(trimmed).ok()
        }
        RawEmbedding::Floats(values) => {
            if values.is_empty() {
                None
            } else {
                Some(values.clone())
            }
        }
        RawEmbedding::Binary(bytes) => decode_binary(bytes),
    }
}

/// JSON 값으로 전달된 임베딩을 디코딩한다. 문자열/배열 외 형태는 None이다.
pub fn decode_embedding_value(value: &Value) -> Option<Vec<f32>> {
    match value {
        Value::String(text) => decode_embedding(&RawEmbedding::Text(text.clone())),
        Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(item.as_f64()? as f32);
            }
            decode_embedding(&RawEmbedding::Floats(values))
        }
        _ => None,
    }
}

/// float 벡터를 pgvector 바이너리 표현으로 인코딩한다.
pub fn encode_embedding_binary(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + values.len() * 4);
    out.extend_from_slice(&(values.len() as u16).to_be_bytes());
    for value in values {
        out.extend_from_slice(&value.to_be_bytes());
    }
    out
}

fn decode_binary(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() < 2 {
        return None;
    }

    let dim = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let payload = &bytes[2..];
    if dim == 0 || payload.len() != dim * 4 {
        return None;
    }

    Some(
        payload
            .chunks_exact(4)
            .map(|chunk| f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn binary_round_trip_preserves_values() {
        let original = vec![0.25_f32, -1.5, 3.0];
        let encoded = encode_embedding_binary(&original);
        let decoded = decode_embedding(&RawEmbedding::Binary(encoded)).unwrap();

        assert_eq!(decoded.len(), original.len());
        for (left, right) in decoded.iter().zip(original.iter()) {
            assert!((left - right).abs() < 1e-6);
        }
    }

    #[test]
    fn json_text_shape_decodes() {
        let decoded = decode_embedding(&RawEmbedding::Text("[1.0, 2.0, 3.0]".to_string()));
        assert_eq!(decoded, Some(vec![1.0, 2.0, 3.0]));
    }

    #[rstest]
    #[case(RawEmbedding::Text("not json".to_string()))]
    #[case(RawEmbedding::Text("".to_string()))]
    #[case(RawEmbedding::Floats(vec![]))]
    #[case(RawEmbedding::Binary(vec![0x00]))]
    #[case(RawEmbedding::Binary(vec![0x00, 0x03, 0x00]))]
    fn unknown_or_malformed_shapes_are_absent(#[case] raw: RawEmbedding) {
        assert_eq!(decode_embedding(&raw), None);
    }

    #[test]
    fn json_value_shapes_decode_or_drop() {
        assert_eq!(
            decode_embedding_value(&json!([0.5, 1.5])),
            Some(vec![0.5, 1.5])
        );
        assert_eq!(
            decode_embedding_value(&json!("[0.5, 1.5]")),
            Some(vec![0.5, 1.5])
        );
        assert_eq!(decode_embedding_value(&json!({"dim": 2})), None);
        assert_eq!(decode_embedding_value(&json!([0.5, "x"])), None);
    }
}
