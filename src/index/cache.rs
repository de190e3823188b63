// 목적:
// - 기관(agencies)/주제(themes) 참조 데이터의 메모리 캐시를 제공한다.
//
// 설명:
// - 두 소형 계층 테이블을 키(코드)와 숫자 id 양방향 매핑으로 적재해
//   쓰기 경로의 자연키 해석을 O(1)로 만든다.
// - 전역 가변 상태 대신 명시적 캐시 객체를 소유자(NewsStore)가 보관한다.
//
// 디자인 패턴:
// - 명시적 캐시 객체(Explicit Cache Object).
//
// 참조:
// - src/index/news_store.rs
// - src/core/storage_adapter.rs

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Agency {
    pub id: i32,
    pub key: String,
    pub name: String,
    pub parent_key: Option<String>,
}

/// 3단계 주제 트리의 노드다. level 1 노드만 parent_code가 없다.
#[derive(Debug, Clone)]
pub struct Theme {
    pub id: i32,
    pub code: String,
    pub label: String,
    pub level: i16,
    pub parent_code: Option<String>,
}

#[derive(Debug, Default)]
pub struct ReferenceCache {
    agencies_by_key: HashMap<String, Agency>,
    agencies_by_id: HashMap<i32, Agency>,
    themes_by_code: HashMap<String, Theme>,
    themes_by_id: HashMap<i32, Theme>,
}

impl ReferenceCache {
    pub fn from_rows(agencies: Vec<Agency>, themes: Vec<Theme>) -> Self {
        let mut cache = Self::default();
        for agency in agencies {
            cache.agencies_by_id.insert(agency.id, agency.clone());
            cache.agencies_by_key.insert(agency.key.clone(), agency);
        }
        for theme in themes {
            cache.themes_by_id.insert(theme.id, theme.clone());
            cache.themes_by_code.insert(theme.code.clone(), theme);
        }
        cache
    }

    pub fn agency_by_key(&self, key: &str) -> Option<&Agency> {
        self.agencies_by_key.get(key)
    }

    pub fn agency_by_id(&self, id: i32) -> Option<&Agency> {
        self.agencies_by_id.get(&id)
    }

    pub fn theme_by_code(&self, code: &str) -> Option<&Theme> {
        self.themes_by_code.get(code)
    }

    pub fn theme_by_id(&self, id: i32) -> Option<&Theme> {
        self.themes_by_id.get(&id)
    }

    /// 주제 코드를 id로 해석한다. 미지의 코드는 None이다(치명 오류 아님).
    pub fn resolve_theme_id(&self, code: Option<&str>) -> Option<i32> {
        let code = code?;
        self.themes_by_code.get(code).map(|theme| theme.id)
    }

    /// 주제 id를 코드로 되돌린다. 레거시 평면 포맷 변환에 사용된다.
    pub fn theme_code_for_id(&self, id: Option<i32>) -> Option<String> {
        let id = id?;
        self.themes_by_id.get(&id).map(|theme| theme.code.clone())
    }

    pub fn agency_count(&self) -> usize {
        self.agencies_by_key.len()
    }

    pub fn theme_count(&self) -> usize {
        self.themes_by_code.len()
    }

    /// 재적재 시 부모가 자식보다 먼저 삽입되도록 level 오름차순으로 정렬한다.
    pub fn themes_in_insert_order(&self) -> Vec<&Theme> {
        let mut themes = self.themes_by_code.values().collect::<Vec<_>>();
        themes.sort_by(|left, right| {
            left.level
                .cmp(&right.level)
                .then_with(|| left.code.cmp(&right.code))
        });
        themes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cache() -> ReferenceCache {
        let agencies = vec![Agency {
            id: 1,
            key: "ministry-health".to_string(),
            name: "Ministry of Health".to_string(),
            parent_key: None,
        }];
        let themes = vec![
            Theme {
                id: 30,
                code: "ECO.01.02".to_string(),
                label: "Trade".to_string(),
                level: 3,
                parent_code: Some("ECO.01".to_string()),
            },
            Theme {
                id: 10,
                code: "ECO".to_string(),
                label: "Economy".to_string(),
                level: 1,
                parent_code: None,
            },
            Theme {
                id: 20,
                code: "ECO.01".to_string(),
                label: "Finance".to_string(),
                level: 2,
                parent_code: Some("ECO".to_string()),
            },
        ];
        ReferenceCache::from_rows(agencies, themes)
    }

    #[test]
    fn resolves_keys_and_ids_both_ways() {
        let cache = sample_cache();
        assert_eq!(cache.agency_by_key("ministry-health").unwrap().id, 1);
        assert_eq!(cache.agency_by_id(1).unwrap().key, "ministry-health");
        assert_eq!(cache.resolve_theme_id(Some("ECO.01")), Some(20));
        assert_eq!(cache.resolve_theme_id(Some("UNKNOWN")), None);
        assert_eq!(cache.resolve_theme_id(None), None);
        assert_eq!(cache.theme_code_for_id(Some(30)).as_deref(), Some("ECO.01.02"));
        assert_eq!(cache.theme_code_for_id(Some(99)), None);
    }

    #[test]
    fn insert_order_puts_parents_before_children() {
        let cache = sample_cache();
        let levels = cache
            .themes_in_insert_order()
            .iter()
            .map(|theme| theme.level)
            .collect::<Vec<_>>();
        assert_eq!(levels, vec![1, 2, 3]);
    }
}
