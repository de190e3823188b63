// 목적:
// - 대용량 컬렉션을 고정 크기 배치로 나눠 처리하는 공통 실행기를 제공한다.
//
// 설명:
// - 배치 단위 성공/실패를 명시적 결과 객체(BatchOutcome)로 집계한다.
// - Fatal 오류는 즉시 전파하고, 그 외 오류는 배치 실패로 계수 후
//   정책에 따라 계속 진행하거나 중단한다.
//
// 디자인 패턴:
// - 결과 객체(Result Object) + 정책 주입(Policy Injection).
//
// 참조:
// - src/core/embedding_pipeline.rs
// - src/core/sync_pipeline.rs

use std::future::Future;

use tracing::{debug, warn};

use crate::core::errors::{CoreError, CoreResult};

/// 배치 실패 시 동작 정책이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnBatchError {
    Continue,
    Stop,
}

/// 배치 실행 결과 집계 객체다.
///
/// 불변식: 실행을 마친 배치에 대해 `total == successful + failed`.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub errors: Vec<String>,
}

/// 실행 전에 배치 분할 계획을 계산한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub total: usize,
    pub batch_size: usize,
    pub num_batches: usize,
    pub last_batch_size: usize,
}

impl BatchPlan {
    pub fn for_total(total: usize, batch_size: usize) -> CoreResult<Self> {
        if batch_size == 0 {
            return Err(CoreError::Validation(
                "batch_size는 1 이상이어야 합니다".to_string(),
            ));
        }

        if total == 0 {
            return Ok(Self {
                total: 0,
                batch_size,
                num_batches: 0,
                last_batch_size: 0,
            });
        }

        let num_batches = total.div_ceil(batch_size);
        let remainder = total % batch_size;
        let last_batch_size = if remainder == 0 { batch_size } else { remainder };

        Ok(Self {
            total,
            batch_size,
            num_batches,
            last_batch_size,
        })
    }
}

/// 리스트를 고정 크기 청크로 분할한다. 마지막 청크는 더 작을 수 있다.
pub fn chunked<T>(items: Vec<T>, chunk_size: usize) -> Vec<Vec<T>> {
    if chunk_size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size.max(1)));
    let mut current = Vec::with_capacity(chunk_size.min(items.len()));

    for item in items {
        current.push(item);
        if current.len() >= chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// 아이템 리스트를 배치로 나눠 핸들러를 순차 실행하고 결과를 집계한다.
///
/// 핸들러는 배치 내 성공 건수를 반환한다. 핸들러가 오류를 반환하면
/// 그 배치 전체를 실패로 계수한다. Fatal 오류만 즉시 전파된다.
pub async fn process_in_batches<T, F, Fut>(
    items: Vec<T>,
    batch_size: usize,
    on_error: OnBatchError,
    mut handler: F,
) -> CoreResult<BatchOutcome>
where
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = CoreResult<usize>>,
{
    let plan = BatchPlan::for_total(items.len(), batch_size)?;
    debug!(
        total = plan.total,
        batch_size = plan.batch_size,
        batches = plan.num_batches,
        "배치 실행을 시작합니다"
    );

    let mut outcome = BatchOutcome::default();

    for batch in chunked(items, batch_size) {
        let size = batch.len();
        outcome.batches_total += 1;
        outcome.total += size;

        match handler(batch).await {
            Ok(succeeded) => {
                let succeeded = succeeded.min(size);
                outcome.successful += succeeded;
                outcome.failed += size - succeeded;
            }
            Err(error) => {
                if error.is_fatal() {
                    return Err(error);
                }

                warn!(
                    batch = outcome.batches_total,
                    size, error = %error,
                    "배치 처리에 실패했습니다"
                );
                outcome.failed += size;
                outcome.batches_failed += 1;
                outcome.errors.push(error.to_string());

                if on_error == OnBatchError::Stop {
                    break;
                }
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(10, 3, 4, 1)]
    #[case(9, 3, 3, 3)]
    #[case(1, 100, 1, 1)]
    fn batch_plan_splits_totals(
        #[case] total: usize,
        #[case] batch_size: usize,
        #[case] num_batches: usize,
        #[case] last_batch_size: usize,
    ) {
        let plan = BatchPlan::for_total(total, batch_size).unwrap();
        assert_eq!(plan.num_batches, num_batches);
        assert_eq!(plan.last_batch_size, last_batch_size);
    }

    #[test]
    fn batch_plan_rejects_zero_batch_size() {
        assert!(BatchPlan::for_total(10, 0).is_err());
    }

    #[test]
    fn chunked_keeps_order_and_sizes() {
        let chunks = chunked((0..7).collect::<Vec<_>>(), 3);
        assert_eq!(chunks, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    }

    #[tokio::test]
    async fn runner_executes_exactly_the_planned_batches() {
        let plan = BatchPlan::for_total(10, 3).unwrap();
        let outcome =
            process_in_batches((0..10).collect::<Vec<i32>>(), 3, OnBatchError::Continue, |batch| {
                async move { Ok(batch.len()) }
            })
            .await
            .unwrap();

        assert_eq!(outcome.batches_total, plan.num_batches);
        assert_eq!(outcome.total, plan.total);
    }

    #[tokio::test]
    async fn outcome_counts_success_and_failure() {
        let items = (0..10).collect::<Vec<i32>>();
        let outcome = process_in_batches(items, 5, OnBatchError::Continue, |batch| async move {
            if batch.contains(&0) {
                Ok(batch.len())
            } else {
                Err(CoreError::Upstream("의도된 실패".to_string()))
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.total, 10);
        assert_eq!(outcome.successful, 5);
        assert_eq!(outcome.failed, 5);
        assert_eq!(outcome.total, outcome.successful + outcome.failed);
        assert_eq!(outcome.batches_failed, 1);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[tokio::test]
    async fn partial_success_within_batch_is_counted() {
        let items = (0..6).collect::<Vec<i32>>();
        let outcome = process_in_batches(items, 3, OnBatchError::Continue, |batch| async move {
            Ok(batch.len() - 1)
        })
        .await
        .unwrap();

        assert_eq!(outcome.successful, 4);
        assert_eq!(outcome.failed, 2);
    }

    #[tokio::test]
    async fn stop_policy_halts_after_first_failure() {
        let items = (0..9).collect::<Vec<i32>>();
        let outcome = process_in_batches(items, 3, OnBatchError::Stop, |batch| async move {
            if batch.contains(&3) {
                Err(CoreError::Upstream("의도된 실패".to_string()))
            } else {
                Ok(batch.len())
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.batches_total, 2);
        assert_eq!(outcome.total, 6);
        assert_eq!(outcome.successful, 3);
        assert_eq!(outcome.failed, 3);
    }

    #[tokio::test]
    async fn fatal_error_propagates_immediately() {
        let items = (0..4).collect::<Vec<i32>>();
        let result = process_in_batches(items, 2, OnBatchError::Continue, |_batch| async move {
            Err::<usize, _>(CoreError::Fatal("연결 불가".to_string()))
        })
        .await;

        assert!(matches!(result, Err(CoreError::Fatal(_))));
    }

    #[tokio::test]
    async fn zero_batch_size_is_a_validation_error() {
        let result =
            process_in_batches(vec![1], 0, OnBatchError::Continue, |batch: Vec<i32>| async move {
                Ok(batch.len())
            })
            .await;

        assert!(matches!(result, Err(CoreError::Validation(_))));
    }
}
