use std::future::Future;
use std::time::Duration;

use crate::error::{Dependency, RankError, RankResult};

/// Runs a call against an external collaborator under a deadline. An elapsed deadline is
/// reported as the dependency being unavailable.
pub async fn bounded<T, F>(dependency: Dependency, timeout: Duration, call: F) -> RankResult<T>
where
    F: Future<Output = RankResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RankError::unavailable(
            dependency,
            format!("no response within {}ms", timeout.as_millis()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_unavailable() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, RankError>(1)
        };
        let err = bounded(Dependency::RankingCache, Duration::from_millis(50), slow)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
    }

    #[tokio::test]
    async fn inner_result_is_passed_through() {
        let value = bounded(Dependency::ScoreHistory, Duration::from_secs(1), async {
            Ok::<_, RankError>(42)
        })
        .await
        .unwrap();
        assert_eq!(value, 42);

        let err = bounded(Dependency::ScoreHistory, Duration::from_secs(1), async {
            Err::<u8, _>(RankError::NotFound("lb".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
