mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use common::{Harness, LEADERBOARD};
use ranker::core::leaderboard::{ScoreRecord, ScoreSubmission, SortOrder};
use ranker::error::{Dependency, RankError};
use ranker::storage::ScoreHistory;

#[tokio::test]
async fn cache_write_failure_does_not_fail_submission() {
    let harness = Harness::with_leaderboard(SortOrder::Descending).await;
    harness.cache.fail_writes.store(true, Ordering::SeqCst);

    let snapshot = harness.submit("u1", 100).await;
    assert_eq!(snapshot.score, 100);
    assert_eq!(snapshot.rank, 0);
    assert_eq!(snapshot.rank_delta, 0);

    // the durable append went through
    let latest = harness.history.latest(LEADERBOARD, "u1").await.unwrap();
    assert_eq!(latest.map(|r| r.score), Some(100));
    let rank = harness.service.user_rank(LEADERBOARD, "u1").await.unwrap();
    assert_eq!((rank.rank, rank.total_users), (1, 1));
}

#[tokio::test]
async fn reads_fall_back_to_history_when_cache_is_down() {
    let harness = Harness::with_leaderboard(SortOrder::Descending).await;
    for (user, score) in [("a", 30), ("b", 20), ("c", 10)] {
        harness.submit(user, score).await;
    }
    harness.cache.fail_all.store(true, Ordering::SeqCst);

    let top = harness
        .service
        .top_rankings(LEADERBOARD, 2, 0)
        .await
        .unwrap();
    let users = top.iter().map(|e| e.user_id.as_str()).collect::<Vec<_>>();
    assert_eq!(users, vec!["a", "b"]);

    let rank = harness.service.user_rank(LEADERBOARD, "c").await.unwrap();
    assert_eq!((rank.score, rank.rank, rank.total_users), (10, 3, 3));

    let window = harness
        .service
        .rankings_around_user(LEADERBOARD, "b", 2)
        .await
        .unwrap();
    assert_eq!(window.len(), 3);

    // a new submission still lands, unranked
    let snapshot = harness.submit("d", 40).await;
    assert_eq!((snapshot.rank, snapshot.previous_rank), (0, 0));
}

#[tokio::test]
async fn rebuild_reports_cache_outage() {
    let harness = Harness::with_leaderboard(SortOrder::Descending).await;
    harness.submit("a", 1).await;
    harness.cache.fail_all.store(true, Ordering::SeqCst);

    let err = harness.service.rebuild(LEADERBOARD).await.unwrap_err();
    assert!(matches!(
        err,
        RankError::Unavailable {
            dependency: Dependency::RankingCache,
            ..
        }
    ));
    assert!(!err.is_client_error());
}

#[tokio::test(start_paused = true)]
async fn stalled_history_hits_the_deadline() {
    let harness = Harness::with_leaderboard(SortOrder::Descending).await;
    harness.history.stall_latest.store(true, Ordering::SeqCst);

    let err = harness
        .service
        .submit_score(ScoreSubmission::new(LEADERBOARD, "u1", 5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RankError::Unavailable {
            dependency: Dependency::ScoreHistory,
            ..
        }
    ));
    assert_eq!(err.public_message(), "Service temporarily unavailable");
    // nothing was appended
    assert_eq!(harness.history.record_count(LEADERBOARD).await.unwrap(), 0);
}

#[tokio::test]
async fn batch_failures_carry_public_reasons() {
    let harness = Harness::with_leaderboard(SortOrder::Descending).await;
    let outcome = harness
        .service
        .batch_submit_scores(
            LEADERBOARD,
            vec![
                ScoreSubmission::new(LEADERBOARD, "", 1),
                ScoreSubmission::new(LEADERBOARD, "u2", 2),
            ],
        )
        .await
        .unwrap();
    assert_eq!((outcome.success_count, outcome.failure_count), (1, 1));
    assert!(outcome.failures[0].reason.starts_with("Validation error"));

    let missing = harness
        .service
        .batch_submit_scores("missing", vec![ScoreSubmission::new("missing", "u1", 1)])
        .await
        .unwrap();
    assert_eq!(missing.failure_count, 1);
    assert!(missing.failures[0].reason.starts_with("Not found"));
}

#[tokio::test]
async fn retention_purge_drops_old_records() {
    let harness = Harness::with_leaderboard(SortOrder::Descending).await;
    harness.submit("fresh", 10).await;

    let mut old = ScoreRecord::new(&ScoreSubmission::new(LEADERBOARD, "old", 99), 0);
    old.submitted_at = Utc::now() - chrono::Duration::days(45);
    old.created_at = old.submitted_at;
    harness.history.append(old).await.unwrap();
    assert_eq!(harness.history.user_count(LEADERBOARD).await.unwrap(), 2);

    assert_eq!(harness.service.purge_expired_history().await.unwrap(), 1);
    assert_eq!(harness.history.user_count(LEADERBOARD).await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_cache_entries_are_swept() {
    let harness = Harness::with_leaderboard(SortOrder::Descending).await;
    harness.submit("u1", 10).await;
    assert_eq!(harness.service.evict_expired_caches().await.unwrap(), 0);

    tokio::time::advance(Duration::from_secs(86_401)).await;
    // one ranking board and one leaderboard config
    assert_eq!(harness.service.evict_expired_caches().await.unwrap(), 2);
}

#[tokio::test]
async fn health_reports_each_dependency() {
    let harness = Harness::new();
    let report = harness.service.health().await;
    assert!(report.healthy);
    assert_eq!(report.checks.len(), 5);
    assert!(report.checks.iter().all(|check| check.error.is_none()));
}

#[tokio::test]
async fn cache_outage_makes_service_unhealthy() {
    let harness = Harness::new();
    harness.cache.fail_all.store(true, Ordering::SeqCst);

    let report = harness.service.health().await;
    assert!(!report.healthy);
    let cache = report.check(Dependency::RankingCache).unwrap();
    assert!(!cache.healthy);
    assert!(cache.error.is_some());
    for dependency in [
        Dependency::ScoreHistory,
        Dependency::LeaderboardStore,
        Dependency::ConfigCache,
        Dependency::LockManager,
    ] {
        assert!(report.check(dependency).unwrap().healthy, "{dependency}");
    }

    harness.cache.fail_all.store(false, Ordering::SeqCst);
    assert!(harness.service.health().await.healthy);
}
