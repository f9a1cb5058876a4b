#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use ranker::cache::{MemoryConfigCache, MemoryRankingCache, RankingCache};
use ranker::config::Settings;
use ranker::core::leaderboard::{
    LeaderboardType, NewLeaderboard, RankingEntry, ScoreRecord, ScoreSubmission, SortOrder,
};
use ranker::core::ranking::{Backends, RankingService};
use ranker::error::{Dependency, RankError, RankResult};
use ranker::lock::MemoryLockManager;
use ranker::storage::{MemoryLeaderboardStore, MemoryScoreHistory, ScoreHistory};

pub const LEADERBOARD: &str = "L";

pub fn injected(dependency: Dependency) -> RankError {
    RankError::unavailable(dependency, "injected failure")
}

/// Score history with switchable faults. `top_k` can be parked on a gate to hold a rebuild
/// in the middle of repopulation.
#[derive(Default)]
pub struct FaultyHistory {
    inner: MemoryScoreHistory,
    pub fail_top_k: AtomicBool,
    pub stall_latest: AtomicBool,
    pub gate_top_k: AtomicBool,
    pub entered: Notify,
    pub gate: Notify,
}

#[async_trait]
impl ScoreHistory for FaultyHistory {
    async fn append(&self, record: ScoreRecord) -> RankResult<ScoreRecord> {
        self.inner.append(record).await
    }

    async fn latest(&self, leaderboard_id: &str, user_id: &str) -> RankResult<Option<ScoreRecord>> {
        if self.stall_latest.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.latest(leaderboard_id, user_id).await
    }

    async fn top_k(
        &self,
        leaderboard_id: &str,
        k: usize,
        sort_order: SortOrder,
    ) -> RankResult<Vec<ScoreRecord>> {
        if self.fail_top_k.load(Ordering::SeqCst) {
            return Err(injected(Dependency::ScoreHistory));
        }
        if self.gate_top_k.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        self.inner.top_k(leaderboard_id, k, sort_order).await
    }

    async fn rank_of(
        &self,
        leaderboard_id: &str,
        user_id: &str,
        sort_order: SortOrder,
    ) -> RankResult<u64> {
        self.inner.rank_of(leaderboard_id, user_id, sort_order).await
    }

    async fn user_count(&self, leaderboard_id: &str) -> RankResult<u64> {
        self.inner.user_count(leaderboard_id).await
    }

    async fn record_count(&self, leaderboard_id: &str) -> RankResult<u64> {
        self.inner.record_count(leaderboard_id).await
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> RankResult<usize> {
        self.inner.purge_expired(cutoff).await
    }

    async fn health_check(&self) -> RankResult<()> {
        self.inner.health_check().await
    }
}

/// Ranking cache that can refuse writes, or every call.
pub struct FaultyCache {
    inner: MemoryRankingCache,
    pub fail_writes: AtomicBool,
    pub fail_all: AtomicBool,
}

impl FaultyCache {
    pub fn new() -> Self {
        FaultyCache {
            inner: MemoryRankingCache::new(Duration::from_secs(86_400)),
            fail_writes: AtomicBool::new(false),
            fail_all: AtomicBool::new(false),
        }
    }

    fn check(&self, write: bool) -> RankResult<()> {
        let failing = self.fail_all.load(Ordering::SeqCst)
            || (write && self.fail_writes.load(Ordering::SeqCst));
        match failing {
            true => Err(injected(Dependency::RankingCache)),
            false => Ok(()),
        }
    }
}

#[async_trait]
impl RankingCache for FaultyCache {
    async fn set(&self, leaderboard_id: &str, user_id: &str, score: i64) -> RankResult<()> {
        self.check(true)?;
        self.inner.set(leaderboard_id, user_id, score).await
    }

    async fn get(&self, leaderboard_id: &str, user_id: &str) -> RankResult<Option<i64>> {
        self.check(false)?;
        self.inner.get(leaderboard_id, user_id).await
    }

    async fn rank(
        &self,
        leaderboard_id: &str,
        user_id: &str,
        sort_order: SortOrder,
    ) -> RankResult<Option<u64>> {
        self.check(false)?;
        self.inner.rank(leaderboard_id, user_id, sort_order).await
    }

    async fn top_range(
        &self,
        leaderboard_id: &str,
        start_rank: u64,
        end_rank: u64,
        sort_order: SortOrder,
    ) -> RankResult<Vec<RankingEntry>> {
        self.check(false)?;
        self.inner
            .top_range(leaderboard_id, start_rank, end_rank, sort_order)
            .await
    }

    async fn around(
        &self,
        leaderboard_id: &str,
        user_id: &str,
        count: u64,
        sort_order: SortOrder,
    ) -> RankResult<Vec<RankingEntry>> {
        self.check(false)?;
        self.inner
            .around(leaderboard_id, user_id, count, sort_order)
            .await
    }

    async fn size(&self, leaderboard_id: &str) -> RankResult<u64> {
        self.check(false)?;
        self.inner.size(leaderboard_id).await
    }

    async fn batch_set(&self, leaderboard_id: &str, scores: HashMap<String, i64>) -> RankResult<()> {
        self.check(true)?;
        self.inner.batch_set(leaderboard_id, scores).await
    }

    async fn remove(&self, leaderboard_id: &str, user_id: &str) -> RankResult<bool> {
        self.check(true)?;
        self.inner.remove(leaderboard_id, user_id).await
    }

    async fn clear(&self, leaderboard_id: &str) -> RankResult<()> {
        self.check(true)?;
        self.inner.clear(leaderboard_id).await
    }

    async fn evict_expired(&self) -> RankResult<usize> {
        self.check(true)?;
        self.inner.evict_expired().await
    }

    async fn health_check(&self) -> RankResult<()> {
        self.check(false)?;
        self.inner.health_check().await
    }
}

pub struct Harness {
    pub service: Arc<RankingService>,
    pub history: Arc<FaultyHistory>,
    pub cache: Arc<FaultyCache>,
    pub locks: Arc<MemoryLockManager>,
}

impl Harness {
    pub fn new() -> Self {
        let settings = Settings::default();
        let history = Arc::new(FaultyHistory::default());
        let cache = Arc::new(FaultyCache::new());
        let locks = Arc::new(MemoryLockManager::new());
        let backends = Backends {
            history: history.clone(),
            leaderboards: Arc::new(MemoryLeaderboardStore::new()),
            ranking_cache: cache.clone(),
            config_cache: Arc::new(MemoryConfigCache::new(settings.config_cache_ttl())),
            locks: locks.clone(),
        };
        Harness {
            service: Arc::new(RankingService::new(settings, backends)),
            history,
            cache,
            locks,
        }
    }

    /// Harness with an empty leaderboard `L`.
    pub async fn with_leaderboard(sort_order: SortOrder) -> Self {
        let harness = Harness::new();
        harness
            .service
            .create_leaderboard(
                NewLeaderboard::new("Arcade", "pacman", LeaderboardType::Global, sort_order)
                    .with_id(LEADERBOARD),
            )
            .await
            .unwrap();
        harness
    }

    pub async fn submit(&self, user_id: &str, score: i64) -> ranker::core::leaderboard::RankSnapshot {
        self.service
            .submit_score(ScoreSubmission::new(LEADERBOARD, user_id, score))
            .await
            .unwrap()
    }

    /// Cache content as (user, score, rank), best first.
    pub async fn cached_board(&self, sort_order: SortOrder) -> Vec<(String, i64, u64)> {
        self.cache
            .top_range(LEADERBOARD, 1, u64::MAX, sort_order)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| (entry.user_id, entry.score, entry.rank))
            .collect()
    }
}
