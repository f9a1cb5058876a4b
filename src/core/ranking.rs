//! Ranking orchestration: keeps the ranking cache consistent with the score history.
//!
//! Writes go to the score history first and are then written through to the ranking cache.
//! Reads consult the cache first and fall back to the history store, which is always
//! authoritative. The cache only ever flows downstream of the history: `rebuild` regenerates it
//! from `ScoreHistory::top_k`, never the other way around.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use strum::Display;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::{ConfigCache, MemoryConfigCache, MemoryRankingCache, RankingCache};
use crate::config::Settings;
use crate::core::leaderboard::{
    window_around, BatchFailure, BatchSubmitResult, Leaderboard, LeaderboardStats, NewLeaderboard,
    RankSnapshot, RankingEntry, ScoreRecord, ScoreSubmission, UserRank,
};
use crate::core::registry::LeaderboardRegistry;
use crate::deadline::bounded;
use crate::error::{Dependency, RankError, RankResult};
use crate::lock::{LockLease, LockManager, MemoryLockManager};
use crate::storage::{LeaderboardStore, MemoryLeaderboardStore, MemoryScoreHistory, ScoreHistory};

/// Steps of a cache rebuild. Only used for tracing, nothing is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RebuildState {
    Idle,
    Locked,
    LockDenied,
    Cleared,
    Repopulated,
}

/// External collaborators of the ranking core.
#[derive(Clone)]
pub struct Backends {
    pub history: Arc<dyn ScoreHistory>,
    pub leaderboards: Arc<dyn LeaderboardStore>,
    pub ranking_cache: Arc<dyn RankingCache>,
    pub config_cache: Arc<dyn ConfigCache>,
    pub locks: Arc<dyn LockManager>,
}

impl Backends {
    pub fn in_memory(settings: &Settings) -> Self {
        Backends {
            history: Arc::new(MemoryScoreHistory::new()),
            leaderboards: Arc::new(MemoryLeaderboardStore::new()),
            ranking_cache: Arc::new(MemoryRankingCache::new(settings.ranking_cache_ttl())),
            config_cache: Arc::new(MemoryConfigCache::new(settings.config_cache_ttl())),
            locks: Arc::new(MemoryLockManager::new()),
        }
    }
}

/// Outcome of one dependency round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyHealth {
    pub dependency: Dependency,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DependencyHealth {
    fn from_check(dependency: Dependency, check: RankResult<()>) -> Self {
        match check {
            Ok(()) => DependencyHealth {
                dependency,
                healthy: true,
                error: None,
            },
            Err(e) => {
                error!(%dependency, error = %e, "Health check failed");
                DependencyHealth {
                    dependency,
                    healthy: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Readiness of the service: healthy only when every dependency answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub uptime_secs: u64,
    pub checks: Vec<DependencyHealth>,
}

impl HealthReport {
    pub fn check(&self, dependency: Dependency) -> Option<&DependencyHealth> {
        self.checks.iter().find(|c| c.dependency == dependency)
    }
}

pub fn rebuild_lock_key(leaderboard_id: &str) -> String {
    format!("ranking_lock:{leaderboard_id}")
}

pub struct RankingService {
    registry: LeaderboardRegistry,
    history: Arc<dyn ScoreHistory>,
    cache: Arc<dyn RankingCache>,
    locks: Arc<dyn LockManager>,
    settings: Arc<Settings>,
    started_at: Instant,
}

impl RankingService {
    pub fn new(settings: Settings, backends: Backends) -> Self {
        let settings = Arc::new(settings);
        RankingService {
            registry: LeaderboardRegistry::new(
                backends.leaderboards,
                backends.config_cache,
                settings.clone(),
            ),
            history: backends.history,
            cache: backends.ranking_cache,
            locks: backends.locks,
            settings,
            started_at: Instant::now(),
        }
    }

    pub fn in_memory(settings: Settings) -> Self {
        let backends = Backends::in_memory(&settings);
        RankingService::new(settings, backends)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    ////////////////////////
    // Leaderboard lifecycle
    ////////////////////////

    pub async fn create_leaderboard(&self, request: NewLeaderboard) -> RankResult<Leaderboard> {
        self.registry.create(request).await
    }

    pub async fn get_leaderboard(&self, leaderboard_id: &str) -> RankResult<Leaderboard> {
        self.registry.get(leaderboard_id).await
    }

    pub async fn update_leaderboard(&self, leaderboard: &Leaderboard) -> RankResult<Leaderboard> {
        self.registry.update(leaderboard).await
    }

    /// Soft delete, then drop the ranking cache so that nothing is served for the leaderboard.
    pub async fn delete_leaderboard(&self, leaderboard_id: &str) -> RankResult<()> {
        self.registry.delete(leaderboard_id).await?;
        if let Err(e) = self.cache_call(self.cache.clear(leaderboard_id)).await {
            warn!(leaderboard_id, error = %e, "Could not clear ranking cache of deleted leaderboard");
        }
        Ok(())
    }

    pub async fn list_leaderboards(
        &self,
        game_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> RankResult<(Vec<Leaderboard>, u64)> {
        self.registry.list(game_id, limit, offset).await
    }

    //////////////
    // Submissions
    //////////////

    pub async fn submit_score(&self, submission: ScoreSubmission) -> RankResult<RankSnapshot> {
        submission.validate()?;
        let leaderboard = self.registry.get(&submission.leaderboard_id).await?;
        let leaderboard_id = leaderboard.id.as_str();
        let user_id = submission.user_id.as_str();

        let previous_score = self
            .history_call(self.history.latest(leaderboard_id, user_id))
            .await?
            .map_or(0, |record| record.score);
        // Cache only: a cold cache reports the user as previously unranked.
        let previous_rank = self.cached_rank(&leaderboard, user_id).await;

        let record = ScoreRecord::new(&submission, previous_score);
        self.history_call(self.history.append(record)).await?;

        if let Err(e) = self
            .cache_call(self.cache.set(leaderboard_id, user_id, submission.score))
            .await
        {
            error!(
                leaderboard_id,
                user_id,
                score = submission.score,
                error = %e,
                "Ranking cache write failed after durable append"
            );
        }

        let rank = self.cached_rank(&leaderboard, user_id).await;
        let snapshot = RankSnapshot::new(user_id, submission.score, previous_score, rank, previous_rank);

        info!(
            leaderboard_id,
            user_id,
            score = snapshot.score,
            rank = snapshot.rank,
            rank_delta = snapshot.rank_delta,
            "Score submitted"
        );
        Ok(snapshot)
    }

    /// Submits every entry in order. A failing entry is reported and never stops the batch.
    pub async fn batch_submit_scores(
        &self,
        leaderboard_id: &str,
        submissions: Vec<ScoreSubmission>,
    ) -> RankResult<BatchSubmitResult> {
        if submissions.is_empty() {
            return Err(RankError::Validation("Batch must not be empty".to_string()));
        }
        if submissions.len() > self.settings.max_batch_size {
            return Err(RankError::Validation(format!(
                "Batch holds {} entries, at most {} are accepted",
                submissions.len(),
                self.settings.max_batch_size
            )));
        }

        let total = submissions.len();
        let mut outcome = BatchSubmitResult {
            results: Vec::with_capacity(total),
            ..Default::default()
        };
        for (index, mut submission) in submissions.into_iter().enumerate() {
            submission.leaderboard_id = leaderboard_id.to_string();
            let user_id = submission.user_id.clone();
            match self.submit_score(submission).await {
                Ok(snapshot) => {
                    outcome.success_count += 1;
                    outcome.results.push(snapshot);
                }
                Err(e) => {
                    debug!(leaderboard_id, user_id = %user_id, index, error = %e, "Batch entry rejected");
                    outcome.failure_count += 1;
                    outcome.failures.push(BatchFailure {
                        index,
                        user_id,
                        reason: e.public_message(),
                    });
                }
            }
        }

        info!(
            leaderboard_id,
            total,
            success = outcome.success_count,
            failure = outcome.failure_count,
            "Batch submission done"
        );
        Ok(outcome)
    }

    ////////
    // Reads
    ////////

    /// Only the unpaginated first page may be answered by the cache. Anything read from the
    /// history store warms the cache with the first page.
    pub async fn top_rankings(
        &self,
        leaderboard_id: &str,
        limit: usize,
        offset: usize,
    ) -> RankResult<Vec<RankingEntry>> {
        self.check_page_size("limit", limit)?;
        let leaderboard = self.registry.get(leaderboard_id).await?;

        if offset == 0 {
            match self
                .cache_call(self.cache.top_range(
                    &leaderboard.id,
                    1,
                    limit as u64,
                    leaderboard.sort_order,
                ))
                .await
            {
                Ok(entries) if !entries.is_empty() => return Ok(entries),
                Ok(_) => debug!(leaderboard_id, "Ranking cache cold, reading score history"),
                Err(e) => warn!(leaderboard_id, error = %e, "Ranking cache unavailable, reading score history"),
            }
        }

        let records = self
            .history_call(self.history.top_k(
                &leaderboard.id,
                limit.saturating_add(offset),
                leaderboard.sort_order,
            ))
            .await?;
        let rankings = records
            .into_iter()
            .enumerate()
            .skip(offset)
            .take(limit)
            .map(|(idx, record)| RankingEntry {
                user_id: record.user_id,
                score: record.score,
                rank: idx as u64 + 1,
                updated_at: Some(record.submitted_at),
                metadata: record.metadata,
            })
            .collect::<Vec<_>>();

        if offset == 0 && !rankings.is_empty() {
            let scores = rankings
                .iter()
                .map(|entry| (entry.user_id.clone(), entry.score))
                .collect::<HashMap<_, _>>();
            if let Err(e) = self
                .cache_call(self.cache.batch_set(&leaderboard.id, scores))
                .await
            {
                warn!(leaderboard_id, error = %e, "Could not warm ranking cache");
            }
        }
        Ok(rankings)
    }

    pub async fn user_rank(&self, leaderboard_id: &str, user_id: &str) -> RankResult<UserRank> {
        let leaderboard = self.registry.get(leaderboard_id).await?;
        let leaderboard_id = leaderboard.id.as_str();

        let cached_score = match self.cache_call(self.cache.get(leaderboard_id, user_id)).await {
            Ok(score) => score,
            Err(e) => {
                warn!(leaderboard_id, user_id, error = %e, "Ranking cache unavailable, reading score history");
                None
            }
        };
        let score = match cached_score {
            Some(score) => score,
            None => self
                .history_call(self.history.latest(leaderboard_id, user_id))
                .await?
                .map(|record| record.score)
                .ok_or_else(|| {
                    RankError::NotFound(format!(
                        "No score record for user {user_id} in leaderboard {leaderboard_id}"
                    ))
                })?,
        };

        let (rank, total_users) = match self.cached_rank(&leaderboard, user_id).await {
            rank if rank > 0 => {
                let total = match self.cache_call(self.cache.size(leaderboard_id)).await {
                    Ok(total) => total,
                    Err(e) => {
                        warn!(leaderboard_id, error = %e, "Could not read ranking cache size");
                        self.history_call(self.history.user_count(leaderboard_id)).await?
                    }
                };
                (rank, total)
            }
            _ => {
                let rank = self
                    .history_call(self.history.rank_of(
                        leaderboard_id,
                        user_id,
                        leaderboard.sort_order,
                    ))
                    .await?;
                let total = self
                    .history_call(self.history.user_count(leaderboard_id))
                    .await?;
                (rank, total)
            }
        };

        Ok(UserRank {
            user_id: user_id.to_string(),
            score,
            rank,
            total_users,
        })
    }

    pub async fn rankings_around_user(
        &self,
        leaderboard_id: &str,
        user_id: &str,
        count: usize,
    ) -> RankResult<Vec<RankingEntry>> {
        self.check_page_size("count", count)?;
        let leaderboard = self.registry.get(leaderboard_id).await?;

        match self
            .cache_call(self.cache.around(
                &leaderboard.id,
                user_id,
                count as u64,
                leaderboard.sort_order,
            ))
            .await
        {
            Ok(entries) => return Ok(entries),
            Err(RankError::NotFound(_)) => {
                debug!(leaderboard_id, user_id, "User not in ranking cache, reading score history")
            }
            Err(e) => {
                warn!(leaderboard_id, user_id, error = %e, "Ranking cache unavailable, reading score history")
            }
        }

        // The history ordering is positional, like the cache's, so the same window applies.
        let not_in_leaderboard =
            || RankError::NotFound(format!("User {user_id} is not in leaderboard {leaderboard_id}"));
        let total = self
            .history_call(self.history.user_count(&leaderboard.id))
            .await?;
        let standings = self
            .history_call(self.history.top_k(
                &leaderboard.id,
                total as usize,
                leaderboard.sort_order,
            ))
            .await?;
        let position = standings
            .iter()
            .position(|record| record.user_id == user_id)
            .ok_or_else(not_in_leaderboard)?;
        let (start, end) = window_around(position as u64 + 1, count as u64, standings.len() as u64)
            .ok_or_else(not_in_leaderboard)?;

        Ok(standings
            .into_iter()
            .enumerate()
            .skip(start as usize)
            .take((end - start + 1) as usize)
            .map(|(idx, record)| RankingEntry {
                user_id: record.user_id,
                score: record.score,
                rank: idx as u64 + 1,
                updated_at: Some(record.submitted_at),
                metadata: record.metadata,
            })
            .collect())
    }

    /// Figures over the latest score of every user, straight from the score history.
    pub async fn stats(&self, leaderboard_id: &str) -> RankResult<LeaderboardStats> {
        let leaderboard = self.registry.get(leaderboard_id).await?;
        let total_users = self
            .history_call(self.history.user_count(&leaderboard.id))
            .await?;
        let total_scores = self
            .history_call(self.history.record_count(&leaderboard.id))
            .await?;
        let latest = self
            .history_call(self.history.top_k(
                &leaderboard.id,
                total_users as usize,
                leaderboard.sort_order,
            ))
            .await?;

        let scores = latest.iter().map(|record| record.score);
        let average_score = match latest.len() {
            0 => None,
            n => Some(scores.clone().map(|s| s as f64).sum::<f64>() / n as f64),
        };
        Ok(LeaderboardStats {
            leaderboard_id: leaderboard.id.clone(),
            total_users,
            total_scores,
            highest_score: scores.clone().max(),
            lowest_score: scores.min(),
            average_score,
        })
    }

    //////////
    // Rebuild
    //////////

    /// Regenerates the ranking cache of a leaderboard from the score history. Returns the
    /// number of entries written. At most one rebuild per leaderboard runs at a time, a
    /// concurrent call fails with `RebuildInProgress` instead of waiting.
    pub async fn rebuild(&self, leaderboard_id: &str) -> RankResult<usize> {
        info!(leaderboard_id, "Rebuilding ranking cache");
        let leaderboard = self.registry.get(leaderboard_id).await?;

        let lease = LockLease::try_acquire(
            self.locks.clone(),
            &rebuild_lock_key(&leaderboard.id),
            self.settings.rebuild_lock_ttl(),
            self.settings.lock_timeout(),
        )
        .await?;
        let Some(lease) = lease else {
            trace_rebuild(leaderboard_id, RebuildState::LockDenied);
            warn!(leaderboard_id, "Rebuild lock held by another rebuild");
            return Err(RankError::RebuildInProgress(leaderboard.id));
        };
        trace_rebuild(leaderboard_id, RebuildState::Locked);

        let outcome = self.repopulate(&leaderboard).await;
        lease.release().await;
        trace_rebuild(leaderboard_id, RebuildState::Idle);

        match &outcome {
            Ok(count) => info!(leaderboard_id, records_count = count, "Ranking cache rebuilt"),
            Err(e) => error!(leaderboard_id, error = %e, "Ranking cache rebuild failed"),
        }
        outcome
    }

    async fn repopulate(&self, leaderboard: &Leaderboard) -> RankResult<usize> {
        let leaderboard_id = leaderboard.id.as_str();
        self.cache_call(self.cache.clear(leaderboard_id)).await?;
        trace_rebuild(leaderboard_id, RebuildState::Cleared);

        let records = self
            .history_call(self.history.top_k(
                leaderboard_id,
                leaderboard.max_entries as usize,
                leaderboard.sort_order,
            ))
            .await?;
        let scores = records
            .into_iter()
            .map(|record| (record.user_id, record.score))
            .collect::<HashMap<_, _>>();
        let count = scores.len();
        if count > 0 {
            self.cache_call(self.cache.batch_set(leaderboard_id, scores))
                .await?;
        }
        trace_rebuild(leaderboard_id, RebuildState::Repopulated);
        Ok(count)
    }

    //////////////
    // Maintenance
    //////////////

    /// Admin operation: forget everything cached about a leaderboard.
    pub async fn clear_cache(&self, leaderboard_id: &str) -> RankResult<()> {
        self.cache_call(self.cache.clear(leaderboard_id)).await?;
        self.registry.invalidate(leaderboard_id).await;
        info!(leaderboard_id, "Leaderboard caches cleared");
        Ok(())
    }

    /// Drops a single user from the ranking cache. The score history is untouched.
    pub async fn evict_cached_user(&self, leaderboard_id: &str, user_id: &str) -> RankResult<bool> {
        self.cache_call(self.cache.remove(leaderboard_id, user_id))
            .await
    }

    /// Drops score records older than the retention window.
    pub async fn purge_expired_history(&self) -> RankResult<usize> {
        let cutoff = Utc::now() - self.settings.score_retention();
        let purged = self
            .history_call(self.history.purge_expired(cutoff))
            .await?;
        info!(purged, %cutoff, "Expired score records purged");
        Ok(purged)
    }

    /// Reclaims cache entries of leaderboards nobody wrote to within the cache ttl.
    pub async fn evict_expired_caches(&self) -> RankResult<usize> {
        let rankings = self.cache_call(self.cache.evict_expired()).await?;
        let configs = self.registry.evict_expired().await?;
        info!(rankings, configs, "Expired cache entries evicted");
        Ok(rankings + configs)
    }

    /// Pings every dependency under its deadline. Never fails, unhealthy dependencies are
    /// reported in the checks.
    pub async fn health(&self) -> HealthReport {
        let (history, leaderboards, ranking_cache, config_cache, locks) = tokio::join!(
            self.history_call(self.history.health_check()),
            self.registry.check_store(),
            self.cache_call(self.cache.health_check()),
            self.registry.check_cache(),
            bounded(
                Dependency::LockManager,
                self.settings.lock_timeout(),
                self.locks.health_check()
            ),
        );
        let checks = vec![
            DependencyHealth::from_check(Dependency::ScoreHistory, history),
            DependencyHealth::from_check(Dependency::LeaderboardStore, leaderboards),
            DependencyHealth::from_check(Dependency::RankingCache, ranking_cache),
            DependencyHealth::from_check(Dependency::ConfigCache, config_cache),
            DependencyHealth::from_check(Dependency::LockManager, locks),
        ];
        HealthReport {
            healthy: checks.iter().all(|c| c.healthy),
            uptime_secs: self.started_at.elapsed().as_secs(),
            checks,
        }
    }

    //////////
    // Helpers
    //////////

    /// Cache rank, 0 when unknown or when the cache could not answer.
    async fn cached_rank(&self, leaderboard: &Leaderboard, user_id: &str) -> u64 {
        match self
            .cache_call(self.cache.rank(&leaderboard.id, user_id, leaderboard.sort_order))
            .await
        {
            Ok(rank) => rank.unwrap_or(0),
            Err(e) => {
                warn!(leaderboard_id = %leaderboard.id, user_id, error = %e, "Could not read rank from ranking cache");
                0
            }
        }
    }

    fn check_page_size(&self, name: &str, value: usize) -> RankResult<()> {
        match value {
            v if v >= 1 && v <= self.settings.max_page_size => Ok(()),
            v => Err(RankError::Validation(format!(
                "{name} must be between 1 and {}, got {v}",
                self.settings.max_page_size
            ))),
        }
    }

    async fn history_call<T>(&self, call: impl Future<Output = RankResult<T>>) -> RankResult<T> {
        bounded(Dependency::ScoreHistory, self.settings.store_timeout(), call).await
    }

    async fn cache_call<T>(&self, call: impl Future<Output = RankResult<T>>) -> RankResult<T> {
        bounded(Dependency::RankingCache, self.settings.cache_timeout(), call).await
    }
}

fn trace_rebuild(leaderboard_id: &str, state: RebuildState) {
    debug!(leaderboard_id, state = %state, "Rebuild state");
}
