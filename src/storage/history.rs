//! Durable, append-only log of score submissions.
//!
//! The history store is the source of truth of the ranking system: every submission is a new
//! record and the "current" score of a user is the most recently submitted record for that
//! (leaderboard, user) pair. The ranking cache is a projection that can always be regenerated
//! from `top_k`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::core::leaderboard::{ScoreRecord, SortOrder};
use crate::error::{RankError, RankResult};

#[async_trait]
pub trait ScoreHistory: Send + Sync {
    /// Appends a record. Never overwrites a previous submission.
    async fn append(&self, record: ScoreRecord) -> RankResult<ScoreRecord>;

    /// Most recent record of the user, by submission time.
    async fn latest(&self, leaderboard_id: &str, user_id: &str)
        -> RankResult<Option<ScoreRecord>>;

    /// Latest record per user, best first under `sort_order`. Ties are broken by most recent
    /// submission first.
    async fn top_k(
        &self,
        leaderboard_id: &str,
        k: usize,
        sort_order: SortOrder,
    ) -> RankResult<Vec<ScoreRecord>>;

    /// 1-based rank: number of users whose latest score strictly outranks the user's, plus one.
    async fn rank_of(&self, leaderboard_id: &str, user_id: &str, sort_order: SortOrder)
        -> RankResult<u64>;

    /// Number of distinct users with at least one record.
    async fn user_count(&self, leaderboard_id: &str) -> RankResult<u64>;

    /// Number of records, all submissions included.
    async fn record_count(&self, leaderboard_id: &str) -> RankResult<u64>;

    /// Drops records created before `cutoff`. Returns how many were dropped.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> RankResult<usize>;

    /// Round trip to the backing store.
    async fn health_check(&self) -> RankResult<()>;
}

#[derive(Debug, Default)]
struct BoardHistory {
    records: Vec<ScoreRecord>,
    // user id => index of the latest record in `records`
    latest: HashMap<String, usize>,
}

impl BoardHistory {
    fn push(&mut self, record: ScoreRecord) {
        let idx = self.records.len();
        let is_latest = match self.latest.get(&record.user_id) {
            Some(current) => record.submitted_at >= self.records[*current].submitted_at,
            None => true,
        };
        if is_latest {
            self.latest.insert(record.user_id.clone(), idx);
        }
        self.records.push(record);
    }

    fn reindex(&mut self) {
        let records = std::mem::take(&mut self.records);
        self.latest.clear();
        for record in records {
            self.push(record);
        }
    }

    fn latest_records(&self) -> impl Iterator<Item = &ScoreRecord> {
        self.latest.values().map(|idx| &self.records[*idx])
    }
}

/// In-process history backend, keyed by leaderboard.
#[derive(Debug, Default)]
pub struct MemoryScoreHistory {
    boards: RwLock<HashMap<String, BoardHistory>>,
}

impl MemoryScoreHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScoreHistory for MemoryScoreHistory {
    async fn append(&self, record: ScoreRecord) -> RankResult<ScoreRecord> {
        let mut boards = self.boards.write();
        boards
            .entry(record.leaderboard_id.clone())
            .or_default()
            .push(record.clone());
        debug!(
            leaderboard_id = %record.leaderboard_id,
            user_id = %record.user_id,
            score = record.score,
            "Score record appended"
        );
        Ok(record)
    }

    async fn latest(
        &self,
        leaderboard_id: &str,
        user_id: &str,
    ) -> RankResult<Option<ScoreRecord>> {
        let boards = self.boards.read();
        Ok(boards.get(leaderboard_id).and_then(|board| {
            board
                .latest
                .get(user_id)
                .map(|idx| board.records[*idx].clone())
        }))
    }

    async fn top_k(
        &self,
        leaderboard_id: &str,
        k: usize,
        sort_order: SortOrder,
    ) -> RankResult<Vec<ScoreRecord>> {
        let boards = self.boards.read();
        let Some(board) = boards.get(leaderboard_id) else {
            return Ok(vec![]);
        };
        let top = board
            .latest_records()
            .sorted_unstable_by(|a, b| {
                sort_order
                    .compare(a.score, b.score)
                    .then_with(|| b.submitted_at.cmp(&a.submitted_at))
                    .then_with(|| a.user_id.cmp(&b.user_id))
            })
            .take(k)
            .cloned()
            .collect();
        Ok(top)
    }

    async fn rank_of(
        &self,
        leaderboard_id: &str,
        user_id: &str,
        sort_order: SortOrder,
    ) -> RankResult<u64> {
        let boards = self.boards.read();
        let no_record = || {
            RankError::NotFound(format!(
                "No score record for user {user_id} in leaderboard {leaderboard_id}"
            ))
        };
        let board = boards.get(leaderboard_id).ok_or_else(no_record)?;
        let score = board
            .latest
            .get(user_id)
            .map(|idx| board.records[*idx].score)
            .ok_or_else(no_record)?;
        let ahead = board
            .latest_records()
            .filter(|other| sort_order.outranks(other.score, score))
            .count();
        Ok(ahead as u64 + 1)
    }

    async fn user_count(&self, leaderboard_id: &str) -> RankResult<u64> {
        let boards = self.boards.read();
        Ok(boards
            .get(leaderboard_id)
            .map_or(0, |board| board.latest.len() as u64))
    }

    async fn record_count(&self, leaderboard_id: &str) -> RankResult<u64> {
        let boards = self.boards.read();
        Ok(boards
            .get(leaderboard_id)
            .map_or(0, |board| board.records.len() as u64))
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> RankResult<usize> {
        let mut boards = self.boards.write();
        let mut purged = 0;
        for board in boards.values_mut() {
            let before = board.records.len();
            board.records.retain(|r| r.created_at >= cutoff);
            if board.records.len() != before {
                purged += before - board.records.len();
                board.reindex();
            }
        }
        boards.retain(|_, board| !board.records.is_empty());
        Ok(purged)
    }

    async fn health_check(&self) -> RankResult<()> {
        let _boards = self.boards.read();
        Ok(())
    }
}
