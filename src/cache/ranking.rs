//! Ordered user => score projection per leaderboard.
//!
//! The cache behaves like a sorted set: members are ordered by `(score, user_id)` ascending, an
//! ascending leaderboard reads that order front to back and a descending leaderboard reads it
//! back to front. Ranks are positions in that order and are never stored.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::core::leaderboard::{window_around, Metadata, RankingEntry, SortOrder};
use crate::error::{RankError, RankResult};

#[async_trait]
pub trait RankingCache: Send + Sync {
    /// Upserts the user's score and refreshes the leaderboard's expiry.
    async fn set(&self, leaderboard_id: &str, user_id: &str, score: i64) -> RankResult<()>;

    async fn get(&self, leaderboard_id: &str, user_id: &str) -> RankResult<Option<i64>>;

    /// 1-based rank, `None` when the user is not cached.
    async fn rank(
        &self,
        leaderboard_id: &str,
        user_id: &str,
        sort_order: SortOrder,
    ) -> RankResult<Option<u64>>;

    /// Entries between two 1-based ranks, both inclusive.
    async fn top_range(
        &self,
        leaderboard_id: &str,
        start_rank: u64,
        end_rank: u64,
        sort_order: SortOrder,
    ) -> RankResult<Vec<RankingEntry>>;

    /// `count / 2` entries on each side of the user, clamped at both ends of the board.
    /// Fails with `NotFound` when the user is not cached.
    async fn around(
        &self,
        leaderboard_id: &str,
        user_id: &str,
        count: u64,
        sort_order: SortOrder,
    ) -> RankResult<Vec<RankingEntry>>;

    async fn size(&self, leaderboard_id: &str) -> RankResult<u64>;

    /// Applies every update and the expiry refresh as one unit.
    async fn batch_set(&self, leaderboard_id: &str, scores: HashMap<String, i64>)
        -> RankResult<()>;

    /// Returns whether the user was cached.
    async fn remove(&self, leaderboard_id: &str, user_id: &str) -> RankResult<bool>;

    /// Drops the whole leaderboard entry.
    async fn clear(&self, leaderboard_id: &str) -> RankResult<()>;

    /// Drops expired leaderboard entries. Returns how many were dropped.
    async fn evict_expired(&self) -> RankResult<usize>;

    async fn health_check(&self) -> RankResult<()>;
}

#[derive(Debug)]
struct SortedBoard {
    // ascending (score, user_id)
    members: Vec<(i64, String)>,
    scores: HashMap<String, i64>,
    expires_at: Instant,
}

impl SortedBoard {
    fn new(ttl: Duration) -> Self {
        SortedBoard {
            members: vec![],
            scores: HashMap::new(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    fn upsert(&mut self, user_id: &str, score: i64) {
        if let Some(previous) = self.scores.insert(user_id.to_string(), score) {
            if previous == score {
                return;
            }
            if let Ok(idx) = self.position(previous, user_id) {
                self.members.remove(idx);
            }
        }
        let idx = match self.position(score, user_id) {
            Ok(idx) | Err(idx) => idx,
        };
        self.members.insert(idx, (score, user_id.to_string()));
    }

    fn remove(&mut self, user_id: &str) -> bool {
        match self.scores.remove(user_id) {
            Some(score) => {
                if let Ok(idx) = self.position(score, user_id) {
                    self.members.remove(idx);
                }
                true
            }
            None => false,
        }
    }

    fn position(&self, score: i64, user_id: &str) -> Result<usize, usize> {
        self.members
            .binary_search_by(|(s, u)| s.cmp(&score).then_with(|| u.as_str().cmp(user_id)))
    }

    fn rank(&self, user_id: &str, sort_order: SortOrder) -> Option<u64> {
        let score = *self.scores.get(user_id)?;
        let idx = self.position(score, user_id).ok()?;
        Some(match sort_order {
            SortOrder::Ascending => idx as u64 + 1,
            SortOrder::Descending => (self.members.len() - idx) as u64,
        })
    }

    fn range(&self, start_rank: u64, end_rank: u64, sort_order: SortOrder) -> Vec<RankingEntry> {
        let len = self.members.len() as u64;
        let start_rank = start_rank.max(1);
        let end_rank = end_rank.min(len);
        (start_rank..=end_rank)
            .map(|rank| {
                let idx = match sort_order {
                    SortOrder::Ascending => rank - 1,
                    SortOrder::Descending => len - rank,
                };
                let (score, user_id) = &self.members[idx as usize];
                RankingEntry {
                    user_id: user_id.clone(),
                    score: *score,
                    rank,
                    updated_at: None,
                    metadata: Metadata::new(),
                }
            })
            .collect()
    }
}

/// In-process sorted-set backend. Rank lookups are binary searches over the ordered members.
#[derive(Debug)]
pub struct MemoryRankingCache {
    boards: RwLock<HashMap<String, SortedBoard>>,
    ttl: Duration,
}

impl MemoryRankingCache {
    pub fn new(ttl: Duration) -> Self {
        MemoryRankingCache {
            boards: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Runs `read` against a live board, or returns `missing` when there is none.
    fn read_board<T>(&self, leaderboard_id: &str, missing: T, read: impl FnOnce(&SortedBoard) -> T) -> T {
        let boards = self.boards.read();
        match boards.get(leaderboard_id) {
            Some(board) if !board.is_expired(Instant::now()) => read(board),
            _ => missing,
        }
    }

    /// Runs `write` against the board, starting a fresh one if it expired, then refreshes the
    /// expiry.
    fn write_board<T>(&self, leaderboard_id: &str, write: impl FnOnce(&mut SortedBoard) -> T) -> T {
        let mut boards = self.boards.write();
        let now = Instant::now();
        let board = boards
            .entry(leaderboard_id.to_string())
            .or_insert_with(|| SortedBoard::new(self.ttl));
        if board.is_expired(now) {
            *board = SortedBoard::new(self.ttl);
        }
        let result = write(board);
        board.expires_at = now + self.ttl;
        result
    }
}

#[async_trait]
impl RankingCache for MemoryRankingCache {
    async fn set(&self, leaderboard_id: &str, user_id: &str, score: i64) -> RankResult<()> {
        self.write_board(leaderboard_id, |board| board.upsert(user_id, score));
        debug!(leaderboard_id, user_id, score, "User score cached");
        Ok(())
    }

    async fn get(&self, leaderboard_id: &str, user_id: &str) -> RankResult<Option<i64>> {
        Ok(self.read_board(leaderboard_id, None, |board| {
            board.scores.get(user_id).copied()
        }))
    }

    async fn rank(
        &self,
        leaderboard_id: &str,
        user_id: &str,
        sort_order: SortOrder,
    ) -> RankResult<Option<u64>> {
        Ok(self.read_board(leaderboard_id, None, |board| {
            board.rank(user_id, sort_order)
        }))
    }

    async fn top_range(
        &self,
        leaderboard_id: &str,
        start_rank: u64,
        end_rank: u64,
        sort_order: SortOrder,
    ) -> RankResult<Vec<RankingEntry>> {
        Ok(self.read_board(leaderboard_id, vec![], |board| {
            board.range(start_rank, end_rank, sort_order)
        }))
    }

    async fn around(
        &self,
        leaderboard_id: &str,
        user_id: &str,
        count: u64,
        sort_order: SortOrder,
    ) -> RankResult<Vec<RankingEntry>> {
        self.read_board(leaderboard_id, None, |board| {
            let rank = board.rank(user_id, sort_order)?;
            let (start, end) = window_around(rank, count, board.members.len() as u64)?;
            Some(board.range(start + 1, end + 1, sort_order))
        })
        .ok_or_else(|| {
            RankError::NotFound(format!(
                "User {user_id} is not in leaderboard {leaderboard_id}"
            ))
        })
    }

    async fn size(&self, leaderboard_id: &str) -> RankResult<u64> {
        Ok(self.read_board(leaderboard_id, 0, |board| board.members.len() as u64))
    }

    async fn batch_set(
        &self,
        leaderboard_id: &str,
        scores: HashMap<String, i64>,
    ) -> RankResult<()> {
        let count = scores.len();
        self.write_board(leaderboard_id, |board| {
            for (user_id, score) in scores {
                board.upsert(&user_id, score);
            }
        });
        debug!(leaderboard_id, count, "Batch of scores cached");
        Ok(())
    }

    async fn remove(&self, leaderboard_id: &str, user_id: &str) -> RankResult<bool> {
        let mut boards = self.boards.write();
        Ok(boards
            .get_mut(leaderboard_id)
            .map_or(false, |board| board.remove(user_id)))
    }

    async fn clear(&self, leaderboard_id: &str) -> RankResult<()> {
        self.boards.write().remove(leaderboard_id);
        debug!(leaderboard_id, "Ranking cache cleared");
        Ok(())
    }

    async fn evict_expired(&self) -> RankResult<usize> {
        let mut boards = self.boards.write();
        let now = Instant::now();
        let before = boards.len();
        boards.retain(|_, board| !board.is_expired(now));
        Ok(before - boards.len())
    }

    async fn health_check(&self) -> RankResult<()> {
        let _boards = self.boards.read();
        Ok(())
    }
}
