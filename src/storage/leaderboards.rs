use async_trait::async_trait;
use chrono::Utc;
use itertools::Itertools;
use parking_lot::RwLock;
use std::{cmp::Reverse, collections::HashMap};

use crate::core::leaderboard::Leaderboard;
use crate::error::{RankError, RankResult};

/// Durable storage of leaderboard configurations. Leaderboards are never physically removed,
/// deletion only flags them inactive.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Fails with `DuplicateLeaderboard` if the id was ever used, deleted leaderboards included.
    async fn insert(&self, leaderboard: Leaderboard) -> RankResult<Leaderboard>;

    /// Active leaderboard by id.
    async fn get(&self, leaderboard_id: &str) -> RankResult<Leaderboard>;

    async fn update(&self, leaderboard: &Leaderboard) -> RankResult<Leaderboard>;

    async fn soft_delete(&self, leaderboard_id: &str) -> RankResult<()>;

    /// Active leaderboards, newest first, with the total count matching the filter.
    /// A `limit` of 0 returns every remaining item.
    async fn list(
        &self,
        game_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> RankResult<(Vec<Leaderboard>, u64)>;

    async fn health_check(&self) -> RankResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryLeaderboardStore {
    leaderboards: RwLock<HashMap<String, Leaderboard>>,
}

impl MemoryLeaderboardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(leaderboard_id: &str) -> RankError {
    RankError::NotFound(format!("Leaderboard {leaderboard_id} does not exist"))
}

#[async_trait]
impl LeaderboardStore for MemoryLeaderboardStore {
    async fn insert(&self, mut leaderboard: Leaderboard) -> RankResult<Leaderboard> {
        let mut leaderboards = self.leaderboards.write();
        if leaderboards.contains_key(&leaderboard.id) {
            return Err(RankError::DuplicateLeaderboard(leaderboard.id));
        }
        let now = Utc::now();
        leaderboard.created_at = now;
        leaderboard.updated_at = now;
        leaderboard.is_active = true;
        leaderboards.insert(leaderboard.id.clone(), leaderboard.clone());
        Ok(leaderboard)
    }

    async fn get(&self, leaderboard_id: &str) -> RankResult<Leaderboard> {
        self.leaderboards
            .read()
            .get(leaderboard_id)
            .filter(|l| l.is_active)
            .cloned()
            .ok_or_else(|| not_found(leaderboard_id))
    }

    async fn update(&self, leaderboard: &Leaderboard) -> RankResult<Leaderboard> {
        let mut leaderboards = self.leaderboards.write();
        let stored = leaderboards
            .get_mut(&leaderboard.id)
            .ok_or_else(|| not_found(&leaderboard.id))?;
        stored.name = leaderboard.name.clone();
        stored.kind = leaderboard.kind;
        stored.sort_order = leaderboard.sort_order;
        stored.max_entries = leaderboard.max_entries;
        stored.config = leaderboard.config.clone();
        stored.is_active = leaderboard.is_active;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn soft_delete(&self, leaderboard_id: &str) -> RankResult<()> {
        let mut leaderboards = self.leaderboards.write();
        match leaderboards.get_mut(leaderboard_id) {
            Some(stored) if stored.is_active => {
                stored.is_active = false;
                stored.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(not_found(leaderboard_id)),
        }
    }

    async fn list(
        &self,
        game_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> RankResult<(Vec<Leaderboard>, u64)> {
        let leaderboards = self.leaderboards.read();
        let matching = leaderboards
            .values()
            .filter(|l| l.is_active)
            .filter(|l| game_id.map_or(true, |game| l.game_id == game))
            .sorted_unstable_by_key(|l| (Reverse(l.created_at), l.id.clone()))
            .collect::<Vec<_>>();
        let total = matching.len() as u64;
        let take = match limit {
            0 => usize::MAX,
            n => n,
        };
        let page = matching
            .into_iter()
            .skip(offset)
            .take(take)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn health_check(&self) -> RankResult<()> {
        let _leaderboards = self.leaderboards.read();
        Ok(())
    }
}
