use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::RankResult;

/// Cache of serialized leaderboard configurations, in front of the leaderboard store.
#[async_trait]
pub trait ConfigCache: Send + Sync {
    async fn get(&self, leaderboard_id: &str) -> RankResult<Option<String>>;

    async fn set(&self, leaderboard_id: &str, payload: String) -> RankResult<()>;

    async fn invalidate(&self, leaderboard_id: &str) -> RankResult<()>;

    async fn evict_expired(&self) -> RankResult<usize>;

    async fn health_check(&self) -> RankResult<()>;
}

#[derive(Debug)]
pub struct MemoryConfigCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
    ttl: Duration,
}

impl MemoryConfigCache {
    pub fn new(ttl: Duration) -> Self {
        MemoryConfigCache {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl ConfigCache for MemoryConfigCache {
    async fn get(&self, leaderboard_id: &str) -> RankResult<Option<String>> {
        let entries = self.entries.read();
        Ok(entries
            .get(leaderboard_id)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(payload, _)| payload.clone()))
    }

    async fn set(&self, leaderboard_id: &str, payload: String) -> RankResult<()> {
        self.entries.write().insert(
            leaderboard_id.to_string(),
            (payload, Instant::now() + self.ttl),
        );
        Ok(())
    }

    async fn invalidate(&self, leaderboard_id: &str) -> RankResult<()> {
        self.entries.write().remove(leaderboard_id);
        Ok(())
    }

    async fn evict_expired(&self) -> RankResult<usize> {
        let mut entries = self.entries.write();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(before - entries.len())
    }

    async fn health_check(&self) -> RankResult<()> {
        let _entries = self.entries.read();
        Ok(())
    }
}
