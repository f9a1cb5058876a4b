use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::ConfigCache;
use crate::config::Settings;
use crate::core::leaderboard::{Leaderboard, NewLeaderboard};
use crate::deadline::bounded;
use crate::error::{Dependency, RankError, RankResult};
use crate::storage::LeaderboardStore;

/// Leaderboard configurations, cache-aside in front of the durable leaderboard store.
///
/// The durable store decides the outcome of every write; config cache failures are logged and
/// never fail the operation.
pub struct LeaderboardRegistry {
    store: Arc<dyn LeaderboardStore>,
    cache: Arc<dyn ConfigCache>,
    settings: Arc<Settings>,
}

impl LeaderboardRegistry {
    pub fn new(
        store: Arc<dyn LeaderboardStore>,
        cache: Arc<dyn ConfigCache>,
        settings: Arc<Settings>,
    ) -> Self {
        LeaderboardRegistry {
            store,
            cache,
            settings,
        }
    }

    pub async fn create(&self, request: NewLeaderboard) -> RankResult<Leaderboard> {
        request.validate()?;
        let id = request
            .id
            .clone()
            .unwrap_or_else(|| Leaderboard::generate_id(&request.game_id, request.kind));

        let mut config = request.config;
        if config.timezone.is_empty() {
            config.timezone = self.settings.default_timezone.clone();
        }
        let now = chrono::Utc::now();
        let leaderboard = Leaderboard {
            id,
            name: request.name,
            game_id: request.game_id,
            kind: request.kind,
            sort_order: request.sort_order,
            max_entries: request
                .max_entries
                .filter(|max| *max > 0)
                .unwrap_or(self.settings.default_max_entries),
            config,
            created_at: now,
            updated_at: now,
            is_active: true,
        };

        let leaderboard = bounded(
            Dependency::LeaderboardStore,
            self.settings.store_timeout(),
            self.store.insert(leaderboard),
        )
        .await?;
        self.populate(&leaderboard).await;

        info!(
            leaderboard_id = %leaderboard.id,
            name = %leaderboard.name,
            kind = %leaderboard.kind,
            "Leaderboard created"
        );
        Ok(leaderboard)
    }

    pub async fn get(&self, leaderboard_id: &str) -> RankResult<Leaderboard> {
        match self.cached(leaderboard_id).await {
            Ok(Some(leaderboard)) => return Ok(leaderboard),
            Ok(None) => debug!(leaderboard_id, "Leaderboard config cache miss"),
            Err(e) => warn!(leaderboard_id, error = %e, "Leaderboard config cache unusable"),
        }

        let leaderboard = bounded(
            Dependency::LeaderboardStore,
            self.settings.store_timeout(),
            self.store.get(leaderboard_id),
        )
        .await?;
        self.populate(&leaderboard).await;
        Ok(leaderboard)
    }

    pub async fn update(&self, leaderboard: &Leaderboard) -> RankResult<Leaderboard> {
        if leaderboard.max_entries <= 0 {
            return Err(RankError::Validation(
                "max_entries must be greater than 0".to_string(),
            ));
        }
        let stored = bounded(
            Dependency::LeaderboardStore,
            self.settings.store_timeout(),
            self.store.update(leaderboard),
        )
        .await?;
        match stored.is_active {
            true => self.populate(&stored).await,
            false => self.invalidate(&stored.id).await,
        }
        info!(leaderboard_id = %stored.id, "Leaderboard updated");
        Ok(stored)
    }

    pub async fn delete(&self, leaderboard_id: &str) -> RankResult<()> {
        bounded(
            Dependency::LeaderboardStore,
            self.settings.store_timeout(),
            self.store.soft_delete(leaderboard_id),
        )
        .await?;
        self.invalidate(leaderboard_id).await;
        info!(leaderboard_id, "Leaderboard deleted");
        Ok(())
    }

    /// Durable store only, newest first.
    pub async fn list(
        &self,
        game_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> RankResult<(Vec<Leaderboard>, u64)> {
        bounded(
            Dependency::LeaderboardStore,
            self.settings.store_timeout(),
            self.store.list(game_id, limit, offset),
        )
        .await
    }

    /// Drops the cached config, best effort.
    pub async fn invalidate(&self, leaderboard_id: &str) {
        let result = bounded(
            Dependency::ConfigCache,
            self.settings.cache_timeout(),
            self.cache.invalidate(leaderboard_id),
        )
        .await;
        if let Err(e) = result {
            warn!(leaderboard_id, error = %e, "Could not invalidate leaderboard config cache");
        }
    }

    pub async fn evict_expired(&self) -> RankResult<usize> {
        bounded(
            Dependency::ConfigCache,
            self.settings.cache_timeout(),
            self.cache.evict_expired(),
        )
        .await
    }

    pub async fn check_store(&self) -> RankResult<()> {
        bounded(
            Dependency::LeaderboardStore,
            self.settings.store_timeout(),
            self.store.health_check(),
        )
        .await
    }

    pub async fn check_cache(&self) -> RankResult<()> {
        bounded(
            Dependency::ConfigCache,
            self.settings.cache_timeout(),
            self.cache.health_check(),
        )
        .await
    }

    async fn cached(&self, leaderboard_id: &str) -> RankResult<Option<Leaderboard>> {
        let payload = bounded(
            Dependency::ConfigCache,
            self.settings.cache_timeout(),
            self.cache.get(leaderboard_id),
        )
        .await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn populate(&self, leaderboard: &Leaderboard) {
        let payload = match serde_json::to_string(leaderboard) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(leaderboard_id = %leaderboard.id, error = %e, "Could not serialize leaderboard config");
                return;
            }
        };
        let result = bounded(
            Dependency::ConfigCache,
            self.settings.cache_timeout(),
            self.cache.set(&leaderboard.id, payload),
        )
        .await;
        if let Err(e) = result {
            warn!(leaderboard_id = %leaderboard.id, error = %e, "Could not cache leaderboard config");
        }
    }
}
