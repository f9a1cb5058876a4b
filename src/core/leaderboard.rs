use crate::error::{RankError, RankResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap, str::FromStr};
use strum::{Display, EnumIter, EnumString};

pub type Metadata = HashMap<String, Value>;

// Source tag of submissions that do not name one
const DEFAULT_SOURCE: &str = "game";

/// Which end of the score range is "better". Descending ranks the highest score first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum SortOrder {
    #[serde(rename = "asc", alias = "ascending")]
    #[strum(to_string = "asc", serialize = "ascending")]
    Ascending,
    #[serde(rename = "desc", alias = "descending")]
    #[strum(to_string = "desc", serialize = "descending")]
    Descending,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LeaderboardType {
    Global,
    Daily,
    Weekly,
    Monthly,
    Season,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDecay {
    pub enabled: bool,
    // fraction of the score lost per day
    pub decay_rate: f64,
    pub min_score: i64,
    // days before the decay kicks in
    pub decay_start: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardBand {
    pub rank_start: u64,
    pub rank_end: u64,
    pub rewards: Value,
}

/// Free-form configuration, carried with the leaderboard but never evaluated by the ranking core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_day: Option<u8>,
    #[serde(default)]
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_decay: Option<ScoreDecay>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewards: Vec<RewardBand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub id: String,
    pub name: String,
    pub game_id: String,
    pub kind: LeaderboardType,
    pub sort_order: SortOrder,
    pub max_entries: i64,
    pub config: LeaderboardConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Creation request. `id` is only set when the caller wants an explicit identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLeaderboard {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub game_id: String,
    pub kind: LeaderboardType,
    pub sort_order: SortOrder,
    #[serde(default)]
    pub max_entries: Option<i64>,
    #[serde(default)]
    pub config: LeaderboardConfig,
}

/// One immutable submission event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: uuid::Uuid,
    pub leaderboard_id: String,
    pub user_id: String,
    pub score: i64,
    // latest score this submission supersedes, 0 for a first submission
    pub previous_score: i64,
    pub source: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    pub submitted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    #[serde(default)]
    pub leaderboard_id: String,
    pub user_id: String,
    pub score: i64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A ranked line. The rank is positional and recomputed on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub user_id: String,
    pub score: i64,
    pub rank: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// Result of a single submission. Ranks are 1-based, 0 means unranked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankSnapshot {
    pub user_id: String,
    pub score: i64,
    pub previous_score: i64,
    pub rank: u64,
    pub previous_rank: u64,
    // positive when the user moved toward rank 1
    pub rank_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub index: usize,
    pub user_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSubmitResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<RankSnapshot>,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRank {
    pub user_id: String,
    pub score: i64,
    pub rank: u64,
    pub total_users: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardStats {
    pub leaderboard_id: String,
    pub total_users: u64,
    pub total_scores: u64,
    pub highest_score: Option<i64>,
    pub lowest_score: Option<i64>,
    pub average_score: Option<f64>,
}

impl SortOrder {
    pub fn parse(input: &str) -> RankResult<Self> {
        SortOrder::from_str(input)
            .map_err(|_| RankError::Validation(format!("Invalid sort order '{input}'")))
    }

    /// Orders two scores so that the better one comes first.
    pub fn compare(&self, a: i64, b: i64) -> Ordering {
        match self {
            SortOrder::Descending => b.cmp(&a),
            SortOrder::Ascending => a.cmp(&b),
        }
    }

    /// Whether `score` strictly outranks `other`.
    pub fn outranks(&self, score: i64, other: i64) -> bool {
        self.compare(score, other) == Ordering::Less
    }
}

impl LeaderboardType {
    pub fn parse(input: &str) -> RankResult<Self> {
        LeaderboardType::from_str(input)
            .map_err(|_| RankError::Validation(format!("Invalid leaderboard type '{input}'")))
    }
}

impl Leaderboard {
    /// Globally unique id built from game and type plus a random suffix, so that concurrent
    /// creators never need to coordinate.
    pub fn generate_id(game_id: &str, kind: LeaderboardType) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}_{}", game_id, kind, &suffix[..8])
    }
}

impl NewLeaderboard {
    pub fn new(name: &str, game_id: &str, kind: LeaderboardType, sort_order: SortOrder) -> Self {
        NewLeaderboard {
            id: None,
            name: name.to_string(),
            game_id: game_id.to_string(),
            kind,
            sort_order,
            max_entries: None,
            config: LeaderboardConfig::default(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_max_entries(mut self, max_entries: i64) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn validate(&self) -> RankResult<()> {
        if self.name.trim().is_empty() {
            return Err(RankError::Validation("Leaderboard name is required".into()));
        }
        if self.game_id.trim().is_empty() {
            return Err(RankError::Validation("Game id is required".into()));
        }
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(RankError::Validation("Explicit id must not be empty".into()));
            }
        }
        Ok(())
    }
}

impl ScoreRecord {
    pub fn new(submission: &ScoreSubmission, previous_score: i64) -> Self {
        let now = Utc::now();
        ScoreRecord {
            id: uuid::Uuid::new_v4(),
            leaderboard_id: submission.leaderboard_id.clone(),
            user_id: submission.user_id.clone(),
            score: submission.score,
            previous_score,
            source: submission
                .source
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            metadata: submission.metadata.clone(),
            submitted_at: now,
            created_at: now,
        }
    }
}

impl ScoreSubmission {
    pub fn new(leaderboard_id: &str, user_id: &str, score: i64) -> Self {
        ScoreSubmission {
            leaderboard_id: leaderboard_id.to_string(),
            user_id: user_id.to_string(),
            score,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> RankResult<()> {
        if self.leaderboard_id.trim().is_empty() {
            return Err(RankError::Validation("Leaderboard id is required".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(RankError::Validation("User id is required".into()));
        }
        if self.score < 0 {
            return Err(RankError::Validation(format!(
                "Score must not be negative, got {}",
                self.score
            )));
        }
        Ok(())
    }
}

impl RankSnapshot {
    pub fn new(user_id: &str, score: i64, previous_score: i64, rank: u64, previous_rank: u64) -> Self {
        RankSnapshot {
            user_id: user_id.to_string(),
            score,
            previous_score,
            rank,
            previous_rank,
            rank_delta: rank_delta(previous_rank, rank),
        }
    }
}

/// Signed move between two ranks, only meaningful when both are known.
pub fn rank_delta(previous_rank: u64, new_rank: u64) -> i64 {
    match (previous_rank, new_rank) {
        (0, _) | (_, 0) => 0,
        (previous, new) => previous as i64 - new as i64,
    }
}

/// 0-based inclusive index window of `count / 2` entries on each side of a 1-based `rank`.
/// The window is clamped at both edges instead of being shifted.
pub fn window_around(rank: u64, count: u64, len: u64) -> Option<(u64, u64)> {
    if rank == 0 || len == 0 {
        return None;
    }
    let half = count / 2;
    let start = rank.saturating_sub(half + 1);
    let end = (rank - 1 + half).min(len - 1);
    match start <= end {
        true => Some((start, end)),
        false => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_order_parsing() {
        assert_eq!(SortOrder::parse("desc").unwrap(), SortOrder::Descending);
        assert_eq!(SortOrder::parse("Ascending").unwrap(), SortOrder::Ascending);
        assert!(SortOrder::parse("sideways").is_err());
        assert_eq!(SortOrder::Descending.to_string(), "desc");
    }

    #[test]
    fn sort_order_serde_accepts_long_names() {
        let order: SortOrder = serde_json::from_str("\"descending\"").unwrap();
        assert_eq!(order, SortOrder::Descending);
        assert_eq!(serde_json::to_string(&SortOrder::Ascending).unwrap(), "\"asc\"");
    }

    #[test]
    fn outranks_depends_on_order() {
        assert!(SortOrder::Descending.outranks(300, 200));
        assert!(!SortOrder::Descending.outranks(200, 200));
        assert!(SortOrder::Ascending.outranks(10, 20));
    }

    #[test]
    fn generated_ids_carry_game_and_type() {
        let id = Leaderboard::generate_id("tetris", LeaderboardType::Weekly);
        assert!(id.starts_with("tetris_weekly_"));
        assert_eq!(id.len(), "tetris_weekly_".len() + 8);
        assert_ne!(id, Leaderboard::generate_id("tetris", LeaderboardType::Weekly));
    }

    #[test]
    fn rank_delta_needs_both_ranks() {
        assert_eq!(rank_delta(2, 1), 1);
        assert_eq!(rank_delta(1, 3), -2);
        assert_eq!(rank_delta(0, 1), 0);
        assert_eq!(rank_delta(4, 0), 0);
    }

    #[test]
    fn window_clamps_at_edges() {
        // two users, around rank 2 with count 4
        assert_eq!(window_around(2, 4, 2), Some((0, 1)));
        // centered in the middle of a long board
        assert_eq!(window_around(10, 4, 100), Some((7, 11)));
        // top of the board
        assert_eq!(window_around(1, 6, 100), Some((0, 3)));
        assert_eq!(window_around(0, 4, 10), None);
    }

    #[test]
    fn submission_validation() {
        assert!(ScoreSubmission::new("lb", "u1", 10).validate().is_ok());
        assert!(ScoreSubmission::new("lb", "", 10).validate().is_err());
        assert!(ScoreSubmission::new("lb", "u1", -1).validate().is_err());
        assert!(ScoreSubmission::new("", "u1", 1).validate().is_err());
    }
}
