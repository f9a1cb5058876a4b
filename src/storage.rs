pub mod history;
pub mod leaderboards;

pub use history::{MemoryScoreHistory, ScoreHistory};
pub use leaderboards::{LeaderboardStore, MemoryLeaderboardStore};
