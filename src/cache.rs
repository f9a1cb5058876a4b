pub mod config;
pub mod ranking;

pub use config::{ConfigCache, MemoryConfigCache};
pub use ranking::{MemoryRankingCache, RankingCache};
