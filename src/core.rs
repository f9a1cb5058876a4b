pub mod commands;
pub mod display;
pub mod leaderboard;
pub mod ranking;
pub mod registry;
pub mod templates;
