use crate::core::leaderboard::{Leaderboard, RankingEntry};
use itertools::Itertools;

// Display rankings as an aligned table
pub fn rankings(entries: &[RankingEntry]) -> String {
    // the width of the largest rank, plus one for ')'
    let width_rank = 1 + entries
        .iter()
        .map(|entry| entry.rank.to_string().len())
        .max()
        .unwrap_or_default();

    let width_name = entries
        .iter()
        .map(|entry| entry.user_id.len())
        .max()
        .unwrap_or_default();

    let width_score = entries
        .iter()
        .map(|entry| entry.score.to_string().len())
        .max()
        .unwrap_or_default();

    entries
        .iter()
        .map(|entry| {
            format!(
                "{:>width_rank$} {:<width_name$} {:>width_score$}",
                format!("{})", entry.rank),
                entry.user_id,
                entry.score,
            )
            .trim_end()
            .to_string()
        })
        .join("\n")
}

// Display leaderboards, one per line
pub fn leaderboards(entries: &[Leaderboard]) -> String {
    let width_id = entries
        .iter()
        .map(|lb| lb.id.len())
        .max()
        .unwrap_or_default();

    entries
        .iter()
        .map(|lb| {
            format!(
                "{:<width_id$} {:<7} {:<4} {}",
                lb.id,
                lb.kind.to_string(),
                lb.sort_order.to_string(),
                lb.name
            )
        })
        .join("\n")
}
