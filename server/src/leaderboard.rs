//! Leaderboard projection.
//!
//! Views are recomputed from the roster on every call; sessions are capped at
//! 30 players, so a fresh sort is always cheaper than keeping an incremental
//! structure correct. The sort is stable, which makes the tie-break the
//! roster's join order.

use crate::session::Player;
use shared::{LeaderboardEntry, PlayerSummary, RankedEntry};

/// Ranked view broadcast after joins, answers, and disconnects.
pub fn project(players: &[Player]) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = players
        .iter()
        .map(|p| LeaderboardEntry {
            name: p.name.clone(),
            score: p.score,
        })
        .collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries
}

/// Final ranked view with explicit 1-based positions, sent once on session
/// end.
pub fn project_final(players: &[Player]) -> Vec<RankedEntry> {
    project(players)
        .into_iter()
        .enumerate()
        .map(|(i, entry)| RankedEntry {
            position: i + 1,
            name: entry.name,
            score: entry.score,
        })
        .collect()
}

/// Roster snapshot in join order, for the player-list view.
pub fn roster_snapshot(players: &[Player]) -> Vec<PlayerSummary> {
    players
        .iter()
        .map(|p| PlayerSummary {
            name: p.name.clone(),
            score: p.score,
        })
        .collect()
}
