//! Head-to-head scoring averages.
//!
//! Rows are matched by searching for the opponent's code anywhere in the
//! matchup text. This is a plain substring test: a code that is contained
//! in another code (or in the team's own code) also matches. Callers that
//! need exact opponent matching should filter on `GameRecord::opponent`
//! instead; this module keeps the substring semantics the stored features
//! were built with.

use crate::game_log::GameRecord;

/// Indices of `games` whose matchup text mentions `opponent_code`.
pub fn matching_rows(games: &[&GameRecord], opponent_code: &str) -> Vec<usize> {
    if opponent_code.is_empty() {
        return Vec::new();
    }
    games
        .iter()
        .enumerate()
        .filter(|(_, g)| g.matchup.contains(opponent_code))
        .map(|(idx, _)| idx)
        .collect()
}

/// Mean points the team scored in rows mentioning `opponent_code`, or
/// `fallback` (normally the team's overall average) when none match.
pub fn head_to_head_avg(games: &[&GameRecord], opponent_code: &str, fallback: f64) -> f64 {
    head_to_head_avg_before(games, opponent_code, games.len(), fallback)
}

/// Same as [`head_to_head_avg`] restricted to positions `< i`.
pub fn head_to_head_avg_before(
    games: &[&GameRecord],
    opponent_code: &str,
    i: usize,
    fallback: f64,
) -> f64 {
    let prior = &games[..i.min(games.len())];
    let rows = matching_rows(prior, opponent_code);
    if rows.is_empty() {
        return fallback;
    }
    let total: f64 = rows.iter().map(|idx| prior[*idx].points as f64).sum();
    total / rows.len() as f64
}
