// crates/server/src/rankings.rs
//! Season-long player ranking aggregation.
//!
//! The representative multi-second worker driven through the job scheduler:
//! it folds per-week scoring into season totals, reporting one progress
//! tick per completed week. The per-week numbers come from a deterministic
//! local model rather than the upstream stat providers — the scheduler
//! treats the worker as opaque either way.

use crate::jobs::ProgressReporter;

/// Name, position, baseline fantasy points per week.
const PLAYERS: &[(&str, &str, f64)] = &[
    ("J. Chase", "WR", 14.2),
    ("C. McCaffrey", "RB", 16.8),
    ("J. Allen", "QB", 19.4),
    ("T. Hill", "WR", 13.9),
    ("L. Jackson", "QB", 20.1),
    ("S. Barkley", "RB", 15.7),
    ("A. St. Brown", "WR", 13.1),
    ("T. Kelce", "TE", 11.6),
    ("J. Jefferson", "WR", 14.8),
    ("D. Henry", "RB", 14.5),
    ("J. Gibbs", "RB", 13.8),
    ("G. Kittle", "TE", 10.9),
];

/// Number of aggregation units (weeks) for a scope. Also used as the job's
/// `total` so progress reads as weeks-done out of weeks-total.
pub fn weeks_in_scope(scope: &str) -> u64 {
    if scope.eq_ignore_ascii_case("post") {
        4
    } else {
        18
    }
}

/// Build the full-season ranking table, one week at a time.
pub async fn season_player_rankings(
    season: u32,
    scope: String,
    reporter: ProgressReporter,
) -> anyhow::Result<serde_json::Value> {
    let weeks = weeks_in_scope(&scope);
    let mut totals = vec![0.0f64; PLAYERS.len()];

    for week in 1..=weeks {
        for (slot, (name, _position, base)) in PLAYERS.iter().enumerate() {
            totals[slot] += week_points(season, week, name, *base);
        }
        // Yield between weeks so other handlers stay responsive while the
        // aggregation grinds.
        tokio::task::yield_now().await;
        reporter.report(week);
    }

    let mut rows: Vec<(usize, f64)> = totals.iter().copied().enumerate().collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));

    let rankings: Vec<serde_json::Value> = rows
        .into_iter()
        .enumerate()
        .map(|(rank, (slot, points))| {
            let (name, position, _) = PLAYERS[slot];
            serde_json::json!({
                "rank": rank + 1,
                "player": name,
                "position": position,
                "points": (points * 10.0).round() / 10.0,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "season": season,
        "scope": scope.to_ascii_lowercase(),
        "weeks": weeks,
        "rankings": rankings,
    }))
}

/// Deterministic per-week spread around a player's baseline, so the same
/// (season, scope) always ranks the same.
fn week_points(season: u32, week: u64, name: &str, base: f64) -> f64 {
    let mut h = (season as u64).wrapping_mul(31).wrapping_add(week);
    for byte in name.bytes() {
        h = h.wrapping_mul(131).wrapping_add(byte as u64);
    }
    base + (h % 200) as f64 / 10.0
}
