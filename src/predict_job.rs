use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::context::PipelineContext;
use crate::models::{GamePrediction, ModelSet};
use crate::store::{self, ScheduledGame};

/// Hour of day (UTC) before which today's schedule rows count as stale.
pub const STALE_CUTOFF_HOUR: u32 = 4;

#[derive(Debug, Clone, Copy)]
pub struct JobConfig {
    pub horizon: Duration,
    pub refresh_after: Duration,
    pub purge_stale: bool,
    pub dry_run: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            horizon: Duration::days(2),
            refresh_after: Duration::hours(24),
            purge_stale: true,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub purged: usize,
    pub considered: usize,
    pub skipped_recent: usize,
    pub predicted: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Start of the purge window: today at [`STALE_CUTOFF_HOUR`].
pub fn stale_cutoff(now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    now.date_naive()
        .and_hms_opt(STALE_CUTOFF_HOUR, 0, 0)
        .map(|t| t.and_utc())
        .ok_or_else(|| anyhow!("cannot build stale cutoff for {now}"))
}

/// True when the stored prediction is younger than `refresh_after`.
pub fn recently_updated(game: &ScheduledGame, now: DateTime<Utc>, refresh_after: Duration) -> bool {
    game.updated_at
        .is_some_and(|updated| now.signed_duration_since(updated) < refresh_after)
}

pub fn predict_game(
    ctx: &PipelineContext<'_>,
    models: &ModelSet,
    game: &ScheduledGame,
) -> Result<GamePrediction> {
    let features = ctx.features_for(game.home, game.away)?;
    let missing = features.missing();
    if !missing.is_empty() {
        debug!(
            game_id = game.game_id,
            missing = missing.len(),
            "features still missing after imputation"
        );
    }
    Ok(models.predict(&features)?)
}

/// Scores every scheduled game in `[now, now + horizon]` and writes the
/// predictions back. A failing game is logged and counted; the batch goes on.
pub fn run(
    conn: &Connection,
    ctx: &PipelineContext<'_>,
    models: &ModelSet,
    now: DateTime<Utc>,
    cfg: &JobConfig,
) -> Result<JobSummary> {
    let mut summary = JobSummary::default();

    if cfg.purge_stale && !cfg.dry_run {
        let cutoff = stale_cutoff(now)?;
        summary.purged = store::delete_schedule_before(conn, cutoff)?;
        if summary.purged > 0 {
            info!(purged = summary.purged, %cutoff, "removed stale schedule rows");
        }
    }

    let games = store::scheduled_between(conn, now, now + cfg.horizon)?;
    summary.considered = games.len();
    info!(games = games.len(), from = %now, "scheduled games in window");

    for game in &games {
        if recently_updated(game, now, cfg.refresh_after) {
            debug!(game_id = game.game_id, "skipping: predictions updated recently");
            summary.skipped_recent += 1;
            continue;
        }

        let prediction = match predict_game(ctx, models, game) {
            Ok(p) => p,
            Err(err) => {
                warn!(game_id = game.game_id, error = %err, "prediction failed");
                summary.failed += 1;
                summary.errors.push(format!("game {}: {err:#}", game.game_id));
                continue;
            }
        };

        if cfg.dry_run {
            info!(
                game_id = game.game_id,
                home = %game.home,
                away = %game.away,
                win_prob_home = prediction.win_probability.home,
                margin = prediction.expected_margin,
                "dry run prediction"
            );
        } else if let Err(err) = store::write_prediction(conn, game.game_id, &prediction, now) {
            warn!(game_id = game.game_id, error = %err, "writing prediction failed");
            summary.failed += 1;
            summary.errors.push(format!("game {}: {err:#}", game.game_id));
            continue;
        }
        summary.predicted += 1;
    }

    info!(
        considered = summary.considered,
        predicted = summary.predicted,
        skipped = summary.skipped_recent,
        failed = summary.failed,
        "prediction batch finished"
    );
    Ok(summary)
}
