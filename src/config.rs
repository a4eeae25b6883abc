use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use crate::context::ContextOptions;
use crate::elo::{EloConfig, INITIAL_RATING};
use crate::game_log::season_start;
use crate::predict_job::JobConfig;

/// Batch feature and prediction pipeline for NBA games
#[derive(Parser, Debug, Clone)]
#[command(name = "statistiq", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, env = "STATISTIQ_DB_PATH", default_value = "statistiq.sqlite", global = true)]
    pub db_path: PathBuf,

    /// Team directory CSV (Team,ID[,Abbreviation]); the built-in table is used when unset
    #[arg(long, env = "STATISTIQ_TEAMS_CSV", global = true)]
    pub teams_csv: Option<PathBuf>,

    /// Feature medians JSON used for imputation
    #[arg(
        long,
        env = "STATISTIQ_MEDIANS_PATH",
        default_value = "feature_medians.json",
        global = true
    )]
    pub medians_path: PathBuf,

    /// Season to work on, by starting year; defaults to the current season
    #[arg(long, env = "STATISTIQ_SEASON", global = true)]
    pub season: Option<i32>,

    /// Elo K-factor
    #[arg(long, env = "ELO_K", default_value = "20.0", global = true)]
    pub elo_k: f64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load game-log and schedule CSVs into the database
    Ingest(IngestArgs),
    /// Score upcoming scheduled games and store the predictions
    Predict(PredictArgs),
    /// Print the feature vector for one matchup
    Features(FeaturesArgs),
    /// Write the historical training frame and refresh the medians table
    Export(ExportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Game-log CSV in league-game-finder layout
    #[arg(long)]
    pub games: Option<PathBuf>,

    /// Schedule CSV (game_id,home_team_id,away_team_id,start_time[,venue])
    #[arg(long)]
    pub schedule: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Directory holding the model artifact JSON files
    #[arg(long, env = "STATISTIQ_MODELS_DIR", default_value = "models")]
    pub models_dir: PathBuf,

    /// How far ahead to look for scheduled games, in hours
    #[arg(long, env = "PREDICT_HORIZON_HOURS", default_value = "48")]
    pub horizon_hours: i64,

    /// Minimum age of a stored prediction before it is recomputed, in hours
    #[arg(long, env = "PREDICT_REFRESH_HOURS", default_value = "24")]
    pub refresh_hours: i64,

    /// Keep schedule rows that started before today
    #[arg(long)]
    pub keep_stale: bool,

    /// Compute and log predictions without writing them
    #[arg(long, env = "DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// Treat this RFC 3339 instant as "now"
    #[arg(long)]
    pub now: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FeaturesArgs {
    /// Home team, by name or abbreviation
    #[arg(long)]
    pub home: String,

    /// Away team, by name or abbreviation
    #[arg(long)]
    pub away: String,

    /// Print the raw vector without median imputation
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Output workbook path
    #[arg(long, default_value = "training_frame.xlsx")]
    pub out: PathBuf,

    /// Do not overwrite the medians table
    #[arg(long)]
    pub skip_medians: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.elo_k > 0.0 && self.elo_k.is_finite()) {
            anyhow::bail!("elo_k must be a positive number");
        }
        match &self.command {
            Command::Ingest(args) => {
                if args.games.is_none() && args.schedule.is_none() {
                    anyhow::bail!("ingest needs --games and/or --schedule");
                }
            }
            Command::Predict(args) => {
                if args.horizon_hours <= 0 {
                    anyhow::bail!("horizon_hours must be positive");
                }
                if args.refresh_hours < 0 {
                    anyhow::bail!("refresh_hours must not be negative");
                }
                if let Some(now) = &args.now
                    && DateTime::parse_from_rfc3339(now).is_err()
                {
                    anyhow::bail!("--now must be an RFC 3339 timestamp, got {now:?}");
                }
            }
            Command::Features(args) => {
                if args.home.trim().is_empty() || args.away.trim().is_empty() {
                    anyhow::bail!("--home and --away must both be set");
                }
            }
            Command::Export(_) => {}
        }
        Ok(())
    }

    pub fn elo(&self) -> EloConfig {
        EloConfig {
            k: self.elo_k,
            initial: INITIAL_RATING,
            home_adv_pts: 0.0,
        }
    }

    pub fn season_for(&self, now: DateTime<Utc>) -> i32 {
        self.season.unwrap_or_else(|| season_start(now.date_naive()))
    }

    pub fn context_options(&self, now: DateTime<Utc>) -> ContextOptions {
        ContextOptions {
            season_start: self.season_for(now),
            teams_csv: self.teams_csv.clone(),
            medians_path: Some(self.medians_path.clone()),
            elo: self.elo(),
        }
    }
}

impl PredictArgs {
    pub fn now(&self) -> DateTime<Utc> {
        self.now
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now)
    }

    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            horizon: chrono::Duration::hours(self.horizon_hours),
            refresh_after: chrono::Duration::hours(self.refresh_hours),
            purge_stale: !self.keep_stale,
            dry_run: self.dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_defaults_match_batch_window() {
        let cfg = Config::try_parse_from(["statistiq", "predict"]).unwrap();
        cfg.validate().unwrap();
        let Command::Predict(args) = &cfg.command else {
            panic!("expected predict");
        };
        let job = args.job_config();
        assert_eq!(job.horizon, chrono::Duration::days(2));
        assert_eq!(job.refresh_after, chrono::Duration::hours(24));
        assert!(job.purge_stale);
        assert_eq!(cfg.elo().k, 20.0);
    }

    #[test]
    fn ingest_without_inputs_is_rejected() {
        let cfg = Config::try_parse_from(["statistiq", "ingest"]).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_now_is_rejected() {
        let cfg = Config::try_parse_from(["statistiq", "predict", "--now", "tomorrow"]).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn season_defaults_from_date() {
        let cfg = Config::try_parse_from(["statistiq", "export"]).unwrap();
        let jan = DateTime::parse_from_rfc3339("2026-01-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(cfg.season_for(jan), 2025);
    }
}
