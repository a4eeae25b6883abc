use std::path::PathBuf;

use anyhow::{Context, Result};
use once_cell::unsync::OnceCell;
use tracing::{debug, warn};

use crate::elo::{EloConfig, EloTracker};
use crate::features::{FeatureMedians, FeatureVector, MatchupInputs};
use crate::game_log::GameLog;
use crate::head_to_head::head_to_head_avg;
use crate::rolling::TeamForm;
use crate::team_directory::{TeamDirectory, TeamId};

/// Where a run's game log comes from.
pub trait GameLogSource {
    fn load_season_log(&self, season_start: i32) -> Result<GameLog>;
}

impl GameLogSource for GameLog {
    fn load_season_log(&self, season_start: i32) -> Result<GameLog> {
        Ok(self.season(season_start))
    }
}

#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub season_start: i32,
    pub teams_csv: Option<PathBuf>,
    pub medians_path: Option<PathBuf>,
    pub elo: EloConfig,
}

/// Per-run lookups, each loaded on first use and kept until the context
/// is dropped. Build one per batch run.
pub struct PipelineContext<'a> {
    source: &'a dyn GameLogSource,
    opts: ContextOptions,
    teams: OnceCell<TeamDirectory>,
    season_log: OnceCell<GameLog>,
    medians: OnceCell<FeatureMedians>,
    elo: OnceCell<EloTracker>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(source: &'a dyn GameLogSource, opts: ContextOptions) -> Self {
        Self {
            source,
            opts,
            teams: OnceCell::new(),
            season_log: OnceCell::new(),
            medians: OnceCell::new(),
            elo: OnceCell::new(),
        }
    }

    pub fn with_teams(self, teams: TeamDirectory) -> Self {
        let _ = self.teams.set(teams);
        self
    }

    pub fn with_medians(self, medians: FeatureMedians) -> Self {
        let _ = self.medians.set(medians);
        self
    }

    pub fn season_start(&self) -> i32 {
        self.opts.season_start
    }

    pub fn teams(&self) -> Result<&TeamDirectory> {
        self.teams.get_or_try_init(|| match &self.opts.teams_csv {
            Some(path) => TeamDirectory::load_csv(path),
            None => Ok(TeamDirectory::builtin()),
        })
    }

    pub fn season_log(&self) -> Result<&GameLog> {
        self.season_log.get_or_try_init(|| {
            let log = self
                .source
                .load_season_log(self.opts.season_start)
                .with_context(|| format!("load season log {}", self.opts.season_start))?;
            debug!(
                season = self.opts.season_start,
                rows = log.len(),
                "season log loaded"
            );
            Ok(log)
        })
    }

    /// An absent medians file is not fatal: fields then pass through
    /// unimputed.
    pub fn medians(&self) -> Result<&FeatureMedians> {
        self.medians.get_or_try_init(|| match &self.opts.medians_path {
            Some(path) if path.exists() => FeatureMedians::load_json(path),
            Some(path) => {
                warn!(path = %path.display(), "feature medians file not found");
                Ok(FeatureMedians::default())
            }
            None => Ok(FeatureMedians::default()),
        })
    }

    pub fn elo(&self) -> Result<&EloTracker> {
        self.elo.get_or_try_init(|| {
            let log = self.season_log()?;
            let mut tracker = EloTracker::new(self.opts.elo);
            let snapshots = tracker.replay(&log.paired_games());
            debug!(games = snapshots.len(), "elo replay finished");
            Ok(tracker)
        })
    }

    pub fn team_form(&self, team: TeamId) -> Result<TeamForm> {
        let games = self.season_log()?.team_games(team);
        Ok(TeamForm::latest(&games))
    }

    pub fn matchup_inputs(&self, home: TeamId, away: TeamId) -> Result<MatchupInputs> {
        let teams = self.teams()?;
        let log = self.season_log()?;
        let home_games = log.team_games(home);
        let away_games = log.team_games(away);
        let home_form = TeamForm::latest(&home_games);
        let away_form = TeamForm::latest(&away_games);
        let (home_elo, away_elo) = self.elo()?.matchup(home, away);

        let home_h2h_avg =
            head_to_head_avg(&home_games, teams.abbreviation(away)?, home_form.avg_points);
        let away_h2h_avg =
            head_to_head_avg(&away_games, teams.abbreviation(home)?, away_form.avg_points);

        Ok(MatchupInputs {
            home: home_form,
            away: away_form,
            home_elo,
            away_elo,
            home_h2h_avg,
            away_h2h_avg,
        })
    }

    /// Model-ready features for an upcoming matchup, with medians applied.
    pub fn features_for(&self, home: TeamId, away: TeamId) -> Result<FeatureVector> {
        let raw = FeatureVector::assemble(&self.matchup_inputs(home, away)?);
        Ok(raw.impute(self.medians()?))
    }
}
