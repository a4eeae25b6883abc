use std::collections::HashMap;

use chrono::NaiveDate;

use crate::game_log::PlayedGame;
use crate::team_directory::TeamId;

pub const INITIAL_RATING: f64 = 1500.0;

#[derive(Debug, Clone, Copy)]
pub struct EloConfig {
    pub k: f64,
    pub initial: f64,
    pub home_adv_pts: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 20.0,
            initial: INITIAL_RATING,
            home_adv_pts: 0.0,
        }
    }
}

/// Ratings both sides carried into one game, and how the game moved them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EloSnapshot {
    pub game_id: u64,
    pub date: NaiveDate,
    pub home: TeamId,
    pub away: TeamId,
    pub home_pre: f64,
    pub away_pre: f64,
    pub expected_home: f64,
    pub delta: f64,
}

impl EloSnapshot {
    pub fn home_post(&self) -> f64 {
        self.home_pre + self.delta
    }

    pub fn away_post(&self) -> f64 {
        self.away_pre - self.delta
    }

    pub fn diff(&self) -> f64 {
        self.home_pre - self.away_pre
    }
}

#[derive(Debug, Clone, Default)]
pub struct EloTracker {
    cfg: EloConfig,
    ratings: HashMap<TeamId, f64>,
}

impl EloTracker {
    pub fn new(cfg: EloConfig) -> Self {
        Self {
            cfg,
            ratings: HashMap::new(),
        }
    }

    pub fn rating(&self, team: TeamId) -> f64 {
        self.ratings.get(&team).copied().unwrap_or(self.cfg.initial)
    }

    pub fn ratings(&self) -> &HashMap<TeamId, f64> {
        &self.ratings
    }

    /// Applies one game. The returned snapshot holds the pre-game ratings,
    /// which are the values safe to use as features for that game.
    pub fn apply(&mut self, game: &PlayedGame) -> EloSnapshot {
        let home = game.home.team;
        let away = game.away.team;
        let eh = self.rating(home);
        let ea = self.rating(away);

        let expected_home = expected_score(eh + self.cfg.home_adv_pts, ea);
        let actual = if game.home_won() { 1.0 } else { 0.0 };
        let delta = self.cfg.k * (actual - expected_home);

        self.ratings.insert(home, eh + delta);
        self.ratings.insert(away, ea - delta);

        EloSnapshot {
            game_id: game.game_id,
            date: game.date,
            home,
            away,
            home_pre: eh,
            away_pre: ea,
            expected_home,
            delta,
        }
    }

    /// Replays games in (date, game id) order, one snapshot per game.
    pub fn replay(&mut self, games: &[PlayedGame]) -> Vec<EloSnapshot> {
        let mut ordered: Vec<&PlayedGame> = games.iter().collect();
        ordered.sort_by(|a, b| a.date.cmp(&b.date).then(a.game_id.cmp(&b.game_id)));
        ordered.into_iter().map(|g| self.apply(g)).collect()
    }

    /// Pre-game ratings for an upcoming matchup, read from the current map.
    pub fn matchup(&self, home: TeamId, away: TeamId) -> (f64, f64) {
        (self.rating(home), self.rating(away))
    }
}

pub fn replay_season(games: &[PlayedGame], cfg: EloConfig) -> (EloTracker, Vec<EloSnapshot>) {
    let mut tracker = EloTracker::new(cfg);
    let snapshots = tracker.replay(games);
    (tracker, snapshots)
}

pub fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf(-(r_a - r_b) / 400.0))
}
