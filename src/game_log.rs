use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::team_directory::{TeamDirectory, TeamId};

const FT_POSSESSION_WEIGHT: f64 = 0.44;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Venue {
    Home,
    Away,
}

/// One team's line from one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: u64,
    pub team: TeamId,
    pub opponent: TeamId,
    pub date: NaiveDate,
    pub season_id: Option<u32>,
    pub points: u32,
    pub fgm: u32,
    pub fga: u32,
    pub fta: u32,
    pub tov: u32,
    pub won: bool,
    pub matchup: String,
    pub venue: Venue,
    /// Filled when the opponent's row for the same game is present.
    pub opponent_points: Option<u32>,
}

impl GameRecord {
    /// `FGA + 0.44 * FTA + TOV`.
    pub fn possessions(&self) -> f64 {
        self.fga as f64 + FT_POSSESSION_WEIGHT * self.fta as f64 + self.tov as f64
    }
}

/// Both sides of one game, joined on game id.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedGame {
    pub game_id: u64,
    pub date: NaiveDate,
    pub home: GameRecord,
    pub away: GameRecord,
}

impl PlayedGame {
    /// Outcome as recorded by the home row's `WL` flag.
    pub fn home_won(&self) -> bool {
        self.home.won
    }
}

/// Result of parsing a raw game-log table. Rows that fail validation are
/// kept out of `records` and reported in `rejected`.
#[derive(Debug, Default)]
pub struct ParsedLog {
    pub records: Vec<GameRecord>,
    pub rejected: Vec<PipelineError>,
}

/// Time-ordered, team-indexed game log.
#[derive(Debug, Clone, Default)]
pub struct GameLog {
    records: Vec<GameRecord>,
    by_team: HashMap<TeamId, Vec<usize>>,
}

impl GameLog {
    pub fn from_records(mut records: Vec<GameRecord>) -> Self {
        records.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.game_id.cmp(&b.game_id))
                .then(a.team.cmp(&b.team))
        });
        let mut seen = HashSet::new();
        records.retain(|r| seen.insert((r.team, r.game_id)));
        fill_opponent_points(&mut records);

        let mut by_team: HashMap<TeamId, Vec<usize>> = HashMap::new();
        for (idx, r) in records.iter().enumerate() {
            by_team.entry(r.team).or_default().push(idx);
        }
        Self { records, by_team }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[GameRecord] {
        &self.records
    }

    pub fn teams(&self) -> Vec<TeamId> {
        let mut teams = self.by_team.keys().copied().collect::<Vec<_>>();
        teams.sort_unstable();
        teams
    }

    /// The team's rows in chronological order.
    pub fn team_games(&self, team: TeamId) -> Vec<&GameRecord> {
        self.by_team
            .get(&team)
            .map(|idxs| idxs.iter().map(|i| &self.records[*i]).collect())
            .unwrap_or_default()
    }

    /// Rows dated strictly before `date`.
    pub fn before(&self, date: NaiveDate) -> GameLog {
        GameLog::from_records(
            self.records
                .iter()
                .filter(|r| r.date < date)
                .cloned()
                .collect(),
        )
    }

    /// Rows belonging to the season that starts in `start_year`.
    pub fn season(&self, start_year: i32) -> GameLog {
        GameLog::from_records(
            self.records
                .iter()
                .filter(|r| season_start(r.date) == start_year)
                .cloned()
                .collect(),
        )
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// Joins the two rows of each game id into a home/away pair. Game ids
    /// without exactly one `vs.` row and one `@` row are skipped, as are
    /// pairs whose `WL` flags do not name exactly one winner.
    pub fn paired_games(&self) -> Vec<PlayedGame> {
        let mut grouped: BTreeMap<u64, Vec<&GameRecord>> = BTreeMap::new();
        for r in &self.records {
            grouped.entry(r.game_id).or_default().push(r);
        }

        let mut out = Vec::with_capacity(grouped.len());
        for (game_id, rows) in grouped {
            if rows.len() != 2 {
                continue;
            }
            let home = rows.iter().find(|r| r.venue == Venue::Home);
            let away = rows.iter().find(|r| r.venue == Venue::Away);
            let (Some(home), Some(away)) = (home, away) else {
                continue;
            };
            if home.won == away.won {
                continue;
            }
            out.push(PlayedGame {
                game_id,
                date: home.date,
                home: (*home).clone(),
                away: (*away).clone(),
            });
        }
        out.sort_by(|a, b| a.date.cmp(&b.date).then(a.game_id.cmp(&b.game_id)));
        out
    }
}

fn fill_opponent_points(records: &mut [GameRecord]) {
    let mut points: HashMap<(u64, TeamId), u32> = HashMap::with_capacity(records.len());
    for r in records.iter() {
        points.insert((r.game_id, r.team), r.points);
    }
    for r in records.iter_mut() {
        if r.opponent_points.is_none() {
            r.opponent_points = points.get(&(r.game_id, r.opponent)).copied();
        }
    }
}

/// NBA seasons start in the autumn: September onwards belongs to the
/// season starting that calendar year.
pub fn season_start(date: NaiveDate) -> i32 {
    if date.month() >= 9 {
        date.year()
    } else {
        date.year() - 1
    }
}

/// Splits `"BOS vs. NYK"` / `"NYK @ BOS"` into (team, venue, opponent).
pub fn parse_matchup(raw: &str) -> Option<(String, Venue, String)> {
    let raw = raw.trim();
    if let Some((team, opp)) = raw.split_once(" vs. ") {
        return Some((team.trim().to_string(), Venue::Home, opp.trim().to_string()));
    }
    if let Some((team, opp)) = raw.split_once(" @ ") {
        return Some((team.trim().to_string(), Venue::Away, opp.trim().to_string()));
    }
    None
}

struct Columns {
    season_id: Option<usize>,
    team_name: Option<usize>,
    team_abbreviation: Option<usize>,
    game_id: usize,
    game_date: usize,
    matchup: usize,
    wl: usize,
    pts: usize,
    fgm: usize,
    fga: usize,
    fta: usize,
    tov: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Result<Self, PipelineError> {
        let find = |name: &'static str| -> Option<usize> {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require =
            |name: &'static str| -> Result<usize, PipelineError> {
                find(name).ok_or(PipelineError::MissingColumn(name))
            };
        Ok(Self {
            season_id: find("SEASON_ID"),
            team_name: find("TEAM_NAME"),
            team_abbreviation: find("TEAM_ABBREVIATION"),
            game_id: require("GAME_ID")?,
            game_date: require("GAME_DATE")?,
            matchup: require("MATCHUP")?,
            wl: require("WL")?,
            pts: require("PTS")?,
            fgm: require("FGM")?,
            fga: require("FGA")?,
            fta: require("FTA")?,
            tov: require("TOV")?,
        })
    }
}

/// Parses a league-game-finder style CSV (one row per team per game).
///
/// Both sides of a row are resolved through the directory, so the team and
/// its opponent share one id space. The team is looked up by `TEAM_NAME`,
/// then `TEAM_ABBREVIATION`, then the matchup's own code; the raw league
/// `TEAM_ID` is never used. Opponents come from the matchup text.
pub fn parse_game_log_csv<R: Read>(reader: R, teams: &TeamDirectory) -> Result<ParsedLog> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers().context("read game log header")?.clone();
    let cols = Columns::locate(&headers)?;

    let mut out = ParsedLog::default();
    for (idx, row) in rdr.records().enumerate() {
        let row = row.with_context(|| format!("read game log row {}", idx + 1))?;
        match parse_row(idx + 1, &row, &cols, teams) {
            Ok(record) => out.records.push(record),
            Err(err) => out.rejected.push(err),
        }
    }
    Ok(out)
}

fn parse_row(
    row_no: usize,
    row: &csv::StringRecord,
    cols: &Columns,
    teams: &TeamDirectory,
) -> Result<GameRecord, PipelineError> {
    let field = |col: usize, name: &'static str| -> Result<&str, PipelineError> {
        let raw = row.get(col).map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            Err(PipelineError::MissingField { row: row_no, field: name })
        } else {
            Ok(raw)
        }
    };
    let invalid = |name: &'static str, value: &str| PipelineError::InvalidField {
        row: row_no,
        field: name,
        value: value.to_string(),
    };
    let count = |col: usize, name: &'static str| -> Result<u32, PipelineError> {
        let raw = field(col, name)?;
        parse_count(raw).ok_or_else(|| invalid(name, raw))
    };

    let raw_game_id = field(cols.game_id, "GAME_ID")?;
    let game_id = raw_game_id
        .parse::<u64>()
        .map_err(|_| invalid("GAME_ID", raw_game_id))?;

    let raw_date = field(cols.game_date, "GAME_DATE")?;
    let date = parse_game_date(raw_date).ok_or_else(|| invalid("GAME_DATE", raw_date))?;

    let matchup = field(cols.matchup, "MATCHUP")?.to_string();
    let (own_code, venue, opp_code) =
        parse_matchup(&matchup).ok_or_else(|| invalid("MATCHUP", &matchup))?;
    let opponent = teams
        .resolve(&opp_code)
        .ok_or_else(|| PipelineError::UnknownTeam(opp_code.clone()))?;

    let cell = move |col: Option<usize>| {
        col.and_then(|c| row.get(c))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let team = [cell(cols.team_name), cell(cols.team_abbreviation), Some(own_code.as_str())]
        .into_iter()
        .flatten()
        .find_map(|raw| teams.resolve(raw))
        .ok_or_else(|| {
            let label = cell(cols.team_name)
                .or(cell(cols.team_abbreviation))
                .unwrap_or(own_code.as_str());
            PipelineError::UnknownTeam(label.to_string())
        })?;
    if team == opponent {
        return Err(invalid("MATCHUP", &matchup));
    }

    let raw_wl = field(cols.wl, "WL")?;
    let won = match raw_wl.to_ascii_uppercase().as_str() {
        "W" => true,
        "L" => false,
        _ => return Err(invalid("WL", raw_wl)),
    };

    let season_id = cols
        .season_id
        .and_then(|col| row.get(col))
        .and_then(|s| s.trim().parse::<u32>().ok());

    Ok(GameRecord {
        game_id,
        team,
        opponent,
        date,
        season_id,
        points: count(cols.pts, "PTS")?,
        fgm: count(cols.fgm, "FGM")?,
        fga: count(cols.fga, "FGA")?,
        fta: count(cols.fta, "FTA")?,
        tov: count(cols.tov, "TOV")?,
        won,
        matchup,
        venue,
        opponent_points: None,
    })
}

// Exports sometimes write integer stats as floats ("112.0").
fn parse_count(raw: &str) -> Option<u32> {
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 {
        Some(f as u32)
    } else {
        None
    }
}

pub fn parse_game_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}
