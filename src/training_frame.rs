//! Historical feature rows, one per completed home/away game, built from
//! pre-game state only. Used to produce the medians table and the
//! spreadsheet the scoring models are fitted from.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::info;

use crate::elo::{EloConfig, replay_season};
use crate::features::{Feature, FeatureMedians, FeatureVector, MatchupInputs};
use crate::game_log::{GameLog, GameRecord};
use crate::head_to_head::head_to_head_avg_before;
use crate::rolling::TeamForm;
use crate::team_directory::{TeamDirectory, TeamId};

#[derive(Debug, Clone)]
pub struct FrameRow {
    pub game_id: u64,
    pub date: NaiveDate,
    pub home: TeamId,
    pub away: TeamId,
    pub home_points: u32,
    pub away_points: u32,
    pub features: FeatureVector,
}

impl FrameRow {
    pub fn home_won(&self) -> bool {
        self.home_points > self.away_points
    }

    pub fn margin(&self) -> i64 {
        self.home_points as i64 - self.away_points as i64
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub rows: usize,
    pub medians: usize,
}

/// Builds one row per paired game in (date, game id) order. Features are
/// left unimputed.
pub fn build_frame(log: &GameLog, teams: &TeamDirectory, elo: EloConfig) -> Result<Vec<FrameRow>> {
    let games = log.paired_games();
    let (_, snapshots) = replay_season(&games, elo);

    let mut per_team: HashMap<TeamId, Vec<&GameRecord>> = HashMap::new();
    let mut position: HashMap<(TeamId, u64), usize> = HashMap::new();
    for team in log.teams() {
        let rows = log.team_games(team);
        for (idx, r) in rows.iter().enumerate() {
            position.insert((team, r.game_id), idx);
        }
        per_team.insert(team, rows);
    }

    let mut out = Vec::with_capacity(games.len());
    for (game, snap) in games.iter().zip(&snapshots) {
        let home = game.home.team;
        let away = game.away.team;
        let side = |team: TeamId, opponent: TeamId| -> Result<(TeamForm, f64)> {
            let rows = per_team.get(&team).map(Vec::as_slice).unwrap_or(&[]);
            let idx = position.get(&(team, game.game_id)).copied().unwrap_or(0);
            let form = TeamForm::as_of(rows, idx);
            let code = teams.abbreviation(opponent)?;
            let h2h = head_to_head_avg_before(rows, code, idx, form.avg_points);
            Ok((form, h2h))
        };
        let (home_form, home_h2h_avg) = side(home, away)?;
        let (away_form, away_h2h_avg) = side(away, home)?;

        let inputs = MatchupInputs {
            home: home_form,
            away: away_form,
            home_elo: snap.home_pre,
            away_elo: snap.away_pre,
            home_h2h_avg,
            away_h2h_avg,
        };
        out.push(FrameRow {
            game_id: game.game_id,
            date: game.date,
            home,
            away,
            home_points: game.home.points,
            away_points: game.away.points,
            features: FeatureVector::assemble(&inputs),
        });
    }
    Ok(out)
}

pub fn frame_medians(rows: &[FrameRow]) -> FeatureMedians {
    let vectors: Vec<FeatureVector> = rows.iter().map(|r| r.features).collect();
    FeatureMedians::from_vectors(&vectors)
}

const ID_COLUMNS: [&str; 8] = [
    "game_id",
    "game_date",
    "home_team_id",
    "away_team_id",
    "home_points",
    "away_points",
    "home_win",
    "margin",
];

pub fn export_xlsx(path: &Path, rows: &[FrameRow], medians: &FeatureMedians) -> Result<ExportReport> {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Frame")?;
        write_frame(sheet, rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Medians")?;
        write_medians(sheet, medians)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    info!(rows = rows.len(), path = %path.display(), "training frame exported");
    Ok(ExportReport {
        rows: rows.len(),
        medians: medians.len(),
    })
}

fn write_frame(sheet: &mut Worksheet, rows: &[FrameRow]) -> Result<()> {
    let header = ID_COLUMNS
        .iter()
        .copied()
        .chain(Feature::ALL.iter().map(|f| f.name()));
    for (col, name) in header.enumerate() {
        sheet
            .write_string(0, col as u16, name)
            .with_context(|| format!("write header {name}"))?;
    }

    for (idx, r) in rows.iter().enumerate() {
        let row = idx as u32 + 1;
        sheet
            .write_number(row, 0, r.game_id as f64)
            .with_context(|| format!("write cell ({row},0)"))?;
        sheet
            .write_string(row, 1, r.date.format("%Y-%m-%d").to_string())
            .with_context(|| format!("write cell ({row},1)"))?;
        let numbers = [
            r.home.0 as f64,
            r.away.0 as f64,
            r.home_points as f64,
            r.away_points as f64,
            if r.home_won() { 1.0 } else { 0.0 },
            r.margin() as f64,
        ];
        for (offset, value) in numbers.iter().enumerate() {
            let col = (offset + 2) as u16;
            sheet
                .write_number(row, col, *value)
                .with_context(|| format!("write cell ({row},{col})"))?;
        }
        for (offset, feature) in Feature::ALL.iter().enumerate() {
            let Some(value) = r.features.get(*feature) else {
                continue;
            };
            let col = (ID_COLUMNS.len() + offset) as u16;
            sheet
                .write_number(row, col, value)
                .with_context(|| format!("write cell ({row},{col})"))?;
        }
    }
    Ok(())
}

fn write_medians(sheet: &mut Worksheet, medians: &FeatureMedians) -> Result<()> {
    sheet.write_string(0, 0, "feature")?;
    sheet.write_string(0, 1, "median")?;
    let mut row = 1u32;
    for feature in Feature::ALL {
        let Some(m) = medians.get(feature.name()) else {
            continue;
        };
        sheet
            .write_string(row, 0, feature.name())
            .with_context(|| format!("write cell ({row},0)"))?;
        sheet
            .write_number(row, 1, m)
            .with_context(|| format!("write cell ({row},1)"))?;
        row += 1;
    }
    Ok(())
}
