use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Deserialize;

use crate::context::GameLogSource;
use crate::error::PipelineError;
use crate::game_log::{GameLog, GameRecord, Venue};
use crate::models::GamePrediction;
use crate::team_directory::TeamId;

const DATE_FMT: &str = "%Y-%m-%d";

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS games_played (
            game_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            opponent_id INTEGER NOT NULL,
            game_date TEXT NOT NULL,
            season_id INTEGER NULL,
            pts INTEGER NOT NULL,
            fgm INTEGER NOT NULL,
            fga INTEGER NOT NULL,
            fta INTEGER NOT NULL,
            tov INTEGER NOT NULL,
            won INTEGER NOT NULL,
            matchup TEXT NOT NULL,
            home INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (game_id, team_id)
        );
        CREATE INDEX IF NOT EXISTS idx_games_played_date ON games_played(game_date);
        CREATE INDEX IF NOT EXISTS idx_games_played_team ON games_played(team_id);

        CREATE TABLE IF NOT EXISTS games_schedule (
            game_id INTEGER PRIMARY KEY,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            venue TEXT NULL,
            predictions_json TEXT NULL,
            updated_at TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_schedule_start ON games_schedule(start_time);

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            source TEXT NOT NULL,
            rows_read INTEGER NOT NULL,
            rows_upserted INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_game_records(conn: &mut Connection, records: &[GameRecord]) -> Result<usize> {
    let tx = conn.transaction().context("begin games transaction")?;
    let now = fmt_ts(Utc::now());
    for r in records {
        upsert_game_record(&tx, r, &now)?;
    }
    tx.commit().context("commit games transaction")?;
    Ok(records.len())
}

fn upsert_game_record(tx: &Transaction<'_>, r: &GameRecord, now: &str) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO games_played (
            game_id, team_id, opponent_id, game_date, season_id,
            pts, fgm, fga, fta, tov, won, matchup, home, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(game_id, team_id) DO UPDATE SET
            opponent_id = excluded.opponent_id,
            game_date = excluded.game_date,
            season_id = excluded.season_id,
            pts = excluded.pts,
            fgm = excluded.fgm,
            fga = excluded.fga,
            fta = excluded.fta,
            tov = excluded.tov,
            won = excluded.won,
            matchup = excluded.matchup,
            home = excluded.home,
            updated_at = excluded.updated_at
        "#,
        params![
            r.game_id as i64,
            r.team.0 as i64,
            r.opponent.0 as i64,
            r.date.format(DATE_FMT).to_string(),
            r.season_id.map(|s| s as i64),
            r.points as i64,
            r.fgm as i64,
            r.fga as i64,
            r.fta as i64,
            r.tov as i64,
            bool_to_i64(r.won),
            r.matchup,
            bool_to_i64(r.venue == Venue::Home),
            now,
        ],
    )
    .context("upsert game record")?;
    Ok(())
}

/// Rows with `from <= game_date < to`, ordered by (date, game id).
pub fn load_game_log_between(conn: &Connection, from: NaiveDate, to: NaiveDate) -> Result<GameLog> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                game_id, team_id, opponent_id, game_date, season_id,
                pts, fgm, fga, fta, tov, won, matchup, home
            FROM games_played
            WHERE game_date >= ?1 AND game_date < ?2
            ORDER BY game_date ASC, game_id ASC, team_id ASC
            "#,
        )
        .context("prepare load games query")?;

    let rows = stmt
        .query_map(
            params![
                from.format(DATE_FMT).to_string(),
                to.format(DATE_FMT).to_string()
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    [
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                        row.get::<_, i64>(9)?,
                    ],
                    row.get::<_, i64>(10)? != 0,
                    row.get::<_, String>(11)?,
                    row.get::<_, i64>(12)? != 0,
                ))
            },
        )
        .context("query load games")?;

    let mut records = Vec::new();
    for row in rows {
        let (game_id, team, opponent, date, season_id, counts, won, matchup, home) =
            row.context("decode game row")?;
        let date = NaiveDate::parse_from_str(&date, DATE_FMT)
            .with_context(|| format!("stored game {game_id} has bad date {date:?}"))?;
        let [points, fgm, fga, fta, tov] = counts.map(|c| c.max(0) as u32);
        records.push(GameRecord {
            game_id: game_id as u64,
            team: TeamId(team as u32),
            opponent: TeamId(opponent as u32),
            date,
            season_id: season_id.map(|s| s as u32),
            points,
            fgm,
            fga,
            fta,
            tov,
            won,
            matchup,
            venue: if home { Venue::Home } else { Venue::Away },
            opponent_points: None,
        });
    }
    Ok(GameLog::from_records(records))
}

impl GameLogSource for Connection {
    fn load_season_log(&self, season_start: i32) -> Result<GameLog> {
        let from = NaiveDate::from_ymd_opt(season_start, 9, 1)
            .ok_or_else(|| anyhow!("invalid season start {season_start}"))?;
        let to = NaiveDate::from_ymd_opt(season_start + 1, 9, 1)
            .ok_or_else(|| anyhow!("invalid season start {season_start}"))?;
        load_game_log_between(self, from, to)
    }
}

pub fn count_game_rows(conn: &Connection) -> Result<usize> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM games_played", [], |row| row.get(0))
        .context("count game rows")?;
    Ok(n as usize)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledGame {
    pub game_id: u64,
    pub home: TeamId,
    pub away: TeamId,
    pub start_time: DateTime<Utc>,
    pub venue: Option<String>,
    pub prediction: Option<GamePrediction>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScheduledGame {
    pub fn new(game_id: u64, home: TeamId, away: TeamId, start_time: DateTime<Utc>) -> Self {
        Self {
            game_id,
            home,
            away,
            start_time,
            venue: None,
            prediction: None,
            updated_at: None,
        }
    }
}

/// Inserts or refreshes schedule rows. Existing predictions are kept.
pub fn upsert_schedule(conn: &mut Connection, games: &[ScheduledGame]) -> Result<usize> {
    let tx = conn.transaction().context("begin schedule transaction")?;
    for g in games {
        tx.execute(
            r#"
            INSERT INTO games_schedule (game_id, home_team_id, away_team_id, start_time, venue)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(game_id) DO UPDATE SET
                home_team_id = excluded.home_team_id,
                away_team_id = excluded.away_team_id,
                start_time = excluded.start_time,
                venue = excluded.venue
            "#,
            params![
                g.game_id as i64,
                g.home.0 as i64,
                g.away.0 as i64,
                fmt_ts(g.start_time),
                g.venue,
            ],
        )
        .context("upsert schedule row")?;
    }
    tx.commit().context("commit schedule transaction")?;
    Ok(games.len())
}

/// Scheduled games with `from <= start_time <= to`, earliest first.
pub fn scheduled_between(
    conn: &Connection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<ScheduledGame>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT game_id, home_team_id, away_team_id, start_time, venue,
                   predictions_json, updated_at
            FROM games_schedule
            WHERE start_time >= ?1 AND start_time <= ?2
            ORDER BY start_time ASC, game_id ASC
            "#,
        )
        .context("prepare schedule query")?;
    let rows = stmt
        .query_map(params![fmt_ts(from), fmt_ts(to)], decode_schedule_row)
        .context("query schedule")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(into_scheduled_game(row.context("decode schedule row")?)?);
    }
    Ok(out)
}

pub fn scheduled_game(conn: &Connection, game_id: u64) -> Result<Option<ScheduledGame>> {
    let raw = conn
        .query_row(
            r#"
            SELECT game_id, home_team_id, away_team_id, start_time, venue,
                   predictions_json, updated_at
            FROM games_schedule
            WHERE game_id = ?1
            "#,
            params![game_id as i64],
            decode_schedule_row,
        )
        .optional()
        .context("query scheduled game")?;
    raw.map(into_scheduled_game).transpose()
}

type ScheduleRow = (
    i64,
    i64,
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn decode_schedule_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_scheduled_game(raw: ScheduleRow) -> Result<ScheduledGame> {
    let (game_id, home, away, start_time, venue, predictions_json, updated_at) = raw;
    let prediction = predictions_json
        .map(|s| serde_json::from_str::<GamePrediction>(&s))
        .transpose()
        .with_context(|| format!("decode stored prediction for game {game_id}"))?;
    Ok(ScheduledGame {
        game_id: game_id as u64,
        home: TeamId(home as u32),
        away: TeamId(away as u32),
        start_time: parse_timestamp(&start_time)
            .ok_or_else(|| anyhow!("game {game_id} has bad start_time {start_time:?}"))?,
        venue,
        prediction,
        updated_at: updated_at.as_deref().and_then(parse_timestamp),
    })
}

pub fn write_prediction(
    conn: &Connection,
    game_id: u64,
    prediction: &GamePrediction,
    now: DateTime<Utc>,
) -> Result<()> {
    let json = serde_json::to_string(prediction).context("encode prediction")?;
    let changed = conn
        .execute(
            "UPDATE games_schedule SET predictions_json = ?1, updated_at = ?2 WHERE game_id = ?3",
            params![json, fmt_ts(now), game_id as i64],
        )
        .context("write prediction")?;
    if changed == 0 {
        return Err(anyhow!("game {game_id} is not on the schedule"));
    }
    Ok(())
}

/// Removes schedule rows starting before `cutoff`. Returns the row count.
pub fn delete_schedule_before(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    conn.execute(
        "DELETE FROM games_schedule WHERE start_time < ?1",
        params![fmt_ts(cutoff)],
    )
    .context("delete stale schedule rows")
}

#[derive(Debug, Clone, Default)]
pub struct IngestRun {
    pub source: String,
    pub rows_read: usize,
    pub rows_upserted: usize,
    pub errors: Vec<String>,
}

pub fn record_ingest_run(
    conn: &Connection,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    run: &IngestRun,
) -> Result<i64> {
    let errors_json = serde_json::to_string(&run.errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO ingest_runs(started_at, finished_at, source, rows_read, rows_upserted, errors_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            fmt_ts(started_at),
            fmt_ts(finished_at),
            run.source,
            run.rows_read as i64,
            run.rows_upserted as i64,
            errors_json
        ],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Deserialize)]
struct ScheduleCsvRow {
    game_id: String,
    home_team_id: String,
    away_team_id: String,
    start_time: String,
    #[serde(default)]
    venue: Option<String>,
}

/// Reads `game_id,home_team_id,away_team_id,start_time[,venue]`. Times are
/// RFC 3339 or naive `YYYY-MM-DD HH:MM[:SS]` taken as UTC.
pub fn parse_schedule_csv<R: Read>(reader: R) -> Result<Vec<ScheduledGame>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut out = Vec::new();
    for (idx, row) in rdr.deserialize::<ScheduleCsvRow>().enumerate() {
        let row_no = idx + 1;
        let row = row.with_context(|| format!("schedule row {row_no}"))?;
        let id = |field: &'static str, raw: &str| -> Result<u64, PipelineError> {
            raw.parse::<u64>().map_err(|_| PipelineError::InvalidField {
                row: row_no,
                field,
                value: raw.to_string(),
            })
        };
        let start_time =
            parse_timestamp(&row.start_time).ok_or_else(|| PipelineError::InvalidField {
                row: row_no,
                field: "start_time",
                value: row.start_time.clone(),
            })?;
        out.push(ScheduledGame {
            game_id: id("game_id", &row.game_id)?,
            home: TeamId(id("home_team_id", &row.home_team_id)? as u32),
            away: TeamId(id("away_team_id", &row.away_team_id)? as u32),
            start_time,
            venue: row.venue.filter(|v| !v.is_empty()),
            prediction: None,
            updated_at: None,
        });
    }
    Ok(out)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Fixed-width UTC timestamps so text comparison in SQL matches time order.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn bool_to_i64(v: bool) -> i64 {
    if v { 1 } else { 0 }
}
