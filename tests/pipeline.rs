use std::fs;
use std::path::PathBuf;

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use statistiq::context::{ContextOptions, GameLogSource, PipelineContext};
use statistiq::elo::{EloConfig, EloTracker};
use statistiq::features::{Feature, FeatureMedians};
use statistiq::game_log::{GameLog, parse_game_log_csv};
use statistiq::models::ModelSet;
use statistiq::predict_job::{self, JobConfig};
use statistiq::store::{self, ScheduledGame};
use statistiq::team_directory::{TeamDirectory, TeamId};
use statistiq::training_frame;

const BOS: TeamId = TeamId(133);
const LAL: TeamId = TeamId(145);
const MIA: TeamId = TeamId(147);
const NYK: TeamId = TeamId(151);
const ATL: TeamId = TeamId(132);

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn fixture_log() -> GameLog {
    let raw = fs::read_to_string(fixture_path("game_log.csv")).expect("fixture file should be readable");
    let parsed = parse_game_log_csv(raw.as_bytes(), &TeamDirectory::builtin()).unwrap();
    GameLog::from_records(parsed.records)
}

fn options() -> ContextOptions {
    ContextOptions {
        season_start: 2025,
        teams_csv: None,
        medians_path: Some(fixture_path("feature_medians.json")),
        elo: EloConfig::default(),
    }
}

fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

#[test]
fn matchup_features_follow_team_history() {
    let log = fixture_log();
    let ctx = PipelineContext::new(&log, options());
    let v = ctx.features_for(BOS, MIA).unwrap();

    // Boston's last game is excluded; the three before it were all wins.
    assert_relative_eq!(v.get(Feature::HomeAvgPoints).unwrap(), (112.0 + 115.0 + 120.0) / 3.0);
    assert_relative_eq!(v.get(Feature::HomeSeasonWinPct).unwrap(), 1.0);
    assert_relative_eq!(v.get(Feature::HomeFgPctL10).unwrap(), 130.0 / 269.0);
    assert_relative_eq!(v.get(Feature::AwayAvgPoints).unwrap(), (99.0 + 110.0 + 98.0) / 3.0);
    assert_eq!(v.get(Feature::HomeAdvantage), Some(1.0));

    assert_relative_eq!(v.get(Feature::HomeHeadToHeadAvgPoints).unwrap(), (120.0 + 109.0) / 2.0);
    assert_relative_eq!(v.get(Feature::AwayHeadToHeadAvgPoints).unwrap(), (98.0 + 111.0) / 2.0);

    let mut elo = EloTracker::new(EloConfig::default());
    elo.replay(&log.paired_games());
    assert_eq!(v.get(Feature::HomeElo), Some(elo.rating(BOS)));
    assert_eq!(v.get(Feature::AwayElo), Some(elo.rating(MIA)));
    assert_relative_eq!(
        v.get(Feature::EloDiff).unwrap(),
        elo.rating(BOS) - elo.rating(MIA)
    );
    assert!(v.missing().is_empty());
}

#[test]
fn team_without_history_gets_defaults_and_medians() {
    let log = fixture_log();
    let ctx = PipelineContext::new(&log, options());

    let raw = statistiq::features::FeatureVector::assemble(&ctx.matchup_inputs(BOS, ATL).unwrap());
    assert_eq!(raw.get(Feature::AwayAvgPoints), Some(150.0));
    assert_eq!(raw.get(Feature::AwaySeasonWinPct), Some(0.5));
    assert_eq!(raw.get(Feature::AwayHeadToHeadAvgPoints), Some(150.0));
    assert_eq!(raw.get(Feature::AwayElo), Some(1500.0));
    assert_eq!(raw.get(Feature::AwayOffEffL10), None);

    let v = ctx.features_for(BOS, ATL).unwrap();
    assert_eq!(v.get(Feature::AwayOffEffL10), Some(111.9));
    // No median for this field: it stays missing and flattens to NaN.
    assert_eq!(v.get(Feature::AwayFgPctL10), None);
    assert!(v.to_vec()[Feature::ALL.len() - 1].is_nan());
}

#[test]
fn unknown_team_is_a_contract_error() {
    let log = fixture_log();
    let ctx = PipelineContext::new(&log, options());
    assert!(ctx.features_for(BOS, TeamId(9999)).is_err());
}

#[test]
fn injected_directory_limits_known_teams() {
    use statistiq::team_directory::TeamEntry;

    let log = fixture_log();
    let teams = TeamDirectory::from_entries(vec![
        TeamEntry {
            id: BOS,
            name: "Boston Celtics".to_string(),
            abbreviation: "BOS".to_string(),
        },
        TeamEntry {
            id: MIA,
            name: "Miami Heat".to_string(),
            abbreviation: "MIA".to_string(),
        },
    ]);
    let ctx = PipelineContext::new(&log, options()).with_teams(teams);
    assert_eq!(ctx.teams().unwrap().len(), 2);
    assert!(ctx.features_for(BOS, MIA).is_ok());
    assert!(ctx.features_for(BOS, NYK).is_err());
}

#[test]
fn missing_medians_file_disables_imputation() {
    let log = fixture_log();
    let mut opts = options();
    opts.medians_path = Some(fixture_path("no_such_medians.json"));
    let ctx = PipelineContext::new(&log, opts);
    assert!(ctx.medians().unwrap().is_empty());
    let v = ctx.features_for(BOS, ATL).unwrap();
    assert_eq!(v.get(Feature::AwayOffEffL10), None);
}

#[test]
fn model_set_scores_a_feature_vector() {
    let log = fixture_log();
    let ctx = PipelineContext::new(&log, options());
    let models = ModelSet::load_dir(&fixture_path("models")).unwrap();
    let v = ctx.features_for(NYK, LAL).unwrap();
    let p = models.predict(&v).unwrap();

    assert!(p.win_probability.home > 0.0 && p.win_probability.home < 1.0);
    assert_relative_eq!(p.win_probability.home + p.win_probability.away, 1.0);
    assert_relative_eq!(p.points_range.home.max - p.points_range.home.min, 20.0);
    assert_relative_eq!(p.points_range.away.max - p.points_range.away.min, 20.0);
    assert!(p.overtime_probability > 0.0 && p.overtime_probability < 0.5);
    assert!(p.expected_margin.is_finite());
}

fn seeded_db() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    store::init_schema(&conn).unwrap();
    let log = fixture_log();
    store::upsert_game_records(&mut conn, log.records()).unwrap();
    let schedule = fs::read_to_string(fixture_path("schedule.csv")).unwrap();
    let games = store::parse_schedule_csv(schedule.as_bytes()).unwrap();
    store::upsert_schedule(&mut conn, &games).unwrap();
    conn
}

#[test]
fn batch_job_purges_skips_and_writes() {
    let conn = seeded_db();
    let models = ModelSet::load_dir(&fixture_path("models")).unwrap();
    let now = ts("2025-11-04T12:00:00Z");

    let recent = store::scheduled_game(&conn, 22500102).unwrap().unwrap();
    assert!(recent.prediction.is_none());
    let ctx = PipelineContext::new(&conn as &dyn GameLogSource, options());
    let early = predict_job::predict_game(&ctx, &models, &recent).unwrap();
    store::write_prediction(&conn, 22500102, &early, now - Duration::hours(2)).unwrap();

    let summary = predict_job::run(&conn, &ctx, &models, now, &JobConfig::default()).unwrap();
    assert_eq!(summary.purged, 1);
    assert_eq!(summary.considered, 2);
    assert_eq!(summary.skipped_recent, 1);
    assert_eq!(summary.predicted, 1);
    assert_eq!(summary.failed, 0);

    let written = store::scheduled_game(&conn, 22500101).unwrap().unwrap();
    assert!(written.prediction.is_some());
    assert_eq!(written.updated_at, Some(now));
    assert!(store::scheduled_game(&conn, 22500100).unwrap().is_none());
    // Outside the two-day window: untouched.
    let later = store::scheduled_game(&conn, 22500103).unwrap().unwrap();
    assert!(later.prediction.is_none());

    let again = predict_job::run(&conn, &ctx, &models, now, &JobConfig::default()).unwrap();
    assert_eq!(again.skipped_recent, 2);
    assert_eq!(again.predicted, 0);
}

#[test]
fn batch_job_counts_failures_and_continues() {
    let mut conn = seeded_db();
    let start = ts("2025-11-05T01:00:00Z");
    store::upsert_schedule(&mut conn, &[ScheduledGame::new(1, BOS, TeamId(9999), start)]).unwrap();

    let models = ModelSet::load_dir(&fixture_path("models")).unwrap();
    let ctx = PipelineContext::new(&conn as &dyn GameLogSource, options());
    let cfg = JobConfig {
        purge_stale: false,
        ..JobConfig::default()
    };
    let summary = predict_job::run(&conn, &ctx, &models, ts("2025-11-04T12:00:00Z"), &cfg).unwrap();
    assert_eq!(summary.considered, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.predicted, 2);
    assert_eq!(summary.errors.len(), 1);
}

#[test]
fn dry_run_writes_nothing() {
    let conn = seeded_db();
    let models = ModelSet::load_dir(&fixture_path("models")).unwrap();
    let ctx = PipelineContext::new(&conn as &dyn GameLogSource, options());
    let cfg = JobConfig {
        dry_run: true,
        ..JobConfig::default()
    };
    let summary = predict_job::run(&conn, &ctx, &models, ts("2025-11-04T12:00:00Z"), &cfg).unwrap();
    assert_eq!(summary.purged, 0);
    assert_eq!(summary.predicted, 2);
    let g = store::scheduled_game(&conn, 22500101).unwrap().unwrap();
    assert!(g.prediction.is_none());
}

#[test]
fn training_frame_uses_pre_game_state() {
    let log = fixture_log();
    let teams = TeamDirectory::builtin();
    let rows = training_frame::build_frame(&log, &teams, EloConfig::default()).unwrap();
    assert_eq!(rows.len(), 8);

    let first = &rows[0];
    assert_eq!(first.features.get(Feature::HomeAvgPoints), Some(150.0));
    assert_eq!(first.features.get(Feature::HomeElo), Some(1500.0));
    assert_eq!(first.features.get(Feature::HomeFgPctL10), None);
    assert!(first.home_won());

    // Game 7: MIA hosts BOS after each has played three times.
    let g7 = rows.iter().find(|r| r.game_id == 22500007).unwrap();
    assert_eq!((g7.home, g7.away), (MIA, BOS));
    assert_eq!(g7.features.get(Feature::HomeHeadToHeadAvgPoints), Some(98.0));
    assert_relative_eq!(
        g7.features.get(Feature::AwayAvgPoints).unwrap(),
        (112.0 + 115.0 + 120.0) / 3.0
    );
    let mut elo = EloTracker::new(EloConfig::default());
    elo.replay(&log.paired_games()[..6]);
    assert_eq!(g7.features.get(Feature::HomeElo), Some(elo.rating(MIA)));
    assert_eq!(g7.margin(), 2);

    let medians = training_frame::frame_medians(&rows);
    assert_eq!(medians.get("home_advantage"), Some(1.0));
    assert_eq!(medians.len(), Feature::ALL.len());
}

#[test]
fn training_frame_exports_workbook_and_medians() {
    let log = fixture_log();
    let rows = training_frame::build_frame(&log, &TeamDirectory::builtin(), EloConfig::default()).unwrap();
    let medians = training_frame::frame_medians(&rows);

    let dir = std::env::temp_dir().join(format!("statistiq-export-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let xlsx = dir.join("frame.xlsx");
    let report = training_frame::export_xlsx(&xlsx, &rows, &medians).unwrap();
    assert_eq!(report.rows, 8);
    assert!(fs::metadata(&xlsx).unwrap().len() > 0);

    let json = dir.join("medians.json");
    medians.save_json(&json).unwrap();
    let loaded = FeatureMedians::load_json(&json).unwrap();
    assert_eq!(loaded.len(), medians.len());
    for f in Feature::ALL {
        assert_relative_eq!(
            loaded.get(f.name()).unwrap(),
            medians.get(f.name()).unwrap(),
            max_relative = 1e-12
        );
    }
    let _ = fs::remove_dir_all(&dir);
}
