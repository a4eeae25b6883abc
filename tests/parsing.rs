use std::fs;
use std::path::PathBuf;

use statistiq::elo::EloConfig;
use statistiq::error::PipelineError;
use statistiq::game_log::{GameLog, Venue, parse_game_log_csv};
use statistiq::team_directory::{TeamDirectory, TeamId};
use statistiq::training_frame::build_frame;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[test]
fn parses_game_log_fixture() {
    let raw = read_fixture("game_log.csv");
    let teams = TeamDirectory::builtin();
    let parsed = parse_game_log_csv(raw.as_bytes(), &teams).expect("fixture should parse");
    assert_eq!(parsed.records.len(), 16);
    assert_eq!(parsed.rejected.len(), 1);
    assert!(matches!(
        parsed.rejected[0],
        PipelineError::InvalidField { field: "WL", .. }
    ));

    let first = &parsed.records[0];
    assert_eq!(first.game_id, 22500001);
    assert_eq!(first.team, TeamId(133));
    assert_eq!(first.opponent, TeamId(151));
    assert_eq!(first.venue, Venue::Home);
    assert_eq!(first.points, 112);
    assert!(first.won);
    assert_eq!(first.season_id, Some(22025));
}

#[test]
fn game_log_pairs_home_and_away_rows() {
    let raw = read_fixture("game_log.csv");
    let teams = TeamDirectory::builtin();
    let parsed = parse_game_log_csv(raw.as_bytes(), &teams).unwrap();
    let log = GameLog::from_records(parsed.records);

    let games = log.paired_games();
    assert_eq!(games.len(), 8);
    assert!(games.windows(2).all(|w| w[0].date <= w[1].date));
    let g1 = &games[0];
    assert_eq!(g1.home.team, TeamId(133));
    assert_eq!(g1.away.team, TeamId(151));
    assert!(g1.home_won());

    let bos = log.team_games(TeamId(133));
    assert_eq!(bos.len(), 4);
    assert_eq!(bos[0].opponent_points, Some(105));
    assert_eq!(log.teams().len(), 4);
}

#[test]
fn missing_required_column_is_fatal() {
    let raw = "TEAM_ID,TEAM_NAME,GAME_ID,GAME_DATE,MATCHUP,WL,PTS,FGM,FGA,FTA\n\
               1,Boston Celtics,1,2025-10-22,BOS vs. NYK,W,110,40,85,20\n";
    let err = parse_game_log_csv(raw.as_bytes(), &TeamDirectory::builtin()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MissingColumn("TOV"))
    ));
}

#[test]
fn unknown_opponent_is_rejected_per_row() {
    let raw = "TEAM_ID,TEAM_NAME,GAME_ID,GAME_DATE,MATCHUP,WL,PTS,FGM,FGA,FTA,TOV\n\
               1,Boston Celtics,1,2025-10-22,BOS vs. XYZ,W,110,40,85,20,12\n\
               1,Boston Celtics,2,2025-10-24,BOS @ NYK,L,101,38,86,18,14\n";
    let parsed = parse_game_log_csv(raw.as_bytes(), &TeamDirectory::builtin()).unwrap();
    assert_eq!(parsed.records.len(), 1);
    assert!(matches!(&parsed.rejected[0], PipelineError::UnknownTeam(code) if code == "XYZ"));
}

#[test]
fn team_csv_overrides_builtin_ids() {
    let dir = std::env::temp_dir().join(format!("statistiq-teams-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("teams.csv");
    fs::write(&path, "Team,ID,Abbreviation\nBoston Celtics,1,BOS\nNew York Knicks,2,NYK\n").unwrap();

    let teams = TeamDirectory::load_csv(&path).unwrap();
    assert_eq!(teams.len(), 2);
    assert_eq!(teams.resolve("Boston Celtics"), Some(TeamId(1)));
    assert_eq!(teams.resolve("NYK"), Some(TeamId(2)));
    assert_eq!(teams.abbreviation(TeamId(2)).unwrap(), "NYK");

    // Without an Abbreviation column, codes come from the built-in table.
    let bare = dir.join("teams_no_abbr.csv");
    fs::write(&bare, "Team,ID\nBoston Celtics,1\nSeattle SuperSonics,2\n").unwrap();
    let teams = TeamDirectory::load_csv(&bare).unwrap();
    assert_eq!(teams.abbreviation(TeamId(1)).unwrap(), "BOS");
    assert_eq!(teams.resolve("bos"), Some(TeamId(1)));
    assert_eq!(teams.abbreviation(TeamId(2)).unwrap(), "");
    assert_eq!(teams.resolve("Seattle SuperSonics"), Some(TeamId(2)));
    let _ = fs::remove_dir_all(&dir);
}

const NO_NAME_HEADER: &str = "SEASON_ID,TEAM_ID,TEAM_ABBREVIATION,GAME_ID,GAME_DATE,MATCHUP,WL,PTS,FGM,FGA,FTA,TOV\n";

#[test]
fn team_resolves_by_abbreviation_without_name_column() {
    let raw = format!(
        "{NO_NAME_HEADER}\
         22025,1610612738,BOS,0022500001,2025-10-22,BOS vs. NYK,W,112,42,88,20,12\n\
         22025,1610612752,NYK,0022500001,2025-10-22,NYK @ BOS,L,105,39,90,18,14\n"
    );
    let teams = TeamDirectory::builtin();
    let parsed = parse_game_log_csv(raw.as_bytes(), &teams).unwrap();
    assert!(parsed.rejected.is_empty());

    let log = GameLog::from_records(parsed.records);
    assert_eq!(log.teams(), vec![TeamId(133), TeamId(151)]);
    let bos = log.team_games(TeamId(133));
    assert_eq!(bos[0].opponent, TeamId(151));
    assert_eq!(bos[0].opponent_points, Some(105));
    assert_eq!(log.team_games(TeamId(151))[0].opponent_points, Some(112));

    let rows = build_frame(&log, &teams, EloConfig::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].home, rows[0].away), (TeamId(133), TeamId(151)));
}

#[test]
fn team_falls_back_to_matchup_code() {
    // Historical franchise name and a blank abbreviation cell.
    let raw = "TEAM_ID,TEAM_NAME,TEAM_ABBREVIATION,GAME_ID,GAME_DATE,MATCHUP,WL,PTS,FGM,FGA,FTA,TOV\n\
               1610612752,New York Knickerbockers,,1,2025-10-22,NYK @ BOS,L,105,39,90,18,14\n";
    let parsed = parse_game_log_csv(raw.as_bytes(), &TeamDirectory::builtin()).unwrap();
    assert!(parsed.rejected.is_empty());
    assert_eq!(parsed.records[0].team, TeamId(151));
}

#[test]
fn unresolvable_team_is_rejected_not_given_raw_id() {
    let raw = format!(
        "{NO_NAME_HEADER}\
         22025,1610612760,SEA,0022500001,2025-10-22,SEA vs. NYK,W,112,42,88,20,12\n"
    );
    let parsed = parse_game_log_csv(raw.as_bytes(), &TeamDirectory::builtin()).unwrap();
    assert!(parsed.records.is_empty());
    assert!(matches!(&parsed.rejected[0], PipelineError::UnknownTeam(code) if code == "SEA"));
}

#[test]
fn matchup_against_itself_is_rejected() {
    let raw = format!(
        "{NO_NAME_HEADER}\
         22025,1610612738,BOS,0022500001,2025-10-22,BOS vs. BOS,W,112,42,88,20,12\n"
    );
    let parsed = parse_game_log_csv(raw.as_bytes(), &TeamDirectory::builtin()).unwrap();
    assert!(parsed.records.is_empty());
    assert!(matches!(
        parsed.rejected[0],
        PipelineError::InvalidField { field: "MATCHUP", .. }
    ));
}
