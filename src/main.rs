use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::Parser;
use rusqlite::Connection;
use tracing::{info, warn};

use statistiq::config::{Command, Config, ExportArgs, FeaturesArgs, IngestArgs, PredictArgs};
use statistiq::context::{GameLogSource, PipelineContext};
use statistiq::features::FeatureVector;
use statistiq::game_log::{GameLog, parse_game_log_csv};
use statistiq::models::ModelSet;
use statistiq::store::{self, IngestRun};
use statistiq::team_directory::TeamDirectory;
use statistiq::{predict_job, training_frame};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let mut conn = store::open_db(&config.db_path)?;
    match &config.command {
        Command::Ingest(args) => ingest(&config, &mut conn, args),
        Command::Predict(args) => predict(&config, &conn, args),
        Command::Features(args) => features(&config, &conn, args),
        Command::Export(args) => export(&config, &conn, args),
    }
}

fn load_teams(config: &Config) -> Result<TeamDirectory> {
    match &config.teams_csv {
        Some(path) => TeamDirectory::load_csv(path),
        None => Ok(TeamDirectory::builtin()),
    }
}

fn ingest(config: &Config, conn: &mut Connection, args: &IngestArgs) -> Result<()> {
    let teams = load_teams(config)?;

    if let Some(path) = &args.games {
        let started_at = Utc::now();
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let parsed = parse_game_log_csv(BufReader::new(file), &teams)?;
        for err in parsed.rejected.iter().take(20) {
            warn!(error = %err, "rejected game-log row");
        }

        let log = GameLog::from_records(parsed.records);
        let upserted = store::upsert_game_records(conn, log.records())?;
        let run = IngestRun {
            source: path.display().to_string(),
            rows_read: upserted + parsed.rejected.len(),
            rows_upserted: upserted,
            errors: parsed.rejected.iter().map(|e| e.to_string()).collect(),
        };
        store::record_ingest_run(conn, started_at, Utc::now(), &run)?;
        info!(
            upserted,
            rejected = parsed.rejected.len(),
            total = store::count_game_rows(conn)?,
            "game log ingested"
        );
    }

    if let Some(path) = &args.schedule {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let games = store::parse_schedule_csv(BufReader::new(file))?;
        let unknown = games
            .iter()
            .flat_map(|g| [g.home, g.away])
            .find(|id| teams.by_id(*id).is_none());
        if let Some(id) = unknown {
            return Err(anyhow!("schedule references unknown team id {id}"));
        }
        let n = store::upsert_schedule(conn, &games)?;
        info!(games = n, "schedule ingested");
    }
    Ok(())
}

fn predict(config: &Config, conn: &Connection, args: &PredictArgs) -> Result<()> {
    let now = args.now();
    let models = ModelSet::load_dir(&args.models_dir)?;
    let ctx = PipelineContext::new(conn as &dyn GameLogSource, config.context_options(now));
    let summary = predict_job::run(conn, &ctx, &models, now, &args.job_config())?;
    if summary.failed > 0 {
        warn!(failed = summary.failed, "some games could not be scored");
    }
    Ok(())
}

fn features(config: &Config, conn: &Connection, args: &FeaturesArgs) -> Result<()> {
    let ctx = PipelineContext::new(conn as &dyn GameLogSource, config.context_options(Utc::now()));
    let teams = ctx.teams()?;
    let home = teams
        .resolve(&args.home)
        .ok_or_else(|| anyhow!("unknown team {:?}", args.home))?;
    let away = teams
        .resolve(&args.away)
        .ok_or_else(|| anyhow!("unknown team {:?}", args.away))?;

    let vector = if args.raw {
        FeatureVector::assemble(&ctx.matchup_inputs(home, away)?)
    } else {
        ctx.features_for(home, away)?
    };
    let named: serde_json::Map<String, serde_json::Value> = vector
        .named()
        .into_iter()
        .map(|(name, value)| {
            let v = serde_json::Number::from_f64(value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null);
            (name.to_string(), v)
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&named)?);
    Ok(())
}

fn export(config: &Config, conn: &Connection, args: &ExportArgs) -> Result<()> {
    let teams = load_teams(config)?;
    let season = config.season_for(Utc::now());
    let log = conn.load_season_log(season)?;
    let rows = training_frame::build_frame(&log, &teams, config.elo())?;
    let medians = training_frame::frame_medians(&rows);
    let report = training_frame::export_xlsx(&args.out, &rows, &medians)?;
    if !args.skip_medians {
        medians.save_json(&config.medians_path)?;
        info!(
            medians = report.medians,
            path = %config.medians_path.display(),
            "feature medians refreshed"
        );
    }
    Ok(())
}
