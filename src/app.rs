use crate::classify::{CategoryResolver, Classifier, OllamaOracle};
use crate::cli::{Cli, Command};
use crate::config::{AppDefaults, Heuristics};
use crate::ingest::IngestEngine;
use crate::storage::Database;
use crate::unsubscribe::UnsubscribeEngine;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub async fn run(cli: Cli) -> Result<()> {
    let defaults = AppDefaults::load()?;
    let heuristics = Heuristics::default();
    let db = Database::new_default().await?;
    info!(path = %db.path().display(), "Using SQLite store");

    match cli.command {
        Command::Ingest { days, max } => {
            let engine = build_ingest_engine(&db, &defaults, &heuristics)?;
            let report = engine.run(days, max).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Recategorize { user_id, limit } => {
            let engine = build_ingest_engine(&db, &defaults, &heuristics)?;
            let updated = engine.recategorize(&user_id, limit).await?;
            println!("{}", serde_json::json!({ "updated": updated }));
        }
        Command::Unsubscribe { email_ids } => {
            let engine = UnsubscribeEngine::new(db.clone(), &defaults, &heuristics);
            let report = engine.run(&email_ids).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn build_ingest_engine(
    db: &Database,
    defaults: &AppDefaults,
    heuristics: &Heuristics,
) -> Result<IngestEngine> {
    let oracle = Arc::new(OllamaOracle::new(
        &defaults.oracle_url,
        &defaults.oracle_model,
        defaults.oracle_timeout,
    )?);
    let resolver = CategoryResolver::new(
        db.clone(),
        heuristics.clone(),
        defaults.similarity_threshold,
    );
    let classifier = Classifier::new(db.clone(), oracle, resolver);
    Ok(IngestEngine::new(db.clone(), classifier))
}
