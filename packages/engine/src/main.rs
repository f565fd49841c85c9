use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use kt_engine::logging::init_tracing;
use kt_engine::{
    EngineConfig, EngineError, InMemoryCatalog, JsonFilePersistence, LearningEngine,
};

const DEFAULT_TOP_K: usize = 5;

const USAGE: &str = "usage: kt-engine <catalog.json> [answers.json] [top-k]";

struct Args {
    catalog: PathBuf,
    answers: Option<PathBuf>,
    top_k: usize,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let catalog = args.next().map(PathBuf::from).ok_or(USAGE)?;
    let answers = args.next().map(PathBuf::from);
    let top_k = match args.next() {
        Some(raw) => raw.parse().map_err(|_| format!("invalid top-k {raw:?}\n{USAGE}"))?,
        None => DEFAULT_TOP_K,
    };
    Ok(Args {
        catalog,
        answers,
        top_k,
    })
}

fn load_config() -> Result<EngineConfig, EngineError> {
    let base = match std::env::var("KT_CONFIG") {
        Ok(path) => EngineConfig::from_json_file(path)?,
        Err(_) => EngineConfig::default(),
    };
    Ok(base.with_env())
}

async fn run(config: EngineConfig, args: Args) -> Result<(), EngineError> {
    let catalog = InMemoryCatalog::from_json_str(&std::fs::read_to_string(&args.catalog)?)?;
    let state_dir = std::env::var("KT_STATE_DIR").unwrap_or_else(|_| "./state".to_string());
    let persistence = JsonFilePersistence::new(state_dir)?;

    let engine = Arc::new(LearningEngine::new(
        config,
        Arc::new(catalog),
        Arc::new(persistence),
    )?);

    let mut users = Vec::new();
    if let Some(path) = &args.answers {
        let raw: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let events = raw
            .into_iter()
            .map(|value| engine.parse_raw_answer(value))
            .collect::<Result<Vec<_>, _>>()?;
        let summary = engine.replay_history(events)?;
        users = summary.users;
    }

    let mut report = Vec::with_capacity(users.len());
    for user_id in users {
        let questions = match Arc::clone(&engine)
            .next_questions_async(user_id.clone(), args.top_k)
            .await
        {
            Ok(ids) => ids,
            Err(EngineError::EmptyCandidatePool { .. }) => Vec::new(),
            Err(err) => return Err(err),
        };
        report.push(json!({ "userId": user_id, "nextQuestions": questions }));
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {err}");
            std::process::exit(1);
        }
    };
    let log_guard = init_tracing(&config.logging);

    if let Err(err) = run(config, args).await {
        tracing::error!(error = %err, "kt-engine failed");
        // exit skips destructors; flush file logs first
        drop(log_guard);
        std::process::exit(1);
    }
}
