//! Bot Runtime binary: reads config and prompt-rule bytes off disk, wires
//! tracing, runs one character's session end to end, and maps the outcome
//! onto the process exit code contract.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tw2002_bot::character::{CharacterRecord, NameGenerator};
use tw2002_bot::config::{apply_env_overrides, Config};
use tw2002_bot::detector::PromptDetector;
use tw2002_bot::error::ErrorKind;
use tw2002_bot::runtime::{BotRuntime, RuntimeOutcome};
use tw2002_bot::session::Session;

const TERM_COLS: u16 = 80;
const TERM_ROWS: u16 = 25;
const PAGES_PER_COMMAND: u32 = 5;
const ENV_PREFIX: &str = "TW2002_";

fn usage() -> &'static str {
    "usage: tw2002-bot <config.json> <rules.json> [record.jsonl]"
}

fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    let raw = fs::read_to_string(path)?;
    let mut doc: serde_json::Value = serde_json::from_str(&raw)?;
    let env_vars: HashMap<String, String> = env::vars().collect();
    apply_env_overrides(&mut doc, ENV_PREFIX, &env_vars);
    Config::from_document(doc)
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("{}", usage());
        std::process::exit(2);
    }
    let config_path = PathBuf::from(&args[1]);
    let rules_path = PathBuf::from(&args[2]);
    let record_path = args.get(3).map(PathBuf::from);

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(3);
        }
    };

    let rules_json = match fs::read_to_string(&rules_path) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to read rules file");
            std::process::exit(3);
        }
    };
    let detector = match PromptDetector::from_json(&rules_json, config.session.detector_rows) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(error = %e, "invalid rules file");
            std::process::exit(3);
        }
    };

    let mut name_generator = NameGenerator::new(config.character.name_seed);
    let name = name_generator.generate_character_name(&config.character);
    let ship_name = name_generator.generate_ship_name(&config.character);
    let character = CharacterRecord::new(name, ship_name, now_epoch_seconds());

    let session = match Session::connect(
        &config.connection.host,
        config.connection.port,
        TERM_COLS,
        TERM_ROWS,
        record_path.as_deref(),
        config.session.stability_window_ms,
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect");
            std::process::exit(e.kind.exit_code());
        }
    };

    let mut runtime = BotRuntime::new(session, detector, config, character, name_generator, PAGES_PER_COMMAND);
    match runtime.run().await {
        Ok(RuntimeOutcome::TargetReached { credits }) => {
            tracing::info!(credits, "target credits reached");
            std::process::exit(0);
        }
        Ok(RuntimeOutcome::TurnBudgetExhausted { turns_taken }) => {
            tracing::info!(turns_taken, "turn budget exhausted");
            std::process::exit(0);
        }
        Ok(RuntimeOutcome::CharacterDied { successor }) => {
            tracing::info!(?successor, "character died");
            std::process::exit(0);
        }
        Ok(RuntimeOutcome::OrientationLost) => {
            tracing::error!("disorientation recovery exhausted");
            std::process::exit(ErrorKind::OrientationLost.exit_code());
        }
        Err(e) => {
            tracing::error!(error = %e, "session ended in error");
            std::process::exit(e.kind.exit_code());
        }
    }
}
