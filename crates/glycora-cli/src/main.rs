//! Glycora — deterministic type 2 diabetes medication advisor.
//! Entry point for the CLI binary.

mod config;

use anyhow::Context;
use glycora_config::ConfigStore;
use glycora_engine::{Engine, PatientRequest, RecommendationResult};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Wire envelope around the deterministic result. The id and timestamp are
/// the only non-deterministic fields, and they live here, not in the engine.
#[derive(Debug, Serialize)]
struct ResponseEnvelope {
    request_id: uuid::Uuid,
    generated_at: chrono::DateTime<chrono::Utc>,
    result: RecommendationResult,
}

fn main() -> anyhow::Result<()> {
    // Structured logging goes to stderr so stdout stays pure JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("glycora=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Glycora starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load()?;
    let store = ConfigStore::load_dir(Path::new(&config.tables.dir))
        .with_context(|| format!("loading rule tables from {}", config.tables.dir))?;

    let raw = read_request(std::env::args().nth(1))?;
    let request: PatientRequest =
        serde_json::from_str(&raw).context("parsing patient request JSON")?;

    let engine = Engine::new(Arc::new(store));
    let result = engine.evaluate(&request)?;

    let envelope = ResponseEnvelope {
        request_id: uuid::Uuid::new_v4(),
        generated_at: chrono::Utc::now(),
        result,
    };
    let rendered = if config.output.pretty {
        serde_json::to_string_pretty(&envelope)?
    } else {
        serde_json::to_string(&envelope)?
    };
    println!("{rendered}");
    Ok(())
}

/// The patient request comes from a file path argument, or stdin when the
/// binary is invoked without one.
fn read_request(path: Option<String>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading patient request from {path}")),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading patient request from stdin")?;
            Ok(buf)
        }
    }
}
