// rest_api/src/main.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use consent_core::LogEventSink;
use rest_api::{load_settings, start_server, Overrides};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "consent-api")]
#[command(version = "0.1.0")]
#[command(about = "Patient consent and access-control service")]
struct Args {
    /// YAML configuration file; MEDCONNECT__* variables override it.
    #[arg(short = 'c', long = "config", value_name = "FILE", env = "MEDCONNECT_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long = "host", value_name = "HOST")]
    host: Option<String>,
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    port: Option<u16>,
    /// Keep everything in memory instead of the configured engine.
    #[arg(long = "in-memory")]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let overrides = Overrides { host: args.host, port: args.port, in_memory: args.in_memory };
    let settings = load_settings(args.config.as_deref(), overrides)?;

    start_server(settings, Arc::new(LogEventSink)).await
}
