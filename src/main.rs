//! # srd-chat CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `srd-chat serve` | Start the HTTP server |
//! | `srd-chat classify "<query>"` | Print the routing classification as JSON |
//! | `srd-chat chat "<query>"` | Answer one question against the configured backends |
//! | `srd-chat lookup <kind> <name>` | Fetch one SRD reference record |
//! | `srd-chat health` | Probe every backend and print the report |
//!
//! `classify` needs no configuration. `chat`, `lookup`, and `health` fall
//! back to localhost defaults when the config file is missing.
//!
//! ```bash
//! srd-chat --config ./config/srd-chat.toml serve
//! srd-chat classify "List all level 3 wizard spells"
//! srd-chat chat "What is in room A12?" --region A
//! srd-chat lookup class wizard --level 5
//! ```
//!
//! Logs go to stderr and honour `RUST_LOG` (default `srd_chat=info`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use srd_chat::classify::classify;
use srd_chat::config::{load_config, Config};
use srd_chat::health;
use srd_chat::models::{ChatHints, ReferenceKind};
use srd_chat::orchestrator::{Backends, Orchestrator};
use srd_chat::server;
use srd_chat::srd::SrdClient;
use srd_chat::traits::ReferenceLookup;

/// Query router and answer synthesizer for a D&D 5e SRD assistant.
#[derive(Parser)]
#[command(name = "srd-chat", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/srd-chat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// Classify a query and print the routing decision as JSON.
    Classify { query: String },

    /// Answer one question and print the response as JSON.
    Chat {
        query: String,

        /// Region hint (A-D).
        #[arg(long)]
        region: Option<String>,

        /// Category hint (spells, monsters, equipment, rooms).
        #[arg(long)]
        category: Option<String>,
    },

    /// Look up an SRD reference record.
    Lookup {
        /// One of: spell, monster, class, race.
        kind: String,

        name: String,

        /// Class level to fetch instead of the class summary.
        #[arg(long)]
        level: Option<u8>,
    },

    /// Probe every backend and print the health report.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let cfg = load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }
        Commands::Classify { query } => {
            let classification = classify(&query);
            println!("{}", serde_json::to_string_pretty(&classification)?);
        }
        Commands::Chat {
            query,
            region,
            category,
        } => {
            let cfg = config_or_minimal(&cli.config);
            let orchestrator = Orchestrator::from_config(&cfg)?;
            let hints = ChatHints { region, category };
            let response = orchestrator.answer(&query, Some(&hints)).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Lookup { kind, name, level } => {
            let cfg = config_or_minimal(&cli.config);
            let kind = ReferenceKind::parse(&kind).with_context(|| {
                format!("unknown kind '{}': use spell, monster, class, or race", kind)
            })?;
            let client = SrdClient::new(&cfg.srd)?;
            let record = match (kind, level) {
                (ReferenceKind::Class, Some(level)) => client.class_level(&name, level).await?,
                (_, Some(_)) => anyhow::bail!("--level only applies to classes"),
                (kind, None) => client.lookup(kind, &name).await?,
            };
            let record = record.with_context(|| {
                format!("no SRD {} named '{}'", kind.collection(), name)
            })?;
            println!("{}\n{}\n\n{}", record.title, record.url, record.text);
        }
        Commands::Health => {
            let cfg = config_or_minimal(&cli.config);
            let backends = Backends::from_config(&cfg)?;
            let report = health::report(&backends, cfg.summary(), 0).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn config_or_minimal(path: &Path) -> Config {
    match load_config(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "using localhost defaults");
            Config::minimal()
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new("srd_chat=info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))
}
