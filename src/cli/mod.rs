//! Command-line interface.
//!
//! ```text
//! conceptgraph serve  [--config FILE] [--db PATH] [--bind ADDR]
//! conceptgraph init   [--db PATH]
//! conceptgraph around <ID> [--depth N] [--strategy iterative|bulk]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::{load_config, ConceptGraphConfig};
use crate::error::{ConceptGraphError, Result};
use crate::graph::{NeighborhoodEngine, TraversalStrategy};
use crate::server::run_server;
use crate::store::SqliteStore;

#[derive(Debug, Parser)]
#[command(name = "conceptgraph")]
#[command(version)]
#[command(about = "Prerequisite knowledge graph with depth-bounded neighborhood queries")]
#[command(propagate_version = true)]
pub struct Cli {
    /// YAML config file (default: ./conceptgraph.yaml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path, overriding config and environment
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        /// Socket address to listen on, e.g. 127.0.0.1:3000
        #[arg(long)]
        bind: Option<String>,
    },
    /// Create the database and its schema, then exit
    Init,
    /// Print the neighborhood of a concept as JSON
    Around {
        /// Root concept id
        id: String,

        /// Maximum hops in each direction
        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        depth: i64,

        /// Traversal strategy (iterative or bulk); defaults to the configured one
        #[arg(long)]
        strategy: Option<TraversalStrategy>,
    },
}

impl Cli {
    /// Load configuration and apply command-line overrides on top.
    pub fn resolve_config(&self) -> Result<ConceptGraphConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(db) = &self.db {
            config.store.path = db.clone();
        }
        match &self.command {
            Command::Serve { bind: Some(bind) } => config.server.bind = bind.clone(),
            Command::Around {
                strategy: Some(strategy),
                ..
            } => config.traversal.strategy = *strategy,
            _ => {}
        }
        config.validate()?;
        Ok(config)
    }
}

/// Execute the parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.resolve_config()?;
    let store = Arc::new(SqliteStore::open(&config.store.path)?);

    match cli.command {
        Command::Serve { .. } => run_server(store, &config).await,
        Command::Init => {
            tracing::info!(path = %config.store.path.display(), "schema ready");
            println!("{}", config.store.path.display());
            Ok(())
        }
        Command::Around { id, depth, .. } => {
            let engine = NeighborhoodEngine::new(store).with_strategy(config.traversal.strategy);
            let hood = tokio::task::spawn_blocking(move || engine.neighborhood(&id, depth))
                .await
                .map_err(|e| ConceptGraphError::Other(format!("traversal task failed: {e}")))??;
            let json = serde_json::to_string_pretty(&hood)
                .map_err(|e| ConceptGraphError::Other(e.to_string()))?;
            println!("{json}");
            Ok(())
        }
    }
}
