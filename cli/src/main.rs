mod commands;
mod config;
mod edamam;
mod mirror_client;
mod server;

use std::process;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    cmd_config, cmd_edit, cmd_favorite, cmd_featured, cmd_mirror_resync, cmd_mirror_status,
    cmd_saved, cmd_search, cmd_show,
};
use crate::config::Config;
use crate::edamam::{EdamamClient, MissingCredentials};
use crate::mirror_client::HttpMirror;
use savor_core::catalog::RecipeCatalog;
use savor_core::db::Database;
use savor_core::docstore::DocumentStore;
use savor_core::mirror::{FavoritesMirror, LocalMirror};
use savor_core::models::{HealthFilter, RecipeEdit};
use savor_core::state::PresentationState;
use savor_core::sync::SyncCoordinator;
use savor_core::tasks::BackgroundTasks;

#[derive(Parser)]
#[command(
    name = "savor",
    version,
    about = "Find recipes, keep the ones you like",
    long_about = "Search the Edamam recipe catalog, cache results locally, and keep \
                  favorites mirrored to a document store.\n\n\
                  Logging goes to stderr; set SAVOR_LOG (e.g. SAVOR_LOG=debug) to change the level."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the recipe catalog
    Search {
        /// Search terms (may be empty when --health is given)
        #[arg(default_value = "")]
        term: String,
        /// Health filter: all, vegan, gluten-free, low-sugar, paleo
        #[arg(long, default_value = "all")]
        health: HealthFilter,
        /// Search the local cache instead of the catalog
        #[arg(long)]
        offline: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show featured (healthy) recipes
    Featured {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a cached recipe
    Show {
        /// Recipe key (see the Key column of `search`)
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle a recipe's favorite status
    Favorite {
        /// Recipe key
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List saved (favorite) recipes
    Saved {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a cached recipe
    Edit {
        /// Recipe key
        key: String,
        /// New title
        #[arg(long)]
        label: Option<String>,
        /// New calorie count
        #[arg(long)]
        calories: Option<f64>,
        /// New total time in minutes
        #[arg(long)]
        time: Option<f64>,
        /// New image URL
        #[arg(long)]
        image: Option<String>,
        /// Ingredient line (repeat to replace the whole list)
        #[arg(long = "ingredient")]
        ingredients: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or repair the favorites mirror
    Mirror {
        #[command(subcommand)]
        command: MirrorCommands,
    },
    /// Serve a document store over HTTP for other devices to mirror into
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
    /// Show configuration and file locations
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MirrorCommands {
    /// Compare saved recipes with mirror documents
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push saved recipes to the mirror and remove stale documents
    Resync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("SAVOR_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn build_coordinator(config: &Config) -> Result<SyncCoordinator> {
    let db = Database::open(&config.db_path)?;

    let catalog: Arc<dyn RecipeCatalog> = match config.edamam_credentials() {
        Ok((id, key)) => Arc::new(EdamamClient::new(id, key)?),
        Err(e) => Arc::new(MissingCredentials::new(e.to_string())),
    };

    let mirror: Arc<dyn FavoritesMirror> = match &config.settings.mirror_url {
        Some(url) => Arc::new(HttpMirror::new(
            url,
            config.settings.mirror_api_key.clone(),
        )?),
        None => {
            let store = DocumentStore::open(&config.mirror_db_path)?;
            Arc::new(LocalMirror::new(Arc::new(Mutex::new(store))))
        }
    };

    Ok(SyncCoordinator::new(
        Arc::new(Mutex::new(db)),
        catalog,
        mirror,
        Arc::new(PresentationState::new()),
        BackgroundTasks::new(config.max_background_tasks()),
    ))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    let command = match cli.command {
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?.0)
            };
            let store = DocumentStore::open(&config.mirror_db_path)?;
            return server::start_server(store, port, &bind, api_key).await;
        }
        Commands::Config { json } => return cmd_config(&config, json),
        other => other,
    };

    let sync = build_coordinator(&config)?;
    let result = dispatch(&sync, command).await;
    sync.shutdown().await;
    result
}

async fn dispatch(sync: &SyncCoordinator, command: Commands) -> Result<()> {
    match command {
        Commands::Search {
            term,
            health,
            offline,
            json,
        } => cmd_search(sync, &term, health, offline, json).await,
        Commands::Featured { json } => cmd_featured(sync, json).await,
        Commands::Show { key, json } => cmd_show(sync, &key, json),
        Commands::Favorite { key, json } => cmd_favorite(sync, &key, json).await,
        Commands::Saved { json } => cmd_saved(sync, json),
        Commands::Edit {
            key,
            label,
            calories,
            time,
            image,
            ingredients,
            json,
        } => {
            let edit = RecipeEdit {
                label,
                calories,
                total_time: time,
                image,
                ingredient_lines: (!ingredients.is_empty()).then_some(ingredients),
            };
            cmd_edit(sync, &key, &edit, json).await
        }
        Commands::Mirror { command } => match command {
            MirrorCommands::Status { json } => cmd_mirror_status(sync, json).await,
            MirrorCommands::Resync { json } => cmd_mirror_resync(sync, json).await,
        },
        Commands::Serve { .. } | Commands::Config { .. } => unreachable!("handled in run"),
    }
}
