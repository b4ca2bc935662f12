//! Strata CLI - inspect and edit a Strata store from the shell

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use strata_common::Config;
use strata_db::{ChangesOptions, Db, DbOptions, ReadOptions};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Branchable key-value store")]
#[command(version)]
struct Args {
    /// Directory holding the store
    #[arg(short, long, env = "STRATA_DIR", default_value = ".")]
    dir: PathBuf,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Operate on the head of this layer
    #[arg(long, conflicts_with = "checkout")]
    layer: Option<String>,

    /// Operate on the store as of this node
    #[arg(long)]
    checkout: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty store
    Init,
    /// Write a value
    Put { key: String, value: String },
    /// Read a value
    Get { key: String },
    /// Delete a key
    Del { key: String },
    /// List live entries in key order
    Ls {
        #[arg(long)]
        gte: Option<String>,
        #[arg(long)]
        lt: Option<String>,
        /// Print keys only
        #[arg(long)]
        keys: bool,
    },
    /// Head node of every layer
    Heads,
    /// Every layer id
    Layers,
    /// Committed nodes in change order
    Log {
        /// Only nodes after this change
        #[arg(long, default_value_t = 0)]
        since: u64,
    },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse config file {}", path.display()))
}

fn handle(args: &Args, config: Config) -> Db {
    let mut options = DbOptions::new().with_config(config);
    if let Some(head) = &args.checkout {
        options = options.with_checkout(head.as_str());
    } else if let Some(layer) = &args.layer {
        options = options.with_layer(layer.as_str());
    }
    Db::new(&args.dir, options)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = load_config(args.config.as_deref())?;
    if matches!(args.command, Commands::Init) {
        config.storage.create_if_missing = true;
    }
    debug!(?config, dir = %args.dir.display(), "loaded configuration");

    let db = handle(&args, config);

    match &args.command {
        Commands::Init => {
            db.open().await?;
            info!(dir = %args.dir.display(), "store ready");
            println!("Initialized store in {}", args.dir.display());
        }
        Commands::Put { key, value } => {
            let node = db.put(key, value.as_str()).await?;
            db.flush().await?;
            println!("{} (change {})", node.key, node.change);
        }
        Commands::Get { key } => match db.get(key).await {
            Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
            Err(e) if e.is_not_found() => {
                eprintln!("{e}");
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
        Commands::Del { key } => {
            let node = db.del(key).await?;
            db.flush().await?;
            println!("{} (change {})", node.key, node.change);
        }
        Commands::Ls { gte, lt, keys } => {
            let mut range = ReadOptions::new();
            range.gte.clone_from(gte);
            range.lt.clone_from(lt);
            let mut entries = db.create_read_stream(range);
            while let Some((key, value)) = entries.try_next().await? {
                if *keys {
                    println!("{key}");
                } else {
                    println!("{key}\t{}", String::from_utf8_lossy(&value));
                }
            }
        }
        Commands::Heads => {
            let mut heads = db.heads();
            while let Some(head) = heads.try_next().await? {
                println!("{head}");
            }
        }
        Commands::Layers => {
            let current = {
                db.open().await?;
                db.layer_id()
            };
            let mut layers = db.layers();
            while let Some(layer) = layers.try_next().await? {
                let marker = if Some(&layer) == current.as_ref() { "*" } else { " " };
                println!("{marker} {layer}");
            }
        }
        Commands::Log { since } => {
            let mut nodes = db.create_changes_stream(ChangesOptions {
                since: *since,
                limit: None,
            });
            println!("{:<8} {:<66} {:<6}", "CHANGE", "NODE", "OPS");
            println!("{}", "-".repeat(82));
            while let Some(node) = nodes.try_next().await? {
                println!(
                    "{:<8} {:<66} {:<6}",
                    node.change,
                    node.key,
                    node.operations.len()
                );
                for op in &node.operations {
                    println!(
                        "         {} {}{}",
                        op.kind,
                        op.dataset
                            .as_deref()
                            .map(|d| format!("{d}/"))
                            .unwrap_or_default(),
                        op.key
                    );
                }
            }
        }
    }

    Ok(())
}
