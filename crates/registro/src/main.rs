use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod attendance;
mod config;
mod context;
mod db;
mod error;
mod export;
mod filter;
mod html;
mod pages;
mod pagination;
mod report;
mod server;
mod types;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "registro")]
#[command(about = "Student records and attendance register")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// SQLite database file (overrides REGISTRO_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server (default)
    Serve {
        /// Port to listen on (overrides REGISTRO_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides REGISTRO_BIND)
        #[arg(long)]
        bind: Option<IpAddr>,
    },

    /// Create or migrate the database
    Init {
        /// Seed a demo course, subjects, students and admin
        #[arg(long)]
        demo: bool,
    },
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("tower_http=warn".parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level);

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(db) = args.db {
        config.database_path = db;
    }

    match args.command {
        // Default to serve if no command specified
        None => {
            server::serve(config).await?;
        }
        Some(Commands::Serve { port, bind }) => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(bind) = bind {
                config.bind = bind;
            }
            server::serve(config).await?;
        }
        Some(Commands::Init { demo }) => {
            let conn = db::init_db(&config.database_path)?;
            info!(path = %config.database_path.display(), "Database ready");
            if demo && !db::seed_demo(&conn)? {
                info!("Database already has data, demo seed skipped");
            }
        }
    }

    Ok(())
}
