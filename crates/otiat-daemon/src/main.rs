//! Otiat Daemon - Main entry point
//!
//! Loads images, object models and poses and serves them to annotation
//! front ends over REST and WebSocket.

mod api;
mod config;
mod server;
mod state;
mod ws;

use anyhow::Result;
use clap::Parser;
use otiat_store::StoreState;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "otiat")]
#[command(about = "Object pose annotation store and server")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "otiat.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Load the data once, print a summary and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Otiat v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        kind = ?config.storage.kind,
        images = %config.storage.images_path,
        object_models = %config.storage.object_models_path,
        poses = %config.storage.poses_path().display(),
        "Configuration loaded"
    );

    // Create application state and run the initial load
    let state = state::AppState::new(config.clone()).await?;

    if args.list {
        let store = state.store.read().await;
        if store.state() == StoreState::Error {
            if let Some(e) = store.last_error() {
                anyhow::bail!("Failed to load data: {}", e);
            }
        }
        println!(
            "{} images, {} object models, {} poses",
            store.images().len(),
            store.object_models().len(),
            store.poses().len()
        );
        for image in store.images() {
            let poses = store.poses_for_image(image);
            println!("  - {} ({} poses)", image.file_name(), poses.len());
            for pose in poses {
                let p = pose.position();
                println!(
                    "      {} {} at [{:.4}, {:.4}, {:.4}]",
                    pose.id(),
                    pose.object_model().display_name(),
                    p.x,
                    p.y,
                    p.z
                );
            }
        }
    } else {
        server::run(state, &config.daemon.bind).await?;
    }

    Ok(())
}
