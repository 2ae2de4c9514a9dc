use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use globewatch::properties::PropertyStore;
use globewatch::{AppConfig, Monitor, Notification, PropertiesEngine};

#[derive(Parser, Debug)]
#[command(name = "globewatch")]
#[command(about = "Real-time monitoring client: classifies channel values into alert levels")]
struct Args {
    /// Configuration file (TOML, JSON or YAML). Without it, defaults plus
    /// GLOBEWATCH_* environment variables are used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    /// Load the configuration and property files, report problems and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    if args.check {
        return check(args.config.as_deref());
    }

    let (config, config_error) = AppConfig::load_or_default(args.config.as_deref());
    let builder = Monitor::builder(config).config_error(config_error);
    let notifications = builder.subscribe();
    let monitor = builder.build();

    let printer = tokio::spawn(print_notifications(notifications));

    let channels = monitor.channels().len();
    let connected = monitor.connect_all().await;
    info!("{} of {} channels connected", connected, channels);

    tokio::signal::ctrl_c().await?;
    monitor.shutdown().await;
    printer.abort();
    Ok(())
}

/// Validate configuration and property files without starting anything.
fn check(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_env()?,
    };
    println!("configuration ok: {} channels", config.channels.len());

    let mut problems = 0;
    for spec in &config.channels {
        if let Err(e) = spec.validate() {
            println!("  channel {:?}: {}", spec.name, e);
            problems += 1;
        }
    }

    if let Some(dir) = &config.properties_dir {
        let store = PropertyStore::new(dir.clone());
        let (definitions, errors) = store.load();
        for e in &errors {
            println!("  {}", e);
        }
        problems += errors.len();

        let engine = PropertiesEngine::new(Default::default());
        let total = definitions.len();
        for definition in definitions {
            let scope = definition.scope.clone();
            if let Err(e) = engine.add(definition) {
                println!("  property {}: {}", scope, e);
                problems += 1;
            }
        }
        println!("properties: {} of {} loaded from {}", engine.len(), total, dir.display());
    }

    if problems > 0 {
        bail!("{} problems found", problems);
    }
    Ok(())
}

async fn print_notifications(mut rx: tokio::sync::broadcast::Receiver<Notification>) {
    loop {
        match rx.recv().await {
            Ok(Notification::LevelChanged {
                key,
                level,
                previous,
                message,
                ..
            }) => info!("{}: {} -> {} {}", key, previous, level, message),
            Ok(Notification::ChannelStateChanged { channel, state }) => {
                info!("channel {}: {}", channel, state)
            }
            Ok(Notification::SoundPlayed(sound)) => {
                info!("played {} sound for {}", sound.level, sound.key)
            }
            Ok(Notification::SoundsEnabled { keys }) => {
                info!("sounds re-enabled for {} sources", keys.len())
            }
            // Errors are already logged where they are reported.
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => warn!("skipped {} notifications", missed),
            Err(RecvError::Closed) => break,
        }
    }
}
