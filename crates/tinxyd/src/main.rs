use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tinxyd::config::Config;
use tinxyd::platform::Platform;
use tinxyd::store::AccessoryStore;
use tinxyd::tinxy::TinxyClient;
use tokio::sync::oneshot;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Bridge Tinxy cloud devices to a local accessory host
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "tinxyd.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.filter(config.platform.debug))
        .init();

    tracing::info!("tinxyd starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let client = match TinxyClient::new(
        config.platform.api_token.as_ref(),
        &config.platform.api_base_url,
        config.platform.request_timeout(),
    ) {
        Ok(client) => client,
        Err(e) => {
            // Nothing can be bridged without credentials; stay quiet afterwards.
            tracing::error!("Tinxy platform not started: {}", e);
            return Ok(());
        }
    };

    let store = Arc::new(
        AccessoryStore::open(&config.storage.path).context("opening accessory store")?,
    );

    let platform = Arc::new(Platform::new(
        Arc::new(client),
        store.clone(),
        config.platform.poll_interval(),
        config.platform.discovery_interval(),
    ));

    for record in store.records() {
        platform.configure_accessory(record);
    }

    let (platform_tx, platform_rx) = oneshot::channel();
    let platform_task = {
        let platform = platform.clone();
        tokio::spawn(async move { platform.run(platform_rx).await })
    };

    let mut api = None;
    if config.api.enabled {
        let (api_tx, api_rx) = oneshot::channel();
        let listen = config.api.listen.clone();
        let port = config.api.port;
        let platform = platform.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = tinxyd::api::serve(listen, port, platform, api_rx).await {
                tracing::error!("HTTP API server error: {}", e);
            }
        });
        api = Some((api_tx, handle));
    } else {
        tracing::info!("HTTP API disabled");
    }

    tracing::info!("Press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    let _ = platform_tx.send(());
    if let Some((api_tx, handle)) = api {
        let _ = api_tx.send(());
        if let Err(e) = handle.await {
            tracing::error!("HTTP API task failed: {}", e);
        }
    }
    if let Err(e) = platform_task.await {
        tracing::error!("Platform task failed: {}", e);
    }

    tracing::info!("tinxyd shutdown complete");

    Ok(())
}
