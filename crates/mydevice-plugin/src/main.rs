//! Device plugin entry point

use std::sync::Arc;

use tracing::{error, info};

use mydevice_plugin::{Config, PluginServer, Result, StaticDeviceSource};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting mydevice device plugin...");

    let config = load_config()?;
    info!(
        resource = %config.resource_name,
        socket = %config.socket_path().display(),
        "Configuration loaded"
    );

    let source = Arc::new(StaticDeviceSource::single_default());
    let mut plugin = PluginServer::new(config, source);

    if let Err(e) = plugin.start().await {
        error!("Failed to start device plugin: {e}");
        return Err(e);
    }

    // Serve until killed.
    wait_for_shutdown().await?;

    info!("Shutting down device plugin");
    plugin.stop().await;
    Ok(())
}

fn load_config() -> Result<Config> {
    let config = Config::from_env()?;
    config.validate()?;
    Ok(config)
}

async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = term.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}
