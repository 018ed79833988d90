use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use houmiod::Config;
use houmiod::Engine;
use houmiod::api;
use houmiod::houmio::SocketIoTransport;
use houmiod::houmio::fetch_roster;
use tokio::task::JoinError;
use tokio::task::JoinHandle;
use tracing_subscriber::prelude::*;

/// Keeps local light state in sync with a Houmio site.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "houmiod.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(config.logging.targets()))
        .init();

    tracing::info!("houmiod starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let houmio = &config.houmio;
    let roster = fetch_roster(&houmio.host, &houmio.site_key, houmio.roster_timeout())
        .await
        .context("fetching light roster")?;

    let mut engine = Engine::new(roster, houmio.transition_interval());
    engine.start(
        SocketIoTransport::new(houmio.host.clone()),
        houmio.connection_settings(),
    )?;
    let engine = Arc::new(engine);

    let (api_shutdown, mut api_task) = match config.api.as_ref() {
        Some(api_config) => {
            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
            let handle = tokio::spawn(api::serve(
                engine.clone(),
                api_config.listen.clone(),
                api_config.port,
                shutdown_rx,
            ));
            (Some(shutdown_tx), Some(handle))
        }
        None => (None, None),
    };

    tracing::info!("Press Ctrl+C to exit");

    // The API stopping early is reported right away; sync keeps running until Ctrl+C
    let api_exited = tokio::select! {
        _ = wait_for_ctrl_c() => false,
        result = wait_for_api(api_task.as_mut()) => {
            log_api_exit(result);
            true
        }
    };
    if api_exited {
        api_task = None;
        wait_for_ctrl_c().await;
    }

    if let Some(shutdown_tx) = api_shutdown {
        let _ = shutdown_tx.send(());
    }
    if let Some(handle) = api_task {
        log_api_exit(handle.await);
    }

    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.shutdown().await,
        Err(_) => tracing::warn!("Engine still referenced, skipping orderly shutdown"),
    }

    tracing::info!("houmiod shutdown complete");

    Ok(())
}

type ApiResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type ApiTask = JoinHandle<ApiResult>;

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }
}

/// Resolves when the API task exits, never when the API is disabled.
async fn wait_for_api(task: Option<&mut ApiTask>) -> Result<ApiResult, JoinError> {
    match task {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

fn log_api_exit(result: Result<ApiResult, JoinError>) {
    match result {
        Ok(Ok(())) => tracing::info!("HTTP API server stopped"),
        Ok(Err(e)) => tracing::error!("HTTP API server failed: {}", e),
        Err(e) => tracing::error!("HTTP API task failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failed_api_task_is_noticed() {
        let failing: ApiResult = Err("address in use".into());
        let mut task: ApiTask = tokio::spawn(async move { failing });
        let result = wait_for_api(Some(&mut task)).await;
        assert!(matches!(result, Ok(Err(e)) if e.to_string() == "address in use"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_api_never_exits() {
        let waited = tokio::time::timeout(Duration::from_secs(60), wait_for_api(None)).await;
        assert!(waited.is_err());
    }
}
