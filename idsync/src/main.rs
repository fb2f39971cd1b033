use clap::Parser;
use idsync::config::Args;
use idsync::{Application, Config, telemetry};
use tokio::signal;

/// Which signal ended the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Interrupt,
    Terminate,
}

#[cfg(unix)]
async fn terminated() -> std::io::Result<()> {
    signal::unix::signal(signal::unix::SignalKind::terminate())?.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminated() -> std::io::Result<()> {
    std::future::pending().await
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed is logged
/// and the other one still applies.
async fn stop_requested() -> Stop {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        if let Err(e) = terminated().await {
            tracing::error!(error = %e, "Cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = interrupt => Stop::Interrupt,
        _ = terminate => Stop::Terminate,
    }
}

/// One-line description of a loaded configuration, printed by `--validate`.
fn describe(config: &Config) -> String {
    format!(
        "Configuration is valid: {} credential pair(s), upstream {} (api {}), storing under {}",
        config.credentials.len(),
        config.upstream.base_url,
        config.upstream.api_version,
        config.storage.root.display(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    idsync::install_crypto_provider();

    let args = Args::parse();
    // Missing credentials or upstream settings stop the process here
    let config = Config::load(&args)?;

    if args.validate {
        println!("{}", describe(&config));
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;
    tracing::info!(
        credentials = config.credentials.len(),
        upstream = %config.upstream.base_url,
        "Starting idsync"
    );

    let shutdown = async {
        let stop = stop_requested().await;
        tracing::info!(?stop, "Stop requested, draining in-flight syncs");
    };
    Application::new(config).await?.serve(shutdown).await
}
