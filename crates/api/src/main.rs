use tracing::error;

use warmsend_api::config::AppConfig;
use warmsend_api::runtime::Runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warmsend_observability::init();

    let config = AppConfig::from_env()?;
    tracing::info!(?config, "starting warmsend");

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    let runtime = Runtime::start(config).await?;
    runtime.serve(listener, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
