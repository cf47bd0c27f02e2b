use loanwatch_common::config::AppConfig;
use loanwatch_monitor::poller::PriceFeedPoller;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "loanwatch_monitor=info,loanwatch_engine=info,loanwatch_common=info".into()
            }),
        )
        .json()
        .init();

    tracing::info!("LoanWatch monitor starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    let mut poller = PriceFeedPoller::new(&config);

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = poller.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Price feed poller exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("LoanWatch monitor stopped.");
    Ok(())
}
