mod cli;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match cli::run() {
        cli::RunOutcome::Serve(config) => config,
        cli::RunOutcome::Exit(code) => std::process::exit(code),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("outage_watch={},info", config.log_level))
        }))
        .init();

    if let Err(err) = outage_watch::serve(config).await {
        tracing::error!(error = %err, "outage-watch exited with error");
        std::process::exit(1);
    }
}
