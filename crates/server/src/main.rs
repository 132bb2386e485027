use anyhow::Context as _;
use apimcp_openapi_tools::OpenApiToolSource;
use apimcp_server::config::{Cli, LogFormat, Settings};
use apimcp_server::{McpServer, health};
use axum::Router;
use axum::routing::get;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let settings = Settings::resolve(&cli).context("invalid configuration")?;
    tracing::info!(spec = %settings.source.spec.label(), bind = %settings.bind, "starting apimcp");

    let source = OpenApiToolSource::new("api", settings.source.clone())?
        .with_timeouts(settings.call_timeout, settings.startup_timeout);
    source.start().await.context("failed to load the OpenAPI document")?;

    let server = McpServer::new(source, settings.name.clone(), settings.description.clone());
    let app = server.mount(Router::new().route("/health", get(health)), &settings.mount_path);

    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("bind {}", settings.bind))?;
    tracing::info!(addr = %listener.local_addr()?, server = %server.name(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
