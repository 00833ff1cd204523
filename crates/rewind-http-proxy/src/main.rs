use clap::Parser;
use rewind_http_proxy::config::{CliArgs, LogFormat};
use rewind_http_proxy::proxy::ProxyServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env.local takes precedence; dotenv never overrides variables already set
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();

    let args = CliArgs::parse();
    init_tracing(args.log_format);

    let config = args.into_config()?;
    let server = ProxyServer::new(config, None)?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    }
}
