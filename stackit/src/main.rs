use stackit::StackitProvider;
use std::env;
use std::str::FromStr;
use tfplug::{serve, ServerConfig};
use tracing::Level;

/// Log level from TF_LOG_PROVIDER, then TF_LOG. Terraform's OFF and unknown
/// values fall back to INFO.
fn log_level() -> Level {
    ["TF_LOG_PROVIDER", "TF_LOG"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find_map(|value| Level::from_str(value.trim()).ok())
        .unwrap_or(Level::INFO)
}

#[tokio::main]
async fn main() -> tfplug::Result<()> {
    // stdout carries the plugin handshake only
    tracing_subscriber::fmt()
        .with_max_level(log_level())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let mut config = ServerConfig::default();
    if let (Ok(cert), Ok(key)) = (env::var("STACKIT_TF_TLS_CERT"), env::var("STACKIT_TF_TLS_KEY")) {
        config = config.with_tls_files(cert.into(), key.into());
    }

    serve(StackitProvider::new(), config).await
}
