use std::net::SocketAddr;
use std::time::Duration;

use tracing::info;

use devstack_web::server::WebServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let web_addr: SocketAddr = std::env::var("DEVSTACK_WEB_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8001".to_string())
        .parse()?;

    // DEVSTACK_WEB_METRICS_SECS=0 disables the periodic broadcast.
    let metrics_secs: u64 = match std::env::var("DEVSTACK_WEB_METRICS_SECS") {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("DEVSTACK_WEB_METRICS_SECS must be a number of seconds"))?,
        Err(_) => 5,
    };

    let cfg = WebServerConfig {
        metrics_interval: (metrics_secs > 0).then(|| Duration::from_secs(metrics_secs)),
    };

    info!(
        "Starting DevStack backend on http://{} (metrics every {}s)",
        web_addr, metrics_secs
    );

    devstack_web::serve(web_addr, cfg).await
}
