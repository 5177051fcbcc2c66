use anyhow::Result;
use tracing_subscriber::EnvFilter;

use oag::{run_cli, Config};

/// RUST_LOG 优先，其次是配置文件中的 log_level，默认 warn
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            let level = Config::load_default()
                .ok()
                .and_then(|c| c.log_level)
                .unwrap_or_else(|| "warn".to_string());
            EnvFilter::try_new(level)
        })
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    run_cli().await
}
