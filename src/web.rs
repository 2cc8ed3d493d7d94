#![cfg(not(tarpaulin_include))]

use nexcard_panel::app;
use nexcard_panel::config::Config;

/// Entry point of the web dashboard
///
/// Reads the `NEXCARD_*` settings and serves the dashboard on `NEXCARD_BIND`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    app::run(config).await
}
