use std::io;

use cdv_core::config::Config;
use cdv_core::repl::run_repl;
use tracing_subscriber::EnvFilter;

/// Env var holding the log filter, e.g. `CODRIVER_LOG=cdv_core=debug`.
const LOG_ENV: &str = "CODRIVER_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: failed to load .env: {e}");
        }
    }
    init_tracing();

    let config = Config::load();
    if config.backend.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; hosted model calls will fail");
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_repl(&config)) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
