// src/logging.rs

use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide subscriber. Call once, from `main`.
///
/// `RUST_LOG` wins when set; otherwise `level` applies (e.g. `"debug"`).
pub fn init(level: &str) {
    let env = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .try_init();
}
