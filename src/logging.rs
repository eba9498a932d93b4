use std::sync::Once;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Installs the global subscriber once. `RUST_LOG` wins over `level` when set.
pub fn init(level: &str) {
    INIT.call_once(|| {
        let level = parse_level(level);
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_directive(level)));
        fmt()
            .with_max_level(level)
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    });
}

/// This crate logs at `level`; dependencies log at warn, or at `level` when
/// that is quieter.
fn fallback_directive(level: Level) -> String {
    let dependencies = if level < Level::WARN { level } else { Level::WARN };
    let crate_level = level.as_str().to_ascii_lowercase();
    let dependency_level = dependencies.as_str().to_ascii_lowercase();
    format!("comment_insights={crate_level},{dependency_level}")
}

fn parse_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
