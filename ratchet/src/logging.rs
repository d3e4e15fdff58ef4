use std::str::FromStr;

use tracing::Level;

pub fn init_logging(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

/// Unknown names fall back to INFO.
pub fn parse_level(value: &str) -> Level {
    Level::from_str(value.trim()).unwrap_or(Level::INFO)
}
