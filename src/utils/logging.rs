//! Logging setup
//!
//! A single `tracing-subscriber` fmt subscriber for the whole process. The
//! level comes from `logging.level`; anything unrecognised means `info`.

use tracing::Level;

/// Install the global subscriber and return the level it filters at. Safe to
/// call more than once; later calls keep the first subscriber.
pub fn init(level: &str) -> Level {
    let level = parse_level(level);

    if tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("Subscriber already installed, keeping it");
    }

    level
}

fn parse_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => Level::WARN,
        other => other.parse().unwrap_or(Level::INFO),
    }
}
