//! Log output for the server binary.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `default_filter` is the `--log-level` value and only applies when
/// `RUST_LOG` is unset. Lines are compact and omit the module target.
pub fn init_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .init();
}

/// Glyphs marking lifecycle log lines.
pub mod prefix {
    /// Server coming up
    pub const OPEN: &str = "✿";
    /// Server going down
    pub const CLOSE: &str = "❀";
}
