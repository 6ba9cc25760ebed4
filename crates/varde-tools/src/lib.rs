//! Shared plumbing for the command line tools.

use std::env;
use std::io;
use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use varde_config::parse::SITE_CONFIG_DEFAULTS;

/// Environment variable naming a site configuration file that replaces
/// the built-in defaults.
pub const SITE_CONFIG_ENV: &str = "VARDE_SITE_CONFIG";

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// given default directive.
pub fn init_logging(default_directive: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// The site configuration source: the file named by `VARDE_SITE_CONFIG`
/// when set, the built-in defaults otherwise.
pub fn site_config_source() -> io::Result<String> {
    match env::var_os(SITE_CONFIG_ENV) {
        Some(path) => std::fs::read_to_string(PathBuf::from(path)),
        None => Ok(SITE_CONFIG_DEFAULTS.to_string()),
    }
}
