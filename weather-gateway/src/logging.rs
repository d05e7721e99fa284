use tracing_subscriber::EnvFilter;
use weather_core::{LogFormat, LoggingConfig};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `logging.level`; an unparsable level falls back to `info`.
/// Calling this twice is harmless: the second subscriber is simply not installed.
pub fn init(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match cfg.format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(format = ?cfg.format, level = %cfg.level, "logging initialized");
    }
}
