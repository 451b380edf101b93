use crate::config::{LogConfig, LogFormat};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

/// Build the [`EnvFilter`] for `config`.
///
/// An unparsable directive falls back to `info` so a typo in `LOG_LEVEL`
/// never silences the service.
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global `tracing` subscriber for the server's own
/// diagnostics.
///
/// **Effects**
///
/// Installs a [`Registry`] with an [`EnvFilter`] and a `fmt` layer writing
/// to stdout, either human-readable text or one JSON object per line.
/// Records handled by the pipeline never go through this subscriber.
///
/// **Errors**
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), TryInitError> {
    let filter = env_filter(config);

    // Два варианта fmt-слоя имеют разные типы, поэтому собираем subscriber
    // в каждой ветке отдельно.
    match config.format {
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .try_init(),
    }
}
