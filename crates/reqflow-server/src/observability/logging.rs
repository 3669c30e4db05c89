//! Structured logging for the engine.
//!
//! The engine logs through `tracing`: one `debug` event per dispatched batch
//! and `trace` events for cache hits, misses and retried requests. This
//! module turns [`LoggingSettings`] into a subscriber that renders them.
//!
//! ```ignore
//! use reqflow_server::observability::{init_logging, LoggingConfig};
//!
//! let config = EngineConfig::load("reqflow.yaml")?;
//! init_logging(&LoggingConfig::from(&config.logging));
//! ```

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingSettings;

/// How events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line, for log shippers.
    Json,
    /// Compact single-line text.
    #[default]
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Events below this level are dropped unless `RUST_LOG` says otherwise.
    pub level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: Level::INFO,
        }
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    /// Unknown levels fall back to INFO; `EngineConfig::validate` rejects
    /// them before this point.
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            format: if settings.json {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            level: settings.level.parse().unwrap_or(Level::INFO),
        }
    }
}

impl LoggingConfig {
    /// A subscriber writing to `writer` at exactly the configured level.
    pub fn subscriber<W>(&self, writer: W) -> impl Subscriber + Send + Sync
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        compose(self.format, EnvFilter::new(self.level.to_string()), writer)
    }
}

/// Installs the global subscriber, writing to stdout.
///
/// `RUST_LOG` overrides the configured level. Returns false when a global
/// subscriber was already installed, in which case nothing changes.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
    let subscriber = compose(config.format, filter, std::io::stdout);
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

type Filtered = Layered<EnvFilter, Registry>;

fn compose<W>(format: LogFormat, filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let output: Box<dyn Layer<Filtered> + Send + Sync> = match format {
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
        LogFormat::Text => fmt::layer().compact().with_writer(writer).boxed(),
    };
    tracing_subscriber::registry().with(filter).with(output)
}
