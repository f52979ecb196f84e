//! Structured logging setup.
//!
//! The pipeline emits `tracing` events: status transitions at `debug`,
//! cache hits at `trace`, kept versions after a failed reload at `warn` and
//! compiler invariant violations at `error`. Hosts that already install a
//! subscriber need nothing from this module; [`init_logging`] is for hosts
//! and tools that do not.

use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

static LOGGER_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Output format of the console layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level of the `brscript*` targets when `RUST_LOG` is unset.
    pub level: Level,
    /// Explicit filter directives; overrides `level` and `RUST_LOG`.
    pub filter: Option<String>,
    pub format: LogFormat,
    /// Emit span enter/close events.
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            filter: None,
            format: LogFormat::Compact,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Read `BRSCRIPT_LOG_LEVEL`, `BRSCRIPT_LOG_FORMAT` and
    /// `BRSCRIPT_LOG_SPANS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("BRSCRIPT_LOG_LEVEL") {
            config.level = level.parse().unwrap_or(Level::INFO);
        }
        if let Ok(format) = std::env::var("BRSCRIPT_LOG_FORMAT") {
            config.format = match format.to_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => LogFormat::Compact,
            };
        }
        config.show_spans = std::env::var("BRSCRIPT_LOG_SPANS").is_ok();
        config
    }

    /// Everything the pipeline reports, with spans.
    pub fn verbose() -> Self {
        Self {
            level: Level::TRACE,
            filter: None,
            format: LogFormat::Pretty,
            show_spans: true,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if let Some(filter) = &self.filter {
            return EnvFilter::new(filter);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = self.level.as_str().to_lowercase();
            EnvFilter::new(format!(
                "brscript={level},brscript_compiler={level},brscript_registry={level},brscript_parser={level}"
            ))
        })
    }
}

/// Install a global subscriber. Only the first call has an effect; it
/// returns whether a subscriber was installed, which is `false` when the
/// host already set one.
pub fn init_logging(config: LogConfig) -> bool {
    *LOGGER_INITIALIZED.get_or_init(|| {
        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = match config.format {
            LogFormat::Compact => fmt::layer().compact().with_span_events(span_events).boxed(),
            LogFormat::Pretty => fmt::layer().pretty().with_span_events(span_events).boxed(),
            LogFormat::Json => fmt::layer().json().with_span_events(span_events).boxed(),
        };
        tracing_subscriber::registry()
            .with(config.env_filter())
            .with(layer)
            .try_init()
            .is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        let first = init_logging(LogConfig::default());
        let second = init_logging(LogConfig::verbose());
        assert_eq!(first, second);
    }

    #[test]
    fn explicit_filter_wins() {
        let config = LogConfig {
            filter: Some("brscript=trace".to_string()),
            ..LogConfig::default()
        };
        assert_eq!(config.env_filter().to_string(), "brscript=trace");
    }
}
