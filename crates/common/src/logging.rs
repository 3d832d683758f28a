// IPPAN Gateway - explorer and proxy front for an IPPAN node
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Logging configuration for gateway components
//!
//! Provides centralized logging setup with:
//! - Human readable console output, or one JSON object per line for log shippers
//! - Optional daily-rotated file output
//! - Environment variable support (RUST_LOG), INFO by default

use eyre::Result;
use std::{env, fmt, fs, path::Path, str::FromStr, sync::Once};
use tracing::Level;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{format::FmtSpan, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Targets that are capped at `warn` on the console
const NOISY_TARGETS: &[&str] =
    &["hyper=warn", "hyper_util=warn", "reqwest=warn", "tower_http=warn"];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Console output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line colored output for terminals
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}', expected 'pretty' or 'json'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Initialize logging for a gateway component
///
/// Sets up console logging in the requested format and, when `file_dir` is
/// given, a second non-colored layer writing to `<file_dir>/<component>.log`
/// with daily rotation.
///
/// # Arguments
/// * `component_name` - Name of the component (e.g., "ippan-gateway")
/// * `format` - Console output format
/// * `file_dir` - Directory for rotated log files, `None` for console only
///
/// # Returns
/// The file writer guard when file logging is enabled. It must be kept alive
/// for the lifetime of the process, otherwise buffered lines are lost.
pub fn init_logging(
    component_name: &str,
    format: LogFormat,
    file_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = vec![console_layer(format)];

    let guard = match file_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let file_appender = rolling::daily(dir, format!("{component_name}.log"));
            let (writer, guard) = non_blocking(file_appender);

            let file_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_timer(LocalTime::rfc_3339())
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(base_filter())
                .boxed();
            layers.push(file_layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {}", e))?;

    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing::info!(
        component = component_name,
        format = %format,
        rust_log = %rust_log,
        log_dir = ?file_dir.map(|d| d.display().to_string()),
        "Logging initialized"
    );

    Ok(guard)
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(LocalTime::rfc_3339())
            .with_ansi(true)
            .pretty()
            .with_filter(console_filter())
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_timer(LocalTime::rfc_3339())
            .with_filter(console_filter())
            .boxed(),
    }
}

/// RUST_LOG if set, INFO otherwise
fn base_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Base filter with HTTP stack noise capped
fn console_filter() -> EnvFilter {
    NOISY_TARGETS
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(base_filter(), |filter, directive| filter.add_directive(directive))
}

/// Initialize simple logging (console only, compact formatting)
///
/// # Arguments
/// * `level` - The default log level when RUST_LOG is unset
pub fn init_simple_logging(level: Level) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to initialize simple logging: {}", e))?;

    Ok(())
}

static TEST_LOGGING_INIT: Once = Once::new();

/// Idempotent logging initialization for tests
///
/// Console only, INFO by default (or `default_level`), RUST_LOG respected.
/// Safe to call from every test; only the first call installs a subscriber.
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING_INIT.call_once(|| {
        // A subscriber installed elsewhere is fine for tests
        let _ = init_simple_logging(default_level.unwrap_or(Level::INFO));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info, warn};

    #[test]
    fn test_logging_functions_work() {
        ensure_test_logging(None);

        info!("Test info message");
        warn!("Test warning message");
        debug!("Test debug message");
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!(" text ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("yaml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_console_filter_caps_http_noise() {
        let rendered = console_filter().to_string();
        assert!(rendered.contains("hyper=warn"));
        assert!(rendered.contains("reqwest=warn"));
    }

    #[test]
    fn test_repeated_initialization_does_not_panic() {
        ensure_test_logging(None);

        // The global subscriber is already set, so both calls report an error
        assert!(init_logging("test-gateway", LogFormat::Pretty, None).is_err());
        assert!(init_logging("test-gateway", LogFormat::Json, None).is_err());

        info!("Logging still works after failed re-initialization");
    }
}
