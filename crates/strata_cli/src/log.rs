use std::collections::HashMap;
use std::io::stderr;

use opentelemetry::KeyValue;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
use opentelemetry_sdk::Resource;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::{fmt, EnvFilter};

pub type OtelLayer = OpenTelemetryTracingBridge<SdkLoggerProvider, SdkLogger>;

/// Print to stderr and exit with a non-zero exit code
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        eprintln!($($arg)*);
        std::process::exit(1);
    }};
}

/// Bridge to the OTLP log exporter. Nothing is exported without an API key.
pub fn otel_layer(api_key: &str, endpoint: &str, service_name: &str) -> OtelLayer {
    if api_key.trim().is_empty() {
        let provider = SdkLoggerProvider::builder().build();
        return OpenTelemetryTracingBridge::new(&provider);
    }

    let mut headers = HashMap::new();
    headers.insert("X-Api-Key".to_string(), api_key.to_string());

    let exporter = match LogExporter::builder()
        .with_http()
        .with_endpoint(format!("{endpoint}logs"))
        .with_protocol(Protocol::HttpBinary)
        .with_headers(headers)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => fatal!("Failed to create the OTEL log exporter: {e}"),
    };

    let resource = Resource::builder()
        .with_attribute(KeyValue::new("service.name", service_name.to_string()))
        .build();
    let provider = SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    OpenTelemetryTracingBridge::new(&provider)
}

/// Initialise the global logger
pub fn new(log_level: &str, otel_layer: OtelLayer) -> (WorkerGuard, WorkerGuard) {
    match log_level {
        "TRACE" | "DEBUG" | "INFO" | "WARN" | "ERROR" => {}
        _ => {
            fatal!("Invalid log level `{log_level}`. Valid levels are: TRACE, DEBUG, INFO, WARN, ERROR");
        }
    };

    let filter = match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))
    {
        Ok(filter) => filter,
        Err(e) => fatal!("Failed to create log filter: {e}"),
    };

    let appender = match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("strata")
        .filename_suffix("log")
        .build("logs")
    {
        Ok(appender) => appender,
        Err(e) => fatal!("Failed to initialise rolling file appender: {e}"),
    };

    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(appender);
    let (non_blocking_stderr, stderr_guard) = tracing_appender::non_blocking(stderr());

    let logger = Registry::default()
        .with(filter)
        .with(
            fmt::Layer::default()
                .with_writer(non_blocking_stderr)
                .with_line_number(true),
        )
        .with(
            fmt::Layer::default()
                .with_writer(non_blocking_file)
                .with_line_number(true)
                .with_ansi(false),
        )
        .with(otel_layer);

    if let Err(e) = tracing::subscriber::set_global_default(logger) {
        fatal!("Failed to initialise logger: {e}");
    }

    (file_guard, stderr_guard)
}
