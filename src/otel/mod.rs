//! Logging and OpenTelemetry trace export
//!
//! Structured logs go to stdout as JSON (or human-readable with
//! `logging.format: pretty`). With `otel.enabled`, spans are additionally
//! exported over OTLP.

use opentelemetry::{global, trace::TracerProvider as TracerProviderTrait, KeyValue};
use opentelemetry_sdk::{trace::TracerProvider, Resource};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LoggingConfig, OtelConfig};
use crate::error::OtelError;

/// Owns the OTLP tracer provider when export is enabled
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    config: OtelConfig,
}

impl OtelProvider {
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let tracer_provider = if config.enabled {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;
            let resource = Resource::new(vec![KeyValue::new(
                "service.name",
                config.service_name.clone(),
            )]);
            let provider = Self::init_tracer_provider(endpoint, resource)?;
            global::set_tracer_provider(provider.clone());
            Some(provider)
        } else {
            None
        };

        Ok(Self {
            tracer_provider,
            config: config.clone(),
        })
    }

    fn init_tracer_provider(endpoint: &str, resource: Resource) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        let trace_config = Config::default()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource);

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(trace_config)
            .build())
    }

    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        match self.tracer_provider {
            Some(ref tp) => tp.tracer(name),
            None => TracerProvider::builder().build().tracer(name),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flush buffered spans
    pub fn shutdown(&self) -> Result<(), OtelError> {
        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                if let Err(e) = result {
                    return Err(OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)));
                }
            }
        }
        Ok(())
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(parse_level(&logging.level));

    let otel_layer = otel
        .is_enabled()
        .then(|| tracing_opentelemetry::layer().with_tracer(otel.tracer("league-sync")));

    let pretty = logging.format.eq_ignore_ascii_case("pretty");
    let json_layer = (!pretty).then(|| tracing_subscriber::fmt::layer().json());
    let pretty_layer = pretty.then(|| tracing_subscriber::fmt::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))
}
