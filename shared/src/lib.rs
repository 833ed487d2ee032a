pub mod geo;
pub mod models;

use crate::error::{ConfigError, InitializationError};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporterBuilder, MetricExporterBuilder, WithTonicConfig};
use opentelemetry_resource_detectors::ProcessResourceDetector;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::resource::{
    EnvResourceDetector, ResourceDetector, SdkProvidedResourceDetector,
};
use opentelemetry_sdk::trace::SdkTracerProvider;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::env;
use std::fmt;
use std::num::NonZeroU64;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{Subscriber, info, instrument, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, registry};
use uuid::Uuid;

pub const ENV_VAR_PREFIX: &str = "ACADEMY__";
pub const SETTINGS_FILE: &str = "Settings.toml";
pub const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Settings root for the tracking API.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub attendance: AttendanceConfig,
}

/// Settings root for the tracker client. No database is involved.
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerSettings {
    pub tracker: TrackerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub listen_addr: String,
    pub live_window_minutes: i64,
    /// Bootstrap token that authenticates as an admin without a database row.
    pub admin_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            live_window_minutes: 60,
            admin_token: None,
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("listen_addr", &self.listen_addr)
            .field("live_window_minutes", &self.live_window_minutes)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AttendanceConfig {
    pub max_accuracy_meters: f64,
    pub late_grace_minutes: i64,
    pub utc_offset_minutes: i32,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            max_accuracy_meters: 100.0,
            late_grace_minutes: 10,
            utc_offset_minutes: 0,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct TrackerConfig {
    pub api_base_url: String,
    pub api_token: String,
    pub user_id: Uuid,
    #[serde(default = "default_sample_interval_seconds")]
    pub sample_interval_seconds: NonZeroU64,
    #[serde(default = "default_sample_timeout_ms")]
    pub sample_timeout_ms: u64,
    #[serde(default = "default_live_poll_interval_seconds")]
    pub live_poll_interval_seconds: NonZeroU64,
    pub health_listen_addr: Option<String>,
    #[serde(default = "default_map_degrees_per_pixel")]
    pub map_degrees_per_pixel: f64,
}

fn default_sample_interval_seconds() -> NonZeroU64 {
    NonZeroU64::new(10).unwrap_or(NonZeroU64::MIN)
}

fn default_sample_timeout_ms() -> u64 {
    5_000
}

fn default_live_poll_interval_seconds() -> NonZeroU64 {
    NonZeroU64::new(30).unwrap_or(NonZeroU64::MIN)
}

fn default_map_degrees_per_pixel() -> f64 {
    0.0001
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("sample_interval_seconds", &self.sample_interval_seconds)
            .field("sample_timeout_ms", &self.sample_timeout_ms)
            .field("live_poll_interval_seconds", &self.live_poll_interval_seconds)
            .field("health_listen_addr", &self.health_listen_addr)
            .field("map_degrees_per_pixel", &self.map_degrees_per_pixel)
            .finish()
    }
}

pub fn load_config<T: DeserializeOwned>() -> Result<T, ConfigError> {
    load_config_from(SETTINGS_FILE)
}

pub fn load_config_from<T: DeserializeOwned>(settings_file: &str) -> Result<T, ConfigError> {
    Ok(Figment::new()
        .merge(Toml::file(settings_file))
        .merge(Env::prefixed(ENV_VAR_PREFIX).split("__"))
        .extract::<T>()?)
}

pub mod error {
    use thiserror::Error;
    use tracing_subscriber::util::TryInitError;

    #[derive(Debug, Error)]
    pub enum ConfigError {
        #[error("failed to load configuration: {0}")]
        Figment(#[from] figment::Error),
    }

    #[derive(Debug, Error)]
    pub enum InitializationError {
        #[error(transparent)]
        Tracing(#[from] TryInitError),
        #[error("failed to build OTLP exporter: {0}")]
        Exporter(#[from] opentelemetry_otlp::ExporterBuildError),
        #[error(transparent)]
        Config(#[from] ConfigError),
        #[error(transparent)]
        Migration(#[from] sqlx::migrate::MigrateError),
        #[error(transparent)]
        Db(#[from] sqlx::Error),
    }
}

#[instrument(skip(pg_config))]
pub async fn initialize_db(
    pg_config: &PostgresConfig,
    migrate: bool,
) -> Result<Pool<Postgres>, InitializationError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&pg_config.connection_string)
        .await?;

    info!(name: "db.connected", "db pool created and connected");

    if migrate {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(name: "db.migrated", "db migrations applied");
    }

    Ok(pool)
}

pub async fn shutdown_listener(token: Option<CancellationToken>) {
    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(name: "signal.sigterm.install_failed", error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(name: "signal.ctrlc.received", "received Ctrl+C signal, shutting down"),
        _ = terminate => info!(name: "signal.sigterm.received", "received SIGTERM signal, shutting down"),
    }

    if let Some(token) = token {
        token.cancel();
    }
}

/// Providers that must be flushed before the process exits. Empty when OTLP export is disabled.
#[derive(Default)]
pub struct Telemetry {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

impl Telemetry {
    pub fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }

    pub fn shutdown(self) {
        if let Some(tracer_provider) = self.tracer_provider
            && let Err(e) = tracer_provider.shutdown()
        {
            eprintln!("failed to shut down tracer provider: {e:?}");
        }
        if let Some(meter_provider) = self.meter_provider
            && let Err(e) = meter_provider.shutdown()
        {
            eprintln!("failed to shut down meter provider: {e:?}");
        }
        if let Some(logger_provider) = self.logger_provider
            && let Err(e) = logger_provider.shutdown()
        {
            eprintln!("failed to shut down logger provider: {e:?}");
        }
    }
}

/// Compact console output. Binaries pass stderr so stdout stays free for command output.
pub fn console_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
}

/// Installs the global subscriber. Console output on stderr is always on; spans, logs and
/// metrics are additionally exported over OTLP when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
pub fn init_tracing(name: impl ToString) -> Result<Telemetry, InitializationError> {
    let fmt_layer = console_layer(std::io::stderr);
    let env_filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if env::var(OTLP_ENDPOINT_VAR).is_err() {
        registry().with(env_filter_layer).with(fmt_layer).try_init()?;
        return Ok(Telemetry::default());
    }

    let span_exporter = opentelemetry_otlp::SpanExporterBuilder::default()
        .with_tonic()
        .with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())
        .build()?;

    let detectors: Vec<Box<dyn ResourceDetector>> = vec![
        Box::new(SdkProvidedResourceDetector),
        Box::new(EnvResourceDetector::new()),
        Box::new(ProcessResourceDetector),
    ];
    let resource = Resource::builder().with_detectors(&detectors).build();

    let tracer_provider = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(span_exporter)
        .build();
    let tracer = tracer_provider.tracer(name.to_string());
    global::set_tracer_provider(tracer_provider.clone());
    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    let log_exporter = LogExporterBuilder::default()
        .with_tonic()
        .with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())
        .build()?;
    let logger_provider = SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .build();
    let otel_log_layer = OpenTelemetryTracingBridge::new(&logger_provider);

    let meter_exporter = MetricExporterBuilder::new()
        .with_tonic()
        .with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())
        .build()?;
    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(meter_exporter)
        .build();
    global::set_meter_provider(meter_provider.clone());

    registry()
        .with(env_filter_layer)
        .with(fmt_layer)
        .with(otel_log_layer)
        .with(telemetry_layer)
        .try_init()?;

    Ok(Telemetry {
        tracer_provider: Some(tracer_provider),
        meter_provider: Some(meter_provider),
        logger_provider: Some(logger_provider),
    })
}
