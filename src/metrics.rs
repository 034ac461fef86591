//! Prometheus metrics and tracing spans for startup migrations.
//!
//! Metrics are compiled in with the `metrics` feature and spans with the
//! `tracing` feature. Both are no-ops for callers when disabled.

#[cfg(feature = "metrics")]
pub use prom::{SchemaguardMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prom {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
        KeyValue,
    };
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<SchemaguardMetrics> = Lazy::new(SchemaguardMetrics::init);

    pub struct SchemaguardMetrics {
        pub registry: Registry,
        pub retry_attempts_total: Counter<u64>,
        pub migrations_applied_total: Counter<u64>,
        pub up_duration: Histogram<f64>,
    }

    impl SchemaguardMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => {
                    let provider = SdkMeterProvider::builder().with_reader(exporter).build();
                    global::set_meter_provider(provider);
                }
                Err(e) => log::warn!("prometheus exporter unavailable, metrics disabled error={}", e),
            }
            let meter = global::meter("schemaguard");

            let retry_attempts_total = meter
                .u64_counter("schemaguard_retry_attempts_total")
                .with_description("Attempts made by the startup retry loops, by phase")
                .build();

            let migrations_applied_total = meter
                .u64_counter("schemaguard_migrations_applied_total")
                .with_description("Migration steps applied")
                .build();

            let up_duration = meter
                .f64_histogram("schemaguard_up_duration_seconds")
                .with_description("Wall time of a startup migration run, jitter included")
                .build();

            Self {
                registry,
                retry_attempts_total,
                migrations_applied_total,
                up_duration,
            }
        }

        pub fn record_attempt(&self, phase: &'static str) {
            self.retry_attempts_total
                .add(1, &[KeyValue::new("phase", phase)]);
        }

        pub fn record_applied(&self) {
            self.migrations_applied_total.add(1, &[]);
        }

        pub fn record_up(&self, elapsed: Duration, success: bool) {
            let outcome = if success { "ok" } else { "error" };
            self.up_duration
                .record(elapsed.as_secs_f64(), &[KeyValue::new("outcome", outcome)]);
        }

        /// Current metric families in the Prometheus text format, for a `/metrics` endpoint.
        pub fn render(&self) -> Result<String, prometheus::Error> {
            let mut buf = Vec::new();
            TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn open_connection_span() -> Span {
        info_span!("schemaguard.open_connection")
    }

    pub fn retry_phase_span(phase: &'static str) -> Span {
        info_span!("schemaguard.retry", phase)
    }

    pub fn up_span() -> Span {
        info_span!("schemaguard.up")
    }
}
