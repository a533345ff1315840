use std::time::Duration;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` sets the filter (default
/// `info`); `LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_tracing(service_name: &'static str) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_level(true)
                .compact())
            .try_init()?;
    }

    tracing::info!(service = service_name, json = json, "Logging initialized");

    Ok(())
}

pub fn init_metrics(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::SocketAddr;

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(addr = %addr, "Prometheus metrics exporter listening on /metrics");

    Ok(())
}

pub fn record_counter(metric_name: &'static str, value: u64) {
    metrics::counter!(metric_name).increment(value);
}

pub fn record_gauge(metric_name: &'static str, value: f64) {
    metrics::gauge!(metric_name).set(value);
}

/// Records `elapsed` in seconds, labelled with how the operation ended.
pub fn record_duration(metric_name: &'static str, outcome: &'static str, elapsed: Duration) {
    metrics::histogram!(metric_name, "outcome" => outcome).record(elapsed.as_secs_f64());
}
