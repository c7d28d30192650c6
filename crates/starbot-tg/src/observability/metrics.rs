use super::GLOBAL_LABELS;
use crate::config::from_env_or_panic;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use serde::Deserialize;

/// Histogram buckets to measure the distribution of request durations in seconds
pub(crate) const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

pub(crate) const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
pub(crate) const HTTP_REQUEST_EFFECTIVE_DURATION: &str = "http_request_effective_duration_seconds";
pub(crate) const GATE_EVALUATIONS: &str = "gate_evaluations_total";
pub(crate) const GATE_MEMBERSHIP_CHECKS: &str = "gate_membership_checks_total";
pub(crate) const SPONSOR_CACHE_LOOKUPS: &str = "sponsor_cache_lookups_total";
pub(crate) const SPONSOR_PROVIDER_REQUESTS: &str = "sponsor_provider_requests_total";
pub(crate) const TG_UPDATES: &str = "tg_updates_total";

#[derive(Deserialize)]
struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    metrics_port: u16,
}

fn default_metrics_port() -> u16 {
    2000
}

pub fn init_metrics() {
    let config: MetricsConfig = from_env_or_panic("");

    let mut builder = PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_owned()),
            DEFAULT_DURATION_BUCKETS,
        )
        .expect("BUG: duration buckets must not be empty");

    for (key, value) in GLOBAL_LABELS {
        builder = builder.add_global_label(*key, *value);
    }

    builder
        .install()
        .expect("BUG: failed to initialize the metrics listener");

    describe_metrics();
}

fn describe_metrics() {
    metrics::describe_histogram!(
        HTTP_REQUEST_DURATION,
        metrics::Unit::Seconds,
        "Duration of a single real http request. If there were retries, then these \
        will appear as separate observations."
    );
    metrics::describe_histogram!(
        HTTP_REQUEST_EFFECTIVE_DURATION,
        metrics::Unit::Seconds,
        "Same as `http_request_duration_seconds` but covers the time it took to \
        do retries of the request."
    );
    metrics::describe_counter!(
        GATE_EVALUATIONS,
        "Number of subscription gate evaluations by resolved stage"
    );
    metrics::describe_counter!(
        GATE_MEMBERSHIP_CHECKS,
        "Number of channel membership checks by channel kind and outcome"
    );
    metrics::describe_counter!(
        SPONSOR_CACHE_LOOKUPS,
        "Number of sponsor channel cache lookups by outcome"
    );
    metrics::describe_counter!(
        SPONSOR_PROVIDER_REQUESTS,
        "Number of requests to the sponsor channel provider by outcome"
    );
    metrics::describe_counter!(TG_UPDATES, "Number of updates received from Telegram");
}
