use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::analytics::METRIC_ANALYTICS_COMPUTE_MS;
use crate::application::ingest::{
    METRIC_FEEDBACK_RECORDED, METRIC_READING_RECORDED, METRIC_VIEWS_DEDUPLICATED,
    METRIC_VIEWS_RECORDED,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_VIEWS_RECORDED,
            Unit::Count,
            "Total number of page views stored."
        );
        describe_counter!(
            METRIC_VIEWS_DEDUPLICATED,
            Unit::Count,
            "Total number of page views skipped as repeats within the dedup window."
        );
        describe_counter!(
            METRIC_FEEDBACK_RECORDED,
            Unit::Count,
            "Total number of ratings stored."
        );
        describe_counter!(
            METRIC_READING_RECORDED,
            Unit::Count,
            "Total number of reading sessions stored."
        );
        describe_histogram!(
            METRIC_ANALYTICS_COMPUTE_MS,
            Unit::Milliseconds,
            "Dashboard report latency in milliseconds, labelled by scope."
        );
    });
}
