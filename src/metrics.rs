// src/metrics.rs
//
// Metrics hooks for the pricing core. Compiled to no-ops unless the
// `observability` feature is enabled, so callers never have to guard a
// recording site.

/// Initializes metric descriptions. Call once at startup, after installing a
/// recorder.
pub fn describe_metrics() {
    #[cfg(feature = "observability")]
    {
        ::metrics::describe_histogram!(
            "pricing_adapter_latency_ms",
            "Per-adapter latency of identifier/price fan-out calls."
        );
        ::metrics::describe_counter!(
            "pricing_adapter_timeouts_total",
            "Adapter calls abandoned at their per-call deadline."
        );
        ::metrics::describe_counter!(
            "pricing_adapter_errors_total",
            "Adapter calls that returned an error."
        );
        ::metrics::describe_counter!(
            "pricing_validation_rejections_total",
            "Quotes dropped by the post-hoc validation gate."
        );
        ::metrics::describe_counter!(
            "pricing_lifecycle_retries_total",
            "Scheduled init/release retries."
        );
        ::metrics::describe_histogram!(
            "pricing_multicall_batch_size",
            "Calls per dispatched multicall batch."
        );
    }
}

pub fn record_adapter_latency(op: &'static str, dex_key: &str, millis: f64) {
    #[cfg(feature = "observability")]
    ::metrics::histogram!(
        "pricing_adapter_latency_ms",
        millis,
        "op" => op,
        "dex" => dex_key.to_string()
    );
    #[cfg(not(feature = "observability"))]
    let _ = (op, dex_key, millis);
}

pub fn increment_adapter_timeout(op: &'static str, dex_key: &str) {
    #[cfg(feature = "observability")]
    ::metrics::counter!(
        "pricing_adapter_timeouts_total",
        1,
        "op" => op,
        "dex" => dex_key.to_string()
    );
    #[cfg(not(feature = "observability"))]
    let _ = (op, dex_key);
}

pub fn increment_adapter_error(op: &'static str, dex_key: &str) {
    #[cfg(feature = "observability")]
    ::metrics::counter!(
        "pricing_adapter_errors_total",
        1,
        "op" => op,
        "dex" => dex_key.to_string()
    );
    #[cfg(not(feature = "observability"))]
    let _ = (op, dex_key);
}

pub fn increment_validation_rejection(dex_key: &str) {
    #[cfg(feature = "observability")]
    ::metrics::counter!(
        "pricing_validation_rejections_total",
        1,
        "dex" => dex_key.to_string()
    );
    #[cfg(not(feature = "observability"))]
    let _ = dex_key;
}

pub fn increment_lifecycle_retry(op: &'static str, dex_key: &str) {
    #[cfg(feature = "observability")]
    ::metrics::counter!(
        "pricing_lifecycle_retries_total",
        1,
        "op" => op,
        "dex" => dex_key.to_string()
    );
    #[cfg(not(feature = "observability"))]
    let _ = (op, dex_key);
}

pub fn record_multicall_batch_size(size: f64) {
    #[cfg(feature = "observability")]
    ::metrics::histogram!("pricing_multicall_batch_size", size);
    #[cfg(not(feature = "observability"))]
    let _ = size;
}
