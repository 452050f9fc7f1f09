//! Authentication metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless the host
//! installs a recorder (e.g. `metrics-exporter-prometheus`).
//!
//! # Metrics
//!
//! - `warden_sign_in_total` - Counter of sign-in attempts by result
//! - `warden_sign_in_duration_seconds` - Histogram of credential check latency by result
//! - `warden_stamp_validations_total` - Counter of store-backed stamp checks by outcome
//! - `warden_two_factor_validations_total` - Counter of second-factor checks by provider and outcome
//! - `warden_two_factor_fallback_total` - Counter of sign-ins where two-factor was
//!   flagged but no provider could serve the user

use metrics::{counter, histogram};

/// Metric name for sign-in attempts.
pub const SIGN_IN_TOTAL: &str = "warden_sign_in_total";

/// Metric name for sign-in latency.
pub const SIGN_IN_DURATION_SECONDS: &str = "warden_sign_in_duration_seconds";

/// Metric name for store-backed stamp validations.
pub const STAMP_VALIDATIONS_TOTAL: &str = "warden_stamp_validations_total";

/// Metric name for second-factor validations.
pub const TWO_FACTOR_VALIDATIONS_TOTAL: &str = "warden_two_factor_validations_total";

/// Metric name for the two-factor fallback.
pub const TWO_FACTOR_FALLBACK_TOTAL: &str = "warden_two_factor_fallback_total";

/// Record a finished sign-in attempt
pub fn record_sign_in(result: &'static str, duration_seconds: f64) {
    counter!(SIGN_IN_TOTAL, "result" => result).increment(1);
    histogram!(SIGN_IN_DURATION_SECONDS, "result" => result).record(duration_seconds);
}

/// Record a stamp check that reached the store
pub fn record_stamp_validation(outcome: &'static str) {
    counter!(STAMP_VALIDATIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a second-factor validation
pub fn record_two_factor_validation(provider: &str, outcome: &'static str) {
    counter!(
        TWO_FACTOR_VALIDATIONS_TOTAL,
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a sign-in that skipped the second factor because no provider
/// could serve the user
pub fn record_two_factor_fallback() {
    counter!(TWO_FACTOR_FALLBACK_TOTAL).increment(1);
}

/// Describe all metrics for registration with a recorder.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_histogram, Unit};

    describe_counter!(SIGN_IN_TOTAL, Unit::Count, "Sign-in attempts by result");
    describe_histogram!(
        SIGN_IN_DURATION_SECONDS,
        Unit::Seconds,
        "Duration of credential checks in seconds"
    );
    describe_counter!(
        STAMP_VALIDATIONS_TOTAL,
        Unit::Count,
        "Security stamp checks that reached the credential store"
    );
    describe_counter!(
        TWO_FACTOR_VALIDATIONS_TOTAL,
        Unit::Count,
        "Second-factor token validations by provider and outcome"
    );
    describe_counter!(
        TWO_FACTOR_FALLBACK_TOTAL,
        Unit::Count,
        "Sign-ins with two-factor flagged but no usable provider"
    );
}
