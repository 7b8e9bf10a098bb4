//! # Metrics Collection
//!
//! Thin wrappers over the `metrics` facade so metric names and labels live in
//! one place.

use crate::domain::LedgerOperation;
use crate::secrets::backends::SecretBackendType;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Register descriptions for every metric the crate emits
pub fn describe_metrics() {
    describe_counter!(
        "secret_backend_calls_total",
        "Secret backend calls by provider, operation and status"
    );
    describe_histogram!(
        "secret_backend_call_duration_seconds",
        Unit::Seconds,
        "Secret backend call latency"
    );
    describe_counter!(
        "secret_backend_client_cache_lookups_total",
        "Backend client cache lookups by result"
    );
    describe_counter!("secret_reverts_total", "Revert requests by outcome");
    describe_counter!(
        "secret_ledger_write_failures_total",
        "Ledger appends that failed after a successful backend write"
    );
    describe_counter!(
        "secret_record_refresh_failures_total",
        "Secret record pointer refreshes that failed after a successful backend write"
    );
    describe_counter!(
        "secret_ledger_gaps_total",
        "Ledger chain breaks seen while building timelines"
    );
    describe_counter!("secret_provisions_total", "Per-environment provisions by status");
    describe_counter!(
        "secret_provision_orphans_total",
        "Backend secrets left without a local record after a failed provision"
    );
    describe_counter!(
        "secret_provision_adoptions_total",
        "Orphaned backend secrets adopted by a later provision"
    );
}

/// Record one backend call and its latency
pub fn record_backend_call(
    provider: SecretBackendType,
    operation: &str,
    success: bool,
    duration: f64,
) {
    let status = if success { "success" } else { "error" };
    let labels = [
        ("provider", provider.as_str().to_string()),
        ("operation", operation.to_string()),
        ("status", status.to_string()),
    ];
    counter!("secret_backend_calls_total", &labels).increment(1);

    let duration_labels =
        [("provider", provider.as_str().to_string()), ("operation", operation.to_string())];
    histogram!("secret_backend_call_duration_seconds", &duration_labels).record(duration);
}

pub fn record_client_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("secret_backend_client_cache_lookups_total", "result" => result).increment(1);
}

/// Record a finished revert, `success` or `failed`
pub fn record_revert(outcome: &'static str) {
    counter!("secret_reverts_total", "outcome" => outcome).increment(1);
}

pub fn record_ledger_write_failure(operation: LedgerOperation) {
    counter!("secret_ledger_write_failures_total", "operation" => operation.as_str())
        .increment(1);
}

pub fn record_record_refresh_failure() {
    counter!("secret_record_refresh_failures_total").increment(1);
}

pub fn record_ledger_gaps(count: usize) {
    if count > 0 {
        counter!("secret_ledger_gaps_total").increment(count as u64);
    }
}

pub fn record_provisions(succeeded: usize, failed: usize) {
    counter!("secret_provisions_total", "status" => "success").increment(succeeded as u64);
    counter!("secret_provisions_total", "status" => "error").increment(failed as u64);
}

pub fn record_provision_orphan() {
    counter!("secret_provision_orphans_total").increment(1);
}

pub fn record_provision_adoption() {
    counter!("secret_provision_adoptions_total").increment(1);
}
