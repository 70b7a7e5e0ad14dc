//! Conversion metrics.
//!
//! Counters and histograms for table conversions, recorded through the
//! `metrics` facade. Installing an exporter is up to the embedding process;
//! without one, recording is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Tables converted, labelled by `result` (`success` or `failure`).
pub const TABLES_CONVERTED: &str = "recast_tables_converted_total";

/// Bytes scanned by conversion queries.
pub const BYTES_SCANNED: &str = "recast_bytes_scanned_total";

/// Wall-clock duration of one table conversion.
pub const TABLE_CONVERSION_DURATION: &str = "recast_table_conversion_seconds";

/// Registers all conversion metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(TABLES_CONVERTED, "Total tables converted, by result");
    describe_counter!(BYTES_SCANNED, "Total bytes scanned by conversion queries");
    describe_histogram!(TABLE_CONVERSION_DURATION, "Duration of table conversions in seconds");
}

/// Records a finished table conversion.
pub fn record_table_conversion(success: bool, bytes_scanned: u64, duration_secs: f64) {
    let result = if success { "success" } else { "failure" };
    counter!(TABLES_CONVERTED, "result" => result).increment(1);
    histogram!(TABLE_CONVERSION_DURATION, "result" => result).record(duration_secs);
    if bytes_scanned > 0 {
        counter!(BYTES_SCANNED).increment(bytes_scanned);
    }
}
