//! CLI command implementations.

pub mod convert_database;
pub mod convert_table;
pub mod copy_table;
pub mod partitions;
pub mod workgroup;

use recast_core::StorageFormat;

/// Parses a storage format argument.
///
/// # Errors
///
/// Returns the parse error message for unsupported formats.
pub fn parse_storage_format(raw: &str) -> Result<StorageFormat, String> {
    StorageFormat::parse(raw).map_err(|e| e.to_string())
}

/// Formats a byte count for humans.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
