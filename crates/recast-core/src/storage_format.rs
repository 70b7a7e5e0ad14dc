//! Output storage formats and their catalog descriptors.
//!
//! Every supported format maps to a fixed descriptor: the Hadoop input and
//! output format classes, the serde library and its parameters, the
//! compression codec and any extra table parameters. Catalog entries for
//! converted tables are generated from these descriptors.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const TEXT_INPUT_FORMAT: &str = "org.apache.hadoop.mapred.TextInputFormat";
const TEXT_OUTPUT_FORMAT: &str = "org.apache.hadoop.hive.ql.io.HiveIgnoreKeyTextOutputFormat";

/// Serialization library settings attached to a storage descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerdeInfo {
    /// Fully qualified serde class.
    pub serialization_library: String,
    /// Serde parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Fixed catalog descriptor for a [`StorageFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Hadoop input format class.
    pub input_format: &'static str,
    /// Hadoop output format class.
    pub output_format: &'static str,
    /// Serde library class.
    pub serde_library: &'static str,
    /// Serde parameters.
    pub serde_parameters: &'static [(&'static str, &'static str)],
    /// Compression codec written by the query engine.
    pub compression: &'static str,
    /// Format-specific table parameters.
    pub extra_parameters: &'static [(&'static str, &'static str)],
}

impl FormatDescriptor {
    /// Builds the serde info for this descriptor.
    #[must_use]
    pub fn serde_info(&self) -> SerdeInfo {
        SerdeInfo {
            serialization_library: self.serde_library.to_string(),
            parameters: to_map(self.serde_parameters),
        }
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// Delimited text with a header line.
    Csv,
    /// Newline-delimited JSON.
    Json,
    /// Apache Parquet.
    Parquet,
}

impl StorageFormat {
    /// All supported formats.
    pub const ALL: [Self; 3] = [Self::Csv, Self::Json, Self::Parquet];

    /// Parses a format name using case-insensitive matching.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when `raw` is unknown or empty.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "parquet" => Ok(Self::Parquet),
            other => Err(Error::configuration(format!(
                "unknown storage format '{other}'; expected one of: csv, json, parquet"
            ))),
        }
    }

    /// Returns the canonical lowercase name, also used as the catalog classification.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Parquet => "parquet",
        }
    }

    /// Returns the catalog descriptor for this format.
    #[must_use]
    pub const fn descriptor(self) -> FormatDescriptor {
        match self {
            Self::Csv => FormatDescriptor {
                input_format: TEXT_INPUT_FORMAT,
                output_format: TEXT_OUTPUT_FORMAT,
                serde_library: "org.apache.hadoop.hive.serde2.OpenCSVSerde",
                serde_parameters: &[("separatorChar", ","), ("serialization.format", "1")],
                compression: "none",
                extra_parameters: &[
                    ("areColumnsQuoted", "false"),
                    ("skip.header.line.count", "1"),
                ],
            },
            Self::Json => FormatDescriptor {
                input_format: TEXT_INPUT_FORMAT,
                output_format: TEXT_OUTPUT_FORMAT,
                serde_library: "org.apache.hive.hcatalog.data.JsonSerDe",
                serde_parameters: &[("serialization.format", "1")],
                compression: "none",
                extra_parameters: &[],
            },
            Self::Parquet => FormatDescriptor {
                input_format: "org.apache.hadoop.hive.ql.io.parquet.MapredParquetInputFormat",
                output_format: "org.apache.hadoop.hive.ql.io.parquet.MapredParquetOutputFormat",
                serde_library: "org.apache.hadoop.hive.ql.io.parquet.serde.ParquetHiveSerDe",
                serde_parameters: &[("serialization.format", "1")],
                compression: "snappy",
                extra_parameters: &[],
            },
        }
    }

    /// Table parameters written for catalog entries in this format.
    #[must_use]
    pub fn table_parameters(self) -> BTreeMap<String, String> {
        let descriptor = self.descriptor();
        let mut parameters = to_map(&[
            ("classification", self.as_str()),
            ("compressionType", descriptor.compression),
            ("EXTERNAL", "TRUE"),
            ("typeOfData", "file"),
        ]);
        parameters.extend(to_map(descriptor.extra_parameters));
        parameters
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}
