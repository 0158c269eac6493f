use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::error::EtlError;
use crate::retry::RetryPolicy;

pub const DEFAULT_SOURCE_TABLE: &str = "devices";
pub const DEFAULT_SINK_TABLE: &str = "devices_statistics";

/// Order in which a bucket's points are walked when summing distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BucketOrdering {
    /// Order rows came back from the source store.
    #[default]
    Arrival,
    /// Sorted by timestamp, ties kept in arrival order.
    Chronological,
}

/// Everything one ETL run needs, fixed before the run starts.
#[derive(Debug, Clone)]
pub struct Config {
    pub source_url: String,
    pub sink_url: String,
    pub source_table: String,
    pub sink_table: String,
    pub startup_delay: Duration,
    pub retry: RetryPolicy,
    pub ordering: BucketOrdering,
    pub verify_limit: usize,
    pub report_path: Option<PathBuf>,
}

impl Config {
    pub fn new(source_url: impl Into<String>, sink_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            sink_url: sink_url.into(),
            source_table: DEFAULT_SOURCE_TABLE.to_string(),
            sink_table: DEFAULT_SINK_TABLE.to_string(),
            startup_delay: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            ordering: BucketOrdering::Arrival,
            verify_limit: 5,
            report_path: None,
        }
    }

    pub fn validate(&self) -> Result<(), EtlError> {
        validate_identifier(&self.source_table)?;
        validate_identifier(&self.sink_table)?;
        if self.source_url.trim().is_empty() {
            return Err(EtlError::Config("source connection string is empty".into()));
        }
        if self.sink_url.trim().is_empty() {
            return Err(EtlError::Config("sink connection string is empty".into()));
        }
        Ok(())
    }
}

/// Table names are spliced into SQL, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> Result<(), EtlError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(EtlError::Config(format!("'{name}' is not a valid table name")))
    }
}
