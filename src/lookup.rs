//! Auxiliary data lookup
//!
//! Read-only accessors over the invoice dataset and user-supplied files.
//! Nothing here fails hard: every outcome is a `LookupSignal` that a handler
//! can narrate back to the user.

use crate::models::InvoiceRecord;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Non-fault result of a lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LookupSignal {
    Records(Vec<InvoiceRecord>),
    NoMatches { filter: String },
    DatasetMissing,
    Content(String),
    FileNotFound,
    Failed(String),
}

impl LookupSignal {
    pub fn is_success(&self) -> bool {
        matches!(self, LookupSignal::Records(_) | LookupSignal::Content(_))
    }

    pub fn records(&self) -> Option<&[InvoiceRecord]> {
        match self {
            LookupSignal::Records(records) => Some(records),
            _ => None,
        }
    }
}

impl fmt::Display for LookupSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupSignal::Records(records) => {
                let rendered = serde_json::to_string_pretty(records).map_err(|_| fmt::Error)?;
                write!(f, "{}", rendered)
            }
            LookupSignal::NoMatches { filter } => {
                write!(f, "No invoices found for vendor: {}", filter)
            }
            LookupSignal::DatasetMissing => write!(f, "Error: Mock database not found."),
            LookupSignal::Content(content) => write!(f, "{}", content),
            LookupSignal::FileNotFound => write!(f, "File not found"),
            LookupSignal::Failed(detail) => write!(f, "{}", detail),
        }
    }
}

/// Fetch invoices whose vendor contains `vendor_filter` (case-insensitive),
/// or every invoice when no filter is given. Loaded fresh on every call.
pub async fn fetch_invoices(dataset: &Path, vendor_filter: Option<&str>) -> LookupSignal {
    if !tokio::fs::try_exists(dataset).await.unwrap_or(false) {
        return LookupSignal::DatasetMissing;
    }

    let raw = match tokio::fs::read_to_string(dataset).await {
        Ok(raw) => raw,
        Err(e) => return LookupSignal::Failed(format!("Error fetching invoices: {}", e)),
    };

    let invoices: Vec<InvoiceRecord> = match serde_json::from_str(&raw) {
        Ok(invoices) => invoices,
        Err(e) => return LookupSignal::Failed(format!("Error fetching invoices: {}", e)),
    };

    let filter = vendor_filter.map(str::trim).filter(|f| !f.is_empty());

    let results: Vec<InvoiceRecord> = match filter {
        Some(needle) => {
            let needle = needle.to_lowercase();
            invoices
                .into_iter()
                .filter(|inv| inv.vendor.to_lowercase().contains(&needle))
                .collect()
        }
        None => invoices,
    };

    debug!(filter = ?filter, matched = results.len(), "Invoice lookup complete");

    // An empty dataset with no filter is still a (vacuous) success.
    match filter {
        Some(needle) if results.is_empty() => LookupSignal::NoMatches {
            filter: needle.to_string(),
        },
        _ => LookupSignal::Records(results),
    }
}

/// Read a user file as text. JSON is parsed and re-serialized to normalize
/// formatting; every other format comes back untouched.
pub async fn read_file_content(path: &Path) -> LookupSignal {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return LookupSignal::FileNotFound;
    }

    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => return LookupSignal::Failed(format!("Error processing file: {}", e)),
    };

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if !is_json {
        return LookupSignal::Content(raw);
    }

    let normalized = serde_json::from_str::<serde_json::Value>(&raw)
        .and_then(|value| serde_json::to_string_pretty(&value));

    match normalized {
        Ok(content) => LookupSignal::Content(content),
        Err(e) => LookupSignal::Failed(format!("Error processing file: {}", e)),
    }
}
