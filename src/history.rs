//! Exchange history
//!
//! The engines write completed exchanges to a [`HistorySink`]; nothing in
//! the core reads them back. [`MemoryHistory`] is a bounded in-memory sink
//! with filtering and a versioned JSON export/import format:
//!
//! ```json
//! {"version": 1, "exported_at": "2026-01-01T00:00:00Z", "records": [...]}
//! ```

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProbeError, Result};

/// Export format version understood by [`MemoryHistory::import`].
pub const EXPORT_VERSION: u32 = 1;

/// Whether an exchange produced an answer or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeStatus {
    /// A result (or no reply, for notifications)
    Success,
    /// A transport failure or a JSON-RPC error response
    Error,
}

/// One completed exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    /// Unique record id
    pub id: String,
    /// When the exchange finished
    pub timestamp: DateTime<Utc>,
    /// JSON-RPC method
    pub method: String,
    /// Method family, e.g. `tools` for `tools/call`
    pub category: String,
    /// Outbound message
    pub request: Value,
    /// Inbound reply, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Transport failure text, if the exchange failed outright
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Round-trip time
    pub duration_ms: f64,
    /// Serialized size of request plus response
    pub size_bytes: usize,
}

/// Method family: the part before the first `/`, or `core` for bare
/// methods such as `initialize` and `ping`.
pub fn category_of(method: &str) -> String {
    match method.split_once('/') {
        Some((family, _)) if !family.is_empty() => family.to_string(),
        _ => "core".to_string(),
    }
}

impl ExchangeRecord {
    /// Record an exchange that just finished.
    pub fn new(
        method: impl Into<String>,
        request: Value,
        response: Option<Value>,
        error: Option<String>,
        duration_ms: f64,
    ) -> Self {
        let method = method.into();
        let size_bytes = request.to_string().len()
            + response.as_ref().map(|r| r.to_string().len()).unwrap_or(0);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            category: category_of(&method),
            method,
            request,
            response,
            error,
            duration_ms,
            size_bytes,
        }
    }

    /// Error when the transport failed or the reply carries an `error`.
    pub fn status(&self) -> ExchangeStatus {
        let error_reply = self
            .response
            .as_ref()
            .and_then(|r| r.get("error"))
            .is_some();
        if self.error.is_some() || error_reply {
            ExchangeStatus::Error
        } else {
            ExchangeStatus::Success
        }
    }

    fn mentions(&self, needle: &str) -> bool {
        let hay = |s: &str| s.to_lowercase().contains(needle);
        hay(&self.method)
            || hay(&self.request.to_string())
            || self.response.as_ref().map(|r| hay(&r.to_string())).unwrap_or(false)
            || self.error.as_deref().map(hay).unwrap_or(false)
    }
}

/// Append-only destination for completed exchanges.
pub trait HistorySink: Send + Sync {
    /// Store one record.
    fn append(&self, record: ExchangeRecord);
}

/// Criteria for [`MemoryHistory::filter`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Exact category
    pub category: Option<String>,
    /// Exact method
    pub method: Option<String>,
    /// Inclusive lower bound on timestamp
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on timestamp
    pub until: Option<DateTime<Utc>>,
    /// Outcome
    pub status: Option<ExchangeStatus>,
    /// Case-insensitive substring of method, request, response or error
    pub text: Option<String>,
}

impl HistoryFilter {
    fn matches(&self, record: &ExchangeRecord) -> bool {
        if let Some(category) = &self.category {
            if &record.category != category {
                return false;
            }
        }
        if let Some(method) = &self.method {
            if &record.method != method {
                return false;
            }
        }
        if self.since.map(|t| record.timestamp < t).unwrap_or(false) {
            return false;
        }
        if self.until.map(|t| record.timestamp > t).unwrap_or(false) {
            return false;
        }
        if let Some(status) = self.status {
            if record.status() != status {
                return false;
            }
        }
        match &self.text {
            Some(text) if !text.is_empty() => record.mentions(&text.to_lowercase()),
            _ => true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportDocument {
    version: u32,
    exported_at: DateTime<Utc>,
    records: Vec<ExchangeRecord>,
}

/// Bounded in-memory history. The oldest record is evicted when full.
#[derive(Debug)]
pub struct MemoryHistory {
    capacity: usize,
    records: Mutex<VecDeque<ExchangeRecord>>,
}

impl MemoryHistory {
    /// Empty history holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ExchangeRecord>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn push(&self, records: &mut VecDeque<ExchangeRecord>, record: ExchangeRecord) {
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Maximum number of records kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All records, oldest first.
    pub fn records(&self) -> Vec<ExchangeRecord> {
        self.lock().iter().cloned().collect()
    }

    /// Records matching `filter`, oldest first.
    pub fn filter(&self, filter: &HistoryFilter) -> Vec<ExchangeRecord> {
        self.lock()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Serialize all records in the versioned export format.
    pub fn export(&self) -> Result<String> {
        let doc = ExportDocument {
            version: EXPORT_VERSION,
            exported_at: Utc::now(),
            records: self.records(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Write the export to `path`.
    pub fn export_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.export()?)?;
        tracing::info!(path = %path.display(), records = self.len(), "history exported");
        Ok(())
    }

    /// Append records from an export document. Returns how many were read.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or an unknown `version`.
    pub fn import(&self, text: &str) -> Result<usize> {
        let raw: Value = serde_json::from_str(text)?;
        let version = raw.get("version").and_then(Value::as_u64);
        if version != Some(u64::from(EXPORT_VERSION)) {
            return Err(ProbeError::History(format!(
                "unsupported export version {}",
                raw.get("version").cloned().unwrap_or(Value::Null)
            ))
            .into());
        }
        let doc: ExportDocument = serde_json::from_value(raw)?;
        let count = doc.records.len();
        let mut records = self.lock();
        for record in doc.records {
            self.push(&mut records, record);
        }
        Ok(count)
    }

    /// Import from a file written by [`MemoryHistory::export_to`].
    pub fn import_from(&self, path: impl AsRef<Path>) -> Result<usize> {
        let text = std::fs::read_to_string(path.as_ref())?;
        self.import(&text)
    }
}

impl HistorySink for MemoryHistory {
    fn append(&self, record: ExchangeRecord) {
        let mut records = self.lock();
        self.push(&mut records, record);
    }
}
