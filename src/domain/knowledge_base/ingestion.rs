//! Document ingestion operations tracked by the backend

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an ingestion operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    /// Queued but not yet started
    #[default]
    Pending,

    /// Currently running
    InProgress,

    Success,

    Failed,

    Timeout,

    Cancelled,
}

impl IngestionStatus {
    /// Whether the operation may still change state
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingestion operation as listed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionOperation {
    pub id: String,

    /// File or URL the documents came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,

    pub status: IngestionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl IngestionOperation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Whether any operation in the list is still pending or running
pub fn any_active(operations: &[IngestionOperation]) -> bool {
    operations.iter().any(IngestionOperation::is_active)
}
