//! Canonical in-memory and on-disk shape of an operation / transaction / status.
//!
//! Enumerations serialise by their lower-snake-case token; instants serialise
//! as ISO-8601 with an explicit UTC `Z` suffix via `chrono`. `parse(serialize(r))
//! == r` must hold for every well-formed record.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Move,
    Rename,
    Delete,
    Copy,
    Create,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Move => "move",
            OperationKind::Rename => "rename",
            OperationKind::Delete => "delete",
            OperationKind::Copy => "copy",
            OperationKind::Create => "create",
        }
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "move" => Ok(OperationKind::Move),
            "rename" => Ok(OperationKind::Rename),
            "delete" => Ok(OperationKind::Delete),
            "copy" => Ok(OperationKind::Copy),
            "create" => Ok(OperationKind::Create),
            other => Err(Error::input(format!("unknown operation kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Completed,
    Failed,
    RolledBack,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::RolledBack => "rolled_back",
        }
    }
}

impl FromStr for OperationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(OperationStatus::Pending),
            "completed" => Ok(OperationStatus::Completed),
            "failed" => Ok(OperationStatus::Failed),
            "rolled_back" => Ok(OperationStatus::RolledBack),
            other => Err(Error::input(format!("unknown operation status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    InProgress,
    Completed,
    Failed,
    PartiallyRolledBack,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::InProgress => "in_progress",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::PartiallyRolledBack => "partially_rolled_back",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(TransactionStatus::InProgress),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "partially_rolled_back" => Ok(TransactionStatus::PartiallyRolledBack),
            other => Err(Error::input(format!("unknown transaction status: {other}"))),
        }
    }
}

/// Filesystem facts captured at record time, free-form beyond the fixed
/// fields so future callers can stash extra detail without a migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OperationMetadata {
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub modified: Option<DateTime<Utc>>,
    pub is_file: bool,
    pub is_dir: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl OperationMetadata {
    pub fn from_path(path: &std::path::Path) -> Self {
        match std::fs::symlink_metadata(path) {
            Ok(meta) => {
                use std::os::unix::fs::MetadataExt;
                OperationMetadata {
                    size: Some(meta.len()),
                    mode: Some(meta.mode()),
                    modified: meta
                        .modified()
                        .ok()
                        .map(DateTime::<Utc>::from),
                    is_file: meta.is_file(),
                    is_dir: meta.is_dir(),
                    extras: serde_json::Map::new(),
                }
            }
            Err(_) => OperationMetadata::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: i64,
    pub kind: OperationKind,
    pub timestamp: DateTime<Utc>,
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub content_digest: Option<String>,
    pub metadata: OperationMetadata,
    pub transaction_id: Option<String>,
    pub status: OperationStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub operation_count: i64,
    pub status: TransactionStatus,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Dimensions a caller may filter a journal query by. `None` means
/// unrestricted on that dimension.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub kind: Option<OperationKind>,
    pub status: Option<OperationStatus>,
    pub transaction_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub path_substring: Option<String>,
    pub limit: Option<u32>,
    pub ascending: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kind_round_trips_through_string() {
        for kind in [
            OperationKind::Move,
            OperationKind::Rename,
            OperationKind::Delete,
            OperationKind::Copy,
            OperationKind::Create,
        ] {
            let s = kind.as_str();
            assert_eq!(OperationKind::from_str(s).unwrap(), kind);
        }
    }

    #[test]
    fn operation_status_round_trips_through_string() {
        for status in [
            OperationStatus::Pending,
            OperationStatus::Completed,
            OperationStatus::Failed,
            OperationStatus::RolledBack,
        ] {
            assert_eq!(OperationStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_kind_is_input_error() {
        assert!(matches!(
            OperationKind::from_str("bogus"),
            Err(Error::Input(_))
        ));
    }

    #[test]
    fn operation_serde_round_trips() {
        let op = Operation {
            id: 1,
            kind: OperationKind::Move,
            timestamp: Utc::now(),
            source: PathBuf::from("/a.txt"),
            destination: Some(PathBuf::from("/b/a.txt")),
            content_digest: Some("abc123".to_string()),
            metadata: OperationMetadata {
                size: Some(5),
                mode: Some(0o644),
                modified: Some(Utc::now()),
                is_file: true,
                is_dir: false,
                extras: serde_json::Map::new(),
            },
            transaction_id: Some("t1".to_string()),
            status: OperationStatus::Completed,
            error_message: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&op).unwrap();
        let parsed: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, parsed);
    }
}
