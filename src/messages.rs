use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{Configuration, ConflictResolutionPolicy, Schema, SerializationFormat};
use crate::scope::ScopeInfo;

/// Opaque handle to a set of change rows staged by a provider. The
/// orchestrator never inspects `payload` — it only moves the value
/// from the selecting call to the applying call unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInfo {
    pub id: Uuid,
    pub row_count: usize,
    pub payload: Value,
}

/// Summary of a change-selection call. The orchestrator reads only
/// `total_changes_selected`; per-table counts are informational.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseChangesSelected {
    pub total_changes_selected: u64,
    pub table_changes: HashMap<String, u64>,
}

/// Summary of an apply call. The orchestrator reads
/// `total_applied_changes` and `total_applied_changes_failed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseChangesApplied {
    pub total_applied_changes: u64,
    pub total_applied_changes_failed: u64,
    pub table_changes: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBeginSession {
    pub serialization_format: SerializationFormat,
    pub configuration: Configuration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnsureScopes {
    pub serialization_format: SerializationFormat,
    pub scope_name: String,
    /// Set only on the call to the remote peer: the local scope's own
    /// id, so the remote can locate/create its client-reference row.
    pub client_reference_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnsureSchema {
    pub serialization_format: SerializationFormat,
    pub scope_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnsureDatabase {
    pub serialization_format: SerializationFormat,
    pub schema: Schema,
    pub filters: Vec<String>,
    pub scope: ScopeInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTimestamp {
    pub serialization_format: SerializationFormat,
    pub scope_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageGetChangesBatch {
    pub serialization_format: SerializationFormat,
    pub scope_id: Uuid,
    pub is_new_scope: bool,
    pub timestamp: i64,
    pub policy: ConflictResolutionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageApplyChanges {
    pub serialization_format: SerializationFormat,
    pub scope_id: Uuid,
    pub is_new_scope: bool,
    pub timestamp: i64,
    pub policy: ConflictResolutionPolicy,
    pub changes: BatchInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageWriteScopes {
    pub serialization_format: SerializationFormat,
    pub scopes: Vec<ScopeInfo>,
}
