use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Row-level filter bindings threaded into the session at start.
/// Kept as an ordered `Vec` rather than a map: providers may depend on
/// binding order when building parameterized filter predicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Parameters(Vec<(String, Value)>);

impl Parameters {
    pub fn new() -> Self {
        Parameters(Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncType {
    Normal,
    Reinitialize,
    ReinitializeWithUpload,
}

/// Direction of the currently active phase. Mutated twice per session:
/// `Upload` while client changes are selected and applied, `Download`
/// while server changes are selected and applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncWay {
    Upload,
    Download,
}

/// Session-scoped state threaded through every provider call. Every
/// `Provider` method consumes a `SyncContext` and returns one back —
/// no call mutates a context it doesn't also return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncContext {
    pub session_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub complete_time: Option<DateTime<Utc>>,
    pub sync_type: SyncType,
    pub sync_way: SyncWay,
    pub parameters: Parameters,
    pub total_changes_uploaded: u64,
    pub total_changes_downloaded: u64,
    pub total_sync_errors: u64,
    pub total_sync_conflicts: u64,
}

impl SyncContext {
    pub fn new(sync_type: SyncType, parameters: Parameters, start_time: DateTime<Utc>) -> Self {
        SyncContext {
            session_id: Uuid::new_v4(),
            start_time,
            complete_time: None,
            sync_type,
            sync_way: SyncWay::Upload,
            parameters,
            total_changes_uploaded: 0,
            total_changes_downloaded: 0,
            total_sync_errors: 0,
            total_sync_conflicts: 0,
        }
    }
}
