use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Deterministic winner rule applied per row during apply. Symmetric
/// application across peers is required: whichever policy the server
/// applies with, the client-side apply must use the opposite so the
/// same winner survives on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolutionPolicy {
    ServerWins,
    ClientWins,
}

impl ConflictResolutionPolicy {
    pub fn opposite(self) -> Self {
        match self {
            ConflictResolutionPolicy::ServerWins => ConflictResolutionPolicy::ClientWins,
            ConflictResolutionPolicy::ClientWins => ConflictResolutionPolicy::ServerWins,
        }
    }
}

/// Wire tag carried on every message envelope so a provider that
/// crosses a transport boundary can round-trip a payload without
/// hidden state. Only `Json` is exercised by the in-memory test
/// provider shipped with this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerializationFormat {
    Json,
    Binary,
}

/// Authoritative table/schema description. Column-level detail (SQL
/// generation, types) is the responsibility of the external provider
/// implementation; the orchestrator only needs table identity to pass
/// through `ensure_database` and `get_change_batch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<String>,
}

/// Session-owned configuration. Initialized from the client at
/// construction, possibly replaced wholesale by the server's response
/// to `begin_session` (server-authoritative config) — never stored as
/// a field on either provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub scope_name: String,
    pub scope_info_table_name: String,
    pub serialization_format: SerializationFormat,
    pub schema: Schema,
    pub filters: Vec<String>,
    pub conflict_resolution_policy: ConflictResolutionPolicy,
    pub batch_size: u32,
    pub batch_directory: PathBuf,
}

impl Configuration {
    pub fn new(scope_name: impl Into<String>, tables: Vec<String>) -> Self {
        Configuration {
            scope_name: scope_name.into(),
            scope_info_table_name: "scope_info".to_string(),
            serialization_format: SerializationFormat::Json,
            schema: Schema { tables },
            filters: Vec::new(),
            conflict_resolution_policy: ConflictResolutionPolicy::ServerWins,
            batch_size: 2000,
            batch_directory: std::env::temp_dir().join("sync-orchestrator-batches"),
        }
    }
}
