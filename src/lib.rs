//! Orchestrator for a bidirectional, multi-scope database replication
//! session between a local (client) peer and a remote (server) peer.
//!
//! The crate owns the state machine and scope/timestamp bookkeeping
//! (see [`orchestrator::Orchestrator`]); concrete peer behavior (schema
//! introspection, SQL generation, row diffing, batch I/O, database
//! connectors) is supplied by implementing the [`provider::Provider`]
//! trait. No such implementation ships here beyond the in-memory
//! [`testing::InMemoryProvider`] used by this crate's own tests.

pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod messages;
pub mod orchestrator;
pub mod provider;
pub mod scope;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Configuration, ConflictResolutionPolicy, Schema, SerializationFormat};
pub use context::{Parameters, SyncContext, SyncType, SyncWay};
pub use error::{SyncException, SyncStage};
pub use lifecycle::{SessionLifecycle, SessionObserver};
pub use messages::{
    BatchInfo, DatabaseChangesApplied, DatabaseChangesSelected, MessageApplyChanges,
    MessageBeginSession, MessageEnsureDatabase, MessageEnsureSchema, MessageEnsureScopes,
    MessageGetChangesBatch, MessageTimestamp, MessageWriteScopes,
};
pub use orchestrator::Orchestrator;
pub use provider::{
    CancellationToken, ConfigurationMutator, ProgressArgs, ProgressSink, Provider, ProviderRole,
};
pub use scope::ScopeInfo;
