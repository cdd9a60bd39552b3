use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Configuration;
use crate::context::SyncContext;
use crate::error::{SyncException, SyncStage};
use crate::messages::{
    BatchInfo, DatabaseChangesApplied, DatabaseChangesSelected, MessageApplyChanges,
    MessageBeginSession, MessageEnsureDatabase, MessageEnsureSchema, MessageEnsureScopes,
    MessageGetChangesBatch, MessageTimestamp, MessageWriteScopes,
};
use crate::scope::ScopeInfo;

/// Cooperative cancellation flag, checked by the orchestrator before
/// every phase and after every provider call that may take significant
/// time. Cloning shares the same underlying flag.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Milestone reported by a provider to its progress sink. Not driven
/// by the orchestrator — providers report at whatever granularity
/// makes sense for their own I/O (e.g. per-batch-file written).
#[derive(Debug, Clone)]
pub struct ProgressArgs {
    pub stage: SyncStage,
    pub message: String,
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, args: ProgressArgs);
}

/// Installed on a provider so it can ask the session owner to adjust
/// configuration before it is used. A proxy provider disallows
/// pre-session configuration mutation (see `ProviderRole`). `Arc`-backed
/// so the same mutator can be installed on both peers.
pub type ConfigurationMutator = Arc<dyn Fn(&mut Configuration) + Send + Sync>;

/// Capability distinction between peer roles. This is not an
/// inheritance fact — both direct and proxied remotes speak the same
/// `Provider` trait — it only gates which construction variant (and
/// which side of a session) a given provider may play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    /// The client, always usable as the local peer.
    Local,
    /// A remote peer reachable directly, capable of serving a session
    /// on its own (schema/database/scope storage all local to it).
    RemoteDirect,
    /// A thin client-side proxy over a wire protocol to a remote
    /// peer. `ensure_database` is a no-op on a proxy and it cannot be
    /// used where a direct peer is required.
    RemoteProxy,
}

impl ProviderRole {
    /// Whether a provider in this role can serve as the remote peer in
    /// the tables-aware (direct) construction variant.
    pub fn is_server_capable(self) -> bool {
        matches!(self, ProviderRole::Local | ProviderRole::RemoteDirect)
    }
}

/// Uniform capability set exposed by both peers. The orchestrator
/// composes these nine operations in a fixed order; it never touches
/// a database directly.
///
/// Every method threads `SyncContext` explicitly: it is consumed and
/// a (possibly updated) context is returned, rather than mutated in
/// place behind the scenes.
pub trait Provider {
    fn role(&self) -> ProviderRole;

    fn begin_session(
        &mut self,
        ctx: SyncContext,
        msg: MessageBeginSession,
    ) -> Result<(SyncContext, Configuration), SyncException>;

    fn end_session(&mut self, ctx: SyncContext) -> Result<SyncContext, SyncException>;

    fn ensure_scopes(
        &mut self,
        ctx: SyncContext,
        msg: MessageEnsureScopes,
    ) -> Result<(SyncContext, Vec<ScopeInfo>), SyncException>;

    fn ensure_schema(
        &mut self,
        ctx: SyncContext,
        msg: MessageEnsureSchema,
    ) -> Result<(SyncContext, crate::config::Schema), SyncException>;

    fn ensure_database(
        &mut self,
        ctx: SyncContext,
        msg: MessageEnsureDatabase,
    ) -> Result<SyncContext, SyncException>;

    fn get_local_timestamp(
        &mut self,
        ctx: SyncContext,
        msg: MessageTimestamp,
    ) -> Result<(SyncContext, i64), SyncException>;

    fn get_change_batch(
        &mut self,
        ctx: SyncContext,
        msg: MessageGetChangesBatch,
    ) -> Result<(SyncContext, BatchInfo, DatabaseChangesSelected), SyncException>;

    fn apply_changes(
        &mut self,
        ctx: SyncContext,
        msg: MessageApplyChanges,
    ) -> Result<(SyncContext, DatabaseChangesApplied), SyncException>;

    fn write_scopes(
        &mut self,
        ctx: SyncContext,
        msg: MessageWriteScopes,
    ) -> Result<SyncContext, SyncException>;

    fn set_cancellation(&mut self, token: CancellationToken);
    fn set_progress(&mut self, sink: Arc<dyn ProgressSink>);
    fn set_configuration(&mut self, mutator: ConfigurationMutator);
}
