use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Configuration, ConflictResolutionPolicy, SerializationFormat};
use crate::context::{Parameters, SyncContext, SyncType, SyncWay};
use crate::error::{SyncException, SyncStage};
use crate::lifecycle::{SessionLifecycle, SessionObserver};
use crate::messages::{
    MessageApplyChanges, MessageBeginSession, MessageEnsureDatabase, MessageEnsureSchema,
    MessageEnsureScopes, MessageGetChangesBatch, MessageTimestamp, MessageWriteScopes,
};
use crate::provider::{CancellationToken, ConfigurationMutator, ProgressSink, Provider, ProviderRole};
use crate::scope::ScopeInfo;

const DEFAULT_SCOPE_NAME: &str = "DefaultScope";

/// Drives one bidirectional sync session between a local and a remote
/// [`Provider`]. One orchestrator instance serializes its own
/// sessions — a second `synchronize` call while one is in flight is
/// rejected rather than queued.
pub struct Orchestrator<L: Provider, R: Provider> {
    local: L,
    remote: R,
    configuration: Configuration,
    state: SessionLifecycle,
    observer: Option<Arc<dyn SessionObserver>>,
    progress: Option<Arc<dyn ProgressSink>>,
    configuration_mutator: Option<ConfigurationMutator>,
    cancellation: CancellationToken,
    in_session: Arc<AtomicBool>,
    last_ctx: Option<SyncContext>,
}

impl<L: Provider, R: Provider> Orchestrator<L, R> {
    /// Direct peers, known tables. `scope_name` of `None` defaults to
    /// `"DefaultScope"`. `remote` must self-identify as server-capable
    /// (a proxy provider is rejected here — use [`Self::with_proxy`]).
    pub fn with_tables(
        scope_name: Option<&str>,
        local: L,
        remote: R,
        tables: Vec<String>,
    ) -> Result<Self, SyncException> {
        let scope_name = resolve_scope_name(scope_name)?;
        if tables.is_empty() {
            return Err(SyncException::configuration(
                "tables list must not be empty for the direct-peer construction variant",
            ));
        }
        if !remote.role().is_server_capable() {
            return Err(SyncException::configuration(
                "remote provider must be server-capable; a proxy cannot be used here",
            ));
        }
        Ok(Self::new(scope_name, local, remote, tables))
    }

    /// Proxy remote: table configuration is assumed to be carried by
    /// the server behind the proxy.
    pub fn with_proxy(scope_name: Option<&str>, local: L, remote: R) -> Result<Self, SyncException> {
        let scope_name = resolve_scope_name(scope_name)?;
        Ok(Self::new(scope_name, local, remote, Vec::new()))
    }

    fn new(scope_name: String, local: L, remote: R, tables: Vec<String>) -> Self {
        Orchestrator {
            local,
            remote,
            configuration: Configuration::new(scope_name, tables),
            state: SessionLifecycle::Ready,
            observer: None,
            progress: None,
            configuration_mutator: None,
            cancellation: CancellationToken::new(),
            in_session: Arc::new(AtomicBool::new(false)),
            last_ctx: None,
        }
    }

    pub fn set_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observer = Some(observer);
    }

    pub fn set_conflict_resolution_policy(&mut self, policy: ConflictResolutionPolicy) {
        self.configuration.conflict_resolution_policy = policy;
    }

    /// Install a progress sink, forwarded to both peers at the start of
    /// every session via `Provider::set_progress`.
    pub fn set_progress(&mut self, sink: Arc<dyn ProgressSink>) {
        self.progress = Some(sink);
    }

    /// Install a configuration mutator, forwarded to both peers at the
    /// start of every session via `Provider::set_configuration`. A
    /// provider may call it to request an adjustment to the
    /// session-owned `Configuration` before it is used.
    pub fn set_configuration_mutator(&mut self, mutator: ConfigurationMutator) {
        self.configuration_mutator = Some(mutator);
    }

    pub fn state(&self) -> SessionLifecycle {
        self.state
    }

    fn transition(&mut self, state: SessionLifecycle) {
        self.state = state;
        if let Some(observer) = &self.observer {
            observer.on_state_changed(state);
        }
    }

    /// Run one full sync session. Returns the final `SyncContext` on
    /// success; cancellation and provider/protocol failures propagate
    /// as `SyncException`. `end_session` is always attempted on both
    /// peers, even on failure or cancellation.
    pub fn synchronize(
        &mut self,
        sync_type: SyncType,
        parameters: Parameters,
        cancellation: CancellationToken,
    ) -> Result<SyncContext, SyncException> {
        if self.in_session.swap(true, Ordering::SeqCst) {
            return Err(SyncException::configuration(
                "orchestrator already has a session in progress",
            ));
        }

        self.cancellation = cancellation;
        self.last_ctx = None;
        self.local.set_cancellation(self.cancellation.clone());
        self.remote.set_cancellation(self.cancellation.clone());
        if let Some(sink) = &self.progress {
            self.local.set_progress(sink.clone());
            self.remote.set_progress(sink.clone());
        }
        if let Some(mutator) = &self.configuration_mutator {
            self.local.set_configuration(mutator.clone());
            self.remote.set_configuration(mutator.clone());
        }
        self.transition(SessionLifecycle::Synchronizing);
        info!("sync session starting");

        let result = self.run_session(sync_type, parameters);
        if let Err(e) = &result {
            warn!(error = %e, stage = ?e.stage(), "sync session failed");
        }

        if let Err(e) = self.run_end_session() {
            warn!(error = %e, "end_session failed during finalization; swallowing");
        }

        self.transition(SessionLifecycle::Ready);
        self.in_session.store(false, Ordering::SeqCst);
        info!("sync session finished");
        result
    }

    fn check_cancel(&self) -> Result<(), SyncException> {
        if self.cancellation.is_cancelled() {
            Err(SyncException::Cancelled)
        } else {
            Ok(())
        }
    }

    fn note(&mut self, ctx: &SyncContext) {
        self.last_ctx = Some(ctx.clone());
    }

    fn run_end_session(&mut self) -> Result<(), SyncException> {
        let ctx = match self.last_ctx.take() {
            Some(ctx) => ctx,
            None => SyncContext::new(SyncType::Normal, Parameters::new(), Utc::now()),
        };
        let ctx = self.remote.end_session(ctx)?;
        self.local.end_session(ctx)?;
        Ok(())
    }

    fn run_session(
        &mut self,
        sync_type: SyncType,
        parameters: Parameters,
    ) -> Result<SyncContext, SyncException> {
        let start_time = Utc::now();
        let mut ctx = SyncContext::new(sync_type, parameters, start_time);
        self.note(&ctx);
        self.check_cancel()?;

        // Step 1: BeginSession. The remote call may replace the
        // session's configuration wholesale (server-authoritative).
        debug!("phase: begin_session");
        let (ctx, remote_config) = self
            .remote
            .begin_session(
                ctx,
                MessageBeginSession {
                    serialization_format: SerializationFormat::Json,
                    configuration: self.configuration.clone(),
                },
            )
            .map_err(|e| wrap(e, SyncStage::BeginSession))?;
        self.configuration = remote_config;
        self.note(&ctx);
        self.check_cancel()?;

        let (ctx, _) = self
            .local
            .begin_session(
                ctx,
                MessageBeginSession {
                    serialization_format: SerializationFormat::Json,
                    configuration: self.configuration.clone(),
                },
            )
            .map_err(|e| wrap(e, SyncStage::BeginSession))?;
        self.note(&ctx);
        self.check_cancel()?;

        // Step 2: EnsureScopes.local
        debug!("phase: ensure_scopes.local");
        let (ctx, local_scopes) = self
            .local
            .ensure_scopes(
                ctx,
                MessageEnsureScopes {
                    serialization_format: SerializationFormat::Json,
                    scope_name: self.configuration.scope_name.clone(),
                    client_reference_id: None,
                },
            )
            .map_err(|e| wrap(e, SyncStage::EnsureScopes))?;
        self.note(&ctx);
        if local_scopes.len() != 1 {
            return Err(SyncException::protocol(
                SyncStage::EnsureScopes,
                format!("expected exactly 1 local scope, got {}", local_scopes.len()),
            ));
        }
        let mut local_scope_info = local_scopes.into_iter().next().unwrap();
        self.check_cancel()?;

        // Step 3: EnsureScopes.remote
        debug!("phase: ensure_scopes.remote");
        let (ctx, remote_scopes) = self
            .remote
            .ensure_scopes(
                ctx,
                MessageEnsureScopes {
                    serialization_format: SerializationFormat::Json,
                    scope_name: self.configuration.scope_name.clone(),
                    client_reference_id: Some(local_scope_info.id),
                },
            )
            .map_err(|e| wrap(e, SyncStage::EnsureScopes))?;
        self.note(&ctx);
        if remote_scopes.len() != 2 {
            return Err(SyncException::protocol(
                SyncStage::EnsureScopes,
                format!("expected exactly 2 remote scopes, got {}", remote_scopes.len()),
            ));
        }
        let (mut server_scope_info, mut local_scope_reference_info) =
            partition_remote_scopes(remote_scopes, local_scope_info.id)?;
        self.check_cancel()?;

        // Step 4: EnsureSchema.remote -> EnsureSchema.local
        debug!("phase: ensure_schema");
        let (ctx, schema) = self
            .remote
            .ensure_schema(
                ctx,
                MessageEnsureSchema {
                    serialization_format: SerializationFormat::Json,
                    scope_name: self.configuration.scope_name.clone(),
                },
            )
            .map_err(|e| wrap(e, SyncStage::EnsureSchema))?;
        self.note(&ctx);
        self.check_cancel()?;

        let (ctx, _) = self
            .local
            .ensure_schema(
                ctx,
                MessageEnsureSchema {
                    serialization_format: SerializationFormat::Json,
                    scope_name: self.configuration.scope_name.clone(),
                },
            )
            .map_err(|e| wrap(e, SyncStage::EnsureSchema))?;
        self.note(&ctx);
        self.configuration.schema = schema.clone();
        self.check_cancel()?;

        // Step 5: EnsureDatabase.remote -> EnsureDatabase.local
        debug!("phase: ensure_database");
        let ctx = self
            .remote
            .ensure_database(
                ctx,
                MessageEnsureDatabase {
                    serialization_format: SerializationFormat::Json,
                    schema: schema.clone(),
                    filters: self.configuration.filters.clone(),
                    scope: server_scope_info.clone(),
                },
            )
            .map_err(|e| wrap(e, SyncStage::EnsureDatabase))?;
        self.note(&ctx);
        self.check_cancel()?;

        let ctx = self
            .local
            .ensure_database(
                ctx,
                MessageEnsureDatabase {
                    serialization_format: SerializationFormat::Json,
                    schema,
                    filters: self.configuration.filters.clone(),
                    scope: local_scope_info.clone(),
                },
            )
            .map_err(|e| wrap(e, SyncStage::EnsureDatabase))?;
        self.note(&ctx);
        self.check_cancel()?;

        // Step 6: policies. If the server applies client rows with
        // `server_policy`, the client-side apply must use the
        // opposite so the same winner is retained on both peers.
        let server_policy = self.configuration.conflict_resolution_policy;
        let client_policy = server_policy.opposite();

        // Step 7: capture the client timestamp before any selection,
        // so concurrent local writes land in the *next* session.
        self.check_cancel()?;
        debug!("phase: get_local_timestamp.local");
        let (mut ctx, client_timestamp) = self
            .local
            .get_local_timestamp(
                ctx,
                MessageTimestamp {
                    serialization_format: SerializationFormat::Json,
                    scope_name: self.configuration.scope_name.clone(),
                },
            )
            .map_err(|e| wrap(e, SyncStage::SelectingChanges))?;
        self.note(&ctx);
        self.check_cancel()?;

        // Step 8: select client changes.
        debug!("phase: get_change_batch.local (upload)");
        ctx.sync_way = SyncWay::Upload;
        let (ctx, client_batch, client_changes_selected) = self
            .local
            .get_change_batch(
                ctx,
                MessageGetChangesBatch {
                    serialization_format: SerializationFormat::Json,
                    scope_id: server_scope_info.id,
                    is_new_scope: local_scope_info.is_new_scope,
                    timestamp: local_scope_info.last_sync_timestamp,
                    policy: client_policy,
                },
            )
            .map_err(|e| wrap(e, SyncStage::SelectingChanges))?;
        self.note(&ctx);
        self.check_cancel()?;

        // Step 9: apply client changes on remote; snapshot the
        // conflict counter immediately, before the later client-apply
        // resets it as a side effect.
        debug!("phase: apply_changes.remote (upload)");
        let (mut ctx, _client_changes_applied_on_remote) = self
            .remote
            .apply_changes(
                ctx,
                MessageApplyChanges {
                    serialization_format: SerializationFormat::Json,
                    scope_id: local_scope_info.id,
                    is_new_scope: false,
                    timestamp: local_scope_reference_info.last_sync_timestamp,
                    policy: server_policy,
                    changes: client_batch,
                },
            )
            .map_err(|e| wrap(e, SyncStage::ApplyingChanges))?;
        let conflicts_on_remote = ctx.total_sync_conflicts;
        self.note(&ctx);
        self.check_cancel()?;

        // Step 10: capture the server timestamp.
        debug!("phase: get_local_timestamp.remote");
        let (mut ctx, server_timestamp) = self
            .remote
            .get_local_timestamp(
                ctx,
                MessageTimestamp {
                    serialization_format: SerializationFormat::Json,
                    scope_name: self.configuration.scope_name.clone(),
                },
            )
            .map_err(|e| wrap(e, SyncStage::SelectingChanges))?;
        self.note(&ctx);
        self.check_cancel()?;

        // Step 11: select server changes.
        debug!("phase: get_change_batch.remote (download)");
        ctx.sync_way = SyncWay::Download;
        let (ctx, server_batch, _server_changes_selected) = self
            .remote
            .get_change_batch(
                ctx,
                MessageGetChangesBatch {
                    serialization_format: SerializationFormat::Json,
                    scope_id: local_scope_info.id,
                    is_new_scope: local_scope_reference_info.is_new_scope,
                    timestamp: local_scope_reference_info.last_sync_timestamp,
                    policy: server_policy,
                },
            )
            .map_err(|e| wrap(e, SyncStage::SelectingChanges))?;
        self.note(&ctx);
        self.check_cancel()?;

        // Step 12: apply server changes on local. `is_new_scope` here
        // derives from `local_scope_info`, not the reference: it
        // suppresses application of server-originated deletions on a
        // pristine client.
        debug!("phase: apply_changes.local (download)");
        let (mut ctx, client_changes_applied) = self
            .local
            .apply_changes(
                ctx,
                MessageApplyChanges {
                    serialization_format: SerializationFormat::Json,
                    scope_id: server_scope_info.id,
                    is_new_scope: local_scope_info.is_new_scope,
                    timestamp: local_scope_info.last_sync_timestamp,
                    policy: client_policy,
                    changes: server_batch,
                },
            )
            .map_err(|e| wrap(e, SyncStage::ApplyingChanges))?;
        self.note(&ctx);
        self.check_cancel()?;

        // total_sync_conflicts keeps the remote-apply snapshot taken
        // above; the client-apply call just above resets the field on
        // `ctx`, so it must not be re-read here.
        ctx.total_changes_downloaded = client_changes_applied.total_applied_changes;
        ctx.total_changes_uploaded = client_changes_selected.total_changes_selected;
        ctx.total_sync_errors = client_changes_applied.total_applied_changes_failed;
        ctx.total_sync_conflicts = conflicts_on_remote;

        let complete_time = Utc::now();
        ctx.complete_time = Some(complete_time);
        let duration = complete_time - start_time;

        // Step 13: update scope records in place.
        for scope in [
            &mut server_scope_info,
            &mut local_scope_reference_info,
            &mut local_scope_info,
        ] {
            scope.is_new_scope = false;
            scope.last_sync = Some(complete_time);
            scope.last_sync_duration = Some(duration);
        }
        server_scope_info.last_sync_timestamp = server_timestamp;
        local_scope_reference_info.last_sync_timestamp = server_timestamp;
        local_scope_info.last_sync_timestamp = client_timestamp;

        // Step 14: persist scopes on remote.
        debug!("phase: write_scopes.remote");
        server_scope_info.is_local = true;
        local_scope_reference_info.is_local = false;
        let ctx = self
            .remote
            .write_scopes(
                ctx,
                MessageWriteScopes {
                    serialization_format: SerializationFormat::Json,
                    scopes: vec![
                        server_scope_info.clone(),
                        local_scope_reference_info.clone(),
                    ],
                },
            )
            .map_err(|e| wrap(e, SyncStage::WritingScopes))?;
        self.note(&ctx);
        self.check_cancel()?;

        // Step 15: persist scopes on local.
        debug!("phase: write_scopes.local");
        server_scope_info.is_local = false;
        local_scope_info.is_local = true;
        let ctx = self
            .local
            .write_scopes(
                ctx,
                MessageWriteScopes {
                    serialization_format: SerializationFormat::Json,
                    scopes: vec![server_scope_info, local_scope_info],
                },
            )
            .map_err(|e| wrap(e, SyncStage::WritingScopes))?;
        self.note(&ctx);

        Ok(ctx)
    }
}

fn resolve_scope_name(scope_name: Option<&str>) -> Result<String, SyncException> {
    match scope_name {
        None => Ok(DEFAULT_SCOPE_NAME.to_string()),
        Some(name) if name.trim().is_empty() => {
            Err(SyncException::configuration("scope name must not be empty"))
        }
        Some(name) => Ok(name.to_string()),
    }
}

fn partition_remote_scopes(
    scopes: Vec<ScopeInfo>,
    local_scope_id: Uuid,
) -> Result<(ScopeInfo, ScopeInfo), SyncException> {
    let mut server_scope_info = None;
    let mut local_scope_reference_info = None;
    for scope in scopes {
        if scope.id == local_scope_id {
            local_scope_reference_info = Some(scope);
        } else {
            server_scope_info = Some(scope);
        }
    }
    let server_scope_info = server_scope_info.ok_or_else(|| {
        SyncException::protocol(
            SyncStage::EnsureScopes,
            "remote scopes did not include a server scope record",
        )
    })?;
    let local_scope_reference_info = local_scope_reference_info.ok_or_else(|| {
        SyncException::protocol(
            SyncStage::EnsureScopes,
            "remote scopes did not include a client reference record",
        )
    })?;
    Ok((server_scope_info, local_scope_reference_info))
}

fn wrap(e: SyncException, default_stage: SyncStage) -> SyncException {
    match e {
        SyncException::Provider { .. } | SyncException::Cancelled | SyncException::Protocol { .. } => e,
        SyncException::Configuration(msg) => SyncException::Configuration(msg),
        other => SyncException::provider(default_stage, Box::new(other)),
    }
}
