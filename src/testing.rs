//! In-memory [`Provider`] used only by this crate's own tests. Backs
//! both peer roles with plain `HashMap`/`HashSet` state, a logical
//! clock, and tombstones — just enough behavior to drive the
//! orchestrator's phase sequence end to end without a real database.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::config::{Configuration, ConflictResolutionPolicy, Schema};
use crate::context::SyncContext;
use crate::error::SyncException;
use crate::messages::{
    BatchInfo, DatabaseChangesApplied, DatabaseChangesSelected, MessageApplyChanges,
    MessageBeginSession, MessageEnsureDatabase, MessageEnsureSchema, MessageEnsureScopes,
    MessageGetChangesBatch, MessageTimestamp, MessageWriteScopes,
};
use crate::provider::{CancellationToken, ConfigurationMutator, ProgressSink, Provider, ProviderRole};
use crate::scope::ScopeInfo;

type RowKey = (String, String);

pub struct InMemoryProvider {
    role: ProviderRole,
    clock: i64,
    tables: HashMap<String, HashMap<String, Value>>,
    row_updated_at: HashMap<RowKey, i64>,
    tombstones: HashSet<RowKey>,
    pub(crate) scope: ScopeInfo,
    /// Any scope record this peer was handed that isn't its own: the
    /// server's client-reference rows, or the client's shadow of the
    /// server's scope.
    pub(crate) other_scopes: HashMap<Uuid, ScopeInfo>,
    pub(crate) cancellation: CancellationToken,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl InMemoryProvider {
    pub fn new_client(scope_name: &str) -> Self {
        InMemoryProvider::new(ProviderRole::Local, scope_name)
    }

    pub fn new_server(scope_name: &str) -> Self {
        InMemoryProvider::new(ProviderRole::RemoteDirect, scope_name)
    }

    fn new(role: ProviderRole, scope_name: &str) -> Self {
        InMemoryProvider {
            role,
            clock: 0,
            tables: HashMap::new(),
            row_updated_at: HashMap::new(),
            tombstones: HashSet::new(),
            scope: ScopeInfo::new(Uuid::new_v4(), scope_name, true),
            other_scopes: HashMap::new(),
            cancellation: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn scope_id(&self) -> Uuid {
        self.scope.id
    }

    pub fn has_progress_sink(&self) -> bool {
        self.progress.is_some()
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    pub fn put_row(&mut self, table: &str, row_id: &str, value: Value) {
        let at = self.tick();
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(row_id.to_string(), value);
        self.tombstones.remove(&(table.to_string(), row_id.to_string()));
        self.row_updated_at
            .insert((table.to_string(), row_id.to_string()), at);
    }

    pub fn delete_row(&mut self, table: &str, row_id: &str) {
        let at = self.tick();
        if let Some(rows) = self.tables.get_mut(table) {
            rows.remove(row_id);
        }
        self.tombstones
            .insert((table.to_string(), row_id.to_string()));
        self.row_updated_at
            .insert((table.to_string(), row_id.to_string()), at);
    }

    pub fn get_row(&self, table: &str, row_id: &str) -> Option<&Value> {
        self.tables.get(table).and_then(|rows| rows.get(row_id))
    }

    fn row_change_entries(&self, since: i64, all: bool) -> (Value, DatabaseChangesSelected) {
        let mut entries = Vec::new();
        let mut per_table: HashMap<String, u64> = HashMap::new();
        for ((table, row_id), updated_at) in &self.row_updated_at {
            if !all && *updated_at <= since {
                continue;
            }
            let deleted = self.tombstones.contains(&(table.clone(), row_id.clone()));
            let value = if deleted {
                Value::Null
            } else {
                self.tables
                    .get(table)
                    .and_then(|rows| rows.get(row_id))
                    .cloned()
                    .unwrap_or(Value::Null)
            };
            entries.push(serde_json::json!({
                "table": table,
                "row_id": row_id,
                "value": value,
                "deleted": deleted,
            }));
            *per_table.entry(table.clone()).or_insert(0) += 1;
        }
        let total = entries.len() as u64;
        (
            Value::Array(entries),
            DatabaseChangesSelected {
                total_changes_selected: total,
                table_changes: per_table,
            },
        )
    }
}

impl Provider for InMemoryProvider {
    fn role(&self) -> ProviderRole {
        self.role
    }

    fn begin_session(
        &mut self,
        ctx: SyncContext,
        msg: MessageBeginSession,
    ) -> Result<(SyncContext, Configuration), SyncException> {
        Ok((ctx, msg.configuration))
    }

    fn end_session(&mut self, ctx: SyncContext) -> Result<SyncContext, SyncException> {
        Ok(ctx)
    }

    fn ensure_scopes(
        &mut self,
        ctx: SyncContext,
        msg: MessageEnsureScopes,
    ) -> Result<(SyncContext, Vec<ScopeInfo>), SyncException> {
        match msg.client_reference_id {
            None => Ok((ctx, vec![self.scope.clone()])),
            Some(client_id) => {
                let reference = self
                    .other_scopes
                    .entry(client_id)
                    .or_insert_with(|| ScopeInfo::new(client_id, &msg.scope_name, false))
                    .clone();
                Ok((ctx, vec![self.scope.clone(), reference]))
            }
        }
    }

    fn ensure_schema(
        &mut self,
        ctx: SyncContext,
        _msg: MessageEnsureSchema,
    ) -> Result<(SyncContext, Schema), SyncException> {
        let mut tables: Vec<String> = self.tables.keys().cloned().collect();
        tables.sort();
        Ok((ctx, Schema { tables }))
    }

    fn ensure_database(
        &mut self,
        ctx: SyncContext,
        _msg: MessageEnsureDatabase,
    ) -> Result<SyncContext, SyncException> {
        Ok(ctx)
    }

    fn get_local_timestamp(
        &mut self,
        ctx: SyncContext,
        _msg: MessageTimestamp,
    ) -> Result<(SyncContext, i64), SyncException> {
        Ok((ctx, self.clock))
    }

    fn get_change_batch(
        &mut self,
        ctx: SyncContext,
        msg: MessageGetChangesBatch,
    ) -> Result<(SyncContext, BatchInfo, DatabaseChangesSelected), SyncException> {
        let (payload, selected) = self.row_change_entries(msg.timestamp, msg.is_new_scope);
        let row_count = selected.total_changes_selected as usize;
        let batch = BatchInfo {
            id: Uuid::new_v4(),
            row_count,
            payload,
        };
        Ok((ctx, batch, selected))
    }

    fn apply_changes(
        &mut self,
        mut ctx: SyncContext,
        msg: MessageApplyChanges,
    ) -> Result<(SyncContext, DatabaseChangesApplied), SyncException> {
        let rows = msg.changes.payload.as_array().cloned().unwrap_or_default();
        let mut applied = 0u64;
        let mut conflicts = 0u64;
        let mut per_table: HashMap<String, u64> = HashMap::new();

        for row in rows {
            let table = row.get("table").and_then(Value::as_str).unwrap_or("").to_string();
            let row_id = row
                .get("row_id")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let deleted = row.get("deleted").and_then(Value::as_bool).unwrap_or(false);
            let value = row.get("value").cloned().unwrap_or(Value::Null);
            let key = (table.clone(), row_id.clone());

            let existing_updated_at = self.row_updated_at.get(&key).copied();
            let conflict = matches!(existing_updated_at, Some(at) if at > msg.timestamp);

            let accept = if conflict {
                conflicts += 1;
                msg.policy == ConflictResolutionPolicy::ClientWins
            } else {
                true
            };

            if accept {
                let at = self.tick();
                if deleted {
                    if let Some(rows) = self.tables.get_mut(&table) {
                        rows.remove(&row_id);
                    }
                    self.tombstones.insert(key.clone());
                } else {
                    self.tables
                        .entry(table.clone())
                        .or_default()
                        .insert(row_id.clone(), value);
                    self.tombstones.remove(&key);
                }
                self.row_updated_at.insert(key, at);
                applied += 1;
                *per_table.entry(table).or_insert(0) += 1;
            }
        }

        ctx.total_sync_conflicts = conflicts;
        Ok((
            ctx,
            DatabaseChangesApplied {
                total_applied_changes: applied,
                total_applied_changes_failed: 0,
                table_changes: per_table,
            },
        ))
    }

    fn write_scopes(
        &mut self,
        ctx: SyncContext,
        msg: MessageWriteScopes,
    ) -> Result<SyncContext, SyncException> {
        for scope in msg.scopes {
            if scope.id == self.scope.id {
                self.scope = scope;
            } else {
                self.other_scopes.insert(scope.id, scope);
            }
        }
        Ok(ctx)
    }

    fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancellation = token;
    }

    fn set_progress(&mut self, sink: Arc<dyn ProgressSink>) {
        self.progress = Some(sink);
    }

    fn set_configuration(&mut self, _mutator: ConfigurationMutator) {}
}
