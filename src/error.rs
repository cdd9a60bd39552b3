use thiserror::Error;

/// Stage at which a provider operation was in flight when it failed.
///
/// Carried on [`SyncException::Provider`] so a caller can tell *where*
/// in the phase sequence a session died without parsing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    None,
    BeginSession,
    EnsureScopes,
    EnsureSchema,
    EnsureDatabase,
    SelectingChanges,
    ApplyingChanges,
    WritingScopes,
}

/// Classified failure taxonomy for a sync session.
#[derive(Debug, Error)]
pub enum SyncException {
    /// A cancellation token was observed as set.
    #[error("sync session was cancelled")]
    Cancelled,

    /// An orchestrator invariant was violated by a peer's response
    /// (e.g. an unexpected scope count).
    #[error("protocol violation during {stage:?}: {message}")]
    Protocol { stage: SyncStage, message: String },

    /// A peer operation itself failed.
    #[error("provider operation failed during {stage:?}")]
    Provider {
        stage: SyncStage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Construction-time misuse (empty scope name, empty table list,
    /// proxy used where a direct peer is required, ...).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Anything else, wrapped with stage `None`.
    #[error("unknown sync error")]
    Unknown(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SyncException {
    pub fn protocol(stage: SyncStage, message: impl Into<String>) -> Self {
        SyncException::Protocol {
            stage,
            message: message.into(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        SyncException::Configuration(msg.into())
    }

    pub fn provider(
        stage: SyncStage,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        SyncException::Provider {
            stage,
            source: source.into(),
        }
    }

    /// The stage this failure is tagged with, `None` for variants that
    /// are not provider-scoped.
    pub fn stage(&self) -> SyncStage {
        match self {
            SyncException::Provider { stage, .. } => *stage,
            SyncException::Protocol { stage, .. } => *stage,
            _ => SyncStage::None,
        }
    }
}
