/// Observable orchestrator state. One session at a time: `Ready` is
/// the idle state, `Synchronizing` covers the whole phase sequence
/// including the finalization path on both success and failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    Ready,
    Synchronizing,
}

/// Notified on every `SessionLifecycle` transition — exactly twice per
/// `synchronize` call: once entering `Synchronizing`, once returning
/// to `Ready` (even when the session failed).
pub trait SessionObserver: Send + Sync {
    fn on_state_changed(&self, state: SessionLifecycle);
}
