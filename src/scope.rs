use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds-since-epoch encoding for `Option<chrono::Duration>`,
/// since `Duration` has no serde impl of its own.
mod duration_ms {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        v.map(|d| d.num_milliseconds()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<i64> = Option::deserialize(d)?;
        Ok(millis.map(Duration::milliseconds))
    }
}

/// A per-peer replication cursor. Three of these participate in a
/// session: the client's record of itself, the server's record of
/// itself, and the server's record of what it last told the client
/// (keyed by the client's own scope id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeInfo {
    pub id: Uuid,
    pub name: String,
    /// Opaque monotonic timestamp sourced from the owning peer's clock
    /// or version store. Only comparable within that peer — never mix
    /// a client timestamp and a server timestamp in a comparison.
    pub last_sync_timestamp: i64,
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(with = "duration_ms")]
    pub last_sync_duration: Option<chrono::Duration>,
    pub is_new_scope: bool,
    pub is_local: bool,
}

impl ScopeInfo {
    /// A scope record for a peer that has never completed a session.
    pub fn new(id: Uuid, name: impl Into<String>, is_local: bool) -> Self {
        ScopeInfo {
            id,
            name: name.into(),
            last_sync_timestamp: 0,
            last_sync: None,
            last_sync_duration: None,
            is_new_scope: true,
            is_local,
        }
    }
}
