use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::SyncState;

/// A domain entity that can be cached offline and reconciled with the backend.
pub trait Syncable:
    Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + 'static
{
    /// Local table name, also the REST collection path segment.
    const COLLECTION: &'static str;

    /// True while the record refers to another record that only exists
    /// locally; such records cannot be pushed yet.
    fn has_unsynced_reference(&self) -> bool {
        false
    }

    /// Fields in other tables that hold this record's id, as
    /// `(table, JSON path)`. They follow the record to its server id and are
    /// purged with it if it is discarded before ever reaching the server.
    const REFERENCED_BY: &'static [(&'static str, &'static str)] = &[];
}

/// A domain entity together with its identity and reconciliation state.
///
/// Serializes flat: `{"id": 501, "sync_state": "synced", ...fields}`. The
/// backend never sends `sync_state`, so server copies deserialize as synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    /// Server id, or a negative synthetic id while the record is local-only.
    pub id: i64,
    #[serde(default)]
    pub sync_state: SyncState,
    #[serde(flatten)]
    pub fields: T,
}

impl<T> Record<T> {
    /// A record as the server returned it.
    pub fn synced(id: i64, fields: T) -> Self {
        Self {
            id,
            sync_state: SyncState::Synced,
            fields,
        }
    }

    /// True while the id is a local placeholder.
    pub fn has_synthetic_id(&self) -> bool {
        self.id < 0
    }

    /// Excluded from live listings once deleted locally.
    pub fn is_live(&self) -> bool {
        self.sync_state != SyncState::PendingDelete
    }
}
