use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reconciliation status of a locally stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Matches the server's copy.
    #[default]
    Synced,
    /// Created locally, never acknowledged by the server.
    PendingAdd,
    /// Known to the server, changed locally since.
    PendingUpdate,
    /// Known to the server, deleted locally since.
    PendingDelete,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Synced => "synced",
            SyncState::PendingAdd => "pending_add",
            SyncState::PendingUpdate => "pending_update",
            SyncState::PendingDelete => "pending_delete",
        }
    }

    /// State after a local edit. Only a synced record changes state; a record
    /// that is already pending keeps its pending operation.
    pub fn after_local_update(self) -> Self {
        match self {
            SyncState::Synced => SyncState::PendingUpdate,
            pending => pending,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(SyncState::Synced),
            "pending_add" => Ok(SyncState::PendingAdd),
            "pending_update" => Ok(SyncState::PendingUpdate),
            "pending_delete" => Ok(SyncState::PendingDelete),
            _ => Err(format!(
                "Invalid sync state '{}'. Valid options: synced, pending_add, pending_update, pending_delete",
                s
            )),
        }
    }
}
