use std::fmt;

/// The offline-store operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Add,
    Read,
    Update,
    Delete,
    Reconcile,
    Remove,
    Merge,
    Clear,
}

impl StoreOp {
    fn verb(&self) -> &'static str {
        match self {
            StoreOp::Add => "adding",
            StoreOp::Read => "reading",
            StoreOp::Update => "updating",
            StoreOp::Delete => "deleting",
            StoreOp::Reconcile => "reconciling",
            StoreOp::Remove => "removing",
            StoreOp::Merge => "merging",
            StoreOp::Clear => "clearing",
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreErrorKind {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("invalid record JSON: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// A failed offline-store operation. Nothing it touched was committed.
#[derive(Debug, thiserror::Error)]
#[error("Error {operation} {} offline: {kind}", entity_name(.collection))]
pub struct StoreError {
    pub collection: &'static str,
    pub operation: StoreOp,
    #[source]
    pub kind: StoreErrorKind,
}

impl StoreError {
    pub fn new(collection: &'static str, operation: StoreOp, kind: impl Into<StoreErrorKind>) -> Self {
        Self {
            collection,
            operation,
            kind: kind.into(),
        }
    }
}

/// "patients" -> "patient"
fn entity_name(collection: &str) -> &str {
    collection.strip_suffix('s').unwrap_or(collection)
}
