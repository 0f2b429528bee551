//! Pushes queued local changes to the backend, then pulls the server's view.

use std::collections::HashSet;

use crate::api::RemoteCollection;
use crate::db::{OfflineCollection, StoreError};
use crate::error::ApiError;
use crate::models::{Record, SyncState, Syncable};

/// Errors that stop a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// The session is gone; nothing can sync until the user logs in again.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, SyncError::Api(ApiError::AuthExpired))
    }
}

/// A pending record the backend refused. It stays queued.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedPush {
    pub id: i64,
    pub sync_state: SyncState,
    pub error: ApiError,
}

/// Outcome of one pass over a collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncReport {
    pub collection: &'static str,
    /// Pending records the backend accepted.
    pub pushed: usize,
    /// Pending records still waiting on a record they reference.
    pub deferred: usize,
    pub failed: Vec<FailedPush>,
    /// Server records written to the local store.
    pub merged: usize,
    /// `(placeholder id, server id)` for every record created remotely.
    pub remapped: Vec<(i64, i64)>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.deferred == 0
    }
}

enum Pushed {
    Created { temp_id: i64, server_id: i64 },
    Updated,
    Deleted,
}

/// Reconciles one offline collection with its remote counterpart.
pub struct Reconciler<T, R> {
    local: OfflineCollection<T>,
    remote: R,
}

impl<T: Syncable, R: RemoteCollection<T>> Reconciler<T, R> {
    pub fn new(local: OfflineCollection<T>, remote: R) -> Self {
        Self { local, remote }
    }

    /// Push, then pull.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let mut report = self.push().await?;
        report.merged = self.pull().await?;

        tracing::info!(
            "Synced {}: {} pushed, {} failed, {} deferred, {} merged",
            report.collection,
            report.pushed,
            report.failed.len(),
            report.deferred,
            report.merged
        );
        Ok(report)
    }

    /// Sends every pending record to the backend in queue order.
    ///
    /// A record the backend refuses is left queued and reported; the pass
    /// moves on. An expired session or a local storage failure aborts it.
    pub async fn push(&self) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport {
            collection: T::COLLECTION,
            ..SyncReport::default()
        };

        for record in self.local.get_pending().await? {
            if record.sync_state != SyncState::PendingDelete
                && record.fields.has_unsynced_reference()
            {
                tracing::debug!(
                    "Deferring {} record {}: references an unsynced record",
                    T::COLLECTION,
                    record.id
                );
                report.deferred += 1;
                continue;
            }

            match self.push_one(&record).await {
                Ok(Pushed::Created { temp_id, server_id }) => {
                    report.pushed += 1;
                    report.remapped.push((temp_id, server_id));
                }
                Ok(Pushed::Updated | Pushed::Deleted) => report.pushed += 1,
                Err(SyncError::Api(error)) if error != ApiError::AuthExpired => {
                    tracing::warn!(
                        "Failed to push {} record {} ({}): {}",
                        T::COLLECTION,
                        record.id,
                        record.sync_state,
                        error
                    );
                    report.failed.push(FailedPush {
                        id: record.id,
                        sync_state: record.sync_state,
                        error,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    async fn push_one(&self, record: &Record<T>) -> Result<Pushed, SyncError> {
        match record.sync_state {
            SyncState::PendingAdd => {
                let server = self.remote.create(&record.fields).await?;
                self.local.reconcile_synced(record.id, &server).await?;
                tracing::debug!("Created {} {} as {}", T::COLLECTION, record.id, server.id);
                Ok(Pushed::Created {
                    temp_id: record.id,
                    server_id: server.id,
                })
            }
            SyncState::PendingUpdate => {
                let server = self.remote.update(record.id, &record.fields).await?;
                self.local.reconcile_synced(record.id, &server).await?;
                tracing::debug!("Updated {} {}", T::COLLECTION, record.id);
                Ok(Pushed::Updated)
            }
            SyncState::PendingDelete => {
                match self.remote.delete(record.id).await {
                    Ok(()) => {}
                    // Already gone on the server
                    Err(ApiError::NotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
                self.local.remove(record.id).await?;
                tracing::debug!("Deleted {} {}", T::COLLECTION, record.id);
                Ok(Pushed::Deleted)
            }
            SyncState::Synced => Ok(Pushed::Updated),
        }
    }

    /// Stores the server's records locally, skipping any that still have
    /// unpushed local changes. Returns how many were merged.
    pub async fn pull(&self) -> Result<usize, SyncError> {
        let server = self.remote.list().await?;
        let pending: HashSet<i64> = self
            .local
            .get_pending()
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect();

        let fresh: Vec<Record<T>> = server
            .into_iter()
            .filter(|record| !pending.contains(&record.id))
            .collect();

        Ok(self.local.merge_from_server(&fresh).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryCollection;
    use crate::db::LocalDatabase;
    use crate::models::{Appointment, Patient};
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::Arc;

    fn patient(unique_id: &str, first: &str, last: &str) -> Patient {
        Patient::new(
            unique_id,
            first,
            last,
            NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
            "Female",
        )
    }

    fn alice() -> Patient {
        patient("STU1001", "Alice", "Johnson")
    }

    async fn setup() -> (LocalDatabase, Arc<InMemoryCollection<Patient>>) {
        let db = LocalDatabase::in_memory().await.unwrap();
        let remote = Arc::new(InMemoryCollection::new().starting_at(501));
        (db, remote)
    }

    async fn setup_with(records: Vec<(i64, Patient)>) -> (LocalDatabase, Arc<InMemoryCollection<Patient>>) {
        let db = LocalDatabase::in_memory().await.unwrap();
        let remote = records
            .into_iter()
            .fold(InMemoryCollection::new(), |remote, (id, fields)| {
                remote.with_record(id, fields)
            });
        (db, Arc::new(remote))
    }

    #[tokio::test]
    async fn test_offline_add_reaches_server() {
        let (db, remote) = setup().await;
        let local = db.patients().add(alice()).await.unwrap();

        let report = Reconciler::new(db.patients(), remote.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(report.pushed, 1);
        assert_eq!(report.remapped, vec![(local.id, 501)]);
        assert!(report.is_clean());

        let stored = db.patients().get_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, 501);
        assert_eq!(stored[0].sync_state, SyncState::Synced);
        assert_eq!(remote.get(501).unwrap().unique_id, "STU1001");
    }

    #[tokio::test]
    async fn test_update_and_delete_are_pushed() {
        let (db, remote) = setup_with(vec![
            (7, alice()),
            (8, patient("STU1002", "Bob", "Smith")),
        ])
        .await;
        let patients = db.patients();
        Reconciler::new(patients.clone(), remote.clone())
            .run()
            .await
            .unwrap();

        let mut record = patients.get(7).await.unwrap().unwrap();
        record.fields.known_allergies = Some("Penicillin".to_string());
        patients.update(record).await.unwrap();
        patients.delete(8).await.unwrap();

        let report = Reconciler::new(patients.clone(), remote.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(report.pushed, 2);
        assert_eq!(remote.calls()[1..3], ["update 7", "delete 8"]);
        assert_eq!(
            remote.get(7).unwrap().known_allergies.as_deref(),
            Some("Penicillin")
        );
        assert!(remote.get(8).is_none());
        assert!(patients.get(8).await.unwrap().is_none());
        assert!(patients.get_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_push_stays_queued() {
        let (db, remote) = setup().await;
        let patients = db.patients();
        let first = patients.add(alice()).await.unwrap();
        patients
            .add(patient("STU1002", "Bob", "Smith"))
            .await
            .unwrap();
        remote.fail_next(ApiError::Validation {
            status: 400,
            message: "unique_id already exists".to_string(),
        });

        let report = Reconciler::new(patients.clone(), remote.clone())
            .push()
            .await
            .unwrap();

        assert_eq!(report.pushed, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, first.id);
        assert_eq!(report.failed[0].sync_state, SyncState::PendingAdd);

        let pending = patients.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);
    }

    #[tokio::test]
    async fn test_auth_expired_aborts_pass() {
        let (db, remote) = setup().await;
        let patients = db.patients();
        patients.add(alice()).await.unwrap();
        patients
            .add(patient("STU1002", "Bob", "Smith"))
            .await
            .unwrap();
        remote.fail_next(ApiError::AuthExpired);

        let err = Reconciler::new(patients.clone(), remote.clone())
            .run()
            .await
            .unwrap_err();

        assert!(err.is_auth_expired());
        assert_eq!(remote.calls(), vec!["create"]);
        assert_eq!(patients.get_pending().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_of_missing_server_record_is_confirmed() {
        let (db, remote) = setup().await;
        let patients = db.patients();
        patients
            .merge_from_server(&[Record::synced(42, alice())])
            .await
            .unwrap();
        patients.delete(42).await.unwrap();

        let report = Reconciler::new(patients.clone(), remote.clone())
            .push()
            .await
            .unwrap();

        assert_eq!(report.pushed, 1);
        assert!(patients.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pull_does_not_clobber_pending_changes() {
        let (db, remote) = setup_with(vec![(7, alice())]).await;
        let patients = db.patients();
        patients
            .merge_from_server(&[Record::synced(7, alice())])
            .await
            .unwrap();

        let mut record = patients.get(7).await.unwrap().unwrap();
        record.fields.address = Some("12 Elm St".to_string());
        patients.update(record).await.unwrap();

        let merged = Reconciler::new(patients.clone(), remote.clone())
            .pull()
            .await
            .unwrap();

        assert_eq!(merged, 0);
        let stored = patients.get(7).await.unwrap().unwrap();
        assert_eq!(stored.sync_state, SyncState::PendingUpdate);
        assert_eq!(stored.fields.address.as_deref(), Some("12 Elm St"));
    }

    #[tokio::test]
    async fn test_appointment_waits_for_its_patient() {
        let db = LocalDatabase::in_memory().await.unwrap();
        let remote = Arc::new(InMemoryCollection::<Appointment>::new());
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        db.appointments()
            .add(Appointment::new(-5, "doc-1", date, time))
            .await
            .unwrap();

        let report = Reconciler::new(db.appointments(), remote.clone())
            .push()
            .await
            .unwrap();

        assert_eq!(report.deferred, 1);
        assert_eq!(report.pushed, 0);
        assert!(remote.calls().is_empty());
    }
}
