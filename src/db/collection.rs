use chrono::Utc;
use sqlx::SqlitePool;
use std::marker::PhantomData;
use std::sync::Arc;

use super::error::{StoreError, StoreErrorKind, StoreOp};
use super::synthetic::SyntheticIds;
use crate::models::{Record, SyncState, Syncable};

type Result<T> = std::result::Result<T, StoreErrorKind>;

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: i64,
    sync_state: String,
    data: String,
}

fn hydrate<T: Syncable>(row: RecordRow) -> Result<Record<T>> {
    let sync_state = row
        .sync_state
        .parse::<SyncState>()
        .map_err(StoreErrorKind::Corrupt)?;
    let fields = serde_json::from_str(&row.data)?;
    Ok(Record {
        id: row.id,
        sync_state,
        fields,
    })
}

/// What [`OfflineCollection::delete`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Local-only record, gone for good.
    Purged,
    /// Known to the server; kept as `pending_delete` until the server confirms.
    MarkedForDeletion,
    /// Nothing stored under that id.
    Missing,
}

/// One SQLite table of records of type `T`, with per-record sync state.
///
/// Every method is a single transaction.
pub struct OfflineCollection<T> {
    pool: SqlitePool,
    ids: Arc<SyntheticIds>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for OfflineCollection<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            ids: self.ids.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Syncable> OfflineCollection<T> {
    pub fn new(pool: SqlitePool, ids: Arc<SyntheticIds>) -> Self {
        Self {
            pool,
            ids,
            _marker: PhantomData,
        }
    }

    fn table() -> &'static str {
        T::COLLECTION
    }

    fn fail(operation: StoreOp) -> impl FnOnce(StoreErrorKind) -> StoreError {
        move |kind| StoreError::new(T::COLLECTION, operation, kind)
    }

    /// Stores a record created while offline under a fresh synthetic id.
    pub async fn add(&self, fields: T) -> std::result::Result<Record<T>, StoreError> {
        self.add_inner(fields).await.map_err(Self::fail(StoreOp::Add))
    }

    async fn add_inner(&self, fields: T) -> Result<Record<T>> {
        let id = self.ids.next();
        let data = serde_json::to_string(&fields)?;

        sqlx::query(&format!(
            "INSERT INTO {} (id, sync_state, data, updated_at) VALUES (?, ?, ?, ?)",
            Self::table()
        ))
        .bind(id)
        .bind(SyncState::PendingAdd.as_str())
        .bind(&data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!("Queued new {} record {}", Self::table(), id);
        Ok(Record {
            id,
            sync_state: SyncState::PendingAdd,
            fields,
        })
    }

    /// Every stored record, pending ones included, in queue order.
    pub async fn get_all(&self) -> std::result::Result<Vec<Record<T>>, StoreError> {
        self.select("1 = 1").await.map_err(Self::fail(StoreOp::Read))
    }

    /// Records that have not been deleted locally.
    pub async fn get_live(&self) -> std::result::Result<Vec<Record<T>>, StoreError> {
        self.select("sync_state != 'pending_delete'")
            .await
            .map_err(Self::fail(StoreOp::Read))
    }

    /// Records awaiting reconciliation, in the order they were queued.
    pub async fn get_pending(&self) -> std::result::Result<Vec<Record<T>>, StoreError> {
        self.select("sync_state != 'synced'")
            .await
            .map_err(Self::fail(StoreOp::Read))
    }

    async fn select(&self, filter: &str) -> Result<Vec<Record<T>>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT id, sync_state, data FROM {} WHERE {} ORDER BY local_key",
            Self::table(),
            filter
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(hydrate).collect()
    }

    pub async fn get(&self, id: i64) -> std::result::Result<Option<Record<T>>, StoreError> {
        self.get_inner(id).await.map_err(Self::fail(StoreOp::Read))
    }

    async fn get_inner(&self, id: i64) -> Result<Option<Record<T>>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT id, sync_state, data FROM {} WHERE id = ?",
            Self::table()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(hydrate).transpose()
    }

    pub async fn pending_count(&self) -> std::result::Result<i64, StoreError> {
        let count: std::result::Result<(i64,), sqlx::Error> = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {} WHERE sync_state != 'synced'",
            Self::table()
        ))
        .fetch_one(&self.pool)
        .await;

        count
            .map(|(n,)| n)
            .map_err(|e| StoreError::new(T::COLLECTION, StoreOp::Read, e))
    }

    /// Saves a local edit.
    ///
    /// A synced record becomes `pending_update`; a pending one keeps its
    /// pending operation. A record not stored yet is inserted as
    /// `pending_add` if its id is synthetic, else `pending_update`.
    pub async fn update(&self, record: Record<T>) -> std::result::Result<Record<T>, StoreError> {
        self.update_inner(record)
            .await
            .map_err(Self::fail(StoreOp::Update))
    }

    async fn update_inner(&self, record: Record<T>) -> Result<Record<T>> {
        let data = serde_json::to_string(&record.fields)?;
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT sync_state FROM {} WHERE id = ?",
            Self::table()
        ))
        .bind(record.id)
        .fetch_optional(&mut *tx)
        .await?;

        let sync_state = match current {
            Some((state,)) => {
                let state = state
                    .parse::<SyncState>()
                    .map_err(StoreErrorKind::Corrupt)?
                    .after_local_update();
                sqlx::query(&format!(
                    "UPDATE {} SET sync_state = ?, data = ?, updated_at = ? WHERE id = ?",
                    Self::table()
                ))
                .bind(state.as_str())
                .bind(&data)
                .bind(&now)
                .bind(record.id)
                .execute(&mut *tx)
                .await?;
                state
            }
            None => {
                let state = if record.has_synthetic_id() {
                    SyncState::PendingAdd
                } else {
                    SyncState::PendingUpdate
                };
                sqlx::query(&format!(
                    "INSERT INTO {} (id, sync_state, data, updated_at) VALUES (?, ?, ?, ?)",
                    Self::table()
                ))
                .bind(record.id)
                .bind(state.as_str())
                .bind(&data)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
                state
            }
        };

        tx.commit().await?;

        tracing::debug!("Updated {} record {} ({})", Self::table(), record.id, sync_state);
        Ok(Record {
            sync_state,
            ..record
        })
    }

    /// Deletes a record locally.
    ///
    /// A record the server never saw is purged, together with the records in
    /// other tables that reference it (they cannot have reached the server
    /// either). Anything else is kept as `pending_delete` until the
    /// reconciler confirms the remote deletion.
    pub async fn delete(&self, id: i64) -> std::result::Result<DeleteOutcome, StoreError> {
        self.delete_inner(id)
            .await
            .map_err(Self::fail(StoreOp::Delete))
    }

    async fn delete_inner(&self, id: i64) -> Result<DeleteOutcome> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT sync_state FROM {} WHERE id = ?",
            Self::table()
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((state,)) = current else {
            return Ok(DeleteOutcome::Missing);
        };
        let state = state.parse::<SyncState>().map_err(StoreErrorKind::Corrupt)?;

        let outcome = if state == SyncState::PendingAdd {
            sqlx::query(&format!("DELETE FROM {} WHERE id = ?", Self::table()))
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for (table, path) in T::REFERENCED_BY {
                let purged = sqlx::query(&format!(
                    "DELETE FROM {} WHERE json_extract(data, '{}') = ?",
                    table, path
                ))
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
                if purged > 0 {
                    tracing::debug!(
                        "Purged {} {} record(s) queued against {} {}",
                        purged,
                        table,
                        Self::table(),
                        id
                    );
                }
            }
            DeleteOutcome::Purged
        } else {
            sqlx::query(&format!(
                "UPDATE {} SET sync_state = ?, updated_at = ? WHERE id = ?",
                Self::table()
            ))
            .bind(SyncState::PendingDelete.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await?;
            DeleteOutcome::MarkedForDeletion
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Replaces the row stored under `temp_id` with the server's copy.
    ///
    /// The row keeps its queue position and takes the server id. Any other
    /// row already holding that id is dropped, and references from other
    /// tables ([`Syncable::REFERENCED_BY`]) are pointed at the server id, in
    /// the same transaction. Returns `false` if nothing was stored under
    /// `temp_id`.
    pub async fn reconcile_synced(
        &self,
        temp_id: i64,
        server: &Record<T>,
    ) -> std::result::Result<bool, StoreError> {
        self.reconcile_inner(temp_id, server)
            .await
            .map_err(Self::fail(StoreOp::Reconcile))
    }

    async fn reconcile_inner(&self, temp_id: i64, server: &Record<T>) -> Result<bool> {
        let data = serde_json::to_string(&server.fields)?;
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let local_key: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT local_key FROM {} WHERE id = ?",
            Self::table()
        ))
        .bind(temp_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((local_key,)) = local_key else {
            tracing::debug!(
                "No {} record {} to reconcile, skipping",
                Self::table(),
                temp_id
            );
            return Ok(false);
        };

        sqlx::query(&format!(
            "DELETE FROM {} WHERE id = ? AND local_key != ?",
            Self::table()
        ))
        .bind(server.id)
        .bind(local_key)
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "UPDATE {} SET id = ?, sync_state = ?, data = ?, updated_at = ? WHERE local_key = ?",
            Self::table()
        ))
        .bind(server.id)
        .bind(SyncState::Synced.as_str())
        .bind(&data)
        .bind(&now)
        .bind(local_key)
        .execute(&mut *tx)
        .await?;

        if temp_id != server.id {
            for (table, path) in T::REFERENCED_BY {
                let rewritten = sqlx::query(&format!(
                    "UPDATE {} SET data = json_set(data, '{}', ?), updated_at = ? \
                     WHERE json_extract(data, '{}') = ?",
                    table, path, path
                ))
                .bind(server.id)
                .bind(&now)
                .bind(temp_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
                if rewritten > 0 {
                    tracing::debug!(
                        "Pointed {} {} record(s) at {} {} (was {})",
                        rewritten,
                        table,
                        Self::table(),
                        server.id,
                        temp_id
                    );
                }
            }
        }

        tx.commit().await?;

        tracing::debug!(
            "Reconciled {} record {} as {}",
            Self::table(),
            temp_id,
            server.id
        );
        Ok(true)
    }

    /// Drops a row outright. Returns whether anything was removed.
    pub async fn remove(&self, id: i64) -> std::result::Result<bool, StoreError> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", Self::table()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map(|result| result.rows_affected() > 0)
            .map_err(|e| StoreError::new(T::COLLECTION, StoreOp::Remove, e))
    }

    /// Upserts the server's records as `synced`. Local rows absent from
    /// `records` are left alone.
    pub async fn merge_from_server(
        &self,
        records: &[Record<T>],
    ) -> std::result::Result<usize, StoreError> {
        self.merge_inner(records)
            .await
            .map_err(Self::fail(StoreOp::Merge))
    }

    async fn merge_inner(&self, records: &[Record<T>]) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let data = serde_json::to_string(&record.fields)?;
            sqlx::query(&format!(
                r#"
                INSERT INTO {} (id, sync_state, data, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    sync_state = excluded.sync_state,
                    data = excluded.data,
                    updated_at = excluded.updated_at
                "#,
                Self::table()
            ))
            .bind(record.id)
            .bind(SyncState::Synced.as_str())
            .bind(&data)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    pub async fn clear(&self) -> std::result::Result<(), StoreError> {
        sqlx::query(&format!("DELETE FROM {}", Self::table()))
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::new(T::COLLECTION, StoreOp::Clear, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalDatabase;
    use crate::models::{Appointment, AppointmentStatus, Patient};
    use chrono::{NaiveDate, NaiveTime};

    fn alice() -> Patient {
        Patient::new(
            "STU1001",
            "Alice",
            "Johnson",
            NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
            "Female",
        )
    }

    fn bob() -> Patient {
        Patient::new(
            "STU1002",
            "Bob",
            "Smith",
            NaiveDate::from_ymd_opt(1985, 5, 20).unwrap(),
            "Male",
        )
    }

    async fn setup() -> LocalDatabase {
        LocalDatabase::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_add_assigns_synthetic_id() {
        let db = setup().await;
        let patients = db.patients();

        let record = patients.add(alice()).await.unwrap();

        assert!(record.id < 0);
        assert_eq!(record.sync_state, SyncState::PendingAdd);

        let pending = patients.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0], record);

        let all = patients.get_all().await.unwrap();
        assert_eq!(all, vec![record]);
    }

    #[tokio::test]
    async fn test_add_twice_gets_distinct_ids() {
        let db = setup().await;
        let patients = db.patients();

        let a = patients.add(alice()).await.unwrap();
        let b = patients.add(bob()).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(patients.pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_get() {
        let db = setup().await;
        let patients = db.patients();
        let record = patients.add(alice()).await.unwrap();

        assert_eq!(patients.get(record.id).await.unwrap(), Some(record));
        assert_eq!(patients.get(12345).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reconcile_replaces_in_place() {
        let db = setup().await;
        let patients = db.patients();
        let first = patients.add(alice()).await.unwrap();
        patients.add(bob()).await.unwrap();

        let server = Record::synced(501, alice());
        assert!(patients.reconcile_synced(first.id, &server).await.unwrap());

        let all = patients.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        // Queue position is kept
        assert_eq!(all[0].id, 501);
        assert_eq!(all[0].sync_state, SyncState::Synced);
        assert!(patients.get(first.id).await.unwrap().is_none());

        let pending = patients.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fields.first_name, "Bob");
    }

    #[tokio::test]
    async fn test_reconcile_drops_duplicate_server_row() {
        let db = setup().await;
        let patients = db.patients();
        let local = patients.add(alice()).await.unwrap();
        // The server copy already arrived through a pull
        patients
            .merge_from_server(&[Record::synced(501, alice())])
            .await
            .unwrap();

        patients
            .reconcile_synced(local.id, &Record::synced(501, alice()))
            .await
            .unwrap();

        let all = patients.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, 501);
    }

    #[tokio::test]
    async fn test_reconcile_missing_row_is_noop() {
        let db = setup().await;
        let patients = db.patients();

        let reconciled = patients
            .reconcile_synced(-42, &Record::synced(501, alice()))
            .await
            .unwrap();

        assert!(!reconciled);
        assert!(patients.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_transitions() {
        let db = setup().await;
        let patients = db.patients();
        patients
            .merge_from_server(&[Record::synced(7, alice())])
            .await
            .unwrap();

        // synced -> pending_update
        let mut record = patients.get(7).await.unwrap().unwrap();
        record.fields.contact_info = Some("555-1234".to_string());
        let updated = patients.update(record).await.unwrap();
        assert_eq!(updated.sync_state, SyncState::PendingUpdate);

        // pending_add stays pending_add
        let mut local = patients.add(bob()).await.unwrap();
        local.fields.address = Some("1 Main St".to_string());
        let local = patients.update(local).await.unwrap();
        assert_eq!(local.sync_state, SyncState::PendingAdd);

        let stored = patients.get(7).await.unwrap().unwrap();
        assert_eq!(stored.fields.contact_info.as_deref(), Some("555-1234"));
        assert_eq!(stored.sync_state, SyncState::PendingUpdate);
    }

    #[tokio::test]
    async fn test_update_unknown_record_inserts_pending() {
        let db = setup().await;
        let patients = db.patients();

        let known = patients.update(Record::synced(9, alice())).await.unwrap();
        assert_eq!(known.sync_state, SyncState::PendingUpdate);

        let local = patients.update(Record::synced(-9, bob())).await.unwrap();
        assert_eq!(local.sync_state, SyncState::PendingAdd);

        assert_eq!(patients.get_pending().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_pending_add_purges() {
        let db = setup().await;
        let patients = db.patients();
        let record = patients.add(alice()).await.unwrap();

        let outcome = patients.delete(record.id).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Purged);
        assert!(patients.get_all().await.unwrap().is_empty());
        assert!(patients.get_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_synced_marks_for_deletion() {
        let db = setup().await;
        let patients = db.patients();
        patients
            .merge_from_server(&[Record::synced(7, alice()), Record::synced(8, bob())])
            .await
            .unwrap();

        let outcome = patients.delete(7).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::MarkedForDeletion);

        let live = patients.get_live().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, 8);

        let all = patients.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        let deleted = all.iter().find(|r| r.id == 7).unwrap();
        assert_eq!(deleted.sync_state, SyncState::PendingDelete);
        assert!(!deleted.is_live());
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let db = setup().await;
        assert_eq!(
            db.patients().delete(404).await.unwrap(),
            DeleteOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let db = setup().await;
        let patients = db.patients();
        patients
            .merge_from_server(&[Record::synced(7, alice())])
            .await
            .unwrap();

        assert!(patients.remove(7).await.unwrap());
        assert!(!patients.remove(7).await.unwrap());
    }

    #[tokio::test]
    async fn test_merge_overwrites_and_keeps_local_rows() {
        let db = setup().await;
        let patients = db.patients();
        let local = patients.add(bob()).await.unwrap();
        patients
            .merge_from_server(&[Record::synced(7, alice())])
            .await
            .unwrap();

        let mut renamed = alice();
        renamed.last_name = "Johnson-Smith".to_string();
        let merged = patients
            .merge_from_server(&[Record::synced(7, renamed)])
            .await
            .unwrap();
        assert_eq!(merged, 1);

        let all = patients.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|r| r.id == local.id));
        let server = patients.get(7).await.unwrap().unwrap();
        assert_eq!(server.fields.last_name, "Johnson-Smith");
        assert_eq!(server.sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_clear() {
        let db = setup().await;
        let patients = db.patients();
        patients.add(alice()).await.unwrap();
        patients.clear().await.unwrap();
        assert!(patients.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_add_then_server_assigns_id() {
        let db = setup().await;
        let patients = db.patients();

        let local = patients.add(alice()).await.unwrap();
        let pending = patients.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sync_state, SyncState::PendingAdd);

        let server = Record::synced(501, pending[0].fields.clone());
        patients.reconcile_synced(local.id, &server).await.unwrap();

        assert!(patients.get_pending().await.unwrap().is_empty());
        let stored = patients.get(501).await.unwrap().unwrap();
        assert_eq!(stored.sync_state, SyncState::Synced);
        assert_eq!(stored.fields.unique_id, "STU1001");
        assert_eq!(stored.fields.full_name(), "Alice Johnson");
    }

    #[tokio::test]
    async fn test_reconcile_points_appointments_at_server_id() {
        let db = setup().await;
        let patients = db.patients();
        let appointments = db.appointments();
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();

        let local = patients.add(alice()).await.unwrap();
        let mut visit = Appointment::new(local.id, "doc-1", date, time);
        visit.status = AppointmentStatus::Pending;
        let queued = appointments.add(visit).await.unwrap();
        let other = appointments
            .add(Appointment::new(12, "doc-1", date, time))
            .await
            .unwrap();

        patients
            .reconcile_synced(local.id, &Record::synced(501, alice()))
            .await
            .unwrap();

        let stored = appointments.get(queued.id).await.unwrap().unwrap();
        assert_eq!(stored.fields.patient_id, 501);
        assert_eq!(stored.fields.status, AppointmentStatus::Pending);
        assert_eq!(stored.sync_state, SyncState::PendingAdd);
        let untouched = appointments.get(other.id).await.unwrap().unwrap();
        assert_eq!(untouched.fields.patient_id, 12);
    }

    #[tokio::test]
    async fn test_purging_patient_purges_its_queued_appointments() {
        let db = setup().await;
        let patients = db.patients();
        let appointments = db.appointments();
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();

        let local = patients.add(alice()).await.unwrap();
        appointments
            .add(Appointment::new(local.id, "doc-1", date, time))
            .await
            .unwrap();
        let kept = appointments
            .add(Appointment::new(12, "doc-1", date, time))
            .await
            .unwrap();

        assert_eq!(patients.delete(local.id).await.unwrap(), DeleteOutcome::Purged);

        let live = appointments.get_live().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, kept.id);
        assert_eq!(appointments.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_row_reports_collection() {
        let db = setup().await;
        sqlx::query(
            "INSERT INTO patients (id, sync_state, data, updated_at) VALUES (1, 'synced', 'not json', '')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let err = db.patients().get_all().await.unwrap_err();
        assert_eq!(err.collection, "patients");
        assert_eq!(err.operation, StoreOp::Read);
        assert!(err.to_string().starts_with("Error reading patient offline"));
    }
}
