mod collection;
mod error;
mod synthetic;

pub use collection::{DeleteOutcome, OfflineCollection};
pub use error::{StoreError, StoreErrorKind, StoreOp};
pub use synthetic::SyntheticIds;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::models::{Appointment, Patient, Syncable};

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// A private in-memory database. One connection, kept open for the life of
/// the pool, so every query sees the same data.
pub async fn init_memory_db() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Latest migration applied to `pool`, 0 for a fresh database.
pub async fn schema_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let (version,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok(version)
}

/// The local offline database: one table per syncable collection.
#[derive(Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
    ids: Arc<SyntheticIds>,
}

impl LocalDatabase {
    /// Opens (creating and migrating as needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        Self::from_pool(init_db(path).await?).await
    }

    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::from_pool(init_memory_db().await?).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        // Continue below placeholder ids left by earlier runs
        let (lowest,): (Option<i64>,) = sqlx::query_as(
            "SELECT MIN(id) FROM (SELECT MIN(id) AS id FROM patients UNION ALL SELECT MIN(id) FROM appointments)",
        )
        .fetch_one(&pool)
        .await?;

        let ids = match lowest {
            Some(lowest) if lowest < 0 => SyntheticIds::below(lowest),
            _ => SyntheticIds::new(),
        };

        Ok(Self {
            pool,
            ids: Arc::new(ids),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn collection<T: Syncable>(&self) -> OfflineCollection<T> {
        OfflineCollection::new(self.pool.clone(), self.ids.clone())
    }

    pub fn patients(&self) -> OfflineCollection<Patient> {
        self.collection()
    }

    pub fn appointments(&self) -> OfflineCollection<Appointment> {
        self.collection()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, SyncState};
    use chrono::NaiveDate;
    use std::borrow::Cow;
    use tempfile::tempdir;

    fn alice() -> Patient {
        Patient::new(
            "STU1001",
            "Alice",
            "Johnson",
            NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
            "Female",
        )
    }

    #[tokio::test]
    async fn test_init_db_creates_tables() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let pool = init_db(&db_path).await.unwrap();

        // Verify tables exist
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(table_names, vec!["appointments", "patients"]);
        assert_eq!(schema_version(&pool).await.unwrap(), 20250601000002);
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let queued = {
            let db = LocalDatabase::open(&db_path).await.unwrap();
            let record = db.patients().add(alice()).await.unwrap();
            db.close().await;
            record
        };

        let db = LocalDatabase::open(&db_path).await.unwrap();
        let pending = db.patients().get_pending().await.unwrap();
        assert_eq!(pending, vec![queued.clone()]);

        // New placeholders stay below the ones already stored
        let next = db.patients().add(alice()).await.unwrap();
        assert!(next.id < queued.id);
    }

    #[tokio::test]
    async fn test_appointments_migration_keeps_patients() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path.display()))
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        // A database from before appointments existed
        let mut first = sqlx::migrate!("./migrations");
        first.migrations = Cow::Owned(first.migrations[..1].to_vec());
        first.run(&pool).await.unwrap();
        assert_eq!(schema_version(&pool).await.unwrap(), 20250601000001);

        sqlx::query(
            "INSERT INTO patients (id, sync_state, data, updated_at) VALUES (?, 'synced', ?, '')",
        )
        .bind(7_i64)
        .bind(serde_json::to_string(&alice()).unwrap())
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;

        let db = LocalDatabase::open(&db_path).await.unwrap();
        assert_eq!(schema_version(db.pool()).await.unwrap(), 20250601000002);

        let patients = db.patients().get_all().await.unwrap();
        assert_eq!(patients, vec![Record::synced(7, alice())]);
        assert_eq!(patients[0].sync_state, SyncState::Synced);
        assert!(db.appointments().get_all().await.unwrap().is_empty());
    }
}
