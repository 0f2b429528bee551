//! Everything a command needs, built once from the configuration.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::{ApiClient, HttpAuthBackend, HttpCollection};
use crate::auth::{Authenticator, CredentialError, CredentialStore, FileSessionStorage};
use crate::config::Config;
use crate::db::{LocalDatabase, StoreError};
use crate::error::ApiError;
use crate::models::{Appointment, Patient, Record};
use crate::session::IdleTimeout;
use crate::sync::{self, NameLookup, SyncError, SyncReport};

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Failed to open local database: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The wired-up client: local store, session and backend access.
pub struct ClinicContext {
    config: Config,
    db: LocalDatabase,
    client: ApiClient,
    auth: Arc<Authenticator<HttpAuthBackend>>,
    names: Mutex<NameLookup>,
}

impl ClinicContext {
    /// Opens the database, restores the persisted session and prepares the
    /// HTTP client.
    ///
    /// A session left unused for longer than the idle timeout is logged out
    /// here; otherwise opening counts as activity.
    pub async fn open(config: Config) -> Result<Self, ContextError> {
        let db = LocalDatabase::open(&config.database_path.value).await?;
        let credentials = CredentialStore::load(FileSessionStorage::new(config.credentials_path()))?;
        if credentials.expire_if_idle(config.session.idle_timeout()) {
            tracing::info!(
                "Logged out after {} minutes of inactivity",
                config.session.idle_timeout_minutes
            );
        } else if credentials.has_session() {
            if let Err(e) = credentials.record_activity() {
                tracing::warn!("Failed to persist session activity: {}", e);
            }
        }
        let client = ApiClient::new(&config.api.base_url, config.api.timeout())?;
        let auth = Authenticator::with_options(
            Arc::new(credentials),
            HttpAuthBackend::new(client.clone()),
            config.session.auth_options(),
        );

        Ok(Self {
            config,
            db,
            client,
            auth: Arc::new(auth),
            names: Mutex::new(NameLookup::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &LocalDatabase {
        &self.db
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn auth(&self) -> &Authenticator<HttpAuthBackend> {
        &self.auth
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        self.auth.credentials()
    }

    /// True if there is a session worth presenting to the backend.
    pub fn has_session(&self) -> bool {
        self.credentials().is_authenticated() || self.credentials().refresh_token().is_some()
    }

    pub fn remote_patients(&self) -> HttpCollection<Patient, HttpAuthBackend> {
        HttpCollection::new(self.client.clone(), self.auth.clone())
    }

    pub fn remote_appointments(&self) -> HttpCollection<Appointment, HttpAuthBackend> {
        HttpCollection::new(self.client.clone(), self.auth.clone())
    }

    /// Reconciles every collection with the backend.
    pub async fn sync_all(&self) -> Result<Vec<SyncReport>, SyncError> {
        self.auth.ensure_authenticated().await?;
        let reports = sync::sync_database(
            &self.db,
            self.remote_patients(),
            self.remote_appointments(),
        )
        .await?;
        self.names.lock().await.invalidate();
        Ok(reports)
    }

    /// Fills in patient names on appointments from the local patient table.
    pub async fn annotate_appointments(
        &self,
        appointments: &mut [Record<Appointment>],
    ) -> Result<(), StoreError> {
        self.names
            .lock()
            .await
            .annotate(&self.db.patients(), appointments)
            .await
    }

    /// Drops cached patient names after local patient edits.
    pub async fn invalidate_names(&self) {
        self.names.lock().await.invalidate();
    }

    /// Starts the inactivity timer configured under `session`.
    pub fn idle_timeout(&self) -> IdleTimeout {
        IdleTimeout::spawn(
            self.config.session.idle_timeout(),
            self.credentials().clone(),
        )
    }
}
