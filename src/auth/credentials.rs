//! The in-process session: access token, refresh token and user profile.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::jwt;
use super::storage::{
    CredentialError, MemorySessionStorage, SessionStorage, LAST_ACTIVITY_KEY, REFRESH_TOKEN_KEY,
    TOKEN_KEY,
};
use crate::models::UserProfile;

#[derive(Debug, Clone, Default)]
struct Session {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserProfile>,
    last_activity: Option<DateTime<Utc>>,
}

/// Holds the current session and mirrors its tokens into durable storage.
///
/// Created once at startup and shared behind an `Arc`. The profile is kept in
/// memory only; tokens and the last-activity time survive a restart through
/// [`SessionStorage`].
pub struct CredentialStore {
    session: RwLock<Session>,
    storage: Box<dyn SessionStorage>,
}

impl CredentialStore {
    /// Creates an empty store that persists into `storage`.
    pub fn new(storage: impl SessionStorage + 'static) -> Self {
        Self {
            session: RwLock::new(Session::default()),
            storage: Box::new(storage),
        }
    }

    /// Rehydrates the session previously persisted in `storage`.
    ///
    /// An unreadable last-activity time is treated as unknown.
    pub fn load(storage: impl SessionStorage + 'static) -> Result<Self, CredentialError> {
        let last_activity = storage.get(LAST_ACTIVITY_KEY)?.and_then(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| tracing::warn!("Ignoring stored last activity '{}': {}", value, e))
                .ok()
        });
        let session = Session {
            access_token: storage.get(TOKEN_KEY)?,
            refresh_token: storage.get(REFRESH_TOKEN_KEY)?,
            user: None,
            last_activity,
        };
        Ok(Self {
            session: RwLock::new(session),
            storage: Box::new(storage),
        })
    }

    /// A store that forgets everything when dropped.
    pub fn in_memory() -> Self {
        Self::new(MemorySessionStorage::new())
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read().user.clone()
    }

    /// True iff an access token is present and has not expired.
    ///
    /// A token whose claims cannot be decoded counts as expired.
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now())
    }

    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        match &self.read().access_token {
            Some(token) => !jwt::is_expired_at(token, now),
            None => false,
        }
    }

    /// Expiry of the current access token, if it can be decoded.
    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.read().access_token.as_deref().and_then(jwt::expires_at)
    }

    /// Replaces the access token.
    ///
    /// The in-memory session is updated even if persisting fails; the error
    /// only means the token will not survive a restart.
    pub fn set_token(&self, token: impl Into<String>) -> Result<(), CredentialError> {
        let token = token.into();
        self.write().access_token = Some(token.clone());
        self.storage.set(TOKEN_KEY, &token)
    }

    pub fn set_refresh_token(&self, token: impl Into<String>) -> Result<(), CredentialError> {
        let token = token.into();
        self.write().refresh_token = Some(token.clone());
        self.storage.set(REFRESH_TOKEN_KEY, &token)
    }

    pub fn set_user(&self, user: UserProfile) {
        self.write().user = Some(user);
    }

    /// True if either token is held.
    pub fn has_session(&self) -> bool {
        let session = self.read();
        session.access_token.is_some() || session.refresh_token.is_some()
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.read().last_activity
    }

    /// Marks the session as used now.
    pub fn record_activity(&self) -> Result<(), CredentialError> {
        self.record_activity_at(Utc::now())
    }

    pub fn record_activity_at(&self, now: DateTime<Utc>) -> Result<(), CredentialError> {
        self.write().last_activity = Some(now);
        self.storage.set(LAST_ACTIVITY_KEY, &now.to_rfc3339())
    }

    /// Picks up activity another process recorded in storage since this
    /// store was loaded, and returns the latest known activity time.
    pub fn reload_activity(&self) -> Result<Option<DateTime<Utc>>, CredentialError> {
        let stored = self
            .storage
            .get(LAST_ACTIVITY_KEY)?
            .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
            .map(|t| t.with_timezone(&Utc));

        let mut session = self.write();
        if stored > session.last_activity {
            session.last_activity = stored;
        }
        Ok(session.last_activity)
    }

    /// Logs out if the session has been unused for `timeout`. Returns true
    /// if it did.
    ///
    /// A session with no recorded activity is left alone.
    pub fn expire_if_idle(&self, timeout: Duration) -> bool {
        self.expire_if_idle_at(timeout, Utc::now())
    }

    pub fn expire_if_idle_at(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        if !self.has_session() {
            return false;
        }
        let Some(last) = self.last_activity() else {
            return false;
        };
        // A timeout too large to represent never elapses
        let deadline = TimeDelta::from_std(timeout)
            .ok()
            .and_then(|timeout| last.checked_add_signed(timeout));
        match deadline {
            Some(deadline) if deadline <= now => {
                tracing::info!("Session unused since {}, logging out", last.to_rfc3339());
                self.logout();
                true
            }
            _ => false,
        }
    }

    /// Clears the tokens, the profile and the activity time, then removes
    /// the persisted copies.
    pub fn logout(&self) {
        *self.write() = Session::default();

        for key in [TOKEN_KEY, REFRESH_TOKEN_KEY, LAST_ACTIVITY_KEY] {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!("Failed to remove persisted {}: {}", key, e);
            }
        }
        tracing::info!("Session cleared");
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.read();
        f.debug_struct("CredentialStore")
            .field("has_token", &session.access_token.is_some())
            .field("has_refresh_token", &session.refresh_token.is_some())
            .field("user", &session.user.as_ref().map(|u| u.name.as_str()))
            .finish()
    }
}
