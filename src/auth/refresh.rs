//! Login and the refresh-token exchange.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::credentials::CredentialStore;
use crate::error::ApiError;
use crate::models::UserProfile;

/// Tokens issued by `POST /auth/token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Response of `POST /auth/refresh`. `refresh` is set when the backend
/// rotates refresh tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshedToken {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

/// The authentication endpoints of the backend.
pub trait AuthBackend: Send + Sync {
    /// Exchanges credentials for an access/refresh token pair.
    fn obtain_token(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<TokenPair, ApiError>> + Send;

    /// Exchanges a refresh token for a new access token.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshedToken, ApiError>> + Send;

    /// Fetches the profile of the token's owner.
    fn fetch_profile(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<UserProfile, ApiError>> + Send;
}

/// Behaviour switches for [`Authenticator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthOptions {
    /// Re-fetch the profile after each refresh; a failure ends the session.
    pub refetch_profile_on_refresh: bool,
    /// Let concurrent 401s share a single refresh.
    pub coalesce_refresh: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            refetch_profile_on_refresh: true,
            coalesce_refresh: true,
        }
    }
}

/// Drives login, token refresh and the auth-retry wrapper for one session.
pub struct Authenticator<B> {
    pub(super) credentials: Arc<CredentialStore>,
    backend: B,
    options: AuthOptions,
    refresh_gate: Mutex<()>,
}

impl<B: AuthBackend> Authenticator<B> {
    pub fn new(credentials: Arc<CredentialStore>, backend: B) -> Self {
        Self::with_options(credentials, backend, AuthOptions::default())
    }

    pub fn with_options(credentials: Arc<CredentialStore>, backend: B, options: AuthOptions) -> Self {
        Self {
            credentials,
            backend,
            options,
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> AuthOptions {
        self.options
    }

    /// Signs in with email and password and loads the profile.
    ///
    /// A profile fetch failure leaves no half-open session behind.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let pair = self.backend.obtain_token(email, password).await?;
        self.store_tokens(&pair.access, Some(&pair.refresh));

        match self.backend.fetch_profile(&pair.access).await {
            Ok(profile) => {
                tracing::info!("Logged in as {} ({})", profile.name, profile.role);
                self.credentials.set_user(profile.clone());
                if let Err(e) = self.credentials.record_activity() {
                    tracing::warn!("Failed to persist session activity: {}", e);
                }
                Ok(profile)
            }
            Err(e) => {
                tracing::warn!("Profile fetch after login failed: {}", e);
                self.credentials.logout();
                Err(e)
            }
        }
    }

    pub fn logout(&self) {
        self.credentials.logout();
    }

    /// Makes sure a usable access token is stored, refreshing if needed.
    ///
    /// Fails with [`ApiError::AuthExpired`] when there is nothing to refresh.
    pub async fn ensure_authenticated(&self) -> Result<(), ApiError> {
        if self.credentials.is_authenticated() {
            return Ok(());
        }
        if self.credentials.refresh_token().is_none() {
            return Err(ApiError::AuthExpired);
        }
        self.refresh().await.map(|_| ())
    }

    /// Exchanges the stored refresh token for a new access token.
    ///
    /// Any failure clears the session. Rejected credentials surface as
    /// [`ApiError::AuthExpired`]; transport errors surface as themselves.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        self.refresh_after(None).await
    }

    /// Refresh on behalf of a call that was rejected while presenting
    /// `rejected`. With coalescing on, a caller that finds the token already
    /// replaced by a concurrent refresh reuses it instead of refreshing again.
    pub(super) async fn refresh_after(&self, rejected: Option<&str>) -> Result<String, ApiError> {
        if !self.options.coalesce_refresh {
            return self.run_refresh().await;
        }

        let _gate = self.refresh_gate.lock().await;
        if let (Some(rejected), Some(current)) = (rejected, self.credentials.token()) {
            if current != rejected && self.credentials.is_authenticated() {
                tracing::debug!("Access token already refreshed by a concurrent call");
                return Ok(current);
            }
        }
        self.run_refresh().await
    }

    async fn run_refresh(&self) -> Result<String, ApiError> {
        let Some(refresh_token) = self.credentials.refresh_token() else {
            tracing::warn!("No refresh token stored, ending session");
            self.credentials.logout();
            return Err(ApiError::AuthExpired);
        };

        tracing::debug!("Refreshing access token");
        let refreshed = match self.backend.refresh(&refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                tracing::warn!("Token refresh failed, ending session: {}", e);
                self.credentials.logout();
                return Err(e.into_session_error());
            }
        };
        self.store_tokens(&refreshed.access, refreshed.refresh.as_deref());

        if self.options.refetch_profile_on_refresh {
            match self.backend.fetch_profile(&refreshed.access).await {
                Ok(profile) => self.credentials.set_user(profile),
                Err(e) => {
                    tracing::warn!("Profile fetch after refresh failed, ending session: {}", e);
                    self.credentials.logout();
                    return Err(e.into_session_error());
                }
            }
        }

        tracing::info!("Access token refreshed");
        Ok(refreshed.access)
    }

    fn store_tokens(&self, access: &str, refresh: Option<&str>) {
        if let Err(e) = self.credentials.set_token(access) {
            tracing::warn!("Access token not persisted: {}", e);
        }
        if let Some(refresh) = refresh {
            if let Err(e) = self.credentials.set_refresh_token(refresh) {
                tracing::warn!("Refresh token not persisted: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryAuthBackend;

    fn profile() -> UserProfile {
        UserProfile {
            id: Some(1),
            name: "Test User".to_string(),
            email: Some("test@example.com".to_string()),
            role: "admin".to_string(),
        }
    }

    fn backend() -> InMemoryAuthBackend {
        InMemoryAuthBackend::new().with_account("test@example.com", "password123", profile())
    }

    #[tokio::test]
    async fn test_login_stores_session() {
        let credentials = Arc::new(CredentialStore::in_memory());
        let auth = Authenticator::new(credentials.clone(), backend());

        let user = auth.login("test@example.com", "password123").await.unwrap();

        assert_eq!(user.name, "Test User");
        assert!(credentials.is_authenticated());
        assert!(credentials.refresh_token().is_some());
        assert_eq!(credentials.user(), Some(profile()));
    }

    #[tokio::test]
    async fn test_login_with_bad_password() {
        let credentials = Arc::new(CredentialStore::in_memory());
        let auth = Authenticator::new(credentials.clone(), backend());

        let err = auth.login("test@example.com", "nope").await.unwrap_err();

        assert!(err.is_unauthorized());
        assert!(!credentials.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_profile_failure_leaves_no_session() {
        let credentials = Arc::new(CredentialStore::in_memory());
        let auth = Authenticator::new(credentials.clone(), backend().with_failing_profile());

        assert!(auth.login("test@example.com", "password123").await.is_err());
        assert!(credentials.token().is_none());
        assert!(credentials.refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_refresh_replaces_access_token() {
        let credentials = Arc::new(CredentialStore::in_memory());
        let auth = Authenticator::new(credentials.clone(), backend());
        auth.login("test@example.com", "password123").await.unwrap();
        let before = credentials.token().unwrap();

        let fresh = auth.refresh().await.unwrap();

        assert_ne!(fresh, before);
        assert_eq!(credentials.token(), Some(fresh));
        assert!(credentials.is_authenticated());
        assert_eq!(auth.backend().refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_with_revoked_token_logs_out() {
        let credentials = Arc::new(CredentialStore::in_memory());
        let auth = Authenticator::new(credentials.clone(), backend());
        auth.login("test@example.com", "password123").await.unwrap();
        auth.backend().revoke_refresh_tokens();

        let err = auth.refresh().await.unwrap_err();

        assert_eq!(err, ApiError::AuthExpired);
        assert!(!credentials.is_authenticated());
        assert!(credentials.refresh_token().is_none());
        assert!(credentials.user().is_none());
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let credentials = Arc::new(CredentialStore::in_memory());
        let auth = Authenticator::new(credentials.clone(), backend());

        assert_eq!(auth.refresh().await.unwrap_err(), ApiError::AuthExpired);
        assert_eq!(auth.backend().refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_profile_refetch_failure_is_fatal() {
        let credentials = Arc::new(CredentialStore::in_memory());
        let auth = Authenticator::new(credentials.clone(), backend());
        auth.login("test@example.com", "password123").await.unwrap();
        auth.backend().set_profile_failing(true);

        assert!(auth.refresh().await.is_err());
        assert!(!credentials.is_authenticated());
        assert!(credentials.refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_profile_refetch_can_be_disabled() {
        let credentials = Arc::new(CredentialStore::in_memory());
        let options = AuthOptions {
            refetch_profile_on_refresh: false,
            ..AuthOptions::default()
        };
        let auth = Authenticator::with_options(credentials.clone(), backend(), options);
        auth.login("test@example.com", "password123").await.unwrap();
        auth.backend().set_profile_failing(true);

        auth.refresh().await.unwrap();
        assert!(credentials.is_authenticated());
    }

    #[tokio::test]
    async fn test_ensure_authenticated() {
        let credentials = Arc::new(CredentialStore::in_memory());
        let auth = Authenticator::new(credentials.clone(), backend());

        assert_eq!(
            auth.ensure_authenticated().await.unwrap_err(),
            ApiError::AuthExpired
        );

        let pair = auth.backend().issue_session("test@example.com").unwrap();
        credentials.set_token("expired.or.garbage").unwrap();
        credentials.set_refresh_token(pair.refresh).unwrap();

        auth.ensure_authenticated().await.unwrap();
        assert!(credentials.is_authenticated());
        assert_eq!(auth.backend().refresh_calls(), 1);

        // Valid token: nothing to do
        auth.ensure_authenticated().await.unwrap();
        assert_eq!(auth.backend().refresh_calls(), 1);
    }
}
