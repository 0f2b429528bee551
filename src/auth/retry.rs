use std::future::Future;

use super::refresh::{AuthBackend, Authenticator};
use crate::error::ApiError;

impl<B: AuthBackend> Authenticator<B> {
    /// Runs `operation`, recovering once from an expired access token.
    ///
    /// A 401 triggers a token refresh followed by exactly one more attempt,
    /// whose outcome is returned as-is. Any other error is returned without
    /// touching the session. Without a refresh token the session is cleared
    /// and the original 401 is returned.
    pub async fn call_with_auth_retry<R, F, Fut>(&self, mut operation: F) -> Result<R, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, ApiError>>,
    {
        let presented = self.credentials.token();

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_unauthorized() => e,
            Err(e) => return Err(e),
        };

        if self.credentials.refresh_token().is_none() {
            tracing::warn!("Request rejected and no refresh token available: {}", err);
            self.credentials.logout();
            return Err(err);
        }

        tracing::debug!("Request rejected with 401, refreshing session");
        self.refresh_after(presented.as_deref()).await?;
        operation().await
    }
}
