use serde::Serialize;

use super::client::ApiClient;
use crate::auth::{AuthBackend, RefreshedToken, TokenPair};
use crate::error::ApiError;
use crate::models::UserProfile;

#[derive(Serialize)]
struct TokenRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// The backend's JWT endpoints.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    client: ApiClient,
}

impl HttpAuthBackend {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

impl AuthBackend for HttpAuthBackend {
    async fn obtain_token(&self, email: &str, password: &str) -> Result<TokenPair, ApiError> {
        self.client
            .post_json("auth/token", None, &TokenRequest { email, password })
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError> {
        self.client
            .post_json(
                "auth/refresh",
                None,
                &RefreshRequest {
                    refresh: refresh_token,
                },
            )
            .await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, ApiError> {
        self.client.get_json("users/me", Some(access_token)).await
    }
}
