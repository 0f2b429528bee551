//! Session state, token refresh and the auth-retry wrapper.

mod credentials;
pub mod jwt;
mod refresh;
mod retry;
mod storage;

pub use credentials::CredentialStore;
pub use refresh::{AuthBackend, AuthOptions, Authenticator, RefreshedToken, TokenPair};
pub use storage::{
    CredentialError, FileSessionStorage, MemorySessionStorage, SessionStorage, LAST_ACTIVITY_KEY,
    REFRESH_TOKEN_KEY, TOKEN_KEY,
};
