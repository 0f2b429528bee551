//! In-process stand-ins for the backend, used in tests and offline demos.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::collection::RemoteCollection;
use crate::auth::jwt::{self, Claims};
use crate::auth::{AuthBackend, RefreshedToken, TokenPair};
use crate::error::ApiError;
use crate::models::{Record, Syncable, UserProfile};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct CollectionState<T> {
    records: BTreeMap<i64, T>,
    next_id: i64,
    failures: VecDeque<ApiError>,
    calls: Vec<String>,
}

/// A remote collection held in memory. Server ids count up from 1 unless
/// configured otherwise.
#[derive(Debug)]
pub struct InMemoryCollection<T> {
    state: Mutex<CollectionState<T>>,
}

impl<T: Syncable> Default for InMemoryCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Syncable> InMemoryCollection<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CollectionState {
                records: BTreeMap::new(),
                next_id: 1,
                failures: VecDeque::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// The next created record gets `id`.
    pub fn starting_at(self, id: i64) -> Self {
        lock(&self.state).next_id = id;
        self
    }

    /// Seeds a server-side record.
    pub fn with_record(self, id: i64, fields: T) -> Self {
        {
            let mut state = lock(&self.state);
            state.records.insert(id, fields);
            state.next_id = state.next_id.max(id + 1);
        }
        self
    }

    /// Makes the next call (of any kind) fail with `error`.
    pub fn fail_next(&self, error: ApiError) {
        lock(&self.state).failures.push_back(error);
    }

    pub fn records(&self) -> Vec<Record<T>> {
        lock(&self.state)
            .records
            .iter()
            .map(|(id, fields)| Record::synced(*id, fields.clone()))
            .collect()
    }

    pub fn get(&self, id: i64) -> Option<T> {
        lock(&self.state).records.get(&id).cloned()
    }

    /// Calls received so far, e.g. `["create", "update 3", "delete 4"]`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    fn begin(&self, call: String) -> Result<MutexGuard<'_, CollectionState<T>>, ApiError> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

impl<T: Syncable> RemoteCollection<T> for InMemoryCollection<T> {
    async fn list(&self) -> Result<Vec<Record<T>>, ApiError> {
        drop(self.begin("list".to_string())?);
        Ok(self.records())
    }

    async fn create(&self, fields: &T) -> Result<Record<T>, ApiError> {
        let mut state = self.begin("create".to_string())?;
        let id = state.next_id;
        state.next_id += 1;
        state.records.insert(id, fields.clone());
        Ok(Record::synced(id, fields.clone()))
    }

    async fn update(&self, id: i64, fields: &T) -> Result<Record<T>, ApiError> {
        let mut state = self.begin(format!("update {}", id))?;
        match state.records.get_mut(&id) {
            Some(existing) => {
                *existing = fields.clone();
                Ok(Record::synced(id, fields.clone()))
            }
            None => Err(ApiError::NotFound(format!("{} {}", T::COLLECTION, id))),
        }
    }

    async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let mut state = self.begin(format!("delete {}", id))?;
        match state.records.remove(&id) {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound(format!("{} {}", T::COLLECTION, id))),
        }
    }
}

#[derive(Debug, Default)]
struct AuthState {
    /// email -> (password, profile)
    accounts: HashMap<String, (String, UserProfile)>,
    /// live access token -> email
    access: HashMap<String, String>,
    /// live refresh token -> email
    refresh: HashMap<String, String>,
}

/// An auth backend that issues unsigned JWTs from a fixed account list.
#[derive(Debug)]
pub struct InMemoryAuthBackend {
    state: Mutex<AuthState>,
    access_ttl: i64,
    refresh_delay: Option<Duration>,
    profile_failing: AtomicBool,
    refresh_calls: AtomicUsize,
    serial: AtomicU64,
}

impl Default for InMemoryAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AuthState::default()),
            access_ttl: 300,
            refresh_delay: None,
            profile_failing: AtomicBool::new(false),
            refresh_calls: AtomicUsize::new(0),
            serial: AtomicU64::new(1),
        }
    }

    pub fn with_account(self, email: &str, password: &str, profile: UserProfile) -> Self {
        lock(&self.state)
            .accounts
            .insert(email.to_string(), (password.to_string(), profile));
        self
    }

    /// Lifetime of issued access tokens, in seconds.
    pub fn with_access_ttl(mut self, seconds: i64) -> Self {
        self.access_ttl = seconds;
        self
    }

    /// Holds every refresh for `delay` before answering.
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    pub fn with_failing_profile(self) -> Self {
        self.set_profile_failing(true);
        self
    }

    pub fn set_profile_failing(&self, failing: bool) {
        self.profile_failing.store(failing, Ordering::SeqCst);
    }

    /// Invalidates every access token issued so far.
    pub fn revoke_access_tokens(&self) {
        lock(&self.state).access.clear();
    }

    pub fn revoke_refresh_tokens(&self) {
        lock(&self.state).refresh.clear();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Issues a fresh token pair for `email` without checking a password.
    pub fn issue_session(&self, email: &str) -> Option<TokenPair> {
        let mut state = lock(&self.state);
        if !state.accounts.contains_key(email) {
            return None;
        }
        let access = self.mint(email);
        let refresh = format!("refresh-{}", self.serial.fetch_add(1, Ordering::SeqCst));
        state.access.insert(access.clone(), email.to_string());
        state.refresh.insert(refresh.clone(), email.to_string());
        Some(TokenPair { access, refresh })
    }

    /// Resolves a bearer token to its owner, as a protected endpoint would.
    pub fn authorize(&self, access_token: &str) -> Result<UserProfile, ApiError> {
        let state = lock(&self.state);
        if jwt::is_expired(access_token) {
            return Err(ApiError::Unauthorized("Token is expired".to_string()));
        }
        state
            .access
            .get(access_token)
            .and_then(|email| state.accounts.get(email))
            .map(|(_, profile)| profile.clone())
            .ok_or_else(|| {
                ApiError::Unauthorized("Given token not valid for any token type".to_string())
            })
    }

    fn mint(&self, email: &str) -> String {
        jwt::encode_unsigned(&Claims {
            exp: Utc::now().timestamp() + self.access_ttl,
            sub: Some(email.to_string()),
            jti: Some(self.serial.fetch_add(1, Ordering::SeqCst).to_string()),
        })
    }
}

impl AuthBackend for InMemoryAuthBackend {
    async fn obtain_token(&self, email: &str, password: &str) -> Result<TokenPair, ApiError> {
        let valid = matches!(
            lock(&self.state).accounts.get(email),
            Some((expected, _)) if expected == password
        );
        if !valid {
            return Err(ApiError::Unauthorized(
                "No active account found with the given credentials".to_string(),
            ));
        }
        self.issue_session(email)
            .ok_or_else(|| ApiError::Unauthorized("Account disappeared".to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        let email = state
            .refresh
            .get(refresh_token)
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Token is invalid or expired".to_string()))?;
        let access = self.mint(&email);
        state.access.insert(access.clone(), email);
        Ok(RefreshedToken {
            access,
            refresh: None,
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, ApiError> {
        if self.profile_failing.load(Ordering::SeqCst) {
            return Err(ApiError::Http {
                status: 500,
                message: "profile service unavailable".to_string(),
            });
        }
        self.authorize(access_token)
    }
}
