//! Offline-first client core for the Chelal clinic management system.
//!
//! - [`auth`]: session state, token refresh and the auth-retry wrapper.
//! - [`db`]: the local SQLite store with per-record sync state.
//! - [`sync`]: reconciliation of the local store with the backend.
//! - [`api`]: the backend's REST endpoints and in-memory stand-ins.

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod session;
pub mod sync;

pub use context::{ClinicContext, ContextError};
pub use error::ApiError;
