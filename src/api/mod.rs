//! Access to the clinic backend: REST client, auth endpoints and the
//! per-entity collections the reconciler talks to.

mod auth;
mod client;
mod collection;
mod memory;

pub use auth::HttpAuthBackend;
pub use client::ApiClient;
pub use collection::{HttpCollection, RemoteCollection};
pub use memory::{InMemoryAuthBackend, InMemoryCollection};
