//! Session lifetime management beyond token expiry.

mod idle;

pub use idle::{IdleTimeout, SessionEvent};
