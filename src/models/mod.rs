mod appointment;
mod patient;
mod record;
mod sync_state;
mod user;

pub use appointment::{Appointment, AppointmentStatus};
pub use patient::Patient;
pub use record::{Record, Syncable};
pub use sync_state::SyncState;
pub use user::UserProfile;
