//! Reconciliation between the local offline store and the backend.

mod auto_sync;
mod lookup;
mod reconciler;

pub use auto_sync::try_auto_sync;
pub use lookup::NameLookup;
pub use reconciler::{FailedPush, Reconciler, SyncError, SyncReport};

use crate::api::RemoteCollection;
use crate::db::LocalDatabase;
use crate::models::{Appointment, Patient};

/// Reconciles patients, then appointments.
///
/// Appointments queued against a patient created offline were pointed at
/// the patient's server id when the patient was reconciled, so they can be
/// pushed in the same pass.
pub async fn sync_database<P, A>(
    db: &LocalDatabase,
    patients: P,
    appointments: A,
) -> Result<Vec<SyncReport>, SyncError>
where
    P: RemoteCollection<Patient>,
    A: RemoteCollection<Appointment>,
{
    let patient_report = Reconciler::new(db.patients(), patients).run().await?;
    let appointment_report = Reconciler::new(db.appointments(), appointments)
        .run()
        .await?;

    Ok(vec![patient_report, appointment_report])
}
