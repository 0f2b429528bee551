use std::collections::{HashMap, VecDeque};

use crate::db::{OfflineCollection, StoreError};
use crate::models::{Appointment, Patient, Record};

/// Default number of names kept.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Bounded id -> display name cache used to label appointments with their
/// patient's name. Oldest entries are evicted first.
#[derive(Debug)]
pub struct NameLookup {
    capacity: usize,
    names: HashMap<i64, String>,
    order: VecDeque<i64>,
}

impl Default for NameLookup {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NameLookup {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            names: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn insert(&mut self, id: i64, name: impl Into<String>) {
        if self.names.insert(id, name.into()).is_some() {
            return;
        }
        self.order.push_back(id);
        while self.names.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.names.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Forgets everything, e.g. after a sync brought in renamed patients.
    pub fn invalidate(&mut self) {
        self.names.clear();
        self.order.clear();
    }

    pub fn fill_from(&mut self, patients: &[Record<Patient>]) {
        for patient in patients {
            self.insert(patient.id, patient.fields.full_name());
        }
    }

    /// Fills in `patient_name` on appointments that lack one.
    ///
    /// The local patient table is read at most once, and only when some
    /// patient is not cached yet.
    pub async fn annotate(
        &mut self,
        patients: &OfflineCollection<Patient>,
        appointments: &mut [Record<Appointment>],
    ) -> Result<(), StoreError> {
        let missing = appointments.iter().any(|a| {
            a.fields.patient_name.is_none() && self.get(a.fields.patient_id).is_none()
        });
        if missing {
            tracing::debug!("Refreshing patient name cache");
            self.fill_from(&patients.get_all().await?);
        }

        for appointment in appointments.iter_mut() {
            if appointment.fields.patient_name.is_none() {
                appointment.fields.patient_name =
                    self.get(appointment.fields.patient_id).map(str::to_string);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalDatabase;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn test_evicts_oldest() {
        let mut names = NameLookup::new(2);
        names.insert(1, "Alice Johnson");
        names.insert(2, "Bob Smith");
        names.insert(3, "Carol White");

        assert_eq!(names.len(), 2);
        assert_eq!(names.get(1), None);
        assert_eq!(names.get(2), Some("Bob Smith"));
        assert_eq!(names.get(3), Some("Carol White"));
    }

    #[test]
    fn test_reinsert_updates_name() {
        let mut names = NameLookup::new(2);
        names.insert(1, "Alice Johnson");
        names.insert(1, "Alice Johnson-Smith");
        assert_eq!(names.len(), 1);
        assert_eq!(names.get(1), Some("Alice Johnson-Smith"));
    }

    #[test]
    fn test_invalidate() {
        let mut names = NameLookup::default();
        names.insert(1, "Alice Johnson");
        names.invalidate();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn test_annotate_from_local_patients() {
        let db = LocalDatabase::in_memory().await.unwrap();
        let alice = Patient::new(
            "STU1001",
            "Alice",
            "Johnson",
            NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
            "Female",
        );
        db.patients()
            .merge_from_server(&[Record::synced(501, alice)])
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let mut named = Appointment::new(501, "doc-1", date, time);
        named.patient_name = Some("From Server".to_string());
        let mut appointments = vec![
            Record::synced(1, Appointment::new(501, "doc-1", date, time)),
            Record::synced(2, Appointment::new(999, "doc-1", date, time)),
            Record::synced(3, named),
        ];

        let mut names = NameLookup::default();
        names
            .annotate(&db.patients(), &mut appointments)
            .await
            .unwrap();

        assert_eq!(
            appointments[0].fields.patient_name.as_deref(),
            Some("Alice Johnson")
        );
        assert_eq!(appointments[1].fields.patient_name, None);
        assert_eq!(
            appointments[2].fields.patient_name.as_deref(),
            Some("From Server")
        );
        assert_eq!(names.get(501), Some("Alice Johnson"));
    }
}
