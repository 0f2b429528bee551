use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Appointment, Syncable};

/// Patient demographics as exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Clinic-issued registration number (e.g. "STU1001").
    pub unique_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    /// Free-form phone and/or email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_allergies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Patient {
    pub fn new(
        unique_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        date_of_birth: NaiveDate,
        gender: impl Into<String>,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth,
            gender: gender.into(),
            contact_info: None,
            address: None,
            known_allergies: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Syncable for Patient {
    const COLLECTION: &'static str = "patients";
    const REFERENCED_BY: &'static [(&'static str, &'static str)] =
        &[(Appointment::COLLECTION, "$.patient_id")];
}
