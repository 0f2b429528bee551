use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Syncable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
    Pending,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "Scheduled"),
            AppointmentStatus::Completed => write!(f, "Completed"),
            AppointmentStatus::Cancelled => write!(f, "Cancelled"),
            AppointmentStatus::Pending => write!(f, "Pending"),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" | "canceled" => Ok(AppointmentStatus::Cancelled),
            "pending" => Ok(AppointmentStatus::Pending),
            _ => Err(format!(
                "Invalid appointment status '{}'. Valid options: scheduled, completed, cancelled, pending",
                s
            )),
        }
    }
}

/// A booked visit between a patient and a doctor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub patient_id: i64,
    pub doctor_id: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    // Display-only, filled in by the backend or from the local name lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_name: Option<String>,
}

impl Appointment {
    pub fn new(
        patient_id: i64,
        doctor_id: impl Into<String>,
        appointment_date: NaiveDate,
        appointment_time: NaiveTime,
    ) -> Self {
        Self {
            patient_id,
            doctor_id: doctor_id.into(),
            appointment_date,
            appointment_time,
            status: AppointmentStatus::Scheduled,
            notes: None,
            created_at: None,
            updated_at: None,
            patient_name: None,
            doctor_name: None,
        }
    }
}

impl Syncable for Appointment {
    const COLLECTION: &'static str = "appointments";

    fn has_unsynced_reference(&self) -> bool {
        self.patient_id < 0
    }
}
