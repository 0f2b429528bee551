use chrono::NaiveTime;
use clap::{Args, Subcommand};

use chelal::db::DeleteOutcome;
use chelal::models::{Appointment, AppointmentStatus, Record};
use chelal::ClinicContext;

use super::{confirm, parse_date, truncate, OutputFormat};

#[derive(Args)]
pub struct AppointmentCommand {
    #[command(subcommand)]
    pub command: AppointmentSubcommand,
}

#[derive(Subcommand)]
pub enum AppointmentSubcommand {
    /// Book an appointment (stored offline until synced)
    Add {
        /// Patient ID (may be a local, not yet synced patient)
        #[arg(long, allow_negative_numbers = true)]
        patient: i64,

        /// Doctor ID
        #[arg(long)]
        doctor: String,

        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Time (HH:MM)
        #[arg(long)]
        time: String,

        /// Status: scheduled, completed, cancelled, pending
        #[arg(long, default_value = "scheduled")]
        status: String,

        /// Notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// List appointments
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only appointments on this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Only appointments for this patient ID
        #[arg(long, allow_negative_numbers = true)]
        patient: Option<i64>,
    },

    /// Show an appointment's details
    Show {
        /// Appointment ID
        #[arg(allow_negative_numbers = true)]
        id: i64,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing appointment
    Update {
        /// Appointment ID
        #[arg(allow_negative_numbers = true)]
        id: i64,

        /// New doctor ID
        #[arg(long)]
        doctor: Option<String>,

        /// New date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// New time (HH:MM)
        #[arg(long)]
        time: Option<String>,

        /// New status
        #[arg(long)]
        status: Option<String>,

        /// New notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete an appointment
    Delete {
        /// Appointment ID
        #[arg(allow_negative_numbers = true)]
        id: i64,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// List appointment changes waiting to be synced
    Pending {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl AppointmentCommand {
    pub async fn run(&self, ctx: &ClinicContext) -> Result<(), Box<dyn std::error::Error>> {
        let appointments = ctx.db().appointments();

        match &self.command {
            AppointmentSubcommand::Add {
                patient,
                doctor,
                date,
                time,
                status,
                notes,
            } => {
                ctx.db()
                    .patients()
                    .get(*patient)
                    .await?
                    .filter(|r| r.is_live())
                    .ok_or_else(|| format!("Patient not found: {}", patient))?;
                if doctor.trim().is_empty() {
                    return Err("Doctor ID cannot be empty".into());
                }

                let mut appointment =
                    Appointment::new(*patient, doctor.trim(), parse_date(date)?, parse_time(time)?);
                appointment.status = status.parse::<AppointmentStatus>()?;
                appointment.notes = notes.clone();

                let mut created = appointments.add(appointment).await?;
                ctx.annotate_appointments(std::slice::from_mut(&mut created))
                    .await?;
                println!("Booked appointment (pending sync):");
                print_appointment(&created);
                Ok(())
            }

            AppointmentSubcommand::List {
                format,
                date,
                patient,
            } => {
                let date = date.as_deref().map(parse_date).transpose()?;
                let mut list: Vec<Record<Appointment>> = appointments
                    .get_live()
                    .await?
                    .into_iter()
                    .filter(|a| date.map_or(true, |d| a.fields.appointment_date == d))
                    .filter(|a| patient.map_or(true, |p| a.fields.patient_id == p))
                    .collect();
                list.sort_by_key(|a| (a.fields.appointment_date, a.fields.appointment_time));
                ctx.annotate_appointments(&mut list).await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&list)?);
                    }
                    OutputFormat::Text => {
                        if list.is_empty() {
                            println!("No appointments found.");
                            return Ok(());
                        }
                        println!(
                            "{:<18}  {:<10}  {:<5}  {:<24}  {:<10}  {:<9}  STATE",
                            "ID", "DATE", "TIME", "PATIENT", "DOCTOR", "STATUS"
                        );
                        println!("{}", "-".repeat(100));
                        for record in &list {
                            let a = &record.fields;
                            let patient = a
                                .patient_name
                                .clone()
                                .unwrap_or_else(|| format!("#{}", a.patient_id));
                            println!(
                                "{:<18}  {:<10}  {:<5}  {:<24}  {:<10}  {:<9}  {}",
                                record.id,
                                a.appointment_date,
                                a.appointment_time.format("%H:%M"),
                                truncate(&patient, 24),
                                truncate(&a.doctor_id, 10),
                                a.status,
                                record.sync_state
                            );
                        }
                        println!("\nTotal: {} appointment(s)", list.len());
                    }
                }
                Ok(())
            }

            AppointmentSubcommand::Show { id, format } => {
                let mut record = appointments
                    .get(*id)
                    .await?
                    .ok_or_else(|| format!("Appointment not found: {}", id))?;
                ctx.annotate_appointments(std::slice::from_mut(&mut record))
                    .await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&record)?);
                    }
                    OutputFormat::Text => print_appointment(&record),
                }
                Ok(())
            }

            AppointmentSubcommand::Update {
                id,
                doctor,
                date,
                time,
                status,
                notes,
            } => {
                let mut record = appointments
                    .get(*id)
                    .await?
                    .filter(|r| r.is_live())
                    .ok_or_else(|| format!("Appointment not found: {}", id))?;

                let mut changed = false;
                if let Some(doctor) = doctor {
                    record.fields.doctor_id = doctor.trim().to_string();
                    changed = true;
                }
                if let Some(date) = date {
                    record.fields.appointment_date = parse_date(date)?;
                    changed = true;
                }
                if let Some(time) = time {
                    record.fields.appointment_time = parse_time(time)?;
                    changed = true;
                }
                if let Some(status) = status {
                    record.fields.status = status.parse::<AppointmentStatus>()?;
                    changed = true;
                }
                if notes.is_some() {
                    record.fields.notes = notes.clone();
                    changed = true;
                }

                if !changed {
                    return Err("Nothing to update. Pass at least one field option.".into());
                }

                // Names are display-only; the server fills them in again.
                record.fields.patient_name = None;
                record.fields.doctor_name = None;

                let mut updated = appointments.update(record).await?;
                ctx.annotate_appointments(std::slice::from_mut(&mut updated))
                    .await?;
                println!("Updated appointment (pending sync):");
                print_appointment(&updated);
                Ok(())
            }

            AppointmentSubcommand::Delete { id, force } => {
                let record = appointments
                    .get(*id)
                    .await?
                    .filter(|r| r.is_live())
                    .ok_or_else(|| format!("Appointment not found: {}", id))?;

                if !force {
                    let prompt = format!(
                        "Delete appointment {} on {} at {}?",
                        record.id,
                        record.fields.appointment_date,
                        record.fields.appointment_time.format("%H:%M")
                    );
                    if !confirm(&prompt)? {
                        println!("Delete cancelled.");
                        return Ok(());
                    }
                }

                match appointments.delete(*id).await? {
                    DeleteOutcome::Purged => println!("Deleted appointment {}.", id),
                    DeleteOutcome::MarkedForDeletion => println!(
                        "Deleted appointment {} (will be removed from server on sync).",
                        id
                    ),
                    DeleteOutcome::Missing => {
                        return Err(format!("Appointment not found: {}", id).into())
                    }
                }
                Ok(())
            }

            AppointmentSubcommand::Pending { format } => {
                let pending = appointments.get_pending().await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&pending)?);
                    }
                    OutputFormat::Text => {
                        if pending.is_empty() {
                            println!("No pending appointment changes.");
                            return Ok(());
                        }
                        println!("{:<18}  {:<15}  {:<10}  PATIENT", "ID", "STATE", "DATE");
                        println!("{}", "-".repeat(64));
                        for record in &pending {
                            let waiting = if record.fields.patient_id < 0 {
                                " (waiting for patient sync)"
                            } else {
                                ""
                            };
                            println!(
                                "{:<18}  {:<15}  {:<10}  {}{}",
                                record.id,
                                record.sync_state,
                                record.fields.appointment_date,
                                record.fields.patient_id,
                                waiting
                            );
                        }
                        println!("\nTotal: {} pending change(s)", pending.len());
                    }
                }
                Ok(())
            }
        }
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| format!("Invalid time format '{}'. Use HH:MM.", value))
}

fn print_appointment(record: &Record<Appointment>) {
    let a = &record.fields;
    println!("  ID: {}", record.id);
    match &a.patient_name {
        Some(name) => println!("  Patient: {} ({})", name, a.patient_id),
        None => println!("  Patient: {}", a.patient_id),
    }
    match &a.doctor_name {
        Some(name) => println!("  Doctor: {} ({})", name, a.doctor_id),
        None => println!("  Doctor: {}", a.doctor_id),
    }
    println!("  Date: {}", a.appointment_date);
    println!("  Time: {}", a.appointment_time.format("%H:%M"));
    println!("  Status: {}", a.status);
    if let Some(notes) = &a.notes {
        println!("  Notes: {}", notes);
    }
    println!("  Sync state: {}", record.sync_state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time() {
        assert_eq!(
            parse_time("09:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert_eq!(
            parse_time("14:05:30").unwrap(),
            NaiveTime::from_hms_opt(14, 5, 30).unwrap()
        );
        assert!(parse_time("9.30am").is_err());
    }
}
