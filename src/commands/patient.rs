use clap::{Args, Subcommand};

use chelal::db::DeleteOutcome;
use chelal::models::{Patient, Record, SyncState};
use chelal::ClinicContext;

use super::{confirm, parse_date, truncate, OutputFormat};

#[derive(Args)]
pub struct PatientCommand {
    #[command(subcommand)]
    pub command: PatientSubcommand,
}

#[derive(Subcommand)]
pub enum PatientSubcommand {
    /// Register a new patient (stored offline until synced)
    Add {
        /// Clinic registration number
        unique_id: String,

        /// First name
        first_name: String,

        /// Last name
        last_name: String,

        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        dob: String,

        /// Gender
        #[arg(long)]
        gender: String,

        /// Phone and/or email
        #[arg(long)]
        contact: Option<String>,

        /// Home address
        #[arg(long)]
        address: Option<String>,

        /// Known allergies
        #[arg(long)]
        allergies: Option<String>,
    },

    /// List patients
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Include patients deleted locally but not yet synced
        #[arg(long)]
        all: bool,
    },

    /// Show a patient's details
    Show {
        /// Patient ID
        #[arg(allow_negative_numbers = true)]
        id: i64,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing patient
    Update {
        /// Patient ID
        #[arg(allow_negative_numbers = true)]
        id: i64,

        /// New first name
        #[arg(long)]
        first_name: Option<String>,

        /// New last name
        #[arg(long)]
        last_name: Option<String>,

        /// New date of birth (YYYY-MM-DD)
        #[arg(long)]
        dob: Option<String>,

        /// New gender
        #[arg(long)]
        gender: Option<String>,

        /// New contact information
        #[arg(long)]
        contact: Option<String>,

        /// New address
        #[arg(long)]
        address: Option<String>,

        /// New allergies
        #[arg(long)]
        allergies: Option<String>,
    },

    /// Delete a patient
    Delete {
        /// Patient ID
        #[arg(allow_negative_numbers = true)]
        id: i64,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// List patient changes waiting to be synced
    Pending {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl PatientCommand {
    pub async fn run(&self, ctx: &ClinicContext) -> Result<(), Box<dyn std::error::Error>> {
        let patients = ctx.db().patients();

        match &self.command {
            PatientSubcommand::Add {
                unique_id,
                first_name,
                last_name,
                dob,
                gender,
                contact,
                address,
                allergies,
            } => {
                if unique_id.trim().is_empty() {
                    return Err("Patient ID cannot be empty".into());
                }
                if first_name.trim().is_empty() || last_name.trim().is_empty() {
                    return Err("Patient name cannot be empty".into());
                }

                let mut patient = Patient::new(
                    unique_id.trim(),
                    first_name.trim(),
                    last_name.trim(),
                    parse_date(dob)?,
                    gender.trim(),
                );
                patient.contact_info = contact.clone();
                patient.address = address.clone();
                patient.known_allergies = allergies.clone();

                let created = patients.add(patient).await?;
                ctx.invalidate_names().await;
                println!("Added patient (pending sync):");
                print_patient(&created);
                Ok(())
            }

            PatientSubcommand::List { format, all } => {
                let list = if *all {
                    patients.get_all().await?
                } else {
                    patients.get_live().await?
                };

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&list)?);
                    }
                    OutputFormat::Text => {
                        if list.is_empty() {
                            println!("No patients found.");
                            return Ok(());
                        }
                        println!(
                            "{:<18}  {:<10}  {:<28}  {:<10}  STATE",
                            "ID", "NUMBER", "NAME", "BORN"
                        );
                        println!("{}", "-".repeat(84));
                        for record in &list {
                            println!(
                                "{:<18}  {:<10}  {:<28}  {:<10}  {}",
                                record.id,
                                truncate(&record.fields.unique_id, 10),
                                truncate(&record.fields.full_name(), 28),
                                record.fields.date_of_birth,
                                record.sync_state
                            );
                        }
                        println!("\nTotal: {} patient(s)", list.len());
                    }
                }
                Ok(())
            }

            PatientSubcommand::Show { id, format } => {
                let record = patients
                    .get(*id)
                    .await?
                    .ok_or_else(|| format!("Patient not found: {}", id))?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&record)?);
                    }
                    OutputFormat::Text => print_patient(&record),
                }
                Ok(())
            }

            PatientSubcommand::Update {
                id,
                first_name,
                last_name,
                dob,
                gender,
                contact,
                address,
                allergies,
            } => {
                let mut record = patients
                    .get(*id)
                    .await?
                    .filter(|r| r.is_live())
                    .ok_or_else(|| format!("Patient not found: {}", id))?;

                let mut changed = false;
                if let Some(first_name) = first_name {
                    record.fields.first_name = first_name.trim().to_string();
                    changed = true;
                }
                if let Some(last_name) = last_name {
                    record.fields.last_name = last_name.trim().to_string();
                    changed = true;
                }
                if let Some(dob) = dob {
                    record.fields.date_of_birth = parse_date(dob)?;
                    changed = true;
                }
                if let Some(gender) = gender {
                    record.fields.gender = gender.trim().to_string();
                    changed = true;
                }
                if contact.is_some() {
                    record.fields.contact_info = contact.clone();
                    changed = true;
                }
                if address.is_some() {
                    record.fields.address = address.clone();
                    changed = true;
                }
                if allergies.is_some() {
                    record.fields.known_allergies = allergies.clone();
                    changed = true;
                }

                if !changed {
                    return Err("Nothing to update. Pass at least one field option.".into());
                }

                let updated = patients.update(record).await?;
                ctx.invalidate_names().await;
                println!("Updated patient (pending sync):");
                print_patient(&updated);
                Ok(())
            }

            PatientSubcommand::Delete { id, force } => {
                let record = patients
                    .get(*id)
                    .await?
                    .filter(|r| r.is_live())
                    .ok_or_else(|| format!("Patient not found: {}", id))?;

                // Appointments booked for a patient never synced go with it
                let queued = if record.sync_state == SyncState::PendingAdd {
                    ctx.db()
                        .appointments()
                        .get_live()
                        .await?
                        .iter()
                        .filter(|a| a.fields.patient_id == record.id)
                        .count()
                } else {
                    0
                };

                if !force {
                    let mut prompt = format!(
                        "Delete patient '{}' ({})?",
                        record.fields.full_name(),
                        record.id
                    );
                    if queued > 0 {
                        prompt.push_str(&format!(
                            " {} unsynced appointment(s) will be discarded too.",
                            queued
                        ));
                    }
                    if !confirm(&prompt)? {
                        println!("Delete cancelled.");
                        return Ok(());
                    }
                }

                match patients.delete(*id).await? {
                    DeleteOutcome::Purged if queued > 0 => {
                        println!("Deleted patient {} and {} unsynced appointment(s).", id, queued)
                    }
                    DeleteOutcome::Purged => println!("Deleted patient {}.", id),
                    DeleteOutcome::MarkedForDeletion => {
                        println!("Deleted patient {} (will be removed from server on sync).", id)
                    }
                    DeleteOutcome::Missing => return Err(format!("Patient not found: {}", id).into()),
                }
                ctx.invalidate_names().await;
                Ok(())
            }

            PatientSubcommand::Pending { format } => {
                let pending = patients.get_pending().await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&pending)?);
                    }
                    OutputFormat::Text => {
                        if pending.is_empty() {
                            println!("No pending patient changes.");
                            return Ok(());
                        }
                        println!("{:<18}  {:<15}  NAME", "ID", "STATE");
                        println!("{}", "-".repeat(60));
                        for record in &pending {
                            println!(
                                "{:<18}  {:<15}  {}",
                                record.id,
                                record.sync_state,
                                record.fields.full_name()
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

fn print_patient(record: &Record<Patient>) {
    let patient = &record.fields;
    println!("  ID: {}", record.id);
    println!("  Number: {}", patient.unique_id);
    println!("  Name: {}", patient.full_name());
    println!("  Date of birth: {}", patient.date_of_birth);
    println!("  Gender: {}", patient.gender);
    if let Some(contact) = &patient.contact_info {
        println!("  Contact: {}", contact);
    }
    if let Some(address) = &patient.address {
        println!("  Address: {}", address);
    }
    if let Some(allergies) = &patient.known_allergies {
        println!("  Allergies: {}", allergies);
    }
    println!("  Sync state: {}", record.sync_state);
}
