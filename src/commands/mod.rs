mod appointment;
mod auth;
mod config_cmd;
mod patient;
mod sync_cmd;

pub use appointment::{AppointmentCommand, AppointmentSubcommand};
pub use auth::{AuthCommand, AuthSubcommand};
pub use config_cmd::ConfigCommand;
pub use patient::{PatientCommand, PatientSubcommand};
pub use sync_cmd::SyncCommand;

use chrono::NaiveDate;
use clap::ValueEnum;
use std::io::{self, Write};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Asks a yes/no question on stdin; anything but "y" is a no.
fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Use YYYY-MM-DD.", value))
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let cut: String = value.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        value.to_string()
    }
}
