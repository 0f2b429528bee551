use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use chelal::config::Config;
use chelal::sync::try_auto_sync;
use chelal::ClinicContext;
use commands::{
    AppointmentCommand, AppointmentSubcommand, AuthCommand, AuthSubcommand, ConfigCommand,
    PatientCommand, PatientSubcommand, SyncCommand,
};

#[derive(Parser)]
#[command(name = "chelal")]
#[command(version)]
#[command(about = "Offline-first clinic management client", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, log out and check the session
    Auth(AuthCommand),

    /// Manage patients
    Patient(PatientCommand),

    /// Manage appointments
    Appointment(AppointmentCommand),

    /// Sync with the clinic server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("CHELAL_LOG")
                .unwrap_or_else(|_| "chelal=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => return cmd.run(&config),
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
        Some(command) => command,
    };

    let ctx = ClinicContext::open(config).await?;

    // Auto-sync BEFORE read commands
    if is_read_command(&command) {
        try_auto_sync(&ctx).await;
    }

    let result = execute_command(&command, &ctx).await;

    // Auto-sync AFTER write commands (only if command succeeded)
    if result.is_ok() && is_write_command(&command) {
        try_auto_sync(&ctx).await;
    }

    ctx.db().close().await;
    result
}

async fn execute_command(
    command: &Commands,
    ctx: &ClinicContext,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Auth(cmd) => cmd.run(ctx).await,
        Commands::Patient(cmd) => cmd.run(ctx).await,
        Commands::Appointment(cmd) => cmd.run(ctx).await,
        Commands::Sync(cmd) => cmd.run(ctx).await,
        Commands::Config(cmd) => cmd.run(ctx.config()),
    }
}

/// Returns true if the command is a read operation that should sync before execution.
fn is_read_command(cmd: &Commands) -> bool {
    matches!(
        cmd,
        Commands::Patient(p) if matches!(p.command,
            PatientSubcommand::List { .. } | PatientSubcommand::Show { .. })
    ) || matches!(
        cmd,
        Commands::Appointment(a) if matches!(a.command,
            AppointmentSubcommand::List { .. } | AppointmentSubcommand::Show { .. })
    )
}

/// Returns true if the command is a write operation that should sync after execution.
fn is_write_command(cmd: &Commands) -> bool {
    matches!(
        cmd,
        Commands::Auth(a) if matches!(a.command, AuthSubcommand::Login { .. })
    ) || matches!(
        cmd,
        Commands::Patient(p) if matches!(p.command,
            PatientSubcommand::Add { .. }
            | PatientSubcommand::Update { .. }
            | PatientSubcommand::Delete { .. })
    ) || matches!(
        cmd,
        Commands::Appointment(a) if matches!(a.command,
            AppointmentSubcommand::Add { .. }
            | AppointmentSubcommand::Update { .. }
            | AppointmentSubcommand::Delete { .. })
    )
}
