use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use chelal::config::{ApiConfig, Config, SessionConfig, SyncConfig};

use super::OutputFormat;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Write a config file with the current settings
    Init {
        /// Where to write the file (defaults to the platform config path)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

/// The file-backed part of [`Config`].
#[derive(Serialize)]
struct ConfigFile<'a> {
    api: &'a ApiConfig,
    sync: &'a SyncConfig,
    session: &'a SessionConfig,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => print_config(config),
                }
                Ok(())
            }

            ConfigSubcommand::Init { path, force } => {
                let path = path.clone().unwrap_or_else(Config::default_config_path);
                if path.exists() && !force {
                    return Err(format!(
                        "Config file already exists: {} (use --force to overwrite)",
                        path.display()
                    )
                    .into());
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                let contents = serde_yaml::to_string(&ConfigFile {
                    api: &config.api,
                    sync: &config.sync,
                    session: &config.session,
                })?;
                std::fs::write(&path, contents)?;
                println!("Wrote {}", path.display());
                Ok(())
            }
        }
    }
}

fn print_config(config: &Config) {
    println!("Configuration");
    println!("=============\n");

    if let Some(path) = &config.config_file {
        println!("Config file: {}", path.display());
    } else {
        println!(
            "Config file: {} (not found)",
            Config::default_config_path().display()
        );
    }
    println!();

    println!("database_path: {}", config.database_path.value.display());
    println!("  source: {}", config.database_path.source);
    println!();

    println!("data_dir: {}", config.data_dir.value.display());
    println!("  source: {}", config.data_dir.source);
    println!();

    println!("api.base_url: {}", config.api.base_url);
    println!("api.timeout_secs: {}", config.api.timeout_secs);
    println!("sync.auto_sync: {}", config.sync.auto_sync);
    println!(
        "session.idle_timeout_minutes: {}",
        config.session.idle_timeout_minutes
    );
    println!(
        "session.refetch_profile_on_refresh: {}",
        config.session.refetch_profile_on_refresh
    );
    println!("session.coalesce_refresh: {}", config.session.coalesce_refresh);
}
