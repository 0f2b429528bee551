//! Login, logout and session status.

use clap::{Args, Subcommand};
use std::io::{self, Write};

use chelal::auth::AuthBackend;
use chelal::ClinicContext;

/// Authentication commands
#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    pub command: AuthSubcommand,
}

#[derive(Subcommand)]
pub enum AuthSubcommand {
    /// Log in with email and password
    Login {
        /// Account email
        email: String,

        /// Password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Log out and forget the stored tokens
    Logout {
        /// Also discard the local offline store, including unsynced changes
        #[arg(long)]
        purge: bool,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
    /// Show authentication status
    Status,
}

impl AuthCommand {
    pub async fn run(&self, ctx: &ClinicContext) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            AuthSubcommand::Login { email, password } => {
                let password = match password {
                    Some(password) => password.clone(),
                    None => prompt_password()?,
                };
                if password.is_empty() {
                    return Err("Password cannot be empty".into());
                }

                let user = ctx.auth().login(email.trim(), &password).await?;
                println!("Logged in as {} ({})", user.name, user.role);
                Ok(())
            }

            AuthSubcommand::Logout { purge, force } => {
                if *purge {
                    let pending = ctx.db().patients().pending_count().await?
                        + ctx.db().appointments().pending_count().await?;
                    if pending > 0 && !force {
                        let prompt = format!(
                            "{} unsynced change(s) will be lost. Continue?",
                            pending
                        );
                        if !super::confirm(&prompt)? {
                            println!("Logout cancelled.");
                            return Ok(());
                        }
                    }
                    ctx.db().patients().clear().await?;
                    ctx.db().appointments().clear().await?;
                    println!("Local data cleared.");
                }

                ctx.auth().logout();
                println!("Logged out.");
                Ok(())
            }

            AuthSubcommand::Status => status(ctx).await,
        }
    }
}

async fn status(ctx: &ClinicContext) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = ctx.credentials();
    if !ctx.has_session() {
        println!("Not logged in.");
        println!("Run 'chelal auth login <email>' to log in.");
        return Ok(());
    }

    println!("Server: {}", ctx.client().base_url());
    match credentials.token_expires_at() {
        Some(expires) if credentials.is_authenticated() => {
            println!("Access token: valid until {}", expires.to_rfc3339())
        }
        _ => println!("Access token: expired (will refresh on next request)"),
    }

    if !ctx.client().check_health().await {
        println!("Status: offline (server unreachable)");
        return Ok(());
    }

    let auth = ctx.auth();
    let profile = auth
        .call_with_auth_retry(|| {
            let token = credentials.token().unwrap_or_default();
            async move { auth.backend().fetch_profile(&token).await }
        })
        .await;

    match profile {
        Ok(user) => {
            credentials.set_user(user.clone());
            println!("Logged in as: {}", user.name);
            if let Some(email) = &user.email {
                println!("Email: {}", email);
            }
            println!("Role: {}", user.role);
        }
        Err(e) => {
            println!("Session invalid: {}", e);
            println!("Run 'chelal auth login <email>' to log in again.");
        }
    }
    Ok(())
}

fn prompt_password() -> io::Result<String> {
    print!("Password: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}
