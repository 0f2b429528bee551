//! Sync CLI commands for reconciling the offline store with the server.

use clap::{Args, Subcommand};
use std::time::Duration;

use chelal::db::schema_version;
use chelal::session::SessionEvent;
use chelal::sync::SyncReport;
use chelal::ClinicContext;

/// Sync with the clinic server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show server, session and offline queue status
    Status,
    /// Keep syncing in the foreground until the session goes idle
    Watch {
        /// Seconds between sync passes
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}

impl SyncCommand {
    pub async fn run(&self, ctx: &ClinicContext) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(ctx).await,
            Some(SyncSubcommand::Status) => self.status(ctx).await,
            Some(SyncSubcommand::Watch { interval }) => {
                self.watch(ctx, Duration::from_secs((*interval).max(1)))
                    .await
            }
        }
    }

    async fn sync(&self, ctx: &ClinicContext) -> Result<(), Box<dyn std::error::Error>> {
        if !ctx.has_session() {
            return Err("Not logged in. Run 'chelal auth login <email>' first.".into());
        }
        if !ctx.client().check_health().await {
            return Err(format!("Server unreachable: {}", ctx.client().base_url()).into());
        }

        println!("Syncing with server...");
        println!();

        let reports = ctx.sync_all().await?;
        for report in &reports {
            print_report(report);
        }

        println!();
        if reports.iter().all(SyncReport::is_clean) {
            println!("Sync complete.");
        } else {
            println!("Sync finished with changes still queued. Run 'chelal sync' again later.");
        }
        Ok(())
    }

    async fn status(&self, ctx: &ClinicContext) -> Result<(), Box<dyn std::error::Error>> {
        let config = ctx.config();

        println!("Sync Status");
        println!("===========");
        println!();

        println!("Server:    {}", config.api.base_url);
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!(
            "Session:   {}",
            match ctx.credentials().user() {
                Some(user) if ctx.has_session() => format!("logged in as {}", user.name),
                _ if ctx.has_session() => "logged in".to_string(),
                _ => "not logged in".to_string(),
            }
        );

        print!("Server status: ");
        if ctx.client().check_health().await {
            println!("✓ reachable");
        } else {
            println!("✗ unreachable");
        }
        println!();

        let patients = ctx.db().patients().pending_count().await?;
        let appointments = ctx.db().appointments().pending_count().await?;
        println!("Pending changes:");
        println!("  patients:     {}", patients);
        println!("  appointments: {}", appointments);
        println!();

        println!("Database:  {}", config.database_path.value.display());
        println!("Schema:    {}", schema_version(ctx.db().pool()).await?);
        Ok(())
    }

    async fn watch(
        &self,
        ctx: &ClinicContext,
        interval: Duration,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if !ctx.has_session() {
            return Err("Not logged in. Run 'chelal auth login <email>' first.".into());
        }

        let idle = ctx.idle_timeout();
        let mut events = idle.subscribe();
        let mut ticker = tokio::time::interval(interval);
        let mut seen_activity = ctx.credentials().last_activity();

        println!(
            "Watching for changes every {}s (session ends after {} min without a chelal command). Press Ctrl-C to stop.",
            interval.as_secs(),
            ctx.config().session.idle_timeout_minutes
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Commands run elsewhere keep the session alive
                    match ctx.credentials().reload_activity() {
                        Ok(latest) if latest > seen_activity => {
                            seen_activity = latest;
                            idle.touch();
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Watch: {}", e),
                    }

                    let pending = ctx.db().patients().pending_count().await?
                        + ctx.db().appointments().pending_count().await?;
                    if pending == 0 {
                        continue;
                    }

                    if !ctx.client().check_health().await {
                        tracing::info!("Watch: server unreachable, {} change(s) queued", pending);
                        continue;
                    }
                    match ctx.sync_all().await {
                        Ok(reports) => {
                            for report in reports.iter().filter(|r| r.pushed > 0 || !r.is_clean()) {
                                print_report(report);
                            }
                        }
                        Err(e) if e.is_auth_expired() => {
                            return Err("Session expired. Log in again to keep syncing.".into());
                        }
                        Err(e) => tracing::warn!("Watch: {}", e),
                    }
                }
                event = events.recv() => {
                    if let Ok(SessionEvent::Expired) = event {
                        println!("Session ended after inactivity. Log in again to sync.");
                    }
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    println!("Stopped.");
                    break;
                }
            }
        }

        idle.stop();
        Ok(())
    }
}

fn print_report(report: &SyncReport) {
    let status = if report.is_clean() { "✓" } else { "!" };
    println!(
        "  {} {}: {} pushed, {} pulled",
        status, report.collection, report.pushed, report.merged
    );
    if report.deferred > 0 {
        println!(
            "      {} waiting on records not synced yet",
            report.deferred
        );
    }
    for failed in &report.failed {
        println!(
            "      {} ({}) not pushed: {}",
            failed.id, failed.sync_state, failed.error
        );
    }
}
