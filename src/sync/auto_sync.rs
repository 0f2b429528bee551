//! Auto-sync around CLI commands.
//!
//! Runs a reconciliation before read commands and after write commands when
//! `sync.auto_sync` is enabled, a session exists and the server answers.

use crate::context::ClinicContext;

/// Performs auto-sync if enabled and the server is reachable.
///
/// Errors are logged and swallowed so the CLI keeps working offline.
pub async fn try_auto_sync(ctx: &ClinicContext) {
    if !ctx.config().sync.auto_sync {
        return;
    }
    if !ctx.has_session() {
        tracing::debug!("Auto-sync: not logged in, skipping");
        return;
    }

    // Check server reachability first (fast fail)
    if !ctx.client().check_health().await {
        tracing::info!("Auto-sync: server unreachable, skipping");
        return;
    }

    match ctx.sync_all().await {
        Ok(reports) => {
            for report in reports.iter().filter(|r| !r.failed.is_empty()) {
                tracing::warn!(
                    "Auto-sync: {} {} record(s) could not be pushed",
                    report.failed.len(),
                    report.collection
                );
            }
        }
        Err(e) if e.is_auth_expired() => {
            tracing::warn!("Auto-sync: session expired, log in again to sync");
        }
        Err(e) => tracing::warn!("Auto-sync: {}", e),
    }
}
