use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::auth::CredentialStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session was ended for inactivity.
    Expired,
}

/// Background task that logs the session out after a period without
/// activity. Report activity with [`IdleTimeout::touch`].
///
/// The task stops when the handle is dropped.
#[derive(Debug)]
pub struct IdleTimeout {
    activity: watch::Sender<Instant>,
    events: broadcast::Sender<SessionEvent>,
    task: JoinHandle<()>,
}

impl IdleTimeout {
    pub fn spawn(timeout: Duration, credentials: Arc<CredentialStore>) -> Self {
        let (activity, mut last_activity) = watch::channel(Instant::now());
        let (events, _) = broadcast::channel(4);
        let notify = events.clone();

        let task = tokio::spawn(async move {
            loop {
                let Some(deadline) = last_activity.borrow_and_update().checked_add(timeout) else {
                    // Unreachable deadline: only activity or shutdown can end the wait
                    if last_activity.changed().await.is_err() {
                        break;
                    }
                    continue;
                };
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        // Activity reported right at the deadline wins
                        if last_activity.has_changed().unwrap_or(false) {
                            continue;
                        }
                        tracing::info!("No activity for {:?}, ending session", timeout);
                        credentials.logout();
                        // Nobody listening is fine
                        let _ = notify.send(SessionEvent::Expired);
                        break;
                    }
                    changed = last_activity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            activity,
            events,
            task,
        }
    }

    /// Postpones the deadline to `timeout` from now.
    pub fn touch(&self) {
        self.activity.send_replace(Instant::now());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// False once the session has expired or the task was stopped.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for IdleTimeout {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::token_expiring_in;

    fn signed_in() -> Arc<CredentialStore> {
        let credentials = Arc::new(CredentialStore::in_memory());
        credentials.set_token(token_expiring_in(3600)).unwrap();
        credentials.set_refresh_token("refresh").unwrap();
        credentials
    }

    #[tokio::test(start_paused = true)]
    async fn test_logs_out_after_inactivity() {
        let credentials = signed_in();
        let idle = IdleTimeout::spawn(Duration::from_secs(30 * 60), credentials.clone());
        let mut events = idle.subscribe();

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
        assert!(credentials.token().is_none());
        assert!(credentials.refresh_token().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_postpones_expiry() {
        let credentials = signed_in();
        let idle = IdleTimeout::spawn(Duration::from_secs(30 * 60), credentials.clone());
        let mut events = idle.subscribe();

        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        idle.touch();
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        tokio::task::yield_now().await;

        assert!(credentials.token().is_some());
        assert!(idle.is_running());

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
        assert!(credentials.token().is_none());
        assert!(!credentials.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_session() {
        let credentials = signed_in();
        let idle = IdleTimeout::spawn(Duration::from_secs(60), credentials.clone());
        idle.stop();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(credentials.token().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_keeps_session() {
        let credentials = signed_in();
        let idle = IdleTimeout::spawn(Duration::from_secs(u64::MAX), credentials.clone());

        tokio::time::sleep(Duration::from_secs(365 * 24 * 3600)).await;
        idle.touch();
        tokio::task::yield_now().await;

        assert!(credentials.token().is_some());
        assert!(idle.is_running());
    }
}
