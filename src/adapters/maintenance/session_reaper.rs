//! SessionReaper - Background service that physically removes old sessions.
//!
//! Session expiry is logical: an idle session is reset on its next load and
//! keeps its provisioning ledger. The reaper only deletes rows idle for much
//! longer than the conversation TTL, after which payment redeliveries are
//! no longer expected.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 1h | How often to purge |
//! | `retention_days` | 30 | Idle days before a session is deleted |
//!
//! ## Graceful Shutdown
//!
//! The service listens on a watch channel and stops after the current pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::SessionRepository;

/// Configuration for the SessionReaper service.
#[derive(Debug, Clone)]
pub struct SessionReaperConfig {
    pub interval: Duration,
    pub retention_days: u32,
}

impl Default for SessionReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            retention_days: 30,
        }
    }
}

impl SessionReaperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }
}

/// Periodically purges sessions idle beyond the retention window.
pub struct SessionReaper {
    sessions: Arc<dyn SessionRepository>,
    config: SessionReaperConfig,
}

impl SessionReaper {
    pub fn new(sessions: Arc<dyn SessionRepository>, config: SessionReaperConfig) -> Self {
        Self { sessions, config }
    }

    /// Runs until the shutdown signal is set to `true`.
    ///
    /// Purge failures are logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Session reaper stopped");
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.purge_once().await {
                        tracing::warn!(error = %e, "Session purge failed");
                    }
                }
            }
        }
    }

    /// Runs one purge pass and returns the number of deleted sessions.
    pub async fn purge_once(&self) -> Result<u64, DomainError> {
        let cutoff = Timestamp::now().minus_days(i64::from(self.config.retention_days));
        let purged = self.sessions.purge_idle_before(cutoff).await?;
        if purged > 0 {
            tracing::info!(
                purged,
                retention_days = self.config.retention_days,
                "Purged idle sessions"
            );
        }
        Ok(purged)
    }
}
