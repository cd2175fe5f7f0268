//! Idle reaper
//!
//! Periodically releases voice connections that sat in `Stopped` longer than
//! the idle threshold and evicts the session. Sessions left `Idle` with an
//! empty queue are evicted after the same window. Playing and paused
//! sessions are never touched, nor is an idle session still holding a queue.

use crate::error::Error;
use crate::registry::SessionRegistry;
use beabot_common::events::SessionState;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one reaper pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapReport {
    /// Voice connections released
    pub released: usize,
    /// Sessions removed from the registry
    pub evicted: usize,
    /// Sessions whose release failed and will be retried
    pub failed: usize,
}

pub struct IdleReaper {
    registry: Arc<SessionRegistry>,
    interval: Duration,
    idle_threshold: Duration,
}

impl IdleReaper {
    pub fn new(registry: Arc<SessionRegistry>, interval: Duration, idle_threshold: Duration) -> Self {
        Self {
            registry,
            interval,
            idle_threshold,
        }
    }

    /// Run until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Idle reaper started (interval {:?}, threshold {:?})",
            self.interval, self.idle_threshold
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if report != ReapReport::default() {
                        debug!("Reaper pass: {:?}", report);
                    }
                }
            }
        }
        info!("Idle reaper stopped");
    }

    /// Single pass over every registered session
    pub async fn tick(&self) -> ReapReport {
        let mut report = ReapReport::default();

        for handle in self.registry.sessions() {
            let workspace = handle.workspace();
            let status = handle.status();

            if status.closed {
                self.evict(workspace, &mut report).await;
                continue;
            }
            if status.idle_for() < self.idle_threshold {
                continue;
            }

            match status.state {
                SessionState::Stopped => match handle.release_if_idle(self.idle_threshold).await {
                    Ok(true) => {
                        report.released += 1;
                        self.evict(workspace, &mut report).await;
                    }
                    // Activity since the status snapshot
                    Ok(false) => {}
                    Err(Error::SessionClosed) => self.evict(workspace, &mut report).await,
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            "Workspace {}: failed to release idle voice connection, retrying next pass: {}",
                            workspace, e
                        );
                    }
                },
                // Queue kept across a dropped connection waits for the next join
                SessionState::Idle if status.queued > 0 => {}
                SessionState::Idle => self.evict(workspace, &mut report).await,
                SessionState::Playing | SessionState::Paused => {}
            }
        }

        report
    }

    async fn evict(&self, workspace: beabot_common::WorkspaceId, report: &mut ReapReport) {
        match self.registry.remove(workspace).await {
            Ok(()) => report.evicted += 1,
            Err(e) => debug!("Workspace {}: not evicted: {}", workspace, e),
        }
    }
}
