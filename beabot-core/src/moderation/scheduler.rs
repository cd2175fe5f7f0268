//! Temporal action scheduler
//!
//! Tracks temporary bans and kicks until they expire, then reverses them.
//! At most one pending action exists per subject; scheduling again replaces
//! the earlier entry (last scheduled wins).
//!
//! Reconciliation runs on a fixed interval. Each expired entry is reversed in
//! its own task so one slow platform call never holds up the others or the
//! next tick. Outcomes per entry:
//! - success in at least one workspace, or not-found everywhere: cleared
//! - only hard failures: kept and retried on the next tick
//! - `max_attempts` consecutive failures: abandoned

use crate::error::PlatformError;
use crate::platform::Platform;
use beabot_common::config::{ReversalScope, SchedulerConfig};
use beabot_common::events::{ActionKind, BotEvent, EventBus};
use beabot_common::{SubjectId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A temporary action waiting for its reversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAction {
    /// Distinguishes a replaced entry from its successor
    pub action_id: Uuid,
    pub subject: SubjectId,
    /// Workspace the action was applied in
    pub workspace: WorkspaceId,
    pub kind: ActionKind,
    pub expires_at: DateTime<Utc>,
    /// Failed reversal attempts so far
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PendingAction {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of one reversal attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReversalOutcome {
    /// Entry cleared; workspaces where the reversal took effect
    Reversed(Vec<WorkspaceId>),
    /// Kept for the next tick
    Retry(String),
    /// Dropped after too many failures
    Abandoned(String),
    /// Entry was replaced or cancelled while the reversal ran
    Superseded,
}

/// Totals for one reconciliation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub reversed: usize,
    pub retried: usize,
    pub abandoned: usize,
}

impl ReconcileReport {
    fn record(&mut self, outcome: &ReversalOutcome) {
        match outcome {
            ReversalOutcome::Reversed(_) => self.reversed += 1,
            ReversalOutcome::Retry(_) => self.retried += 1,
            ReversalOutcome::Abandoned(_) => self.abandoned += 1,
            ReversalOutcome::Superseded => {}
        }
    }
}

#[derive(Default)]
struct Store {
    pending: HashMap<SubjectId, PendingAction>,
    /// Action ids with a reversal currently running
    in_flight: HashSet<Uuid>,
}

pub struct ActionScheduler {
    store: Mutex<Store>,
    platform: Arc<dyn Platform>,
    events: EventBus,
    interval: Duration,
    max_attempts: u32,
    scope: ReversalScope,
}

impl ActionScheduler {
    pub fn new(platform: Arc<dyn Platform>, events: EventBus, config: &SchedulerConfig) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            platform,
            events,
            interval: config.interval(),
            max_attempts: config.max_attempts.max(1),
            scope: config.reversal_scope,
        }
    }

    /// Track a reversal of `kind` for `subject` at `expires_at`
    ///
    /// Replaces any pending action for the same subject. Returns the new entry.
    pub fn schedule(
        &self,
        subject: SubjectId,
        workspace: WorkspaceId,
        kind: ActionKind,
        expires_at: DateTime<Utc>,
    ) -> PendingAction {
        let action = PendingAction {
            action_id: Uuid::new_v4(),
            subject,
            workspace,
            kind,
            expires_at,
            attempts: 0,
            last_error: None,
        };

        let replaced = self.lock().pending.insert(subject, action.clone());
        if let Some(ref old) = replaced {
            info!(
                "Subject {}: pending {} (expiring {}) replaced by {} expiring {}",
                subject, old.kind, old.expires_at, kind, expires_at
            );
        } else {
            info!(
                "Subject {}: {} in workspace {} scheduled for reversal at {}",
                subject, kind, workspace, expires_at
            );
        }

        self.events.emit_lossy(BotEvent::ActionScheduled {
            workspace,
            subject,
            kind,
            expires_at,
            replaced: replaced.is_some(),
            timestamp: Utc::now(),
        });
        action
    }

    /// Drop the pending action for `subject` without reversing it
    pub fn cancel(&self, subject: SubjectId) -> Option<PendingAction> {
        let removed = self.lock().pending.remove(&subject);
        if removed.is_some() {
            info!("Subject {}: pending action cancelled", subject);
        }
        removed
    }

    /// All pending actions, soonest expiry first
    pub fn pending(&self) -> Vec<PendingAction> {
        let mut actions: Vec<PendingAction> = self.lock().pending.values().cloned().collect();
        actions.sort_by_key(|a| a.expires_at);
        actions
    }

    pub fn get(&self, subject: SubjectId) -> Option<PendingAction> {
        self.lock().pending.get(&subject).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// One reconciliation pass, waiting for every reversal it starts
    pub async fn reconcile_once(&self) -> ReconcileReport {
        let due = self.take_due(Utc::now());
        let outcomes = futures::future::join_all(due.iter().map(|a| self.reverse(a))).await;

        let mut report = ReconcileReport::default();
        for outcome in &outcomes {
            report.record(outcome);
        }
        report
    }

    /// Reconcile every interval until `cancel` fires, then drain in-flight reversals
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Action scheduler started (interval {:?}, max attempts {})",
            self.interval, self.max_attempts
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut reversals: JoinSet<ReversalOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    for action in self.take_due(Utc::now()) {
                        let scheduler = Arc::clone(&self);
                        reversals.spawn(async move { scheduler.reverse(&action).await });
                    }
                }
                Some(joined) = reversals.join_next(), if !reversals.is_empty() => {
                    if let Err(e) = joined {
                        error!("Reversal task failed: {}", e);
                    }
                }
            }
        }

        if !reversals.is_empty() {
            info!("Waiting for {} in-flight reversal(s)", reversals.len());
        }
        while let Some(joined) = reversals.join_next().await {
            if let Err(e) = joined {
                error!("Reversal task failed: {}", e);
            }
        }
        info!("Action scheduler stopped");
    }

    /// Expired entries without a running reversal, marked as in flight
    fn take_due(&self, now: DateTime<Utc>) -> Vec<PendingAction> {
        let mut store = self.lock();
        let due: Vec<PendingAction> = store
            .pending
            .values()
            .filter(|a| a.is_expired(now) && !store.in_flight.contains(&a.action_id))
            .cloned()
            .collect();
        for action in &due {
            store.in_flight.insert(action.action_id);
        }
        if !due.is_empty() {
            debug!("{} pending action(s) due", due.len());
        }
        due
    }

    /// Attempt the reversal of `action` and record the outcome
    async fn reverse(&self, action: &PendingAction) -> ReversalOutcome {
        let attempt = match action.kind {
            // A kick leaves nothing on the platform to undo
            ActionKind::Kick => Ok(Vec::new()),
            ActionKind::Ban => self.unban_everywhere(action).await,
        };
        self.finish(action, attempt)
    }

    async fn unban_everywhere(
        &self,
        action: &PendingAction,
    ) -> std::result::Result<Vec<WorkspaceId>, String> {
        let targets = match self.scope {
            ReversalScope::OriginWorkspace => vec![action.workspace],
            ReversalScope::AllWorkspaces => self
                .platform
                .workspaces()
                .await
                .map_err(|e| format!("cannot list workspaces: {}", e))?,
        };

        let mut reversed = Vec::new();
        let mut succeeded = false;
        let mut last_error: Option<PlatformError> = None;
        for workspace in targets {
            match self.platform.unban(action.subject, workspace).await {
                Ok(()) => {
                    info!("Subject {}: unbanned in workspace {}", action.subject, workspace);
                    reversed.push(workspace);
                    succeeded = true;
                }
                Err(e) if e.is_not_found() => {
                    succeeded = true;
                    debug!(
                        "Subject {}: nothing to unban in workspace {}",
                        action.subject, workspace
                    );
                }
                Err(e) => {
                    warn!(
                        "Subject {}: unban in workspace {} failed: {}",
                        action.subject, workspace, e
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !succeeded => Err(e.to_string()),
            _ => Ok(reversed),
        }
    }

    fn finish(
        &self,
        action: &PendingAction,
        attempt: std::result::Result<Vec<WorkspaceId>, String>,
    ) -> ReversalOutcome {
        let mut store = self.lock();
        store.in_flight.remove(&action.action_id);

        let current = match store.pending.get_mut(&action.subject) {
            Some(current) if current.action_id == action.action_id => current,
            _ => {
                debug!(
                    "Subject {}: action {} superseded during reversal",
                    action.subject, action.action_id
                );
                return ReversalOutcome::Superseded;
            }
        };

        match attempt {
            Ok(workspaces) => {
                store.pending.remove(&action.subject);
                drop(store);
                info!("Subject {}: {} reversed", action.subject, action.kind);
                self.events.emit_lossy(BotEvent::ActionReversed {
                    subject: action.subject,
                    kind: action.kind,
                    workspaces: workspaces.clone(),
                    timestamp: Utc::now(),
                });
                ReversalOutcome::Reversed(workspaces)
            }
            Err(reason) => {
                current.attempts += 1;
                current.last_error = Some(reason.clone());
                let attempts = current.attempts;

                if attempts < self.max_attempts {
                    warn!(
                        "Subject {}: reversal attempt {}/{} failed, retrying next tick: {}",
                        action.subject, attempts, self.max_attempts, reason
                    );
                    return ReversalOutcome::Retry(reason);
                }

                store.pending.remove(&action.subject);
                drop(store);
                error!(
                    "Subject {}: abandoning {} reversal after {} attempts: {}",
                    action.subject, action.kind, attempts, reason
                );
                self.events.emit_lossy(BotEvent::ActionAbandoned {
                    subject: action.subject,
                    kind: action.kind,
                    attempts,
                    last_error: reason.clone(),
                    timestamp: Utc::now(),
                });
                ReversalOutcome::Abandoned(reason)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
