//! Temporary action scheduling and reversal

mod helpers;

use beabot_common::config::{ReversalScope, SchedulerConfig};
use beabot_common::events::{ActionKind, BotEvent, EventBus};
use beabot_common::{SubjectId, WorkspaceId};
use beabot_core::moderation::{ActionScheduler, ModerationService, ReconcileReport};
use beabot_core::PlatformError;
use chrono::{Duration as ChronoDuration, Utc};
use helpers::{drain_events, Call, FakePlatform, USER};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn scheduler_with(platform: &FakePlatform, config: SchedulerConfig) -> (Arc<ActionScheduler>, EventBus) {
    let events = EventBus::new(100);
    let scheduler = Arc::new(ActionScheduler::new(
        Arc::new(platform.clone()),
        events.clone(),
        &config,
    ));
    (scheduler, events)
}

fn scheduler(platform: &FakePlatform) -> (Arc<ActionScheduler>, EventBus) {
    scheduler_with(platform, SchedulerConfig::default())
}

fn seconds_ago(secs: i64) -> chrono::DateTime<Utc> {
    Utc::now() - ChronoDuration::seconds(secs)
}

#[tokio::test]
async fn test_expired_ban_is_reversed_everywhere() {
    let platform = FakePlatform::with_workspaces(&[1, 2, 3]);
    let (scheduler, _events) = scheduler(&platform);
    scheduler.schedule(USER, WorkspaceId(1), ActionKind::Ban, seconds_ago(5));

    let report = scheduler.reconcile_once().await;

    assert_eq!(
        report,
        ReconcileReport {
            reversed: 1,
            retried: 0,
            abandoned: 0
        }
    );
    assert_eq!(
        platform.unbans(),
        vec![
            (USER, WorkspaceId(1)),
            (USER, WorkspaceId(2)),
            (USER, WorkspaceId(3)),
        ]
    );
    assert!(scheduler.is_empty());
}

#[tokio::test]
async fn test_unexpired_action_is_untouched() {
    let platform = FakePlatform::with_workspaces(&[1]);
    let (scheduler, _events) = scheduler(&platform);
    scheduler.schedule(USER, WorkspaceId(1), ActionKind::Ban, Utc::now() + ChronoDuration::hours(1));

    assert_eq!(scheduler.reconcile_once().await, ReconcileReport::default());
    assert!(platform.unbans().is_empty());
    assert_eq!(scheduler.len(), 1);
}

#[tokio::test]
async fn test_zero_duration_temp_ban_unbans_exactly_once() {
    let platform = FakePlatform::with_workspaces(&[1, 2]);
    let (scheduler, events) = scheduler(&platform);
    let service = ModerationService::new(Arc::new(platform.clone()), scheduler.clone(), events);

    let pending = service
        .temp_ban(WorkspaceId(1), USER, Duration::ZERO, Some("spam"))
        .await
        .unwrap();
    assert_eq!(pending.kind, ActionKind::Ban);
    assert_eq!(platform.count(|c| matches!(c, Call::Ban(..))), 1);
    assert_eq!(
        platform.count(|c| matches!(c, Call::Send(_, title) if title == "Temporary Ban")),
        1
    );

    scheduler.reconcile_once().await;
    assert_eq!(platform.unbans().len(), 2);

    scheduler.reconcile_once().await;
    assert_eq!(platform.unbans().len(), 2);
    assert!(scheduler.is_empty());
}

#[tokio::test]
async fn test_not_found_everywhere_clears_entry() {
    let platform = FakePlatform::with_workspaces(&[1, 2]);
    platform.set_unban_error(1, PlatformError::NotFound("ban".into()));
    platform.set_unban_error(2, PlatformError::NotFound("ban".into()));
    let (scheduler, events) = scheduler(&platform);
    let mut rx = events.subscribe();
    scheduler.schedule(USER, WorkspaceId(1), ActionKind::Ban, seconds_ago(1));

    let report = scheduler.reconcile_once().await;

    assert_eq!(report.reversed, 1);
    assert!(scheduler.is_empty());
    let reversed: Vec<Vec<WorkspaceId>> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            BotEvent::ActionReversed { workspaces, .. } => Some(workspaces),
            _ => None,
        })
        .collect();
    assert_eq!(reversed, vec![Vec::<WorkspaceId>::new()]);
}

#[tokio::test]
async fn test_partial_success_clears_entry() {
    let platform = FakePlatform::with_workspaces(&[1, 2]);
    platform.set_unban_error(2, PlatformError::Forbidden("missing permission".into()));
    let (scheduler, _events) = scheduler(&platform);
    scheduler.schedule(USER, WorkspaceId(1), ActionKind::Ban, seconds_ago(1));

    let report = scheduler.reconcile_once().await;

    assert_eq!(report.reversed, 1);
    assert!(scheduler.is_empty());
}

#[tokio::test]
async fn test_not_found_plus_forbidden_clears_entry() {
    let platform = FakePlatform::with_workspaces(&[1, 2]);
    platform.set_unban_error(1, PlatformError::NotFound("ban".into()));
    platform.set_unban_error(2, PlatformError::Forbidden("missing permission".into()));
    let (scheduler, _events) = scheduler(&platform);
    scheduler.schedule(USER, WorkspaceId(1), ActionKind::Ban, seconds_ago(1));

    let report = scheduler.reconcile_once().await;

    assert_eq!(
        report,
        ReconcileReport {
            reversed: 1,
            retried: 0,
            abandoned: 0
        }
    );
    assert!(scheduler.is_empty());

    // Nothing left to retry
    scheduler.reconcile_once().await;
    assert_eq!(platform.unbans().len(), 2);
}

#[tokio::test]
async fn test_hard_failures_retry_then_abandon() {
    let platform = FakePlatform::with_workspaces(&[1, 2]);
    platform.set_unban_error(1, PlatformError::Forbidden("missing permission".into()));
    platform.set_unban_error(2, PlatformError::Transport("timeout".into()));
    let (scheduler, events) = scheduler_with(
        &platform,
        SchedulerConfig {
            max_attempts: 2,
            ..SchedulerConfig::default()
        },
    );
    let mut rx = events.subscribe();
    scheduler.schedule(USER, WorkspaceId(1), ActionKind::Ban, seconds_ago(1));

    let report = scheduler.reconcile_once().await;
    assert_eq!(report.retried, 1);
    let pending = scheduler.get(USER).unwrap();
    assert_eq!(pending.attempts, 1);
    assert!(pending.last_error.is_some());

    let report = scheduler.reconcile_once().await;
    assert_eq!(report.abandoned, 1);
    assert!(scheduler.is_empty());
    assert_eq!(platform.unbans().len(), 4);

    let abandoned: Vec<u32> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            BotEvent::ActionAbandoned { attempts, .. } => Some(attempts),
            _ => None,
        })
        .collect();
    assert_eq!(abandoned, vec![2]);
}

#[tokio::test]
async fn test_failure_then_recovery_reverses() {
    let platform = FakePlatform::with_workspaces(&[1]);
    platform.set_unban_error(1, PlatformError::Transport("connection reset".into()));
    let (scheduler, _events) = scheduler(&platform);
    scheduler.schedule(USER, WorkspaceId(1), ActionKind::Ban, seconds_ago(1));

    assert_eq!(scheduler.reconcile_once().await.retried, 1);

    platform.clear_unban_errors();
    assert_eq!(scheduler.reconcile_once().await.reversed, 1);
    assert!(scheduler.is_empty());
}

#[tokio::test]
async fn test_workspace_listing_failure_is_retried() {
    let platform = FakePlatform::with_workspaces(&[1]);
    platform.set_fail_workspaces(true);
    let (scheduler, _events) = scheduler(&platform);
    scheduler.schedule(USER, WorkspaceId(1), ActionKind::Ban, seconds_ago(1));

    assert_eq!(scheduler.reconcile_once().await.retried, 1);
    assert!(platform.unbans().is_empty());

    platform.set_fail_workspaces(false);
    assert_eq!(scheduler.reconcile_once().await.reversed, 1);
}

#[tokio::test]
async fn test_reschedule_replaces_pending_action() {
    let platform = FakePlatform::with_workspaces(&[1]);
    let (scheduler, events) = scheduler(&platform);
    let mut rx = events.subscribe();

    let first = scheduler.schedule(USER, WorkspaceId(1), ActionKind::Ban, seconds_ago(1));
    let later = Utc::now() + ChronoDuration::hours(2);
    let second = scheduler.schedule(USER, WorkspaceId(2), ActionKind::Ban, later);

    assert_ne!(first.action_id, second.action_id);
    assert_eq!(scheduler.len(), 1);
    let pending = scheduler.get(USER).unwrap();
    assert_eq!(pending.expires_at, later);
    assert_eq!(pending.workspace, WorkspaceId(2));

    // The replaced entry never fires
    assert_eq!(scheduler.reconcile_once().await, ReconcileReport::default());

    let replaced: Vec<bool> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            BotEvent::ActionScheduled { replaced, .. } => Some(replaced),
            _ => None,
        })
        .collect();
    assert_eq!(replaced, vec![false, true]);
}

#[tokio::test]
async fn test_kick_reversal_makes_no_platform_call() {
    let platform = FakePlatform::with_workspaces(&[1, 2]);
    let (scheduler, _events) = scheduler(&platform);
    scheduler.schedule(USER, WorkspaceId(1), ActionKind::Kick, seconds_ago(1));

    assert_eq!(scheduler.reconcile_once().await.reversed, 1);
    assert!(platform.calls().is_empty());
    assert!(scheduler.is_empty());
}

#[tokio::test]
async fn test_origin_scope_unbans_origin_only() {
    let platform = FakePlatform::with_workspaces(&[1, 2, 3]);
    let (scheduler, _events) = scheduler_with(
        &platform,
        SchedulerConfig {
            reversal_scope: ReversalScope::OriginWorkspace,
            ..SchedulerConfig::default()
        },
    );
    scheduler.schedule(USER, WorkspaceId(2), ActionKind::Ban, seconds_ago(1));

    scheduler.reconcile_once().await;
    assert_eq!(platform.unbans(), vec![(USER, WorkspaceId(2))]);
}

#[tokio::test]
async fn test_cancel_drops_pending_action() {
    let platform = FakePlatform::with_workspaces(&[1]);
    let (scheduler, _events) = scheduler(&platform);
    scheduler.schedule(USER, WorkspaceId(1), ActionKind::Ban, seconds_ago(1));
    scheduler.schedule(SubjectId(2), WorkspaceId(1), ActionKind::Ban, seconds_ago(1));

    assert!(scheduler.cancel(USER).is_some());
    assert!(scheduler.cancel(USER).is_none());

    scheduler.reconcile_once().await;
    assert_eq!(platform.unbans(), vec![(SubjectId(2), WorkspaceId(1))]);
}

#[tokio::test]
async fn test_pending_sorted_by_expiry() {
    let platform = FakePlatform::new();
    let (scheduler, _events) = scheduler(&platform);
    let now = Utc::now();
    scheduler.schedule(SubjectId(1), WorkspaceId(1), ActionKind::Ban, now + ChronoDuration::minutes(30));
    scheduler.schedule(SubjectId(2), WorkspaceId(1), ActionKind::Kick, now + ChronoDuration::minutes(5));

    let subjects: Vec<SubjectId> = scheduler.pending().iter().map(|a| a.subject).collect();
    assert_eq!(subjects, vec![SubjectId(2), SubjectId(1)]);
}

#[tokio::test(start_paused = true)]
async fn test_run_drains_in_flight_reversals_on_cancel() {
    let platform = FakePlatform::with_workspaces(&[1, 2]);
    platform.set_unban_delay(Duration::from_secs(5));
    let (scheduler, _events) = scheduler(&platform);
    scheduler.schedule(USER, WorkspaceId(1), ActionKind::Ban, seconds_ago(1));

    let cancel = CancellationToken::new();
    let task = tokio::spawn(scheduler.clone().run(cancel.clone()));

    // First tick fires immediately; the reversal is now waiting on the platform
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(platform.unbans().is_empty());

    cancel.cancel();
    task.await.unwrap();

    assert_eq!(platform.unbans().len(), 2);
    assert!(scheduler.is_empty());
}
