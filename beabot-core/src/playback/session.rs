//! Per-workspace playback session
//!
//! Each session runs as its own task that owns the queue, history, repeat
//! mode, active track and voice connection. Callers talk to it through a
//! cloneable [`SessionHandle`]; commands are processed one at a time, which
//! serializes every mutation of a session without holding a lock across the
//! platform calls it makes. Sessions for different workspaces are separate
//! tasks and never wait on each other.
//!
//! State machine:
//!
//! ```text
//! Idle --connect--> Stopped --enqueue--> Playing <--pause/resume--> Paused
//!                      ^                    |
//!                      +----(queue empty)---+-- advance (repeat policy)
//! ```

use super::queue::{History, TrackQueue, DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_QUEUE_LENGTH};
use super::track::Track;
use crate::error::{Error, PlatformError, Result, ValidationError};
use crate::platform::{Platform, VoiceConnection};
use beabot_common::events::{BotEvent, EventBus, RepeatMode, SessionState};
use beabot_common::{ChannelId, WorkspaceId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pending commands buffered per session
const COMMAND_BUFFER: usize = 64;

/// Session limits
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub max_queue_length: usize,
    pub history_limit: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_queue_length: DEFAULT_MAX_QUEUE_LENGTH,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Cheap view of a session used by the idle reaper
#[derive(Debug, Clone, Copy)]
pub struct SessionStatus {
    pub state: SessionState,
    pub last_activity: Instant,
    /// Entries waiting in the queue
    pub queued: usize,
    /// Set once the session task accepted a close request
    pub closed: bool,
}

impl SessionStatus {
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Full copy of a session's observable state
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub workspace: WorkspaceId,
    pub state: SessionState,
    pub repeat: RepeatMode,
    pub active: Option<Track>,
    pub queue: Vec<Track>,
    pub history: Vec<Track>,
    pub capacity: usize,
}

/// Why the active track is leaving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvanceReason {
    Completed,
    Skipped,
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Join { channel: ChannelId, reply: Reply<()> },
    Enqueue { track: Track, channel: ChannelId, reply: Reply<usize> },
    Skip { reply: Reply<()> },
    SkipTo { index: usize, reply: Reply<()> },
    Pause { reply: Reply<bool> },
    Resume { reply: Reply<bool> },
    Stop { reply: Reply<()> },
    SetRepeat { mode: RepeatMode, reply: Reply<()> },
    TrackFinished { track_id: Uuid, reply: Reply<bool> },
    ConnectionLost { reason: String, reply: Reply<()> },
    Snapshot { reply: Reply<SessionSnapshot> },
    ReleaseIfIdle { threshold: Duration, reply: Reply<bool> },
    CloseIfIdle { reply: Reply<()> },
}

/// Handle to a running playback session
#[derive(Clone)]
pub struct SessionHandle {
    workspace: WorkspaceId,
    session_id: Uuid,
    tx: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("workspace", &self.workspace)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl SessionHandle {
    /// Start a new session task for `workspace`
    pub fn spawn(
        workspace: WorkspaceId,
        platform: Arc<dyn Platform>,
        events: EventBus,
        settings: SessionSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(SessionStatus {
            state: SessionState::Idle,
            last_activity: Instant::now(),
            queued: 0,
            closed: false,
        });

        let session = PlaybackSession {
            workspace,
            platform,
            events,
            state: SessionState::Idle,
            queue: TrackQueue::new(settings.max_queue_length),
            history: History::new(settings.history_limit),
            repeat: RepeatMode::Off,
            active: None,
            voice: None,
            last_activity: Instant::now(),
            status_tx,
            last_refusal: None,
            closed: false,
        };
        tokio::spawn(session.run(rx));

        debug!("Spawned playback session for workspace {}", workspace);
        Self {
            workspace,
            session_id: Uuid::new_v4(),
            tx,
            status: status_rx,
        }
    }

    pub fn workspace(&self) -> WorkspaceId {
        self.workspace
    }

    /// Identity of this session instance (a replacement session gets a new id)
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Latest published state, without waiting on the session task
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// True once the session task stopped accepting commands
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed() || self.status.borrow().closed
    }

    /// Connect to `channel` if not already connected
    pub async fn join(&self, channel: ChannelId) -> Result<()> {
        self.request(|reply| Command::Join { channel, reply }).await
    }

    /// Append `track`, connecting to `channel` first when idle
    ///
    /// Returns the 1-based queue position, or 0 when the track started
    /// playing immediately. Fails with [`Error::TrackRefused`] when the track
    /// was due to start and the platform would not play it.
    pub async fn enqueue(&self, track: Track, channel: ChannelId) -> Result<usize> {
        self.request(|reply| Command::Enqueue { track, channel, reply })
            .await
    }

    pub async fn skip(&self) -> Result<()> {
        self.request(|reply| Command::Skip { reply }).await
    }

    /// Drop the first `index` queue entries and play entry `index`
    pub async fn skip_to(&self, index: usize) -> Result<()> {
        self.request(|reply| Command::SkipTo { index, reply }).await
    }

    /// Returns false when nothing was playing
    pub async fn pause(&self) -> Result<bool> {
        self.request(|reply| Command::Pause { reply }).await
    }

    /// Returns false when nothing was paused
    pub async fn resume(&self) -> Result<bool> {
        self.request(|reply| Command::Resume { reply }).await
    }

    /// Clear the queue, release the voice connection and go idle
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn set_repeat(&self, mode: RepeatMode) -> Result<()> {
        self.request(|reply| Command::SetRepeat { mode, reply }).await
    }

    /// Platform notification: the stream for `track_id` reached its end
    ///
    /// Returns false for stale notifications (track no longer active).
    pub async fn track_finished(&self, track_id: Uuid) -> Result<bool> {
        self.request(|reply| Command::TrackFinished { track_id, reply })
            .await
    }

    /// Platform notification: the voice connection dropped
    pub async fn connection_lost(&self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.request(|reply| Command::ConnectionLost { reason, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Disconnect if connected, stopped and inactive for at least `threshold`
    ///
    /// Returns true when the connection was released.
    pub async fn release_if_idle(&self, threshold: Duration) -> Result<bool> {
        self.request(|reply| Command::ReleaseIfIdle { threshold, reply })
            .await
    }

    /// Terminate the session task if it is idle
    pub(crate) async fn close_if_idle(&self) -> Result<()> {
        self.request(|reply| Command::CloseIfIdle { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        reply_rx.await.map_err(|_| Error::SessionClosed)?
    }
}

/// Session state owned by the session task
struct PlaybackSession {
    workspace: WorkspaceId,
    platform: Arc<dyn Platform>,
    events: EventBus,
    state: SessionState,
    queue: TrackQueue,
    history: History,
    repeat: RepeatMode,
    active: Option<Track>,
    voice: Option<Box<dyn VoiceConnection>>,
    last_activity: Instant,
    status_tx: watch::Sender<SessionStatus>,
    /// Most recent track the platform refused to play
    last_refusal: Option<(Uuid, PlatformError)>,
    closed: bool,
}

impl PlaybackSession {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
            if self.closed {
                break;
            }
        }
        rx.close();

        // All handles dropped while still connected
        if let Some(mut voice) = self.voice.take() {
            if let Err(e) = voice.disconnect().await {
                warn!(
                    "Workspace {}: failed to disconnect voice on session exit: {}",
                    self.workspace, e
                );
            }
        }
        debug!("Playback session for workspace {} exited", self.workspace);
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Join { channel, reply } => {
                let _ = reply.send(self.join(channel).await);
            }
            Command::Enqueue { track, channel, reply } => {
                let _ = reply.send(self.enqueue(track, channel).await);
            }
            Command::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            Command::SkipTo { index, reply } => {
                let _ = reply.send(self.skip_to(index).await);
            }
            Command::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            Command::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            Command::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(Ok(()));
            }
            Command::SetRepeat { mode, reply } => {
                debug!("Workspace {}: repeat mode {} -> {}", self.workspace, self.repeat, mode);
                self.repeat = mode;
                let _ = reply.send(Ok(()));
            }
            Command::TrackFinished { track_id, reply } => {
                let _ = reply.send(Ok(self.track_finished(track_id).await));
            }
            Command::ConnectionLost { reason, reply } => {
                self.connection_lost(&reason);
                let _ = reply.send(Ok(()));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            Command::ReleaseIfIdle { threshold, reply } => {
                let _ = reply.send(self.release_if_idle(threshold).await);
            }
            Command::CloseIfIdle { reply } => {
                let _ = reply.send(self.close_if_idle());
            }
        }
    }

    async fn ensure_connected(&mut self, channel: ChannelId) -> Result<()> {
        if self.voice.is_some() {
            return Ok(());
        }

        let voice = self.platform.connect_voice(self.workspace, channel).await?;
        info!("Workspace {}: connected to voice channel {}", self.workspace, channel);
        self.voice = Some(voice);
        self.set_state(SessionState::Stopped);
        Ok(())
    }

    /// Connect, then resume a queue kept across a dropped connection
    async fn join(&mut self, channel: ChannelId) -> Result<()> {
        self.ensure_connected(channel).await?;
        if self.state == SessionState::Stopped && !self.queue.is_empty() {
            self.start_next(None).await;
        }
        Ok(())
    }

    async fn enqueue(&mut self, track: Track, channel: ChannelId) -> Result<usize> {
        // Capacity first so a full queue never triggers a connect
        if self.queue.is_full() {
            return Err(ValidationError::QueueFull {
                capacity: self.queue.capacity(),
            }
            .into());
        }

        self.ensure_connected(channel).await?;

        let track_id = track.id;
        let title = track.title.clone();
        let position = self.queue.push_back(track)?;
        debug!(
            "Workspace {}: enqueued '{}' at position {}",
            self.workspace, title, position
        );
        self.emit_queue_changed();

        if self.state == SessionState::Stopped {
            self.last_refusal = None;
            self.start_next(None).await;
            if self.active.as_ref().map(|t| t.id) == Some(track_id) {
                return Ok(0);
            }
            if let Some((id, reason)) = self.last_refusal.take() {
                if id == track_id {
                    return Err(Error::TrackRefused { title, reason });
                }
            }
        }
        self.touch();
        Ok(self.queue.iter().position(|t| t.id == track_id).map_or(0, |p| p + 1))
    }

    async fn skip(&mut self) -> Result<()> {
        if self.voice.is_none() {
            return Err(ValidationError::NotConnected.into());
        }
        if self.active.is_none() && self.queue.is_empty() {
            return Err(ValidationError::EmptyQueue.into());
        }
        self.advance(AdvanceReason::Skipped).await;
        Ok(())
    }

    async fn skip_to(&mut self, index: usize) -> Result<()> {
        if index >= self.queue.len() {
            return Err(ValidationError::IndexOutOfRange {
                index,
                len: self.queue.len(),
            }
            .into());
        }
        if self.voice.is_none() {
            return Err(ValidationError::NotConnected.into());
        }

        let dropped = self.queue.discard_before(index)?;
        debug!("Workspace {}: skip_to dropped {} entries", self.workspace, dropped);
        self.advance(AdvanceReason::Skipped).await;
        Ok(())
    }

    async fn pause(&mut self) -> Result<bool> {
        if self.state != SessionState::Playing {
            return Ok(false);
        }
        if let Some(voice) = self.voice.as_mut() {
            voice.pause().await?;
        }
        self.set_state(SessionState::Paused);
        Ok(true)
    }

    async fn resume(&mut self) -> Result<bool> {
        if self.state != SessionState::Paused {
            return Ok(false);
        }
        if let Some(voice) = self.voice.as_mut() {
            voice.resume().await?;
        }
        self.set_state(SessionState::Playing);
        Ok(true)
    }

    async fn stop(&mut self) {
        if self.state == SessionState::Idle
            && self.voice.is_none()
            && self.active.is_none()
            && self.queue.is_empty()
        {
            return;
        }

        let had_queue = !self.queue.is_empty();
        self.queue.clear();
        self.active = None;

        if let Some(mut voice) = self.voice.take() {
            if let Err(e) = voice.stop().await {
                debug!("Workspace {}: stop stream failed: {}", self.workspace, e);
            }
            if let Err(e) = voice.disconnect().await {
                warn!("Workspace {}: voice disconnect failed: {}", self.workspace, e);
            }
        }

        info!("Workspace {}: playback stopped", self.workspace);
        if had_queue {
            self.emit_queue_changed();
        }
        self.set_state(SessionState::Idle);
    }

    async fn track_finished(&mut self, track_id: Uuid) -> bool {
        match self.active {
            Some(ref active) if active.id == track_id => {
                self.advance(AdvanceReason::Completed).await;
                true
            }
            _ => {
                debug!(
                    "Workspace {}: ignoring stale finish notification for {}",
                    self.workspace, track_id
                );
                false
            }
        }
    }

    fn connection_lost(&mut self, reason: &str) {
        if self.voice.is_none() {
            return;
        }
        warn!("Workspace {}: voice connection lost: {}", self.workspace, reason);

        self.voice = None;
        if let Some(track) = self.active.take() {
            self.history.push(track);
        }
        self.set_state(SessionState::Idle);
    }

    async fn release_if_idle(&mut self, threshold: Duration) -> Result<bool> {
        let eligible = self.state == SessionState::Stopped
            && self.active.is_none()
            && self.last_activity.elapsed() >= threshold;
        if !eligible {
            return Ok(false);
        }

        if let Some(voice) = self.voice.as_mut() {
            // Keep the handle on failure so the next tick retries
            voice.disconnect().await?;
        }
        self.voice = None;
        info!(
            "Workspace {}: released idle voice connection after {:?}",
            self.workspace,
            self.last_activity.elapsed()
        );
        self.set_state(SessionState::Idle);
        Ok(true)
    }

    /// A queue kept across a dropped connection holds the session open
    fn close_if_idle(&mut self) -> Result<()> {
        if self.state != SessionState::Idle || self.voice.is_some() || !self.queue.is_empty() {
            return Err(ValidationError::SessionActive.into());
        }
        self.closed = true;
        self.publish_status();
        Ok(())
    }

    /// Apply the repeat policy to the active track and move on
    async fn advance(&mut self, reason: AdvanceReason) {
        let mut replay = None;

        if let Some(finished) = self.active.take() {
            self.events.emit_lossy(BotEvent::TrackFinished {
                workspace: self.workspace,
                track_id: finished.id,
                title: finished.title.clone(),
                completed: reason == AdvanceReason::Completed,
                timestamp: chrono::Utc::now(),
            });

            match (self.repeat, reason) {
                // Repeat-one pins the track across natural completion only;
                // an explicit skip moves past it
                (RepeatMode::One, AdvanceReason::Completed) => {
                    replay = Some(finished.requeued());
                }
                (RepeatMode::All, _) => {
                    if let Err(e) = self.queue.push_back(finished.requeued()) {
                        warn!(
                            "Workspace {}: cannot cycle '{}' to the tail: {}",
                            self.workspace, finished.title, e
                        );
                        self.history.push(finished);
                    }
                }
                _ => self.history.push(finished),
            }
        }

        let started = self.start_next(replay).await;
        if !started && reason == AdvanceReason::Skipped {
            if let Some(voice) = self.voice.as_mut() {
                if let Err(e) = voice.stop().await {
                    debug!("Workspace {}: stop stream failed: {}", self.workspace, e);
                }
            }
        }
    }

    /// Play `first` if given, otherwise the queue head
    ///
    /// Tracks the platform refuses are moved to history and skipped. Returns
    /// true when a track is now playing.
    async fn start_next(&mut self, mut first: Option<Track>) -> bool {
        let had_queue = !self.queue.is_empty();

        loop {
            let Some(track) = first.take().or_else(|| self.queue.pop_front()) else {
                self.active = None;
                if had_queue {
                    self.emit_queue_changed();
                }
                if self.voice.is_some() {
                    self.set_state(SessionState::Stopped);
                } else {
                    self.set_state(SessionState::Idle);
                }
                return false;
            };

            let Some(voice) = self.voice.as_mut() else {
                // Not connected: keep the track for the next connect
                if let Err(e) = self.queue.push_front(track) {
                    warn!("Workspace {}: dropped track while idle: {}", self.workspace, e);
                }
                self.set_state(SessionState::Idle);
                return false;
            };

            match voice.play(&track).await {
                Ok(()) => {
                    info!("Workspace {}: now playing '{}'", self.workspace, track.title);
                    self.events.emit_lossy(BotEvent::TrackStarted {
                        workspace: self.workspace,
                        track_id: track.id,
                        title: track.title.clone(),
                        timestamp: chrono::Utc::now(),
                    });
                    self.active = Some(track);
                    if had_queue {
                        self.emit_queue_changed();
                    }
                    self.set_state(SessionState::Playing);
                    return true;
                }
                Err(PlatformError::ConnectionLost(reason)) => {
                    if let Err(e) = self.queue.push_front(track) {
                        warn!("Workspace {}: dropped track on disconnect: {}", self.workspace, e);
                    }
                    self.connection_lost(&reason);
                    return false;
                }
                Err(e) => {
                    warn!(
                        "Workspace {}: platform refused '{}': {}",
                        self.workspace, track.title, e
                    );
                    self.events.emit_lossy(BotEvent::TrackFailed {
                        workspace: self.workspace,
                        track_id: track.id,
                        title: track.title.clone(),
                        reason: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    self.last_refusal = Some((track.id, e));
                    self.history.push(track);
                }
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            workspace: self.workspace,
            state: self.state,
            repeat: self.repeat,
            active: self.active.clone(),
            queue: self.queue.to_vec(),
            history: self.history.to_vec(),
            capacity: self.queue.capacity(),
        }
    }

    /// Every transition counts as activity
    fn set_state(&mut self, new_state: SessionState) {
        let old_state = self.state;
        self.state = new_state;
        if old_state != new_state {
            debug!("Workspace {}: {} -> {}", self.workspace, old_state, new_state);
            self.events.emit_lossy(BotEvent::PlaybackStateChanged {
                workspace: self.workspace,
                old_state,
                new_state,
                timestamp: chrono::Utc::now(),
            });
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(SessionStatus {
            state: self.state,
            last_activity: self.last_activity,
            queued: self.queue.len(),
            closed: self.closed,
        });
    }

    fn emit_queue_changed(&self) {
        self.events.emit_lossy(BotEvent::QueueChanged {
            workspace: self.workspace,
            length: self.queue.len(),
            timestamp: chrono::Utc::now(),
        });
    }
}
