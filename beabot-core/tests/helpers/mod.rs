//! Shared fixtures for beabot-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use beabot_common::events::{BotEvent, EventBus};
use beabot_common::{ChannelId, SubjectId, WorkspaceId};
use beabot_core::acquisition::{MediaResolver, ResolvedMedia};
use beabot_core::playback::Track;
use beabot_core::{
    Notice, Platform, PlatformError, PlatformResult, ResolutionError, SessionHandle, SessionRegistry,
    SessionSettings, VoiceConnection,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const CHANNEL: ChannelId = ChannelId(77);
pub const USER: SubjectId = SubjectId(1);

/// Platform call recorded by [`FakePlatform`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(WorkspaceId, ChannelId),
    Play(WorkspaceId, String),
    Pause(WorkspaceId),
    Resume(WorkspaceId),
    Stop(WorkspaceId),
    Disconnect(WorkspaceId),
    Send(WorkspaceId, String),
    Ban(SubjectId, WorkspaceId),
    Unban(SubjectId, WorkspaceId),
    Kick(SubjectId, WorkspaceId),
}

#[derive(Default)]
struct Behavior {
    workspaces: Vec<WorkspaceId>,
    unban_errors: HashMap<WorkspaceId, PlatformError>,
    refused_titles: HashSet<String>,
    unban_delay: Option<Duration>,
}

/// Recording in-memory platform
#[derive(Clone, Default)]
pub struct FakePlatform {
    calls: Arc<Mutex<Vec<Call>>>,
    behavior: Arc<Mutex<Behavior>>,
    fail_connect: Arc<AtomicBool>,
    fail_disconnect: Arc<AtomicBool>,
    fail_workspaces: Arc<AtomicBool>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspaces(workspaces: &[u64]) -> Self {
        let platform = Self::new();
        platform.behavior.lock().unwrap().workspaces = workspaces.iter().map(|&w| WorkspaceId(w)).collect();
        platform
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    /// Titles played in `workspace`, in order
    pub fn plays(&self, workspace: WorkspaceId) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Play(ws, title) if *ws == workspace => Some(title.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn unbans(&self) -> Vec<(SubjectId, WorkspaceId)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Unban(s, w) => Some((*s, *w)),
                _ => None,
            })
            .collect()
    }

    pub fn set_unban_error(&self, workspace: u64, error: PlatformError) {
        self.behavior
            .lock()
            .unwrap()
            .unban_errors
            .insert(WorkspaceId(workspace), error);
    }

    pub fn clear_unban_errors(&self) {
        self.behavior.lock().unwrap().unban_errors.clear();
    }

    pub fn set_unban_delay(&self, delay: Duration) {
        self.behavior.lock().unwrap().unban_delay = Some(delay);
    }

    pub fn refuse_play(&self, title: &str) {
        self.behavior
            .lock()
            .unwrap()
            .refused_titles
            .insert(title.to_string());
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_workspaces(&self, fail: bool) {
        self.fail_workspaces.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn connect_voice(
        &self,
        workspace: WorkspaceId,
        channel: ChannelId,
    ) -> PlatformResult<Box<dyn VoiceConnection>> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PlatformError::Forbidden("cannot join channel".into()));
        }
        self.record(Call::Connect(workspace, channel));
        Ok(Box::new(FakeVoice {
            workspace,
            channel,
            platform: self.clone(),
        }))
    }

    async fn send(&self, workspace: WorkspaceId, notice: Notice) -> PlatformResult<()> {
        self.record(Call::Send(workspace, notice.title));
        Ok(())
    }

    async fn ban(&self, subject: SubjectId, workspace: WorkspaceId, _reason: &str) -> PlatformResult<()> {
        self.record(Call::Ban(subject, workspace));
        Ok(())
    }

    async fn unban(&self, subject: SubjectId, workspace: WorkspaceId) -> PlatformResult<()> {
        let (delay, error) = {
            let behavior = self.behavior.lock().unwrap();
            (behavior.unban_delay, behavior.unban_errors.get(&workspace).cloned())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(Call::Unban(subject, workspace));
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn kick(&self, subject: SubjectId, workspace: WorkspaceId, _reason: &str) -> PlatformResult<()> {
        self.record(Call::Kick(subject, workspace));
        Ok(())
    }

    async fn workspaces(&self) -> PlatformResult<Vec<WorkspaceId>> {
        if self.fail_workspaces.load(Ordering::SeqCst) {
            return Err(PlatformError::Transport("gateway down".into()));
        }
        Ok(self.behavior.lock().unwrap().workspaces.clone())
    }
}

struct FakeVoice {
    workspace: WorkspaceId,
    channel: ChannelId,
    platform: FakePlatform,
}

#[async_trait]
impl VoiceConnection for FakeVoice {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    async fn play(&mut self, track: &Track) -> PlatformResult<()> {
        self.platform.record(Call::Play(self.workspace, track.title.clone()));
        if self
            .platform
            .behavior
            .lock()
            .unwrap()
            .refused_titles
            .contains(&track.title)
        {
            return Err(PlatformError::Transport("unsupported codec".into()));
        }
        Ok(())
    }

    async fn pause(&mut self) -> PlatformResult<()> {
        self.platform.record(Call::Pause(self.workspace));
        Ok(())
    }

    async fn resume(&mut self) -> PlatformResult<()> {
        self.platform.record(Call::Resume(self.workspace));
        Ok(())
    }

    async fn stop(&mut self) -> PlatformResult<()> {
        self.platform.record(Call::Stop(self.workspace));
        Ok(())
    }

    async fn disconnect(&mut self) -> PlatformResult<()> {
        if self.platform.fail_disconnect.load(Ordering::SeqCst) {
            return Err(PlatformError::Transport("disconnect failed".into()));
        }
        self.platform.record(Call::Disconnect(self.workspace));
        Ok(())
    }
}

/// Scripted media resolver writing small files into the destination directory
#[derive(Default)]
pub struct FakeResolver {
    pub calls: AtomicUsize,
    missing: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    playlist: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn missing(self, query: &str) -> Self {
        self.missing.lock().unwrap().insert(query.to_string());
        self
    }

    /// Writes a partial file, then fails
    pub fn failing(self, query: &str) -> Self {
        self.failing.lock().unwrap().insert(query.to_string());
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn with_playlist(self, entries: &[&str]) -> Self {
        *self.playlist.lock().unwrap() = entries.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn resolve(&self, query: &str, dest_dir: &Path) -> Result<ResolvedMedia, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.lock().unwrap().contains(query) {
            return Err(ResolutionError::NotFound(query.to_string()));
        }

        let partial = dest_dir.join(format!("{}.webm.part", query));
        std::fs::write(&partial, b"partial").unwrap();

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(query) {
            return Err(ResolutionError::Download("HTTP Error 403".into()));
        }

        std::fs::remove_file(&partial).unwrap();
        let path = dest_dir.join(format!("{}_id.mp3", query));
        std::fs::write(&path, b"audio").unwrap();
        Ok(ResolvedMedia {
            path,
            title: format!("Downloaded {}", query),
        })
    }

    async fn expand_playlist(&self, url: &str) -> Result<Vec<String>, ResolutionError> {
        let entries = self.playlist.lock().unwrap().clone();
        if entries.is_empty() {
            return Err(ResolutionError::NotFound(url.to_string()));
        }
        Ok(entries)
    }
}

pub fn track(title: &str) -> Track {
    Track::new(format!("/music/{}.mp3", title), title, USER)
}

pub fn settings(max_queue_length: usize) -> SessionSettings {
    SessionSettings {
        max_queue_length,
        history_limit: 50,
    }
}

pub fn spawn_session(platform: &FakePlatform, workspace: u64, max_queue_length: usize) -> SessionHandle {
    SessionHandle::spawn(
        WorkspaceId(workspace),
        Arc::new(platform.clone()),
        EventBus::new(100),
        settings(max_queue_length),
    )
}

pub fn create_registry(platform: &FakePlatform) -> (Arc<SessionRegistry>, EventBus) {
    let events = EventBus::new(100);
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(platform.clone()),
        events.clone(),
        settings(100),
    ));
    (registry, events)
}

pub fn titles(tracks: &[Track]) -> Vec<&str> {
    tracks.iter().map(|t| t.title.as_str()).collect()
}

/// Events received so far without waiting
pub fn drain_events(rx: &mut broadcast::Receiver<BotEvent>) -> Vec<BotEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
