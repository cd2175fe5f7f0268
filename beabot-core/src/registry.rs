//! Session registry
//!
//! Maps each workspace to its playback session. Lookups and creation happen
//! under one short synchronous lock, so two concurrent `get_or_create` calls
//! for the same workspace always observe the same session.

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::playback::{SessionHandle, SessionSettings};
use beabot_common::events::{BotEvent, EventBus};
use beabot_common::WorkspaceId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Workspace → session map shared by command handlers and the idle reaper
pub struct SessionRegistry {
    sessions: Mutex<HashMap<WorkspaceId, SessionHandle>>,
    platform: Arc<dyn Platform>,
    events: EventBus,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(platform: Arc<dyn Platform>, events: EventBus, settings: SessionSettings) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            platform,
            events,
            settings,
        }
    }

    /// Existing session for `workspace`, or a fresh idle one
    pub fn get_or_create(&self, workspace: WorkspaceId) -> SessionHandle {
        let mut sessions = self.lock();
        if let Some(handle) = sessions.get(&workspace) {
            if !handle.is_closed() {
                return handle.clone();
            }
            debug!("Replacing closed session for workspace {}", workspace);
        }

        let handle = SessionHandle::spawn(
            workspace,
            Arc::clone(&self.platform),
            self.events.clone(),
            self.settings,
        );
        sessions.insert(workspace, handle.clone());
        info!("Created playback session for workspace {}", workspace);
        handle
    }

    pub fn get(&self, workspace: WorkspaceId) -> Option<SessionHandle> {
        self.lock()
            .get(&workspace)
            .filter(|h| !h.is_closed())
            .cloned()
    }

    /// Close and evict the session for `workspace`
    ///
    /// Only idle sessions can be removed; an active one fails with
    /// `SessionActive` and stays registered. Removing an unknown workspace is
    /// a no-op.
    pub async fn remove(&self, workspace: WorkspaceId) -> Result<()> {
        let Some(handle) = self.lock().get(&workspace).cloned() else {
            return Ok(());
        };

        match handle.close_if_idle().await {
            Ok(()) | Err(Error::SessionClosed) => {}
            Err(e) => return Err(e),
        }

        let evicted = {
            let mut sessions = self.lock();
            // A replacement may have been registered meanwhile
            let same = sessions
                .get(&workspace)
                .is_some_and(|h| h.session_id() == handle.session_id());
            if same {
                sessions.remove(&workspace);
            }
            same
        };

        if evicted {
            info!("Removed playback session for workspace {}", workspace);
            self.events.emit_lossy(BotEvent::SessionClosed {
                workspace,
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(())
    }

    /// Handles for every registered session
    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.lock().values().cloned().collect()
    }

    pub fn workspaces(&self) -> Vec<WorkspaceId> {
        self.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stop every session and clear the registry
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self.lock().drain().map(|(_, h)| h).collect();
        info!("Stopping {} playback session(s)", handles.len());

        for handle in handles {
            match handle.stop().await {
                Ok(()) | Err(Error::SessionClosed) => {}
                Err(e) => warn!(
                    "Failed to stop session for workspace {}: {}",
                    handle.workspace(),
                    e
                ),
            }
            let _ = handle.close_if_idle().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkspaceId, SessionHandle>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
