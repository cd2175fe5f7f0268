//! HTTP request handlers
//!
//! The gateway sidecar forwards user commands and platform notifications to
//! these endpoints. Validation and resolution failures are returned directly
//! to the caller; everything else is reported through the event stream.

use super::error::{ApiError, ApiResult};
use super::AppContext;
use crate::acquisition::LibraryEntry;
use crate::error::{Error, Result, ValidationError};
use crate::moderation::PendingAction;
use crate::platform::Notice;
use crate::playback::{SessionHandle, SessionSnapshot, Track};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use beabot_common::events::{BotEvent, RepeatMode, SessionState};
use beabot_common::{ChannelId, SubjectId, WorkspaceId};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tracks queued by the random command when no count is given
const DEFAULT_RANDOM_COUNT: usize = 20;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    sessions: usize,
    pending_actions: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

impl StatusResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            status: "ok".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    channel: ChannelId,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    query: String,
    channel: ChannelId,
    requested_by: SubjectId,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    /// 1-based queue position, 0 when playback started immediately
    position: usize,
    track: Track,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistUrlRequest {
    url: String,
    channel: ChannelId,
    requested_by: SubjectId,
}

#[derive(Debug, Deserialize)]
pub struct RandomRequest {
    count: Option<usize>,
    channel: ChannelId,
    requested_by: SubjectId,
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    queued: usize,
    /// Entries not queued (capacity reached or unresolvable)
    skipped: usize,
}

#[derive(Debug, Deserialize)]
pub struct SkipToRequest {
    index: usize,
}

#[derive(Debug, Deserialize)]
pub struct RepeatRequest {
    mode: RepeatMode,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    /// False when the session was not in a state the command applies to
    changed: bool,
    state: SessionState,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    history: Vec<Track>,
}

#[derive(Debug, Deserialize)]
pub struct TrackEndRequest {
    track_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TrackEndResponse {
    /// False for notifications about tracks that are no longer active
    advanced: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionLostRequest {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
pub struct LoadPlaylistRequest {
    name: String,
    channel: ChannelId,
    requested_by: SubjectId,
}

#[derive(Debug, Deserialize)]
pub struct SavePlaylistRequest {
    name: String,
}

#[derive(Debug, Serialize)]
pub struct SavePlaylistResponse {
    saved: usize,
}

#[derive(Debug, Serialize)]
pub struct PlaylistListResponse {
    playlists: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LibraryQuery {
    letter: Option<char>,
    name: Option<String>,
    folder: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LibraryResponse {
    count: usize,
    entries: Vec<LibraryEntry>,
}

#[derive(Debug, Serialize)]
pub struct ArtistsResponse {
    artists: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct RescanResponse {
    files: usize,
}

#[derive(Debug, Deserialize)]
pub struct ModerationRequest {
    subject: SubjectId,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TempModerationRequest {
    subject: SubjectId,
    duration_secs: u64,
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PendingListResponse {
    pending: Vec<PendingAction>,
}

#[derive(Debug, Deserialize)]
pub struct AnnounceRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
pub struct WordRequest {
    word: String,
}

#[derive(Debug, Serialize)]
pub struct WordChangeResponse {
    word: String,
    /// False when the list already had (or lacked) the word
    changed: bool,
}

#[derive(Debug, Serialize)]
pub struct WordListResponse {
    words: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    content: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    filtered: bool,
}

// ============================================================================
// Helpers
// ============================================================================

fn existing_session(ctx: &AppContext, workspace: WorkspaceId) -> ApiResult<SessionHandle> {
    ctx.registry
        .get(workspace)
        .ok_or_else(|| ApiError::NotFound(format!("no playback session for workspace {}", workspace)))
}

/// Enqueue into the workspace session, retrying once on a session evicted meanwhile
async fn enqueue_track(
    ctx: &AppContext,
    workspace: WorkspaceId,
    track: Track,
    channel: ChannelId,
) -> Result<usize> {
    match ctx
        .registry
        .get_or_create(workspace)
        .enqueue(track.clone(), channel)
        .await
    {
        Err(Error::SessionClosed) => {
            debug!("Workspace {}: session closed during enqueue, retrying", workspace);
            ctx.registry
                .get_or_create(workspace)
                .enqueue(track, channel)
                .await
        }
        other => other,
    }
}

/// Enqueue `tracks` in order until the queue is full
async fn enqueue_all(
    ctx: &AppContext,
    workspace: WorkspaceId,
    tracks: Vec<Track>,
    channel: ChannelId,
) -> ApiResult<QueuedResponse> {
    let total = tracks.len();
    let mut queued = 0;
    for track in tracks {
        match enqueue_track(ctx, workspace, track, channel).await {
            Ok(_) => queued += 1,
            Err(Error::Validation(ValidationError::QueueFull { .. })) => break,
            Err(Error::TrackRefused { title, reason }) => {
                debug!("Workspace {}: skipping refused '{}': {}", workspace, title, reason);
            }
            Err(e) if queued == 0 => return Err(e.into()),
            Err(e) => {
                warn!("Workspace {}: stopped bulk enqueue: {}", workspace, e);
                break;
            }
        }
    }
    Ok(QueuedResponse {
        queued,
        skipped: total - queued,
    })
}

fn resolution_failed(ctx: &AppContext, workspace: WorkspaceId, query: &str, reason: String) {
    ctx.events.emit_lossy(BotEvent::ResolutionFailed {
        workspace: Some(workspace),
        query: query.to_string(),
        reason,
        timestamp: chrono::Utc::now(),
    });
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "beabot".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        sessions: ctx.registry.len(),
        pending_actions: ctx.scheduler.len(),
    })
}

// ============================================================================
// Playback
// ============================================================================

/// POST /workspaces/:ws/join
pub async fn join(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<JoinRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.registry.get_or_create(workspace).join(req.channel).await?;
    Ok(StatusResponse::ok())
}

/// POST /workspaces/:ws/play
///
/// Resolves the query (library first, then download) and enqueues it.
pub async fn play(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<PlayRequest>,
) -> ApiResult<Json<PlayResponse>> {
    info!("Workspace {}: play '{}' requested by {}", workspace, req.query, req.requested_by);

    let track = match ctx.pipeline.resolve(&req.query, req.requested_by).await {
        Ok(track) => track,
        Err(e) => {
            resolution_failed(&ctx, workspace, &req.query, e.to_string());
            return Err(e.into());
        }
    };

    let position = enqueue_track(&ctx, workspace, track.clone(), req.channel).await?;
    Ok(Json(PlayResponse { position, track }))
}

/// POST /workspaces/:ws/playlist
///
/// Expands and downloads the playlist in the background; tracks are queued
/// as each one becomes available.
pub async fn play_playlist(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<PlaylistUrlRequest>,
) -> ApiResult<(StatusCode, Json<StatusResponse>)> {
    if req.url.trim().is_empty() {
        return Err(ApiError::BadRequest("playlist url is empty".to_string()));
    }
    info!("Workspace {}: playlist {} requested by {}", workspace, req.url, req.requested_by);

    tokio::spawn(async move {
        let tracks = ctx.pipeline.resolve_many(&req.url, req.requested_by);
        futures::pin_mut!(tracks);

        let mut queued = 0usize;
        while let Some(result) = tracks.next().await {
            match result {
                Ok(track) => match enqueue_track(&ctx, workspace, track, req.channel).await {
                    Ok(_) => queued += 1,
                    Err(Error::Validation(ValidationError::QueueFull { .. })) => {
                        info!("Workspace {}: queue full, stopping playlist import", workspace);
                        break;
                    }
                    Err(Error::TrackRefused { title, reason }) => {
                        debug!("Workspace {}: skipping refused '{}': {}", workspace, title, reason);
                    }
                    Err(e) => {
                        warn!("Workspace {}: playlist import aborted: {}", workspace, e);
                        break;
                    }
                },
                Err(e) => resolution_failed(&ctx, workspace, &req.url, e.to_string()),
            }
        }
        info!("Workspace {}: queued {} playlist tracks", workspace, queued);
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StatusResponse {
            status: "accepted".to_string(),
        }),
    ))
}

/// POST /workspaces/:ws/random
pub async fn play_random(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<RandomRequest>,
) -> ApiResult<Json<QueuedResponse>> {
    let count = req.count.unwrap_or(DEFAULT_RANDOM_COUNT);
    let tracks: Vec<Track> = ctx
        .pipeline
        .library()
        .random(count)
        .into_iter()
        .map(|e| Track::new(e.path, e.title, req.requested_by))
        .collect();
    if tracks.is_empty() {
        return Err(ApiError::NotFound("music library is empty".to_string()));
    }

    Ok(Json(enqueue_all(&ctx, workspace, tracks, req.channel).await?))
}

/// POST /workspaces/:ws/skip
pub async fn skip(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
) -> ApiResult<Json<StatusResponse>> {
    existing_session(&ctx, workspace)?.skip().await?;
    Ok(StatusResponse::ok())
}

/// POST /workspaces/:ws/skip-to
pub async fn skip_to(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<SkipToRequest>,
) -> ApiResult<Json<StatusResponse>> {
    existing_session(&ctx, workspace)?.skip_to(req.index).await?;
    Ok(StatusResponse::ok())
}

/// POST /workspaces/:ws/pause
pub async fn pause(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
) -> ApiResult<Json<ToggleResponse>> {
    let session = existing_session(&ctx, workspace)?;
    let changed = session.pause().await?;
    Ok(Json(ToggleResponse {
        changed,
        state: session.status().state,
    }))
}

/// POST /workspaces/:ws/resume
pub async fn resume(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
) -> ApiResult<Json<ToggleResponse>> {
    let session = existing_session(&ctx, workspace)?;
    let changed = session.resume().await?;
    Ok(Json(ToggleResponse {
        changed,
        state: session.status().state,
    }))
}

/// POST /workspaces/:ws/stop
///
/// Stops playback and removes the session.
pub async fn stop(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
) -> ApiResult<Json<StatusResponse>> {
    let Some(session) = ctx.registry.get(workspace) else {
        return Ok(StatusResponse::ok());
    };
    session.stop().await?;
    match ctx.registry.remove(workspace).await {
        Ok(()) => {}
        // A command slipped in between stop and remove; the reaper evicts later
        Err(Error::Validation(ValidationError::SessionActive)) => {
            debug!("Workspace {}: session became active again after stop", workspace);
        }
        Err(e) => return Err(e.into()),
    }
    Ok(StatusResponse::ok())
}

/// POST /workspaces/:ws/repeat
pub async fn set_repeat(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<RepeatRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.registry.get_or_create(workspace).set_repeat(req.mode).await?;
    info!("Workspace {}: repeat mode set to {}", workspace, req.mode);
    Ok(StatusResponse::ok())
}

/// GET /workspaces/:ws/queue
pub async fn get_queue(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(existing_session(&ctx, workspace)?.snapshot().await?))
}

/// GET /workspaces/:ws/history
pub async fn get_history(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
) -> ApiResult<Json<HistoryResponse>> {
    let snapshot = existing_session(&ctx, workspace)?.snapshot().await?;
    Ok(Json(HistoryResponse {
        history: snapshot.history,
    }))
}

// ============================================================================
// Platform notifications
// ============================================================================

/// POST /workspaces/:ws/voice/track-end
pub async fn track_end(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<TrackEndRequest>,
) -> ApiResult<Json<TrackEndResponse>> {
    let advanced = match ctx.registry.get(workspace) {
        Some(session) => session.track_finished(req.track_id).await?,
        None => false,
    };
    Ok(Json(TrackEndResponse { advanced }))
}

/// POST /workspaces/:ws/voice/lost
pub async fn connection_lost(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<ConnectionLostRequest>,
) -> ApiResult<Json<StatusResponse>> {
    if let Some(session) = ctx.registry.get(workspace) {
        session.connection_lost(req.reason).await?;
    }
    Ok(StatusResponse::ok())
}

// ============================================================================
// Playlists
// ============================================================================

/// POST /workspaces/:ws/playlists/load
pub async fn load_playlist(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<LoadPlaylistRequest>,
) -> ApiResult<Json<QueuedResponse>> {
    let paths = ctx.playlists.load(&req.name).await?;
    if paths.is_empty() {
        return Err(ApiError::NotFound(format!(
            "playlist '{}' has no playable tracks",
            req.name
        )));
    }

    let library = ctx.pipeline.library();
    let tracks: Vec<Track> = paths
        .into_iter()
        .map(|path| match library.get(&path) {
            Some(entry) => Track::new(entry.path, entry.title, req.requested_by),
            None => Track::from_path(path, req.requested_by),
        })
        .collect();

    Ok(Json(enqueue_all(&ctx, workspace, tracks, req.channel).await?))
}

/// POST /workspaces/:ws/playlists/save
///
/// Saves the active track followed by the queue.
pub async fn save_playlist(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<SavePlaylistRequest>,
) -> ApiResult<Json<SavePlaylistResponse>> {
    let snapshot = existing_session(&ctx, workspace)?.snapshot().await?;
    let tracks: Vec<Track> = snapshot.active.into_iter().chain(snapshot.queue).collect();
    if tracks.is_empty() {
        return Err(ValidationError::EmptyQueue.into());
    }

    let saved = ctx.playlists.save(&req.name, &tracks).await?;
    Ok(Json(SavePlaylistResponse { saved }))
}

/// GET /playlists
pub async fn list_playlists(State(ctx): State<AppContext>) -> ApiResult<Json<PlaylistListResponse>> {
    Ok(Json(PlaylistListResponse {
        playlists: ctx.playlists.list().await?,
    }))
}

/// DELETE /playlists/:name
pub async fn delete_playlist(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.playlists.delete(&name).await?;
    Ok(StatusResponse::ok())
}

// ============================================================================
// Library
// ============================================================================

/// GET /library
///
/// Filters by first letter, name fragment or folder; no filter lists everything.
pub async fn list_library(
    State(ctx): State<AppContext>,
    Query(query): Query<LibraryQuery>,
) -> Json<LibraryResponse> {
    let library = ctx.pipeline.library();
    let entries = if let Some(letter) = query.letter {
        library.by_letter(letter)
    } else if let Some(ref name) = query.name {
        library.by_name(name)
    } else if let Some(ref folder) = query.folder {
        library.by_folder(folder)
    } else {
        library.list_all()
    };

    Json(LibraryResponse {
        count: entries.len(),
        entries,
    })
}

/// GET /library/artists
pub async fn list_artists(State(ctx): State<AppContext>) -> Json<ArtistsResponse> {
    Json(ArtistsResponse {
        artists: ctx.pipeline.library().by_artist(),
    })
}

/// POST /library/rescan
pub async fn rescan_library(State(ctx): State<AppContext>) -> ApiResult<Json<RescanResponse>> {
    let files = ctx.pipeline.library().scan().await?;
    Ok(Json(RescanResponse { files }))
}

// ============================================================================
// Moderation
// ============================================================================

/// POST /workspaces/:ws/moderation/kick
pub async fn kick(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<ModerationRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.moderation
        .kick(workspace, req.subject, req.reason.as_deref())
        .await?;
    Ok(StatusResponse::ok())
}

/// POST /workspaces/:ws/moderation/ban
pub async fn ban(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<ModerationRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.moderation
        .ban(workspace, req.subject, req.reason.as_deref())
        .await?;
    Ok(StatusResponse::ok())
}

/// POST /workspaces/:ws/moderation/tempban
pub async fn temp_ban(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<TempModerationRequest>,
) -> ApiResult<Json<PendingAction>> {
    let pending = ctx
        .moderation
        .temp_ban(
            workspace,
            req.subject,
            Duration::from_secs(req.duration_secs),
            req.reason.as_deref(),
        )
        .await?;
    Ok(Json(pending))
}

/// POST /workspaces/:ws/moderation/tempkick
pub async fn temp_kick(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<TempModerationRequest>,
) -> ApiResult<Json<PendingAction>> {
    let pending = ctx
        .moderation
        .temp_kick(
            workspace,
            req.subject,
            Duration::from_secs(req.duration_secs),
            req.reason.as_deref(),
        )
        .await?;
    Ok(Json(pending))
}

/// POST /workspaces/:ws/announce
pub async fn announce(
    State(ctx): State<AppContext>,
    Path(workspace): Path<WorkspaceId>,
    Json(req): Json<AnnounceRequest>,
) -> ApiResult<Json<StatusResponse>> {
    ctx.moderation
        .announce(workspace, Notice::new(req.title, req.body))
        .await?;
    Ok(StatusResponse::ok())
}

/// GET /moderation/pending
pub async fn list_pending(State(ctx): State<AppContext>) -> Json<PendingListResponse> {
    Json(PendingListResponse {
        pending: ctx.scheduler.pending(),
    })
}

/// DELETE /moderation/pending/:subject
pub async fn cancel_pending(
    State(ctx): State<AppContext>,
    Path(subject): Path<SubjectId>,
) -> ApiResult<Json<PendingAction>> {
    ctx.scheduler
        .cancel(subject)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no pending action for subject {}", subject)))
}

// ============================================================================
// Word filter
// ============================================================================

/// GET /filter/words
pub async fn list_words(State(ctx): State<AppContext>) -> Json<WordListResponse> {
    Json(WordListResponse {
        words: ctx.filter.list().await,
    })
}

/// POST /filter/words
pub async fn add_word(
    State(ctx): State<AppContext>,
    Json(req): Json<WordRequest>,
) -> ApiResult<Json<WordChangeResponse>> {
    let changed = ctx.filter.add(&req.word).await?;
    Ok(Json(WordChangeResponse {
        word: req.word.trim().to_lowercase(),
        changed,
    }))
}

/// DELETE /filter/words
pub async fn remove_word(
    State(ctx): State<AppContext>,
    Json(req): Json<WordRequest>,
) -> ApiResult<Json<WordChangeResponse>> {
    let changed = ctx.filter.remove(&req.word).await?;
    Ok(Json(WordChangeResponse {
        word: req.word.trim().to_lowercase(),
        changed,
    }))
}

/// POST /filter/check
pub async fn check_content(
    State(ctx): State<AppContext>,
    Json(req): Json<CheckRequest>,
) -> Json<CheckResponse> {
    Json(CheckResponse {
        filtered: ctx.filter.is_filtered(&req.content).await,
    })
}
