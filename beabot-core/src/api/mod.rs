//! HTTP command surface
//!
//! Axum router exposing session, library, playlist and moderation commands
//! plus the SSE event stream.

mod error;
mod handlers;
mod sse;

pub use error::{ApiError, ApiResult};

use crate::acquisition::{AcquisitionPipeline, PlaylistStore};
use crate::moderation::{ActionScheduler, ModerationService, WordFilter};
use crate::registry::SessionRegistry;
use axum::{
    routing::{delete, get, post},
    Router,
};
use beabot_common::events::EventBus;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<SessionRegistry>,
    pub pipeline: Arc<AcquisitionPipeline>,
    pub playlists: Arc<PlaylistStore>,
    pub moderation: Arc<ModerationService>,
    pub scheduler: Arc<ActionScheduler>,
    pub filter: Arc<WordFilter>,
    pub events: EventBus,
}

/// Build the router with all routes
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/events", get(sse::event_stream))

        // Playback
        .route("/workspaces/:ws/join", post(handlers::join))
        .route("/workspaces/:ws/play", post(handlers::play))
        .route("/workspaces/:ws/playlist", post(handlers::play_playlist))
        .route("/workspaces/:ws/random", post(handlers::play_random))
        .route("/workspaces/:ws/skip", post(handlers::skip))
        .route("/workspaces/:ws/skip-to", post(handlers::skip_to))
        .route("/workspaces/:ws/pause", post(handlers::pause))
        .route("/workspaces/:ws/resume", post(handlers::resume))
        .route("/workspaces/:ws/stop", post(handlers::stop))
        .route("/workspaces/:ws/repeat", post(handlers::set_repeat))
        .route("/workspaces/:ws/queue", get(handlers::get_queue))
        .route("/workspaces/:ws/history", get(handlers::get_history))

        // Platform notifications
        .route("/workspaces/:ws/voice/track-end", post(handlers::track_end))
        .route("/workspaces/:ws/voice/lost", post(handlers::connection_lost))

        // Playlists
        .route("/workspaces/:ws/playlists/load", post(handlers::load_playlist))
        .route("/workspaces/:ws/playlists/save", post(handlers::save_playlist))
        .route("/playlists", get(handlers::list_playlists))
        .route("/playlists/:name", delete(handlers::delete_playlist))

        // Library
        .route("/library", get(handlers::list_library))
        .route("/library/artists", get(handlers::list_artists))
        .route("/library/rescan", post(handlers::rescan_library))

        // Moderation
        .route("/workspaces/:ws/moderation/kick", post(handlers::kick))
        .route("/workspaces/:ws/moderation/ban", post(handlers::ban))
        .route("/workspaces/:ws/moderation/tempban", post(handlers::temp_ban))
        .route("/workspaces/:ws/moderation/tempkick", post(handlers::temp_kick))
        .route("/workspaces/:ws/announce", post(handlers::announce))
        .route("/moderation/pending", get(handlers::list_pending))
        .route("/moderation/pending/:subject", delete(handlers::cancel_pending))

        // Word filter
        .route(
            "/filter/words",
            get(handlers::list_words)
                .post(handlers::add_word)
                .delete(handlers::remove_word),
        )
        .route("/filter/check", post(handlers::check_content))

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
