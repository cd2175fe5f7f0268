//! # BeaBot core
//!
//! Multi-workspace chat bot core:
//! - per-workspace playback sessions with queue, history and repeat modes
//! - track acquisition (local library, external download, playlists)
//! - session registry and idle reaper
//! - moderation with a temporal action scheduler for temporary bans/kicks
//!
//! The chat platform is reached through the [`platform::Platform`] trait; the
//! `beabot` binary wires it to a gateway sidecar over HTTP and exposes the
//! command surface in [`api`].

pub mod acquisition;
pub mod api;
pub mod error;
pub mod gateway;
pub mod moderation;
pub mod platform;
pub mod playback;
pub mod reaper;
pub mod registry;

pub use error::{Error, PlatformError, ResolutionError, Result, ValidationError};
pub use platform::{Notice, Platform, PlatformResult, VoiceConnection};
pub use playback::{SessionHandle, SessionSettings, SessionSnapshot, SessionStatus, Track};
pub use reaper::{IdleReaper, ReapReport};
pub use registry::SessionRegistry;
