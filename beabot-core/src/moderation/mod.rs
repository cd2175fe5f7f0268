//! Moderation
//!
//! - [`WordFilter`]: persisted filtered-word list
//! - [`ModerationService`]: kick/ban commands and announcements
//! - [`ActionScheduler`]: expiry tracking and reversal of temporary actions

mod filter;
mod scheduler;
mod service;

pub use filter::WordFilter;
pub use scheduler::{ActionScheduler, PendingAction, ReconcileReport, ReversalOutcome};
pub use service::{ModerationService, DEFAULT_REASON};
