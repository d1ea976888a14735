//! WatchParty - Core Library
//!
//! Lets one host peer drive playback of a single media file while viewers
//! mirror its play/pause/seek events, and serves that file over HTTP with
//! byte-range support.

pub mod media;
pub mod sync;

// Re-exports for convenience
pub use media::{MediaAsset, MediaError, RangeWindow, ServePlan};
pub use sync::{HubHandle, PeerId, ServerMessage, SyncHub, TransportEvent};
