//! fragcast: HTTP adaptive media delivery server core
//!
//! Live programs are fanned out to HTTP clients as progressive streams and
//! HLS-style playlists; on-demand ISOBMFF assets are served as Smooth Streaming
//! and DASH manifests backed by fragmented MP4 payloads, optionally encrypted
//! for PlayReady playback.
//!
//! # Architecture
//!
//! ```text
//!   HTTP layer ──► Event ──► runtime actor ──► Server::handle_event
//!                                                  │
//!              ┌───────────────┬───────────────────┼──────────────────┐
//!              ▼               ▼                   ▼                  ▼
//!      ResourceRegistry   ProgramSet      ConnectionRegistry     AssetCache
//!      (dispatch, flags)  (lifecycle)     (admission, sinks)     (ism, media, drm)
//! ```
//!
//! The [`Server`] is a plain owned value. [`runtime::spawn`] moves it into a
//! single tokio task that serialises every request, lifecycle event and timer
//! tick, so no table in the core needs a lock.

pub mod drm;
pub mod error;
pub mod ism;
pub mod media;
pub mod program;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use runtime::ServerHandle;
pub use server::{Request, Response, Server, ServerConfig};
