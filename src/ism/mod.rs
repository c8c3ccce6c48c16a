//! On-demand assets: bitrate ladders and their manifests
//!
//! ```text
//!   AssetCache ── key ──► Asset { duration, protection }
//!                            ├── video: [Level] ──► Container + track id
//!                            └── audio: [Level] ──► Container + track id
//!
//!   Asset ──► smooth::render_manifest     (Smooth Streaming XML)
//!         ──► dash::render_range_mpd      (on-demand, byte ranges)
//!         ──► dash::render_live_mpd       (isoff-live, SegmentTimeline)
//!         ──► Asset::content              (init segment or moof + mdat)
//! ```

pub mod asset;
pub mod cache;
pub mod dash;
pub mod query;
pub mod smooth;

pub use asset::{Asset, Content, Level};
pub use cache::AssetCache;
pub use query::{ContentQuery, StartTime};
