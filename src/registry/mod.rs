//! Client admission and connection handoff
//!
//! A client asking for a live stream is admitted against the server-wide
//! ceilings, accounted at stream, program and server level, and handed to the
//! target's fan-out sink once its response headers are on the wire.
//!
//! # Architecture
//!
//! ```text
//!   GET /{stream}             HeadersWritten            Disconnected /
//!        │                         │                    ClientRemoved
//!        ▼                         ▼                         │
//!   ConnectionRegistry::admit ─► attach_socket ─► FanoutSink  ▼
//!     │  lookup(target)            add_client        ConnectionRegistry::teardown
//!     │  Limits::would_exceed                          metrics -= bitrate (once)
//!     └► Metrics += bitrate                            sink.remove_client
//!        (server, program, stream)                     socket.close
//! ```
//!
//! # Zero-Copy Design
//!
//! Sinks carry `bytes::Bytes`, so every client of a stream shares the same
//! allocation per chunk; only the reference count is touched per client.

pub mod entry;
pub mod error;
pub mod sink;
pub mod store;

pub use entry::{ClientId, ClientSocket, Connection, HandoffTarget};
pub use error::AdmissionError;
pub use sink::{BroadcastSink, FanoutSink, SinkEvent};
pub use store::{ConnectionRegistry, HandoffTargets, TargetInfo};
