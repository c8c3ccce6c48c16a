//! Programs and their streams
//!
//! ```text
//!   ProgramSet ── name ──► Program { state, kind, restart_delay, push_client }
//!                              ├── still_sink (program-level handoff)
//!                              └── streams: [Stream] ──► Box<dyn Pipeline> ──► FanoutSink
//!
//!   Stopped ──(deferred)──► Starting ──Playing──► Running
//!      ▲                                            │ disable / Error / EOS
//!      └────────────(deferred)──── Stopping ◄───────┘
//! ```
//!
//! The lifecycle transitions that need collaborators (pipelines, upstream
//! fetches, connection teardown) are driven by the server; this module holds
//! the state and the pure transition rules.

pub mod entry;
pub mod follow;
pub mod pipeline;
pub mod set;
pub mod stream;

pub use entry::{is_valid_name, Deferred, Program, ProgramKind, ProgramState, StartPlan};
pub use follow::{ReqwestFetcher, UpstreamEvent, UpstreamFetcher};
pub use pipeline::{
    ImageFormat, PassthroughFactory, PassthroughPipeline, Pipeline, PipelineDescription, PipelineEvent,
    PipelineEventKind, PipelineFactory, PipelineSource, PipelineState,
};
pub use set::ProgramSet;
pub use stream::{Stream, StreamType};
