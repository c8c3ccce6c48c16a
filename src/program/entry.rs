//! Program state
//!
//! A program is a named content offering made of streams. Its lifecycle runs
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`. State changes
//! requested while evaluating a property are never applied in place: they are
//! returned as [`Deferred`] work that the server runs once the current event
//! has been handled.

use std::sync::Arc;

use bytes::Bytes;

use super::follow::list_url;
use super::stream::Stream;
use crate::registry::{BroadcastSink, ClientId};
use crate::server::events::EventSender;
use crate::stats::Metrics;

/// Ticks before restarting after a pipeline error or EOS
pub const RESTART_DELAY_ERROR: u32 = 5;
/// Ticks before retrying a failed stream-list fetch
pub const RESTART_DELAY_FOLLOW_FAILURE: u32 = 10;
/// Ticks before the first start of a newly configured follow program
pub const RESTART_DELAY_FOLLOW_CONFIG: u32 = 1;

/// Bitrate a client of the program-level still stream is accounted at
pub const STILL_STREAM_BITRATE: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ProgramState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramState::Stopped => "stopped",
            ProgramState::Starting => "starting",
            ProgramState::Running => "running",
            ProgramState::Stopping => "stopping",
        }
    }
}

/// How a program gets its media
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramKind {
    /// Streams registered by the operator
    Manual,
    /// Live source pushed with `PUT`
    HttpPush,
    /// Live source pushed with `SOURCE` and Icecast headers
    IcecastPush,
    /// Mirror every stream of `program` on `host`
    PullFollow { host: String, program: String },
    /// Relay one upstream stream
    HttpFollow { uri: String },
}

impl ProgramKind {
    pub fn is_push(&self) -> bool {
        matches!(self, ProgramKind::HttpPush | ProgramKind::IcecastPush)
    }

    pub fn is_follow(&self) -> bool {
        matches!(self, ProgramKind::PullFollow { .. } | ProgramKind::HttpFollow { .. })
    }

    /// Whether streams survive a stop/start cycle
    pub fn keeps_streams(&self) -> bool {
        matches!(self, ProgramKind::Manual)
    }

    pub fn start_plan(&self) -> StartPlan {
        match self {
            ProgramKind::Manual | ProgramKind::HttpPush | ProgramKind::IcecastPush => StartPlan::Launch,
            ProgramKind::HttpFollow { uri } => StartPlan::Relay { uri: uri.clone() },
            ProgramKind::PullFollow { host, program } => StartPlan::FetchList {
                url: list_url(host, program),
            },
        }
    }

    /// Restart delay after a pipeline error or EOS; `None` waits for a new
    /// source instead of retrying.
    pub fn restart_after_failure(&self) -> Option<u32> {
        if self.is_push() {
            None
        } else {
            Some(RESTART_DELAY_ERROR)
        }
    }
}

/// What starting a program involves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPlan {
    /// Launch the streams already registered
    Launch,
    /// Replace the streams with one relaying `uri`, then launch
    Relay { uri: String },
    /// Fetch the upstream stream list; streams are added from the answer
    FetchList { url: String },
}

/// Lifecycle work scheduled for after the current event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    Start(String),
    FinishStop(String),
}

/// A named content offering
pub struct Program {
    pub name: String,
    pub state: ProgramState,
    pub enabled: bool,
    pub kind: ProgramKind,
    /// Index of each stream equals its position
    pub streams: Vec<Stream>,
    /// Ticks left before the next start attempt; 0 = none pending
    pub restart_delay: u32,
    /// The one client currently pushing a live source
    pub push_client: Option<ClientId>,
    pub metrics: Metrics,
    /// Program-level multipart still stream
    pub still_sink: Arc<BroadcastSink>,
    /// Last PNG still from the pipeline
    pub snapshot: Option<Bytes>,
}

impl Program {
    pub fn new(name: impl Into<String>, kind: ProgramKind, events: Option<EventSender>) -> Self {
        Self {
            name: name.into(),
            state: ProgramState::Stopped,
            enabled: false,
            kind,
            streams: Vec::new(),
            restart_delay: 0,
            push_client: None,
            metrics: Metrics::new(),
            still_sink: Arc::new(BroadcastSink::new(events)),
            snapshot: None,
        }
    }

    pub fn desired_run(&self, streaming_enabled: bool) -> bool {
        self.enabled && streaming_enabled
    }

    pub fn is_running(&self) -> bool {
        self.state == ProgramState::Running
    }

    /// Re-evaluate desired-run.
    ///
    /// A stopped program that should run gets a deferred start, unless a
    /// restart is already counting down. A running or starting program that
    /// should not run moves to `Stopping` now and gets a deferred finish.
    pub fn update_state(&mut self, streaming_enabled: bool) -> Option<Deferred> {
        let desired = self.desired_run(streaming_enabled);
        match self.state {
            ProgramState::Stopped if desired && self.restart_delay == 0 => {
                Some(Deferred::Start(self.name.clone()))
            }
            ProgramState::Starting | ProgramState::Running if !desired => Some(self.begin_stop()),
            _ => None,
        }
    }

    /// Enter `Stopping`; the returned work finishes the stop
    pub fn begin_stop(&mut self) -> Deferred {
        self.state = ProgramState::Stopping;
        Deferred::FinishStop(self.name.clone())
    }

    /// Whether every stream that has a pipeline reports playing
    pub fn all_playing(&self) -> bool {
        self.streams
            .iter()
            .filter(|s| s.pipeline.is_some())
            .all(|s| s.playing)
    }

    /// Append a stream and return its index
    pub fn push_stream(&mut self, build: impl FnOnce(&str, usize) -> Stream) -> usize {
        let index = self.streams.len();
        self.streams.push(build(&self.name, index));
        index
    }

    pub fn stream(&self, index: usize) -> Option<&Stream> {
        self.streams.get(index)
    }

    pub fn stream_mut(&mut self, index: usize) -> Option<&mut Stream> {
        self.streams.get_mut(index)
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("enabled", &self.enabled)
            .field("kind", &self.kind)
            .field("streams", &self.streams)
            .field("restart_delay", &self.restart_delay)
            .field("push_client", &self.push_client)
            .finish()
    }
}

/// Program names double as path components
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !name.starts_with('-')
}
