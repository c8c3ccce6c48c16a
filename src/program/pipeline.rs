//! Media pipeline collaborator
//!
//! Decoding, encoding and muxing live outside this crate. A stream owns one
//! [`Pipeline`] built by the server's [`PipelineFactory`]; the pipeline feeds
//! the stream's fan-out sink and reports state changes as [`PipelineEvent`]s
//! into the dispatch loop.
//!
//! [`PassthroughPipeline`] is bundled so push ingest and follow relays work
//! without an external media engine: it forwards bytes unchanged.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;

use super::stream::StreamType;
use crate::error::{Error, Result};
use crate::registry::{BroadcastSink, FanoutSink};
use crate::server::events::{Event, EventSender};

/// Requested pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Null,
    Paused,
    Playing,
}

/// Where a pipeline's media comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineSource {
    /// Buffers pushed by an ingest client
    Push,
    /// Relay of an upstream HTTP stream
    Follow { uri: String },
    /// Configured by the operator
    Manual,
}

/// Everything a factory needs to build a stream's pipeline
#[derive(Debug, Clone)]
pub struct PipelineDescription {
    pub program: String,
    pub stream: usize,
    pub source: PipelineSource,
    pub stream_type: StreamType,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEventKind {
    Playing,
    Error(String),
    Eos,
    /// A still image of the program
    Snapshot { format: ImageFormat, data: Bytes },
}

/// State change reported by a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineEvent {
    pub program: String,
    pub stream: usize,
    pub kind: PipelineEventKind,
}

/// Control facade of one running pipeline
pub trait Pipeline: Send {
    fn set_state(&mut self, state: PipelineState) -> Result<()>;

    /// The sink clients of this stream attach to
    fn sink(&self) -> Arc<dyn FanoutSink>;

    /// Feed ingest bytes
    fn push_buffer(&mut self, data: Bytes) -> Result<()>;
}

/// Builds pipelines for streams
pub trait PipelineFactory: Send {
    fn create(&self, description: &PipelineDescription, events: EventSender) -> Result<Box<dyn Pipeline>>;
}

/// Factory for [`PassthroughPipeline`]s
#[derive(Debug, Clone, Default)]
pub struct PassthroughFactory {
    client: reqwest::Client,
}

impl PassthroughFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PipelineFactory for PassthroughFactory {
    fn create(&self, description: &PipelineDescription, events: EventSender) -> Result<Box<dyn Pipeline>> {
        Ok(Box::new(PassthroughPipeline::new(
            description.clone(),
            events,
            self.client.clone(),
        )))
    }
}

/// Forwards pushed or relayed bytes straight into a [`BroadcastSink`]
pub struct PassthroughPipeline {
    description: PipelineDescription,
    sink: Arc<BroadcastSink>,
    events: EventSender,
    client: reqwest::Client,
    state: PipelineState,
    relay: Option<JoinHandle<()>>,
}

impl PassthroughPipeline {
    pub fn new(description: PipelineDescription, events: EventSender, client: reqwest::Client) -> Self {
        Self {
            sink: Arc::new(BroadcastSink::new(Some(events.clone()))),
            description,
            events,
            client,
            state: PipelineState::Null,
            relay: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn report(&self, kind: PipelineEventKind) {
        report(&self.events, &self.description, kind);
    }

    fn start_relay(&mut self, uri: String) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Upstream("follow relay needs a tokio runtime".into()))?;

        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        let description = self.description.clone();
        let request = self.client.get(&uri);

        self.relay = Some(runtime.spawn(async move {
            let mut response = match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => response,
                Err(e) => {
                    report(&events, &description, PipelineEventKind::Error(format!("{}: {}", uri, e)));
                    return;
                }
            };
            report(&events, &description, PipelineEventKind::Playing);

            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => sink.push(chunk),
                    Ok(None) => {
                        report(&events, &description, PipelineEventKind::Eos);
                        return;
                    }
                    Err(e) => {
                        report(&events, &description, PipelineEventKind::Error(format!("{}: {}", uri, e)));
                        return;
                    }
                }
            }
        }));
        Ok(())
    }
}

fn report(events: &EventSender, description: &PipelineDescription, kind: PipelineEventKind) {
    let _ = events.send(Event::Pipeline(PipelineEvent {
        program: description.program.clone(),
        stream: description.stream,
        kind,
    }));
}

impl Pipeline for PassthroughPipeline {
    fn set_state(&mut self, state: PipelineState) -> Result<()> {
        if state == self.state {
            return Ok(());
        }

        match state {
            PipelineState::Playing => match &self.description.source {
                PipelineSource::Follow { uri } => {
                    let uri = uri.clone();
                    self.start_relay(uri)?;
                }
                PipelineSource::Push | PipelineSource::Manual => self.report(PipelineEventKind::Playing),
            },
            PipelineState::Paused | PipelineState::Null => {
                if let Some(relay) = self.relay.take() {
                    relay.abort();
                }
                if state == PipelineState::Null {
                    self.sink.clear();
                }
            }
        }

        tracing::debug!(
            program = %self.description.program,
            stream = self.description.stream,
            state = ?state,
            "Pipeline state changed"
        );
        self.state = state;
        Ok(())
    }

    fn sink(&self) -> Arc<dyn FanoutSink> {
        self.sink.clone()
    }

    fn push_buffer(&mut self, data: Bytes) -> Result<()> {
        if self.state != PipelineState::Playing {
            return Err(Error::Upstream(format!(
                "{} stream {} is not playing",
                self.description.program, self.description.stream
            )));
        }
        self.sink.push(data);
        Ok(())
    }
}

impl Drop for PassthroughPipeline {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
    }
}
