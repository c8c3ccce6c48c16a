//! Dispatch-loop events
//!
//! Every asynchronous source reports into the server through one channel of
//! [`Event`]s, so the server sees a single ordered stream of work.

use tokio::sync::mpsc;

use super::http::HttpEvent;
use crate::program::{PipelineEvent, UpstreamEvent};
use crate::registry::SinkEvent;

#[derive(Debug)]
pub enum Event {
    /// Connection lifecycle from the HTTP layer
    Http(HttpEvent),
    /// State change of a stream pipeline
    Pipeline(PipelineEvent),
    /// A fan-out sink dropped a client
    Sink(SinkEvent),
    /// A stream-list fetch finished
    Upstream(UpstreamEvent),
    /// Periodic timer
    Tick,
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
