//! Connection records
//!
//! Per-client state stored in the connection registry.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

/// Identity of one HTTP client connection, assigned by the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Write side of a client connection, handed over once response headers
/// are on the wire
#[derive(Debug)]
pub struct ClientSocket {
    /// Body bytes for the client
    pub output: mpsc::Sender<Bytes>,
    /// Fired to close the connection
    pub close: Option<oneshot::Sender<()>>,
}

impl ClientSocket {
    pub fn new(output: mpsc::Sender<Bytes>, close: oneshot::Sender<()>) -> Self {
        Self {
            output,
            close: Some(close),
        }
    }

    /// Ask the HTTP layer to close the connection
    pub fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

/// Fan-out point a client is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandoffTarget {
    pub program: String,
    /// Stream index; `None` is the program-level snapshot sink
    pub stream: Option<usize>,
}

impl HandoffTarget {
    pub fn stream(program: impl Into<String>, index: usize) -> Self {
        Self {
            program: program.into(),
            stream: Some(index),
        }
    }

    pub fn program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            stream: None,
        }
    }
}

impl std::fmt::Display for HandoffTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stream {
            Some(index) => write!(f, "{}#{}", self.program, index),
            None => write!(f, "{}", self.program),
        }
    }
}

/// An admitted client
#[derive(Debug)]
pub struct Connection {
    pub client: ClientId,
    pub target: HandoffTarget,
    /// Bitrate accounted for this client at every level
    pub bitrate: u64,
    /// Present once response headers have been written
    pub socket: Option<ClientSocket>,
}

impl Connection {
    pub(super) fn new(client: ClientId, target: HandoffTarget, bitrate: u64) -> Self {
        Self {
            client,
            target,
            bitrate,
            socket: None,
        }
    }

    /// Whether the client is registered with its sink
    pub fn is_attached(&self) -> bool {
        self.socket.is_some()
    }
}
