//! Fan-out sinks
//!
//! A sink multiplexes one encoded byte stream to many client sockets. The
//! bundled [`BroadcastSink`] uses `tokio::sync::broadcast`; every chunk is a
//! `Bytes`, so clients share one allocation per chunk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::entry::ClientId;
use crate::error::{Error, Result};
use crate::server::events::{Event, EventSender};

/// Chunks buffered per client before it starts lagging
const CHANNEL_CAPACITY: usize = 256;

/// Events reported by a sink into the dispatch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// The sink dropped a client on its own (socket gone or sink closed)
    ClientRemoved { client: ClientId },
}

/// One encoded stream delivered to many clients
pub trait FanoutSink: Send + Sync {
    /// Start delivering to `output`
    fn add_client(&self, client: ClientId, output: mpsc::Sender<Bytes>) -> Result<()>;

    /// Stop delivering to `client`. No-op if it is not attached.
    fn remove_client(&self, client: ClientId);

    /// Drop every client
    fn clear(&self);
}

type ClientTasks = Arc<Mutex<HashMap<ClientId, JoinHandle<()>>>>;

/// Broadcast-channel backed sink
pub struct BroadcastSink {
    tx: broadcast::Sender<Bytes>,
    clients: ClientTasks,
    events: Option<EventSender>,
}

impl BroadcastSink {
    /// Create a sink. Clients it drops on its own are reported on `events`.
    pub fn new(events: Option<EventSender>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            clients: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Deliver `data` to every attached client
    pub fn push(&self, data: Bytes) {
        // No receivers is not an error: the stream runs with nobody watching.
        let _ = self.tx.send(data);
    }

    pub fn client_count(&self) -> usize {
        lock(&self.clients).len()
    }
}

fn lock(clients: &ClientTasks) -> std::sync::MutexGuard<'_, HashMap<ClientId, JoinHandle<()>>> {
    clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FanoutSink for BroadcastSink {
    fn add_client(&self, client: ClientId, output: mpsc::Sender<Bytes>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Upstream("fan-out sink needs a tokio runtime".into()))?;

        let mut rx = self.tx.subscribe();
        let clients = Arc::clone(&self.clients);
        let events = self.events.clone();

        // Hold the lock across spawn so the task cannot remove its own entry
        // before it is inserted.
        let mut tasks = lock(&self.clients);
        let task = runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(data) => {
                        if output.send(data).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(client = client.0, skipped = skipped, "Client lagging, chunks dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            lock(&clients).remove(&client);
            if let Some(events) = events {
                let _ = events.send(Event::Sink(SinkEvent::ClientRemoved { client }));
            }
        });

        if let Some(previous) = tasks.insert(client, task) {
            previous.abort();
        }
        tracing::debug!(client = client.0, clients = tasks.len(), "Client attached to sink");
        Ok(())
    }

    fn remove_client(&self, client: ClientId) {
        if let Some(task) = lock(&self.clients).remove(&client) {
            task.abort();
            tracing::debug!(client = client.0, "Client detached from sink");
        }
    }

    fn clear(&self) {
        for (_, task) in lock(&self.clients).drain() {
            task.abort();
        }
    }
}

impl Drop for BroadcastSink {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_push_reaches_every_client() {
        let sink = BroadcastSink::new(None);
        let (out1, mut rx1) = mpsc::channel(8);
        let (out2, mut rx2) = mpsc::channel(8);

        sink.add_client(ClientId(1), out1).unwrap();
        sink.add_client(ClientId(2), out2).unwrap();
        assert_eq!(sink.client_count(), 2);

        sink.push(Bytes::from_static(b"chunk"));

        assert_eq!(rx1.recv().await.unwrap(), Bytes::from_static(b"chunk"));
        assert_eq!(rx2.recv().await.unwrap(), Bytes::from_static(b"chunk"));
    }

    #[tokio::test]
    async fn test_remove_client_is_silent() {
        let (events, mut rx) = mpsc::unbounded_channel();
        let sink = BroadcastSink::new(Some(events));
        let (out, _out_rx) = mpsc::channel(8);

        sink.add_client(ClientId(7), out).unwrap();
        sink.remove_client(ClientId(7));
        sink.remove_client(ClientId(7));

        assert_eq!(sink.client_count(), 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_socket_reports_removal() {
        let (events, mut rx) = mpsc::unbounded_channel();
        let sink = BroadcastSink::new(Some(events));
        let (out, out_rx) = mpsc::channel(8);

        sink.add_client(ClientId(3), out).unwrap();

        // Peer goes away; the next chunk fails to deliver
        drop(out_rx);
        sink.push(Bytes::from_static(b"x"));

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            Event::Sink(SinkEvent::ClientRemoved { client: ClientId(3) })
        ));
        assert_eq!(sink.client_count(), 0);
    }

    #[test]
    fn test_add_client_outside_runtime_fails() {
        let sink = BroadcastSink::new(None);
        let (out, _rx) = mpsc::channel(1);
        assert!(sink.add_client(ClientId(1), out).is_err());
    }
}
