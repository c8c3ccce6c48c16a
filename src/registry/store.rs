//! Connection registry
//!
//! Owns every admitted client connection, keyed by [`ClientId`]. Admission
//! and accounting happen in the same call, and teardown reverses both exactly
//! once no matter how many times it is triggered.

use std::collections::HashMap;
use std::sync::Arc;

use super::entry::{ClientId, ClientSocket, Connection, HandoffTarget};
use super::error::AdmissionError;
use super::sink::FanoutSink;
use crate::stats::{Limits, Metrics};

/// What a fan-out target currently looks like
pub struct TargetInfo {
    /// Running and accepting clients
    pub available: bool,
    /// Bitrate a client of this target is accounted at
    pub bitrate: u64,
    pub sink: Option<Arc<dyn FanoutSink>>,
}

/// Resolves handoff targets to their sinks and per-target metrics
pub trait HandoffTargets {
    /// `None` when the target does not exist
    fn lookup(&self, target: &HandoffTarget) -> Option<TargetInfo>;

    /// Run `f` on every metrics counter below server level that a client of
    /// `target` is accounted in (stream, then program).
    fn with_metrics(&mut self, target: &HandoffTarget, f: &mut dyn FnMut(&mut Metrics));
}

/// Table of admitted clients
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ClientId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `client` to `target`.
    ///
    /// Checks run in order: target availability (`Disabled`), then the
    /// server-wide ceilings. On success the connection is recorded and its
    /// bitrate added at stream, program and server level.
    pub fn admit(
        &mut self,
        client: ClientId,
        target: HandoffTarget,
        targets: &mut dyn HandoffTargets,
        server_metrics: &mut Metrics,
        limits: &Limits,
    ) -> Result<(), AdmissionError> {
        let info = match targets.lookup(&target) {
            Some(info) if info.available => info,
            _ => return Err(AdmissionError::Disabled),
        };

        if let Some(hit) = limits.would_exceed(server_metrics, info.bitrate) {
            tracing::debug!(client = client.0, target = %target, limit = ?hit, "Admission rejected");
            return Err(hit.into());
        }

        if let Some(existing) = self.connections.get(&client) {
            tracing::warn!(
                client = client.0,
                target = %existing.target,
                "Client already admitted"
            );
            return Ok(());
        }

        server_metrics.add_client(info.bitrate);
        targets.with_metrics(&target, &mut |m| m.add_client(info.bitrate));

        tracing::debug!(
            client = client.0,
            target = %target,
            bitrate = info.bitrate,
            clients = server_metrics.n_clients,
            "Client admitted"
        );
        self.connections
            .insert(client, Connection::new(client, target, info.bitrate));
        Ok(())
    }

    /// Hand the client's socket to its target's sink once response headers
    /// are written. A socket for an unknown client is closed; a sink that
    /// refuses the client tears the connection down.
    pub fn attach_socket(
        &mut self,
        client: ClientId,
        mut socket: ClientSocket,
        targets: &mut dyn HandoffTargets,
        server_metrics: &mut Metrics,
    ) {
        let Some(connection) = self.connections.get_mut(&client) else {
            tracing::debug!(client = client.0, "Socket for unknown client, closing");
            socket.close();
            return;
        };

        let sink = targets.lookup(&connection.target).and_then(|info| info.sink);
        let attached = match sink {
            Some(sink) => match sink.add_client(client, socket.output.clone()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(client = client.0, error = %e, "Sink refused client");
                    false
                }
            },
            None => false,
        };

        connection.socket = Some(socket);
        if !attached {
            self.teardown(client, targets, server_metrics);
        }
    }

    /// Remove `client`, reverse its accounting and close its socket.
    ///
    /// Returns `false` if the client was not (or no longer) registered.
    pub fn teardown(
        &mut self,
        client: ClientId,
        targets: &mut dyn HandoffTargets,
        server_metrics: &mut Metrics,
    ) -> bool {
        let Some(mut connection) = self.connections.remove(&client) else {
            return false;
        };

        server_metrics.remove_client(connection.bitrate);
        targets.with_metrics(&connection.target, &mut |m| {
            m.remove_client(connection.bitrate)
        });

        if let Some(sink) = targets.lookup(&connection.target).and_then(|info| info.sink) {
            sink.remove_client(client);
        }
        if let Some(socket) = connection.socket.as_mut() {
            socket.close();
        }

        tracing::debug!(
            client = client.0,
            target = %connection.target,
            clients = server_metrics.n_clients,
            "Client removed"
        );
        true
    }

    /// Tear down every client whose target matches
    pub fn teardown_matching(
        &mut self,
        matches: impl Fn(&HandoffTarget) -> bool,
        targets: &mut dyn HandoffTargets,
        server_metrics: &mut Metrics,
    ) -> usize {
        let clients: Vec<ClientId> = self
            .connections
            .values()
            .filter(|c| matches(&c.target))
            .map(|c| c.client)
            .collect();

        for client in &clients {
            self.teardown(*client, targets, server_metrics);
        }
        clients.len()
    }

    /// Tear down every client of `program` and its streams
    pub fn teardown_program(
        &mut self,
        program: &str,
        targets: &mut dyn HandoffTargets,
        server_metrics: &mut Metrics,
    ) -> usize {
        self.teardown_matching(|t| t.program == program, targets, server_metrics)
    }

    /// Tear down everything
    pub fn teardown_all(&mut self, targets: &mut dyn HandoffTargets, server_metrics: &mut Metrics) {
        let clients: Vec<ClientId> = self.connections.keys().copied().collect();
        for client in clients {
            self.teardown(client, targets, server_metrics);
        }
    }

    pub fn get(&self, client: ClientId) -> Option<&Connection> {
        self.connections.get(&client)
    }

    pub fn contains(&self, client: ClientId) -> bool {
        self.connections.contains_key(&client)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use tokio::sync::{mpsc, oneshot};

    use super::*;
    use crate::error::{Error, Result};

    /// Records sink calls
    #[derive(Default)]
    struct RecordingSink {
        added: Mutex<Vec<ClientId>>,
        removed: Mutex<Vec<ClientId>>,
        refuse: bool,
    }

    impl FanoutSink for RecordingSink {
        fn add_client(&self, client: ClientId, _output: mpsc::Sender<Bytes>) -> Result<()> {
            if self.refuse {
                return Err(Error::Upstream("refused".into()));
            }
            self.added.lock().unwrap().push(client);
            Ok(())
        }

        fn remove_client(&self, client: ClientId) {
            self.removed.lock().unwrap().push(client);
        }

        fn clear(&self) {}
    }

    /// One program with one stream
    struct OneStream {
        available: bool,
        bitrate: u64,
        sink: Arc<RecordingSink>,
        stream: Metrics,
        program: Metrics,
    }

    impl OneStream {
        fn new(bitrate: u64) -> Self {
            Self {
                available: true,
                bitrate,
                sink: Arc::new(RecordingSink::default()),
                stream: Metrics::new(),
                program: Metrics::new(),
            }
        }
    }

    impl HandoffTargets for OneStream {
        fn lookup(&self, target: &HandoffTarget) -> Option<TargetInfo> {
            (target.program == "live").then(|| TargetInfo {
                available: self.available,
                bitrate: self.bitrate,
                sink: Some(self.sink.clone() as Arc<dyn FanoutSink>),
            })
        }

        fn with_metrics(&mut self, target: &HandoffTarget, f: &mut dyn FnMut(&mut Metrics)) {
            if target.program == "live" {
                f(&mut self.stream);
                f(&mut self.program);
            }
        }
    }

    fn target() -> HandoffTarget {
        HandoffTarget::stream("live", 0)
    }

    fn socket() -> (ClientSocket, mpsc::Receiver<Bytes>, oneshot::Receiver<()>) {
        let (output, output_rx) = mpsc::channel(4);
        let (close, close_rx) = oneshot::channel();
        (ClientSocket::new(output, close), output_rx, close_rx)
    }

    #[test]
    fn test_admit_accounts_at_every_level() {
        let mut registry = ConnectionRegistry::new();
        let mut targets = OneStream::new(600_000);
        let mut server = Metrics::new();

        registry
            .admit(ClientId(1), target(), &mut targets, &mut server, &Limits::default())
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(server.n_clients, 1);
        assert_eq!(server.bitrate, 600_000);
        assert_eq!(targets.stream.bitrate, 600_000);
        assert_eq!(targets.program.n_clients, 1);
    }

    #[test]
    fn test_admission_ceilings() {
        let mut registry = ConnectionRegistry::new();
        let mut targets = OneStream::new(600_000);
        let mut server = Metrics::new();
        let limits = Limits {
            max_connections: 2,
            max_bitrate: 0,
        };

        registry.admit(ClientId(1), target(), &mut targets, &mut server, &limits).unwrap();
        registry.admit(ClientId(2), target(), &mut targets, &mut server, &limits).unwrap();
        assert_eq!(
            registry.admit(ClientId(3), target(), &mut targets, &mut server, &limits),
            Err(AdmissionError::TooManyClients)
        );

        // Rejection leaves every counter alone
        assert_eq!(server.n_clients, 2);
        assert_eq!(targets.stream.n_clients, 2);

        let limits = Limits {
            max_connections: 0,
            max_bitrate: 1_800_000,
        };
        assert_eq!(
            registry.admit(ClientId(3), target(), &mut targets, &mut server, &limits),
            Err(AdmissionError::Bandwidth)
        );
    }

    #[test]
    fn test_unavailable_target_is_disabled() {
        let mut registry = ConnectionRegistry::new();
        let mut targets = OneStream::new(1000);
        let mut server = Metrics::new();

        targets.available = false;
        assert_eq!(
            registry.admit(ClientId(1), target(), &mut targets, &mut server, &Limits::default()),
            Err(AdmissionError::Disabled)
        );

        let missing = HandoffTarget::stream("other", 0);
        assert_eq!(
            registry.admit(ClientId(1), missing, &mut targets, &mut server, &Limits::default()),
            Err(AdmissionError::Disabled)
        );
        assert!(registry.is_empty());
        assert_eq!(server, Metrics::new());
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let mut targets = OneStream::new(600_000);
        let mut server = Metrics::new();

        registry
            .admit(ClientId(1), target(), &mut targets, &mut server, &Limits::default())
            .unwrap();
        let (socket, _output, mut closed) = socket();
        registry.attach_socket(ClientId(1), socket, &mut targets, &mut server);
        assert_eq!(*targets.sink.added.lock().unwrap(), vec![ClientId(1)]);

        assert!(registry.teardown(ClientId(1), &mut targets, &mut server));
        assert!(!registry.teardown(ClientId(1), &mut targets, &mut server));

        assert_eq!(server.n_clients, 0);
        assert_eq!(server.bitrate, 0);
        assert_eq!(targets.stream.n_clients, 0);
        assert_eq!(targets.program.bitrate, 0);
        assert_eq!(*targets.sink.removed.lock().unwrap(), vec![ClientId(1)]);
        assert!(closed.try_recv().is_ok());
    }

    #[test]
    fn test_socket_for_unknown_client_is_closed() {
        let mut registry = ConnectionRegistry::new();
        let mut targets = OneStream::new(1000);
        let mut server = Metrics::new();

        let (socket, _output, mut closed) = socket();
        registry.attach_socket(ClientId(9), socket, &mut targets, &mut server);

        assert!(closed.try_recv().is_ok());
        assert!(targets.sink.added.lock().unwrap().is_empty());
    }

    #[test]
    fn test_refused_socket_tears_down() {
        let mut registry = ConnectionRegistry::new();
        let mut targets = OneStream::new(1000);
        targets.sink = Arc::new(RecordingSink {
            refuse: true,
            ..Default::default()
        });
        let mut server = Metrics::new();

        registry
            .admit(ClientId(1), target(), &mut targets, &mut server, &Limits::default())
            .unwrap();
        let (socket, _output, mut closed) = socket();
        registry.attach_socket(ClientId(1), socket, &mut targets, &mut server);

        assert!(registry.is_empty());
        assert_eq!(server.n_clients, 0);
        assert!(closed.try_recv().is_ok());
    }

    #[test]
    fn test_disconnect_before_headers() {
        let mut registry = ConnectionRegistry::new();
        let mut targets = OneStream::new(1000);
        let mut server = Metrics::new();

        registry
            .admit(ClientId(1), target(), &mut targets, &mut server, &Limits::default())
            .unwrap();
        // Peer leaves before the socket is handed over
        assert!(registry.teardown(ClientId(1), &mut targets, &mut server));
        assert_eq!(server.n_clients, 0);

        // Late headers-written for the same client just closes the socket
        let (socket, _output, mut closed) = socket();
        registry.attach_socket(ClientId(1), socket, &mut targets, &mut server);
        assert!(closed.try_recv().is_ok());
        assert_eq!(server.n_clients, 0);
    }

    #[test]
    fn test_teardown_program() {
        let mut registry = ConnectionRegistry::new();
        let mut targets = OneStream::new(1000);
        let mut server = Metrics::new();

        for id in 1..=3 {
            registry
                .admit(ClientId(id), target(), &mut targets, &mut server, &Limits::default())
                .unwrap();
        }

        assert_eq!(registry.teardown_program("other", &mut targets, &mut server), 0);
        assert_eq!(registry.teardown_program("live", &mut targets, &mut server), 3);
        assert!(registry.is_empty());
        assert_eq!(server.n_clients, 0);
        assert_eq!(targets.program.n_clients, 0);
        assert_eq!(targets.program.total_clients, 3);
    }
}
