//! Dispatch loop
//!
//! The [`Server`] is moved into one tokio task. Requests, events from
//! pipelines, sinks and upstream fetches, and the lifecycle timer are all
//! handled there, one at a time, so the server never needs a lock.
//!
//! # Example
//!
//! ```no_run
//! use fragcast::{Request, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> fragcast::Result<()> {
//!     let (handle, task) = fragcast::runtime::spawn(ServerConfig::default());
//!
//!     let response = handle.request(Request::get("/list")).await?;
//!     println!("{}", response.status);
//!
//!     handle.shutdown().await;
//!     let _ = task.await;
//!     Ok(())
//! }
//! ```

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::error::{Error, Result};
use crate::server::{events, Event, EventReceiver, EventSender, Request, Response, Server, ServerConfig};
use crate::stats::Metrics;

/// Closure run on the dispatch task with exclusive access to the server
pub type ServerCall = Box<dyn FnOnce(&mut Server) + Send>;

enum Command {
    Request {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    Call(ServerCall),
    Shutdown,
}

/// Cloneable handle to a running server task
#[derive(Clone)]
pub struct ServerHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: EventSender,
}

impl ServerHandle {
    /// Serve one request
    pub async fn request(&self, request: Request) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Request { request, reply })
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())
    }

    /// Deliver an event, e.g. connection lifecycle from the HTTP layer
    pub fn send_event(&self, event: Event) -> Result<()> {
        self.events.send(event).map_err(|_| stopped())
    }

    /// Sender for components that report into the dispatch loop
    pub fn event_sender(&self) -> EventSender {
        self.events.clone()
    }

    /// Run `f` on the dispatch task and return its result
    pub async fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Server) -> R + Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let call: ServerCall = Box::new(move |server| {
            let _ = reply.send(f(server));
        });
        self.commands.send(Command::Call(call)).map_err(|_| stopped())?;
        result.await.map_err(|_| stopped())
    }

    /// Append to the operational log
    pub async fn append_log(&self, program: Option<String>, message: String) -> Result<()> {
        self.call(move |server| server.append_log(program.as_deref(), &message))
            .await
    }

    /// Server-level client and bitrate counters
    pub async fn metrics(&self) -> Result<Metrics> {
        self.call(|server| server.metrics()).await
    }

    /// Stop every program and end the dispatch task
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        self.commands.closed().await;
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

fn stopped() -> Error {
    Error::Upstream("server task has stopped".into())
}

/// Spawn a server with the default collaborators
pub fn spawn(config: ServerConfig) -> (ServerHandle, JoinHandle<()>) {
    spawn_with(move |events| Server::new(config, events))
}

/// Spawn the server built by `build`. It receives the sender that pipelines
/// and sinks report on.
pub fn spawn_with<F>(build: F) -> (ServerHandle, JoinHandle<()>)
where
    F: FnOnce(EventSender) -> Server,
{
    let (events_tx, events_rx) = events::channel();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    let server = build(events_tx.clone());
    let task = tokio::spawn(run(server, commands_rx, events_rx));

    (
        ServerHandle {
            commands: commands_tx,
            events: events_tx,
        },
        task,
    )
}

async fn run(
    mut server: Server,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: EventReceiver,
) {
    let period = server.config().tick_interval;
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(tick = ?period, "Server task started");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Request { request, reply }) => {
                    let response = server.handle_request(request);
                    if reply.send(response).is_err() {
                        tracing::debug!("Requester went away before the response");
                    }
                }
                Some(Command::Call(call)) => {
                    call(&mut server);
                    server.run_deferred();
                }
                Some(Command::Shutdown) | None => break,
            },
            Some(event) = events.recv() => server.handle_event(event),
            _ = ticker.tick() => server.handle_event(Event::Tick),
        }
    }

    server.shutdown();
    commands.close();
    tracing::info!("Server task stopped");
}
