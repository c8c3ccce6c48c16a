//! HTTP-facing server core
//!
//! ```text
//!   Request ──► Server::dispatch ──► ResourceRegistry::resolve
//!                    │                     │
//!                    │  onetime path?      ▼
//!                    └──► OnetimeResources  access checks (UI, HTTPS_ONLY, ADMIN)
//!                                           │ ETag / HTTP_ONLY redirect
//!                                           ▼
//!                                       Handler ──► Response
//!
//!   Event (Http | Pipeline | Sink | Upstream | Tick) ──► Server::handle_event
//!                                                            └──► deferred lifecycle work
//! ```
//!
//! Handlers never start or stop programs in place; transitions they cause are
//! queued and run once the current request or event has been handled.

pub mod config;
pub mod engine;
mod dispatch;
pub mod events;
pub mod http;
pub mod log;
pub mod onetime;
pub mod resource;
pub mod routes;

pub use self::engine::Server;
pub use config::ServerConfig;
pub use events::{Event, EventReceiver, EventSender};
pub use http::{Body, HttpEvent, IngestMode, Request, Response};
pub use log::MessageLog;
pub use resource::{Handler, Resource, ResourceFlags, ResourceOwner, ResourceRegistry};
