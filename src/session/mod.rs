//! Administrative sessions
//!
//! Tracks sessions that unlock admin-only resources. A session is identified
//! by a random id carried in the `session_id` query parameter.

pub mod store;

pub use store::{Session, SessionStore};
