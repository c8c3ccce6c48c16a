//! PlayReady protection for on-demand assets
//!
//! [`Protection`] renders the protection header embedded in manifests;
//! [`encrypt_samples`] encrypts the samples of a content fragment. Manifests
//! and initialization segments are never encrypted.

pub mod cipher;
pub mod playready;

pub use cipher::{encrypt_samples, fragment_iv};
pub use playready::{KeyId, Protection, PLAYREADY_SYSTEM_ID};
