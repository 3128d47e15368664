//! Transport-only client for an OpenCode sidecar server.
//!
//! This crate owns the sidecar's HTTP wire contract (health, session
//! creation, per-session messages) and the shared server process lifecycle.
//! It knows nothing about prompts, tasks, or reply parsing; callers hand it a
//! prompt string and get the raw response body back.

pub mod client;
pub mod config;
pub mod error;
pub mod server;

pub use client::{CancellationSignal, OpencodeClient};
pub use config::OpencodeConfig;
pub use error::OpencodeApiError;
pub use server::SidecarServer;
