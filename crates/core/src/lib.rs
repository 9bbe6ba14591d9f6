//! # gapir-core
//!
//! Shared primitives used by every other crate in the workspace: the
//! configuration surface the daemon is started with, the notification
//! severity enum that rides in the wire protocol, and a constant-time
//! comparison used to authenticate incoming sessions.
//!
//! Nothing in this crate talks to the network, the arena or the
//! interpreter; it exists so those crates do not each reinvent error
//! plumbing and configuration parsing.

pub mod auth;
pub mod config;
pub mod error;
pub mod resource;
pub mod severity;

pub use auth::token_eq;
pub use config::DaemonConfig;
pub use error::{CoreError, CoreResult};
pub use resource::Resource;
pub use severity::Severity;
