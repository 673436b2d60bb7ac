//! Root of the `sandbox-core` library: the transport-agnostic core of the
//! Sandbox Control Plane SDK (L0-L6). Everything here is async; the blocking
//! and cooperative public façades (the `sandbox-sync` and `sandbox` crates)
//! are thin wrappers over this crate's [`SandboxHandle`].

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through `tracing`.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod code_interpreter;
pub mod connection_config;
pub mod error;
pub mod filesystem;
pub mod flags;
pub mod handler;
pub mod lifecycle;
pub mod management;
pub mod process;
mod sandbox;
pub mod signing;
pub mod transport;
pub mod util;

pub use connection_config::ConnectionConfig;
pub use connection_config::ConnectionConfigBuilder;
pub use error::Result;
pub use error::SandboxError;
pub use error::get_error_message_ui;
pub use sandbox::SandboxHandle;
