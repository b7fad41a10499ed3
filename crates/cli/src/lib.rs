//! The `gazette` server binary's building blocks
//!
//! - [`config`]: layered [`ServerConfig`](config::ServerConfig)
//! - [`args`]: command-line flags
//! - [`telemetry`]: tracing subscriber setup
//! - [`limiting`]: per-caller admission rate limiting
//! - [`routes`]: the axum handlers
//! - [`server`]: service wiring and graceful shutdown

pub mod args;
pub mod config;
pub mod limiting;
pub mod mailer;
pub mod routes;
pub mod server;
pub mod telemetry;

pub use args::Cli;
pub use config::{ConfigError, ServerConfig};
pub use server::Server;
