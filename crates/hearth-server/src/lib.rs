//! Hearth chat server
//!
//! Accepts framed CHAT connections over TCP, runs each one through the
//! decrypt → dispatch → encrypt pipeline, and pushes stored messages out
//! to connected chat participants. A UDP multicast broadcaster announces
//! the server on the LAN.

#![forbid(unsafe_code)]

pub mod config;
pub mod connection;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod rate_limit;
pub mod registry;
pub mod server;
pub mod services;
pub mod session;

pub use config::ServerConfig;
pub use error::ServiceError;
pub use server::ChatServer;
