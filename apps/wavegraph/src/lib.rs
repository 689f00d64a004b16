//! # wavegraph (application library)
//!
//! The interface layer over `wavegraph-core`: the axum HTTP/WebSocket
//! server and the clap CLI. Exposed as a library so integration tests can
//! drive the router without binding a port.

pub mod api;
pub mod cli;
pub mod config;
