//! HTTP surface for the forum identity and session core.
//!
//! The binary in `main.rs` wires configuration, logging, metrics and the
//! session GC around [`api::create_router`].

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
