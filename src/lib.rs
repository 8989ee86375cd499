#![forbid(unsafe_code)]

//! Work-queue coordination core: leases, versioned items, claims, handoff
//! routing, and ingestion over `SQLite`, exposed through an HTTP API and a
//! local operator socket.

pub mod clock;
pub mod config;
pub mod coordination;
pub mod errors;
pub mod http;
pub mod ipc;
pub mod models;
pub mod persistence;
pub mod state;
pub mod validation;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
