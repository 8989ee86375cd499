//! Local IPC layer for `workqueue-ctl`.
//!
//! A named pipe (Windows) or Unix domain socket (Linux/macOS) accepting
//! JSON-line operator commands.

pub mod server;
