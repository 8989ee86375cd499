//! Domain model module declarations.

pub mod agent;
pub mod ingest;
pub mod item;
pub mod lock;
pub mod task;
