//! CLI command implementations

pub mod backup;
pub mod db;
pub mod project;
pub mod snapshot;
