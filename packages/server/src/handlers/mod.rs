pub mod backup;
pub mod database;
pub mod health;
pub mod project;
pub mod snapshot;
