mod backup;
mod common;
mod database;
mod health;
mod project;
mod snapshot;
