pub mod api;
pub mod backoff;
pub mod config;
pub mod engine;
pub mod instance_status;
pub mod names;
pub mod project;
pub mod storage;

pub use engine::EngineType;
pub use instance_status::InstanceStatus;
pub use project::{Credentials, Project};
