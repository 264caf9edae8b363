pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::*;
pub use models::{
    ActionPlan, ActionPlanTemplate, HealthCheck, Incident, StateSnapshot, Task, TaskRequest,
    Worker, WorkerRegistration,
};
