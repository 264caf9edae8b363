pub mod action_plans;
pub mod health;
pub mod health_checks;
pub mod incidents;
pub mod system;
pub mod tasks;
pub mod workers;
