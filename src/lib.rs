pub mod capability;
pub mod commands;
pub mod config;
pub mod error;
pub mod fs;
pub mod health;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod resilience;
pub mod store;
