//! Core business logic module
//!
//! This module contains the core domain models, the workflow orchestrator,
//! and the backend gateway contract for the firmware rescue application.

pub mod config;
pub mod gateway;
pub mod identity;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod progress;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod orchestrator_test;


// Re-export commonly used types
pub use self::config::AppConfig;
pub use self::orchestrator::RescueCenter;
