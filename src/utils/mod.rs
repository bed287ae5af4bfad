//! Utility modules and helper functions
//!
//! This module contains shared utilities and helper functions used across the application.

pub mod file_matching;
pub mod logging;

// Re-export commonly used utilities
pub use self::file_matching::*;
pub use self::logging::*;
