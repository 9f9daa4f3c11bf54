// Utilities
pub mod alias;
pub mod config;
pub mod error;
