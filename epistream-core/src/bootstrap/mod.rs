//! Bootstrap module for initializing the server
//!
//! This module handles:
//! - Configuration loading
//! - Cache selection
//! - Service initialization and dependency injection

pub mod config;
pub mod services;

pub use config::load_config;
pub use services::{build_services, init_cache, init_services, Services};
