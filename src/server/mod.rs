//! Server module for Shellcord
//!
//! Contains the bot initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Application configuration structures
//! - `loader`: Configuration loading from files and environment
//! - `init`: Store, engine and Discord wiring plus the run loop

pub mod config;
mod init;
mod loader;

// Re-export public API
pub use init::run;
pub use loader::load_config;
