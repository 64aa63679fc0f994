//! wadrunner - Manage game engines and data packages, and launch them as presets
//!
//! Engines are configured through layered settings (engine, template, global).
//! Every distinct engine + base package + additional packages combination is saved
//! once as a preset, identified by a fingerprint of the combination.

pub mod cli;
pub mod config;
pub mod core;
pub mod persistence;

/// Application name constant
pub const APP_NAME: &str = "wadrunner";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
