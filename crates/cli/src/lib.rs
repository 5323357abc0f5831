//! Command-line entry points for invoicing, data checks and migrations.

pub mod commands;
pub mod config;
