//! Command-line interface for crmlink.

pub mod args;
pub mod commands;
