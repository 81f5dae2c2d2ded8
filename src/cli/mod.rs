//! CLI module for planrelay.
//!
//! This module provides the command-line interface for the notify
//! pipeline and the webhook reconciler.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, PlanArgs, RunArgs};
pub use output::OutputFormatter;
