//! CLI Adapter
//!
//! Command-line interface for the trade integrity service.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{
    import_signals, CliApp, Command, EvaluateCmd, ImportCmd, ImportRecord, ImportReport,
    RunBatchCmd, ServeCmd, StatusCmd,
};

use anyhow::Result;

/// Initialize the CLI application
pub fn init() -> CliApp {
    use clap::Parser;
    CliApp::parse()
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    commands::execute(app).await
}
