//! Trade Integrity - signal verification service
//!
//! Runs verification passes from the command line or behind the admin HTTP
//! server.

use anyhow::Result;

use trade_integrity::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (ADMIN_TOKEN and friends go here)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
