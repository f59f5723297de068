//! # Turnstile Terminal Entry Point
//!
//! Runs the terminal headless: loads config, opens the ledger database,
//! starts sync and waits for Ctrl-C.
//!
//! ```text
//! turnstile-terminal [CONFIG_PATH]
//! ```

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    turnstile_terminal_lib::run().await
}
