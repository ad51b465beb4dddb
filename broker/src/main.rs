//! Thin entry point; all sequencing lives in [`broker::cli::run`].

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    match broker::cli::run().await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            eprintln!("broker fatal error: {e:#}");
            Err(e)
        }
    }
}
