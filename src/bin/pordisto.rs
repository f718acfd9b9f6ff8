use anyhow::Result;
use pordisto::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
