use crate::api::{self, state::ServerConfig};
use crate::ports::PortSpec;
use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub ports: PortSpec,
    pub data_dir: PathBuf,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start or binds no port.
pub async fn execute(args: Args) -> Result<()> {
    info!(
        "Starting with data dir {} and ports {:?}",
        args.data_dir.display(),
        args.ports
    );
    let config = ServerConfig::new(args.data_dir, args.ports);
    api::serve(config).await
}
