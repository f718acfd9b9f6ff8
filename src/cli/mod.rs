pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod telemetry;

use anyhow::Result;

/// Parse arguments, set up logging, and run the selected action.
///
/// # Errors
///
/// Returns an error if telemetry initialization fails, the arguments do
/// not form a valid action, or the action itself fails.
pub async fn run() -> Result<()> {
    let matches = commands::new().get_matches();

    let verbosity = matches
        .get_one::<u8>(commands::logging::ARG_VERBOSITY)
        .copied()
        .unwrap_or(0);
    telemetry::init(verbosity)?;

    dispatch::handler(&matches)?.execute().await
}
