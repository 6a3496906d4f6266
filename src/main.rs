/// Entry point for the Creo Inspector.
///
/// Launches the target image inside an instrumented container, monitors it until the
/// configured duration elapsed or Ctrl-C was pressed, and removes the container again.
///
/// # Errors
///
/// Returns an error if the run cannot be set up (e.g., missing environment variables,
/// an unreachable Docker daemon, or a container whose sensor cannot be reached).
///
/// # Examples
///
/// ```bash
/// CREO_TARGET_IMAGE=nginx:1.27 CREO_MONITOR_DURATION_SECS=60 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    creo_inspector::run().await
}
