use std::path::PathBuf;
use std::time::Duration;

use config::InspectorConfig;
use error::ResultOkWarnExt;
use session::{Inspector, RunOptions, TargetImage};

/// Creo Inspector: runs a target image inside an instrumented container and lets the
/// in-container sensor observe what the application does.
///
/// The library launches the container with the sensor as its entrypoint, drives the
/// sensor over a command and an event channel, tears the container down, and hands the
/// collected artifacts to profile generators.
pub mod config;
pub mod container;
pub mod error;
pub mod fsutil;
pub mod ipc;
pub mod launcher;
pub mod overrides;
pub mod postprocess;
pub mod runtime;
pub mod session;
pub mod teardown;

#[cfg(test)]
mod testutil;

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Runs one inspection of the image named by `CREO_TARGET_IMAGE`.
///
/// Monitors the application until `CREO_MONITOR_DURATION_SECS` elapsed or Ctrl-C was
/// pressed, then finishes monitoring and removes the container. The container is torn
/// down even if starting the monitoring failed.
///
/// # Errors
///
/// Possible errors include:
/// - Missing or invalid environment variables.
/// - Failure to connect to Docker or to inspect the target image.
/// - Failure to create the artifacts directory.
/// - Failure to launch the container or to start monitoring.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = InspectorConfig::from_env()?;
    let image_ref = std::env::var("CREO_TARGET_IMAGE")
        .map_err(|_| "environment variable `CREO_TARGET_IMAGE` must be set")?;
    let state_path = std::env::var_os("CREO_STATE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("creo-inspector"));
    let duration = match std::env::var("CREO_MONITOR_DURATION_SECS") {
        Ok(secs) => Some(Duration::from_secs(secs.trim().parse().map_err(|_| {
            format!("invalid `CREO_MONITOR_DURATION_SECS` value `{secs}`")
        })?)),
        Err(_) => None,
    };
    log::debug!("Config: {config:?}");

    let runtime = runtime::DockerRuntime::connect()?;
    let defaults = runtime.image_defaults(&image_ref).await?;
    let artifact_location = fsutil::prepare_artifacts_dir(&state_path)?;
    log::debug!("Artifact location: {}", artifact_location.display());

    let image = TargetImage {
        profile_names: postprocess::ProfileNames::for_image(&image_ref),
        image_ref,
        defaults,
        artifact_location,
    };
    let options = RunOptions {
        local_volume_path: state_path,
        show_container_logs: env_flag("CREO_SHOW_CONTAINER_LOGS"),
        debug: env_flag("CREO_DEBUG"),
        ..Default::default()
    };
    let mut inspector = Inspector::new(
        config,
        runtime,
        ipc::TcpTransport::default(),
        image,
        options,
    );

    let started = inspector.run_container().await;
    for warning in inspector.launch_warnings() {
        log::warn!("launch: {warning}");
    }
    match &started {
        Ok(()) => {
            wait_for_stop(duration).await;
            match inspector.finish_monitoring().await {
                Ok(report) => {
                    for warning in report.warnings() {
                        log::warn!("finish monitoring: {warning}");
                    }
                }
                Err(err) => log::error!("failed to finish monitoring: {err}"),
            }
        }
        Err(err) => log::error!("failed to start monitoring: {err}"),
    }

    let teardown = inspector.shutdown_container().await;
    for warning in teardown.warnings() {
        log::warn!("teardown: {warning}");
    }
    started?;

    if inspector.has_collected_data() {
        log::info!(
            "collected data => {}",
            inspector.artifact_location().display()
        );
    } else {
        log::warn!("sensor did not leave a report, no data was collected");
    }

    Ok(())
}

async fn wait_for_stop(duration: Option<Duration>) {
    match duration {
        Some(duration) => {
            log::info!("monitoring for {duration:?}, press Ctrl-C to stop early");
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            log::info!("monitoring, press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .ok_warn("failed to listen for Ctrl-C");
        }
    }
}
