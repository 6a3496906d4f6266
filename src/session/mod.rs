//! The inspection session: one [`Inspector`] per run.
//!
//! The session moves strictly forward through [`SessionState`]: launch the instrumented
//! container, open the sensor channels, start monitoring, finish monitoring. Teardown is
//! available from any state and leaves the inspector without a container.
mod error;

pub use error::{Error, Result};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::InspectorConfig;
use crate::container::ContainerHandle;
use crate::fsutil::ARTIFACTS_DIR;
use crate::ipc::{self, Command, Event, ProtocolClient, StartMonitor, Transport};
use crate::launcher::{self, LaunchSpecBuilder};
use crate::overrides::{self, ContainerOverrides, ImageDefaults, VolumeMount};
use crate::postprocess::{self, ProfileGenerators, ProfileNames};
use crate::runtime::ContainerRuntime;
use crate::teardown::{self, TeardownOptions, TeardownReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Launched,
    ChannelsReady,
    Monitoring,
    Finishing,
    Finished,
    Failed,
}

/// The image under inspection, as reported by the image inspector.
#[derive(Debug, Clone)]
pub struct TargetImage {
    pub image_ref: String,
    pub defaults: ImageDefaults,
    pub artifact_location: PathBuf,
    pub profile_names: ProfileNames,
}

/// Per-run inputs of the inspector.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Local directory the artifacts directory is created in.
    pub local_volume_path: PathBuf,
    pub overrides: Option<ContainerOverrides>,
    pub volume_mounts: Vec<VolumeMount>,
    pub exclude_paths: HashSet<String>,
    pub include_paths: HashSet<String>,
    pub show_container_logs: bool,
    pub debug: bool,
}

/// Outcome of a best-effort command sent while finishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Acknowledged,
    TimedOut,
    Failed(String),
}

impl CommandOutcome {
    fn from_result(command: &Command, result: ipc::Result<ipc::Response>) -> Self {
        match result {
            Ok(_) => CommandOutcome::Acknowledged,
            Err(err) if err.is_timeout() => {
                log::warn!("no response to `{}`: {}", command.name(), err);
                CommandOutcome::TimedOut
            }
            Err(err) => {
                log::warn!("failed to send `{}`: {}", command.name(), err);
                CommandOutcome::Failed(err.to_string())
            }
        }
    }
}

/// Outcome of waiting for the sensor's terminal event.
///
/// [`EventOutcome::TimedOut`] means the sensor stayed silent for the whole wait window,
/// which may be a slow workload as well as a crashed sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Received(Event),
    TimedOut,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishReport {
    pub stop_monitor: CommandOutcome,
    pub event: EventOutcome,
    pub shutdown_sensor: CommandOutcome,
}

impl FinishReport {
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (name, outcome) in [
            ("stop monitor", &self.stop_monitor),
            ("shutdown sensor", &self.shutdown_sensor),
        ] {
            match outcome {
                CommandOutcome::Acknowledged => {}
                CommandOutcome::TimedOut => warnings.push(format!("{name}: timed out")),
                CommandOutcome::Failed(err) => warnings.push(format!("{name}: {err}")),
            }
        }
        match &self.event {
            EventOutcome::Received(_) => {}
            EventOutcome::TimedOut => warnings.push("sensor event: timed out".to_owned()),
            EventOutcome::Failed(err) => warnings.push(format!("sensor event: {err}")),
        }
        warnings
    }
}

/// Runs one inspection of a target image inside an instrumented container.
///
/// Not reusable: a finished or failed inspector only supports teardown and
/// post-processing.
pub struct Inspector<R, T: Transport> {
    config: InspectorConfig,
    runtime: R,
    transport: T,
    image: TargetImage,
    options: RunOptions,
    fat_container_cmd: Vec<String>,
    launch_warnings: Vec<String>,
    container: Option<ContainerHandle>,
    channels: Option<ProtocolClient<T::Channels>>,
    state: SessionState,
}

impl<R, T> Inspector<R, T>
where
    R: ContainerRuntime,
    T: Transport,
{
    pub fn new(
        config: InspectorConfig,
        runtime: R,
        transport: T,
        image: TargetImage,
        options: RunOptions,
    ) -> Self {
        let fat_container_cmd =
            overrides::resolve_fat_container_cmd(&image.defaults, options.overrides.as_ref());
        log::debug!("fat container cmd => {fat_container_cmd:?}");

        Self {
            config,
            runtime,
            transport,
            image,
            options,
            fat_container_cmd,
            launch_warnings: Vec::new(),
            container: None,
            channels: None,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn fat_container_cmd(&self) -> &[String] {
        &self.fat_container_cmd
    }

    pub fn container(&self) -> Option<&ContainerHandle> {
        self.container.as_ref()
    }

    pub fn launch_warnings(&self) -> &[String] {
        &self.launch_warnings
    }

    pub fn artifact_location(&self) -> &Path {
        &self.image.artifact_location
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!("session state {:?} => {:?}", self.state, next);
        self.state = next;
    }

    fn fail<E: Into<Error>>(&mut self, err: E) -> Error {
        self.transition(SessionState::Failed);
        err.into()
    }

    /// Builds the launch spec and launches the instrumented container.
    ///
    /// The container handle is kept even if launching fails half-way, so
    /// [`Inspector::shutdown_container`] can still remove it.
    pub async fn launch(&mut self) -> Result<()> {
        self.expect_state(SessionState::Idle)?;

        let mut builder = LaunchSpecBuilder::new(&self.config, self.image.image_ref.as_str());
        builder
            .set_volume_mounts(&self.options.volume_mounts)
            .set_artifacts_path(self.options.local_volume_path.join(ARTIFACTS_DIR))
            .set_debug(self.options.debug);
        if let Some(overrides) = &self.options.overrides {
            builder.set_overrides(overrides);
        }
        let spec = match builder.build() {
            Ok(spec) => spec,
            Err(err) => return Err(self.fail(err)),
        };
        self.launch_warnings = spec.warnings().to_vec();

        if let Err(err) = launcher::launch(&self.runtime, &spec, &mut self.container).await {
            return Err(self.fail(err));
        }
        self.transition(SessionState::Launched);

        Ok(())
    }

    /// Opens the command and event channels to the sensor of the launched container.
    pub async fn init_channels(&mut self) -> Result<()> {
        self.expect_state(SessionState::Launched)?;
        let Some(container) = &self.container else {
            return Err(self.fail(Error::NotLaunched));
        };

        match ipc::init_channels(&self.transport, container, &self.config).await {
            Ok(client) => {
                self.channels = Some(client);
                self.transition(SessionState::ChannelsReady);
                Ok(())
            }
            Err(err) => Err(self.fail(Error::Channels(err))),
        }
    }

    /// Tells the sensor to start the target application and observe it.
    pub async fn start_monitoring(&mut self) -> Result<()> {
        self.expect_state(SessionState::ChannelsReady)?;
        let Some(start) = StartMonitor::new(
            &self.fat_container_cmd,
            &self.options.exclude_paths,
            &self.options.include_paths,
        ) else {
            return Err(self.fail(Error::EmptyCommand));
        };
        let Some(channels) = self.channels.as_mut() else {
            return Err(self.fail(Error::Channels(ipc::Error::Closed)));
        };

        if let Err(err) = channels.send(&Command::StartMonitor(start)).await {
            return Err(self.fail(Error::StartMonitor(err)));
        }
        log::info!("monitoring {:?}", self.fat_container_cmd);
        self.transition(SessionState::Monitoring);

        Ok(())
    }

    /// Launches the container, opens the channels, and starts monitoring.
    pub async fn run_container(&mut self) -> Result<()> {
        self.launch().await?;
        self.init_channels().await?;
        self.start_monitoring().await
    }

    /// Stops monitoring, waits for the sensor to report back, and shuts the sensor down.
    ///
    /// Every step is attempted even if an earlier one failed or timed out;
    /// `ShutdownSensor` is sent exactly once. Failures end up in the returned report.
    pub async fn finish_monitoring(&mut self) -> Result<FinishReport> {
        self.expect_state(SessionState::Monitoring)?;
        self.transition(SessionState::Finishing);
        let Some(channels) = self.channels.as_mut() else {
            return Err(self.fail(Error::Channels(ipc::Error::Closed)));
        };

        let stop_monitor = CommandOutcome::from_result(
            &Command::StopMonitor,
            channels.send(&Command::StopMonitor).await,
        );

        let event = match channels.receive_event().await {
            Ok(event) => EventOutcome::Received(event),
            Err(err) if err.is_timeout() => {
                log::warn!("sensor did not report back, assuming it finished: {err}");
                EventOutcome::TimedOut
            }
            Err(err) => {
                log::warn!("failed to receive sensor event: {err}");
                EventOutcome::Failed(err.to_string())
            }
        };

        let shutdown_sensor = CommandOutcome::from_result(
            &Command::ShutdownSensor,
            channels.send(&Command::ShutdownSensor).await,
        );

        self.transition(SessionState::Finished);
        Ok(FinishReport {
            stop_monitor,
            event,
            shutdown_sensor,
        })
    }

    /// Tears down the channels and the container. Safe to call more than once.
    pub async fn shutdown_container(&mut self) -> TeardownReport {
        let container = self.container.take();
        let options = TeardownOptions {
            show_logs: self.options.show_container_logs,
            grace_period: self.config.stop_grace_period,
        };
        teardown::shutdown_container(
            &self.runtime,
            self.channels.as_mut(),
            container.as_ref(),
            options,
            &mut std::io::stdout(),
        )
        .await
    }

    /// Returns true if the sensor left its report in the artifact location.
    pub fn has_collected_data(&self) -> bool {
        postprocess::has_collected_data(&self.image.artifact_location)
    }

    /// Runs the profile generators over the collected artifacts.
    pub fn process_collected_data(&self, generators: &ProfileGenerators<'_>) -> Result<()> {
        postprocess::process_collected_data(
            &self.image.artifact_location,
            &self.image.profile_names,
            generators,
        )?;
        Ok(())
    }
}
