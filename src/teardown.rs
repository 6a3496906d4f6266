//! Ordered, best-effort teardown of the instrumented container.
//!
//! Every step runs regardless of how the previous one went. Failures are logged and
//! recorded in the returned [`TeardownReport`] instead of being returned as errors.
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use crate::container::{ContainerHandle, ContainerID};
use crate::ipc::{ProtocolClient, SensorChannels};
use crate::runtime::{ContainerLogs, ContainerRuntime, StopOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    ShutdownChannels,
    ShowLogs,
    StopContainer,
    RemoveContainer,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TeardownStep::ShutdownChannels => "shutdown channels",
            TeardownStep::ShowLogs => "show logs",
            TeardownStep::StopContainer => "stop container",
            TeardownStep::RemoveContainer => "remove container",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Ok,
    Info(String),
    Warning(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: TeardownStep,
    pub status: StepStatus,
}

/// Outcomes of the executed teardown steps, in execution order.
///
/// [`TeardownStep::ShowLogs`] appears a second time, after the stop step, when the
/// container had already exited and its logs were not requested before.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    outcomes: Vec<StepOutcome>,
}

impl TeardownReport {
    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    /// Returns the status of the last execution of `step`.
    pub fn status(&self, step: TeardownStep) -> Option<&StepStatus> {
        self.outcomes
            .iter()
            .rev()
            .find(|outcome| outcome.step == step)
            .map(|outcome| &outcome.status)
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match &outcome.status {
                StepStatus::Warning(msg) => Some(msg.as_str()),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, step: TeardownStep, status: StepStatus) {
        log::debug!("teardown step `{step}` => {status:?}");
        self.outcomes.push(StepOutcome { step, status });
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TeardownOptions {
    pub show_logs: bool,
    pub grace_period: Duration,
}

/// Shuts down the sensor channels, then stops and removes the container.
///
/// Steps without anything left to act on (channels already closed, no container) are
/// reported as [`StepStatus::Skipped`], which makes repeated teardowns harmless.
/// Container logs are written to `out`.
pub async fn shutdown_container<R, C, W>(
    runtime: &R,
    channels: Option<&mut ProtocolClient<C>>,
    container: Option<&ContainerHandle>,
    options: TeardownOptions,
    out: &mut W,
) -> TeardownReport
where
    R: ContainerRuntime,
    C: SensorChannels + Send,
    W: Write + Send,
{
    let mut report = TeardownReport::default();

    let status = match channels {
        Some(client) if !client.is_shut_down() => {
            client.shutdown().await;
            StepStatus::Ok
        }
        _ => StepStatus::Skipped,
    };
    report.record(TeardownStep::ShutdownChannels, status);

    let Some(container) = container else {
        log::debug!("no container to tear down");
        report.record(TeardownStep::ShowLogs, StepStatus::Skipped);
        report.record(TeardownStep::StopContainer, StepStatus::Skipped);
        report.record(TeardownStep::RemoveContainer, StepStatus::Skipped);
        return report;
    };
    let id = container.id();

    // A failed fetch is not retried after the stop.
    let logs_shown = options.show_logs;
    let status = if logs_shown {
        show_logs(runtime, id, out).await
    } else {
        StepStatus::Skipped
    };
    report.record(TeardownStep::ShowLogs, status);

    log::info!("stopping container => {id}");
    let status = match runtime.stop_container(id, options.grace_period).await {
        Ok(StopOutcome::Stopped) => {
            log::info!("stopped container => {id}");
            StepStatus::Ok
        }
        Ok(StopOutcome::NotRunning) => {
            log::info!("container {id} is not running");
            StepStatus::Info(format!("container `{id}` was not running"))
        }
        Err(err) => warning(TeardownStep::StopContainer, err),
    };
    let not_running = matches!(status, StepStatus::Info(_));
    report.record(TeardownStep::StopContainer, status);
    if not_running && !logs_shown {
        let status = show_logs(runtime, id, out).await;
        report.record(TeardownStep::ShowLogs, status);
    }

    log::info!("removing container => {id}");
    let status = match runtime.remove_container(id).await {
        Ok(()) => {
            log::info!("removed container => {id}");
            StepStatus::Ok
        }
        Err(err) => warning(TeardownStep::RemoveContainer, err),
    };
    report.record(TeardownStep::RemoveContainer, status);

    report
}

fn warning(step: TeardownStep, err: impl fmt::Display) -> StepStatus {
    log::warn!("teardown step `{step}` failed: {err}");
    StepStatus::Warning(format!("{step}: {err}"))
}

async fn show_logs<R, W>(runtime: &R, id: &ContainerID, out: &mut W) -> StepStatus
where
    R: ContainerRuntime,
    W: Write + Send,
{
    match runtime.container_logs(id).await {
        Ok(logs) => match write_logs(out, id, &logs) {
            Ok(()) => StepStatus::Ok,
            Err(err) => warning(TeardownStep::ShowLogs, err),
        },
        Err(err) => warning(TeardownStep::ShowLogs, err),
    }
}

fn write_logs(out: &mut impl Write, id: &ContainerID, logs: &ContainerLogs) -> io::Result<()> {
    writeln!(out, "creo-inspector: container {id} stdout:")?;
    out.write_all(&logs.stdout)?;
    writeln!(out, "creo-inspector: container {id} stderr:")?;
    out.write_all(&logs.stderr)?;
    writeln!(out, "creo-inspector: end of container logs =============")?;
    out.flush()
}
