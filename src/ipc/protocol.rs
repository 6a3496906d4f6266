//! Messages exchanged with the sensor.
//!
//! Commands and events are JSON objects tagged by `name`; command payloads live under
//! `data`. Event names the inspector does not know decode to [`Event::Unknown`].
use std::collections::HashSet;

/// Payload of [`Command::StartMonitor`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StartMonitor {
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub app_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
}

impl StartMonitor {
    /// Builds the start command for the given target command line.
    ///
    /// The first token is the application, the rest are its arguments. Path sets are
    /// emitted sorted so the wire output is deterministic. Returns `None` if the command
    /// line is empty.
    pub fn new(
        fat_container_cmd: &[String],
        exclude_paths: &HashSet<String>,
        include_paths: &HashSet<String>,
    ) -> Option<Self> {
        let (app_name, app_args) = fat_container_cmd.split_first()?;

        Some(Self {
            app_name: app_name.clone(),
            app_args: app_args.to_vec(),
            excludes: sorted_keys(exclude_paths),
            includes: sorted_keys(include_paths),
        })
    }
}

fn sorted_keys(paths: &HashSet<String>) -> Vec<String> {
    let mut keys: Vec<String> = paths.iter().cloned().collect();
    keys.sort_unstable();
    keys
}

/// Commands the inspector sends to the sensor.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum Command {
    #[serde(rename = "cmd.monitor.start")]
    StartMonitor(StartMonitor),
    #[serde(rename = "cmd.monitor.stop")]
    StopMonitor,
    #[serde(rename = "cmd.sensor.shutdown")]
    ShutdownSensor,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartMonitor(_) => "cmd.monitor.start",
            Command::StopMonitor => "cmd.monitor.stop",
            Command::ShutdownSensor => "cmd.sensor.shutdown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// The sensor's answer to a command.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: ResponseStatus::Ok,
        }
    }
}

/// Notifications published by the sensor.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "name")]
pub enum Event {
    /// The sensor finished its work and wrote its artifacts.
    #[serde(rename = "event.monitor.done")]
    Done,
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_start_monitor_splits_command() {
        let cmd = StartMonitor::new(
            &strings(&["/bin/app", "--flag", "-v"]),
            &HashSet::new(),
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(cmd.app_name, "/bin/app");
        assert_eq!(cmd.app_args, strings(&["--flag", "-v"]));
        assert!(cmd.excludes.is_empty());
        assert!(cmd.includes.is_empty());

        assert!(StartMonitor::new(&[], &HashSet::new(), &HashSet::new()).is_none());
    }

    #[test]
    fn test_start_monitor_sorts_paths() {
        let excludes: HashSet<String> =
            ["/var/log", "/tmp"].iter().map(|p| p.to_string()).collect();
        let cmd = StartMonitor::new(&strings(&["/bin/app"]), &excludes, &HashSet::new()).unwrap();

        assert_eq!(cmd.excludes, strings(&["/tmp", "/var/log"]));
        assert!(cmd.includes.is_empty());

        let json = serde_json::to_value(Command::StartMonitor(cmd)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "cmd.monitor.start",
                "data": {"app_name": "/bin/app", "excludes": ["/tmp", "/var/log"]}
            })
        );
    }

    #[test]
    fn test_command_encoding() {
        assert_eq!(
            serde_json::to_string(&Command::StopMonitor).unwrap(),
            r#"{"name":"cmd.monitor.stop"}"#
        );
        assert_eq!(
            serde_json::to_string(&Command::ShutdownSensor).unwrap(),
            r#"{"name":"cmd.sensor.shutdown"}"#
        );
        assert_eq!(Command::ShutdownSensor.name(), "cmd.sensor.shutdown");
    }

    #[test]
    fn test_event_decoding() {
        let done: Event = serde_json::from_str(r#"{"name":"event.monitor.done"}"#).unwrap();
        assert_eq!(done, Event::Done);

        let future: Event = serde_json::from_str(r#"{"name":"event.monitor.progress"}"#).unwrap();
        assert_eq!(future, Event::Unknown);
    }

    #[test]
    fn test_response_decoding() {
        let response: Response = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(Response::ok().status, ResponseStatus::Ok);
    }
}
