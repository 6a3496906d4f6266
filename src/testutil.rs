//! Scripted fakes of the runtime and the sensor transport.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Port;
use crate::container::{ContainerID, ContainerState, HostBinding, NetworkState};
use crate::ipc::{
    self, Command, Endpoints, Event, Response, ResponseStatus, SensorChannels, Transport,
};
use crate::launcher::LaunchSpec;
use crate::runtime::{self, ContainerLogs, ContainerRuntime, Operation, StopOutcome};

pub const FAKE_CONTAINER_ID: &str = "c0ffee";

/// A running container publishing the given `(container port, host port)` tcp pairs.
pub fn running_state(ports: &[(u16, u16)]) -> ContainerState {
    ContainerState {
        running: true,
        network: Some(NetworkState {
            ip_address: Some("172.17.0.2".to_owned()),
            ports: ports
                .iter()
                .map(|(container, host)| {
                    (
                        Port::tcp(*container),
                        vec![HostBinding {
                            host_ip: Some("0.0.0.0".to_owned()),
                            host_port: *host,
                        }],
                    )
                })
                .collect(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeCall {
    Create,
    Start,
    Inspect,
    Stop,
    Remove,
    Logs,
}

impl RuntimeCall {
    fn operation(self) -> Operation {
        match self {
            RuntimeCall::Create => Operation::Create,
            RuntimeCall::Start => Operation::Start,
            RuntimeCall::Inspect => Operation::Inspect,
            RuntimeCall::Stop => Operation::Stop,
            RuntimeCall::Remove => Operation::Remove,
            RuntimeCall::Logs => Operation::Logs,
        }
    }
}

#[derive(Debug)]
struct RuntimeScript {
    calls: Vec<RuntimeCall>,
    failing: HashSet<RuntimeCall>,
    state: ContainerState,
    stop_outcome: StopOutcome,
    created: Option<LaunchSpec>,
}

/// In-memory [`ContainerRuntime`] that records every call.
#[derive(Debug)]
pub struct FakeRuntime {
    script: Mutex<RuntimeScript>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::with_state(running_state(&[(65501, 40001), (65502, 40002)]))
    }
}

impl FakeRuntime {
    pub fn with_state(state: ContainerState) -> Self {
        Self {
            script: Mutex::new(RuntimeScript {
                calls: Vec::new(),
                failing: HashSet::new(),
                state,
                stop_outcome: StopOutcome::Stopped,
                created: None,
            }),
        }
    }

    pub fn fail_on(&self, call: RuntimeCall) {
        self.script.lock().unwrap().failing.insert(call);
    }

    pub fn stop_reports(&self, outcome: StopOutcome) {
        self.script.lock().unwrap().stop_outcome = outcome;
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: RuntimeCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn created_spec(&self) -> Option<LaunchSpec> {
        self.script.lock().unwrap().created.clone()
    }

    fn record(&self, call: RuntimeCall) -> runtime::Result<()> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(call);
        if script.failing.contains(&call) {
            return Err(runtime::Error::api(
                call.operation(),
                FAKE_CONTAINER_ID,
                std::io::Error::other("injected failure"),
            ));
        }
        Ok(())
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn create_container(&self, spec: &LaunchSpec) -> runtime::Result<ContainerID> {
        self.record(RuntimeCall::Create)?;
        self.script.lock().unwrap().created = Some(spec.clone());
        Ok(ContainerID::new(FAKE_CONTAINER_ID)?)
    }

    async fn start_container(&self, _id: &ContainerID) -> runtime::Result<()> {
        self.record(RuntimeCall::Start)
    }

    async fn inspect_container(&self, _id: &ContainerID) -> runtime::Result<ContainerState> {
        self.record(RuntimeCall::Inspect)?;
        Ok(self.script.lock().unwrap().state.clone())
    }

    async fn stop_container(
        &self,
        _id: &ContainerID,
        _grace_period: Duration,
    ) -> runtime::Result<StopOutcome> {
        self.record(RuntimeCall::Stop)?;
        Ok(self.script.lock().unwrap().stop_outcome)
    }

    async fn remove_container(&self, _id: &ContainerID) -> runtime::Result<()> {
        self.record(RuntimeCall::Remove)
    }

    async fn container_logs(&self, _id: &ContainerID) -> runtime::Result<ContainerLogs> {
        self.record(RuntimeCall::Logs)?;
        Ok(ContainerLogs {
            stdout: b"app started\n".to_vec(),
            stderr: Vec::new(),
        })
    }
}

/// How the fake sensor answers a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Reject,
    Fail,
    Hang,
}

/// What the fake sensor publishes on the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScript {
    Done,
    Fail,
    Hang,
}

#[derive(Debug, Clone, Default)]
pub struct TransportLog {
    pub opened: usize,
    pub closed: usize,
    pub sent: Vec<Command>,
}

impl TransportLog {
    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent.iter().map(Command::name).collect()
    }
}

#[derive(Debug)]
struct TransportScript {
    replies: HashMap<&'static str, Reply>,
    event: EventScript,
    fail_open: bool,
    log: TransportLog,
}

impl Default for TransportScript {
    fn default() -> Self {
        Self {
            replies: HashMap::new(),
            event: EventScript::Done,
            fail_open: false,
            log: TransportLog::default(),
        }
    }
}

/// In-memory sensor transport; every opened channel shares the same script.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    script: Arc<Mutex<TransportScript>>,
}

impl FakeTransport {
    pub fn reply_to(&self, command: &'static str, reply: Reply) {
        self.script.lock().unwrap().replies.insert(command, reply);
    }

    pub fn set_event(&self, event: EventScript) {
        self.script.lock().unwrap().event = event;
    }

    pub fn fail_open(&self) {
        self.script.lock().unwrap().fail_open = true;
    }

    pub fn log(&self) -> TransportLog {
        self.script.lock().unwrap().log.clone()
    }
}

fn injected() -> ipc::Error {
    ipc::Error::Disconnected {
        endpoint: "fake".to_owned(),
    }
}

impl Transport for FakeTransport {
    type Channels = FakeChannels;

    async fn open(&self, _endpoints: &Endpoints) -> ipc::Result<FakeChannels> {
        let mut script = self.script.lock().unwrap();
        if script.fail_open {
            return Err(injected());
        }
        script.log.opened += 1;
        Ok(FakeChannels {
            script: Arc::clone(&self.script),
        })
    }
}

#[derive(Debug)]
pub struct FakeChannels {
    script: Arc<Mutex<TransportScript>>,
}

impl SensorChannels for FakeChannels {
    async fn request(&mut self, command: &Command) -> ipc::Result<Response> {
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.log.sent.push(command.clone());
            script
                .replies
                .get(command.name())
                .copied()
                .unwrap_or(Reply::Ok)
        };
        match reply {
            Reply::Ok => Ok(Response::ok()),
            Reply::Reject => Ok(Response {
                status: ResponseStatus::Error,
            }),
            Reply::Fail => Err(injected()),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn next_event(&mut self) -> ipc::Result<Event> {
        let event = self.script.lock().unwrap().event;
        match event {
            EventScript::Done => Ok(Event::Done),
            EventScript::Fail => Err(injected()),
            EventScript::Hang => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.script.lock().unwrap().log.closed += 1;
    }
}
