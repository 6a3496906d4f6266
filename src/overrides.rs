//! User overrides of the target image configuration and the resolution of the
//! command the sensor starts inside the instrumented container.
use std::collections::{BTreeSet, HashMap};

use crate::config::Port;

/// Entrypoint and cmd the target image defines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDefaults {
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
}

/// User-requested changes to how the target container runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerOverrides {
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    pub clear_entrypoint: bool,
    pub clear_cmd: bool,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub hostname: Option<String>,
    pub exposed_ports: BTreeSet<Port>,
    pub network: Option<String>,
    pub links: Vec<String>,
    /// `host:ip` pairs added to `/etc/hosts`.
    pub extra_hosts: Vec<String>,
    pub dns_servers: Vec<String>,
    pub dns_search_domains: Vec<String>,
}

/// A user-requested bind mount.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VolumeMount {
    pub source: String,
    pub destination: String,
    /// Mount options such as `ro` or `rw`; may be empty.
    pub options: String,
}

impl VolumeMount {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        options: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            options: options.into(),
        }
    }

    /// Renders the mount in the runtime's `source:destination[:options]` bind syntax.
    pub fn to_bind(&self) -> String {
        if self.options.is_empty() {
            format!("{}:{}", self.source, self.destination)
        } else {
            format!("{}:{}:{}", self.source, self.destination, self.options)
        }
    }
}

/// Resolves the full command line of the target application ("fat container" command).
///
/// Entrypoint and cmd are resolved independently: a non-empty override or an explicit
/// clear request wins over the image default, otherwise the image default is kept.
/// The result is the resolved entrypoint followed by the resolved cmd.
pub fn resolve_fat_container_cmd(
    image: &ImageDefaults,
    overrides: Option<&ContainerOverrides>,
) -> Vec<String> {
    let entrypoint = resolve_part(
        "entrypoint",
        &image.entrypoint,
        overrides.map(|o| (&o.entrypoint, o.clear_entrypoint)),
    );
    let cmd = resolve_part(
        "cmd",
        &image.cmd,
        overrides.map(|o| (&o.cmd, o.clear_cmd)),
    );

    entrypoint.iter().chain(cmd).cloned().collect()
}

fn resolve_part<'a>(
    what: &str,
    default: &'a [String],
    requested: Option<(&'a Vec<String>, bool)>,
) -> &'a [String] {
    match requested {
        Some((value, clear)) if !value.is_empty() || clear => {
            log::debug!("overriding {what} {default:?} => {value:?} (clear={clear})");
            value.as_slice()
        }
        _ => default,
    }
}
