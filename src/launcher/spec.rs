use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use crate::config::{InspectorConfig, Port};
use crate::container::ContainerName;
use crate::overrides::{ContainerOverrides, VolumeMount};

use super::{Error, Result};

/// Label key carrying the identifying label value.
pub const TYPE_LABEL: &str = "type";
/// Capability the sensor needs to observe the target process.
pub const SENSOR_CAPABILITY: &str = "SYS_ADMIN";

/// Everything the runtime needs to create the instrumented container.
///
/// Produced by [`LaunchSpecBuilder::build`] and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    name: ContainerName,
    image: String,
    entrypoint: Vec<String>,
    cmd: Vec<String>,
    env: Vec<String>,
    labels: HashMap<String, String>,
    hostname: Option<String>,
    binds: Vec<String>,
    exposed_ports: BTreeSet<Port>,
    reserved_ports: Vec<Port>,
    network_mode: Option<String>,
    links: Vec<String>,
    extra_hosts: Vec<String>,
    dns_servers: Vec<String>,
    dns_search_domains: Vec<String>,
    warnings: Vec<String>,
}

impl LaunchSpec {
    pub fn name(&self) -> &ContainerName {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Always the sensor binary; the target command is handed to the sensor later.
    pub fn entrypoint(&self) -> &[String] {
        &self.entrypoint
    }

    pub fn cmd(&self) -> &[String] {
        &self.cmd
    }

    pub fn env(&self) -> &[String] {
        &self.env
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn binds(&self) -> &[String] {
        &self.binds
    }

    pub fn exposed_ports(&self) -> &BTreeSet<Port> {
        &self.exposed_ports
    }

    pub fn reserved_ports(&self) -> &[Port] {
        &self.reserved_ports
    }

    pub fn publish_all_ports(&self) -> bool {
        true
    }

    pub fn privileged(&self) -> bool {
        true
    }

    pub fn cap_add(&self) -> &[&'static str] {
        &[SENSOR_CAPABILITY]
    }

    pub fn network_mode(&self) -> Option<&str> {
        self.network_mode.as_deref()
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn extra_hosts(&self) -> &[String] {
        &self.extra_hosts
    }

    pub fn dns_servers(&self) -> &[String] {
        &self.dns_servers
    }

    pub fn dns_search_domains(&self) -> &[String] {
        &self.dns_search_domains
    }

    /// Non-fatal problems noticed while building the spec, e.g. port collisions.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Collects the launch inputs and validates them into a [`LaunchSpec`].
#[derive(Debug)]
pub struct LaunchSpecBuilder {
    config: InspectorConfig,
    image: String,
    name: Option<ContainerName>,
    overrides: ContainerOverrides,
    volume_mounts: Vec<VolumeMount>,
    artifacts_path: Option<PathBuf>,
    debug: bool,
}

impl LaunchSpecBuilder {
    pub fn new(config: &InspectorConfig, image: impl Into<String>) -> Self {
        Self {
            config: config.clone(),
            image: image.into(),
            name: None,
            overrides: ContainerOverrides::default(),
            volume_mounts: Vec::new(),
            artifacts_path: None,
            debug: false,
        }
    }

    /// Uses a fixed container name instead of generating one.
    pub fn set_name(&mut self, name: ContainerName) -> &mut Self {
        self.name = Some(name);
        self
    }

    pub fn set_overrides(&mut self, overrides: &ContainerOverrides) -> &mut Self {
        self.overrides = overrides.clone();
        self
    }

    pub fn set_volume_mounts<'a>(
        &mut self,
        mounts: impl IntoIterator<Item = &'a VolumeMount>,
    ) -> &mut Self {
        self.volume_mounts = mounts.into_iter().cloned().collect();
        self
    }

    /// Sets the host directory the sensor writes its artifacts to.
    pub fn set_artifacts_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.artifacts_path = Some(path.into());
        self
    }

    /// Starts the sensor in debug mode.
    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    /// Validates the inputs and assembles the launch specification.
    ///
    /// # Errors
    ///
    /// * [`Error::MissingImage`] if the image reference is empty.
    /// * [`Error::MissingArtifactsPath`] if no artifacts path was set.
    /// * [`Error::InvalidVolumeMount`] if a user mount lacks a source or destination.
    pub fn build(self) -> Result<LaunchSpec> {
        if self.image.trim().is_empty() {
            return Err(Error::MissingImage);
        }
        let artifacts_path = self.artifacts_path.ok_or(Error::MissingArtifactsPath)?;

        let mut user_mounts = self.volume_mounts;
        user_mounts.sort();
        let mut binds = Vec::with_capacity(user_mounts.len() + 2);
        for mount in &user_mounts {
            if mount.source.is_empty() || mount.destination.is_empty() {
                return Err(Error::InvalidVolumeMount(mount.to_bind()));
            }
            binds.push(mount.to_bind());
        }
        binds.push(format!(
            "{}:{}",
            artifacts_path.display(),
            self.config.artifacts_mount_path
        ));
        binds.push(format!(
            "{}:{}:ro",
            self.config.sensor_bin_local.display(),
            self.config.sensor_bin_path
        ));

        let reserved_ports = self.config.reserved_ports().to_vec();
        let mut warnings = Vec::new();
        let mut exposed_ports = self.overrides.exposed_ports;
        for port in &reserved_ports {
            if !exposed_ports.insert(*port) {
                log::warn!("comms port conflict => {port}");
                warnings.push(format!(
                    "user-exposed port `{port}` collides with a reserved sensor port"
                ));
            }
        }
        log::debug!("exposed ports => {exposed_ports:?}");

        let mut labels = self.overrides.labels;
        labels.insert(TYPE_LABEL.to_owned(), self.config.label_value.clone());

        let network_mode = self.overrides.network.filter(|mode| !mode.is_empty());
        if let Some(ref mode) = network_mode {
            log::debug!("network mode => {mode}");
        }
        if !self.overrides.links.is_empty() {
            log::debug!("links => {:?}", self.overrides.links);
        }
        if !self.overrides.extra_hosts.is_empty() {
            log::debug!("extra hosts => {:?}", self.overrides.extra_hosts);
        }
        if !self.overrides.dns_servers.is_empty() {
            log::debug!("dns servers => {:?}", self.overrides.dns_servers);
        }
        if !self.overrides.dns_search_domains.is_empty() {
            log::debug!("dns search => {:?}", self.overrides.dns_search_domains);
        }

        let cmd = if self.debug {
            vec!["-d".to_owned()]
        } else {
            Vec::new()
        };

        Ok(LaunchSpec {
            name: self
                .name
                .unwrap_or_else(|| ContainerName::generate(&self.config.container_name_prefix)),
            image: self.image,
            entrypoint: vec![self.config.sensor_bin_path.clone()],
            cmd,
            env: self.overrides.env,
            labels,
            hostname: self.overrides.hostname.filter(|h| !h.is_empty()),
            binds,
            exposed_ports,
            reserved_ports,
            network_mode,
            links: self.overrides.links,
            extra_hosts: self.overrides.extra_hosts,
            dns_servers: self.overrides.dns_servers,
            dns_search_domains: self.overrides.dns_search_domains,
            warnings,
        })
    }
}
