//! Launches the instrumented copy of the target container.
//!
//! Launching happens in two phases: a [`LaunchSpecBuilder`] validates the inputs into an
//! immutable [`LaunchSpec`] without touching the runtime, then [`launch`] drives
//! create → start → inspect against a [`ContainerRuntime`] and checks that the sensor
//! comms ports were published.
mod error;
mod spec;

pub use error::{Error, Result};
pub use spec::{LaunchSpec, LaunchSpecBuilder, SENSOR_CAPABILITY, TYPE_LABEL};

use crate::container::ContainerHandle;
use crate::runtime::ContainerRuntime;

/// Creates, starts, and inspects the container described by `spec`.
///
/// The handle is stored in `handle` as soon as the runtime created the container, so a
/// container that failed to start or validate can still be torn down by the caller.
/// On success the handle also carries the inspected state.
///
/// # Errors
///
/// * [`Error::Runtime`] if any runtime call fails; the error is passed through as is.
/// * [`Error::Comms`] if the inspected container has no network info or publishes fewer
///   ports than there are reserved sensor ports. Retrying cannot fix either.
pub async fn launch<R: ContainerRuntime>(
    runtime: &R,
    spec: &LaunchSpec,
    handle: &mut Option<ContainerHandle>,
) -> Result<()> {
    let id = runtime.create_container(spec).await?;
    log::info!("created container => {id} ({})", spec.name());
    let handle = handle.insert(ContainerHandle::new(id.clone(), spec.name().clone()));

    runtime.start_container(&id).await?;
    log::debug!("started container => {id}");

    let state = runtime.inspect_container(&id).await?;
    handle.set_state(state);
    let network = handle
        .state()
        .ok_or(crate::container::Error::NotInspected)
        .and_then(|state| state.comms_network(spec.reserved_ports()))
        .map_err(|source| Error::Comms {
            id: id.clone(),
            source,
        })?;
    log::debug!("container network ports => {:?}", network.ports);

    Ok(())
}
