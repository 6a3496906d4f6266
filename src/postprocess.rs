//! Hands the collected artifacts to the security profile generators.
use std::fmt;
use std::path::Path;

use crate::fsutil;
use crate::runtime::BoxError;

/// Written by the sensor once collection completed.
pub const REPORT_FILE_NAME: &str = "creport.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    AppArmor,
    Seccomp,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProfileKind::AppArmor => "apparmor",
            ProfileKind::Seccomp => "seccomp",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to generate {kind} profile `{profile}`: {source}")]
pub struct Error {
    pub kind: ProfileKind,
    pub profile: String,
    #[source]
    pub source: BoxError,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Turns the artifacts under `artifact_location` into a profile named `profile_name`.
pub trait ProfileGenerator {
    fn generate(
        &self,
        artifact_location: &Path,
        profile_name: &str,
    ) -> std::result::Result<(), BoxError>;
}

impl<F> ProfileGenerator for F
where
    F: Fn(&Path, &str) -> std::result::Result<(), BoxError>,
{
    fn generate(
        &self,
        artifact_location: &Path,
        profile_name: &str,
    ) -> std::result::Result<(), BoxError> {
        self(artifact_location, profile_name)
    }
}

/// The generators run after a session, in the order they are listed here.
pub struct ProfileGenerators<'a> {
    pub apparmor: &'a dyn ProfileGenerator,
    pub seccomp: &'a dyn ProfileGenerator,
}

/// Target names of the generated profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileNames {
    pub apparmor: String,
    pub seccomp: String,
}

impl ProfileNames {
    /// Derives profile names from an image reference, e.g. `nginx:1.27` gives
    /// `nginx-1.27-apparmor-profile` and `nginx-1.27-seccomp.json`.
    pub fn for_image(image_ref: &str) -> Self {
        let base = image_ref
            .rsplit('/')
            .next()
            .unwrap_or(image_ref)
            .replace([':', '@'], "-");
        Self {
            apparmor: format!("{base}-apparmor-profile"),
            seccomp: format!("{base}-seccomp.json"),
        }
    }
}

pub fn has_collected_data(artifact_location: &Path) -> bool {
    fsutil::file_exists(artifact_location.join(REPORT_FILE_NAME))
}

/// Runs the AppArmor generator, then the seccomp generator.
///
/// # Errors
///
/// Returns the first generator failure; later generators are not run.
pub fn process_collected_data(
    artifact_location: &Path,
    names: &ProfileNames,
    generators: &ProfileGenerators<'_>,
) -> Result<()> {
    let ordered: [(ProfileKind, &dyn ProfileGenerator, &str); 2] = [
        (ProfileKind::AppArmor, generators.apparmor, &names.apparmor),
        (ProfileKind::Seccomp, generators.seccomp, &names.seccomp),
    ];
    for (kind, generator, profile) in ordered {
        log::info!("generating {kind} profile => {profile}");
        generator
            .generate(artifact_location, profile)
            .map_err(|source| Error {
                kind,
                profile: profile.to_owned(),
                source,
            })?;
    }

    Ok(())
}
