use std::io;
use std::path::{Path, PathBuf};

/// Name of the directory the sensor's artifacts are collected in.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Error that occurs when creating a directory fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to create directory `{path}`: {source}")]
pub struct CreateDirError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Creates `<local_volume_path>/artifacts` and returns its path.
///
/// # Errors
///
/// Returns a [`CreateDirError`] if the directory cannot be created.
///
/// # Example
/// ```no_run
/// # use creo_inspector::fsutil;
/// let artifacts = fsutil::prepare_artifacts_dir("/tmp/creo-inspector")?;
/// assert!(artifacts.ends_with("artifacts"));
/// # Ok::<(), fsutil::CreateDirError>(())
/// ```
pub fn prepare_artifacts_dir(
    local_volume_path: impl AsRef<Path>,
) -> Result<PathBuf, CreateDirError> {
    let path = local_volume_path.as_ref().join(ARTIFACTS_DIR);
    std::fs::create_dir_all(&path).map_err(|source| CreateDirError {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Returns true if `path` exists and is a regular file.
pub fn file_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_file()
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_prepare_artifacts_dir_success() {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        let path = prepare_artifacts_dir(tmp.path().join("state")).expect("should create dir");
        assert_eq!(path, tmp.path().join("state").join(ARTIFACTS_DIR));
        assert!(path.is_dir());

        // existing directories are fine
        prepare_artifacts_dir(tmp.path().join("state")).expect("should accept existing dir");
    }

    #[test]
    fn test_prepare_artifacts_dir_error() {
        let tmp = tempfile::NamedTempFile::new().expect("failed to create temp file");
        let err = prepare_artifacts_dir(tmp.path()).unwrap_err();
        assert_eq!(err.path, tmp.path().join(ARTIFACTS_DIR));
    }

    #[test]
    fn test_file_exists() {
        let tmp = tempfile::NamedTempFile::new().expect("failed to create temp file");
        assert!(file_exists(tmp.path()));
        assert!(!file_exists("/definitely/does/not/exist"));
        assert!(!file_exists(tmp.path().parent().unwrap()));
    }
}
