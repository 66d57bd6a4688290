/// Marking the downloaded executable runnable.
use std::path::Path;
use tracing::info;

use htmc_ws_shared::errors::PermissionError;

/// Add the execute bits on Unix. No-op elsewhere.
#[cfg(unix)]
pub fn mark_executable(path: &Path) -> Result<(), PermissionError> {
    use std::os::unix::fs::PermissionsExt;

    let err = |source: std::io::Error| PermissionError {
        path: path.to_path_buf(),
        source,
    };
    let mut perms = std::fs::metadata(path).map_err(err)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms).map_err(err)?;

    info!("Marked {} as executable", path.display());
    Ok(())
}

#[cfg(not(unix))]
pub fn mark_executable(path: &Path) -> Result<(), PermissionError> {
    info!("{} needs no execute bit on this platform", path.display());
    Ok(())
}
