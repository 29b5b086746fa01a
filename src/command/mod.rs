//! Shared helpers and types for all installer actions.

pub mod artifact;
pub mod config;
pub mod desktop;
pub mod download;
pub mod inventory;
pub mod progress;
pub mod prompt;
pub mod reconcile;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::{Context, Result, anyhow};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// ---------- batch outcomes ----------

/// Aggregate result of a batch of file operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub errors: Vec<(PathBuf, String)>,
}

impl ActionOutcome {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn record(&mut self, path: &Path, result: Result<()>) {
        if let Err(err) = result {
            tracing::debug!(path = %path.display(), error = %format!("{err:#}"), "file operation failed");
            self.errors.push((path.to_path_buf(), format!("{err:#}")));
        }
    }

    pub fn merge(&mut self, other: ActionOutcome) {
        self.errors.extend(other.errors);
    }

    /// Multi-line `- path: reason` listing for warnings and fatal errors.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|(path, reason)| format!("- {}: {reason}", path.display()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success() {
            write!(f, "ok")
        } else {
            write!(f, "{} failure(s):\n{}", self.errors.len(), self.error_summary())
        }
    }
}

/// ---------- filesystem helpers ----------

/// Deletes a file; a missing file counts as already removed.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(anyhow!(err).context(format!("remove {}", path.display()))),
    }
}

pub fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

pub fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Adds the execute bits (0755 for files that had none).
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let mode = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .permissions()
            .mode();
        let mode = (mode | 0o755) & 0o7777;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("set executable {}", path.display()))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Replaces `path` with `content` through a sibling temp file, leaving it executable.
pub fn write_executable_atomically(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp = sibling_temp_path(path, "write");
    fs::write(&tmp, content).with_context(|| format!("write {}", tmp.display()))?;
    if let Err(err) = set_executable(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(anyhow!(err).context(format!(
            "replace {} with {}",
            path.display(),
            tmp.display()
        )));
    }
    Ok(())
}

pub fn sibling_temp_path(path: &Path, purpose: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{name}.tmp-{purpose}-{}", std::process::id()))
}

pub fn create_dir_all_with_context(path: &Path, label: &str) -> Result<()> {
    fs::create_dir_all(path).map_err(|err| {
        if err.kind() == io::ErrorKind::PermissionDenied {
            anyhow!(
                "permission denied creating {label} directory: {}",
                path.display()
            )
        } else {
            anyhow!(
                "failed to create {label} directory {}: {err}",
                path.display()
            )
        }
    })
}
