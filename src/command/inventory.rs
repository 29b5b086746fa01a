//! Discovery of existing installations at well-known paths.

use super::config::{BUNDLE_FILE_NAME, InstallerConfig};
use std::{
    fmt,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallationKind {
    /// The AppImage itself; can be updated, and removing it removes its artifacts too.
    Bundle,
    /// Any other matched file, such as a launcher script.
    LauncherLink,
}

impl InstallationKind {
    pub fn classify(path: &Path) -> Self {
        let is_bundle = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == BUNDLE_FILE_NAME);
        if is_bundle {
            Self::Bundle
        } else {
            Self::LauncherLink
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Bundle => "AppImage",
            Self::LauncherLink => "launcher",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRecord {
    pub path: PathBuf,
    pub kind: InstallationKind,
    pub exists: bool,
}

impl InstallationRecord {
    pub fn is_bundle(&self) -> bool {
        self.kind == InstallationKind::Bundle
    }
}

impl fmt::Display for InstallationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.kind.label())
    }
}

/// Found installations, in candidate order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallationSet {
    records: Vec<InstallationRecord>,
}

impl InstallationSet {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, index: usize) -> Option<&InstallationRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstallationRecord> {
        self.records.iter()
    }

    /// `  1) path (kind)` lines for interactive selection.
    pub fn numbered_lines(&self) -> Vec<String> {
        self.records
            .iter()
            .enumerate()
            .map(|(idx, record)| format!("  {}) {record}", idx + 1))
            .collect()
    }
}

/// Checks every configured candidate for a regular file. Read-only.
pub fn scan(config: &InstallerConfig) -> InstallationSet {
    scan_paths(&config.candidates)
}

pub fn scan_paths(candidates: &[PathBuf]) -> InstallationSet {
    let mut records: Vec<InstallationRecord> = Vec::new();
    for path in candidates {
        if !path.is_file() || records.iter().any(|r| r.path == *path) {
            continue;
        }
        records.push(InstallationRecord {
            path: path.clone(),
            kind: InstallationKind::classify(path),
            exists: true,
        });
    }
    tracing::debug!(found = records.len(), "installation scan complete");
    InstallationSet { records }
}
