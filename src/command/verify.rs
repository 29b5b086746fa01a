//! Post-install checks on the four required artifacts.

use super::{config::ArtifactSpec, is_executable_file};
use std::{
    fmt,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Bundle,
    Icon,
    DesktopEntry,
    Launcher,
}

impl Artifact {
    pub fn label(self) -> &'static str {
        match self {
            Self::Bundle => "AppImage",
            Self::Icon => "icon",
            Self::DesktopEntry => "desktop entry",
            Self::Launcher => "launcher",
        }
    }

    fn requires_exec(self) -> bool {
        self != Self::Icon
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    Missing,
    NotExecutable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCheck {
    pub artifact: Artifact,
    pub path: PathBuf,
    pub problem: Problem,
}

impl fmt::Display for FailedCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let problem = match self.problem {
            Problem::Missing => "missing",
            Problem::NotExecutable => "not executable",
        };
        write!(
            f,
            "{} {}: {problem}",
            self.artifact.label(),
            self.path.display()
        )
    }
}

/// Required artifacts of `spec`, in check order.
pub fn required_artifacts(spec: &ArtifactSpec) -> [(Artifact, &Path); 4] {
    [
        (Artifact::Bundle, spec.bundle.as_path()),
        (Artifact::Icon, spec.icon.as_path()),
        (Artifact::DesktopEntry, spec.desktop_entry.as_path()),
        (Artifact::Launcher, spec.launcher.as_path()),
    ]
}

/// Returns every failed check; empty means the installation is complete.
pub fn verify(spec: &ArtifactSpec) -> Vec<FailedCheck> {
    required_artifacts(spec)
        .into_iter()
        .filter_map(|(artifact, path)| {
            let problem = if !path.is_file() {
                Problem::Missing
            } else if artifact.requires_exec() && !is_executable_file(path) {
                Problem::NotExecutable
            } else {
                return None;
            };
            Some(FailedCheck {
                artifact,
                path: path.to_path_buf(),
                problem,
            })
        })
        .collect()
}
