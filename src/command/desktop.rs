//! Best-effort desktop environment cache refresh.

use std::{
    ffi::OsStr,
    path::Path,
    process::{Command, Stdio},
};

/// Side effects on the desktop environment. Failures are never reported back.
pub trait DesktopIntegration {
    fn refresh_caches(&self, desktop_dir: &Path, icon_dir: &Path);
}

/// Runs `update-desktop-database` and `gtk-update-icon-cache` when they are installed.
pub struct SystemDesktop;

impl DesktopIntegration for SystemDesktop {
    fn refresh_caches(&self, desktop_dir: &Path, icon_dir: &Path) {
        run_quietly("update-desktop-database", &[desktop_dir.as_os_str()]);
        run_quietly(
            "gtk-update-icon-cache",
            &[OsStr::new("-f"), OsStr::new("-t"), icon_dir.as_os_str()],
        );
    }
}

fn run_quietly(program: &str, args: &[&OsStr]) {
    let result = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => tracing::debug!(program, "cache refreshed"),
        Ok(status) => tracing::debug!(program, %status, "cache refresh exited unsuccessfully"),
        Err(err) => tracing::debug!(program, error = %err, "cache refresh unavailable"),
    }
}
