//! Reconciliation engine: turns an action plus the on-disk state into file operations.

use super::{
    ActionOutcome,
    artifact::{write_desktop_entry, write_launcher_script},
    config::{ArtifactSpec, InstallerConfig},
    create_dir_all_with_context,
    desktop::DesktopIntegration,
    download::Downloader,
    inventory::{self, InstallationRecord, InstallationSet},
    is_executable_file, is_non_empty_file,
    prompt::{Confirmation, ConflictChoice, DecisionProvider, SelectionPurpose},
    remove_file_if_exists, set_executable,
    verify::{Artifact, FailedCheck, Problem, verify},
};
use anyhow::{Context, Result, anyhow, bail};
use std::{
    fs,
    path::{Path, PathBuf},
};

const BACKUP_SUFFIX: &str = ".backup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(ArtifactSpec),
    /// An existing bundle was updated in place; no fresh install followed.
    Updated(PathBuf),
    Cancelled,
    /// Installations were removed and the operator chose not to reinstall.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    NothingToRepair,
    Repaired(Vec<FailedCheck>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallOutcome {
    Declined,
    Removed(ActionOutcome),
}

enum Resolution {
    Proceed,
    Finish(InstallOutcome),
}

/// A file renamed aside while its replacement is put in place.
///
/// Dropping a handle that was neither committed nor restored restores it.
#[derive(Debug)]
pub struct BackupHandle {
    original: PathBuf,
    backup: PathBuf,
    armed: bool,
}

impl BackupHandle {
    pub fn backup_path_for(original: &Path) -> PathBuf {
        let mut name = original.as_os_str().to_os_string();
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    /// Renames `original` aside. `None` when there is nothing to back up.
    pub fn create(original: &Path) -> Result<Option<Self>> {
        if !original.exists() {
            return Ok(None);
        }
        let backup = Self::backup_path_for(original);
        fs::rename(original, &backup).with_context(|| {
            format!(
                "back up {} -> {}",
                original.display(),
                backup.display()
            )
        })?;
        Ok(Some(Self {
            original: original.to_path_buf(),
            backup,
            armed: true,
        }))
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Keeps the replacement and deletes the backup.
    pub fn commit(mut self) -> Result<()> {
        self.armed = false;
        remove_file_if_exists(&self.backup)
    }

    /// Puts the original back, discarding whatever is at the original path.
    pub fn restore(mut self) -> Result<()> {
        self.armed = false;
        self.restore_in_place()
    }

    fn restore_in_place(&self) -> Result<()> {
        remove_file_if_exists(&self.original)?;
        fs::rename(&self.backup, &self.original).with_context(|| {
            format!(
                "restore {} -> {}",
                self.backup.display(),
                self.original.display()
            )
        })
    }
}

impl Drop for BackupHandle {
    fn drop(&mut self) {
        if self.armed
            && let Err(err) = self.restore_in_place()
        {
            tracing::error!(error = %format!("{err:#}"), "restore of dropped backup failed");
        }
    }
}

pub struct Reconciler<'a> {
    config: &'a InstallerConfig,
    downloader: &'a Downloader<'a>,
    prompts: &'a mut dyn DecisionProvider,
    desktop: &'a dyn DesktopIntegration,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        config: &'a InstallerConfig,
        downloader: &'a Downloader<'a>,
        prompts: &'a mut dyn DecisionProvider,
        desktop: &'a dyn DesktopIntegration,
    ) -> Self {
        Self {
            config,
            downloader,
            prompts,
            desktop,
        }
    }

    pub fn install(&mut self) -> Result<InstallOutcome> {
        self.check_free_space(&self.config.app_dir)?;
        self.downloader
            .probe(&self.config.download.probe_url)
            .context("no network connectivity; check your connection and retry")?;

        let installations = inventory::scan(self.config);
        if !installations.is_empty()
            && let Resolution::Finish(outcome) = self.resolve_conflicts(&installations)?
        {
            return Ok(outcome);
        }

        let install_dir = self.prompts.install_dir(&self.config.app_dir)?;
        let sandbox = self.prompts.sandbox(self.config.sandbox)?;
        let spec = self.config.artifact_spec(&install_dir, sandbox);

        self.create_directories(&spec)?;
        println!("📥 Installing Cursor into {}", spec.install_dir.display());
        self.download_bundle(&spec.bundle)?;
        set_executable(&spec.bundle)?;
        if spec.icon.is_file() {
            tracing::debug!(path = %spec.icon.display(), "icon present; skipping download");
        } else {
            self.download_icon(&spec.icon)?;
        }
        write_desktop_entry(&spec)?;
        write_launcher_script(&spec)?;

        let failures = verify(&spec);
        if !failures.is_empty() {
            bail!(
                "installation verification failed:\n{}\nrun `cursor-installer --repair` to fix it",
                render_failures(&failures)
            );
        }
        self.refresh_caches();
        println!(
            "✅ Cursor installed (bundle: {}, launcher: {})",
            spec.bundle.display(),
            spec.launcher.display()
        );
        Ok(InstallOutcome::Installed(spec))
    }

    fn resolve_conflicts(&mut self, installations: &InstallationSet) -> Result<Resolution> {
        match self.prompts.conflict_choice(installations)? {
            ConflictChoice::Update => self.resolve_update(installations),
            ConflictChoice::RemoveOne => {
                let record = self.pick(installations, SelectionPurpose::Remove)?;
                let outcome = self.remove_installation(&record);
                if outcome.success() {
                    println!("🗑  Removed {record}");
                } else {
                    eprintln!(
                        "⚠️  Removal of {record} was incomplete:\n{}",
                        outcome.error_summary()
                    );
                }
                self.continue_after_removal()
            }
            ConflictChoice::RemoveAll => {
                let mut outcome = ActionOutcome::default();
                for record in installations.iter() {
                    outcome.merge(self.remove_installation(record));
                }
                if !outcome.success() {
                    bail!(
                        "failed to remove existing installations:\n{}\nfix the permissions above and retry",
                        outcome.error_summary()
                    );
                }
                println!("🗑  Removed {} installation(s)", installations.len());
                self.continue_after_removal()
            }
            ConflictChoice::Substitute => {
                println!("ℹ️  Keeping existing installation(s); installing side-by-side");
                Ok(Resolution::Proceed)
            }
            ConflictChoice::Cancel => {
                println!("Installation cancelled; nothing was changed.");
                Ok(Resolution::Finish(InstallOutcome::Cancelled))
            }
        }
    }

    fn resolve_update(&mut self, installations: &InstallationSet) -> Result<Resolution> {
        let record = loop {
            let record = self.pick(installations, SelectionPurpose::Update)?;
            if record.is_bundle() {
                break record;
            }
            if installations.len() == 1 {
                bail!(
                    "{} is a launcher, not an AppImage; only AppImage installations can be updated",
                    record.path.display()
                );
            }
            eprintln!("❌ {record} is not an AppImage and cannot be updated");
            if !self.prompts.confirm(Confirmation::ChooseAnother)? {
                return Ok(Resolution::Finish(InstallOutcome::Cancelled));
            }
        };

        self.update(&record.path)
            .with_context(|| format!("update of {} failed", record.path.display()))?;
        Ok(Resolution::Finish(InstallOutcome::Updated(record.path)))
    }

    /// One selection path for any number of installations; a single one needs no prompt.
    fn pick(
        &mut self,
        installations: &InstallationSet,
        purpose: SelectionPurpose,
    ) -> Result<InstallationRecord> {
        if installations.len() == 1 {
            return installations
                .get(0)
                .cloned()
                .ok_or_else(|| anyhow!("installation list changed during selection"));
        }
        loop {
            let index = self.prompts.select_installation(installations, purpose)?;
            match installations.get(index) {
                Some(record) => return Ok(record.clone()),
                None => eprintln!(
                    "Please choose a number between 1 and {}",
                    installations.len()
                ),
            }
        }
    }

    fn continue_after_removal(&mut self) -> Result<Resolution> {
        if self.prompts.confirm(Confirmation::ContinueInstall)? {
            Ok(Resolution::Proceed)
        } else {
            Ok(Resolution::Finish(InstallOutcome::Stopped))
        }
    }

    /// Deletes `record` and, for a bundle, its icon, desktop entry, launcher, and log.
    ///
    /// Every deletion is attempted; failures are collected, never short-circuited.
    pub fn remove_installation(&self, record: &InstallationRecord) -> ActionOutcome {
        let mut outcome = ActionOutcome::default();
        outcome.record(&record.path, remove_file_if_exists(&record.path));
        if record.is_bundle() {
            let spec = self.config.default_spec();
            for path in [&spec.icon, &spec.desktop_entry, &spec.launcher, &spec.log_file] {
                outcome.record(path, remove_file_if_exists(path));
            }
            self.refresh_caches();
        }
        outcome
    }

    /// Replaces the bundle at `path`, restoring the previous file on any failure.
    pub fn update(&self, path: &Path) -> Result<()> {
        let backup = BackupHandle::create(path)?;
        if let Some(handle) = backup.as_ref() {
            tracing::debug!(backup = %handle.backup().display(), "bundle backed up");
        }
        println!("⬆️  Updating {}", path.display());

        let replaced = self
            .download_bundle(path)
            .and_then(|()| set_executable(path))
            .and_then(|()| {
                if is_executable_file(path) && is_non_empty_file(path) {
                    Ok(())
                } else {
                    Err(anyhow!(
                        "updated bundle {} is empty or not executable",
                        path.display()
                    ))
                }
            });

        match replaced {
            Ok(()) => {
                if let Some(handle) = backup
                    && let Err(err) = handle.commit()
                {
                    tracing::warn!(error = %format!("{err:#}"), "could not delete bundle backup");
                }
                println!("✅ Updated {}", path.display());
                Ok(())
            }
            Err(err) => {
                if let Some(handle) = backup {
                    match handle.restore() {
                        Ok(()) => eprintln!("↩️  Restored the previous {}", path.display()),
                        Err(restore_err) => tracing::error!(
                            path = %path.display(),
                            error = %format!("{restore_err:#}"),
                            "failed to restore bundle backup"
                        ),
                    }
                } else {
                    let _ = remove_file_if_exists(path);
                }
                Err(err)
            }
        }
    }

    pub fn repair(&mut self) -> Result<RepairOutcome> {
        let spec = self.config.default_spec();
        let failures = verify(&spec);
        if failures.is_empty() {
            println!("✅ Nothing to repair: {} is intact", spec.bundle.display());
            return Ok(RepairOutcome::NothingToRepair);
        }

        println!("🔧 Repairing {} problem(s):", failures.len());
        println!("{}", render_failures(&failures));
        self.create_directories(&spec)?;
        for failure in &failures {
            match (failure.artifact, failure.problem) {
                (Artifact::Bundle, Problem::Missing) => {
                    self.download_bundle(&spec.bundle)?;
                    set_executable(&spec.bundle)?;
                }
                (Artifact::Bundle, Problem::NotExecutable) => set_executable(&spec.bundle)?,
                (Artifact::Icon, _) => self.download_icon(&spec.icon)?,
                (Artifact::DesktopEntry | Artifact::Launcher, _) => {}
            }
        }
        write_desktop_entry(&spec)?;
        write_launcher_script(&spec)?;
        self.refresh_caches();

        let remaining = verify(&spec);
        if !remaining.is_empty() {
            bail!(
                "repair could not fix every problem:\n{}",
                render_failures(&remaining)
            );
        }
        println!("✅ Repair complete");
        Ok(RepairOutcome::Repaired(failures))
    }

    pub fn uninstall(&mut self) -> Result<UninstallOutcome> {
        if !self.prompts.confirm(Confirmation::Uninstall)? {
            println!("Uninstall cancelled; nothing was changed.");
            return Ok(UninstallOutcome::Declined);
        }

        let spec = self.config.default_spec();
        let mut outcome = ActionOutcome::default();
        for path in [&spec.bundle, &spec.icon, &spec.desktop_entry, &spec.launcher] {
            outcome.record(path, remove_file_if_exists(path));
        }
        self.refresh_caches();

        if outcome.success() {
            println!("🗑  Cursor uninstalled");
        } else {
            eprintln!(
                "⚠️  Uninstall finished with {} failure(s):\n{}",
                outcome.errors.len(),
                outcome.error_summary()
            );
        }
        Ok(UninstallOutcome::Removed(outcome))
    }

    fn check_free_space(&self, target: &Path) -> Result<()> {
        let probe_dir = nearest_existing_ancestor(target);
        let available = fs4::available_space(&probe_dir)
            .with_context(|| format!("read free space of {}", probe_dir.display()))?;
        if available < self.config.min_free_bytes {
            bail!(
                "not enough disk space in {}: {} MiB available, {} MiB required",
                probe_dir.display(),
                available / (1024 * 1024),
                self.config.min_free_bytes / (1024 * 1024)
            );
        }
        Ok(())
    }

    fn create_directories(&self, spec: &ArtifactSpec) -> Result<()> {
        for dir in spec.directories() {
            create_dir_all_with_context(dir, "installation")?;
        }
        Ok(())
    }

    fn download_bundle(&self, destination: &Path) -> Result<()> {
        self.downloader.fetch_verified(
            &self.config.download.bundle_url,
            destination,
            "Cursor AppImage",
            self.config.download.bundle_sha256.as_deref(),
        )
    }

    fn download_icon(&self, destination: &Path) -> Result<()> {
        self.downloader
            .fetch(&self.config.download.icon_url, destination, "Cursor icon")
    }

    fn refresh_caches(&self) {
        self.desktop
            .refresh_caches(&self.config.desktop_dir, &self.config.icon_dir);
    }
}

fn nearest_existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}

fn render_failures(failures: &[FailedCheck]) -> String {
    failures
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}
