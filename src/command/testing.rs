//! Test doubles shared by the unit tests.

use super::{
    config::{InstallerConfig, SandboxMode},
    desktop::DesktopIntegration,
    download::{ProgressFn, Transport},
    inventory::InstallationSet,
    progress::ProgressSink,
    prompt::{Confirmation, ConflictChoice, DecisionProvider, SelectionPurpose},
};
use anyhow::{Result, anyhow, bail};
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Unique directory under the system temp dir, removed on drop.
pub struct TempRoot {
    path: PathBuf,
}

impl TempRoot {
    pub fn new(label: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "cursor-installer-test-{label}-{}-{nanos}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("create temp root");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempRoot {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Config rooted entirely inside `root`: no system paths, no size floor, no backoff.
pub fn test_config(root: &Path) -> InstallerConfig {
    let home = root.join("home");
    let mut config = InstallerConfig::with_home(&home);
    config.scratch_dir = root.join("scratch");
    config.candidates = vec![
        config.default_bundle_path(),
        home.join("opt/cursor.AppImage"),
        config.bin_dir.join("cursor"),
    ];
    config.min_free_bytes = 0;
    config.download.backoff_unit = Duration::ZERO;
    config.download.bundle_url = "https://example.test/cursor.AppImage".to_string();
    config.download.icon_url = "https://example.test/cursor.svg".to_string();
    config.download.probe_url = "https://example.test".to_string();
    fs::create_dir_all(&config.scratch_dir).expect("create scratch");
    config
}

pub fn write_file(path: &Path, content: &[u8], mode: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("chmod");
    #[cfg(not(unix))]
    let _ = mode;
}

/// What the fake transport does for one fetch call.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Body(Vec<u8>),
    Empty,
    Fail(&'static str),
}

/// Scripted transport: pops one response per fetch, then repeats `fallback`.
pub struct FakeTransport {
    responses: RefCell<VecDeque<FakeResponse>>,
    fallback: FakeResponse,
    reachable: bool,
    fetched: RefCell<Vec<String>>,
    probes: Cell<usize>,
}

impl FakeTransport {
    pub fn serving(body: &[u8]) -> Self {
        Self::scripted(Vec::new(), FakeResponse::Body(body.to_vec()))
    }

    pub fn scripted(responses: Vec<FakeResponse>, fallback: FakeResponse) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            fallback,
            reachable: true,
            fetched: RefCell::new(Vec::new()),
            probes: Cell::new(0),
        }
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.borrow().len()
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.borrow().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.get()
    }
}

impl Transport for FakeTransport {
    fn probe(&self, url: &str) -> Result<()> {
        self.probes.set(self.probes.get() + 1);
        if self.reachable {
            Ok(())
        } else {
            bail!("cannot reach {url}")
        }
    }

    fn fetch(&self, url: &str, sink: &mut dyn Write, progress: ProgressFn<'_>) -> Result<u64> {
        self.fetched.borrow_mut().push(url.to_string());
        let response = self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match response {
            FakeResponse::Body(body) => {
                let total = body.len() as u64;
                let half = body.len() / 2;
                sink.write_all(&body[..half])?;
                progress(half as u64, Some(total));
                sink.write_all(&body[half..])?;
                progress(total, Some(total));
                Ok(total)
            }
            FakeResponse::Empty => Ok(0),
            FakeResponse::Fail(reason) => Err(anyhow!("{reason}")),
        }
    }
}

/// Records every percentage it is given.
#[derive(Default)]
pub struct RecordingProgress {
    pub percents: RefCell<Vec<u8>>,
    pub finished: Cell<usize>,
}

impl ProgressSink for RecordingProgress {
    fn begin(&self, _description: &str) {}

    fn percent(&self, value: u8) {
        self.percents.borrow_mut().push(value);
    }

    fn finish(&self) {
        self.finished.set(self.finished.get() + 1);
    }
}

#[derive(Default)]
pub struct CountingDesktop {
    pub refreshes: Cell<usize>,
}

impl DesktopIntegration for CountingDesktop {
    fn refresh_caches(&self, _desktop_dir: &Path, _icon_dir: &Path) {
        self.refreshes.set(self.refreshes.get() + 1);
    }
}

/// One scripted answer for [`ScriptedPrompts`].
#[derive(Debug, Clone)]
pub enum Answer {
    Choice(ConflictChoice),
    Index(usize),
    Confirm(bool),
    Dir(PathBuf),
    Sandbox(SandboxMode),
}

/// Replays answers in order and records what was asked.
#[derive(Default)]
pub struct ScriptedPrompts {
    answers: VecDeque<Answer>,
    pub asked: Vec<String>,
}

impl ScriptedPrompts {
    pub fn new(answers: Vec<Answer>) -> Self {
        Self {
            answers: answers.into(),
            asked: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next(&mut self, question: String) -> Result<Answer> {
        self.asked.push(question.clone());
        self.answers
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted answer for `{question}`"))
    }
}

impl DecisionProvider for ScriptedPrompts {
    fn conflict_choice(&mut self, _installations: &InstallationSet) -> Result<ConflictChoice> {
        match self.next("conflict".to_string())? {
            Answer::Choice(choice) => Ok(choice),
            other => bail!("expected a conflict choice, scripted {other:?}"),
        }
    }

    fn select_installation(
        &mut self,
        _installations: &InstallationSet,
        purpose: SelectionPurpose,
    ) -> Result<usize> {
        match self.next(format!("select:{purpose:?}"))? {
            Answer::Index(index) => Ok(index),
            other => bail!("expected an index, scripted {other:?}"),
        }
    }

    fn confirm(&mut self, question: Confirmation) -> Result<bool> {
        match self.next(format!("confirm:{question:?}"))? {
            Answer::Confirm(yes) => Ok(yes),
            other => bail!("expected a confirmation, scripted {other:?}"),
        }
    }

    fn install_dir(&mut self, default: &Path) -> Result<PathBuf> {
        if !matches!(self.answers.front(), Some(Answer::Dir(_))) {
            return Ok(default.to_path_buf());
        }
        match self.next("install-dir".to_string())? {
            Answer::Dir(dir) => Ok(dir),
            other => bail!("expected a directory, scripted {other:?}"),
        }
    }

    fn sandbox(&mut self, default: SandboxMode) -> Result<SandboxMode> {
        if !matches!(self.answers.front(), Some(Answer::Sandbox(_))) {
            return Ok(default);
        }
        match self.next("sandbox".to_string())? {
            Answer::Sandbox(mode) => Ok(mode),
            other => bail!("expected a sandbox mode, scripted {other:?}"),
        }
    }
}
