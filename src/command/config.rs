//! Installer configuration: defaults, TOML overrides, and the per-run artifact layout.

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

const CONFIG_DIR_NAME: &str = "cursor-installer";
const CONFIG_FILE_NAME: &str = "config.toml";
const SCRATCH_DIR_NAME: &str = "cursor_installer";

pub const APP_NAME: &str = "Cursor";
pub const BUNDLE_FILE_NAME: &str = "cursor.AppImage";
pub const ICON_FILE_NAME: &str = "cursor-icon.svg";
pub const DESKTOP_FILE_NAME: &str = "cursor.desktop";
pub const LAUNCHER_NAME: &str = "cursor";
pub const LOG_FILE_NAME: &str = ".cursor_log";

const DEFAULT_BUNDLE_URL: &str = "https://downloader.cursor.sh/linux/appImage/x64";
const DEFAULT_ICON_URL: &str =
    "https://raw.githubusercontent.com/getcursor/cursor/main/resources/linux/cursor.svg";
const DEFAULT_PROBE_URL: &str = "https://downloader.cursor.sh";
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_SECS: u64 = 5;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_MIN_FREE_MB: u64 = 500;
const BYTES_PER_MB: u64 = 1024 * 1024;

const HTTPS_PROXY_ENV_KEYS: [&str; 6] = [
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
    "HTTP_PROXY",
    "http_proxy",
];
const HTTP_PROXY_ENV_KEYS: [&str; 4] = ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"];
const NO_PROXY_ENV_KEYS: [&str; 2] = ["NO_PROXY", "no_proxy"];

/// Whether the Chromium sandbox stays on when the launcher starts the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    Enabled,
    Disabled,
}

impl SandboxMode {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled { Self::Enabled } else { Self::Disabled }
    }

    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }

    /// Extra bundle argument baked into the launcher.
    pub fn launch_flag(self) -> Option<&'static str> {
        match self {
            Self::Enabled => None,
            Self::Disabled => Some("--no-sandbox"),
        }
    }
}

/// A proxy value together with the variable it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyValue {
    pub source: String,
    pub uri: String,
}

/// Proxy environment captured once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    pub https: Option<ProxyValue>,
    pub http: Option<ProxyValue>,
    pub no_proxy: Vec<String>,
}

impl ProxySettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| {
            keys.iter().find_map(|key| {
                let value = lookup(*key)?;
                let value = value.trim();
                (!value.is_empty()).then(|| ProxyValue {
                    source: (*key).to_string(),
                    uri: value.to_string(),
                })
            })
        };
        let no_proxy = first(&NO_PROXY_ENV_KEYS[..])
            .map(|value| split_no_proxy_rules(&value.uri))
            .unwrap_or_default();
        Self {
            https: first(&HTTPS_PROXY_ENV_KEYS[..]),
            http: first(&HTTP_PROXY_ENV_KEYS[..]),
            no_proxy,
        }
    }

    pub fn for_scheme(&self, scheme: &str) -> Option<&ProxyValue> {
        if scheme.eq_ignore_ascii_case("https") {
            self.https.as_ref()
        } else {
            self.http.as_ref()
        }
    }
}

fn split_no_proxy_rules(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub bundle_url: String,
    pub icon_url: String,
    pub probe_url: String,
    pub bundle_sha256: Option<String>,
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    pub connect_timeout: Duration,
    pub transfer_timeout: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            bundle_url: DEFAULT_BUNDLE_URL.to_string(),
            icon_url: DEFAULT_ICON_URL.to_string(),
            probe_url: DEFAULT_PROBE_URL.to_string(),
            bundle_sha256: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_unit: Duration::from_secs(DEFAULT_BACKOFF_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            transfer_timeout: Duration::from_secs(DEFAULT_TRANSFER_TIMEOUT_SECS),
        }
    }
}

/// Everything the installer needs to know, resolved once in `main`.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    pub home: PathBuf,
    pub app_dir: PathBuf,
    pub icon_dir: PathBuf,
    pub desktop_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub log_file: PathBuf,
    pub scratch_dir: PathBuf,
    pub candidates: Vec<PathBuf>,
    pub sandbox: SandboxMode,
    pub min_free_bytes: u64,
    pub download: DownloadSettings,
    pub proxy: ProxySettings,
}

impl InstallerConfig {
    /// Built-in layout rooted at `home`.
    pub fn with_home(home: &Path) -> Self {
        let app_dir = home.join("Applications");
        let bin_dir = home.join(".local/bin");
        let candidates = vec![
            app_dir.join(BUNDLE_FILE_NAME),
            home.join(".local/share/cursor").join(BUNDLE_FILE_NAME),
            PathBuf::from("/opt/cursor").join(BUNDLE_FILE_NAME),
            bin_dir.join(LAUNCHER_NAME),
            PathBuf::from("/usr/local/bin").join(LAUNCHER_NAME),
        ];
        Self {
            home: home.to_path_buf(),
            app_dir,
            icon_dir: home.join(".local/share/icons"),
            desktop_dir: home.join(".local/share/applications"),
            bin_dir,
            log_file: home.join(LOG_FILE_NAME),
            scratch_dir: env::temp_dir().join(SCRATCH_DIR_NAME),
            candidates,
            sandbox: SandboxMode::Disabled,
            min_free_bytes: DEFAULT_MIN_FREE_MB * BYTES_PER_MB,
            download: DownloadSettings::default(),
            proxy: ProxySettings::default(),
        }
    }

    /// Resolves defaults from the environment and overlays the config file, if any.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let home = env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("cannot resolve install paths: set `HOME`"))?;
        let mut config = Self::with_home(&home);
        config.proxy = ProxySettings::from_env();

        let path = match explicit_path {
            Some(path) => {
                if !path.is_file() {
                    bail!("config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => default_config_path(&home).filter(|p| p.is_file()),
        };
        if let Some(path) = path {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("read config {}", path.display()))?;
            config
                .apply_toml(&raw)
                .with_context(|| format!("parse TOML config {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded installer config");
        }
        Ok(config)
    }

    pub(crate) fn apply_toml(&mut self, raw: &str) -> Result<()> {
        let file = toml::from_str::<ConfigFile>(raw)?;
        self.apply(file)
    }

    fn apply(&mut self, file: ConfigFile) -> Result<()> {
        let home = self.home.clone();
        let expand = |raw: String| expand_home(&raw, &home);

        let paths = file.paths;
        if let Some(dir) = paths.app_dir.map(expand) {
            // Keep the default bundle candidate pointing at the relocated app dir.
            let old_bundle = self.default_bundle_path();
            let new_bundle = dir.join(BUNDLE_FILE_NAME);
            for candidate in &mut self.candidates {
                if *candidate == old_bundle {
                    *candidate = new_bundle.clone();
                }
            }
            self.app_dir = dir;
        }
        if let Some(dir) = paths.icon_dir.map(expand) {
            self.icon_dir = dir;
        }
        if let Some(dir) = paths.desktop_dir.map(expand) {
            self.desktop_dir = dir;
        }
        if let Some(dir) = paths.bin_dir.map(expand) {
            let old_launcher = self.bin_dir.join(LAUNCHER_NAME);
            let new_launcher = dir.join(LAUNCHER_NAME);
            for candidate in &mut self.candidates {
                if *candidate == old_launcher {
                    *candidate = new_launcher.clone();
                }
            }
            self.bin_dir = dir;
        }
        if let Some(file) = paths.log_file.map(expand) {
            self.log_file = file;
        }
        if let Some(dir) = paths.scratch_dir.map(expand) {
            self.scratch_dir = dir;
        }
        if let Some(candidates) = paths.candidates {
            if candidates.is_empty() {
                bail!("`paths.candidates` must list at least one path");
            }
            self.candidates = candidates.into_iter().map(expand).collect();
        }

        let download = file.download;
        if let Some(url) = download.bundle_url {
            self.download.bundle_url = non_empty(url, "download.bundle_url")?;
        }
        if let Some(url) = download.icon_url {
            self.download.icon_url = non_empty(url, "download.icon_url")?;
        }
        if let Some(url) = download.probe_url {
            self.download.probe_url = non_empty(url, "download.probe_url")?;
        }
        if let Some(digest) = download.bundle_sha256 {
            self.download.bundle_sha256 = Some(normalize_sha256(&digest)?);
        }
        if let Some(attempts) = download.max_attempts {
            if attempts == 0 {
                bail!("`download.max_attempts` must be at least 1");
            }
            self.download.max_attempts = attempts;
        }
        if let Some(secs) = download.backoff_secs {
            self.download.backoff_unit = Duration::from_secs(secs);
        }
        if let Some(secs) = download.connect_timeout_secs {
            self.download.connect_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = download.transfer_timeout_secs {
            self.download.transfer_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(enabled) = file.install.sandbox {
            self.sandbox = SandboxMode::from_enabled(enabled);
        }
        if let Some(mb) = file.install.min_free_mb {
            self.min_free_bytes = mb.saturating_mul(BYTES_PER_MB);
        }
        Ok(())
    }

    pub fn default_bundle_path(&self) -> PathBuf {
        self.app_dir.join(BUNDLE_FILE_NAME)
    }

    /// Layout for an installation into `install_dir`.
    pub fn artifact_spec(&self, install_dir: &Path, sandbox: SandboxMode) -> ArtifactSpec {
        ArtifactSpec {
            install_dir: install_dir.to_path_buf(),
            sandbox,
            bundle: install_dir.join(BUNDLE_FILE_NAME),
            icon: self.icon_dir.join(ICON_FILE_NAME),
            desktop_entry: self.desktop_dir.join(DESKTOP_FILE_NAME),
            launcher: self.bin_dir.join(LAUNCHER_NAME),
            log_file: self.log_file.clone(),
        }
    }

    /// Layout of the default installation, used by repair, uninstall, and removal.
    pub fn default_spec(&self) -> ArtifactSpec {
        self.artifact_spec(&self.app_dir, self.sandbox)
    }
}

/// Desired end state of one installation's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub install_dir: PathBuf,
    pub sandbox: SandboxMode,
    pub bundle: PathBuf,
    pub icon: PathBuf,
    pub desktop_entry: PathBuf,
    pub launcher: PathBuf,
    pub log_file: PathBuf,
}

impl ArtifactSpec {
    /// Directories that must exist before any artifact is written.
    pub fn directories(&self) -> Vec<&Path> {
        let mut dirs: Vec<&Path> = Vec::new();
        for path in [
            Some(self.install_dir.as_path()),
            self.icon.parent(),
            self.desktop_entry.parent(),
            self.launcher.parent(),
            self.log_file.parent(),
        ]
        .into_iter()
        .flatten()
        {
            if !path.as_os_str().is_empty() && !dirs.contains(&path) {
                dirs.push(path);
            }
        }
        dirs
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    paths: PathsSection,
    #[serde(default)]
    download: DownloadSection,
    #[serde(default)]
    install: InstallSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathsSection {
    app_dir: Option<String>,
    icon_dir: Option<String>,
    desktop_dir: Option<String>,
    bin_dir: Option<String>,
    log_file: Option<String>,
    scratch_dir: Option<String>,
    candidates: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DownloadSection {
    bundle_url: Option<String>,
    icon_url: Option<String>,
    probe_url: Option<String>,
    bundle_sha256: Option<String>,
    max_attempts: Option<u32>,
    backoff_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    transfer_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstallSection {
    sandbox: Option<bool>,
    min_free_mb: Option<u64>,
}

fn default_config_path(home: &Path) -> Option<PathBuf> {
    let base = match env::var_os("XDG_CONFIG_HOME") {
        Some(base) if !base.is_empty() => PathBuf::from(base),
        _ => home.join(".config"),
    };
    Some(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn expand_home(raw: &str, home: &Path) -> PathBuf {
    let raw = raw.trim();
    if raw == "~" {
        return home.to_path_buf();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(raw),
    }
}

fn non_empty(value: String, key: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("`{key}` must not be empty");
    }
    Ok(trimmed.to_string())
}

fn normalize_sha256(raw: &str) -> Result<String> {
    let value = raw.trim();
    let value = value
        .strip_prefix("sha256:")
        .or_else(|| value.strip_prefix("SHA256:"))
        .unwrap_or(value);
    if value.len() != 64 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("`download.bundle_sha256` must be 64 hex characters");
    }
    Ok(value.to_ascii_lowercase())
}
