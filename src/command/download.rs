//! Download manager: retrying, atomic fetches into a scoped scratch directory.

use super::{
    config::{InstallerConfig, ProxySettings},
    is_non_empty_file,
    progress::{ProgressSink, percent_of},
    sibling_temp_path,
};
use anyhow::{Context, Result, anyhow, bail};
use reqx::{
    RedirectPolicy, RetryPolicy,
    blocking::{Client, ClientBuilder},
};
use sha2::{Digest, Sha256};
use signal_hook::{
    consts::{SIGHUP, SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    cell::Cell,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

const HTTP_USER_AGENT: &str = "cursor-installer/0.1";
const PROXY_HINT: &str =
    "if your network requires a proxy, set HTTPS_PROXY/HTTP_PROXY (and optional NO_PROXY)";

/// Progress callback: bytes received so far and the expected total, if known.
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, Option<u64>);

/// Moves bytes from a URL. One call is one network attempt; retries live in [`Downloader`].
pub trait Transport {
    fn probe(&self, url: &str) -> Result<()>;
    fn fetch(&self, url: &str, sink: &mut dyn Write, progress: ProgressFn<'_>) -> Result<u64>;
}

/// Delay before the attempt following failed attempt `attempt` (1-based).
pub fn retry_delay(attempt: u32, unit: Duration) -> Duration {
    unit.saturating_mul(attempt)
}

pub struct Downloader<'a> {
    transport: &'a dyn Transport,
    progress: &'a dyn ProgressSink,
    scratch_dir: PathBuf,
    max_attempts: u32,
    backoff_unit: Duration,
    sleep: fn(Duration),
    sequence: Cell<u32>,
}

impl<'a> Downloader<'a> {
    pub fn new(
        config: &InstallerConfig,
        transport: &'a dyn Transport,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            transport,
            progress,
            scratch_dir: config.scratch_dir.clone(),
            max_attempts: config.download.max_attempts.max(1),
            backoff_unit: config.download.backoff_unit,
            sleep: thread::sleep,
            sequence: Cell::new(0),
        }
    }

    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn probe(&self, url: &str) -> Result<()> {
        self.transport.probe(url)
    }

    pub fn fetch(&self, url: &str, destination: &Path, description: &str) -> Result<()> {
        self.fetch_verified(url, destination, description, None)
    }

    /// Fetches `url` into `destination`, retrying with linear backoff.
    ///
    /// Each attempt streams into its own part file in the scratch directory; only a
    /// non-empty (and, when `expected_sha256` is set, matching) result replaces
    /// `destination`. A failed fetch leaves `destination` untouched.
    pub fn fetch_verified(
        &self,
        url: &str,
        destination: &Path,
        description: &str,
        expected_sha256: Option<&str>,
    ) -> Result<()> {
        fs::create_dir_all(&self.scratch_dir).with_context(|| {
            format!(
                "create download scratch directory {}",
                self.scratch_dir.display()
            )
        })?;

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            let part = self.part_path(destination);
            tracing::debug!(url, attempt, part = %part.display(), "download attempt");
            match self.attempt(url, &part, description, expected_sha256) {
                Ok(()) => {
                    let moved = move_into_place(&part, destination);
                    let _ = fs::remove_file(&part);
                    return moved;
                }
                Err(err) => {
                    let _ = fs::remove_file(&part);
                    tracing::warn!(
                        url,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %format!("{err:#}"),
                        "download attempt failed"
                    );
                    last_error = Some(err);
                }
            }
            if attempt < self.max_attempts {
                let delay = retry_delay(attempt, self.backoff_unit);
                eprintln!(
                    "⚠️  Downloading {description} failed (attempt {attempt}/{}); retrying in {}s",
                    self.max_attempts,
                    delay.as_secs()
                );
                (self.sleep)(delay);
            }
        }

        let cause = last_error.unwrap_or_else(|| anyhow!("no attempt was made"));
        Err(cause.context(format!(
            "failed to download {description} from `{url}` after {} attempt(s)",
            self.max_attempts
        )))
    }

    fn attempt(
        &self,
        url: &str,
        part: &Path,
        description: &str,
        expected_sha256: Option<&str>,
    ) -> Result<()> {
        let mut file =
            File::create(part).with_context(|| format!("create part file {}", part.display()))?;

        self.progress.begin(description);
        let mut last_percent = None;
        let mut report = |current: u64, total: Option<u64>| {
            if let Some(pct) = percent_of(current, total)
                && last_percent != Some(pct)
            {
                last_percent = Some(pct);
                self.progress.percent(pct);
            }
        };
        let fetched = self.transport.fetch(url, &mut file, &mut report);
        self.progress.finish();
        fetched?;

        file.flush()
            .with_context(|| format!("flush part file {}", part.display()))?;
        drop(file);

        if !is_non_empty_file(part) {
            bail!("download from `{url}` produced an empty file");
        }
        if let Some(expected) = expected_sha256 {
            verify_sha256_file(part, expected)?;
        }
        Ok(())
    }

    fn part_path(&self, destination: &Path) -> PathBuf {
        let seq = self.sequence.get() + 1;
        self.sequence.set(seq);
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "download".to_string());
        self.scratch_dir
            .join(format!("{name}.{}.{seq}.part", std::process::id()))
    }
}

/// Renames `part` over `destination`; across filesystems stages a sibling copy first.
fn move_into_place(part: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    if fs::rename(part, destination).is_ok() {
        return Ok(());
    }

    let staged = sibling_temp_path(destination, "download");
    if let Err(err) = fs::copy(part, &staged) {
        let _ = fs::remove_file(&staged);
        return Err(anyhow!(err).context(format!(
            "copy {} -> {}",
            part.display(),
            staged.display()
        )));
    }
    if let Err(err) = fs::rename(&staged, destination) {
        let _ = fs::remove_file(&staged);
        return Err(anyhow!(err).context(format!(
            "move download into place at {}",
            destination.display()
        )));
    }
    Ok(())
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn verify_sha256_file(path: &Path, expected_hex: &str) -> Result<()> {
    let actual_hex = sha256_file(path)?;
    if !actual_hex.eq_ignore_ascii_case(expected_hex) {
        bail!(
            "sha256 mismatch for {}: expected {}, got {}",
            path.display(),
            expected_hex,
            actual_hex
        );
    }
    Ok(())
}

// ---------- scratch directory ----------

/// Owns the scratch directory for one run and deletes it on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)
            .with_context(|| format!("create scratch directory {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Removes `path` and exits with `128 + signal` when the operator interrupts the run.
///
/// Partially applied file changes are left as they are.
pub fn remove_on_interrupt(path: PathBuf) -> Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).context("register interrupt handlers")?;
    thread::Builder::new()
        .name("scratch-cleanup".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                let _ = fs::remove_dir_all(&path);
                eprintln!(
                    "\n⚠️  Interrupted. Run `cursor-installer --repair` if an install or update was in progress."
                );
                std::process::exit(128 + signal);
            }
        })
        .context("spawn interrupt handler thread")?;
    Ok(())
}

// ---------- HTTP transport ----------

/// `reqx` blocking transport. Retries are disabled here; [`Downloader`] owns them.
pub struct HttpTransport {
    connect_timeout: Duration,
    transfer_timeout: Duration,
    proxy: ProxySettings,
}

impl HttpTransport {
    pub fn new(config: &InstallerConfig) -> Self {
        Self {
            connect_timeout: config.download.connect_timeout,
            transfer_timeout: config.download.transfer_timeout,
            proxy: config.proxy.clone(),
        }
    }

    fn client(&self, parts: &UrlParts, timeout: Duration) -> Result<Client> {
        let mut builder = Client::builder(&parts.base_url)
            .request_timeout(timeout)
            .total_timeout(timeout)
            .retry_policy(RetryPolicy::disabled())
            .client_name("cursor-installer")
            .redirect_policy(RedirectPolicy::follow());
        builder = self
            .apply_proxy(builder, &parts.scheme)
            .with_context(|| format!("configure HTTP client proxy for `{}`", parts.base_url))?;
        builder
            .build()
            .with_context(|| format!("build HTTP client for `{}`", parts.base_url))
    }

    fn apply_proxy(&self, mut builder: ClientBuilder, scheme: &str) -> Result<ClientBuilder> {
        let Some(proxy) = self.proxy.for_scheme(scheme) else {
            return Ok(builder);
        };
        let proxy_uri = proxy
            .uri
            .parse()
            .with_context(|| format!("invalid proxy URI in `{}`", proxy.source))?;
        builder = builder.http_proxy(proxy_uri);
        if !self.proxy.no_proxy.is_empty() {
            builder = builder
                .try_no_proxy(self.proxy.no_proxy.clone())
                .context("invalid `NO_PROXY`/`no_proxy` rules")?;
        }
        Ok(builder)
    }
}

impl Transport for HttpTransport {
    fn probe(&self, url: &str) -> Result<()> {
        let parts = parse_url_parts(url)?;
        let client = self.client(&parts, self.connect_timeout)?;
        client
            .get(parts.path_and_query)
            .try_header("user-agent", HTTP_USER_AGENT)
            .context("set probe user-agent")?
            .send_with_status()
            .with_context(|| format!("cannot reach `{url}` ({PROXY_HINT})"))?;
        Ok(())
    }

    fn fetch(&self, url: &str, sink: &mut dyn Write, progress: ProgressFn<'_>) -> Result<u64> {
        let parts = parse_url_parts(url)?;
        let client = self.client(&parts, self.transfer_timeout)?;
        let mut req = client.get(parts.path_and_query);
        req = req
            .try_header("user-agent", HTTP_USER_AGENT)
            .context("set download user-agent")?;
        let mut resp = req
            .send_stream()
            .with_context(|| format!("download from `{url}` ({PROXY_HINT})"))?;
        let total_bytes = resp
            .headers()
            .get("content-length")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        let mut chunk = [0_u8; 64 * 1024];
        let mut downloaded = 0_u64;
        progress(downloaded, total_bytes);
        loop {
            let read = resp
                .read_chunk(&mut chunk)
                .with_context(|| format!("read bytes from `{url}`"))?;
            if read == 0 {
                break;
            }
            sink.write_all(&chunk[..read])
                .context("write downloaded bytes")?;
            downloaded = downloaded.saturating_add(read as u64);
            progress(downloaded, total_bytes);
        }
        Ok(downloaded)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct UrlParts {
    scheme: String,
    base_url: String,
    path_and_query: String,
}

fn parse_url_parts(url: &str) -> Result<UrlParts> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| anyhow!("invalid URL `{url}`: missing scheme"))?;
    if scheme != "http" && scheme != "https" {
        bail!("unsupported URL scheme `{scheme}` in `{url}`");
    }

    let slash_idx = rest.find('/').unwrap_or(rest.len());
    let authority = &rest[..slash_idx];
    if authority.is_empty() {
        bail!("invalid URL `{url}`: missing host");
    }

    let path_with_query_and_fragment = if slash_idx < rest.len() {
        &rest[slash_idx..]
    } else {
        "/"
    };
    let path_and_query = path_with_query_and_fragment
        .split('#')
        .next()
        .unwrap_or(path_with_query_and_fragment);

    Ok(UrlParts {
        scheme: scheme.to_string(),
        base_url: format!("{scheme}://{authority}"),
        path_and_query: if path_and_query.is_empty() {
            "/".to_string()
        } else {
            path_and_query.to_string()
        },
    })
}
