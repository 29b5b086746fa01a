use anyhow::{Result, anyhow};
use clap::{Parser, error::ErrorKind};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod command;

use command::{
    config::InstallerConfig,
    desktop::SystemDesktop,
    download::{Downloader, HttpTransport, ScratchDir, remove_on_interrupt},
    progress::TerminalProgress,
    prompt::TerminalPrompts,
    reconcile::{InstallOutcome, Reconciler, RepairOutcome, UninstallOutcome},
};

const LOG_ENV: &str = "CURSOR_INSTALLER_LOG";

fn main() -> ExitCode {
    let args = match cli::Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("❌ {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &cli::Cli) -> Result<()> {
    init_tls_crypto_provider()?;
    let config = InstallerConfig::load(args.config.as_deref())?;
    tracing::debug!(
        app_dir = %config.app_dir.display(),
        bundle_url = %config.download.bundle_url,
        "configuration loaded"
    );

    let scratch = ScratchDir::create(&config.scratch_dir)?;
    remove_on_interrupt(scratch.path().to_path_buf())?;

    let transport = HttpTransport::new(&config);
    let progress = TerminalProgress::new();
    let downloader = Downloader::new(&config, &transport, &progress);
    let mut prompts = TerminalPrompts::stdio();
    let desktop = SystemDesktop;
    let mut reconciler = Reconciler::new(&config, &downloader, &mut prompts, &desktop);

    match args.action() {
        cli::Action::Install => match reconciler.install()? {
            InstallOutcome::Installed(spec) => {
                tracing::info!(bundle = %spec.bundle.display(), "installed");
            }
            InstallOutcome::Updated(path) => tracing::info!(path = %path.display(), "updated"),
            InstallOutcome::Cancelled | InstallOutcome::Stopped => {}
        },
        cli::Action::Repair => {
            if let RepairOutcome::Repaired(fixed) = reconciler.repair()? {
                tracing::info!(count = fixed.len(), "repaired");
            }
        }
        cli::Action::Uninstall => {
            if let UninstallOutcome::Removed(outcome) = reconciler.uninstall()? {
                tracing::info!(failures = outcome.errors.len(), "uninstall finished");
            }
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn init_tls_crypto_provider() -> Result<()> {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow!("failed to install rustls ring crypto provider"))?;
    }
    Ok(())
}
