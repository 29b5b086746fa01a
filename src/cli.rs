use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Install, update, repair, or remove the Cursor AppImage
#[derive(Parser, Debug)]
#[command(name = "cursor-installer", version)]
#[command(group(ArgGroup::new("action").multiple(false)))]
pub struct Cli {
    /// Install Cursor, or resolve an existing installation (default)
    #[arg(short = 'i', long, group = "action")]
    pub install: bool,
    /// Remove the AppImage, icon, desktop entry, and launcher
    #[arg(short = 'u', long, group = "action")]
    pub uninstall: bool,
    /// Re-create missing or broken parts of the default installation
    #[arg(short = 'r', long, group = "action")]
    pub repair: bool,
    /// Read settings from this TOML file instead of the default location
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Print debug diagnostics on stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Uninstall,
    Repair,
}

impl Cli {
    pub fn action(&self) -> Action {
        if self.uninstall {
            Action::Uninstall
        } else if self.repair {
            Action::Repair
        } else {
            Action::Install
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("cursor-installer").chain(args.iter().copied()))
    }

    #[test]
    fn no_flags_means_install() {
        let cli = parse(&[]).expect("parse");
        assert_eq!(cli.action(), Action::Install);
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn short_and_long_action_flags() {
        assert_eq!(parse(&["-u"]).expect("parse").action(), Action::Uninstall);
        assert_eq!(
            parse(&["--repair"]).expect("parse").action(),
            Action::Repair
        );
        assert_eq!(parse(&["-i"]).expect("parse").action(), Action::Install);
    }

    #[test]
    fn config_and_verbose() {
        let cli = parse(&["-r", "--config", "/tmp/c.toml", "-v"]).expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(cli.verbose);
    }

    #[test]
    fn conflicting_actions_are_rejected() {
        let err = parse(&["-i", "-u"]).expect_err("conflict");
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = parse(&["--frobnicate"]).expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn help_and_version_are_reported_as_errors_to_the_caller() {
        assert_eq!(
            parse(&["-h"]).expect_err("help").kind(),
            ErrorKind::DisplayHelp
        );
        assert_eq!(
            parse(&["-V"]).expect_err("version").kind(),
            ErrorKind::DisplayVersion
        );
    }
}
