//! Operator decisions: the engine-facing trait and its terminal implementation.

use super::{config::SandboxMode, inventory::InstallationSet};
use anyhow::{Context, Result, bail};
use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

/// What to do when installations already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    Update,
    RemoveOne,
    RemoveAll,
    Substitute,
    Cancel,
}

impl ConflictChoice {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_lowercase() {
            'u' => Some(Self::Update),
            'o' => Some(Self::RemoveOne),
            'a' => Some(Self::RemoveAll),
            's' => Some(Self::Substitute),
            'c' => Some(Self::Cancel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPurpose {
    Update,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// After a removal: carry on with a fresh install?
    ContinueInstall,
    /// The chosen installation cannot be updated: pick another?
    ChooseAnother,
    Uninstall,
}

impl Confirmation {
    fn question(self) -> &'static str {
        match self {
            Self::ContinueInstall => "Continue with a fresh installation?",
            Self::ChooseAnother => "Choose another installation?",
            Self::Uninstall => "Remove Cursor and its desktop integration?",
        }
    }

    fn default_answer(self) -> bool {
        match self {
            Self::ContinueInstall | Self::ChooseAnother => true,
            Self::Uninstall => false,
        }
    }
}

/// Synchronous source of validated operator decisions.
pub trait DecisionProvider {
    fn conflict_choice(&mut self, installations: &InstallationSet) -> Result<ConflictChoice>;
    /// 0-based index into `installations`. Callers still range-check the answer.
    fn select_installation(
        &mut self,
        installations: &InstallationSet,
        purpose: SelectionPurpose,
    ) -> Result<usize>;
    fn confirm(&mut self, question: Confirmation) -> Result<bool>;
    fn install_dir(&mut self, default: &Path) -> Result<PathBuf>;
    fn sandbox(&mut self, default: SandboxMode) -> Result<SandboxMode>;
}

/// Line-oriented prompts over any reader/writer pair.
pub struct TerminalPrompts<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompts<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompts<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_answer(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{question} ").context("write prompt")?;
        self.output.flush().context("flush prompt")?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line).context("read answer")?;
        if read == 0 {
            bail!("input closed while waiting for an answer to `{question}`");
        }
        Ok(line.trim().to_string())
    }

    /// Asks until the answer is one character from `valid` (case-insensitive); empty means `default`.
    pub fn ask(&mut self, question: &str, default: char, valid: &str) -> Result<char> {
        loop {
            let answer = self.read_answer(question)?;
            if answer.is_empty() {
                return Ok(default.to_ascii_lowercase());
            }
            let mut chars = answer.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                let c = c.to_ascii_lowercase();
                if valid.to_ascii_lowercase().contains(c) {
                    return Ok(c);
                }
            }
            writeln!(self.output, "Please answer with one of: {valid}").context("write hint")?;
        }
    }

    fn ask_yes_no(&mut self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let default = if default { 'y' } else { 'n' };
        Ok(self.ask(&format!("{question} {hint}"), default, "yn")? == 'y')
    }
}

impl<R: BufRead, W: Write> DecisionProvider for TerminalPrompts<R, W> {
    fn conflict_choice(&mut self, installations: &InstallationSet) -> Result<ConflictChoice> {
        writeln!(self.output, "⚠️  Existing installation(s) found:").context("write list")?;
        for line in installations.numbered_lines() {
            writeln!(self.output, "{line}").context("write list")?;
        }
        writeln!(
            self.output,
            "  [u] update  [o] remove one  [a] remove all  [s] install side-by-side  [c] cancel"
        )
        .context("write menu")?;
        let letter = self.ask("Choose an action [c]:", 'c', "uoasc")?;
        Ok(ConflictChoice::from_letter(letter).unwrap_or(ConflictChoice::Cancel))
    }

    fn select_installation(
        &mut self,
        installations: &InstallationSet,
        purpose: SelectionPurpose,
    ) -> Result<usize> {
        let verb = match purpose {
            SelectionPurpose::Update => "update",
            SelectionPurpose::Remove => "remove",
        };
        for line in installations.numbered_lines() {
            writeln!(self.output, "{line}").context("write list")?;
        }
        loop {
            let answer = self.read_answer(&format!(
                "Installation to {verb} [1-{}]:",
                installations.len()
            ))?;
            match answer.parse::<usize>() {
                Ok(n) if (1..=installations.len()).contains(&n) => return Ok(n - 1),
                _ => writeln!(
                    self.output,
                    "Please enter a number between 1 and {}",
                    installations.len()
                )
                .context("write hint")?,
            }
        }
    }

    fn confirm(&mut self, question: Confirmation) -> Result<bool> {
        self.ask_yes_no(question.question(), question.default_answer())
    }

    fn install_dir(&mut self, default: &Path) -> Result<PathBuf> {
        let answer =
            self.read_answer(&format!("Install directory [{}]:", default.display()))?;
        if answer.is_empty() {
            return Ok(default.to_path_buf());
        }
        Ok(PathBuf::from(answer))
    }

    fn sandbox(&mut self, default: SandboxMode) -> Result<SandboxMode> {
        let enabled = self.ask_yes_no("Keep the Chromium sandbox enabled?", default.is_enabled())?;
        Ok(SandboxMode::from_enabled(enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{
        inventory::scan_paths,
        testing::{TempRoot, write_file},
    };

    fn prompts(input: &str) -> TerminalPrompts<&[u8], Vec<u8>> {
        TerminalPrompts::new(input.as_bytes(), Vec::new())
    }

    #[test]
    fn ask_reprompts_until_valid_letter() {
        let mut p = prompts("x\nyes\nA\n");
        assert_eq!(p.ask("?", 'c', "uoasc").expect("answer"), 'a');
        let shown = String::from_utf8(p.output).expect("utf8");
        assert_eq!(shown.matches("Please answer with one of").count(), 2);
    }

    #[test]
    fn empty_answer_takes_default() {
        let mut p = prompts("\n");
        assert_eq!(p.ask("?", 'C', "uoasc").expect("answer"), 'c');
    }

    #[test]
    fn closed_input_is_an_error() {
        let mut p = prompts("bogus\n");
        assert!(p.ask("?", 'c', "uoasc").is_err());
    }

    #[test]
    fn uninstall_confirmation_defaults_to_no() {
        let mut p = prompts("\n\n");
        assert!(!p.confirm(Confirmation::Uninstall).expect("answer"));
        assert!(p.confirm(Confirmation::ContinueInstall).expect("answer"));
    }

    #[test]
    fn conflict_letters_map_to_choices() {
        let mut p = prompts("U\n");
        let set = InstallationSet::default();
        assert_eq!(
            p.conflict_choice(&set).expect("choice"),
            ConflictChoice::Update
        );
        assert_eq!(ConflictChoice::from_letter('S'), Some(ConflictChoice::Substitute));
        assert_eq!(ConflictChoice::from_letter('z'), None);
    }

    #[test]
    fn selection_reprompts_out_of_range_and_returns_zero_based() {
        let root = TempRoot::new("prompt-select");
        let a = root.path().join("cursor.AppImage");
        let b = root.path().join("cursor");
        write_file(&a, b"elf", 0o755);
        write_file(&b, b"sh", 0o755);
        let set = scan_paths(&[a, b]);

        let mut p = prompts("0\n3\ntwo\n2\n");
        assert_eq!(
            p.select_installation(&set, SelectionPurpose::Remove)
                .expect("index"),
            1
        );
        let shown = String::from_utf8(p.output).expect("utf8");
        assert_eq!(shown.matches("Please enter a number").count(), 3);
    }

    #[test]
    fn install_dir_and_sandbox_use_defaults_on_enter() {
        let mut p = prompts("\n\n/opt/tools\nn\n");
        assert_eq!(
            p.install_dir(Path::new("/home/dev/Applications"))
                .expect("dir"),
            PathBuf::from("/home/dev/Applications")
        );
        assert_eq!(
            p.sandbox(SandboxMode::Disabled).expect("sandbox"),
            SandboxMode::Disabled
        );
        assert_eq!(
            p.install_dir(Path::new("/x")).expect("dir"),
            PathBuf::from("/opt/tools")
        );
        assert_eq!(
            p.sandbox(SandboxMode::Enabled).expect("sandbox"),
            SandboxMode::Disabled
        );
    }
}
