//! Download progress rendering.

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    cell::RefCell,
    io::{self, IsTerminal},
};

/// Receives advisory progress; implementations must never fail the caller.
pub trait ProgressSink {
    fn begin(&self, description: &str);
    fn percent(&self, value: u8);
    fn finish(&self);
}

/// Percentage of `current` over `total`, clamped to 0..=100. `None` when the size is unknown.
pub fn percent_of(current: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(total) if total > 0 => {
            let pct = (current.min(total) as u128 * 100 / total as u128) as u8;
            Some(pct.min(100))
        }
        _ => None,
    }
}

/// Terminal progress bar on stderr; silent when stderr is not a TTY.
#[derive(Default)]
pub struct TerminalProgress {
    bar: RefCell<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for TerminalProgress {
    fn begin(&self, description: &str) {
        let bar = if io::stderr().is_terminal() {
            let bar = ProgressBar::new(100);
            let style = ProgressStyle::with_template("⬇️  {msg} [{bar:40.cyan/blue}] {pos:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            bar.set_style(style);
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(description.to_string());
        if let Some(previous) = self.bar.replace(Some(bar)) {
            previous.finish_and_clear();
        }
    }

    fn percent(&self, value: u8) {
        if let Some(bar) = self.bar.borrow().as_ref() {
            bar.set_position(u64::from(value.min(100)));
        }
    }

    fn finish(&self) {
        if let Some(bar) = self.bar.borrow_mut().take() {
            bar.finish_and_clear();
        }
    }
}
