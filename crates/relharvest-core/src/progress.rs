//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one indicatif bar over the entity population.
//! Non-TTY mode: hidden bars; the harvest loop logs instead.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

fn entity_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<32.dim} {bar:30.green/dim} {pos:>5}/{len:5} {eta:>4} {wide_msg:.dim}")
        .expect("invalid template")
        .progress_chars("--")
}

fn stage_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:<10.cyan.bold} {wide_msg}")
        .expect("invalid template")
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: std::io::stderr().is_terminal(),
        }
    }

    /// Context that never draws (tests, piped output)
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: false,
        }
    }

    /// Bar counting entities; prefix shows the entity in flight.
    pub fn entity_bar(&self, total: usize) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(entity_style());
        pb
    }

    /// Spinner line for a stage without a known length (e.g. discovery).
    pub fn stage_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(stage_style());
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Shorten an entity name to fit the bar prefix
pub fn truncate_label(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        return name.to_string();
    }
    let keep: String = name.chars().take(width.saturating_sub(1)).collect();
    format!("{keep}…")
}

/// Format number with thousand separators.
pub fn fmt_num(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
