//! Run statistics and the end-of-run summary table

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use comfy_table::{Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use relharvest_core::Counters;
use relharvest_core::progress::fmt_num;

use crate::resolver::{NoneReason, Outcome, Resolution};

/// Per-run counters, aggregated from each repository's [`Resolution`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Population size
    pub total: usize,
    /// Already completed by an earlier run
    pub skipped: usize,
    /// Visited in this run
    pub processed: usize,
    pub with_releases: usize,
    pub tags_only: usize,
    /// Completed without records (including not found)
    pub empty: usize,
    pub not_found: usize,
    pub failed: usize,
    pub records: usize,
    /// Tags dropped for lack of a commit date
    pub dropped: usize,
    pub parse_failures: usize,
    pub lookups: usize,
    /// Requests admitted / governor waits
    pub requests: u64,
    pub rate_waits: u64,
    /// Pending entities left unvisited (limit or interrupt)
    pub remaining: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn record(&mut self, res: &Resolution) {
        self.processed += 1;
        self.parse_failures += res.parse_failures;
        self.lookups += res.lookups;
        match &res.outcome {
            Outcome::Failed(_) => {
                self.failed += 1;
                return;
            }
            Outcome::Primary => self.with_releases += 1,
            Outcome::Secondary => self.tags_only += 1,
            Outcome::None(NoneReason::NotFound) => self.not_found += 1,
            Outcome::None(NoneReason::NoHistory) => {}
        }
        if res.records.is_empty() {
            self.empty += 1;
        }
        self.records += res.records.len();
        self.dropped += res.dropped;
    }

    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Release harvest")
                    .fg(Color::Cyan)
                    .add_attribute(Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
                Cell::new("%").fg(Color::Cyan),
            ]);

        let total = self.total;
        let rows: [(&str, usize, bool); 10] = [
            ("Repositories", total, false),
            ("Skipped (done)", self.skipped, true),
            ("With releases", self.with_releases, true),
            ("Tags only", self.tags_only, true),
            ("Empty", self.empty, true),
            ("Not found", self.not_found, true),
            ("Failed", self.failed, true),
            ("Records", self.records, false),
            ("Dropped tags", self.dropped, false),
            ("Parse failures", self.parse_failures, false),
        ];
        for (label, value, show_pct) in rows {
            let cell = if self.failed > 0 && label == "Failed" {
                Cell::new(fmt_num(value as u64)).fg(Color::Red)
            } else {
                Cell::new(fmt_num(value as u64))
            };
            let pct = if show_pct {
                format!("{:.1}", pct(value, total))
            } else {
                String::new()
            };
            table.add_row(vec![Cell::new(label), cell, Cell::new(pct)]);
        }
        table.add_row(vec![
            Cell::new("Requests"),
            Cell::new(format!(
                "{} ({} rate waits)",
                fmt_num(self.requests),
                self.rate_waits
            )),
            Cell::new(""),
        ]);
        if self.remaining > 0 {
            table.add_row(vec![
                Cell::new("Remaining"),
                Cell::new(fmt_num(self.remaining as u64)).fg(Color::Yellow),
                Cell::new(""),
            ]);
        }
        table.add_row(vec![
            Cell::new("Elapsed"),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())),
            Cell::new(""),
        ]);

        format!("\n{table}")
    }

    /// Summary table on stderr (TTY mode)
    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }

    /// One-line summary (non-TTY mode)
    pub fn log(&self) {
        log::info!(
            "Harvest complete: {} repositories ({} skipped, {} releases, {} tags only, {} empty, {} failed), {} records, {} dropped [{:.1}s]",
            fmt_num(self.total as u64),
            self.skipped,
            self.with_releases,
            self.tags_only,
            self.empty,
            self.failed,
            fmt_num(self.records as u64),
            self.dropped,
            self.elapsed.as_secs_f64()
        );
    }
}

/// Checkpoint and output state, read without network access
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub output_dir: PathBuf,
    pub counters: Counters,
    pub completed: usize,
    /// Repositories whose latest attempt failed, with reasons
    pub pending_failures: Vec<(String, String)>,
    pub partitions: usize,
    pub has_snapshot: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl StatusReport {
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(self.output_dir.display().to_string())
                    .fg(Color::Cyan)
                    .add_attribute(Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);
        let c = &self.counters;
        table.add_row(vec![
            Cell::new("Population snapshot"),
            Cell::new(if self.has_snapshot { "yes" } else { "no" }),
        ]);
        table.add_row(vec![Cell::new("Completed"), Cell::new(fmt_num(self.completed as u64))]);
        table.add_row(vec![Cell::new("  empty"), Cell::new(fmt_num(c.empty))]);
        table.add_row(vec![Cell::new("Records"), Cell::new(fmt_num(c.records))]);
        table.add_row(vec![Cell::new("Partitions"), Cell::new(fmt_num(self.partitions as u64))]);
        table.add_row(vec![
            Cell::new("Failed (pending retry)"),
            Cell::new(fmt_num(self.pending_failures.len() as u64)),
        ]);
        table.add_row(vec![Cell::new("Failure events"), Cell::new(fmt_num(c.failed))]);
        table.add_row(vec![
            Cell::new("Last updated"),
            Cell::new(
                self.last_updated
                    .map_or_else(|| "never".to_string(), |t| t.to_rfc3339()),
            ),
        ]);
        format!("\n{table}")
    }
}

/// Calculate percentage safely.
fn pct(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}
