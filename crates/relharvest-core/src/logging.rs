//! Logging setup: env_logger behind the `log` facade, routed through
//! indicatif when progress bars are on screen.

use std::io::Write;

use indicatif::MultiProgress;

/// Padded label and ANSI color for a level
fn level_label(level: log::Level) -> (&'static str, &'static str) {
    match level {
        log::Level::Error => ("ERROR", "\x1b[31m"),
        log::Level::Warn => ("WARN ", "\x1b[33m"),
        log::Level::Info => ("INFO ", "\x1b[32m"),
        log::Level::Debug => ("DEBUG", "\x1b[36m"),
        log::Level::Trace => ("TRACE", "\x1b[35m"),
    }
}

/// Logger that suspends the progress bars while printing a line.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        let (label, color) = level_label(record.level());
        let line = format!("[{color}{label}\x1b[0m] {}", record.args());
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Default filter: `warn` when quiet, `debug` with --debug, else `info`.
/// `RUST_LOG` always wins.
fn default_level(quiet: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Initialize logging. With `multi`, lines go through the progress display;
/// without it, plain timestamped lines for log files and CI.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    let env = env_logger::Env::default().default_filter_or(default_level(quiet, debug));

    match multi {
        Some(multi) => {
            let logger = env_logger::Builder::from_env(env).build();
            let max_level = logger.filter();
            if log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone()))).is_ok() {
                log::set_max_level(max_level);
            }
        }
        None => {
            let _ = env_logger::Builder::from_env(env)
                .format(|buf, record| {
                    let (label, _) = level_label(record.level());
                    writeln!(
                        buf,
                        "{} [{label}] {}",
                        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                        record.args()
                    )
                })
                .try_init();
        }
    }
}
