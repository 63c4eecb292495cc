//! relharvest - resumable harvester for GitHub release history
//!
//! Discovers the most-starred repositories and collects their release
//! history (falling back to commit-dated tags) into Parquet.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use relharvest_core::{RequestError, request_shutdown};

mod cmd;
mod config;

use cmd::HttpOverrides;
use config::Config;

#[derive(Parser)]
#[command(name = "relharvest")]
#[command(about = "Resumable harvester for GitHub release history")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./relharvest.toml or ~/.config/relharvest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// Maximum retry attempts for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Discover the population and harvest release history (resumes)
    Fetch(cmd::fetch::FetchArgs),
    /// Only write the population snapshot
    Discover(cmd::discover::DiscoverArgs),
    /// Show checkpoint progress without network access
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(relharvest_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    relharvest_core::init_logging(quiet, cli.debug, multi);

    if let Err(e) = setup_signal_handler() {
        log::error!("Failed to install signal handlers: {e}");
        return ExitCode::from(2);
    }

    let config = match cli.config {
        Some(ref path) => Config::from_file(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::from(2);
        }
    };

    let http = HttpOverrides {
        read_timeout: cli.read_timeout,
        max_retries: cli.max_retries,
    };

    let result = match cli.command {
        Command::Fetch(args) => cmd::fetch::run(args, &config, http, &progress),
        Command::Discover(args) => cmd::discover::run(args, &config, http, &progress),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Config => {
            print_config(&config, http);
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            if e.downcast_ref::<RequestError>().is_some_and(RequestError::is_fatal) {
                log::error!("Fatal API error, check GITHUB_TOKEN: {e:#}");
            } else {
                log::error!("Fatal error: {e:#}");
            }
            ExitCode::from(2)
        }
    }
}

fn setup_signal_handler() -> std::io::Result<()> {
    // First signal: set graceful shutdown flag
    // Second signal: force exit
    // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGTERM, || {
            if request_shutdown() {
                std::process::exit(130);
            }
        })?;
        signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
            if request_shutdown() {
                std::process::exit(130);
            }
        })?;
    }
    Ok(())
}

fn print_config(config: &Config, http: HttpOverrides) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec!["Output directory", &config.output.dir.display().to_string()]);
    table.add_row(vec!["API URL", &config.github.api_url]);
    table.add_row(vec![
        "GitHub token",
        if config.github.token.is_some() {
            "configured"
        } else {
            "not set"
        },
    ]);
    table.add_row(vec!["Search query", &config.harvest.query]);
    table.add_row(vec!["Target", &config.harvest.target.to_string()]);
    table.add_row(vec!["Per page", &config.harvest.per_page.to_string()]);
    table.add_row(vec!["Delay", &format!("{}ms", config.harvest.delay_ms)]);
    table.add_row(vec![
        "Page / search delay",
        &format!(
            "{}ms / {}ms",
            config.harvest.page_delay_ms, config.harvest.search_delay_ms
        ),
    ]);
    table.add_row(vec![
        "Read timeout",
        &format!("{}s", http.read_timeout.unwrap_or(config.http.read_timeout)),
    ]);
    table.add_row(vec![
        "Max retries",
        &http.max_retries.unwrap_or(config.http.max_retries).to_string(),
    ]);
    table.add_row(vec!["Rate buffer", &config.rate.buffer.to_string()]);
    table.add_row(vec!["Reset margin", &format!("{}s", config.rate.reset_margin)]);

    eprintln!("\n{table}");
}
