// Exhibitor Search - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and CLI overrides
// 3. Logging initialisation (debug mode, request-history file)
// 4. Subcommand dispatch: crawl, test, list, validate, upgrade

use clap::{Args, Parser, Subcommand};
use exhibitor_search::app::config_mgr::{self, ConfigSet};
use exhibitor_search::app::crawl::{CrawlOptions, Crawler, Engine};
use exhibitor_search::app::exporter::CsvExporter;
use exhibitor_search::app::http::HttpClient;
use exhibitor_search::app::tester::{self, ConfigTester};
use exhibitor_search::app::upgrade;
use exhibitor_search::core::model::CrawlSummary;
use exhibitor_search::platform::config::{self as settings_cfg, PlatformPaths, Settings};
use exhibitor_search::util::{constants, error::CrawlError, logging};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

/// Exhibitor Search - config-driven exhibitor list crawler.
///
/// Each exhibition is described by one JSON file in the config directory.
/// Results are appended page by page to `<output-dir>/<code>.csv`.
#[derive(Parser, Debug)]
#[command(name = "exhibitor-search", version, about)]
struct Cli {
    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    /// Path to config.toml (default: working directory, then the platform config dir).
    #[arg(short = 's', long = "settings", global = true)]
    settings: Option<PathBuf>,

    /// Directory holding exhibition config JSON files.
    #[arg(short = 'c', long = "config-dir", global = true)]
    config_dir: Option<PathBuf>,

    /// Directory receiving the CSV output.
    #[arg(short = 'o', long = "output-dir", global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl one exhibition.
    Crawl(CrawlArgs),

    /// Check configs against the live API without saving anything.
    Test(TestArgs),

    /// List configured exhibitions.
    List {
        /// Only exhibitions whose city contains this text.
        #[arg(long)]
        city: Option<String>,

        /// Only exhibitions whose month contains this text.
        #[arg(long)]
        month: Option<String>,
    },

    /// Load every config and report problems.
    Validate,

    /// Add missing schema fields (city, month) to every config.
    Upgrade {
        /// Copy the configs to a timestamped backup folder first.
        #[arg(long)]
        backup: bool,
    },
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Exhibition code.
    code: String,

    /// Concurrent requests.
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// First page to request; values above 1 keep the existing output file.
    #[arg(long, default_value_t = 1)]
    start_page: u32,

    /// Stop after this many pages.
    #[arg(long)]
    max_pages: Option<u32>,

    /// Fetch pages in ordered batches instead of streaming (single mode only).
    #[arg(long)]
    batch: bool,
}

#[derive(Args, Debug)]
struct TestArgs {
    /// Exhibition code.
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    code: Option<String>,

    /// Test every config.
    #[arg(long)]
    all: bool,

    /// Configs tested concurrently with --all.
    #[arg(short = 'w', long)]
    workers: Option<usize>,
}

fn main() -> ExitCode {
    let started = Instant::now();
    let cli = Cli::parse();

    let platform_paths = PlatformPaths::resolve();
    let settings_path = settings_cfg::locate_settings_file(cli.settings.as_deref(), &platform_paths);
    let (mut settings, warnings) = settings_cfg::load_settings(settings_path.as_deref());

    if let Some(dir) = &cli.config_dir {
        settings.config_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        settings.output_dir = dir.clone();
    }

    let _log_guard = logging::init(cli.debug, settings.log_level.as_deref(), settings.log_dir.as_deref());

    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        config_dir = %settings.config_dir.display(),
        output_dir = %settings.output_dir.display(),
        "{} starting",
        constants::APP_NAME
    );

    let code = match run(cli.command, &settings) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    };

    tracing::info!(runtime_secs = started.elapsed().as_secs_f64(), "Finished");
    code
}

fn run(command: Command, settings: &Settings) -> Result<ExitCode, CrawlError> {
    match command {
        Command::Crawl(args) => crawl(args, settings),
        Command::Test(args) => test(args, settings),
        Command::List { city, month } => {
            list(settings, city.as_deref(), month.as_deref());
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate => Ok(validate(settings)),
        Command::Upgrade { backup } => upgrade_configs(settings, backup),
    }
}

fn crawl(args: CrawlArgs, settings: &Settings) -> Result<ExitCode, CrawlError> {
    let config = config_mgr::load_one(&settings.config_dir, &args.code)?;
    let client = HttpClient::new(settings)?;
    let exporter = CsvExporter::new(&settings.output_dir)?;

    let defaults = CrawlOptions::from_settings(settings);
    let options = CrawlOptions {
        workers: args.workers.unwrap_or(defaults.workers),
        start_page: args.start_page,
        max_pages: args.max_pages.or(defaults.max_pages),
        engine: if args.batch { Engine::Batches } else { Engine::Streaming },
        ..defaults
    };

    let summary = Crawler::new(config, client, exporter, options).run()?;
    if summary.had_data {
        print_summary(&summary);
        Ok(ExitCode::SUCCESS)
    } else {
        println!("No data collected for '{}'.", summary.code);
        Ok(ExitCode::FAILURE)
    }
}

fn print_summary(summary: &CrawlSummary) {
    println!("{}", "=".repeat(50));
    println!("Exhibition: {} ({})", summary.code, summary.mode);
    println!("Pages:      {}", summary.stats.pages);
    println!("Companies:  {}", summary.stats.companies);
    if summary.stats.contacts > 0 {
        println!("Contacts:   {}", summary.stats.contacts);
    }
    println!("Elapsed:    {:.1}s", summary.elapsed.as_secs_f64());
    println!("Output:     {}", summary.output_path.display());
    println!("Finished:   {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("{}", "=".repeat(50));
}

fn test(args: TestArgs, settings: &Settings) -> Result<ExitCode, CrawlError> {
    let client = HttpClient::new(settings)?;

    let reports = if args.all {
        let configs = load_reporting(&settings.config_dir);
        tester::test_all(
            &configs,
            &client,
            settings.page_size,
            args.workers.unwrap_or(settings.workers),
        )
    } else {
        let code = args.code.unwrap_or_default();
        let config = config_mgr::load_one(&settings.config_dir, &code)?;
        vec![ConfigTester::new(&config, client, settings.page_size).run()]
    };

    if reports.is_empty() {
        println!("No configs found in {}", settings.config_dir.display());
        return Ok(ExitCode::FAILURE);
    }
    if let [report] = reports.as_slice() {
        print!("{}", report.render());
    } else {
        for report in &reports {
            println!("{}", report.summary());
        }
        let passed = reports.iter().filter(|r| r.passed()).count();
        println!("\n{passed}/{} configs passed", reports.len());
    }

    if reports.iter().all(|r| r.passed()) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Load the config directory, logging every problem.
fn load_reporting(dir: &Path) -> ConfigSet {
    let (configs, errors) = config_mgr::load_all(dir);
    for err in &errors {
        tracing::warn!(error = %err, "Config loading problem");
    }
    configs
}

fn list(settings: &Settings, city: Option<&str>, month: Option<&str>) {
    let configs = load_reporting(&settings.config_dir);
    let mut shown = 0usize;
    for config in configs.filtered(city, month) {
        println!(
            "{:<30} {:<7} {:<12} {}",
            config.code,
            config.mode.label(),
            config.city,
            config.month
        );
        shown += 1;
    }
    println!("\n{shown} of {} exhibitions", configs.len());
}

fn validate(settings: &Settings) -> ExitCode {
    let (configs, errors) = config_mgr::load_all(&settings.config_dir);
    for err in &errors {
        println!("ERROR  {err}");
    }
    println!("{} valid, {} errors", configs.len(), errors.len());
    if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn upgrade_configs(settings: &Settings, backup: bool) -> Result<ExitCode, CrawlError> {
    let dir = &settings.config_dir;
    if backup {
        let root = dir
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(constants::BACKUP_DIR_NAME);
        let target = upgrade::backup_dir(dir, &root)?;
        println!("Backup written to {}", target.display());
    }

    let report = upgrade::upgrade_dir(dir)?;
    for (path, err) in &report.errors {
        println!("ERROR  {}: {err}", path.display());
    }
    println!(
        "Upgraded: {}, up to date: {}, errors: {}",
        report.upgraded.len(),
        report.skipped.len(),
        report.errors.len()
    );

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
