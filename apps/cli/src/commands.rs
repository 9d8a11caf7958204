//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use lectio_core::{PipelineState, ProgressReporter, ReflectionOrchestrator, write_bundle};
use lectio_liturgy::{ArchiveLink, PrayerDataset};
use lectio_shared::{
    AppConfig, AugmentedBundle, BundleStatus, Reading, init_config, load_config, load_config_from,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Lectio: AI-augmented daily readings.
#[derive(Parser)]
#[command(
    name = "lectio",
    version,
    about = "Augment the day's Scripture readings with synopses, a reflection and a prayer.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.lectio/lectio.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate and write the bundle for one day.
    Generate {
        /// JSON file holding the day's readings (array of title/citation/text).
        #[arg(short, long)]
        readings: PathBuf,

        /// Liturgical date, YYYY-MM-DD (defaults to today).
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Output directory (defaults to [output] dir).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Budget ceiling in USD for this run.
        #[arg(long)]
        budget: Option<f64>,

        /// Prayer dataset to use instead of the configured one.
        #[arg(long)]
        prayers: Option<PathBuf>,
    },

    /// Prayer dataset operations.
    Prayers {
        #[command(subcommand)]
        action: PrayersAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Prayer dataset subcommands.
#[derive(Subcommand)]
pub(crate) enum PrayersAction {
    /// Validate a dataset and print its version and fingerprint.
    Check {
        /// Dataset file (defaults to the configured or embedded dataset).
        #[arg(long)]
        prayers: Option<PathBuf>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "lectio=info",
        1 => "lectio=debug",
        _ => "lectio=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Generate {
            readings,
            date,
            out,
            budget,
            prayers,
        } => {
            let options = GenerateOptions {
                readings,
                date,
                out,
                budget,
                prayers,
            };
            cmd_generate(config_path, options).await
        }
        Command::Prayers { action } => match action {
            PrayersAction::Check { prayers } => cmd_prayers_check(config_path, prayers.as_deref()),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

struct GenerateOptions {
    readings: PathBuf,
    date: Option<NaiveDate>,
    out: Option<PathBuf>,
    budget: Option<f64>,
    prayers: Option<PathBuf>,
}

fn read_readings(path: &Path) -> Result<Vec<Reading>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read readings file '{}': {e}", path.display()))?;
    let readings: Vec<Reading> = serde_json::from_str(&raw)
        .map_err(|e| eyre!("readings file '{}' is not a JSON array of readings: {e}", path.display()))?;
    Ok(readings)
}

async fn cmd_generate(config_path: Option<&Path>, options: GenerateOptions) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(budget) = options.budget {
        config.budget.ceiling_usd = budget;
    }
    if let Some(prayers) = &options.prayers {
        config.prayers.dataset_path = Some(prayers.display().to_string());
    }
    config.validate()?;

    let readings = read_readings(&options.readings)?;
    let date = options
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let out_dir = options
        .out
        .unwrap_or_else(|| PathBuf::from(&config.output.dir));

    info!(
        %date,
        readings = readings.len(),
        ceiling = config.budget.ceiling_usd,
        out = %out_dir.display(),
        "generating bundle"
    );

    let orchestrator = ReflectionOrchestrator::from_config(&config)?;
    let reporter = CliProgress::new();
    let bundle = orchestrator.run(date, readings, &reporter).await;

    if let Some(reason) = bundle.failure_reason() {
        return Err(eyre!("bundle for {date} failed: {reason}"));
    }

    let path = write_bundle(&out_dir, &bundle)?;
    print_summary(&bundle, &path);
    Ok(())
}

fn print_summary(bundle: &AugmentedBundle, path: &Path) {
    let status = match bundle.status() {
        BundleStatus::Success => "success",
        BundleStatus::Partial => "partial (incomplete generated text)",
        BundleStatus::Failed => "failed",
    };
    let generated = bundle.synopses().iter().filter(|s| s.is_generated()).count();

    println!();
    println!("  Bundle written for {}", bundle.date);
    if let Some(content) = bundle.content() {
        println!("  Day:        {}", content.liturgical_day);
    }
    println!("  Status:     {status}");
    println!("  Synopses:   {generated}/{}", bundle.readings.len());
    println!(
        "  Reflection: {}",
        if bundle.reflection().is_some() { "yes" } else { "no" }
    );
    for citation in bundle.reflection().map(|r| r.citations.as_slice()).unwrap_or_default() {
        let link = citation
            .archive_url()
            .map(|u| u.to_string())
            .unwrap_or_default();
        println!("  CCC {:<7} {link}", citation.reference_number);
    }
    if let Some(prayer) = bundle.prayer() {
        println!("  Prayer:     {} ({})", prayer.title, prayer.source_name);
    }
    println!(
        "  Cost:       ${:.4} of ${:.2} over {} call(s)",
        bundle.cost_summary.total_cost,
        bundle.cost_summary.ceiling,
        bundle.cost_summary.api_calls_count
    );
    for gap in bundle.missing() {
        println!(
            "  Missing:    {:?}{}: {}",
            gap.step,
            gap.subject
                .as_deref()
                .map(|s| format!(" [{s}]"))
                .unwrap_or_default(),
            gap.cause
        );
    }
    println!("  Path:       {}", path.display());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, state: PipelineState) {
        self.spinner.set_message(state.label());
    }

    fn synopsis_settled(&self, title: &str, generated: bool, current: usize, total: usize) {
        let mark = if generated { "ok" } else { "missing" };
        self.spinner
            .set_message(format!("Synopsis [{current}/{total}] {title}: {mark}"));
    }

    fn done(&self, _bundle: &AugmentedBundle) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// prayers / config
// ---------------------------------------------------------------------------

fn cmd_prayers_check(config_path: Option<&Path>, prayers: Option<&Path>) -> Result<()> {
    let dataset = match prayers {
        Some(path) => PrayerDataset::load(Some(path))?,
        None => {
            let config = resolve_config(config_path)?;
            PrayerDataset::load(config.prayers.dataset_path.as_deref().map(Path::new))?
        }
    };

    println!("  Prayer dataset OK");
    println!("  Version:     {}", dataset.version());
    println!("  Entries:     {}", dataset.len());
    println!("  Fingerprint: {}", dataset.fingerprint());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
