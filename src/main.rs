//! nr-reports CLI - report run orchestration

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use nr_reports::config::mask_api_key;
use nr_reports::context::{EnvSource, ProcessEnv};
use nr_reports::discovery::parse_var;
use nr_reports::event::{FanoutSink, TracingSink};
use nr_reports::resource::{ChromeLauncher, CommandMerger};
use nr_reports::secrets::{EnvSecrets, SecretStore, StaticSecrets, API_KEY_SECRET};
use nr_reports::{
    Discovery, Engine, EventLog, FileDiscovery, FixSuggestion, Generators, NerdgraphClient,
    OutcomeStatus, ReportError, RunContext, RunOptions, RunSummary, RunnerConfig, Services,
};

#[derive(Parser)]
#[command(name = "nr-reports")]
#[command(about = "Generate reports and publish them to channels")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reports of a manifest (or a single report from flags)
    Run {
        #[command(flatten)]
        selection: Selection,

        /// Publish configurations to deliver to (comma-separated)
        #[arg(long, value_delimiter = ',', default_value = "default")]
        publish_config_ids: Vec<String>,

        /// Template search path, `:`-separated
        #[arg(long)]
        template_path: Option<String>,

        /// Write recorded events as NDJSON
        #[arg(long)]
        events_file: Option<PathBuf>,

        /// Config file (defaults to ~/.config/nr-reports/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Load the manifest and list its reports without running them
    Validate {
        #[command(flatten)]
        selection: Selection,
    },
}

#[derive(Args)]
struct Selection {
    /// Manifest file or glob pattern (repeatable)
    #[arg(short = 'f', long = "manifest")]
    manifests: Vec<String>,

    /// Single template report
    #[arg(long)]
    template_name: Option<String>,

    /// Single dashboard report (repeatable GUIDs)
    #[arg(long = "dashboard")]
    dashboards: Vec<String>,

    /// Single NRQL query report
    #[arg(long)]
    query: Option<String>,

    /// Account ids for the query report
    #[arg(long = "account-id", value_delimiter = ',')]
    account_ids: Vec<u64>,

    /// Merge the dashboard PDFs into one document
    #[arg(long)]
    combine_pdfs: bool,

    /// Id of the single report
    #[arg(long)]
    name: Option<String>,

    /// Manifest variable override, `key=value` (repeatable)
    #[arg(long = "var")]
    vars: Vec<String>,
}

impl Selection {
    fn into_options(self, publish_config_ids: Vec<String>) -> Result<RunOptions, ReportError> {
        let mut options = RunOptions {
            manifest_paths: self.manifests,
            template_name: self.template_name,
            dashboards: self.dashboards,
            query: self.query,
            account_ids: self.account_ids,
            combine_pdfs: self.combine_pdfs,
            report_name: self.name,
            ..Default::default()
        };
        if !publish_config_ids.is_empty() {
            options.publish_config_ids = publish_config_ids;
        }
        for raw in &self.vars {
            let (key, value) = parse_var(raw)?;
            options.variables.insert(key, value);
        }
        Ok(options)
    }
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            selection,
            publish_config_ids,
            template_path,
            events_file,
            config,
        } => {
            run_reports(selection, publish_config_ids, template_path, events_file, config).await
        }
        Commands::Validate { selection } => validate_manifest(selection).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn run_reports(
    selection: Selection,
    publish_config_ids: Vec<String>,
    template_path: Option<String>,
    events_file: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<(), ReportError> {
    let options = selection.into_options(publish_config_ids)?;

    let config = match &config_path {
        Some(path) => RunnerConfig::load_from(path)?,
        None => RunnerConfig::load()?,
    };
    let mut config = config.with_env()?;
    if let Some(path) = template_path {
        config.runner.template_path = Some(path);
    }

    let env: Arc<dyn EnvSource> = Arc::new(ProcessEnv);
    let secrets: Arc<dyn SecretStore> = match config.api_key() {
        Some(key) => {
            debug!(api_key = %mask_api_key(key, 7), "using configured API key");
            Arc::new(StaticSecrets::new().with(API_KEY_SECRET, key))
        }
        None => Arc::new(EnvSecrets::new(Arc::clone(&env))),
    };

    let events = EventLog::new();
    let telemetry = FanoutSink::new(vec![Arc::new(TracingSink), Arc::new(events.clone())]);
    let services = Services::new(config.runner_id(), env!("CARGO_PKG_VERSION"))
        .with_env(env)
        .with_secrets(Arc::clone(&secrets))
        .with_telemetry(Arc::new(telemetry))
        .with_default_channel_type(config.default_channel_type());
    let ctx = RunContext::new(services, config.context_values()?);

    let api = NerdgraphClient::new(config.endpoint(), secrets.secret(API_KEY_SECRET));
    let merger = CommandMerger::new(config.merge_command());
    let engine = Engine::new(Generators::new(Arc::new(api), Arc::new(merger)))
        .with_browser_launcher(Arc::new(ChromeLauncher::new(config.chrome_path())));

    let result = engine.run(&ctx, &options).await;

    if let Some(path) = &events_file {
        events.write_ndjson(path)?;
        debug!(path = %path.display(), events = events.len(), "wrote events");
    }

    print_summary(&result?);
    Ok(())
}

async fn validate_manifest(selection: Selection) -> Result<(), ReportError> {
    let options = selection.into_options(Vec::new())?;
    let ctx = RunContext::new(
        Services::new(nr_reports::config::DEFAULT_RUNNER_ID, env!("CARGO_PKG_VERSION")),
        Default::default(),
    );
    let manifest = FileDiscovery.discover_reports(&ctx, &options).await?;
    if manifest.is_empty() {
        return Err(ReportError::NoReports);
    }

    let invalid: Vec<(usize, &str)> = manifest
        .reports
        .iter()
        .enumerate()
        .filter_map(|(index, report)| report.invalid_reason().map(|reason| (index, reason)))
        .collect();

    if invalid.is_empty() {
        println!("{} Manifest is valid", "✓".green());
    } else {
        println!("{} Manifest has {} invalid report(s)", "✗".red(), invalid.len());
    }
    println!("  Reports: {}", manifest.len());
    for (index, report) in manifest.reports.iter().enumerate() {
        match report.invalid_reason() {
            Some(reason) => println!(
                "  {} {} ({})",
                "✗".red(),
                report.display_name(index),
                reason
            ),
            None => println!(
                "  {} {} ({})",
                "-".cyan(),
                report.display_name(index),
                report.kind.name()
            ),
        }
    }
    println!("  Variables: {}", manifest.variables.len());

    match invalid.first() {
        Some((index, reason)) => Err(ReportError::InvalidReport {
            report: manifest.reports[*index].display_name(*index),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn print_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        let marker = match outcome.status {
            OutcomeStatus::Succeeded => "✓".green(),
            OutcomeStatus::NoOutput => "○".yellow(),
            OutcomeStatus::Failed => "✗".red(),
            OutcomeStatus::Skipped => "-".dimmed(),
        };
        match &outcome.message {
            Some(message) => println!("{} {}: {}", marker, outcome.report_name, message),
            None => println!(
                "{} {} {}",
                marker,
                outcome.report_name,
                format!("({}ms)", outcome.duration_ms).dimmed()
            ),
        }
    }

    let totals = format!(
        "{} processed, {} succeeded, {} no output, {} failed, {} skipped",
        summary.processed, summary.succeeded, summary.no_output, summary.failed, summary.skipped
    );
    if summary.has_failures() {
        println!("{}", totals.red().bold());
    } else {
        println!("{}", totals.green().bold());
    }
}
