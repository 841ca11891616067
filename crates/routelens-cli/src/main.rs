use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use routelens_ai::OpenAiCompatClient;
use routelens_cli::{Pipeline, RunReport, Selection};
use routelens_core::Settings;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "routelens")]
#[command(about = "Static AI review pipeline for HTTP endpoint handlers", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "pretty")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover endpoints in the route directory (or one route file)
    Scan {
        /// Route file name inside the configured route directory
        #[arg(short, long)]
        route: Option<String>,
    },

    /// Phase 1 only: extract handlers and persist analysis payloads
    Analyze {
        /// Route file name inside the configured route directory
        #[arg(short, long)]
        route: Option<String>,

        /// Endpoint selection ids, e.g. "GET /users/:id → getUser"
        #[arg(short, long)]
        endpoints: Vec<String>,

        /// Analyze every discovered endpoint
        #[arg(long, conflicts_with = "endpoints")]
        all: bool,

        /// Keep payloads from earlier runs instead of clearing the directory
        #[arg(long)]
        keep_payloads: bool,
    },

    /// Phase 2 only: review every fresh payload and persist insights
    Review {
        /// Override the configured model identifier for this run
        #[arg(short, long)]
        model: Option<String>,

        /// Concurrent model calls
        #[arg(short, long, default_value_t = 1)]
        concurrency: usize,
    },

    /// Full pipeline: analyze then review
    Run {
        #[arg(short, long)]
        route: Option<String>,

        #[arg(short, long)]
        endpoints: Vec<String>,

        #[arg(long, conflicts_with = "endpoints")]
        all: bool,

        #[arg(short, long)]
        model: Option<String>,

        #[arg(short, long, default_value_t = 1)]
        concurrency: usize,

        #[arg(long)]
        keep_payloads: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone())),
        )
        .init();

    let pipeline = Pipeline::new(settings);

    match cli.command {
        Commands::Scan { route } => {
            let endpoints = pipeline.discover(route.as_deref()).await?;
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&endpoints)?)
                }
                OutputFormat::Pretty => {
                    if endpoints.is_empty() {
                        println!("{}", "no endpoints discovered".yellow());
                    }
                    for endpoint in &endpoints {
                        println!(
                            "{}  {}",
                            endpoint.selection_id().bold(),
                            endpoint.source_file_ref.dimmed()
                        );
                    }
                }
            }
        }

        Commands::Analyze {
            route,
            endpoints,
            all,
            keep_payloads,
        } => {
            let selection = selection_from(endpoints, all);
            let mut report = RunReport::default();
            let discovered = pipeline.discover(route.as_deref()).await?;
            report.discovered = discovered.len();
            if discovered.is_empty() {
                print_report(&report, cli.format)?;
                return Ok(());
            }
            let selected = pipeline.select(discovered, &selection)?;
            report.selected = selected.len();
            pipeline
                .build_payloads(&selected, keep_payloads, &mut report)
                .await?;
            print_report(&report, cli.format)?;
        }

        Commands::Review { model, concurrency } => {
            let client = build_client(&pipeline, model.as_deref())?;
            let mut report = RunReport::default();
            pipeline.review(&client, concurrency, &mut report).await?;
            print_report(&report, cli.format)?;
        }

        Commands::Run {
            route,
            endpoints,
            all,
            model,
            concurrency,
            keep_payloads,
        } => {
            let selection = selection_from(endpoints, all);
            let client = build_client(&pipeline, model.as_deref())?;
            let report = pipeline
                .run(
                    route.as_deref(),
                    &selection,
                    &client,
                    concurrency,
                    keep_payloads,
                )
                .await?;
            print_report(&report, cli.format)?;
        }
    }

    Ok(())
}

fn selection_from(endpoints: Vec<String>, all: bool) -> Selection {
    if all {
        Selection::All
    } else {
        Selection::Ids(endpoints)
    }
}

fn build_client(pipeline: &Pipeline, model_override: Option<&str>) -> Result<OpenAiCompatClient> {
    let client = OpenAiCompatClient::new(pipeline.settings().model.clone())?;
    Ok(match model_override {
        // Override yields a fresh client configuration; nothing shared mutates.
        Some(model) => client.with_model(model),
        None => client,
    })
}

fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Pretty => {
            println!("{}", "run summary".bold());
            println!("  discovered:       {}", report.discovered);
            println!("  selected:         {}", report.selected);
            println!("  payloads written: {}", report.payloads_written);
            if report.extraction_skipped > 0 {
                println!(
                    "  skipped:          {}",
                    report.extraction_skipped.to_string().yellow()
                );
            }
            println!("  insights written: {}", report.insights_written);
            if report.model_failures > 0 {
                println!(
                    "  model failures:   {}",
                    report.model_failures.to_string().red()
                );
            }
            if report.unrecoverable_responses > 0 {
                println!(
                    "  unrecoverable:    {}",
                    report.unrecoverable_responses.to_string().yellow()
                );
            }
        }
    }
    Ok(())
}
