//! CLI entry point for the educational indicators pipeline.

use anyhow::{Context, Result, anyhow};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use edu_indicators::{
    DataStore, FactQuery, Grade, Network, Pipeline, PipelineConfig, PipelineResult,
    ReportGenerator, format_number,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info};

/// CLI-compatible network enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliNetwork {
    /// State-run schools
    Estadual,
    /// Municipally-run schools
    Municipal,
}

impl From<CliNetwork> for Network {
    fn from(cli: CliNetwork) -> Self {
        match cli {
            CliNetwork::Estadual => Network::Estadual,
            CliNetwork::Municipal => Network::Municipal,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Municipal education indicators: consolidation pipeline and summaries",
    long_about = "Consolidates the index/target workbook, the enrollment census and the\n\
                  flow-rate workbook into one table per (municipality, network, grade).\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  RUST_LOG    Log filter, overrides --log-level\n\n\
                  EXAMPLES:\n  \
                  # Run with the default source locations\n  \
                  edu-indicators consolidate\n\n  \
                  # Sources described in a JSON file, index columns in the fact table\n  \
                  edu-indicators consolidate --config pipeline.json --include-index-columns\n\n  \
                  # Summaries for one municipality\n  \
                  edu-indicators summarize --municipality \"Vitória\" --network municipal"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Suppress progress output (only warnings, errors and the final result)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print JSON to stdout instead of a human-readable summary
    ///
    /// Disables all logging so stdout carries only JSON.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load, reshape and merge the three sources, then write the outputs
    Consolidate(ConsolidateArgs),
    /// Print indicator summaries from a previous run's outputs
    Summarize(SummarizeArgs),
}

#[derive(ClapArgs, Debug)]
struct ConsolidateArgs {
    /// JSON configuration file; fields it omits keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory (overrides the configuration)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Target region code, e.g. "ES" (overrides the configuration)
    #[arg(long)]
    region: Option<String>,

    /// Append index value, target and above-target columns to the fact table
    #[arg(long)]
    include_index_columns: bool,

    /// Do not write the schema sidecar next to the fact table
    #[arg(long)]
    no_schema: bool,

    /// Write a JSON run report to the output directory
    #[arg(short = 'r', long)]
    emit_report: bool,
}

#[derive(ClapArgs, Debug)]
struct SummarizeArgs {
    /// Directory holding the outputs of a run (and optionally cities.csv)
    #[arg(short, long, default_value = "database")]
    data_dir: PathBuf,

    /// Restrict to one municipality, by name
    #[arg(short, long)]
    municipality: Option<String>,

    /// Restrict to one network
    #[arg(short, long, value_enum)]
    network: Option<CliNetwork>,

    /// Restrict to one grade ("6", "6º ano", ...)
    #[arg(short, long, value_parser = parse_grade)]
    grade: Option<Grade>,

    /// Restrict to one regional education office
    #[arg(long)]
    region_office: Option<String>,

    /// Length of the ranking tables
    #[arg(long, default_value = "10")]
    top: usize,
}

fn parse_grade(label: &str) -> std::result::Result<Grade, String> {
    Grade::parse_label(label).ok_or_else(|| format!("'{}' is not a grade between 6 and 9", label))
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    // .env may set RUST_LOG, so load it before the subscriber reads the environment
    dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.quiet, cli.json);

    match &cli.command {
        Command::Consolidate(args) => run_consolidate(&cli, args),
        Command::Summarize(args) => run_summarize(&cli, args),
    }
}

// =============================================================================
// consolidate
// =============================================================================

fn build_config(args: &ConsolidateArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(region) = &args.region {
        config.filters.target_region = region.clone();
    }
    if args.include_index_columns {
        config.include_index_columns = true;
    }
    if args.no_schema {
        config.write_schema_metadata = false;
    }

    config.validate()?;
    Ok(config)
}

fn run_consolidate(cli: &Cli, args: &ConsolidateArgs) -> Result<()> {
    let config = build_config(args)?;

    let mut builder = Pipeline::builder().config(config);
    if !cli.quiet && !cli.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }
    let pipeline = builder.build()?;

    info!("{}", "=".repeat(80));
    info!("Starting consolidation...");
    info!("{}", "=".repeat(80));

    let result = match pipeline.run() {
        Ok(result) => result,
        Err(e) => {
            error!("Pipeline failed: {}", e);
            return Err(anyhow!("Pipeline failed [{}]: {}", e.error_code(), e));
        }
    };

    if args.emit_report {
        let path = pipeline.write_run_report(&result)?;
        info!("Report written to: {}", path.display());
    }

    if cli.json {
        let report = ReportGenerator::build_run_report(&result);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_run_summary(&result, pipeline.config());
    Ok(())
}

/// Print a human-readable summary of a run.
///
/// Uses `println!` on purpose: this is the command's output, not logging.
fn print_run_summary(result: &PipelineResult, config: &PipelineConfig) {
    let summary = &result.summary;
    let validation = &result.validation;

    println!();
    println!("{}", "=".repeat(80));
    println!("CONSOLIDATION COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!("Sources:");
    for source in &summary.sources {
        println!(
            "  {:<11} {} rows read, {} without municipality code",
            source.source.as_str(),
            source.raw_rows,
            source.rows_without_code
        );
    }
    println!();

    println!("Filter (region {}):", config.filters.target_region);
    for stats in &summary.filters {
        println!(
            "  {:<11} kept {} of {} rows",
            stats.source.as_str(),
            stats.kept_rows,
            stats.input_rows
        );
    }
    println!();

    println!("Fact table:");
    println!("  Rows: {}", validation.total_rows);
    println!("  Municipalities: {}", validation.distinct_municipalities);
    println!(
        "  Networks: {}",
        validation
            .networks
            .iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Rows matched with rates: {}", summary.merge.rate_matches);
    println!("  Rows matched with index values: {}", summary.merge.index_matches);
    println!("  Rows with zero enrollment: {}", validation.zero_enrollment_rows);
    println!("  Rows without approval rate: {}", validation.missing_approval_rate_rows);
    println!("  Duration: {}ms", summary.duration_ms);
    println!();

    if !validation.warnings.is_empty() {
        println!("Warnings:");
        for warning in &validation.warnings {
            println!("  - {}", warning);
        }
        println!();
    }

    if summary.outputs.is_empty() {
        println!("No files written (save_to_disk is disabled)");
    } else {
        println!("Output files:");
        for path in &summary.outputs {
            println!("  - {}", path.display());
        }
    }
    println!("{}", "=".repeat(80));
}

// =============================================================================
// summarize
// =============================================================================

#[derive(Serialize)]
struct SummaryOutput<'a> {
    query: &'a FactQuery,
    summary: edu_indicators::SummaryStats,
    performance: edu_indicators::PerformanceRates,
    performance_by_grade: BTreeMap<Grade, edu_indicators::PerformanceRates>,
    performance_by_network: BTreeMap<Network, edu_indicators::PerformanceRates>,
    enrollment_by_grade: BTreeMap<Grade, i64>,
    enrollment_by_network: BTreeMap<Network, i64>,
    enrollment_ranking: Vec<edu_indicators::EnrollmentRank>,
    enrollment_by_region_office: Vec<edu_indicators::RegionOfficeEnrollment>,
    index_by_network: Vec<edu_indicators::NetworkIndexSummary>,
    index_ranking: Vec<edu_indicators::IndexRank>,
}

fn build_query(args: &SummarizeArgs) -> FactQuery {
    let mut query = FactQuery::all();
    if let Some(network) = args.network {
        query = query.with_network(network.into());
    }
    if let Some(grade) = args.grade {
        query = query.with_grade(grade);
    }
    if let Some(name) = &args.municipality {
        query = query.with_municipality(name.clone());
    }
    if let Some(office) = &args.region_office {
        query = query.with_region_office(office.clone());
    }
    query
}

fn run_summarize(cli: &Cli, args: &SummarizeArgs) -> Result<()> {
    let store = DataStore::open(&args.data_dir, &edu_indicators::OutputNames::default())
        .with_context(|| format!("Failed to load outputs from {}", args.data_dir.display()))?;

    if let Some(name) = &args.municipality
        && store.municipality_slice(name).is_none()
    {
        return Err(anyhow!("Unknown municipality: {}", name));
    }

    let query = build_query(args);
    let output = SummaryOutput {
        query: &query,
        summary: store.summary_stats(),
        performance: store.performance(&query),
        performance_by_grade: store.performance_by_grade(&query),
        performance_by_network: store.performance_by_network(&query),
        enrollment_by_grade: store.enrollment_by_grade(&query),
        enrollment_by_network: store.enrollment_by_network(&query),
        enrollment_ranking: store.enrollment_ranking(&query, args.top),
        enrollment_by_region_office: store.enrollment_by_region_office(&query),
        index_by_network: store.index_by_network(&query),
        index_ranking: store.index_ranking(&query, args.top),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_summary(&output);
    Ok(())
}

fn print_summary(output: &SummaryOutput<'_>) {
    let summary = &output.summary;

    println!();
    println!("{}", "=".repeat(80));
    println!("EDUCATION INDICATORS");
    println!("{}", "=".repeat(80));
    println!();

    println!("Overview:");
    println!("  Municipalities: {}", summary.municipality_count);
    println!(
        "  Index records: {} ({} at or above target)",
        summary.index_records, summary.above_target_records
    );
    println!(
        "  Total enrollment: {}",
        format_number(Some(summary.total_enrollment as f64), 0)
    );
    println!(
        "  Mean approval rate: {}",
        format_number(summary.mean_approval_rate.map(|r| r * 100.0), 1)
    );
    println!(
        "  Mean dropout rate: {}",
        format_number(summary.mean_dropout_rate.map(|r| r * 100.0), 1)
    );
    println!("  Networks: {}", summary.networks.join(", "));
    println!();

    let rates = &output.performance;
    println!("Outcomes (enrollment-weighted, %):");
    println!(
        "  {:<12} {:>12} {:>10} {:>10} {:>10}",
        "", "Enrollment", "Approved", "Retained", "Dropout"
    );
    let row = |label: &str, r: &edu_indicators::PerformanceRates| {
        println!(
            "  {:<12} {:>12} {:>10} {:>10} {:>10}",
            label,
            format_number(Some(r.enrollment as f64), 0),
            format_number(Some(r.approval_pct), 1),
            format_number(Some(r.retention_pct), 1),
            format_number(Some(r.dropout_pct), 1)
        );
    };
    row("All", rates);
    for (grade, r) in &output.performance_by_grade {
        row(&grade.label(), r);
    }
    for (network, r) in &output.performance_by_network {
        row(network.as_str(), r);
    }
    println!();

    if !output.enrollment_ranking.is_empty() {
        println!("Largest enrollments:");
        for (position, rank) in output.enrollment_ranking.iter().enumerate() {
            println!(
                "  {:>3}. {:<30} {:<10} {:>10}",
                position + 1,
                rank.municipality_name,
                rank.network.as_str(),
                format_number(Some(rank.enrollment as f64), 0)
            );
        }
        println!();
    }

    if !output.enrollment_by_region_office.is_empty() {
        println!("Enrollment by region office:");
        for office in &output.enrollment_by_region_office {
            println!(
                "  {:<30} {:>10}",
                office.region_office,
                format_number(Some(office.enrollment as f64), 0)
            );
        }
        println!();
    }

    if !output.index_by_network.is_empty() {
        println!("Index by network:");
        for network in &output.index_by_network {
            println!(
                "  {:<10} mean {} / target {} ({} of {} at or above target, {}%)",
                network.network.as_str(),
                format_number(Some(network.mean_observed), 2),
                format_number(network.mean_target, 2),
                network.above_target,
                network.records,
                format_number(Some(network.above_target_pct()), 1)
            );
        }
        println!();
    }

    if !output.index_ranking.is_empty() {
        println!("Highest index values:");
        for (position, rank) in output.index_ranking.iter().enumerate() {
            let status = match rank.above_target {
                Some(true) => "met",
                Some(false) => "missed",
                None => "-",
            };
            println!(
                "  {:>3}. {:<30} {:<10} {:>5} {}",
                position + 1,
                rank.municipality_name,
                rank.network,
                format_number(Some(rank.observed), 1),
                status
            );
        }
    }
    println!("{}", "=".repeat(80));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_consolidate_flags() {
        let cli = Cli::try_parse_from([
            "edu-indicators",
            "consolidate",
            "--region",
            "MG",
            "--include-index-columns",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        let Command::Consolidate(args) = &cli.command else {
            panic!("expected consolidate");
        };
        let config = build_config(args).unwrap();
        assert_eq!(config.filters.target_region, "MG");
        assert!(config.include_index_columns);
        assert!(config.write_schema_metadata);
    }

    #[test]
    fn test_cli_parses_summarize_query() {
        let cli = Cli::try_parse_from([
            "edu-indicators",
            "summarize",
            "--network",
            "municipal",
            "--grade",
            "9º ano",
        ])
        .unwrap();

        let Command::Summarize(args) = &cli.command else {
            panic!("expected summarize");
        };
        let query = build_query(args);
        assert_eq!(query.network, Some(Network::Municipal));
        assert_eq!(query.grade, Some(Grade::NINTH));
        assert_eq!(args.data_dir, PathBuf::from("database"));
    }

    #[test]
    fn test_cli_rejects_bad_grade() {
        assert!(Cli::try_parse_from(["edu-indicators", "summarize", "--grade", "5"]).is_err());
    }
}
