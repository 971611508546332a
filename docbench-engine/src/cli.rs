//! The `docbench` command line surface: a thin binding layer over the engine API and the
//! reporters. Every subcommand resolves to one engine or reporter call; no benchmark logic
//! lives here.

use crate::config::{params, ConnectionConfig, WorkloadConfig};
use crate::errors::BenchError;
use crate::orchestrator::BenchmarkOrchestrator;
use crate::report::{self, ReportFormat, ReportOptions};
use crate::results::BenchmarkResult;
use crate::{adapters, workloads};
use clap::{Args, Parser, Subcommand, ValueEnum};
use eyre::{bail, eyre, WrapErr};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "docbench",
    version,
    about = "Benchmarks document-database request latency and decomposes it into cost components"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one or more workloads against one or more adapters
    Run(RunArgs),
    /// Compare previously saved result files against a baseline
    Compare(CompareArgs),
    /// Render previously saved result files as a report
    Report(ReportArgs),
    /// List registered workloads, adapters, or metric names
    List(ListArgs),
    /// Validate a workload configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Workload id to run (repeatable)
    #[arg(short = 'w', long = "workload")]
    workloads: Vec<String>,

    /// Adapter id to benchmark (repeatable)
    #[arg(short = 'a', long = "adapter", required = true)]
    adapters: Vec<String>,

    /// Run every registered workload
    #[arg(long)]
    all_workloads: bool,

    /// Measured iterations per (workload, adapter) pair
    #[arg(short = 'i', long, default_value_t = 1000)]
    iterations: u32,

    /// Warmup iterations (metrics discarded)
    #[arg(long, default_value_t = 100)]
    warmup: u32,

    /// Reserved; must be 1 in this release
    #[arg(long, default_value_t = 1)]
    concurrency: u32,

    /// Override the workloads' nestingDepth parameter
    #[arg(long)]
    nesting_depth: Option<i64>,

    /// Override the workloads' fieldCount parameter
    #[arg(long)]
    field_count: Option<i64>,

    /// Override the workloads' documentCount parameter
    #[arg(long)]
    doc_count: Option<i64>,

    /// Override the workloads' documentSizeBytes parameter
    #[arg(long)]
    doc_size: Option<i64>,

    /// Write rendered output here instead of stdout (extension swapped per format)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Output format: console, json, csv, html (repeatable)
    #[arg(short = 'f', long = "format", default_values_t = [String::from("console")])]
    formats: Vec<String>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Resolve and validate everything, print the plan, run nothing
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    connection: ConnectionArgs,
}

/// Adapter connection flags; a `.env` file or `DOCBENCH_*` environment variables provide
/// defaults.
#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Opaque connection URI, passed through to the adapter untouched
    #[arg(long, env = "DOCBENCH_URI")]
    uri: Option<String>,

    #[arg(long, env = "DOCBENCH_HOST")]
    host: Option<String>,

    #[arg(long, env = "DOCBENCH_PORT")]
    port: Option<u16>,

    #[arg(long, env = "DOCBENCH_DATABASE")]
    database: Option<String>,

    #[arg(long, env = "DOCBENCH_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "DOCBENCH_PASSWORD")]
    password: Option<String>,
}

impl ConnectionArgs {
    fn to_config(&self) -> ConnectionConfig {
        if let Some(uri) = &self.uri {
            return ConnectionConfig::uri(uri.clone());
        }
        ConnectionConfig::Parameters {
            host: self.host.clone().unwrap_or_else(|| "localhost".to_owned()),
            port: self.port.unwrap_or(0),
            database: self
                .database
                .clone()
                .unwrap_or_else(|| "docbench".to_owned()),
            username: self.username.clone(),
            password: self.password.clone(),
            options: HashMap::new(),
        }
    }
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Result files produced by `run --format json`
    #[arg(required = true)]
    result_files: Vec<PathBuf>,

    /// The file to treat as the baseline (defaults to the first)
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Metric name to compare (repeatable; defaults to total_latency)
    #[arg(long = "metric")]
    metrics: Vec<String>,

    /// Output format: console or json
    #[arg(long, default_value = "console")]
    format: String,

    /// Sort order for comparison rows (currently only `delta`)
    #[arg(long)]
    sort: Option<String>,

    /// Regression threshold as a ratio (e.g. 0.1 = 10%)
    #[arg(long)]
    threshold: Option<f64>,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Result files produced by `run --format json`
    #[arg(required = true)]
    result_files: Vec<PathBuf>,

    /// Output format: console, json, csv, html
    #[arg(short = 'f', long, default_value = "html")]
    format: String,

    /// Write the report here instead of stdout
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Report title
    #[arg(long)]
    title: Option<String>,

    /// Reserved for chart-capable templates
    #[arg(long)]
    include_charts: bool,

    /// Embed the raw histogram exports per metric
    #[arg(long)]
    include_raw: bool,

    /// HTML template file with a `{{content}}` placeholder
    #[arg(long)]
    template: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(value_enum)]
    what: ListTarget,

    /// Include descriptions and capabilities
    #[arg(long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ListTarget {
    Workloads,
    Adapters,
    Metrics,
    All,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// A JSON workload-configuration file
    config_file: PathBuf,
}

/// Parses the process arguments and dispatches. The process exits 0 on success; any returned
/// error reaches the user via the binary's error reporter and exits 1.
pub fn run() -> eyre::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_benchmarks(args),
        Command::Compare(args) => run_compare(args),
        Command::Report(args) => run_report(args),
        Command::List(args) => run_list(args),
        Command::Validate(args) => run_validate(args),
    }
}

fn build_config(args: &RunArgs, workload_id: &str) -> eyre::Result<WorkloadConfig> {
    let mut builder = WorkloadConfig::builder(workload_id)
        .iterations(args.iterations)
        .warmup_iterations(args.warmup)
        .concurrency(args.concurrency)
        .connection(args.connection.to_config());
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }
    if let Some(depth) = args.nesting_depth {
        builder = builder.parameter(params::NESTING_DEPTH, depth);
    }
    if let Some(field_count) = args.field_count {
        builder = builder.parameter(params::FIELD_COUNT, field_count);
    }
    if let Some(doc_count) = args.doc_count {
        builder = builder.parameter(params::DOCUMENT_COUNT, doc_count);
    }
    if let Some(doc_size) = args.doc_size {
        builder = builder.parameter(params::DOCUMENT_SIZE_BYTES, doc_size);
    }

    let config = builder.build()?;
    let diagnostics = config.validate();
    if !diagnostics.is_empty() {
        bail!("invalid configuration:\n  {}", diagnostics.join("\n  "));
    }
    Ok(config)
}

fn run_benchmarks(args: RunArgs) -> eyre::Result<()> {
    // If present, load environment variables from a `.env` file in the working directory.
    dotenv::dotenv().ok();

    let workload_ids = if args.all_workloads {
        workloads::available()
    } else if args.workloads.is_empty() {
        bail!("no workload selected; pass --workload or --all-workloads");
    } else {
        args.workloads.clone()
    };

    let formats = args
        .formats
        .iter()
        .map(|format| format.parse::<ReportFormat>())
        .collect::<crate::errors::Result<Vec<_>>>()?;

    // Fail on unknown ids before any benchmark work.
    for adapter_id in &args.adapters {
        adapters::create(adapter_id)?;
    }
    for workload_id in &workload_ids {
        workloads::create(workload_id)?;
        build_config(&args, workload_id)?;
    }

    if args.dry_run {
        println!("dry run: would benchmark");
        for workload_id in &workload_ids {
            for adapter_id in &args.adapters {
                println!(
                    "  {} x {} ({} iterations, {} warmup)",
                    workload_id, adapter_id, args.iterations, args.warmup
                );
            }
        }
        return Ok(());
    }

    let orchestrator = BenchmarkOrchestrator::new();
    let mut results = Vec::new();
    for workload_id in &workload_ids {
        let config = build_config(&args, workload_id)?;
        info!(workload = %workload_id, "'{}': benchmarking...", workload_id);
        results.push(orchestrator.run_workload(workload_id, &args.adapters, &config)?);
    }

    let options = ReportOptions::default();
    for format in formats {
        let rendered = report::render(&results, format, &options)?;
        emit(&rendered, format, args.output.as_deref())?;
    }

    // Surface partial failure in the exit code: a run where every adapter of some workload
    // aborted is not a success.
    for result in &results {
        if result.adapters.is_empty() {
            bail!(
                "workload '{}' produced no adapter results: {}",
                result.workload,
                result.errors.join("; ")
            );
        }
    }
    Ok(())
}

fn emit(rendered: &str, format: ReportFormat, output: Option<&Path>) -> eyre::Result<()> {
    match (format, output) {
        (ReportFormat::Console, _) | (_, None) => {
            print!("{}", rendered);
            Ok(())
        }
        (format, Some(path)) => {
            let path = path.with_extension(format.extension());
            std::fs::write(&path, rendered)
                .wrap_err_with(|| format!("unable to write '{}'", path.display()))?;
            info!(path = %path.display(), "wrote {} output", format);
            Ok(())
        }
    }
}

fn load_results(path: &Path) -> eyre::Result<Vec<BenchmarkResult>> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("unable to read '{}'", path.display()))?;
    // `run` writes an array; tolerate a single bare result too.
    if let Ok(results) = serde_json::from_str::<Vec<BenchmarkResult>>(&text) {
        return Ok(results);
    }
    let single: BenchmarkResult = serde_json::from_str(&text)
        .wrap_err_with(|| format!("'{}' is not a benchmark result file", path.display()))?;
    Ok(vec![single])
}

fn run_compare(args: CompareArgs) -> eyre::Result<()> {
    let baseline_path = args.baseline.as_ref().unwrap_or(&args.result_files[0]);
    let baseline_results = load_results(baseline_path)?;
    let baseline = baseline_results
        .first()
        .ok_or_else(|| eyre!("baseline file '{}' is empty", baseline_path.display()))?;

    let mut candidates = Vec::new();
    for path in &args.result_files {
        if path == baseline_path {
            continue;
        }
        candidates.extend(load_results(path)?);
    }
    if candidates.is_empty() {
        bail!("nothing to compare against the baseline");
    }
    let candidate_refs: Vec<&BenchmarkResult> = candidates.iter().collect();

    let metrics = if args.metrics.is_empty() {
        vec!["total_latency".to_owned()]
    } else {
        args.metrics.clone()
    };
    let sort_by_delta = match args.sort.as_deref() {
        None => false,
        Some("delta") => true,
        Some(other) => bail!("unknown sort order '{}'; expected delta", other),
    };

    match args.format.as_str() {
        "console" => {
            print!(
                "{}",
                report::render_comparison(
                    baseline,
                    &candidate_refs,
                    &metrics,
                    args.threshold,
                    sort_by_delta
                )
            );
        }
        "json" => {
            let payload = serde_json::json!({
                "baseline": baseline,
                "candidates": candidates,
                "metrics": metrics,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        other => bail!("unknown compare format '{}'; expected console or json", other),
    }
    Ok(())
}

fn run_report(args: ReportArgs) -> eyre::Result<()> {
    let mut results = Vec::new();
    for path in &args.result_files {
        results.extend(load_results(path)?);
    }

    if args.include_charts {
        tracing::warn!("--include-charts requires a chart-capable template; ignoring");
    }
    let format: ReportFormat = args.format.parse()?;
    let options = ReportOptions {
        title: args.title.clone(),
        include_raw: args.include_raw,
    };
    let mut rendered = report::render(&results, format, &options)?;

    if let Some(template_path) = &args.template {
        let template = std::fs::read_to_string(template_path)
            .wrap_err_with(|| format!("unable to read template '{}'", template_path.display()))?;
        if !template.contains("{{content}}") {
            bail!("template '{}' has no {{{{content}}}} placeholder", template_path.display());
        }
        rendered = template.replace("{{content}}", &rendered);
    }

    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .wrap_err_with(|| format!("unable to write '{}'", path.display()))?;
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn run_list(args: ListArgs) -> eyre::Result<()> {
    let target = args.what;
    if matches!(target, ListTarget::Workloads | ListTarget::All) {
        println!("workloads:");
        for descriptor in workloads::describe_all() {
            if args.verbose {
                println!(
                    "  {}  {} (requires {:?})",
                    descriptor.id, descriptor.description, descriptor.required_capabilities
                );
            } else {
                println!("  {}", descriptor.id);
            }
        }
    }
    if matches!(target, ListTarget::Adapters | ListTarget::All) {
        println!("adapters:");
        for descriptor in adapters::describe_all() {
            if args.verbose {
                println!(
                    "  {}  {} v{} (capabilities {:?})",
                    descriptor.id,
                    descriptor.display_name,
                    descriptor.version,
                    descriptor.capabilities
                );
            } else {
                println!("  {}", descriptor.id);
            }
        }
    }
    if matches!(target, ListTarget::Metrics | ListTarget::All) {
        println!("metrics:");
        for name in crate::overhead::component_names::all() {
            println!("  {}", name);
        }
        for workload in workloads::available() {
            println!("  {}", workload);
        }
    }
    Ok(())
}

fn run_validate(args: ValidateArgs) -> eyre::Result<()> {
    let text = std::fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("unable to read '{}'", args.config_file.display()))?;
    let config: WorkloadConfig = serde_json::from_str(&text).map_err(|err| {
        BenchError::configuration_caused_by(
            format!("'{}' is not a workload configuration", args.config_file.display()),
            err,
        )
    })?;

    let diagnostics = config.validate();
    if !diagnostics.is_empty() {
        eprintln!("invalid configuration:");
        for diagnostic in &diagnostics {
            eprintln!("  {}", diagnostic);
        }
        bail!("{} problem(s) found", diagnostics.len());
    }
    println!("'{}' is valid", args.config_file.display());
    Ok(())
}
