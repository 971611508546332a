//! Thin renderers over [BenchmarkResult].
//!
//! Reporters are deliberately dumb consumers of the result aggregate: anything smart (more
//! percentiles, comparisons) should recompute from the embedded histograms rather than asking
//! the engine for more.

use crate::errors::{BenchError, Result};
use crate::metrics::HistogramSummary;
use crate::results::BenchmarkResult;
use crate::util::histogram_export;
use std::fmt::Write as _;
use std::str::FromStr;

/// The supported output renderings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Console,
    Json,
    Csv,
    Html,
}

impl ReportFormat {
    pub fn all() -> [ReportFormat; 4] {
        [
            ReportFormat::Console,
            ReportFormat::Json,
            ReportFormat::Csv,
            ReportFormat::Html,
        ]
    }

    /// The file extension conventionally used for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Console => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Html => "html",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = BenchError;

    fn from_str(value: &str) -> Result<ReportFormat> {
        match value.to_ascii_lowercase().as_str() {
            "console" => Ok(ReportFormat::Console),
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            "html" => Ok(ReportFormat::Html),
            other => Err(BenchError::configuration(format!(
                "unknown report format '{}'; expected console, json, csv, or html",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReportFormat::Console => "console",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Html => "html",
        };
        write!(f, "{}", name)
    }
}

/// Options consumed by the HTML renderer; the other formats ignore them.
#[derive(Clone, Debug, Default)]
pub struct ReportOptions {
    pub title: Option<String>,
    /// Embed the gzip+Base64 `.hgrm` percentile export per metric.
    pub include_raw: bool,
}

/// Renders a batch of results in the requested format.
pub fn render(results: &[BenchmarkResult], format: ReportFormat, options: &ReportOptions) -> Result<String> {
    match format {
        ReportFormat::Console => Ok(results.iter().map(render_console).collect()),
        ReportFormat::Json => serde_json::to_string_pretty(results)
            .map_err(|err| BenchError::configuration_caused_by("results are not serializable", err)),
        ReportFormat::Csv => Ok(render_csv(results)),
        ReportFormat::Html => render_html(results, options),
    }
}

fn nanos_to_micros(nanos: u64) -> f64 {
    nanos as f64 / 1_000.0
}

fn render_console(result: &BenchmarkResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "workload: {}  ({} iterations, {} warmup, seed {})",
        result.workload,
        result.config.iterations,
        result.config.warmup_iterations,
        result
            .config
            .seed
            .map(|seed| seed.to_string())
            .unwrap_or_else(|| "fresh".to_owned()),
    );
    for error in &result.errors {
        let _ = writeln!(out, "  aborted: {}", error);
    }
    for (adapter_id, adapter) in &result.adapters {
        let _ = writeln!(
            out,
            "  {} ({}): {} ok / {} failed in {:.1}ms",
            adapter_id,
            adapter.display_name,
            adapter.iterations_succeeded,
            adapter.iterations_failed,
            adapter.measurement_duration.as_secs_f64() * 1000.0
        );
        let _ = writeln!(
            out,
            "    {:<28} {:>8} {:>12} {:>10} {:>10} {:>10} {:>10}",
            "metric", "count", "mean µs", "p50 µs", "p90 µs", "p99 µs", "max µs"
        );
        for (metric, summary) in &adapter.metrics.histograms {
            let _ = writeln!(
                out,
                "    {:<28} {:>8} {:>12.2} {:>10.1} {:>10.1} {:>10.1} {:>10.1}",
                metric,
                summary.count,
                summary.mean / 1_000.0,
                nanos_to_micros(summary.p50),
                nanos_to_micros(summary.p90),
                nanos_to_micros(summary.p99),
                nanos_to_micros(summary.max),
            );
        }
    }
    out.push('\n');
    out
}

fn render_csv(results: &[BenchmarkResult]) -> String {
    let mut out = String::from(
        "workload,adapter,metric,count,mean_ns,min_ns,p50_ns,p90_ns,p95_ns,p99_ns,p999_ns,max_ns,std_dev_ns\n",
    );
    for result in results {
        for (adapter_id, adapter) in &result.adapters {
            for (metric, summary) in &adapter.metrics.histograms {
                let _ = writeln!(
                    out,
                    "{},{},{},{},{:.2},{},{},{},{},{},{},{},{:.2}",
                    result.workload,
                    adapter_id,
                    metric,
                    summary.count,
                    summary.mean,
                    summary.min,
                    summary.p50,
                    summary.p90,
                    summary.p95,
                    summary.p99,
                    summary.p999,
                    summary.max,
                    summary.std_dev,
                );
            }
        }
    }
    out
}

fn render_metric_row(out: &mut String, metric: &str, summary: &HistogramSummary, include_raw: bool) -> Result<()> {
    let _ = write!(
        out,
        "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>",
        metric, summary.count, summary.mean, summary.p50, summary.p90, summary.p99, summary.max
    );
    if include_raw {
        let encoded = histogram_export::to_hgrm_gzip(&summary.histogram)
            .map_err(|err| BenchError::configuration(format!("histogram export failed: {}", err)))?;
        let _ = write!(out, "<td><code class=\"hgrm\">{}</code></td>", encoded);
    }
    out.push_str("</tr>\n");
    Ok(())
}

fn render_html(results: &[BenchmarkResult], options: &ReportOptions) -> Result<String> {
    let title = options.title.as_deref().unwrap_or("DocBench results");
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head><body>",
        title
    );
    let _ = writeln!(out, "<h1>{}</h1>", title);

    for result in results {
        let _ = writeln!(
            out,
            "<h2>{}</h2>\n<p>{} iterations, started {}</p>",
            result.workload, result.config.iterations, result.started
        );
        if !result.errors.is_empty() {
            let _ = writeln!(out, "<ul>");
            for error in &result.errors {
                let _ = writeln!(out, "<li>aborted: {}</li>", error);
            }
            let _ = writeln!(out, "</ul>");
        }
        for (adapter_id, adapter) in &result.adapters {
            let _ = writeln!(
                out,
                "<h3>{}: {} ok / {} failed</h3>",
                adapter_id, adapter.iterations_succeeded, adapter.iterations_failed
            );
            let raw_header = if options.include_raw {
                "<th>hgrm (gzip+base64)</th>"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "<table border=\"1\"><tr><th>metric</th><th>count</th><th>mean ns</th><th>p50</th><th>p90</th><th>p99</th><th>max</th>{}</tr>",
                raw_header
            );
            for (metric, summary) in &adapter.metrics.histograms {
                render_metric_row(&mut out, metric, summary, options.include_raw)?;
            }
            let _ = writeln!(out, "</table>");
        }
    }

    let _ = writeln!(out, "</body></html>");
    Ok(out)
}

/// Renders a percentile comparison of every result against the baseline result, for the
/// requested metrics. `threshold` (a ratio, e.g. 0.1 for 10%) marks regressions;
/// `sort_by_delta` orders rows worst-first instead of by adapter id.
pub fn render_comparison(
    baseline: &BenchmarkResult,
    candidates: &[&BenchmarkResult],
    metrics: &[String],
    threshold: Option<f64>,
    sort_by_delta: bool,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "baseline: workload '{}' started {}",
        baseline.workload, baseline.started
    );

    for metric in metrics {
        let _ = writeln!(out, "\nmetric: {}", metric);
        let _ = writeln!(
            out,
            "  {:<36} {:>12} {:>12} {:>10}",
            "adapter", "p50 ns", "baseline", "delta"
        );

        // (label, candidate p50, baseline p50, delta ratio)
        let mut rows: Vec<(String, u64, u64, f64)> = Vec::new();
        for (adapter_id, adapter) in &baseline.adapters {
            let Some(base_summary) = adapter.metrics.histogram(metric) else {
                continue;
            };
            for candidate in candidates {
                let Some(candidate_adapter) = candidate.adapters.get(adapter_id) else {
                    continue;
                };
                let Some(candidate_summary) = candidate_adapter.metrics.histogram(metric) else {
                    continue;
                };
                let base = base_summary.p50 as f64;
                let current = candidate_summary.p50 as f64;
                let delta = if base > 0.0 { (current - base) / base } else { 0.0 };
                rows.push((
                    format!("{} @ {}", adapter_id, candidate.started),
                    candidate_summary.p50,
                    base_summary.p50,
                    delta,
                ));
            }
        }
        if sort_by_delta {
            rows.sort_by(|left, right| right.3.total_cmp(&left.3));
        }

        for (label, current, base, delta) in rows {
            let flag = match threshold {
                Some(threshold) if delta > threshold => "  REGRESSION",
                _ => "",
            };
            let _ = writeln!(
                out,
                "  {:<36} {:>12} {:>12} {:>9.1}%{}",
                label,
                current,
                base,
                delta * 100.0,
                flag
            );
        }
    }
    out
}
