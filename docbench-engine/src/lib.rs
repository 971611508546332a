//! DocBench: a benchmarking engine for document databases that does more than time requests:
//! it decomposes each request's latency into its cost components (connection, serialization,
//! wire transit, server execution, server traversal, client deserialization, client traversal)
//! so the useful work of fetching data can be separated from everything else. The flagship
//! comparison is between two binary-document traversal strategies: sequential length-prefixed
//! scanning and hash-indexed offset jumping.
//!
//! The crate is organized the way the data flows: an [orchestrator](crate::orchestrator) loads
//! a [workload](crate::workloads) and an [adapter](crate::adapters), drives setup (documents
//! from the [generator](crate::generator), inserted through the adapter), runs warmup and
//! measured iterations, feeds every [overhead breakdown](crate::overhead) into the
//! [metrics accumulator](crate::metrics), and emits a [benchmark result](crate::results) for
//! downstream reporters.

pub mod adapters;
pub mod cli;
pub mod clock;
pub mod config;
pub mod document;
pub mod errors;
pub mod generator;
pub mod metrics;
pub mod operation;
pub mod orchestrator;
pub mod overhead;
pub mod report;
pub mod results;
pub mod rng;
pub mod util;
pub mod workloads;

pub use crate::adapters::{Capability, DatabaseAdapter, InstrumentedConnection, TestEnvironment};
pub use crate::clock::{Clock, MockClock, SystemClock, TimingContext};
pub use crate::config::{ConnectionConfig, WorkloadConfig};
pub use crate::document::JsonDocument;
pub use crate::errors::{BenchError, Result};
pub use crate::generator::DocumentGenerator;
pub use crate::metrics::{MetricsCollector, MetricsSummary};
pub use crate::operation::{Operation, OperationKind, OperationResult, ReadPreference};
pub use crate::orchestrator::BenchmarkOrchestrator;
pub use crate::overhead::OverheadBreakdown;
pub use crate::results::{AdapterResult, BenchmarkResult};
pub use crate::rng::SeededRng;
pub use crate::workloads::Workload;

use tracing::info;

/// Runs every selected workload against every selected adapter (both sequentially, to keep
/// timings clean of cross-run interference) and returns one [BenchmarkResult] per workload.
///
/// `base_config` supplies iterations, warmup, seed, connection, and parameters; its name is
/// replaced by each workload's id as the runs are set up.
pub fn run_benchmarks(
    workload_ids: &[String],
    adapter_ids: &[String],
    base_config: &WorkloadConfig,
) -> Result<Vec<BenchmarkResult>> {
    let orchestrator = BenchmarkOrchestrator::new();
    let mut results = Vec::with_capacity(workload_ids.len());
    for workload_id in workload_ids {
        let mut config = base_config.clone();
        config.name = workload_id.clone();
        info!("'{}': benchmarking...", workload_id);
        results.push(orchestrator.run_workload(workload_id, adapter_ids, &config)?);
        info!("'{}': completed.", workload_id);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use crate::config::{params, WorkloadConfig};
    use anyhow::Result;

    /// Runs both built-in workloads against both built-in adapters through the public entry
    /// point.
    #[test]
    fn run_benchmarks_end_to_end() -> Result<()> {
        let config = WorkloadConfig::builder("placeholder")
            .iterations(2)
            .warmup_iterations(0)
            .seed(3)
            .parameter(params::DOCUMENT_COUNT, 4)
            .parameter(params::DOCUMENT_SIZE_BYTES, 1500)
            .build()?;

        let results = super::run_benchmarks(
            &["traverse".to_owned(), "deserialize".to_owned()],
            &["seq_scan".to_owned(), "hash_jump".to_owned()],
            &config,
        )?;

        assert_eq!(2, results.len());
        for result in &results {
            assert_eq!(2, result.adapters.len(), "workload {}", result.workload);
            assert!(result.errors.is_empty());
            for adapter_result in result.adapters.values() {
                assert_eq!(2, adapter_result.iterations_succeeded);
                assert!(adapter_result
                    .metrics
                    .histogram(&result.workload)
                    .is_some());
            }
        }
        Ok(())
    }
}
