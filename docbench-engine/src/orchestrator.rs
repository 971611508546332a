//! The benchmark orchestrator: drives one (adapter, workload, config) triple end to end and
//! aggregates per-adapter results into a [BenchmarkResult].
//!
//! Adapters for one workload run in a sequential outer loop; measuring two adapters
//! concurrently would let them perturb each other's caches and scheduling, which is exactly the
//! noise this harness exists to avoid.

use crate::adapters::{self, DatabaseAdapter};
use crate::clock::{Clock, SystemClock};
use crate::config::WorkloadConfig;
use crate::errors::{BenchError, Result};
use crate::metrics::MetricsCollector;
use crate::results::{AdapterResult, BenchmarkResult};
use crate::workloads::{self, Workload};
use std::sync::Arc;
use tracing::{info, warn};

pub struct BenchmarkOrchestrator {
    clock: Arc<dyn Clock>,
}

impl BenchmarkOrchestrator {
    pub fn new() -> BenchmarkOrchestrator {
        BenchmarkOrchestrator::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> BenchmarkOrchestrator {
        BenchmarkOrchestrator { clock }
    }

    /// Runs one workload against one adapter: initialize → setup → warmup → measure → cleanup.
    ///
    /// Per-iteration faults are contained (logged, counted as failures); configuration,
    /// capability, connection, and setup problems abort the pair with an error.
    pub fn run_pair(
        &self,
        workload: &mut dyn Workload,
        adapter: &mut dyn DatabaseAdapter,
        config: &WorkloadConfig,
    ) -> Result<AdapterResult> {
        let diagnostics = config.validate();
        if !diagnostics.is_empty() {
            return Err(BenchError::configuration(diagnostics.join("; ")));
        }

        // Capability gate: fatal before any I/O for this pair.
        let advertised = adapter.capabilities();
        let missing: Vec<_> = workload
            .required_capabilities()
            .into_iter()
            .filter(|capability| !advertised.contains(capability))
            .collect();
        if !missing.is_empty() {
            return Err(BenchError::Capability {
                adapter: adapter.id().to_owned(),
                workload: workload.name().to_owned(),
                missing,
            });
        }

        workload.initialize(config)?;

        info!(
            workload = workload.name(),
            adapter = adapter.id(),
            "setup: starting..."
        );
        let setup_started = self.clock.monotonic_nanos();
        if let Err(error) = workload.setup_data(adapter) {
            // Leave nothing behind on a failed setup; the error itself still propagates.
            if let Err(cleanup_error) = workload.cleanup(adapter) {
                warn!(error = %cleanup_error, "cleanup after failed setup also failed");
            }
            if let Err(close_error) = adapter.close() {
                warn!(error = %close_error, "adapter close after failed setup failed");
            }
            return Err(error);
        }
        let setup_duration = self
            .clock
            .elapsed_between(setup_started, self.clock.monotonic_nanos());
        info!(
            workload = workload.name(),
            adapter = adapter.id(),
            setup_millis = setup_duration.as_millis() as u64,
            "setup: completed."
        );

        // Warmup iterations go to a throwaway accumulator; their errors are logged, nothing
        // more.
        let warmup_metrics = MetricsCollector::new();
        for iteration in 0..config.warmup_iterations {
            match workload.run_iteration(adapter, &warmup_metrics) {
                Ok(_) => {}
                Err(error) => {
                    warn!(iteration, error = %error, "warmup iteration failed");
                }
            }
        }

        let metrics = MetricsCollector::new();
        let measurement_started_wall = self.clock.wall_now();
        let measurement_started = self.clock.monotonic_nanos();
        let mut iterations_succeeded: u32 = 0;
        let mut iterations_failed: u32 = 0;
        for iteration in 0..config.iterations {
            match workload.run_iteration(adapter, &metrics) {
                Ok(result) if result.succeeded() => {
                    iterations_succeeded += 1;
                    // Failed operations contribute no timings; successful ones feed the full
                    // decomposition into the accumulator.
                    if let Some(breakdown) = adapter.overhead_breakdown(&result) {
                        metrics.record_breakdown(&breakdown);
                    }
                }
                Ok(result) => {
                    iterations_failed += 1;
                    warn!(
                        iteration,
                        operation = result.operation_id(),
                        error = result.error().unwrap_or("unknown"),
                        "iteration reported failure"
                    );
                }
                Err(error) => {
                    iterations_failed += 1;
                    warn!(iteration, error = %error, "iteration failed");
                }
            }
        }
        let measurement_duration = self
            .clock
            .elapsed_between(measurement_started, self.clock.monotonic_nanos());

        if let Err(error) = workload.cleanup(adapter) {
            warn!(error = %error, "cleanup failed");
        }
        if let Err(error) = adapter.close() {
            warn!(error = %error, "adapter close failed");
        }

        Ok(AdapterResult {
            adapter_id: adapter.id().to_owned(),
            display_name: adapter.display_name().to_owned(),
            started: measurement_started_wall,
            completed: self.clock.wall_now(),
            iterations_succeeded,
            iterations_failed,
            measurement_duration,
            metrics: metrics.summarize(),
        })
    }

    /// Runs one workload against each of the specified adapters, sequentially, creating fresh
    /// workload and adapter instances per pairing. Per-adapter failures are recorded in the
    /// result's error list; if every adapter fails the adapter map comes back empty.
    pub fn run_workload(
        &self,
        workload_id: &str,
        adapter_ids: &[String],
        config: &WorkloadConfig,
    ) -> Result<BenchmarkResult> {
        let mut builder = BenchmarkResult::builder(workload_id)
            .config(config.clone())
            .started(self.clock.wall_now());

        for adapter_id in adapter_ids {
            let mut adapter = adapters::create(adapter_id)?;
            let mut workload = workloads::create(workload_id)?;

            info!(workload = %workload_id, adapter = %adapter_id, "benchmarking...");
            match self.run_pair(workload.as_mut(), adapter.as_mut(), config) {
                Ok(result) => {
                    info!(
                        workload = %workload_id,
                        adapter = %adapter_id,
                        succeeded = result.iterations_succeeded,
                        failed = result.iterations_failed,
                        "benchmark completed."
                    );
                    builder = builder.adapter_result(result);
                }
                Err(error @ BenchError::Configuration { .. }) => {
                    // Bad input would fail every remaining adapter identically.
                    return Err(error);
                }
                Err(error) => {
                    warn!(workload = %workload_id, adapter = %adapter_id, error = %error, "benchmark aborted");
                    builder = builder.error(format!("{}: {}", adapter_id, error));
                }
            }
        }

        builder.completed(self.clock.wall_now()).build()
    }
}

impl Default for BenchmarkOrchestrator {
    fn default() -> Self {
        BenchmarkOrchestrator::new()
    }
}
