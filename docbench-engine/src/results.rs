//! The per-workload result aggregate: the engine's sole output and the handoff boundary to
//! report generators.

use crate::config::WorkloadConfig;
use crate::errors::{BenchError, Result};
use crate::metrics::MetricsSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// The measurement outcome for one adapter under one workload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdapterResult {
    pub adapter_id: String,
    pub display_name: String,

    /// When the measurement phase started, in wall-clock time.
    pub started: DateTime<Utc>,

    /// When the measurement phase completed, in wall-clock time.
    pub completed: DateTime<Utc>,

    pub iterations_succeeded: u32,
    pub iterations_failed: u32,

    /// Wall duration of the measurement phase only (setup and warmup excluded).
    #[serde(with = "crate::util::serde_duration_nanos")]
    pub measurement_duration: Duration,

    pub metrics: MetricsSummary,
}

impl AdapterResult {
    pub fn iterations_total(&self) -> u32 {
        self.iterations_succeeded + self.iterations_failed
    }
}

/// Everything one workload run produced, across all attempted adapters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub workload: String,
    pub config: WorkloadConfig,
    pub started: DateTime<Utc>,
    pub completed: DateTime<Utc>,

    #[serde(with = "crate::util::serde_duration_nanos")]
    pub duration: Duration,

    /// One entry per adapter whose execution aborted (connection/setup/capability failures).
    pub errors: Vec<String>,

    /// Keyed by adapter id. Empty when every adapter failed.
    pub adapters: BTreeMap<String, AdapterResult>,
}

impl BenchmarkResult {
    pub fn builder(workload: impl Into<String>) -> BenchmarkResultBuilder {
        BenchmarkResultBuilder {
            workload: workload.into(),
            config: None,
            started: None,
            completed: None,
            duration: None,
            errors: Vec::new(),
            adapters: BTreeMap::new(),
        }
    }
}

/// Builder for [BenchmarkResult]; the only way to construct one. Finalizing auto-fills the
/// completion instant and the total duration when they were not supplied.
pub struct BenchmarkResultBuilder {
    workload: String,
    config: Option<WorkloadConfig>,
    started: Option<DateTime<Utc>>,
    completed: Option<DateTime<Utc>>,
    duration: Option<Duration>,
    errors: Vec<String>,
    adapters: BTreeMap<String, AdapterResult>,
}

impl BenchmarkResultBuilder {
    pub fn config(mut self, config: WorkloadConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn started(mut self, started: DateTime<Utc>) -> Self {
        self.started = Some(started);
        self
    }

    pub fn completed(mut self, completed: DateTime<Utc>) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Stores one adapter's result, keyed by its adapter id.
    pub fn adapter_result(mut self, result: AdapterResult) -> Self {
        self.adapters.insert(result.adapter_id.clone(), result);
        self
    }

    /// Records one aborted adapter execution.
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.errors.push(message.into());
        self
    }

    pub fn build(self) -> Result<BenchmarkResult> {
        if self.workload.trim().is_empty() {
            return Err(BenchError::configuration("workload name must not be blank"));
        }
        let config = self
            .config
            .ok_or_else(|| BenchError::configuration("benchmark result requires a config"))?;

        let started = self.started.unwrap_or_else(Utc::now);
        let completed = self.completed.unwrap_or_else(Utc::now);
        let duration = self.duration.unwrap_or_else(|| {
            (completed - started).to_std().unwrap_or(Duration::ZERO)
        });

        Ok(BenchmarkResult {
            workload: self.workload,
            config,
            started,
            completed,
            duration,
            errors: self.errors,
            adapters: self.adapters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{AdapterResult, BenchmarkResult};
    use crate::config::WorkloadConfig;
    use crate::metrics::MetricsSummary;
    use anyhow::Result;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Duration;

    fn adapter_result(adapter_id: &str) -> AdapterResult {
        AdapterResult {
            adapter_id: adapter_id.to_owned(),
            display_name: adapter_id.to_uppercase(),
            started: Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap(),
            completed: Utc.with_ymd_and_hms(2024, 1, 1, 13, 5, 0).unwrap(),
            iterations_succeeded: 9,
            iterations_failed: 1,
            measurement_duration: Duration::from_secs(300),
            metrics: MetricsSummary::default(),
        }
    }

    /// Verifies explicit construction plus the derived iteration total.
    #[test]
    fn builder_with_explicit_fields() -> Result<()> {
        let started = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let completed = started + ChronoDuration::minutes(30);

        let result = BenchmarkResult::builder("traverse")
            .config(WorkloadConfig::builder("traverse").build()?)
            .started(started)
            .completed(completed)
            .duration(Duration::from_secs(1800))
            .adapter_result(adapter_result("seq_scan"))
            .adapter_result(adapter_result("hash_jump"))
            .error("flaky_adapter: connection failed: endpoint unreachable")
            .build()?;

        assert_eq!("traverse", result.workload);
        assert_eq!(Duration::from_secs(1800), result.duration);
        assert_eq!(2, result.adapters.len());
        assert_eq!(1, result.errors.len());
        assert_eq!(10, result.adapters["seq_scan"].iterations_total());
        Ok(())
    }

    /// Verifies that finalizing derives the duration from the supplied instants.
    #[test]
    fn build_derives_duration() -> Result<()> {
        let started = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let completed = started + ChronoDuration::seconds(90);

        let result = BenchmarkResult::builder("deserialize")
            .config(WorkloadConfig::builder("deserialize").build()?)
            .started(started)
            .completed(completed)
            .build()?;
        assert_eq!(Duration::from_secs(90), result.duration);
        Ok(())
    }

    /// Verifies that a missing config or blank name refuses to build.
    #[test]
    fn build_requires_name_and_config() -> Result<()> {
        assert!(BenchmarkResult::builder("traverse").build().is_err());
        assert!(BenchmarkResult::builder(" ")
            .config(WorkloadConfig::builder("traverse").build()?)
            .build()
            .is_err());
        Ok(())
    }

    /// Verifies the serialization round trip reporters rely on.
    #[test]
    fn serde_round_trip() -> Result<()> {
        let result = BenchmarkResult::builder("traverse")
            .config(WorkloadConfig::builder("traverse").seed(42).build()?)
            .started(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
            .completed(Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 0).unwrap())
            .adapter_result(adapter_result("seq_scan"))
            .build()?;

        let json = serde_json::to_string_pretty(&result)?;
        let parsed: BenchmarkResult = serde_json::from_str(&json)?;
        assert_eq!(result.workload, parsed.workload);
        assert_eq!(result.duration, parsed.duration);
        assert_eq!(result.config.seed, parsed.config.seed);
        assert_eq!(
            result.adapters["seq_scan"].iterations_succeeded,
            parsed.adapters["seq_scan"].iterations_succeeded
        );
        Ok(())
    }
}
