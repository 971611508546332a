//! The thread-safe metrics accumulator.
//!
//! A [MetricsCollector] keeps one HDR histogram per metric name plus a table of counters. Many
//! threads may record concurrently (an adapter's timing listener may fire on a driver I/O
//! thread); [MetricsCollector::summarize] takes a weak point-in-time snapshot.

use crate::overhead::{component_names, OverheadBreakdown};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// The largest recordable duration: one hour. Recordings above this saturate to it; this ceiling
/// is part of the accumulator's contract, not an implementation accident.
pub const MAX_TRACKABLE: Duration = Duration::from_secs(60 * 60);

/// Histogram precision: three significant figures across the full range.
const SIGNIFICANT_FIGURES: u8 = 3;

fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, MAX_TRACKABLE.as_nanos() as u64, SIGNIFICANT_FIGURES)
        .expect("static histogram bounds")
}

/// Thread-safe accumulator of named latency histograms and counters.
///
/// Locking is per-histogram: concurrent recordings against different metric names never contend,
/// and recordings against the same name serialize on that one histogram's mutex.
pub struct MetricsCollector {
    histograms: RwLock<HashMap<String, Arc<Mutex<Histogram<u64>>>>>,
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl MetricsCollector {
    pub fn new() -> MetricsCollector {
        MetricsCollector {
            histograms: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
        }
    }

    fn histogram(&self, metric: &str) -> Arc<Mutex<Histogram<u64>>> {
        if let Some(histogram) = self
            .histograms
            .read()
            .expect("histogram table lock")
            .get(metric)
        {
            return Arc::clone(histogram);
        }
        let mut table = self.histograms.write().expect("histogram table lock");
        Arc::clone(
            table
                .entry(metric.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(new_histogram()))),
        )
    }

    fn counter_cell(&self, name: &str) -> Arc<AtomicU64> {
        if let Some(counter) = self.counters.read().expect("counter table lock").get(name) {
            return Arc::clone(counter);
        }
        let mut table = self.counters.write().expect("counter table lock");
        Arc::clone(
            table
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(AtomicU64::new(0))),
        )
    }

    /// Appends one sample to the named histogram. Values above [MAX_TRACKABLE] saturate to it.
    pub fn record(&self, metric: &str, duration: Duration) {
        let nanos = duration.as_nanos().min(MAX_TRACKABLE.as_nanos()) as u64;
        let histogram = self.histogram(metric);
        histogram
            .lock()
            .expect("histogram lock")
            .saturating_record(nanos);
    }

    /// Appends one raw-nanosecond sample. Negative values are coerced to zero; this is the entry
    /// point for listener callbacks that compute deltas themselves.
    pub fn record_nanos(&self, metric: &str, nanos: i64) {
        self.record(metric, Duration::from_nanos(nanos.max(0) as u64));
    }

    /// Dispatches every component of the breakdown, the five derived metrics, and the
    /// platform-specific map (verbatim names) into their conventional buckets.
    pub fn record_breakdown(&self, breakdown: &OverheadBreakdown) {
        self.record(component_names::TOTAL_LATENCY, breakdown.total_latency());
        self.record(
            component_names::CONNECTION_ACQUISITION,
            breakdown.connection_acquisition(),
        );
        self.record(
            component_names::CONNECTION_RELEASE,
            breakdown.connection_release(),
        );
        self.record(
            component_names::SERIALIZATION_TIME,
            breakdown.serialization_time(),
        );
        self.record(
            component_names::WIRE_TRANSMIT_TIME,
            breakdown.wire_transmit_time(),
        );
        self.record(
            component_names::SERVER_EXECUTION_TIME,
            breakdown.server_execution_time(),
        );
        self.record(
            component_names::SERVER_PARSE_TIME,
            breakdown.server_parse_time(),
        );
        self.record(
            component_names::SERVER_TRAVERSAL_TIME,
            breakdown.server_traversal_time(),
        );
        self.record(
            component_names::SERVER_INDEX_TIME,
            breakdown.server_index_time(),
        );
        self.record(
            component_names::SERVER_FETCH_TIME,
            breakdown.server_fetch_time(),
        );
        self.record(
            component_names::WIRE_RECEIVE_TIME,
            breakdown.wire_receive_time(),
        );
        self.record(
            component_names::DESERIALIZATION_TIME,
            breakdown.deserialization_time(),
        );
        self.record(
            component_names::CLIENT_TRAVERSAL_TIME,
            breakdown.client_traversal_time(),
        );

        self.record(component_names::TOTAL_TRAVERSAL, breakdown.traversal_overhead());
        self.record(component_names::TOTAL_OVERHEAD, breakdown.total_overhead());
        self.record(component_names::NETWORK_OVERHEAD, breakdown.network_overhead());
        self.record(
            component_names::SERIALIZATION_OVERHEAD,
            breakdown.serialization_overhead(),
        );
        self.record(
            component_names::CONNECTION_OVERHEAD,
            breakdown.connection_overhead(),
        );

        for (name, duration) in breakdown.platform_specific() {
            self.record(name, *duration);
        }
    }

    /// Times a synchronous closure, records the elapsed duration under the named metric, and
    /// propagates the closure's return value.
    pub fn time_operation<T>(&self, metric: &str, operation: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let value = operation();
        self.record(metric, started.elapsed());
        value
    }

    /// Adds one to the named counter.
    pub fn increment_counter(&self, name: &str) {
        self.add_counter(name, 1);
    }

    /// Adds `value` to the named counter.
    pub fn add_counter(&self, name: &str, value: u64) {
        self.counter_cell(name).fetch_add(value, Ordering::Relaxed);
    }

    /// Returns the named counter's current value (zero if never touched).
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .expect("counter table lock")
            .get(name)
            .map(|cell| cell.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Drops all recorded state. A summary produced strictly after `reset` returns observes no
    /// pre-reset samples.
    pub fn reset(&self) {
        self.histograms
            .write()
            .expect("histogram table lock")
            .clear();
        self.counters.write().expect("counter table lock").clear();
    }

    /// Produces a snapshot summary of every histogram and counter. The snapshot is weak: records
    /// still in flight on other threads may or may not be included.
    pub fn summarize(&self) -> MetricsSummary {
        let histograms = {
            let table = self.histograms.read().expect("histogram table lock");
            table
                .iter()
                .map(|(name, histogram)| {
                    let histogram = histogram.lock().expect("histogram lock");
                    (name.clone(), HistogramSummary::of(&histogram))
                })
                .collect()
        };
        let counters = {
            let table = self.counters.read().expect("counter table lock");
            table
                .iter()
                .map(|(name, cell)| (name.clone(), cell.load(Ordering::Relaxed)))
                .collect()
        };
        MetricsSummary {
            histograms,
            counters,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        MetricsCollector::new()
    }
}

/// Point-in-time statistics for one metric, in nanoseconds. Carries the full serialized
/// histogram so downstream reporters can recompute percentiles that were never pre-derived.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub mean: f64,
    pub min: u64,
    pub max: u64,
    pub std_dev: f64,
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
    pub p999: u64,
    #[serde(with = "crate::util::serde_histogram")]
    pub histogram: Histogram<u64>,
}

impl HistogramSummary {
    fn of(histogram: &Histogram<u64>) -> HistogramSummary {
        HistogramSummary {
            count: histogram.len(),
            mean: histogram.mean(),
            min: histogram.min(),
            max: histogram.max(),
            std_dev: histogram.stdev(),
            p50: histogram.value_at_quantile(0.50),
            p90: histogram.value_at_quantile(0.90),
            p95: histogram.value_at_quantile(0.95),
            p99: histogram.value_at_quantile(0.99),
            p999: histogram.value_at_quantile(0.999),
            histogram: histogram.clone(),
        }
    }
}

/// A snapshot of every metric an accumulator has seen.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub histograms: BTreeMap<String, HistogramSummary>,
    pub counters: BTreeMap<String, u64>,
}

impl MetricsSummary {
    pub fn histogram(&self, metric: &str) -> Option<&HistogramSummary> {
        self.histograms.get(metric)
    }

    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty() && self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{MetricsCollector, MAX_TRACKABLE};
    use crate::overhead::{component_names, OverheadBreakdown};
    use std::sync::Arc;
    use std::time::Duration;

    /// Verifies basic composition: N samples of the same value produce count N with tight
    /// bounds around the value.
    #[test]
    fn record_and_summarize() {
        let collector = MetricsCollector::new();
        let value = Duration::from_micros(250);
        for _ in 0..40 {
            collector.record("m", value);
        }

        let summary = collector.summarize();
        let m = summary.histogram("m").expect("metric recorded");
        assert_eq!(40, m.count);
        assert!(m.min <= value.as_nanos() as u64);
        assert!(m.max >= value.as_nanos() as u64);
        let relative_error = (m.mean - value.as_nanos() as f64).abs() / value.as_nanos() as f64;
        assert!(relative_error < 0.01, "mean error {}", relative_error);
    }

    /// Verifies percentile extraction against a known uniform distribution, within the
    /// histogram's precision.
    #[test]
    fn percentile_accuracy() {
        let collector = MetricsCollector::new();
        for micros in 1..=100u64 {
            collector.record("m", Duration::from_micros(micros));
        }

        let summary = collector.summarize();
        let m = summary.histogram("m").expect("metric recorded");
        let p50_micros = m.p50 / 1_000;
        let p99_micros = m.p99 / 1_000;
        assert!((49..=51).contains(&p50_micros), "p50 was {}µs", p50_micros);
        assert!((98..=100).contains(&p99_micros), "p99 was {}µs", p99_micros);
    }

    /// Verifies that negative raw samples coerce to zero instead of panicking.
    #[test]
    fn negative_nanos_coerce_to_zero() {
        let collector = MetricsCollector::new();
        collector.record_nanos("m", -12345);

        let summary = collector.summarize();
        let m = summary.histogram("m").expect("metric recorded");
        assert_eq!(1, m.count);
        assert_eq!(0, m.min);
    }

    /// Verifies saturation at the one-hour ceiling.
    #[test]
    fn values_above_cap_saturate() {
        let collector = MetricsCollector::new();
        collector.record("m", MAX_TRACKABLE * 3);

        let summary = collector.summarize();
        let m = summary.histogram("m").expect("metric recorded");
        assert_eq!(1, m.count);
        assert!(m.max <= MAX_TRACKABLE.as_nanos() as u64);
    }

    /// Verifies that a breakdown dispatch fills the conventional buckets plus the platform map.
    #[test]
    fn record_breakdown_dispatches_all_buckets() {
        let collector = MetricsCollector::new();
        let breakdown = OverheadBreakdown::builder()
            .total_latency(Duration::from_micros(1000))
            .server_traversal_time(Duration::from_micros(200))
            .client_traversal_time(Duration::from_micros(25))
            .server_fetch_time(Duration::from_micros(120))
            .platform_specific("seq_scan.scan", Duration::from_micros(180))
            .build();
        collector.record_breakdown(&breakdown);

        let summary = collector.summarize();
        for name in component_names::all() {
            assert!(
                summary.histogram(name).is_some(),
                "missing bucket '{}'",
                name
            );
        }
        assert_eq!(1, summary.histogram("seq_scan.scan").unwrap().count);

        // The derived traversal bucket saw one 225µs sample, within histogram precision.
        let traversal = summary
            .histogram(component_names::TOTAL_TRAVERSAL)
            .unwrap();
        let expected = Duration::from_micros(225).as_nanos() as f64;
        assert!((traversal.max as f64 - expected).abs() / expected < 0.001);
    }

    /// Verifies counters and `time_operation` value propagation.
    #[test]
    fn counters_and_timed_closures() {
        let collector = MetricsCollector::new();
        collector.increment_counter("iterations");
        collector.add_counter("iterations", 4);
        assert_eq!(5, collector.counter("iterations"));
        assert_eq!(0, collector.counter("never_touched"));

        let value = collector.time_operation("closure", || 7 * 6);
        assert_eq!(42, value);
        assert_eq!(1, collector.summarize().histogram("closure").unwrap().count);
    }

    /// Verifies that reset drops all state.
    #[test]
    fn reset_clears_everything() {
        let collector = MetricsCollector::new();
        collector.record("m", Duration::from_micros(5));
        collector.increment_counter("c");

        collector.reset();
        let summary = collector.summarize();
        assert!(summary.is_empty());
    }

    /// Verifies that concurrent recordings from many threads all land.
    #[test]
    fn concurrent_recording() {
        let collector = Arc::new(MetricsCollector::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let collector = Arc::clone(&collector);
                std::thread::spawn(move || {
                    for i in 0..1000u64 {
                        collector.record("shared", Duration::from_nanos(i + 1));
                        collector.record(&format!("thread_{}", t), Duration::from_nanos(i + 1));
                        collector.increment_counter("total");
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().expect("recorder thread");
        }

        let summary = collector.summarize();
        assert_eq!(8000, summary.histogram("shared").unwrap().count);
        assert_eq!(8000, summary.counters.get("total").copied().unwrap_or(0));
        for t in 0..8 {
            assert_eq!(
                1000,
                summary.histogram(&format!("thread_{}", t)).unwrap().count
            );
        }
    }
}
