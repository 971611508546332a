//! The decomposed-timing model.
//!
//! An [OverheadBreakdown] splits one end-to-end request latency into named, disjoint
//! sub-durations, so a report can say how much of a request was spent fetching data versus doing
//! everything else. A zero component means "not measured by this adapter for this operation";
//! it is a sentinel, not a claim that the step was free.

use std::collections::HashMap;
use std::time::Duration;

/// The conventional metric names the thirteen components and five derived metrics are recorded
/// under when a breakdown is dispatched into an accumulator.
pub mod component_names {
    pub const TOTAL_LATENCY: &str = "total_latency";
    pub const CONNECTION_ACQUISITION: &str = "connection_acquisition";
    pub const CONNECTION_RELEASE: &str = "connection_release";
    pub const SERIALIZATION_TIME: &str = "serialization_time";
    pub const WIRE_TRANSMIT_TIME: &str = "wire_transmit_time";
    pub const SERVER_EXECUTION_TIME: &str = "server_execution_time";
    pub const SERVER_PARSE_TIME: &str = "server_parse_time";
    pub const SERVER_TRAVERSAL_TIME: &str = "server_traversal_time";
    pub const SERVER_INDEX_TIME: &str = "server_index_time";
    pub const SERVER_FETCH_TIME: &str = "server_fetch_time";
    pub const WIRE_RECEIVE_TIME: &str = "wire_receive_time";
    pub const DESERIALIZATION_TIME: &str = "deserialization_time";
    pub const CLIENT_TRAVERSAL_TIME: &str = "client_traversal_time";

    pub const TOTAL_TRAVERSAL: &str = "total_traversal";
    pub const TOTAL_OVERHEAD: &str = "total_overhead";
    pub const NETWORK_OVERHEAD: &str = "network_overhead";
    pub const SERIALIZATION_OVERHEAD: &str = "serialization_overhead";
    pub const CONNECTION_OVERHEAD: &str = "connection_overhead";

    /// Every conventional name, in protocol order, derived metrics last.
    pub fn all() -> [&'static str; 18] {
        [
            TOTAL_LATENCY,
            CONNECTION_ACQUISITION,
            CONNECTION_RELEASE,
            SERIALIZATION_TIME,
            WIRE_TRANSMIT_TIME,
            SERVER_EXECUTION_TIME,
            SERVER_PARSE_TIME,
            SERVER_TRAVERSAL_TIME,
            SERVER_INDEX_TIME,
            SERVER_FETCH_TIME,
            WIRE_RECEIVE_TIME,
            DESERIALIZATION_TIME,
            CLIENT_TRAVERSAL_TIME,
            TOTAL_TRAVERSAL,
            TOTAL_OVERHEAD,
            NETWORK_OVERHEAD,
            SERIALIZATION_OVERHEAD,
            CONNECTION_OVERHEAD,
        ]
    }
}

/// An immutable record of one operation's decomposed timings.
///
/// Construction goes through [OverheadBreakdown::builder]; unset components default to the zero
/// sentinel. The platform-specific map is copied at build time, so later mutation of the source
/// map is not observable through the record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OverheadBreakdown {
    total_latency: Duration,
    connection_acquisition: Duration,
    connection_release: Duration,
    serialization_time: Duration,
    wire_transmit_time: Duration,
    server_execution_time: Duration,
    server_parse_time: Duration,
    server_traversal_time: Duration,
    server_index_time: Duration,
    server_fetch_time: Duration,
    wire_receive_time: Duration,
    deserialization_time: Duration,
    client_traversal_time: Duration,
    platform_specific: HashMap<String, Duration>,
}

impl OverheadBreakdown {
    pub fn builder() -> OverheadBreakdownBuilder {
        OverheadBreakdownBuilder {
            breakdown: OverheadBreakdown::default(),
        }
    }

    /// End-to-end wall time for the operation.
    pub fn total_latency(&self) -> Duration {
        self.total_latency
    }

    /// Pool checkout.
    pub fn connection_acquisition(&self) -> Duration {
        self.connection_acquisition
    }

    /// Pool return.
    pub fn connection_release(&self) -> Duration {
        self.connection_release
    }

    /// Encoding the request to wire format.
    pub fn serialization_time(&self) -> Duration {
        self.serialization_time
    }

    /// Request bytes onto the network.
    pub fn wire_transmit_time(&self) -> Duration {
        self.wire_transmit_time
    }

    /// Server-reported total execution time.
    pub fn server_execution_time(&self) -> Duration {
        self.server_execution_time
    }

    /// Server-reported request parsing.
    pub fn server_parse_time(&self) -> Duration {
        self.server_parse_time
    }

    /// Server-side document navigation. The key metric.
    pub fn server_traversal_time(&self) -> Duration {
        self.server_traversal_time
    }

    /// Server-side index lookup.
    pub fn server_index_time(&self) -> Duration {
        self.server_index_time
    }

    /// Server-side storage read.
    pub fn server_fetch_time(&self) -> Duration {
        self.server_fetch_time
    }

    /// Response bytes off the network.
    pub fn wire_receive_time(&self) -> Duration {
        self.wire_receive_time
    }

    /// Response decoding on the client.
    pub fn deserialization_time(&self) -> Duration {
        self.deserialization_time
    }

    /// Client-side field access within the decoded document. The second key metric.
    pub fn client_traversal_time(&self) -> Duration {
        self.client_traversal_time
    }

    /// Additional adapter-chosen timings, folded into accumulators verbatim.
    pub fn platform_specific(&self) -> &HashMap<String, Duration> {
        &self.platform_specific
    }

    /// Everything that was not the storage read: `total_latency - server_fetch_time`.
    pub fn total_overhead(&self) -> Duration {
        self.total_latency.saturating_sub(self.server_fetch_time)
    }

    /// Combined server- and client-side document navigation cost.
    pub fn traversal_overhead(&self) -> Duration {
        self.server_traversal_time + self.client_traversal_time
    }

    pub fn network_overhead(&self) -> Duration {
        self.wire_transmit_time + self.wire_receive_time
    }

    pub fn serialization_overhead(&self) -> Duration {
        self.serialization_time + self.deserialization_time
    }

    pub fn connection_overhead(&self) -> Duration {
        self.connection_acquisition + self.connection_release
    }

    pub fn total_overhead_percentage(&self) -> f64 {
        self.percentage_of(self.total_overhead())
    }

    pub fn traversal_percentage(&self) -> f64 {
        self.percentage_of(self.traversal_overhead())
    }

    pub fn network_percentage(&self) -> f64 {
        self.percentage_of(self.network_overhead())
    }

    pub fn serialization_percentage(&self) -> f64 {
        self.percentage_of(self.serialization_overhead())
    }

    pub fn connection_percentage(&self) -> f64 {
        self.percentage_of(self.connection_overhead())
    }

    /// Share of total latency, as a percentage. Zero total latency yields 0.0, not NaN.
    fn percentage_of(&self, part: Duration) -> f64 {
        if self.total_latency.is_zero() {
            return 0.0;
        }
        part.as_nanos() as f64 / self.total_latency.as_nanos() as f64 * 100.0
    }
}

/// Builder for [OverheadBreakdown]. Component setters may be called in any order; unset
/// components stay at the zero sentinel.
pub struct OverheadBreakdownBuilder {
    breakdown: OverheadBreakdown,
}

impl OverheadBreakdownBuilder {
    pub fn total_latency(mut self, value: Duration) -> Self {
        self.breakdown.total_latency = value;
        self
    }

    pub fn connection_acquisition(mut self, value: Duration) -> Self {
        self.breakdown.connection_acquisition = value;
        self
    }

    pub fn connection_release(mut self, value: Duration) -> Self {
        self.breakdown.connection_release = value;
        self
    }

    pub fn serialization_time(mut self, value: Duration) -> Self {
        self.breakdown.serialization_time = value;
        self
    }

    pub fn wire_transmit_time(mut self, value: Duration) -> Self {
        self.breakdown.wire_transmit_time = value;
        self
    }

    pub fn server_execution_time(mut self, value: Duration) -> Self {
        self.breakdown.server_execution_time = value;
        self
    }

    pub fn server_parse_time(mut self, value: Duration) -> Self {
        self.breakdown.server_parse_time = value;
        self
    }

    pub fn server_traversal_time(mut self, value: Duration) -> Self {
        self.breakdown.server_traversal_time = value;
        self
    }

    pub fn server_index_time(mut self, value: Duration) -> Self {
        self.breakdown.server_index_time = value;
        self
    }

    pub fn server_fetch_time(mut self, value: Duration) -> Self {
        self.breakdown.server_fetch_time = value;
        self
    }

    pub fn wire_receive_time(mut self, value: Duration) -> Self {
        self.breakdown.wire_receive_time = value;
        self
    }

    pub fn deserialization_time(mut self, value: Duration) -> Self {
        self.breakdown.deserialization_time = value;
        self
    }

    pub fn client_traversal_time(mut self, value: Duration) -> Self {
        self.breakdown.client_traversal_time = value;
        self
    }

    /// Adds one platform-specific timing. By convention adapters namespace these as
    /// `<adapter_id>.<metric>`, though the engine does not enforce it.
    pub fn platform_specific(mut self, name: impl Into<String>, value: Duration) -> Self {
        self.breakdown.platform_specific.insert(name.into(), value);
        self
    }

    /// Copies every entry of the specified map into the record.
    pub fn platform_specific_map(mut self, values: &HashMap<String, Duration>) -> Self {
        self.breakdown
            .platform_specific
            .extend(values.iter().map(|(k, v)| (k.clone(), *v)));
        self
    }

    pub fn build(self) -> OverheadBreakdown {
        self.breakdown
    }
}

#[cfg(test)]
mod tests {
    use super::OverheadBreakdown;
    use std::collections::HashMap;
    use std::time::Duration;

    fn micros(value: u64) -> Duration {
        Duration::from_micros(value)
    }

    /// Verifies the documented derived-metric arithmetic against a fully-populated record.
    #[test]
    fn derived_metrics_arithmetic() {
        let breakdown = OverheadBreakdown::builder()
            .total_latency(micros(1000))
            .server_traversal_time(micros(200))
            .client_traversal_time(micros(25))
            .server_fetch_time(micros(120))
            .wire_transmit_time(micros(75))
            .wire_receive_time(micros(75))
            .serialization_time(micros(100))
            .deserialization_time(micros(80))
            .connection_acquisition(micros(50))
            .connection_release(micros(20))
            .build();

        assert_eq!(micros(225), breakdown.traversal_overhead());
        assert_eq!(micros(150), breakdown.network_overhead());
        assert_eq!(micros(180), breakdown.serialization_overhead());
        assert_eq!(micros(70), breakdown.connection_overhead());
        assert_eq!(micros(880), breakdown.total_overhead());
        assert!((breakdown.traversal_percentage() - 22.5).abs() < 1e-9);
    }

    /// Verifies that percentages with zero total latency are 0.0, not NaN.
    #[test]
    fn percentages_with_zero_total_are_zero() {
        let breakdown = OverheadBreakdown::builder()
            .server_traversal_time(micros(5))
            .build();
        assert_eq!(0.0, breakdown.traversal_percentage());
        assert_eq!(0.0, breakdown.total_overhead_percentage());
    }

    /// Verifies that partial telemetry cannot push total overhead below zero.
    #[test]
    fn total_overhead_saturates() {
        let breakdown = OverheadBreakdown::builder()
            .total_latency(micros(10))
            .server_fetch_time(micros(25))
            .build();
        assert_eq!(Duration::ZERO, breakdown.total_overhead());
    }

    /// Verifies the defensive copy: mutating the source map after construction must not be
    /// observable through the record.
    #[test]
    fn platform_specific_map_is_copied() {
        let mut source = HashMap::new();
        source.insert("oson.tree_decode".to_owned(), micros(12));

        let breakdown = OverheadBreakdown::builder()
            .platform_specific_map(&source)
            .build();

        source.insert("oson.tree_decode".to_owned(), micros(99));
        source.insert("oson.extra".to_owned(), micros(1));

        assert_eq!(
            Some(&micros(12)),
            breakdown.platform_specific().get("oson.tree_decode")
        );
        assert_eq!(1, breakdown.platform_specific().len());
    }

    /// Verifies that unset components read as the zero sentinel.
    #[test]
    fn unset_components_are_zero() {
        let breakdown = OverheadBreakdown::builder().total_latency(micros(1)).build();
        assert_eq!(Duration::ZERO, breakdown.server_index_time());
        assert_eq!(Duration::ZERO, breakdown.wire_receive_time());
        assert!(breakdown.platform_specific().is_empty());
    }
}
