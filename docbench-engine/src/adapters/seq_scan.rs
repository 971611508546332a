//! The sequential-scan reference adapter.
//!
//! Documents are stored in the length-prefixed entry encoding and fields are located by walking
//! entries front to back, so the cost of reaching a field grows with its position in the
//! document. This is the scan-based half of the pair of strategies the adapter interface was
//! designed around; it also serves as the engine's in-memory test double.

use crate::adapters::codec::{self, FieldSlot};
use crate::adapters::{Capability, DatabaseAdapter, InstrumentedConnection, TestEnvironment};
use crate::clock::{Clock, SystemClock};
use crate::config::ConnectionConfig;
use crate::document::JsonDocument;
use crate::errors::{BenchError, Result};
use crate::metrics::MetricsCollector;
use crate::operation::{Operation, OperationKind, OperationResult};
use crate::overhead::OverheadBreakdown;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub const ADAPTER_ID: &str = "seq_scan";

/// Adapter-private connection state, reachable through
/// [InstrumentedConnection::inner_mut].
pub struct ConnectionState {
    pub operations_executed: u64,
}

/// Times a closure against the adapter clock.
fn timed<T>(clock: &Arc<dyn Clock>, work: impl FnOnce() -> T) -> (T, Duration) {
    let start = clock.monotonic_nanos();
    let value = work();
    let elapsed = clock.elapsed_between(start, clock.monotonic_nanos());
    (value, elapsed)
}

pub struct SeqScanAdapter {
    clock: Arc<dyn Clock>,
    collections: HashMap<String, HashMap<String, Vec<u8>>>,
    environment: Option<TestEnvironment>,
    connections_issued: u64,
    closed: bool,
}

impl std::fmt::Debug for SeqScanAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqScanAdapter")
            .field("connections_issued", &self.connections_issued)
            .field("closed", &self.closed)
            .finish()
    }
}

impl SeqScanAdapter {
    pub fn new() -> SeqScanAdapter {
        SeqScanAdapter::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> SeqScanAdapter {
        SeqScanAdapter {
            clock,
            collections: HashMap::new(),
            environment: None,
            connections_issued: 0,
            closed: false,
        }
    }

    fn current_collection(&self, operation_id: &str, kind: OperationKind) -> Result<String> {
        self.environment
            .as_ref()
            .map(|environment| environment.collection.clone())
            .ok_or_else(|| {
                BenchError::operation(operation_id, kind, "no test environment prepared")
            })
    }

    fn execute_insert(
        &mut self,
        operation_id: &str,
        document: &JsonDocument,
    ) -> Result<OperationResult> {
        let clock = Arc::clone(&self.clock);
        let started = clock.wall_now();
        let total_start = clock.monotonic_nanos();

        let collection = self.current_collection(operation_id, OperationKind::Insert)?;
        let (bytes, serialization) = timed(&clock, || codec::encode_content(document.content()));

        let documents = self
            .collections
            .get_mut(&collection)
            .ok_or_else(|| {
                BenchError::operation(operation_id, OperationKind::Insert, "collection missing")
            })?;
        let key = document.id().to_owned();
        let ((), fetch) = timed(&clock, || {
            documents.insert(key, bytes);
        });

        let total = clock.elapsed_between(total_start, clock.monotonic_nanos());
        let breakdown = OverheadBreakdown::builder()
            .total_latency(total)
            .serialization_time(serialization)
            .server_fetch_time(fetch)
            .server_execution_time(fetch)
            .build();
        Ok(
            OperationResult::success(operation_id, OperationKind::Insert, total, Some(breakdown))
                .with_started(started)
                .with_completed(clock.wall_now())
                .with_metadata("collection", collection),
        )
    }

    fn execute_read(
        &mut self,
        operation_id: &str,
        key: &str,
        projection: &[String],
        metrics: &MetricsCollector,
    ) -> Result<OperationResult> {
        let clock = Arc::clone(&self.clock);
        let started = clock.wall_now();
        let total_start = clock.monotonic_nanos();

        let collection = self.current_collection(operation_id, OperationKind::Read)?;

        // Request encode: the key plus the projection list.
        let (_, serialization) =
            timed(&clock, || serde_json::to_vec(&(key, projection)).ok());

        // Parsing the projection paths is the server's request-parse phase.
        let (paths, parse) = timed(&clock, || {
            projection
                .iter()
                .map(|path| crate::document::parse_path(path))
                .collect::<Vec<_>>()
        });

        let documents = self.collections.get(&collection).ok_or_else(|| {
            BenchError::operation(operation_id, OperationKind::Read, "collection missing")
        })?;
        let (fetched, fetch) = timed(&clock, || documents.get(key).cloned());
        let Some(fetched) = fetched else {
            let total = clock.elapsed_between(total_start, clock.monotonic_nanos());
            return Ok(OperationResult::failure(
                operation_id,
                OperationKind::Read,
                total,
                format!("document '{}' not found", key),
            )
            .with_started(started)
            .with_completed(clock.wall_now()));
        };

        // Server-side traversal: one sequential scan per projected root field.
        let mut entries_compared = 0usize;
        let (selected, traversal): (Vec<(String, Option<FieldSlot>)>, Duration) =
            timed(&clock, || {
                paths
                    .iter()
                    .filter_map(|segments| segments.first())
                    .map(|root| {
                        let (slot, compared) = codec::scan_for_field(&fetched, &root.name);
                        entries_compared += compared;
                        (root.name.clone(), slot)
                    })
                    .collect()
            });
        metrics.add_counter("seq_scan.entries_compared", entries_compared as u64);

        // Client-side decode of whatever the server selected.
        let (content, deserialization) = timed(&clock, || {
            if projection.is_empty() {
                codec::decode_content(&fetched)
            } else {
                let mut content = Map::new();
                for (name, slot) in &selected {
                    if let Some(value) = slot.and_then(|slot| codec::decode_value(&fetched, slot))
                    {
                        content.insert(name.clone(), value);
                    }
                }
                content
            }
        });

        // Client-side traversal: resolve each projected path within the decoded document.
        let document = JsonDocument::new(key, content);
        let (resolved, client_traversal) = timed(&clock, || {
            projection
                .iter()
                .filter(|path| document.has_path(path))
                .count()
        });

        let total = clock.elapsed_between(total_start, clock.monotonic_nanos());
        let breakdown = OverheadBreakdown::builder()
            .total_latency(total)
            .serialization_time(serialization)
            .server_parse_time(parse)
            .server_traversal_time(traversal)
            .server_fetch_time(fetch)
            .server_execution_time(parse + traversal + fetch)
            .deserialization_time(deserialization)
            .client_traversal_time(client_traversal)
            .platform_specific(
                format!("{}.scan", ADAPTER_ID),
                traversal,
            )
            .build();
        Ok(
            OperationResult::success(operation_id, OperationKind::Read, total, Some(breakdown))
                .with_started(started)
                .with_completed(clock.wall_now())
                .with_payload(document.to_value())
                .with_metadata("collection", collection)
                .with_metadata("paths_resolved", resolved.to_string()),
        )
    }

    fn execute_update(
        &mut self,
        operation_id: &str,
        key: &str,
        path: &str,
        value: &Value,
        upsert: bool,
    ) -> Result<OperationResult> {
        let clock = Arc::clone(&self.clock);
        let started = clock.wall_now();
        let total_start = clock.monotonic_nanos();

        let collection = self.current_collection(operation_id, OperationKind::Update)?;
        let documents = self.collections.get_mut(&collection).ok_or_else(|| {
            BenchError::operation(operation_id, OperationKind::Update, "collection missing")
        })?;

        let (existing, fetch) = timed(&clock, || documents.get(key).cloned());
        let (mut document, deserialization) = match existing {
            Some(bytes) => {
                let (content, elapsed) = timed(&clock, || codec::decode_content(&bytes));
                (JsonDocument::new(key, content), elapsed)
            }
            None if upsert => (JsonDocument::empty(key), Duration::ZERO),
            None => {
                let total = clock.elapsed_between(total_start, clock.monotonic_nanos());
                return Ok(OperationResult::failure(
                    operation_id,
                    OperationKind::Update,
                    total,
                    format!("document '{}' not found", key),
                )
                .with_started(started)
                .with_completed(clock.wall_now()));
            }
        };

        let ((), traversal) = timed(&clock, || document.set_path(path, value.clone()));
        let (bytes, serialization) = timed(&clock, || codec::encode_content(document.content()));
        let ((), store) = timed(&clock, || {
            documents.insert(key.to_owned(), bytes);
        });

        let total = clock.elapsed_between(total_start, clock.monotonic_nanos());
        let breakdown = OverheadBreakdown::builder()
            .total_latency(total)
            .serialization_time(serialization)
            .deserialization_time(deserialization)
            .server_traversal_time(traversal)
            .server_fetch_time(fetch + store)
            .server_execution_time(fetch + traversal + store)
            .build();
        Ok(
            OperationResult::success(operation_id, OperationKind::Update, total, Some(breakdown))
                .with_started(started)
                .with_completed(clock.wall_now())
                .with_metadata("collection", collection),
        )
    }

    fn execute_delete(&mut self, operation_id: &str, key: &str) -> Result<OperationResult> {
        let clock = Arc::clone(&self.clock);
        let started = clock.wall_now();
        let total_start = clock.monotonic_nanos();

        let collection = self.current_collection(operation_id, OperationKind::Delete)?;
        let documents = self.collections.get_mut(&collection).ok_or_else(|| {
            BenchError::operation(operation_id, OperationKind::Delete, "collection missing")
        })?;

        let (removed, fetch) = timed(&clock, || documents.remove(key));
        let total = clock.elapsed_between(total_start, clock.monotonic_nanos());

        if removed.is_none() {
            return Ok(OperationResult::failure(
                operation_id,
                OperationKind::Delete,
                total,
                format!("document '{}' not found", key),
            )
            .with_started(started)
            .with_completed(clock.wall_now()));
        }
        let breakdown = OverheadBreakdown::builder()
            .total_latency(total)
            .server_fetch_time(fetch)
            .server_execution_time(fetch)
            .build();
        Ok(
            OperationResult::success(operation_id, OperationKind::Delete, total, Some(breakdown))
                .with_started(started)
                .with_completed(clock.wall_now())
                .with_metadata("collection", collection),
        )
    }
}

impl Default for SeqScanAdapter {
    fn default() -> Self {
        SeqScanAdapter::new()
    }
}

impl DatabaseAdapter for SeqScanAdapter {
    fn id(&self) -> &str {
        ADAPTER_ID
    }

    fn display_name(&self) -> &str {
        "Sequential Scan (length-prefixed)"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn capabilities(&self) -> HashSet<Capability> {
        HashSet::from([
            Capability::PartialDocumentRetrieval,
            Capability::NestedDocumentAccess,
            Capability::ServerTraversalTiming,
            Capability::ClientTimingHooks,
            Capability::DeserializationMetrics,
        ])
    }

    fn connect(&mut self, config: &ConnectionConfig) -> Result<InstrumentedConnection> {
        if self.closed {
            return Err(BenchError::connection("adapter is closed"));
        }
        let diagnostics = self.validate_config(config);
        if !diagnostics.is_empty() {
            return Err(BenchError::connection(diagnostics.join("; ")));
        }
        self.connections_issued += 1;
        Ok(InstrumentedConnection::new(
            format!("{}-conn-{}", ADAPTER_ID, self.connections_issued),
            Box::new(ConnectionState {
                operations_executed: 0,
            }),
        ))
    }

    fn execute(
        &mut self,
        connection: &mut InstrumentedConnection,
        operation: &Operation,
        metrics: &MetricsCollector,
    ) -> Result<OperationResult> {
        if !connection.is_valid() {
            return Err(BenchError::connection(format!(
                "connection '{}' is closed",
                connection.id()
            )));
        }

        let result = match operation {
            Operation::Insert { id, document } => self.execute_insert(id, document)?,
            Operation::Read {
                id,
                key,
                projection,
                ..
            } => self.execute_read(id, key, projection, metrics)?,
            Operation::Update {
                id,
                key,
                path,
                value,
                upsert,
            } => self.execute_update(id, key, path, value, *upsert)?,
            Operation::Delete { id, key } => self.execute_delete(id, key)?,
            Operation::Aggregate { id, .. } => OperationResult::failure(
                id,
                OperationKind::Aggregate,
                Duration::ZERO,
                "aggregate pipelines are not supported by this adapter",
            ),
        };

        connection.record_timing(&operation.kind().to_string(), result.total_duration());
        if let Some(state) = connection.inner_mut::<ConnectionState>() {
            state.operations_executed += 1;
        }
        Ok(result)
    }

    fn setup_test_environment(&mut self, environment: &TestEnvironment) -> Result<()> {
        if environment.collection.trim().is_empty() {
            return Err(BenchError::setup("collection name must not be blank"));
        }
        if environment.drop_existing {
            self.collections.remove(&environment.collection);
        }
        self.collections
            .entry(environment.collection.clone())
            .or_default();
        self.environment = Some(environment.clone());
        Ok(())
    }

    fn teardown_test_environment(&mut self) -> Result<()> {
        if let Some(environment) = self.environment.take() {
            self.collections.remove(&environment.collection);
        }
        Ok(())
    }

    fn validate_config(&self, config: &ConnectionConfig) -> Vec<String> {
        let mut diagnostics = Vec::new();
        match config {
            ConnectionConfig::Uri(uri) if uri.trim().is_empty() => {
                diagnostics.push("connection.uri: must not be blank".to_owned());
            }
            ConnectionConfig::Parameters { database, .. } if database.trim().is_empty() => {
                diagnostics.push("connection.database: must not be blank".to_owned());
            }
            _ => {}
        }
        diagnostics
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.collections.clear();
        self.environment = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionState, SeqScanAdapter, ADAPTER_ID};
    use crate::adapters::{DatabaseAdapter, TestEnvironment};
    use crate::config::ConnectionConfig;
    use crate::document::JsonDocument;
    use crate::metrics::MetricsCollector;
    use crate::operation::{Operation, ReadPreference};
    use anyhow::Result;
    use serde_json::json;

    fn seeded_adapter() -> Result<(SeqScanAdapter, crate::adapters::InstrumentedConnection)> {
        let mut adapter = SeqScanAdapter::new();
        adapter.setup_test_environment(&TestEnvironment::new("bench_test"))?;
        let mut connection = adapter.connect(&ConnectionConfig::default())?;
        let metrics = MetricsCollector::new();

        let mut content = serde_json::Map::new();
        content.insert("first".to_owned(), json!("a"));
        content.insert("nested".to_owned(), json!({"target": "leaf"}));
        content.insert("last".to_owned(), json!(42));
        let document = JsonDocument::new("doc-1", content);
        let result = adapter.execute(
            &mut connection,
            &Operation::insert("setup-0", document),
            &metrics,
        )?;
        anyhow::ensure!(result.succeeded(), "seed insert failed");
        Ok((adapter, connection))
    }

    /// Verifies a projected read: only the projected field comes back, the breakdown carries
    /// traversal timings, and the scan counter reflects a positional walk.
    #[test]
    fn projected_read() -> Result<()> {
        let (mut adapter, mut connection) = seeded_adapter()?;
        let metrics = MetricsCollector::new();

        let operation = Operation::read(
            "op-1",
            "doc-1",
            vec!["nested.target".to_owned()],
            ReadPreference::Primary,
        );
        let result = adapter.execute(&mut connection, &operation, &metrics)?;

        assert!(result.succeeded());
        let payload = result.payload().expect("read returns a payload");
        assert_eq!(Some(&json!("leaf")), payload.pointer("/nested/target"));
        assert!(payload.get("last").is_none(), "unprojected field leaked");

        let breakdown = result.breakdown().expect("breakdown present");
        assert!(breakdown.total_latency() >= breakdown.server_traversal_time());
        // `nested` is the third stored field (after `_id` and `first`).
        assert_eq!(3, metrics.counter("seq_scan.entries_compared"));
        Ok(())
    }

    /// Verifies a full-document read and the connection's accumulated timing snapshot.
    #[test]
    fn full_read_and_connection_state() -> Result<()> {
        let (mut adapter, mut connection) = seeded_adapter()?;
        let metrics = MetricsCollector::new();

        let operation = Operation::read("op-1", "doc-1", vec![], ReadPreference::Primary);
        let result = adapter.execute(&mut connection, &operation, &metrics)?;

        assert!(result.succeeded());
        let payload = result.payload().expect("payload");
        assert_eq!(Some(&json!("a")), payload.get("first"));
        assert_eq!(Some(&json!(42)), payload.get("last"));

        assert!(connection.timing_snapshot().contains_key("read"));
        let state = connection
            .inner_ref::<ConnectionState>()
            .expect("private state");
        assert_eq!(2, state.operations_executed); // seed insert + read
        Ok(())
    }

    /// Verifies that a missing document is an in-band failure, not an `Err`.
    #[test]
    fn missing_document_fails_in_band() -> Result<()> {
        let (mut adapter, mut connection) = seeded_adapter()?;
        let metrics = MetricsCollector::new();

        let operation = Operation::read("op-1", "no-such-doc", vec![], ReadPreference::Primary);
        let result = adapter.execute(&mut connection, &operation, &metrics)?;
        assert!(!result.succeeded());
        assert!(result.error().unwrap().contains("no-such-doc"));
        Ok(())
    }

    /// Verifies update (including upsert) and delete round out the write paths.
    #[test]
    fn update_and_delete() -> Result<()> {
        let (mut adapter, mut connection) = seeded_adapter()?;
        let metrics = MetricsCollector::new();

        let update = Operation::update("op-1", "doc-1", "nested.target", json!("updated"), false);
        assert!(adapter.execute(&mut connection, &update, &metrics)?.succeeded());

        let read = Operation::read("op-2", "doc-1", vec!["nested.target".to_owned()], ReadPreference::Primary);
        let result = adapter.execute(&mut connection, &read, &metrics)?;
        assert_eq!(
            Some(&json!("updated")),
            result.payload().unwrap().pointer("/nested/target")
        );

        let upsert = Operation::update("op-3", "doc-2", "fresh", json!(1), true);
        assert!(adapter.execute(&mut connection, &upsert, &metrics)?.succeeded());

        let delete = Operation::delete("op-4", "doc-2");
        assert!(adapter.execute(&mut connection, &delete, &metrics)?.succeeded());
        let gone = Operation::delete("op-5", "doc-2");
        assert!(!adapter.execute(&mut connection, &gone, &metrics)?.succeeded());
        Ok(())
    }

    /// Verifies environment lifecycle: teardown drops the data and is idempotent; close is
    /// idempotent and connections refuse to execute afterwards.
    #[test]
    fn environment_and_close_lifecycle() -> Result<()> {
        let (mut adapter, mut connection) = seeded_adapter()?;
        let metrics = MetricsCollector::new();

        adapter.teardown_test_environment()?;
        adapter.teardown_test_environment()?;

        let operation = Operation::read("op-1", "doc-1", vec![], ReadPreference::Primary);
        assert!(adapter.execute(&mut connection, &operation, &metrics).is_err());

        adapter.close()?;
        adapter.close()?;
        assert!(adapter.connect(&ConnectionConfig::default()).is_err());

        connection.close();
        assert!(adapter.execute(&mut connection, &operation, &metrics).is_err());
        Ok(())
    }

    /// Verifies the pre-flight config check.
    #[test]
    fn config_validation() {
        let adapter = SeqScanAdapter::new();
        assert!(adapter.validate_config(&ConnectionConfig::default()).is_empty());
        assert!(!adapter
            .validate_config(&ConnectionConfig::uri("  "))
            .is_empty());
        assert_eq!(ADAPTER_ID, adapter.id());
    }
}
