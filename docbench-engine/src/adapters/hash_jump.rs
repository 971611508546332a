//! The hash-indexed reference adapter.
//!
//! Documents are stored in the same length-prefixed encoding as the sequential-scan adapter,
//! but every write also builds a field-name → offset index. Reads probe the index and jump
//! straight to the value bytes, so the cost of reaching a field is flat regardless of its
//! position. This is the offset-jump half of the strategy pair the adapter interface compares.

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

pub const ADAPTER_ID: &str = "hash_jump";

/// Adapter-private connection state.
pub struct ConnectionState {
    pub operations_executed: u64,
}

/// An encoded document plus the write-time field index reads jump through.
struct StoredDocument {
    bytes: Vec<u8>,
    index: HashMap<String, FieldSlot>,
}

impl StoredDocument {
    fn encode(content: &crate::document::JsonMap) -> StoredDocument {
        let bytes = codec::encode_content(content);
        let index = codec::build_field_index(&bytes);
        StoredDocument { bytes, index }
    }
}

fn timed<T>(clock: &Arc<dyn Clock>, work: impl FnOnce() -> T) -> (T, Duration) {
    let start = clock.monotonic_nanos();
    let value = work();
    let elapsed = clock.elapsed_between(start, clock.monotonic_nanos());
    (value, elapsed)
}

pub struct HashJumpAdapter {
    clock: Arc<dyn Clock>,
    collections: HashMap<String, HashMap<String, StoredDocument>>,
    environment: Option<TestEnvironment>,
    connections_issued: u64,
    closed: bool,
}

impl std::fmt::Debug for HashJumpAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashJumpAdapter")
            .field("connections_issued", &self.connections_issued)
            .field("closed", &self.closed)
            .finish()
    }
}

impl HashJumpAdapter {
    pub fn new() -> HashJumpAdapter {
        HashJumpAdapter::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> HashJumpAdapter {
        HashJumpAdapter {
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

    fn store(
        &mut self,
        operation_id: &str,
        kind: OperationKind,
        collection: &str,
        key: String,
        document: StoredDocument,
    ) -> Result<()> {
        self.collections
            .get_mut(collection)
            .ok_or_else(|| BenchError::operation(operation_id, kind, "collection missing"))?
            .insert(key, document);
        Ok(())
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
        let (index, index_build) = timed(&clock, || codec::build_field_index(&bytes));
        let stored = StoredDocument { bytes, index };
        let ((), fetch) = {
            let key = document.id().to_owned();
            let (result, elapsed) = timed(&clock, || {
                self.store(operation_id, OperationKind::Insert, &collection, key, stored)
            });
            (result?, elapsed)
        };

        let total = clock.elapsed_between(total_start, clock.monotonic_nanos());
        let breakdown = OverheadBreakdown::builder()
            .total_latency(total)
            .serialization_time(serialization)
            .server_index_time(index_build)
            .server_fetch_time(fetch)
            .server_execution_time(index_build + fetch)
            .platform_specific(format!("{}.index_build", ADAPTER_ID), index_build)
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
        let (_, serialization) = timed(&clock, || serde_json::to_vec(&(key, projection)).ok());
        let (paths, parse) = timed(&clock, || {
            projection
                .iter()
                .map(|path| crate::document::parse_path(path))
                .collect::<Vec<_>>()
        });

        let documents = self.collections.get(&collection).ok_or_else(|| {
            BenchError::operation(operation_id, OperationKind::Read, "collection missing")
        })?;
        let Some(stored) = documents.get(key) else {
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

        // Index probe, then an offset jump per projected root field. No entry walking.
        let (selected, index_probe): (Vec<(String, Option<FieldSlot>)>, Duration) =
            timed(&clock, || {
                paths
                    .iter()
                    .filter_map(|segments| segments.first())
                    .map(|root| (root.name.clone(), stored.index.get(&root.name).copied()))
                    .collect()
            });
        metrics.add_counter(
            &format!("{}.index_probes", ADAPTER_ID),
            selected.len() as u64,
        );

        let (fetched, fetch) = timed(&clock, || {
            if projection.is_empty() {
                stored.bytes.clone()
            } else {
                // Only the selected slots' bytes leave the "server".
                let mut bytes = Vec::new();
                for (_, slot) in &selected {
                    if let Some(slot) = slot {
                        bytes.extend_from_slice(
                            &stored.bytes[slot.offset..slot.offset + slot.len],
                        );
                    }
                }
                bytes
            }
        });
        let stored_bytes = stored.bytes.clone();
        let (content, deserialization) = timed(&clock, || {
            if projection.is_empty() {
                codec::decode_content(&fetched)
            } else {
                let mut content = Map::new();
                for (name, slot) in &selected {
                    if let Some(value) =
                        slot.and_then(|slot| codec::decode_value(&stored_bytes, slot))
                    {
                        content.insert(name.clone(), value);
                    }
                }
                content
            }
        });

        let document = JsonDocument::new(key, content);
        let (resolved, client_traversal) = timed(&clock, || {
            projection
                .iter()
                .filter(|path| document.has_path(path))
                .count()
        });

        let total = clock.elapsed_between(total_start, clock.monotonic_nanos());
        // Probe cost goes to the index component only. There is no positional walk here, so
        // server traversal stays at zero; that near-zero reading versus the scan strategy is
        // the whole point of the comparison.
        let breakdown = OverheadBreakdown::builder()
            .total_latency(total)
            .serialization_time(serialization)
            .server_parse_time(parse)
            .server_index_time(index_probe)
            .server_fetch_time(fetch)
            .server_execution_time(parse + index_probe + fetch)
            .deserialization_time(deserialization)
            .client_traversal_time(client_traversal)
            .platform_specific(format!("{}.index_probe", ADAPTER_ID), index_probe)
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

        let (existing, fetch) = timed(&clock, || {
            documents.get(key).map(|stored| stored.bytes.clone())
        });
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
        let (stored, serialization) = timed(&clock, || StoredDocument::encode(document.content()));
        let ((), store) = timed(&clock, || {
            documents.insert(key.to_owned(), stored);
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

impl Default for HashJumpAdapter {
    fn default() -> Self {
        HashJumpAdapter::new()
    }
}

impl DatabaseAdapter for HashJumpAdapter {
    fn id(&self) -> &str {
        ADAPTER_ID
    }

    fn display_name(&self) -> &str {
        "Hash Jump (offset-indexed)"
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
    use super::{HashJumpAdapter, ADAPTER_ID};
    use crate::adapters::{DatabaseAdapter, TestEnvironment};
    use crate::config::ConnectionConfig;
    use crate::document::JsonDocument;
    use crate::metrics::MetricsCollector;
    use crate::operation::{Operation, ReadPreference};
    use anyhow::Result;
    use serde_json::json;

    fn seeded_adapter() -> Result<(HashJumpAdapter, crate::adapters::InstrumentedConnection)> {
        let mut adapter = HashJumpAdapter::new();
        adapter.setup_test_environment(&TestEnvironment::new("bench_test"))?;
        let mut connection = adapter.connect(&ConnectionConfig::default())?;
        let metrics = MetricsCollector::new();

        let mut content = serde_json::Map::new();
        for i in 0..50 {
            content.insert(format!("field_{}", i), json!(i));
        }
        content.insert("nested".to_owned(), json!({"target": "leaf"}));
        let document = JsonDocument::new("doc-1", content);
        let result = adapter.execute(
            &mut connection,
            &Operation::insert("setup-0", document),
            &metrics,
        )?;
        anyhow::ensure!(result.succeeded(), "seed insert failed");
        Ok((adapter, connection))
    }

    /// Verifies a projected read through the offset index: the projected field resolves with a
    /// single probe, regardless of its position among 50 earlier fields.
    #[test]
    fn projected_read_probes_instead_of_scanning() -> Result<()> {
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
        let payload = result.payload().expect("payload");
        assert_eq!(Some(&json!("leaf")), payload.pointer("/nested/target"));
        assert!(payload.get("field_0").is_none(), "unprojected field leaked");
        assert_eq!(1, metrics.counter("hash_jump.index_probes"));

        let breakdown = result.breakdown().expect("breakdown present");
        assert!(breakdown
            .platform_specific()
            .contains_key("hash_jump.index_probe"));
        // The probe is charged to the index component; no positional walk means no server
        // traversal cost.
        assert_eq!(std::time::Duration::ZERO, breakdown.server_traversal_time());
        Ok(())
    }

    /// Verifies that insert breakdowns report the index-build cost.
    #[test]
    fn insert_reports_index_build() -> Result<()> {
        let mut adapter = HashJumpAdapter::new();
        adapter.setup_test_environment(&TestEnvironment::new("bench_test"))?;
        let mut connection = adapter.connect(&ConnectionConfig::default())?;
        let metrics = MetricsCollector::new();

        let result = adapter.execute(
            &mut connection,
            &Operation::insert("op-1", JsonDocument::empty("doc-1")),
            &metrics,
        )?;
        let breakdown = result.breakdown().expect("breakdown present");
        assert!(breakdown
            .platform_specific()
            .contains_key("hash_jump.index_build"));
        Ok(())
    }

    /// Verifies that updates rebuild the index so later reads still jump correctly.
    #[test]
    fn update_rebuilds_index() -> Result<()> {
        let (mut adapter, mut connection) = seeded_adapter()?;
        let metrics = MetricsCollector::new();

        let update = Operation::update("op-1", "doc-1", "appended", json!("new"), false);
        assert!(adapter.execute(&mut connection, &update, &metrics)?.succeeded());

        let read = Operation::read(
            "op-2",
            "doc-1",
            vec!["appended".to_owned()],
            ReadPreference::Primary,
        );
        let result = adapter.execute(&mut connection, &read, &metrics)?;
        assert_eq!(Some(&json!("new")), result.payload().unwrap().get("appended"));
        Ok(())
    }

    /// Verifies full-document reads and in-band failures.
    #[test]
    fn full_read_and_missing_document() -> Result<()> {
        let (mut adapter, mut connection) = seeded_adapter()?;
        let metrics = MetricsCollector::new();

        let full = Operation::read("op-1", "doc-1", vec![], ReadPreference::Primary);
        let result = adapter.execute(&mut connection, &full, &metrics)?;
        assert!(result.succeeded());
        assert_eq!(
            Some(&json!(7)),
            result.payload().unwrap().get("field_7")
        );

        let missing = Operation::read("op-2", "gone", vec![], ReadPreference::Primary);
        assert!(!adapter.execute(&mut connection, &missing, &metrics)?.succeeded());
        assert_eq!(ADAPTER_ID, adapter.id());
        Ok(())
    }
}
