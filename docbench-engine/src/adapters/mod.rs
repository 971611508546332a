//! The pluggable adapter abstraction over a target database.
//!
//! The engine never inspects a concrete adapter type: everything goes through
//! [DatabaseAdapter], selected at runtime from the process-wide registry by its stable id. Two
//! reference adapters ship in-tree, [seq_scan::SeqScanAdapter] and
//! [hash_jump::HashJumpAdapter]: the sequential length-prefixed and hash-indexed traversal
//! strategies the interface exists to compare.

use crate::config::ConnectionConfig;
use crate::errors::{BenchError, Result};
use crate::metrics::MetricsCollector;
use crate::operation::{BulkResult, Operation, OperationResult};
use crate::overhead::OverheadBreakdown;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub mod codec;
pub mod hash_jump;
pub mod seq_scan;

/// A tag an adapter advertises to declare what a workload may rely on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Reads can project a subset of fields instead of the whole document.
    PartialDocumentRetrieval,
    /// Dotted paths into nested structure are honored.
    NestedDocumentAccess,
    /// The adapter can report server-side traversal time.
    ServerTraversalTiming,
    /// Explain plans can be requested on aggregate operations.
    ExplainPlans,
    /// Timing listeners fire for client-side phases.
    ClientTimingHooks,
    /// The adapter reports deserialization timings.
    DeserializationMetrics,
}

/// One index an adapter should create during environment setup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

/// Describes the collection/table a workload wants prepared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestEnvironment {
    pub collection: String,
    pub indexes: Vec<IndexDefinition>,
    pub drop_existing: bool,
    pub initial_document_count: usize,
    /// Driver-specific knobs, passed through untouched.
    pub options: HashMap<String, String>,
}

impl TestEnvironment {
    pub fn new(collection: impl Into<String>) -> TestEnvironment {
        TestEnvironment {
            collection: collection.into(),
            indexes: Vec::new(),
            drop_existing: true,
            initial_document_count: 0,
            options: HashMap::new(),
        }
    }
}

/// Callback invoked when an instrumented connection records a named timing. May fire on a
/// driver I/O thread.
pub type TimingListener = Box<dyn Fn(&str, Duration) + Send + Sync>;

/// An owned, scoped connection handle.
///
/// The engine owns the lifecycle (one connection per adapter per workload execution); the
/// adapter owns the private state behind [InstrumentedConnection::inner_mut]. Closing is
/// idempotent.
pub struct InstrumentedConnection {
    id: String,
    open: bool,
    timings: HashMap<String, Duration>,
    listeners: Vec<TimingListener>,
    inner: Box<dyn Any + Send>,
}

impl InstrumentedConnection {
    /// Constructs an open connection wrapping the adapter's private state.
    pub fn new(id: impl Into<String>, inner: Box<dyn Any + Send>) -> InstrumentedConnection {
        InstrumentedConnection {
            id: id.into(),
            open: true,
            timings: HashMap::new(),
            listeners: Vec::new(),
            inner,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns `true` until the connection is closed.
    pub fn is_valid(&self) -> bool {
        self.open
    }

    pub fn add_timing_listener(&mut self, listener: TimingListener) {
        self.listeners.push(listener);
    }

    /// Accumulates a named timing and notifies every registered listener.
    pub fn record_timing(&mut self, name: &str, duration: Duration) {
        *self.timings.entry(name.to_owned()).or_default() += duration;
        for listener in &self.listeners {
            listener(name, duration);
        }
    }

    /// A snapshot of the timings accumulated so far.
    pub fn timing_snapshot(&self) -> HashMap<String, Duration> {
        self.timings.clone()
    }

    /// Unwraps the adapter-private state. Returns `None` if the state is of a different type
    /// (i.e. the connection came from another adapter).
    pub fn inner_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.inner.downcast_mut()
    }

    pub fn inner_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    /// Closes the connection. Idempotent.
    pub fn close(&mut self) {
        self.open = false;
    }
}

/// The polymorphism point: everything the engine needs from a target database.
///
/// Creating an adapter is pure; the first I/O happens in [DatabaseAdapter::connect].
pub trait DatabaseAdapter: Send + std::fmt::Debug {
    /// Stable identifier, unique across the registry.
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn version(&self) -> &str;

    fn capabilities(&self) -> HashSet<Capability>;

    /// Opens an instrumented connection. Fails with a connection error when the driver rejects
    /// the endpoint.
    fn connect(&mut self, config: &ConnectionConfig) -> Result<InstrumentedConnection>;

    /// Runs exactly one operation. Returns `Err` only for unrecoverable faults; transient
    /// failures come back as a failed [OperationResult].
    fn execute(
        &mut self,
        connection: &mut InstrumentedConnection,
        operation: &Operation,
        metrics: &MetricsCollector,
    ) -> Result<OperationResult>;

    /// Runs a batch of operations. The default is sequential fan-out over
    /// [DatabaseAdapter::execute]; adapters with a batched wire path may override.
    fn execute_bulk(
        &mut self,
        connection: &mut InstrumentedConnection,
        operations: &[Operation],
        metrics: &MetricsCollector,
    ) -> Result<BulkResult> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(operations.len());
        for operation in operations {
            results.push(self.execute(connection, operation, metrics)?);
        }
        Ok(BulkResult {
            results,
            total_duration: started.elapsed(),
        })
    }

    /// Extracts (or re-derives) the decomposed timings from a result this adapter produced.
    fn overhead_breakdown(&self, result: &OperationResult) -> Option<OverheadBreakdown> {
        result.breakdown().cloned()
    }

    /// Prepares the collection/table and indexes a workload will run against.
    fn setup_test_environment(&mut self, environment: &TestEnvironment) -> Result<()>;

    /// Removes whatever [DatabaseAdapter::setup_test_environment] created. Idempotent.
    fn teardown_test_environment(&mut self) -> Result<()>;

    /// Optional pre-flight check; one human-readable diagnostic per problem.
    fn validate_config(&self, _config: &ConnectionConfig) -> Vec<String> {
        Vec::new()
    }

    /// Releases adapter-level resources. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Static description of a registered adapter, for listings.
#[derive(Clone, Debug, Serialize)]
pub struct AdapterDescriptor {
    pub id: String,
    pub display_name: String,
    pub version: String,
    pub capabilities: Vec<Capability>,
}

/// Creates adapter instances; registered once per adapter id.
pub type AdapterFactory = Box<dyn Fn() -> Box<dyn DatabaseAdapter> + Send + Sync>;

lazy_static! {
    static ref REGISTRY: Mutex<HashMap<String, AdapterFactory>> = Mutex::new(builtin_factories());
}

fn builtin_factories() -> HashMap<String, AdapterFactory> {
    let mut factories: HashMap<String, AdapterFactory> = HashMap::new();
    factories.insert(
        seq_scan::ADAPTER_ID.to_owned(),
        Box::new(|| Box::new(seq_scan::SeqScanAdapter::new()) as Box<dyn DatabaseAdapter>),
    );
    factories.insert(
        hash_jump::ADAPTER_ID.to_owned(),
        Box::new(|| Box::new(hash_jump::HashJumpAdapter::new()) as Box<dyn DatabaseAdapter>),
    );
    factories
}

/// Registers an out-of-tree adapter factory under the specified id. Re-registering an existing
/// id is a configuration error.
pub fn register(id: &str, factory: AdapterFactory) -> Result<()> {
    let mut registry = REGISTRY.lock().expect("adapter registry lock");
    if registry.contains_key(id) {
        return Err(BenchError::configuration(format!(
            "adapter '{}' is already registered",
            id
        )));
    }
    registry.insert(id.to_owned(), factory);
    Ok(())
}

/// Removes a registered adapter. Returns `true` if the id was present. Intended for tests that
/// register scoped adapters.
pub fn unregister(id: &str) -> bool {
    REGISTRY
        .lock()
        .expect("adapter registry lock")
        .remove(id)
        .is_some()
}

/// Instantiates the adapter registered under the specified id.
pub fn create(id: &str) -> Result<Box<dyn DatabaseAdapter>> {
    let registry = REGISTRY.lock().expect("adapter registry lock");
    match registry.get(id) {
        Some(factory) => Ok(factory()),
        None => {
            let mut ids: Vec<&String> = registry.keys().collect();
            ids.sort();
            let available: Vec<String> = ids.into_iter().cloned().collect();
            Err(BenchError::configuration(format!(
                "unknown adapter '{}'; available: {}",
                id,
                available.join(", ")
            )))
        }
    }
}

/// Returns the registered adapter ids, sorted.
pub fn available() -> Vec<String> {
    let mut ids: Vec<String> = REGISTRY
        .lock()
        .expect("adapter registry lock")
        .keys()
        .cloned()
        .collect();
    ids.sort();
    ids
}

/// Describes every registered adapter. Adapter creation is pure, so this performs no I/O.
pub fn describe_all() -> Vec<AdapterDescriptor> {
    available()
        .into_iter()
        .filter_map(|id| {
            let adapter = create(&id).ok()?;
            let mut capabilities: Vec<Capability> = adapter.capabilities().into_iter().collect();
            capabilities.sort_by_key(|c| format!("{:?}", c));
            Some(AdapterDescriptor {
                id: adapter.id().to_owned(),
                display_name: adapter.display_name().to_owned(),
                version: adapter.version().to_owned(),
                capabilities,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Capability, InstrumentedConnection};
    use crate::config::ConnectionConfig;
    use crate::errors::Result;
    use crate::metrics::MetricsCollector;
    use crate::operation::{Operation, OperationKind, OperationResult};
    use crate::adapters::{DatabaseAdapter, TestEnvironment};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct ConnState {
        operations_executed: usize,
    }

    /// Verifies identifier, validity, private-state unwrap, and idempotent close.
    #[test]
    fn connection_lifecycle() {
        let mut connection =
            InstrumentedConnection::new("test-1", Box::new(ConnState { operations_executed: 0 }));
        assert_eq!("test-1", connection.id());
        assert!(connection.is_valid());

        let state = connection
            .inner_mut::<ConnState>()
            .expect("matching private state");
        state.operations_executed += 1;
        assert!(connection.inner_mut::<String>().is_none());

        connection.close();
        assert!(!connection.is_valid());
        connection.close();
        assert!(!connection.is_valid());
    }

    /// Verifies timing accumulation and listener notification.
    #[test]
    fn connection_timings_and_listeners() {
        let mut connection = InstrumentedConnection::new("test-2", Box::new(()));
        let fired = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&fired);
        connection.add_timing_listener(Box::new(move |_, _| {
            observer.fetch_add(1, Ordering::SeqCst);
        }));

        connection.record_timing("read", Duration::from_micros(10));
        connection.record_timing("read", Duration::from_micros(5));
        connection.record_timing("insert", Duration::from_micros(3));

        assert_eq!(3, fired.load(Ordering::SeqCst));
        let snapshot = connection.timing_snapshot();
        assert_eq!(Some(&Duration::from_micros(15)), snapshot.get("read"));
        assert_eq!(Some(&Duration::from_micros(3)), snapshot.get("insert"));
    }

    /// A do-nothing adapter whose only purpose is exercising the default `execute_bulk`.
    #[derive(Debug)]
    struct CountingAdapter {
        executed: usize,
    }

    impl DatabaseAdapter for CountingAdapter {
        fn id(&self) -> &str {
            "counting"
        }
        fn display_name(&self) -> &str {
            "Counting"
        }
        fn version(&self) -> &str {
            "0.0.0"
        }
        fn capabilities(&self) -> HashSet<Capability> {
            HashSet::new()
        }
        fn connect(&mut self, _config: &ConnectionConfig) -> Result<InstrumentedConnection> {
            Ok(InstrumentedConnection::new("counting-1", Box::new(())))
        }
        fn execute(
            &mut self,
            _connection: &mut InstrumentedConnection,
            operation: &Operation,
            _metrics: &MetricsCollector,
        ) -> Result<OperationResult> {
            self.executed += 1;
            Ok(OperationResult::success(
                operation.id(),
                operation.kind(),
                Duration::from_micros(1),
                None,
            ))
        }
        fn setup_test_environment(&mut self, _environment: &TestEnvironment) -> Result<()> {
            Ok(())
        }
        fn teardown_test_environment(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Verifies that the default bulk path fans out sequentially over `execute`.
    #[test]
    fn default_bulk_is_sequential_fan_out() -> anyhow::Result<()> {
        let mut adapter = CountingAdapter { executed: 0 };
        let mut connection = adapter.connect(&ConnectionConfig::default())?;
        let metrics = MetricsCollector::new();

        let operations = vec![
            Operation::delete("op-1", "a"),
            Operation::delete("op-2", "b"),
            Operation::delete("op-3", "c"),
        ];
        let bulk = adapter.execute_bulk(&mut connection, &operations, &metrics)?;

        assert_eq!(3, adapter.executed);
        assert_eq!(3, bulk.succeeded_count());
        assert_eq!(0, bulk.failed_count());
        assert_eq!(OperationKind::Delete, bulk.results[0].kind());
        Ok(())
    }

    mod registry {
        use crate::adapters::{self, Capability, DatabaseAdapter};
        use serial_test::serial;

        /// Verifies that both built-in adapters are pre-registered.
        #[test]
        #[serial]
        fn builtins_are_registered() {
            let ids = adapters::available();
            assert!(ids.contains(&"seq_scan".to_owned()));
            assert!(ids.contains(&"hash_jump".to_owned()));

            let descriptors = adapters::describe_all();
            let seq = descriptors.iter().find(|d| d.id == "seq_scan").unwrap();
            assert!(seq.capabilities.contains(&Capability::PartialDocumentRetrieval));
        }

        /// Verifies runtime registration, duplicate rejection, and unregistration.
        #[test]
        #[serial]
        fn register_and_unregister() {
            let factory = || {
                Box::new(crate::adapters::seq_scan::SeqScanAdapter::new())
                    as Box<dyn DatabaseAdapter>
            };

            adapters::register("custom_test_adapter", Box::new(factory))
                .expect("first registration");
            assert!(adapters::available().contains(&"custom_test_adapter".to_owned()));
            assert!(adapters::register("custom_test_adapter", Box::new(factory)).is_err());
            assert!(adapters::create("custom_test_adapter").is_ok());

            assert!(adapters::unregister("custom_test_adapter"));
            assert!(!adapters::unregister("custom_test_adapter"));
            assert!(adapters::create("custom_test_adapter").is_err());
        }

        /// Verifies the unknown-id error message.
        #[test]
        #[serial]
        fn unknown_adapter_is_a_configuration_error() {
            let error = adapters::create("no_such_adapter").unwrap_err();
            assert!(format!("{}", error).contains("no_such_adapter"));
        }
    }
}
