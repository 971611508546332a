//! The `traverse` workload: what does it cost to project one deeply-nested field?
//!
//! Setup plants a target value at a configurable dotted path inside documents of a
//! configurable shape; each iteration reads a random document with a projection of just that
//! path. Under a scan-based adapter the cost tracks the field's depth and position; under an
//! offset-indexed adapter it should not.

use crate::adapters::{Capability, DatabaseAdapter, InstrumentedConnection, TestEnvironment};
use crate::clock::{Clock, SystemClock};
use crate::config::{params, WorkloadConfig};
use crate::document::JsonDocument;
use crate::errors::{BenchError, Result};
use crate::generator::DocumentGenerator;
use crate::metrics::MetricsCollector;
use crate::operation::{Operation, OperationKind, OperationResult, ReadPreference};
use crate::rng::SeededRng;
use crate::workloads::{unique_collection_name, Workload};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const WORKLOAD_ID: &str = "traverse";

/// The metric failed iterations are additionally recorded under.
const ERROR_METRIC: &str = "traverse_error";

const DEFAULT_NESTING_DEPTH: i64 = 5;
const DEFAULT_FIELDS_PER_LEVEL: i64 = 10;
const DEFAULT_FIELD_COUNT: i64 = 20;
const DEFAULT_DOCUMENT_COUNT: i64 = 100;

pub struct TraverseWorkload {
    clock: Arc<dyn Clock>,
    rng: Option<SeededRng>,
    generator: Option<DocumentGenerator>,
    connection: Option<InstrumentedConnection>,
    connection_config: Option<crate::config::ConnectionConfig>,
    documents: Vec<JsonDocument>,
    collection: String,
    target_path: String,
    document_count: usize,
    operation_counter: u64,
}

impl TraverseWorkload {
    pub fn new() -> TraverseWorkload {
        TraverseWorkload::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> TraverseWorkload {
        TraverseWorkload {
            clock,
            rng: None,
            generator: None,
            connection: None,
            connection_config: None,
            documents: Vec::new(),
            collection: String::new(),
            target_path: String::new(),
            document_count: 0,
            operation_counter: 0,
        }
    }

    /// The default target path for a given depth: `nested.nested.…nested.target`.
    fn derived_target_path(depth: usize) -> String {
        let mut segments = vec!["nested"; depth.max(1)];
        segments.push("target");
        segments.join(".")
    }
}

impl Default for TraverseWorkload {
    fn default() -> Self {
        TraverseWorkload::new()
    }
}

impl Workload for TraverseWorkload {
    fn name(&self) -> &str {
        WORKLOAD_ID
    }

    fn description(&self) -> &str {
        "Measures the cost of projecting a single deeply-nested field out of structured documents"
    }

    fn required_capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::PartialDocumentRetrieval,
            Capability::NestedDocumentAccess,
        ]
    }

    fn initialize(&mut self, config: &WorkloadConfig) -> Result<()> {
        let mut rng = match config.seed {
            Some(seed) => SeededRng::from_seed(seed),
            None => SeededRng::from_entropy(),
        };

        let nesting_depth = config.param_int_or(params::NESTING_DEPTH, DEFAULT_NESTING_DEPTH) as usize;
        let fields_per_level =
            config.param_int_or(params::FIELDS_PER_LEVEL, DEFAULT_FIELDS_PER_LEVEL) as usize;
        let field_count = config.param_int_or(params::FIELD_COUNT, DEFAULT_FIELD_COUNT) as usize;
        self.document_count =
            config.param_int_or(params::DOCUMENT_COUNT, DEFAULT_DOCUMENT_COUNT) as usize;
        self.target_path = config.param_str_or(
            params::TARGET_PATH,
            &TraverseWorkload::derived_target_path(nesting_depth),
        );

        let generator_seed = rng.fork().seed();
        self.generator = Some(
            DocumentGenerator::builder()
                .seed(generator_seed)
                .field_count(field_count)
                .nesting_depth(nesting_depth)
                .fields_per_level(fields_per_level)
                .target_path(&self.target_path, json!("leaf"))
                .build()?,
        );

        self.collection = unique_collection_name(WORKLOAD_ID, self.clock.as_ref());
        self.connection_config = Some(config.connection.clone());
        self.documents.clear();
        self.operation_counter = 0;
        self.rng = Some(rng);

        debug!(
            collection = %self.collection,
            target_path = %self.target_path,
            seed = generator_seed,
            "traverse workload initialized"
        );
        Ok(())
    }

    fn setup_data(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<()> {
        let generator = self
            .generator
            .as_mut()
            .ok_or_else(|| BenchError::setup("workload was not initialized"))?;
        let connection_config = self
            .connection_config
            .clone()
            .ok_or_else(|| BenchError::setup("workload was not initialized"))?;

        let mut environment = TestEnvironment::new(self.collection.clone());
        environment.initial_document_count = self.document_count;
        adapter.setup_test_environment(&environment)?;

        let mut connection = adapter.connect(&connection_config)?;

        // Setup inserts run against a dedicated accumulator whose contents are discarded.
        let setup_metrics = MetricsCollector::new();
        let documents = generator.generate_batch(WORKLOAD_ID, self.document_count);
        for document in &documents {
            self.operation_counter += 1;
            let operation = Operation::insert(
                format!("{}-setup-{}", WORKLOAD_ID, self.operation_counter),
                document.clone(),
            );
            let result = adapter.execute(&mut connection, &operation, &setup_metrics)?;
            if !result.succeeded() {
                return Err(BenchError::setup(format!(
                    "failed to insert seed document '{}': {}",
                    document.id(),
                    result.error().unwrap_or("unknown error")
                )));
            }
        }

        self.documents = documents;
        self.connection = Some(connection);
        Ok(())
    }

    fn run_iteration(
        &mut self,
        adapter: &mut dyn DatabaseAdapter,
        metrics: &MetricsCollector,
    ) -> Result<OperationResult> {
        self.operation_counter += 1;
        let operation_id = format!("{}-{}", WORKLOAD_ID, self.operation_counter);

        let rng = self.rng.as_mut().ok_or_else(|| {
            BenchError::operation(&operation_id, OperationKind::Read, "workload not initialized")
        })?;
        if self.documents.is_empty() {
            return Err(BenchError::operation(
                &operation_id,
                OperationKind::Read,
                "no documents were set up",
            ));
        }
        let index = rng.next_int_bounded(self.documents.len() as i32)? as usize;
        let key = self.documents[index].id().to_owned();

        let connection = self.connection.as_mut().ok_or_else(|| {
            BenchError::operation(&operation_id, OperationKind::Read, "no open connection")
        })?;

        let operation = Operation::read(
            operation_id,
            key,
            vec![self.target_path.clone()],
            ReadPreference::Primary,
        );
        let result = adapter.execute(connection, &operation, metrics)?;

        metrics.record(WORKLOAD_ID, result.total_duration());
        if !result.succeeded() {
            metrics.record(ERROR_METRIC, result.total_duration());
        }
        Ok(result)
    }

    fn cleanup(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<()> {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        adapter.teardown_test_environment()?;
        self.documents.clear();
        Ok(())
    }
}
