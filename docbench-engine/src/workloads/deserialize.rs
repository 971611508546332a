//! The `deserialize` workload: what does it cost to retrieve and decode a whole document?
//!
//! Setup sizes documents toward a target byte count; each iteration reads a random document
//! with no projection, so the full payload crosses the wire and the client decodes all of it.
//! The interesting split is total latency vs. the breakdown's deserialization component.

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
use std::sync::Arc;
use tracing::debug;

pub const WORKLOAD_ID: &str = "deserialize";

/// The metric the breakdown's deserialization component is additionally recorded under.
const DESERIALIZATION_METRIC: &str = "deserialize_serialization";

const DEFAULT_DOCUMENT_SIZE_BYTES: i64 = 5000;
const DEFAULT_SIZE_TOLERANCE_PERCENT: f64 = 20.0;
const DEFAULT_NUMERIC_PROBABILITY: f64 = 0.3;
const DEFAULT_BOOLEAN_PROBABILITY: f64 = 0.1;
const DEFAULT_NESTING_DEPTH: i64 = 3;
const DEFAULT_FIELDS_PER_LEVEL: i64 = 5;
const DEFAULT_ARRAY_FIELD_COUNT: i64 = 2;
const DEFAULT_DOCUMENT_COUNT: i64 = 100;

pub struct DeserializeWorkload {
    clock: Arc<dyn Clock>,
    rng: Option<SeededRng>,
    generator: Option<DocumentGenerator>,
    connection: Option<InstrumentedConnection>,
    connection_config: Option<crate::config::ConnectionConfig>,
    documents: Vec<JsonDocument>,
    collection: String,
    document_count: usize,
    operation_counter: u64,
}

impl DeserializeWorkload {
    pub fn new() -> DeserializeWorkload {
        DeserializeWorkload::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> DeserializeWorkload {
        DeserializeWorkload {
            clock,
            rng: None,
            generator: None,
            connection: None,
            connection_config: None,
            documents: Vec::new(),
            collection: String::new(),
            document_count: 0,
            operation_counter: 0,
        }
    }
}

impl Default for DeserializeWorkload {
    fn default() -> Self {
        DeserializeWorkload::new()
    }
}

impl Workload for DeserializeWorkload {
    fn name(&self) -> &str {
        WORKLOAD_ID
    }

    fn description(&self) -> &str {
        "Measures full-document retrieval and client-side decoding cost at a controlled document size"
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

        let size_bytes =
            config.param_int_or(params::DOCUMENT_SIZE_BYTES, DEFAULT_DOCUMENT_SIZE_BYTES) as usize;
        let tolerance =
            config.param_double_or(params::SIZE_TOLERANCE, DEFAULT_SIZE_TOLERANCE_PERCENT);
        let numeric_probability = config.param_double_or(
            params::NUMERIC_FIELD_PROBABILITY,
            DEFAULT_NUMERIC_PROBABILITY,
        );
        let boolean_probability = config.param_double_or(
            params::BOOLEAN_FIELD_PROBABILITY,
            DEFAULT_BOOLEAN_PROBABILITY,
        );
        let nesting_depth = config.param_int_or(params::NESTING_DEPTH, DEFAULT_NESTING_DEPTH) as usize;
        let fields_per_level =
            config.param_int_or(params::FIELDS_PER_LEVEL, DEFAULT_FIELDS_PER_LEVEL) as usize;
        let array_field_count =
            config.param_int_or(params::ARRAY_FIELD_COUNT, DEFAULT_ARRAY_FIELD_COUNT) as usize;
        self.document_count =
            config.param_int_or(params::DOCUMENT_COUNT, DEFAULT_DOCUMENT_COUNT) as usize;

        let generator_seed = rng.fork().seed();
        self.generator = Some(
            DocumentGenerator::builder()
                .seed(generator_seed)
                .target_size_bytes(size_bytes, tolerance)
                .numeric_field_probability(numeric_probability)
                .boolean_field_probability(boolean_probability)
                .nesting_depth(nesting_depth)
                .fields_per_level(fields_per_level)
                .array_field_count(array_field_count)
                .build()?,
        );

        self.collection = unique_collection_name(WORKLOAD_ID, self.clock.as_ref());
        self.connection_config = Some(config.connection.clone());
        self.documents.clear();
        self.operation_counter = 0;
        self.rng = Some(rng);

        debug!(
            collection = %self.collection,
            size_bytes,
            seed = generator_seed,
            "deserialize workload initialized"
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

        // Empty projection list: the whole document comes back.
        let operation = Operation::read(operation_id, key, Vec::new(), ReadPreference::Primary);
        let result = adapter.execute(connection, &operation, metrics)?;

        metrics.record(WORKLOAD_ID, result.total_duration());
        if let Some(breakdown) = result.breakdown() {
            metrics.record(DESERIALIZATION_METRIC, breakdown.deserialization_time());
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

#[cfg(test)]
mod tests {
    use super::{DeserializeWorkload, WORKLOAD_ID};
    use crate::adapters::hash_jump::HashJumpAdapter;
    use crate::adapters::DatabaseAdapter;
    use crate::config::{params, WorkloadConfig};
    use crate::generator::estimated_size;
    use crate::metrics::MetricsCollector;
    use crate::workloads::Workload;
    use anyhow::Result;

    fn small_config() -> Result<WorkloadConfig> {
        Ok(WorkloadConfig::builder(WORKLOAD_ID)
            .iterations(4)
            .warmup_iterations(0)
            .seed(7)
            .parameter(params::DOCUMENT_COUNT, 8)
            .parameter(params::DOCUMENT_SIZE_BYTES, 2000)
            .parameter(params::SIZE_TOLERANCE, 20)
            .build()?)
    }

    /// Runs the full lifecycle against the hash-jump adapter: both the primary metric and the
    /// deserialization sub-metric must be populated.
    #[test]
    fn lifecycle_against_hash_jump() -> Result<()> {
        let mut workload = DeserializeWorkload::new();
        let mut adapter = HashJumpAdapter::new();
        let config = small_config()?;

        workload.initialize(&config)?;
        workload.setup_data(&mut adapter)?;

        let metrics = MetricsCollector::new();
        for _ in 0..config.iterations {
            let result = workload.run_iteration(&mut adapter, &metrics)?;
            assert!(result.succeeded(), "iteration failed: {:?}", result.error());
        }

        let summary = metrics.summarize();
        assert_eq!(4, summary.histogram(WORKLOAD_ID).expect("primary metric").count);
        assert_eq!(
            4,
            summary
                .histogram("deserialize_serialization")
                .expect("deserialization metric")
                .count
        );

        workload.cleanup(&mut adapter)?;
        adapter.close()?;
        Ok(())
    }

    /// Verifies that setup documents honor the configured size band.
    #[test]
    fn setup_documents_hit_the_size_band() -> Result<()> {
        let mut workload = DeserializeWorkload::new();
        let mut adapter = HashJumpAdapter::new();
        workload.initialize(&small_config()?)?;
        workload.setup_data(&mut adapter)?;

        for document in &workload.documents {
            let mut content = document.content().clone();
            content.remove("_id");
            let estimate = estimated_size(&content);
            assert!(
                (1600..=2400).contains(&estimate),
                "document '{}' estimated at {} bytes",
                document.id(),
                estimate
            );
        }
        workload.cleanup(&mut adapter)?;
        Ok(())
    }
}
