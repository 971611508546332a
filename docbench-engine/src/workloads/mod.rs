//! The workload lifecycle and the workload registry.
//!
//! A workload owns the data and connection for one benchmark execution and defines the single
//! operation being measured. The lifecycle is fixed: `initialize` → `setup_data` → iterations
//! (warmup, then measurement) → `cleanup`.

use crate::adapters::{Capability, DatabaseAdapter};
use crate::clock::Clock;
use crate::config::WorkloadConfig;
use crate::errors::{BenchError, Result};
use crate::metrics::MetricsCollector;
use crate::operation::OperationResult;
use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

pub mod deserialize;
pub mod traverse;

/// One benchmark workload.
pub trait Workload: Send {
    /// Stable identifier; also the name of the workload's primary metric.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Capabilities an adapter must advertise before this workload will run against it.
    fn required_capabilities(&self) -> Vec<Capability>;

    /// Binds configuration, seeds the workload's random stream (from `config.seed` or fresh),
    /// picks the per-run collection name, and prepares the document generator.
    fn initialize(&mut self, config: &WorkloadConfig) -> Result<()>;

    /// Prepares the adapter's test environment, opens the workload's connection, and inserts
    /// the generated documents. Setup metrics are discarded.
    fn setup_data(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<()>;

    /// Performs the workload-defining operation once, recording at least the workload-name
    /// metric into the accumulator, and returns the operation's result.
    fn run_iteration(
        &mut self,
        adapter: &mut dyn DatabaseAdapter,
        metrics: &MetricsCollector,
    ) -> Result<OperationResult>;

    /// Tears down the test environment and closes the connection. Safe to call repeatedly.
    fn cleanup(&mut self, adapter: &mut dyn DatabaseAdapter) -> Result<()>;
}

/// Builds the per-run collection name, e.g. `bench_traverse_1714670000123`.
pub(crate) fn unique_collection_name(workload: &str, clock: &dyn Clock) -> String {
    format!("bench_{}_{}", workload, clock.wall_now().timestamp_millis())
}

/// Static description of a registered workload, for listings.
#[derive(Clone, Debug, Serialize)]
pub struct WorkloadDescriptor {
    pub id: String,
    pub description: String,
    pub required_capabilities: Vec<Capability>,
}

/// Creates workload instances; registered once per workload id.
pub type WorkloadFactory = Box<dyn Fn() -> Box<dyn Workload> + Send + Sync>;

lazy_static! {
    static ref REGISTRY: Mutex<HashMap<String, WorkloadFactory>> = Mutex::new(builtin_factories());
}

fn builtin_factories() -> HashMap<String, WorkloadFactory> {
    let mut factories: HashMap<String, WorkloadFactory> = HashMap::new();
    factories.insert(
        traverse::WORKLOAD_ID.to_owned(),
        Box::new(|| Box::new(traverse::TraverseWorkload::new()) as Box<dyn Workload>),
    );
    factories.insert(
        deserialize::WORKLOAD_ID.to_owned(),
        Box::new(|| Box::new(deserialize::DeserializeWorkload::new()) as Box<dyn Workload>),
    );
    factories
}

/// Registers an out-of-tree workload factory. Re-registering an existing id is a configuration
/// error.
pub fn register(id: &str, factory: WorkloadFactory) -> Result<()> {
    let mut registry = REGISTRY.lock().expect("workload registry lock");
    if registry.contains_key(id) {
        return Err(BenchError::configuration(format!(
            "workload '{}' is already registered",
            id
        )));
    }
    registry.insert(id.to_owned(), factory);
    Ok(())
}

/// Removes a registered workload. Returns `true` if the id was present. Intended for tests
/// that register scoped workloads.
pub fn unregister(id: &str) -> bool {
    REGISTRY
        .lock()
        .expect("workload registry lock")
        .remove(id)
        .is_some()
}

/// Instantiates the workload registered under the specified id.
pub fn create(id: &str) -> Result<Box<dyn Workload>> {
    let registry = REGISTRY.lock().expect("workload registry lock");
    match registry.get(id) {
        Some(factory) => Ok(factory()),
        None => {
            let mut ids: Vec<&String> = registry.keys().collect();
            ids.sort();
            let available: Vec<String> = ids.into_iter().cloned().collect();
            Err(BenchError::configuration(format!(
                "unknown workload '{}'; available: {}",
                id,
                available.join(", ")
            )))
        }
    }
}

/// Returns the registered workload ids, sorted.
pub fn available() -> Vec<String> {
    let mut ids: Vec<String> = REGISTRY
        .lock()
        .expect("workload registry lock")
        .keys()
        .cloned()
        .collect();
    ids.sort();
    ids
}

/// Describes every registered workload.
pub fn describe_all() -> Vec<WorkloadDescriptor> {
    available()
        .into_iter()
        .filter_map(|id| {
            let workload = create(&id).ok()?;
            Some(WorkloadDescriptor {
                id: workload.name().to_owned(),
                description: workload.description().to_owned(),
                required_capabilities: workload.required_capabilities(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::Workload;
    use crate::clock::MockClock;
    use serial_test::serial;

    /// Verifies that both built-in workloads are pre-registered.
    #[test]
    #[serial]
    fn builtins_are_registered() {
        let ids = super::available();
        assert!(ids.contains(&"traverse".to_owned()));
        assert!(ids.contains(&"deserialize".to_owned()));

        let descriptors = super::describe_all();
        assert!(descriptors
            .iter()
            .all(|descriptor| !descriptor.description.is_empty()));
    }

    /// Verifies registration scoping for custom workloads.
    #[test]
    #[serial]
    fn register_and_unregister() {
        let factory = || {
            Box::new(super::traverse::TraverseWorkload::new()) as Box<dyn Workload>
        };
        super::register("custom_test_workload", Box::new(factory)).expect("first registration");
        assert!(super::register("custom_test_workload", Box::new(factory)).is_err());
        assert!(super::create("custom_test_workload").is_ok());
        assert!(super::unregister("custom_test_workload"));
        assert!(super::create("custom_test_workload").is_err());
    }

    /// Verifies the per-run collection naming convention.
    #[test]
    fn collection_names_carry_workload_and_timestamp() {
        let clock = MockClock::new();
        let name = super::unique_collection_name("traverse", &clock);
        assert!(name.starts_with("bench_traverse_"));
    }
}
