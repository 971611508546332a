//! The configuration shapes the engine consumes.
//!
//! How a configuration is *loaded* (flags, files, environment) is the caller's business; the
//! engine only sees a [WorkloadConfig] and the [ConnectionConfig] inside it.

use crate::errors::{BenchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// The parameter keys the built-in workloads recognize. Unknown keys are preserved and ignored
/// by the engine so custom workloads and reporters can see them.
pub mod params {
    pub const DOCUMENT_COUNT: &str = "documentCount";
    pub const NESTING_DEPTH: &str = "nestingDepth";
    pub const FIELDS_PER_LEVEL: &str = "fieldsPerLevel";
    pub const TARGET_PATH: &str = "targetPath";
    pub const FIELD_COUNT: &str = "fieldCount";
    pub const DOCUMENT_SIZE_BYTES: &str = "documentSizeBytes";
    pub const SIZE_TOLERANCE: &str = "sizeTolerance";
    pub const ARRAY_FIELD_COUNT: &str = "arrayFieldCount";
    pub const NUMERIC_FIELD_PROBABILITY: &str = "numericFieldProbability";
    pub const BOOLEAN_FIELD_PROBABILITY: &str = "booleanFieldProbability";
}

fn default_iterations() -> u32 {
    1000
}

fn default_warmup() -> u32 {
    100
}

fn default_concurrency() -> u32 {
    1
}

/// Configuration for one workload execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub name: String,

    /// Measured iterations. Must be positive.
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Iterations run before measurement, with metrics discarded.
    #[serde(default = "default_warmup")]
    pub warmup_iterations: u32,

    /// Seed for the workload's random stream; absent means a fresh seed per run.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Reserved. Must be 1 in this release.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// How the workload's connection is opened.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Open parameter map; see [params] for the keys the built-in workloads read.
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

impl WorkloadConfig {
    pub fn builder(name: impl Into<String>) -> WorkloadConfigBuilder {
        WorkloadConfigBuilder {
            config: WorkloadConfig {
                name: name.into(),
                iterations: default_iterations(),
                warmup_iterations: default_warmup(),
                seed: None,
                concurrency: default_concurrency(),
                connection: ConnectionConfig::default(),
                parameters: HashMap::new(),
            },
        }
    }

    /// Returns the named parameter as an integer, converting on access: JSON numbers are
    /// truncated, strings are parsed. Anything else is `None`.
    pub fn param_int(&self, key: &str) -> Option<i64> {
        match self.parameters.get(key)? {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|f| f as i64)),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn param_int_or(&self, key: &str, default: i64) -> i64 {
        self.param_int(key).unwrap_or(default)
    }

    /// Returns the named parameter as a double, converting on access.
    pub fn param_double(&self, key: &str) -> Option<f64> {
        match self.parameters.get(key)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn param_double_or(&self, key: &str, default: f64) -> f64 {
        self.param_double(key).unwrap_or(default)
    }

    /// Returns the named parameter as a string; scalars are rendered, containers are `None`.
    pub fn param_str(&self, key: &str) -> Option<String> {
        match self.parameters.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    pub fn param_str_or(&self, key: &str, default: &str) -> String {
        self.param_str(key).unwrap_or_else(|| default.to_owned())
    }

    /// Returns the named parameter as a boolean; the strings `true`/`false` parse.
    pub fn param_bool(&self, key: &str) -> Option<bool> {
        match self.parameters.get(key)? {
            Value::Bool(flag) => Some(*flag),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn param_bool_or(&self, key: &str, default: bool) -> bool {
        self.param_bool(key).unwrap_or(default)
    }

    /// Returns the named parameter as a list. A JSON array is returned as-is; a string is split
    /// on commas.
    pub fn param_list(&self, key: &str) -> Option<Vec<Value>> {
        match self.parameters.get(key)? {
            Value::Array(values) => Some(values.clone()),
            Value::String(text) => Some(
                text.split(',')
                    .map(|part| Value::String(part.trim().to_owned()))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Validates this configuration, returning one human-readable diagnostic per problem. An
    /// empty list means valid. A warmup count exceeding the iteration count is deliberately a
    /// logged warning, not a diagnostic.
    pub fn validate(&self) -> Vec<String> {
        let mut diagnostics = Vec::new();

        if self.name.trim().is_empty() {
            diagnostics.push("name: must not be blank".to_owned());
        }
        if self.iterations == 0 {
            diagnostics.push("iterations: must be positive".to_owned());
        }
        if self.concurrency != 1 {
            diagnostics.push(format!(
                "concurrency: must be 1 in this release, got {}",
                self.concurrency
            ));
        }
        if self.warmup_iterations > self.iterations {
            warn!(
                warmup = self.warmup_iterations,
                iterations = self.iterations,
                "warmup iteration count exceeds measured iteration count"
            );
        }

        self.check_int_range(&mut diagnostics, params::DOCUMENT_COUNT, 1, 10_000_000);
        self.check_int_range(&mut diagnostics, params::NESTING_DEPTH, 0, 64);
        self.check_int_range(&mut diagnostics, params::FIELDS_PER_LEVEL, 0, 10_000);
        self.check_int_range(&mut diagnostics, params::FIELD_COUNT, 1, 1_000_000);
        self.check_int_range(&mut diagnostics, params::DOCUMENT_SIZE_BYTES, 1, 1_000_000_000);
        self.check_int_range(&mut diagnostics, params::SIZE_TOLERANCE, 0, 100);
        self.check_int_range(&mut diagnostics, params::ARRAY_FIELD_COUNT, 0, 10_000);

        diagnostics
    }

    fn check_int_range(&self, diagnostics: &mut Vec<String>, key: &str, min: i64, max: i64) {
        if !self.parameters.contains_key(key) {
            return;
        }
        match self.param_int(key) {
            None => diagnostics.push(format!("parameters.{}: not an integer", key)),
            Some(value) if value < min || value > max => diagnostics.push(format!(
                "parameters.{}: {} is outside [{}, {}]",
                key, value, min, max
            )),
            Some(_) => {}
        }
    }
}

/// Builder for [WorkloadConfig]. Validation that can fail the build runs once, in
/// [WorkloadConfigBuilder::build].
pub struct WorkloadConfigBuilder {
    config: WorkloadConfig,
}

impl WorkloadConfigBuilder {
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.config.iterations = iterations;
        self
    }

    pub fn warmup_iterations(mut self, warmup_iterations: u32) -> Self {
        self.config.warmup_iterations = warmup_iterations;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn concurrency(mut self, concurrency: u32) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.config.connection = connection;
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.parameters.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<WorkloadConfig> {
        if self.config.name.trim().is_empty() {
            return Err(BenchError::configuration("workload name must not be blank"));
        }
        if self.config.iterations == 0 {
            return Err(BenchError::configuration("iterations must be positive"));
        }
        if self.config.warmup_iterations > self.config.iterations {
            warn!(
                warmup = self.config.warmup_iterations,
                iterations = self.config.iterations,
                "warmup iteration count exceeds measured iteration count"
            );
        }
        Ok(self.config)
    }
}

fn default_host() -> String {
    "localhost".to_owned()
}

fn default_database() -> String {
    "docbench".to_owned()
}

/// How an adapter reaches its database: either one opaque URI passed through untouched, or the
/// parameter tuple. Port zero means "adapter-chosen".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectionConfig {
    Uri(String),
    Parameters {
        #[serde(default = "default_host")]
        host: String,
        #[serde(default)]
        port: u16,
        #[serde(default = "default_database")]
        database: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        #[serde(default)]
        options: HashMap<String, String>,
    },
}

impl ConnectionConfig {
    pub fn uri(uri: impl Into<String>) -> ConnectionConfig {
        ConnectionConfig::Uri(uri.into())
    }

    /// A short description of the endpoint, safe to log (no credentials).
    pub fn endpoint_description(&self) -> String {
        match self {
            ConnectionConfig::Uri(uri) => uri.clone(),
            ConnectionConfig::Parameters {
                host,
                port,
                database,
                ..
            } => format!("{}:{}/{}", host, port, database),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig::Parameters {
            host: default_host(),
            port: 0,
            database: default_database(),
            username: None,
            password: None,
            options: HashMap::new(),
        }
    }
}
