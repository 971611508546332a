//! The operation and outcome model.
//!
//! An [Operation] describes one request an adapter should run; an [OperationResult] is its
//! immutable outcome, carrying the total duration and (for successful operations under a
//! fully-instrumented adapter) an [OverheadBreakdown].

use crate::document::JsonDocument;
use crate::overhead::OverheadBreakdown;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// The five operation kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Read,
    Update,
    Delete,
    Aggregate,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Insert => "insert",
            OperationKind::Read => "read",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Aggregate => "aggregate",
        };
        write!(f, "{}", name)
    }
}

/// Where a read may be served from, for adapters whose backing store replicates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadPreference {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

/// One request for an adapter to execute. The identifier is unique within a run.
#[derive(Clone, Debug)]
pub enum Operation {
    Insert {
        id: String,
        document: JsonDocument,
    },
    Read {
        id: String,
        key: String,
        /// Dotted projection paths; empty means the full document.
        projection: Vec<String>,
        read_preference: ReadPreference,
    },
    Update {
        id: String,
        key: String,
        path: String,
        value: Value,
        upsert: bool,
    },
    Delete {
        id: String,
        key: String,
    },
    Aggregate {
        id: String,
        /// Pipeline stages, opaque to the engine.
        pipeline: Vec<String>,
        explain: bool,
    },
}

impl Operation {
    pub fn insert(id: impl Into<String>, document: JsonDocument) -> Operation {
        Operation::Insert {
            id: id.into(),
            document,
        }
    }

    pub fn read(
        id: impl Into<String>,
        key: impl Into<String>,
        projection: Vec<String>,
        read_preference: ReadPreference,
    ) -> Operation {
        Operation::Read {
            id: id.into(),
            key: key.into(),
            projection,
            read_preference,
        }
    }

    pub fn update(
        id: impl Into<String>,
        key: impl Into<String>,
        path: impl Into<String>,
        value: Value,
        upsert: bool,
    ) -> Operation {
        Operation::Update {
            id: id.into(),
            key: key.into(),
            path: path.into(),
            value,
            upsert,
        }
    }

    pub fn delete(id: impl Into<String>, key: impl Into<String>) -> Operation {
        Operation::Delete {
            id: id.into(),
            key: key.into(),
        }
    }

    pub fn aggregate(id: impl Into<String>, pipeline: Vec<String>, explain: bool) -> Operation {
        Operation::Aggregate {
            id: id.into(),
            pipeline,
            explain,
        }
    }

    /// Returns the operation identifier.
    pub fn id(&self) -> &str {
        match self {
            Operation::Insert { id, .. }
            | Operation::Read { id, .. }
            | Operation::Update { id, .. }
            | Operation::Delete { id, .. }
            | Operation::Aggregate { id, .. } => id,
        }
    }

    /// Returns the operation kind tag.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Insert { .. } => OperationKind::Insert,
            Operation::Read { .. } => OperationKind::Read,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Aggregate { .. } => OperationKind::Aggregate,
        }
    }
}

/// The immutable outcome of one executed operation.
///
/// Successful results should carry a breakdown; a missing breakdown is degraded telemetry from
/// the adapter, not a correctness bug.
#[derive(Clone, Debug)]
pub struct OperationResult {
    operation_id: String,
    kind: OperationKind,
    succeeded: bool,
    started: Option<DateTime<Utc>>,
    completed: Option<DateTime<Utc>>,
    total_duration: Duration,
    payload: Option<Value>,
    error: Option<String>,
    breakdown: Option<OverheadBreakdown>,
    metadata: HashMap<String, String>,
}

impl OperationResult {
    /// Constructs a successful result.
    pub fn success(
        operation_id: impl Into<String>,
        kind: OperationKind,
        total_duration: Duration,
        breakdown: Option<OverheadBreakdown>,
    ) -> OperationResult {
        OperationResult {
            operation_id: operation_id.into(),
            kind,
            succeeded: true,
            started: None,
            completed: None,
            total_duration,
            payload: None,
            error: None,
            breakdown,
            metadata: HashMap::new(),
        }
    }

    /// Constructs a failed result. Failures carry no breakdown.
    pub fn failure(
        operation_id: impl Into<String>,
        kind: OperationKind,
        total_duration: Duration,
        error: impl Into<String>,
    ) -> OperationResult {
        OperationResult {
            operation_id: operation_id.into(),
            kind,
            succeeded: false,
            started: None,
            completed: None,
            total_duration,
            payload: None,
            error: Some(error.into()),
            breakdown: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_started(mut self, started: DateTime<Utc>) -> Self {
        self.started = Some(started);
        self
    }

    pub fn with_completed(mut self, completed: DateTime<Utc>) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn started(&self) -> Option<DateTime<Utc>> {
        self.started
    }

    pub fn completed(&self) -> Option<DateTime<Utc>> {
        self.completed
    }

    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn breakdown(&self) -> Option<&OverheadBreakdown> {
        self.breakdown.as_ref()
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

/// The outcome of a bulk execution: one result per submitted operation.
#[derive(Debug, Default)]
pub struct BulkResult {
    pub results: Vec<OperationResult>,
    pub total_duration: Duration,
}

impl BulkResult {
    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.succeeded_count()
    }
}

#[cfg(test)]
mod tests {
    use super::{Operation, OperationKind, OperationResult, ReadPreference};
    use crate::overhead::OverheadBreakdown;
    use std::time::Duration;

    /// Verifies the identifier and kind accessors across all five variants.
    #[test]
    fn operation_id_and_kind() {
        let operations = vec![
            Operation::insert("op-1", crate::document::JsonDocument::empty("d")),
            Operation::read("op-2", "d", vec![], ReadPreference::Primary),
            Operation::update("op-3", "d", "a.b", serde_json::json!(1), false),
            Operation::delete("op-4", "d"),
            Operation::aggregate("op-5", vec!["match".into()], false),
        ];
        let kinds: Vec<OperationKind> = operations.iter().map(Operation::kind).collect();
        assert_eq!(
            vec![
                OperationKind::Insert,
                OperationKind::Read,
                OperationKind::Update,
                OperationKind::Delete,
                OperationKind::Aggregate,
            ],
            kinds
        );
        for (i, operation) in operations.iter().enumerate() {
            assert_eq!(format!("op-{}", i + 1), operation.id());
        }
    }

    /// Verifies the success factory: flag set, error absent, breakdown carried through.
    #[test]
    fn success_factory() {
        let breakdown = OverheadBreakdown::builder()
            .total_latency(Duration::from_micros(10))
            .build();
        let result = OperationResult::success(
            "op-1",
            OperationKind::Read,
            Duration::from_micros(10),
            Some(breakdown),
        )
        .with_metadata("collection", "bench_traverse_1");

        assert!(result.succeeded());
        assert_eq!(None, result.error());
        assert!(result.breakdown().is_some());
        assert_eq!(
            Some("bench_traverse_1"),
            result.metadata().get("collection").map(String::as_str)
        );
    }

    /// Verifies the failure factory: flag cleared, message kept, no breakdown.
    #[test]
    fn failure_factory() {
        let result = OperationResult::failure(
            "op-2",
            OperationKind::Delete,
            Duration::from_micros(3),
            "document not found",
        );
        assert!(!result.succeeded());
        assert_eq!(Some("document not found"), result.error());
        assert!(result.breakdown().is_none());
    }
}
