//! Small shared utilities: serde adapters and histogram export helpers.

pub mod histogram_export;
pub mod serde_duration_nanos;
pub mod serde_histogram;
