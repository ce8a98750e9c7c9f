//! Event validation and error collection.
//!
//! Malformed input is rejected at ingestion and never enters the window
//! store. This module provides:
//! - **Validation trait** - structural rules for inbound records
//! - **Error handling modes** - skip bad events, log and continue, or fail fast
//! - **Error collectors** - accumulate rejections for batch reporting
//! - **Built-in validators** - the checks used by [`Event`](crate::Event)
//!
//! # Example
//!
//! ```
//! use ironrank::Event;
//! use ironrank::validation::Validate;
//!
//! assert!(Event::new("item-1", 1_000).validate().is_ok());
//! assert!(Event::new("", 1_000).validate().is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Result type for validation operations.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Trait for types that can be validated.
pub trait Validate {
    /// Validate this instance and return a list of errors if invalid.
    fn validate(&self) -> ValidationResult;
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// The field that failed validation (optional)
    pub field: Option<String>,
    /// Human-readable error message
    pub message: String,
    /// Error code for categorization (optional)
    pub code: Option<String>,
}

impl ValidationError {
    /// Create a new validation error with just a message.
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            field: None,
            message: message.into(),
            code: None,
        }
    }

    /// Create a validation error for a specific field.
    pub fn field<S: Into<String>, M: Into<String>>(field: S, message: M) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
            code: None,
        }
    }

    /// Create a validation error with an error code.
    #[must_use]
    pub fn with_code<S: Into<String>>(mut self, code: S) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref field) = self.field {
            write!(f, "[{}] {}", field, self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(ref code) = self.code {
            write!(f, " (code: {})", code)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Defines how a batch ingestion handles invalid events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Skip invalid events silently and continue
    SkipInvalid,
    /// Record invalid events in the error collector and continue
    #[default]
    LogAndContinue,
    /// Stop at the first invalid event
    FailFast,
}

/// Collects rejected events for batch reporting.
///
/// Filled by [`Aggregator::ingest_batch`](crate::Aggregator::ingest_batch) in
/// [`ValidationMode::LogAndContinue`].
#[derive(Debug, Clone, Default)]
pub struct ErrorCollector {
    errors: Vec<RecordError>,
}

/// A validation error with optional record context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordError {
    /// Index or identifier of the record that failed
    pub record_id: Option<String>,
    /// The validation errors for this record
    pub errors: Vec<ValidationError>,
}

impl ErrorCollector {
    /// Create a new empty error collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation error for a record.
    pub fn add_error(&mut self, record_id: Option<String>, errors: Vec<ValidationError>) {
        self.errors.push(RecordError { record_id, errors });
    }

    /// Get the total number of failed records.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Get all collected errors.
    pub fn errors(&self) -> &[RecordError] {
        &self.errors
    }

    /// Clear all collected errors.
    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// Log every collected error at `warn` level.
    pub fn log_errors(&self) {
        for (idx, record_err) in self.errors.iter().enumerate() {
            if let Some(ref id) = record_err.record_id {
                log::warn!("Record {}: {}", id, format_errors(&record_err.errors));
            } else {
                log::warn!("Record #{}: {}", idx, format_errors(&record_err.errors));
            }
        }
    }

    /// Export errors to JSON format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.errors)
    }

    /// Write errors to a file in JSON format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl fmt::Display for ErrorCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorCollector({} errors)", self.error_count())
    }
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validation helpers for common patterns.
pub mod validators {
    use super::{ValidationError, ValidationResult};
    use std::fmt;

    /// Validate that a string is not empty.
    pub fn not_empty(field: &str, value: &str) -> ValidationResult {
        if value.is_empty() {
            Err(vec![ValidationError::field(field, "must not be empty").with_code("empty")])
        } else {
            Ok(())
        }
    }

    /// Validate that a numeric value is within a range.
    pub fn in_range<T: PartialOrd + fmt::Display>(
        field: &str,
        value: T,
        min: T,
        max: T,
    ) -> ValidationResult {
        if value >= min && value <= max {
            Ok(())
        } else {
            Err(vec![
                ValidationError::field(field, format!("must be between {} and {}", min, max))
                    .with_code("out_of_range"),
            ])
        }
    }
}

/// Combine multiple validation results.
pub fn combine_validations(results: Vec<ValidationResult>) -> ValidationResult {
    let mut all_errors = Vec::new();
    for result in results {
        if let Err(mut errors) = result {
            all_errors.append(&mut errors);
        }
    }
    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors)
    }
}
