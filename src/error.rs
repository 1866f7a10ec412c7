//! Error types for hand-tracking sessions.
//!
//! All errors implement `std::error::Error` and carry enough context to decide
//! whether an operation is worth retrying.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: a session could not be created or activated
//! - **Poll Errors**: a single poll attempt failed (the poll loop keeps going)
//! - **Device Errors**: a device could not be opened or its descriptor fetched
//! - **Buffer Negotiation Errors**: the provider kept rejecting the serial buffer
//! - **Recording / Parse Errors**: replay files and configuration documents
//!
//! Poll timeouts are not errors; they surface as
//! [`PollResult::Timeout`](crate::PollResult::Timeout).
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use handtrack::TrackingError;
//!
//! let error = TrackingError::connection_failed("tracking service not running");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for tracking operations.
pub type Result<T, E = TrackingError> = std::result::Result<T, E>;

/// Main error type for tracking operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TrackingError {
    #[error("Failed to connect to tracking service: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Poll failed: {reason}")]
    Poll { reason: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Could not open device: {reason}")]
    DeviceOpen { reason: String },

    #[error("Failed to get device info: {reason}")]
    DescriptorFetch { reason: String },

    #[error(
        "Failed to get device info: serial buffer rejected after retry (offered {offered} bytes, provider requires {required})"
    )]
    BufferNegotiation { offered: usize, required: usize },

    #[error("Provider call {operation} failed: {reason}")]
    Provider { operation: String, reason: String },

    #[error("Failed to start poll thread")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    #[error("Recording file error: {path}")]
    Recording {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },
}

impl TrackingError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TrackingError::Connection { .. } => true,
            TrackingError::Poll { .. } => true,
            TrackingError::Timeout { .. } => true,
            TrackingError::DeviceOpen { .. } => true,
            TrackingError::DescriptorFetch { .. } => true,
            TrackingError::BufferNegotiation { .. } => true,
            TrackingError::Provider { .. } => true,
            TrackingError::Spawn { .. } => false,
            TrackingError::Recording { .. } => false,
            TrackingError::Parse { .. } => false,
        }
    }

    /// Whether this error means a device descriptor could not be fetched.
    ///
    /// A buffer negotiation violation counts as a descriptor failure.
    pub fn is_descriptor_failure(&self) -> bool {
        matches!(
            self,
            TrackingError::DescriptorFetch { .. } | TrackingError::BufferNegotiation { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TrackingError::Connection { .. } => vec![
                "Ensure the tracking service is running",
                "Call open() again once the service is available",
                "Check that no other client holds an exclusive session",
            ],
            TrackingError::Poll { .. } => vec![
                "Transient failure, the poll loop retries automatically",
                "Check the tracking service logs if failures persist",
            ],
            TrackingError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Verify the tracking service is responding",
                "Check that a device is plugged in",
            ],
            TrackingError::DeviceOpen { .. } => vec![
                "Reconnect the tracking device",
                "Check USB power and cabling",
                "Wait for the next device event",
            ],
            TrackingError::DescriptorFetch { .. } | TrackingError::BufferNegotiation { .. } => {
                vec![
                    "Wait for the next device event",
                    "Update the tracking service to a compatible version",
                ]
            }
            TrackingError::Provider { .. } => vec![
                "Check the tracking service logs",
                "Restart the tracking service",
            ],
            TrackingError::Spawn { .. } => vec![
                "Check process thread limits",
                "Check available system memory",
            ],
            TrackingError::Recording { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            TrackingError::Parse { .. } => vec![
                "Check document format",
                "Verify field names and value types",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        TrackingError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TrackingError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for transient poll errors.
    pub fn poll_failed(reason: impl Into<String>) -> Self {
        TrackingError::Poll { reason: reason.into() }
    }

    /// Helper constructor for device open errors.
    pub fn device_open_failed(reason: impl Into<String>) -> Self {
        TrackingError::DeviceOpen { reason: reason.into() }
    }

    /// Helper constructor for descriptor fetch errors.
    pub fn descriptor_fetch_failed(reason: impl Into<String>) -> Self {
        TrackingError::DescriptorFetch { reason: reason.into() }
    }

    /// Helper constructor for generic provider call errors.
    pub fn provider_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        TrackingError::Provider { operation: operation.into(), reason: reason.into() }
    }

    /// Helper constructor for recording file errors with path context.
    pub fn recording_error(path: PathBuf, source: std::io::Error) -> Self {
        TrackingError::Recording { path, source }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        TrackingError::Parse { context: context.into(), details: details.into() }
    }
}

impl From<serde_yaml_ng::Error> for TrackingError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        TrackingError::Parse { context: "YAML".to_string(), details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_messages_carry_their_context(
            reason in "[a-zA-Z0-9 ]*",
            offered in 0usize..4096,
            required in 0usize..4096,
            duration_ms in 1u64..60000u64
        ) {
            let connection = TrackingError::connection_failed(reason.clone());
            prop_assert!(connection.to_string().contains(&reason));

            let device = TrackingError::device_open_failed(reason.clone());
            prop_assert!(device.to_string().contains(&reason));

            let negotiation = TrackingError::BufferNegotiation { offered, required };
            let msg = negotiation.to_string();
            prop_assert!(msg.contains(&offered.to_string()));
            prop_assert!(msg.contains(&required.to_string()));

            let timeout = TrackingError::Timeout { duration: Duration::from_millis(duration_ms) };
            prop_assert!(!timeout.to_string().is_empty());
        }

        #[test]
        fn source_chain_is_preserved(
            base_message in "[a-z]{1,20}",
            reasons in prop::collection::vec("[a-z]{1,10}", 1..4)
        ) {
            let mut current: Box<dyn std::error::Error + Send + Sync> =
                Box::new(std::io::Error::other(base_message.clone()));
            for reason in &reasons {
                current = Box::new(TrackingError::connection_failed_with_source(reason.clone(), current));
            }

            let mut depth = 0;
            let mut found_base = false;
            let mut cursor: Option<&(dyn std::error::Error + 'static)> = Some(current.as_ref());
            while let Some(err) = cursor {
                if err.to_string() == base_message {
                    found_base = true;
                }
                depth += 1;
                cursor = err.source();
            }

            prop_assert_eq!(depth, reasons.len() + 1);
            prop_assert!(found_base);
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<TrackingError>();

        let error = TrackingError::connection_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn negotiation_violation_is_a_descriptor_failure() {
        let violation = TrackingError::BufferNegotiation { offered: 8, required: 8 };
        assert!(violation.is_descriptor_failure());
        assert!(TrackingError::descriptor_fetch_failed("x").is_descriptor_failure());
        assert!(!TrackingError::device_open_failed("x").is_descriptor_failure());
        assert!(violation.to_string().starts_with("Failed to get device info"));
    }

    #[test]
    fn recovery_methods_work() {
        let connection = TrackingError::connection_failed("test");
        let parse = TrackingError::parse_error("config", "bad value");
        let spawn = TrackingError::Spawn { source: std::io::Error::other("limit") };

        assert!(connection.is_retryable());
        assert!(!parse.is_retryable());
        assert!(!spawn.is_retryable());

        for err in [connection, parse, spawn] {
            let suggestions = err.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn yaml_errors_convert_to_parse() {
        let yaml_err = serde_yaml_ng::from_str::<u32>("not: [a number").unwrap_err();
        let err: TrackingError = yaml_err.into();
        assert!(matches!(err, TrackingError::Parse { .. }));
    }
}
