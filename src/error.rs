//! Error types for the unijob crate.
//!
//! Uses thiserror for derive macros and keeps error messages actionable.
//! Lock conflicts are deliberately *not* errors: a failed acquisition is a
//! normal `None`/`Reject` result and the caller decides policy.

use crate::store::StoreError;
use thiserror::Error;

/// Main error type for unijob operations.
#[derive(Error, Debug)]
pub enum UnijobError {
    /// Configuration is invalid or could not be loaded.
    #[error("{0}")]
    Config(String),

    /// The store rejected or failed an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A named atomic script failed while executing.
    #[error("script '{0}' failed: {1}")]
    Script(&'static str, String),

    /// A lock operation was used incorrectly (e.g., a policy that requires
    /// a TTL was given none).
    #[error("lock operation failed: {0}")]
    Lock(String),

    /// A job payload could not be serialized or parsed.
    #[error("invalid job payload: {0}")]
    Payload(String),

    /// A registry search pattern could not be compiled.
    #[error("invalid pattern '{0}': {1}")]
    Pattern(String, String),
}

/// Result type alias for unijob operations.
pub type Result<T> = std::result::Result<T, UnijobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_message_is_unwrapped() {
        let err = UnijobError::Config("prefix must not be empty".to_string());
        assert_eq!(err.to_string(), "prefix must not be empty");
    }

    #[test]
    fn script_error_names_the_script() {
        let err = UnijobError::Script("acquire", "bad argument".to_string());
        assert_eq!(err.to_string(), "script 'acquire' failed: bad argument");
    }

    #[test]
    fn store_error_is_transparent() {
        let err = UnijobError::from(StoreError::NoScript);
        assert!(err.to_string().contains("script not loaded"));
    }

    #[test]
    fn pattern_error_includes_pattern() {
        let err = UnijobError::Pattern("[".to_string(), "unclosed class".to_string());
        assert!(err.to_string().contains('['));
        assert!(err.to_string().contains("unclosed class"));
    }
}
