//! Error types for continuum-types.

use thiserror::Error;

/// Errors produced when parsing shared vocabulary from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    /// The text does not name a known variant.
    #[error("unknown {kind}: {value}")]
    Unknown {
        /// What was being parsed (e.g. "deployment mode").
        kind: &'static str,
        /// The offending text.
        value: String,
    },
}

impl TypesError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Self::Unknown {
            kind,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TypesError::unknown("provider", "vmware");
        assert_eq!(err.to_string(), "unknown provider: vmware");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypesError>();
    }
}
