// This module defines the error types for the frameweave code generator using the thiserror
// crate. CompileError covers the three caller-visible failure families: configuration errors
// (a target triple no registered backend target accepts, a root unit without its entry
// function or with an entry function that takes parameters or returns results), front-end errors forwarded unchanged from the parser/type checker/exporter
// collaborators, and internal invariant violations raised while wiring the control-flow graph
// (builder failures, inconsistent result slots, conflicting runtime declarations, verifier
// rejections). Each variant carries the identifying context (triple string, symbol name,
// reason) so messages stay descriptive. CompileResult<T> is the usual alias.

//! Error types for the frameweave compiler.
//!
//! Using thiserror for more idiomatic error handling.

use inkwell::builder::BuilderError;
use thiserror::Error;

/// Error type produced by the external front-end collaborators.
pub type FrontendError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for compilation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Invalid target triple: {triple}")]
    InvalidTarget {
        triple: String,
    },

    #[error("Could not find {symbol}")]
    MissingEntry {
        symbol: String,
    },

    #[error("{symbol} must take no parameters and return no results")]
    InvalidEntry {
        symbol: String,
    },

    #[error(transparent)]
    Frontend(#[from] FrontendError),

    #[error("IR builder failed: {0}")]
    Builder(#[from] BuilderError),

    #[error("Internal invariant violated: {reason}")]
    Internal {
        reason: String,
    },

    #[error("Symbol {name} requested with conflicting signatures")]
    SymbolConflict {
        name: String,
    },

    #[error("Module verification failed: {reason}")]
    Verification {
        reason: String,
    },

    #[error("Unsupported construct: {construct}")]
    Unsupported {
        construct: String,
    },
}

impl CompileError {
    /// Shorthand for an internal invariant violation.
    pub fn internal(reason: impl Into<String>) -> Self {
        CompileError::Internal {
            reason: reason.into(),
        }
    }

    /// Whether this error aborts compilation as an invariant violation rather
    /// than reporting a problem with the caller's input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CompileError::Builder(_)
                | CompileError::Internal { .. }
                | CompileError::SymbolConflict { .. }
                | CompileError::Verification { .. }
        )
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_messages_name_their_subject() {
        let err = CompileError::InvalidTarget {
            triple: "foo-bar-baz".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid target triple: foo-bar-baz");
        assert!(!err.is_internal());

        let err = CompileError::MissingEntry {
            symbol: "main.main".to_string(),
        };
        assert_eq!(err.to_string(), "Could not find main.main");

        let err = CompileError::InvalidEntry {
            symbol: "main.main".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "main.main must take no parameters and return no results"
        );
        assert!(!err.is_internal());
    }

    #[test]
    fn test_frontend_errors_pass_through_unchanged() {
        let inner: FrontendError = "hello.src:3:1: expected declaration".into();
        let err = CompileError::from(inner);
        assert_eq!(err.to_string(), "hello.src:3:1: expected declaration");
        assert!(!err.is_internal());
    }

    #[test]
    fn test_internal_classification() {
        assert!(CompileError::internal("result slot missing").is_internal());
        assert!(CompileError::SymbolConflict {
            name: "runtime.main".to_string()
        }
        .is_internal());
        assert!(!CompileError::Unsupported {
            construct: "captured variable x".to_string()
        }
        .is_internal());
    }
}
