// This module groups the IR-independent infrastructure shared by the code generator and the
// driver: the thiserror-based error taxonomy, the compiler options (target triple, defer anchor
// policy, verification), and the arena-backed per-compile session with its statistics.

//! Core infrastructure.
//!
//! Nothing in here depends on a particular function or package; everything is
//! created per `compile` call.

pub mod config;
pub mod error;
pub mod session;

pub use config::{AnchorPolicy, CompilerOptions};
pub use error::{CompileError, CompileResult, FrontendError};
pub use session::{CompilationSession, FunctionScope, SessionStats};
