//! Frameweave - code generation core for a garbage-collected, Go-like language.
//!
//! Frameweave lowers a type-checked package to an LLVM module. Its focus is
//! the frame machinery behind `defer`: functions that defer get a single
//! defer-running exit block and, when they make calls that can unwind, a
//! catch-all landing pad that funnels propagating failures through the same
//! block. The root package additionally gets a native `main` that hands
//! control to the runtime.
//!
//! # Primary Usage
//!
//! ```ignore
//! use frameweave::{Compiler, CompilerOptions, PreparedFrontend};
//! use inkwell::context::Context;
//!
//! let context = Context::create();
//! let compiler = Compiler::new(CompilerOptions::default(), frontend);
//! let module = compiler.compile(&context, &["main.go"], "main")?;
//! println!("{}", module.print_to_string().unwrap_or_default());
//! ```
//!
//! # Architecture
//!
//! - [`driver`] - `Compiler::compile` and the owned output module
//! - [`llvm`] - target resolution, lowering, defer epilogues, entry synthesis
//! - [`frontend`] - syntax trees and the external front-end contract
//! - [`core`] - shared infrastructure (errors, options, session)

pub mod core;
pub mod driver;
pub mod frontend;
pub mod llvm;

pub use crate::core::{
    AnchorPolicy, CompilationSession, CompileError, CompileResult, CompilerOptions, SessionStats,
};
pub use driver::{Compiler, Module, ModuleGuard};
pub use frontend::{Frontend, PreparedFrontend};
pub use llvm::TargetSpec;
