//! LLVM code generation for a checked package.
//!
//! Lowering runs in three layers: [`target`] resolves the triple into a
//! machine and data layout, [`codegen`] owns the module-wide state (types,
//! runtime declarations, the shared builder) and [`lower`] walks function
//! bodies. Functions containing `defer` get a dedicated epilogue from
//! [`defer`]; the root package additionally gets a native entry point from
//! [`entry`]. [`debug`] turns the recorded source files into DWARF compile
//! units when debug info is requested.
//!
//! ```ignore
//! use frameweave::llvm::{CodegenCx, TargetSpec};
//!
//! let target = TargetSpec::resolve("x86_64-unknown-linux-gnu")?;
//! target.configure_module(&module);
//! let mut cx = CodegenCx::new(&context, &module, &builder, target.target_data(),
//!                             &session, &options, "main");
//! cx.lower_package(&package)?;
//! ```

pub mod codegen;
pub mod cursor;
pub mod debug;
pub mod defer;
pub mod entry;
pub mod function_analysis;
pub mod lower;
pub mod runtime;
pub mod target;
pub mod types;

pub use codegen::{CodegenCx, PackageFn, CTORS_SYMBOL};
pub use cursor::InsertionGuard;
pub use debug::{CompileUnitRecord, COMPILE_UNITS_METADATA};
pub use entry::{build_entry_shim, create_main_function, ENTRY_SYMBOL, NATIVE_ENTRY_SYMBOL};
pub use function_analysis::{has_defer, has_direct_call, EpilogueShape};
pub use lower::lower_function;
pub use runtime::{RuntimeFn, SymbolRegistry};
pub use target::{canonicalize_triple, parse_arch, TargetSpec, PNACL_ALIAS, PNACL_TRIPLE};
pub use types::TypeMap;
