// This module holds the per-unit debug metadata sink. When the caller asks for debug info,
// lower_package records one CompileUnitRecord per source file of the package, and the driver
// flushes the records once lowering is done. Each record becomes a DWARF compile unit created
// through LLVM's DIBuilder, which also lists it under the llvm.dbg.cu named metadata, and the
// module gets the "Debug Info Version" flag the backend expects. Only compile units are
// emitted; functions carry no subprogram or location metadata yet.

//! DWARF compile units for lowered packages.

use inkwell::context::Context;
use inkwell::debug_info::{DWARFEmissionKind, DWARFSourceLanguage};
use inkwell::module::{FlagBehavior, Module};
use std::path::Path;

/// Named metadata listing every compile unit of a module.
pub const COMPILE_UNITS_METADATA: &str = "llvm.dbg.cu";

/// Module flag carrying [`DEBUG_METADATA_VERSION`].
pub const DEBUG_VERSION_FLAG: &str = "Debug Info Version";

/// Debug metadata format understood by LLVM 19.
pub const DEBUG_METADATA_VERSION: u64 = 3;

/// Producer string recorded in every compile unit.
pub const PRODUCER: &str = concat!("frameweave ", env!("CARGO_PKG_VERSION"));

/// One source file awaiting its compile unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileUnitRecord {
    /// File name without its directory.
    pub file: String,
    /// Directory of the file, `.` when the name has none.
    pub directory: String,
    /// Import path of the package the file belongs to.
    pub package: String,
}

impl CompileUnitRecord {
    pub fn new(path: &str, package: &str) -> Self {
        let path_ref = Path::new(path);
        let file = path_ref
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        let directory = match path_ref.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                parent.to_string_lossy().into_owned()
            }
            _ => ".".to_string(),
        };
        Self {
            file,
            directory,
            package: package.to_string(),
        }
    }
}

/// Create a compile unit for every record. Returns how many were emitted.
pub fn emit_compile_units<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    units: &[CompileUnitRecord],
) -> usize {
    if units.is_empty() {
        return 0;
    }

    for unit in units {
        let (builder, _compile_unit) = module.create_debug_info_builder(
            true,
            DWARFSourceLanguage::Go,
            &unit.file,
            &unit.directory,
            PRODUCER,
            false,
            "",
            0,
            "",
            DWARFEmissionKind::Full,
            0,
            false,
            false,
            "",
            "",
        );
        builder.finalize();
        log::debug!("Compile unit {}/{} for {}", unit.directory, unit.file, unit.package);
    }

    module.add_basic_value_flag(
        DEBUG_VERSION_FLAG,
        FlagBehavior::Warning,
        context.i32_type().const_int(DEBUG_METADATA_VERSION, false),
    );
    units.len()
}
