// This module resolves a textual target triple into a concrete LLVM target machine. The
// architecture field is normalised through the alias table that mirrors parseArch from
// LLVM's Triple.cpp, and the registered LLVM targets are searched linearly for a target with
// that name. The sandboxed-platform alias "pnacl" is rewritten to its canonical ARM triple
// first and the rewrite is recorded on the resolved TargetSpec, because entry synthesis needs
// to know about it. A triple that no registered target accepts is a configuration error that
// names the triple exactly as the caller spelled it; nothing is retained on that path.

//! Target triple resolution.

use crate::core::error::{CompileError, CompileResult};
use inkwell::module::Module;
use inkwell::targets::{
    CodeModel, InitializationConfig, RelocMode, Target, TargetData, TargetMachine, TargetTriple,
};
use inkwell::OptimizationLevel;
use std::sync::Once;

/// Alias accepted for the sandboxed native-client platform.
pub const PNACL_ALIAS: &str = "pnacl";

/// Concrete triple substituted for [`PNACL_ALIAS`].
pub const PNACL_TRIPLE: &str = "armv7-none-linux-gnueabi";

/// Architecture class for fields the alias table does not know.
pub const UNKNOWN_ARCH: &str = "unknown";

static INIT_TARGETS: Once = Once::new();

/// Register every backend target compiled into LLVM. Safe to call repeatedly.
pub fn initialize_targets() {
    INIT_TARGETS.call_once(|| {
        Target::initialize_all(&InitializationConfig::default());
    });
}

/// Normalise the architecture field of a triple to an LLVM target name.
///
/// Based on parseArch from LLVM's lib/Support/Triple.cpp.
pub fn parse_arch(arch: &str) -> &'static str {
    match arch {
        "i386" | "i486" | "i586" | "i686" | "i786" | "i886" | "i986" => "x86",
        "amd64" | "x86_64" => "x86-64",
        "powerpc" => "ppc",
        "powerpc64" | "ppu" => "ppc64",
        "mblaze" => "mblaze",
        "arm" | "xscale" => "arm",
        "thumb" => "thumb",
        "spu" | "cellspu" => "cellspu",
        "msp430" => "msp430",
        "mips" | "mipseb" | "mipsallegrex" => "mips",
        "mipsel" | "mipsallegrexel" => "mipsel",
        "mips64" | "mips64eb" => "mips64",
        "mipsel64" => "mipsel64",
        "r600" => "r600",
        "hexagon" => "hexagon",
        "sparc" => "sparc",
        "sparcv9" => "sparcv9",
        "tce" => "tce",
        "xcore" => "xcore",
        "nvptx" => "nvptx",
        "nvptx64" => "nvptx64",
        "le32" => "le32",
        "amdil" => "amdil",
        _ if arch.starts_with("armv") => "arm",
        _ if arch.starts_with("thumbv") => "thumb",
        _ => UNKNOWN_ARCH,
    }
}

/// Apply the sandboxed-platform rewrite. Returns the triple to resolve and
/// whether the alias was used.
pub fn canonicalize_triple(triple: &str) -> (String, bool) {
    if triple.eq_ignore_ascii_case(PNACL_ALIAS) {
        (PNACL_TRIPLE.to_string(), true)
    } else {
        (triple.to_string(), false)
    }
}

/// Architecture field of a triple. The canonical architecture name may
/// contain '-', which triples spell as '_', so the first field is the whole
/// architecture.
fn arch_field(triple: &str) -> &str {
    triple.split('-').next().unwrap_or(triple)
}

/// Resolved target: the machine, its data layout and the triple it was
/// created for. Immutable once resolved.
pub struct TargetSpec {
    triple: String,
    arch: &'static str,
    target_name: String,
    machine: TargetMachine,
    target_data: TargetData,
    data_layout: String,
    rewritten_from_alias: bool,
}

impl std::fmt::Debug for TargetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetSpec")
            .field("triple", &self.triple)
            .field("arch", &self.arch)
            .field("data_layout", &self.data_layout)
            .field("rewritten_from_alias", &self.rewritten_from_alias)
            .finish()
    }
}

impl TargetSpec {
    /// Resolve `triple` against the registered LLVM targets.
    pub fn resolve(triple: &str) -> CompileResult<Self> {
        initialize_targets();

        let (canonical, rewritten_from_alias) = canonicalize_triple(triple);
        let arch = parse_arch(arch_field(&canonical));
        let invalid = || CompileError::InvalidTarget {
            triple: triple.to_string(),
        };

        let mut next = Target::get_first();
        while let Some(target) = next {
            if target.get_name().to_str() == Ok(arch) {
                let machine = target
                    .create_target_machine(
                        &TargetTriple::create(&canonical),
                        "",
                        "",
                        OptimizationLevel::Default,
                        RelocMode::Default,
                        CodeModel::Default,
                    )
                    .ok_or_else(invalid)?;
                let target_data = machine.get_target_data();
                let data_layout = target_data
                    .get_data_layout()
                    .as_str()
                    .to_string_lossy()
                    .into_owned();

                log::info!(
                    "Resolved target {} (arch class {}, layout {})",
                    canonical,
                    arch,
                    data_layout
                );
                return Ok(Self {
                    triple: canonical,
                    arch,
                    target_name: arch.to_string(),
                    machine,
                    target_data,
                    data_layout,
                    rewritten_from_alias,
                });
            }
            next = target.get_next();
        }

        log::debug!("No registered target named {} for {}", arch, triple);
        Err(invalid())
    }

    /// Triple used for code generation, after any alias rewrite.
    pub fn triple(&self) -> &str {
        &self.triple
    }

    /// Normalised architecture class, e.g. `x86-64`.
    pub fn arch(&self) -> &'static str {
        self.arch
    }

    /// Name of the LLVM target that produced the machine.
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn machine(&self) -> &TargetMachine {
        &self.machine
    }

    pub fn target_data(&self) -> &TargetData {
        &self.target_data
    }

    pub fn data_layout(&self) -> &str {
        &self.data_layout
    }

    /// Whether the caller asked for [`PNACL_ALIAS`].
    pub fn rewritten_from_alias(&self) -> bool {
        self.rewritten_from_alias
    }

    /// Bind a module to this target's triple and data layout.
    pub fn configure_module(&self, module: &Module<'_>) {
        module.set_triple(&TargetTriple::create(&self.triple));
        module.set_data_layout(&self.target_data.get_data_layout());
    }
}
