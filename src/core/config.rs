// This module holds the knobs a caller sets before compiling. CompilerOptions carries the
// target triple (defaulting to the host triple reported by LLVM), the allocation policy for
// each frame's defer anchor, and whether the finished module is run through the LLVM verifier.
// AnchorPolicy records the decision about where the anchor lives: Frame keeps it in the
// activation's stack frame so every exit path reclaims it, Heap allocates it per activation
// and accepts that the allocation is never freed. generate_debug asks for one DWARF compile
// unit per source file.

//! Compiler configuration.

use inkwell::targets::TargetMachine;

/// Where the per-activation defer anchor is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorPolicy {
    /// Stack slot in the function's entry block. Released with the frame on
    /// both the normal and the unwinding exit.
    #[default]
    Frame,
    /// One heap allocation per activation, never released.
    Heap,
}

/// Options for a [`crate::driver::Compiler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Target triple, `<arch>-<vendor>-<os>[-<env>]`, or the `pnacl` alias.
    pub target_triple: String,

    /// Defer anchor allocation policy.
    pub anchor_policy: AnchorPolicy,

    /// Run the LLVM verifier over each finished module.
    pub verify_module: bool,

    /// Emit a DWARF compile unit for every source file of the package.
    pub generate_debug: bool,
}

impl CompilerOptions {
    pub fn new(target_triple: impl Into<String>) -> Self {
        Self {
            target_triple: target_triple.into(),
            anchor_policy: AnchorPolicy::default(),
            verify_module: true,
            generate_debug: false,
        }
    }

    pub fn with_anchor_policy(mut self, policy: AnchorPolicy) -> Self {
        self.anchor_policy = policy;
        self
    }

    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_module = verify;
        self
    }

    pub fn with_debug_info(mut self, generate: bool) -> Self {
        self.generate_debug = generate;
        self
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        let triple = TargetMachine::get_default_triple();
        Self::new(triple.as_str().to_string_lossy().into_owned())
    }
}
