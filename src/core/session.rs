// This module provides arena-based compilation session state using the bumpalo crate. A fresh
// CompilationSession is created by every Compiler::compile call and dropped when it returns,
// so nothing survives from one compilation into the next. The session owns the arena used to
// intern symbol names (the runtime symbol registry keys its memo table with these interned
// strings) and tracks SessionStats: functions lowered, defer epilogues and landing pads built,
// deferred and spawned statements lowered, invokes emitted and runtime declarations created.
// SessionStats implements Display so the driver can log a summary once a module is finished.

//! Arena-based compilation session management.
//!
//! All session objects share the lifetime of one `compile` invocation.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for session objects.
    arena: &'arena Bump,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,

    /// String interning for symbol names.
    interned_strings: RefCell<HashMap<String, &'arena str>>,

    /// Function currently being lowered.
    current_function: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            current_function: RefCell::new(None),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Make `name` the current function until the returned scope drops,
    /// then restore whichever function was current before.
    pub fn enter_function(&self, name: &str) -> FunctionScope<'_, 'arena> {
        let outer = self.current_function.replace(Some(name.to_string()));
        FunctionScope {
            session: self,
            outer,
        }
    }

    pub fn current_function(&self) -> Option<String> {
        self.current_function.borrow().clone()
    }

    pub fn record_function_lowered(&self, name: &str, blocks: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_lowered += 1;
        if stats.largest_function_blocks < blocks {
            stats.largest_function_blocks = blocks;
            stats.largest_function_name = name.to_string();
        }
    }

    pub fn record_defer_block(&self) {
        self.stats.borrow_mut().defer_blocks += 1;
    }

    pub fn record_landing_pad(&self) {
        self.stats.borrow_mut().landing_pads += 1;
    }

    pub fn record_defer_stmt(&self) {
        self.stats.borrow_mut().defer_statements += 1;
    }

    pub fn record_go_stmt(&self) {
        self.stats.borrow_mut().go_statements += 1;
    }

    pub fn record_invoke(&self) {
        self.stats.borrow_mut().invokes += 1;
    }

    pub fn record_runtime_declaration(&self, name: &str) {
        self.stats.borrow_mut().runtime_declarations += 1;
        log::debug!("Declared runtime symbol: {}", name);
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Restores the enclosing current function on drop.
pub struct FunctionScope<'s, 'arena> {
    session: &'s CompilationSession<'arena>,
    outer: Option<String>,
}

impl Drop for FunctionScope<'_, '_> {
    fn drop(&mut self) {
        *self.session.current_function.borrow_mut() = self.outer.take();
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of functions lowered, literals and thunks included.
    pub functions_lowered: usize,

    /// Defer-running epilogue blocks created.
    pub defer_blocks: usize,

    /// Landing pads created.
    pub landing_pads: usize,

    /// `defer` statements lowered.
    pub defer_statements: usize,

    /// `go` statements lowered.
    pub go_statements: usize,

    /// Calls emitted as `invoke`.
    pub invokes: usize,

    /// Distinct runtime symbols declared.
    pub runtime_declarations: usize,

    /// Function with the most basic blocks.
    pub largest_function_name: String,

    /// Block count of that function.
    pub largest_function_blocks: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions lowered: {}", self.functions_lowered)?;
        writeln!(f, "  Defer blocks: {}", self.defer_blocks)?;
        writeln!(f, "  Landing pads: {}", self.landing_pads)?;
        writeln!(f, "  Defer statements: {}", self.defer_statements)?;
        writeln!(f, "  Go statements: {}", self.go_statements)?;
        writeln!(f, "  Invokes: {}", self.invokes)?;
        writeln!(f, "  Runtime declarations: {}", self.runtime_declarations)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} blocks)",
                self.largest_function_name, self.largest_function_blocks
            )?;
        }

        Ok(())
    }
}
