//! Scoped save/restore of the builder's insertion point.
//!
//! The builder cursor is shared by everything that emits IR during a
//! session. Code that has to populate another block first takes an
//! [`InsertionGuard`]; dropping the guard puts the cursor back at the end of
//! the block it was in, on early returns, `?` propagation and panics alike.

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;

pub struct InsertionGuard<'b, 'ctx> {
    builder: &'b Builder<'ctx>,
    saved: Option<BasicBlock<'ctx>>,
}

impl<'b, 'ctx> InsertionGuard<'b, 'ctx> {
    pub fn new(builder: &'b Builder<'ctx>) -> Self {
        Self {
            builder,
            saved: builder.get_insert_block(),
        }
    }

    /// Block the cursor returns to.
    pub fn saved_block(&self) -> Option<BasicBlock<'ctx>> {
        self.saved
    }
}

impl Drop for InsertionGuard<'_, '_> {
    fn drop(&mut self) {
        match self.saved {
            Some(block) => self.builder.position_at_end(block),
            None => self.builder.clear_insertion_position(),
        }
    }
}
