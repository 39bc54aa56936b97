//! Node pools for the lifetime of one translation unit (§4.1).
//!
//! The five named arenas (token / AST / type / string / diagnostic) are
//! realized here as `Rc`-owned, append-only `Vec` pools rather than literal
//! bump-pointer arenas, the same choice a recursive MIR lowering pass makes
//! for its own IR when every `TyKind`/`ExprKind` node is `Rc::new(...)`
//! instead of arena-borrowed, because the data is graph-shaped (a struct
//! type's member list refers back to struct types) rather than flat. A flat
//! bump arena with a single crate-wide lifetime parameter threaded through
//! parser, semantic analyzer, IR builder and dominator analysis would buy
//! nothing a `Rc` pool doesn't already give: individual nodes are still
//! never freed before the whole bundle is, which is the only property §4.1
//! actually requires. See DESIGN.md for the full accounting of this
//! substitution.

use crate::ast::{AstExpression, AstStatement};
use crate::diag::DiagnosticEngine;
use crate::intern::Interner;
use crate::types::TypeDefRef;
use std::rc::Rc;

/// An append-only pool of `Rc`-shared nodes. `alloc` hands back a fresh
/// `Rc` and keeps a second handle in the pool so the node outlives any
/// particular owner - the "never individually freed" discipline of a bump
/// arena, without a borrowed lifetime.
#[derive(Debug)]
pub struct NodePool<T> {
    nodes: Vec<Rc<T>>,
}

impl<T> Default for NodePool<T> {
    fn default() -> Self {
        NodePool { nodes: Vec::new() }
    }
}

impl<T> NodePool<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, value: T) -> Rc<T> {
        let rc = Rc::new(value);
        self.nodes.push(rc.clone());
        rc
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Named pools for one translation unit.
#[derive(Default)]
pub struct Arenas {
    pub expressions: NodePool<AstExpression>,
    pub statements: NodePool<AstStatement>,
    /// Every `TypeDefinition` created, in creation order - doubles as the
    /// "type-definition list" the parser hands the IR builder (§2 control
    /// flow: "finalized AST + type-definition list").
    pub type_defs: Vec<TypeDefRef>,
    pub strings: Interner,
    pub diagnostics: DiagnosticEngine,
}

impl Arenas {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rough occupancy report for the `memory_statistics` configuration
    /// option (§6).
    #[must_use]
    pub fn occupancy(&self) -> ArenaOccupancy {
        let occ = ArenaOccupancy {
            expressions_allocated: self.expressions.len(),
            statements_allocated: self.statements.len(),
            type_defs_allocated: self.type_defs.len(),
            strings_interned: self.strings.len(),
            diagnostics_recorded: self.diagnostics.diagnostics().len(),
        };
        log::debug!("arena occupancy: {occ:?}");
        occ
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArenaOccupancy {
    pub expressions_allocated: usize,
    pub statements_allocated: usize,
    pub type_defs_allocated: usize,
    pub strings_interned: usize,
    pub diagnostics_recorded: usize,
}
