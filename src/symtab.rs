//! Lexically nested scopes and the symbol table (§4.4).

use crate::ast::{AstFunctionDeclaration, AstValueDeclaration, EnumConstantDecl};
use crate::types::{TypeDefRef, TypeRef};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Identifies one value-level local or global for the lifetime of a
/// translation unit; also doubles as the VLA "hidden local" handle
/// referenced from `TypeKind::Vla` (§4.6 "VLA size materialization").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct VarIdGen(u32);

impl VarIdGen {
    pub fn next(&mut self) -> VarId {
        let id = VarId(self.0);
        self.0 += 1;
        id
    }
}

/// `SymbolKind` (§3, §4.4). Tag symbols (struct/union/enum) live in a
/// namespace separate from ordinary identifiers (§4.4 "Tag symbols").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Function,
    Union,
    Struct,
    Enum,
    Typedef,
    Value,
    EnumConstant,
}

impl SymbolKind {
    #[must_use]
    pub fn is_tag(self) -> bool {
        matches!(self, SymbolKind::Struct | SymbolKind::Union | SymbolKind::Enum)
    }
}

/// The symbol payload; exactly one variant is populated depending on `kind`.
#[derive(Debug, Clone)]
pub enum SymbolPayload {
    Function(Rc<RefCell<AstFunctionDeclaration>>),
    Aggregate(TypeDefRef),
    Typedef(TypeRef),
    Value(Rc<RefCell<AstValueDeclaration>>),
    EnumConstant(EnumConstantDecl),
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub kind: SymbolKind,
    pub name: String,
    pub payload: SymbolPayload,
}

/// Namespace-qualify a tag name for the separate struct/union/enum
/// namespace, grounded on `sema.h`'s documented `"$$name"`/`"|$name"`/
/// `"#$enum"` convention; this crate unifies all three tag kinds behind one
/// `$` prefix since the distilled spec only requires *a* prefixed name
/// (see SPEC_FULL.md §B.4).
#[must_use]
pub fn tag_key(name: &str) -> String {
    format!("${name}")
}

/// `Scope`: `(parent, symbols, next)`. The `next` link from §3 (threading
/// all scopes for cleanup) is unnecessary in Rust - scopes are owned by an
/// `Rc` tree and a flat list in [`ScopeArena`] plays that role instead.
#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    symbols: RefCell<HashMap<String, SymbolEntry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Owns every scope created during a translation unit so they remain
/// reachable after the block that created them closes (§3 "Lifecycles":
/// "remain reachable via a global list for later lookup - e.g. from the
/// IR builder").
#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    #[must_use]
    pub fn new() -> Self {
        let mut arena = ScopeArena { scopes: Vec::new() };
        arena.scopes.push(Scope { parent: None, symbols: RefCell::new(HashMap::new()) });
        arena
    }

    #[must_use]
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// `newScope`.
    pub fn new_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope { parent: Some(parent), symbols: RefCell::new(HashMap::new()) });
        log::trace!("opened scope {id:?} (parent {parent:?})");
        id
    }

    fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    /// `findSymbol`: walk the parent chain starting at `scope`.
    #[must_use]
    pub fn find_symbol(&self, scope: ScopeId, name: &str) -> Option<SymbolEntry> {
        let mut cur = Some(scope);
        while let Some(id) = cur {
            let s = self.get(id);
            if let Some(sym) = s.symbols.borrow().get(name) {
                return Some(sym.clone());
            }
            cur = s.parent;
        }
        None
    }

    /// `findSymbolInScope`: look only in `scope` itself, no parent walk.
    #[must_use]
    pub fn find_in_scope(&self, scope: ScopeId, name: &str) -> Option<SymbolEntry> {
        self.get(scope).symbols.borrow().get(name).cloned()
    }

    /// `declareSymbol`: install `symbol` in `scope`, unconditionally
    /// overwriting whatever was there (callers are expected to have
    /// already checked shadowing rules via [`ScopeArena::find_in_scope`]).
    pub fn declare(&self, scope: ScopeId, name: impl Into<String>, symbol: SymbolEntry) {
        self.get(scope).symbols.borrow_mut().insert(name.into(), symbol);
    }

    /// Is `name` currently bound to a typedef anywhere up the parent chain
    /// from `scope`? (`isTypeName`, SPEC_FULL.md §B.5 - used by the parser's
    /// typedef-sensitive look-ahead without consuming a token.)
    #[must_use]
    pub fn is_type_name(&self, scope: ScopeId, name: &str) -> bool {
        matches!(self.find_symbol(scope, name), Some(SymbolEntry { kind: SymbolKind::Typedef, .. }))
    }
}

/// Per-context counter for anonymous aggregate names, `<anon$N>` (§4.4).
#[derive(Debug, Default)]
pub struct AnonCounter(u32);

impl AnonCounter {
    pub fn next(&mut self) -> String {
        let n = self.0;
        self.0 += 1;
        format!("<anon${n}>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Qualifiers, TypeFactory, TypeId};

    #[test]
    fn find_symbol_walks_parent_chain() {
        let mut scopes = ScopeArena::new();
        let root = scopes.root();
        let ty = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        scopes.declare(
            root,
            "T",
            SymbolEntry { kind: SymbolKind::Typedef, name: "T".into(), payload: SymbolPayload::Typedef(ty) },
        );
        let inner = scopes.new_scope(root);
        assert!(scopes.is_type_name(inner, "T"));
        assert!(scopes.find_in_scope(inner, "T").is_none());
    }

    #[test]
    fn shadowing_in_inner_scope_hides_outer() {
        let mut scopes = ScopeArena::new();
        let root = scopes.root();
        let ty = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        scopes.declare(
            root,
            "T",
            SymbolEntry { kind: SymbolKind::Typedef, name: "T".into(), payload: SymbolPayload::Typedef(ty) },
        );
        let inner = scopes.new_scope(root);
        // inner block declares local int named T (S6 scenario)
        scopes.declare(
            inner,
            "T",
            SymbolEntry {
                kind: SymbolKind::Value,
                name: "T".into(),
                payload: SymbolPayload::Value(Rc::new(RefCell::new(
                    crate::ast::AstValueDeclaration::dummy_for_tests(),
                ))),
            },
        );
        assert!(!scopes.is_type_name(inner, "T"));
        assert_eq!(scopes.find_symbol(inner, "T").unwrap().kind, SymbolKind::Value);
    }
}
