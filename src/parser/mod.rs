//! Recursive-descent parser over the token stream (§4.5).
//!
//! The parser is a single pass: every expression and declarator is
//! type-checked as it is built, by calling straight into `sema` and
//! `types`. There is no separate "parse then check" stage.

mod decl;
mod expr;
mod stmt;

pub use decl::DeclSpecifiers;

use crate::arena::Arenas;
use crate::ast::TranslationUnit;
use crate::diag::DiagKind;
use crate::sema::LabelTracker;
use crate::source::Coordinates;
use crate::symtab::{ScopeArena, ScopeId, SymbolEntry, SymbolKind, SymbolPayload, VarIdGen};
use crate::token::{Code, Token, TokenStream};
use crate::types::{AggregateKind, TypeDefRef, TypeDefinition, TypeFactory, POINTER_SIZE};
use std::cell::RefCell;
use std::rc::Rc;

/// The ambient context threaded as the first argument of every
/// parser/semantic helper function (§9 "Global parser context" design
/// note) - no process-wide mutable state.
pub struct ParserContext<'t> {
    pub tokens: &'t TokenStream,
    pub pos: u32,
    pub scopes: ScopeArena,
    pub scope: ScopeId,
    pub arenas: Arenas,
    pub var_ids: VarIdGen,
    pub anon_counter: crate::symtab::AnonCounter,

    // Parsing-function context (§4.5): flags and per-function trackers.
    pub in_loop: u32,
    pub in_switch: u32,
    pub in_static_scope: bool,
    pub current_function_return: Option<crate::types::TypeRef>,
    pub labels: LabelTracker,
    pub switches: Vec<crate::sema::SwitchTracker>,

    /// `(hidden local, size expression)` pairs recorded as VLA dimensions are
    /// materialized (§4.6 "VLA size materialization"); the IR builder lowers
    /// each pair to an assignment at the declaring statement's position.
    pub vla_sizes: Vec<(crate::symtab::VarId, crate::ast::ExprId)>,

    /// Hidden-local ids of VLA parameters materialized from a bare `[*]`
    /// suffix, with no size expression to bind (§4.9 "Function": legal in a
    /// prototype, not in a definition). Checked once a declarator turns out
    /// to introduce a function body.
    pub unbound_vla_vars: std::collections::HashSet<crate::symtab::VarId>,

    /// The builtin `va_list` aggregate pre-declared as a root-scope typedef
    /// (§4.9 "Function": `__builtin_va_arg`'s first argument must name this
    /// type). Kept by definition identity so `sema::is_va_list_type` can
    /// compare a value's type against it even through further typedef
    /// aliasing.
    pub va_list_def: TypeDefRef,
}

impl<'t> ParserContext<'t> {
    #[must_use]
    pub fn new(tokens: &'t TokenStream) -> Self {
        let mut scopes = ScopeArena::new();
        let scope = scopes.root();

        let va_list_def = Rc::new(RefCell::new(TypeDefinition::new_forward(
            AggregateKind::Struct,
            "__builtin_va_list".to_string(),
        )));
        {
            let mut def = va_list_def.borrow_mut();
            def.is_defined = true;
            def.size = POINTER_SIZE;
            def.align = POINTER_SIZE as u32;
        }
        let va_list_ty = TypeFactory::aggregate(va_list_def.clone(), Default::default());
        scopes.declare(
            scope,
            "va_list".to_string(),
            SymbolEntry {
                kind: SymbolKind::Typedef,
                name: "va_list".to_string(),
                payload: SymbolPayload::Typedef(va_list_ty),
            },
        );

        ParserContext {
            tokens,
            pos: 0,
            scopes,
            scope,
            arenas: Arenas::new(),
            var_ids: VarIdGen::default(),
            anon_counter: crate::symtab::AnonCounter::default(),
            in_loop: 0,
            in_switch: 0,
            in_static_scope: true,
            current_function_return: None,
            labels: LabelTracker::new(),
            switches: Vec::new(),
            vla_sizes: Vec::new(),
            unbound_vla_vars: std::collections::HashSet::new(),
            va_list_def,
        }
    }

    #[must_use]
    pub fn current(&self) -> &Token {
        self.tokens.get(self.pos)
    }

    #[must_use]
    pub fn peek_code(&self) -> Code {
        self.effective_code(self.pos)
    }

    /// Re-derives `TYPE_NAME` vs `IDENTIFIER` for the token at `index`
    /// based on what's currently in scope (§4.5 "Typedef-sensitive lexing").
    fn effective_code(&self, index: u32) -> Code {
        let tok = self.tokens.get(index);
        if tok.raw_code == Code::Identifier && self.scopes.is_type_name(self.scope, &tok.text) {
            Code::TypeName
        } else {
            tok.raw_code
        }
    }

    pub fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos + 1 < self.tokens.len() as u32 {
            self.pos += 1;
        }
        tok
    }

    #[must_use]
    pub fn coords_here(&self) -> Coordinates {
        Coordinates::single(self.pos)
    }

    pub fn at(&self, code: Code) -> bool {
        self.peek_code() == code
    }

    pub fn eat(&mut self, code: Code) -> bool {
        if self.at(code) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// `expect`: consumes `code` or reports `expected_token` and leaves the
    /// cursor in place (the caller's synchronization point decides recovery).
    pub fn expect(&mut self, code: Code) -> Token {
        if self.at(code) {
            self.advance()
        } else {
            let coords = self.coords_here();
            let got = self.current().text.clone();
            self.arenas.diagnostics.report(
                DiagKind::ExpectedToken,
                coords,
                vec![format!("{code:?}").into(), got.into()],
            );
            self.tokens.get(self.pos).clone()
        }
    }

    pub fn expect_semicolon(&mut self) {
        if !self.eat(Code::Semicolon) {
            let coords = self.coords_here();
            let got = self.current().text.clone();
            self.arenas.diagnostics.report(DiagKind::ExpectedSemicolon, coords, vec![got.into()]);
        }
    }

    /// Skip tokens until a synchronizing token (`;`, `}`, or `)`) is
    /// reached, consuming it; used for statement/declaration-level error
    /// recovery (§4.5 "Failure semantics").
    pub fn synchronize(&mut self) {
        loop {
            match self.peek_code() {
                Code::Semicolon => {
                    self.advance();
                    return;
                }
                Code::RBrace | Code::Eof => return,
                Code::RParen => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// `__attribute__((...))`, recognised and consumed (§4.5 "Attributes").
    pub fn skip_attributes(&mut self) {
        while self.at(Code::KwAttribute) {
            self.advance();
            self.expect(Code::LParen);
            self.expect(Code::LParen);
            let mut depth = 1i32;
            while depth > 0 && !self.at(Code::Eof) {
                match self.peek_code() {
                    Code::LParen => depth += 1,
                    Code::RParen => depth -= 1,
                    _ => {}
                }
                self.advance();
            }
        }
    }
}

/// Parse a complete translation unit: a sequence of top-level declarations
/// and function definitions (§2 "Control flow": "tokens stream → parser").
#[must_use]
pub fn parse_translation_unit(tokens: &TokenStream) -> (TranslationUnit, ParserContext<'_>) {
    let mut ctx = ParserContext::new(tokens);
    let mut unit = TranslationUnit::default();
    while !ctx.at(Code::Eof) {
        decl::parse_top_level_declaration(&mut ctx, &mut unit);
    }
    (unit, ctx)
}
