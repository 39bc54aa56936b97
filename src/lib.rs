//! A type-checking front end and CFG-based IR builder for a pragmatic
//! C89/C99 subset (§1).
//!
//! The three tightly coupled subsystems - parser, semantic analyzer, IR
//! builder - are split across modules the way §2's component table lists
//! them; see each module's doc comment for the §-reference it implements.
//! This crate is a library only: source loading, lexing,
//! preprocessing, diagnostic printing, and code generation are all out of
//! scope (§1) and left to a driver built on top.

pub mod arena;
pub mod ast;
pub mod ast_dump;
pub mod constexpr;
pub mod diag;
pub mod initializer;
pub mod intern;
pub mod ir;
pub mod parser;
pub mod sema;
pub mod source;
pub mod symtab;
pub mod token;
pub mod types;

use ast::TranslationUnit;
use ir::IrFunction;
use parser::ParserContext;
use token::TokenStream;

/// The result of compiling one translation unit through every phase this
/// crate owns: parse, semantic check (interleaved with parsing per §4.5),
/// IR build, dominator analysis (§2 "Control flow").
pub struct CompilationResult<'t> {
    pub unit: TranslationUnit,
    pub ctx: ParserContext<'t>,
    pub functions: Vec<IrFunction>,
}

/// Runs a token stream through the whole core: parse + semantic check,
/// then - only if parsing recorded no error (§7 "suppresses IR construction
/// if any error was recorded") - lower every function definition to IR and
/// compute its dominator tree.
#[must_use]
pub fn compile(tokens: &TokenStream) -> CompilationResult<'_> {
    let (unit, mut ctx) = parser::parse_translation_unit(tokens);
    let mut functions = Vec::new();
    if !ctx.arenas.diagnostics.has_error() {
        for func in &unit.functions {
            if let Some(mut ir_func) = ir::build::build_function(&mut ctx.var_ids, &ctx.vla_sizes, func) {
                ir::dom::analyze(&mut ir_func);
                functions.push(ir_func);
            }
        }
    }
    CompilationResult { unit, ctx, functions }
}
