//! End-to-end scenarios (spec §8 S1-S6), driven through the full
//! `cfront::compile` pipeline rather than hand-built intermediate values -
//! the module-level unit tests already cover each algorithm directly.

mod common;

use cfront::ast::{AstInitializer, ExpressionKind, ParsedInitializerItem, StatementKind};
use cfront::types::{compute_type_size, type_alignment, TypeKind};
use common::lex;

fn compile(src: &str) -> cfront::CompilationResult<'static> {
    // Leak the token stream so its borrow can outlive this function; test
    // fixtures are small and never freed until process exit, same
    // trade-off `tests/common`'s lexer already makes for test tooling.
    let tokens: &'static cfront::token::TokenStream = Box::leak(Box::new(lex(src)));
    cfront::compile(tokens)
}

/// S1: `struct S { char a; int b; char c; };` -> offsets 0, 4, 8; size 12; align 4.
#[test]
fn s1_struct_layout() {
    let result = compile("struct S { char a; int b; char c; } s;");
    assert!(!result.ctx.arenas.diagnostics.has_error());
    let global = result.unit.globals.iter().find(|g| g.borrow().name.as_str() == "s").unwrap();
    let ty = global.borrow().ty.clone();
    let def = ty.definition().expect("struct S has a definition");
    let def = def.borrow();
    assert_eq!(def.members[0].offset, 0);
    assert_eq!(def.members[1].offset, 4);
    assert_eq!(def.members[2].offset, 8);
    assert_eq!(compute_type_size(&ty), 12);
    assert_eq!(type_alignment(&ty), 4);
}

/// S2: `struct B { unsigned x:3; unsigned y:5; unsigned z:8; };` packs into
/// one 2-byte storage slot: x at bit 0, y at bit 3, z at bit 8; size 2.
#[test]
fn s2_bitfield_packing() {
    let result = compile("struct B { unsigned x:3; unsigned y:5; unsigned z:8; } b;");
    assert!(!result.ctx.arenas.diagnostics.has_error());
    let global = result.unit.globals.iter().find(|g| g.borrow().name.as_str() == "b").unwrap();
    let ty = global.borrow().ty.clone();
    let def = ty.definition().expect("struct B has a definition");
    let def = def.borrow();
    assert_eq!(def.members.len(), 3);
    assert!(def.members.iter().all(|m| m.offset == 0));
    let bit_layout: Vec<(u32, u32)> = def
        .members
        .iter()
        .map(|m| match m.ty.kind() {
            TypeKind::Bitfield(_, bit_offset, width) => (*bit_offset, *width),
            _ => panic!("expected bit-field member"),
        })
        .collect();
    assert_eq!(bit_layout, vec![(0, 3), (3, 5), (8, 8)]);
    assert_eq!(compute_type_size(&ty), 2);
}

/// S3: `1 + 2 * 3` folds to integer constant `7` of type `s4` - driven
/// through a real global initializer this time rather than a hand-built
/// expression tree.
#[test]
fn s3_constant_folding_through_a_real_initializer() {
    let result = compile("int y = 1 + 2 * 3;");
    assert!(!result.ctx.arenas.diagnostics.has_error());
    let global = result.unit.globals.iter().find(|g| g.borrow().name.as_str() == "y").unwrap();
    let init = global.borrow().initializer.clone().expect("y has an initializer");
    match init {
        AstInitializer::Expression { expression, .. } => {
            let folded = cfront::constexpr::eval(&expression).expect("constant-folds");
            assert_eq!(folded.as_int(), Some(7));
        }
        AstInitializer::List(_) => panic!("expected a scalar initializer"),
    }
}

/// S4: `int a[5] = { [4]=40, [1]=10 };` places two leaves at the offsets
/// of elements 4 and 1 (16 and 4 respectively); untouched elements are not
/// materialized as leaves at all (implicitly zero), matching this crate's
/// "only explicitly written slots become `AstInitializer::Expression`
/// leaves" representation.
#[test]
fn s4_designated_initializer() {
    let result = compile("int a[5] = { [4]=40, [1]=10 };");
    assert!(!result.ctx.arenas.diagnostics.has_error());
    let global = result.unit.globals.iter().find(|g| g.borrow().name.as_str() == "a").unwrap();
    let init = global.borrow().initializer.clone().expect("a has an initializer");
    let AstInitializer::List(children) = init else { panic!("expected a list initializer") };
    assert_eq!(children.len(), 2);
    let mut offsets_and_values: Vec<(i64, i64)> = children
        .iter()
        .map(|c| match c {
            AstInitializer::Expression { offset, expression, .. } => {
                let ExpressionKind::IntConst(v) = expression.kind else { panic!("expected int literal") };
                (*offset, v)
            }
            AstInitializer::List(_) => panic!("expected scalar leaves"),
        })
        .collect();
    offsets_and_values.sort();
    assert_eq!(offsets_and_values, vec![(4, 10), (16, 40)]);
}

/// S5: `if (x) { a; } else { b; } c;` -> four blocks entry/then/else/merge;
/// `strict_dom(merge) = entry`; `DF(then) = DF(else) = {merge}`.
#[test]
fn s5_if_else_cfg() {
    let result = compile(
        "int a; int b; int c; \
         void f(int x) { if (x) { a = 1; } else { b = 1; } c = 1; }",
    );
    assert!(!result.ctx.arenas.diagnostics.has_error());
    let func = result.functions.first().expect("f lowers to one IR function");
    // entry/then/else/merge plus the builder's synthesized single exit block
    // that the fall-off-the-end-of-merge path branches to.
    assert_eq!(func.blocks.len(), 5);

    let entry = func.entry;
    assert_eq!(func.block(entry).dominators.sdom, Some(entry));

    // `then` and `else` are entry's two successors; both branch to the
    // same merge block, which is where `c = 1;` and the implicit return
    // live.
    let then_id = func.block(entry).successors[0];
    let else_id = func.block(entry).successors[1];
    let then_block = func.block(then_id);
    let else_block = func.block(else_id);
    assert_eq!(then_block.successors.len(), 1);
    assert_eq!(else_block.successors.len(), 1);
    let merge_id = then_block.successors[0];
    assert_eq!(else_block.successors[0], merge_id);

    assert_eq!(func.block(then_id).dominators.sdom, Some(entry));
    assert_eq!(func.block(else_id).dominators.sdom, Some(entry));
    assert_eq!(func.block(merge_id).dominators.sdom, Some(entry));

    assert_eq!(func.block(then_id).dominators.frontier, vec![merge_id]);
    assert_eq!(func.block(else_id).dominators.frontier, vec![merge_id]);

    // Property 5: every successor edge has a matching predecessor edge.
    for block in &func.blocks {
        for &succ in &block.successors {
            assert!(func.block(succ).predecessors.contains(&block.id));
        }
    }
}

/// S6: `typedef int T; T x; { int T; T=1; }` - the outer `T x;` parses as
/// a declaration of `x: int`; the inner block's `int T;` shadows the
/// typedef with an ordinary value binding that `T=1;` can then assign to.
#[test]
fn s6_typedef_sensitive_shadowing() {
    let result = compile("typedef int T; T x; void f(void) { int T; T = 1; }");
    assert!(!result.ctx.arenas.diagnostics.has_error());

    let outer_x = result.unit.globals.iter().find(|g| g.borrow().name.as_str() == "x").unwrap();
    assert!(outer_x.borrow().ty.is_integer());

    let func = &result.unit.functions[0];
    let body = func.borrow().body.clone().expect("f has a body");
    let StatementKind::Block(stmts) = &body.kind else { panic!("expected a block body") };

    // First statement is `int T;` (a `Declaration`), second is `T = 1;`
    // (an `Expression` wrapping an `Assign`), and it must type-check
    // without any diagnostic - only possible if `T` resolved to the new
    // local `int`, not the outer typedef.
    let StatementKind::Declaration(decls) = &stmts[0].kind else { panic!("expected a declaration statement") };
    assert_eq!(decls[0].borrow().name.as_str(), "T");
    assert!(decls[0].borrow().ty.is_integer());

    let StatementKind::Expression(assign_expr) = &stmts[1].kind else { panic!("expected an expression statement") };
    assert!(!assign_expr.is_error());
}

/// §8 boundary behavior: a zero-width bit-field at the end of a chain
/// closes the chain without becoming a member of the struct.
#[test]
fn zero_width_bitfield_does_not_become_a_member() {
    let result = compile("struct Z { unsigned x:3; unsigned :0; unsigned y:3; } z;");
    assert!(!result.ctx.arenas.diagnostics.has_error());
    let global = result.unit.globals.iter().find(|g| g.borrow().name.as_str() == "z").unwrap();
    let def = global.borrow().ty.definition().unwrap();
    assert_eq!(def.borrow().members.len(), 2);
}

/// §8 boundary behavior: an incomplete array initialized with N elements
/// resolves its declared size to N.
#[test]
fn incomplete_array_resolves_size_from_initializer() {
    let result = compile("int a[] = { 1, 2, 3 };");
    assert!(!result.ctx.arenas.diagnostics.has_error());
    let global = result.unit.globals.iter().find(|g| g.borrow().name.as_str() == "a").unwrap();
    match global.borrow().ty.kind() {
        TypeKind::Array(_, size) => assert_eq!(*size, 3),
        other => panic!("expected a completed array type, got {other:?}"),
    }
}

/// §8 boundary behavior: a non-constant initializer at static (file)
/// scope is diagnosed rather than silently accepted.
#[test]
fn non_constant_static_initializer_is_diagnosed() {
    let result = compile("int g; int h = g;");
    assert!(result.ctx.arenas.diagnostics.has_error());
}

/// §4.9 "Function": `__builtin_va_arg`'s first argument must be `va_list`;
/// passing a plain `int` is diagnosed.
#[test]
fn va_arg_on_non_va_list_is_diagnosed() {
    let result = compile("void f(int x) { int y = __builtin_va_arg(x, int); }");
    assert!(result.ctx.arenas.diagnostics.has_error());
}

/// `__builtin_va_arg` on a real `va_list` parameter type-checks cleanly and
/// takes on the requested type.
#[test]
fn va_arg_on_va_list_type_checks() {
    let result = compile("void f(va_list ap) { int y = __builtin_va_arg(ap, int); }");
    assert!(!result.ctx.arenas.diagnostics.has_error());
}

/// §4.6 "Switch verification": a duplicate case value is diagnosed.
#[test]
fn duplicate_case_value_is_diagnosed() {
    let result = compile("void f(int x) { switch (x) { case 1: break; case 1: break; } }");
    assert!(result.ctx.arenas.diagnostics.has_error());
}

/// §4.6 "Goto/label verification": a `goto` to a label never defined in
/// the function is diagnosed once the function body finishes parsing.
#[test]
fn undeclared_label_is_diagnosed() {
    let result = compile("void f(void) { goto nowhere; }");
    assert!(result.ctx.arenas.diagnostics.has_error());
}

/// Parsing never aborts outright on error - a well-formed AST shell (here,
/// still one function with a body) is always produced, per §4.5 "Failure
/// semantics".
#[test]
fn parser_recovers_and_still_produces_an_ast_shell() {
    let result = compile("void f(void) { 1 + ; }");
    assert!(result.ctx.arenas.diagnostics.has_error());
    assert_eq!(result.unit.functions.len(), 1);
}

/// §7 "suppresses IR construction if any error was recorded": no IR
/// functions are produced when the translation unit contains an error.
#[test]
fn ir_is_suppressed_after_a_parse_error() {
    let result = compile("void f(void) { 1 + ; }");
    assert!(result.ctx.arenas.diagnostics.has_error());
    assert!(result.functions.is_empty());
}

/// Anonymous `ParsedInitializerItem`s can't leak a designator onto the
/// wrong aggregate kind; `.field` on an array reports
/// `field_designator_on_non_struct` rather than panicking.
#[test]
fn field_designator_on_array_reports_diagnostic() {
    let result = compile("int a[2] = { .field = 1 };");
    assert!(result.ctx.arenas.diagnostics.has_error());
}

#[test]
fn unused_import_guard() {
    // Keep `ParsedInitializerItem` referenced so a future refactor that
    // removes the re-export doesn't silently go unnoticed by this file.
    let _ = std::mem::size_of::<ParsedInitializerItem>();
}
