//! AST textual dump (§6 "AST textual dump").
//!
//! Grounded verbatim on `examples/original_source/src/treeDump.c`:
//! `dumpAstExpressionImpl`'s operator-priority parenthesization
//! (`wrapIfNeeded`/`opPriority`), `dumpAstStatementImpl`'s uppercase-keyword
//! rendering, `dumpAstInitializerImpl`'s `INIT_BEGIN`/`INIT_END` framing,
//! `dumpAstValueDeclarationImpl`/`dumpAstFuntionDeclarationImpl`'s
//! storage-prefix (`S`/`E`/`R`) and parameter rendering, and
//! `dumpTypeDefinitionImpl`/`dumpAstFile`'s file-level shape. `opPriority`
//! itself wasn't part of the retrieved original sources (defined in a file
//! outside the filtered set), so the table below is reconstructed from the
//! parser's own precedence cascade (`parser/expr.rs`'s
//! `parse_comma -> parse_assignment -> parse_conditional -> ... ->
//! parse_primary`) rather than copied - see DESIGN.md.

use crate::ast::{
    AssignOp, AstExpression, AstFunctionDeclaration, AstInitializer, AstStatement,
    AstValueDeclaration, BinaryOp, DeclaratorKind, ExpressionKind, JumpKind, LabelKind,
    StatementKind, StorageFlags, TranslationUnit, UnaryOp,
};
use crate::types::{AggregateKind, TypeDefRef, TypeDefinition, TypeId, TypeKind};
use std::fmt::Write;

fn push_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push(' ');
    }
}

/// `esaceString`: backslash-escape the control characters the original
/// singles out, leaving everything else (including non-ASCII) untouched.
fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            '\x0b' => out.push_str("\\v"),
            '?' => out.push_str("\\?"),
            _ => out.push(c),
        }
    }
    out
}

/// `opPriority`: higher binds tighter. Reconstructed from the parser's
/// cascade, one level per cascade step; operators that share a cascade step
/// (e.g. `+`/`-`) share a level, matching the original's "compare the two
/// ops' own priorities" behavior rather than a coarser per-category one.
fn op_priority(kind: &ExpressionKind) -> u8 {
    match kind {
        ExpressionKind::Binary(BinaryOp::Comma, ..) => 0,
        ExpressionKind::Assign(..) => 1,
        ExpressionKind::Ternary(..) => 2,
        ExpressionKind::Binary(BinaryOp::LogOr, ..) => 3,
        ExpressionKind::Binary(BinaryOp::LogAnd, ..) => 4,
        ExpressionKind::Binary(BinaryOp::BitOr, ..) => 5,
        ExpressionKind::Binary(BinaryOp::BitXor, ..) => 6,
        ExpressionKind::Binary(BinaryOp::BitAnd, ..) => 7,
        ExpressionKind::Binary(BinaryOp::Eq, ..) | ExpressionKind::Binary(BinaryOp::Ne, ..) => 8,
        ExpressionKind::Binary(BinaryOp::Lt, ..)
        | ExpressionKind::Binary(BinaryOp::Le, ..)
        | ExpressionKind::Binary(BinaryOp::Gt, ..)
        | ExpressionKind::Binary(BinaryOp::Ge, ..) => 9,
        ExpressionKind::Binary(BinaryOp::Shl, ..) | ExpressionKind::Binary(BinaryOp::Shr, ..) => 10,
        ExpressionKind::Binary(BinaryOp::Add, ..) | ExpressionKind::Binary(BinaryOp::Sub, ..) => 11,
        ExpressionKind::Binary(BinaryOp::Mul, ..)
        | ExpressionKind::Binary(BinaryOp::Div, ..)
        | ExpressionKind::Binary(BinaryOp::Mod, ..) => 12,
        ExpressionKind::Cast(_) | ExpressionKind::BitExtend(_) => 13,
        ExpressionKind::Unary(UnaryOp::PostInc | UnaryOp::PostDec, _) => 15,
        ExpressionKind::Unary(..) => 14,
        ExpressionKind::Call(..) | ExpressionKind::FieldAccess(..) | ExpressionKind::ArrayAccess(..) => 15,
        // Primary/self-delimiting forms never need parens as someone else's child.
        _ => 16,
    }
}

/// `wrapIfNeeded`.
fn wrap_if_needed(out: &mut String, top_priority: u8, arg: &AstExpression, forced: bool) {
    let arg_priority = op_priority(&arg.kind);
    let need_parens = forced || top_priority > arg_priority;
    if need_parens {
        out.push('(');
    }
    dump_expr(out, 0, arg);
    if need_parens {
        out.push(')');
    }
}

fn binary_mnemonic(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => " +",
        BinaryOp::Sub => " -",
        BinaryOp::Mul => " *",
        BinaryOp::Div => " /",
        BinaryOp::Mod => " %",
        BinaryOp::Shl => " <<",
        BinaryOp::Shr => " >>",
        BinaryOp::BitAnd => " &",
        BinaryOp::BitOr => " |",
        BinaryOp::BitXor => " ^",
        BinaryOp::LogAnd => " &&",
        BinaryOp::LogOr => " ||",
        BinaryOp::Eq => " ==",
        BinaryOp::Ne => " !=",
        BinaryOp::Lt => " <",
        BinaryOp::Le => " <=",
        BinaryOp::Gt => " >",
        BinaryOp::Ge => " >=",
        BinaryOp::Comma => ",",
    }
}

fn assign_mnemonic(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => " =",
        AssignOp::Compound(BinaryOp::Add) => " +=",
        AssignOp::Compound(BinaryOp::Sub) => " -=",
        AssignOp::Compound(BinaryOp::Mul) => " *=",
        AssignOp::Compound(BinaryOp::Div) => " /=",
        AssignOp::Compound(BinaryOp::Mod) => " %=",
        AssignOp::Compound(BinaryOp::Shl) => " <<=",
        AssignOp::Compound(BinaryOp::Shr) => " >>=",
        AssignOp::Compound(BinaryOp::BitAnd) => " &=",
        AssignOp::Compound(BinaryOp::BitOr) => " |=",
        AssignOp::Compound(BinaryOp::BitXor) => " ^=",
        AssignOp::Compound(_) => " =",
    }
}

/// The widened bit-field's `(is_unsigned, width)`, read off the inner
/// expression's (still-narrow) bit-field type - `BitExtend` itself carries
/// no separate width/signedness field, so there is nowhere else to read it
/// from (§3 "Implicit sign/zero-extension").
fn bitextend_info(inner: &AstExpression) -> (bool, u32) {
    match inner.ty.kind() {
        TypeKind::Bitfield(storage, _, width) => {
            let unsigned = match storage.kind() {
                TypeKind::Value(d) => d.type_id.is_unsigned_integer() || d.type_id == TypeId::Bool,
                _ => false,
            };
            (unsigned, *width)
        }
        _ => (false, 0),
    }
}

/// `dumpAstExpressionImpl`.
fn dump_expr(out: &mut String, indent: usize, expr: &AstExpression) {
    push_indent(out, indent);
    let top_priority = op_priority(&expr.kind);
    match &expr.kind {
        ExpressionKind::IntConst(i) => write!(out, "{i}").unwrap(),
        ExpressionKind::FloatConst(f) => write!(out, "{f:.6}").unwrap(),
        ExpressionKind::StringConst(s) => write!(out, "\"{}\"", escape_string(s)).unwrap(),
        ExpressionKind::NameRef(sym, _) => write!(out, "{sym}").unwrap(),
        ExpressionKind::Error => out.push_str("ERROR EXPR"),
        ExpressionKind::LabelRef(sym) => write!(out, "&&{sym}").unwrap(),
        ExpressionKind::Paren(inner) => {
            out.push('(');
            dump_expr(out, 0, inner);
            out.push(')');
        }
        ExpressionKind::VaArg(va_list) => {
            out.push_str("__builtin_va_arg(");
            dump_expr(out, 0, va_list);
            out.push_str(", ");
            write!(out, "{}", expr.ty).unwrap();
            out.push(')');
        }
        ExpressionKind::CompoundLiteral(init) => {
            write!(out, "({})\n", expr.ty).unwrap();
            dump_initializer(out, indent + 2, init, true);
        }
        ExpressionKind::BlockExpr(stmts, tail) => {
            out.push('(');
            let mut first = true;
            for s in stmts {
                if !first {
                    out.push('\n');
                }
                first = false;
                dump_stmt(out, 0, s);
            }
            if let Some(t) = tail {
                if !first {
                    out.push('\n');
                }
                dump_expr(out, 0, t);
            }
            out.push(')');
        }
        ExpressionKind::Call(callee, args) => {
            wrap_if_needed(out, top_priority, callee, false);
            out.push('(');
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                dump_expr(out, 0, a);
            }
            out.push(')');
        }
        ExpressionKind::BitExtend(inner) => {
            out.push('(');
            let (unsigned, width) = bitextend_info(inner);
            write!(out, "{} <-- {} # ", i32::from(!unsigned), width).unwrap();
            wrap_if_needed(out, top_priority, inner, false);
            out.push(')');
        }
        ExpressionKind::Cast(inner) => {
            write!(out, "({})", expr.ty).unwrap();
            wrap_if_needed(out, top_priority, inner, false);
        }
        ExpressionKind::Ternary(cond, if_true, if_false) => {
            dump_expr(out, 0, cond);
            out.push_str(" ? ");
            dump_expr(out, 0, if_true);
            out.push_str(" : ");
            dump_expr(out, 0, if_false);
        }
        ExpressionKind::FieldAccess(receiver, member, is_arrow) => {
            wrap_if_needed(out, top_priority, receiver, false);
            out.push_str(if *is_arrow { "->" } else { "." });
            write!(out, "{member}").unwrap();
        }
        ExpressionKind::Unary(op, inner) => match op {
            UnaryOp::PreInc => {
                out.push_str("++");
                wrap_if_needed(out, top_priority, inner, false);
            }
            UnaryOp::PreDec => {
                out.push_str("--");
                wrap_if_needed(out, top_priority, inner, false);
            }
            UnaryOp::Deref => {
                out.push('*');
                wrap_if_needed(out, top_priority, inner, false);
            }
            UnaryOp::AddrOf => {
                out.push('&');
                wrap_if_needed(out, top_priority, inner, false);
            }
            UnaryOp::Plus => {
                out.push('+');
                wrap_if_needed(out, top_priority, inner, false);
            }
            UnaryOp::Minus => {
                out.push('-');
                wrap_if_needed(out, top_priority, inner, false);
            }
            UnaryOp::BitNot => {
                out.push('~');
                wrap_if_needed(out, top_priority, inner, false);
            }
            UnaryOp::LogNot => {
                out.push('!');
                wrap_if_needed(out, top_priority, inner, false);
            }
            UnaryOp::PostInc => {
                wrap_if_needed(out, top_priority, inner, false);
                out.push_str("++");
            }
            UnaryOp::PostDec => {
                wrap_if_needed(out, top_priority, inner, false);
                out.push_str("--");
            }
        },
        ExpressionKind::Binary(op, lhs, rhs) => {
            wrap_if_needed(out, top_priority, lhs, false);
            out.push_str(binary_mnemonic(*op));
            out.push(' ');
            // "x - (a + b)" and "x - (a - b)" must enparen the rhs, else
            // the dump would round-trip to a different expression.
            let forced = *op == BinaryOp::Sub
                && matches!(rhs.kind, ExpressionKind::Binary(BinaryOp::Add, ..) | ExpressionKind::Binary(BinaryOp::Sub, ..));
            wrap_if_needed(out, top_priority, rhs, forced);
        }
        ExpressionKind::ArrayAccess(base, index) => {
            wrap_if_needed(out, top_priority, base, false);
            out.push('[');
            dump_expr(out, 0, index);
            out.push(']');
        }
        ExpressionKind::Assign(op, lhs, rhs) => {
            wrap_if_needed(out, top_priority, lhs, false);
            out.push_str(assign_mnemonic(*op));
            out.push(' ');
            wrap_if_needed(out, top_priority, rhs, false);
        }
    }
}

/// `dumpAstInitializerImpl`.
fn dump_initializer(out: &mut String, indent: usize, init: &AstInitializer, compound: bool) {
    push_indent(out, indent);
    match init {
        AstInitializer::Expression { slot_type, offset, expression, .. } => {
            if compound {
                write!(out, "{slot_type} #{offset} <--- ").unwrap();
            }
            dump_expr(out, 0, expression);
        }
        AstInitializer::List(items) => {
            out.push_str("INIT_BEGIN\n");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                dump_initializer(out, indent + 2, item, true);
            }
            out.push('\n');
            push_indent(out, indent);
            out.push_str("INIT_END");
        }
    }
}

/// `dumpAstValueDeclarationImpl`.
fn dump_value_decl(out: &mut String, indent: usize, decl: &AstValueDeclaration) {
    push_indent(out, indent);
    let mut has_bits = false;
    if decl.storage.contains(StorageFlags::STATIC) {
        out.push('S');
        has_bits = true;
    }
    if decl.storage.contains(StorageFlags::EXTERN) {
        out.push('E');
        has_bits = true;
    }
    if decl.storage.contains(StorageFlags::REGISTER) {
        out.push('R');
        has_bits = true;
    }
    if has_bits {
        out.push(' ');
    }
    if decl.kind == DeclaratorKind::Parameter {
        write!(out, "#{}: ", decl.index).unwrap();
    }
    write!(out, "{}", decl.ty).unwrap();
    let name = decl.name.as_str();
    if !name.is_empty() {
        write!(out, " {name}").unwrap();
    }
    if decl.kind == DeclaratorKind::Variable {
        if let Some(init) = &decl.initializer {
            out.push_str(" = \\\n");
            dump_initializer(out, indent + 2, init, false);
        }
    }
}

/// `dumpAstFuntionDeclarationImpl`.
fn dump_function_decl(out: &mut String, indent: usize, decl: &AstFunctionDeclaration) {
    push_indent(out, indent);
    let mut has_bits = false;
    if decl.storage.contains(StorageFlags::STATIC) {
        out.push('S');
        has_bits = true;
    }
    if decl.storage.contains(StorageFlags::EXTERN) {
        out.push('E');
        has_bits = true;
    }
    if has_bits {
        out.push(' ');
    }
    out.push_str("FUN ");
    let ret_ty = match decl.ty.kind() {
        TypeKind::Function(ret, ..) => ret.clone(),
        _ => decl.ty.clone(),
    };
    write!(out, "{ret_ty} {} ", decl.name).unwrap();
    for param in &decl.params {
        out.push('\n');
        dump_value_decl(out, indent + 2, &param.borrow());
    }
    if decl.is_variadic {
        out.push('\n');
        push_indent(out, indent + 2);
        out.push_str("## ...");
    }
}

/// `dumpAstFunctionDefinitionImpl`.
fn dump_function_def(out: &mut String, indent: usize, decl: &AstFunctionDeclaration) {
    dump_function_decl(out, indent, decl);
    out.push('\n');
    push_indent(out, indent);
    out.push_str("BEGIN\n");
    if let Some(body) = &decl.body {
        dump_stmt(out, indent + 2, body);
    }
    out.push('\n');
    push_indent(out, indent);
    out.push_str("END");
}

/// `dumpAstStatementImpl`.
fn dump_stmt(out: &mut String, indent: usize, stmt: &AstStatement) {
    match &stmt.kind {
        StatementKind::Block(stmts) => {
            let mut first = true;
            for s in stmts {
                if !first {
                    out.push('\n');
                }
                first = false;
                dump_stmt(out, indent, s);
            }
            push_indent(out, indent);
        }
        StatementKind::Expression(e) => {
            push_indent(out, indent);
            dump_expr(out, 0, e);
        }
        StatementKind::Labeled { label, inner } => {
            push_indent(out, indent);
            match label {
                LabelKind::Named(sym) => write!(out, "{sym}: ").unwrap(),
                LabelKind::Default => out.push_str("DEFAULT: "),
                LabelKind::Case(v) => write!(out, "CASE {v}: ").unwrap(),
            }
            dump_stmt(out, 0, inner);
        }
        StatementKind::Declaration(decls) => {
            let mut first = true;
            for d in decls {
                if !first {
                    out.push('\n');
                }
                first = false;
                dump_value_decl(out, indent, &d.borrow());
            }
        }
        StatementKind::Empty => {}
        StatementKind::If { cond, then_branch, else_branch } => {
            push_indent(out, indent);
            out.push_str("IF (");
            dump_expr(out, 0, cond);
            out.push_str(")\n");
            push_indent(out, indent);
            out.push_str("THEN\n");
            dump_stmt(out, indent + 2, then_branch);
            out.push('\n');
            if let Some(else_branch) = else_branch {
                push_indent(out, indent);
                out.push_str("ELSE\n");
                dump_stmt(out, indent + 2, else_branch);
                out.push('\n');
            }
            push_indent(out, indent);
            out.push_str("END_IF");
        }
        StatementKind::Switch { cond, body } => {
            push_indent(out, indent);
            out.push_str("SWITCH (");
            dump_expr(out, 0, cond);
            out.push_str(")\n");
            dump_stmt(out, indent + 2, body);
            out.push('\n');
            push_indent(out, indent);
            out.push_str("END_SWITCH");
        }
        StatementKind::While { cond, body } => {
            push_indent(out, indent);
            out.push_str("WHILE (");
            dump_expr(out, 0, cond);
            out.push_str(")\n");
            dump_stmt(out, indent + 2, body);
            out.push('\n');
            push_indent(out, indent);
            out.push_str("END_WHILE");
        }
        StatementKind::DoWhile { body, cond } => {
            push_indent(out, indent);
            out.push_str("DO\n");
            dump_stmt(out, indent + 2, body);
            out.push('\n');
            push_indent(out, indent);
            out.push_str("WHILE (");
            dump_expr(out, 0, cond);
            out.push(')');
        }
        StatementKind::For { init, cond, step, body } => {
            push_indent(out, indent);
            out.push_str("FOR (");
            if let Some(init) = init {
                dump_stmt(out, 0, init);
            }
            out.push_str("; ");
            if let Some(cond) = cond {
                dump_expr(out, 0, cond);
                out.push_str("; ");
            }
            if let Some(step) = step {
                dump_expr(out, 0, step);
            }
            out.push_str(")\n");
            dump_stmt(out, indent + 2, body);
            out.push('\n');
            push_indent(out, indent);
            out.push_str("END_FOR");
        }
        StatementKind::Jump(jump) => {
            push_indent(out, indent);
            match jump {
                JumpKind::GotoLabel(sym) => write!(out, "GOTO {sym}").unwrap(),
                JumpKind::GotoExpr(e) => {
                    out.push_str("GOTO *");
                    dump_expr(out, 0, e);
                }
                JumpKind::Continue => out.push_str("CONTINUE"),
                JumpKind::Break => out.push_str("BREAK"),
                JumpKind::Return(value) => {
                    out.push_str("RETURN");
                    if let Some(value) = value {
                        out.push(' ');
                        dump_expr(out, 0, value);
                    }
                }
            }
        }
        StatementKind::Error => {
            push_indent(out, indent);
            out.push_str("ERROR_STATEMENT");
        }
    }
}

/// `dumpTypeDefinitionImpl`. Only struct/union/enum tag definitions are
/// dumped here - unlike the original's linked list, this crate's typedef
/// aliases live purely in the scope table (`symtab::SymbolPayload::Typedef`)
/// with no ordered registry of their own, so there is no `TYPEDF` line to
/// emit (see DESIGN.md).
fn dump_type_definition(out: &mut String, indent: usize, def: &TypeDefinition) {
    push_indent(out, indent);
    let is_enum = def.kind == AggregateKind::Enum;
    let prefix = match def.kind {
        AggregateKind::Struct => "STRUCT",
        AggregateKind::Union => "UNION",
        AggregateKind::Enum => "ENUM",
    };
    out.push_str(prefix);
    if !def.name.is_empty() {
        write!(out, " {}", def.name).unwrap();
    }
    if is_enum {
        if !def.enumerators.is_empty() {
            out.push('\n');
        }
        for e in &def.enumerators {
            push_indent(out, indent + 2);
            writeln!(out, "{} = {}", e.name, e.value).unwrap();
        }
        if !def.enumerators.is_empty() {
            push_indent(out, indent);
            out.push_str("ENUM_END");
        }
    } else {
        if !def.members.is_empty() {
            out.push('\n');
        }
        for m in &def.members {
            push_indent(out, indent + 2);
            write!(out, "{}", m.ty).unwrap();
            writeln!(out, " {} #{}", m.name, m.offset).unwrap();
        }
        if !def.members.is_empty() {
            push_indent(out, indent);
            write!(out, "{prefix}_END").unwrap();
        }
    }
}

/// `dumpAstFile`: type definitions, then every global declaration and
/// function definition, each pair separated by `"\n----\n"`.
///
/// The original interleaves declarations and function definitions in the
/// single order they appeared in the source; this crate's `TranslationUnit`
/// splits them into two lists (`globals`, `functions`), so the dump lists
/// all globals before all functions rather than preserving source order
/// across the two (see DESIGN.md).
#[must_use]
pub fn dump_translation_unit(unit: &TranslationUnit, type_defs: &[TypeDefRef], file_name: &str) -> String {
    let mut out = String::new();
    writeln!(out, "FILE {file_name}").unwrap();
    for def in type_defs {
        dump_type_definition(&mut out, 2, &def.borrow());
        out.push_str("\n----\n");
    }
    let mut first = true;
    for global in &unit.globals {
        if !first {
            out.push_str("\n----\n");
        }
        first = false;
        dump_value_decl(&mut out, 2, &global.borrow());
    }
    for func in &unit.functions {
        if !first {
            out.push_str("\n----\n");
        }
        first = false;
        dump_function_def(&mut out, 2, &func.borrow());
    }
    out
}

#[must_use]
pub fn dump_expression(expr: &AstExpression) -> String {
    let mut out = String::new();
    dump_expr(&mut out, 0, expr);
    out
}

#[must_use]
pub fn dump_statement(stmt: &AstStatement) -> String {
    let mut out = String::new();
    dump_stmt(&mut out, 0, stmt);
    out
}

#[must_use]
pub fn dump_value_declaration(decl: &AstValueDeclaration) -> String {
    let mut out = String::new();
    dump_value_decl(&mut out, 0, decl);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ResolvedName;
    use crate::intern::Interner;
    use crate::source::Coordinates;
    use crate::symtab::VarId;
    use crate::types::{Qualifiers, TypeFactory};
    use std::rc::Rc;

    fn s4() -> crate::types::TypeRef {
        TypeFactory::primitive(TypeId::S4, Qualifiers::empty())
    }

    fn int_const(v: i64) -> Rc<AstExpression> {
        Rc::new(AstExpression { coords: Coordinates::synthetic(), kind: ExpressionKind::IntConst(v), ty: s4() })
    }

    fn name_ref(interner: &mut Interner, name: &str) -> Rc<AstExpression> {
        Rc::new(AstExpression {
            coords: Coordinates::synthetic(),
            kind: ExpressionKind::NameRef(interner.intern(name), ResolvedName::Unresolved),
            ty: s4(),
        })
    }

    #[test]
    fn additive_chain_has_no_parens() {
        let mut interner = Interner::new();
        let x = name_ref(&mut interner, "x");
        let a = Rc::new(AstExpression {
            coords: Coordinates::synthetic(),
            kind: ExpressionKind::Binary(BinaryOp::Add, x, int_const(1)),
            ty: s4(),
        });
        assert_eq!(dump_expression(&a), "x + 1");
    }

    #[test]
    fn subtraction_of_addition_is_forced_parenthesized() {
        let mut interner = Interner::new();
        let a = name_ref(&mut interner, "a");
        let b = name_ref(&mut interner, "b");
        let x = name_ref(&mut interner, "x");
        let inner = Rc::new(AstExpression {
            coords: Coordinates::synthetic(),
            kind: ExpressionKind::Binary(BinaryOp::Add, a, b),
            ty: s4(),
        });
        let outer = Rc::new(AstExpression {
            coords: Coordinates::synthetic(),
            kind: ExpressionKind::Binary(BinaryOp::Sub, x, inner),
            ty: s4(),
        });
        assert_eq!(dump_expression(&outer), "x - (a + b)");
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let mut interner = Interner::new();
        let a = name_ref(&mut interner, "a");
        let b = name_ref(&mut interner, "b");
        let c = name_ref(&mut interner, "c");
        let mul = Rc::new(AstExpression {
            coords: Coordinates::synthetic(),
            kind: ExpressionKind::Binary(BinaryOp::Mul, b, c),
            ty: s4(),
        });
        let add = Rc::new(AstExpression {
            coords: Coordinates::synthetic(),
            kind: ExpressionKind::Binary(BinaryOp::Add, a, mul),
            ty: s4(),
        });
        assert_eq!(dump_expression(&add), "a + b * c");
    }

    #[test]
    fn if_else_statement_uses_uppercase_keywords() {
        let mut interner = Interner::new();
        let cond = name_ref(&mut interner, "cond");
        let then_stmt = Rc::new(AstStatement {
            coords: Coordinates::synthetic(),
            kind: StatementKind::Expression(int_const(1)),
        });
        let else_stmt = Rc::new(AstStatement {
            coords: Coordinates::synthetic(),
            kind: StatementKind::Expression(int_const(2)),
        });
        let if_stmt = AstStatement {
            coords: Coordinates::synthetic(),
            kind: StatementKind::If { cond, then_branch: then_stmt, else_branch: Some(else_stmt) },
        };
        let text = dump_statement(&if_stmt);
        assert!(text.starts_with("IF (cond)\nTHEN\n"));
        assert!(text.contains("ELSE\n"));
        assert!(text.ends_with("END_IF"));
    }

    #[test]
    fn value_declaration_renders_storage_prefix_and_initializer() {
        let mut interner = Interner::new();
        let mut decl = AstValueDeclaration::dummy_for_tests();
        decl.storage = StorageFlags::STATIC;
        decl.name = interner.intern("counter");
        decl.initializer = Some(AstInitializer::Expression {
            slot_type: s4(),
            offset: 0,
            expression: int_const(0),
            state: crate::ast::InitState::Finalized,
        });
        let text = dump_value_declaration(&decl);
        assert!(text.starts_with("S s4 counter = \\\n"));
        assert!(text.contains("0"));
        let _ = VarId(0);
    }

    #[test]
    fn initializer_list_wraps_in_init_begin_end() {
        let list = AstInitializer::List(vec![
            AstInitializer::Expression { slot_type: s4(), offset: 0, expression: int_const(1), state: crate::ast::InitState::Finalized },
            AstInitializer::Expression { slot_type: s4(), offset: 4, expression: int_const(2), state: crate::ast::InitState::Finalized },
        ]);
        let mut out = String::new();
        dump_initializer(&mut out, 0, &list, false);
        assert!(out.starts_with("INIT_BEGIN\n"));
        assert!(out.ends_with("INIT_END"));
        assert!(out.contains("#0 <--- 1"));
        assert!(out.contains("#4 <--- 2"));
    }
}
