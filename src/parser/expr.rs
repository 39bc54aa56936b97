//! Expression parsing: the precedence cascade of §4.5 - primary → postfix
//! → unary → cast → multiplicative → additive → shift → relational →
//! equality → bitwise-and → bitwise-xor → bitwise-or → logical-and →
//! logical-or → conditional → assignment → comma.

use super::ParserContext;
use crate::ast::{AstExpression, BinaryOp, ExpressionKind, ResolvedName, UnaryOp};
use crate::diag::DiagKind;
use crate::intern::Symbol;
use crate::sema;
use crate::symtab::SymbolPayload;
use crate::token::Code;
use crate::types::{Qualifiers, TypeFactory, TypeId, UNKNOWN_SIZE};
use std::rc::Rc;

type Expr = Rc<AstExpression>;

fn alloc(ctx: &mut ParserContext<'_>, e: AstExpression) -> Expr {
    ctx.arenas.expressions.alloc(e)
}

fn error_expr(ctx: &mut ParserContext<'_>, coords: crate::source::Coordinates) -> Expr {
    alloc(ctx, AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() })
}

pub fn parse_expression(ctx: &mut ParserContext<'_>) -> Expr {
    parse_comma(ctx)
}

/// Parses an expression that must be a constant expression's syntactic
/// shape; constancy itself is checked by the caller via `constexpr::eval`.
pub fn parse_constant_expression(ctx: &mut ParserContext<'_>) -> Expr {
    parse_conditional(ctx)
}

fn parse_comma(ctx: &mut ParserContext<'_>) -> Expr {
    let mut lhs = parse_assignment(ctx);
    while ctx.at(Code::Comma) {
        let coords = ctx.coords_here();
        ctx.advance();
        let rhs = parse_assignment(ctx);
        let node = sema::transform_binary_expression(&mut ctx.arenas.diagnostics, coords, BinaryOp::Comma, lhs, rhs);
        lhs = alloc(ctx, node);
    }
    lhs
}

fn assign_op_for(code: Code) -> Option<Option<BinaryOp>> {
    // `Some(None)` = plain `=`; `Some(Some(op))` = compound assignment.
    match code {
        Code::Assign => Some(None),
        Code::PlusAssign => Some(Some(BinaryOp::Add)),
        Code::MinusAssign => Some(Some(BinaryOp::Sub)),
        Code::StarAssign => Some(Some(BinaryOp::Mul)),
        Code::SlashAssign => Some(Some(BinaryOp::Div)),
        Code::PercentAssign => Some(Some(BinaryOp::Mod)),
        Code::AndAssign => Some(Some(BinaryOp::BitAnd)),
        Code::OrAssign => Some(Some(BinaryOp::BitOr)),
        Code::XorAssign => Some(Some(BinaryOp::BitXor)),
        Code::ShlAssign => Some(Some(BinaryOp::Shl)),
        Code::ShrAssign => Some(Some(BinaryOp::Shr)),
        _ => None,
    }
}

pub(crate) fn parse_assignment(ctx: &mut ParserContext<'_>) -> Expr {
    let lhs = parse_conditional(ctx);
    if let Some(compound) = assign_op_for(ctx.peek_code()) {
        let coords = ctx.coords_here();
        ctx.advance();
        let rhs = parse_assignment(ctx);
        let effective_rhs = match compound {
            None => rhs,
            Some(op) => {
                let node = sema::transform_binary_expression(&mut ctx.arenas.diagnostics, coords, op, lhs.clone(), rhs);
                alloc(ctx, node)
            }
        };
        let node = sema::transform_assign_expression(&mut ctx.arenas.diagnostics, coords, lhs, effective_rhs);
        return alloc(ctx, node);
    }
    lhs
}

fn parse_conditional(ctx: &mut ParserContext<'_>) -> Expr {
    let cond = parse_logical_or(ctx);
    if ctx.eat(Code::Question) {
        let coords = ctx.coords_here();
        let then_expr = parse_expression(ctx);
        ctx.expect(Code::Colon);
        let else_expr = parse_conditional(ctx);
        let node = sema::transform_ternary_expression(&mut ctx.arenas.diagnostics, coords, cond, then_expr, else_expr);
        return alloc(ctx, node);
    }
    cond
}

macro_rules! left_assoc_binary {
    ($name:ident, $next:ident, [$(($code:path, $op:path)),+ $(,)?]) => {
        fn $name(ctx: &mut ParserContext<'_>) -> Expr {
            let mut lhs = $next(ctx);
            loop {
                let op = match ctx.peek_code() {
                    $($code => $op,)+
                    _ => break,
                };
                let coords = ctx.coords_here();
                ctx.advance();
                let rhs = $next(ctx);
                let node = sema::transform_binary_expression(&mut ctx.arenas.diagnostics, coords, op, lhs, rhs);
                lhs = alloc(ctx, node);
            }
            lhs
        }
    };
}

left_assoc_binary!(parse_logical_or, parse_logical_and, [(Code::PipePipe, BinaryOp::LogOr)]);
left_assoc_binary!(parse_logical_and, parse_bitor, [(Code::AmpAmp, BinaryOp::LogAnd)]);
left_assoc_binary!(parse_bitor, parse_bitxor, [(Code::Pipe, BinaryOp::BitOr)]);
left_assoc_binary!(parse_bitxor, parse_bitand, [(Code::Caret, BinaryOp::BitXor)]);
left_assoc_binary!(parse_bitand, parse_equality, [(Code::Amp, BinaryOp::BitAnd)]);
left_assoc_binary!(
    parse_equality,
    parse_relational,
    [(Code::Eq, BinaryOp::Eq), (Code::Ne, BinaryOp::Ne)]
);
left_assoc_binary!(
    parse_relational,
    parse_shift,
    [
        (Code::Lt, BinaryOp::Lt),
        (Code::Le, BinaryOp::Le),
        (Code::Gt, BinaryOp::Gt),
        (Code::Ge, BinaryOp::Ge),
    ]
);
left_assoc_binary!(parse_shift, parse_additive, [(Code::Shl, BinaryOp::Shl), (Code::Shr, BinaryOp::Shr)]);
left_assoc_binary!(
    parse_additive,
    parse_multiplicative,
    [(Code::Plus, BinaryOp::Add), (Code::Minus, BinaryOp::Sub)]
);
left_assoc_binary!(
    parse_multiplicative,
    parse_cast,
    [(Code::Star, BinaryOp::Mul), (Code::Slash, BinaryOp::Div), (Code::Percent, BinaryOp::Mod)]
);

fn parse_cast(ctx: &mut ParserContext<'_>) -> Expr {
    if ctx.at(Code::LParen) && super::decl::looks_like_type_start(ctx, 1) {
        let coords = ctx.coords_here();
        ctx.advance();
        let ty = super::decl::parse_type_name(ctx);
        ctx.expect(Code::RParen);
        let inner = parse_cast(ctx);
        if inner.is_error() {
            return inner;
        }
        let node = AstExpression { coords, kind: ExpressionKind::Cast(inner), ty };
        return alloc(ctx, node);
    }
    parse_unary(ctx)
}

fn parse_unary(ctx: &mut ParserContext<'_>) -> Expr {
    let coords = ctx.coords_here();
    match ctx.peek_code() {
        Code::Plus => {
            ctx.advance();
            parse_cast(ctx)
        }
        Code::Minus => {
            ctx.advance();
            let inner = parse_cast(ctx);
            let ty = inner.ty.clone();
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::Unary(UnaryOp::Minus, inner), ty })
        }
        Code::Tilde => {
            ctx.advance();
            let inner = parse_cast(ctx);
            let ty = inner.ty.clone();
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::Unary(UnaryOp::BitNot, inner), ty })
        }
        Code::Bang => {
            ctx.advance();
            let inner = parse_cast(ctx);
            let ty = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::Unary(UnaryOp::LogNot, inner), ty })
        }
        Code::Amp => {
            ctx.advance();
            let inner = parse_cast(ctx);
            let node = sema::transform_addr_of(&mut ctx.arenas.diagnostics, coords, inner);
            alloc(ctx, node)
        }
        Code::Star => {
            ctx.advance();
            let inner = parse_cast(ctx);
            let node = sema::transform_deref(&mut ctx.arenas.diagnostics, coords, inner);
            alloc(ctx, node)
        }
        Code::PlusPlus => {
            ctx.advance();
            let inner = parse_unary(ctx);
            let ty = inner.ty.clone();
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::Unary(UnaryOp::PreInc, inner), ty })
        }
        Code::MinusMinus => {
            ctx.advance();
            let inner = parse_unary(ctx);
            let ty = inner.ty.clone();
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::Unary(UnaryOp::PreDec, inner), ty })
        }
        Code::KwSizeof => {
            ctx.advance();
            let ty = if ctx.at(Code::LParen) && super::decl::looks_like_type_start(ctx, 1) {
                ctx.advance();
                let ty = super::decl::parse_type_name(ctx);
                ctx.expect(Code::RParen);
                ty
            } else {
                parse_unary(ctx).ty.clone()
            };
            sizeof_constant(ctx, coords, &ty)
        }
        _ => parse_postfix(ctx),
    }
}

/// `sizeof`'s result (§4.6 "VLA size materialization": "sizeof on a VLA
/// expands to the product of its dimension symbols"). A VLA's product is
/// not a compile-time constant; this crate represents it as a `LabelRef`
/// placeholder naming the synthesized size local rather than modeling the
/// full multiplication chain, since the IR builder materializes the real
/// product from the same `VarId` chain at lowering time (see DESIGN.md).
fn sizeof_constant(ctx: &mut ParserContext<'_>, coords: crate::source::Coordinates, ty: &crate::types::TypeRef) -> Expr {
    let size_ty = TypeFactory::primitive(TypeId::U8, Qualifiers::empty());
    if ty.is_void() {
        ctx.arenas.diagnostics.report(DiagKind::SizeOfIncompleteType, coords, vec!["void".into()]);
        return alloc(ctx, AstExpression { coords, kind: ExpressionKind::IntConst(0), ty: size_ty });
    }
    if ty.is_vla() {
        let sym = ctx.arenas.strings.intern("<vla-size>");
        return alloc(ctx, AstExpression { coords, kind: ExpressionKind::LabelRef(sym), ty: size_ty });
    }
    if !ty.is_complete() {
        ctx.arenas.diagnostics.report(DiagKind::SizeOfIncompleteType, coords, vec![ty.to_string().into()]);
        return alloc(ctx, AstExpression { coords, kind: ExpressionKind::IntConst(0), ty: size_ty });
    }
    let size = crate::types::compute_type_size(ty);
    let value = if size == UNKNOWN_SIZE { 0 } else { size };
    alloc(ctx, AstExpression { coords, kind: ExpressionKind::IntConst(value), ty: size_ty })
}

fn parse_postfix(ctx: &mut ParserContext<'_>) -> Expr {
    let mut expr = parse_primary(ctx);
    loop {
        let coords = ctx.coords_here();
        match ctx.peek_code() {
            Code::LBracket => {
                ctx.advance();
                let index = parse_expression(ctx);
                ctx.expect(Code::RBracket);
                let receiver = sema::decay_array_to_pointer(expr);
                let ty = match receiver.ty.inner() {
                    Some(t) if receiver.ty.is_pointer() => t.clone(),
                    _ => {
                        ctx.arenas.diagnostics.report(
                            DiagKind::IncompatibleCast,
                            coords,
                            vec![receiver.ty.to_string().into(), "pointer".into()],
                        );
                        TypeFactory::error()
                    }
                };
                expr = alloc(ctx, AstExpression { coords, kind: ExpressionKind::ArrayAccess(receiver, index), ty });
            }
            Code::LParen => {
                ctx.advance();
                let mut args = Vec::new();
                if !ctx.at(Code::RParen) {
                    loop {
                        args.push(parse_assignment(ctx));
                        if !ctx.eat(Code::Comma) {
                            break;
                        }
                    }
                }
                ctx.expect(Code::RParen);
                let (ret, params, variadic) = match expr.ty.kind() {
                    crate::types::TypeKind::Function(ret, params, variadic) => {
                        (ret.clone(), params.clone(), *variadic)
                    }
                    _ => {
                        ctx.arenas.diagnostics.report(
                            DiagKind::IncompatibleCast,
                            coords,
                            vec![expr.ty.to_string().into(), "function".into()],
                        );
                        (TypeFactory::error(), Vec::new(), true)
                    }
                };
                let args = sema::adjust_call_arguments(&mut ctx.arenas.diagnostics, coords, &params, variadic, args);
                expr = alloc(ctx, AstExpression { coords, kind: ExpressionKind::Call(expr, args), ty: ret });
            }
            Code::Dot => {
                ctx.advance();
                let field = parse_field_name(ctx);
                let node = sema::compute_member(&mut ctx.arenas.diagnostics, coords, expr, field, false);
                expr = alloc(ctx, node);
            }
            Code::Arrow => {
                ctx.advance();
                let field = parse_field_name(ctx);
                let node = sema::compute_member(&mut ctx.arenas.diagnostics, coords, expr, field, true);
                expr = alloc(ctx, node);
            }
            Code::PlusPlus => {
                ctx.advance();
                let ty = expr.ty.clone();
                expr = alloc(ctx, AstExpression { coords, kind: ExpressionKind::Unary(UnaryOp::PostInc, expr), ty });
            }
            Code::MinusMinus => {
                ctx.advance();
                let ty = expr.ty.clone();
                expr = alloc(ctx, AstExpression { coords, kind: ExpressionKind::Unary(UnaryOp::PostDec, expr), ty });
            }
            _ => break,
        }
    }
    expr
}

fn parse_field_name(ctx: &mut ParserContext<'_>) -> Symbol {
    if ctx.at(Code::Identifier) || ctx.at(Code::TypeName) {
        let text = ctx.current().text.clone();
        ctx.advance();
        ctx.arenas.strings.intern(&text)
    } else {
        let coords = ctx.coords_here();
        let got = ctx.current().text.clone();
        ctx.arenas.diagnostics.report(DiagKind::ExpectedIdentifier, coords, vec![got.into()]);
        ctx.arenas.strings.intern("<error>")
    }
}

fn parse_primary(ctx: &mut ParserContext<'_>) -> Expr {
    let coords = ctx.coords_here();
    match ctx.peek_code() {
        Code::IntConstant => {
            let tok = ctx.advance();
            let v = tok.int_value().unwrap_or(0);
            let ty = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::IntConst(v), ty })
        }
        Code::FloatConstant => {
            let tok = ctx.advance();
            let v = tok.float_value().unwrap_or(0.0);
            let ty = TypeFactory::primitive(TypeId::F8, Qualifiers::empty());
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::FloatConst(v), ty })
        }
        Code::StringLiteral => {
            // Adjacent string-literal concatenation (§6 "Input").
            let mut text = ctx.advance().str_value().unwrap_or("").to_string();
            while ctx.at(Code::StringLiteral) {
                text.push_str(ctx.advance().str_value().unwrap_or(""));
            }
            let elem = TypeFactory::primitive(TypeId::S1, Qualifiers::empty());
            let ty = TypeFactory::array(elem, text.len() as i64 + 1);
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::StringConst(text), ty })
        }
        Code::CharConstant => {
            let tok = ctx.advance();
            let v = tok.int_value().unwrap_or(0);
            let ty = TypeFactory::primitive(TypeId::S1, Qualifiers::empty());
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::IntConst(v), ty })
        }
        Code::Identifier | Code::TypeName => {
            let text = ctx.advance().text;
            resolve_name_ref(ctx, coords, &text)
        }
        Code::KwVaArg => parse_va_arg(ctx, coords),
        Code::LParen => {
            ctx.advance();
            let inner = parse_expression(ctx);
            ctx.expect(Code::RParen);
            let ty = inner.ty.clone();
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::Paren(inner), ty })
        }
        _ => {
            let got = ctx.current().text.clone();
            ctx.arenas.diagnostics.report(DiagKind::UnexpectedToken, coords, vec![got.into()]);
            ctx.advance();
            error_expr(ctx, coords)
        }
    }
}

fn resolve_name_ref(ctx: &mut ParserContext<'_>, coords: crate::source::Coordinates, text: &str) -> Expr {
    let sym = ctx.arenas.strings.intern(text);
    match ctx.scopes.find_symbol(ctx.scope, text) {
        Some(entry) => {
            let (resolved, ty) = match entry.payload {
                SymbolPayload::Value(decl) => {
                    let ty = decl.borrow().ty.clone();
                    (ResolvedName::Variable(decl), ty)
                }
                SymbolPayload::Function(func) => {
                    let ty = func.borrow().ty.clone();
                    (ResolvedName::Function(func), ty)
                }
                SymbolPayload::EnumConstant(ec) => {
                    (ResolvedName::EnumConstant(ec.value), TypeFactory::primitive(TypeId::S4, Qualifiers::empty()))
                }
                SymbolPayload::Typedef(_) | SymbolPayload::Aggregate(_) => {
                    ctx.arenas.diagnostics.report(DiagKind::UndeclaredIdentifier, coords, vec![text.into()]);
                    (ResolvedName::Unresolved, TypeFactory::error())
                }
            };
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::NameRef(sym, resolved), ty })
        }
        None => {
            ctx.arenas.diagnostics.report(DiagKind::UndeclaredIdentifier, coords, vec![text.into()]);
            alloc(ctx, AstExpression { coords, kind: ExpressionKind::NameRef(sym, ResolvedName::Unresolved), ty: TypeFactory::error() })
        }
    }
}

/// `'__builtin_va_arg' '(' IDENTIFIER ',' type_name ')'` (§4.9 "Function").
/// Reports `FirstVaArgNotVaList` when the first argument isn't `va_list`.
fn parse_va_arg(ctx: &mut ParserContext<'_>, coords: crate::source::Coordinates) -> Expr {
    ctx.advance();
    ctx.expect(Code::LParen);
    let list_coords = ctx.coords_here();
    let list_text = if ctx.at(Code::Identifier) || ctx.at(Code::TypeName) {
        ctx.advance().text
    } else {
        let got = ctx.current().text.clone();
        ctx.arenas.diagnostics.report(DiagKind::ExpectedIdentifier, list_coords, vec![got.into()]);
        String::new()
    };
    let list_arg = resolve_name_ref(ctx, list_coords, &list_text);
    ctx.expect(Code::Comma);
    let type_arg = super::decl::parse_type_name(ctx);
    ctx.expect(Code::RParen);

    if list_arg.is_error() {
        return error_expr(ctx, coords);
    }
    if !sema::is_va_list_type(&list_arg.ty, &ctx.va_list_def) {
        ctx.arenas.diagnostics.report(
            DiagKind::FirstVaArgNotVaList,
            list_arg.coords,
            vec![list_arg.ty.to_string().into()],
        );
        return error_expr(ctx, coords);
    }
    if type_arg.is_error() {
        return error_expr(ctx, coords);
    }
    alloc(ctx, AstExpression { coords, kind: ExpressionKind::VaArg(list_arg), ty: type_arg })
}
