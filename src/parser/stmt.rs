//! Statement parsing and the designated-initializer raw-stream reader
//! (§4.5 "Statement parsing", §4.7 "Designated initializers").

use super::ParserContext;
use crate::ast::{AstStatement, JumpKind, LabelKind, ParsedInitializerItem, StatementKind, StmtId};
use crate::diag::DiagKind;
use crate::sema::SwitchTracker;
use crate::token::Code;
use crate::types::{TypeFactory, TypeRef};

fn alloc_stmt(ctx: &mut ParserContext<'_>, coords: crate::source::Coordinates, kind: StatementKind) -> StmtId {
    ctx.arenas.statements.alloc(AstStatement { coords, kind })
}

/// `{ ... }`, opening its own scope.
pub fn parse_block(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.expect(Code::LBrace);
    let outer = ctx.scope;
    ctx.scope = ctx.scopes.new_scope(outer);
    let mut stmts = Vec::new();
    while !ctx.at(Code::RBrace) && !ctx.at(Code::Eof) {
        stmts.push(parse_statement(ctx));
    }
    ctx.expect(Code::RBrace);
    ctx.scope = outer;
    alloc_stmt(ctx, coords, StatementKind::Block(stmts))
}

pub fn parse_statement(ctx: &mut ParserContext<'_>) -> StmtId {
    match ctx.peek_code() {
        Code::LBrace => parse_block(ctx),
        Code::KwIf => parse_if(ctx),
        Code::KwSwitch => parse_switch(ctx),
        Code::KwWhile => parse_while(ctx),
        Code::KwDo => parse_do_while(ctx),
        Code::KwFor => parse_for(ctx),
        Code::KwGoto => parse_goto(ctx),
        Code::KwContinue => parse_continue(ctx),
        Code::KwBreak => parse_break(ctx),
        Code::KwReturn => parse_return(ctx),
        Code::KwCase => parse_case(ctx),
        Code::KwDefault => parse_default(ctx),
        Code::Semicolon => {
            let coords = ctx.coords_here();
            ctx.advance();
            alloc_stmt(ctx, coords, StatementKind::Empty)
        }
        Code::Identifier if ctx.tokens.get(ctx.pos + 1).raw_code == Code::Colon => parse_named_label(ctx),
        _ if super::decl::looks_like_type_start(ctx, 0) => parse_declaration_statement(ctx),
        _ => parse_expression_statement(ctx),
    }
}

fn parse_if(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.advance();
    ctx.expect(Code::LParen);
    let cond = super::expr::parse_expression(ctx);
    ctx.expect(Code::RParen);
    let then_branch = parse_statement(ctx);
    let else_branch = if ctx.eat(Code::KwElse) { Some(parse_statement(ctx)) } else { None };
    alloc_stmt(ctx, coords, StatementKind::If { cond, then_branch, else_branch })
}

fn parse_switch(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.advance();
    ctx.expect(Code::LParen);
    let cond = super::expr::parse_expression(ctx);
    ctx.expect(Code::RParen);
    if !cond.ty.is_integer() {
        ctx.arenas.diagnostics.report(DiagKind::NonIntegerSwitchArgument, coords, vec![]);
    }
    ctx.switches.push(SwitchTracker::new());
    ctx.in_switch += 1;
    let body = parse_statement(ctx);
    ctx.in_switch -= 1;
    ctx.switches.pop();
    alloc_stmt(ctx, coords, StatementKind::Switch { cond, body })
}

fn parse_while(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.advance();
    ctx.expect(Code::LParen);
    let cond = super::expr::parse_expression(ctx);
    ctx.expect(Code::RParen);
    ctx.in_loop += 1;
    let body = parse_statement(ctx);
    ctx.in_loop -= 1;
    alloc_stmt(ctx, coords, StatementKind::While { cond, body })
}

fn parse_do_while(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.advance();
    ctx.in_loop += 1;
    let body = parse_statement(ctx);
    ctx.in_loop -= 1;
    ctx.expect(Code::KwWhile);
    ctx.expect(Code::LParen);
    let cond = super::expr::parse_expression(ctx);
    ctx.expect(Code::RParen);
    ctx.expect_semicolon();
    alloc_stmt(ctx, coords, StatementKind::DoWhile { body, cond })
}

fn parse_for(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.advance();
    ctx.expect(Code::LParen);
    let outer = ctx.scope;
    ctx.scope = ctx.scopes.new_scope(outer);

    let init = if ctx.eat(Code::Semicolon) {
        None
    } else if super::decl::looks_like_type_start(ctx, 0) {
        let init_coords = ctx.coords_here();
        let decls = super::decl::parse_block_declaration(ctx);
        Some(alloc_stmt(ctx, init_coords, StatementKind::Declaration(decls)))
    } else {
        let init_coords = ctx.coords_here();
        let e = super::expr::parse_expression(ctx);
        ctx.expect_semicolon();
        Some(alloc_stmt(ctx, init_coords, StatementKind::Expression(e)))
    };
    let cond = if ctx.at(Code::Semicolon) { None } else { Some(super::expr::parse_expression(ctx)) };
    ctx.expect_semicolon();
    let step = if ctx.at(Code::RParen) { None } else { Some(super::expr::parse_expression(ctx)) };
    ctx.expect(Code::RParen);

    ctx.in_loop += 1;
    let body = parse_statement(ctx);
    ctx.in_loop -= 1;
    ctx.scope = outer;
    alloc_stmt(ctx, coords, StatementKind::For { init, cond, step, body })
}

fn parse_goto(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.advance();
    let kind = if ctx.eat(Code::Star) {
        JumpKind::GotoExpr(super::expr::parse_expression(ctx))
    } else {
        let name = if ctx.at(Code::Identifier) || ctx.at(Code::TypeName) {
            ctx.advance().text
        } else {
            ctx.arenas.diagnostics.report(DiagKind::ExpectedIdentifier, coords, vec![]);
            String::new()
        };
        ctx.labels.use_label(coords, &name);
        JumpKind::GotoLabel(ctx.arenas.strings.intern(&name))
    };
    ctx.expect_semicolon();
    alloc_stmt(ctx, coords, StatementKind::Jump(kind))
}

fn parse_continue(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.advance();
    if ctx.in_loop == 0 {
        ctx.arenas.diagnostics.report(DiagKind::ContinueOutsideLoop, coords, vec![]);
    }
    ctx.expect_semicolon();
    alloc_stmt(ctx, coords, StatementKind::Jump(JumpKind::Continue))
}

fn parse_break(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.advance();
    if ctx.in_loop == 0 && ctx.in_switch == 0 {
        ctx.arenas.diagnostics.report(DiagKind::BreakOutsideLoopOrSwitch, coords, vec![]);
    }
    ctx.expect_semicolon();
    alloc_stmt(ctx, coords, StatementKind::Jump(JumpKind::Break))
}

fn parse_return(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.advance();
    let expr = if ctx.at(Code::Semicolon) { None } else { Some(super::expr::parse_expression(ctx)) };
    ctx.expect_semicolon();
    let declared = ctx.current_function_return.clone().unwrap_or_else(TypeFactory::error);
    let checked = crate::sema::check_return(&mut ctx.arenas.diagnostics, coords, &declared, expr);
    alloc_stmt(ctx, coords, StatementKind::Jump(JumpKind::Return(checked)))
}

fn parse_case(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.advance();
    let expr = super::expr::parse_constant_expression(ctx);
    ctx.expect(Code::Colon);
    let value = crate::constexpr::eval(&expr).and_then(|c| c.as_int());
    let value = match value {
        Some(v) => v,
        None => {
            ctx.arenas.diagnostics.report(DiagKind::ExpectedIntegerConstantExpression, coords, vec![]);
            0
        }
    };
    if ctx.in_switch == 0 {
        ctx.arenas.diagnostics.report(DiagKind::SwitchLabelOutsideSwitch, coords, vec![]);
    } else if let Some(tracker) = ctx.switches.last_mut() {
        tracker.add_case(&mut ctx.arenas.diagnostics, coords, value);
    }
    let inner = parse_statement(ctx);
    alloc_stmt(ctx, coords, StatementKind::Labeled { label: LabelKind::Case(value), inner })
}

fn parse_default(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    ctx.advance();
    ctx.expect(Code::Colon);
    if ctx.in_switch == 0 {
        ctx.arenas.diagnostics.report(DiagKind::SwitchLabelOutsideSwitch, coords, vec![]);
    } else if let Some(tracker) = ctx.switches.last_mut() {
        tracker.add_default(&mut ctx.arenas.diagnostics, coords);
    }
    let inner = parse_statement(ctx);
    alloc_stmt(ctx, coords, StatementKind::Labeled { label: LabelKind::Default, inner })
}

fn parse_named_label(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    let name = ctx.advance().text;
    ctx.expect(Code::Colon);
    ctx.labels.define(&mut ctx.arenas.diagnostics, coords, &name);
    let sym = ctx.arenas.strings.intern(&name);
    let inner = parse_statement(ctx);
    alloc_stmt(ctx, coords, StatementKind::Labeled { label: LabelKind::Named(sym), inner })
}

fn parse_declaration_statement(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    let decls = super::decl::parse_block_declaration(ctx);
    alloc_stmt(ctx, coords, StatementKind::Declaration(decls))
}

fn parse_expression_statement(ctx: &mut ParserContext<'_>) -> StmtId {
    let coords = ctx.coords_here();
    let e = super::expr::parse_expression(ctx);
    ctx.expect_semicolon();
    alloc_stmt(ctx, coords, StatementKind::Expression(e))
}

/// Reads the raw `{ ... }`-or-bare initializer into a flat
/// `ParsedInitializerItem` stream, then folds it with
/// [`crate::initializer::finalize_initializer`]. Writes back a newly
/// resolved array type for an incomplete-array declarator whose size is
/// determined by its highest written index.
pub fn parse_initializer(ctx: &mut ParserContext<'_>, ty: &mut TypeRef) -> crate::ast::AstInitializer {
    let coords = ctx.coords_here();
    let mut items = Vec::new();
    parse_initializer_item(ctx, &mut items);
    let (ast, resolved) = crate::initializer::finalize_initializer(&mut ctx.arenas.diagnostics, coords, &items, ty);
    if let Some(new_ty) = resolved {
        *ty = new_ty;
    }
    ast
}

fn parse_initializer_item(ctx: &mut ParserContext<'_>, items: &mut Vec<ParsedInitializerItem>) {
    if ctx.at(Code::LBrace) {
        ctx.advance();
        items.push(ParsedInitializerItem::Open);
        if !ctx.at(Code::RBrace) {
            loop {
                parse_designators(ctx, items);
                parse_initializer_item(ctx, items);
                if ctx.eat(Code::Comma) {
                    if ctx.at(Code::RBrace) {
                        break;
                    }
                    items.push(ParsedInitializerItem::Separator);
                    continue;
                }
                break;
            }
        }
        ctx.expect(Code::RBrace);
        items.push(ParsedInitializerItem::Close);
    } else {
        let expr = super::expr::parse_assignment(ctx);
        items.push(ParsedInitializerItem::Inner(expr));
    }
}

/// `.field`/`[index]` designator chain preceding one initializer item
/// (§4.5 "Designated initializers"); a bare chain without any designator
/// leaves `items` untouched and consumes no `=`.
fn parse_designators(ctx: &mut ParserContext<'_>, items: &mut Vec<ParsedInitializerItem>) {
    let mut any = false;
    loop {
        if ctx.eat(Code::LBracket) {
            let expr = super::expr::parse_constant_expression(ctx);
            ctx.expect(Code::RBracket);
            let idx = crate::constexpr::eval(&expr).and_then(|c| c.as_int()).unwrap_or(0);
            items.push(ParsedInitializerItem::DesignatorIndex(idx));
            any = true;
        } else if ctx.eat(Code::Dot) {
            let name = if ctx.at(Code::Identifier) || ctx.at(Code::TypeName) {
                ctx.advance().text
            } else {
                ctx.arenas.diagnostics.report(DiagKind::ExpectedIdentifier, ctx.coords_here(), vec![]);
                String::new()
            };
            let sym = ctx.arenas.strings.intern(&name);
            items.push(ParsedInitializerItem::DesignatorField(sym));
            any = true;
        } else {
            break;
        }
    }
    if any {
        ctx.expect(Code::Assign);
    }
}
