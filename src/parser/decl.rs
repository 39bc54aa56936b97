//! Declaration-specifier gathering, declarator parsing, struct/union/enum
//! parsing, and function definition vs. declaration (§4.5).

use super::ParserContext;
use crate::ast::{
    AstFunctionDeclaration, AstValueDeclaration, DeclaratorKind, StorageFlags, TranslationUnit,
};
use crate::diag::DiagKind;
use crate::symtab::{tag_key, SymbolEntry, SymbolKind, SymbolPayload};
use crate::token::Code;
use crate::types::{
    AggregateKind, Qualifiers, RawMember, TypeDefinition, TypeFactory, TypeId, TypeKind, TypeRef, UNKNOWN_SIZE,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Gathered declaration specifiers (§4.5 "Declaration-specifier gathering"):
/// storage class, qualifiers, and the single decided base type.
#[derive(Debug, Clone)]
pub struct DeclSpecifiers {
    pub storage: StorageFlags,
    pub quals: Qualifiers,
    pub base: TypeRef,
}

#[derive(Debug, Default)]
struct RawSpecifiers {
    storage: StorageFlags,
    quals: Qualifiers,
    signed: Option<bool>,
    short_count: u32,
    long_count: u32,
    base_kw: Option<Code>,
    aggregate: Option<TypeRef>,
    typedef_name: Option<TypeRef>,
}

fn storage_for(code: Code) -> Option<StorageFlags> {
    match code {
        Code::KwTypedef => Some(StorageFlags::TYPEDEF),
        Code::KwExtern => Some(StorageFlags::EXTERN),
        Code::KwStatic => Some(StorageFlags::STATIC),
        Code::KwAuto => Some(StorageFlags::AUTO),
        Code::KwRegister => Some(StorageFlags::REGISTER),
        _ => None,
    }
}

fn qualifier_for(code: Code) -> Option<Qualifiers> {
    match code {
        Code::KwConst => Some(Qualifiers::CONST),
        Code::KwVolatile => Some(Qualifiers::VOLATILE),
        Code::KwRestrict => Some(Qualifiers::RESTRICT),
        Code::KwInline => Some(Qualifiers::INLINE),
        _ => None,
    }
}

/// `(sign, width, base) -> TypeId` decision table (§4.5): `long double` ->
/// `f10`; `long long` -> `s8`; etc.
fn decide_primitive(raw: &RawSpecifiers, coords: crate::source::Coordinates, ctx: &mut ParserContext<'_>) -> TypeId {
    if let Some(kw) = raw.base_kw {
        if raw.signed.is_some() && matches!(kw, Code::KwVoid | Code::KwBool | Code::KwFloat | Code::KwDouble) {
            ctx.arenas.diagnostics.report(DiagKind::IllTypedSignCombination, coords, vec![]);
        }
        match kw {
            Code::KwVoid => return TypeId::Void,
            Code::KwBool => return TypeId::Bool,
            Code::KwFloat => return TypeId::F4,
            Code::KwDouble => {
                return if raw.long_count > 0 { TypeId::F10 } else { TypeId::F8 };
            }
            Code::KwChar => {
                return if raw.signed == Some(false) { TypeId::U1 } else { TypeId::S1 };
            }
            Code::KwInt | Code::KwShort | Code::KwLong => {}
            _ => {}
        }
    }
    let unsigned = raw.signed == Some(false);
    if raw.short_count > 0 {
        return if unsigned { TypeId::U2 } else { TypeId::S2 };
    }
    if raw.long_count >= 1 {
        return if unsigned { TypeId::U8 } else { TypeId::S8 };
    }
    if raw.base_kw.is_none() && raw.signed.is_none() && raw.short_count == 0 && raw.long_count == 0 {
        ctx.arenas.diagnostics.report(DiagKind::MissingTypeSpecifier, coords, vec![]);
    }
    if unsigned {
        TypeId::U4
    } else {
        TypeId::S4
    }
}

/// Parses declaration specifiers (§4.5). Returns `None` (with a diagnostic
/// already reported) if the current token cannot start one.
pub fn parse_decl_specifiers(ctx: &mut ParserContext<'_>) -> DeclSpecifiers {
    let coords = ctx.coords_here();
    let mut raw = RawSpecifiers::default();
    loop {
        ctx.skip_attributes();
        let code = ctx.peek_code();
        if let Some(s) = storage_for(code) {
            if raw.storage.contains(s) {
                ctx.arenas.diagnostics.report(DiagKind::DuplicateDeclSpecifier, ctx.coords_here(), vec![format!("{code:?}").into()]);
            }
            raw.storage |= s;
            ctx.advance();
            continue;
        }
        if let Some(q) = qualifier_for(code) {
            raw.quals |= q;
            ctx.advance();
            continue;
        }
        match code {
            Code::KwSigned => {
                if raw.signed.is_some() {
                    ctx.arenas.diagnostics.report(DiagKind::ConflictingDeclSpecifier, ctx.coords_here(), vec!["signed".into(), "unsigned".into()]);
                }
                raw.signed = Some(true);
                ctx.advance();
            }
            Code::KwUnsigned => {
                if raw.signed == Some(true) {
                    ctx.arenas.diagnostics.report(DiagKind::ConflictingDeclSpecifier, ctx.coords_here(), vec!["unsigned".into(), "signed".into()]);
                }
                raw.signed = Some(false);
                ctx.advance();
            }
            Code::KwShort => {
                raw.short_count += 1;
                ctx.advance();
            }
            Code::KwLong => {
                raw.long_count += 1;
                ctx.advance();
            }
            Code::KwVoid | Code::KwBool | Code::KwFloat | Code::KwDouble | Code::KwChar | Code::KwInt => {
                if raw.base_kw.is_some() {
                    ctx.arenas.diagnostics.report(DiagKind::ConflictingDeclSpecifier, ctx.coords_here(), vec![format!("{code:?}").into(), format!("{:?}", raw.base_kw.unwrap()).into()]);
                }
                raw.base_kw = Some(code);
                ctx.advance();
            }
            Code::KwStruct | Code::KwUnion => {
                ctx.advance();
                raw.aggregate = Some(parse_struct_or_union(ctx, code == Code::KwUnion));
            }
            Code::KwEnum => {
                ctx.advance();
                raw.aggregate = Some(parse_enum(ctx));
            }
            Code::TypeName => {
                let name = ctx.current().text.clone();
                match ctx.scopes.find_symbol(ctx.scope, &name) {
                    Some(SymbolEntry { payload: SymbolPayload::Typedef(ty), .. }) => raw.typedef_name = Some(ty),
                    _ => {
                        ctx.arenas.diagnostics.report(DiagKind::UnknownTypeName, ctx.coords_here(), vec![name.into()]);
                    }
                }
                ctx.advance();
            }
            _ => break,
        }
    }

    let base = if let Some(agg) = raw.aggregate {
        agg
    } else if let Some(td) = raw.typedef_name {
        td
    } else {
        TypeFactory::primitive(decide_primitive(&raw, coords, ctx), Qualifiers::empty())
    };
    if raw.quals.contains(Qualifiers::RESTRICT) && !base.is_pointer() {
        ctx.arenas.diagnostics.report(DiagKind::RestrictOnNonPointer, coords, vec![]);
    }
    DeclSpecifiers { storage: raw.storage, quals: raw.quals, base: base.with_quals(raw.quals) }
}

/// One syntactic declarator layer (§4.5 "Declarator parsing"), collected
/// already in fold-ready (innermost-first) order by [`parse_declarator`].
#[derive(Debug, Clone)]
pub enum DeclaratorPart {
    Pointer(Qualifiers),
    Array(ArrayDeclSize),
    Function { params: Vec<TypeRef>, is_variadic: bool, decls: Vec<Rc<RefCell<AstValueDeclaration>>> },
}

/// An array declarator suffix's size, split three ways (§4.5, §4.6 "VLA
/// size materialization"): unspecified (`[]`, or `[*]` in a prototype),
/// a folded constant, or a non-constant expression that becomes a VLA.
#[derive(Debug, Clone)]
pub enum ArrayDeclSize {
    Unknown,
    Constant(i64),
    Vla(crate::ast::ExprId),
    /// `[*]`: a VLA dimension with no bound, legal only in a function
    /// prototype (§4.9 "Function").
    VlaStar,
}

pub struct Declarator {
    pub name: Option<String>,
    pub parts: Vec<DeclaratorPart>,
}

/// `make_type_ref`: folds `parts` onto `base`, innermost part first.
/// Rejects a function part that isn't outermost (§9 open question: "only
/// the outermost [declarator part] may legitimately denote a
/// function-returning-function").
pub fn make_type_ref(ctx: &mut ParserContext<'_>, coords: crate::source::Coordinates, base: TypeRef, parts: Vec<DeclaratorPart>) -> TypeRef {
    let mut ty = base;
    for (i, part) in parts.iter().enumerate() {
        if let DeclaratorPart::Function { .. } = part {
            if i != parts.len() - 1 {
                ctx.arenas.diagnostics.report(DiagKind::InvalidTypeComposition, coords, vec!["function returning function".into()]);
                return TypeFactory::error();
            }
        }
        ty = match part {
            DeclaratorPart::Pointer(quals) => TypeFactory::pointed(ty, *quals),
            DeclaratorPart::Array(ArrayDeclSize::Constant(n)) => TypeFactory::array(ty, *n),
            DeclaratorPart::Array(ArrayDeclSize::Unknown) => TypeFactory::array(ty, UNKNOWN_SIZE),
            DeclaratorPart::Array(ArrayDeclSize::Vla(size_expr)) => {
                let (vla_ty, var) = crate::sema::materialize_vla_dimension(&mut ctx.var_ids, ty);
                ctx.vla_sizes.push((var, size_expr.clone()));
                vla_ty
            }
            DeclaratorPart::Array(ArrayDeclSize::VlaStar) => {
                let (vla_ty, var) = crate::sema::materialize_vla_dimension(&mut ctx.var_ids, ty);
                ctx.unbound_vla_vars.insert(var);
                vla_ty
            }
            DeclaratorPart::Function { params, is_variadic, .. } => {
                TypeFactory::function(ty, params.clone(), *is_variadic)
            }
        };
    }
    ty
}

fn parse_declarator(ctx: &mut ParserContext<'_>) -> Declarator {
    if ctx.eat(Code::Star) {
        let mut quals = Qualifiers::empty();
        loop {
            match qualifier_for(ctx.peek_code()) {
                Some(q) => {
                    quals |= q;
                    ctx.advance();
                }
                None => break,
            }
        }
        let mut inner = parse_declarator(ctx);
        inner.parts.insert(0, DeclaratorPart::Pointer(quals));
        return inner;
    }
    parse_direct_declarator(ctx)
}

fn parse_direct_declarator(ctx: &mut ParserContext<'_>) -> Declarator {
    if ctx.eat(Code::LParen) {
        let inner = parse_declarator(ctx);
        ctx.expect(Code::RParen);
        let suffixes = parse_declarator_suffixes(ctx);
        let mut parts = suffixes;
        parts.extend(inner.parts);
        return Declarator { name: inner.name, parts };
    }
    let name = if ctx.at(Code::Identifier) || ctx.at(Code::TypeName) {
        Some(ctx.advance().text)
    } else {
        None
    };
    let parts = parse_declarator_suffixes(ctx);
    Declarator { name, parts }
}

fn parse_declarator_suffixes(ctx: &mut ParserContext<'_>) -> Vec<DeclaratorPart> {
    let mut written = Vec::new();
    loop {
        if ctx.eat(Code::LBracket) {
            ctx.skip_attributes();
            // `static`/qualifiers/`*` (VLA star) in an array suffix are
            // recognised and otherwise folded into a constant-or-VLA split.
            while storage_for(ctx.peek_code()).is_some() || qualifier_for(ctx.peek_code()).is_some() {
                ctx.advance();
            }
            let size = if ctx.at(Code::RBracket) {
                ArrayDeclSize::Unknown
            } else if ctx.eat(Code::Star) {
                ArrayDeclSize::VlaStar
            } else {
                // Grammatically an assignment-expression; its constancy (and
                // hence whether it folds, or instead denotes a VLA
                // dimension) is decided by evaluating it, not by the parse.
                let expr = super::expr::parse_constant_expression(ctx);
                match crate::constexpr::eval(&expr) {
                    Some(c) => match c.as_int() {
                        Some(v) if v >= 0 => ArrayDeclSize::Constant(v),
                        Some(_) => {
                            ctx.arenas.diagnostics.report(DiagKind::ArrayDesignatorNegative, ctx.coords_here(), vec![]);
                            ArrayDeclSize::Constant(0)
                        }
                        None => {
                            ctx.arenas.diagnostics.report(DiagKind::NonIntegerArraySize, ctx.coords_here(), vec![]);
                            ArrayDeclSize::Constant(0)
                        }
                    },
                    None if expr.ty.is_integer() => ArrayDeclSize::Vla(expr),
                    None => {
                        ctx.arenas.diagnostics.report(DiagKind::NonIntegerArraySize, ctx.coords_here(), vec![]);
                        ArrayDeclSize::Constant(0)
                    }
                }
            };
            ctx.expect(Code::RBracket);
            written.push(DeclaratorPart::Array(size));
        } else if ctx.eat(Code::LParen) {
            let (params, is_variadic, decls) = parse_parameter_list(ctx);
            ctx.expect(Code::RParen);
            written.push(DeclaratorPart::Function { params, is_variadic, decls });
        } else {
            break;
        }
    }
    written.reverse();
    written
}

fn parse_parameter_list(
    ctx: &mut ParserContext<'_>,
) -> (Vec<TypeRef>, bool, Vec<Rc<RefCell<AstValueDeclaration>>>) {
    let mut params = Vec::new();
    let mut decls = Vec::new();
    let mut is_variadic = false;
    let mut seen_names = std::collections::HashSet::new();
    if ctx.at(Code::RParen) {
        return (params, false, decls);
    }
    if ctx.at(Code::KwVoid) && ctx.tokens.get(ctx.pos + 1).raw_code == Code::RParen {
        ctx.advance();
        return (params, false, decls);
    }
    loop {
        if ctx.at(Code::Ellipsis) {
            if params.is_empty() {
                ctx.arenas.diagnostics.report(DiagKind::ParameterBeforeEllipsis, ctx.coords_here(), vec![]);
            }
            ctx.advance();
            is_variadic = true;
            break;
        }
        let specs = parse_decl_specifiers(ctx);
        if specs.storage != StorageFlags::REGISTER && !specs.storage.is_empty() {
            ctx.arenas.diagnostics.report(DiagKind::InvalidStorageClass, ctx.coords_here(), vec![format!("{:?}", specs.storage).into()]);
        }
        let d = parse_declarator(ctx);
        let coords = ctx.coords_here();
        if let Some(name) = &d.name {
            if !seen_names.insert(name.clone()) {
                ctx.arenas.diagnostics.report(DiagKind::IdAlreadySpecified, coords, vec![name.clone().into()]);
            }
        }
        let ty = make_type_ref(ctx, coords, specs.base, d.parts);
        if ty.is_void() && d.name.is_none() && params.is_empty() {
            ctx.advance();
        }
        params.push(ty.clone());
        let name_sym = d.name.as_deref().map(|n| ctx.arenas.strings.intern(n));
        let var_id = ctx.var_ids.next();
        decls.push(Rc::new(RefCell::new(AstValueDeclaration {
            kind: DeclaratorKind::Parameter,
            ty,
            name: name_sym.unwrap_or_else(|| ctx.arenas.strings.intern("")),
            index: decls.len() as u32,
            storage: specs.storage,
            initializer: None,
            var_id,
        })));
        if !ctx.eat(Code::Comma) {
            break;
        }
    }
    if params.len() > 1 {
        for p in &params[..params.len() - 1] {
            if p.is_void() {
                ctx.arenas.diagnostics.report(DiagKind::VoidParameterWithOthers, ctx.coords_here(), vec![]);
            }
        }
    }
    (params, is_variadic, decls)
}

/// Recognises declaration/reference/definition mode for `struct`/`union` by
/// look-ahead at the token after the tag identifier (§4.5).
fn parse_struct_or_union(ctx: &mut ParserContext<'_>, is_union: bool) -> TypeRef {
    let coords = ctx.coords_here();
    let kind = if is_union { AggregateKind::Union } else { AggregateKind::Struct };
    let tag_name = if ctx.at(Code::Identifier) || ctx.at(Code::TypeName) {
        Some(ctx.advance().text)
    } else {
        None
    };
    let has_body = ctx.at(Code::LBrace);

    let name = tag_name.clone().unwrap_or_else(|| ctx.anon_counter.next());
    let def = if let Some(tag) = &tag_name {
        match ctx.scopes.find_symbol(ctx.scope, &tag_key(tag)) {
            Some(SymbolEntry { payload: SymbolPayload::Aggregate(existing), kind: k, .. }) => {
                let matches_kind = matches!((k, kind), (SymbolKind::Struct, AggregateKind::Struct) | (SymbolKind::Union, AggregateKind::Union));
                if !matches_kind {
                    ctx.arenas.diagnostics.report(DiagKind::UseWithDifferentTag, coords, vec![tag.clone().into()]);
                }
                existing
            }
            _ => {
                let def = Rc::new(RefCell::new(TypeDefinition::new_forward(kind, name.clone())));
                ctx.arenas.type_defs.push(def.clone());
                ctx.scopes.declare(
                    ctx.scope,
                    tag_key(tag),
                    SymbolEntry {
                        kind: if is_union { SymbolKind::Union } else { SymbolKind::Struct },
                        name: tag.clone(),
                        payload: SymbolPayload::Aggregate(def.clone()),
                    },
                );
                def
            }
        }
    } else {
        let def = Rc::new(RefCell::new(TypeDefinition::new_forward(kind, name)));
        ctx.arenas.type_defs.push(def.clone());
        def
    };

    if has_body {
        ctx.advance();
        let members = parse_member_list(ctx);
        let (laid_out, size, align, is_flexible) = crate::types::layout_struct_members(kind, members);
        let mut d = def.borrow_mut();
        d.members = laid_out;
        d.size = size;
        d.align = align;
        d.is_flexible = is_flexible;
        d.is_defined = true;
    }

    TypeFactory::aggregate(def, Qualifiers::empty())
}

fn parse_member_list(ctx: &mut ParserContext<'_>) -> Vec<RawMember> {
    let mut raw = Vec::new();
    let mut seen_names = std::collections::HashSet::new();
    while !ctx.at(Code::RBrace) && !ctx.at(Code::Eof) {
        let specs = parse_decl_specifiers(ctx);
        if !specs.storage.is_empty() {
            ctx.arenas.diagnostics.report(DiagKind::InvalidStorageClass, ctx.coords_here(), vec![format!("{:?}", specs.storage).into()]);
        }
        loop {
            let d = parse_declarator(ctx);
            let coords = ctx.coords_here();
            let bit_width = if ctx.eat(Code::Colon) {
                let expr = super::expr::parse_constant_expression(ctx);
                match crate::constexpr::eval(&expr).and_then(|c| c.as_int()) {
                    Some(w) if w >= 0 => Some(w as u32),
                    _ => {
                        ctx.arenas.diagnostics.report(DiagKind::BitfieldWidthInvalid, coords, vec![0.into()]);
                        Some(0)
                    }
                }
            } else {
                None
            };
            let mut ty = make_type_ref(ctx, coords, specs.base.clone(), d.parts);
            let name = d.name.unwrap_or_default();
            if !name.is_empty() && !seen_names.insert(name.clone()) {
                ctx.arenas.diagnostics.report(DiagKind::IdAlreadySpecified, coords, vec![name.clone().into()]);
            }
            if bit_width.is_some() && !ty.is_integer() {
                // `checkIfBitfieldCorrect`: only integer (and `_Bool`) base
                // types may carry a bit-field width.
                ctx.arenas.diagnostics.report(DiagKind::BitfieldTypeInvalid, coords, vec![ty.to_string().into()]);
            }
            if ty.is_vla() {
                ctx.arenas.diagnostics.report(DiagKind::FieldNonConstantSize, coords, vec![]);
                ty = TypeFactory::error();
            }
            raw.push(match bit_width {
                Some(w) => RawMember::bitfield(name, ty, w),
                None => RawMember::field(name, ty),
            });
            if !ctx.eat(Code::Comma) {
                break;
            }
        }
        ctx.expect_semicolon();
    }
    ctx.expect(Code::RBrace);
    raw
}

fn parse_enum(ctx: &mut ParserContext<'_>) -> TypeRef {
    let coords = ctx.coords_here();
    let tag_name = if ctx.at(Code::Identifier) || ctx.at(Code::TypeName) {
        Some(ctx.advance().text)
    } else {
        None
    };
    let has_body = ctx.at(Code::LBrace);
    let name = tag_name.clone().unwrap_or_else(|| ctx.anon_counter.next());

    let def = if let Some(tag) = &tag_name {
        match ctx.scopes.find_symbol(ctx.scope, &tag_key(tag)) {
            Some(SymbolEntry { payload: SymbolPayload::Aggregate(existing), kind: SymbolKind::Enum, .. }) => existing,
            Some(_) => {
                ctx.arenas.diagnostics.report(DiagKind::UseWithDifferentTag, coords, vec![tag.clone().into()]);
                let def = Rc::new(RefCell::new(TypeDefinition::new_forward(AggregateKind::Enum, name.clone())));
                ctx.arenas.type_defs.push(def.clone());
                def
            }
            None => {
                let def = Rc::new(RefCell::new(TypeDefinition::new_forward(AggregateKind::Enum, name.clone())));
                ctx.arenas.type_defs.push(def.clone());
                ctx.scopes.declare(
                    ctx.scope,
                    tag_key(tag),
                    SymbolEntry { kind: SymbolKind::Enum, name: tag.clone(), payload: SymbolPayload::Aggregate(def.clone()) },
                );
                def
            }
        }
    } else {
        let def = Rc::new(RefCell::new(TypeDefinition::new_forward(AggregateKind::Enum, name)));
        ctx.arenas.type_defs.push(def.clone());
        def
    };

    if has_body {
        ctx.advance();
        let mut next_value = 0i64;
        let enum_ty = TypeFactory::aggregate(def.clone(), Qualifiers::empty());
        while !ctx.at(Code::RBrace) && !ctx.at(Code::Eof) {
            let econst_coords = ctx.coords_here();
            let ename = if ctx.at(Code::Identifier) || ctx.at(Code::TypeName) {
                ctx.advance().text
            } else {
                ctx.arenas.diagnostics.report(DiagKind::ExpectedIdentifier, econst_coords, vec![ctx.current().text.clone().into()]);
                break;
            };
            if ctx.eat(Code::Assign) {
                let expr = super::expr::parse_constant_expression(ctx);
                if let Some(v) = crate::constexpr::eval(&expr).and_then(|c| c.as_int()) {
                    next_value = v;
                } else {
                    ctx.arenas.diagnostics.report(DiagKind::ExpectedIntegerConstantExpression, econst_coords, vec![]);
                }
            }
            def.borrow_mut().enumerators.push(crate::types::Enumerator { name: ename.clone(), value: next_value });
            ctx.scopes.declare(
                ctx.scope,
                ename.clone(),
                SymbolEntry {
                    kind: SymbolKind::EnumConstant,
                    name: ename.clone(),
                    payload: SymbolPayload::EnumConstant(crate::ast::EnumConstantDecl { name: ctx.arenas.strings.intern(&ename), value: next_value }),
                },
            );
            next_value += 1;
            if !ctx.eat(Code::Comma) {
                break;
            }
        }
        ctx.expect(Code::RBrace);
        {
            let mut d = def.borrow_mut();
            d.is_defined = true;
            d.size = TypeId::S4.primitive_size();
            d.align = 4;
        }
        return enum_ty;
    }

    TypeFactory::aggregate(def, Qualifiers::empty())
}

/// `(parenthesized-type-name)` used by casts and `sizeof` (§4.5, §4.8).
pub fn parse_type_name(ctx: &mut ParserContext<'_>) -> TypeRef {
    let specs = parse_decl_specifiers(ctx);
    let d = parse_abstract_declarator(ctx);
    let coords = ctx.coords_here();
    make_type_ref(ctx, coords, specs.base, d)
}

fn parse_abstract_declarator(ctx: &mut ParserContext<'_>) -> Vec<DeclaratorPart> {
    let d = parse_declarator(ctx);
    d.parts
}

/// True if the tokens starting at `offset` from the current position begin
/// a type name (used by the cast/`sizeof` `(` look-ahead and `is_type_name`).
pub fn looks_like_type_start(ctx: &ParserContext<'_>, offset: u32) -> bool {
    let idx = ctx.pos + offset;
    let tok = ctx.tokens.get(idx);
    let code = if tok.raw_code == Code::Identifier && ctx.scopes.is_type_name(ctx.scope, &tok.text) {
        Code::TypeName
    } else {
        tok.raw_code
    };
    code.is_declaration_specifier_start()
}

/// One top-level declaration or function definition (§4.5 "Function
/// definition vs. declaration").
pub fn parse_top_level_declaration(ctx: &mut ParserContext<'_>, unit: &mut TranslationUnit) {
    if ctx.eat(Code::Semicolon) {
        return;
    }
    let specs = parse_decl_specifiers(ctx);
    if ctx.at(Code::Semicolon) {
        ctx.advance();
        if !specs.storage.contains(StorageFlags::TYPEDEF) {
            ctx.arenas.diagnostics.report(DiagKind::DeclaresNothing, ctx.coords_here(), vec![]);
        }
        return;
    }

    let mut first = true;
    loop {
        let d = parse_declarator(ctx);
        ctx.skip_attributes();
        let coords = ctx.coords_here();
        let is_function_part = matches!(d.parts.last(), Some(DeclaratorPart::Function { .. }));

        if specs.storage.contains(StorageFlags::TYPEDEF) {
            let Some(name) = &d.name else {
                ctx.arenas.diagnostics.report(DiagKind::TypedefWithoutName, coords, vec![]);
                ctx.synchronize();
                return;
            };
            let ty = make_type_ref(ctx, coords, specs.base.clone(), d.parts);
            declare_typedef(ctx, coords, name, ty);
        } else if is_function_part && first && ctx.at(Code::LBrace) {
            let ty = make_type_ref(ctx, coords, specs.base.clone(), d.parts.clone());
            let Some(name) = d.name else {
                ctx.arenas.diagnostics.report(DiagKind::ExpectedIdentifier, coords, vec![]);
                ctx.synchronize();
                return;
            };
            let func = parse_function_definition(ctx, coords, name, ty, &d.parts, specs.storage);
            unit.functions.push(func);
            return;
        } else {
            let mut ty = make_type_ref(ctx, coords, specs.base.clone(), d.parts);
            let Some(name) = d.name else {
                ctx.arenas.diagnostics.report(DiagKind::ExpectedIdentifier, coords, vec![]);
                ctx.synchronize();
                return;
            };
            if ty.is_vla() {
                ctx.arenas.diagnostics.report(DiagKind::VlaAtFileScope, coords, vec![]);
            }
            let initializer = if ctx.eat(Code::Assign) {
                if specs.storage.contains(StorageFlags::EXTERN) {
                    ctx.arenas.diagnostics.report(DiagKind::ExternVariableInitialization, coords, vec![]);
                }
                let init = super::stmt::parse_initializer(ctx, &mut ty);
                // File-scope declarations always have static storage duration.
                crate::initializer::check_static_initializer_is_constant(&mut ctx.arenas.diagnostics, &init);
                Some(init)
            } else {
                None
            };
            let sym = ctx.arenas.strings.intern(&name);
            let var_id = ctx.var_ids.next();
            let decl = Rc::new(RefCell::new(AstValueDeclaration {
                kind: DeclaratorKind::Variable,
                ty,
                name: sym,
                index: 0,
                storage: specs.storage,
                initializer,
                var_id,
            }));
            declare_value_scoped(ctx, coords, &name, decl.clone(), true);
            unit.globals.push(decl);
        }
        first = false;
        if !ctx.eat(Code::Comma) {
            break;
        }
    }
    ctx.expect_semicolon();
}

fn declare_typedef(ctx: &mut ParserContext<'_>, coords: crate::source::Coordinates, name: &str, ty: TypeRef) {
    if let Some(existing) = ctx.scopes.find_in_scope(ctx.scope, name) {
        if let SymbolPayload::Typedef(prev_ty) = &existing.payload {
            if !crate::types::types_equal(prev_ty, &ty) {
                ctx.arenas.diagnostics.report(DiagKind::TypedefRedefinition, coords, vec![name.into()]);
            }
            return;
        }
    }
    ctx.scopes.declare(
        ctx.scope,
        name.to_string(),
        SymbolEntry { kind: SymbolKind::Typedef, name: name.to_string(), payload: SymbolPayload::Typedef(ty) },
    );
}

fn declare_value(ctx: &mut ParserContext<'_>, coords: crate::source::Coordinates, name: &str, decl: Rc<RefCell<AstValueDeclaration>>) {
    declare_value_scoped(ctx, coords, name, decl, false);
}

/// `declareValue`/`existedValueProcessor`: at file scope, a redeclaration
/// with the same type is a harmless re-announcement (tentative definitions);
/// only a differing type is a conflict. A block-scope redeclaration of any
/// kind is always illegal, as C does not allow shadowing within one scope.
fn declare_value_scoped(
    ctx: &mut ParserContext<'_>,
    coords: crate::source::Coordinates,
    name: &str,
    decl: Rc<RefCell<AstValueDeclaration>>,
    file_scope: bool,
) {
    if let Some(existing) = ctx.scopes.find_in_scope(ctx.scope, name) {
        if file_scope {
            if let SymbolPayload::Value(existing_decl) = &existing.payload {
                if !crate::types::types_equal(&existing_decl.borrow().ty, &decl.borrow().ty) {
                    ctx.arenas.diagnostics.report(DiagKind::ConflictingTypes, coords, vec![name.into()]);
                }
            } else {
                ctx.arenas.diagnostics.report(DiagKind::ConflictingTypes, coords, vec![name.into()]);
            }
        } else {
            ctx.arenas.diagnostics.report(DiagKind::Redefinition, coords, vec![name.into()]);
        }
    }
    ctx.scopes.declare(
        ctx.scope,
        name.to_string(),
        SymbolEntry { kind: SymbolKind::Value, name: name.to_string(), payload: SymbolPayload::Value(decl) },
    );
}

fn parse_function_definition(
    ctx: &mut ParserContext<'_>,
    coords: crate::source::Coordinates,
    name: String,
    ty: TypeRef,
    parts: &[DeclaratorPart],
    storage: StorageFlags,
) -> Rc<RefCell<AstFunctionDeclaration>> {
    let (param_decls, is_variadic, return_ty) = match parts.last() {
        Some(DeclaratorPart::Function { decls, is_variadic, .. }) => {
            let ret = match ty.kind() {
                crate::types::TypeKind::Function(ret, ..) => ret.clone(),
                _ => ty.clone(),
            };
            (decls.clone(), *is_variadic, ret)
        }
        _ => (Vec::new(), false, ty.clone()),
    };

    for p in &param_decls {
        if let TypeKind::Vla(_, var) = p.borrow().ty.kind() {
            if ctx.unbound_vla_vars.contains(var) {
                ctx.arenas.diagnostics.report(DiagKind::UnboundVlaInDefinition, coords, vec![]);
            }
        }
    }

    let sym = ctx.arenas.strings.intern(&name);
    let func = Rc::new(RefCell::new(AstFunctionDeclaration {
        name: sym,
        ty: ty.clone(),
        params: param_decls.clone(),
        is_variadic,
        body: None,
        storage,
        va_area: None,
    }));
    ctx.scopes.declare(
        ctx.scope,
        name.clone(),
        SymbolEntry { kind: SymbolKind::Function, name: name.clone(), payload: SymbolPayload::Function(func.clone()) },
    );

    let outer_scope = ctx.scope;
    let fn_scope = ctx.scopes.new_scope(outer_scope);
    ctx.scope = fn_scope;
    for p in &param_decls {
        let pname = p.borrow().name.as_str().to_string();
        if !pname.is_empty() {
            ctx.scopes.declare(
                fn_scope,
                pname,
                SymbolEntry { kind: SymbolKind::Value, name: p.borrow().name.to_string(), payload: SymbolPayload::Value(p.clone()) },
            );
        }
    }

    let prev_return = ctx.current_function_return.replace(return_ty.clone());
    let was_static = ctx.in_static_scope;
    ctx.in_static_scope = false;
    if is_variadic {
        func.borrow_mut().va_area = Some(ctx.var_ids.next());
    }
    // Labels are function-scoped (§4.6 "Goto/label verification" runs "at
    // function end"): each definition gets its own tracker so a label name
    // may repeat across functions and a dangling `goto` is caught per-function
    // rather than leaking into the next one.
    let prev_labels = std::mem::take(&mut ctx.labels);
    let body = super::stmt::parse_block(ctx);
    ctx.labels.finish(&mut ctx.arenas.diagnostics);
    ctx.labels = prev_labels;
    ctx.in_static_scope = was_static;
    ctx.current_function_return = prev_return;
    ctx.scope = outer_scope;
    func.borrow_mut().body = Some(body);
    let _ = coords;
    func
}

/// One block-scope declaration (§4.5 "Function definition vs. declaration"
/// applies only at file scope; inside a block a declarator followed by `{`
/// is always an error, never a nested function definition). Typedefs and
/// local function prototypes install a symbol but contribute nothing to
/// the returned list - only variables do, for `StatementKind::Declaration`.
pub fn parse_block_declaration(ctx: &mut ParserContext<'_>) -> Vec<Rc<RefCell<AstValueDeclaration>>> {
    let mut out = Vec::new();
    if ctx.eat(Code::Semicolon) {
        return out;
    }
    let specs = parse_decl_specifiers(ctx);
    if ctx.at(Code::Semicolon) {
        ctx.advance();
        if !specs.storage.contains(StorageFlags::TYPEDEF) {
            ctx.arenas.diagnostics.report(DiagKind::DeclaresNothing, ctx.coords_here(), vec![]);
        }
        return out;
    }

    loop {
        let d = parse_declarator(ctx);
        ctx.skip_attributes();
        let coords = ctx.coords_here();
        let is_function_part = matches!(d.parts.last(), Some(DeclaratorPart::Function { .. }));

        if specs.storage.contains(StorageFlags::TYPEDEF) {
            let Some(name) = &d.name else {
                ctx.arenas.diagnostics.report(DiagKind::TypedefWithoutName, coords, vec![]);
                ctx.synchronize();
                return out;
            };
            let ty = make_type_ref(ctx, coords, specs.base.clone(), d.parts);
            declare_typedef(ctx, coords, name, ty);
        } else if is_function_part {
            if ctx.at(Code::LBrace) {
                ctx.arenas.diagnostics.report(DiagKind::UnexpectedToken, coords, vec!["{".into()]);
            }
            let ty = make_type_ref(ctx, coords, specs.base.clone(), d.parts);
            let Some(name) = d.name else {
                ctx.arenas.diagnostics.report(DiagKind::ExpectedIdentifier, coords, vec![]);
                ctx.synchronize();
                return out;
            };
            let sym = ctx.arenas.strings.intern(&name);
            let func = Rc::new(RefCell::new(AstFunctionDeclaration {
                name: sym,
                ty,
                params: Vec::new(),
                is_variadic: false,
                body: None,
                storage: specs.storage,
                va_area: None,
            }));
            ctx.scopes.declare(
                ctx.scope,
                name.clone(),
                SymbolEntry { kind: SymbolKind::Function, name: name.clone(), payload: SymbolPayload::Function(func) },
            );
        } else {
            let mut ty = make_type_ref(ctx, coords, specs.base.clone(), d.parts);
            let Some(name) = d.name else {
                ctx.arenas.diagnostics.report(DiagKind::ExpectedIdentifier, coords, vec![]);
                ctx.synchronize();
                return out;
            };
            if ty.is_vla() && specs.storage.intersects(StorageFlags::STATIC | StorageFlags::EXTERN) {
                ctx.arenas.diagnostics.report(DiagKind::VlaWithStaticDuration, coords, vec![]);
            }
            let has_static_duration = specs.storage.intersects(StorageFlags::STATIC | StorageFlags::EXTERN);
            let initializer = if ctx.eat(Code::Assign) {
                if specs.storage.contains(StorageFlags::EXTERN) {
                    ctx.arenas.diagnostics.report(DiagKind::ExternVariableInitialization, coords, vec![]);
                }
                let init = super::stmt::parse_initializer(ctx, &mut ty);
                if has_static_duration {
                    crate::initializer::check_static_initializer_is_constant(&mut ctx.arenas.diagnostics, &init);
                }
                Some(init)
            } else {
                None
            };
            let sym = ctx.arenas.strings.intern(&name);
            let var_id = ctx.var_ids.next();
            let decl = Rc::new(RefCell::new(AstValueDeclaration {
                kind: DeclaratorKind::Variable,
                ty,
                name: sym,
                index: 0,
                storage: specs.storage,
                initializer,
                var_id,
            }));
            declare_value(ctx, coords, &name, decl.clone());
            out.push(decl);
        }
        if !ctx.eat(Code::Comma) {
            break;
        }
    }
    ctx.expect_semicolon();
    out
}
