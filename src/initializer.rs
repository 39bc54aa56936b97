//! Designated-initializer finalization (§4.7): folds the parser's flat
//! `ParsedInitializerItem` stream into a tree of absolute byte offsets.
//!
//! The stream is a sequence of `Open`/`Close`/`Separator`/`Inner`/
//! `DesignatorIndex`/`DesignatorField` tokens (see `ast.rs`). This module
//! walks it with an explicit stack of frames, one per open brace, each
//! tracking a cursor into the struct member list / array index / scalar
//! slot it is filling.

use crate::ast::{AstInitializer, ExpressionKind, ExprId, InitState, ParsedInitializerItem};
use crate::diag::{DiagKind, DiagnosticEngine};
use crate::intern::Symbol;
use crate::sema::cast_to;
use crate::source::Coordinates;
use crate::types::{compute_type_size, TypeDefRef, TypeFactory, TypeId, TypeKind, TypeRef, UNKNOWN_SIZE};
use std::rc::Rc;

enum FrameTarget {
    Struct { def: TypeDefRef, idx: usize },
    Array { elem_ty: TypeRef, elem_size: i64, index: i64, max_index: i64, declared_size: Option<i64> },
    Scalar { ty: TypeRef, consumed: bool },
}

struct FrameState {
    base_offset: i64,
    target: FrameTarget,
    children: Vec<AstInitializer>,
}

fn make_target(ty: &TypeRef) -> FrameTarget {
    if ty.is_struct_or_union() {
        if let Some(def) = ty.definition() {
            return FrameTarget::Struct { def, idx: 0 };
        }
    }
    match ty.kind() {
        TypeKind::Array(elem, size) => {
            let elem_size = compute_type_size(elem);
            let declared_size = if *size == UNKNOWN_SIZE { None } else { Some(*size) };
            FrameTarget::Array { elem_ty: elem.clone(), elem_size, index: 0, max_index: -1, declared_size }
        }
        TypeKind::Vla(elem, _) => {
            let elem_size = compute_type_size(elem);
            FrameTarget::Array { elem_ty: elem.clone(), elem_size, index: 0, max_index: -1, declared_size: None }
        }
        _ => FrameTarget::Scalar { ty: ty.clone(), consumed: false },
    }
}

fn current_slot_type(frame: &FrameState) -> Option<TypeRef> {
    match &frame.target {
        FrameTarget::Struct { def, idx } => def.borrow().members.get(*idx).map(|m| m.ty.clone()),
        FrameTarget::Array { elem_ty, .. } => Some(elem_ty.clone()),
        FrameTarget::Scalar { ty, consumed } => if *consumed { None } else { Some(ty.clone()) },
    }
}

fn current_slot_offset(frame: &FrameState) -> i64 {
    match &frame.target {
        FrameTarget::Struct { def, idx } => {
            frame.base_offset + def.borrow().members.get(*idx).map_or(0, |m| m.offset)
        }
        FrameTarget::Array { elem_size, index, .. } => frame.base_offset + index * elem_size,
        FrameTarget::Scalar { .. } => frame.base_offset,
    }
}

fn advance_cursor(frame: &mut FrameState) {
    match &mut frame.target {
        FrameTarget::Struct { idx, .. } => *idx += 1,
        FrameTarget::Array { index, max_index, .. } => {
            if *index > *max_index {
                *max_index = *index;
            }
            *index += 1;
        }
        FrameTarget::Scalar { consumed, .. } => *consumed = true,
    }
}

fn set_index(frame: &mut FrameState, i: i64, diags: &mut DiagnosticEngine, coords: Coordinates) {
    match &mut frame.target {
        FrameTarget::Array { index, .. } => {
            if i < 0 {
                diags.report(DiagKind::ArrayDesignatorNegative, coords, vec![]);
            } else {
                *index = i;
            }
        }
        _ => diags.report(DiagKind::FieldDesignatorOnNonStruct, coords, vec![]),
    }
}

fn set_field(frame: &mut FrameState, name: Symbol, diags: &mut DiagnosticEngine, coords: Coordinates) {
    match &mut frame.target {
        FrameTarget::Struct { def, idx } => {
            let pos = def.borrow().members.iter().position(|m| m.name == name.as_str());
            match pos {
                Some(p) => *idx = p,
                None => diags.report(DiagKind::FieldDesignatorOnNonStruct, coords, vec![]),
            }
        }
        _ => diags.report(DiagKind::FieldDesignatorOnNonStruct, coords, vec![]),
    }
}

fn is_char_element(ty: &TypeRef) -> bool {
    matches!(ty.kind(), TypeKind::Value(d) if matches!(d.type_id, TypeId::S1 | TypeId::U1))
}

fn synth_int(value: i64, ty: &TypeRef, coords: Coordinates) -> ExprId {
    Rc::new(crate::ast::AstExpression { coords, kind: ExpressionKind::IntConst(value), ty: ty.clone() })
}

/// Expands a string-literal initializer of a char array into one leaf per
/// byte plus a NUL terminator, truncating at a declared size and omitting
/// the terminator when the string exactly fills it (§4.7 "Character array
/// initialized by a string literal").
fn expand_string(elem_ty: &TypeRef, declared_size: Option<i64>, base_offset: i64, text: &str, coords: Coordinates) -> (Vec<AstInitializer>, i64) {
    let elem_size = compute_type_size(elem_ty);
    let bytes = text.as_bytes();
    let cap = declared_size.map(|n| n as usize);
    let take = cap.map_or(bytes.len(), |n| bytes.len().min(n));
    let mut out = Vec::with_capacity(take + 1);
    for (i, b) in bytes[..take].iter().enumerate() {
        out.push(AstInitializer::Expression {
            slot_type: elem_ty.clone(),
            offset: base_offset + i as i64 * elem_size,
            expression: synth_int(*b as i64, elem_ty, coords),
            state: InitState::Finalized,
        });
    }
    let has_room_for_nul = match cap {
        Some(n) => take < n,
        None => true,
    };
    let written = if has_room_for_nul {
        out.push(AstInitializer::Expression {
            slot_type: elem_ty.clone(),
            offset: base_offset + take as i64 * elem_size,
            expression: synth_int(0, elem_ty, coords),
            state: InitState::Finalized,
        });
        take as i64 + 1
    } else {
        take as i64
    };
    (out, written)
}

fn place_inner(frame: &mut FrameState, expr: ExprId, coords: Coordinates) {
    let Some(slot_ty) = current_slot_type(frame) else { return };
    let offset = current_slot_offset(frame);
    if slot_ty.is_array() && is_char_element(slot_ty.inner().unwrap_or(&slot_ty)) {
        if let ExpressionKind::StringConst(text) = &expr.kind {
            let declared_size = match slot_ty.kind() {
                TypeKind::Array(_, n) if *n != UNKNOWN_SIZE => Some(*n),
                _ => None,
            };
            let elem_ty = slot_ty.inner().cloned().unwrap_or_else(TypeFactory::error);
            let (children, _written) = expand_string(&elem_ty, declared_size, offset, text, coords);
            frame.children.push(AstInitializer::List(children));
            advance_cursor(frame);
            return;
        }
    }
    let leaf = AstInitializer::Expression {
        slot_type: slot_ty.clone(),
        offset,
        expression: cast_to(expr, &slot_ty),
        state: InitState::Finalized,
    };
    frame.children.push(leaf);
    advance_cursor(frame);
}

/// `(finished list, resolved size if this frame's array size was unknown)`.
fn finish_frame(frame: FrameState) -> (AstInitializer, Option<i64>) {
    let resolved = match &frame.target {
        FrameTarget::Array { declared_size: None, max_index, .. } => Some(max_index + 1),
        _ => None,
    };
    (AstInitializer::List(frame.children), resolved)
}

/// Reports `expected_constant_expression` for every leaf of an already-
/// finalized initializer that does not fold to a constant (§4.7
/// "Static-scope initializers require a constant expression; non-constant
/// expressions at static scope report"). Called only when the declaration
/// being initialized has static storage duration.
pub fn check_static_initializer_is_constant(diags: &mut DiagnosticEngine, init: &AstInitializer) {
    match init {
        AstInitializer::Expression { expression, .. } => {
            if crate::constexpr::eval(expression).is_none() {
                diags.report(DiagKind::ExpectedConstantExpression, expression.coords, vec![]);
            }
        }
        AstInitializer::List(children) => {
            for child in children {
                check_static_initializer_is_constant(diags, child);
            }
        }
    }
}

/// Folds a flat designated-initializer stream into an `AstInitializer`
/// tree. Returns a new array type in the second slot when `root_ty` was an
/// incomplete array whose size is determined by the highest index written
/// (§4.7 "Incomplete array size resolution"); the caller stores it back
/// into its own `ty` binding.
pub fn finalize_initializer(
    diags: &mut DiagnosticEngine,
    coords: Coordinates,
    items: &[ParsedInitializerItem],
    root_ty: &TypeRef,
) -> (AstInitializer, Option<TypeRef>) {
    if let [ParsedInitializerItem::Inner(expr)] = items {
        if root_ty.is_array() && is_char_element(root_ty.inner().unwrap_or(root_ty)) {
            if let ExpressionKind::StringConst(text) = &expr.kind {
                let declared_size = match root_ty.kind() {
                    TypeKind::Array(_, n) if *n != UNKNOWN_SIZE => Some(*n),
                    _ => None,
                };
                let elem_ty = root_ty.inner().cloned().unwrap_or_else(TypeFactory::error);
                let (children, written) = expand_string(&elem_ty, declared_size, 0, text, coords);
                let new_ty = declared_size.is_none().then(|| TypeFactory::array(elem_ty.clone(), written));
                return (AstInitializer::List(children), new_ty);
            }
        }
        let leaf = AstInitializer::Expression {
            slot_type: root_ty.clone(),
            offset: 0,
            expression: cast_to(expr.clone(), root_ty),
            state: InitState::Finalized,
        };
        return (leaf, None);
    }

    let mut stack: Vec<FrameState> = Vec::new();
    let mut result: Option<AstInitializer> = None;
    let mut resolved_root_ty: Option<TypeRef> = None;

    for item in items {
        match item {
            ParsedInitializerItem::Open => {
                let (base_offset, target) = match stack.last() {
                    None => (0, make_target(root_ty)),
                    Some(top) => {
                        let slot_ty = current_slot_type(top).unwrap_or_else(TypeFactory::error);
                        (current_slot_offset(top), make_target(&slot_ty))
                    }
                };
                stack.push(FrameState { base_offset, target, children: Vec::new() });
            }
            ParsedInitializerItem::Close => {
                let Some(frame) = stack.pop() else { continue };
                let (finished, resolved_size) = finish_frame(frame);
                match stack.last_mut() {
                    Some(parent) => {
                        parent.children.push(finished);
                        advance_cursor(parent);
                    }
                    None => {
                        if let Some(n) = resolved_size {
                            if let TypeKind::Array(elem, _) = root_ty.kind() {
                                resolved_root_ty = Some(TypeFactory::array(elem.clone(), n));
                            }
                        }
                        result = Some(finished);
                    }
                }
            }
            ParsedInitializerItem::Separator => {}
            ParsedInitializerItem::Inner(expr) => {
                if let Some(top) = stack.last_mut() {
                    place_inner(top, expr.clone(), coords);
                }
            }
            ParsedInitializerItem::DesignatorIndex(i) => {
                if let Some(top) = stack.last_mut() {
                    set_index(top, *i, diags, coords);
                }
            }
            ParsedInitializerItem::DesignatorField(name) => {
                if let Some(top) = stack.last_mut() {
                    set_field(top, name.clone(), diags, coords);
                }
            }
        }
    }

    (result.unwrap_or(AstInitializer::List(Vec::new())), resolved_root_ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::DiagnosticEngine;
    use crate::source::Coordinates;
    use crate::types::Qualifiers;

    fn coords() -> Coordinates {
        Coordinates::single(0)
    }

    fn int_expr(v: i64, ty: &TypeRef) -> ExprId {
        synth_int(v, ty, coords())
    }

    #[test]
    fn scalar_bare_initializer_casts_to_slot_type() {
        let mut diags = DiagnosticEngine::new();
        let ty = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        let items = vec![ParsedInitializerItem::Inner(int_expr(3, &ty))];
        let (ast, new_ty) = finalize_initializer(&mut diags, coords(), &items, &ty);
        assert!(new_ty.is_none());
        match ast {
            AstInitializer::Expression { offset, .. } => assert_eq!(offset, 0),
            _ => panic!("expected scalar leaf"),
        }
    }

    #[test]
    fn braced_array_of_three_ints() {
        let mut diags = DiagnosticEngine::new();
        let elem = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        let ty = TypeFactory::array(elem.clone(), 3);
        let items = vec![
            ParsedInitializerItem::Open,
            ParsedInitializerItem::Inner(int_expr(1, &elem)),
            ParsedInitializerItem::Separator,
            ParsedInitializerItem::Inner(int_expr(2, &elem)),
            ParsedInitializerItem::Separator,
            ParsedInitializerItem::Inner(int_expr(3, &elem)),
            ParsedInitializerItem::Close,
        ];
        let (ast, _) = finalize_initializer(&mut diags, coords(), &items, &ty);
        match ast {
            AstInitializer::List(children) => {
                assert_eq!(children.len(), 3);
                let offs: Vec<i64> = children
                    .iter()
                    .map(|c| match c {
                        AstInitializer::Expression { offset, .. } => *offset,
                        _ => panic!(),
                    })
                    .collect();
                assert_eq!(offs, vec![0, 4, 8]);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn designated_array_index_reorders_cursor() {
        let mut diags = DiagnosticEngine::new();
        let elem = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        let ty = TypeFactory::array(elem.clone(), 4);
        let items = vec![
            ParsedInitializerItem::Open,
            ParsedInitializerItem::DesignatorIndex(2),
            ParsedInitializerItem::Inner(int_expr(9, &elem)),
            ParsedInitializerItem::Close,
        ];
        let (ast, _) = finalize_initializer(&mut diags, coords(), &items, &ty);
        match ast {
            AstInitializer::List(children) => {
                assert_eq!(children.len(), 1);
                match &children[0] {
                    AstInitializer::Expression { offset, .. } => assert_eq!(*offset, 8),
                    _ => panic!(),
                }
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn incomplete_array_size_resolves_from_highest_index() {
        let mut diags = DiagnosticEngine::new();
        let elem = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        let ty = TypeFactory::array(elem.clone(), UNKNOWN_SIZE);
        let items = vec![
            ParsedInitializerItem::Open,
            ParsedInitializerItem::Inner(int_expr(1, &elem)),
            ParsedInitializerItem::Separator,
            ParsedInitializerItem::Inner(int_expr(2, &elem)),
            ParsedInitializerItem::Close,
        ];
        let (_, new_ty) = finalize_initializer(&mut diags, coords(), &items, &ty);
        let new_ty = new_ty.expect("resolved size");
        match new_ty.kind() {
            TypeKind::Array(_, n) => assert_eq!(*n, 2),
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn static_initializer_constant_scalar_reports_nothing() {
        let mut diags = DiagnosticEngine::new();
        let ty = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        let leaf = AstInitializer::Expression {
            slot_type: ty.clone(),
            offset: 0,
            expression: int_expr(3, &ty),
            state: InitState::Finalized,
        };
        check_static_initializer_is_constant(&mut diags, &leaf);
        assert!(diags.diagnostics().is_empty());
    }

    #[test]
    fn static_initializer_non_constant_reports() {
        use crate::ast::{AstValueDeclaration, DeclaratorKind, ResolvedName, StorageFlags};
        use crate::symtab::VarId;
        use std::cell::RefCell;

        let mut diags = DiagnosticEngine::new();
        let ty = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        let decl = Rc::new(RefCell::new(AstValueDeclaration {
            kind: DeclaratorKind::Variable,
            ty: ty.clone(),
            name: Symbol::from("x"),
            index: 0,
            storage: StorageFlags::empty(),
            initializer: None,
            var_id: VarId(0),
        }));
        let name_ref = Rc::new(crate::ast::AstExpression {
            coords: coords(),
            kind: ExpressionKind::NameRef(Symbol::from("x"), ResolvedName::Variable(decl)),
            ty: ty.clone(),
        });
        let leaf = AstInitializer::Expression { slot_type: ty, offset: 0, expression: name_ref, state: InitState::Finalized };
        check_static_initializer_is_constant(&mut diags, &leaf);
        assert_eq!(diags.diagnostics().len(), 1);
    }

    #[test]
    fn whole_array_string_literal_expands_with_terminator() {
        let mut diags = DiagnosticEngine::new();
        let elem = TypeFactory::primitive(TypeId::S1, Qualifiers::empty());
        let ty = TypeFactory::array(elem.clone(), 8);
        let string_ty = TypeFactory::array(elem.clone(), 3);
        let s = Rc::new(crate::ast::AstExpression {
            coords: coords(),
            kind: ExpressionKind::StringConst("hi".into()),
            ty: string_ty,
        });
        let items = vec![ParsedInitializerItem::Inner(s)];
        let (ast, new_ty) = finalize_initializer(&mut diags, coords(), &items, &ty);
        assert!(new_ty.is_none());
        match ast {
            AstInitializer::List(children) => assert_eq!(children.len(), 3),
            _ => panic!("expected expanded list"),
        }
    }
}
