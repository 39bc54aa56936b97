//! Semantic analyzer helper functions (§4.6), invoked eagerly by the parser
//! as it builds each expression, declarator, and statement.

use crate::ast::{
    AssignOp, AstExpression, AstValueDeclaration, BinaryOp, ExpressionKind, ResolvedName, UnaryOp,
};
use crate::diag::{DiagKind, DiagnosticEngine};
use crate::source::Coordinates;
use crate::types::{
    type_castability, type_equality, types_equal, Castability, Qualifiers, TypeEquality, TypeFactory, TypeId,
    TypeKind, TypeRef,
};
use std::rc::Rc;

/// Integer promotion: operands narrower than `int` (`s4`) widen to `s4`
/// (§4.6 "standard C arithmetic conversions"). Enums promote the same way.
#[must_use]
pub fn integer_promote(ty: &TypeRef) -> TypeRef {
    match ty.kind() {
        TypeKind::Value(d) if d.type_id.is_integer() && d.type_id.rank() < TypeId::S4.rank() => {
            TypeFactory::primitive(TypeId::S4, Qualifiers::empty())
        }
        TypeKind::Bitfield(storage, ..) => integer_promote(storage),
        _ => ty.with_quals(ty.quals().cv()),
    }
}

/// Usual arithmetic conversion: the wider type wins; on a rank tie the
/// unsigned operand wins (§4.6).
#[must_use]
pub fn usual_arithmetic_conversion(a: &TypeRef, b: &TypeRef) -> TypeRef {
    let a = integer_promote(a);
    let b = integer_promote(b);
    let (TypeKind::Value(da), TypeKind::Value(db)) = (a.kind(), b.kind()) else {
        return a;
    };
    if da.type_id.rank() == db.type_id.rank() {
        return if da.type_id.is_unsigned_integer() { a.clone() } else { b.clone() };
    }
    if da.type_id.rank() > db.type_id.rank() {
        a.clone()
    } else {
        b.clone()
    }
}

/// Wraps `expr` in a `Cast` to `target` unless it is already exactly that
/// type; shared by every transform in this module and by the initializer
/// finalizer (§4.7), which casts each leaf to its slot type.
pub(crate) fn cast_to(expr: Rc<AstExpression>, target: &TypeRef) -> Rc<AstExpression> {
    if types_equal(&expr.ty, target) {
        return expr;
    }
    let coords = expr.coords;
    Rc::new(AstExpression { coords, kind: ExpressionKind::Cast(expr), ty: target.clone() })
}

/// `transform_binary_expression`: computes the result type of a binary
/// operator and wraps each operand in a `Cast` so both post-transform
/// operand types exactly match the operation's working type.
pub fn transform_binary_expression(
    diags: &mut DiagnosticEngine,
    coords: Coordinates,
    op: BinaryOp,
    lhs: Rc<AstExpression>,
    rhs: Rc<AstExpression>,
) -> AstExpression {
    if lhs.is_error() || rhs.is_error() {
        return AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() };
    }
    match op {
        BinaryOp::Comma => {
            let ty = rhs.ty.clone();
            return AstExpression { coords, kind: ExpressionKind::Binary(op, lhs, rhs), ty };
        }
        BinaryOp::LogAnd | BinaryOp::LogOr => {
            let ty = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
            return AstExpression { coords, kind: ExpressionKind::Binary(op, lhs, rhs), ty };
        }
        _ => {}
    }

    // Pointer arithmetic: `ptr +/- integer`, `ptr - ptr`.
    if matches!(op, BinaryOp::Add | BinaryOp::Sub) {
        if lhs.ty.is_pointer() && rhs.ty.is_integer() {
            let ty = lhs.ty.clone();
            return AstExpression { coords, kind: ExpressionKind::Binary(op, lhs, rhs), ty };
        }
        if op == BinaryOp::Add && lhs.ty.is_integer() && rhs.ty.is_pointer() {
            let ty = rhs.ty.clone();
            return AstExpression { coords, kind: ExpressionKind::Binary(op, rhs, lhs), ty };
        }
        if op == BinaryOp::Sub && lhs.ty.is_pointer() && rhs.ty.is_pointer() {
            if type_equality(&lhs.ty, &rhs.ty) == TypeEquality::NotEqual {
                diags.report(
                    DiagKind::IncompatibleCast,
                    coords,
                    vec![lhs.ty.to_string().into(), rhs.ty.to_string().into()],
                );
            }
            let ty = TypeFactory::primitive(TypeId::S8, Qualifiers::empty());
            return AstExpression { coords, kind: ExpressionKind::Binary(op, lhs, rhs), ty };
        }
    }

    if matches!(op, BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
        && (lhs.ty.is_pointer() || rhs.ty.is_pointer())
    {
        if lhs.ty.is_pointer() && rhs.ty.is_pointer() {
            if type_equality(&lhs.ty, &rhs.ty) == TypeEquality::NotEqual {
                diags.report(
                    DiagKind::IncompatibleCast,
                    coords,
                    vec![lhs.ty.to_string().into(), rhs.ty.to_string().into()],
                );
            }
        }
        let ty = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        return AstExpression { coords, kind: ExpressionKind::Binary(op, lhs, rhs), ty };
    }

    if !lhs.ty.is_arithmetic() || !rhs.ty.is_arithmetic() {
        diags.report(
            DiagKind::IncompatibleCast,
            coords,
            vec![lhs.ty.to_string().into(), rhs.ty.to_string().into()],
        );
        return AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() };
    }

    let common = usual_arithmetic_conversion(&lhs.ty, &rhs.ty);
    let lhs = cast_to(lhs, &common);
    let rhs = cast_to(rhs, &common);
    let ty = match op {
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            TypeFactory::primitive(TypeId::S4, Qualifiers::empty())
        }
        _ => common,
    };
    AstExpression { coords, kind: ExpressionKind::Binary(op, lhs, rhs), ty }
}

/// `transform_ternary_expression`: both branches are converted to their
/// usual arithmetic common type when both are arithmetic; otherwise the
/// branch types must already agree.
pub fn transform_ternary_expression(
    diags: &mut DiagnosticEngine,
    coords: Coordinates,
    cond: Rc<AstExpression>,
    then_expr: Rc<AstExpression>,
    else_expr: Rc<AstExpression>,
) -> AstExpression {
    if cond.is_error() || then_expr.is_error() || else_expr.is_error() {
        return AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() };
    }
    let (then_expr, else_expr, ty) = if then_expr.ty.is_arithmetic() && else_expr.ty.is_arithmetic() {
        let common = usual_arithmetic_conversion(&then_expr.ty, &else_expr.ty);
        (cast_to(then_expr, &common), cast_to(else_expr, &common), common)
    } else {
        if type_equality(&then_expr.ty, &else_expr.ty) == TypeEquality::NotEqual {
            diags.report(
                DiagKind::IncompatibleCast,
                coords,
                vec![then_expr.ty.to_string().into(), else_expr.ty.to_string().into()],
            );
        }
        let ty = then_expr.ty.clone();
        (then_expr, else_expr, ty)
    };
    AstExpression { coords, kind: ExpressionKind::Ternary(cond, then_expr, else_expr), ty }
}

/// `transform_assign_expression`: the right-hand side is cast to the
/// left-hand side's type; compound assignment is desugared by the caller
/// into `lhs = lhs OP rhs` before reaching here (§3 "AssignOp" doc).
pub fn transform_assign_expression(
    diags: &mut DiagnosticEngine,
    coords: Coordinates,
    lhs: Rc<AstExpression>,
    rhs: Rc<AstExpression>,
) -> AstExpression {
    if lhs.is_error() || rhs.is_error() {
        return AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() };
    }
    if !crate::ast::is_assignable_shape(&lhs) || lhs.ty.is_const() {
        diags.report(
            DiagKind::IncompatibleAssignment,
            coords,
            vec![rhs.ty.to_string().into(), lhs.ty.to_string().into()],
        );
        return AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() };
    }
    match type_castability(&lhs.ty, &rhs.ty) {
        Castability::NoCast | Castability::Implicit => {}
        Castability::Explicit => {
            diags.report(
                DiagKind::IncompatibleAssignment,
                coords,
                vec![rhs.ty.to_string().into(), lhs.ty.to_string().into()],
            );
        }
    }
    let ty = lhs.ty.clone();
    let rhs = cast_to(rhs, &ty);
    AstExpression { coords, kind: ExpressionKind::Assign(AssignOp::Assign, lhs, rhs), ty }
}

/// Default argument promotions applied to variadic call arguments beyond
/// the declared parameter list (§4.6 "Call-site adjustment").
#[must_use]
pub fn default_argument_promote(expr: Rc<AstExpression>) -> Rc<AstExpression> {
    if matches!(expr.ty.kind(), TypeKind::Value(d) if d.type_id == TypeId::F4) {
        let f8 = TypeFactory::primitive(TypeId::F8, Qualifiers::empty());
        return cast_to(expr, &f8);
    }
    if expr.ty.is_integer() {
        let s4 = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        if type_equality(&expr.ty, &s4) != TypeEquality::Equal {
            return cast_to(expr, &s4);
        }
    }
    expr
}

/// Type-check and adjust one call's argument list against the callee's
/// declared parameters (§4.6 "Call-site adjustment").
pub fn adjust_call_arguments(
    diags: &mut DiagnosticEngine,
    coords: Coordinates,
    params: &[TypeRef],
    is_variadic: bool,
    args: Vec<Rc<AstExpression>>,
) -> Vec<Rc<AstExpression>> {
    if args.len() < params.len() || (args.len() > params.len() && !is_variadic) {
        diags.report(DiagKind::UnexpectedToken, coords, vec!["argument count".into()]);
    }
    let mut out = Vec::with_capacity(args.len());
    for (i, arg) in args.into_iter().enumerate() {
        if let Some(p) = params.get(i) {
            match type_castability(p, &arg.ty) {
                Castability::NoCast => out.push(arg),
                Castability::Implicit => out.push(cast_to(arg, p)),
                Castability::Explicit => {
                    diags.report(
                        DiagKind::IncompatibleAssignment,
                        coords,
                        vec![arg.ty.to_string().into(), p.to_string().into()],
                    );
                    out.push(cast_to(arg, p));
                }
            }
        } else {
            out.push(default_argument_promote(arg));
        }
    }
    out
}

/// `compute_member`: resolve `receiver.field` (or, after deref, `->field`),
/// walking transitively into anonymous nested aggregate members via the
/// `parent` back-link (§4.6 "Member lookup").
pub fn compute_member(
    diags: &mut DiagnosticEngine,
    coords: Coordinates,
    receiver: Rc<AstExpression>,
    field: crate::intern::Symbol,
    is_arrow: bool,
) -> AstExpression {
    let struct_ty = if is_arrow {
        match receiver.ty.inner() {
            Some(t) if receiver.ty.is_pointer() => t.clone(),
            _ => {
                diags.report(DiagKind::FieldDesignatorOnNonStruct, coords, vec![]);
                return AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() };
            }
        }
    } else {
        receiver.ty.clone()
    };
    if !struct_ty.is_struct_or_union() {
        diags.report(DiagKind::FieldDesignatorOnNonStruct, coords, vec![]);
        return AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() };
    }
    let Some(def) = struct_ty.definition() else {
        diags.report(DiagKind::FieldDesignatorOnNonStruct, coords, vec![]);
        return AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() };
    };
    match def.borrow().find_member(field.as_str()) {
        Some(m) => {
            let ty = m.ty.clone();
            AstExpression { coords, kind: ExpressionKind::FieldAccess(receiver, field, is_arrow), ty }
        }
        None => {
            diags.report(DiagKind::UndeclaredIdentifier, coords, vec![field.as_str().into()]);
            AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() }
        }
    }
}

/// `&name` / `&expr`'s result type; rejects bit-fields and `register`
/// storage at the type-checking stage as §7's conversion diagnostics
/// require (`ref_of_bitfield`, `ref_of_register`).
pub fn transform_addr_of(
    diags: &mut DiagnosticEngine,
    coords: Coordinates,
    inner: Rc<AstExpression>,
) -> AstExpression {
    if matches!(inner.ty.kind(), TypeKind::Bitfield(..)) {
        diags.report(DiagKind::RefOfBitfield, coords, vec![]);
        return AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() };
    }
    if let ExpressionKind::NameRef(_, ResolvedName::Variable(decl)) = &inner.kind {
        if decl.borrow().storage.contains(crate::ast::StorageFlags::REGISTER) {
            diags.report_severity(
                crate::diag::Severity::Warning,
                DiagKind::RefOfRegister,
                coords,
                vec![],
            );
        }
    }
    let pointee = inner.ty.clone();
    let ty = TypeFactory::pointed(pointee, Qualifiers::empty());
    AstExpression { coords, kind: ExpressionKind::Unary(UnaryOp::AddrOf, inner), ty }
}

/// `*expr`'s result type: the pointee, or an array's element after decay.
pub fn transform_deref(
    diags: &mut DiagnosticEngine,
    coords: Coordinates,
    inner: Rc<AstExpression>,
) -> AstExpression {
    match inner.ty.inner() {
        Some(t) if inner.ty.is_pointer() || inner.ty.is_array() => {
            let ty = t.clone();
            AstExpression { coords, kind: ExpressionKind::Unary(UnaryOp::Deref, inner), ty }
        }
        _ => {
            diags.report(DiagKind::IncompatibleCast, coords, vec![inner.ty.to_string().into(), "pointer".into()]);
            AstExpression { coords, kind: ExpressionKind::Error, ty: TypeFactory::error() }
        }
    }
}

/// Array-to-pointer decay applied to a name-ref of array type wherever an
/// rvalue is required (§9 "Mutable AST transformation": "replacing name-ref
/// of an array with pointer-to-first-element").
#[must_use]
pub fn decay_array_to_pointer(expr: Rc<AstExpression>) -> Rc<AstExpression> {
    if !expr.ty.is_array() {
        return expr;
    }
    let Some(elem) = expr.ty.inner() else { return expr };
    let ty = TypeFactory::pointed(elem.clone(), Qualifiers::empty());
    let coords = expr.coords;
    Rc::new(AstExpression { coords, kind: ExpressionKind::Unary(UnaryOp::AddrOf, expr), ty })
}

/// Collapses `&*e` to `e` in place, per the §9 design note's example
/// rewrite; returns the original node unchanged if the shape doesn't match.
#[must_use]
pub fn collapse_addr_of_deref(expr: Rc<AstExpression>) -> Rc<AstExpression> {
    if let ExpressionKind::Unary(UnaryOp::AddrOf, inner) = &expr.kind {
        if let ExpressionKind::Unary(UnaryOp::Deref, innermost) = &inner.kind {
            return innermost.clone();
        }
    }
    expr
}

/// `return_type_check` (§4.6): an expression-bearing `return` inside a
/// `void` function reports; a bare `return;` inside a non-`void` function
/// reports; otherwise the expression is cast to the declared return type.
pub fn check_return(
    diags: &mut DiagnosticEngine,
    coords: Coordinates,
    declared_return: &TypeRef,
    expr: Option<Rc<AstExpression>>,
) -> Option<Rc<AstExpression>> {
    match (declared_return.is_void(), expr) {
        (true, Some(e)) => {
            diags.report(DiagKind::IncompatibleAssignment, coords, vec!["void".into(), e.ty.to_string().into()]);
            None
        }
        (false, None) => {
            diags.report(
                DiagKind::IncompatibleAssignment,
                coords,
                vec![declared_return.to_string().into(), "void".into()],
            );
            None
        }
        (true, None) => None,
        (false, Some(e)) => Some(cast_to(e, declared_return)),
    }
}

/// Per-function goto/label bookkeeping (§4.6 "Goto/label verification").
#[derive(Debug, Default)]
pub struct LabelTracker {
    defined: std::collections::HashSet<String>,
    used: Vec<(String, Coordinates)>,
}

impl LabelTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, diags: &mut DiagnosticEngine, coords: Coordinates, name: &str) {
        if !self.defined.insert(name.to_string()) {
            diags.report(DiagKind::LabelRedefinition, coords, vec![name.into()]);
        }
    }

    pub fn use_label(&mut self, coords: Coordinates, name: &str) {
        self.used.push((name.to_string(), coords));
    }

    /// Call at function end: any label referenced but never defined is
    /// reported once.
    pub fn finish(&self, diags: &mut DiagnosticEngine) {
        for (name, coords) in &self.used {
            if !self.defined.contains(name) {
                diags.report(DiagKind::UndeclaredLabel, *coords, vec![name.clone().into()]);
            }
        }
    }
}

/// Per-switch bookkeeping: case-value uniqueness and at most one `default`
/// (§4.6 "Switch verification").
#[derive(Debug, Default)]
pub struct SwitchTracker {
    seen_cases: std::collections::HashSet<i64>,
    has_default: bool,
}

impl SwitchTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_case(&mut self, diags: &mut DiagnosticEngine, coords: Coordinates, value: i64) {
        if !self.seen_cases.insert(value) {
            diags.report(DiagKind::DuplicateCase, coords, vec![value.into()]);
        }
    }

    pub fn add_default(&mut self, diags: &mut DiagnosticEngine, coords: Coordinates) {
        if self.has_default {
            diags.report(DiagKind::MultipleDefault, coords, vec![]);
        }
        self.has_default = true;
    }
}

/// VLA dimension materialization (§4.6 "VLA size materialization"): a
/// non-constant size expression becomes a synthesized hidden local of
/// integer type, computed once at the VLA's declaration point.
#[must_use]
pub fn materialize_vla_dimension(
    var_ids: &mut crate::symtab::VarIdGen,
    element: TypeRef,
) -> (TypeRef, crate::symtab::VarId) {
    let size_var = var_ids.next();
    (TypeFactory::vla(element, size_var), size_var)
}

/// Whether `decl`'s type is already complete, used to gate a local
/// declaration's legality (`sizeof`/definition completeness checks share
/// this predicate throughout §4.6).
#[must_use]
pub fn declaration_is_complete(decl: &AstValueDeclaration) -> bool {
    decl.ty.is_complete()
}

/// `is_va_list_Type` (§4.9 "Function": first `__builtin_va_arg` argument
/// must be `va_list`): `ty` qualifies iff it names the same builtin
/// `va_list` aggregate the parser pre-declares in the root scope
/// (`ParserContext::va_list_def`), compared by definition identity so a
/// `typedef va_list T;` alias still matches.
#[must_use]
pub fn is_va_list_type(ty: &TypeRef, va_list_def: &crate::types::TypeDefRef) -> bool {
    match ty.definition() {
        Some(def) => Rc::ptr_eq(&def, va_list_def),
        None => false,
    }
}
