//! The type-checked AST (§3 "AstExpression", "AstStatement", ...).
//!
//! Nodes are `Rc`-shared (see `arena.rs` module docs) rather than arena
//! borrowed. The semantic analyzer's in-place rewrites (§9 "Mutable AST
//! transformation" design note - inserting casts, collapsing `&*e`,
//! decaying array name-refs to pointers) are realized exactly as that note
//! prescribes: a transform allocates a *replacement* `Rc<AstExpression>`
//! and the caller rebinds its local handle to it, rather than mutating a
//! node another handle might still be observing.

use crate::intern::Symbol;
use crate::source::Coordinates;
use crate::symtab::VarId;
use crate::types::TypeRef;
use std::cell::RefCell;
use std::rc::Rc;

pub type ExprId = Rc<AstExpression>;
pub type StmtId = Rc<AstStatement>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    BitNot,
    LogNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    Deref,
    AddrOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Comma,
}

/// `=` and the compound-assignment operators; compound assignment is
/// desugared by the parser into `x = x OP y` with a single evaluation of
/// `x`'s address, matching `transformAssignExpression`'s role in §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
}

/// A resolved reference to a previously-declared symbol (§3 "name reference
/// (to a resolved symbol)").
#[derive(Debug, Clone)]
pub enum ResolvedName {
    Variable(Rc<RefCell<AstValueDeclaration>>),
    Function(Rc<RefCell<AstFunctionDeclaration>>),
    EnumConstant(i64),
    /// Lookup failed; already diagnosed at the reference site.
    Unresolved,
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    IntConst(i64),
    FloatConst(f64),
    StringConst(String),
    NameRef(Symbol, ResolvedName),
    Unary(UnaryOp, ExprId),
    Binary(BinaryOp, ExprId, ExprId),
    Assign(AssignOp, ExprId, ExprId),
    Ternary(ExprId, ExprId, ExprId),
    Cast(ExprId),
    Call(ExprId, Vec<ExprId>),
    FieldAccess(ExprId, Symbol, bool),
    ArrayAccess(ExprId, ExprId),
    CompoundLiteral(Box<AstInitializer>),
    /// GNU statement expression `({ ...; expr })`, used for the IR builder's
    /// treatment of blocks that yield a value.
    BlockExpr(Vec<StmtId>, Option<ExprId>),
    LabelRef(Symbol),
    VaArg(ExprId),
    Paren(ExprId),
    /// Implicit sign/zero-extension of a bit-field load from its narrow
    /// storage representation out to its declared width (§3).
    BitExtend(ExprId),
    Error,
}

#[derive(Debug, Clone)]
pub struct AstExpression {
    pub coords: Coordinates,
    pub kind: ExpressionKind,
    pub ty: TypeRef,
}

impl AstExpression {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.kind, ExpressionKind::Error) || self.ty.is_error()
    }
}

/// `computeMemberDeclarator`-style lookup result and assignability share
/// one predicate; §4.6 "Assignability check" enumerates exactly these
/// shapes.
#[must_use]
pub fn is_assignable_shape(expr: &AstExpression) -> bool {
    match &expr.kind {
        ExpressionKind::NameRef(_, ResolvedName::Variable(_)) => !expr.ty.is_array() && !expr.ty.is_function(),
        ExpressionKind::Unary(UnaryOp::Deref, _)
        | ExpressionKind::FieldAccess(..)
        | ExpressionKind::ArrayAccess(..) => true,
        ExpressionKind::Paren(inner) => is_assignable_shape(inner),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaratorKind {
    Variable,
    Parameter,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StorageFlags: u32 {
        const STATIC   = 1 << 0;
        const EXTERN   = 1 << 1;
        const REGISTER = 1 << 2;
        const TYPEDEF  = 1 << 3;
        const AUTO     = 1 << 4;
    }
}

/// `AstValueDeclaration` (§3). `next` (a linked-list pointer in the
/// original) is dropped: declarator lists are plain `Vec`s at the
/// declaration-statement level, which is the idiomatic Rust shape for a
/// sibling chain that doesn't need to be split or reordered in place.
#[derive(Debug, Clone)]
pub struct AstValueDeclaration {
    pub kind: DeclaratorKind,
    pub ty: TypeRef,
    pub name: Symbol,
    pub index: u32,
    pub storage: StorageFlags,
    pub initializer: Option<AstInitializer>,
    pub var_id: VarId,
}

impl AstValueDeclaration {
    #[cfg(test)]
    pub fn dummy_for_tests() -> Self {
        use crate::types::{Qualifiers, TypeFactory, TypeId};
        AstValueDeclaration {
            kind: DeclaratorKind::Variable,
            ty: TypeFactory::primitive(TypeId::S4, Qualifiers::empty()),
            name: crate::intern::Interner::new().intern("dummy"),
            index: 0,
            storage: StorageFlags::empty(),
            initializer: None,
            var_id: VarId(0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AstFunctionDeclaration {
    pub name: Symbol,
    pub ty: TypeRef,
    pub params: Vec<Rc<RefCell<AstValueDeclaration>>>,
    pub is_variadic: bool,
    pub body: Option<StmtId>,
    pub storage: StorageFlags,
    /// Hidden local synthesized for variadic definitions to spill
    /// register-passed arguments (§4.5 "Function definition vs. declaration").
    pub va_area: Option<VarId>,
}

#[derive(Debug, Clone)]
pub struct EnumConstantDecl {
    pub name: Symbol,
    pub value: i64,
}

/// One entry in the linear designated-initializer token stream the parser
/// emits (§4.5 "Designated initializers"); consumed by `initializer.rs`.
#[derive(Debug, Clone)]
pub enum ParsedInitializerItem {
    Open,
    Close,
    Separator,
    Inner(ExprId),
    DesignatorIndex(i64),
    DesignatorField(Symbol),
}

/// Whether a finalized initializer leaf has already been visited; supports
/// the idempotence property (§8: "Finalizing an already-finalized
/// initializer is the identity").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Pending,
    Finalized,
}

/// Post-finalization `AstInitializer` (§3): a tree whose leaves carry an
/// absolute byte `offset` from the top-level object's base.
#[derive(Debug, Clone)]
pub enum AstInitializer {
    Expression { slot_type: TypeRef, offset: i64, expression: ExprId, state: InitState },
    List(Vec<AstInitializer>),
}

impl AstInitializer {
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        match self {
            AstInitializer::Expression { state, .. } => *state == InitState::Finalized,
            AstInitializer::List(children) => children.iter().all(AstInitializer::is_finalized),
        }
    }
}

#[derive(Debug, Clone)]
pub enum JumpKind {
    GotoLabel(Symbol),
    GotoExpr(ExprId),
    Continue,
    Break,
    Return(Option<ExprId>),
}

#[derive(Debug, Clone)]
pub enum LabelKind {
    Named(Symbol),
    Case(i64),
    Default,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Block(Vec<StmtId>),
    Expression(ExprId),
    If { cond: ExprId, then_branch: StmtId, else_branch: Option<StmtId> },
    Switch { cond: ExprId, body: StmtId },
    While { cond: ExprId, body: StmtId },
    DoWhile { body: StmtId, cond: ExprId },
    For { init: Option<StmtId>, cond: Option<ExprId>, step: Option<ExprId>, body: StmtId },
    Jump(JumpKind),
    Labeled { label: LabelKind, inner: StmtId },
    Declaration(Vec<Rc<RefCell<AstValueDeclaration>>>),
    Empty,
    Error,
}

#[derive(Debug, Clone)]
pub struct AstStatement {
    pub coords: Coordinates,
    pub kind: StatementKind,
}

/// A parsed (not yet finalized) translation unit: top-level declarations
/// and function definitions, plus every named type definition reached
/// while parsing (the "type-definition list" of §2).
#[derive(Default)]
pub struct TranslationUnit {
    pub functions: Vec<Rc<RefCell<AstFunctionDeclaration>>>,
    pub globals: Vec<Rc<RefCell<AstValueDeclaration>>>,
}
