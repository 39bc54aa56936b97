//! AST → CFG lowering (§4.9 steps 1-3).
//!
//! A `Builder` holds "current position" state (`cur_block`, a fresh-vreg
//! counter) and a handful of
//! `new_block`/`cur_block`/`emit` primitives that every lowering function
//! calls into, rather than threading block state through every recursive
//! call explicitly.

use crate::ast::{
    AssignOp, AstExpression, AstFunctionDeclaration, AstInitializer, AstStatement, BinaryOp,
    ExprId, ExpressionKind, JumpKind, LabelKind, ResolvedName, StatementKind, StmtId, UnaryOp,
};
use crate::intern::Symbol;
use crate::ir::{
    BlockId, ConstValue, DomInfo, IrBasicBlock, IrFunction, IrInstrKind, IrInstruction, IrOperand,
    LocalSlot, OperandKind, VRegId,
};
use crate::source::Coordinates;
use crate::symtab::{VarId, VarIdGen};
use crate::types::{compute_type_size, Qualifiers, TypeFactory, TypeId, TypeKind, TypeRef};
use smallvec::{smallvec, SmallVec};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Register-save-area size synthesized for variadic definitions; a
/// placeholder since no caller of this crate contributes the target ABI's
/// real register count (see DESIGN.md).
const VA_AREA_BYTES: i64 = 48;

struct LoopCtx {
    continue_target: BlockId,
}

struct SwitchCtx {
    /// Maps a `Labeled{Case|Default, ..}` node (by identity) reached while
    /// lowering this switch's body to the block pre-assigned to it.
    labels: HashMap<*const AstStatement, BlockId>,
}

struct Builder<'v> {
    var_ids: &'v mut VarIdGen,
    vla_sizes: &'v HashMap<VarId, ExprId>,
    blocks: Vec<IrBasicBlock>,
    cur: BlockId,
    next_vreg: u32,
    locals: Vec<LocalSlot>,
    label_blocks: HashMap<Symbol, BlockId>,
    loops: Vec<LoopCtx>,
    switches: Vec<SwitchCtx>,
    /// Innermost-last stack of `break` targets, pushed by both loops and
    /// `switch` so `break` always resolves to whichever is innermost
    /// regardless of which kind of construct that is.
    break_stack: Vec<BlockId>,
    exit_block: Option<BlockId>,
    return_operand: Option<IrOperand>,
}

impl<'v> Builder<'v> {
    fn new_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(IrBasicBlock {
            id,
            name: name.into(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            instructions: Vec::new(),
            dominators: DomInfo::default(),
        });
        id
    }

    fn cur_block(&mut self) -> &mut IrBasicBlock {
        &mut self.blocks[self.cur.0 as usize]
    }

    fn emit(&mut self, kind: IrInstrKind, uses: SmallVec<[IrOperand; 3]>, defs: SmallVec<[IrOperand; 1]>, coords: Coordinates) {
        self.cur_block().instructions.push(IrInstruction { kind, uses, defs, coords });
    }

    fn set_successors(&mut self, succs: Vec<BlockId>) {
        self.cur_block().successors = succs;
    }

    fn fresh_vreg(&mut self, ty: TypeRef) -> IrOperand {
        let id = VRegId(self.next_vreg);
        self.next_vreg += 1;
        IrOperand::vreg(id, ty)
    }

    fn fresh_temp_local(&mut self, ty: TypeRef, purpose: &str) -> VarId {
        let var_id = self.var_ids.next();
        self.locals.push(LocalSlot {
            var_id,
            ty,
            name: Symbol::from(format!("<{purpose}${}>", var_id.0)),
            referenced: false,
        });
        var_id
    }

    fn label_block(&mut self, name: Symbol) -> BlockId {
        if let Some(&id) = self.label_blocks.get(&name) {
            id
        } else {
            let id = self.new_block(format!("L${}", name.as_str()));
            self.label_blocks.insert(name, id);
            id
        }
    }

    fn exit_block(&mut self) -> BlockId {
        if let Some(id) = self.exit_block {
            id
        } else {
            let id = self.new_block("exit");
            self.exit_block = Some(id);
            id
        }
    }

    // ---- statement lowering ----------------------------------------

    fn lower_stmt_seq(&mut self, stmts: &[StmtId]) {
        for (i, s) in stmts.iter().enumerate() {
            if self.cur_block().is_terminated() && i > 0 {
                let fresh = self.new_block("unreachable");
                self.cur = fresh;
            }
            self.lower_stmt(s);
        }
    }

    fn lower_stmt(&mut self, stmt: &AstStatement) {
        match &stmt.kind {
            StatementKind::Block(stmts) => self.lower_stmt_seq(stmts),
            StatementKind::Expression(e) => {
                self.lower_expr(e);
            }
            StatementKind::Empty => {}
            StatementKind::Error => {
                self.emit(IrInstrKind::Bad, smallvec![], smallvec![], stmt.coords);
            }
            StatementKind::Declaration(decls) => {
                for decl in decls {
                    self.lower_declaration(decl, stmt.coords);
                }
            }
            StatementKind::If { cond, then_branch, else_branch } => {
                self.lower_if(cond, then_branch, else_branch.as_ref(), stmt.coords);
            }
            StatementKind::While { cond, body } => self.lower_while(cond, body, stmt.coords),
            StatementKind::DoWhile { body, cond } => self.lower_do_while(body, cond, stmt.coords),
            StatementKind::For { init, cond, step, body } => {
                self.lower_for(init.as_ref(), cond.as_ref(), step.as_ref(), body, stmt.coords)
            }
            StatementKind::Switch { cond, body } => self.lower_switch(cond, body, stmt.coords),
            StatementKind::Labeled { label, inner } => self.lower_labeled(label, inner, stmt),
            StatementKind::Jump(kind) => self.lower_jump(kind, stmt.coords),
        }
    }

    fn lower_declaration(&mut self, decl: &Rc<RefCell<crate::ast::AstValueDeclaration>>, coords: Coordinates) {
        let (ty, var_id, initializer) = {
            let d = decl.borrow();
            (d.ty.clone(), d.var_id, d.initializer.clone())
        };
        let mut vla_vars = Vec::new();
        collect_vla_vars(&ty, &mut vla_vars);
        for v in vla_vars {
            if let Some(size_expr) = self.vla_sizes.get(&v) {
                let size_expr = size_expr.clone();
                let operand = self.lower_expr(&size_expr);
                let u8_ty = TypeFactory::primitive(TypeId::U8, Qualifiers::empty());
                self.emit(
                    IrInstrKind::Store,
                    smallvec![IrOperand::local(v, u8_ty), operand],
                    smallvec![],
                    coords,
                );
            }
        }
        if let Some(init) = initializer {
            self.lower_initializer(&init, var_id, ty, coords);
        }
    }

    fn lower_initializer(&mut self, init: &AstInitializer, var_id: VarId, var_ty: TypeRef, coords: Coordinates) {
        match init {
            AstInitializer::Expression { offset, expression, .. } => {
                let value = self.lower_expr(expression);
                let addr = IrOperand::new(
                    OperandKind::Memory(Box::new(IrOperand::local(var_id, var_ty)), *offset),
                    value.ty.clone(),
                );
                self.emit(IrInstrKind::Store, smallvec![addr, value], smallvec![], coords);
            }
            AstInitializer::List(children) => {
                for child in children {
                    self.lower_initializer(child, var_id, var_ty.clone(), coords);
                }
            }
        }
    }

    fn lower_if(&mut self, cond: &ExprId, then_branch: &StmtId, else_branch: Option<&StmtId>, coords: Coordinates) {
        let then_id = self.new_block("then");
        let else_target = else_branch.map(|_| self.new_block("else"));
        let merge_id = self.new_block("merge");
        let fallback = else_target.unwrap_or(merge_id);

        let cond_operand = self.lower_expr(cond);
        self.emit(
            IrInstrKind::CBranch { then_block: then_id, else_block: fallback },
            smallvec![cond_operand],
            smallvec![],
            coords,
        );
        self.set_successors(vec![then_id, fallback]);

        self.cur = then_id;
        self.lower_stmt(then_branch);
        if !self.cur_block().is_terminated() {
            self.emit(IrInstrKind::Branch(merge_id), smallvec![], smallvec![], coords);
            self.set_successors(vec![merge_id]);
        }

        if let (Some(else_id), Some(else_stmt)) = (else_target, else_branch) {
            self.cur = else_id;
            self.lower_stmt(else_stmt);
            if !self.cur_block().is_terminated() {
                self.emit(IrInstrKind::Branch(merge_id), smallvec![], smallvec![], coords);
                self.set_successors(vec![merge_id]);
            }
        }

        self.cur = merge_id;
    }

    fn lower_while(&mut self, cond: &ExprId, body: &StmtId, coords: Coordinates) {
        let header = self.new_block("while.cond");
        let body_id = self.new_block("while.body");
        let exit_id = self.new_block("while.exit");

        self.emit(IrInstrKind::Branch(header), smallvec![], smallvec![], coords);
        self.set_successors(vec![header]);

        self.cur = header;
        let cond_operand = self.lower_expr(cond);
        self.emit(
            IrInstrKind::CBranch { then_block: body_id, else_block: exit_id },
            smallvec![cond_operand],
            smallvec![],
            coords,
        );
        self.set_successors(vec![body_id, exit_id]);

        self.cur = body_id;
        self.loops.push(LoopCtx { continue_target: header });
        self.break_stack.push(exit_id);
        self.lower_stmt(body);
        self.loops.pop();
        self.break_stack.pop();
        if !self.cur_block().is_terminated() {
            self.emit(IrInstrKind::Branch(header), smallvec![], smallvec![], coords);
            self.set_successors(vec![header]);
        }

        self.cur = exit_id;
    }

    fn lower_do_while(&mut self, body: &StmtId, cond: &ExprId, coords: Coordinates) {
        let body_id = self.new_block("do.body");
        let cond_id = self.new_block("do.cond");
        let exit_id = self.new_block("do.exit");

        self.emit(IrInstrKind::Branch(body_id), smallvec![], smallvec![], coords);
        self.set_successors(vec![body_id]);

        self.cur = body_id;
        self.loops.push(LoopCtx { continue_target: cond_id });
        self.break_stack.push(exit_id);
        self.lower_stmt(body);
        self.loops.pop();
        self.break_stack.pop();
        if !self.cur_block().is_terminated() {
            self.emit(IrInstrKind::Branch(cond_id), smallvec![], smallvec![], coords);
            self.set_successors(vec![cond_id]);
        }

        self.cur = cond_id;
        let cond_operand = self.lower_expr(cond);
        self.emit(
            IrInstrKind::CBranch { then_block: body_id, else_block: exit_id },
            smallvec![cond_operand],
            smallvec![],
            coords,
        );
        self.set_successors(vec![body_id, exit_id]);

        self.cur = exit_id;
    }

    fn lower_for(
        &mut self,
        init: Option<&StmtId>,
        cond: Option<&ExprId>,
        step: Option<&ExprId>,
        body: &StmtId,
        coords: Coordinates,
    ) {
        if let Some(init) = init {
            self.lower_stmt(init);
        }
        let header = self.new_block("for.cond");
        let body_id = self.new_block("for.body");
        let step_id = self.new_block("for.step");
        let exit_id = self.new_block("for.exit");

        self.emit(IrInstrKind::Branch(header), smallvec![], smallvec![], coords);
        self.set_successors(vec![header]);

        self.cur = header;
        if let Some(cond) = cond {
            let cond_operand = self.lower_expr(cond);
            self.emit(
                IrInstrKind::CBranch { then_block: body_id, else_block: exit_id },
                smallvec![cond_operand],
                smallvec![],
                coords,
            );
            self.set_successors(vec![body_id, exit_id]);
        } else {
            self.emit(IrInstrKind::Branch(body_id), smallvec![], smallvec![], coords);
            self.set_successors(vec![body_id]);
        }

        self.cur = body_id;
        self.loops.push(LoopCtx { continue_target: step_id });
        self.break_stack.push(exit_id);
        self.lower_stmt(body);
        self.loops.pop();
        self.break_stack.pop();
        if !self.cur_block().is_terminated() {
            self.emit(IrInstrKind::Branch(step_id), smallvec![], smallvec![], coords);
            self.set_successors(vec![step_id]);
        }

        self.cur = step_id;
        if let Some(step) = step {
            self.lower_expr(step);
        }
        self.emit(IrInstrKind::Branch(header), smallvec![], smallvec![], coords);
        self.set_successors(vec![header]);

        self.cur = exit_id;
    }

    fn lower_switch(&mut self, cond: &ExprId, body: &StmtId, coords: Coordinates) {
        let mut found = Vec::new();
        collect_switch_labels(body, &mut found);

        let mut labels = HashMap::new();
        let mut table = Vec::new();
        let mut default_block = None;
        for (kind, ptr) in &found {
            match kind {
                LabelKind::Case(v) => {
                    let blk = self.new_block(format!("case.{v}"));
                    labels.insert(*ptr, blk);
                    table.push((*v, blk));
                }
                LabelKind::Default => {
                    let blk = self.new_block("default");
                    labels.insert(*ptr, blk);
                    default_block = Some(blk);
                }
                LabelKind::Named(_) => unreachable!("collect_switch_labels only yields case/default"),
            }
        }

        let exit_id = self.new_block("switch.exit");
        let default_target = default_block.unwrap_or(exit_id);

        let cond_operand = self.lower_expr(cond);
        let mut succs: Vec<BlockId> = table.iter().map(|(_, b)| *b).collect();
        succs.push(default_target);
        self.emit(
            IrInstrKind::TBranch { cases: table, default: default_target },
            smallvec![cond_operand],
            smallvec![],
            coords,
        );
        self.set_successors(succs);

        let dead_entry = self.new_block("switch.dead");
        self.cur = dead_entry;
        self.switches.push(SwitchCtx { labels });
        self.break_stack.push(exit_id);
        self.lower_stmt(body);
        self.switches.pop();
        self.break_stack.pop();
        if !self.cur_block().is_terminated() {
            self.emit(IrInstrKind::Branch(exit_id), smallvec![], smallvec![], coords);
            self.set_successors(vec![exit_id]);
        }

        self.cur = exit_id;
    }

    fn lower_labeled(&mut self, label: &LabelKind, inner: &StmtId, stmt: &AstStatement) {
        match label {
            LabelKind::Named(name) => {
                let target = self.label_block(name.clone());
                if !self.cur_block().is_terminated() {
                    self.emit(IrInstrKind::Branch(target), smallvec![], smallvec![], stmt.coords);
                    self.set_successors(vec![target]);
                }
                self.cur = target;
            }
            LabelKind::Case(_) | LabelKind::Default => {
                let ptr = std::ptr::from_ref(stmt);
                let target = self
                    .switches
                    .last()
                    .and_then(|s| s.labels.get(&ptr).copied())
                    .expect("case/default label pre-assigned by lower_switch");
                if !self.cur_block().is_terminated() {
                    self.emit(IrInstrKind::Branch(target), smallvec![], smallvec![], stmt.coords);
                    self.set_successors(vec![target]);
                }
                self.cur = target;
            }
        }
        self.lower_stmt(inner);
    }

    fn lower_jump(&mut self, kind: &JumpKind, coords: Coordinates) {
        match kind {
            JumpKind::Break => {
                let target = *self.break_stack.last().expect("break outside loop/switch rejected by sema");
                self.emit(IrInstrKind::Branch(target), smallvec![], smallvec![], coords);
                self.set_successors(vec![target]);
            }
            JumpKind::Continue => {
                let target = self.loops.last().expect("continue outside loop rejected by sema").continue_target;
                self.emit(IrInstrKind::Branch(target), smallvec![], smallvec![], coords);
                self.set_successors(vec![target]);
            }
            JumpKind::GotoLabel(name) => {
                let target = self.label_block(name.clone());
                self.emit(IrInstrKind::Branch(target), smallvec![], smallvec![], coords);
                self.set_successors(vec![target]);
            }
            JumpKind::GotoExpr(e) => {
                let operand = self.lower_expr(e);
                self.emit(IrInstrKind::IndirectBranch, smallvec![operand], smallvec![], coords);
                self.set_successors(vec![]);
            }
            JumpKind::Return(expr) => {
                if let Some(e) = expr {
                    let value = self.lower_expr(e);
                    if let Some(ret) = self.return_operand.clone() {
                        self.emit(IrInstrKind::Store, smallvec![ret, value], smallvec![], coords);
                    }
                }
                let exit = self.exit_block();
                self.emit(IrInstrKind::Return, smallvec![], smallvec![], coords);
                self.set_successors(vec![exit]);
            }
        }
    }

    // ---- expression lowering ----------------------------------------

    fn lower_lvalue_address(&mut self, expr: &AstExpression) -> IrOperand {
        match &expr.kind {
            ExpressionKind::NameRef(_, ResolvedName::Variable(decl)) => {
                let var_id = decl.borrow().var_id;
                IrOperand::local(var_id, expr.ty.clone())
            }
            ExpressionKind::Unary(UnaryOp::Deref, inner) => self.lower_expr(inner),
            ExpressionKind::FieldAccess(base, field, is_arrow) => {
                let (base_addr, member_offset, member_ty) = self.field_address(base, field.clone(), *is_arrow);
                offset_operand(base_addr, member_offset, member_ty)
            }
            ExpressionKind::ArrayAccess(base, index) => self.array_element_address(base, index, &expr.ty),
            ExpressionKind::Paren(inner) => self.lower_lvalue_address(inner),
            _ => self.lower_expr(expr),
        }
    }

    fn field_address(&mut self, base: &ExprId, field: Symbol, is_arrow: bool) -> (IrOperand, i64, TypeRef) {
        let struct_ty = if is_arrow {
            base.ty.inner().cloned().unwrap_or_else(TypeFactory::error)
        } else {
            base.ty.clone()
        };
        let (offset, member_ty) = struct_ty
            .definition()
            .and_then(|def| {
                let d = def.borrow();
                d.find_member(field.as_str()).map(|m| (m.offset, m.ty.clone()))
            })
            .unwrap_or((0, TypeFactory::error()));
        let base_addr = if is_arrow { self.lower_expr(base) } else { self.lower_lvalue_address(base) };
        (base_addr, offset, member_ty)
    }

    fn array_element_address(&mut self, base: &ExprId, index: &ExprId, elem_ty: &TypeRef) -> IrOperand {
        let base_operand = self.lower_expr(base);
        let index_operand = self.lower_expr(index);
        let elem_size = compute_type_size(elem_ty).max(1);
        let size_ty = TypeFactory::primitive(TypeId::S8, Qualifiers::empty());
        let scaled = self.fresh_vreg(size_ty.clone());
        self.emit(
            IrInstrKind::Binary(BinaryOp::Mul),
            smallvec![index_operand, IrOperand::const_int(elem_size, size_ty.clone())],
            smallvec![scaled.clone()],
            base.coords,
        );
        let ptr_ty = TypeFactory::pointed(elem_ty.clone(), Qualifiers::empty());
        let addr = self.fresh_vreg(ptr_ty);
        self.emit(
            IrInstrKind::Binary(BinaryOp::Add),
            smallvec![base_operand, scaled],
            smallvec![addr.clone()],
            base.coords,
        );
        IrOperand::new(OperandKind::Memory(Box::new(addr), 0), elem_ty.clone())
    }

    fn lower_expr(&mut self, expr: &AstExpression) -> IrOperand {
        let coords = expr.coords;
        match &expr.kind {
            ExpressionKind::IntConst(i) => IrOperand::new(OperandKind::Const(ConstValue::Int(*i)), expr.ty.clone()),
            ExpressionKind::FloatConst(f) => IrOperand::new(OperandKind::Const(ConstValue::Float(*f)), expr.ty.clone()),
            ExpressionKind::StringConst(s) => {
                IrOperand::new(OperandKind::Const(ConstValue::Str(s.clone())), expr.ty.clone())
            }
            ExpressionKind::NameRef(name, resolved) => match resolved {
                ResolvedName::Function(_) => IrOperand::new(OperandKind::Reference(name.clone()), expr.ty.clone()),
                ResolvedName::EnumConstant(v) => {
                    IrOperand::new(OperandKind::Const(ConstValue::Int(*v)), expr.ty.clone())
                }
                ResolvedName::Variable(decl) => {
                    let var_id = decl.borrow().var_id;
                    let vreg = self.fresh_vreg(expr.ty.clone());
                    self.emit(
                        IrInstrKind::Load,
                        smallvec![IrOperand::local(var_id, expr.ty.clone())],
                        smallvec![vreg.clone()],
                        coords,
                    );
                    vreg
                }
                ResolvedName::Unresolved => {
                    self.emit(IrInstrKind::Bad, smallvec![], smallvec![], coords);
                    IrOperand::new(OperandKind::Const(ConstValue::Int(0)), expr.ty.clone())
                }
            },
            ExpressionKind::Unary(op, inner) => self.lower_unary(*op, inner, &expr.ty, coords),
            ExpressionKind::Binary(BinaryOp::LogAnd, l, r) => self.lower_short_circuit(true, l, r, &expr.ty, coords),
            ExpressionKind::Binary(BinaryOp::LogOr, l, r) => self.lower_short_circuit(false, l, r, &expr.ty, coords),
            ExpressionKind::Binary(BinaryOp::Comma, l, r) => {
                self.lower_expr(l);
                self.lower_expr(r)
            }
            ExpressionKind::Binary(op, l, r) => {
                let lhs = self.lower_expr(l);
                let rhs = self.lower_expr(r);
                let dest = self.fresh_vreg(expr.ty.clone());
                self.emit(IrInstrKind::Binary(*op), smallvec![lhs, rhs], smallvec![dest.clone()], coords);
                dest
            }
            ExpressionKind::Assign(op, l, r) => self.lower_assign(*op, l, r, coords),
            ExpressionKind::Ternary(c, t, f) => self.lower_ternary(c, t, f, &expr.ty, coords),
            ExpressionKind::Cast(inner) => {
                let value = self.lower_expr(inner);
                let dest = self.fresh_vreg(expr.ty.clone());
                self.emit(IrInstrKind::Cast, smallvec![value], smallvec![dest.clone()], coords);
                dest
            }
            ExpressionKind::Call(callee, args) => self.lower_call(callee, args, &expr.ty, coords),
            ExpressionKind::FieldAccess(base, field, is_arrow) => {
                let (base_addr, offset, member_ty) = self.field_address(base, field.clone(), *is_arrow);
                let addr = offset_operand(base_addr, offset, member_ty);
                let dest = self.fresh_vreg(expr.ty.clone());
                self.emit(IrInstrKind::Load, smallvec![addr], smallvec![dest.clone()], coords);
                dest
            }
            ExpressionKind::ArrayAccess(base, index) => {
                let addr = self.array_element_address(base, index, &expr.ty);
                let dest = self.fresh_vreg(expr.ty.clone());
                self.emit(IrInstrKind::Load, smallvec![addr], smallvec![dest.clone()], coords);
                dest
            }
            ExpressionKind::CompoundLiteral(init) => {
                let local = self.fresh_temp_local(expr.ty.clone(), "compound");
                self.lower_initializer(init, local, expr.ty.clone(), coords);
                IrOperand::local(local, expr.ty.clone())
            }
            ExpressionKind::BlockExpr(stmts, tail) => {
                self.lower_stmt_seq(stmts);
                match tail {
                    Some(e) => self.lower_expr(e),
                    None => IrOperand::new(OperandKind::Const(ConstValue::Int(0)), expr.ty.clone()),
                }
            }
            ExpressionKind::LabelRef(sym) => IrOperand::new(OperandKind::Reference(sym.clone()), expr.ty.clone()),
            ExpressionKind::VaArg(e) => {
                let list = self.lower_expr(e);
                let dest = self.fresh_vreg(expr.ty.clone());
                self.emit(IrInstrKind::Load, smallvec![list], smallvec![dest.clone()], coords);
                dest
            }
            ExpressionKind::Paren(inner) => self.lower_expr(inner),
            ExpressionKind::BitExtend(inner) => {
                let value = self.lower_expr(inner);
                let dest = self.fresh_vreg(expr.ty.clone());
                self.emit(IrInstrKind::BitExtend, smallvec![value], smallvec![dest.clone()], coords);
                dest
            }
            ExpressionKind::Error => {
                self.emit(IrInstrKind::Bad, smallvec![], smallvec![], coords);
                IrOperand::new(OperandKind::Const(ConstValue::Int(0)), expr.ty.clone())
            }
        }
    }

    fn lower_unary(&mut self, op: UnaryOp, inner: &ExprId, ty: &TypeRef, coords: Coordinates) -> IrOperand {
        match op {
            UnaryOp::Plus => self.lower_expr(inner),
            UnaryOp::AddrOf => {
                let addr = self.lower_lvalue_address(inner);
                let dest = self.fresh_vreg(ty.clone());
                self.emit(IrInstrKind::AddrOf, smallvec![addr], smallvec![dest.clone()], coords);
                dest
            }
            UnaryOp::Deref => {
                let addr = self.lower_expr(inner);
                let dest = self.fresh_vreg(ty.clone());
                self.emit(IrInstrKind::Load, smallvec![addr], smallvec![dest.clone()], coords);
                dest
            }
            UnaryOp::Minus | UnaryOp::BitNot | UnaryOp::LogNot => {
                let value = self.lower_expr(inner);
                let dest = self.fresh_vreg(ty.clone());
                self.emit(IrInstrKind::Unary(op), smallvec![value], smallvec![dest.clone()], coords);
                dest
            }
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                let addr = self.lower_lvalue_address(inner);
                let old = self.fresh_vreg(ty.clone());
                self.emit(IrInstrKind::Load, smallvec![addr.clone()], smallvec![old.clone()], coords);
                let delta_op = if matches!(op, UnaryOp::PreInc | UnaryOp::PostInc) { BinaryOp::Add } else { BinaryOp::Sub };
                let new = self.fresh_vreg(ty.clone());
                self.emit(
                    IrInstrKind::Binary(delta_op),
                    smallvec![old.clone(), IrOperand::const_int(1, ty.clone())],
                    smallvec![new.clone()],
                    coords,
                );
                self.emit(IrInstrKind::Store, smallvec![addr, new.clone()], smallvec![], coords);
                if matches!(op, UnaryOp::PreInc | UnaryOp::PreDec) {
                    new
                } else {
                    old
                }
            }
        }
    }

    fn lower_assign(&mut self, op: AssignOp, l: &ExprId, r: &ExprId, coords: Coordinates) -> IrOperand {
        let addr = self.lower_lvalue_address(l);
        let value = match op {
            AssignOp::Assign => self.lower_expr(r),
            AssignOp::Compound(bop) => {
                let old = self.fresh_vreg(l.ty.clone());
                self.emit(IrInstrKind::Load, smallvec![addr.clone()], smallvec![old.clone()], coords);
                let rhs = self.lower_expr(r);
                let dest = self.fresh_vreg(l.ty.clone());
                self.emit(IrInstrKind::Binary(bop), smallvec![old, rhs], smallvec![dest.clone()], coords);
                dest
            }
        };
        self.emit(IrInstrKind::Store, smallvec![addr, value.clone()], smallvec![], coords);
        value
    }

    fn lower_short_circuit(&mut self, is_and: bool, l: &ExprId, r: &ExprId, ty: &TypeRef, coords: Coordinates) -> IrOperand {
        let rhs_block = self.new_block(if is_and { "and.rhs" } else { "or.rhs" });
        let short_block = self.new_block(if is_and { "and.false" } else { "or.true" });
        let merge = self.new_block(if is_and { "and.merge" } else { "or.merge" });
        let temp = self.fresh_temp_local(ty.clone(), if is_and { "land" } else { "lor" });

        let lhs = self.lower_expr(l);
        // AND: true -> still might fail, evaluate rhs; false -> short-circuit to 0.
        // OR: true -> short-circuit to 1; false -> still might succeed, evaluate rhs.
        let (then_block, else_block) = if is_and { (rhs_block, short_block) } else { (short_block, rhs_block) };
        let short_circuit_value = IrOperand::const_int(i64::from(!is_and), ty.clone());
        self.emit(
            IrInstrKind::CBranch { then_block, else_block },
            smallvec![lhs],
            smallvec![],
            coords,
        );
        self.set_successors(vec![then_block, else_block]);

        self.cur = short_block;
        self.emit(
            IrInstrKind::Store,
            smallvec![IrOperand::local(temp, ty.clone()), short_circuit_value],
            smallvec![],
            coords,
        );
        self.emit(IrInstrKind::Branch(merge), smallvec![], smallvec![], coords);
        self.set_successors(vec![merge]);

        self.cur = rhs_block;
        let rhs_value = self.lower_expr(r);
        let truthy = self.fresh_vreg(ty.clone());
        self.emit(
            IrInstrKind::Binary(BinaryOp::Ne),
            smallvec![rhs_value, IrOperand::const_int(0, ty.clone())],
            smallvec![truthy.clone()],
            coords,
        );
        self.emit(
            IrInstrKind::Store,
            smallvec![IrOperand::local(temp, ty.clone()), truthy],
            smallvec![],
            coords,
        );
        self.emit(IrInstrKind::Branch(merge), smallvec![], smallvec![], coords);
        self.set_successors(vec![merge]);

        self.cur = merge;
        let result = self.fresh_vreg(ty.clone());
        self.emit(
            IrInstrKind::Load,
            smallvec![IrOperand::local(temp, ty.clone())],
            smallvec![result.clone()],
            coords,
        );
        result
    }

    fn lower_ternary(&mut self, c: &ExprId, t: &ExprId, f: &ExprId, ty: &TypeRef, coords: Coordinates) -> IrOperand {
        let then_id = self.new_block("cond.then");
        let else_id = self.new_block("cond.else");
        let merge = self.new_block("cond.merge");
        let temp = self.fresh_temp_local(ty.clone(), "cond");

        let cond_operand = self.lower_expr(c);
        self.emit(
            IrInstrKind::CBranch { then_block: then_id, else_block: else_id },
            smallvec![cond_operand],
            smallvec![],
            coords,
        );
        self.set_successors(vec![then_id, else_id]);

        self.cur = then_id;
        let tv = self.lower_expr(t);
        self.emit(IrInstrKind::Store, smallvec![IrOperand::local(temp, ty.clone()), tv], smallvec![], coords);
        self.emit(IrInstrKind::Branch(merge), smallvec![], smallvec![], coords);
        self.set_successors(vec![merge]);

        self.cur = else_id;
        let fv = self.lower_expr(f);
        self.emit(IrInstrKind::Store, smallvec![IrOperand::local(temp, ty.clone()), fv], smallvec![], coords);
        self.emit(IrInstrKind::Branch(merge), smallvec![], smallvec![], coords);
        self.set_successors(vec![merge]);

        self.cur = merge;
        let result = self.fresh_vreg(ty.clone());
        self.emit(
            IrInstrKind::Load,
            smallvec![IrOperand::local(temp, ty.clone())],
            smallvec![result.clone()],
            coords,
        );
        result
    }

    fn lower_call(&mut self, callee: &ExprId, args: &[ExprId], ty: &TypeRef, coords: Coordinates) -> IrOperand {
        let callee_operand = self.lower_expr(callee);
        let mut uses: SmallVec<[IrOperand; 3]> = smallvec![callee_operand];
        for a in args {
            uses.push(self.lower_expr(a));
        }
        if ty.is_void() {
            self.emit(IrInstrKind::Call, uses, smallvec![], coords);
            IrOperand::new(OperandKind::Const(ConstValue::Int(0)), ty.clone())
        } else {
            let dest = self.fresh_vreg(ty.clone());
            self.emit(IrInstrKind::Call, uses, smallvec![dest.clone()], coords);
            dest
        }
    }
}

fn offset_operand(base: IrOperand, extra_offset: i64, ty: TypeRef) -> IrOperand {
    match base.kind {
        OperandKind::Memory(inner, off) => IrOperand::new(OperandKind::Memory(inner, off + extra_offset), ty),
        OperandKind::Local(var_id) => IrOperand::new(OperandKind::Memory(Box::new(IrOperand::local(var_id, ty.clone())), extra_offset), ty),
        other => IrOperand::new(OperandKind::Memory(Box::new(IrOperand::new(other, ty.clone())), extra_offset), ty),
    }
}

fn collect_vla_vars(ty: &TypeRef, out: &mut Vec<VarId>) {
    if let TypeKind::Vla(elem, var_id) = ty.kind() {
        out.push(*var_id);
        collect_vla_vars(elem, out);
    }
}

/// Walks `stmt`'s subtree collecting every `Labeled{Case|Default, ..}` node
/// reachable without crossing into a nested `Switch` (which owns its own
/// case/default namespace), in textual order.
fn collect_switch_labels<'s>(stmt: &'s AstStatement, out: &mut Vec<(LabelKind, *const AstStatement)>) {
    match &stmt.kind {
        StatementKind::Labeled { label, inner } => {
            if matches!(label, LabelKind::Case(_) | LabelKind::Default) {
                out.push((label.clone(), std::ptr::from_ref(stmt)));
            }
            collect_switch_labels(inner, out);
        }
        StatementKind::Block(stmts) => {
            for s in stmts {
                collect_switch_labels(s, out);
            }
        }
        StatementKind::If { then_branch, else_branch, .. } => {
            collect_switch_labels(then_branch, out);
            if let Some(e) = else_branch {
                collect_switch_labels(e, out);
            }
        }
        StatementKind::While { body, .. } | StatementKind::DoWhile { body, .. } | StatementKind::For { body, .. } => {
            collect_switch_labels(body, out);
        }
        StatementKind::Switch { .. } => {}
        _ => {}
    }
}

/// Collects every AST local declared transitively within `stmt`, and marks
/// any whose address is taken (§4.9 step 1).
fn collect_locals(stmt: &AstStatement, locals: &mut Vec<LocalSlot>, addr_taken: &mut std::collections::HashSet<VarId>) {
    match &stmt.kind {
        StatementKind::Declaration(decls) => {
            for decl in decls {
                let d = decl.borrow();
                locals.push(LocalSlot { var_id: d.var_id, ty: d.ty.clone(), name: d.name.clone(), referenced: false });
                let mut vla_vars = Vec::new();
                collect_vla_vars(&d.ty, &mut vla_vars);
                for v in vla_vars {
                    let u8_ty = TypeFactory::primitive(TypeId::U8, Qualifiers::empty());
                    locals.push(LocalSlot { var_id: v, ty: u8_ty, name: Symbol::from(format!("<vla${}>", v.0)), referenced: false });
                }
                if let Some(init) = &d.initializer {
                    collect_addr_taken_in_initializer(init, addr_taken);
                }
            }
        }
        StatementKind::Block(stmts) => {
            for s in stmts {
                collect_locals(s, locals, addr_taken);
            }
        }
        StatementKind::Expression(e) => collect_addr_taken(e, addr_taken),
        StatementKind::If { cond, then_branch, else_branch } => {
            collect_addr_taken(cond, addr_taken);
            collect_locals(then_branch, locals, addr_taken);
            if let Some(e) = else_branch {
                collect_locals(e, locals, addr_taken);
            }
        }
        StatementKind::Switch { cond, body } => {
            collect_addr_taken(cond, addr_taken);
            collect_locals(body, locals, addr_taken);
        }
        StatementKind::While { cond, body } => {
            collect_addr_taken(cond, addr_taken);
            collect_locals(body, locals, addr_taken);
        }
        StatementKind::DoWhile { body, cond } => {
            collect_addr_taken(cond, addr_taken);
            collect_locals(body, locals, addr_taken);
        }
        StatementKind::For { init, cond, step, body } => {
            if let Some(init) = init {
                collect_locals(init, locals, addr_taken);
            }
            if let Some(cond) = cond {
                collect_addr_taken(cond, addr_taken);
            }
            if let Some(step) = step {
                collect_addr_taken(step, addr_taken);
            }
            collect_locals(body, locals, addr_taken);
        }
        StatementKind::Labeled { inner, .. } => collect_locals(inner, locals, addr_taken),
        StatementKind::Jump(JumpKind::Return(Some(e))) | StatementKind::Jump(JumpKind::GotoExpr(e)) => {
            collect_addr_taken(e, addr_taken);
        }
        StatementKind::Jump(_) | StatementKind::Empty | StatementKind::Error => {}
    }
}

fn collect_addr_taken(expr: &AstExpression, addr_taken: &mut std::collections::HashSet<VarId>) {
    match &expr.kind {
        ExpressionKind::Unary(UnaryOp::AddrOf, inner) => {
            if let ExpressionKind::NameRef(_, ResolvedName::Variable(decl)) = &inner.kind {
                addr_taken.insert(decl.borrow().var_id);
            }
            collect_addr_taken(inner, addr_taken);
        }
        ExpressionKind::Unary(_, inner)
        | ExpressionKind::Cast(inner)
        | ExpressionKind::Paren(inner)
        | ExpressionKind::BitExtend(inner)
        | ExpressionKind::VaArg(inner) => collect_addr_taken(inner, addr_taken),
        ExpressionKind::Binary(_, l, r) | ExpressionKind::Assign(_, l, r) | ExpressionKind::ArrayAccess(l, r) => {
            collect_addr_taken(l, addr_taken);
            collect_addr_taken(r, addr_taken);
        }
        ExpressionKind::Ternary(c, t, f) => {
            collect_addr_taken(c, addr_taken);
            collect_addr_taken(t, addr_taken);
            collect_addr_taken(f, addr_taken);
        }
        ExpressionKind::Call(callee, args) => {
            collect_addr_taken(callee, addr_taken);
            for a in args {
                collect_addr_taken(a, addr_taken);
            }
        }
        ExpressionKind::FieldAccess(base, ..) => collect_addr_taken(base, addr_taken),
        ExpressionKind::CompoundLiteral(init) => collect_addr_taken_in_initializer(init, addr_taken),
        ExpressionKind::BlockExpr(stmts, tail) => {
            let mut locals = Vec::new();
            for s in stmts {
                collect_locals(s, &mut locals, addr_taken);
            }
            if let Some(e) = tail {
                collect_addr_taken(e, addr_taken);
            }
        }
        ExpressionKind::IntConst(_)
        | ExpressionKind::FloatConst(_)
        | ExpressionKind::StringConst(_)
        | ExpressionKind::NameRef(..)
        | ExpressionKind::LabelRef(_)
        | ExpressionKind::Error => {}
    }
}

fn collect_addr_taken_in_initializer(init: &AstInitializer, addr_taken: &mut std::collections::HashSet<VarId>) {
    match init {
        AstInitializer::Expression { expression, .. } => collect_addr_taken(expression, addr_taken),
        AstInitializer::List(children) => {
            for c in children {
                collect_addr_taken_in_initializer(c, addr_taken);
            }
        }
    }
}

/// Lowers one function definition to an `IrFunction` (§4.9). Returns `None`
/// for a declaration with no body.
#[must_use]
pub fn build_function(
    var_ids: &mut VarIdGen,
    vla_sizes: &[(VarId, ExprId)],
    func: &Rc<RefCell<AstFunctionDeclaration>>,
) -> Option<IrFunction> {
    let f = func.borrow();
    let body = f.body.clone()?;
    let vla_size_map: HashMap<VarId, ExprId> = vla_sizes.iter().cloned().collect();

    let mut locals = Vec::new();
    let mut addr_taken = std::collections::HashSet::new();
    for p in &f.params {
        let p = p.borrow();
        locals.push(LocalSlot { var_id: p.var_id, ty: p.ty.clone(), name: p.name.clone(), referenced: false });
    }
    if let Some(va) = f.va_area {
        let byte_ty = TypeFactory::primitive(TypeId::U1, Qualifiers::empty());
        let area_ty = TypeFactory::array(byte_ty, VA_AREA_BYTES);
        locals.push(LocalSlot { var_id: va, ty: area_ty, name: Symbol::from("__va_area__"), referenced: true });
    }
    collect_locals(&body, &mut locals, &mut addr_taken);
    for local in &mut locals {
        if addr_taken.contains(&local.var_id) {
            local.referenced = true;
        }
    }

    let return_ty = match f.ty.kind() {
        TypeKind::Function(ret, ..) => ret.clone(),
        _ => TypeFactory::error(),
    };
    let return_operand = if return_ty.is_void() {
        None
    } else {
        Some(IrOperand::new(OperandKind::FramePointer, return_ty.clone()))
    };

    let mut b = Builder {
        var_ids,
        vla_sizes: &vla_size_map,
        blocks: Vec::new(),
        cur: BlockId(0),
        next_vreg: 0,
        locals,
        label_blocks: HashMap::new(),
        loops: Vec::new(),
        switches: Vec::new(),
        break_stack: Vec::new(),
        exit_block: None,
        return_operand,
    };
    b.new_block("entry");
    b.lower_stmt(&body);
    if !b.cur_block().is_terminated() {
        let exit = b.exit_block();
        b.emit(IrInstrKind::Return, smallvec![], smallvec![], body.coords);
        b.set_successors(vec![exit]);
    }
    // The exit block may have been requested but never reached as "current";
    // ensure it always terminates the function so dumping stays well-defined.
    if let Some(exit) = b.exit_block {
        b.cur = exit;
        if !b.cur_block().is_terminated() {
            b.emit(IrInstrKind::Return, smallvec![], smallvec![], body.coords);
        }
    }

    let Builder { blocks, locals, return_operand, .. } = b;
    let mut func_ir = IrFunction { name: f.name.clone(), blocks, locals, return_operand, entry: BlockId(0) };
    fill_predecessors(&mut func_ir);
    Some(func_ir)
}

fn fill_predecessors(func: &mut IrFunction) {
    let edges: Vec<(BlockId, BlockId)> = func
        .blocks
        .iter()
        .flat_map(|b| b.successors.iter().map(move |&s| (b.id, s)))
        .collect();
    for (from, to) in edges {
        let block = func.block_mut(to);
        if !block.predecessors.contains(&from) {
            block.predecessors.push(from);
        }
    }
}
