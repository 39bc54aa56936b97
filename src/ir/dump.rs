//! Textual IR dump and CFG dot-graph rendering (§6 "IR textual dump",
//! "IR CFG as a directed-graph file").
//!
//! Grounded verbatim on `examples/original_source/src/ir/irdump.c`'s
//! `dumpIrFunction`/`dumpIrBlock`/`dumpIrInstruction`/`dumpIrOperand` (the
//! textual dump) and `buildDotForFunction`/`buildDotGraphForFunctionList`
//! (the dot-graph writer) - same per-block header shape, same operand
//! sigils, same edge styling.

use crate::ir::{BlockId, ConstValue, IrFunction, IrInstruction, IrInstrKind, IrOperand, OperandKind};
use std::fmt::Write;

fn mnemonic(kind: &IrInstrKind) -> &'static str {
    use crate::ast::{BinaryOp, UnaryOp};
    match kind {
        IrInstrKind::Load => "LOAD",
        IrInstrKind::Store => "STORE",
        IrInstrKind::Move => "MOVE",
        IrInstrKind::Binary(BinaryOp::Add) => "ADD",
        IrInstrKind::Binary(BinaryOp::Sub) => "SUB",
        IrInstrKind::Binary(BinaryOp::Mul) => "MUL",
        IrInstrKind::Binary(BinaryOp::Div) => "DIV",
        IrInstrKind::Binary(BinaryOp::Mod) => "MOD",
        IrInstrKind::Binary(BinaryOp::Shl) => "SHL",
        IrInstrKind::Binary(BinaryOp::Shr) => "SHR",
        IrInstrKind::Binary(BinaryOp::BitAnd) => "AND",
        IrInstrKind::Binary(BinaryOp::BitOr) => "OR",
        IrInstrKind::Binary(BinaryOp::BitXor) => "XOR",
        IrInstrKind::Binary(BinaryOp::LogAnd) => "LAND",
        IrInstrKind::Binary(BinaryOp::LogOr) => "LOR",
        IrInstrKind::Binary(BinaryOp::Eq) => "CMP_EQ",
        IrInstrKind::Binary(BinaryOp::Ne) => "CMP_NE",
        IrInstrKind::Binary(BinaryOp::Lt) => "CMP_LT",
        IrInstrKind::Binary(BinaryOp::Le) => "CMP_LE",
        IrInstrKind::Binary(BinaryOp::Gt) => "CMP_GT",
        IrInstrKind::Binary(BinaryOp::Ge) => "CMP_GE",
        IrInstrKind::Binary(BinaryOp::Comma) => "COMMA",
        IrInstrKind::Unary(UnaryOp::Plus) => "POS",
        IrInstrKind::Unary(UnaryOp::Minus) => "NEG",
        IrInstrKind::Unary(UnaryOp::BitNot) => "NOT",
        IrInstrKind::Unary(UnaryOp::LogNot) => "LNOT",
        IrInstrKind::Unary(_) => "UOP",
        IrInstrKind::Cast => "CAST",
        IrInstrKind::BitExtend => "BITEXT",
        IrInstrKind::AddrOf => "ADDR_OF",
        IrInstrKind::Call => "CALL",
        IrInstrKind::IndirectBranch => "IBRANCH",
        IrInstrKind::CBranch { .. } => "CBRANCH",
        IrInstrKind::Branch(_) => "BRANCH",
        IrInstrKind::TBranch { .. } => "TBRANCH",
        IrInstrKind::Return => "RETURN",
        IrInstrKind::Bad => "IR_BAD",
    }
}

/// `dumpIrOperand`: sigil per operand kind (§6).
fn dump_operand(out: &mut String, op: &IrOperand) {
    match &op.kind {
        OperandKind::Const(ConstValue::Int(i)) => write!(out, "#{i}").unwrap(),
        OperandKind::Const(c) => write!(out, "#{c}").unwrap(),
        OperandKind::VirtualRegister(id) => write!(out, "%{}", id.0).unwrap(),
        OperandKind::PhysicalRegister(id) => write!(out, "${id}").unwrap(),
        OperandKind::Local(id) => write!(out, "{id}").unwrap(),
        OperandKind::BlockLabel(id) => write!(out, "{id}").unwrap(),
        OperandKind::Memory(base, offset) => {
            out.push('[');
            dump_operand(out, base);
            write!(out, "+{offset}]").unwrap();
        }
        OperandKind::Reference(sym) => write!(out, "<{sym}>").unwrap(),
        OperandKind::FramePointer => out.push_str("@FP"),
    }
}

fn dump_operand_list(out: &mut String, ops: &[IrOperand]) {
    for (i, op) in ops.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        dump_operand(out, op);
    }
}

/// `dumpIrInstruction`: mnemonic, optional bracketed extra info, uses, defs.
fn dump_instruction(out: &mut String, instr: &IrInstruction) {
    out.push_str("  ");
    out.push_str(mnemonic(&instr.kind));
    if let IrInstrKind::TBranch { cases, default } = &instr.kind {
        write!(out, " [TABLE_SIZE = {}, default = {default}]", cases.len()).unwrap();
    }
    if !instr.uses.is_empty() {
        out.push('(');
        dump_operand_list(out, &instr.uses);
        out.push(')');
    }
    if !instr.defs.is_empty() {
        out.push_str(" => ");
        dump_operand_list(out, &instr.defs);
    }
    out.push('\n');
}

fn dump_id_list(out: &mut String, ids: &[BlockId]) {
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write!(out, "#{}", id.0).unwrap();
    }
}

/// `dumpIrBlockHeader` (§6, exact shape from `irdump.c`).
fn dump_block_header(out: &mut String, func: &IrFunction, id: BlockId) {
    let block = func.block(id);
    write!(out, "BB #{}, '{}'", id.0, block.name).unwrap();
    if !block.predecessors.is_empty() {
        out.push_str(", <- ");
        dump_id_list(out, &block.predecessors);
    }
    if !block.successors.is_empty() {
        out.push_str(", -> ");
        dump_id_list(out, &block.successors);
    }
    if let Some(sdom) = block.dominators.sdom {
        write!(out, ", strict dom #{}", sdom.0).unwrap();
    }
    if !block.dominators.frontier.is_empty() {
        out.push_str(", domination frontier [");
        dump_id_list(out, &block.dominators.frontier);
        out.push(']');
    }
    if !block.dominators.dominatees.is_empty() {
        out.push_str(", dominatees [");
        dump_id_list(out, &block.dominators.dominatees);
        out.push(']');
    }
    out.push('\n');
}

fn dump_block(out: &mut String, func: &IrFunction, id: BlockId) {
    dump_block_header(out, func, id);
    for instr in &func.block(id).instructions {
        dump_instruction(out, instr);
    }
}

/// `dumpIrFunction`: locals table, return operand, then every block.
#[must_use]
pub fn dump_function(func: &IrFunction) -> String {
    let mut out = String::new();
    writeln!(out, "Function '{}'", func.name).unwrap();
    out.push_str("Locals:\n");
    for local in &func.locals {
        let ref_marker = if local.referenced { '&' } else { ' ' };
        writeln!(out, "  {ref_marker}{}:{} = {}", local.var_id, local.ty, local.name).unwrap();
    }
    if let Some(ret) = &func.return_operand {
        let mut op_text = String::new();
        dump_operand(&mut op_text, ret);
        writeln!(out, "Return Operand: {op_text}").unwrap();
    }
    for block in &func.blocks {
        dump_block(&mut out, func, block.id);
    }
    out
}

/// Dumps every function in `funcs`, separated the way `irdump.c` separates
/// multiple `dumpIrFunction` calls: a blank line between functions.
#[must_use]
pub fn dump_functions(funcs: &[IrFunction]) -> String {
    let mut out = String::new();
    for (i, f) in funcs.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&dump_function(f));
    }
    out
}

/// `buildDotForFunction`: one `cluster_N` subgraph per function, node per
/// block, solid black successor edges, bold green strict-dominator edges,
/// dashed blue dominance-frontier edges (§6 "IR CFG as a directed-graph
/// file").
fn dot_for_function(out: &mut String, index: usize, func: &IrFunction) {
    writeln!(out, "  subgraph cluster_{index} {{").unwrap();
    writeln!(out, "    label = \"{}\";", func.name).unwrap();
    let prefix = format!("{}_{index}", func.name);
    for block in &func.blocks {
        writeln!(out, "    {prefix}_{} [label=\"#{} | {}\"];", block.id.0, block.id.0, block.name).unwrap();
    }
    for block in &func.blocks {
        for succ in &block.successors {
            writeln!(
                out,
                "    {prefix}_{} -> {prefix}_{} [style=\"solid\", color=\"black\"];",
                block.id.0, succ.0
            )
            .unwrap();
        }
        if let Some(sdom) = block.dominators.sdom {
            if sdom != block.id {
                writeln!(
                    out,
                    "    {prefix}_{} -> {prefix}_{} [style=\"bold\", color=\"green\"];",
                    sdom.0, block.id.0
                )
                .unwrap();
            }
        }
        for frontier in &block.dominators.frontier {
            writeln!(
                out,
                "    {prefix}_{} -> {prefix}_{} [style=\"dashed\", color=\"blue\"];",
                block.id.0, frontier.0
            )
            .unwrap();
        }
    }
    writeln!(out, "  }}").unwrap();
}

/// `buildDotGraphForFunctionList`: wraps every function's cluster in one
/// `digraph CFG { ... }`.
#[must_use]
pub fn dump_dot_graph(funcs: &[IrFunction]) -> String {
    let mut out = String::new();
    out.push_str("digraph CFG {\n");
    for (i, f) in funcs.iter().enumerate() {
        dot_for_function(&mut out, i, f);
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{dom, BlockId as Bid, DomInfo, IrBasicBlock, IrInstrKind as K, LocalSlot};
    use crate::intern::Symbol;
    use crate::source::Coordinates;
    use crate::symtab::VarId;
    use crate::types::{Qualifiers, TypeFactory, TypeId};
    use smallvec::smallvec;

    fn simple_if_else() -> IrFunction {
        let s4 = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        let mut f = IrFunction {
            name: Symbol::from("f"),
            blocks: vec![
                IrBasicBlock {
                    id: Bid(0),
                    name: "entry".into(),
                    predecessors: vec![],
                    successors: vec![Bid(1), Bid(2)],
                    instructions: vec![IrInstruction {
                        kind: K::CBranch { then_block: Bid(1), else_block: Bid(2) },
                        uses: smallvec![IrOperand::local(VarId(0), s4.clone())],
                        defs: smallvec![],
                        coords: Coordinates::synthetic(),
                    }],
                    dominators: DomInfo::default(),
                },
                IrBasicBlock {
                    id: Bid(1),
                    name: "then".into(),
                    predecessors: vec![Bid(0)],
                    successors: vec![Bid(3)],
                    instructions: vec![IrInstruction {
                        kind: K::Branch(Bid(3)),
                        uses: smallvec![],
                        defs: smallvec![],
                        coords: Coordinates::synthetic(),
                    }],
                    dominators: DomInfo::default(),
                },
                IrBasicBlock {
                    id: Bid(2),
                    name: "else".into(),
                    predecessors: vec![Bid(0)],
                    successors: vec![Bid(3)],
                    instructions: vec![IrInstruction {
                        kind: K::Branch(Bid(3)),
                        uses: smallvec![],
                        defs: smallvec![],
                        coords: Coordinates::synthetic(),
                    }],
                    dominators: DomInfo::default(),
                },
                IrBasicBlock {
                    id: Bid(3),
                    name: "merge".into(),
                    predecessors: vec![Bid(1), Bid(2)],
                    successors: vec![],
                    instructions: vec![IrInstruction {
                        kind: K::Return,
                        uses: smallvec![],
                        defs: smallvec![],
                        coords: Coordinates::synthetic(),
                    }],
                    dominators: DomInfo::default(),
                },
            ],
            locals: vec![LocalSlot { var_id: VarId(0), ty: s4, name: Symbol::from("x"), referenced: false }],
            return_operand: None,
            entry: Bid(0),
        };
        dom::analyze(&mut f);
        f
    }

    #[test]
    fn dump_function_includes_block_header_fields() {
        let f = simple_if_else();
        let text = dump_function(&f);
        assert!(text.contains("Function 'f'"));
        assert!(text.contains("BB #0, 'entry', -> #1 #2"));
        assert!(text.contains("BB #3, 'merge', <- #1 #2, strict dom #0"));
        assert!(text.contains("domination frontier"));
    }

    #[test]
    fn dump_operand_sigils_match_spec() {
        let s4 = TypeFactory::primitive(TypeId::S4, Qualifiers::empty());
        let mut text = String::new();
        dump_operand(&mut text, &IrOperand::vreg(crate::ir::VRegId(2), s4.clone()));
        assert_eq!(text, "%2");
        let mut text = String::new();
        dump_operand(&mut text, &IrOperand::local(VarId(1), s4.clone()));
        assert_eq!(text, "@1");
        let mut text = String::new();
        dump_operand(&mut text, &IrOperand::const_int(7, s4));
        assert_eq!(text, "#7");
    }

    #[test]
    fn dot_graph_wraps_cluster_per_function() {
        let f = simple_if_else();
        let dot = dump_dot_graph(std::slice::from_ref(&f));
        assert!(dot.starts_with("digraph CFG {\n"));
        assert!(dot.contains("subgraph cluster_0"));
        assert!(dot.contains("style=\"bold\", color=\"green\""));
        assert!(dot.contains("style=\"dashed\", color=\"blue\""));
        assert!(dot.ends_with("}\n"));
    }
}
