//! Dominator and dominance-frontier analysis (§4.9, §8 properties 6-7).
//!
//! Implements the Cooper/Harvey/Kennedy iterative post-order algorithm:
//! `sdom(entry) = entry`; repeatedly intersect a block's predecessors'
//! `sdom` along a reverse-postorder walk until no entry changes. Frontier
//! sets are accumulated in a `bit_set::BitSet` per block (same crate
//! `build_vcode.rs` reaches for to track visited blocks), then drained
//! into the `Vec<BlockId>` the dump and public API expose.

use crate::ir::{BlockId, IrFunction};
use bit_set::BitSet;

/// Populates `dominators.sdom`, `.frontier` and `.dominatees` on every
/// block of `func`. Blocks unreachable from `entry` (dead code introduced
/// after an unconditional jump that nothing branches back into) keep
/// `sdom = None` and empty frontier/dominatee lists.
pub fn analyze(func: &mut IrFunction) {
    let n = func.blocks.len();
    if n == 0 {
        return;
    }
    let rpo = reverse_postorder(func);
    let mut rpo_number = vec![usize::MAX; n];
    for (i, &b) in rpo.iter().enumerate() {
        rpo_number[b.0 as usize] = i;
    }

    let mut idom: Vec<Option<usize>> = vec![None; n];
    let entry_idx = func.entry.0 as usize;
    idom[entry_idx] = Some(entry_idx);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in &rpo {
            let idx = b.0 as usize;
            if idx == entry_idx {
                continue;
            }
            let preds = &func.block(b).predecessors;
            let mut processed_preds = preds.iter().filter(|p| idom[p.0 as usize].is_some());
            let Some(first) = processed_preds.next() else { continue };
            let mut new_idom = first.0 as usize;
            for p in processed_preds {
                new_idom = intersect(new_idom, p.0 as usize, &idom, &rpo_number);
            }
            if idom[idx] != Some(new_idom) {
                idom[idx] = Some(new_idom);
                changed = true;
            }
        }
    }

    // `sdom` is the strict dominator; the entry's own idom (itself) is
    // reported as `sdom(entry) = entry` per §4.9, every other block's
    // `sdom` is its computed immediate dominator.
    for i in 0..n {
        func.blocks[i].dominators.sdom = idom[i].map(|d| BlockId(d as u32));
    }

    let mut frontier_sets: Vec<BitSet> = vec![BitSet::with_capacity(n); n];
    for &b in &rpo {
        let idx = b.0 as usize;
        let preds = func.block(b).predecessors.clone();
        if preds.len() < 2 {
            continue;
        }
        let Some(idom_b) = idom[idx] else { continue };
        for p in preds {
            let mut runner = p.0 as usize;
            if idom[runner].is_none() {
                continue;
            }
            while runner != idom_b {
                frontier_sets[runner].insert(idx);
                let Some(next) = idom[runner] else { break };
                if next == runner {
                    break;
                }
                runner = next;
            }
        }
    }
    for i in 0..n {
        let mut members: Vec<BlockId> = frontier_sets[i].iter().map(|x| BlockId(x as u32)).collect();
        members.sort_unstable();
        func.blocks[i].dominators.frontier = members;
    }

    let mut dominatees: Vec<Vec<BlockId>> = vec![Vec::new(); n];
    for i in 0..n {
        if i == entry_idx {
            continue;
        }
        if let Some(d) = idom[i] {
            dominatees[d].push(BlockId(i as u32));
        }
    }
    for i in 0..n {
        func.blocks[i].dominators.dominatees = std::mem::take(&mut dominatees[i]);
    }
}

/// Nearest common ancestor of two already-processed blocks in the
/// dominator tree under construction, walking toward the root by
/// reverse-postorder number (Cooper/Harvey/Kennedy's `intersect`).
fn intersect(mut a: usize, mut b: usize, idom: &[Option<usize>], rpo_number: &[usize]) -> usize {
    while a != b {
        while rpo_number[a] > rpo_number[b] {
            a = idom[a].expect("processed block has an idom");
        }
        while rpo_number[b] > rpo_number[a] {
            b = idom[b].expect("processed block has an idom");
        }
    }
    a
}

fn reverse_postorder(func: &IrFunction) -> Vec<BlockId> {
    let n = func.blocks.len();
    let mut visited = vec![false; n];
    let mut postorder = Vec::with_capacity(n);
    let mut stack: Vec<(BlockId, usize)> = vec![(func.entry, 0)];
    visited[func.entry.0 as usize] = true;

    while let Some((block, next_succ)) = stack.pop() {
        let succs = &func.block(block).successors;
        if next_succ < succs.len() {
            let succ = succs[next_succ];
            stack.push((block, next_succ + 1));
            if !visited[succ.0 as usize] {
                visited[succ.0 as usize] = true;
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
        }
    }
    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DomInfo, IrBasicBlock, IrInstrKind, IrInstruction, LocalSlot};
    use crate::source::Coordinates;
    use smallvec::smallvec;

    fn block(id: u32, name: &str, succs: &[u32]) -> IrBasicBlock {
        IrBasicBlock {
            id: BlockId(id),
            name: name.to_string(),
            predecessors: Vec::new(),
            successors: succs.iter().map(|&s| BlockId(s)).collect(),
            instructions: vec![IrInstruction {
                kind: if succs.len() == 1 {
                    IrInstrKind::Branch(BlockId(succs[0]))
                } else if succs.len() == 2 {
                    IrInstrKind::CBranch { then_block: BlockId(succs[0]), else_block: BlockId(succs[1]) }
                } else {
                    IrInstrKind::Return
                },
                uses: smallvec![],
                defs: smallvec![],
                coords: Coordinates::synthetic(),
            }],
            dominators: DomInfo::default(),
        }
    }

    fn fill_preds(func: &mut IrFunction) {
        let edges: Vec<(BlockId, BlockId)> =
            func.blocks.iter().flat_map(|b| b.successors.iter().map(move |&s| (b.id, s))).collect();
        for (from, to) in edges {
            func.blocks[to.0 as usize].predecessors.push(from);
        }
    }

    /// `if (x) { a; } else { b; } c;` - spec §8 scenario S5.
    #[test]
    fn if_else_merge_dominators() {
        let mut func = IrFunction {
            name: "f".into(),
            blocks: vec![
                block(0, "entry", &[1, 2]),
                block(1, "then", &[3]),
                block(2, "else", &[3]),
                block(3, "merge", &[]),
            ],
            locals: Vec::<LocalSlot>::new(),
            return_operand: None,
            entry: BlockId(0),
        };
        fill_preds(&mut func);
        analyze(&mut func);

        assert_eq!(func.block(BlockId(0)).dominators.sdom, Some(BlockId(0)));
        assert_eq!(func.block(BlockId(1)).dominators.sdom, Some(BlockId(0)));
        assert_eq!(func.block(BlockId(2)).dominators.sdom, Some(BlockId(0)));
        assert_eq!(func.block(BlockId(3)).dominators.sdom, Some(BlockId(0)));

        assert_eq!(func.block(BlockId(1)).dominators.frontier, vec![BlockId(3)]);
        assert_eq!(func.block(BlockId(2)).dominators.frontier, vec![BlockId(3)]);
        assert!(func.block(BlockId(0)).dominators.frontier.is_empty());
        assert!(func.block(BlockId(3)).dominators.frontier.is_empty());

        let mut children = func.block(BlockId(0)).dominators.dominatees.clone();
        children.sort();
        assert_eq!(children, vec![BlockId(1), BlockId(2), BlockId(3)]);
    }

    /// A straight-line chain has no merge point, so no block's frontier
    /// is ever nonempty.
    #[test]
    fn straight_line_has_empty_frontiers() {
        let mut func = IrFunction {
            name: "g".into(),
            blocks: vec![block(0, "entry", &[1]), block(1, "mid", &[2]), block(2, "exit", &[])],
            locals: Vec::<LocalSlot>::new(),
            return_operand: None,
            entry: BlockId(0),
        };
        fill_preds(&mut func);
        analyze(&mut func);
        for b in &func.blocks {
            assert!(b.dominators.frontier.is_empty());
        }
        assert_eq!(func.block(BlockId(2)).dominators.sdom, Some(BlockId(1)));
    }

    /// A loop back-edge puts the header in its own dominance frontier.
    #[test]
    fn loop_header_is_in_its_own_frontier() {
        let mut func = IrFunction {
            name: "h".into(),
            blocks: vec![
                block(0, "entry", &[1]),
                block(1, "header", &[2, 3]),
                block(2, "body", &[1]),
                block(3, "exit", &[]),
            ],
            locals: Vec::<LocalSlot>::new(),
            return_operand: None,
            entry: BlockId(0),
        };
        fill_preds(&mut func);
        analyze(&mut func);
        assert_eq!(func.block(BlockId(1)).dominators.frontier, vec![BlockId(1)]);
        assert_eq!(func.block(BlockId(2)).dominators.frontier, vec![BlockId(1)]);
    }
}
