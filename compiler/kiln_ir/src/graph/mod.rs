//! Control-flow graph analyses over a function's blocks.
//!
//! These are shared by the verifier (dominance of definitions over uses)
//! and by optimization passes (promotion to registers, dead code removal).
//! Blocks are addressed by their layout index; index 0 is the entry.
//!
//! [`Cfg`] is the public handle-level view; the verifier builds the same
//! [`BlockGraph`] directly from the store.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::block::BasicBlock;
use crate::context::Context;
use crate::error::Result;
use crate::id::{BlockId, ValueId};
use crate::store::Store;
use crate::value::Value;

/// Index-addressed successor and predecessor lists.
#[derive(Clone, Debug, Default)]
pub(crate) struct BlockGraph {
    pub(crate) blocks: Vec<BlockId>,
    pub(crate) succs: Vec<SmallVec<[usize; 4]>>,
    /// Deduplicated.
    pub(crate) preds: Vec<Vec<usize>>,
}

impl BlockGraph {
    pub(crate) fn build(s: &Store, function: ValueId) -> Result<Self> {
        let blocks = s.function(function)?.blocks.clone();
        let index: FxHashMap<BlockId, usize> =
            blocks.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        let mut succs = Vec::with_capacity(blocks.len());
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); blocks.len()];
        for (i, &block) in blocks.iter().enumerate() {
            let mut out: SmallVec<[usize; 4]> = SmallVec::new();
            for succ in s.successors(block) {
                // Branches to blocks of another function are verifier errors,
                // not edges.
                let Some(&j) = index.get(&succ) else { continue };
                if !out.contains(&j) {
                    out.push(j);
                    preds[j].push(i);
                }
            }
            succs.push(out);
        }
        Ok(Self {
            blocks,
            succs,
            preds,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Postorder from the entry, iterative so deep CFGs cannot overflow
    /// the stack. Only reachable blocks appear.
    pub(crate) fn postorder(&self) -> Vec<usize> {
        let n = self.len();
        let mut visited = vec![false; n];
        let mut postorder = Vec::with_capacity(n);
        if n == 0 {
            return postorder;
        }
        let mut stack: Vec<(usize, bool)> = vec![(0, false)];
        while let Some(&mut (block, ref mut children_done)) = stack.last_mut() {
            if *children_done {
                postorder.push(block);
                stack.pop();
                continue;
            }
            *children_done = true;
            if visited[block] {
                stack.pop();
                continue;
            }
            visited[block] = true;
            for &succ in self.succs[block].iter().rev() {
                if !visited[succ] {
                    stack.push((succ, false));
                }
            }
        }
        postorder
    }

    pub(crate) fn reverse_postorder(&self) -> Vec<usize> {
        let mut rpo = self.postorder();
        rpo.reverse();
        rpo
    }
}

// ── Public CFG view ─────────────────────────────────────────────────

/// Snapshot of a function's control-flow graph.
///
/// The snapshot does not follow later edits to the function; rebuild it
/// after changing terminators or the block list.
pub struct Cfg<'ctx> {
    ctx: &'ctx Context,
    graph: BlockGraph,
}

impl<'ctx> Cfg<'ctx> {
    pub fn build(function: Value<'ctx>) -> Result<Self> {
        let ctx = function.context();
        let graph = ctx.read(|s| BlockGraph::build(s, function.id()))?;
        Ok(Self { ctx, graph })
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.blocks.is_empty()
    }

    /// Block at layout index `index`.
    pub fn block(&self, index: usize) -> Option<BasicBlock<'ctx>> {
        self.graph
            .blocks
            .get(index)
            .map(|&b| BasicBlock::new(self.ctx, b))
    }

    pub fn index_of(&self, block: BasicBlock<'ctx>) -> Option<usize> {
        if block.context().id() != self.ctx.id() {
            return None;
        }
        self.graph.blocks.iter().position(|&b| b == block.id())
    }

    /// Distinct successor indices.
    pub fn successors(&self, index: usize) -> &[usize] {
        self.graph.succs.get(index).map_or(&[], |s| s.as_slice())
    }

    /// Distinct predecessor indices.
    pub fn predecessors(&self, index: usize) -> &[usize] {
        self.graph.preds.get(index).map_or(&[], Vec::as_slice)
    }

    pub fn postorder(&self) -> Vec<usize> {
        self.graph.postorder()
    }

    pub fn reverse_postorder(&self) -> Vec<usize> {
        self.graph.reverse_postorder()
    }

    /// Reachability from the entry, indexed by block.
    pub fn reachable(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.len()];
        for index in self.postorder() {
            reachable[index] = true;
        }
        reachable
    }

    pub fn dominator_tree(&self) -> DominatorTree {
        DominatorTree::from_graph(&self.graph)
    }
}

// ── Dominators ──────────────────────────────────────────────────────

/// Dominator tree over block indices.
///
/// Built with the Cooper-Harvey-Kennedy iterative algorithm on reverse
/// postorder, which converges in a few passes for ordinary CFGs.
///
/// Reference: Cooper, Harvey, Kennedy, "A Simple, Fast Dominance Algorithm" (2001)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DominatorTree {
    /// `idom[entry] == Some(entry)`; unreachable blocks have `None`.
    idom: Vec<Option<usize>>,
}

impl DominatorTree {
    pub(crate) fn from_graph(graph: &BlockGraph) -> Self {
        let n = graph.len();
        if n == 0 {
            return Self { idom: Vec::new() };
        }
        let rpo = graph.reverse_postorder();
        let mut rpo_pos = vec![usize::MAX; n];
        for (pos, &block) in rpo.iter().enumerate() {
            rpo_pos[block] = pos;
        }

        let mut idom: Vec<Option<usize>> = vec![None; n];
        idom[0] = Some(0);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in &rpo[1..] {
                let mut processed = graph.preds[block].iter().copied().filter(|&p| idom[p].is_some());
                let Some(first) = processed.next() else {
                    continue;
                };
                let new_idom = processed.fold(first, |acc, pred| Self::intersect(pred, acc, &idom, &rpo_pos));
                if idom[block] != Some(new_idom) {
                    idom[block] = Some(new_idom);
                    changed = true;
                }
            }
        }
        Self { idom }
    }

    /// CHK intersect: walk two fingers upward until they meet.
    fn intersect(mut a: usize, mut b: usize, idom: &[Option<usize>], rpo_pos: &[usize]) -> usize {
        while a != b {
            while rpo_pos[a] > rpo_pos[b] {
                let Some(next) = idom[a] else {
                    debug_assert!(false, "intersect: broken idom chain at {a}");
                    return a;
                };
                a = next;
            }
            while rpo_pos[b] > rpo_pos[a] {
                let Some(next) = idom[b] else {
                    debug_assert!(false, "intersect: broken idom chain at {b}");
                    return b;
                };
                b = next;
            }
        }
        a
    }

    pub fn is_reachable(&self, block: usize) -> bool {
        self.idom.get(block).is_some_and(Option::is_some)
    }

    /// Immediate dominator; `None` for the entry and unreachable blocks.
    pub fn immediate_dominator(&self, block: usize) -> Option<usize> {
        match self.idom.get(block).copied().flatten() {
            Some(dom) if dom != block => Some(dom),
            _ => None,
        }
    }

    /// Does block `a` dominate block `b`?
    ///
    /// A block dominates itself. Every block dominates an unreachable one,
    /// and an unreachable block dominates only itself and other
    /// unreachable blocks.
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        if !self.is_reachable(b) {
            return true;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom[current] {
                Some(dom) if dom != current => current = dom,
                _ => return false,
            }
        }
    }

    /// Children of each block in the tree.
    pub fn children(&self) -> Vec<Vec<usize>> {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.idom.len()];
        for (block, &idom) in self.idom.iter().enumerate() {
            if let Some(dom) = idom {
                if dom != block {
                    children[dom].push(block);
                }
            }
        }
        children
    }

    /// Blocks dominated by `root` in preorder.
    pub fn dominated_preorder(&self, root: usize) -> Vec<usize> {
        let children = self.children();
        let mut result = Vec::new();
        let mut stack = vec![root];
        while let Some(block) = stack.pop() {
            result.push(block);
            if let Some(kids) = children.get(block) {
                stack.extend(kids.iter().rev());
            }
        }
        result
    }

    /// Dominance frontier of every block, deduplicated.
    pub fn frontiers(&self, cfg: &Cfg<'_>) -> Vec<Vec<usize>> {
        self.frontiers_of(&cfg.graph)
    }

    pub(crate) fn frontiers_of(&self, graph: &BlockGraph) -> Vec<Vec<usize>> {
        let n = graph.len();
        let mut frontiers: Vec<Vec<usize>> = vec![Vec::new(); n];
        for block in 0..n {
            if graph.preds[block].len() < 2 || !self.is_reachable(block) {
                continue;
            }
            let Some(idom) = self.idom[block] else { continue };
            for &pred in &graph.preds[block] {
                let mut runner = pred;
                while runner != idom && self.is_reachable(runner) {
                    if !frontiers[runner].contains(&block) {
                        frontiers[runner].push(block);
                    }
                    match self.idom[runner] {
                        Some(next) if next != runner => runner = next,
                        _ => break,
                    }
                }
            }
        }
        frontiers
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
