//! SSA construction and destruction. Construction computes dominance, places
//! phis at iterated dominance frontiers, and renames every definition and
//! use while recording the operand web. Destruction replaces phis with
//! copies on (split) predecessor edges and strips versions, after which the
//! CFG can be linearized again.
//!
//! Every base name is given an implicit version 0 at function entry, so a
//! use always has a reaching definition even on paths with no explicit
//! assignment. Calls may write any source-level name in scope; each call
//! statement therefore carries one chi per non-temporary name.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;

use crate::{
    intern::InternedSymbol,
    ir::{Statement, Variable},
    middle::{
        cfg::{BasicBlock, BlockId, Cfg, ChiNode, PhiNode, Terminator},
        ssa_ops::{Direction, SsaOpId, SsaOpKind},
    },
    trace,
};

/// Dominance information for one CFG.
pub struct DomInfo {
    /// Immediate dominator of every block except the entry. Unreachable
    /// blocks are parented to the entry so the dominator tree spans the
    /// whole graph.
    pub idom: HashMap<BlockId, BlockId>,
    pub children: HashMap<BlockId, Vec<BlockId>>,
    pub frontier: HashMap<BlockId, BTreeSet<BlockId>>,
}

pub fn compute_dominance(cfg: &Cfg) -> DomInfo {
    let entry = cfg.entry();

    // Reverse postorder over the reachable subgraph
    let mut order = Vec::new();
    let mut visited = BTreeSet::new();
    postorder(cfg, entry, &mut visited, &mut order);
    order.reverse();

    let unreachable: Vec<BlockId> = cfg
        .blocks
        .keys()
        .copied()
        .filter(|id| !visited.contains(id))
        .collect();

    let position: HashMap<BlockId, usize> =
        order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let count = order.len();

    // Iterative bitset dataflow: dom(entry) = {entry}, dom(b) starts full
    // and shrinks to {b} ∪ ⋂ dom(preds)
    let words = count.div_ceil(64);
    let full = vec![u64::MAX; words];
    let mut dom: Vec<Vec<u64>> = vec![full; count];
    dom[0] = vec![0; words];
    set_bit(&mut dom[0], 0);

    let mut changed = true;
    while changed {
        changed = false;
        for (index, id) in order.iter().enumerate().skip(1) {
            let mut next = vec![u64::MAX; words];
            let mut any_pred = false;
            for pred in &cfg.blocks[id].predecessors {
                if let Some(pred_index) = position.get(pred) {
                    intersect(&mut next, &dom[*pred_index]);
                    any_pred = true;
                }
            }
            if !any_pred {
                next = vec![0; words];
            }
            set_bit(&mut next, index);
            if next != dom[index] {
                dom[index] = next;
                changed = true;
            }
        }
    }

    // The immediate dominator is the strict dominator with the largest
    // dominator set of its own (the one closest to the block)
    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    for (index, id) in order.iter().enumerate().skip(1) {
        let mut best: Option<(usize, usize)> = None;
        for candidate in 0..count {
            if candidate == index || !get_bit(&dom[index], candidate) {
                continue;
            }
            let size = popcount(&dom[candidate]);
            if best.map_or(true, |(_, best_size)| size > best_size) {
                best = Some((candidate, size));
            }
        }
        if let Some((candidate, _)) = best {
            idom.insert(*id, order[candidate]);
        }
    }
    for id in &unreachable {
        idom.insert(*id, entry);
    }

    let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for (id, parent) in idom.iter() {
        children.entry(*parent).or_default().push(*id);
    }
    for list in children.values_mut() {
        list.sort();
    }

    // Dominance frontiers, computed edge by edge: walking up from each
    // predecessor of a block stops at the block's immediate dominator
    let mut frontier: HashMap<BlockId, BTreeSet<BlockId>> = HashMap::new();
    for id in &order {
        let preds: Vec<BlockId> = cfg.blocks[id]
            .predecessors
            .iter()
            .copied()
            .filter(|pred| position.contains_key(pred))
            .collect();
        if preds.len() < 2 {
            continue;
        }
        for pred in preds {
            let mut runner = pred;
            while Some(&runner) != idom.get(id) {
                frontier.entry(runner).or_default().insert(*id);
                match idom.get(&runner) {
                    Some(parent) => runner = *parent,
                    None => break,
                }
            }
        }
    }

    DomInfo {
        idom,
        children,
        frontier,
    }
}

fn postorder(cfg: &Cfg, id: BlockId, visited: &mut BTreeSet<BlockId>, out: &mut Vec<BlockId>) {
    if !visited.insert(id) {
        return;
    }
    for successor in cfg.successors(id) {
        postorder(cfg, successor, visited, out);
    }
    out.push(id);
}

fn set_bit(bits: &mut [u64], index: usize) {
    bits[index / 64] |= 1 << (index % 64);
}

fn get_bit(bits: &[u64], index: usize) -> bool {
    bits[index / 64] & (1 << (index % 64)) != 0
}

fn intersect(bits: &mut [u64], other: &[u64]) {
    for (word, other_word) in bits.iter_mut().zip(other) {
        *word &= other_word;
    }
}

fn popcount(bits: &[u64]) -> usize {
    bits.iter().map(|word| word.count_ones() as usize).sum()
}

struct RenameState {
    counters: HashMap<InternedSymbol, u32>,
    stacks: HashMap<InternedSymbol, Vec<u32>>,
    /// Source-level names, in a fixed order. Chis are emitted for exactly
    /// these at every call statement.
    source_names: Vec<InternedSymbol>,
}

impl RenameState {
    fn current(&self, symbol: InternedSymbol) -> Variable {
        let version = *self.stacks[&symbol]
            .last()
            .expect("every tracked name has the implicit entry version on its stack");
        Variable::versioned(symbol, version)
    }

    fn fresh(&mut self, symbol: InternedSymbol) -> Variable {
        let counter = self.counters.get_mut(&symbol).unwrap();
        let version = *counter;
        *counter += 1;
        self.stacks.get_mut(&symbol).unwrap().push(version);
        Variable::versioned(symbol, version)
    }
}

impl Cfg {
    /// Converts the graph into SSA form: phi placement at iterated dominance
    /// frontiers, chi placement at call statements, versioned renaming of
    /// every definition and use, and a full operand web in `self.ops`.
    pub fn convert_to_ssa_form(&mut self) {
        assert!(!self.in_ssa_form, "already in SSA form");
        self.ops.clear();
        self.recompute_predecessors();

        let dom = compute_dominance(self);

        // Every name in the function, parameters included
        let mut names: BTreeSet<InternedSymbol> = BTreeSet::new();
        for parameter in &self.parameters {
            names.insert(*parameter);
        }
        for block in self.blocks.values() {
            for statement in &block.statements {
                if let Statement::Assign { target, .. } = statement {
                    names.insert(target.symbol);
                }
                statement.for_each_used_var(&mut |var| {
                    names.insert(var.symbol);
                });
            }
            terminator_for_each_var(&block.terminator, &mut |var| {
                names.insert(var.symbol);
            });
        }

        // Definition sites: the entry (implicit version 0 for everything),
        // explicit assignments, and call statements for source-level names
        let mut def_blocks: HashMap<InternedSymbol, BTreeSet<BlockId>> = names
            .iter()
            .map(|name| (*name, BTreeSet::from([self.entry()])))
            .collect();
        for block in self.blocks.values() {
            for statement in &block.statements {
                if let Statement::Assign { target, .. } = statement {
                    def_blocks.get_mut(&target.symbol).unwrap().insert(block.id);
                }
                if statement.contains_call() {
                    for name in &names {
                        if !name.is_temporary() {
                            def_blocks.get_mut(name).unwrap().insert(block.id);
                        }
                    }
                }
            }
        }

        // Minimal phi placement over the iterated dominance frontier
        for name in &names {
            let mut worklist: Vec<BlockId> = def_blocks[name].iter().copied().collect();
            let mut placed: BTreeSet<BlockId> = BTreeSet::new();
            while let Some(block) = worklist.pop() {
                let Some(frontier) = dom.frontier.get(&block) else {
                    continue;
                };
                for join in frontier {
                    if !placed.insert(*join) {
                        continue;
                    }
                    self.blocks.get_mut(join).unwrap().phis.push(PhiNode {
                        destination: Variable::new(*name),
                        sources: BTreeMap::new(),
                    });
                    if !def_blocks[name].contains(join) {
                        worklist.push(*join);
                    }
                }
            }
        }

        let mut state = RenameState {
            counters: names.iter().map(|name| (*name, 1)).collect(),
            stacks: names.iter().map(|name| (*name, vec![0])).collect(),
            source_names: names
                .iter()
                .copied()
                .filter(|name| !name.is_temporary())
                .collect(),
        };

        // The implicit entry definitions back every version 0
        for name in &names {
            self.ops.add(
                self.entry(),
                Some(Variable::versioned(*name, 0)),
                SsaOpKind::Statement,
                Direction::Def,
            );
        }

        let entry = self.entry();
        rename_block(self, &dom, &mut state, entry);

        // Two aggregate operands per block: the must-define set, which is
        // only the plain statement defs (phi and chi defs are may-defs), and
        // the full use set
        let ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        for id in ids {
            let must_defs: Vec<SsaOpId> = self
                .ops
                .iter()
                .filter(|op| {
                    op.block == id
                        && op.kind == SsaOpKind::Statement
                        && op.direction == Direction::Def
                })
                .map(|op| op.id)
                .collect();
            let uses: Vec<SsaOpId> = self
                .ops
                .iter()
                .filter(|op| {
                    op.block == id
                        && op.kind != SsaOpKind::Block
                        && op.direction == Direction::Use
                })
                .map(|op| op.id)
                .collect();

            let def_aggregate = self.ops.add(id, None, SsaOpKind::Block, Direction::Def);
            for member in must_defs {
                self.ops.add_aggregate_member(def_aggregate, member);
            }
            let use_aggregate = self.ops.add(id, None, SsaOpKind::Block, Direction::Use);
            for member in uses {
                self.ops.add_aggregate_member(use_aggregate, member);
            }
        }

        self.in_ssa_form = true;
        self.ssa_generation += 1;
        trace!(
            "converted to SSA form (generation {}, {} operands)",
            self.ssa_generation,
            self.ops.len()
        );
    }

    /// Rederives SSA form from scratch. Passes that mutated the graph call
    /// this before the next pass reads the operand web.
    pub fn rebuild_ssa_form(&mut self) {
        self.convert_out_of_ssa_form();
        self.convert_to_ssa_form();
    }

    /// Leaves SSA form: phis become copies on their predecessor edges
    /// (splitting critical edges first), chis disappear, and every variable
    /// loses its version.
    pub fn convert_out_of_ssa_form(&mut self) {
        assert!(self.in_ssa_form, "not in SSA form");

        self.split_critical_edges();

        // Phi elimination: one copy per incoming edge, placed at the end of
        // the predecessor
        let ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        for id in &ids {
            let phis = std::mem::take(&mut self.blocks.get_mut(id).unwrap().phis);
            for phi in phis {
                for (pred, source) in phi.sources {
                    self.blocks
                        .get_mut(&pred)
                        .unwrap()
                        .statements
                        .push(Statement::Assign {
                            target: phi.destination,
                            value: crate::ir::Expr::Var(source),
                        });
                }
            }
        }

        for block in self.blocks.values_mut() {
            block.chis.clear();
            for statement in &mut block.statements {
                if let Statement::Assign { target, .. } = statement {
                    target.version = None;
                }
                statement.for_each_used_var_mut(&mut |var| var.version = None);
            }
            terminator_for_each_var_mut(&mut block.terminator, &mut |var| var.version = None);

            // Version stripping leaves `x = x` behind wherever a phi copied
            // between versions of the same name
            block.statements.retain(|statement| {
                !matches!(
                    statement,
                    Statement::Assign {
                        target,
                        value: crate::ir::Expr::Var(source),
                    } if target == source
                )
            });
        }

        self.ops.clear();
        self.in_ssa_form = false;
    }

    /// Splits every edge whose source has multiple successors and whose
    /// target has multiple predecessors, so phi copies have a unique place
    /// to live.
    fn split_critical_edges(&mut self) {
        let ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        for id in ids {
            let successors = self.successors(id);
            if successors.len() < 2 {
                continue;
            }
            let successors: BTreeSet<BlockId> = successors.into_iter().collect();
            for successor in successors {
                if self.blocks[&successor].predecessors.len() < 2 {
                    continue;
                }

                let middle = self.next_block_id();
                self.blocks.insert(
                    middle,
                    BasicBlock {
                        id: middle,
                        phis: Vec::new(),
                        chis: Vec::new(),
                        statements: Vec::new(),
                        terminator: Terminator::Jump(successor),
                        predecessors: BTreeSet::new(),
                    },
                );

                if let Terminator::Branch {
                    positive, negative, ..
                } = &mut self.blocks.get_mut(&id).unwrap().terminator
                {
                    if *positive == successor {
                        *positive = middle;
                    }
                    if *negative == successor {
                        *negative = middle;
                    }
                }

                // The phi source that used to flow along id -> successor now
                // flows through the new block
                for phi in &mut self.blocks.get_mut(&successor).unwrap().phis {
                    if let Some(source) = phi.sources.remove(&id) {
                        phi.sources.insert(middle, source);
                    }
                }
            }
        }
        self.recompute_predecessors();
    }
}

fn rename_block(cfg: &mut Cfg, dom: &DomInfo, state: &mut RenameState, id: BlockId) {
    let mut pushed: Vec<InternedSymbol> = Vec::new();
    let mut block = cfg.blocks.remove(&id).expect("dominator tree spans the graph");

    for phi in &mut block.phis {
        let symbol = phi.destination.symbol;
        phi.destination = state.fresh(symbol);
        pushed.push(symbol);
        cfg.ops
            .add(id, Some(phi.destination), SsaOpKind::Phi, Direction::Def);
    }

    let mut chis = Vec::new();
    for (index, statement) in block.statements.iter_mut().enumerate() {
        let is_call = statement.contains_call();

        statement.for_each_used_var_mut(&mut |var| {
            *var = state.current(var.symbol);
        });
        let mut used = Vec::new();
        statement.for_each_used_var(&mut |var| used.push(*var));
        for var in used {
            let use_op = cfg
                .ops
                .add(id, Some(var), SsaOpKind::Statement, Direction::Use);
            if let Some(def) = cfg.ops.def_of(&var) {
                cfg.ops.link(def, use_op);
            }
        }

        // A call may write every source-level name; the chi merges the
        // incoming version with whatever the call did
        if is_call {
            for symbol in state.source_names.clone() {
                let source = state.current(symbol);
                let use_op = cfg.ops.add(id, Some(source), SsaOpKind::Chi, Direction::Use);
                if let Some(def) = cfg.ops.def_of(&source) {
                    cfg.ops.link(def, use_op);
                }

                let destination = state.fresh(symbol);
                pushed.push(symbol);
                let def_op = cfg
                    .ops
                    .add(id, Some(destination), SsaOpKind::Chi, Direction::Def);
                cfg.ops.link(def_op, use_op);

                chis.push(ChiNode {
                    destination,
                    source,
                    statement_index: index,
                });
            }
        }

        if let Statement::Assign { target, .. } = statement {
            let symbol = target.symbol;
            *target = state.fresh(symbol);
            pushed.push(symbol);
            cfg.ops
                .add(id, Some(*target), SsaOpKind::Statement, Direction::Def);
        }
    }
    block.chis = chis;

    terminator_for_each_var_mut(&mut block.terminator, &mut |var| {
        *var = state.current(var.symbol);
    });
    let mut terminator_uses = Vec::new();
    terminator_for_each_var(&block.terminator, &mut |var| terminator_uses.push(*var));
    for var in terminator_uses {
        let use_op = cfg
            .ops
            .add(id, Some(var), SsaOpKind::Statement, Direction::Use);
        if let Some(def) = cfg.ops.def_of(&var) {
            cfg.ops.link(def, use_op);
        }
    }

    cfg.blocks.insert(id, block);

    // Fill our slot in every successor's phis
    for successor in cfg.successors(id) {
        let mut filled = Vec::new();
        for phi in &mut cfg.blocks.get_mut(&successor).unwrap().phis {
            let source = state.current(phi.destination.symbol);
            phi.sources.insert(id, source);
            filled.push(source);
        }
        for source in filled {
            let use_op = cfg.ops.add(id, Some(source), SsaOpKind::Phi, Direction::Use);
            if let Some(def) = cfg.ops.def_of(&source) {
                cfg.ops.link(def, use_op);
            }
        }
    }

    if let Some(children) = dom.children.get(&id) {
        for child in children.clone() {
            rename_block(cfg, dom, state, child);
        }
    }

    for symbol in pushed {
        state.stacks.get_mut(&symbol).unwrap().pop();
    }
}

pub(crate) fn terminator_for_each_var(terminator: &Terminator, f: &mut impl FnMut(&Variable)) {
    match terminator {
        Terminator::Branch { condition, .. } => condition.for_each_var(f),
        Terminator::Return(Some(value)) => value.for_each_var(f),
        _ => {}
    }
}

pub(crate) fn terminator_for_each_var_mut(
    terminator: &mut Terminator,
    f: &mut impl FnMut(&mut Variable),
) {
    match terminator {
        Terminator::Branch { condition, .. } => condition.for_each_var_mut(f),
        Terminator::Return(Some(value)) => value.for_each_var_mut(f),
        _ => {}
    }
}
