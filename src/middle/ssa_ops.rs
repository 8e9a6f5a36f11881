//! The SSA operand web. Every definition and use in a function in SSA form
//! gets one operand record, and related operands are linked so that passes
//! can walk from a definition to its uses (and back) without re-scanning the
//! statement lists.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::{
    index::{simple_index, IndexVec},
    ir::Variable,
    middle::cfg::BlockId,
};

simple_index! {
    /// Identifies one operand record. Allocation order gives every operand
    /// in a function a total order, which keeps worklists and dumps
    /// deterministic.
    pub struct SsaOpId;
}

impl core::fmt::Display for SsaOpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// What kind of program point an operand belongs to. The meaning of an
/// operand's links depends on its kind: a statement def links to the uses of
/// that version, a phi use links back to the phi's def, a chi def links to
/// the call that may write it, and a block operand aggregates either the
/// block's must-define set (plain statement defs, never phi or chi may-defs)
/// or its full use set, depending on the operand's direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SsaOpKind {
    #[strum(serialize = "stmt")]
    Statement,
    #[strum(serialize = "phi")]
    Phi,
    #[strum(serialize = "chi")]
    Chi,
    #[strum(serialize = "block")]
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Def,
    Use,
}

#[derive(Debug, Clone)]
pub struct SsaOp {
    pub id: SsaOpId,
    pub block: BlockId,
    /// The versioned variable this operand defines or uses. Block aggregates
    /// carry no name.
    pub name: Option<Variable>,
    pub kind: SsaOpKind,
    pub direction: Direction,
    /// Linked operands. What the links mean depends on `kind` and
    /// `direction`; see [`SsaOpKind`].
    pub aux: BTreeSet<SsaOpId>,
}

impl PartialEq for SsaOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SsaOp {}

impl PartialOrd for SsaOp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SsaOp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

#[derive(Debug, Default)]
pub struct SsaOpTable {
    ops: IndexVec<SsaOpId, SsaOp>,
    defs_by_name: HashMap<Variable, SsaOpId>,
}

impl SsaOpTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new operand and returns its id. A defining operand with a
    /// name also becomes that version's canonical definition.
    pub fn add(
        &mut self,
        block: BlockId,
        name: Option<Variable>,
        kind: SsaOpKind,
        direction: Direction,
    ) -> SsaOpId {
        let id = self.ops.next_index();
        self.ops.push(SsaOp {
            id,
            block,
            name,
            kind,
            direction,
            aux: BTreeSet::new(),
        });
        if direction == Direction::Def {
            if let Some(name) = name {
                self.defs_by_name.insert(name, id);
            }
        }
        id
    }

    /// Links two operands in both directions, typically a def to one of its
    /// uses.
    pub fn link(&mut self, a: SsaOpId, b: SsaOpId) {
        self.ops[a].aux.insert(b);
        self.ops[b].aux.insert(a);
    }

    /// Links a member into a block aggregate. Aggregation is one-way: the
    /// block knows its members, the members do not point back.
    pub fn add_aggregate_member(&mut self, aggregate: SsaOpId, member: SsaOpId) {
        debug_assert_eq!(self.ops[aggregate].kind, SsaOpKind::Block);
        self.ops[aggregate].aux.insert(member);
    }

    /// The block's aggregate operand in the given direction: the must-define
    /// set for [`Direction::Def`], the use set for [`Direction::Use`].
    pub fn block_aggregate(&self, block: BlockId, direction: Direction) -> Option<SsaOpId> {
        self.ops
            .iter()
            .find(|op| op.kind == SsaOpKind::Block && op.block == block && op.direction == direction)
            .map(|op| op.id)
    }

    /// The operand that defines the given version, if it has been recorded.
    /// In well-formed SSA every versioned use resolves here.
    pub fn def_of(&self, name: &Variable) -> Option<SsaOpId> {
        self.defs_by_name.get(name).copied()
    }

    pub fn get(&self, id: SsaOpId) -> &SsaOp {
        &self.ops[id]
    }

    /// The use operands linked to `id`, in id order.
    pub fn get_uses(&self, id: SsaOpId) -> Vec<SsaOpId> {
        self.ops[id]
            .aux
            .iter()
            .copied()
            .filter(|linked| self.ops[*linked].direction == Direction::Use)
            .collect()
    }

    /// The defining operands linked to `id`, in id order.
    pub fn get_defs(&self, id: SsaOpId) -> Vec<SsaOpId> {
        self.ops[id]
            .aux
            .iter()
            .copied()
            .filter(|linked| self.ops[*linked].direction == Direction::Def)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SsaOp> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
        self.defs_by_name.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_defs_and_uses_resolve_both_ways() {
        let mut table = SsaOpTable::new();
        let x0 = Variable::versioned(crate::intern::InternedSymbol::new("x"), 0);

        let def = table.add(BlockId::ENTRY, Some(x0), SsaOpKind::Statement, Direction::Def);
        let use_a = table.add(BlockId::ENTRY, Some(x0), SsaOpKind::Statement, Direction::Use);
        let use_b = table.add(BlockId::ENTRY, Some(x0), SsaOpKind::Phi, Direction::Use);
        table.link(def, use_a);
        table.link(def, use_b);

        assert_eq!(table.def_of(&x0), Some(def));
        assert_eq!(table.get_uses(def), vec![use_a, use_b]);
        assert_eq!(table.get_defs(use_a), vec![def]);
        assert_eq!(table.get_defs(use_b), vec![def]);
    }

    #[test]
    fn block_aggregates_are_one_way() {
        let mut table = SsaOpTable::new();
        let x0 = Variable::versioned(crate::intern::InternedSymbol::new("x"), 0);

        let aggregate = table.add(BlockId::ENTRY, None, SsaOpKind::Block, Direction::Def);
        let def = table.add(BlockId::ENTRY, Some(x0), SsaOpKind::Statement, Direction::Def);
        table.add_aggregate_member(aggregate, def);

        assert!(table.get(aggregate).aux.contains(&def));
        assert!(!table.get(def).aux.contains(&aggregate));
    }

    #[test]
    fn allocation_order_is_the_total_order() {
        let mut table = SsaOpTable::new();
        let first = table.add(BlockId::ENTRY, None, SsaOpKind::Block, Direction::Def);
        let second = table.add(BlockId::ENTRY, None, SsaOpKind::Block, Direction::Def);
        assert!(table.get(first) < table.get(second));
        assert!(first < second);
    }
}
