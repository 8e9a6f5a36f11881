//! Control-flow graph over one function's flat MIR statement list. Blocks
//! own their non-control statements; control transfer lives in each block's
//! terminator. The graph can be linearized back into a statement list at any
//! point when not in SSA form.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;

use crate::{
    index::{simple_index, Index},
    intern::InternedSymbol,
    ir::{Expr, LabelId, Statement, Variable},
    middle::ssa_ops::SsaOpTable,
};

simple_index! {
    /// Identifies a basic block within one function's CFG
    pub struct BlockId;
}

impl BlockId {
    pub const ENTRY: Self = Self(0);
}

impl core::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        condition: Expr,
        positive: BlockId,
        negative: BlockId,
    },
    Return(Option<Expr>),
    /// Synthesized end of function; linearization emits nothing for it
    FallOff,
}

/// A phi resolves one name at a control-flow join: the destination takes the
/// version flowing in along whichever predecessor edge was executed.
#[derive(Debug, Clone, PartialEq)]
pub struct PhiNode {
    pub destination: Variable,
    pub sources: BTreeMap<BlockId, Variable>,
}

/// A chi records a may-definition: the statement at `statement_index` is a
/// call that may overwrite `destination`'s base name without being its
/// syntactic owner. The destination version merges the source version with
/// whatever the call may have written.
#[derive(Debug, Clone, PartialEq)]
pub struct ChiNode {
    pub destination: Variable,
    pub source: Variable,
    pub statement_index: usize,
}

#[derive(Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    pub phis: Vec<PhiNode>,
    pub chis: Vec<ChiNode>,
    pub statements: Vec<Statement>,
    pub terminator: Terminator,
    pub predecessors: BTreeSet<BlockId>,
}

pub struct Cfg {
    pub blocks: BTreeMap<BlockId, BasicBlock>,
    pub parameters: Vec<InternedSymbol>,
    pub in_ssa_form: bool,
    /// Bumped every time SSA form is (re)derived. Optimization passes can
    /// compare generations to tell whether the operand web was rebuilt
    /// between invocations.
    pub ssa_generation: u32,
    pub ops: SsaOpTable,
}

impl Cfg {
    /// Builds the CFG for one function body by leader analysis over its flat
    /// statement list.
    pub fn new(parameters: &[InternedSymbol], body: &[Statement]) -> Self {
        // A statement leads a new block if it is a label, or if it follows a
        // control transfer
        let mut leaders = vec![false; body.len()];
        if !body.is_empty() {
            leaders[0] = true;
        }
        for (i, statement) in body.iter().enumerate() {
            match statement {
                Statement::Label(_) => leaders[i] = true,
                Statement::Goto(_) | Statement::Branch { .. } | Statement::Return(_) => {
                    if i + 1 < body.len() {
                        leaders[i + 1] = true;
                    }
                }
                _ => {}
            }
        }

        // Chunk the statement list and map labels to the block that starts
        // at (or falls through from) them
        let mut chunks: Vec<Vec<&Statement>> = Vec::new();
        let mut label_blocks: HashMap<LabelId, BlockId> = HashMap::new();
        for (i, statement) in body.iter().enumerate() {
            if leaders[i] {
                chunks.push(Vec::new());
            }
            if let Statement::Label(label) = statement {
                label_blocks.insert(*label, BlockId::new(chunks.len() - 1));
            }
            chunks.last_mut().unwrap().push(statement);
        }

        let block_count = chunks.len().max(1);
        let mut blocks = BTreeMap::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let id = BlockId::new(index);
            let mut statements = Vec::new();
            let mut terminator = None;

            for statement in chunk {
                match statement {
                    Statement::Label(_) => {}
                    Statement::Goto(label) => terminator = Some(Terminator::Jump(label_blocks[label])),
                    Statement::Branch {
                        condition,
                        positive,
                        negative,
                    } => {
                        terminator = Some(Terminator::Branch {
                            condition: condition.clone(),
                            positive: label_blocks[positive],
                            negative: label_blocks[negative],
                        })
                    }
                    Statement::Return(value) => {
                        terminator = Some(Terminator::Return(value.clone()))
                    }
                    other => statements.push((*other).clone()),
                }
            }

            let terminator = terminator.unwrap_or(if index + 1 < block_count {
                Terminator::Jump(BlockId::new(index + 1))
            } else {
                Terminator::FallOff
            });

            blocks.insert(
                id,
                BasicBlock {
                    id,
                    phis: Vec::new(),
                    chis: Vec::new(),
                    statements,
                    terminator,
                    predecessors: BTreeSet::new(),
                },
            );
        }

        if blocks.is_empty() {
            blocks.insert(
                BlockId::ENTRY,
                BasicBlock {
                    id: BlockId::ENTRY,
                    phis: Vec::new(),
                    chis: Vec::new(),
                    statements: Vec::new(),
                    terminator: Terminator::FallOff,
                    predecessors: BTreeSet::new(),
                },
            );
        }

        let mut cfg = Self {
            blocks,
            parameters: parameters.to_vec(),
            in_ssa_form: false,
            ssa_generation: 0,
            ops: SsaOpTable::new(),
        };
        cfg.recompute_predecessors();
        cfg
    }

    pub fn entry(&self) -> BlockId {
        BlockId::ENTRY
    }

    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        match &self.blocks[&id].terminator {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch {
                positive, negative, ..
            } => vec![*positive, *negative],
            Terminator::Return(_) | Terminator::FallOff => Vec::new(),
        }
    }

    pub fn recompute_predecessors(&mut self) {
        let ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        for id in &ids {
            self.blocks.get_mut(id).unwrap().predecessors.clear();
        }
        for id in ids {
            for successor in self.successors(id) {
                self.blocks
                    .get_mut(&successor)
                    .unwrap()
                    .predecessors
                    .insert(id);
            }
        }
    }

    pub fn next_block_id(&self) -> BlockId {
        self.blocks
            .keys()
            .last()
            .map_or(BlockId::ENTRY, |id| id.plus(1))
    }

    /// Linearizes the graph back into a flat statement list. Labels are
    /// freshly assigned per block; jumps to the next block in layout order
    /// are elided.
    pub fn get_linear_statements(&self) -> Vec<Statement> {
        assert!(
            !self.in_ssa_form,
            "convert out of SSA form before linearizing"
        );

        let ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        let label_of: HashMap<BlockId, LabelId> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, LabelId::new(i)))
            .collect();

        // Work out which blocks actually need a label emitted
        let mut labeled: BTreeSet<BlockId> = BTreeSet::new();
        for (position, id) in ids.iter().enumerate() {
            let next = ids.get(position + 1);
            match &self.blocks[id].terminator {
                Terminator::Jump(target) if Some(target) != next => {
                    labeled.insert(*target);
                }
                Terminator::Branch {
                    positive, negative, ..
                } => {
                    labeled.insert(*positive);
                    labeled.insert(*negative);
                }
                _ => {}
            }
        }

        let mut out = Vec::new();
        for (position, id) in ids.iter().enumerate() {
            let block = &self.blocks[id];
            let next = ids.get(position + 1);

            if labeled.contains(id) {
                out.push(Statement::Label(label_of[id]));
            }
            out.extend(block.statements.iter().cloned());

            match &block.terminator {
                Terminator::Jump(target) => {
                    if Some(target) != next {
                        out.push(Statement::Goto(label_of[target]));
                    }
                }
                Terminator::Branch {
                    condition,
                    positive,
                    negative,
                } => out.push(Statement::Branch {
                    condition: condition.clone(),
                    positive: label_of[positive],
                    negative: label_of[negative],
                }),
                Terminator::Return(value) => out.push(Statement::Return(value.clone())),
                Terminator::FallOff => {}
            }
        }

        out
    }

    /// Prints the graph in graphviz format, phis and chis included, under
    /// the given dump name.
    pub fn dump_graphviz(&self, name: &str) {
        println!("digraph \"{}\" {{", name.replace('"', "'"));
        println!("  node [shape=box];");
        for (id, block) in &self.blocks {
            let mut label = format!("{id}\\n");
            for phi in &block.phis {
                label.push_str(&format!(
                    "{} = phi({})\\n",
                    phi.destination,
                    phi.sources
                        .iter()
                        .map(|(pred, var)| format!("{pred}: {var}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            for statement in &block.statements {
                label.push_str(&statement_summary(statement));
                label.push_str("\\n");
            }
            for chi in &block.chis {
                label.push_str(&format!("{} = chi({})\\n", chi.destination, chi.source));
            }
            println!(
                "  \"{id}\" [label=\"{}\"];",
                label.replace('"', "'")
            );
            for successor in self.successors(*id) {
                println!("  \"{id}\" -> \"{successor}\";");
            }
        }
        println!("}}");
    }
}

fn statement_summary(statement: &Statement) -> String {
    match statement {
        Statement::Assign { target, value } => format!("{target} = {value}"),
        Statement::Print(value) => format!("print {value}"),
        Statement::Return(Some(value)) => format!("return {value}"),
        Statement::Return(None) => "return".to_owned(),
        Statement::Expr(value) => value.to_string(),
        other => format!("{other:?}"),
    }
}
