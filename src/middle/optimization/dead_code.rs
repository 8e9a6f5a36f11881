//! Dead code elimination over one SSA-form CFG, driven by the operand web.
//! A definition with no remaining uses is dead when removing it cannot be
//! observed: plain assignments whose value does not call, and phis. Chi
//! definitions belong to their call and are never removed here.

use hashbrown::HashMap;

use crate::{
    ir::Statement,
    middle::{
        cfg::{BlockId, Cfg},
        ssa_ops::{Direction, SsaOpId, SsaOpKind},
    },
    options::CompilerOptions,
    pass_manager::CfgOptimization,
    trace,
};

pub struct DeadCodeElimination;

impl CfgOptimization for DeadCodeElimination {
    fn optimize(&mut self, cfg: &mut Cfg, _options: &CompilerOptions) {
        let mut use_counts: HashMap<SsaOpId, usize> = HashMap::new();
        let mut worklist: Vec<SsaOpId> = Vec::new();

        for op in cfg.ops.iter() {
            if op.direction != Direction::Def || op.name.is_none() {
                continue;
            }
            if !matches!(op.kind, SsaOpKind::Statement | SsaOpKind::Phi) {
                continue;
            }
            let uses = cfg.ops.get_uses(op.id).len();
            use_counts.insert(op.id, uses);
            if uses == 0 {
                worklist.push(op.id);
            }
        }

        while let Some(def) = worklist.pop() {
            if use_counts.get(&def) != Some(&0) {
                continue;
            }

            let op = cfg.ops.get(def);
            let name = op.name.expect("dead defs always carry a name");
            let block = op.block;
            let kind = op.kind;

            let removed_uses = match kind {
                SsaOpKind::Statement => remove_dead_assignment(cfg, block, def),
                SsaOpKind::Phi => remove_dead_phi(cfg, block, def),
                _ => continue,
            };

            let Some(removed_uses) = removed_uses else {
                continue;
            };
            trace!("removed dead definition of {name} in {block}");

            // Anything this definition was reading may now be dead too
            for use_op in removed_uses {
                for feeding_def in cfg.ops.get_defs(use_op) {
                    if let Some(count) = use_counts.get_mut(&feeding_def) {
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            worklist.push(feeding_def);
                        }
                    }
                }
            }
        }
    }
}

/// Removes the plain assignment backing `def`, unless its value calls. The
/// implicit entry definitions have no backing statement and are skipped.
/// Returns the use operands belonging to the removed statement.
fn remove_dead_assignment(cfg: &mut Cfg, block: BlockId, def: SsaOpId) -> Option<Vec<SsaOpId>> {
    let name = cfg.ops.get(def).name.unwrap();
    let basic_block = cfg.blocks.get_mut(&block)?;

    let index = basic_block.statements.iter().position(
        |statement| matches!(statement, Statement::Assign { target, .. } if *target == name),
    )?;
    if basic_block.statements[index].contains_call() {
        return None;
    }
    if basic_block
        .chis
        .iter()
        .any(|chi| chi.statement_index == index)
    {
        return None;
    }

    let statement = basic_block.statements.remove(index);
    for chi in &mut basic_block.chis {
        if chi.statement_index > index {
            chi.statement_index -= 1;
        }
    }

    let mut read = Vec::new();
    statement.for_each_used_var(&mut |var| read.push(*var));
    Some(use_ops_in_block(cfg, block, &read))
}

fn remove_dead_phi(cfg: &mut Cfg, block: BlockId, def: SsaOpId) -> Option<Vec<SsaOpId>> {
    let name = cfg.ops.get(def).name.unwrap();
    let basic_block = cfg.blocks.get_mut(&block)?;

    let index = basic_block
        .phis
        .iter()
        .position(|phi| phi.destination == name)?;
    let phi = basic_block.phis.remove(index);

    let mut use_ops = Vec::new();
    for (pred, source) in phi.sources {
        use_ops.extend(use_ops_in_block(cfg, pred, &[source]));
    }
    Some(use_ops)
}

/// The use operands recorded in `block` for the given versions, one per
/// occurrence.
fn use_ops_in_block(
    cfg: &Cfg,
    block: BlockId,
    versions: &[crate::ir::Variable],
) -> Vec<SsaOpId> {
    let mut remaining: Vec<_> = versions.to_vec();
    let mut out = Vec::new();
    for op in cfg.ops.iter() {
        if op.block != block || op.direction != Direction::Use {
            continue;
        }
        let Some(name) = op.name else { continue };
        if let Some(position) = remaining.iter().position(|v| *v == name) {
            remaining.swap_remove(position);
            out.push(op.id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Expr, Statement, Variable},
        middle::cfg::Cfg,
        options::CompilerOptions,
    };

    #[test]
    fn unused_assignments_disappear_transitively() {
        // b feeds only a, and a feeds nothing
        let body = vec![
            Statement::Assign {
                target: Variable::named("b"),
                value: Expr::literal_int(1),
            },
            Statement::Assign {
                target: Variable::named("a"),
                value: Expr::var("b"),
            },
            Statement::Print(Expr::literal_int(0)),
        ];
        let mut cfg = Cfg::new(&[], &body);
        cfg.convert_to_ssa_form();

        DeadCodeElimination.optimize(&mut cfg, &CompilerOptions::default());

        let entry = cfg.entry();
        assert_eq!(cfg.blocks[&entry].statements.len(), 1);
        assert!(matches!(
            cfg.blocks[&entry].statements[0],
            Statement::Print(_)
        ));
    }

    #[test]
    fn calls_are_never_removed() {
        let body = vec![Statement::Assign {
            target: Variable::named("unused"),
            value: Expr::Call {
                function: crate::intern::InternedSymbol::new("effectful"),
                arguments: vec![],
            },
        }];
        let mut cfg = Cfg::new(&[], &body);
        cfg.convert_to_ssa_form();

        DeadCodeElimination.optimize(&mut cfg, &CompilerOptions::default());

        let entry = cfg.entry();
        assert_eq!(cfg.blocks[&entry].statements.len(), 1);
    }

    #[test]
    fn live_assignments_survive() {
        let body = vec![
            Statement::Assign {
                target: Variable::named("x"),
                value: Expr::literal_int(7),
            },
            Statement::Return(Some(Expr::var("x"))),
        ];
        let mut cfg = Cfg::new(&[], &body);
        cfg.convert_to_ssa_form();

        DeadCodeElimination.optimize(&mut cfg, &CompilerOptions::default());

        let entry = cfg.entry();
        assert_eq!(cfg.blocks[&entry].statements.len(), 1);
        assert!(matches!(
            cfg.blocks[&entry].statements[0],
            Statement::Assign { .. }
        ));
    }
}
