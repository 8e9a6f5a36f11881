//! Constant propagation and folding over one SSA-form CFG. A version
//! assigned a literal exactly once can replace its uses; operators over
//! literal operands evaluate at compile time; a branch whose condition folds
//! to a literal becomes an unconditional jump.

use hashbrown::HashMap;

use crate::{
    ir::{BinaryOp, Expr, Statement, UnaryOp, Value, Variable},
    middle::{
        cfg::{Cfg, Terminator},
        ssa_ops::SsaOpKind,
    },
    options::CompilerOptions,
    pass_manager::CfgOptimization,
    trace,
};

pub struct ConstantFold;

impl CfgOptimization for ConstantFold {
    fn optimize(&mut self, cfg: &mut Cfg, _options: &CompilerOptions) {
        let mut folded_branch = false;

        loop {
            let constants = collect_constants(cfg);
            let mut changed = false;

            for block in cfg.blocks.values_mut() {
                for statement in &mut block.statements {
                    changed |= fold_statement(statement, &constants);
                }

                match &mut block.terminator {
                    Terminator::Branch { condition, .. } => {
                        changed |= fold_expr(condition, &constants);
                    }
                    Terminator::Return(Some(value)) => {
                        changed |= fold_expr(value, &constants);
                    }
                    _ => {}
                }

                // A literal condition decides the branch now
                if let Terminator::Branch {
                    condition: Expr::Literal(value),
                    positive,
                    negative,
                } = &block.terminator
                {
                    let target = if truthy(value) { *positive } else { *negative };
                    trace!("folding branch in {} to {target}", block.id);
                    block.terminator = Terminator::Jump(target);
                    changed = true;
                    folded_branch = true;
                }
            }

            if !changed {
                break;
            }
        }

        // Folded branches drop edges; phis must not keep sources for
        // predecessors that no longer exist
        if folded_branch {
            cfg.recompute_predecessors();
            let ids: Vec<_> = cfg.blocks.keys().copied().collect();
            for id in ids {
                let predecessors = cfg.blocks[&id].predecessors.clone();
                for phi in &mut cfg.blocks.get_mut(&id).unwrap().phis {
                    phi.sources.retain(|pred, _| predecessors.contains(pred));
                }
            }
        }
    }
}

/// Versions assigned a literal by a plain statement. Versions created by
/// phis or chis merge multiple reaching values and are never constant here,
/// which the operand web's def kind tells us directly.
fn collect_constants(cfg: &Cfg) -> HashMap<Variable, Value> {
    let mut constants = HashMap::new();
    for block in cfg.blocks.values() {
        for statement in &block.statements {
            if let Statement::Assign {
                target,
                value: Expr::Literal(value),
            } = statement
            {
                let is_plain_def = cfg
                    .ops
                    .def_of(target)
                    .map_or(false, |id| cfg.ops.get(id).kind == SsaOpKind::Statement);
                if target.version.is_some() && is_plain_def {
                    constants.insert(*target, value.clone());
                }
            }
        }
    }
    constants
}

fn fold_statement(statement: &mut Statement, constants: &HashMap<Variable, Value>) -> bool {
    match statement {
        Statement::Assign { value, .. } => fold_expr(value, constants),
        Statement::Print(value) | Statement::Expr(value) => fold_expr(value, constants),
        Statement::Return(Some(value)) => fold_expr(value, constants),
        _ => false,
    }
}

fn fold_expr(expr: &mut Expr, constants: &HashMap<Variable, Value>) -> bool {
    match expr {
        Expr::Var(var) => {
            if let Some(value) = constants.get(var) {
                trace!("propagating {var} = {value:?}");
                *expr = Expr::Literal(value.clone());
                true
            } else {
                false
            }
        }
        Expr::Literal(_) => false,
        Expr::Unary { operator, operand } => {
            let mut changed = fold_expr(operand, constants);
            if let Expr::Literal(value) = operand.as_ref() {
                if let Some(folded) = evaluate_unary(*operator, value) {
                    *expr = Expr::Literal(folded);
                    changed = true;
                }
            }
            changed
        }
        Expr::Binary { operator, lhs, rhs } => {
            let mut changed = fold_expr(lhs, constants);
            changed |= fold_expr(rhs, constants);
            if let (Expr::Literal(left), Expr::Literal(right)) = (lhs.as_ref(), rhs.as_ref()) {
                if let Some(folded) = evaluate_binary(*operator, left, right) {
                    *expr = Expr::Literal(folded);
                    changed = true;
                }
            }
            changed
        }
        Expr::Call { arguments, .. } => {
            let mut changed = false;
            for argument in arguments {
                changed |= fold_expr(argument, constants);
            }
            changed
        }
    }
}

fn evaluate_unary(operator: UnaryOp, value: &Value) -> Option<Value> {
    match (operator, value) {
        (UnaryOp::Negate, Value::Int(n)) => Some(Value::Int(n.wrapping_neg())),
        (UnaryOp::Not, value) => Some(Value::Bool(!truthy(value))),
        _ => None,
    }
}

fn evaluate_binary(operator: BinaryOp, left: &Value, right: &Value) -> Option<Value> {
    use BinaryOp::*;

    match (left, right) {
        (Value::Int(a), Value::Int(b)) => match operator {
            Add => Some(Value::Int(a.wrapping_add(*b))),
            Subtract => Some(Value::Int(a.wrapping_sub(*b))),
            Multiply => Some(Value::Int(a.wrapping_mul(*b))),
            // Folding a division by zero would hide the runtime error
            Divide if *b != 0 => Some(Value::Int(a.wrapping_div(*b))),
            Divide => None,
            Equals => Some(Value::Bool(a == b)),
            NotEquals => Some(Value::Bool(a != b)),
            LessThan => Some(Value::Bool(a < b)),
            LessOrEqual => Some(Value::Bool(a <= b)),
            GreaterThan => Some(Value::Bool(a > b)),
            GreaterOrEqual => Some(Value::Bool(a >= b)),
        },
        (Value::Bool(a), Value::Bool(b)) => match operator {
            Equals => Some(Value::Bool(a == b)),
            NotEquals => Some(Value::Bool(a != b)),
            _ => None,
        },
        (Value::Str(a), Value::Str(b)) => match operator {
            Add => Some(Value::Str(format!("{a}{b}"))),
            Equals => Some(Value::Bool(a == b)),
            NotEquals => Some(Value::Bool(a != b)),
            _ => None,
        },
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Int(n) => *n != 0,
        Value::Bool(b) => *b,
        Value::Str(s) => !s.is_empty(),
        Value::Null => false,
    }
}
