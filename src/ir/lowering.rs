//! Stage-to-stage lowering transforms. The pass manager applies these
//! between queue walks; they are not passes themselves and have no names.

use hashbrown::HashMap;

use crate::{
    index::Index,
    ir::{Expr, IrLevel, LabelId, Program, Statement, Variable},
};

/// Flattens every expression to three-address form, introducing `$tN`
/// temporaries for nested operands. Structured control flow is untouched.
pub fn lower_to_hir(program: &mut Program) {
    assert!(program.is_ast(), "HIR lowering expects an AST-level program");

    let mut temps = TempAllocator::default();
    let statements = std::mem::take(&mut program.statements);
    program.statements = lower_body(statements, &mut temps);
    program.level = IrLevel::Hir;
}

/// Replaces structured control flow with labels, gotos, and branches. Label
/// ids are allocated per function body.
pub fn lower_to_mir(program: &mut Program) {
    assert!(program.is_hir(), "MIR lowering expects an HIR-level program");

    let mut labels = LabelAllocator::default();
    let mut flat = Vec::new();
    let statements = std::mem::take(&mut program.statements);
    flatten_body(statements, &mut labels, &mut flat);
    program.statements = flat;
    program.level = IrLevel::Mir;
}

#[derive(Default)]
struct TempAllocator {
    next: u32,
}

impl TempAllocator {
    fn fresh(&mut self) -> Variable {
        let temp = Variable::named(&format!("$t{}", self.next));
        self.next += 1;
        temp
    }
}

fn lower_body(statements: Vec<Statement>, temps: &mut TempAllocator) -> Vec<Statement> {
    let mut out = Vec::new();
    for statement in statements {
        lower_statement(statement, temps, &mut out);
    }
    out
}

fn lower_statement(statement: Statement, temps: &mut TempAllocator, out: &mut Vec<Statement>) {
    match statement {
        Statement::Function {
            name,
            parameters,
            body,
        } => {
            // Temporaries are function-local, so each body restarts at $t0
            let mut temps = TempAllocator::default();
            out.push(Statement::Function {
                name,
                parameters,
                body: lower_body(body, &mut temps),
            });
        }
        Statement::Assign { target, value } => {
            let value = flatten_shallow(value, temps, out);
            out.push(Statement::Assign { target, value });
        }
        Statement::Print(value) => {
            let value = flatten_shallow(value, temps, out);
            out.push(Statement::Print(value));
        }
        Statement::Return(value) => {
            let value = value.map(|v| flatten_shallow(v, temps, out));
            out.push(Statement::Return(value));
        }
        Statement::Expr(value) => {
            let value = flatten_shallow(value, temps, out);
            out.push(Statement::Expr(value));
        }
        Statement::If {
            condition,
            then_body,
            else_body,
        } => {
            let condition = flatten_shallow(condition, temps, out);
            out.push(Statement::If {
                condition,
                then_body: lower_body(then_body, temps),
                else_body: lower_body(else_body, temps),
            });
        }
        Statement::While { condition, body } => {
            // The condition's temporaries have to be recomputed on every
            // trip around the loop, so the flattening prefix is emitted once
            // before the loop and again at the end of the body.
            let mut prefix = Vec::new();
            let condition = flatten_shallow(condition, temps, &mut prefix);
            let mut body = lower_body(body, temps);
            body.extend(prefix.iter().cloned());
            out.extend(prefix);
            out.push(Statement::While { condition, body });
        }
        flat @ (Statement::Label(_) | Statement::Goto(_) | Statement::Branch { .. }) => {
            // Flat control flow cannot appear before MIR lowering; the
            // well-formedness check rejects it, so just pass it through here
            out.push(flat);
        }
    }
}

/// Reduces an expression to at most one operator applied to simple operands,
/// emitting temporary assignments for anything deeper.
fn flatten_shallow(expr: Expr, temps: &mut TempAllocator, out: &mut Vec<Statement>) -> Expr {
    match expr {
        Expr::Literal(_) | Expr::Var(_) => expr,
        Expr::Unary { operator, operand } => Expr::Unary {
            operator,
            operand: Box::new(flatten_operand(*operand, temps, out)),
        },
        Expr::Binary { operator, lhs, rhs } => Expr::Binary {
            operator,
            lhs: Box::new(flatten_operand(*lhs, temps, out)),
            rhs: Box::new(flatten_operand(*rhs, temps, out)),
        },
        Expr::Call {
            function,
            arguments,
        } => Expr::Call {
            function,
            arguments: arguments
                .into_iter()
                .map(|argument| flatten_operand(argument, temps, out))
                .collect(),
        },
    }
}

fn flatten_operand(expr: Expr, temps: &mut TempAllocator, out: &mut Vec<Statement>) -> Expr {
    if expr.is_simple() {
        return expr;
    }

    let value = flatten_shallow(expr, temps, out);
    let temp = temps.fresh();
    out.push(Statement::Assign {
        target: temp,
        value,
    });
    Expr::Var(temp)
}

#[derive(Default)]
struct LabelAllocator {
    next: u32,
}

impl LabelAllocator {
    fn fresh(&mut self) -> LabelId {
        let label = LabelId::new(self.next as usize);
        self.next += 1;
        label
    }
}

fn flatten_body(statements: Vec<Statement>, labels: &mut LabelAllocator, out: &mut Vec<Statement>) {
    for statement in statements {
        match statement {
            Statement::Function {
                name,
                parameters,
                body,
            } => {
                let mut labels = LabelAllocator::default();
                let mut flat = Vec::new();
                flatten_body(body, &mut labels, &mut flat);
                out.push(Statement::Function {
                    name,
                    parameters,
                    body: flat,
                });
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                let then_label = labels.fresh();
                let else_label = labels.fresh();
                let end_label = labels.fresh();
                out.push(Statement::Branch {
                    condition,
                    positive: then_label,
                    negative: else_label,
                });
                out.push(Statement::Label(then_label));
                flatten_body(then_body, labels, out);
                out.push(Statement::Goto(end_label));
                out.push(Statement::Label(else_label));
                flatten_body(else_body, labels, out);
                out.push(Statement::Label(end_label));
            }
            Statement::While { condition, body } => {
                let test_label = labels.fresh();
                let body_label = labels.fresh();
                let end_label = labels.fresh();
                out.push(Statement::Label(test_label));
                out.push(Statement::Branch {
                    condition,
                    positive: body_label,
                    negative: end_label,
                });
                out.push(Statement::Label(body_label));
                flatten_body(body, labels, out);
                out.push(Statement::Goto(test_label));
                out.push(Statement::Label(end_label));
            }
            other => out.push(other),
        }
    }
}

/// Rebuilds a more readable rendition of a MIR statement list for the
/// uppered dump: temporaries that are assigned once, used once, and whose
/// value is call-free are folded back into their use site. Control flow
/// stays flat.
pub fn upper(statements: &[Statement]) -> Vec<Statement> {
    let mut assignment_counts: HashMap<Variable, usize> = HashMap::new();
    let mut use_counts: HashMap<Variable, usize> = HashMap::new();

    for statement in statements {
        if let Statement::Assign { target, .. } = statement {
            if target.symbol.is_temporary() {
                *assignment_counts.entry(*target).or_default() += 1;
            }
        }
        statement.for_each_used_var(&mut |var| {
            *use_counts.entry(*var).or_default() += 1;
        });
    }

    let mut inlined: HashMap<Variable, Expr> = HashMap::new();
    let mut out = Vec::new();

    for statement in statements {
        match statement {
            Statement::Function {
                name,
                parameters,
                body,
            } => out.push(Statement::Function {
                name: *name,
                parameters: parameters.clone(),
                body: upper(body),
            }),
            Statement::Assign { target, value }
                if assignment_counts.get(target) == Some(&1)
                    && use_counts.get(target) == Some(&1)
                    && !value.contains_call() =>
            {
                inlined.insert(*target, substitute(value.clone(), &inlined));
            }
            other => {
                let mut statement = other.clone();
                substitute_statement(&mut statement, &inlined);
                out.push(statement);
            }
        }
    }

    out
}

fn substitute(expr: Expr, inlined: &HashMap<Variable, Expr>) -> Expr {
    match expr {
        Expr::Var(var) => match inlined.get(&var) {
            Some(replacement) => replacement.clone(),
            None => Expr::Var(var),
        },
        Expr::Literal(_) => expr,
        Expr::Unary { operator, operand } => Expr::Unary {
            operator,
            operand: Box::new(substitute(*operand, inlined)),
        },
        Expr::Binary { operator, lhs, rhs } => Expr::Binary {
            operator,
            lhs: Box::new(substitute(*lhs, inlined)),
            rhs: Box::new(substitute(*rhs, inlined)),
        },
        Expr::Call {
            function,
            arguments,
        } => Expr::Call {
            function,
            arguments: arguments
                .into_iter()
                .map(|argument| substitute(argument, inlined))
                .collect(),
        },
    }
}

fn substitute_statement(statement: &mut Statement, inlined: &HashMap<Variable, Expr>) {
    match statement {
        Statement::Assign { value, .. }
        | Statement::Print(value)
        | Statement::Expr(value)
        | Statement::Return(Some(value)) => *value = substitute(value.clone(), inlined),
        Statement::Branch { condition, .. } => *condition = substitute(condition.clone(), inlined),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinaryOp;

    fn nested_assign() -> Statement {
        // total = (a + b) * c
        Statement::Assign {
            target: Variable::named("total"),
            value: Expr::Binary {
                operator: BinaryOp::Multiply,
                lhs: Box::new(Expr::Binary {
                    operator: BinaryOp::Add,
                    lhs: Box::new(Expr::var("a")),
                    rhs: Box::new(Expr::var("b")),
                }),
                rhs: Box::new(Expr::var("c")),
            },
        }
    }

    #[test]
    fn hir_lowering_flattens_nested_expressions() {
        let mut program = Program::new_ast(vec![nested_assign()]);
        lower_to_hir(&mut program);

        assert!(program.is_hir());
        assert_eq!(program.statements.len(), 2);

        let Statement::Assign { target, value } = &program.statements[0] else {
            panic!("expected a temporary assignment first");
        };
        assert!(target.symbol.is_temporary());
        assert!(matches!(value, Expr::Binary { .. }));

        let Statement::Assign { value, .. } = &program.statements[1] else {
            panic!("expected the original assignment second");
        };
        let Expr::Binary { lhs, rhs, .. } = value else {
            panic!("expected a shallow binary rvalue");
        };
        assert!(lhs.is_simple());
        assert!(rhs.is_simple());
    }

    #[test]
    fn mir_lowering_flattens_control_flow() {
        let mut program = Program::new_ast(vec![Statement::While {
            condition: Expr::var("going"),
            body: vec![Statement::Print(Expr::var("going"))],
        }]);
        lower_to_hir(&mut program);
        lower_to_mir(&mut program);

        assert!(program.is_mir());
        assert!(program.statements.iter().all(|s| !s.is_structured_control()));
        assert!(program
            .statements
            .iter()
            .any(|s| matches!(s, Statement::Branch { .. })));
        assert!(program
            .statements
            .iter()
            .any(|s| matches!(s, Statement::Goto(_))));
    }

    #[test]
    fn uppering_reinlines_single_use_temporaries() {
        let mut program = Program::new_ast(vec![nested_assign()]);
        lower_to_hir(&mut program);
        lower_to_mir(&mut program);

        let uppered = upper(&program.statements);
        assert_eq!(uppered.len(), 1);
        let Statement::Assign { value, .. } = &uppered[0] else {
            panic!("expected the folded assignment");
        };
        let Expr::Binary { lhs, .. } = value else {
            panic!("expected the multiply to survive");
        };
        assert!(matches!(**lhs, Expr::Binary { .. }));
    }
}
