//! The standard pipeline. `register_standard_passes` fills a manager with
//! the passes every compilation gets; plugins and embedders rearrange from
//! there.

use std::collections::BTreeSet;

use colored::Colorize;

use crate::{
    intern::InternedSymbol,
    ir::{pretty_print, Program, Statement},
    middle::{
        cfg::Cfg,
        optimization::{constant_fold::ConstantFold, dead_code::DeadCodeElimination},
    },
    options::CompilerOptions,
    pass_manager::{CfgOptimization, IrTransform, IrVisitor, Pass, PassManager, Stage},
};

pub fn register_standard_passes(manager: &mut PassManager) {
    manager.add_ast_visitor(
        "resolve",
        "Warns about variables that may be read before they are written",
        Box::new(ResolveVariables),
    );

    manager.add_hir_transform(
        "simplify",
        "Removes unreachable statements and conditionals with no effect",
        Box::new(Simplify),
    );

    // The optimization queue's shape is structural: the driver treats the
    // first two and the last pass as the CFG build, SSA entry, and SSA exit
    // points, whatever their names are.
    manager.add_optimization(
        "cfg",
        "Builds the control-flow graph for each function",
        Box::new(StructuralMarker),
    );
    manager.add_optimization(
        "ssa",
        "Converts each function's control-flow graph into SSA form",
        Box::new(StructuralMarker),
    );
    manager.add_pass(
        Pass::optimization(
            "constant-fold",
            "Propagates single-assignment constants and evaluates operators over literals",
            Box::new(ConstantFold),
        )
        .enabled_if(|options| options.optimize > 0),
        Stage::Optimization,
    );
    manager.add_pass(
        Pass::optimization(
            "dce",
            "Removes definitions whose values are never read",
            Box::new(DeadCodeElimination),
        )
        .enabled_if(|options| options.optimize > 0),
        Stage::Optimization,
    );
    manager.add_optimization(
        "out-ssa",
        "Converts each function out of SSA form and linearizes its control-flow graph",
        Box::new(StructuralMarker),
    );

    manager.add_codegen_visitor(
        "unparse",
        "Prints the compiled program",
        Box::new(Unparse),
    );
}

/// Flags variables that are read on some path before any assignment reaches
/// them. Quill variables spring into existence on first write, so this is a
/// warning, not an error.
pub struct ResolveVariables;

impl IrVisitor for ResolveVariables {
    fn visit(&mut self, program: &Program, _options: &CompilerOptions) {
        let mut top_level_assigned = BTreeSet::new();
        for statement in &program.statements {
            match statement {
                Statement::Function {
                    name,
                    parameters,
                    body,
                } => {
                    let mut assigned: BTreeSet<InternedSymbol> =
                        parameters.iter().copied().collect();
                    warn_unassigned_reads(body, &mut assigned, name.value());
                }
                other => {
                    warn_unassigned_reads(
                        std::slice::from_ref(other),
                        &mut top_level_assigned,
                        "the top level",
                    );
                }
            }
        }
    }
}

fn warn_unassigned_reads(
    body: &[Statement],
    assigned: &mut BTreeSet<InternedSymbol>,
    scope: &str,
) {
    for statement in body {
        statement.for_each_used_var(&mut |var| {
            if !assigned.contains(&var.symbol) {
                eprintln!(
                    "{}: variable '{}' may be read before it is written in {scope}",
                    "warning".yellow(),
                    var.symbol
                );
                // One warning per name is enough
                assigned.insert(var.symbol);
            }
        });

        match statement {
            Statement::Assign { target, .. } => {
                assigned.insert(target.symbol);
            }
            // Either branch may or may not run; treating their assignments
            // as unconditional keeps this to one warning per genuine case
            // at the cost of missing some conditional ones
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                warn_unassigned_reads(then_body, assigned, scope);
                warn_unassigned_reads(else_body, assigned, scope);
            }
            Statement::While { body, .. } => {
                warn_unassigned_reads(body, assigned, scope);
            }
            _ => {}
        }
    }
}

/// Structural cleanup at the HIR level: statements after a `return` in the
/// same body can never run, self-assignments do nothing, and a conditional
/// with two empty arms does nothing (its flattened condition is side-effect
/// free by then).
pub struct Simplify;

impl IrTransform for Simplify {
    fn transform(&mut self, program: &mut Program, _options: &CompilerOptions) {
        for statement in &mut program.statements {
            if let Statement::Function { body, .. } = statement {
                simplify_body(body);
            }
        }
    }
}

fn simplify_body(body: &mut Vec<Statement>) {
    if let Some(position) = body
        .iter()
        .position(|statement| matches!(statement, Statement::Return(_)))
    {
        body.truncate(position + 1);
    }

    for statement in body.iter_mut() {
        match statement {
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                simplify_body(then_body);
                simplify_body(else_body);
            }
            Statement::While { body, .. } => simplify_body(body),
            _ => {}
        }
    }

    body.retain(|statement| {
        !matches!(
            statement,
            Statement::Assign {
                target,
                value: crate::ir::Expr::Var(source),
            } if target == source
        ) && !matches!(
            statement,
            Statement::If {
                condition,
                then_body,
                else_body,
            } if then_body.is_empty() && else_body.is_empty() && !condition.contains_call()
        )
    });
}

/// Placeholder for the optimization queue's structural slots. The driver
/// performs the actual CFG and SSA conversions itself; these exist so the
/// slots are named, listable, and addressable like any other pass.
pub struct StructuralMarker;

impl CfgOptimization for StructuralMarker {
    fn optimize(&mut self, _cfg: &mut Cfg, _options: &CompilerOptions) {}
}

/// Prints the final program. Runs at the codegen stage, after the
/// optimization driver has linearized every function back to flat MIR.
pub struct Unparse;

impl IrVisitor for Unparse {
    fn visit(&mut self, program: &Program, _options: &CompilerOptions) {
        pretty_print::unparse(program);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expr, Variable};

    #[test]
    fn simplify_drops_unreachable_statements() {
        let mut program = Program {
            level: crate::ir::IrLevel::Hir,
            statements: vec![Statement::Function {
                name: InternedSymbol::new("f"),
                parameters: vec![],
                body: vec![
                    Statement::Return(Some(Expr::literal_int(1))),
                    Statement::Assign {
                        target: Variable::named("never"),
                        value: Expr::literal_int(2),
                    },
                ],
            }],
        };

        Simplify.transform(&mut program, &CompilerOptions::default());

        let Statement::Function { body, .. } = &program.statements[0] else {
            unreachable!();
        };
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn simplify_drops_empty_conditionals() {
        let mut program = Program {
            level: crate::ir::IrLevel::Hir,
            statements: vec![Statement::Function {
                name: InternedSymbol::new("f"),
                parameters: vec![],
                body: vec![Statement::If {
                    condition: Expr::var("x"),
                    then_body: vec![],
                    else_body: vec![],
                }],
            }],
        };

        Simplify.transform(&mut program, &CompilerOptions::default());

        let Statement::Function { body, .. } = &program.statements[0] else {
            unreachable!();
        };
        assert!(body.is_empty());
    }

    #[test]
    fn standard_pipeline_has_the_expected_shape() {
        let mut manager = PassManager::new(CompilerOptions::default());
        register_standard_passes(&mut manager);

        assert_eq!(manager.stage_of_pass("resolve"), Some(Stage::Ast));
        assert_eq!(manager.stage_of_pass("simplify"), Some(Stage::Hir));
        assert_eq!(manager.stage_of_pass("dce"), Some(Stage::Optimization));
        assert_eq!(manager.stage_of_pass("unparse"), Some(Stage::Codegen));
        assert_eq!(manager.optimization_queue.len(), 5);
    }
}
