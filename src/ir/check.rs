//! Global IR well-formedness check, run after every pass when `--check` is
//! given. A violation means the previous pass broke an invariant the next
//! pass relies on, so the failure names that pass.

use hashbrown::HashSet;

use crate::{
    fatal_error,
    ir::{IrLevel, LabelId, Program, Statement},
};

pub fn check(program: &Program, last_pass: &str) {
    check_body(&program.statements, program.level, true, last_pass);
}

fn check_body(statements: &[Statement], level: IrLevel, top_level: bool, last_pass: &str) {
    let mut defined_labels: HashSet<LabelId> = HashSet::new();
    let mut referenced_labels: Vec<LabelId> = Vec::new();

    for statement in statements {
        match statement {
            Statement::Function { body, .. } => {
                if !top_level {
                    violation(last_pass, "nested function definition");
                }
                check_body(body, level, false, last_pass);
            }
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                if level == IrLevel::Mir {
                    violation(last_pass, "structured `if` in MIR");
                }
                check_body(then_body, level, false, last_pass);
                check_body(else_body, level, false, last_pass);
            }
            Statement::While { body, .. } => {
                if level == IrLevel::Mir {
                    violation(last_pass, "structured `while` in MIR");
                }
                check_body(body, level, false, last_pass);
            }
            Statement::Label(label) => {
                if level != IrLevel::Mir {
                    violation(last_pass, "label before MIR lowering");
                }
                if !defined_labels.insert(*label) {
                    violation(last_pass, &format!("label {label} defined twice"));
                }
            }
            Statement::Goto(label) => {
                if level != IrLevel::Mir {
                    violation(last_pass, "goto before MIR lowering");
                }
                referenced_labels.push(*label);
            }
            Statement::Branch {
                positive, negative, ..
            } => {
                if level != IrLevel::Mir {
                    violation(last_pass, "branch before MIR lowering");
                }
                referenced_labels.push(*positive);
                referenced_labels.push(*negative);
            }
            _ => {}
        }
    }

    for label in referenced_labels {
        if !defined_labels.contains(&label) {
            violation(last_pass, &format!("jump to undefined label {label}"));
        }
    }
}

fn violation(last_pass: &str, detail: &str) -> ! {
    fatal_error!("IR invariant violated after pass '{last_pass}': {detail}");
}
