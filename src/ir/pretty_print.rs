use colored::Colorize;
use itertools::Itertools;

use crate::ir::{lowering, Expr, Program, Statement, Value};

/// Prints the program in source-like form, one statement per line.
pub fn unparse(program: &Program) {
    println!(
        "{} {}",
        "//".white(),
        format!("{} level", program.level).white()
    );
    for statement in &program.statements {
        print_statement(statement, 0);
    }
}

/// Prints the program with compiler temporaries folded back into their use
/// sites. Only defined for MIR; the pass manager rejects uppered dumps at
/// other levels before calling this.
pub fn unparse_uppered(program: &Program) {
    assert!(program.is_mir(), "uppering is only defined for MIR");

    let uppered = lowering::upper(&program.statements);
    println!("{} {}", "//".white(), "mir level (uppered)".white());
    for statement in &uppered {
        print_statement(statement, 0);
    }
}

fn print_statement(statement: &Statement, indent: usize) {
    let pad = "    ".repeat(indent);
    match statement {
        Statement::Function {
            name,
            parameters,
            body,
        } => {
            println!(
                "{pad}{} {}{}{}{} {}",
                "fn".magenta(),
                name.value().blue(),
                "(".white(),
                parameters.iter().map(|p| p.value()).join(", ").white(),
                ")".white(),
                "{".white()
            );
            for statement in body {
                print_statement(statement, indent + 1);
            }
            println!("{pad}{}", "}".white());
        }
        Statement::Assign { target, value } => {
            println!("{pad}{target} {} {value};", "=".white())
        }
        Statement::Print(value) => println!("{pad}{} {value};", "print".cyan()),
        Statement::Return(Some(value)) => println!("{pad}{} {value};", "return".magenta()),
        Statement::Return(None) => println!("{pad}{};", "return".magenta()),
        Statement::Expr(value) => println!("{pad}{value};"),
        Statement::If {
            condition,
            then_body,
            else_body,
        } => {
            println!("{pad}{} {condition} {}", "if".magenta(), "{".white());
            for statement in then_body {
                print_statement(statement, indent + 1);
            }
            if !else_body.is_empty() {
                println!("{pad}{} {} {}", "}".white(), "else".magenta(), "{".white());
                for statement in else_body {
                    print_statement(statement, indent + 1);
                }
            }
            println!("{pad}{}", "}".white());
        }
        Statement::While { condition, body } => {
            println!("{pad}{} {condition} {}", "while".magenta(), "{".white());
            for statement in body {
                print_statement(statement, indent + 1);
            }
            println!("{pad}{}", "}".white());
        }
        Statement::Label(label) => println!("{pad}{}:", label.to_string().bright_red()),
        Statement::Goto(label) => {
            println!("{pad}{} {};", "goto".cyan(), label.to_string().bright_red())
        }
        Statement::Branch {
            condition,
            positive,
            negative,
        } => println!(
            "{pad}{} {condition} {} {}{};",
            "branch".cyan(),
            positive.to_string().bright_red(),
            "else ".white(),
            negative.to_string().bright_red()
        ),
    }
}

impl core::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Var(var) => write!(f, "{var}"),
            Expr::Unary { operator, operand } => write!(f, "{operator}{operand}"),
            Expr::Binary { operator, lhs, rhs } => write!(f, "{lhs} {operator} {rhs}"),
            Expr::Call {
                function,
                arguments,
            } => write!(
                f,
                "{}({})",
                function,
                arguments.iter().map(ToString::to_string).join(", ")
            ),
        }
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value:?}"),
            Value::Null => f.write_str("null"),
        }
    }
}

/// Renders the statement tree as a graphviz digraph.
pub fn dot_dump(program: &Program) -> String {
    let mut out = String::from("digraph program {\n  node [shape=box];\n");
    let mut next_id = 0usize;
    for statement in &program.statements {
        dot_statement(statement, None, &mut next_id, &mut out);
    }
    out.push_str("}\n");
    out
}

fn dot_statement(
    statement: &Statement,
    parent: Option<usize>,
    next_id: &mut usize,
    out: &mut String,
) {
    let id = *next_id;
    *next_id += 1;

    let label = match statement {
        Statement::Function { name, .. } => format!("fn {name}"),
        Statement::Assign { target, value } => format!("{target} = {value}"),
        Statement::Print(value) => format!("print {value}"),
        Statement::Return(Some(value)) => format!("return {value}"),
        Statement::Return(None) => "return".to_string(),
        Statement::Expr(value) => value.to_string(),
        Statement::If { condition, .. } => format!("if {condition}"),
        Statement::While { condition, .. } => format!("while {condition}"),
        Statement::Label(label) => format!("{label}:"),
        Statement::Goto(label) => format!("goto {label}"),
        Statement::Branch {
            condition,
            positive,
            negative,
        } => format!("branch {condition} ? {positive} : {negative}"),
    };
    out.push_str(&format!(
        "  n{id} [label=\"{}\"];\n",
        label.replace('\\', "\\\\").replace('"', "\\\"")
    ));
    if let Some(parent) = parent {
        out.push_str(&format!("  n{parent} -> n{id};\n"));
    }

    match statement {
        Statement::Function { body, .. } | Statement::While { body, .. } => {
            for statement in body {
                dot_statement(statement, Some(id), next_id, out);
            }
        }
        Statement::If {
            then_body,
            else_body,
            ..
        } => {
            for statement in then_body.iter().chain(else_body) {
                dot_statement(statement, Some(id), next_id, out);
            }
        }
        _ => {}
    }
}

/// Renders the program as an XML document for tooling that wants structure
/// rather than source text.
pub fn xml_dump(program: &Program) -> String {
    let mut out = format!("<program level=\"{}\">\n", program.level);
    for statement in &program.statements {
        xml_statement(statement, 1, &mut out);
    }
    out.push_str("</program>\n");
    out
}

fn xml_statement(statement: &Statement, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match statement {
        Statement::Function {
            name,
            parameters,
            body,
        } => {
            out.push_str(&format!(
                "{pad}<function name=\"{name}\" parameters=\"{}\">\n",
                parameters.iter().map(|p| p.value()).join(",")
            ));
            for statement in body {
                xml_statement(statement, indent + 1, out);
            }
            out.push_str(&format!("{pad}</function>\n"));
        }
        Statement::Assign { target, value } => out.push_str(&format!(
            "{pad}<assign target=\"{target}\" value=\"{}\"/>\n",
            escape(&value.to_string())
        )),
        Statement::Print(value) => out.push_str(&format!(
            "{pad}<print value=\"{}\"/>\n",
            escape(&value.to_string())
        )),
        Statement::Return(value) => out.push_str(&format!(
            "{pad}<return value=\"{}\"/>\n",
            escape(&value.as_ref().map(ToString::to_string).unwrap_or_default())
        )),
        Statement::Expr(value) => out.push_str(&format!(
            "{pad}<expr value=\"{}\"/>\n",
            escape(&value.to_string())
        )),
        Statement::If {
            condition,
            then_body,
            else_body,
        } => {
            out.push_str(&format!(
                "{pad}<if condition=\"{}\">\n",
                escape(&condition.to_string())
            ));
            for statement in then_body {
                xml_statement(statement, indent + 1, out);
            }
            if !else_body.is_empty() {
                out.push_str(&format!("{pad}<else>\n"));
                for statement in else_body {
                    xml_statement(statement, indent + 1, out);
                }
                out.push_str(&format!("{pad}</else>\n"));
            }
            out.push_str(&format!("{pad}</if>\n"));
        }
        Statement::While { condition, body } => {
            out.push_str(&format!(
                "{pad}<while condition=\"{}\">\n",
                escape(&condition.to_string())
            ));
            for statement in body {
                xml_statement(statement, indent + 1, out);
            }
            out.push_str(&format!("{pad}</while>\n"));
        }
        Statement::Label(label) => out.push_str(&format!("{pad}<label id=\"{label}\"/>\n")),
        Statement::Goto(label) => out.push_str(&format!("{pad}<goto target=\"{label}\"/>\n")),
        Statement::Branch {
            condition,
            positive,
            negative,
        } => out.push_str(&format!(
            "{pad}<branch condition=\"{}\" positive=\"{positive}\" negative=\"{negative}\"/>\n",
            escape(&condition.to_string())
        )),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
