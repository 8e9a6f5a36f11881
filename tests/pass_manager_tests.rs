//! Queue scheduling behavior: name-addressed insertion and removal, ranged
//! execution, and the downstream-empty short-circuit.

use std::{cell::Cell, rc::Rc};

use quillc::{
    ir::{IrLevel, Program},
    options::CompilerOptions,
    pass_manager::{IrVisitor, Pass, PassManager, Stage},
};

struct Counter {
    count: Rc<Cell<usize>>,
}

impl IrVisitor for Counter {
    fn visit(&mut self, _program: &Program, _options: &CompilerOptions) {
        self.count.set(self.count.get() + 1);
    }
}

fn counting_pass(name: &str, count: &Rc<Cell<usize>>) -> Pass {
    Pass::visitor(
        name,
        "",
        Box::new(Counter {
            count: count.clone(),
        }),
    )
}

fn noop_pass(name: &str) -> Pass {
    counting_pass(name, &Rc::new(Cell::new(0)))
}

fn queue_names(manager: &PassManager, stage: Stage) -> Vec<String> {
    manager
        .queue(stage)
        .iter()
        .map(|pass| pass.borrow().name.clone())
        .collect()
}

#[test]
fn lookup_finds_the_earliest_stage() {
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_pass(noop_pass("shared"), Stage::Mir);
    manager.add_pass(noop_pass("shared"), Stage::Hir);

    assert_eq!(manager.stage_of_pass("shared"), Some(Stage::Hir));
    assert!(manager.has_pass_named("shared"));
    assert_eq!(manager.stage_of_pass("missing"), None);
}

#[test]
fn insertion_is_relative_to_the_named_pass() {
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_pass(noop_pass("first"), Stage::Ast);
    manager.add_pass(noop_pass("last"), Stage::Ast);

    manager.add_before_named_pass(noop_pass("before-last"), "last");
    manager.add_after_named_pass(noop_pass("after-last"), "last");

    assert_eq!(
        queue_names(&manager, Stage::Ast),
        vec!["first", "before-last", "last", "after-last"]
    );
}

#[test]
#[should_panic(expected = "No pass with name")]
fn inserting_before_a_missing_pass_is_fatal() {
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_before_named_pass(noop_pass("orphan"), "missing");
}

#[test]
#[should_panic(expected = "No pass with name")]
fn inserting_after_a_missing_pass_is_fatal() {
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_after_named_pass(noop_pass("orphan"), "missing");
}

#[test]
fn removal_by_name_covers_every_queue() {
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_pass(noop_pass("doomed"), Stage::Ast);
    manager.add_pass(noop_pass("doomed"), Stage::Codegen);
    manager.add_pass(noop_pass("keep"), Stage::Hir);

    manager.remove_pass_named("doomed");

    assert!(!manager.has_pass_named("doomed"));
    assert!(manager.has_pass_named("keep"));

    // Removing a missing name is a no-op
    manager.remove_pass_named("doomed");
}

#[test]
fn remove_after_truncates_here_and_clears_downstream() {
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_pass(noop_pass("a"), Stage::Ast);
    manager.add_pass(noop_pass("b"), Stage::Hir);
    manager.add_pass(noop_pass("c"), Stage::Hir);
    manager.add_pass(noop_pass("d"), Stage::Mir);

    manager.remove_after_named_pass("b");

    assert_eq!(queue_names(&manager, Stage::Ast), vec!["a"]);
    assert_eq!(queue_names(&manager, Stage::Hir), vec!["b"]);
    assert!(manager.queue(Stage::Mir).is_empty());
}

#[test]
fn add_after_each_snapshots_the_queue_length() {
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_pass(noop_pass("a"), Stage::Ast);
    manager.add_pass(noop_pass("b"), Stage::Ast);

    let check = noop_pass("check").into_ref();
    manager.add_after_each_pass_in(Stage::Ast, &check);

    assert_eq!(
        queue_names(&manager, Stage::Ast),
        vec!["a", "check", "b", "check"]
    );
}

#[test]
fn empty_downstream_queues_stop_before_lowering() {
    let count = Rc::new(Cell::new(0));
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_pass(counting_pass("only", &count), Stage::Ast);

    let mut program = Program::new_ast(vec![]);
    manager.run(&mut program, false);

    assert_eq!(count.get(), 1);
    assert_eq!(program.level, IrLevel::Ast);
}

#[test]
fn run_until_stops_after_the_named_pass() {
    let ast_count = Rc::new(Cell::new(0));
    let hir_count = Rc::new(Cell::new(0));
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_pass(counting_pass("early", &ast_count), Stage::Ast);
    manager.add_pass(counting_pass("late", &hir_count), Stage::Hir);

    let mut program = Program::new_ast(vec![]);
    manager.run_until("early", &mut program, false);

    assert_eq!(ast_count.get(), 1);
    assert_eq!(hir_count.get(), 0);
    assert_eq!(program.level, IrLevel::Ast);
}

#[test]
fn run_from_skips_everything_before_the_named_pass() {
    let first_count = Rc::new(Cell::new(0));
    let second_count = Rc::new(Cell::new(0));
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_pass(counting_pass("first", &first_count), Stage::Ast);
    manager.add_pass(counting_pass("second", &second_count), Stage::Ast);

    let mut program = Program::new_ast(vec![]);
    manager.run_from("second", &mut program, false);

    assert_eq!(first_count.get(), 0);
    assert_eq!(second_count.get(), 1);
}

#[test]
fn disabled_passes_are_skipped() {
    let count = Rc::new(Cell::new(0));
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_pass(
        counting_pass("gated", &count).enabled_if(|options| options.optimize > 0),
        Stage::Ast,
    );

    let mut program = Program::new_ast(vec![]);
    manager.run(&mut program, false);
    assert_eq!(count.get(), 0);

    let mut optimizing = PassManager::new(CompilerOptions {
        optimize: 1,
        ..CompilerOptions::default()
    });
    optimizing.add_pass(
        counting_pass("gated", &count).enabled_if(|options| options.optimize > 0),
        Stage::Ast,
    );
    optimizing.run(&mut program, false);
    assert_eq!(count.get(), 1);
}

#[test]
fn remove_all_empties_every_queue() {
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_pass(noop_pass("a"), Stage::Ast);
    manager.add_pass(noop_pass("b"), Stage::Optimization);
    manager.add_pass(noop_pass("c"), Stage::Codegen);

    manager.remove_all();

    assert!(!manager.has_pass_named("a"));
    assert!(!manager.has_pass_named("b"));
    assert!(!manager.has_pass_named("c"));
}

#[test]
#[should_panic(expected = "Uppered dump is not supported")]
fn an_uppered_dump_during_a_hir_pass_is_fatal() {
    let mut manager = PassManager::new(CompilerOptions {
        udump: vec!["hir-peek".into()],
        ..CompilerOptions::default()
    });
    manager.add_pass(noop_pass("hir-peek"), Stage::Hir);

    let mut program = Program::new_ast(vec![]);
    manager.run(&mut program, true);
}

#[test]
fn dump_hooks_fire_for_the_named_mir_pass() {
    let mut manager = PassManager::new(CompilerOptions {
        dump: vec!["mir-peek".into()],
        udump: vec!["mir-peek".into()],
        ddump: vec!["mir-peek".into()],
        xdump: vec!["mir-peek".into()],
        ..CompilerOptions::default()
    });
    manager.add_pass(noop_pass("mir-peek"), Stage::Mir);

    let mut program = Program::new_ast(vec![]);
    manager.run(&mut program, true);
    assert_eq!(program.level, IrLevel::Mir);
}
