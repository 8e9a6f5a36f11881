//! Whole-pipeline behavior: the optimization driver's per-function SSA
//! lifecycle, the effect of the shipped optimizations at -O1, and the plugin
//! load contract.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    sync::atomic::{AtomicUsize, Ordering},
};

use indoc::indoc;

use quillc::{
    frontend::{parser::Parser, SourceFile},
    ir::{Expr, IrLevel, Program, Statement, Value},
    middle::cfg::Cfg,
    options::CompilerOptions,
    pass_manager::{
        plugin::{self, PluginModule, PluginPass},
        CfgOptimization, Pass, PassManager, Stage,
    },
    passes::register_standard_passes,
};

fn parse(source: &str) -> Program {
    let source = SourceFile::from_memory(source);
    Parser::parse_program(&source)
}

fn function_body(program: &Program, index: usize) -> &[Statement] {
    let Statement::Function { body, .. } = &program.statements[index] else {
        panic!("expected a function at index {index}");
    };
    body
}

/// Records the SSA generation it observes on every invocation.
struct GenerationSpy {
    log: Rc<RefCell<Vec<u32>>>,
}

impl CfgOptimization for GenerationSpy {
    fn optimize(&mut self, cfg: &mut Cfg, _options: &CompilerOptions) {
        self.log.borrow_mut().push(cfg.ssa_generation);
    }
}

#[test]
fn ssa_form_is_rebuilt_before_every_iterated_pass() {
    let log = Rc::new(RefCell::new(Vec::new()));

    let mut manager = PassManager::new(CompilerOptions {
        optimize: 1,
        opt_iterations: 2,
        ..CompilerOptions::default()
    });
    register_standard_passes(&mut manager);
    manager.remove_pass_named("unparse");
    manager.add_after_named_pass(
        Pass::optimization("spy", "", Box::new(GenerationSpy { log: log.clone() }))
            .enabled_if(|options| options.optimize > 0),
        "ssa",
    );

    let mut program = two_functions();
    manager.run(&mut program, false);

    // Per function: entering SSA is generation 1, and each of the three
    // iterated passes (spy, constant-fold, dce) gets a fresh rebuild, so the
    // spy sees generation 2 in the first iteration and 5 in the second. The
    // second function starts over from a fresh CFG.
    assert_eq!(*log.borrow(), vec![2, 5, 2, 5]);
}

struct InvocationCounter {
    count: Rc<Cell<usize>>,
}

impl CfgOptimization for InvocationCounter {
    fn optimize(&mut self, _cfg: &mut Cfg, _options: &CompilerOptions) {
        self.count.set(self.count.get() + 1);
    }
}

fn counting_optimization(name: &str, count: &Rc<Cell<usize>>) -> Pass {
    Pass::optimization(
        name,
        "",
        Box::new(InvocationCounter {
            count: count.clone(),
        }),
    )
}

fn two_functions() -> Program {
    parse(indoc! {"
        fn f(a) {
            b = a + 1;
            return b;
        }

        fn g(a) {
            return a;
        }
    "})
}

#[test]
fn structural_passes_run_once_per_function_and_never_iterate() {
    let cfg_count = Rc::new(Cell::new(0));
    let ssa_count = Rc::new(Cell::new(0));
    let fold_count = Rc::new(Cell::new(0));
    let out_count = Rc::new(Cell::new(0));

    let mut manager = PassManager::new(CompilerOptions {
        optimize: 1,
        opt_iterations: 2,
        ..CompilerOptions::default()
    });
    manager.add_pass(counting_optimization("cfg", &cfg_count), Stage::Optimization);
    manager.add_pass(counting_optimization("ssa", &ssa_count), Stage::Optimization);
    manager.add_pass(
        counting_optimization("fold", &fold_count),
        Stage::Optimization,
    );
    manager.add_pass(
        counting_optimization("out-ssa", &out_count),
        Stage::Optimization,
    );

    let mut program = two_functions();
    manager.run(&mut program, false);

    // The three structural entries fire once per function regardless of the
    // iteration cap; only the middle of the queue iterates
    assert_eq!(cfg_count.get(), 2);
    assert_eq!(ssa_count.get(), 2);
    assert_eq!(out_count.get(), 2);
    assert_eq!(fold_count.get(), 4);
}

#[test]
fn iterated_passes_run_once_per_function_at_one_iteration() {
    let fold_count = Rc::new(Cell::new(0));

    let mut manager = PassManager::new(CompilerOptions {
        optimize: 1,
        ..CompilerOptions::default()
    });
    manager.add_pass(counting_optimization("cfg", &Rc::new(Cell::new(0))), Stage::Optimization);
    manager.add_pass(counting_optimization("ssa", &Rc::new(Cell::new(0))), Stage::Optimization);
    manager.add_pass(
        counting_optimization("fold", &fold_count),
        Stage::Optimization,
    );
    manager.add_pass(
        counting_optimization("out-ssa", &Rc::new(Cell::new(0))),
        Stage::Optimization,
    );

    let mut program = two_functions();
    manager.run(&mut program, false);

    assert_eq!(fold_count.get(), 2);
}

#[test]
fn constant_folding_and_dce_reduce_a_function_to_its_output() {
    let mut manager = PassManager::new(CompilerOptions {
        optimize: 1,
        ..CompilerOptions::default()
    });
    register_standard_passes(&mut manager);
    manager.remove_pass_named("unparse");

    let mut program = parse(indoc! {"
        fn f() {
            a = 2;
            b = a * 3;
            print b;
        }
    "});
    manager.run(&mut program, false);

    assert_eq!(program.level, IrLevel::Mir);
    let body = function_body(&program, 0);
    assert_eq!(body.len(), 1);
    assert!(matches!(
        body[0],
        Statement::Print(Expr::Literal(Value::Int(6)))
    ));
}

#[test]
fn optimization_level_zero_leaves_assignments_in_place() {
    let mut manager = PassManager::new(CompilerOptions::default());
    register_standard_passes(&mut manager);
    manager.remove_pass_named("unparse");

    let mut program = parse(indoc! {"
        fn f() {
            a = 2;
            b = a * 3;
            print b;
        }
    "});
    manager.run(&mut program, false);

    assert_eq!(program.level, IrLevel::Mir);
    let assignments = function_body(&program, 0)
        .iter()
        .filter(|statement| matches!(statement, Statement::Assign { .. }))
        .count();
    assert_eq!(assignments, 2);
}

#[test]
fn calls_block_folding_across_them() {
    let mut manager = PassManager::new(CompilerOptions {
        optimize: 1,
        ..CompilerOptions::default()
    });
    register_standard_passes(&mut manager);
    manager.remove_pass_named("unparse");

    let mut program = parse(indoc! {"
        fn f() {
            x = 1;
            poke();
            print x;
        }
    "});
    manager.run(&mut program, false);

    // The call may rewrite x, so the print must still read the variable
    let body = function_body(&program, 0);
    assert!(body
        .iter()
        .any(|statement| matches!(statement, Statement::Print(Expr::Var(_)))));
}

/* Plugins */

static TALLY_RUNS: AtomicUsize = AtomicUsize::new(0);
static TALLY_POST_PROCESSED: AtomicUsize = AtomicUsize::new(0);

fn tally_load(manager: &mut PassManager, mut pass: PluginPass) {
    pass.set_description("Counts how often it runs");
    pass.set_run(|_program, _options| {
        TALLY_RUNS.fetch_add(1, Ordering::SeqCst);
    });
    pass.set_post_process(|| {
        TALLY_POST_PROCESSED.fetch_add(1, Ordering::SeqCst);
    });
    manager.add_pass(pass.into_pass(), Stage::Mir);
}

#[test]
fn a_loaded_plugin_registers_and_runs_its_pass() {
    plugin::register_module(PluginModule::new("tally", "1.0").with_load(tally_load));

    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_plugin("tally");

    assert!(manager.has_pass_named("tally"));
    assert_eq!(manager.stage_of_pass("tally"), Some(Stage::Mir));

    let mut program = parse("x = 1;");
    manager.run(&mut program, false);
    assert_eq!(TALLY_RUNS.load(Ordering::SeqCst), 1);

    manager.post_process();
    assert_eq!(TALLY_POST_PROCESSED.load(Ordering::SeqCst), 1);
}

#[test]
#[should_panic(expected = "Unable to find 'load' entry point")]
fn a_module_without_a_load_entry_point_is_fatal() {
    plugin::register_module(PluginModule::new("loadless", "0.1"));

    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_plugin("loadless");
}

#[test]
#[should_panic(expected = "Unable to find 'load' entry point")]
fn an_unregistered_module_is_fatal() {
    let mut manager = PassManager::new(CompilerOptions::default());
    manager.add_plugin("never-registered");
}

#[test]
fn a_failed_plugin_load_registers_nothing() {
    plugin::register_module(PluginModule::new("broken", "0.1"));

    let mut manager = PassManager::new(CompilerOptions::default());
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        manager.add_plugin("broken");
    }));

    assert!(result.is_err());
    assert!(!manager.has_pass_named("broken"));
}
