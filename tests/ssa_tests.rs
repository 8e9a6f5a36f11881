//! SSA form over real lowered programs: phi and chi placement, the operand
//! web, and the round trip back to flat statements.

use indoc::indoc;

use quillc::{
    frontend::{parser::Parser, SourceFile},
    intern::InternedSymbol,
    ir::{lowering, Statement},
    middle::{
        cfg::Cfg,
        ssa_ops::{Direction, SsaOpKind},
    },
};

/// Parses and lowers a single-function program to MIR, then builds the
/// function's CFG.
fn cfg_for(source: &str) -> Cfg {
    let source = SourceFile::from_memory(source);
    let mut program = Parser::parse_program(&source);
    lowering::lower_to_hir(&mut program);
    lowering::lower_to_mir(&mut program);

    let Statement::Function {
        parameters, body, ..
    } = &program.statements[0]
    else {
        panic!("expected the program to start with a function");
    };
    Cfg::new(parameters, body)
}

#[test]
fn branch_join_gets_a_phi_for_the_rewritten_variable() {
    let mut cfg = cfg_for(indoc! {"
        fn pick(flag) {
            result = 0;
            if flag {
                result = 1;
            } else {
                result = 2;
            }
            return result;
        }
    "});
    cfg.convert_to_ssa_form();

    let result = InternedSymbol::new("result");
    let phis: Vec<_> = cfg
        .blocks
        .values()
        .flat_map(|block| &block.phis)
        .filter(|phi| phi.destination.symbol == result)
        .collect();
    assert_eq!(phis.len(), 1);
    assert_eq!(phis[0].sources.len(), 2);
}

#[test]
fn loop_variable_merges_entry_and_latch_versions() {
    let mut cfg = cfg_for(indoc! {"
        fn count(n) {
            i = 0;
            while i < n {
                i = i + 1;
            }
            return i;
        }
    "});
    cfg.convert_to_ssa_form();

    let i = InternedSymbol::new("i");
    let phi = cfg
        .blocks
        .values()
        .flat_map(|block| &block.phis)
        .find(|phi| phi.destination.symbol == i)
        .expect("the loop variable needs a phi at the header");
    assert_eq!(phi.sources.len(), 2);
}

#[test]
fn calls_pin_source_variables_with_chis() {
    let mut cfg = cfg_for(indoc! {"
        fn f() {
            x = 1;
            poke();
            print x;
        }
    "});
    cfg.convert_to_ssa_form();

    let x = InternedSymbol::new("x");
    let chi = cfg
        .blocks
        .values()
        .flat_map(|block| &block.chis)
        .find(|chi| chi.destination.symbol == x)
        .expect("the call must carry a chi for x");
    assert_ne!(chi.destination.version, chi.source.version);

    // Temporaries are call arguments and results, never call targets
    assert!(cfg
        .blocks
        .values()
        .flat_map(|block| &block.chis)
        .all(|chi| !chi.destination.symbol.is_temporary()));
}

#[test]
fn block_aggregates_separate_must_defs_from_uses() {
    let mut cfg = cfg_for(indoc! {"
        fn f() {
            x = 1;
            mystery();
            print x;
        }
    "});
    cfg.convert_to_ssa_form();

    let entry = cfg.entry();
    let def_aggregate = cfg
        .ops
        .block_aggregate(entry, Direction::Def)
        .expect("every block carries a must-define aggregate");
    let use_aggregate = cfg
        .ops
        .block_aggregate(entry, Direction::Use)
        .expect("every block carries a use aggregate");

    // The must-define set holds only plain statement defs; the call's chi
    // may-defs (and any phi defs) stay out of it
    let def_members = &cfg.ops.get(def_aggregate).aux;
    assert!(!def_members.is_empty());
    for member in def_members {
        let op = cfg.ops.get(*member);
        assert_eq!(op.kind, SsaOpKind::Statement);
        assert_eq!(op.direction, Direction::Def);
    }
    assert!(cfg
        .ops
        .iter()
        .any(|op| op.block == entry
            && op.kind == SsaOpKind::Chi
            && op.direction == Direction::Def
            && !def_members.contains(&op.id)));

    // The use aggregate covers every use in the block, the print's read of
    // x among them
    let x = InternedSymbol::new("x");
    let use_members = &cfg.ops.get(use_aggregate).aux;
    for member in use_members {
        assert_eq!(cfg.ops.get(*member).direction, Direction::Use);
    }
    assert!(use_members
        .iter()
        .any(|member| cfg.ops.get(*member).name.is_some_and(|name| name.symbol == x)));
}

#[test]
fn every_use_has_a_reaching_definition() {
    let mut cfg = cfg_for(indoc! {"
        fn f(a, b) {
            if a < b {
                c = use_it(a);
            } else {
                c = b;
            }
            return c;
        }
    "});
    cfg.convert_to_ssa_form();

    for op in cfg.ops.iter() {
        if op.direction != Direction::Use || op.kind == SsaOpKind::Block {
            continue;
        }
        let name = op.name.expect("use operands always carry a name");
        assert!(
            cfg.ops.def_of(&name).is_some(),
            "no reaching definition for {name}"
        );
        assert!(
            !cfg.ops.get_defs(op.id).is_empty(),
            "use {} is not linked to any definition",
            op.id
        );
    }
}

#[test]
fn operand_ids_give_a_total_order() {
    let mut cfg = cfg_for(indoc! {"
        fn f(n) {
            while n > 0 {
                n = n - 1;
            }
            return n;
        }
    "});
    cfg.convert_to_ssa_form();

    let ids: Vec<_> = cfg.ops.iter().map(|op| op.id).collect();
    assert!(!ids.is_empty());
    for pair in ids.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}

#[test]
fn round_trip_preserves_the_control_flow_shape() {
    let mut cfg = cfg_for(indoc! {"
        fn f(n) {
            total = 0;
            i = 0;
            while i < n {
                if i > 2 {
                    total = total + i;
                }
                i = i + 1;
            }
            return total;
        }
    "});
    let blocks_before = cfg.blocks.len();

    cfg.convert_to_ssa_form();
    cfg.convert_out_of_ssa_form();
    let statements = cfg.get_linear_statements();

    // No SSA artifacts survive
    for statement in &statements {
        if let Statement::Assign { target, .. } = statement {
            assert_eq!(target.version, None);
        }
        statement.for_each_used_var(&mut |var| assert_eq!(var.version, None));
    }
    for block in cfg.blocks.values() {
        assert!(block.phis.is_empty());
        assert!(block.chis.is_empty());
    }

    // Rebuilding a CFG from the linearized body keeps the loop and the
    // branch; edge splitting may have added forwarding blocks, never
    // removed any
    let rebuilt = Cfg::new(&[], &statements);
    assert!(rebuilt.blocks.len() >= blocks_before);
    assert!(statements
        .iter()
        .any(|statement| matches!(statement, Statement::Branch { .. })));
    assert!(statements
        .iter()
        .any(|statement| matches!(statement, Statement::Goto(_))));
}

#[test]
fn rebuilding_ssa_form_bumps_the_generation_each_time() {
    let mut cfg = cfg_for(indoc! {"
        fn f(a) {
            b = a + 1;
            return b;
        }
    "});
    cfg.convert_to_ssa_form();
    assert_eq!(cfg.ssa_generation, 1);

    cfg.rebuild_ssa_form();
    cfg.rebuild_ssa_form();
    assert_eq!(cfg.ssa_generation, 3);
    assert!(cfg.in_ssa_form);
}
