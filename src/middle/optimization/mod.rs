//! The per-function optimization driver. The optimization queue has a fixed
//! shape: the first pass builds the CFG, the second enters SSA form, the
//! last leaves SSA form, and everything in between is run `opt_iterations`
//! times per function with SSA form rebuilt from scratch before each pass,
//! since passes are free to leave the operand web stale.

pub mod constant_fold;
pub mod dead_code;

use crate::{
    fatal_error,
    ir::{Program, Statement},
    middle::cfg::Cfg,
    pass_manager::{PassBehavior, PassManager, PassRef},
};

impl PassManager {
    pub fn run_optimization_passes(&mut self, program: &mut Program, main: bool) {
        if self.optimization_queue.is_empty() {
            return;
        }
        if self.optimization_queue.len() < 3 {
            fatal_error!(
                "The optimization queue must start with CFG construction and SSA entry and end with SSA exit"
            );
        }

        let build_cfg = self.optimization_queue.pop_front().unwrap();
        let into_ssa = self.optimization_queue.pop_front().unwrap();
        let out_of_ssa = self.optimization_queue.pop_back().unwrap();
        let iterated = self.optimization_queue.snapshot();

        for statement in &mut program.statements {
            let Statement::Function {
                name,
                parameters,
                body,
            } = statement
            else {
                continue;
            };
            let function = name.value();

            if main {
                self.maybe_enable_debug(&build_cfg.borrow().name);
            }
            let mut cfg = Cfg::new(parameters, body);
            self.run_cfg_pass(&build_cfg, &mut cfg, function, None, main);

            if main {
                self.maybe_enable_debug(&into_ssa.borrow().name);
            }
            cfg.convert_to_ssa_form();
            self.run_cfg_pass(&into_ssa, &mut cfg, function, None, main);

            if self.options.optimize > 0 {
                for iteration in 0..self.options.opt_iterations {
                    for pass in &iterated {
                        if !pass.borrow().is_enabled(&self.options) {
                            continue;
                        }
                        if main {
                            self.maybe_enable_debug(&pass.borrow().name);
                        }
                        cfg.rebuild_ssa_form();
                        self.run_cfg_pass(pass, &mut cfg, function, Some(iteration), main);
                    }
                }
            }

            if main {
                self.maybe_enable_debug(&out_of_ssa.borrow().name);
            }
            cfg.convert_out_of_ssa_form();
            self.run_cfg_pass(&out_of_ssa, &mut cfg, function, None, main);

            *body = cfg.get_linear_statements();
        }
    }

    fn run_cfg_pass(
        &self,
        pass: &PassRef,
        cfg: &mut Cfg,
        function: &str,
        iteration: Option<u32>,
        main: bool,
    ) {
        let mut pass = pass.borrow_mut();
        if !pass.is_enabled(&self.options) {
            return;
        }

        if self.options.verbose && main {
            println!("Running pass: {} ({function})", pass.name);
        }

        if let PassBehavior::Optimize(optimization) = &mut pass.behavior {
            optimization.optimize(cfg, &self.options);
        }

        if main && self.options.cfg_dump.iter().any(|name| name == &pass.name) {
            let title = match iteration {
                Some(iteration) => format!("{function}: {} - iteration {iteration}", pass.name),
                None => format!("{function}: {}", pass.name),
            };
            cfg.dump_graphviz(&title);
        }
    }
}
