//! Manages all aspects of the five pass queues: registration, name-addressed
//! insertion and removal, ranged execution, stage lowering, and the per-pass
//! debug and dump hooks.

use strum::IntoEnumIterator;

use crate::{
    fatal_error,
    ir::{check, lowering, pretty_print, IrLevel, Program},
    options::CompilerOptions,
    pass_manager::{
        plugin::{self, PluginPass},
        CfgOptimization, IrTransform, IrVisitor, Pass, PassQueue, PassRef, Stage,
    },
    trace,
};

pub struct PassManager {
    pub options: CompilerOptions,
    pub ast_queue: PassQueue,
    pub hir_queue: PassQueue,
    pub mir_queue: PassQueue,
    pub optimization_queue: PassQueue,
    pub codegen_queue: PassQueue,
}

impl PassManager {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            ast_queue: PassQueue::new(),
            hir_queue: PassQueue::new(),
            mir_queue: PassQueue::new(),
            optimization_queue: PassQueue::new(),
            codegen_queue: PassQueue::new(),
        }
    }

    pub fn queue(&self, stage: Stage) -> &PassQueue {
        match stage {
            Stage::Ast => &self.ast_queue,
            Stage::Hir => &self.hir_queue,
            Stage::Mir => &self.mir_queue,
            Stage::Optimization => &self.optimization_queue,
            Stage::Codegen => &self.codegen_queue,
        }
    }

    pub fn queue_mut(&mut self, stage: Stage) -> &mut PassQueue {
        match stage {
            Stage::Ast => &mut self.ast_queue,
            Stage::Hir => &mut self.hir_queue,
            Stage::Mir => &mut self.mir_queue,
            Stage::Optimization => &mut self.optimization_queue,
            Stage::Codegen => &mut self.codegen_queue,
        }
    }

    /* Registration */

    pub fn add_pass(&mut self, pass: Pass, stage: Stage) {
        self.queue_mut(stage).push(pass.into_ref());
    }

    pub fn add_ast_visitor(&mut self, name: &str, description: &str, visitor: Box<dyn IrVisitor>) {
        self.add_pass(Pass::visitor(name, description, visitor), Stage::Ast);
    }

    pub fn add_ast_transform(
        &mut self,
        name: &str,
        description: &str,
        transform: Box<dyn IrTransform>,
    ) {
        self.add_pass(Pass::transform(name, description, transform), Stage::Ast);
    }

    pub fn add_hir_visitor(&mut self, name: &str, description: &str, visitor: Box<dyn IrVisitor>) {
        self.add_pass(Pass::visitor(name, description, visitor), Stage::Hir);
    }

    pub fn add_hir_transform(
        &mut self,
        name: &str,
        description: &str,
        transform: Box<dyn IrTransform>,
    ) {
        self.add_pass(Pass::transform(name, description, transform), Stage::Hir);
    }

    pub fn add_mir_visitor(&mut self, name: &str, description: &str, visitor: Box<dyn IrVisitor>) {
        self.add_pass(Pass::visitor(name, description, visitor), Stage::Mir);
    }

    pub fn add_mir_transform(
        &mut self,
        name: &str,
        description: &str,
        transform: Box<dyn IrTransform>,
    ) {
        self.add_pass(Pass::transform(name, description, transform), Stage::Mir);
    }

    pub fn add_optimization(
        &mut self,
        name: &str,
        description: &str,
        optimization: Box<dyn CfgOptimization>,
    ) {
        self.add_pass(
            Pass::optimization(name, description, optimization),
            Stage::Optimization,
        );
    }

    pub fn add_codegen_visitor(
        &mut self,
        name: &str,
        description: &str,
        visitor: Box<dyn IrVisitor>,
    ) {
        self.add_pass(Pass::visitor(name, description, visitor), Stage::Codegen);
    }

    pub fn add_codegen_transform(
        &mut self,
        name: &str,
        description: &str,
        transform: Box<dyn IrTransform>,
    ) {
        self.add_pass(Pass::transform(name, description, transform), Stage::Codegen);
    }

    /// Resolves the module's `load` entry point in the plugin registry and
    /// invokes it with a pass named after the module. The module registers
    /// the pass itself; an unresolvable entry point registers nothing.
    pub fn add_plugin(&mut self, module_name: &str) {
        let load = match plugin::resolve(module_name, plugin::LOAD_ENTRY_POINT) {
            Ok(load) => load,
            Err(diagnostic) => fatal_error!(
                "Unable to find '{}' entry point in plugin {module_name}: {diagnostic}",
                plugin::LOAD_ENTRY_POINT
            ),
        };

        load(self, PluginPass::new(module_name));
    }

    /* Name-addressed mutation. All of these scan the queues in stage order. */

    pub fn add_before_named_pass(&mut self, pass: Pass, name: &str) {
        let pass = pass.into_ref();
        for stage in Stage::iter() {
            let queue = self.queue_mut(stage);
            if let Some(index) = queue.position_of(name) {
                queue.insert_at(index, pass);
                return;
            }
        }

        fatal_error!("No pass with name {name} was found");
    }

    pub fn add_after_named_pass(&mut self, pass: Pass, name: &str) {
        let pass = pass.into_ref();
        for stage in Stage::iter() {
            let queue = self.queue_mut(stage);
            if let Some(index) = queue.position_of(name) {
                queue.insert_at(index + 1, pass);
                return;
            }
        }

        fatal_error!("No pass with name {name} was found");
    }

    /// Removes every occurrence of the named pass from every queue. Silent
    /// no-op when the name matches nothing.
    pub fn remove_pass_named(&mut self, name: &str) {
        for stage in Stage::iter() {
            self.queue_mut(stage).remove_named(name);
        }
    }

    /// Removes everything positioned after the first pass with the given
    /// name, continuing through every later stage's queue. The match itself
    /// and everything before it stay.
    pub fn remove_after_named_pass(&mut self, name: &str) {
        let mut removing = false;
        for stage in Stage::iter() {
            let queue = self.queue_mut(stage);
            if removing {
                queue.clear();
            } else if let Some(index) = queue.position_of(name) {
                queue.truncate_after(index);
                removing = true;
            }
        }
    }

    pub fn add_after_each_pass_in(&mut self, stage: Stage, pass: &PassRef) {
        self.queue_mut(stage).insert_after_each(pass);
    }

    pub fn add_after_each_pass(&mut self, pass: &PassRef) {
        for stage in Stage::iter() {
            self.queue_mut(stage).insert_after_each(pass);
        }
    }

    pub fn remove_all(&mut self) {
        for stage in Stage::iter() {
            self.queue_mut(stage).clear();
        }
    }

    /* Lookup */

    pub fn get_pass_named(&self, name: &str) -> Option<PassRef> {
        for stage in Stage::iter() {
            let queue = self.queue(stage);
            if let Some(index) = queue.position_of(name) {
                return queue.iter().nth(index).cloned();
            }
        }
        None
    }

    pub fn has_pass_named(&self, name: &str) -> bool {
        self.get_pass_named(name).is_some()
    }

    pub fn stage_of_pass(&self, name: &str) -> Option<Stage> {
        Stage::iter().find(|stage| self.queue(*stage).position_of(name).is_some())
    }

    /* Execution */

    pub fn run(&mut self, program: &mut Program, main: bool) {
        self.run_from_until(None, None, program, main);
    }

    /// Runs all passes starting at `from`, inclusive.
    pub fn run_from(&mut self, from: &str, program: &mut Program, main: bool) {
        self.run_from_until(Some(from), None, program, main);
    }

    /// Runs all passes up to `to`, inclusive.
    pub fn run_until(&mut self, to: &str, program: &mut Program, main: bool) {
        self.run_from_until(None, Some(to), program, main);
    }

    /// Runs all passes between `from` and `to`, inclusive. The manager is
    /// used both for whole compilations and for internally generated
    /// snippets; `main` is false for snippets, which silences tracing and
    /// the dump hooks.
    pub fn run_from_until(
        &mut self,
        from: Option<&str>,
        to: Option<&str>,
        program: &mut Program,
        main: bool,
    ) {
        let mut exec = false;

        if self.walk_queue(Stage::Ast, &mut exec, from, to, program, main) {
            return;
        }

        // If every downstream queue was deliberately emptied there is nothing
        // left to consume lowered IR, so stop before lowering anything.
        if self.hir_queue.is_empty()
            && self.mir_queue.is_empty()
            && self.optimization_queue.is_empty()
            && self.codegen_queue.is_empty()
        {
            return;
        }

        lowering::lower_to_hir(program);

        if self.walk_queue(Stage::Hir, &mut exec, from, to, program, main) {
            return;
        }

        if self.mir_queue.is_empty()
            && self.optimization_queue.is_empty()
            && self.codegen_queue.is_empty()
        {
            return;
        }

        lowering::lower_to_mir(program);

        if self.walk_queue(Stage::Mir, &mut exec, from, to, program, main) {
            return;
        }

        self.run_optimization_passes(program, main);

        self.walk_queue(Stage::Codegen, &mut exec, from, to, program, main);
    }

    /// Walks one stage's queue with the ranged start/stop logic. Returns
    /// true when the `to` pass was executed and the whole run should stop.
    fn walk_queue(
        &mut self,
        stage: Stage,
        exec: &mut bool,
        from: Option<&str>,
        to: Option<&str>,
        program: &mut Program,
        main: bool,
    ) -> bool {
        for pass in self.queue(stage).snapshot() {
            let name = pass.borrow().name.clone();

            if !*exec && from.map_or(true, |from| from == name) {
                *exec = true;
            }

            if *exec {
                self.run_pass(&pass, program, main);
            }

            if *exec && to == Some(name.as_str()) {
                return true;
            }
        }

        false
    }

    pub fn run_pass(&self, pass: &PassRef, program: &mut Program, main: bool) {
        let mut pass = pass.borrow_mut();
        if !pass.is_enabled(&self.options) {
            return;
        }

        if self.options.verbose && main {
            println!("Running pass: {}", pass.name);
        }
        if main {
            self.maybe_enable_debug(&pass.name);
        }

        pass.run(program, &self.options);

        let name = pass.name.clone();
        drop(pass);

        if main {
            self.dump(program, &name);
        }
        if self.options.check {
            check::check(program, &name);
        }
    }

    pub fn maybe_enable_debug(&self, pass_name: &str) {
        trace::disable();
        if self.options.debug.iter().any(|name| name == pass_name) {
            trace::enable();
        }
    }

    fn dump(&self, program: &Program, pass_name: &str) {
        if self.options.dump.iter().any(|name| name == pass_name) {
            pretty_print::unparse(program);
        }

        if self.options.udump.iter().any(|name| name == pass_name) {
            match program.level {
                IrLevel::Mir => pretty_print::unparse_uppered(program),
                // Mid-lowering HIR has nothing defined to upper it back to
                IrLevel::Hir => {
                    fatal_error!("Uppered dump is not supported during HIR pass: {pass_name}")
                }
                IrLevel::Ast => pretty_print::unparse(program),
            }
        }

        if self.options.ddump.iter().any(|name| name == pass_name) {
            print!("{}", pretty_print::dot_dump(program));
        }

        if self.options.xdump.iter().any(|name| name == pass_name) {
            print!("{}", pretty_print::xml_dump(program));
        }
    }

    pub fn post_process(&mut self) {
        for stage in Stage::iter() {
            for pass in self.queue(stage).snapshot() {
                pass.borrow_mut().post_process();
            }
        }
    }

    /* Introspection */

    pub fn list_passes(&self) {
        println!("Passes:");
        for stage in Stage::iter() {
            for pass in self.queue(stage).iter() {
                let pass = pass.borrow();
                println!(
                    "{:<15}    ({:<8} - {:>3})    {}",
                    pass.name,
                    if pass.is_enabled(&self.options) {
                        "enabled"
                    } else {
                        "disabled"
                    },
                    stage,
                    pass.description
                        .as_deref()
                        .map(|d| format_description(d, 39))
                        .unwrap_or_else(|| "No description".to_owned())
                );
            }
        }
    }
}

/// Word-wraps `text` so every line fits in 80 columns; all lines except the
/// first are given `prefix_length` columns of leading whitespace so the
/// continuation aligns under the first line's starting column.
pub fn format_description(text: &str, prefix_length: usize) -> String {
    const LINE_LENGTH: usize = 80;
    assert!(prefix_length < LINE_LENGTH);

    let width = LINE_LENGTH - prefix_length;
    let margin = " ".repeat(prefix_length);

    let mut result = String::new();
    let mut line_len = 0usize;

    for word in text.split_whitespace() {
        if line_len > 0 && line_len + 1 + word.len() > width {
            result.push('\n');
            result.push_str(&margin);
            line_len = 0;
        } else if line_len > 0 {
            result.push(' ');
            line_len += 1;
        }
        result.push_str(word);
        line_len += word.len();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::format_description;

    #[test]
    fn short_descriptions_are_unchanged() {
        assert_eq!(format_description("prints the program", 39), "prints the program");
    }

    #[test]
    fn long_descriptions_wrap_with_margin() {
        let text = "one two three four five six seven eight nine ten ".repeat(3);
        let wrapped = format_description(&text, 39);

        let lines: Vec<&str> = wrapped.lines().collect();
        assert!(lines.len() > 1);
        for (i, line) in lines.iter().enumerate() {
            assert!(line.len() <= 80, "line {i} too long: {}", line.len());
            if i > 0 {
                assert!(line.starts_with(&" ".repeat(39)));
            }
        }
    }
}
