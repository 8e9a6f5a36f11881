//! Passes and pass queues. A pass is a named, enable-gated unit of work; a
//! queue is the ordered set of passes for one pipeline stage. The manager in
//! [`manager`] owns five queues and drives them in stage order.

use std::{cell::RefCell, rc::Rc};

use crate::{ir::Program, middle::cfg::Cfg, options::CompilerOptions};

pub mod manager;
pub mod plugin;

pub use manager::PassManager;

/// The five pipeline stages, in execution order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumIter,
)]
pub enum Stage {
    #[strum(serialize = "AST")]
    Ast,
    #[strum(serialize = "HIR")]
    Hir,
    #[strum(serialize = "MIR")]
    Mir,
    #[strum(serialize = "OPT")]
    Optimization,
    #[strum(serialize = "GEN")]
    Codegen,
}

/// Read-only traversal of the program.
pub trait IrVisitor {
    fn visit(&mut self, program: &Program, options: &CompilerOptions);
}

/// In-place rewrite of the program.
pub trait IrTransform {
    fn transform(&mut self, program: &mut Program, options: &CompilerOptions);
}

/// CFG-level optimization, invoked per function by the optimization driver
/// against a freshly rebuilt SSA-form CFG.
pub trait CfgOptimization {
    fn optimize(&mut self, cfg: &mut Cfg, options: &CompilerOptions);
}

pub type EnabledPredicate = fn(&CompilerOptions) -> bool;

/// What a pass does when it runs. A capability discriminator rather than a
/// class hierarchy; plugin passes carry whatever callbacks their module's
/// `load` entry point installed.
pub enum PassBehavior {
    Visit(Box<dyn IrVisitor>),
    Transform(Box<dyn IrTransform>),
    Optimize(Box<dyn CfgOptimization>),
    Plugin(plugin::PluginCallbacks),
}

pub struct Pass {
    pub name: String,
    pub description: Option<String>,
    enabled: Option<EnabledPredicate>,
    pub behavior: PassBehavior,
}

/// Passes are shared between queue slots (insert-after-every-element reuses
/// one instance) and the pipeline is strictly single-threaded, so `Rc` plus
/// interior mutability is all the ownership machinery needed.
pub type PassRef = Rc<RefCell<Pass>>;

impl Pass {
    pub fn visitor(name: &str, description: &str, visitor: Box<dyn IrVisitor>) -> Self {
        Self::new(name, description, PassBehavior::Visit(visitor))
    }

    pub fn transform(name: &str, description: &str, transform: Box<dyn IrTransform>) -> Self {
        Self::new(name, description, PassBehavior::Transform(transform))
    }

    pub fn optimization(
        name: &str,
        description: &str,
        optimization: Box<dyn CfgOptimization>,
    ) -> Self {
        Self::new(name, description, PassBehavior::Optimize(optimization))
    }

    pub fn new(name: &str, description: &str, behavior: PassBehavior) -> Self {
        assert!(!name.is_empty(), "every pass must have a name");
        Self {
            name: name.to_owned(),
            description: if description.is_empty() {
                None
            } else {
                Some(description.to_owned())
            },
            enabled: None,
            behavior,
        }
    }

    pub fn enabled_if(mut self, predicate: EnabledPredicate) -> Self {
        self.enabled = Some(predicate);
        self
    }

    pub fn is_enabled(&self, options: &CompilerOptions) -> bool {
        self.enabled.map_or(true, |predicate| predicate(options))
    }

    pub fn into_ref(self) -> PassRef {
        Rc::new(RefCell::new(self))
    }

    /// Runs the pass against the whole program. Optimization passes are a
    /// no-op here; only the optimization driver invokes their CFG entry
    /// point.
    pub fn run(&mut self, program: &mut Program, options: &CompilerOptions) {
        match &mut self.behavior {
            PassBehavior::Visit(visitor) => visitor.visit(program, options),
            PassBehavior::Transform(transform) => transform.transform(program, options),
            PassBehavior::Optimize(_) => {}
            PassBehavior::Plugin(callbacks) => {
                if let Some(run) = callbacks.run {
                    run(program, options);
                }
            }
        }
    }

    pub fn post_process(&mut self) {
        if let PassBehavior::Plugin(callbacks) = &self.behavior {
            if let Some(post_process) = callbacks.post_process {
                post_process();
            }
        }
    }
}

/// An ordered sequence of passes for one stage. All mutation is positional
/// over indices; nothing here hands out iterators that could be invalidated.
#[derive(Default)]
pub struct PassQueue {
    passes: Vec<PassRef>,
}

impl PassQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn push(&mut self, pass: PassRef) {
        self.passes.push(pass);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PassRef> {
        self.passes.iter()
    }

    /// A snapshot of the queue contents; used by queue walks so that a pass
    /// mutating the manager mid-run cannot invalidate the walk.
    pub fn snapshot(&self) -> Vec<PassRef> {
        self.passes.clone()
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.passes.iter().position(|p| p.borrow().name == name)
    }

    pub fn insert_at(&mut self, index: usize, pass: PassRef) {
        self.passes.insert(index, pass);
    }

    /// Inserts `pass` after every element currently in the queue. The queue
    /// length is snapshotted up front, so later appends are not retroactively
    /// followed by `pass`.
    pub fn insert_after_each(&mut self, pass: &PassRef) {
        let original_len = self.passes.len();
        for index in (0..original_len).rev() {
            self.passes.insert(index + 1, pass.clone());
        }
    }

    /// Removes every pass with the given name. Removing a name that is not
    /// present is a no-op.
    pub fn remove_named(&mut self, name: &str) {
        self.passes.retain(|p| p.borrow().name != name);
    }

    /// Keeps only the passes at positions `0..=index`.
    pub fn truncate_after(&mut self, index: usize) {
        self.passes.truncate(index + 1);
    }

    pub fn clear(&mut self) {
        self.passes.clear();
    }

    pub fn front(&self) -> Option<&PassRef> {
        self.passes.first()
    }

    pub fn pop_front(&mut self) -> Option<PassRef> {
        if self.passes.is_empty() {
            None
        } else {
            Some(self.passes.remove(0))
        }
    }

    pub fn pop_back(&mut self) -> Option<PassRef> {
        self.passes.pop()
    }
}
