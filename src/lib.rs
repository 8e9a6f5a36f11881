//! The quillc middle-end: a pass-managed optimization pipeline for the Quill
//! scripting language. Programs enter as an AST, are lowered through HIR to
//! flat MIR, run through per-function SSA-based optimizations, and leave
//! through the codegen queue. The [`pass_manager`] owns scheduling; the
//! [`middle`] modules own the CFG, SSA form, and the shipped optimizations.

pub mod diagnostics;
pub mod frontend;
pub mod index;
pub mod intern;
pub mod ir;
pub mod middle;
pub mod options;
pub mod pass_manager;
pub mod passes;
pub mod trace;
