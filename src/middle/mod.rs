//! The SSA-based optimization machinery: per-function control-flow graphs,
//! SSA construction and destruction, the operand model passes query, and the
//! driver that applies the optimization queue function-at-a-time.

pub mod cfg;
pub mod optimization;
pub mod ssa;
pub mod ssa_ops;
