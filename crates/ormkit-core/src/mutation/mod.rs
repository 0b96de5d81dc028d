//! Write validation and execution.
//!
//! Payloads are validated by [`PayloadCompiler`] before any statement is
//! issued. [`MutationExecutor`] then runs the writes on a leased
//! connection; deletes go through [`CascadeExecutor`], which applies each
//! dependent relation's `on_delete` policy.

mod cascade;
mod executor;
mod payload;

pub use cascade::{CascadeExecutor, CascadeResult};
pub use executor::MutationExecutor;
pub use payload::{
    ArithmeticOp, Assignment, ColumnWrite, CompiledPayload, PayloadCompiler, PendingConnect,
    WriteMode,
};
