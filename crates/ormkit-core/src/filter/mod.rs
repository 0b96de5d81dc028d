//! Filter/predicate compilation.
//!
//! Caller filters are validated against the schema registry and compiled
//! into [`PredicateNode`] trees before any storage access.

mod compiler;
mod predicate;

pub(crate) use compiler::Target;
pub use compiler::FilterCompiler;
pub use predicate::{
    ComparisonOp, FieldComparison, Operand, PredicateNode, Quantifier, RelationPredicate, UniqueKey,
};
