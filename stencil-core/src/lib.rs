//! Stencil core types: grammar IR, handle-based builder, and error definitions.

pub mod error;
pub mod grammar;
pub mod normalize;
pub mod recursion;

pub use error::{Result, StencilError};
pub use grammar::{ExprId, Grammar, GrammarBuilder, GrammarExpr, Rule, RuleId, TagDispatch};
pub use normalize::normalize;
