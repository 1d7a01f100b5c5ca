//! Compiler from structural-tag JSON documents to constrained-decoding
//! grammars.
//!
//! A structural tag describes the shape of a model's output as a nested
//! composition of literal strings, schemas, free-text regions, regexes
//! with excluded substrings, tags, and trigger-dispatched tag sets. The
//! compiler lowers one document to a normalized grammar in four stages:
//!
//! 1. [`parse_structural_tag`]: JSON → typed AST, with speculative type
//!    inference for objects without a `type` discriminator.
//! 2. [`analyze`]: propagate the "unlimited" property, push enclosing tag
//!    end strings down to the free-text regions that need a terminator, and
//!    validate placement.
//! 3. [`convert`]: lower the AST to grammar rules, deduplicated by
//!    structural fingerprint.
//! 4. [`stencil_core::normalize`]: drop unreachable rules and compact ids.

pub mod analyzer;
pub mod ast;
pub mod convert;
pub mod ebnf;
pub mod fingerprint;
pub mod fsm;
pub mod json_schema;
pub mod parser;
pub mod qwen_xml;
pub mod regex;

pub use analyzer::analyze;
pub use convert::convert;
pub use parser::parse_structural_tag;

use stencil_core::{normalize, Grammar, Result, StencilError};
use tracing::debug;

/// Compile a structural-tag JSON document to a grammar.
///
/// Errors from the JSON reader surface as [`StencilError::InvalidJson`].
/// Everything else (parsing, analysis, conversion, and the sub-compilers
/// they call into) is reported as [`StencilError::InvalidStructuralTag`].
pub fn structural_tag_to_grammar(json: &str) -> Result<Grammar> {
    let mut structural_tag = parse_structural_tag(json)?;
    analyze(&mut structural_tag)?;
    let grammar = convert(&structural_tag).map_err(unify_error)?;
    debug!(rules = grammar.num_rules(), "compiled structural tag");
    Ok(normalize(grammar))
}

/// Sub-compiler errors keep their own variants inside the pipeline but the
/// public entry point reports them all as invalid structural tags.
fn unify_error(err: StencilError) -> StencilError {
    match err {
        StencilError::InvalidJson(_) | StencilError::InvalidStructuralTag(_) => err,
        other => StencilError::InvalidStructuralTag(other.to_string()),
    }
}
