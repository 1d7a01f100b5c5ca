//! Process-wide recursion depth limit.
//!
//! Recursive walks over untrusted input (the structural-tag parser and
//! analyzer) consume call stack per nesting level, so the depth is bounded
//! by a configurable limit rather than by stack exhaustion.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Result, StencilError};

pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 256;

static MAX_RECURSION_DEPTH: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_RECURSION_DEPTH);

pub fn max_recursion_depth() -> usize {
    MAX_RECURSION_DEPTH.load(Ordering::Relaxed)
}

pub fn set_max_recursion_depth(depth: usize) {
    MAX_RECURSION_DEPTH.store(depth, Ordering::Relaxed);
}

/// Check a walk's current depth against the limit. `context` names the walk
/// for the error message.
pub fn check_recursion_depth(depth: usize, context: &str) -> Result<()> {
    let limit = max_recursion_depth();
    if depth > limit {
        return Err(StencilError::InvalidStructuralTag(format!(
            "recursion depth limit of {limit} exceeded while {context}"
        )));
    }
    Ok(())
}
