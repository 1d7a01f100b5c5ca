//! Static analysis over the parsed AST.
//!
//! A single mutating walk that
//! - propagates the "unlimited" property bottom-up through sequences and
//!   disjunctions and validates placement (only the last sequence element
//!   may be unlimited; an `or` must be uniformly limited or unlimited),
//! - pushes the nearest enclosing tag's end strings down to the unlimited
//!   descendants that need a termination signal, and
//! - clears a tag's `end` when its content is unlimited, after checking
//!   that at least one end string is non-empty.
//!
//! Enclosing context is carried as an explicit stack of tag end sets
//! rather than parent pointers, keeping the AST a tree.

use stencil_core::recursion::check_recursion_depth;
use stencil_core::{Result, StencilError};

use crate::ast::{Format, StructuralTag, TagFormat};

/// Annotate `structural_tag` in place. Only annotation fields are touched;
/// the tree structure never changes.
pub fn analyze(structural_tag: &mut StructuralTag) -> Result<()> {
    Analyzer::default().visit(&mut structural_tag.format)
}

fn invalid(message: impl Into<String>) -> StencilError {
    StencilError::InvalidStructuralTag(message.into())
}

#[derive(Default)]
struct Analyzer {
    depth: usize,
    /// End-string sets of the tags enclosing the current node, outermost
    /// first. The top is the nearest enclosing tag.
    enclosing_tag_ends: Vec<Vec<String>>,
}

impl Analyzer {
    fn visit(&mut self, format: &mut Format) -> Result<()> {
        self.depth += 1;
        let result = check_recursion_depth(self.depth, "analyzing a format")
            .and_then(|_| self.visit_inner(format));
        self.depth -= 1;
        result
    }

    fn visit_inner(&mut self, format: &mut Format) -> Result<()> {
        match format {
            Format::ConstString { .. }
            | Format::JsonSchema { .. }
            | Format::QwenXmlParameter { .. }
            | Format::Grammar { .. }
            | Format::Regex { .. } => Ok(()),

            Format::AnyText {
                detected_end_strings,
                ..
            } => {
                *detected_end_strings = self.detect_end_strings();
                Ok(())
            }

            Format::Sequence {
                elements,
                is_unlimited,
            } => {
                let last = elements.len() - 1;
                for (i, element) in elements.iter_mut().enumerate() {
                    self.visit(element)?;
                    if i < last && element.is_unlimited() {
                        return Err(invalid(format!(
                            "only the last element in a sequence can be unlimited, \
                             but element {i} of the sequence format is unlimited"
                        )));
                    }
                }
                *is_unlimited = elements[last].is_unlimited();
                Ok(())
            }

            Format::Or {
                elements,
                is_unlimited,
            } => {
                let mut any_unlimited = false;
                let mut all_unlimited = true;
                for element in elements.iter_mut() {
                    self.visit(element)?;
                    let unlimited = element.is_unlimited();
                    any_unlimited |= unlimited;
                    all_unlimited &= unlimited;
                }
                if any_unlimited && !all_unlimited {
                    return Err(invalid(
                        "an or format must have either all elements unlimited or all limited, \
                         but this one mixes both",
                    ));
                }
                *is_unlimited = any_unlimited;
                Ok(())
            }

            Format::Tag(tag) => self.visit_tag(tag),

            Format::TriggeredTags {
                tags,
                detected_end_strings,
                ..
            } => {
                for tag in tags.iter_mut() {
                    self.visit_tag(tag)?;
                }
                *detected_end_strings = self.detect_end_strings();
                Ok(())
            }

            Format::TagsWithSeparator {
                tags,
                detected_end_strings,
                ..
            } => {
                for tag in tags.iter_mut() {
                    self.visit_tag(tag)?;
                }
                *detected_end_strings = self.detect_end_strings();
                Ok(())
            }
        }
    }

    fn visit_tag(&mut self, tag: &mut TagFormat) -> Result<()> {
        // The content must see this tag as its nearest enclosing tag.
        self.enclosing_tag_ends.push(tag.end.clone());
        let result = self.visit(&mut tag.content);
        self.enclosing_tag_ends.pop();
        result?;

        if tag.content.is_unlimited() {
            if !tag.end.iter().any(|end| !end.is_empty()) {
                return Err(invalid(
                    "when a tag's content is unlimited, at least one end string must be non-empty",
                ));
            }
            // The termination responsibility moves to the descendant that
            // picked the set up through detected_end_strings.
            tag.end.clear();
        }
        Ok(())
    }

    /// The `end` set of the nearest enclosing tag, or empty at the root.
    fn detect_end_strings(&self) -> Vec<String> {
        self.enclosing_tag_ends.last().cloned().unwrap_or_default()
    }
}
