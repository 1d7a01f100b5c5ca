//! Typed AST for structural tags.
//!
//! A [`StructuralTag`] owns a single [`Format`] tree. The tree is built by
//! the parser, annotated in place by the analyzer (`detected_end_strings`,
//! `is_unlimited`, and end-string clearing on tags), and then read by the
//! converter.

/// One node of the structural-tag AST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Format {
    /// Exactly one literal string.
    ConstString { value: String },
    /// Delegates to the JSON-schema sub-compiler. `schema` is the schema
    /// re-serialized to JSON text.
    JsonSchema { schema: String },
    /// Delegates to the Qwen XML tool-parameter sub-compiler.
    QwenXmlParameter { schema: String },
    /// Arbitrary text, optionally bounded by the enclosing tag's end
    /// strings and forbidding the given substrings.
    AnyText {
        excluded_strings: Vec<String>,
        /// Filled by the analyzer: the `end` set of the nearest enclosing tag.
        detected_end_strings: Vec<String>,
    },
    /// Inline EBNF source.
    Grammar { body: String },
    /// A regex language, minus strings containing any excluded substring.
    Regex {
        pattern: String,
        excluded_strings: Vec<String>,
    },
    /// Concatenation. Only the last element may be unlimited.
    Sequence {
        elements: Vec<Format>,
        /// Derived by the analyzer from the last element.
        is_unlimited: bool,
    },
    /// Disjunction. Elements must be all unlimited or all limited.
    Or {
        elements: Vec<Format>,
        /// Derived by the analyzer.
        is_unlimited: bool,
    },
    Tag(TagFormat),
    /// Free text interleaved with tags dispatched by trigger prefix.
    TriggeredTags {
        triggers: Vec<String>,
        tags: Vec<TagFormat>,
        excluded_strings: Vec<String>,
        detected_end_strings: Vec<String>,
        at_least_one: bool,
        stop_after_first: bool,
    },
    /// A separator-joined list of tags.
    TagsWithSeparator {
        tags: Vec<TagFormat>,
        separator: String,
        detected_end_strings: Vec<String>,
        at_least_one: bool,
        stop_after_first: bool,
    },
}

/// `begin · content · (one of end)`. The analyzer clears `end` when the
/// content is unlimited; the original set then lives on in the content's
/// `detected_end_strings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFormat {
    pub begin: String,
    pub content: Box<Format>,
    pub end: Vec<String>,
}

/// A parsed structural-tag document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralTag {
    pub format: Format,
}

impl Format {
    /// Whether this format's language contains arbitrarily long strings
    /// without an internal terminator. Only meaningful after analysis for
    /// `Sequence` and `Or`.
    pub fn is_unlimited(&self) -> bool {
        match self {
            Format::AnyText { .. }
            | Format::TriggeredTags { .. }
            | Format::TagsWithSeparator { .. } => true,
            Format::Sequence { is_unlimited, .. } | Format::Or { is_unlimited, .. } => {
                *is_unlimited
            }
            _ => false,
        }
    }
}
