//! Structural fingerprints for rule deduplication.
//!
//! Two format subtrees with the same fingerprint lower to the same grammar,
//! so the converter can reuse a single rule for both. Keys are
//! prefix-tagged and bracket-nested. The triggered-tags and
//! tags-with-separator keys deliberately omit per-tag structure; those
//! formats are large and practically never duplicated, and the cache only
//! lives for one conversion.

use crate::ast::{Format, TagFormat};

pub fn fingerprint(format: &Format) -> String {
    let mut out = String::new();
    write_fingerprint(format, &mut out);
    out
}

fn write_fingerprint(format: &Format, out: &mut String) {
    match format {
        Format::ConstString { value } => {
            out.push_str("CS:");
            out.push_str(value);
        }
        Format::JsonSchema { schema } => {
            out.push_str("JS:");
            out.push_str(schema);
        }
        Format::QwenXmlParameter { schema } => {
            out.push_str("QX:");
            out.push_str(schema);
        }
        Format::AnyText {
            excluded_strings,
            detected_end_strings,
        } => {
            out.push_str("AT:");
            for excluded in excluded_strings {
                out.push_str(excluded);
                out.push('|');
            }
            // Detected end strings change the emitted rule, so they are
            // part of the key.
            out.push_str("E:");
            for end in detected_end_strings {
                out.push_str(end);
                out.push('|');
            }
        }
        Format::Grammar { body } => {
            out.push_str("GR:");
            out.push_str(body);
        }
        Format::Regex {
            pattern,
            excluded_strings,
        } => {
            out.push_str("RX:");
            out.push_str(pattern);
            if !excluded_strings.is_empty() {
                out.push_str(":X:");
                for excluded in excluded_strings {
                    out.push_str(excluded);
                    out.push('|');
                }
            }
        }
        Format::Sequence { elements, .. } => {
            out.push_str("SQ[");
            for element in elements {
                write_fingerprint(element, out);
                out.push(',');
            }
            out.push(']');
        }
        Format::Or { elements, .. } => {
            out.push_str("OR[");
            for element in elements {
                write_fingerprint(element, out);
                out.push(',');
            }
            out.push(']');
        }
        Format::Tag(tag) => write_tag_fingerprint(tag, out),
        Format::TriggeredTags {
            triggers,
            at_least_one,
            stop_after_first,
            ..
        } => {
            out.push_str("TT:");
            for trigger in triggers {
                out.push_str(trigger);
                out.push(',');
            }
            out.push(':');
            out.push_str(&format!(
                "{},{}",
                *at_least_one as u8, *stop_after_first as u8
            ));
        }
        Format::TagsWithSeparator {
            separator,
            at_least_one,
            stop_after_first,
            ..
        } => {
            out.push_str("TS:");
            out.push_str(separator);
            out.push(':');
            out.push_str(&format!(
                "{},{}",
                *at_least_one as u8, *stop_after_first as u8
            ));
        }
    }
}

fn write_tag_fingerprint(tag: &TagFormat, out: &mut String) {
    out.push_str("TG:");
    out.push_str(&tag.begin);
    out.push_str(":{");
    write_fingerprint(&tag.content, out);
    out.push_str("}:");
    for end in &tag.end {
        out.push_str(end);
        out.push('|');
    }
}
