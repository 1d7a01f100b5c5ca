//! JSON → typed AST.
//!
//! The wire format is a JSON object with an optional `"type":
//! "structural_tag"` and a required `"format"`. Formats carry an optional
//! `type` discriminator; when it is absent the parser speculatively attempts
//! the inferable variants in a fixed order and keeps the first that
//! validates. Tag takes priority, so an object with `begin`/`content`/`end`
//! always parses as a tag.

use serde_json::{Map, Value};

use stencil_core::recursion::check_recursion_depth;
use stencil_core::{Result, StencilError};

use crate::ast::{Format, StructuralTag, TagFormat};

/// Parse a structural-tag JSON document.
pub fn parse_structural_tag(json: &str) -> Result<StructuralTag> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| StencilError::InvalidJson(format!("failed to parse JSON: {e}")))?;
    Parser::default().parse_document(&value)
}

fn invalid(message: impl Into<String>) -> StencilError {
    StencilError::InvalidStructuralTag(message.into())
}

#[derive(Default)]
struct Parser {
    depth: usize,
}

impl Parser {
    fn parse_document(&mut self, value: &Value) -> Result<StructuralTag> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid("structural tag must be a JSON object"))?;
        // The type field is optional but must be "structural_tag" if present.
        if let Some(type_value) = obj.get("type") {
            if type_value.as_str() != Some("structural_tag") {
                return Err(invalid(
                    "structural tag's type must be the string \"structural_tag\"",
                ));
            }
        }
        let format_value = obj
            .get("format")
            .ok_or_else(|| invalid("structural tag must have a format field"))?;
        let format = self.parse_format(format_value)?;
        Ok(StructuralTag { format })
    }

    fn parse_format(&mut self, value: &Value) -> Result<Format> {
        self.depth += 1;
        let result = check_recursion_depth(self.depth, "parsing a format")
            .and_then(|_| self.parse_format_inner(value));
        self.depth -= 1;
        result
    }

    fn parse_format_inner(&mut self, value: &Value) -> Result<Format> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid("format must be a JSON object"))?;

        if let Some(type_value) = obj.get("type") {
            let type_name = type_value
                .as_str()
                .ok_or_else(|| invalid("format's type must be a string"))?;
            return match type_name {
                "const_string" => self.parse_const_string(obj),
                "json_schema" => self.parse_json_schema(obj),
                "qwen_xml_parameter" => self.parse_qwen_xml_parameter(obj),
                "any_text" => self.parse_any_text(obj),
                "grammar" => self.parse_grammar(obj),
                "regex" => self.parse_regex(obj),
                "sequence" => self.parse_sequence(obj),
                "or" => self.parse_or(obj),
                "tag" => self.parse_tag_object(obj).map(Format::Tag),
                "triggered_tags" => self.parse_triggered_tags(obj),
                "tags_with_separator" => self.parse_tags_with_separator(obj),
                other => Err(invalid(format!("format type not recognized: {other}"))),
            };
        }

        // No type: attempt each inferable variant in a fixed order and keep
        // the first that validates. Tag is prioritized. qwen_xml_parameter,
        // grammar and regex are never inferred.
        if let Ok(tag) = self.parse_tag_object(obj) {
            return Ok(Format::Tag(tag));
        }
        if let Ok(format) = self.parse_const_string(obj) {
            return Ok(format);
        }
        if let Ok(format) = self.parse_json_schema(obj) {
            return Ok(format);
        }
        if let Ok(format) = self.parse_any_text(obj) {
            return Ok(format);
        }
        if let Ok(format) = self.parse_sequence(obj) {
            return Ok(format);
        }
        if let Ok(format) = self.parse_or(obj) {
            return Ok(format);
        }
        if let Ok(format) = self.parse_triggered_tags(obj) {
            return Ok(format);
        }
        if let Ok(format) = self.parse_tags_with_separator(obj) {
            return Ok(format);
        }
        Err(invalid(format!("invalid format: {value}")))
    }

    fn parse_const_string(&mut self, obj: &Map<String, Value>) -> Result<Format> {
        match obj.get("value").and_then(Value::as_str) {
            Some(value) if !value.is_empty() => Ok(Format::ConstString {
                value: value.to_string(),
            }),
            _ => Err(invalid(
                "const_string format must have a value field with a non-empty string",
            )),
        }
    }

    fn parse_schema_field(
        &mut self,
        obj: &Map<String, Value>,
        format_name: &str,
    ) -> Result<String> {
        match obj.get("json_schema") {
            Some(schema) if schema.is_object() || schema.is_boolean() => {
                Ok(schema.to_string())
            }
            _ => Err(invalid(format!(
                "{format_name} format must have a json_schema field holding an object or a boolean"
            ))),
        }
    }

    fn parse_json_schema(&mut self, obj: &Map<String, Value>) -> Result<Format> {
        let schema = self.parse_schema_field(obj, "json_schema")?;
        Ok(Format::JsonSchema { schema })
    }

    fn parse_qwen_xml_parameter(&mut self, obj: &Map<String, Value>) -> Result<Format> {
        let schema = self.parse_schema_field(obj, "qwen_xml_parameter")?;
        Ok(Format::QwenXmlParameter { schema })
    }

    fn parse_any_text(&mut self, obj: &Map<String, Value>) -> Result<Format> {
        let excludes_value = match obj.get("excludes") {
            None => {
                // A bare object must carry an explicit type to count as
                // any_text; otherwise inference would swallow everything.
                if !obj.contains_key("type") {
                    return Err(invalid(
                        "any_text format without a type field must have an excludes field",
                    ));
                }
                return Ok(Format::AnyText {
                    excluded_strings: Vec::new(),
                    detected_end_strings: Vec::new(),
                });
            }
            Some(value) => value,
        };
        let excludes = excludes_value
            .as_array()
            .ok_or_else(|| invalid("any_text format's excludes field must be an array"))?;
        let mut excluded_strings = Vec::with_capacity(excludes.len());
        for excluded in excludes {
            let excluded = excluded
                .as_str()
                .ok_or_else(|| invalid("any_text format's excludes array must contain strings"))?;
            excluded_strings.push(excluded.to_string());
        }
        Ok(Format::AnyText {
            excluded_strings,
            detected_end_strings: Vec::new(),
        })
    }

    fn parse_grammar(&mut self, obj: &Map<String, Value>) -> Result<Format> {
        match obj.get("grammar").and_then(Value::as_str) {
            Some(body) if !body.is_empty() => Ok(Format::Grammar {
                body: body.to_string(),
            }),
            _ => Err(invalid(
                "grammar format must have a grammar field with a non-empty string",
            )),
        }
    }

    fn parse_regex(&mut self, obj: &Map<String, Value>) -> Result<Format> {
        let pattern = match obj.get("pattern").and_then(Value::as_str) {
            Some(pattern) if !pattern.is_empty() => pattern.to_string(),
            _ => {
                return Err(invalid(
                    "regex format must have a pattern field with a non-empty string",
                ))
            }
        };
        let excluded_strings = self.parse_excludes(obj, "regex")?;
        Ok(Format::Regex {
            pattern,
            excluded_strings,
        })
    }

    /// An optional `excludes` array whose entries must be non-empty strings.
    fn parse_excludes(
        &mut self,
        obj: &Map<String, Value>,
        format_name: &str,
    ) -> Result<Vec<String>> {
        let Some(excludes_value) = obj.get("excludes") else {
            return Ok(Vec::new());
        };
        let excludes = excludes_value.as_array().ok_or_else(|| {
            invalid(format!("{format_name} format's excludes field must be an array"))
        })?;
        let mut excluded_strings = Vec::with_capacity(excludes.len());
        for excluded in excludes {
            match excluded.as_str() {
                Some(excluded) if !excluded.is_empty() => {
                    excluded_strings.push(excluded.to_string());
                }
                _ => {
                    return Err(invalid(format!(
                        "{format_name} format's excludes array must contain non-empty strings"
                    )))
                }
            }
        }
        Ok(excluded_strings)
    }

    fn parse_sequence(&mut self, obj: &Map<String, Value>) -> Result<Format> {
        let elements_value = obj
            .get("elements")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("sequence format must have an elements field with an array"))?;
        let mut elements = Vec::with_capacity(elements_value.len());
        for element in elements_value {
            let parsed = self.parse_format(element)?;
            // Nested sequences are inlined one level.
            if let Format::Sequence {
                elements: nested, ..
            } = parsed
            {
                elements.extend(nested);
            } else {
                elements.push(parsed);
            }
        }
        if elements.is_empty() {
            return Err(invalid("sequence format must have at least one element"));
        }
        Ok(Format::Sequence {
            elements,
            is_unlimited: false,
        })
    }

    fn parse_or(&mut self, obj: &Map<String, Value>) -> Result<Format> {
        let elements_value = obj
            .get("elements")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("or format must have an elements field with an array"))?;
        let mut elements = Vec::with_capacity(elements_value.len());
        for element in elements_value {
            elements.push(self.parse_format(element)?);
        }
        if elements.is_empty() {
            return Err(invalid("or format must have at least one element"));
        }
        Ok(Format::Or {
            elements,
            is_unlimited: false,
        })
    }

    /// Parse a tag from an arbitrary JSON value, checking the optional
    /// `type` discriminator. Used for entries of `tags` arrays.
    fn parse_tag_value(&mut self, value: &Value) -> Result<TagFormat> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid("tag format must be a JSON object"))?;
        if let Some(type_value) = obj.get("type") {
            if type_value.as_str() != Some("tag") {
                return Err(invalid("tag format's type must be the string \"tag\""));
            }
        }
        self.parse_tag_object(obj)
    }

    fn parse_tag_object(&mut self, obj: &Map<String, Value>) -> Result<TagFormat> {
        let begin = obj
            .get("begin")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("tag format's begin field must be a string"))?
            .to_string();
        let content_value = obj
            .get("content")
            .ok_or_else(|| invalid("tag format must have a content field"))?;
        let content = self.parse_format(content_value)?;

        let end = match obj.get("end") {
            Some(Value::String(end)) => vec![end.clone()],
            Some(Value::Array(end_array)) => {
                if end_array.is_empty() {
                    return Err(invalid("tag format's end array cannot be empty"));
                }
                let mut end = Vec::with_capacity(end_array.len());
                for item in end_array {
                    let item = item.as_str().ok_or_else(|| {
                        invalid("tag format's end array must contain only strings")
                    })?;
                    end.push(item.to_string());
                }
                end
            }
            Some(_) => {
                return Err(invalid(
                    "tag format's end field must be a string or an array of strings",
                ))
            }
            None => return Err(invalid("tag format must have an end field")),
        };

        Ok(TagFormat {
            begin,
            content: Box::new(content),
            end,
        })
    }

    fn parse_tags(
        &mut self,
        obj: &Map<String, Value>,
        format_name: &str,
    ) -> Result<Vec<TagFormat>> {
        let tags_value = obj.get("tags").and_then(Value::as_array).ok_or_else(|| {
            invalid(format!("{format_name} format must have a tags field with an array"))
        })?;
        let mut tags = Vec::with_capacity(tags_value.len());
        for tag in tags_value {
            tags.push(self.parse_tag_value(tag)?);
        }
        if tags.is_empty() {
            return Err(invalid(format!(
                "{format_name} format must have at least one tag"
            )));
        }
        Ok(tags)
    }

    fn parse_flag(&mut self, obj: &Map<String, Value>, name: &str) -> Result<bool> {
        match obj.get(name) {
            None => Ok(false),
            Some(Value::Bool(flag)) => Ok(*flag),
            Some(_) => Err(invalid(format!("{name} must be a boolean"))),
        }
    }

    fn parse_triggered_tags(&mut self, obj: &Map<String, Value>) -> Result<Format> {
        let triggers_value = obj
            .get("triggers")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                invalid("triggered_tags format must have a triggers field with an array")
            })?;
        let mut triggers = Vec::with_capacity(triggers_value.len());
        for trigger in triggers_value {
            match trigger.as_str() {
                Some(trigger) if !trigger.is_empty() => triggers.push(trigger.to_string()),
                _ => {
                    return Err(invalid(
                        "triggered_tags format's triggers must be non-empty strings",
                    ))
                }
            }
        }
        if triggers.is_empty() {
            return Err(invalid("triggered_tags format must have at least one trigger"));
        }

        let tags = self.parse_tags(obj, "triggered_tags")?;
        let excluded_strings = self.parse_excludes(obj, "triggered_tags")?;
        let at_least_one = self.parse_flag(obj, "at_least_one")?;
        let stop_after_first = self.parse_flag(obj, "stop_after_first")?;

        Ok(Format::TriggeredTags {
            triggers,
            tags,
            excluded_strings,
            detected_end_strings: Vec::new(),
            at_least_one,
            stop_after_first,
        })
    }

    fn parse_tags_with_separator(&mut self, obj: &Map<String, Value>) -> Result<Format> {
        let tags = self.parse_tags(obj, "tags_with_separator")?;
        let separator = obj
            .get("separator")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                invalid("tags_with_separator format's separator field must be a string")
            })?
            .to_string();
        let at_least_one = self.parse_flag(obj, "at_least_one")?;
        let stop_after_first = self.parse_flag(obj, "stop_after_first")?;

        Ok(Format::TagsWithSeparator {
            tags,
            separator,
            detected_end_strings: Vec::new(),
            at_least_one,
            stop_after_first,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<StructuralTag> {
        parse_structural_tag(json)
    }

    #[test]
    fn test_const_string() {
        let tag = parse(r#"{"format":{"type":"const_string","value":"hi"}}"#).unwrap();
        assert_eq!(
            tag.format,
            Format::ConstString {
                value: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_const_string_empty_value_rejected() {
        assert!(parse(r#"{"format":{"type":"const_string","value":""}}"#).is_err());
    }

    #[test]
    fn test_top_level_type_checked() {
        assert!(parse(r#"{"type":"structural_tag","format":{"type":"any_text"}}"#).is_ok());
        assert!(parse(r#"{"type":"other","format":{"type":"any_text"}}"#).is_err());
        assert!(parse(r#"{"type":"structural_tag"}"#).is_err());
    }

    #[test]
    fn test_invalid_json_reported_as_such() {
        match parse("{not json") {
            Err(StencilError::InvalidJson(_)) => {}
            other => panic!("expected InvalidJson, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(parse(r#"{"format":{"type":"mystery"}}"#).is_err());
    }

    #[test]
    fn test_tag_inferred_without_type() {
        let tag = parse(
            r#"{"format":{"begin":"<a>","content":{"type":"const_string","value":"x"},"end":"</a>"}}"#,
        )
        .unwrap();
        match tag.format {
            Format::Tag(tag) => {
                assert_eq!(tag.begin, "<a>");
                assert_eq!(tag.end, vec!["</a>".to_string()]);
            }
            other => panic!("expected tag, got {other:?}"),
        }
    }

    #[test]
    fn test_const_string_inferred_without_type() {
        let tag = parse(r#"{"format":{"value":"x"}}"#).unwrap();
        assert!(matches!(tag.format, Format::ConstString { .. }));
    }

    #[test]
    fn test_any_text_inference_requires_excludes() {
        // A bare object infers as nothing.
        assert!(parse(r#"{"format":{}}"#).is_err());
        let tag = parse(r#"{"format":{"excludes":["x"]}}"#).unwrap();
        assert!(matches!(tag.format, Format::AnyText { .. }));
    }

    #[test]
    fn test_regex_never_inferred() {
        assert!(parse(r#"{"format":{"pattern":"[a-z]+"}}"#).is_err());
        assert!(parse(r#"{"format":{"type":"regex","pattern":"[a-z]+"}}"#).is_ok());
    }

    #[test]
    fn test_regex_excludes_must_be_non_empty() {
        assert!(
            parse(r#"{"format":{"type":"regex","pattern":"a","excludes":[""]}}"#).is_err()
        );
    }

    #[test]
    fn test_sequence_flattening_is_one_level() {
        let tag = parse(
            r#"{"format":{"type":"sequence","elements":[
                {"type":"const_string","value":"a"},
                {"type":"sequence","elements":[
                    {"type":"const_string","value":"b"},
                    {"type":"const_string","value":"c"}
                ]}
            ]}}"#,
        )
        .unwrap();
        match tag.format {
            Format::Sequence { elements, .. } => {
                assert_eq!(elements.len(), 3);
                assert!(elements
                    .iter()
                    .all(|e| matches!(e, Format::ConstString { .. })));
            }
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn test_tag_end_forms() {
        let array = parse(
            r#"{"format":{"type":"tag","begin":"<a>","content":{"type":"any_text"},"end":["</a>","</A>"]}}"#,
        )
        .unwrap();
        match array.format {
            Format::Tag(tag) => assert_eq!(tag.end.len(), 2),
            other => panic!("expected tag, got {other:?}"),
        }

        assert!(parse(
            r#"{"format":{"type":"tag","begin":"<a>","content":{"type":"any_text"},"end":[]}}"#
        )
        .is_err());
        assert!(parse(
            r#"{"format":{"type":"tag","begin":"<a>","content":{"type":"any_text"},"end":7}}"#
        )
        .is_err());
        assert!(parse(
            r#"{"format":{"type":"tag","begin":"<a>","content":{"type":"any_text"}}}"#
        )
        .is_err());
    }

    #[test]
    fn test_tag_in_tags_array_checks_type() {
        assert!(parse(
            r#"{"format":{"type":"tags_with_separator","separator":",","tags":[
                {"type":"or","begin":"<a>","content":{"type":"any_text"},"end":"</a>"}
            ]}}"#,
        )
        .is_err());
    }

    #[test]
    fn test_triggered_tags_requires_non_empty_triggers() {
        assert!(parse(
            r#"{"format":{"type":"triggered_tags","triggers":[],"tags":[
                {"begin":"<a>","content":{"type":"any_text"},"end":"</a>"}
            ]}}"#,
        )
        .is_err());
        assert!(parse(
            r#"{"format":{"type":"triggered_tags","triggers":[""],"tags":[
                {"begin":"<a>","content":{"type":"any_text"},"end":"</a>"}
            ]}}"#,
        )
        .is_err());
    }

    #[test]
    fn test_flags_must_be_booleans() {
        assert!(parse(
            r#"{"format":{"type":"tags_with_separator","separator":"","at_least_one":1,"tags":[
                {"begin":"<a>","content":{"type":"any_text"},"end":"</a>"}
            ]}}"#,
        )
        .is_err());
    }

    #[test]
    fn test_json_schema_accepts_object_or_bool() {
        assert!(parse(r#"{"format":{"type":"json_schema","json_schema":{"type":"integer"}}}"#)
            .is_ok());
        assert!(parse(r#"{"format":{"type":"json_schema","json_schema":true}}"#).is_ok());
        assert!(parse(r#"{"format":{"type":"json_schema","json_schema":"x"}}"#).is_err());
    }
}
