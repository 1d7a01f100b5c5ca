//! Qwen XML tool-parameter schemas → EBNF.
//!
//! Qwen-style tool calls serialize each parameter as
//! `<parameter=name>value</parameter>`, one per line. The parameter set and
//! value shapes come from a JSON schema: each property becomes one
//! parameter tag, required properties in schema order, optional properties
//! wrapped with their joining newline. Values are typed loosely: numeric
//! and boolean properties get literal shapes, everything else is free text
//! up to the next tag.

use std::collections::HashSet;

use serde_json::Value;

use stencil_core::{Result, StencilError};

/// Lower a serialized tool-parameter schema (an object or a boolean) to
/// EBNF source accepted by [`crate::ebnf::grammar_from_ebnf`].
pub fn qwen_xml_to_ebnf(schema_json: &str) -> Result<String> {
    let schema: Value = serde_json::from_str(schema_json).map_err(|e| {
        StencilError::InvalidSchema(format!("parameter schema is not valid JSON: {e}"))
    })?;

    if let Some(accept_all) = schema.as_bool() {
        if !accept_all {
            return Err(StencilError::InvalidSchema(
                "a false parameter schema rejects all tool calls".into(),
            ));
        }
        return Ok("root ::= text\ntext ::= [^<]*\n".to_string());
    }

    let obj = schema.as_object().ok_or_else(|| {
        StencilError::InvalidSchema("parameter schema must be an object or a boolean".into())
    })?;
    let properties = obj.get("properties").and_then(Value::as_object);
    let required: HashSet<&str> = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = properties.filter(|p| !p.is_empty()) else {
        return Ok("root ::= \"\"\n".to_string());
    };

    let mut used_names: HashSet<String> = HashSet::new();
    let mut root_terms: Vec<String> = Vec::new();
    let mut rules = String::new();
    let mut first = true;

    for (name, value_schema) in properties {
        let rule_base = unique_rule_name(name, &mut used_names);
        let param_rule = format!("param-{rule_base}");
        let value_rule = format!("value-{rule_base}");

        rules.push_str(&format!(
            "{param_rule} ::= \"<parameter={}>\" {value_rule} \"</parameter>\"\n",
            escape_literal(name)
        ));
        rules.push_str(&format!("{value_rule} ::= {}\n", value_shape(value_schema)));

        let is_required = required.contains(name.as_str());
        let term = if first {
            if is_required {
                param_rule
            } else {
                format!("({param_rule})?")
            }
        } else if is_required {
            format!("\"\\n\" {param_rule}")
        } else {
            format!("(\"\\n\" {param_rule})?")
        };
        root_terms.push(term);
        first = false;
    }

    Ok(format!("root ::= {}\n{rules}", root_terms.join(" ")))
}

/// The EBNF body for one parameter value, chosen from the property's type.
fn value_shape(schema: &Value) -> &'static str {
    let type_name = schema
        .as_object()
        .and_then(|obj| obj.get("type"))
        .and_then(Value::as_str);
    match type_name {
        Some("integer") => "\"-\"? [0-9]+",
        Some("number") => "\"-\"? [0-9]+ (\".\" [0-9]+)? ([eE] [+-]? [0-9]+)?",
        Some("boolean") => "\"true\" | \"false\"",
        _ => "[^<]*",
    }
}

/// Sanitize a property name into an EBNF identifier fragment, keeping
/// distinct properties distinct.
fn unique_rule_name(name: &str, used: &mut HashSet<String>) -> String {
    let mut base: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if base.is_empty() || !base.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        base.insert(0, 'p');
    }
    let mut candidate = base.clone();
    let mut counter = 1;
    while !used.insert(candidate.clone()) {
        candidate = format!("{base}{counter}");
        counter += 1;
    }
    candidate
}

fn escape_literal(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebnf::grammar_from_ebnf;

    #[test]
    fn test_single_required_string() {
        let ebnf = qwen_xml_to_ebnf(
            r#"{"type":"object","properties":{"city":{"type":"string"}},"required":["city"]}"#,
        )
        .unwrap();
        assert!(ebnf.contains("\"<parameter=city>\""));
        assert!(ebnf.contains("[^<]*"));
        let grammar = grammar_from_ebnf(&ebnf).unwrap();
        assert_eq!(grammar.rule(grammar.root).name, "root");
    }

    #[test]
    fn test_optional_property_is_wrapped() {
        let ebnf = qwen_xml_to_ebnf(
            r#"{"type":"object","properties":{"a":{"type":"string"},"b":{"type":"integer"}},"required":["a"]}"#,
        )
        .unwrap();
        // `b` is optional and carries its joining newline.
        assert!(ebnf.contains("(\"\\n\" param-b)?"));
        grammar_from_ebnf(&ebnf).unwrap();
    }

    #[test]
    fn test_typed_values() {
        let ebnf = qwen_xml_to_ebnf(
            r#"{"type":"object","properties":{"n":{"type":"integer"},"flag":{"type":"boolean"}}}"#,
        )
        .unwrap();
        assert!(ebnf.contains("value-n ::= \"-\"? [0-9]+"));
        assert!(ebnf.contains("value-flag ::= \"true\" | \"false\""));
        grammar_from_ebnf(&ebnf).unwrap();
    }

    #[test]
    fn test_true_schema_is_free_text() {
        let ebnf = qwen_xml_to_ebnf("true").unwrap();
        let grammar = grammar_from_ebnf(&ebnf).unwrap();
        assert_eq!(grammar.num_rules(), 2);
    }

    #[test]
    fn test_false_schema_is_rejected() {
        assert!(qwen_xml_to_ebnf("false").is_err());
    }

    #[test]
    fn test_no_properties_is_empty_string() {
        let ebnf = qwen_xml_to_ebnf(r#"{"type":"object"}"#).unwrap();
        assert_eq!(ebnf, "root ::= \"\"\n");
        grammar_from_ebnf(&ebnf).unwrap();
    }

    #[test]
    fn test_odd_property_names_are_sanitized() {
        let ebnf = qwen_xml_to_ebnf(
            r#"{"type":"object","properties":{"weird name!":{"type":"string"}}}"#,
        )
        .unwrap();
        assert!(ebnf.contains("param-weird_name_"));
        assert!(ebnf.contains("<parameter=weird name!>"));
        grammar_from_ebnf(&ebnf).unwrap();
    }
}
