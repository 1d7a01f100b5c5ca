//! JSON Schema → grammar.
//!
//! A schema is lowered to an anchored regex matching exactly the JSON texts
//! that conform to it, and the regex is compiled through the shared
//! automaton path. This covers the schema subset that matters for
//! constrained tool output: scalar types, enums/consts, anyOf/oneOf,
//! arrays with item bounds, and objects with required/optional properties.
//! `$ref` is rejected; inline all definitions.

use serde_json::{Map, Value};

use stencil_core::{Grammar, Result, StencilError};

use crate::regex::grammar_from_regex;

const WS: &str = r"[ \t\n\r]*";
const STRING_CHAR: &str = r#"([^"\\]|\\["\\/bfnrt]|\\u[0-9a-fA-F]{4})"#;
const INTEGER: &str = r"-?(0|[1-9][0-9]*)";
const NUMBER: &str = r"-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?";
const BOOLEAN: &str = r"(true|false)";
const NULL: &str = r"null";

/// Compile a serialized JSON schema (an object or a boolean) to a grammar.
pub fn grammar_from_json_schema(schema_json: &str) -> Result<Grammar> {
    let pattern = schema_to_regex(schema_json)?;
    grammar_from_regex(&pattern)
}

/// Lower a serialized JSON schema to a regex pattern.
pub fn schema_to_regex(schema_json: &str) -> Result<String> {
    let schema: Value = serde_json::from_str(schema_json)
        .map_err(|e| StencilError::InvalidSchema(format!("schema is not valid JSON: {e}")))?;
    regex_for_node(&schema)
}

fn unsupported(message: impl Into<String>) -> StencilError {
    StencilError::InvalidSchema(message.into())
}

fn regex_for_node(schema: &Value) -> Result<String> {
    if let Some(accept_all) = schema.as_bool() {
        return if accept_all {
            Ok(any_json_value())
        } else {
            Err(unsupported("a false schema rejects all values"))
        };
    }

    let obj = schema
        .as_object()
        .ok_or_else(|| unsupported("schema must be an object or a boolean"))?;

    if let Some(values) = obj.get("enum") {
        return regex_for_enum(values);
    }
    if let Some(value) = obj.get("const") {
        return Ok(literal_regex(value));
    }
    if let Some(branches) = obj.get("anyOf").or_else(|| obj.get("oneOf")) {
        let branches = branches
            .as_array()
            .ok_or_else(|| unsupported("anyOf/oneOf must be an array"))?;
        let alternatives: Result<Vec<String>> = branches.iter().map(regex_for_node).collect();
        return Ok(format!("({})", alternatives?.join("|")));
    }
    if let Some(all_of) = obj.get("allOf").and_then(Value::as_array) {
        // Simplified: conjunctions are approximated by their first branch.
        if let Some(first) = all_of.first() {
            return regex_for_node(first);
        }
    }
    if obj.contains_key("$ref") {
        return Err(unsupported("$ref is not supported; inline all definitions"));
    }

    let type_name = obj.get("type").and_then(Value::as_str).unwrap_or("object");
    match type_name {
        "string" => regex_for_string(obj),
        "integer" => Ok(INTEGER.to_string()),
        "number" => Ok(NUMBER.to_string()),
        "boolean" => Ok(BOOLEAN.to_string()),
        "null" => Ok(NULL.to_string()),
        "array" => regex_for_array(obj),
        "object" => regex_for_object(obj),
        other => Err(unsupported(format!("unsupported JSON schema type: {other}"))),
    }
}

fn regex_for_string(obj: &Map<String, Value>) -> Result<String> {
    if let Some(pattern) = obj.get("pattern").and_then(Value::as_str) {
        // The inner pattern must compile on its own so it cannot break out
        // of the enclosing group.
        regex_automata::dfa::dense::DFA::new(pattern)
            .map_err(|e| unsupported(format!("invalid string pattern: {e}")))?;
        return Ok(format!(r#""(?:{pattern})+""#));
    }
    if let Some(values) = obj.get("enum") {
        return regex_for_enum(values);
    }

    let min_len = obj.get("minLength").and_then(Value::as_u64).unwrap_or(0);
    let max_len = obj.get("maxLength").and_then(Value::as_u64);
    let quantifier = match max_len {
        Some(max) => format!("{{{min_len},{max}}}"),
        None if min_len > 0 => format!("{{{min_len},}}"),
        None => "*".to_string(),
    };
    Ok(format!(r#""{STRING_CHAR}{quantifier}""#))
}

fn regex_for_array(obj: &Map<String, Value>) -> Result<String> {
    let item = match obj.get("items") {
        Some(items) => regex_for_node(items)?,
        None => any_json_value(),
    };
    let min_items = obj.get("minItems").and_then(Value::as_u64).unwrap_or(0) as usize;
    let max_items = obj.get("maxItems").and_then(Value::as_u64).map(|n| n as usize);

    let pattern = match (min_items, max_items) {
        (0, None) => format!(r"\[{WS}({item}({WS},{WS}{item})*)?{WS}\]"),
        (0, Some(max)) => {
            let tail = if max > 1 {
                format!("({WS},{WS}{item}){{0,{}}}", max - 1)
            } else {
                String::new()
            };
            format!(r"\[{WS}({item}{tail})?{WS}\]")
        }
        (min, max) => {
            let required = if min > 1 {
                format!("({WS},{WS}{item}){{{}}}", min - 1)
            } else {
                String::new()
            };
            let optional = match max {
                Some(max) if max > min => format!("({WS},{WS}{item}){{0,{}}}", max - min),
                Some(_) => String::new(),
                None => format!("({WS},{WS}{item})*"),
            };
            format!(r"\[{WS}{item}{required}{optional}{WS}\]")
        }
    };
    Ok(pattern)
}

fn regex_for_object(obj: &Map<String, Value>) -> Result<String> {
    let properties = obj.get("properties").and_then(Value::as_object);
    let required: std::collections::HashSet<&str> = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = properties.filter(|p| !p.is_empty()) else {
        return Ok(format!(r"\{{{WS}\}}"));
    };

    // Lower every property first, then decide each joiner from the pair of
    // adjacent required-flags. A comma is mandatory only between two
    // required properties; before a required property that follows an
    // optional one it must be conditional, and an optional property takes
    // its comma with it into the optional group.
    let mut entries = Vec::with_capacity(properties.len());
    for (name, value_schema) in properties {
        let value = regex_for_node(value_schema)?;
        let entry = format!(r#"{WS}"{}"{WS}:{WS}{value}"#, escape_regex(name));
        entries.push((entry, required.contains(name.as_str())));
    }

    let pieces: Vec<String> = entries
        .iter()
        .enumerate()
        .map(|(index, (entry, is_required))| {
            let previous_required = index.checked_sub(1).map(|i| entries[i].1);
            match (*is_required, previous_required) {
                (true, None) => entry.clone(),
                (true, Some(true)) => format!("{WS},{entry}"),
                (true, Some(false)) => format!("({WS},)?{entry}"),
                (false, None) => format!("({entry})?"),
                (false, Some(_)) => format!("({WS},{entry})?"),
            }
        })
        .collect();

    Ok(format!(r"\{{{WS}{}{WS}\}}", pieces.concat()))
}

fn regex_for_enum(values: &Value) -> Result<String> {
    let values = values
        .as_array()
        .ok_or_else(|| unsupported("enum must be an array"))?;
    let alternatives: Vec<String> = values.iter().map(literal_regex).collect();
    Ok(format!("({})", alternatives.join("|")))
}

/// The regex matching exactly one JSON value's serialization.
fn literal_regex(value: &Value) -> String {
    match value {
        Value::Null => NULL.to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Number(n) => escape_regex(&n.to_string()),
        Value::String(s) => format!(r#""{}""#, escape_regex(s)),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(literal_regex).collect();
            format!(r"\[{WS}{}{WS}\]", items.join(&format!("{WS},{WS}")))
        }
        Value::Object(entries) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!(r#"{WS}"{}"{WS}:{WS}{}"#, escape_regex(k), literal_regex(v)))
                .collect();
            format!(r"\{{{WS}{}{WS}\}}", entries.join(&format!("{WS},{WS}")))
        }
    }
}

/// A loose pattern for "any JSON value"; nested containers are not
/// validated in depth.
fn any_json_value() -> String {
    format!(r#"("{STRING_CHAR}*"|{NUMBER}|{BOOLEAN}|{NULL}|\[.*\]|\{{.*\}})"#)
}

fn escape_regex(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^'
            | '$' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
