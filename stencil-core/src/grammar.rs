//! Grammar intermediate representation and the handle-based builder.
//!
//! A grammar is a set of named rules over an append-only expression arena.
//! Expressions reference each other (and rules) through `Copy` id handles,
//! so composite expressions always point at earlier arena slots. Builders
//! hand out ids; the finished [`Grammar`] is immutable.

use std::collections::HashMap;
use std::fmt;

/// Handle into the expression arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

/// Handle into the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(pub u32);

/// Dispatch primitive: free text scanned until a trigger prefix appears,
/// then the matching trigger's rule takes over.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagDispatch {
    /// `(trigger, rule)` pairs. The trigger bytes themselves are consumed
    /// by the dispatcher, not by the target rule.
    pub triggers: Vec<(String, RuleId)>,
    /// Whether generation may stop at end-of-stream.
    pub stop_eos: bool,
    /// Stop strings that terminate the dispatch region.
    pub stop_strings: Vec<String>,
    /// Whether scanning resumes after a dispatched rule completes.
    pub loop_after_dispatch: bool,
    /// Substrings forbidden in the free-text portion.
    pub excluded_strings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarExpr {
    /// A literal byte string, stored as UTF-8 text.
    ByteString(String),
    /// The empty string.
    EmptyStr,
    /// A codepoint class; ranges are inclusive `(min, max)` pairs.
    CharacterClass {
        ranges: Vec<(u32, u32)>,
        negated: bool,
    },
    /// Kleene star over a codepoint class.
    CharacterClassStar {
        ranges: Vec<(u32, u32)>,
        negated: bool,
    },
    /// Reference to another rule.
    RuleRef(RuleId),
    /// Concatenation of sub-expressions.
    Sequence(Vec<ExprId>),
    /// Ordered disjunction of sub-expressions.
    Choices(Vec<ExprId>),
    /// See [`TagDispatch`].
    TagDispatch(TagDispatch),
}

/// A named rule. `body` is `None` only while the rule is under construction
/// (`add_empty_rule` before `update_rule_body`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub body: Option<ExprId>,
}

/// A finished grammar. `root` is the entry rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    pub exprs: Vec<GrammarExpr>,
    pub rules: Vec<Rule>,
    pub root: RuleId,
}

impl Grammar {
    pub fn expr(&self, id: ExprId) -> &GrammarExpr {
        &self.exprs[id.0 as usize]
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0 as usize]
    }

    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    /// Display names for all rules: the name hint when unique, otherwise the
    /// hint suffixed with the occurrence index.
    fn display_names(&self) -> Vec<String> {
        let mut hint_counts: HashMap<&str, usize> = HashMap::new();
        for rule in &self.rules {
            *hint_counts.entry(rule.name.as_str()).or_default() += 1;
        }
        let mut seen: HashMap<&str, usize> = HashMap::new();
        self.rules
            .iter()
            .map(|rule| {
                let occurrence = seen.entry(rule.name.as_str()).or_default();
                let name = if hint_counts[rule.name.as_str()] == 1 {
                    rule.name.clone()
                } else {
                    format!("{}_{}", rule.name, occurrence)
                };
                *occurrence += 1;
                name
            })
            .collect()
    }
}

/// Mutable grammar under construction. All `add_*` methods append and
/// return a handle; nothing is ever removed.
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    exprs: Vec<GrammarExpr>,
    rules: Vec<Rule>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_expr(&mut self, expr: GrammarExpr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn add_byte_string(&mut self, value: &str) -> ExprId {
        self.push_expr(GrammarExpr::ByteString(value.to_string()))
    }

    pub fn add_empty_string(&mut self) -> ExprId {
        self.push_expr(GrammarExpr::EmptyStr)
    }

    pub fn add_character_class(&mut self, ranges: Vec<(u32, u32)>, negated: bool) -> ExprId {
        self.push_expr(GrammarExpr::CharacterClass { ranges, negated })
    }

    pub fn add_character_class_star(&mut self, ranges: Vec<(u32, u32)>, negated: bool) -> ExprId {
        self.push_expr(GrammarExpr::CharacterClassStar { ranges, negated })
    }

    pub fn add_rule_ref(&mut self, rule: RuleId) -> ExprId {
        self.push_expr(GrammarExpr::RuleRef(rule))
    }

    pub fn add_sequence(&mut self, elements: Vec<ExprId>) -> ExprId {
        self.push_expr(GrammarExpr::Sequence(elements))
    }

    pub fn add_choices(&mut self, choices: Vec<ExprId>) -> ExprId {
        self.push_expr(GrammarExpr::Choices(choices))
    }

    pub fn add_tag_dispatch(&mut self, dispatch: TagDispatch) -> ExprId {
        self.push_expr(GrammarExpr::TagDispatch(dispatch))
    }

    pub fn add_rule(&mut self, name_hint: &str, body: ExprId) -> RuleId {
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(Rule {
            name: name_hint.to_string(),
            body: Some(body),
        });
        id
    }

    pub fn add_empty_rule(&mut self, name_hint: &str) -> RuleId {
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(Rule {
            name: name_hint.to_string(),
            body: None,
        });
        id
    }

    pub fn update_rule_body(&mut self, rule: RuleId, body: ExprId) {
        self.rules[rule.0 as usize].body = Some(body);
    }

    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    /// Copy a finished grammar's rules and expressions into this builder,
    /// remapping every id, and return the remapped root rule.
    pub fn splice(&mut self, sub: &Grammar) -> RuleId {
        let rule_map: Vec<RuleId> = sub
            .rules
            .iter()
            .map(|rule| self.add_empty_rule(&rule.name))
            .collect();

        // Expressions only reference earlier slots, so a single in-order
        // pass can remap children before their parents.
        let mut expr_map: Vec<ExprId> = Vec::with_capacity(sub.exprs.len());
        for expr in &sub.exprs {
            let remapped = match expr {
                GrammarExpr::ByteString(_)
                | GrammarExpr::EmptyStr
                | GrammarExpr::CharacterClass { .. }
                | GrammarExpr::CharacterClassStar { .. } => expr.clone(),
                GrammarExpr::RuleRef(rule) => {
                    GrammarExpr::RuleRef(rule_map[rule.0 as usize])
                }
                GrammarExpr::Sequence(elements) => GrammarExpr::Sequence(
                    elements.iter().map(|e| expr_map[e.0 as usize]).collect(),
                ),
                GrammarExpr::Choices(choices) => GrammarExpr::Choices(
                    choices.iter().map(|e| expr_map[e.0 as usize]).collect(),
                ),
                GrammarExpr::TagDispatch(dispatch) => {
                    let mut dispatch = dispatch.clone();
                    for (_, rule) in &mut dispatch.triggers {
                        *rule = rule_map[rule.0 as usize];
                    }
                    GrammarExpr::TagDispatch(dispatch)
                }
            };
            let id = self.push_expr(remapped);
            expr_map.push(id);
        }

        for (i, rule) in sub.rules.iter().enumerate() {
            if let Some(body) = rule.body {
                self.update_rule_body(rule_map[i], expr_map[body.0 as usize]);
            }
        }

        rule_map[sub.root.0 as usize]
    }

    /// Finish construction. `root` becomes the grammar's entry rule.
    pub fn into_grammar(self, root: RuleId) -> Grammar {
        Grammar {
            exprs: self.exprs,
            rules: self.rules,
            root,
        }
    }
}

fn escape_literal(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{{{:x}}}", c as u32));
            }
            c => out.push(c),
        }
    }
}

fn write_char_class(ranges: &[(u32, u32)], negated: bool, out: &mut String) {
    out.push('[');
    if negated {
        out.push('^');
    }
    for &(min, max) in ranges {
        write_class_char(min, out);
        if min != max {
            out.push('-');
            write_class_char(max, out);
        }
    }
    out.push(']');
}

fn write_class_char(cp: u32, out: &mut String) {
    match char::from_u32(cp) {
        Some(c) if !c.is_control() && c != ']' && c != '[' && c != '\\' && c != '-' => {
            out.push(c)
        }
        _ => out.push_str(&format!("\\u{{{cp:x}}}")),
    }
}

impl Grammar {
    fn write_expr(&self, id: ExprId, names: &[String], out: &mut String) {
        match self.expr(id) {
            GrammarExpr::ByteString(s) => {
                out.push('"');
                escape_literal(s, out);
                out.push('"');
            }
            GrammarExpr::EmptyStr => out.push_str("\"\""),
            GrammarExpr::CharacterClass { ranges, negated } => {
                write_char_class(ranges, *negated, out);
            }
            GrammarExpr::CharacterClassStar { ranges, negated } => {
                write_char_class(ranges, *negated, out);
                out.push('*');
            }
            GrammarExpr::RuleRef(rule) => out.push_str(&names[rule.0 as usize]),
            GrammarExpr::Sequence(elements) => {
                if elements.is_empty() {
                    out.push_str("\"\"");
                    return;
                }
                out.push('(');
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    self.write_expr(*element, names, out);
                }
                out.push(')');
            }
            GrammarExpr::Choices(choices) => {
                if choices.is_empty() {
                    out.push_str("<no-choice>");
                    return;
                }
                out.push('(');
                for (i, choice) in choices.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" | ");
                    }
                    self.write_expr(*choice, names, out);
                }
                out.push(')');
            }
            GrammarExpr::TagDispatch(dispatch) => {
                out.push_str("TagDispatch(");
                for (trigger, rule) in &dispatch.triggers {
                    out.push_str("(\"");
                    escape_literal(trigger, out);
                    out.push_str("\", ");
                    out.push_str(&names[rule.0 as usize]);
                    out.push_str("), ");
                }
                out.push_str(&format!("stop_eos={}, stop_str=(", dispatch.stop_eos));
                for (i, stop) in dispatch.stop_strings.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push('"');
                    escape_literal(stop, out);
                    out.push('"');
                }
                out.push_str(&format!(
                    "), loop_after_dispatch={}",
                    dispatch.loop_after_dispatch
                ));
                if !dispatch.excluded_strings.is_empty() {
                    out.push_str(", excluded=(");
                    for (i, excluded) in dispatch.excluded_strings.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        out.push('"');
                        escape_literal(excluded, out);
                        out.push('"');
                    }
                    out.push(')');
                }
                out.push(')');
            }
        }
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.display_names();
        for (i, rule) in self.rules.iter().enumerate() {
            let mut body = String::new();
            match rule.body {
                Some(expr) => self.write_expr(expr, &names, &mut body),
                None => body.push_str("<empty>"),
            }
            writeln!(f, "{} ::= {}", names[i], body)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_round_trip() {
        let mut builder = GrammarBuilder::new();
        let hello = builder.add_byte_string("hello");
        let seq = builder.add_sequence(vec![hello]);
        let choices = builder.add_choices(vec![seq]);
        let rule = builder.add_rule("greeting", choices);
        let grammar = builder.into_grammar(rule);

        assert_eq!(grammar.num_rules(), 1);
        assert_eq!(grammar.rule(rule).name, "greeting");
        match grammar.expr(grammar.rule(rule).body.unwrap()) {
            GrammarExpr::Choices(choices) => assert_eq!(choices.len(), 1),
            other => panic!("expected choices, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_rule_then_update() {
        let mut builder = GrammarBuilder::new();
        let rule = builder.add_empty_rule("pending");
        assert!(builder.rules[rule.0 as usize].body.is_none());
        let body = builder.add_empty_string();
        builder.update_rule_body(rule, body);
        let grammar = builder.into_grammar(rule);
        assert_eq!(grammar.rule(rule).body, Some(body));
    }

    #[test]
    fn test_splice_remaps_ids() {
        // Sub-grammar: a ::= "x" b ; b ::= "y"
        let mut sub_builder = GrammarBuilder::new();
        let b_rule = sub_builder.add_empty_rule("b");
        let y = sub_builder.add_byte_string("y");
        sub_builder.update_rule_body(b_rule, y);
        let x = sub_builder.add_byte_string("x");
        let b_ref = sub_builder.add_rule_ref(b_rule);
        let seq = sub_builder.add_sequence(vec![x, b_ref]);
        let a_rule = sub_builder.add_rule("a", seq);
        let sub = sub_builder.into_grammar(a_rule);

        // Host builder already has a rule, so every spliced id shifts.
        let mut builder = GrammarBuilder::new();
        let filler = builder.add_empty_string();
        builder.add_rule("filler", filler);

        let spliced_root = builder.splice(&sub);
        assert_eq!(spliced_root.0, 2); // filler, b, a
        let grammar = builder.into_grammar(spliced_root);
        assert_eq!(grammar.rule(spliced_root).name, "a");

        // The spliced `a` body must reference the spliced `b`, not the old id.
        let body = grammar.rule(spliced_root).body.unwrap();
        match grammar.expr(body) {
            GrammarExpr::Sequence(elements) => match grammar.expr(elements[1]) {
                GrammarExpr::RuleRef(rule) => assert_eq!(grammar.rule(*rule).name, "b"),
                other => panic!("expected rule ref, got {other:?}"),
            },
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn test_display_disambiguates_duplicate_hints() {
        let mut builder = GrammarBuilder::new();
        let x = builder.add_byte_string("x");
        let first = builder.add_rule("tag", x);
        let y = builder.add_byte_string("y");
        builder.add_rule("tag", y);
        let grammar = builder.into_grammar(first);

        let printed = grammar.to_string();
        assert!(printed.contains("tag_0 ::= \"x\""));
        assert!(printed.contains("tag_1 ::= \"y\""));
    }

    #[test]
    fn test_display_escapes_literals() {
        let mut builder = GrammarBuilder::new();
        let s = builder.add_byte_string("a\"b\nc");
        let rule = builder.add_rule("lit", s);
        let grammar = builder.into_grammar(rule);
        assert_eq!(grammar.to_string(), "lit ::= \"a\\\"b\\nc\"\n");
    }
}
