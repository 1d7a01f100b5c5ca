//! EBNF → grammar.
//!
//! Parses a GBNF-style notation and lowers it onto the grammar IR:
//!
//! ```text
//! root  ::= greet (" " name)?
//! greet ::= "hello" | "hi"
//! name  ::= [a-zA-Z]+      # comment
//! ```
//!
//! Literals support `\n \r \t \" \\` and `\uXXXX` escapes; character
//! classes support ranges and `^` negation. The `?`/`*`/`+` quantifiers
//! desugar to auxiliary rules, except that a starred character class maps
//! directly onto the IR's character-class star. A `root` rule is required.

use std::collections::HashMap;

use stencil_core::{ExprId, Grammar, GrammarBuilder, Result, RuleId, StencilError};

/// Compile EBNF source text into a grammar rooted at its `root` rule.
pub fn grammar_from_ebnf(source: &str) -> Result<Grammar> {
    let rules = EbnfParser::new(source).parse_rules()?;
    compile_rules(&rules)
}

fn invalid(message: impl Into<String>) -> StencilError {
    StencilError::InvalidGrammar(message.into())
}

struct EbnfRule {
    name: String,
    alternatives: Vec<Vec<EbnfTerm>>,
}

enum EbnfTerm {
    Literal(String),
    CharClass {
        ranges: Vec<(u32, u32)>,
        negated: bool,
    },
    RuleRef(String),
    Group(Vec<Vec<EbnfTerm>>),
    Optional(Box<EbnfTerm>),
    Star(Box<EbnfTerm>),
    Plus(Box<EbnfTerm>),
}

/************** Parsing **************/

struct EbnfParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> EbnfParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn parse_rules(&mut self) -> Result<Vec<EbnfRule>> {
        let mut rules = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek().is_none() {
                break;
            }
            let name = self.parse_ident()?;
            self.skip_trivia();
            self.expect_str("::=")?;
            let alternatives = self.parse_alternatives()?;
            rules.push(EbnfRule { name, alternatives });
        }
        if rules.is_empty() {
            return Err(invalid("grammar source contains no rules"));
        }
        Ok(rules)
    }

    fn parse_ident(&mut self) -> Result<String> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                self.bump();
            }
            other => {
                return Err(invalid(format!(
                    "expected a rule name at offset {}, found {:?}",
                    self.pos, other
                )))
            }
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                self.bump();
            } else {
                break;
            }
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn expect_str(&mut self, expected: &str) -> Result<()> {
        if self.src[self.pos..].starts_with(expected) {
            self.pos += expected.len();
            Ok(())
        } else {
            Err(invalid(format!(
                "expected \"{expected}\" at offset {}",
                self.pos
            )))
        }
    }

    fn parse_alternatives(&mut self) -> Result<Vec<Vec<EbnfTerm>>> {
        let mut alternatives = vec![self.parse_sequence()?];
        loop {
            self.skip_trivia();
            if self.peek() == Some('|') {
                self.bump();
                alternatives.push(self.parse_sequence()?);
            } else {
                return Ok(alternatives);
            }
        }
    }

    fn parse_sequence(&mut self) -> Result<Vec<EbnfTerm>> {
        let mut terms = Vec::new();
        loop {
            self.skip_trivia();
            let term = match self.peek() {
                None | Some(')') | Some('|') => break,
                Some('"') => self.parse_literal()?,
                Some('[') => self.parse_char_class()?,
                Some('(') => {
                    self.bump();
                    let group = self.parse_alternatives()?;
                    self.skip_trivia();
                    self.expect_str(")")?;
                    EbnfTerm::Group(group)
                }
                Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                    // An identifier followed by "::=" starts the next rule.
                    let saved = self.pos;
                    let name = self.parse_ident()?;
                    let after_ident = self.pos;
                    self.skip_trivia();
                    if self.src[self.pos..].starts_with("::=") {
                        self.pos = saved;
                        break;
                    }
                    self.pos = after_ident;
                    EbnfTerm::RuleRef(name)
                }
                Some(c) => {
                    return Err(invalid(format!(
                        "unexpected character '{c}' at offset {}",
                        self.pos
                    )))
                }
            };
            terms.push(self.parse_qualifiers(term));
        }
        if terms.is_empty() {
            return Err(invalid(format!(
                "empty alternative at offset {}",
                self.pos
            )));
        }
        Ok(terms)
    }

    fn parse_qualifiers(&mut self, mut term: EbnfTerm) -> EbnfTerm {
        loop {
            term = match self.peek() {
                Some('?') => {
                    self.bump();
                    EbnfTerm::Optional(Box::new(term))
                }
                Some('*') => {
                    self.bump();
                    EbnfTerm::Star(Box::new(term))
                }
                Some('+') => {
                    self.bump();
                    EbnfTerm::Plus(Box::new(term))
                }
                _ => return term,
            };
        }
    }

    fn parse_literal(&mut self) -> Result<EbnfTerm> {
        self.expect_str("\"")?;
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(invalid("unterminated string literal")),
                Some('"') => return Ok(EbnfTerm::Literal(value)),
                Some('\\') => value.push(self.parse_escape()?),
                Some(c) => value.push(c),
            }
        }
    }

    fn parse_escape(&mut self) -> Result<char> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('\\') => Ok('\\'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('[') => Ok('['),
            Some(']') => Ok(']'),
            Some('-') => Ok('-'),
            Some('u') => {
                let start = self.pos;
                for _ in 0..4 {
                    match self.bump() {
                        Some(c) if c.is_ascii_hexdigit() => {}
                        _ => {
                            return Err(invalid(format!(
                                "\\u escape needs four hex digits at offset {start}"
                            )))
                        }
                    }
                }
                let code = u32::from_str_radix(&self.src[start..self.pos], 16)
                    .expect("hex digits verified");
                char::from_u32(code)
                    .ok_or_else(|| invalid(format!("\\u{code:04x} is not a scalar value")))
            }
            other => Err(invalid(format!(
                "unsupported escape {:?} at offset {}",
                other, self.pos
            ))),
        }
    }

    fn parse_char_class(&mut self) -> Result<EbnfTerm> {
        self.expect_str("[")?;
        let negated = if self.peek() == Some('^') {
            self.bump();
            true
        } else {
            false
        };
        let mut ranges = Vec::new();
        loop {
            let low = match self.bump() {
                None => return Err(invalid("unterminated character class")),
                Some(']') => break,
                Some('\\') => self.parse_escape()?,
                Some(c) => c,
            };
            // A '-' directly before ']' is a literal dash.
            if self.peek() == Some('-') && !self.src[self.pos + 1..].starts_with(']') {
                self.bump();
                let high = match self.bump() {
                    None => return Err(invalid("unterminated character class")),
                    Some('\\') => self.parse_escape()?,
                    Some(c) => c,
                };
                if (high as u32) < (low as u32) {
                    return Err(invalid(format!(
                        "invalid character range: {low}-{high}"
                    )));
                }
                ranges.push((low as u32, high as u32));
            } else {
                ranges.push((low as u32, low as u32));
            }
        }
        if ranges.is_empty() {
            return Err(invalid("empty character class"));
        }
        Ok(EbnfTerm::CharClass { ranges, negated })
    }
}

/************** Lowering **************/

fn compile_rules(rules: &[EbnfRule]) -> Result<Grammar> {
    let mut builder = GrammarBuilder::new();
    let mut rule_ids: HashMap<&str, RuleId> = HashMap::new();
    for rule in rules {
        if rule_ids.contains_key(rule.name.as_str()) {
            return Err(invalid(format!("duplicate grammar rule: {}", rule.name)));
        }
        rule_ids.insert(&rule.name, builder.add_empty_rule(&rule.name));
    }

    for rule in rules {
        let body = compile_alternatives(&mut builder, &rule_ids, &rule.alternatives)?;
        builder.update_rule_body(rule_ids[rule.name.as_str()], body);
    }

    let root = *rule_ids
        .get("root")
        .ok_or_else(|| invalid("grammar has no root rule"))?;
    Ok(builder.into_grammar(root))
}

fn compile_alternatives(
    builder: &mut GrammarBuilder,
    rule_ids: &HashMap<&str, RuleId>,
    alternatives: &[Vec<EbnfTerm>],
) -> Result<ExprId> {
    let mut choices = Vec::with_capacity(alternatives.len());
    for sequence in alternatives {
        let mut elements = Vec::with_capacity(sequence.len());
        for term in sequence {
            elements.push(compile_term(builder, rule_ids, term)?);
        }
        choices.push(builder.add_sequence(elements));
    }
    Ok(builder.add_choices(choices))
}

fn compile_term(
    builder: &mut GrammarBuilder,
    rule_ids: &HashMap<&str, RuleId>,
    term: &EbnfTerm,
) -> Result<ExprId> {
    match term {
        EbnfTerm::Literal(value) if value.is_empty() => Ok(builder.add_empty_string()),
        EbnfTerm::Literal(value) => Ok(builder.add_byte_string(value)),
        EbnfTerm::CharClass { ranges, negated } => {
            Ok(builder.add_character_class(ranges.clone(), *negated))
        }
        EbnfTerm::RuleRef(name) => match rule_ids.get(name.as_str()) {
            Some(&rule) => Ok(builder.add_rule_ref(rule)),
            None => Err(invalid(format!("grammar rule '{name}' is undefined"))),
        },
        EbnfTerm::Group(alternatives) => compile_alternatives(builder, rule_ids, alternatives),
        EbnfTerm::Optional(inner) => {
            let inner = compile_term(builder, rule_ids, inner)?;
            let some = builder.add_sequence(vec![inner]);
            let empty = builder.add_empty_string();
            let none = builder.add_sequence(vec![empty]);
            Ok(builder.add_choices(vec![some, none]))
        }
        EbnfTerm::Star(inner) => {
            // A starred character class has a dedicated IR node.
            if let EbnfTerm::CharClass { ranges, negated } = inner.as_ref() {
                return Ok(builder.add_character_class_star(ranges.clone(), *negated));
            }
            let rule = star_rule(builder, rule_ids, inner)?;
            Ok(builder.add_rule_ref(rule))
        }
        EbnfTerm::Plus(inner) => {
            let first = compile_term(builder, rule_ids, inner)?;
            let rest = if let EbnfTerm::CharClass { ranges, negated } = inner.as_ref() {
                builder.add_character_class_star(ranges.clone(), *negated)
            } else {
                let rule = star_rule(builder, rule_ids, inner)?;
                builder.add_rule_ref(rule)
            };
            Ok(builder.add_sequence(vec![first, rest]))
        }
    }
}

/// Auxiliary rule `star ::= inner star | ""`.
fn star_rule(
    builder: &mut GrammarBuilder,
    rule_ids: &HashMap<&str, RuleId>,
    inner: &EbnfTerm,
) -> Result<RuleId> {
    let rule = builder.add_empty_rule("star");
    let inner = compile_term(builder, rule_ids, inner)?;
    let self_ref = builder.add_rule_ref(rule);
    let repeat = builder.add_sequence(vec![inner, self_ref]);
    let empty = builder.add_empty_string();
    let stop = builder.add_sequence(vec![empty]);
    let body = builder.add_choices(vec![repeat, stop]);
    builder.update_rule_body(rule, body);
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_core::GrammarExpr;

    #[test]
    fn test_single_rule() {
        let grammar = grammar_from_ebnf(r#"root ::= "hello""#).unwrap();
        assert_eq!(grammar.num_rules(), 1);
        assert_eq!(grammar.rule(grammar.root).name, "root");
    }

    #[test]
    fn test_multiple_rules_and_refs() {
        let grammar = grammar_from_ebnf(
            r#"
            root ::= greet " " name
            greet ::= "hello" | "hi"
            name ::= [a-zA-Z]+
            "#,
        )
        .unwrap();
        assert_eq!(grammar.num_rules(), 3);
    }

    #[test]
    fn test_forward_references() {
        let grammar = grammar_from_ebnf(
            r#"
            root ::= item
            item ::= "x"
            "#,
        )
        .unwrap();
        assert_eq!(grammar.num_rules(), 2);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let err = grammar_from_ebnf(r#"main ::= "x""#).unwrap_err();
        assert!(err.to_string().contains("root"));
    }

    #[test]
    fn test_undefined_rule_is_an_error() {
        let err = grammar_from_ebnf(r#"root ::= missing"#).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_duplicate_rule_is_an_error() {
        let err = grammar_from_ebnf(
            r#"
            root ::= "a"
            root ::= "b"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_starred_char_class_uses_star_node() {
        let grammar = grammar_from_ebnf(r#"root ::= [0-9]*"#).unwrap();
        assert!(grammar
            .exprs
            .iter()
            .any(|e| matches!(e, GrammarExpr::CharacterClassStar { .. })));
        // No auxiliary rule needed.
        assert_eq!(grammar.num_rules(), 1);
    }

    #[test]
    fn test_star_on_group_makes_aux_rule() {
        let grammar = grammar_from_ebnf(r#"root ::= ("ab")*"#).unwrap();
        assert_eq!(grammar.num_rules(), 2);
        assert!(grammar.rules.iter().any(|r| r.name == "star"));
    }

    #[test]
    fn test_plus_requires_one_occurrence() {
        let grammar = grammar_from_ebnf(r#"root ::= ("a")+"#).unwrap();
        // The plus lowers to `first · star`.
        assert!(grammar.rules.iter().any(|r| r.name == "star"));
    }

    #[test]
    fn test_escapes_in_literals() {
        let grammar = grammar_from_ebnf(r#"root ::= "a\nb\"cA""#).unwrap();
        let found = grammar.exprs.iter().any(|e| match e {
            GrammarExpr::ByteString(s) => s == "a\nb\"cA",
            _ => false,
        });
        assert!(found);
    }

    #[test]
    fn test_negated_class_and_literal_dash() {
        let grammar = grammar_from_ebnf(r#"root ::= [^a-z-]"#).unwrap();
        let found = grammar.exprs.iter().any(|e| match e {
            GrammarExpr::CharacterClass { ranges, negated } => {
                *negated && ranges.contains(&('-' as u32, '-' as u32))
            }
            _ => false,
        });
        assert!(found);
    }

    #[test]
    fn test_comments_are_skipped() {
        let grammar = grammar_from_ebnf(
            "# leading comment\nroot ::= \"x\" # trailing comment\n",
        )
        .unwrap();
        assert_eq!(grammar.num_rules(), 1);
    }

    #[test]
    fn test_empty_literal_is_empty_string() {
        let grammar = grammar_from_ebnf(r#"root ::= """#).unwrap();
        assert!(grammar
            .exprs
            .iter()
            .any(|e| matches!(e, GrammarExpr::EmptyStr)));
    }

    #[test]
    fn test_rule_boundary_without_newline_sensitivity() {
        // The `b ::=` that follows must not be swallowed by `root`'s body.
        let grammar = grammar_from_ebnf("root ::= b b ::= \"y\"").unwrap();
        assert_eq!(grammar.num_rules(), 2);
    }
}
