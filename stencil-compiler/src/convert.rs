//! AST → grammar rules.
//!
//! A single walk over the analyzed AST. Every format lowers to one rule
//! (plus auxiliaries); structurally identical subtrees are deduplicated by
//! fingerprint, so converting a format twice returns the same rule id.
//! Sub-grammars (JSON schema, EBNF, plain regex) are built standalone and
//! spliced in; the regex-with-excludes path goes through the byte-automaton
//! product construction and emits one rule per product state.

use std::collections::HashMap;

use stencil_core::{
    ExprId, Grammar, GrammarBuilder, Result, RuleId, StencilError, TagDispatch,
};

use crate::ast::{Format, StructuralTag, TagFormat};
use crate::ebnf::grammar_from_ebnf;
use crate::fingerprint::fingerprint;
use crate::fsm::ByteAutomaton;
use crate::json_schema::grammar_from_json_schema;
use crate::qwen_xml::qwen_xml_to_ebnf;
use crate::regex::{automaton_to_rules, grammar_from_regex, regex_to_automaton};

/// Convert an analyzed structural tag into a grammar rooted at `root`.
pub fn convert(structural_tag: &StructuralTag) -> Result<Grammar> {
    let mut converter = Converter::default();
    let top_rule = converter.visit(&structural_tag.format)?;
    Ok(converter.finish(top_rule))
}

fn invalid(message: impl Into<String>) -> StencilError {
    StencilError::InvalidStructuralTag(message.into())
}

#[derive(Default)]
struct Converter {
    builder: GrammarBuilder,
    /// Fingerprint → rule id, valid for this conversion only.
    rule_cache: HashMap<String, RuleId>,
}

impl Converter {
    fn visit(&mut self, format: &Format) -> Result<RuleId> {
        let key = fingerprint(format);
        if let Some(&rule) = self.rule_cache.get(&key) {
            return Ok(rule);
        }
        let rule = self.visit_uncached(format)?;
        self.rule_cache.insert(key, rule);
        Ok(rule)
    }

    fn visit_uncached(&mut self, format: &Format) -> Result<RuleId> {
        match format {
            Format::ConstString { value } => Ok(self.const_string_rule(value)),
            Format::JsonSchema { schema } => {
                let sub = grammar_from_json_schema(schema)?;
                Ok(self.builder.splice(&sub))
            }
            Format::QwenXmlParameter { schema } => {
                let sub = grammar_from_ebnf(&qwen_xml_to_ebnf(schema)?)?;
                Ok(self.builder.splice(&sub))
            }
            Format::Grammar { body } => {
                let sub = grammar_from_ebnf(body)?;
                Ok(self.builder.splice(&sub))
            }
            Format::AnyText {
                excluded_strings,
                detected_end_strings,
            } => Ok(self.any_text_rule(excluded_strings, detected_end_strings)),
            Format::Regex {
                pattern,
                excluded_strings,
            } => self.regex_rule(pattern, excluded_strings),
            Format::Sequence { elements, .. } => self.sequence_rule(elements),
            Format::Or { elements, .. } => self.or_rule(elements),
            Format::Tag(tag) => self.tag_rule(tag),
            Format::TriggeredTags {
                triggers,
                tags,
                excluded_strings,
                detected_end_strings,
                at_least_one,
                stop_after_first,
            } => self.triggered_tags_rule(
                triggers,
                tags,
                excluded_strings,
                detected_end_strings,
                *at_least_one,
                *stop_after_first,
            ),
            Format::TagsWithSeparator {
                tags,
                separator,
                detected_end_strings,
                at_least_one,
                stop_after_first,
            } => self.tags_with_separator_rule(
                tags,
                separator,
                detected_end_strings,
                *at_least_one,
                *stop_after_first,
            ),
        }
    }

    /// Wrap the converted top-level rule: `root ::= top`.
    fn finish(mut self, top_rule: RuleId) -> Grammar {
        let top_ref = self.builder.add_rule_ref(top_rule);
        let seq = self.builder.add_sequence(vec![top_ref]);
        let choices = self.builder.add_choices(vec![seq]);
        let root = self.builder.add_rule("root", choices);
        self.builder.into_grammar(root)
    }

    fn const_string_rule(&mut self, value: &str) -> RuleId {
        let literal = self.builder.add_byte_string(value);
        let seq = self.builder.add_sequence(vec![literal]);
        let choices = self.builder.add_choices(vec![seq]);
        self.builder.add_rule("const_string", choices)
    }

    fn any_text_rule(&mut self, excluded: &[String], detected_ends: &[String]) -> RuleId {
        if detected_ends.is_empty() {
            // Unbounded: any Unicode text.
            let star = self.builder.add_character_class_star(vec![(0, 0x10FFFF)], false);
            let seq = self.builder.add_sequence(vec![star]);
            let choices = self.builder.add_choices(vec![seq]);
            return self.builder.add_rule("any_text", choices);
        }

        let stop_strings: Vec<String> = detected_ends
            .iter()
            .filter(|end| !end.is_empty())
            .cloned()
            .collect();
        debug_assert!(
            !stop_strings.is_empty(),
            "analysis guarantees a non-empty detected end string"
        );
        let dispatch = self.builder.add_tag_dispatch(TagDispatch {
            triggers: Vec::new(),
            stop_eos: false,
            stop_strings,
            loop_after_dispatch: false,
            excluded_strings: excluded.to_vec(),
        });
        self.builder.add_rule("any_text", dispatch)
    }

    fn sequence_rule(&mut self, elements: &[Format]) -> Result<RuleId> {
        let mut refs = Vec::with_capacity(elements.len());
        for element in elements {
            let rule = self.visit(element)?;
            refs.push(self.builder.add_rule_ref(rule));
        }
        let seq = self.builder.add_sequence(refs);
        let choices = self.builder.add_choices(vec![seq]);
        Ok(self.builder.add_rule("sequence", choices))
    }

    fn or_rule(&mut self, elements: &[Format]) -> Result<RuleId> {
        let mut seqs = Vec::with_capacity(elements.len());
        for element in elements {
            let rule = self.visit(element)?;
            let rule_ref = self.builder.add_rule_ref(rule);
            seqs.push(self.builder.add_sequence(vec![rule_ref]));
        }
        let choices = self.builder.add_choices(seqs);
        Ok(self.builder.add_rule("or", choices))
    }

    /// `end` as an expression: the empty string or a literal.
    fn end_expr(&mut self, end: &str) -> ExprId {
        if end.is_empty() {
            self.builder.add_empty_string()
        } else {
            self.builder.add_byte_string(end)
        }
    }

    /// The sequence `begin · content · end`, with the end part omitted,
    /// inline, or factored into a `tag_end` choices rule depending on how
    /// many end strings remain after analysis.
    fn tag_sequence(&mut self, begin: &str, content_rule: RuleId, end: &[String]) -> ExprId {
        let begin_expr = self.builder.add_byte_string(begin);
        let content_ref = self.builder.add_rule_ref(content_rule);
        match end {
            [] => self.builder.add_sequence(vec![begin_expr, content_ref]),
            [single] => {
                let end_expr = self.end_expr(single);
                self.builder
                    .add_sequence(vec![begin_expr, content_ref, end_expr])
            }
            multiple => {
                let mut end_seqs = Vec::with_capacity(multiple.len());
                for end in multiple {
                    let end_expr = self.end_expr(end);
                    end_seqs.push(self.builder.add_sequence(vec![end_expr]));
                }
                let end_choices = self.builder.add_choices(end_seqs);
                let end_rule = self.builder.add_rule("tag_end", end_choices);
                let end_ref = self.builder.add_rule_ref(end_rule);
                self.builder
                    .add_sequence(vec![begin_expr, content_ref, end_ref])
            }
        }
    }

    fn tag_rule(&mut self, tag: &TagFormat) -> Result<RuleId> {
        let content_rule = self.visit(&tag.content)?;
        let seq = self.tag_sequence(&tag.begin, content_rule, &tag.end);
        let choices = self.builder.add_choices(vec![seq]);
        Ok(self.builder.add_rule("tag", choices))
    }

    fn visit_tag_format(&mut self, tag: &TagFormat) -> Result<RuleId> {
        let format = Format::Tag(tag.clone());
        self.visit(&format)
    }

    fn regex_rule(&mut self, pattern: &str, excluded: &[String]) -> Result<RuleId> {
        if excluded.is_empty() {
            let sub = grammar_from_regex(pattern)?;
            return Ok(self.builder.splice(&sub));
        }

        let regex_fsm = regex_to_automaton(pattern).map_err(|e| {
            invalid(format!("failed to build FSM from regex pattern: {e}"))
        })?;
        let exclusion_fsm = ByteAutomaton::excluding(excluded);
        let product = ByteAutomaton::intersect(&regex_fsm, &exclusion_fsm).map_err(|e| {
            invalid(format!(
                "failed to compute intersection for regex with excludes: {e}"
            ))
        })?;
        if product.num_states() == 0 {
            return Err(invalid(
                "regex with excludes results in an empty language (nothing matches)",
            ));
        }
        Ok(automaton_to_rules(&mut self.builder, &product, "regex_state"))
    }

    fn triggered_tags_rule(
        &mut self,
        triggers: &[String],
        tags: &[TagFormat],
        excluded: &[String],
        detected_ends: &[String],
        at_least_one: bool,
        stop_after_first: bool,
    ) -> Result<RuleId> {
        // Pair each tag with the unique trigger prefixing its begin, and
        // convert the tag contents.
        let mut trigger_tags: Vec<Vec<usize>> = vec![Vec::new(); triggers.len()];
        let mut content_rules = Vec::with_capacity(tags.len());
        for (tag_index, tag) in tags.iter().enumerate() {
            let mut matched = None;
            for (trigger_index, trigger) in triggers.iter().enumerate() {
                if tag.begin.starts_with(trigger.as_str()) {
                    if matched.is_some() {
                        return Err(invalid(
                            "one tag matches multiple triggers in a triggered_tags format",
                        ));
                    }
                    matched = Some(trigger_index);
                }
            }
            let Some(matched) = matched else {
                return Err(invalid(
                    "one tag does not match any trigger in a triggered_tags format",
                ));
            };
            trigger_tags[matched].push(tag_index);
            content_rules.push(self.visit(&tag.content)?);
        }

        // Exactly one tag, no surrounding text: a plain selection between
        // the tags, with the detected end appended when present.
        if at_least_one && stop_after_first {
            let mut choice_seqs = Vec::with_capacity(tags.len());
            for (tag, &content_rule) in tags.iter().zip(&content_rules) {
                choice_seqs.push(self.tag_sequence(&tag.begin, content_rule, &tag.end));
            }
            let mut expr = self.builder.add_choices(choice_seqs);

            if !detected_ends.is_empty() {
                let sub_rule = self.builder.add_rule("triggered_tags_sub", expr);
                let sub_ref = self.builder.add_rule_ref(sub_rule);
                let end_expr = if let [single] = detected_ends {
                    self.end_expr(single)
                } else {
                    let mut end_seqs = Vec::with_capacity(detected_ends.len());
                    for end in detected_ends {
                        let end_expr = self.end_expr(end);
                        end_seqs.push(self.builder.add_sequence(vec![end_expr]));
                    }
                    let end_choices = self.builder.add_choices(end_seqs);
                    let end_rule = self.builder.add_rule("end_choices", end_choices);
                    self.builder.add_rule_ref(end_rule)
                };
                let seq = self.builder.add_sequence(vec![sub_ref, end_expr]);
                expr = self.builder.add_choices(vec![seq]);
            }

            return Ok(self.builder.add_rule("triggered_tags", expr));
        }

        // General case: a tag dispatch mixing free text with triggered
        // tags. The trigger prefix is consumed by the dispatcher, so each
        // group's begin is stripped.
        let mut pairs = Vec::with_capacity(triggers.len());
        for (trigger_index, trigger) in triggers.iter().enumerate() {
            let mut choice_seqs = Vec::with_capacity(trigger_tags[trigger_index].len());
            for &tag_index in &trigger_tags[trigger_index] {
                let tag = &tags[tag_index];
                let stripped_begin = &tag.begin[trigger.len()..];
                choice_seqs.push(self.tag_sequence(
                    stripped_begin,
                    content_rules[tag_index],
                    &tag.end,
                ));
            }
            let choices = self.builder.add_choices(choice_seqs);
            let group_rule = self.builder.add_rule("triggered_tags_group", choices);
            pairs.push((trigger.clone(), group_rule));
        }

        let loop_after_dispatch = !stop_after_first;
        let dispatch = if detected_ends.is_empty() {
            TagDispatch {
                triggers: pairs,
                stop_eos: true,
                stop_strings: Vec::new(),
                loop_after_dispatch,
                excluded_strings: excluded.to_vec(),
            }
        } else {
            TagDispatch {
                triggers: pairs,
                stop_eos: false,
                stop_strings: detected_ends
                    .iter()
                    .filter(|end| !end.is_empty())
                    .cloned()
                    .collect(),
                loop_after_dispatch,
                excluded_strings: excluded.to_vec(),
            }
        };
        let mut rule_expr = self.builder.add_tag_dispatch(dispatch);

        if at_least_one {
            // One tag is generated up front (full begin, no preceding
            // text), then the dispatch takes over.
            let mut first_seqs = Vec::with_capacity(tags.len());
            for (tag, &content_rule) in tags.iter().zip(&content_rules) {
                first_seqs.push(self.tag_sequence(&tag.begin, content_rule, &tag.end));
            }
            let first_choices = self.builder.add_choices(first_seqs);
            let first_rule = self.builder.add_rule("triggered_tags_first", first_choices);
            let dispatch_rule = self.builder.add_rule("triggered_tags_sub", rule_expr);
            let first_ref = self.builder.add_rule_ref(first_rule);
            let dispatch_ref = self.builder.add_rule_ref(dispatch_rule);
            let seq = self.builder.add_sequence(vec![first_ref, dispatch_ref]);
            rule_expr = self.builder.add_choices(vec![seq]);
        }

        Ok(self.builder.add_rule("triggered_tags", rule_expr))
    }

    fn tags_with_separator_rule(
        &mut self,
        tags: &[TagFormat],
        separator: &str,
        detected_ends: &[String],
        at_least_one: bool,
        stop_after_first: bool,
    ) -> Result<RuleId> {
        // tags_rule ::= tag1 | tag2 | ... | tagN
        let mut choice_seqs = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag_rule = self.visit_tag_format(tag)?;
            let tag_ref = self.builder.add_rule_ref(tag_rule);
            choice_seqs.push(self.builder.add_sequence(vec![tag_ref]));
        }
        let choices = self.builder.add_choices(choice_seqs);
        let tags_rule = self.builder.add_rule("tags_with_separator_tags", choices);
        let tags_ref = self.builder.add_rule_ref(tags_rule);

        let end_exprs: Vec<ExprId> = detected_ends
            .iter()
            .filter(|end| !end.is_empty())
            .map(|end| self.builder.add_byte_string(end))
            .collect();
        let has_ends = !end_exprs.is_empty();
        let separator_matches_end = detected_ends.iter().any(|end| end == separator);

        // A separator equal to an end string would make the recursive form
        // ambiguous, so such lists stop after one element as well.
        if stop_after_first || (has_ends && separator_matches_end) {
            let body = match (at_least_one, has_ends) {
                (true, false) => {
                    let seq = self.builder.add_sequence(vec![tags_ref]);
                    self.builder.add_choices(vec![seq])
                }
                (true, true) => {
                    let mut seqs = Vec::with_capacity(end_exprs.len());
                    for &end_expr in &end_exprs {
                        seqs.push(self.builder.add_sequence(vec![tags_ref, end_expr]));
                    }
                    self.builder.add_choices(seqs)
                }
                (false, false) => {
                    let seq = self.builder.add_sequence(vec![tags_ref]);
                    let empty = self.builder.add_empty_string();
                    self.builder.add_choices(vec![seq, empty])
                }
                (false, true) => {
                    let mut seqs = Vec::with_capacity(end_exprs.len() * 2);
                    for &end_expr in &end_exprs {
                        seqs.push(self.builder.add_sequence(vec![tags_ref, end_expr]));
                    }
                    for &end_expr in &end_exprs {
                        seqs.push(self.builder.add_sequence(vec![end_expr]));
                    }
                    self.builder.add_choices(seqs)
                }
            };
            return Ok(self.builder.add_rule("tags_with_separator", body));
        }

        // Recursive form:
        //   root ::= tags_rule sub (| end)      -- end choice iff not at_least_one
        //   sub  ::= sep tags_rule sub | end
        let sub_rule = self.builder.add_empty_rule("tags_with_separator_sub");
        let end_expr = if !has_ends {
            self.builder.add_empty_string()
        } else if let [single] = end_exprs.as_slice() {
            self.builder.add_sequence(vec![*single])
        } else {
            let mut seqs = Vec::with_capacity(end_exprs.len());
            for &end in &end_exprs {
                seqs.push(self.builder.add_sequence(vec![end]));
            }
            self.builder.add_choices(seqs)
        };

        let mut cons_elements = Vec::with_capacity(3);
        if !separator.is_empty() {
            cons_elements.push(self.builder.add_byte_string(separator));
        }
        cons_elements.push(tags_ref);
        cons_elements.push(self.builder.add_rule_ref(sub_rule));
        let cons_seq = self.builder.add_sequence(cons_elements);
        let sub_body = self.builder.add_choices(vec![cons_seq, end_expr]);
        self.builder.update_rule_body(sub_rule, sub_body);

        let sub_ref = self.builder.add_rule_ref(sub_rule);
        let head_seq = self.builder.add_sequence(vec![tags_ref, sub_ref]);
        let mut root_choices = vec![head_seq];
        if !at_least_one {
            root_choices.push(end_expr);
        }
        let body = self.builder.add_choices(root_choices);
        Ok(self.builder.add_rule("tags_with_separator", body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::parser::parse_structural_tag;

    fn converted(json: &str) -> Result<Grammar> {
        let mut tag = parse_structural_tag(json)?;
        analyze(&mut tag)?;
        convert(&tag)
    }

    #[test]
    fn test_const_string_shape() {
        let grammar = converted(r#"{"format":{"type":"const_string","value":"hi"}}"#).unwrap();
        // const_string + root
        assert_eq!(grammar.num_rules(), 2);
        assert_eq!(grammar.rule(grammar.root).name, "root");
    }

    #[test]
    fn test_duplicate_subtrees_share_one_rule() {
        let single = converted(
            r#"{"format":{"type":"sequence","elements":[
                {"type":"const_string","value":"x"}
            ]}}"#,
        )
        .unwrap();
        let repeated = converted(
            r#"{"format":{"type":"sequence","elements":[
                {"type":"const_string","value":"x"},
                {"type":"const_string","value":"x"},
                {"type":"const_string","value":"x"},
                {"type":"const_string","value":"x"}
            ]}}"#,
        )
        .unwrap();
        // Repetition adds references, never new rules.
        assert_eq!(single.num_rules(), repeated.num_rules());
    }

    #[test]
    fn test_distinct_subtrees_get_distinct_rules() {
        let grammar = converted(
            r#"{"format":{"type":"sequence","elements":[
                {"type":"const_string","value":"x"},
                {"type":"const_string","value":"y"}
            ]}}"#,
        )
        .unwrap();
        // x, y, sequence, root
        assert_eq!(grammar.num_rules(), 4);
    }

    #[test]
    fn test_tag_with_two_ends_makes_end_rule() {
        let grammar = converted(
            r#"{"format":{"type":"tag","begin":"<a>","content":{"type":"const_string","value":"x"},"end":["</a>","</A>"]}}"#,
        )
        .unwrap();
        assert!(grammar.rules.iter().any(|r| r.name == "tag_end"));
    }

    #[test]
    fn test_tag_with_single_end_has_no_end_rule() {
        let grammar = converted(
            r#"{"format":{"type":"tag","begin":"<a>","content":{"type":"const_string","value":"x"},"end":"</a>"}}"#,
        )
        .unwrap();
        assert!(!grammar.rules.iter().any(|r| r.name == "tag_end"));
    }

    #[test]
    fn test_any_text_without_bound_is_star() {
        let grammar = converted(r#"{"format":{"type":"any_text"}}"#).unwrap();
        assert!(grammar.exprs.iter().any(|e| matches!(
            e,
            stencil_core::GrammarExpr::CharacterClassStar { ranges, .. }
                if ranges == &[(0, 0x10FFFF)]
        )));
    }

    #[test]
    fn test_bounded_any_text_is_tag_dispatch() {
        let grammar = converted(
            r#"{"format":{"type":"tag","begin":"<a>","content":{"type":"any_text"},"end":"</a>"}}"#,
        )
        .unwrap();
        let dispatch = grammar.exprs.iter().find_map(|e| match e {
            stencil_core::GrammarExpr::TagDispatch(d) => Some(d),
            _ => None,
        });
        let dispatch = dispatch.expect("bounded any_text lowers to a tag dispatch");
        assert!(dispatch.triggers.is_empty());
        assert!(!dispatch.stop_eos);
        assert_eq!(dispatch.stop_strings, vec!["</a>".to_string()]);
        assert!(!dispatch.loop_after_dispatch);
    }

    #[test]
    fn test_trigger_matching_is_exclusive() {
        let multiple = converted(
            r#"{"format":{"type":"triggered_tags","triggers":["<a","<ab"],"tags":[
                {"begin":"<abc>","content":{"type":"const_string","value":"x"},"end":"</abc>"}
            ]}}"#,
        );
        assert!(multiple.is_err());

        let none = converted(
            r#"{"format":{"type":"triggered_tags","triggers":["<z"],"tags":[
                {"begin":"<abc>","content":{"type":"const_string","value":"x"},"end":"</abc>"}
            ]}}"#,
        );
        assert!(none.is_err());
    }

    #[test]
    fn test_triggered_tags_dispatch_strips_trigger() {
        let grammar = converted(
            r#"{"format":{"type":"triggered_tags","triggers":["<fn"],"tags":[
                {"begin":"<fn_add>","content":{"type":"const_string","value":"x"},"end":"</fn>"}
            ]}}"#,
        )
        .unwrap();
        // The group rule carries the stripped remainder of begin.
        assert!(grammar.exprs.iter().any(|e| matches!(
            e,
            stencil_core::GrammarExpr::ByteString(s) if s == "_add>"
        )));
        let dispatch = grammar
            .exprs
            .iter()
            .find_map(|e| match e {
                stencil_core::GrammarExpr::TagDispatch(d) => Some(d),
                _ => None,
            })
            .expect("general triggered tags lower to a dispatch");
        assert!(dispatch.stop_eos);
        assert!(dispatch.loop_after_dispatch);
        assert_eq!(dispatch.triggers.len(), 1);
    }

    #[test]
    fn test_triggered_tags_single_shot_has_no_dispatch() {
        let grammar = converted(
            r#"{"format":{"type":"triggered_tags","triggers":["<"],
                "at_least_one":true,"stop_after_first":true,"tags":[
                {"begin":"<foo>","content":{"type":"const_string","value":"x"},"end":"</foo>"}
            ]}}"#,
        )
        .unwrap();
        assert!(!grammar
            .exprs
            .iter()
            .any(|e| matches!(e, stencil_core::GrammarExpr::TagDispatch(_))));
    }

    #[test]
    fn test_regex_without_excludes_is_spliced() {
        let grammar = converted(r#"{"format":{"type":"regex","pattern":"[ab]"}}"#).unwrap();
        assert!(grammar.rules.iter().any(|r| r.name == "regex_state"));
    }

    #[test]
    fn test_regex_with_excludes_empty_language() {
        let err = converted(
            r#"{"format":{"type":"regex","pattern":"bad","excludes":["bad"]}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty language"));
    }

    #[test]
    fn test_tags_with_separator_recursive_shape() {
        let grammar = converted(
            r#"{"format":{"type":"tags_with_separator","separator":",","tags":[
                {"begin":"<a>","content":{"type":"const_string","value":"x"},"end":"</a>"}
            ]}}"#,
        )
        .unwrap();
        assert!(grammar.rules.iter().any(|r| r.name == "tags_with_separator_sub"));
        assert!(grammar
            .rules
            .iter()
            .any(|r| r.name == "tags_with_separator_tags"));
    }

    #[test]
    fn test_tags_with_separator_stop_after_first_shape() {
        let grammar = converted(
            r#"{"format":{"type":"tags_with_separator","separator":",","stop_after_first":true,"tags":[
                {"begin":"<a>","content":{"type":"const_string","value":"x"},"end":"</a>"}
            ]}}"#,
        )
        .unwrap();
        assert!(!grammar
            .rules
            .iter()
            .any(|r| r.name == "tags_with_separator_sub"));
    }

    #[test]
    fn test_grammar_format_splices_sub_grammar() {
        let grammar = converted(
            r#"{"format":{"type":"grammar","grammar":"root ::= \"ok\""}}"#,
        )
        .unwrap();
        assert!(grammar.exprs.iter().any(|e| matches!(
            e,
            stencil_core::GrammarExpr::ByteString(s) if s == "ok"
        )));
    }
}
