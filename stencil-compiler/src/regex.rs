//! Regex → byte automaton → grammar rules, built on `regex-automata`.

use std::collections::HashMap;

use regex_automata::dfa::dense;
use regex_automata::dfa::Automaton;
use regex_automata::util::primitives::StateID;
use regex_automata::util::start;
use regex_automata::Anchored;

use stencil_core::{Grammar, GrammarBuilder, Result, RuleId, StencilError};

use crate::fsm::ByteAutomaton;

/// Maximum allowed regex pattern length to prevent abuse.
const MAX_PATTERN_LEN: usize = 8192;
/// Maximum DFA size in bytes (10 MB).
const MAX_DFA_SIZE: usize = 10 * 1024 * 1024;

/// Compile a regex pattern into a trimmed byte automaton. The pattern is
/// anchored at both ends: the automaton accepts exactly the full matches.
pub fn regex_to_automaton(pattern: &str) -> Result<ByteAutomaton> {
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(StencilError::InvalidRegex(format!(
            "regex pattern too long ({} bytes, max {})",
            pattern.len(),
            MAX_PATTERN_LEN
        )));
    }

    // MatchKind::All keeps every alternative alive: with the default
    // leftmost-first semantics a DFA for `(a|ab)` would stop at `a`, but
    // this automaton must accept the pattern's whole language.
    let dfa = dense::Builder::new()
        .configure(
            dense::DFA::config()
                .start_kind(regex_automata::dfa::StartKind::Anchored)
                .match_kind(regex_automata::MatchKind::All)
                .dfa_size_limit(Some(MAX_DFA_SIZE)),
        )
        .build(pattern)
        .map_err(|e| StencilError::InvalidRegex(format!("regex DFA compilation error: {e}")))?;

    let start_config = start::Config::new().anchored(Anchored::Yes);
    let start_id = dfa
        .start_state(&start_config)
        .map_err(|e| StencilError::InvalidRegex(format!("no start state: {e}")))?;

    if dfa.is_dead_state(start_id) {
        return Ok(ByteAutomaton::new().trim());
    }

    // Enumerate reachable non-dead states breadth-first, bytes in order, so
    // the numbering is deterministic.
    let mut ids: HashMap<StateID, u32> = HashMap::new();
    let mut order: Vec<StateID> = Vec::new();
    ids.insert(start_id, 0);
    order.push(start_id);
    let mut cursor = 0;
    while cursor < order.len() {
        let sid = order[cursor];
        cursor += 1;
        for byte in 0..=255u8 {
            let next = dfa.next_state(sid, byte);
            if dfa.is_dead_state(next) || ids.contains_key(&next) {
                continue;
            }
            ids.insert(next, order.len() as u32);
            order.push(next);
        }
    }

    let mut fsm = ByteAutomaton::new();
    for _ in 1..order.len() {
        fsm.add_state();
    }
    for (state, &sid) in order.iter().enumerate() {
        // Matches are delayed by one byte in dense DFAs, so "the input so
        // far is a full match" is visible only on the end-of-input
        // transition.
        let accepting = dfa.is_match_state(dfa.next_eoi_state(sid));
        fsm.set_accepting(state as u32, accepting);

        // Coalesce byte runs with a common target into range edges.
        let mut run: Option<(u8, u8, u32)> = None;
        for byte in 0..=255u8 {
            let next = dfa.next_state(sid, byte);
            let target = if dfa.is_dead_state(next) {
                None
            } else {
                Some(ids[&next])
            };
            run = match (run, target) {
                (Some((min, max, t)), Some(target)) if t == target => Some((min, byte.max(max), t)),
                (previous, target) => {
                    if let Some((min, max, t)) = previous {
                        fsm.add_edge(state as u32, min, max, t);
                    }
                    target.map(|t| (byte, byte, t))
                }
            };
        }
        if let Some((min, max, t)) = run {
            fsm.add_edge(state as u32, min, max, t);
        }
    }

    Ok(fsm.trim())
}

/// Emit one rule per automaton state into `builder` and return the start
/// state's rule. An accepting state contributes an empty-string
/// alternative; each edge contributes `char class · target rule`.
pub fn automaton_to_rules(
    builder: &mut GrammarBuilder,
    fsm: &ByteAutomaton,
    name_hint: &str,
) -> RuleId {
    debug_assert!(fsm.num_states() > 0, "cannot emit rules for the empty language");

    let state_rules: Vec<RuleId> = (0..fsm.num_states())
        .map(|_| builder.add_empty_rule(name_hint))
        .collect();

    for state in 0..fsm.num_states() as u32 {
        let mut choice_seqs = Vec::new();
        if fsm.is_accepting(state) {
            let empty = builder.add_empty_string();
            choice_seqs.push(builder.add_sequence(vec![empty]));
        }
        for edge in fsm.edges(state) {
            let class =
                builder.add_character_class(vec![(edge.min as u32, edge.max as u32)], false);
            let target_ref = builder.add_rule_ref(state_rules[edge.target as usize]);
            choice_seqs.push(builder.add_sequence(vec![class, target_ref]));
        }
        let body = if choice_seqs.is_empty() {
            let empty = builder.add_empty_string();
            let seq = builder.add_sequence(vec![empty]);
            builder.add_choices(vec![seq])
        } else {
            builder.add_choices(choice_seqs)
        };
        builder.update_rule_body(state_rules[state as usize], body);
    }

    state_rules[fsm.start() as usize]
}

/// Compile a regex pattern into a standalone grammar.
pub fn grammar_from_regex(pattern: &str) -> Result<Grammar> {
    let fsm = regex_to_automaton(pattern)?;
    if fsm.num_states() == 0 {
        return Err(StencilError::InvalidRegex(format!(
            "regex matches no strings: {pattern}"
        )));
    }
    let mut builder = GrammarBuilder::new();
    let start_rule = automaton_to_rules(&mut builder, &fsm, "regex_state");
    let start_ref = builder.add_rule_ref(start_rule);
    let seq = builder.add_sequence(vec![start_ref]);
    let choices = builder.add_choices(vec![seq]);
    let root = builder.add_rule("root", choices);
    Ok(builder.into_grammar(root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_literal() {
        let fsm = regex_to_automaton("abc").unwrap();
        assert!(fsm.accepts(b"abc"));
        assert!(!fsm.accepts(b"ab"));
        assert!(!fsm.accepts(b"abcd"));
        assert!(!fsm.accepts(b""));
    }

    #[test]
    fn test_alternation() {
        let fsm = regex_to_automaton("(yes|no)").unwrap();
        assert!(fsm.accepts(b"yes"));
        assert!(fsm.accepts(b"no"));
        assert!(!fsm.accepts(b"yo"));
    }

    #[test]
    fn test_digit_plus() {
        let fsm = regex_to_automaton("[0-9]+").unwrap();
        assert!(fsm.accepts(b"5"));
        assert!(fsm.accepts(b"53"));
        assert!(!fsm.accepts(b""));
        assert!(!fsm.accepts(b"5a"));
    }

    #[test]
    fn test_prefix_alternation_keeps_both_branches() {
        let fsm = regex_to_automaton("(a|ab)").unwrap();
        assert!(fsm.accepts(b"a"));
        assert!(fsm.accepts(b"ab"));
        assert!(!fsm.accepts(b"abb"));
    }

    #[test]
    fn test_anchoring_is_implicit() {
        // The automaton must accept full matches only.
        let fsm = regex_to_automaton("a").unwrap();
        assert!(fsm.accepts(b"a"));
        assert!(!fsm.accepts(b"ba"));
        assert!(!fsm.accepts(b"ab"));
    }

    #[test]
    fn test_empty_match_pattern() {
        let fsm = regex_to_automaton("a*").unwrap();
        assert!(fsm.accepts(b""));
        assert!(fsm.accepts(b"aaa"));
    }

    #[test]
    fn test_multibyte_utf8() {
        let fsm = regex_to_automaton("é+").unwrap();
        assert!(fsm.accepts("é".as_bytes()));
        assert!(fsm.accepts("éé".as_bytes()));
        assert!(!fsm.accepts(b"e"));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(matches!(
            regex_to_automaton("[invalid"),
            Err(StencilError::InvalidRegex(_))
        ));
    }

    #[test]
    fn test_grammar_from_regex_rule_shape() {
        let grammar = grammar_from_regex("ab").unwrap();
        // One rule per automaton state plus the root wrapper.
        assert_eq!(grammar.num_rules(), 4);
        assert_eq!(grammar.rule(grammar.root).name, "root");
    }

}
