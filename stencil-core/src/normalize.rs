//! Grammar canonicalization.
//!
//! Three passes, none of which change the language:
//! 1. collapse alias rules: a rule whose whole body is
//!    `Choices(Sequence(RuleRef(r)))` is an alias of `r`, and references to
//!    it are redirected (the root rule is kept even when it is an alias,
//!    since it is the entry point);
//! 2. drop rules unreachable from the root;
//! 3. compact the expression arena, preserving relative order so that
//!    expressions still only reference earlier slots.

use crate::grammar::{ExprId, Grammar, GrammarExpr, Rule, RuleId};

pub fn normalize(grammar: Grammar) -> Grammar {
    let alias = alias_targets(&grammar);
    let live_rules = reachable_rules(&grammar, &alias);
    let live_exprs = reachable_exprs(&grammar, &live_rules);

    // Dead slots keep a placeholder id; the reachability passes guarantee
    // the remap closures only ever read live slots.
    let mut rule_map: Vec<RuleId> = vec![RuleId(u32::MAX); grammar.rules.len()];
    let mut next_rule = 0u32;
    for (i, live) in live_rules.iter().enumerate() {
        if *live {
            rule_map[i] = RuleId(next_rule);
            next_rule += 1;
        }
    }

    let mut expr_map: Vec<ExprId> = vec![ExprId(u32::MAX); grammar.exprs.len()];
    let mut next_expr = 0u32;
    for (i, live) in live_exprs.iter().enumerate() {
        if *live {
            expr_map[i] = ExprId(next_expr);
            next_expr += 1;
        }
    }

    let remap_rule = |rule: RuleId| {
        let target = alias[rule.0 as usize];
        debug_assert!(
            live_rules[target.0 as usize],
            "rule references resolve to live rules"
        );
        rule_map[target.0 as usize]
    };
    let remap_expr = |expr: ExprId| {
        debug_assert!(
            live_exprs[expr.0 as usize],
            "children of live expressions are live"
        );
        expr_map[expr.0 as usize]
    };

    let exprs = grammar
        .exprs
        .iter()
        .enumerate()
        .filter(|(i, _)| live_exprs[*i])
        .map(|(_, expr)| match expr {
            GrammarExpr::ByteString(_)
            | GrammarExpr::EmptyStr
            | GrammarExpr::CharacterClass { .. }
            | GrammarExpr::CharacterClassStar { .. } => expr.clone(),
            GrammarExpr::RuleRef(rule) => GrammarExpr::RuleRef(remap_rule(*rule)),
            GrammarExpr::Sequence(elements) => {
                GrammarExpr::Sequence(elements.iter().map(|e| remap_expr(*e)).collect())
            }
            GrammarExpr::Choices(choices) => {
                GrammarExpr::Choices(choices.iter().map(|e| remap_expr(*e)).collect())
            }
            GrammarExpr::TagDispatch(dispatch) => {
                let mut dispatch = dispatch.clone();
                for (_, rule) in &mut dispatch.triggers {
                    *rule = remap_rule(*rule);
                }
                GrammarExpr::TagDispatch(dispatch)
            }
        })
        .collect();

    let rules = grammar
        .rules
        .iter()
        .enumerate()
        .filter(|(i, _)| live_rules[*i])
        .map(|(_, rule)| Rule {
            name: rule.name.clone(),
            body: rule.body.map(remap_expr),
        })
        .collect();

    // The root is never redirected through the alias map, and the
    // reachability pass seeds it as live.
    debug_assert!(live_rules[grammar.root.0 as usize]);
    let root = rule_map[grammar.root.0 as usize];
    Grammar { exprs, rules, root }
}

/// For every rule, the rule it finally resolves to: alias chains are
/// followed to their end, cycles and non-aliases resolve to the rule
/// itself.
fn alias_targets(grammar: &Grammar) -> Vec<RuleId> {
    let direct: Vec<Option<RuleId>> = (0..grammar.rules.len() as u32)
        .map(|rule| direct_alias(grammar, RuleId(rule)))
        .collect();

    (0..grammar.rules.len() as u32)
        .map(|start| {
            let mut current = RuleId(start);
            let mut visited = vec![start];
            while let Some(next) = direct[current.0 as usize] {
                if visited.contains(&next.0) {
                    // Alias cycle: leave the chain unresolved.
                    return RuleId(start);
                }
                visited.push(next.0);
                current = next;
            }
            current
        })
        .collect()
}

/// `Some(r)` when the rule's body is exactly `Choices(Sequence(RuleRef(r)))`.
fn direct_alias(grammar: &Grammar, rule: RuleId) -> Option<RuleId> {
    if rule == grammar.root {
        return None;
    }
    let body = grammar.rule(rule).body?;
    let GrammarExpr::Choices(choices) = grammar.expr(body) else {
        return None;
    };
    let [choice] = choices.as_slice() else {
        return None;
    };
    let GrammarExpr::Sequence(elements) = grammar.expr(*choice) else {
        return None;
    };
    let [element] = elements.as_slice() else {
        return None;
    };
    match grammar.expr(*element) {
        GrammarExpr::RuleRef(target) => Some(*target),
        _ => None,
    }
}

fn reachable_rules(grammar: &Grammar, alias: &[RuleId]) -> Vec<bool> {
    let mut live = vec![false; grammar.rules.len()];
    let mut stack = vec![grammar.root];
    live[grammar.root.0 as usize] = true;
    while let Some(rule) = stack.pop() {
        if let Some(body) = grammar.rule(rule).body {
            collect_rule_refs(grammar, body, alias, &mut live, &mut stack);
        }
    }
    live
}

fn collect_rule_refs(
    grammar: &Grammar,
    expr: ExprId,
    alias: &[RuleId],
    live: &mut [bool],
    stack: &mut Vec<RuleId>,
) {
    match grammar.expr(expr) {
        GrammarExpr::RuleRef(rule) => mark_rule(*rule, alias, live, stack),
        GrammarExpr::Sequence(elements) | GrammarExpr::Choices(elements) => {
            for element in elements {
                collect_rule_refs(grammar, *element, alias, live, stack);
            }
        }
        GrammarExpr::TagDispatch(dispatch) => {
            for (_, rule) in &dispatch.triggers {
                mark_rule(*rule, alias, live, stack);
            }
        }
        _ => {}
    }
}

fn mark_rule(rule: RuleId, alias: &[RuleId], live: &mut [bool], stack: &mut Vec<RuleId>) {
    let target = alias[rule.0 as usize];
    if !live[target.0 as usize] {
        live[target.0 as usize] = true;
        stack.push(target);
    }
}

fn reachable_exprs(grammar: &Grammar, live_rules: &[bool]) -> Vec<bool> {
    let mut live = vec![false; grammar.exprs.len()];
    for (i, rule) in grammar.rules.iter().enumerate() {
        if !live_rules[i] {
            continue;
        }
        if let Some(body) = rule.body {
            mark_expr(grammar, body, &mut live);
        }
    }
    live
}

fn mark_expr(grammar: &Grammar, expr: ExprId, live: &mut [bool]) {
    if live[expr.0 as usize] {
        return;
    }
    live[expr.0 as usize] = true;
    if let GrammarExpr::Sequence(elements) | GrammarExpr::Choices(elements) =
        grammar.expr(expr)
    {
        for element in elements {
            mark_expr(grammar, *element, live);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarBuilder;

    #[test]
    fn test_drops_unreachable_rules() {
        let mut builder = GrammarBuilder::new();
        let x = builder.add_byte_string("x");
        builder.add_rule("orphan", x);
        let y = builder.add_byte_string("y");
        let root = builder.add_rule("root", y);
        let grammar = normalize(builder.into_grammar(root));

        assert_eq!(grammar.num_rules(), 1);
        assert_eq!(grammar.rule(grammar.root).name, "root");
        assert_eq!(grammar.exprs.len(), 1);
    }

    #[test]
    fn test_keeps_tag_dispatch_targets() {
        let mut builder = GrammarBuilder::new();
        let body = builder.add_byte_string("t");
        let target = builder.add_rule("target", body);
        let dispatch = builder.add_tag_dispatch(crate::grammar::TagDispatch {
            triggers: vec![("<".to_string(), target)],
            stop_eos: true,
            ..Default::default()
        });
        let root = builder.add_rule("root", dispatch);
        let grammar = normalize(builder.into_grammar(root));

        assert_eq!(grammar.num_rules(), 2);
        let root_body = grammar.rule(grammar.root).body.unwrap();
        match grammar.expr(root_body) {
            GrammarExpr::TagDispatch(dispatch) => {
                let (_, rule) = &dispatch.triggers[0];
                assert_eq!(grammar.rule(*rule).name, "target");
            }
            other => panic!("expected tag dispatch, got {other:?}"),
        }
    }

    #[test]
    fn test_collapses_alias_rules() {
        // inner ::= "x"
        // wrapper ::= (( inner ))        <- alias, dropped
        // root ::= (( wrapper ))         <- entry, kept
        let mut builder = GrammarBuilder::new();
        let x = builder.add_byte_string("x");
        let inner = builder.add_rule("inner", x);

        let inner_ref = builder.add_rule_ref(inner);
        let seq = builder.add_sequence(vec![inner_ref]);
        let choices = builder.add_choices(vec![seq]);
        let wrapper = builder.add_rule("wrapper", choices);

        let wrapper_ref = builder.add_rule_ref(wrapper);
        let seq = builder.add_sequence(vec![wrapper_ref]);
        let choices = builder.add_choices(vec![seq]);
        let root = builder.add_rule("root", choices);

        let grammar = normalize(builder.into_grammar(root));
        assert_eq!(grammar.num_rules(), 2);
        assert!(grammar.rules.iter().all(|r| r.name != "wrapper"));

        // The root's reference now lands on inner directly.
        let body = grammar.rule(grammar.root).body.unwrap();
        let GrammarExpr::Choices(choices) = grammar.expr(body) else {
            panic!("root body must be choices");
        };
        let GrammarExpr::Sequence(elements) = grammar.expr(choices[0]) else {
            panic!("choice must be a sequence");
        };
        match grammar.expr(elements[0]) {
            GrammarExpr::RuleRef(rule) => assert_eq!(grammar.rule(*rule).name, "inner"),
            other => panic!("expected rule ref, got {other:?}"),
        }
    }

    #[test]
    fn test_alias_cycle_is_left_alone() {
        // a ::= (( b )) ; b ::= (( a )) ; root ::= (( a ))
        let mut builder = GrammarBuilder::new();
        let a = builder.add_empty_rule("a");
        let b = builder.add_empty_rule("b");
        let b_ref = builder.add_rule_ref(b);
        let seq = builder.add_sequence(vec![b_ref]);
        let choices = builder.add_choices(vec![seq]);
        builder.update_rule_body(a, choices);
        let a_ref = builder.add_rule_ref(a);
        let seq = builder.add_sequence(vec![a_ref]);
        let choices = builder.add_choices(vec![seq]);
        builder.update_rule_body(b, choices);
        let a_ref = builder.add_rule_ref(a);
        let seq = builder.add_sequence(vec![a_ref]);
        let choices = builder.add_choices(vec![seq]);
        let root = builder.add_rule("root", choices);

        let grammar = normalize(builder.into_grammar(root));
        assert_eq!(grammar.num_rules(), 3);
    }

    #[test]
    fn test_preserves_child_before_parent_order() {
        let mut builder = GrammarBuilder::new();
        let unused = builder.add_byte_string("unused");
        builder.add_rule("orphan", unused);
        let a = builder.add_byte_string("a");
        let b = builder.add_byte_string("b");
        let seq = builder.add_sequence(vec![a, b]);
        let root = builder.add_rule("root", seq);
        let grammar = normalize(builder.into_grammar(root));

        let body = grammar.rule(grammar.root).body.unwrap();
        match grammar.expr(body) {
            GrammarExpr::Sequence(elements) => {
                for element in elements {
                    assert!(element.0 < body.0);
                }
            }
            other => panic!("expected sequence, got {other:?}"),
        }
    }
}
