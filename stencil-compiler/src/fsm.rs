//! Byte-level finite automata used by the regex-with-excludes path.
//!
//! States are dense `u32` ids with sorted byte-range edges. Everything here
//! is deterministic by construction: the exclusion automaton only branches
//! on distinct bytes, the regex automaton comes from a DFA, and the product
//! of two DFAs is a DFA.

use std::collections::HashMap;
use std::collections::HashSet;

use stencil_core::{Result, StencilError};

/// Inclusive byte-range transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsmEdge {
    pub min: u8,
    pub max: u8,
    pub target: u32,
}

/// A deterministic byte automaton with a start state and accepting set.
#[derive(Debug, Clone)]
pub struct ByteAutomaton {
    edges: Vec<Vec<FsmEdge>>,
    accepting: Vec<bool>,
    start: u32,
}

/// Product constructions beyond this many states are refused.
const MAX_PRODUCT_STATES: usize = 65536;

impl ByteAutomaton {
    /// A single non-accepting start state and no edges.
    pub fn new() -> Self {
        Self {
            edges: vec![Vec::new()],
            accepting: vec![false],
            start: 0,
        }
    }

    pub fn num_states(&self) -> usize {
        self.edges.len()
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn is_accepting(&self, state: u32) -> bool {
        self.accepting[state as usize]
    }

    pub fn edges(&self, state: u32) -> &[FsmEdge] {
        &self.edges[state as usize]
    }

    pub fn add_state(&mut self) -> u32 {
        let id = self.edges.len() as u32;
        self.edges.push(Vec::new());
        self.accepting.push(false);
        id
    }

    pub fn set_accepting(&mut self, state: u32, accepting: bool) {
        self.accepting[state as usize] = accepting;
    }

    pub fn add_edge(&mut self, from: u32, min: u8, max: u8, target: u32) {
        self.edges[from as usize].push(FsmEdge { min, max, target });
    }

    pub fn next_state(&self, state: u32, byte: u8) -> Option<u32> {
        self.edges[state as usize]
            .iter()
            .find(|edge| edge.min <= byte && byte <= edge.max)
            .map(|edge| edge.target)
    }

    /// Run the automaton over `input`. Debug and test helper.
    pub fn accepts(&self, input: &[u8]) -> bool {
        if self.num_states() == 0 {
            return false;
        }
        let mut state = self.start;
        for &byte in input {
            match self.next_state(state, byte) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.is_accepting(state)
    }

    /// The automaton accepting exactly the byte strings that contain none
    /// of `substrings` as a substring.
    ///
    /// Construction: a trie of the excluded strings whose terminal states
    /// are dead, completed with a fallback to the start state. Non-start
    /// states first copy the start state's uncovered outgoing edges (so a
    /// mismatch can still begin a new excluded string), then every still
    /// uncovered byte loops back to the start. Edges into dead states are
    /// dropped and every surviving state accepts.
    ///
    /// The fallback goes to the start rather than to the longest proper
    /// suffix, so an occurrence that overlaps a partial match of another
    /// (or the same) excluded string can slip through; callers accept that
    /// trade.
    pub fn excluding(substrings: &[String]) -> Self {
        let mut fsm = Self::new();
        let mut dead: HashSet<u32> = HashSet::new();

        for substring in substrings {
            debug_assert!(!substring.is_empty(), "excluded substrings are non-empty");
            let mut state = 0u32;
            for &byte in substring.as_bytes() {
                state = match fsm.next_state(state, byte) {
                    Some(next) => next,
                    None => {
                        let next = fsm.add_state();
                        fsm.add_edge(state, byte, byte, next);
                        next
                    }
                };
            }
            dead.insert(state);
        }

        let start_edges = fsm.edges[0].clone();
        for state in 0..fsm.num_states() as u32 {
            if dead.contains(&state) {
                continue;
            }
            let mut covered = [false; 256];
            for edge in &fsm.edges[state as usize] {
                for byte in edge.min..=edge.max {
                    covered[byte as usize] = true;
                }
            }
            if state != 0 {
                for edge in &start_edges {
                    if !covered[edge.min as usize] {
                        fsm.edges[state as usize].push(*edge);
                        covered[edge.min as usize] = true;
                    }
                }
            }
            for byte in 0u8..=255 {
                if !covered[byte as usize] {
                    fsm.edges[state as usize].push(FsmEdge {
                        min: byte,
                        max: byte,
                        target: 0,
                    });
                }
            }
        }

        for state_edges in &mut fsm.edges {
            state_edges.retain(|edge| !dead.contains(&edge.target));
        }
        for state in 0..fsm.num_states() as u32 {
            if !dead.contains(&state) {
                fsm.set_accepting(state, true);
            }
        }

        fsm.trim()
    }

    /// Product automaton accepting the intersection of both languages.
    /// The result is trimmed; zero states means the empty language.
    pub fn intersect(a: &ByteAutomaton, b: &ByteAutomaton) -> Result<ByteAutomaton> {
        if a.num_states() == 0 || b.num_states() == 0 {
            return Ok(ByteAutomaton::empty());
        }

        let mut product = ByteAutomaton::new();
        let mut pair_ids: HashMap<(u32, u32), u32> = HashMap::new();
        let start_pair = (a.start, b.start);
        pair_ids.insert(start_pair, 0);
        product.set_accepting(0, a.is_accepting(a.start) && b.is_accepting(b.start));

        let mut queue = vec![start_pair];
        while let Some((sa, sb)) = queue.pop() {
            let from = pair_ids[&(sa, sb)];
            for edge_a in a.edges(sa) {
                for edge_b in b.edges(sb) {
                    let min = edge_a.min.max(edge_b.min);
                    let max = edge_a.max.min(edge_b.max);
                    if min > max {
                        continue;
                    }
                    let pair = (edge_a.target, edge_b.target);
                    let target = match pair_ids.get(&pair) {
                        Some(&target) => target,
                        None => {
                            if pair_ids.len() >= MAX_PRODUCT_STATES {
                                return Err(StencilError::InvalidRegex(format!(
                                    "automaton intersection exceeded {MAX_PRODUCT_STATES} states"
                                )));
                            }
                            let target = product.add_state();
                            product.set_accepting(
                                target,
                                a.is_accepting(pair.0) && b.is_accepting(pair.1),
                            );
                            pair_ids.insert(pair, target);
                            queue.push(pair);
                            target
                        }
                    };
                    product.add_edge(from, min, max, target);
                }
            }
        }

        Ok(product.trim())
    }

    fn empty() -> Self {
        Self {
            edges: Vec::new(),
            accepting: Vec::new(),
            start: 0,
        }
    }

    /// Keep only states that are reachable from the start and can reach an
    /// accepting state; renumber in old-id order and canonicalize edges.
    /// Returns the empty automaton when the language is empty.
    pub fn trim(self) -> Self {
        let n = self.num_states();
        if n == 0 {
            return self;
        }

        let mut forward = vec![false; n];
        let mut stack = vec![self.start];
        forward[self.start as usize] = true;
        while let Some(state) = stack.pop() {
            for edge in &self.edges[state as usize] {
                if !forward[edge.target as usize] {
                    forward[edge.target as usize] = true;
                    stack.push(edge.target);
                }
            }
        }

        let mut reverse: Vec<Vec<u32>> = vec![Vec::new(); n];
        for (state, state_edges) in self.edges.iter().enumerate() {
            for edge in state_edges {
                reverse[edge.target as usize].push(state as u32);
            }
        }
        let mut backward = vec![false; n];
        let mut stack: Vec<u32> = (0..n as u32)
            .filter(|&s| self.accepting[s as usize] && forward[s as usize])
            .collect();
        for &state in &stack {
            backward[state as usize] = true;
        }
        while let Some(state) = stack.pop() {
            for &source in &reverse[state as usize] {
                if !backward[source as usize] {
                    backward[source as usize] = true;
                    stack.push(source);
                }
            }
        }

        let keep: Vec<bool> = (0..n).map(|s| forward[s] && backward[s]).collect();
        if !keep[self.start as usize] {
            return Self::empty();
        }

        let mut remap = vec![u32::MAX; n];
        let mut next = 0u32;
        for (state, kept) in keep.iter().enumerate() {
            if *kept {
                remap[state] = next;
                next += 1;
            }
        }

        let mut trimmed = Self::empty();
        for state in 0..n {
            if !keep[state] {
                continue;
            }
            let mut state_edges: Vec<FsmEdge> = self.edges[state]
                .iter()
                .filter(|edge| keep[edge.target as usize])
                .map(|edge| FsmEdge {
                    min: edge.min,
                    max: edge.max,
                    target: remap[edge.target as usize],
                })
                .collect();
            state_edges.sort_by_key(|edge| (edge.min, edge.max, edge.target));
            state_edges.dedup();
            // Merge contiguous ranges into one edge per target run.
            let mut merged: Vec<FsmEdge> = Vec::with_capacity(state_edges.len());
            for edge in state_edges {
                match merged.last_mut() {
                    Some(last)
                        if last.target == edge.target
                            && last.max != u8::MAX
                            && last.max + 1 == edge.min =>
                    {
                        last.max = edge.max;
                    }
                    _ => merged.push(edge),
                }
            }
            trimmed.edges.push(merged);
            trimmed.accepting.push(self.accepting[state]);
        }
        trimmed.start = remap[self.start as usize];
        trimmed
    }
}

impl Default for ByteAutomaton {
    fn default() -> Self {
        Self::new()
    }
}
