//! Compiled match-table accelerators (§4.6.5), grounded on the original tree's
//! `flow::vm::Match`/`MatchSame`/`MatchHead`/`MatchTail`/`MatchRegex` hierarchy. There the four
//! kinds share a `Match` base class and a `MatchDef` of labeled cases plus an else-PC; here they
//! share the `MatchTable` trait instead, since the case set is closed (§9's "small closed set
//! behind a common operations interface").

use regex::Regex;
use std::collections::HashMap;

/// Evaluates a subject string against a compiled table and returns the jump target.
pub trait MatchTable: std::fmt::Debug {
    /// Returns the PC to jump to: the matched case's target, or the table's else-PC if nothing
    /// matched.
    fn evaluate(&self, subject: &str) -> u64;
}

/// One (label, target) case as it appears in source order before compilation.
#[derive(Debug, Clone)]
pub struct MatchCase {
    pub label: String,
    pub pc: u64,
}

/// `Same`: exact hash lookup.
#[derive(Debug)]
pub struct MatchSame {
    map: HashMap<String, u64>,
    else_pc: u64,
}

impl MatchSame {
    pub fn new(cases: &[MatchCase], else_pc: u64) -> Self {
        let map = cases.iter().map(|c| (c.label.clone(), c.pc)).collect();
        Self { map, else_pc }
    }
}

impl MatchTable for MatchSame {
    fn evaluate(&self, subject: &str) -> u64 {
        self.map.get(subject).copied().unwrap_or(self.else_pc)
    }
}

/// `Head`: prefix match, longest label wins. A naive `HashMap`-backed trie would work too, but a
/// sorted-by-length linear scan is simple, correct, and the table sizes Flow programs realistically
/// have (route counts, not dictionary sizes) make the asymptotics irrelevant.
#[derive(Debug)]
pub struct MatchHead {
    // sorted longest-first so the first match found is the longest.
    cases: Vec<MatchCase>,
    else_pc: u64,
}

impl MatchHead {
    pub fn new(cases: &[MatchCase], else_pc: u64) -> Self {
        let mut cases = cases.to_vec();
        cases.sort_by(|a, b| b.label.len().cmp(&a.label.len()));
        Self { cases, else_pc }
    }
}

impl MatchTable for MatchHead {
    fn evaluate(&self, subject: &str) -> u64 {
        self.cases.iter().find(|c| subject.starts_with(c.label.as_str())).map_or(self.else_pc, |c| c.pc)
    }
}

/// `Tail`: suffix match, longest label wins (symmetric to `Head`).
#[derive(Debug)]
pub struct MatchTail {
    cases: Vec<MatchCase>,
    else_pc: u64,
}

impl MatchTail {
    pub fn new(cases: &[MatchCase], else_pc: u64) -> Self {
        let mut cases = cases.to_vec();
        cases.sort_by(|a, b| b.label.len().cmp(&a.label.len()));
        Self { cases, else_pc }
    }
}

impl MatchTable for MatchTail {
    fn evaluate(&self, subject: &str) -> u64 {
        self.cases.iter().find(|c| subject.ends_with(c.label.as_str())).map_or(self.else_pc, |c| c.pc)
    }
}

/// `RegEx`: ordered list, first match wins (source order, per §4.6.5 tie-breaking rule).
#[derive(Debug)]
pub struct MatchRegex {
    cases: Vec<(Regex, u64)>,
    else_pc: u64,
}

impl MatchRegex {
    /// Compiles each case's label as a regex. Compile failures are a link-time error (§7 "VM
    /// errors"), surfaced by the caller via `Self::compile`.
    pub fn compile(cases: &[MatchCase], else_pc: u64) -> Result<Self, regex::Error> {
        let compiled = cases.iter().map(|c| Ok((Regex::new(&c.label)?, c.pc))).collect::<Result<_, regex::Error>>()?;
        Ok(Self { cases: compiled, else_pc })
    }
}

impl MatchTable for MatchRegex {
    fn evaluate(&self, subject: &str) -> u64 {
        self.cases.iter().find(|(re, _)| re.is_match(subject)).map_or(self.else_pc, |(_, pc)| *pc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cases(pairs: &[(&str, u64)]) -> Vec<MatchCase> {
        pairs.iter().map(|(label, pc)| MatchCase { label: (*label).to_string(), pc: *pc }).collect()
    }

    #[test]
    fn same_matches_exact_label_only() {
        let table = MatchSame::new(&cases(&[("GET", 1), ("POST", 2)]), 0);
        assert_eq!(table.evaluate("GET"), 1);
        assert_eq!(table.evaluate("POST"), 2);
        assert_eq!(table.evaluate("PUT"), 0);
    }

    #[test]
    fn head_picks_longest_prefix() {
        let table = MatchHead::new(&cases(&[("/api/", 1), ("/", 2)]), 9);
        assert_eq!(table.evaluate("/api/v1/x"), 1);
        assert_eq!(table.evaluate("/index"), 2);
        assert_eq!(table.evaluate(""), 9);
        assert_eq!(table.evaluate("/apx"), 2);
    }

    #[test]
    fn tail_picks_longest_suffix() {
        let table = MatchTail::new(&cases(&[(".tar.gz", 1), (".gz", 2)]), 9);
        assert_eq!(table.evaluate("a.tar.gz"), 1);
        assert_eq!(table.evaluate("a.gz"), 2);
        assert_eq!(table.evaluate("a.zip"), 9);
    }

    #[test]
    fn regex_picks_first_source_order_match() {
        let table = MatchRegex::compile(&cases(&[("^/v[0-9]+/", 1), ("^/v1/", 2)]), 9).unwrap();
        // both patterns match "/v1/x", source order means the first (index 0) wins.
        assert_eq!(table.evaluate("/v1/x"), 1);
        assert_eq!(table.evaluate("/other"), 9);
    }

    #[test]
    fn regex_compile_failure_is_reported() {
        assert!(MatchRegex::compile(&cases(&[("(unterminated", 1)]), 0).is_err());
    }

    // §8 "Match-table correctness": property-based checks of the quantified invariants,
    // rather than the example-based checks above, for the three string-table kinds
    // (`RegEx`'s invariant is just "first source-order match", already covered above).
    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn label_strategy() -> impl Strategy<Value = String> {
            "[a-z]{1,6}"
        }

        proptest! {
            /// `Same.lookup(x) = some(P)` iff `x` is a declared label with case `P`.
            #[test]
            fn same_lookup_iff_declared(labels in prop::collection::vec(label_strategy(), 0..8), subject in label_strategy()) {
                let pairs: Vec<(&str, u64)> = labels.iter().enumerate().map(|(i, l)| (l.as_str(), i as u64)).collect();
                let table = MatchSame::new(&cases(&pairs), u64::MAX);
                // a duplicate label overwrites its earlier case in the compiled map, so the
                // *last* occurrence in source order determines the target, not the first.
                let expected = labels.iter().rposition(|l| l == &subject).map_or(u64::MAX, |i| i as u64);
                prop_assert_eq!(table.evaluate(&subject), expected);
            }

            /// `Head.lookup(x)` returns the case with the longest label that is a prefix of `x`.
            #[test]
            fn head_returns_longest_matching_prefix(labels in prop::collection::vec(label_strategy(), 0..8), subject in label_strategy()) {
                let pairs: Vec<(&str, u64)> = labels.iter().enumerate().map(|(i, l)| (l.as_str(), i as u64)).collect();
                let table = MatchHead::new(&cases(&pairs), u64::MAX);
                let matches: Vec<(usize, &String)> = labels.iter().enumerate().filter(|(_, l)| subject.starts_with(l.as_str())).collect();
                let max_len = matches.iter().map(|(_, l)| l.len()).max();
                let expected = max_len
                    .and_then(|max_len| matches.iter().find(|(_, l)| l.len() == max_len))
                    .map_or(u64::MAX, |(i, _)| *i as u64);
                prop_assert_eq!(table.evaluate(&subject), expected);
            }

            /// `Tail.lookup(x)` returns the case with the longest label that is a suffix of `x`.
            #[test]
            fn tail_returns_longest_matching_suffix(labels in prop::collection::vec(label_strategy(), 0..8), subject in label_strategy()) {
                let pairs: Vec<(&str, u64)> = labels.iter().enumerate().map(|(i, l)| (l.as_str(), i as u64)).collect();
                let table = MatchTail::new(&cases(&pairs), u64::MAX);
                let matches: Vec<(usize, &String)> = labels.iter().enumerate().filter(|(_, l)| subject.ends_with(l.as_str())).collect();
                let max_len = matches.iter().map(|(_, l)| l.len()).max();
                let expected = max_len
                    .and_then(|max_len| matches.iter().find(|(_, l)| l.len() == max_len))
                    .map_or(u64::MAX, |(i, _)| *i as u64);
                prop_assert_eq!(table.evaluate(&subject), expected);
            }
        }
    }
}
