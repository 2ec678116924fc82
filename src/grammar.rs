//! Grammar configuration: the term alphabet, substitution templates and the
//! predicates derived from a term set.
//!
//! Templates are plain text in which the standalone marker `T` is a term slot
//! and `C` a predicate slot, e.g. `T + T`, `T <= T`, `C and C`, `not C`.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use log::debug;

use crate::error::GrammarError;
use crate::expr::Type;
use crate::parse::{self, BUILTINS, KEYWORDS};
use crate::synth::term_enum::{Odometer, TermEnum};

pub const TERM_SLOT: &str = "T";
pub const PRED_SLOT: &str = "C";

/// Name the relation expressions use for the candidate's output.
pub const OUTPUT_IDENT: &str = "out";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Term,
    Pred,
}

peg::parser! {
    /// Splits a rule into text and standalone slot markers. Any input parses.
    grammar template() for str {
        rule word_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']

        rule piece() -> Piece
        = "T" !word_char() { Piece::Term }
        / "C" !word_char() { Piece::Pred }
        / w:$(word_char()+ / [_]) { Piece::Text(w.to_string()) }

        pub rule pieces() -> Vec<Piece> = piece()*
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    rule: String,
    pieces: Vec<Piece>,
}

impl Template {
    pub fn parse(rule: &str) -> Self {
        let mut pieces: Vec<Piece> = Vec::new();

        for piece in template::pieces(rule).unwrap_or_default() {
            if let (Piece::Text(word), Some(Piece::Text(text))) = (&piece, pieces.last_mut()) {
                text.push_str(word);
                continue;
            }
            pieces.push(piece);
        }

        Self {
            rule: rule.to_string(),
            pieces,
        }
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn term_slots(&self) -> usize {
        self.pieces.iter().filter(|p| **p == Piece::Term).count()
    }

    pub fn pred_slots(&self) -> usize {
        self.pieces.iter().filter(|p| **p == Piece::Pred).count()
    }

    fn has_text(&self) -> bool {
        self.pieces
            .iter()
            .any(|p| matches!(p, Piece::Text(t) if !t.trim().is_empty()))
    }

    /// The connective between the two predicate slots of a binary condition.
    pub fn connective(&self) -> Option<Connective> {
        let first = self.pieces.iter().position(|p| *p == Piece::Pred)?;
        let last = self.pieces.iter().rposition(|p| *p == Piece::Pred)?;

        self.pieces[first..last]
            .iter()
            .filter_map(|p| match p {
                Piece::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .flat_map(|t| t.split(|c: char| !c.is_ascii_alphanumeric()))
            .find_map(|word| match word {
                "and" => Some(Connective::And),
                "or" => Some(Connective::Or),
                _ => None,
            })
    }

    /// Replaces the predicate slots, leaving term slots in place.
    pub fn fill_preds(&self, preds: &[&str]) -> Template {
        let mut preds = preds.iter();
        let pieces = self
            .pieces
            .iter()
            .map(|p| match p {
                Piece::Pred => Piece::Text(preds.next().copied().unwrap_or(PRED_SLOT).to_string()),
                other => other.clone(),
            })
            .collect();

        Template {
            rule: self.rule.clone(),
            pieces,
        }
    }

    /// Renders the template with its term slots replaced by `terms`.
    pub fn fill_terms(&self, terms: &[&str]) -> String {
        let mut terms = terms.iter();
        let mut out = String::new();

        for p in &self.pieces {
            match p {
                Piece::Text(t) => out.push_str(t),
                Piece::Term => out.push_str(terms.next().copied().unwrap_or(TERM_SLOT)),
                Piece::Pred => out.push_str(PRED_SLOT),
            }
        }

        out
    }

    fn sample(&self) -> String {
        let preds = vec!["True"; self.pred_slots()];
        let terms = vec!["0"; self.term_slots()];
        self.fill_preds(&preds).fill_terms(&terms)
    }
}

/// Immutable, validated grammar.
#[derive(Debug, Clone)]
pub struct Grammar {
    identifiers: Vec<String>,
    base_terms: Vec<String>,
    term_templates: Vec<Template>,
    base_conditions: Vec<Template>,
    rec_conditions: Vec<Template>,
}

impl Grammar {
    pub fn new<I, J>(terms: I, conditions: J) -> Result<Self, GrammarError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
    {
        let mut base_terms = Vec::<String>::new();
        let mut term_templates = Vec::new();

        for rule in terms {
            let rule: String = rule.into();
            let rule = rule.trim().to_string();
            let template = Template::parse(&rule);

            if template.pred_slots() > 0 {
                return Err(GrammarError::malformed(rule, "term rules cannot use the predicate slot"));
            }
            if template.term_slots() > 0 {
                if !template.has_text() {
                    return Err(GrammarError::malformed(rule, "template has nothing but slots"));
                }
                term_templates.push(template);
                continue;
            }

            if is_literal(&rule) {
                if rule.parse::<i64>().is_err() {
                    return Err(GrammarError::malformed(rule, "literal out of range"));
                }
            } else if is_identifier(&rule) {
                if is_reserved(&rule) {
                    return Err(GrammarError::malformed(rule, "identifier is reserved"));
                }
            } else {
                return Err(GrammarError::malformed(
                    rule,
                    "expected an integer literal, an identifier or a template",
                ));
            }

            if !base_terms.contains(&rule) {
                base_terms.push(rule);
            }
        }

        if base_terms.is_empty() {
            return Err(GrammarError::NoBaseTerm);
        }

        let mut identifiers = base_terms
            .iter()
            .filter(|t| is_identifier(t))
            .cloned()
            .collect::<Vec<_>>();
        identifiers.sort();

        let mut base_conditions = Vec::new();
        let mut rec_conditions = Vec::new();
        for rule in conditions {
            let rule: String = rule.into();
            let rule = rule.trim().to_string();
            let template = Template::parse(&rule);

            if template.pred_slots() > 0 {
                rec_conditions.push(template);
            } else if template.term_slots() > 0 {
                base_conditions.push(template);
            } else {
                return Err(GrammarError::malformed(rule, "condition has no slots"));
            }
        }

        let typed = term_templates
            .iter()
            .map(|t| (t, Type::Int))
            .chain(base_conditions.iter().chain(&rec_conditions).map(|c| (c, Type::Bool)));
        for (template, expected) in typed {
            let ty = parse::parse(&template.sample(), &identifiers)
                .and_then(|e| e.type_of())
                .map_err(|e| GrammarError::malformed(template.rule(), e.to_string()))?;

            if ty != expected {
                let reason = match expected {
                    Type::Int => "term template must be integer-valued",
                    Type::Bool => "condition must be boolean-valued",
                };
                return Err(GrammarError::malformed(template.rule(), reason));
            }
        }

        debug!(
            "Grammar: identifiers {identifiers:?}, base terms {base_terms:?}, {} term templates, {} conditions",
            term_templates.len(),
            base_conditions.len() + rec_conditions.len(),
        );

        Ok(Self {
            identifiers,
            base_terms,
            term_templates,
            base_conditions,
            rec_conditions,
        })
    }

    /// Sorted identifiers; their order is the coordinate order of a point.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn base_terms(&self) -> &[String] {
        &self.base_terms
    }

    pub fn term_templates(&self) -> &[Template] {
        &self.term_templates
    }

    /// Comma-separated parameter list, e.g. `x, y`.
    pub fn signature(&self) -> String {
        self.identifiers.join(", ")
    }

    /// Starts a fresh term stream from the first non-recursive term.
    pub fn enumerate_terms(&self) -> TermEnum {
        TermEnum::new(self)
    }

    /// All predicates buildable from `terms`, deduplicated and ordered so
    /// that the simplest one sits at the end of the list.
    pub fn enumerate_predicates<S: AsRef<str>>(&self, terms: &[S]) -> Vec<String> {
        let terms = terms.iter().map(|t| t.as_ref()).collect::<Vec<_>>();
        let mut preds = BTreeSet::new();

        for cond in &self.base_conditions {
            resolve_terms(cond, &terms, &mut preds);
        }

        for cond in &self.rec_conditions {
            let snapshot = preds.iter().cloned().collect::<Vec<String>>();
            let connective = cond.connective();

            for digits in Odometer::new(snapshot.len(), cond.pred_slots()) {
                let operands = digits
                    .iter()
                    .map(|idx| snapshot[*idx].as_str())
                    .collect::<Vec<_>>();

                if let [a, b] = operands[..] {
                    if prune(connective, a, b) {
                        continue;
                    }
                }

                resolve_terms(&cond.fill_preds(&operands), &terms, &mut preds);
            }
        }

        let mut preds = preds.into_iter().collect::<Vec<_>>();
        preds.sort_by_cached_key(|p| Reverse(complexity_key(p)));

        preds
    }
}

fn resolve_terms(template: &Template, terms: &[&str], out: &mut BTreeSet<String>) {
    for digits in Odometer::new(terms.len(), template.term_slots()) {
        let combination = digits.iter().map(|idx| terms[*idx]).collect::<Vec<_>>();

        // `x <= x` and friends never separate anything.
        if combination.windows(2).any(|w| w[0] == w[1]) {
            continue;
        }

        out.insert(template.fill_terms(&combination));
    }
}

/// Whether combining `a` and `b` under a binary condition is redundant.
pub fn prune(connective: Option<Connective>, a: &str, b: &str) -> bool {
    let same = a == b;
    let opposite = is_negation_of(a, b) || is_negation_of(b, a);

    match connective {
        Some(Connective::And) if same || opposite => return true,
        Some(Connective::Or) if opposite => return true,
        _ => (),
    }

    is_flipped_comparison(a, b)
}

fn is_negation_of(neg: &str, pred: &str) -> bool {
    neg.strip_prefix("not")
        .filter(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '('))
        .map(|rest| {
            let rest = rest.trim();
            rest == pred || rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) == Some(pred)
        })
        .unwrap_or(false)
}

const COMPARISONS: &[&str] = &["<=", ">=", "==", "!=", "<", ">"];

/// Splits a lone comparison `l op r` into its parts.
pub fn split_comparison(pred: &str) -> Option<(&str, &str, &str)> {
    let has_connective = pred
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|w| matches!(w, "and" | "or" | "not"));
    if has_connective {
        return None;
    }

    let mut found = None;
    let mut idx = 0;
    while idx < pred.len() {
        match COMPARISONS.iter().find(|op| pred[idx..].starts_with(**op)) {
            Some(op) => {
                if found.is_some() {
                    return None;
                }
                found = Some((idx, *op));
                idx += op.len();
            }
            None => idx += pred[idx..].chars().next().map_or(1, char::len_utf8),
        }
    }

    let (at, op) = found?;
    Some((pred[..at].trim(), op, pred[at + op.len()..].trim()))
}

fn is_flipped_comparison(a: &str, b: &str) -> bool {
    if a == b {
        return false;
    }

    match (split_comparison(a), split_comparison(b)) {
        (Some((l1, op1, r1)), Some((l2, op2, r2))) => op1 == op2 && l1 == r2 && r1 == l2,
        _ => false,
    }
}

/// Length first, then the pattern of letters, then the pattern of digits.
pub fn complexity_key(pred: &str) -> (usize, String, String, String) {
    let letters = pred
        .chars()
        .map(|c| if c.is_alphabetic() { c } else { 'z' })
        .collect();
    let digits = pred
        .chars()
        .map(|c| if c.is_ascii_digit() { c } else { '9' })
        .collect();

    (pred.chars().count(), letters, digits, pred.to_string())
}

fn is_literal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_reserved(s: &str) -> bool {
    KEYWORDS.contains(&s) || BUILTINS.contains(&s) || s == OUTPUT_IDENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn max_grammar() -> Grammar {
        Grammar::new(["0", "1", "x", "y", "T + T"], ["T <= T", "C and C", "not C"]).unwrap()
    }

    #[test]
    fn template_slots() {
        let t = Template::parse("T + T");
        assert_eq!(t.term_slots(), 2);
        assert_eq!(t.fill_terms(&["x", "y + 1"]), "x + y + 1");

        // Markers are whole words only.
        let t = Template::parse("Tx + T");
        assert_eq!(t.term_slots(), 1);
        assert_eq!(t.fill_terms(&["y"]), "Tx + y");

        let c = Template::parse("C and C");
        assert_eq!(c.pred_slots(), 2);
        assert_eq!(c.connective(), Some(Connective::And));
        assert_eq!(Template::parse("C or (C)").connective(), Some(Connective::Or));
        assert_eq!(Template::parse("not C").connective(), None);

        let mixed = Template::parse("C and T < T").fill_preds(&["x <= y"]);
        assert_eq!(mixed.term_slots(), 2);
        assert_eq!(mixed.fill_terms(&["0", "x"]), "x <= y and 0 < x");
    }

    #[test]
    fn identifiers_are_sorted() {
        let g = Grammar::new(["y", "0", "x", "y"], ["T < T"]).unwrap();
        assert_eq!(g.identifiers(), &["x", "y"]);
        assert_eq!(g.base_terms(), &["y", "0", "x"]);
        assert_eq!(g.signature(), "x, y");
    }

    #[test]
    fn malformed_grammars_fail_fast() {
        assert_eq!(Grammar::new(["T + T"], ["T < T"]).unwrap_err(), GrammarError::NoBaseTerm);
        assert!(matches!(
            Grammar::new(["x", "T"], ["T < T"]),
            Err(GrammarError::Malformed { .. })
        ));
        assert!(matches!(
            Grammar::new(["x", "x+"], ["T < T"]),
            Err(GrammarError::Malformed { .. })
        ));
        assert!(matches!(
            Grammar::new(["x", "T +"], ["T < T"]),
            Err(GrammarError::Malformed { .. })
        ));
        assert!(matches!(
            Grammar::new(["x"], ["x < 1"]),
            Err(GrammarError::Malformed { .. })
        ));
        assert!(matches!(
            Grammar::new(["out"], ["T < T"]),
            Err(GrammarError::Malformed { .. })
        ));
        assert!(matches!(
            Grammar::new(["x", "T + z"], ["T < T"]),
            Err(GrammarError::Malformed { .. })
        ));
        assert!(matches!(
            Grammar::new(["x", "C + T"], ["T < T"]),
            Err(GrammarError::Malformed { .. })
        ));
    }

    #[test]
    fn templates_are_typed() {
        // Terms are integers and conditions are booleans.
        assert!(matches!(
            Grammar::new(["x", "y", "T <= T"], ["T <= T"]),
            Err(GrammarError::Malformed { rule, .. }) if rule == "T <= T"
        ));
        assert!(matches!(
            Grammar::new(["x", "y"], ["T + T"]),
            Err(GrammarError::Malformed { rule, .. }) if rule == "T + T"
        ));
        assert!(matches!(
            Grammar::new(["x", "y"], ["T <= T", "C + 1"]),
            Err(GrammarError::Malformed { .. })
        ));
        assert!(matches!(
            Grammar::new(["x", "y"], ["T <= T", "not T"]),
            Err(GrammarError::Malformed { .. })
        ));
        assert!(Grammar::new(["x", "y", "max(T, T)", "-T"], ["T == T", "C or not C"]).is_ok());
    }

    #[test]
    fn no_self_comparisons() {
        let g = max_grammar();
        let terms = ["0", "x", "y", "x + y"];
        let preds = g.enumerate_predicates(&terms);

        for p in &preds {
            for part in p.split(" and ") {
                let part = part.trim_start_matches("not ").trim();
                if let Some((l, _, r)) = split_comparison(part) {
                    assert_ne!(l, r, "{p}");
                }
            }
        }
        assert!(preds.contains(&"x <= y".to_string()));
        assert!(preds.contains(&"not x <= y".to_string()));
    }

    #[test]
    fn simplest_predicate_is_last() {
        let g = max_grammar();
        let preds = g.enumerate_predicates(&["x", "y"]);

        assert_eq!(preds.last().map(String::as_str), Some("x <= y"));
        assert_eq!(preds[preds.len() - 2], "y <= x");
        for w in preds.windows(2) {
            assert!(complexity_key(&w[0]) > complexity_key(&w[1]));
        }
    }

    #[test]
    fn predicates_are_unique() {
        let g = max_grammar();
        let preds = g.enumerate_predicates(&["0", "1", "x", "y"]);
        let unique = preds.iter().collect::<BTreeSet<_>>();
        assert_eq!(unique.len(), preds.len());
    }

    #[test]
    fn pruned_combinations() {
        let and = Some(Connective::And);
        let or = Some(Connective::Or);

        assert!(prune(and, "x <= y", "x <= y"));
        assert!(!prune(or, "x <= y", "x <= y"));
        assert!(prune(and, "not x <= y", "x <= y"));
        assert!(prune(and, "x <= y", "not x <= y"));
        assert!(prune(or, "x <= y", "not x <= y"));
        assert!(prune(or, "x < y", "y < x"));
        assert!(!prune(and, "x < y", "y <= x"));
        assert!(!prune(and, "x < y", "x < y + 1"));
        assert!(!prune(and, "0 <= x", "x <= y"));
    }

    #[test]
    fn split_comparisons() {
        assert_eq!(split_comparison("x + 1 <= y"), Some(("x + 1", "<=", "y")));
        assert_eq!(split_comparison("a<b"), Some(("a", "<", "b")));
        assert_eq!(split_comparison("not x <= y"), None);
        assert_eq!(split_comparison("x <= y and y <= x"), None);
        assert_eq!(split_comparison("x + y"), None);
    }

    // Every pruned combination must agree with a trivial formula on all
    // sample bindings: the operand itself, `False` or `True`.
    #[test]
    fn pruning_is_sound() {
        let scope = ["x", "y"];
        let samples = (-3i64..=3)
            .flat_map(|x| (-3i64..=3).map(move |y| [x, y]))
            .collect::<Vec<_>>();
        let truth = |src: &str| {
            let e = parse(src, &scope).unwrap();
            samples.iter().map(|p| e.eval_bool(p).unwrap()).collect::<Vec<_>>()
        };
        let constant = |b: bool| vec![b; samples.len()];

        let cases = [
            ("x <= y and x <= y", truth("x <= y")),
            ("not x <= y and x <= y", constant(false)),
            ("x <= y and not x <= y", constant(false)),
            ("x <= y or not x <= y", constant(true)),
            ("x < y and y < x", constant(false)),
            ("x <= y or y <= x", constant(true)),
        ];

        let g = max_grammar();
        let preds = g.enumerate_predicates(&["x", "y"]);

        for (combined, expected) in &cases {
            let combined: &str = combined;
            assert_eq!(truth(combined), *expected, "{combined}");
            assert!(!preds.iter().any(|p| p == combined), "{combined} was kept");
        }
    }
}
