use std::collections::HashSet;

use log::trace;

use crate::grammar::{Grammar, Template};

use super::TermSource;

/// Counts through every tuple of `len` digits below `base`, rightmost digit
/// fastest. A zero-length odometer yields the empty tuple exactly once.
#[derive(Debug, Clone)]
pub struct Odometer {
    base: usize,
    limit_reached: bool,
    digits: Vec<usize>,
}

impl Odometer {
    pub fn new(base: usize, len: usize) -> Self {
        Self {
            base,
            limit_reached: len > 0 && base == 0,
            digits: vec![0; len],
        }
    }

    pub fn increment(&mut self) {
        if self.limit_reached {
            return;
        }

        // NOTE: this assert failing is 100% a bug
        debug_assert!(self.digits.iter().all(|x| *x < self.base));

        for digit in self.digits.iter_mut().rev() {
            if *digit + 1 < self.base {
                *digit += 1;
                return;
            }

            *digit = 0;
        }

        self.limit_reached = true;
    }
}

impl Iterator for Odometer {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.limit_reached {
            return None;
        }

        let res = self.digits.clone();
        self.increment();

        Some(res)
    }
}

/// Lazy, restartable stream of grammar terms.
///
/// Yields the non-recursive terms first, then goes round the recursive
/// templates forever, filling each template's slots with every tuple of the
/// terms seen before that template's pass began. Only terms not produced
/// before are yielded, so term size grows round by round.
pub struct TermEnum {
    base_terms: Vec<String>,
    templates: Vec<Template>,
    seen: Vec<String>,
    seen_set: HashSet<String>,
    base_idx: usize,
    template_idx: usize,
    snapshot_len: usize,
    combos: Option<Odometer>,
}

impl TermEnum {
    pub fn new(grammar: &Grammar) -> Self {
        Self {
            base_terms: grammar.base_terms().to_vec(),
            templates: grammar.term_templates().to_vec(),
            seen: Vec::new(),
            seen_set: HashSet::new(),
            base_idx: 0,
            template_idx: 0,
            snapshot_len: 0,
            combos: None,
        }
    }

    /// Terms produced so far, in production order.
    pub fn seen(&self) -> &[String] {
        &self.seen
    }

    fn remember(&mut self, term: &str) -> bool {
        if self.seen_set.contains(term) {
            return false;
        }

        self.seen_set.insert(term.to_string());
        self.seen.push(term.to_string());
        true
    }

    fn start_pass(&mut self) {
        self.snapshot_len = self.seen.len();
        let slots = self.templates[self.template_idx].term_slots();
        self.combos = Some(Odometer::new(self.snapshot_len, slots));
    }
}

impl TermSource for TermEnum {
    fn restart(&mut self) {
        self.seen.clear();
        self.seen_set.clear();
        self.base_idx = 0;
        self.template_idx = 0;
        self.snapshot_len = 0;
        self.combos = None;
    }

    fn next_term(&mut self) -> Option<String> {
        while self.base_idx < self.base_terms.len() {
            let term = self.base_terms[self.base_idx].clone();
            self.base_idx += 1;

            if self.remember(&term) {
                return Some(term);
            }
        }

        if self.templates.is_empty() {
            return None;
        }

        // Templates always carry text besides their slots, so every pass
        // contributes at least one unseen term and this loop cannot spin.
        loop {
            if self.combos.is_none() {
                self.start_pass();
            }

            let digits = self.combos.as_mut().and_then(|c| c.next());
            let Some(digits) = digits else {
                self.template_idx = (self.template_idx + 1) % self.templates.len();
                self.combos = None;
                continue;
            };

            let parts = digits
                .iter()
                .map(|idx| self.seen[*idx].as_str())
                .collect::<Vec<_>>();
            let term = self.templates[self.template_idx].fill_terms(&parts);

            if self.remember(&term) {
                trace!("New term: {term}");
                return Some(term);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar(terms: &[&str]) -> Grammar {
        Grammar::new(terms.iter().copied(), ["T <= T"]).unwrap()
    }

    #[test]
    fn odometer_counts_like_a_product() {
        let all = Odometer::new(2, 2).collect::<Vec<_>>();
        assert_eq!(all, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);

        assert_eq!(Odometer::new(3, 0).collect::<Vec<_>>(), vec![Vec::<usize>::new()]);
        assert_eq!(Odometer::new(0, 2).count(), 0);
        assert_eq!(Odometer::new(3, 3).count(), 27);
    }

    #[test]
    fn base_terms_come_first() {
        let g = grammar(&["0", "1", "x", "T + T"]);
        let mut terms = g.enumerate_terms();

        let first = std::iter::from_fn(|| terms.next_term()).take(5).collect::<Vec<_>>();
        assert_eq!(first, vec!["0", "1", "x", "0 + 0", "0 + 1"]);
    }

    #[test]
    fn terms_are_distinct_and_grow() {
        let g = grammar(&["x", "y", "T + T", "-T"]);
        let mut terms = g.enumerate_terms();
        let produced = std::iter::from_fn(|| terms.next_term()).take(200).collect::<Vec<_>>();

        let unique = produced.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), produced.len());
        assert!(produced.contains(&"-x".to_string()));
        assert!(produced.contains(&"x + y".to_string()));
        // Round one of `T + T` only sees the identifiers.
        assert_eq!(&produced[2..6], &["x + x", "x + y", "y + x", "y + y"]);
    }

    #[test]
    fn restart_replays_the_sequence() {
        let g = grammar(&["0", "x", "T * T"]);
        let mut terms = g.enumerate_terms();
        let first = std::iter::from_fn(|| terms.next_term()).take(20).collect::<Vec<_>>();

        terms.restart();
        let again = std::iter::from_fn(|| terms.next_term()).take(20).collect::<Vec<_>>();
        assert_eq!(first, again);
    }

    #[test]
    fn no_templates_means_finite() {
        let g = grammar(&["x", "y", "7"]);
        let mut terms = g.enumerate_terms();
        let all = std::iter::from_fn(|| terms.next_term()).collect::<Vec<_>>();
        assert_eq!(all, vec!["x", "y", "7"]);
    }
}
