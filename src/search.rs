use std::collections::BTreeMap;

use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::conv::CompiledCandidate;
use crate::error::{ExhaustReason, SynthError, SynthResult};
use crate::grammar::Grammar;
use crate::oracle::{Candidate, Specification};
use crate::point::{Cover, Point, PointGen, PointSet, SampleConfig};
use crate::synth::term_enum::TermEnum;
use crate::synth::TermSource;
use crate::tree::{learn, DecisionTree, Predicate, Term, TermCover};

pub const DEFAULT_VERIFICATION_CHECKS: usize = 500;
pub const DEFAULT_TERM_BUDGET: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthConfig {
    /// Function name used when rendering the candidate.
    pub name: String,
    /// `None` keeps refining until a candidate survives verification.
    pub max_iterations: Option<usize>,
    /// Random points tried against each candidate.
    pub max_verification_checks: usize,
    /// Terms pulled from the source within one iteration.
    pub max_terms_per_iteration: usize,
    /// Seed for the test point generator, entropy when `None`.
    pub seed: Option<u64>,
    pub sample: SampleConfig,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            name: "my_func".to_string(),
            max_iterations: None,
            max_verification_checks: DEFAULT_VERIFICATION_CHECKS,
            max_terms_per_iteration: DEFAULT_TERM_BUDGET,
            seed: None,
            sample: SampleConfig::default(),
        }
    }
}

/// Per-iteration state. Only the point set survives from one iteration to
/// the next, everything here starts out empty.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub terms: Vec<TermCover>,
    /// Terms observationally equivalent to a kept term, keyed by that term.
    pub aliases: BTreeMap<String, Vec<String>>,
    pub preds: Vec<Predicate>,
    pub tree: Option<DecisionTree>,
    pub terms_pulled: usize,
}

impl Session {
    pub fn cover_union(&self) -> Cover {
        self.terms
            .iter()
            .flat_map(|tc| tc.cover.iter().copied())
            .collect()
    }

    fn covers_all(&self, points: &PointSet) -> bool {
        self.cover_union().len() == points.len()
    }
}

#[derive(Clone, Debug)]
pub enum SearchStep {
    /// The candidate failed on `point`, which joined the point set.
    Counterexample {
        iteration: usize,
        candidate: CompiledCandidate,
        point: Point,
    },
    /// No sampled point refuted the candidate.
    Verified {
        iteration: usize,
        candidate: CompiledCandidate,
    },
}

/// Counterexample-guided synthesizer: solve terms, unify them into a
/// decision tree, try to break the tree with random points, repeat.
pub struct Synthesizer<S = TermEnum> {
    grammar: Grammar,
    spec: Specification,
    source: S,
    config: SynthConfig,
    points: PointSet,
    iteration: usize,
    rng: StdRng,
    session: Option<Session>,
}

impl Synthesizer<TermEnum> {
    pub fn new(grammar: Grammar, spec: Specification, config: SynthConfig) -> SynthResult<Self> {
        let source = grammar.enumerate_terms();
        Self::with_source(grammar, spec, source, config)
    }
}

impl<S: TermSource> Synthesizer<S> {
    pub fn with_source(
        grammar: Grammar,
        spec: Specification,
        source: S,
        config: SynthConfig,
    ) -> SynthResult<Self> {
        if grammar.identifiers().len() != spec.arity() {
            return Err(SynthError::ArityMismatch {
                grammar: grammar.identifiers().len(),
                spec: spec.arity(),
            });
        }
        config.sample.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            grammar,
            spec,
            source,
            config,
            points: PointSet::new(),
            iteration: 0,
            rng,
            session: None,
        })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn spec(&self) -> &Specification {
        &self.spec
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Counterexamples gathered so far.
    pub fn points(&self) -> &PointSet {
        &self.points
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// State of the most recent iteration.
    pub fn last_session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Seeds the point set with a known input.
    pub fn add_point(&mut self, point: Point) -> SynthResult<bool> {
        let arity = self.grammar.identifiers().len();
        if point.len() != arity {
            return Err(SynthError::PointArity {
                expected: arity,
                found: point.len(),
            });
        }

        Ok(self.points.insert(point))
    }

    /// Points on which `candidate` satisfies the specification.
    pub fn cover_of<C: Candidate + ?Sized>(&self, candidate: &C) -> Cover {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| self.spec.holds(candidate, p))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn synthesize(&mut self) -> SynthResult<CompiledCandidate> {
        loop {
            match self.step()? {
                SearchStep::Verified { candidate, .. } => return Ok(candidate),
                SearchStep::Counterexample { .. } => (),
            }
        }
    }

    /// Runs one full iteration: term solving, unification, verification.
    pub fn step(&mut self) -> SynthResult<SearchStep> {
        if let Some(max) = self.config.max_iterations {
            if self.iteration >= max {
                info!("Max iterations ({max}) reached, stopping synthesis");
                return Err(SynthError::Exhausted {
                    iterations: self.iteration,
                    reason: ExhaustReason::IterationBudget,
                });
            }
        }

        self.iteration += 1;
        info!("Iteration {} ({} points)", self.iteration, self.points.len());

        self.source.restart();
        let mut session = Session::default();
        let res = self.iterate(&mut session);
        self.session = Some(session);

        res
    }

    fn iterate(&mut self, session: &mut Session) -> SynthResult<SearchStep> {
        self.solve_terms(session)?;
        let tree = self.unify(session)?;
        session.tree = Some(tree.clone());

        let candidate = CompiledCandidate::new(
            self.config.name.as_str(),
            self.grammar.identifiers(),
            tree,
        );

        match self.verify(&candidate) {
            None => {
                info!("Synthesis successful:\n{candidate}");
                Ok(SearchStep::Verified {
                    iteration: self.iteration,
                    candidate,
                })
            }
            Some(point) => {
                debug!("Counter-example found: {point:?}");
                self.points.insert(point.clone());
                Ok(SearchStep::Counterexample {
                    iteration: self.iteration,
                    candidate,
                    point,
                })
            }
        }
    }

    /// Pulls terms until every point is explained by at least one of them.
    fn solve_terms(&mut self, session: &mut Session) -> SynthResult<()> {
        while !session.covers_all(&self.points) {
            match self.next_distinct_term(session)? {
                Some(tc) => session.terms.push(tc),
                None => break,
            }
        }

        debug!(
            "Term solver: {:?}",
            session.terms.iter().map(|tc| tc.term.text()).collect::<Vec<_>>()
        );

        Ok(())
    }

    /// Learns a decision tree, adding one more term after every failure.
    fn unify(&mut self, session: &mut Session) -> SynthResult<DecisionTree> {
        let mut need_term = session.terms.is_empty();

        loop {
            if need_term {
                match self.next_distinct_term(session)? {
                    Some(tc) => {
                        debug!("Added term {}", tc.term.text());
                        session.terms.push(tc);
                    }
                    // Same terms would fail the same way.
                    None => continue,
                }
            }

            let texts = session
                .terms
                .iter()
                .map(|tc| tc.term.text())
                .collect::<Vec<_>>();
            session.preds = self
                .grammar
                .enumerate_predicates(&texts)
                .into_iter()
                .filter_map(|p| match Predicate::parse(&p, self.grammar.identifiers()) {
                    Ok(pred) => Some(pred),
                    Err(e) => {
                        debug!("Skipping predicate `{p}`: {e}");
                        None
                    }
                })
                .collect();
            debug!("Generated {} predicates", session.preds.len());

            let all = self.points.all();
            match learn(&self.points, &all, &session.terms, &session.preds) {
                Some(root) => {
                    let tree = DecisionTree::new(root);
                    debug!("Decision tree learning successful:\n{tree}");
                    return Ok(tree);
                }
                None => {
                    debug!("Decision tree learning failed");
                    need_term = true;
                }
            }
        }
    }

    /// Next term whose cover differs from every known term's cover.
    ///
    /// `None` means an equivalent term showed up while the known terms
    /// already explain every point, so nothing more is needed right now.
    fn next_distinct_term(&mut self, session: &mut Session) -> SynthResult<Option<TermCover>> {
        loop {
            if session.terms_pulled >= self.config.max_terms_per_iteration {
                return Err(self.exhausted(ExhaustReason::TermBudget));
            }

            let Some(text) = self.source.next_term() else {
                return Err(self.exhausted(ExhaustReason::TermSpace));
            };
            session.terms_pulled += 1;

            let term = match Term::parse(&text, self.grammar.identifiers()) {
                Ok(term) => term,
                Err(e) => {
                    debug!("Skipping term `{text}`: {e}");
                    continue;
                }
            };

            let cover = self.cover_of(&term);
            if cover.is_empty() && !self.points.is_empty() {
                trace!("Term {text} covers nothing");
                continue;
            }

            let equivalent = session
                .terms
                .iter()
                .find(|tc| tc.cover == cover)
                .map(|tc| tc.term.text().to_string());
            if let Some(existing) = equivalent {
                trace!("Term {text} is equivalent to {existing}");
                session.aliases.entry(existing).or_default().push(text);

                if session.covers_all(&self.points) {
                    return Ok(None);
                }
                continue;
            }

            debug!("Term {text} covers {cover:?}");
            return Ok(Some(TermCover { term, cover }));
        }
    }

    /// Samples test points until one refutes `candidate`.
    fn verify(&mut self, candidate: &CompiledCandidate) -> Option<Point> {
        let arity = self.grammar.identifiers().len();
        let checks = self.config.max_verification_checks;
        let sampler = PointGen::new(arity, self.config.sample, &mut self.rng);

        for (check, point) in sampler.take(checks).enumerate() {
            if !self.spec.holds(candidate, &point) {
                debug!("Verification failed after {} checks", check + 1);
                return Some(point);
            }
        }

        debug!("{checks} checks passed");
        None
    }

    fn exhausted(&self, reason: ExhaustReason) -> SynthError {
        info!("Stopping synthesis: {reason}");
        SynthError::Exhausted {
            iterations: self.iteration,
            reason,
        }
    }
}
