use std::collections::{BTreeSet, HashSet};

use rand::Rng;

use crate::error::{SynthError, SynthResult};
use crate::expr::ExprVal;

/// One input tuple, a value per grammar identifier.
pub type Point = Vec<ExprVal>;

/// Indices into a [`PointSet`] on which a term satisfies the specification.
pub type Cover = BTreeSet<usize>;

/// Append-only set of points. A point keeps its index forever, so covers
/// computed against an older, smaller set stay meaningful.
#[derive(Debug, Clone, Default)]
pub struct PointSet {
    points: Vec<Point>,
    index: HashSet<Point>,
}

impl PointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `point`, returning `false` if it was already present.
    pub fn insert(&mut self, point: Point) -> bool {
        if self.index.contains(&point) {
            return false;
        }

        self.index.insert(point.clone());
        self.points.push(point);
        true
    }

    pub fn contains(&self, point: &[ExprVal]) -> bool {
        self.index.contains(point)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Point> {
        self.points.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    /// Every index, i.e. the cover a term must jointly reach.
    pub fn all(&self) -> Cover {
        (0..self.points.len()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleConfig {
    /// Coordinates start out within `[-initial_bound - 1, initial_bound]`.
    pub initial_bound: ExprVal,
    /// First widening step; doubles after every use.
    pub step: ExprVal,
    /// Points drawn between two widenings.
    pub grow_every: usize,
    pub max_bound: ExprVal,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            initial_bound: 10,
            step: 10,
            grow_every: 5,
            max_bound: i32::MAX as ExprVal,
        }
    }
}

impl SampleConfig {
    pub fn validate(&self) -> SynthResult<()> {
        let reason = if self.initial_bound < 0 {
            "initial bound is negative"
        } else if self.step < 0 {
            "widening step is negative"
        } else if self.max_bound < self.initial_bound {
            "maximum bound is below the initial bound"
        } else {
            return Ok(());
        };

        Err(SynthError::Sampling { reason })
    }
}

/// Endless stream of random test points over a slowly widening range, so
/// small inputs are tried before large ones.
pub struct PointGen<'r, R> {
    arity: usize,
    bound: ExprVal,
    step: ExprVal,
    generated: usize,
    config: SampleConfig,
    rng: &'r mut R,
}

impl<'r, R: Rng> PointGen<'r, R> {
    pub fn new(arity: usize, config: SampleConfig, rng: &'r mut R) -> Self {
        let bound = config.initial_bound.clamp(0, config.max_bound.max(0));

        Self {
            arity,
            bound,
            step: config.step,
            generated: 0,
            config,
            rng,
        }
    }

    pub fn bound(&self) -> ExprVal {
        self.bound
    }
}

impl<R: Rng> Iterator for PointGen<'_, R> {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        let bound = self.bound;
        let point = (0..self.arity)
            .map(|_| self.rng.gen_range(-bound - 1..=bound))
            .collect();

        self.generated += 1;
        if self.config.grow_every > 0 && self.generated % self.config.grow_every == 0 {
            self.bound = self
                .bound
                .saturating_add(self.step)
                .clamp(0, self.config.max_bound.max(0));
            self.step = self.step.saturating_mul(2);
        }

        Some(point)
    }
}
