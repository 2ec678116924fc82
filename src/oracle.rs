use log::{info, trace};

use crate::error::EvalError;
use crate::expr::{Expr, ExprVal};
use crate::grammar::OUTPUT_IDENT;
use crate::parse;
use crate::tree::{DecisionTree, Term};

/// Anything that maps a point to an output.
pub trait Candidate {
    fn invoke(&self, point: &[ExprVal]) -> Result<ExprVal, EvalError>;
}

impl Candidate for Term {
    fn invoke(&self, point: &[ExprVal]) -> Result<ExprVal, EvalError> {
        self.eval(point)
    }
}

impl Candidate for DecisionTree {
    fn invoke(&self, point: &[ExprVal]) -> Result<ExprVal, EvalError> {
        self.predict(point)
    }
}

impl<F> Candidate for F
where
    F: Fn(&[ExprVal]) -> Result<ExprVal, EvalError>,
{
    fn invoke(&self, point: &[ExprVal]) -> Result<ExprVal, EvalError> {
        self(point)
    }
}

type Relation = Box<dyn Fn(ExprVal, &[ExprVal]) -> bool>;

enum Condition {
    Native(Relation),
    /// Relation over the inputs plus `out`, bound past the last input.
    Expr { source: String, expr: Expr },
}

/// The correctness relation `condition(output, inputs)` a candidate must
/// satisfy. Stateless: every query stands on its own.
pub struct Specification {
    arity: usize,
    condition: Condition,
}

impl Specification {
    pub fn new<F>(arity: usize, relation: F) -> Self
    where
        F: Fn(ExprVal, &[ExprVal]) -> bool + 'static,
    {
        Self {
            arity,
            condition: Condition::Native(Box::new(relation)),
        }
    }

    /// Builds the relation from an expression over `identifiers` and `out`,
    /// e.g. `out >= x and out >= y and (out == x or out == y)`.
    pub fn parse<S: AsRef<str>>(source: &str, identifiers: &[S]) -> Result<Self, EvalError> {
        if identifiers.iter().any(|i| i.as_ref() == OUTPUT_IDENT) {
            return Err(EvalError::ReservedIdentifier(OUTPUT_IDENT.to_string()));
        }

        let scope = identifiers
            .iter()
            .map(|i| i.as_ref())
            .chain(std::iter::once(OUTPUT_IDENT))
            .collect::<Vec<_>>();
        let expr = parse::parse(source, &scope)?;

        info!("Specification: {source}");

        Ok(Self {
            arity: identifiers.len(),
            condition: Condition::Expr {
                source: source.to_string(),
                expr,
            },
        })
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn source(&self) -> Option<&str> {
        match &self.condition {
            Condition::Native(_) => None,
            Condition::Expr { source, .. } => Some(source.as_str()),
        }
    }

    /// Whether `output` is acceptable for `inputs`. Fails closed.
    pub fn check(&self, output: ExprVal, inputs: &[ExprVal]) -> bool {
        match &self.condition {
            Condition::Native(relation) => relation(output, inputs),
            Condition::Expr { expr, .. } => {
                let out_idx = inputs.len();
                expr.compute(&mut |idx| {
                    if idx == out_idx {
                        Some(output)
                    } else {
                        inputs.get(idx).copied()
                    }
                })
                .and_then(|v| v.as_bool())
                .unwrap_or_else(|e| {
                    trace!("Relation failed on {inputs:?} -> {output}: {e}");
                    false
                })
            }
        }
    }

    /// Runs `candidate` on `point` and checks the result. A candidate that
    /// fails to produce a value does not satisfy the specification.
    pub fn holds<C: Candidate + ?Sized>(&self, candidate: &C, point: &[ExprVal]) -> bool {
        if point.len() != self.arity {
            return false;
        }

        match candidate.invoke(point) {
            Ok(output) => self.check(output, point),
            Err(e) => {
                trace!("Candidate failed on {point:?}: {e}");
                false
            }
        }
    }
}
