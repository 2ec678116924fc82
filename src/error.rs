use thiserror::Error;

/// Failure to parse or evaluate a term, predicate or relation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("syntax error at offset {offset}: {msg}")]
    Syntax { offset: usize, msg: String },

    #[error("undefined identifier `{0}`")]
    UndefinedIdentifier(String),

    #[error("identifier `{0}` is reserved")]
    ReservedIdentifier(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("`{name}` takes {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("type mismatch: expected {expected}")]
    Type { expected: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,
}

impl EvalError {
    pub fn syntax(offset: usize, msg: impl Into<String>) -> Self {
        Self::Syntax { offset, msg: msg.into() }
    }
}

/// A grammar rule violating a configuration invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("malformed rule `{rule}`: {reason}")]
    Malformed { rule: String, reason: String },

    #[error("grammar has no non-recursive term")]
    NoBaseTerm,
}

impl GrammarError {
    pub fn malformed(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    /// `max_iterations` was spent without a verified candidate.
    IterationBudget,
    /// One iteration pulled more terms than `max_terms_per_iteration`.
    TermBudget,
    /// The term source ran dry while terms were still required.
    TermSpace,
}

impl std::fmt::Display for ExhaustReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExhaustReason::IterationBudget => write!(f, "iteration budget spent"),
            ExhaustReason::TermBudget => write!(f, "term budget spent"),
            ExhaustReason::TermSpace => write!(f, "no more terms to try"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error("bad specification: {0}")]
    Spec(#[from] EvalError),

    #[error("grammar has {grammar} identifiers but the specification takes {spec} inputs")]
    ArityMismatch { grammar: usize, spec: usize },

    #[error("point has {found} coordinates, expected {expected}")]
    PointArity { expected: usize, found: usize },

    #[error("bad sampling settings: {reason}")]
    Sampling { reason: &'static str },

    #[error("synthesis exhausted after {iterations} iterations: {reason}")]
    Exhausted {
        iterations: usize,
        reason: ExhaustReason,
    },
}

pub type SynthResult<T> = Result<T, SynthError>;
