use std::fmt;

use log::trace;

use crate::error::EvalError;
use crate::expr::ExprVal;
use crate::oracle::Candidate;
use crate::tree::DecisionTree;

/// A learned decision tree packaged as a callable function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCandidate {
    name: String,
    params: Vec<String>,
    tree: DecisionTree,
}

impl CompiledCandidate {
    pub fn new(
        name: impl Into<String>,
        params: impl IntoIterator<Item = impl Into<String>>,
        tree: DecisionTree,
    ) -> Self {
        let res = Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            tree,
        };

        trace!("Compiled candidate:\n{}", res.source());

        res
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn tree(&self) -> &DecisionTree {
        &self.tree
    }

    pub fn into_tree(self) -> DecisionTree {
        self.tree
    }

    /// Runs the program on one point, given in parameter order.
    pub fn invoke(&self, point: &[ExprVal]) -> Result<ExprVal, EvalError> {
        if point.len() != self.params.len() {
            return Err(EvalError::Arity {
                name: self.name.clone(),
                expected: self.params.len(),
                found: point.len(),
            });
        }

        self.tree.predict(point)
    }

    /// Function-shaped rendering for display and audit.
    pub fn source(&self) -> String {
        format!("def {}({}):\n{}", self.name, self.params.join(", "), self.tree)
    }
}

impl Candidate for CompiledCandidate {
    fn invoke(&self, point: &[ExprVal]) -> Result<ExprVal, EvalError> {
        CompiledCandidate::invoke(self, point)
    }
}

impl fmt::Display for CompiledCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source())
    }
}
