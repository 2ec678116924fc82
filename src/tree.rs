use std::fmt;

use log::trace;

use crate::error::EvalError;
use crate::expr::{Expr, ExprVal};
use crate::parse;
use crate::point::{Cover, PointSet};

/// A term together with its parsed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    text: String,
    expr: Expr,
}

impl Term {
    pub fn parse<S: AsRef<str>>(text: &str, scope: &[S]) -> Result<Self, EvalError> {
        Ok(Self {
            text: text.to_string(),
            expr: parse::parse(text, scope)?,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn eval(&self, point: &[ExprVal]) -> Result<ExprVal, EvalError> {
        self.expr.eval_int(point)
    }
}

/// A branching condition over the grammar identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    text: String,
    expr: Expr,
}

impl Predicate {
    pub fn parse<S: AsRef<str>>(text: &str, scope: &[S]) -> Result<Self, EvalError> {
        Ok(Self {
            text: text.to_string(),
            expr: parse::parse(text, scope)?,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn eval(&self, point: &[ExprVal]) -> Result<bool, EvalError> {
        self.expr.eval_bool(point)
    }

    /// Evaluation failures count as `false`.
    pub fn test(&self, point: &[ExprVal]) -> bool {
        self.eval(point).unwrap_or_else(|e| {
            trace!("Predicate `{}` failed on {point:?}: {e}", self.text);
            false
        })
    }
}

/// A term known to the learner and the points it explains.
#[derive(Debug, Clone)]
pub struct TermCover {
    pub term: Term,
    pub cover: Cover,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf {
        term: Term,
        depth: usize,
    },
    Internal {
        pred: Predicate,
        depth: usize,
        on_true: Box<Node>,
        on_false: Box<Node>,
    },
}

impl Node {
    pub fn leaf(term: Term) -> Self {
        Node::Leaf { term, depth: 0 }
    }

    pub fn internal(pred: Predicate, on_true: Node, on_false: Node) -> Self {
        Node::Internal {
            pred,
            depth: 0,
            on_true: Box::new(on_true),
            on_false: Box::new(on_false),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf { depth, .. } | Node::Internal { depth, .. } => *depth,
        }
    }

    fn set_depth(&mut self, new_depth: usize) {
        match self {
            Node::Leaf { depth, .. } => *depth = new_depth,
            Node::Internal {
                depth,
                on_true,
                on_false,
                ..
            } => {
                *depth = new_depth;
                on_true.set_depth(new_depth + 1);
                on_false.set_depth(new_depth + 1);
            }
        }
    }

    /// The leaf `point` is routed to.
    pub fn route(&self, point: &[ExprVal]) -> &Term {
        match self {
            Node::Leaf { term, .. } => term,
            Node::Internal {
                pred,
                on_true,
                on_false,
                ..
            } => {
                if pred.test(point) {
                    on_true.route(point)
                } else {
                    on_false.route(point)
                }
            }
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: &str) -> fmt::Result {
        let pad = indent.repeat(self.depth() + 1);
        match self {
            Node::Leaf { term, .. } => writeln!(f, "{pad}return {}", term.text()),
            Node::Internal {
                pred,
                on_true,
                on_false,
                ..
            } => {
                writeln!(f, "{pad}if {}:", pred.text())?;
                on_true.fmt_indented(f, indent)?;
                writeln!(f, "{pad}else:")?;
                on_false.fmt_indented(f, indent)
            }
        }
    }
}

/// Immutable branching program: internal nodes test a predicate, leaves
/// return a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionTree {
    root: Node,
}

impl DecisionTree {
    pub fn new(mut root: Node) -> Self {
        root.set_depth(0);
        Self { root }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn predict(&self, point: &[ExprVal]) -> Result<ExprVal, EvalError> {
        self.root.route(point).eval(point)
    }

    pub fn leaves(&self) -> Vec<&Term> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];

        while let Some(node) = stack.pop() {
            match node {
                Node::Leaf { term, .. } => out.push(term),
                Node::Internal {
                    on_true, on_false, ..
                } => {
                    stack.push(on_false);
                    stack.push(on_true);
                }
            }
        }

        out
    }

    pub fn size(&self) -> usize {
        fn count(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Internal {
                    on_true, on_false, ..
                } => 1 + count(on_true) + count(on_false),
            }
        }

        count(&self.root)
    }
}

impl fmt::Display for DecisionTree {
    /// Body of a function: `return t` or nested `if p:` / `else:` blocks,
    /// four spaces per level.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.fmt_indented(f, "    ")
    }
}

/// Builds a decision tree routing every point in `reaching` to a leaf whose
/// term covers it.
///
/// `preds` is ordered simplest-last. Each internal node consumes the last
/// remaining predicate and both of its subtrees see the same shorter list.
/// There is no backtracking: if a branch runs out of predicates the whole
/// attempt fails and the caller has to come back with more terms.
pub fn learn(
    points: &PointSet,
    reaching: &Cover,
    terms: &[TermCover],
    preds: &[Predicate],
) -> Option<Node> {
    if let Some(tc) = terms.iter().find(|tc| tc.cover.is_superset(reaching)) {
        return Some(Node::leaf(tc.term.clone()));
    }

    let (pred, rest) = preds.split_last()?;

    let (on_true, on_false): (Cover, Cover) = reaching.iter().partition(|idx| {
        points
            .get(**idx)
            .map(|p| pred.test(p))
            .unwrap_or(false)
    });

    let on_true = learn(points, &on_true, terms, rest)?;
    let on_false = learn(points, &on_false, terms, rest)?;

    Some(Node::internal(pred.clone(), on_true, on_false))
}

#[cfg(test)]
mod tests {
    use super::*;

    const XY: &[&str] = &["x", "y"];

    fn term(s: &str) -> Term {
        Term::parse(s, XY).unwrap()
    }

    fn pred(s: &str) -> Predicate {
        Predicate::parse(s, XY).unwrap()
    }

    fn max_points() -> PointSet {
        let mut pts = PointSet::new();
        for p in [[1, 0], [0, 2], [2, 2], [-3, 5]] {
            pts.insert(p.to_vec());
        }
        pts
    }

    fn max_terms(pts: &PointSet) -> Vec<TermCover> {
        ["x", "y"]
            .into_iter()
            .map(|t| {
                let term = term(t);
                let cover = (0..pts.len())
                    .filter(|idx| {
                        let p = pts.get(*idx).unwrap();
                        let out = term.eval(p).unwrap();
                        out >= p[0] && out >= p[1]
                    })
                    .collect();
                TermCover { term, cover }
            })
            .collect()
    }

    #[test]
    fn single_term_gives_a_leaf() {
        let pts = max_points();
        let terms = vec![TermCover {
            term: term("max(x, y)"),
            cover: pts.all(),
        }];

        let tree = learn(&pts, &pts.all(), &terms, &[]).unwrap();
        assert_eq!(tree, Node::leaf(term("max(x, y)")));
    }

    #[test]
    fn empty_points_take_the_first_term() {
        let pts = PointSet::new();
        let terms = vec![
            TermCover { term: term("x"), cover: Cover::new() },
            TermCover { term: term("y"), cover: Cover::new() },
        ];

        let tree = learn(&pts, &Cover::new(), &terms, &[]).unwrap();
        assert_eq!(tree, Node::leaf(term("x")));
        assert_eq!(learn(&pts, &Cover::new(), &[], &[]), None);
    }

    #[test]
    fn learns_max() {
        let pts = max_points();
        let terms = max_terms(&pts);
        let preds = vec![pred("not x <= y"), pred("y <= x"), pred("x <= y")];

        let root = learn(&pts, &pts.all(), &terms, &preds).unwrap();
        let tree = DecisionTree::new(root);

        assert_eq!(tree.to_string(), "    if x <= y:\n        return y\n    else:\n        return x\n");
        for p in pts.iter() {
            assert_eq!(tree.predict(p), Ok(p[0].max(p[1])));
        }
        assert_eq!(tree.size(), 3);
    }

    #[test]
    fn leaves_are_valid() {
        let pts = max_points();
        let terms = max_terms(&pts);
        // `y <= x` is simplest here, so it ends up at the root.
        let preds = vec![pred("x <= y"), pred("y <= x")];
        let tree = DecisionTree::new(learn(&pts, &pts.all(), &terms, &preds).unwrap());

        for (idx, p) in pts.iter().enumerate() {
            let leaf = tree.root().route(p);
            let tc = terms.iter().find(|tc| tc.term == *leaf).unwrap();
            assert!(tc.cover.contains(&idx), "{p:?} routed to {}", leaf.text());
        }
    }

    #[test]
    fn fails_without_separating_predicate() {
        let pts = max_points();
        let terms = max_terms(&pts);

        assert_eq!(learn(&pts, &pts.all(), &terms, &[]), None);
        // `0 <= x` holds on (1, 0) and (0, 2), which need different terms.
        assert_eq!(learn(&pts, &pts.all(), &terms, &[pred("0 <= x")]), None);
    }

    #[test]
    fn both_branches_see_the_same_predicates() {
        let mut pts = PointSet::new();
        for p in [[1, 0], [0, 2], [-1, -5], [-5, -1]] {
            pts.insert(p.to_vec());
        }
        let terms = max_terms(&pts);
        // Root splits on sign, each branch then needs `x <= y` again.
        let preds = vec![pred("x <= y"), pred("0 <= x")];

        let tree = DecisionTree::new(learn(&pts, &pts.all(), &terms, &preds).unwrap());
        assert_eq!(tree.size(), 7);
        assert_eq!(tree.leaves().len(), 4);
        for p in pts.iter() {
            assert_eq!(tree.predict(p), Ok(p[0].max(p[1])));
        }
    }

    #[test]
    fn depth_is_assigned_top_down() {
        let root = Node::internal(
            pred("x <= y"),
            Node::leaf(term("y")),
            Node::internal(pred("x <= 0"), Node::leaf(term("0")), Node::leaf(term("x"))),
        );
        let tree = DecisionTree::new(root);

        match tree.root() {
            Node::Internal { on_false, depth, .. } => {
                assert_eq!(*depth, 0);
                assert_eq!(on_false.depth(), 1);
                match on_false.as_ref() {
                    Node::Internal { on_true, .. } => assert_eq!(on_true.depth(), 2),
                    _ => panic!("expected an internal node"),
                }
            }
            _ => panic!("expected an internal node"),
        }
    }

    #[test]
    fn failing_predicate_routes_false() {
        let p = pred("x // y < 1");
        assert!(!p.test(&[1, 0]));
        assert!(p.test(&[0, 1]));
    }
}
