//! Terms, predicates and relations share one small expression language.
//!
//! Precedence, lowest first: `or`, `and`, `not`, comparisons (chainable),
//! `+ -`, `* / // %`, unary `- +`, atoms. Atoms are integer literals,
//! `True`/`False`, identifiers, `max(a, b)`, `min(a, b)` and parentheses.

use crate::error::EvalError;
use crate::expr::{BinopKind, Expr, ExprVal, UnopKind};

pub const KEYWORDS: &[&str] = &["and", "or", "not", "True", "False"];
pub const BUILTINS: &[&str] = &["max", "min"];

/// Rule actions produce this, so unknown names and bad literals surface as
/// their own errors instead of parse failures.
type Parsed = Result<Expr, EvalError>;

fn unop(kind: UnopKind, e: Parsed) -> Parsed {
    Ok(Expr::unop(kind, e?))
}

fn binop(kind: BinopKind, l: Parsed, r: Parsed) -> Parsed {
    Ok(Expr::binop(kind, l?, r?))
}

fn literal(offset: usize, digits: &str) -> Parsed {
    digits
        .parse::<ExprVal>()
        .map(Expr::Const)
        .map_err(|_| EvalError::syntax(offset, format!("literal `{digits}` out of range")))
}

fn variable(scope: &[&str], name: &str) -> Parsed {
    scope
        .iter()
        .position(|s| *s == name)
        .map(Expr::Variable)
        .ok_or_else(|| EvalError::UndefinedIdentifier(name.to_string()))
}

fn call(name: &str, args: Vec<Parsed>) -> Parsed {
    let kind = match name {
        "max" => BinopKind::Max,
        "min" => BinopKind::Min,
        _ => return Err(EvalError::UnknownFunction(name.to_string())),
    };

    let args = args.into_iter().collect::<Result<Vec<_>, _>>()?;
    match <[Expr; 2]>::try_from(args) {
        Ok([l, r]) => Ok(Expr::binop(kind, l, r)),
        Err(args) => Err(EvalError::Arity {
            name: name.to_string(),
            expected: 2,
            found: args.len(),
        }),
    }
}

/// `a < b < c` is `a < b and b < c`.
fn chain(first: Parsed, rest: Vec<(BinopKind, Parsed)>) -> Parsed {
    let mut l = first?;
    let mut res: Option<Expr> = None;

    for (kind, r) in rest {
        let r = r?;
        let cmp = Expr::binop(kind, l, r.clone());
        res = Some(match res {
            None => cmp,
            Some(prev) => Expr::binop(BinopKind::And, prev, cmp),
        });
        l = r;
    }

    Ok(res.unwrap_or(l))
}

peg::parser! {
    /// Expression rules. Identifiers resolve against `scope` while parsing.
    grammar rules<'s>(scope: &'s [&'s str]) for str {
        /// Whitespace.
        rule _() = quiet! { [' ' | '\t' | '\n' | '\r']* }

        rule word_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']

        rule kw_or() = "or" !word_char()
        rule kw_and() = "and" !word_char()
        rule kw_not() = "not" !word_char()

        rule ident() -> &'input str
        = quiet! {
            w:$(['a'..='z' | 'A'..='Z' | '_'] word_char()*) {?
                if KEYWORDS.contains(&w) {
                    Err("identifier")
                } else {
                    Ok(w)
                }
            }
        }
        / expected!("identifier")

        rule cmp_op() -> BinopKind
        = "<=" { BinopKind::Le }
        / ">=" { BinopKind::Ge }
        / "==" { BinopKind::Eq }
        / "!=" { BinopKind::Ne }
        / "<" { BinopKind::Lt }
        / ">" { BinopKind::Gt }

        rule atom() -> Parsed
        = s:position!() digits:$(['0'..='9']+) !word_char() { literal(s, digits) }
        / "True" !word_char() { Ok(Expr::Bool(true)) }
        / "False" !word_char() { Ok(Expr::Bool(false)) }
        / name:ident() _ "(" _ args:(expr() ** (_ "," _)) _ ")" { call(name, args) }
        / name:ident() { variable(scope, name) }
        / "(" _ e:expr() _ ")" { e }

        rule arith() -> Parsed
        = precedence! {
            l:(@) _ "+" _ r:@ { binop(BinopKind::Plus, l, r) }
            l:(@) _ "-" _ r:@ { binop(BinopKind::Minus, l, r) }
            --
            l:(@) _ "//" _ r:@ { binop(BinopKind::Div, l, r) }
            l:(@) _ "*" _ r:@ { binop(BinopKind::Mul, l, r) }
            l:(@) _ "/" _ r:@ { binop(BinopKind::Div, l, r) }
            l:(@) _ "%" _ r:@ { binop(BinopKind::Mod, l, r) }
            --
            "-" _ e:@ { unop(UnopKind::Negate, e) }
            "+" _ e:@ { e }
            --
            a:atom() { a }
        }

        rule comparison() -> Parsed
        = first:arith() rest:(_ op:cmp_op() _ r:arith() { (op, r) })* { chain(first, rest) }

        rule expr() -> Parsed
        = precedence! {
            l:(@) _ kw_or() _ r:@ { binop(BinopKind::Or, l, r) }
            --
            l:(@) _ kw_and() _ r:@ { binop(BinopKind::And, l, r) }
            --
            kw_not() _ e:@ { unop(UnopKind::Not, e) }
            --
            c:comparison() { c }
        }

        pub rule expression() -> Parsed = _ e:expr() _ { e }
    }
}

/// Parses `src`, resolving every identifier to its position in `scope`.
pub fn parse<S: AsRef<str>>(src: &str, scope: &[S]) -> Result<Expr, EvalError> {
    let scope = scope.iter().map(|s| s.as_ref()).collect::<Vec<_>>();

    rules::expression(src, &scope)
        .map_err(|e| EvalError::syntax(e.location.offset, format!("expected {}", e.expected)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    const XY: &[&str] = &["x", "y"];

    fn int(src: &str, point: &[ExprVal]) -> Result<ExprVal, EvalError> {
        parse(src, XY)?.eval_int(point)
    }

    fn boolean(src: &str, point: &[ExprVal]) -> Result<bool, EvalError> {
        parse(src, XY)?.eval_bool(point)
    }

    #[test]
    fn precedence() {
        assert_eq!(int("1 + 2 * 3", &[]), Ok(7));
        assert_eq!(int("(1 + 2) * 3", &[]), Ok(9));
        assert_eq!(int("-x + y", &[2, 5]), Ok(3));
        assert_eq!(int("x - y - 1", &[10, 3]), Ok(6));
        assert_eq!(int("--x", &[4]), Ok(4));
        assert_eq!(int("x // 2 + x % 3", &[7]), Ok(4));
    }

    #[test]
    fn not_binds_looser_than_comparison() {
        assert_eq!(boolean("not x <= y", &[1, 2]), Ok(false));
        assert_eq!(boolean("not x <= y and y <= x", &[3, 2]), Ok(true));
        assert_eq!(boolean("x <= y or not x <= y", &[5, 0]), Ok(true));
    }

    #[test]
    fn chained_comparison() {
        assert_eq!(boolean("0 <= x < y", &[1, 2]), Ok(true));
        assert_eq!(boolean("0 <= x < y", &[3, 2]), Ok(false));
    }

    #[test]
    fn builtins() {
        assert_eq!(int("max(x, y)", &[1, 2]), Ok(2));
        assert_eq!(int("min(x, y + 10)", &[1, 2]), Ok(1));
        assert!(matches!(parse("max(x)", XY), Err(EvalError::Arity { found: 1, .. })));
        assert!(matches!(parse("abs(x)", XY), Err(EvalError::UnknownFunction(_))));
    }

    #[test]
    fn errors() {
        assert_eq!(parse("z + 1", XY), Err(EvalError::UndefinedIdentifier("z".into())));
        assert!(matches!(parse("x +", XY), Err(EvalError::Syntax { offset: 3, .. })));
        assert!(matches!(parse("x y", XY), Err(EvalError::Syntax { offset: 2, .. })));
        assert!(matches!(parse("(x", XY), Err(EvalError::Syntax { .. })));
        assert!(matches!(parse("x $ y", XY), Err(EvalError::Syntax { offset: 2, .. })));
        assert!(matches!(parse("99999999999999999999", XY), Err(EvalError::Syntax { .. })));
        assert_eq!(int("x / (y - y)", &[1, 1]), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn keywords_are_whole_words() {
        let scope = &["x", "notx", "y_or"];
        assert_eq!(parse("notx", scope), Ok(Expr::Variable(1)));
        assert_eq!(parse("y_or", scope), Ok(Expr::Variable(2)));
        assert_eq!(
            parse("not x<=0", scope),
            Ok(Expr::unop(
                UnopKind::Not,
                Expr::binop(BinopKind::Le, Expr::Variable(0), Expr::Const(0))
            ))
        );
        assert!(matches!(parse("x <= 1 andx <= 2", scope), Err(EvalError::Syntax { offset: 7, .. })));
        assert!(matches!(parse("and", scope), Err(EvalError::Syntax { offset: 0, .. })));
        assert!(matches!(parse("2x", scope), Err(EvalError::Syntax { .. })));
    }

    #[test]
    fn evaluations_are_independent() {
        let e = parse("x + y", XY).unwrap();
        assert_eq!(e.eval_int(&[1, 2]), Ok(3));
        assert_eq!(e.eval_int(&[10, 20]), Ok(30));
        assert_eq!(e.eval_int(&[1, 2]), Ok(3));
    }
}
