use crate::error::EvalError;

pub type ExprVal = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Int(ExprVal),
    Bool(bool),
}

impl Value {
    pub fn as_int(self) -> Result<ExprVal, EvalError> {
        match self {
            Value::Int(x) => Ok(x),
            Value::Bool(_) => Err(EvalError::Type { expected: "integer" }),
        }
    }

    pub fn as_bool(self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(b),
            Value::Int(_) => Err(EvalError::Type { expected: "boolean" }),
        }
    }
}

/// Static type of an expression. Points only bind integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Bool,
}

impl Type {
    fn expect(self, found: Type) -> Result<(), EvalError> {
        match (self, found) {
            (Type::Int, Type::Int) | (Type::Bool, Type::Bool) => Ok(()),
            (Type::Int, Type::Bool) => Err(EvalError::Type { expected: "integer" }),
            (Type::Bool, Type::Int) => Err(EvalError::Type { expected: "boolean" }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnopKind {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinopKind {
    And,
    Or,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Max,
    Min,
}

impl BinopKind {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinopKind::Lt
                | BinopKind::Le
                | BinopKind::Gt
                | BinopKind::Ge
                | BinopKind::Eq
                | BinopKind::Ne
        )
    }
}

/// Parsed term, predicate or relation. Variables are positions in a point,
/// resolved by the parser against the grammar's identifier list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Const(ExprVal),
    Bool(bool),
    Variable(usize),
    Unop(UnopKind, Box<Expr>),
    Binop(BinopKind, Box<(Expr, Expr)>),
}

impl Expr {
    pub fn unop(kind: UnopKind, e: Expr) -> Self {
        Expr::Unop(kind, Box::new(e))
    }

    pub fn binop(kind: BinopKind, l: Expr, r: Expr) -> Self {
        Expr::Binop(kind, Box::new((l, r)))
    }

    /// Checks operand types without evaluating anything.
    pub fn type_of(&self) -> Result<Type, EvalError> {
        match self {
            Expr::Const(_) | Expr::Variable(_) => Ok(Type::Int),
            Expr::Bool(_) => Ok(Type::Bool),
            Expr::Unop(UnopKind::Not, e) => Type::Bool.expect(e.type_of()?).map(|_| Type::Bool),
            Expr::Unop(UnopKind::Negate, e) => Type::Int.expect(e.type_of()?).map(|_| Type::Int),
            Expr::Binop(kind, lr) => {
                let operand = match kind {
                    BinopKind::And | BinopKind::Or => Type::Bool,
                    _ => Type::Int,
                };
                operand.expect(lr.0.type_of()?)?;
                operand.expect(lr.1.type_of()?)?;

                if operand == Type::Bool || kind.is_comparison() {
                    Ok(Type::Bool)
                } else {
                    Ok(Type::Int)
                }
            }
        }
    }

    pub fn compute<F>(&self, f: &mut F) -> Result<Value, EvalError>
    where
        F: FnMut(usize) -> Option<ExprVal>,
    {
        match self {
            Expr::Const(c) => Ok(Value::Int(*c)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Variable(v) => f(*v)
                .map(Value::Int)
                .ok_or_else(|| EvalError::UndefinedIdentifier(format!("#{v}"))),
            Expr::Unop(unop_kind, e) => {
                let e = e.compute(f)?;
                match unop_kind {
                    UnopKind::Not => Ok(Value::Bool(!e.as_bool()?)),
                    UnopKind::Negate => e
                        .as_int()?
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or(EvalError::Overflow),
                }
            }
            Expr::Binop(binop_kind, lr) => {
                // Connectives short-circuit, so the right side may never run.
                match binop_kind {
                    BinopKind::And => {
                        return Ok(Value::Bool(
                            lr.0.compute(f)?.as_bool()? && lr.1.compute(f)?.as_bool()?,
                        ))
                    }
                    BinopKind::Or => {
                        return Ok(Value::Bool(
                            lr.0.compute(f)?.as_bool()? || lr.1.compute(f)?.as_bool()?,
                        ))
                    }
                    _ => (),
                }

                let (l, r) = (lr.0.compute(f)?.as_int()?, lr.1.compute(f)?.as_int()?);
                let int = |x: Option<ExprVal>| x.map(Value::Int).ok_or(EvalError::Overflow);
                match binop_kind {
                    BinopKind::Plus => int(l.checked_add(r)),
                    BinopKind::Minus => int(l.checked_sub(r)),
                    BinopKind::Mul => int(l.checked_mul(r)),
                    BinopKind::Div => floor_div(l, r).map(Value::Int),
                    BinopKind::Mod => floor_mod(l, r).map(Value::Int),
                    BinopKind::Max => Ok(Value::Int(l.max(r))),
                    BinopKind::Min => Ok(Value::Int(l.min(r))),
                    BinopKind::Lt => Ok(Value::Bool(l < r)),
                    BinopKind::Le => Ok(Value::Bool(l <= r)),
                    BinopKind::Gt => Ok(Value::Bool(l > r)),
                    BinopKind::Ge => Ok(Value::Bool(l >= r)),
                    BinopKind::Eq => Ok(Value::Bool(l == r)),
                    BinopKind::Ne => Ok(Value::Bool(l != r)),
                    BinopKind::And | BinopKind::Or => unreachable!("handled above"),
                }
            }
        }
    }

    pub fn eval(&self, point: &[ExprVal]) -> Result<Value, EvalError> {
        self.compute(&mut |idx| point.get(idx).copied())
    }

    pub fn eval_int(&self, point: &[ExprVal]) -> Result<ExprVal, EvalError> {
        self.eval(point)?.as_int()
    }

    pub fn eval_bool(&self, point: &[ExprVal]) -> Result<bool, EvalError> {
        self.eval(point)?.as_bool()
    }
}

fn floor_div(l: ExprVal, r: ExprVal) -> Result<ExprVal, EvalError> {
    if r == 0 {
        return Err(EvalError::DivisionByZero);
    }

    let q = l.checked_div(r).ok_or(EvalError::Overflow)?;
    if l % r != 0 && (l < 0) != (r < 0) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn floor_mod(l: ExprVal, r: ExprVal) -> Result<ExprVal, EvalError> {
    if r == 0 {
        return Err(EvalError::DivisionByZero);
    }

    let m = l.checked_rem(r).ok_or(EvalError::Overflow)?;
    if m != 0 && (m < 0) != (r < 0) {
        Ok(m + r)
    } else {
        Ok(m)
    }
}
