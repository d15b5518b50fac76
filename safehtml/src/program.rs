use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::sync::Arc;

use safehtml_escape::Safe;

use crate::environment::{Function, State};
use crate::escaping::escape_value;
use crate::value::Value;
use crate::{Error, Result};

/// A compiled template: the top-level block plus the number of
/// temporaries and locals a render needs.
#[derive(Debug)]
pub(crate) struct Program {
    pub(crate) block: Block,
    pub(crate) temps: usize,
    pub(crate) locals: usize,
}

/// Statements run in source order, then the slots are joined into the
/// block's output.
#[derive(Debug, Default)]
pub(crate) struct Block {
    pub(crate) stmts: Vec<Stmt>,
    pub(crate) slots: Vec<Slot>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Static(Arc<str>),
    Temp(usize),
}

#[derive(Debug)]
pub(crate) enum Stmt {
    /// Evaluates and escapes `expr` into temporary `temp`.
    Print { temp: usize, expr: Expr },
    Eval(Expr),
    Bind { pattern: Pattern, expr: Expr },
}

#[derive(Debug)]
pub(crate) enum Expr {
    Const(Value),
    Assign(Arc<str>),
    Local(usize),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Attr(Box<Expr>, Arc<str>),
    Index(Box<Expr>, Box<Expr>),
    Call(FunctionRef, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    If {
        negated: bool,
        cond: Box<Expr>,
        then: Block,
        otherwise: Block,
    },
    For {
        pattern: Pattern,
        iter: Box<Expr>,
        body: Block,
    },
    Case {
        expr: Box<Expr>,
        clauses: Vec<(Pattern, Block)>,
    },
    /// A call whose rendered body is passed as the `do:` option.
    CallBlock {
        func: FunctionRef,
        args: Vec<Expr>,
        body: Block,
    },
}

#[derive(Clone)]
pub(crate) struct FunctionRef {
    pub(crate) name: Arc<str>,
    pub(crate) func: Arc<dyn Function>,
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/…", self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Pattern {
    Wildcard,
    Bind(usize),
    /// A name repeated within one pattern: equal to what it bound first.
    Same(usize),
    Const(Value),
    Tuple(Vec<Pattern>),
    List(Vec<Pattern>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Concat,
    Range,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub(crate) fn from_op(op: &str) -> Option<Self> {
        Some(match op {
            "or" | "||" => Self::Or,
            "and" | "&&" => Self::And,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            ">" => Self::Gt,
            "<=" => Self::Le,
            ">=" => Self::Ge,
            "<>" => Self::Concat,
            ".." => Self::Range,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Concat => "<>",
            Self::Range => "..",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

/// Per-render storage. Temporaries are filled by `Print` statements and
/// drained when their block's slots are assembled.
struct Frame {
    locals: Vec<Value>,
    temps: Vec<Safe>,
}

impl Program {
    pub(crate) fn render(&self, state: &State<'_>) -> Result<Safe> {
        let mut frame = Frame {
            locals: vec![Value::Nil; self.locals],
            temps: vec![Safe::new(); self.temps],
        };
        Renderer { state }.render_block(&self.block, &mut frame)
    }
}

struct Renderer<'s, 'a> {
    state: &'s State<'a>,
}

impl Renderer<'_, '_> {
    fn render_block(&self, block: &Block, frame: &mut Frame) -> Result<Safe> {
        for stmt in &block.stmts {
            self.exec(stmt, frame)?;
        }

        let mut out = Safe::with_capacity(block.slots.len());
        for slot in &block.slots {
            match slot {
                Slot::Static(s) => out.push_shared(Arc::clone(s)),
                Slot::Temp(temp) => out.push(mem::take(&mut frame.temps[*temp])),
            }
        }
        Ok(out)
    }

    fn exec(&self, stmt: &Stmt, frame: &mut Frame) -> Result<()> {
        match stmt {
            Stmt::Print { temp, expr } => {
                let value = self.eval(expr, frame)?;
                frame.temps[*temp] = escape_value(value)?;
            }
            Stmt::Eval(expr) => {
                self.eval(expr, frame)?;
            }
            Stmt::Bind { pattern, expr } => {
                let value = self.eval(expr, frame)?;
                if !bind(pattern, &value, frame) {
                    return Err(Error::NoMatch(value.to_string()));
                }
            }
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr, frame: &mut Frame) -> Result<Value> {
        Ok(match expr {
            Expr::Const(value) => value.clone(),
            Expr::Assign(name) => self.state.assigns().fetch(name)?.clone(),
            Expr::Local(idx) => frame.locals[*idx].clone(),
            Expr::List(items) => Value::List(self.eval_all(items, frame)?),
            Expr::Tuple(items) => Value::Tuple(self.eval_all(items, frame)?),
            Expr::Attr(obj, name) => self.eval(obj, frame)?.field(name)?,
            Expr::Index(obj, key) => {
                let obj = self.eval(obj, frame)?;
                obj.index(&self.eval(key, frame)?)?
            }
            Expr::Call(func, args) => {
                let args = self.eval_all(args, frame)?;
                func.func.call(self.state, args)?
            }
            Expr::Unary(op, inner) => unary(*op, self.eval(inner, frame)?)?,
            Expr::BinOp(BinOp::And, left, right) => {
                let left = self.eval(left, frame)?;
                match left.is_truthy() {
                    true => self.eval(right, frame)?,
                    false => left,
                }
            }
            Expr::BinOp(BinOp::Or, left, right) => {
                let left = self.eval(left, frame)?;
                match left.is_truthy() {
                    true => left,
                    false => self.eval(right, frame)?,
                }
            }
            Expr::BinOp(op, left, right) => {
                let left = self.eval(left, frame)?;
                binop(*op, left, self.eval(right, frame)?)?
            }
            Expr::If {
                negated,
                cond,
                then,
                otherwise,
            } => {
                let block = match self.eval(cond, frame)?.is_truthy() != *negated {
                    true => then,
                    false => otherwise,
                };
                Value::Safe(self.render_block(block, frame)?)
            }
            Expr::For {
                pattern,
                iter,
                body,
            } => {
                let items = enumerate(self.eval(iter, frame)?)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if bind(pattern, &item, frame) {
                        out.push(Value::Safe(self.render_block(body, frame)?));
                    }
                }
                Value::List(out)
            }
            Expr::Case { expr, clauses } => {
                let value = self.eval(expr, frame)?;
                let block = clauses
                    .iter()
                    .find(|(pattern, _)| bind(pattern, &value, frame))
                    .map(|(_, block)| block);
                match block {
                    Some(block) => Value::Safe(self.render_block(block, frame)?),
                    None => return Err(Error::NoCaseClause(value.to_string())),
                }
            }
            Expr::CallBlock { func, args, body } => {
                let mut args = self.eval_all(args, frame)?;
                let body = Value::Safe(self.render_block(body, frame)?);
                push_do(&mut args, body);
                func.func.call(self.state, args)?
            }
        })
    }

    fn eval_all(&self, exprs: &[Expr], frame: &mut Frame) -> Result<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(expr, frame)).collect()
    }
}

/// Adds `do: body` to the trailing keyword list, or appends a new one.
fn push_do(args: &mut Vec<Value>, body: Value) {
    let pair = Value::Tuple(vec![Value::atom("do"), body]);
    if let Some(last @ Value::List(_)) = args.last_mut() {
        if matches!(last.as_keywords(), Some(pairs) if !pairs.is_empty()) {
            if let Value::List(items) = last {
                items.push(pair);
                return;
            }
        }
    }
    args.push(Value::List(vec![pair]));
}

fn enumerate(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items),
        Value::Map(map) => Ok(map
            .into_iter()
            .map(|(k, v)| Value::Tuple(vec![Value::Str(k), v]))
            .collect()),
        other => Err(Error::NotEnumerable(other.to_string())),
    }
}

/// Matches `value` against `pattern`, storing bound names in the frame.
fn bind(pattern: &Pattern, value: &Value, frame: &mut Frame) -> bool {
    match (pattern, value) {
        (Pattern::Wildcard, _) => true,
        (Pattern::Bind(idx), value) => {
            frame.locals[*idx] = value.clone();
            true
        }
        (Pattern::Same(idx), value) => frame.locals[*idx] == *value,
        (Pattern::Const(expected), value) => expected == value,
        (Pattern::Tuple(patterns), Value::Tuple(items))
        | (Pattern::List(patterns), Value::List(items)) => {
            patterns.len() == items.len()
                && patterns
                    .iter()
                    .zip(items)
                    .all(|(pattern, item)| bind(pattern, item, frame))
        }
        _ => false,
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| Value::Int(i).bad_operand("-")),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, value) => Err(value.bad_operand("-")),
    }
}

fn binop(op: BinOp, left: Value, right: Value) -> Result<Value> {
    let bad = |left: &Value, right: &Value| Error::BadOperand {
        op: op.as_str(),
        value: format!("{left}, {right}"),
    };

    let value = match op {
        BinOp::Eq => Value::Bool(loose_eq(&left, &right)),
        BinOp::Ne => Value::Bool(!loose_eq(&left, &right)),
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let ord = compare(&left, &right).ok_or_else(|| bad(&left, &right))?;
            Value::Bool(match op {
                BinOp::Lt => ord == Ordering::Less,
                BinOp::Gt => ord == Ordering::Greater,
                BinOp::Le => ord != Ordering::Greater,
                _ => ord != Ordering::Less,
            })
        }
        BinOp::Concat => match (&left, &right) {
            (Value::Str(a), Value::Str(b)) => Value::Str(format!("{a}{b}")),
            _ => return Err(bad(&left, &right)),
        },
        BinOp::Range => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => {
                Value::List(range(*a, *b).ok_or_else(|| bad(&left, &right))?)
            }
            _ => return Err(bad(&left, &right)),
        },
        BinOp::Add | BinOp::Sub | BinOp::Mul => {
            arithmetic(op, &left, &right).ok_or_else(|| bad(&left, &right))?
        }
        BinOp::Div => match (to_float(&left), to_float(&right)) {
            (Some(a), Some(b)) if b != 0.0 => Value::Float(a / b),
            _ => return Err(bad(&left, &right)),
        },
        BinOp::And => match left.is_truthy() {
            true => right,
            false => left,
        },
        BinOp::Or => match left.is_truthy() {
            true => left,
            false => right,
        },
    };
    Ok(value)
}

/// Ranges are built eagerly, so their length is capped.
pub(crate) const MAX_RANGE_LEN: u64 = 1 << 20;

/// `a..b`, inclusive, counting down when `a > b`.
fn range(a: i64, b: i64) -> Option<Vec<Value>> {
    if a.abs_diff(b) >= MAX_RANGE_LEN {
        return None;
    }
    Some(match a <= b {
        true => (a..=b).map(Value::Int).collect(),
        false => (b..=a).rev().map(Value::Int).collect(),
    })
}

fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Option<Value> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let result = match op {
            BinOp::Add => a.checked_add(*b),
            BinOp::Sub => a.checked_sub(*b),
            _ => a.checked_mul(*b),
        };
        return result.map(Value::Int);
    }

    let (a, b) = (to_float(left)?, to_float(right)?);
    Some(Value::Float(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        _ => a * b,
    }))
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Numbers compare by value across integers and floats.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            to_float(left) == to_float(right)
        }
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) | (Value::Atom(a), Value::Atom(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::NaiveDateTime(a), Value::NaiveDateTime(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        _ => to_float(left)?.partial_cmp(&to_float(right)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            binop(BinOp::Add, Value::Int(1), Value::Int(2)).unwrap(),
            Value::Int(3),
        );
        assert_eq!(
            binop(BinOp::Mul, Value::Int(2), Value::Float(1.5)).unwrap(),
            Value::Float(3.0),
        );
        assert_eq!(
            binop(BinOp::Div, Value::Int(1), Value::Int(4)).unwrap(),
            Value::Float(0.25),
        );
        assert!(binop(BinOp::Div, Value::Int(1), Value::Int(0)).is_err());
        assert!(binop(BinOp::Add, Value::Int(i64::MAX), Value::Int(1)).is_err());
        assert!(matches!(
            binop(BinOp::Sub, Value::str("a"), Value::Int(1)),
            Err(Error::BadOperand { op: "-", .. })
        ));
    }

    #[test]
    fn test_comparison() {
        assert_eq!(
            binop(BinOp::Eq, Value::Int(1), Value::Float(1.0)).unwrap(),
            Value::Bool(true),
        );
        assert_eq!(
            binop(BinOp::Lt, Value::str("a"), Value::str("b")).unwrap(),
            Value::Bool(true),
        );
        assert_eq!(
            binop(BinOp::Ge, Value::Int(2), Value::Float(2.5)).unwrap(),
            Value::Bool(false),
        );
        assert!(binop(BinOp::Lt, Value::Nil, Value::Int(1)).is_err());
    }

    #[test]
    fn test_concat_and_range() {
        assert_eq!(
            binop(BinOp::Concat, Value::str("a"), Value::str("b")).unwrap(),
            Value::str("ab"),
        );
        assert_eq!(
            binop(BinOp::Range, Value::Int(1), Value::Int(3)).unwrap(),
            Value::from(vec![1, 2, 3]),
        );
        assert_eq!(
            binop(BinOp::Range, Value::Int(2), Value::Int(0)).unwrap(),
            Value::from(vec![2, 1, 0]),
        );
    }

    #[test]
    fn test_range_length_is_capped() {
        let last = MAX_RANGE_LEN as i64;
        match binop(BinOp::Range, Value::Int(1), Value::Int(last)).unwrap() {
            Value::List(items) => assert_eq!(items.len(), MAX_RANGE_LEN as usize),
            other => panic!("expected a list, got {other}"),
        }
        assert!(matches!(
            binop(BinOp::Range, Value::Int(0), Value::Int(last)),
            Err(Error::BadOperand { op: "..", .. })
        ));
        assert!(binop(BinOp::Range, Value::Int(0), Value::Int(i64::MAX)).is_err());
        assert!(binop(BinOp::Range, Value::Int(i64::MAX), Value::Int(i64::MIN)).is_err());
    }

    #[test]
    fn test_push_do() {
        let body = Value::Safe(Safe::raw("x"));
        let mut args = vec![Value::str("/"), Value::keywords([("method", "put")])];
        push_do(&mut args, body.clone());
        assert_eq!(args.len(), 2);
        assert_eq!(args[1].field("do").unwrap(), body);

        let mut args = vec![Value::atom("div")];
        push_do(&mut args, body.clone());
        assert_eq!(args[1], Value::keywords([("do", body)]));
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOp::Not, Value::Nil).unwrap(), Value::Bool(true));
        assert_eq!(unary(UnaryOp::Neg, Value::Int(3)).unwrap(), Value::Int(-3));
        assert!(unary(UnaryOp::Neg, Value::str("x")).is_err());
    }
}
