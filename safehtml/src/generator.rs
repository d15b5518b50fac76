use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use safehtml_parser::{
    CallBlock, Case, Expr, For, If, Node, Pattern as AstPattern, PatternLit,
};

use crate::environment::Functions;
use crate::escaping::{literal, num_value};
use crate::program::{self, BinOp, Block, FunctionRef, Pattern, Program, Slot, Stmt, UnaryOp};
use crate::unescape::unescape;
use crate::value::Value;
use crate::{Error, Result};

/// Compiles parsed nodes into a [`Program`].
///
/// Printed expressions get a numbered temporary and a slot in the current
/// block; literal text and literal expressions become static slots that
/// are fused with their neighbours once the block is done.
pub(crate) struct Generator<'f, 'a> {
    functions: &'f Functions,
    // Statements of the block being built
    stmts: Vec<Stmt>,
    // Output slots of the block being built
    slots: Vec<Slot>,
    // Temporaries handed out so far, across all blocks
    vars: usize,
    // Locals handed out so far, across all blocks
    next_local: usize,
    locals: MapChain<'a>,
    // Names bound so far by the pattern being compiled
    bound: HashMap<&'a str, usize>,
}

impl<'f, 'a> Generator<'f, 'a> {
    pub(crate) fn new(functions: &'f Functions) -> Self {
        Self {
            functions,
            stmts: Vec::new(),
            slots: Vec::new(),
            vars: 0,
            next_local: 0,
            locals: MapChain::default(),
            bound: HashMap::new(),
        }
    }

    pub(crate) fn build(mut self, nodes: &'a [Node<'a>]) -> Result<Program> {
        self.handle(nodes)?;
        let block = Block {
            stmts: mem::take(&mut self.stmts),
            slots: fuse(mem::take(&mut self.slots)),
        };
        Ok(Program {
            block,
            temps: self.vars,
            locals: self.next_local,
        })
    }

    fn handle(&mut self, nodes: &'a [Node<'a>]) -> Result<()> {
        for node in nodes {
            match node {
                Node::Lit(text) => self.write_lit(text),
                Node::Comment(_) => {}
                Node::Expr(expr) => self.write_expr(expr)?,
                Node::Silent(expr) => {
                    let expr = self.visit_expr(expr)?;
                    self.stmts.push(Stmt::Eval(expr));
                }
                Node::Let(pattern, expr) => self.write_let(pattern, expr)?,
            }
        }
        Ok(())
    }

    fn write_lit(&mut self, text: &str) {
        if !text.is_empty() {
            self.slots.push(Slot::Static(text.into()));
        }
    }

    fn write_expr(&mut self, expr: &'a Expr<'a>) -> Result<()> {
        if let Some(text) = literal(expr) {
            self.write_lit(&text);
            return Ok(());
        }

        let expr = self.visit_expr(expr)?;
        let temp = self.vars;
        self.vars += 1;
        self.stmts.push(Stmt::Print { temp, expr });
        self.slots.push(Slot::Temp(temp));
        Ok(())
    }

    fn write_let(&mut self, pattern: &'a AstPattern<'a>, expr: &'a Expr<'a>) -> Result<()> {
        // The right hand side still sees the previous bindings.
        let expr = self.visit_expr(expr)?;
        let pattern = self.visit_pattern(pattern)?;
        self.stmts.push(Stmt::Bind { pattern, expr });
        Ok(())
    }

    /// Builds `nodes` into their own block. Names bound by `pattern`, and
    /// by any `=` inside the block, are not visible after it.
    fn write_block(
        &mut self,
        pattern: Option<&'a AstPattern<'a>>,
        nodes: &'a [Node<'a>],
    ) -> Result<(Option<Pattern>, Block)> {
        let stmts = mem::take(&mut self.stmts);
        let slots = mem::take(&mut self.slots);
        self.locals.push();

        let res = match pattern {
            Some(pattern) => self.visit_pattern(pattern).map(Some),
            None => Ok(None),
        }
        .and_then(|pattern| self.handle(nodes).map(|()| pattern));

        self.locals.pop();
        let block = Block {
            stmts: mem::replace(&mut self.stmts, stmts),
            slots: fuse(mem::replace(&mut self.slots, slots)),
        };
        res.map(|pattern| (pattern, block))
    }

    fn write_cond(&mut self, cond: &'a If<'a>) -> Result<program::Expr> {
        let expr = self.visit_expr(&cond.cond)?;
        let (_, then) = self.write_block(None, &cond.then)?;
        let (_, otherwise) = self.write_block(None, &cond.otherwise)?;
        Ok(program::Expr::If {
            negated: cond.negated,
            cond: Box::new(expr),
            then,
            otherwise,
        })
    }

    fn write_loop(&mut self, loop_block: &'a For<'a>) -> Result<program::Expr> {
        let iter = self.visit_expr(&loop_block.iter)?;
        let (pattern, body) = self.write_block(Some(&loop_block.pattern), &loop_block.body)?;
        Ok(program::Expr::For {
            pattern: pattern.unwrap_or(Pattern::Wildcard),
            iter: Box::new(iter),
            body,
        })
    }

    fn write_match(&mut self, case: &'a Case<'a>) -> Result<program::Expr> {
        let expr = self.visit_expr(&case.expr)?;
        let mut clauses = Vec::with_capacity(case.clauses.len());
        for clause in &case.clauses {
            let (pattern, block) = self.write_block(Some(&clause.pattern), &clause.nodes)?;
            clauses.push((pattern.unwrap_or(Pattern::Wildcard), block));
        }
        Ok(program::Expr::Case {
            expr: Box::new(expr),
            clauses,
        })
    }

    fn write_call_block(&mut self, call: &'a CallBlock<'a>) -> Result<program::Expr> {
        let func = self.function(call.name)?;
        let args = self.visit_args(&call.args)?;
        let (_, body) = self.write_block(None, &call.body)?;
        Ok(program::Expr::CallBlock { func, args, body })
    }

    fn visit_expr(&mut self, expr: &'a Expr<'a>) -> Result<program::Expr> {
        Ok(match expr {
            Expr::Nil => program::Expr::Const(Value::Nil),
            Expr::BoolLit(b) => program::Expr::Const(Value::Bool(*b == "true")),
            Expr::NumLit(n) => self.visit_num_lit(n)?,
            Expr::StrLit(s) => self.visit_str_lit(s)?,
            Expr::Atom(a) => program::Expr::Const(Value::atom(*a)),
            Expr::Assign(name) => program::Expr::Assign(Arc::from(*name)),
            Expr::Var(name) => self.visit_var(name)?,
            Expr::List(items) => program::Expr::List(self.visit_args(items)?),
            Expr::Tuple(items) => program::Expr::Tuple(self.visit_args(items)?),
            Expr::Attr(obj, name) => self.visit_attr(obj, name)?,
            Expr::Index(obj, key) => self.visit_index(obj, key)?,
            Expr::Call(name, args) => {
                let func = self.function(name)?;
                program::Expr::Call(func, self.visit_args(args)?)
            }
            Expr::Unary(op, inner) => self.visit_unary(op, inner)?,
            Expr::BinOp(op, left, right) => self.visit_binop(op, left, right)?,
            Expr::Group(inner) => self.visit_expr(inner)?,
            Expr::If(cond) => self.write_cond(cond)?,
            Expr::For(loop_block) => self.write_loop(loop_block)?,
            Expr::Case(case) => self.write_match(case)?,
            Expr::CallBlock(call) => self.write_call_block(call)?,
        })
    }

    fn visit_args(&mut self, args: &'a [Expr<'a>]) -> Result<Vec<program::Expr>> {
        args.iter().map(|arg| self.visit_expr(arg)).collect()
    }

    fn visit_var(&mut self, name: &str) -> Result<program::Expr> {
        match self.locals.get(name) {
            Some(idx) => Ok(program::Expr::Local(idx)),
            None => Err(Error::Compile(format!(
                "undefined variable `{name}`; assigns are referenced as `@{name}`"
            ))),
        }
    }

    fn visit_attr(&mut self, obj: &'a Expr<'a>, name: &str) -> Result<program::Expr> {
        let obj = self.visit_expr(obj)?;
        Ok(program::Expr::Attr(Box::new(obj), Arc::from(name)))
    }

    fn visit_index(&mut self, obj: &'a Expr<'a>, key: &'a Expr<'a>) -> Result<program::Expr> {
        let obj = self.visit_expr(obj)?;
        let key = self.visit_expr(key)?;
        Ok(program::Expr::Index(Box::new(obj), Box::new(key)))
    }

    fn visit_unary(&mut self, op: &str, inner: &'a Expr<'a>) -> Result<program::Expr> {
        let op = match op {
            "!" | "not" => UnaryOp::Not,
            "-" => UnaryOp::Neg,
            _ => return Err(Error::Compile(format!("unsupported unary operator `{op}`"))),
        };
        let inner = self.visit_expr(inner)?;
        Ok(program::Expr::Unary(op, Box::new(inner)))
    }

    fn visit_binop(
        &mut self,
        op: &str,
        left: &'a Expr<'a>,
        right: &'a Expr<'a>,
    ) -> Result<program::Expr> {
        let op = BinOp::from_op(op)
            .ok_or_else(|| Error::Compile(format!("unsupported operator `{op}`")))?;
        let left = self.visit_expr(left)?;
        let right = self.visit_expr(right)?;
        Ok(program::Expr::BinOp(op, Box::new(left), Box::new(right)))
    }

    fn visit_str_lit(&mut self, s: &str) -> Result<program::Expr> {
        str_value(s).map(program::Expr::Const)
    }

    fn visit_num_lit(&mut self, n: &str) -> Result<program::Expr> {
        num_value(n).map(program::Expr::Const).map_err(Error::Compile)
    }

    /// Compiles a pattern, declaring the names it binds in the current scope.
    /// A name used twice only matches when both places hold equal values.
    fn visit_pattern(&mut self, pattern: &'a AstPattern<'a>) -> Result<Pattern> {
        self.bound.clear();
        let pattern = self.visit_target(pattern);
        self.bound.clear();
        pattern
    }

    fn visit_target(&mut self, pattern: &'a AstPattern<'a>) -> Result<Pattern> {
        Ok(match pattern {
            AstPattern::Wildcard => Pattern::Wildcard,
            AstPattern::Name(name) => match self.bound.get(name) {
                Some(&idx) => Pattern::Same(idx),
                None => {
                    let idx = self.next_local;
                    self.next_local += 1;
                    self.locals.insert(*name, idx);
                    self.bound.insert(*name, idx);
                    Pattern::Bind(idx)
                }
            },
            AstPattern::Lit(lit) => Pattern::Const(match lit {
                PatternLit::Nil => Value::Nil,
                PatternLit::Bool(b) => Value::Bool(*b == "true"),
                PatternLit::Num(n) => num_value(n).map_err(Error::Compile)?,
                PatternLit::Str(s) => str_value(s)?,
                PatternLit::Atom(a) => Value::atom(*a),
            }),
            AstPattern::Tuple(items) => Pattern::Tuple(self.visit_targets(items)?),
            AstPattern::List(items) => Pattern::List(self.visit_targets(items)?),
        })
    }

    fn visit_targets(&mut self, patterns: &'a [AstPattern<'a>]) -> Result<Vec<Pattern>> {
        patterns.iter().map(|p| self.visit_target(p)).collect()
    }

    fn function(&self, name: &str) -> Result<FunctionRef> {
        match self.functions.get(name) {
            Some(func) => Ok(FunctionRef {
                name: Arc::from(name),
                func: Arc::clone(func),
            }),
            None => Err(Error::Compile(format!("undefined function `{name}`"))),
        }
    }
}

fn str_value(s: &str) -> Result<Value> {
    unescape(s)
        .map(Value::Str)
        .map_err(|e| Error::Compile(format!("invalid string literal \"{s}\": {e}")))
}

/// Merges runs of adjacent static slots into one.
fn fuse(slots: Vec<Slot>) -> Vec<Slot> {
    let mut fused = Vec::with_capacity(slots.len());
    let mut text = String::new();
    let mut run = 0;
    let mut last = None;

    for slot in slots {
        match slot {
            Slot::Static(s) => {
                run += 1;
                text.push_str(&s);
                last = Some(s);
            }
            temp @ Slot::Temp(_) => {
                flush(&mut fused, &mut text, &mut run, &mut last);
                fused.push(temp);
            }
        }
    }
    flush(&mut fused, &mut text, &mut run, &mut last);
    fused
}

fn flush(fused: &mut Vec<Slot>, text: &mut String, run: &mut usize, last: &mut Option<Arc<str>>) {
    match (mem::take(run), last.take()) {
        (0, _) => {}
        // A lone static keeps its allocation.
        (1, Some(s)) => fused.push(Slot::Static(s)),
        _ => fused.push(Slot::Static(Arc::from(text.as_str()))),
    }
    text.clear();
}

/// Scoped map from local names to their frame slots.
struct MapChain<'a> {
    scopes: Vec<HashMap<&'a str, usize>>,
}

impl Default for MapChain<'_> {
    fn default() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }
}

impl<'a> MapChain<'a> {
    fn get(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn insert(&mut self, name: &'a str, idx: usize) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, idx);
        }
    }

    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }
}
