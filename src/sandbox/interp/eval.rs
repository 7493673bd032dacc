//! Tree-walking evaluator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;

use super::ast::*;
use super::error::{Eval, Fault, is_exception_kind};
use super::format::format_value;
use super::lower::lower_module;
use super::value::{Args, Closure, Dict, Method, Shared, Value, range_len, shared};
use super::{builtins, methods, modules, ops, pandas, plot};

const MAX_CALL_DEPTH: usize = 200;

/// One level of name bindings. Function calls chain to their defining scope.
pub struct Scope {
    vars: RefCell<IndexMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(IndexMap::new()),
            parent: None,
        })
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(IndexMap::new()),
            parent: Some(parent.clone()),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.vars.borrow().get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.vars.borrow_mut().shift_remove(name).is_some()
    }

    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.vars
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Drop every binding. Breaks closure cycles before the interpreter goes away.
    pub fn clear(&self) {
        self.vars.borrow_mut().clear();
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

pub struct Interpreter {
    globals: Rc<Scope>,
    stdout: String,
    ops: u64,
    max_ops: u64,
    depth: usize,
    output_dir: PathBuf,
    handling: Vec<Fault>,
    modules: HashMap<String, Value>,
    pub(super) figure: Option<Shared<plot::Figure>>,
}

impl Interpreter {
    pub fn new(output_dir: PathBuf, max_ops: u64) -> Self {
        Self {
            globals: Scope::root(),
            stdout: String::new(),
            ops: 0,
            max_ops,
            depth: 0,
            output_dir: normalize(&output_dir),
            handling: Vec::new(),
            modules: HashMap::new(),
            figure: None,
        }
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        self.globals.set(name, value);
    }

    /// Parse and run a snippet in the global scope.
    pub fn run(&mut self, source: &str) -> Eval<()> {
        let module = lower_module(source)?;
        let globals = self.globals.clone();
        match self.exec_block(&module, &globals)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(Fault::syntax("'return' outside function", 1)),
            Flow::Break | Flow::Continue => {
                Err(Fault::syntax("'break' or 'continue' outside loop", 1))
            }
        }
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn take_stdout(&mut self) -> String {
        std::mem::take(&mut self.stdout)
    }

    /// Global bindings in definition order.
    pub fn locals(&self) -> Vec<(String, Value)> {
        self.globals.snapshot()
    }

    pub fn operations(&self) -> u64 {
        self.ops
    }

    pub fn write(&mut self, text: &str) {
        self.stdout.push_str(text);
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Map a user-supplied path to a file directly inside the output directory.
    pub fn resolve_output_path(&self, path: &Value) -> Eval<PathBuf> {
        let text = path.expect_str("path")?;
        let raw = Path::new(&*text);
        let joined = if raw.is_absolute() { raw.to_path_buf() } else { self.output_dir.join(raw) };
        let resolved = normalize(&joined);
        if resolved.parent() != Some(self.output_dir.as_path()) {
            return Err(Fault::new(
                "PermissionError",
                format!("files may only be written directly inside output_dir, not '{}'", text),
            ));
        }
        Ok(resolved)
    }

    pub fn write_output(&self, path: &Value, bytes: &[u8]) -> Eval<PathBuf> {
        let target = self.resolve_output_path(path)?;
        std::fs::write(&target, bytes).map_err(|e| {
            Fault::new("OSError", format!("could not write '{}': {}", target.display(), e))
        })?;
        Ok(target)
    }

    fn tick(&mut self) -> Eval<()> {
        self.charge(1)
    }

    /// Spend `n` operations from the budget.
    pub fn charge(&mut self, n: u64) -> Eval<()> {
        self.ops = self.ops.saturating_add(n);
        if self.ops > self.max_ops {
            return Err(Fault::fatal("RuntimeError", "operation budget exhausted"));
        }
        Ok(())
    }

    pub(super) fn cached_module(&self, name: &str) -> Option<Value> {
        self.modules.get(name).cloned()
    }

    pub(super) fn cache_module(&mut self, name: &str, module: Value) {
        self.modules.insert(name.to_string(), module);
    }

    fn exec_block(&mut self, stmts: &[Stmt], scope: &Rc<Scope>) -> Eval<Flow> {
        for stmt in stmts {
            let flow = self.exec_stmt(stmt, scope).map_err(|f| f.at_line(stmt.line))?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Eval<Flow> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                self.aug_assign(target, *op, value, scope)?
            }
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test, scope)?.truth()? { body } else { orelse };
                return self.exec_block(branch, scope);
            }
            StmtKind::While { test, body, orelse } => {
                loop {
                    if !self.eval(test, scope)?.truth()? {
                        return self.exec_block(orelse, scope);
                    }
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::For { target, iter, body, orelse } => {
                let iterable = self.eval(iter, scope)?;
                let mut items = self.iter_lazy(&iterable)?;
                let mut broke = false;
                while let Some(item) = items.next() {
                    self.tick()?;
                    self.assign(target, item, scope)?;
                    match self.exec_block(body, scope)? {
                        Flow::Break => {
                            broke = true;
                            break;
                        }
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                if !broke {
                    return self.exec_block(orelse, scope);
                }
            }
            StmtKind::FunctionDef(def) => {
                let closure = self.make_closure(def, scope)?;
                scope.set(&def.name, closure);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, scope),
            StmtKind::Raise(expr) => return Err(self.raise(expr.as_ref(), scope)?),
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, scope)?.truth()? {
                    let message = match msg {
                        Some(m) => self.eval(m, scope)?.to_str(),
                        None => String::new(),
                    };
                    return Err(Fault::new("AssertionError", message));
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
            StmtKind::Import(names) => {
                for item in names {
                    match &item.alias {
                        Some(alias) => {
                            let module = modules::import(self, &item.name)?;
                            scope.set(alias, module);
                        }
                        None => {
                            modules::import(self, &item.name)?;
                            let top = item.name.split('.').next().unwrap_or(&item.name);
                            let module = modules::import(self, top)?;
                            scope.set(top, module);
                        }
                    }
                }
            }
            StmtKind::ImportFrom { module, names, star } => {
                let source = modules::import(self, module)?;
                let Value::Module(m) = &source else {
                    return Err(Fault::new("ImportError", format!("'{}' is not a module", module)));
                };
                if *star {
                    for (name, value) in &m.attrs {
                        scope.set(name, value.clone());
                    }
                }
                for item in names {
                    let value = match m.attrs.get(&item.name) {
                        Some(v) => v.clone(),
                        None => {
                            let path = format!("{}.{}", module, item.name);
                            modules::import(self, &path).map_err(|_| {
                                Fault::new(
                                    "ImportError",
                                    format!("cannot import name '{}' from '{}'", item.name, module),
                                )
                            })?
                        }
                    };
                    scope.set(item.alias.as_deref().unwrap_or(&item.name), value);
                }
            }
            StmtKind::With { items, body } => {
                for (expr, target) in items {
                    let value = self.eval(expr, scope)?;
                    if let Some(target) = target {
                        self.assign(target, value, scope)?;
                    }
                }
                return self.exec_block(body, scope);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[Handler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        scope: &Rc<Scope>,
    ) -> Eval<Flow> {
        let outcome = match self.exec_block(body, scope) {
            Ok(Flow::Normal) => self.exec_block(orelse, scope),
            Ok(flow) => Ok(flow),
            Err(fault) if fault.fatal => Err(fault),
            Err(fault) => self.handle(fault, handlers, scope),
        };

        if finalbody.is_empty() {
            return outcome;
        }
        match self.exec_block(finalbody, scope)? {
            Flow::Normal => outcome,
            overriding => Ok(overriding),
        }
    }

    fn handle(&mut self, fault: Fault, handlers: &[Handler], scope: &Rc<Scope>) -> Eval<Flow> {
        for handler in handlers {
            let matched = match &handler.kind {
                None => true,
                Some(expr) => {
                    let kind = self.eval(expr, scope)?;
                    exception_matches(&fault, &kind)?
                }
            };
            if !matched {
                continue;
            }
            if let Some(name) = &handler.name {
                scope.set(name, Value::Exception(Rc::new(fault.clone())));
            }
            self.handling.push(fault);
            let result = self.exec_block(&handler.body, scope);
            self.handling.pop();
            return result;
        }
        Err(fault)
    }

    fn raise(&mut self, expr: Option<&Expr>, scope: &Rc<Scope>) -> Eval<Fault> {
        let Some(expr) = expr else {
            return Ok(self
                .handling
                .last()
                .cloned()
                .unwrap_or_else(|| Fault::new("RuntimeError", "No active exception to reraise")));
        };
        Ok(match self.eval(expr, scope)? {
            Value::Exception(fault) => {
                let mut fault = (*fault).clone();
                fault.line = None;
                fault
            }
            Value::Class(name) if is_exception_kind(&name) => Fault::new(&*name, ""),
            other => Fault::type_error(format!(
                "exceptions must derive from BaseException, not '{}'",
                other.type_name()
            )),
        })
    }

    fn make_closure(&mut self, def: &Rc<FunctionDef>, scope: &Rc<Scope>) -> Eval<Value> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr, scope)?),
                None => None,
            });
        }
        Ok(Value::Function(Rc::new(Closure {
            def: def.clone(),
            defaults,
            scope: scope.clone(),
        })))
    }

    fn aug_assign(
        &mut self,
        target: &Target,
        op: BinOp,
        value: &Expr,
        scope: &Rc<Scope>,
    ) -> Eval<()> {
        let current = match target {
            Target::Name(name) => self.lookup(name, scope)?,
            Target::Attribute(obj, attr) => {
                let obj = self.eval(obj, scope)?;
                self.get_attr(&obj, attr)?
            }
            Target::Subscript(obj, index) => {
                let obj = self.eval(obj, scope)?;
                let index = self.eval(index, scope)?;
                self.get_item(&obj, &index)?
            }
            _ => return Err(Fault::syntax("illegal expression for augmented assignment", 1)),
        };
        let rhs = self.eval(value, scope)?;

        // Lists extend in place, so aliases observe the change.
        if op == BinOp::Add
            && let Value::List(list) = &current
        {
            let extra = self.iterate(&rhs)?;
            list.borrow_mut().extend(extra);
            return Ok(());
        }

        let updated = ops::binary(op, &current, &rhs)?;
        self.assign(target, updated, scope)
    }

    fn assign(&mut self, target: &Target, value: Value, scope: &Rc<Scope>) -> Eval<()> {
        match target {
            Target::Name(name) => {
                scope.set(name, value);
                Ok(())
            }
            Target::Attribute(obj, attr) => {
                let obj = self.eval(obj, scope)?;
                if let Value::Frame(frame) = &obj {
                    return pandas::set_attr(self, frame, attr, value);
                }
                Err(Fault::attribute_error(format!(
                    "cannot set attribute '{}' on '{}' object",
                    attr,
                    obj.type_name()
                )))
            }
            Target::Subscript(obj, index) => {
                let obj = self.eval(obj, scope)?;
                let index = self.eval(index, scope)?;
                self.set_item(&obj, &index, value)
            }
            Target::Tuple(targets) => {
                let items = self.iterate(&value)?;
                let starred = targets.iter().position(|t| matches!(t, Target::Starred(_)));
                match starred {
                    None => {
                        if items.len() != targets.len() {
                            return Err(Fault::value_error(if items.len() < targets.len() {
                                format!(
                                    "not enough values to unpack (expected {}, got {})",
                                    targets.len(),
                                    items.len()
                                )
                            } else {
                                format!("too many values to unpack (expected {})", targets.len())
                            }));
                        }
                        for (t, v) in targets.iter().zip(items) {
                            self.assign(t, v, scope)?;
                        }
                    }
                    Some(star) => {
                        let after = targets.len() - star - 1;
                        if items.len() < star + after {
                            return Err(Fault::value_error(format!(
                                "not enough values to unpack (expected at least {}, got {})",
                                star + after,
                                items.len()
                            )));
                        }
                        let middle_end = items.len() - after;
                        for (t, v) in targets[..star].iter().zip(items[..star].iter()) {
                            self.assign(t, v.clone(), scope)?;
                        }
                        let starred = Value::list(items[star..middle_end].to_vec());
                        self.assign(&targets[star], starred, scope)?;
                        for (t, v) in targets[star + 1..].iter().zip(items[middle_end..].iter()) {
                            self.assign(t, v.clone(), scope)?;
                        }
                    }
                }
                Ok(())
            }
            Target::Starred(inner) => self.assign(inner, value, scope),
        }
    }

    fn delete(&mut self, target: &Target, scope: &Rc<Scope>) -> Eval<()> {
        match target {
            Target::Name(name) => {
                if scope.remove(name) {
                    Ok(())
                } else {
                    Err(Fault::name_error(name))
                }
            }
            Target::Subscript(obj, index) => {
                let obj = self.eval(obj, scope)?;
                let index = self.eval(index, scope)?;
                self.del_item(&obj, &index)
            }
            Target::Tuple(items) => {
                for item in items {
                    self.delete(item, scope)?;
                }
                Ok(())
            }
            _ => Err(Fault::syntax("cannot delete this target", 1)),
        }
    }

    fn lookup(&self, name: &str, scope: &Rc<Scope>) -> Eval<Value> {
        if let Some(value) = scope.lookup(name) {
            return Ok(value);
        }
        builtins::lookup(name).ok_or_else(|| Fault::name_error(name))
    }

    pub fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Eval<Value> {
        self.tick()?;
        Ok(match expr {
            Expr::Const(c) => match c {
                Const::None => Value::None,
                Const::Bool(b) => Value::Bool(*b),
                Const::Int(i) => Value::Int(*i),
                Const::Float(f) => Value::Float(*f),
                Const::Str(s) => Value::Str(s.clone()),
            },
            Expr::Name(name) => self.lookup(name, scope)?,
            Expr::FString(parts) => Value::str(&self.fstring(parts, scope)?),
            Expr::BinOp(left, op, right) => {
                let l = self.eval(left, scope)?;
                let r = self.eval(right, scope)?;
                ops::binary(*op, &l, &r)?
            }
            Expr::Unary(op, operand) => {
                let v = self.eval(operand, scope)?;
                ops::unary(*op, &v)?
            }
            Expr::And(left, right) => {
                let l = self.eval(left, scope)?;
                if l.truth()? { self.eval(right, scope)? } else { l }
            }
            Expr::Or(left, right) => {
                let l = self.eval(left, scope)?;
                if l.truth()? { l } else { self.eval(right, scope)? }
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first, scope)?;
                if rest.len() == 1 {
                    let right = self.eval(&rest[0].1, scope)?;
                    return ops::compare(rest[0].0, &left, &right);
                }
                for (op, right) in rest {
                    let right = self.eval(right, scope)?;
                    if !ops::compare(*op, &left, &right)?.truth()? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Value::Bool(true)
            }
            Expr::Call(func, args) => {
                let args = self.eval_args(args, scope)?;
                if let Expr::Attribute(obj, name) = func.as_ref() {
                    let receiver = self.eval(obj, scope)?;
                    if !matches!(receiver, Value::Module(_) | Value::Class(_)) {
                        return self.call_method(&receiver, name, args);
                    }
                    let callee = self.get_attr(&receiver, name)?;
                    return self.call_value(&callee, args);
                }
                let callee = self.eval(func, scope)?;
                self.call_value(&callee, args)?
            }
            Expr::Attribute(obj, name) => {
                let obj = self.eval(obj, scope)?;
                self.get_attr(&obj, name)?
            }
            Expr::Subscript(obj, index) => {
                let obj = self.eval(obj, scope)?;
                let index = self.eval(index, scope)?;
                self.get_item(&obj, &index)?
            }
            Expr::Slice(start, stop, step) => {
                let mut index_of = |e: &Option<Box<Expr>>| -> Eval<Option<i64>> {
                    match e {
                        None => Ok(None),
                        Some(e) => match self.eval(e, scope)? {
                            Value::None => Ok(None),
                            v => Ok(Some(v.expect_int("slice indices")?)),
                        },
                    }
                };
                Value::Slice(index_of(start)?, index_of(stop)?, index_of(step)?)
            }
            Expr::List(items) => Value::list(self.eval_items(items, scope)?),
            Expr::Tuple(items) => Value::tuple(self.eval_items(items, scope)?),
            Expr::Set(items) => {
                let values = self.eval_items(items, scope)?;
                builtins::make_set(values)?
            }
            Expr::Dict(items) => {
                let mut dict = Dict::new();
                for item in items {
                    match item {
                        DictItem::Pair(k, v) => {
                            let key = self.eval(k, scope)?;
                            let value = self.eval(v, scope)?;
                            dict.insert(key, value)?;
                        }
                        DictItem::Splat(e) => match self.eval(e, scope)? {
                            Value::Dict(other) => {
                                for (k, v) in other.borrow().items() {
                                    dict.insert(k, v)?;
                                }
                            }
                            other => {
                                return Err(Fault::type_error(format!(
                                    "'{}' object is not a mapping",
                                    other.type_name()
                                )));
                            }
                        },
                    }
                }
                Value::dict(dict)
            }
            Expr::Starred(_) => return Err(Fault::syntax("can't use starred expression here", 1)),
            Expr::ListComp(body, gens) => {
                let mut out = Vec::new();
                let inner = Scope::child(scope);
                self.comprehension(gens, &inner, &mut |interp: &mut Interpreter, s: &Rc<Scope>| {
                    out.push(interp.eval(body, s)?);
                    Ok(())
                })?;
                Value::list(out)
            }
            Expr::SetComp(body, gens) => {
                let mut out = Vec::new();
                let inner = Scope::child(scope);
                self.comprehension(gens, &inner, &mut |interp: &mut Interpreter, s: &Rc<Scope>| {
                    out.push(interp.eval(body, s)?);
                    Ok(())
                })?;
                builtins::make_set(out)?
            }
            Expr::DictComp(key, value, gens) => {
                let mut dict = Dict::new();
                let inner = Scope::child(scope);
                self.comprehension(gens, &inner, &mut |interp: &mut Interpreter, s: &Rc<Scope>| {
                    let k = interp.eval(key, s)?;
                    let v = interp.eval(value, s)?;
                    dict.insert(k, v)
                })?;
                Value::dict(dict)
            }
            Expr::Lambda(def) => self.make_closure(def, scope)?,
            Expr::IfExp(test, body, orelse) => {
                if self.eval(test, scope)?.truth()? {
                    self.eval(body, scope)?
                } else {
                    self.eval(orelse, scope)?
                }
            }
            Expr::Named(name, value) => {
                let value = self.eval(value, scope)?;
                scope.set(name, value.clone());
                value
            }
        })
    }

    fn comprehension(
        &mut self,
        gens: &[Comprehension],
        scope: &Rc<Scope>,
        emit: &mut dyn FnMut(&mut Interpreter, &Rc<Scope>) -> Eval<()>,
    ) -> Eval<()> {
        let Some((first, rest)) = gens.split_first() else {
            return emit(self, scope);
        };
        let iterable = self.eval(&first.iter, scope)?;
        let mut items = self.iter_lazy(&iterable)?;
        'outer: while let Some(item) = items.next() {
            self.tick()?;
            self.assign(&first.target, item, scope)?;
            for cond in &first.ifs {
                if !self.eval(cond, scope)?.truth()? {
                    continue 'outer;
                }
            }
            self.comprehension(rest, scope, emit)?;
        }
        Ok(())
    }

    fn eval_items(&mut self, items: &[Expr], scope: &Rc<Scope>) -> Eval<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let Expr::Starred(inner) = item {
                let value = self.eval(inner, scope)?;
                out.extend(self.iterate(&value)?);
            } else {
                out.push(self.eval(item, scope)?);
            }
        }
        Ok(out)
    }

    fn eval_args(&mut self, args: &[Arg], scope: &Rc<Scope>) -> Eval<Args> {
        let mut out = Args::default();
        for arg in args {
            match arg {
                Arg::Pos(e) => out.pos.push(self.eval(e, scope)?),
                Arg::Star(e) => {
                    let value = self.eval(e, scope)?;
                    out.pos.extend(self.iterate(&value)?);
                }
                Arg::Kw(name, e) => out.kw.push((name.clone(), self.eval(e, scope)?)),
                Arg::DoubleStar(e) => match self.eval(e, scope)? {
                    Value::Dict(d) => {
                        for (k, v) in d.borrow().items() {
                            let key = k.expect_str("keywords")?;
                            out.kw.push((key.to_string(), v));
                        }
                    }
                    other => {
                        return Err(Fault::type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            other.type_name()
                        )));
                    }
                },
            }
        }
        Ok(out)
    }

    fn fstring(&mut self, parts: &[FPart], scope: &Rc<Scope>) -> Eval<String> {
        let mut out = String::new();
        for part in parts {
            match part {
                FPart::Lit(text) => out.push_str(text),
                FPart::Expr {
                    expr,
                    conversion,
                    spec,
                    echo,
                } => {
                    let value = self.eval(expr, scope)?;
                    let spec = self.fstring(spec, scope)?;
                    if let Some(echo) = echo {
                        out.push_str(echo);
                    }
                    let converted = match conversion {
                        Some('r') | Some('a') => Value::str(&value.repr()),
                        Some('s') => Value::str(&value.to_str()),
                        _ => value,
                    };
                    out.push_str(&format_value(&converted, &spec)?);
                }
            }
        }
        Ok(out)
    }

    pub fn call_value(&mut self, callee: &Value, args: Args) -> Eval<Value> {
        match callee {
            Value::Function(closure) => self.call_function(closure, args),
            Value::Builtin(builtin) => (builtin.func)(self, args),
            Value::Method(method) => {
                let receiver = method.receiver.clone();
                let name = method.name.clone();
                self.call_method(&receiver, &name, args)
            }
            Value::Class(name) => {
                if is_exception_kind(name) {
                    let message = match args.pos.len() {
                        0 => String::new(),
                        1 => args.pos[0].to_str(),
                        _ => Value::tuple(args.pos.clone()).repr(),
                    };
                    Ok(Value::Exception(Rc::new(Fault::new(&**name, message))))
                } else {
                    match builtins::lookup(name).or_else(|| modules::constructor(name)) {
                        Some(ctor @ Value::Builtin(_)) => self.call_value(&ctor, args),
                        _ => Err(Fault::type_error(format!("cannot create '{}' instances", name))),
                    }
                }
            }
            other => Err(Fault::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(&mut self, closure: &Rc<Closure>, args: Args) -> Eval<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Fault::new("RecursionError", "maximum recursion depth exceeded"));
        }
        let def = &closure.def;
        let scope = Scope::child(&closure.scope);
        let mut bound = vec![false; def.params.len()];

        let mut extra = Vec::new();
        for (i, value) in args.pos.into_iter().enumerate() {
            if i < def.params.len() {
                scope.set(&def.params[i].name, value);
                bound[i] = true;
            } else {
                extra.push(value);
            }
        }
        if !extra.is_empty() && def.vararg.is_none() {
            return Err(Fault::type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                def.name,
                def.params.len(),
                def.params.len() + extra.len()
            )));
        }
        if let Some(vararg) = &def.vararg {
            scope.set(vararg, Value::tuple(extra));
        }

        let mut kwargs = Dict::new();
        for (name, value) in args.kw {
            match def.params.iter().position(|p| p.name == name) {
                Some(i) if bound[i] => {
                    return Err(Fault::type_error(format!(
                        "{}() got multiple values for argument '{}'",
                        def.name, name
                    )));
                }
                Some(i) => {
                    scope.set(&name, value);
                    bound[i] = true;
                }
                None if def.kwarg.is_some() => kwargs.insert(Value::str(&name), value)?,
                None => {
                    return Err(Fault::type_error(format!(
                        "{}() got an unexpected keyword argument '{}'",
                        def.name, name
                    )));
                }
            }
        }
        if let Some(kwarg) = &def.kwarg {
            scope.set(kwarg, Value::dict(kwargs));
        }

        for (i, param) in def.params.iter().enumerate() {
            if bound[i] {
                continue;
            }
            match &closure.defaults[i] {
                Some(default) => scope.set(&param.name, default.clone()),
                None => {
                    return Err(Fault::type_error(format!(
                        "{}() missing 1 required positional argument: '{}'",
                        def.name, param.name
                    )));
                }
            }
        }

        self.depth += 1;
        let result = self.exec_block(&def.body, &scope);
        self.depth -= 1;
        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::None),
            Flow::Break | Flow::Continue => {
                Err(Fault::syntax("'break' or 'continue' outside loop", 1))
            }
        }
    }

    pub fn call_method(&mut self, receiver: &Value, name: &str, args: Args) -> Eval<Value> {
        match receiver {
            Value::Str(s) => methods::str_method(self, s, name, args),
            Value::List(list) => methods::list_method(self, list, name, args),
            Value::Dict(dict) => methods::dict_method(self, dict, name, args),
            Value::Set(set) => methods::set_method(self, set, name, args),
            Value::Tuple(items) => methods::tuple_method(items, name, args),
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => {
                methods::number_method(receiver, name, args)
            }
            Value::Date(_) | Value::DateTime(_) | Value::TimeDelta(_) => {
                modules::datetime_method(receiver, name, args)
            }
            Value::Series(_) | Value::Frame(_) | Value::GroupBy(_) | Value::Indexer(_) => {
                pandas::call_method(self, receiver, name, args)
            }
            Value::Figure(fig) => plot::figure_method(self, fig, name, args),
            Value::Axes(fig, panel) => plot::axes_method(self, fig, *panel, name, args),
            Value::Chart(chart) => plot::chart_method(self, chart, name, args),
            Value::Profile(profile) => modules::profile_method(self, profile, name, args),
            Value::Module(_) | Value::Class(_) => {
                let callee = self.get_attr(receiver, name)?;
                self.call_value(&callee, args)
            }
            other => Err(no_attribute(other, name)),
        }
    }

    pub fn get_attr(&mut self, obj: &Value, name: &str) -> Eval<Value> {
        match obj {
            Value::Module(module) => module.attrs.get(name).cloned().ok_or_else(|| {
                Fault::attribute_error(format!(
                    "module '{}' has no attribute '{}'",
                    module.name, name
                ))
            }),
            Value::Series(_) | Value::Frame(_) | Value::GroupBy(_) | Value::Indexer(_) => {
                pandas::get_attr(obj, name)
            }
            Value::Date(_) | Value::DateTime(_) | Value::TimeDelta(_) => {
                match modules::datetime_attr(obj, name) {
                    Some(v) => Ok(v),
                    None => Ok(bound_method(obj, name)),
                }
            }
            Value::Exception(fault) if name == "args" => {
                Ok(Value::tuple(vec![Value::str(&fault.message)]))
            }
            Value::Int(i) if name == "real" => Ok(Value::Int(*i)),
            Value::Float(f) if name == "real" => Ok(Value::Float(*f)),
            Value::Function(c) if name == "__name__" => Ok(Value::str(&c.def.name)),
            Value::Builtin(b) if name == "__name__" => Ok(Value::str(b.name)),
            Value::Class(n) if name == "__name__" => Ok(Value::Str(n.clone())),
            Value::Class(n) => modules::class_attr(n, name).ok_or_else(|| no_attribute(obj, name)),
            Value::None | Value::Exception(_) | Value::Function(_) | Value::Builtin(_) => {
                Err(no_attribute(obj, name))
            }
            other => Ok(bound_method(other, name)),
        }
    }

    pub fn get_item(&mut self, obj: &Value, index: &Value) -> Eval<Value> {
        match obj {
            Value::List(list) => {
                let list = list.borrow();
                match index {
                    Value::Slice(a, b, c) => Ok(Value::list(slice_values(&list, *a, *b, *c)?)),
                    other => {
                        let i = seq_index(other, list.len(), "list")?;
                        Ok(list[i].clone())
                    }
                }
            }
            Value::Tuple(items) => match index {
                Value::Slice(a, b, c) => Ok(Value::tuple(slice_values(items, *a, *b, *c)?)),
                other => {
                    let i = seq_index(other, items.len(), "tuple")?;
                    Ok(items[i].clone())
                }
            },
            Value::Str(s) => {
                let chars: Vec<Value> =
                    s.chars().map(|c| Value::str(c.encode_utf8(&mut [0; 4]))).collect();
                match index {
                    Value::Slice(a, b, c) => {
                        let picked = slice_values(&chars, *a, *b, *c)?;
                        Ok(Value::str(&picked.iter().map(|v| v.to_str()).collect::<String>()))
                    }
                    other => {
                        let i = seq_index(other, chars.len(), "string")?;
                        Ok(chars[i].clone())
                    }
                }
            }
            Value::Dict(dict) => dict
                .borrow()
                .get(index)?
                .ok_or_else(|| Fault::key_error(index.repr())),
            Value::Range(start, stop, step) => {
                let len = range_len(*start, *stop, *step) as usize;
                let i = seq_index(index, len, "range")?;
                Ok(Value::Int(start + step * i as i64))
            }
            Value::Series(_) | Value::Frame(_) | Value::GroupBy(_) | Value::Indexer(_) => {
                pandas::get_item(self, obj, index)
            }
            other => Err(Fault::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    pub fn set_item(&mut self, obj: &Value, index: &Value, value: Value) -> Eval<()> {
        match obj {
            Value::List(list) => {
                if let Value::Slice(a, b, None | Some(1)) = index {
                    let replacement = self.iterate(&value)?;
                    let mut list = list.borrow_mut();
                    let (start, stop) = slice_bounds(list.len(), *a, *b);
                    let stop = stop.max(start);
                    list.splice(start..stop, replacement);
                    return Ok(());
                }
                let mut list = list.borrow_mut();
                let len = list.len();
                let i = seq_index(index, len, "list")?;
                list[i] = value;
                Ok(())
            }
            Value::Dict(dict) => dict.borrow_mut().insert(index.clone(), value),
            Value::Frame(_) | Value::Indexer(_) | Value::Series(_) => {
                pandas::set_item(self, obj, index, value)
            }
            other => Err(Fault::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    fn del_item(&mut self, obj: &Value, index: &Value) -> Eval<()> {
        match obj {
            Value::List(list) => {
                let mut list = list.borrow_mut();
                let len = list.len();
                let i = seq_index(index, len, "list")?;
                list.remove(i);
                Ok(())
            }
            Value::Dict(dict) => match dict.borrow_mut().remove(index)? {
                Some(_) => Ok(()),
                None => Err(Fault::key_error(index.repr())),
            },
            Value::Frame(frame) => {
                let name = index.expect_str("column")?;
                let mut frame = frame.borrow_mut();
                let pos = frame
                    .position(&name)
                    .ok_or_else(|| Fault::key_error(index.repr()))?;
                frame.columns.remove(pos);
                frame.data.remove(pos);
                Ok(())
            }
            other => Err(Fault::type_error(format!(
                "'{}' object does not support item deletion",
                other.type_name()
            ))),
        }
    }

    /// Materialize an iterable, charging its length against the budget.
    pub fn iterate(&mut self, value: &Value) -> Eval<Vec<Value>> {
        if let Value::Range(start, stop, step) = value {
            let len = range_len(*start, *stop, *step);
            self.charge(len.max(0) as u64)?;
        }
        let items: Vec<Value> = self.iter_lazy(value)?.collect();
        self.charge(items.len() as u64)?;
        Ok(items)
    }

    fn iter_lazy(&mut self, value: &Value) -> Eval<ValueIter> {
        Ok(match value {
            Value::Range(start, stop, step) => ValueIter::Range {
                next: *start,
                stop: *stop,
                step: *step,
            },
            Value::List(list) => ValueIter::Items(list.borrow().clone().into_iter()),
            Value::Tuple(items) => ValueIter::Items(items.to_vec().into_iter()),
            Value::Str(s) => ValueIter::Items(
                s.chars()
                    .map(|c| Value::str(c.encode_utf8(&mut [0; 4])))
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            Value::Dict(dict) => ValueIter::Items(dict.borrow().keys().into_iter()),
            Value::Set(set) => {
                let items: Vec<Value> = set.borrow().values().cloned().collect();
                ValueIter::Items(items.into_iter())
            }
            Value::Series(_) | Value::Frame(_) | Value::GroupBy(_) => {
                ValueIter::Items(pandas::iterate(value)?.into_iter())
            }
            other => {
                return Err(Fault::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )));
            }
        })
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.globals.clear();
    }
}

enum ValueIter {
    Items(std::vec::IntoIter<Value>),
    Range { next: i64, stop: i64, step: i64 },
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Items(items) => items.next(),
            ValueIter::Range { next, stop, step } => {
                let done = if *step > 0 { *next >= *stop } else { *next <= *stop };
                if done || *step == 0 {
                    return None;
                }
                let current = *next;
                *next += *step;
                Some(Value::Int(current))
            }
        }
    }
}

pub fn bound_method(receiver: &Value, name: &str) -> Value {
    Value::Method(Rc::new(Method {
        receiver: receiver.clone(),
        name: Rc::from(name),
    }))
}

pub fn no_attribute(obj: &Value, name: &str) -> Fault {
    Fault::attribute_error(format!("'{}' object has no attribute '{}'", obj.type_name(), name))
}

fn exception_matches(fault: &Fault, kind: &Value) -> Eval<bool> {
    match kind {
        Value::Class(name) => Ok(fault.matches(name)),
        Value::Tuple(kinds) => {
            for k in kinds.iter() {
                if exception_matches(fault, k)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(Fault::type_error(format!(
            "catching '{}' that does not inherit from BaseException is not allowed",
            other.type_name()
        ))),
    }
}

/// Lexical normalization: drops `.` and resolves `..` without touching the disk.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

pub fn seq_index(index: &Value, len: usize, what: &str) -> Eval<usize> {
    let i = index.as_i64().ok_or_else(|| {
        Fault::type_error(format!(
            "{} indices must be integers or slices, not {}",
            what,
            index.type_name()
        ))
    })?;
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(Fault::index_error(format!("{} index out of range", what)));
    }
    Ok(resolved as usize)
}

/// Clamp `start:stop` for a positive step.
pub fn slice_bounds(len: usize, start: Option<i64>, stop: Option<i64>) -> (usize, usize) {
    let clamp = |v: i64| -> usize {
        let v = if v < 0 { v + len as i64 } else { v };
        v.clamp(0, len as i64) as usize
    };
    (start.map(clamp).unwrap_or(0), stop.map(clamp).unwrap_or(len))
}

pub fn slice_indices(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Eval<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Fault::value_error("slice step cannot be zero"));
    }
    if step > 0 {
        let (a, b) = slice_bounds(len, start, stop);
        return Ok((a..b.max(a)).step_by(step as usize).collect());
    }
    let len_i = len as i64;
    let resolve = |v: i64| if v < 0 { v + len_i } else { v };
    let a = start.map(|v| resolve(v).clamp(-1, len_i - 1)).unwrap_or(len_i - 1);
    let b = stop.map(|v| resolve(v).clamp(-1, len_i - 1)).unwrap_or(-1);
    let mut out = Vec::new();
    let mut i = a;
    while i > b {
        out.push(i as usize);
        i += step;
    }
    Ok(out)
}

pub fn slice_values(
    items: &[Value],
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Eval<Vec<Value>> {
    Ok(slice_indices(items.len(), start, stop, step)?
        .into_iter()
        .map(|i| items[i].clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> Interpreter {
        Interpreter::new(std::env::temp_dir().join("datachat-eval-tests"), 1_000_000)
    }

    fn run(source: &str) -> Interpreter {
        let mut interp = interpreter();
        interp.run(source).unwrap();
        interp
    }

    fn run_err(source: &str) -> Fault {
        let mut interp = interpreter();
        interp.run(source).unwrap_err()
    }

    fn global(interp: &Interpreter, name: &str) -> String {
        interp
            .locals()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.repr())
            .unwrap_or_default()
    }

    #[test]
    fn test_print_and_arithmetic() {
        let interp = run("a = 1 + 1\nprint(a)");
        assert_eq!(interp.stdout(), "2\n");
        assert_eq!(global(&interp, "a"), "2");
    }

    #[test]
    fn test_functions_defaults_and_closures() {
        let interp = run("def make(k=2):\n    def mul(x):\n        return x * k\n    return mul\n\n\
                          triple = make(3)\n\
                          r = [triple(i) for i in range(3)]\n");
        assert_eq!(global(&interp, "r"), "[0, 3, 6]");
    }

    #[test]
    fn test_try_except_finally() {
        let interp = run("log = []\ntry:\n    1 / 0\n\
                          except ZeroDivisionError as e:\n    log.append(str(e))\n\
                          else:\n    log.append('else')\n\
                          finally:\n    log.append('done')\n");
        assert_eq!(global(&interp, "log"), "['division by zero', 'done']");
    }

    #[test]
    fn test_uncaught_error_carries_line() {
        let fault = run_err("x = 1\ny = undefined_name\n");
        assert_eq!(fault.to_string(), "NameError: name 'undefined_name' is not defined (line 2)");
    }

    #[test]
    fn test_unpacking_with_star() {
        let interp = run("a, *rest, z = [1, 2, 3, 4]\n");
        assert_eq!(global(&interp, "rest"), "[2, 3]");
        assert_eq!(global(&interp, "z"), "4");
    }

    #[test]
    fn test_for_else_and_break() {
        let interp = run(concat!(
            "hit = None\nfor i in range(10):\n    if i == 3:\n",
            "        hit = i\n        break\nelse:\n    hit = -1\n",
        ));
        assert_eq!(global(&interp, "hit"), "3");
    }

    #[test]
    fn test_budget_stops_infinite_loop() {
        let mut interp = Interpreter::new(std::env::temp_dir(), 10_000);
        let fault = interp.run("while True:\n    pass\n").unwrap_err();
        assert!(fault.fatal);
        assert!(fault.message.contains("operation budget exhausted"));
    }

    #[test]
    fn test_budget_is_not_catchable() {
        let mut interp = Interpreter::new(std::env::temp_dir(), 10_000);
        let fault = interp
            .run("try:\n    while True:\n        pass\nexcept Exception:\n    pass\n")
            .unwrap_err();
        assert!(fault.fatal);
    }

    #[test]
    fn test_output_path_confined() {
        let interp = Interpreter::new(PathBuf::from("/tmp/scratch-x"), 100);
        assert!(interp.resolve_output_path(&Value::str("plot.png")).is_ok());
        assert!(interp.resolve_output_path(&Value::str("/tmp/scratch-x/plot.png")).is_ok());
        assert!(interp.resolve_output_path(&Value::str("../escape.png")).is_err());
        assert!(interp.resolve_output_path(&Value::str("/etc/passwd")).is_err());
    }

    #[test]
    fn test_augmented_list_add_mutates_alias() {
        let interp = run("a = [1]\nb = a\nb += [2]\n");
        assert_eq!(global(&interp, "a"), "[1, 2]");
    }

    #[test]
    fn test_recursion_limit() {
        let fault = std::thread::Builder::new()
            .stack_size(256 << 20)
            .spawn(|| run_err("def f(n):\n    return f(n + 1)\nf(0)\n").kind)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(fault, "RecursionError");
    }

    #[test]
    fn test_slices() {
        let interp = run("s = 'abcdef'[::-2]\nl = [0, 1, 2, 3, 4][1:4]\n");
        assert_eq!(global(&interp, "s"), "'fdb'");
        assert_eq!(global(&interp, "l"), "[1, 2, 3]");
    }
}
