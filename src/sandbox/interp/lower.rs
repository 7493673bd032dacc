//! Lowering from the tree-sitter CST to the owned [`ast`](super::ast).

use std::rc::Rc;

use tree_sitter::Node;

use super::ast::*;
use super::error::{Eval, Fault};
use crate::sandbox::parser::{first_syntax_error, named_children, node_text, parse};

/// Parse and lower a whole snippet.
pub fn lower_module(source: &str) -> Eval<Vec<Stmt>> {
    let tree = parse(source).ok_or_else(|| Fault::syntax("source could not be parsed", 1))?;
    let root = tree.root_node();
    if let Some(pos) = first_syntax_error(root) {
        return Err(Fault::syntax(format!("invalid syntax at column {}", pos.column), pos.line));
    }
    Lowerer { source }.block(&root)
}

struct Lowerer<'s> {
    source: &'s str,
}

fn line_of(node: &Node) -> usize {
    node.start_position().row + 1
}

impl<'s> Lowerer<'s> {
    fn text(&self, node: &Node) -> &'s str {
        node_text(node, self.source)
    }

    fn unsupported(&self, node: &Node) -> Fault {
        Fault::syntax(format!("unsupported syntax: {}", node.kind()), line_of(node))
    }

    fn field<'t>(&self, node: &Node<'t>, name: &str) -> Eval<Node<'t>> {
        node.child_by_field_name(name).ok_or_else(|| {
            Fault::syntax(format!("{} is missing its {}", node.kind(), name), line_of(node))
        })
    }

    fn block(&self, node: &Node) -> Eval<Vec<Stmt>> {
        let mut out = Vec::new();
        for child in named_children(node) {
            self.statement(&child, &mut out)?;
        }
        Ok(out)
    }

    fn statement(&self, node: &Node, out: &mut Vec<Stmt>) -> Eval<()> {
        let line = line_of(node);
        let kind = match node.kind() {
            "expression_statement" => {
                let children = named_children(node);
                if children.len() == 1 {
                    let child = &children[0];
                    match child.kind() {
                        "assignment" => self.assignment(child)?,
                        "augmented_assignment" => self.aug_assignment(child)?,
                        _ => StmtKind::Expr(self.expr(child)?),
                    }
                } else {
                    StmtKind::Expr(Expr::Tuple(self.exprs(&children)?))
                }
            }
            "return_statement" => {
                let children = named_children(node);
                match children.first() {
                    Some(child) => StmtKind::Return(Some(self.expr(child)?)),
                    None => StmtKind::Return(None),
                }
            }
            "pass_statement"
            | "global_statement"
            | "nonlocal_statement"
            | "future_import_statement" => StmtKind::Pass,
            "break_statement" => StmtKind::Break,
            "continue_statement" => StmtKind::Continue,
            "if_statement" => self.if_statement(node)?,
            "for_statement" => StmtKind::For {
                target: self.target(&self.field(node, "left")?)?,
                iter: self.expr(&self.field(node, "right")?)?,
                body: self.block(&self.field(node, "body")?)?,
                orelse: self.else_body(node.child_by_field_name("alternative"))?,
            },
            "while_statement" => StmtKind::While {
                test: self.expr(&self.field(node, "condition")?)?,
                body: self.block(&self.field(node, "body")?)?,
                orelse: self.else_body(node.child_by_field_name("alternative"))?,
            },
            "function_definition" => {
                let name = self.text(&self.field(node, "name")?).to_string();
                let params = self.field(node, "parameters")?;
                let body = self.block(&self.field(node, "body")?)?;
                StmtKind::FunctionDef(Rc::new(self.function(name, Some(&params), body)?))
            }
            "try_statement" => self.try_statement(node)?,
            "raise_statement" => {
                let children = named_children(node);
                match children.first() {
                    Some(child) => StmtKind::Raise(Some(self.expr(child)?)),
                    None => StmtKind::Raise(None),
                }
            }
            "assert_statement" => {
                let children = named_children(node);
                let test = children
                    .first()
                    .ok_or_else(|| Fault::syntax("assert needs a condition", line))?;
                StmtKind::Assert {
                    test: self.expr(test)?,
                    msg: children.get(1).map(|m| self.expr(m)).transpose()?,
                }
            }
            "delete_statement" => {
                let children = named_children(node);
                let mut targets = Vec::new();
                for child in &children {
                    match self.target(child)? {
                        Target::Tuple(items) => targets.extend(items),
                        other => targets.push(other),
                    }
                }
                StmtKind::Delete(targets)
            }
            "import_statement" => {
                let mut cursor = node.walk();
                let names = node
                    .children_by_field_name("name", &mut cursor)
                    .map(|n| self.import_name(&n))
                    .collect();
                StmtKind::Import(names)
            }
            "import_from_statement" => {
                let module = self.text(&self.field(node, "module_name")?).to_string();
                let mut cursor = node.walk();
                let names: Vec<ImportName> = node
                    .children_by_field_name("name", &mut cursor)
                    .map(|n| self.import_name(&n))
                    .collect();
                let star = named_children(node).iter().any(|c| c.kind() == "wildcard_import");
                StmtKind::ImportFrom { module, names, star }
            }
            "with_statement" => self.with_statement(node)?,
            _ => return Err(self.unsupported(node)),
        };
        out.push(Stmt { line, kind });
        Ok(())
    }

    fn import_name(&self, node: &Node) -> ImportName {
        if node.kind() == "aliased_import" {
            ImportName {
                name: node
                    .child_by_field_name("name")
                    .map(|n| self.text(&n).to_string())
                    .unwrap_or_default(),
                alias: node.child_by_field_name("alias").map(|n| self.text(&n).to_string()),
            }
        } else {
            ImportName {
                name: self.text(node).to_string(),
                alias: None,
            }
        }
    }

    fn assignment(&self, node: &Node) -> Eval<StmtKind> {
        let mut targets = vec![self.target(&self.field(node, "left")?)?];
        let Some(mut right) = node.child_by_field_name("right") else {
            // Bare annotation: `x: int`
            return Ok(StmtKind::Pass);
        };
        while right.kind() == "assignment" {
            targets.push(self.target(&self.field(&right, "left")?)?);
            right = self.field(&right, "right")?;
        }
        Ok(StmtKind::Assign {
            targets,
            value: self.expr(&right)?,
        })
    }

    fn aug_assignment(&self, node: &Node) -> Eval<StmtKind> {
        let operator = self.field(node, "operator")?;
        let op = BinOp::from_symbol(self.text(&operator)).ok_or_else(|| {
            Fault::syntax(format!("unknown operator {}", self.text(&operator)), line_of(node))
        })?;
        Ok(StmtKind::AugAssign {
            target: self.target(&self.field(node, "left")?)?,
            op,
            value: self.expr(&self.field(node, "right")?)?,
        })
    }

    fn if_statement(&self, node: &Node) -> Eval<StmtKind> {
        let test = self.expr(&self.field(node, "condition")?)?;
        let body = self.block(&self.field(node, "consequence")?)?;

        let mut cursor = node.walk();
        let alternatives: Vec<Node> =
            node.children_by_field_name("alternative", &mut cursor).collect();

        // Fold `elif` chains from the back into nested ifs.
        let mut orelse: Vec<Stmt> = Vec::new();
        for alt in alternatives.iter().rev() {
            match alt.kind() {
                "else_clause" => orelse = self.block(&self.field(alt, "body")?)?,
                "elif_clause" => {
                    let nested = StmtKind::If {
                        test: self.expr(&self.field(alt, "condition")?)?,
                        body: self.block(&self.field(alt, "consequence")?)?,
                        orelse,
                    };
                    orelse = vec![Stmt {
                        line: line_of(alt),
                        kind: nested,
                    }];
                }
                _ => return Err(self.unsupported(alt)),
            }
        }

        Ok(StmtKind::If { test, body, orelse })
    }

    fn else_body(&self, node: Option<Node>) -> Eval<Vec<Stmt>> {
        match node {
            Some(clause) => self.block(&self.field(&clause, "body")?),
            None => Ok(Vec::new()),
        }
    }

    fn try_statement(&self, node: &Node) -> Eval<StmtKind> {
        let body = self.block(&self.field(node, "body")?)?;
        let mut handlers = Vec::new();
        let mut orelse = Vec::new();
        let mut finalbody = Vec::new();

        for child in named_children(node) {
            match child.kind() {
                "except_clause" => {
                    let parts = named_children(&child);
                    let Some((block, heads)) = parts.split_last() else {
                        return Err(self.unsupported(&child));
                    };
                    let (kind, name) = match heads.first() {
                        Some(head) if head.kind() == "as_pattern" => {
                            let (kind, alias) = self.as_pattern(head)?;
                            (Some(kind), Some(self.text(&alias).to_string()))
                        }
                        Some(head) => (
                            Some(self.expr(head)?),
                            heads.get(1).map(|h| self.text(h).to_string()),
                        ),
                        None => (None, None),
                    };
                    handlers.push(Handler {
                        kind,
                        name,
                        body: self.block(block)?,
                    });
                }
                "else_clause" => orelse = self.block(&self.field(&child, "body")?)?,
                "finally_clause" => {
                    if let Some(block) = named_children(&child).last() {
                        finalbody = self.block(block)?;
                    }
                }
                "block" => {}
                _ => return Err(self.unsupported(&child)),
            }
        }

        Ok(StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn with_statement(&self, node: &Node) -> Eval<StmtKind> {
        let mut items = Vec::new();
        for child in named_children(node) {
            if child.kind() != "with_clause" {
                continue;
            }
            for item in named_children(&child) {
                let value = self.field(&item, "value")?;
                if value.kind() == "as_pattern" {
                    let (expr, alias) = self.as_pattern(&value)?;
                    items.push((expr, Some(self.target(&alias)?)));
                } else {
                    items.push((self.expr(&value)?, None));
                }
            }
        }
        Ok(StmtKind::With {
            items,
            body: self.block(&self.field(node, "body")?)?,
        })
    }

    /// `expr as alias`: the lowered expression and the alias node.
    fn as_pattern<'a>(&self, node: &Node<'a>) -> Eval<(Expr, Node<'a>)> {
        let expr = named_children(node)
            .into_iter()
            .next()
            .ok_or_else(|| self.unsupported(node))?;
        let alias = node.child_by_field_name("alias").ok_or_else(|| self.unsupported(node))?;
        let alias = if alias.kind() == "as_pattern_target" {
            named_children(&alias).into_iter().next().ok_or_else(|| self.unsupported(node))?
        } else {
            alias
        };
        Ok((self.expr(&expr)?, alias))
    }

    fn function(&self, name: String, params: Option<&Node>, body: Vec<Stmt>) -> Eval<FunctionDef> {
        let mut def = FunctionDef {
            name,
            params: Vec::new(),
            vararg: None,
            kwarg: None,
            body,
        };
        if let Some(params) = params {
            for param in named_children(params) {
                self.parameter(&param, &mut def)?;
            }
        }
        Ok(def)
    }

    fn parameter(&self, node: &Node, def: &mut FunctionDef) -> Eval<()> {
        match node.kind() {
            "identifier" => def.params.push(Param {
                name: self.text(node).to_string(),
                default: None,
            }),
            "default_parameter" | "typed_default_parameter" => def.params.push(Param {
                name: self.text(&self.field(node, "name")?).to_string(),
                default: Some(self.expr(&self.field(node, "value")?)?),
            }),
            "typed_parameter" => {
                if let Some(inner) = named_children(node).first() {
                    self.parameter(inner, def)?;
                }
            }
            "list_splat_pattern" => {
                def.vararg = named_children(node).first().map(|n| self.text(n).to_string());
            }
            "dictionary_splat_pattern" => {
                def.kwarg = named_children(node).first().map(|n| self.text(n).to_string());
            }
            "keyword_separator" | "positional_separator" => {}
            _ => return Err(self.unsupported(node)),
        }
        Ok(())
    }

    fn target(&self, node: &Node) -> Eval<Target> {
        Ok(match node.kind() {
            "identifier" | "keyword_identifier" => Target::Name(self.text(node).to_string()),
            "attribute" => Target::Attribute(
                Box::new(self.expr(&self.field(node, "object")?)?),
                self.text(&self.field(node, "attribute")?).to_string(),
            ),
            "subscript" => {
                let value = self.expr(&self.field(node, "value")?)?;
                Target::Subscript(Box::new(value), Box::new(self.subscript_index(node)?))
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "expression_list" | "tuple"
            | "list" => {
                let items = named_children(node)
                    .iter()
                    .map(|c| self.target(c))
                    .collect::<Eval<Vec<_>>>()?;
                Target::Tuple(items)
            }
            "list_splat_pattern" | "list_splat" => {
                let inner = named_children(node);
                let first = inner.first().ok_or_else(|| self.unsupported(node))?;
                Target::Starred(Box::new(self.target(first)?))
            }
            "parenthesized_expression" => {
                let inner = named_children(node);
                let first = inner.first().ok_or_else(|| self.unsupported(node))?;
                self.target(first)?
            }
            _ => {
                return Err(Fault::syntax(
                    format!("cannot assign to {}", node.kind()),
                    line_of(node),
                ));
            }
        })
    }

    fn exprs(&self, nodes: &[Node]) -> Eval<Vec<Expr>> {
        nodes.iter().map(|n| self.expr(n)).collect()
    }

    fn subscript_index(&self, node: &Node) -> Eval<Expr> {
        let mut cursor = node.walk();
        let items: Vec<Node> = node
            .children_by_field_name("subscript", &mut cursor)
            .filter(|c| c.kind() != "comment")
            .collect();
        let mut lowered = Vec::with_capacity(items.len());
        for item in &items {
            lowered.push(self.expr(item)?);
        }
        if lowered.len() == 1 {
            Ok(lowered.remove(0))
        } else {
            Ok(Expr::Tuple(lowered))
        }
    }

    fn expr(&self, node: &Node) -> Eval<Expr> {
        let line = line_of(node);
        Ok(match node.kind() {
            "identifier" | "keyword_identifier" => Expr::Name(self.text(node).to_string()),
            "integer" => self.integer(node)?,
            "float" => {
                let text = self.text(node).replace('_', "");
                let value: f64 = text
                    .parse()
                    .map_err(|_| Fault::syntax(format!("invalid float literal {}", text), line))?;
                Expr::Const(Const::Float(value))
            }
            "true" => Expr::Const(Const::Bool(true)),
            "false" => Expr::Const(Const::Bool(false)),
            "none" | "ellipsis" => Expr::Const(Const::None),
            "string" => self.string(node)?,
            "concatenated_string" => {
                let mut parts = Vec::new();
                for child in named_children(node) {
                    match self.string(&child)? {
                        Expr::Const(Const::Str(s)) => parts.push(FPart::Lit(s.to_string())),
                        Expr::FString(inner) => parts.extend(inner),
                        _ => return Err(self.unsupported(&child)),
                    }
                }
                collapse_fstring(parts)
            }
            "binary_operator" => {
                let operator = self.field(node, "operator")?;
                let op = BinOp::from_symbol(self.text(&operator)).ok_or_else(|| {
                    Fault::syntax(format!("unknown operator {}", self.text(&operator)), line)
                })?;
                Expr::BinOp(
                    Box::new(self.expr(&self.field(node, "left")?)?),
                    op,
                    Box::new(self.expr(&self.field(node, "right")?)?),
                )
            }
            "unary_operator" => {
                let operator = self.field(node, "operator")?;
                let op = match self.text(&operator) {
                    "-" => UnaryOp::Neg,
                    "+" => UnaryOp::Pos,
                    "~" => UnaryOp::Invert,
                    other => return Err(Fault::syntax(format!("unknown operator {}", other), line)),
                };
                Expr::Unary(op, Box::new(self.expr(&self.field(node, "argument")?)?))
            }
            "not_operator" => {
                Expr::Unary(UnaryOp::Not, Box::new(self.expr(&self.field(node, "argument")?)?))
            }
            "boolean_operator" => {
                let left = Box::new(self.expr(&self.field(node, "left")?)?);
                let right = Box::new(self.expr(&self.field(node, "right")?)?);
                let operator = self.field(node, "operator")?;
                if self.text(&operator) == "and" {
                    Expr::And(left, right)
                } else {
                    Expr::Or(left, right)
                }
            }
            "comparison_operator" => self.comparison(node)?,
            "call" => {
                let function = self.expr(&self.field(node, "function")?)?;
                let arguments = self.field(node, "arguments")?;
                let args = if arguments.kind() == "generator_expression" {
                    vec![Arg::Pos(self.expr(&arguments)?)]
                } else {
                    self.arguments(&arguments)?
                };
                Expr::Call(Box::new(function), args)
            }
            "attribute" => Expr::Attribute(
                Box::new(self.expr(&self.field(node, "object")?)?),
                self.text(&self.field(node, "attribute")?).to_string(),
            ),
            "subscript" => Expr::Subscript(
                Box::new(self.expr(&self.field(node, "value")?)?),
                Box::new(self.subscript_index(node)?),
            ),
            "slice" => self.slice(node)?,
            "list" => Expr::List(self.exprs(&named_children(node))?),
            "tuple" | "expression_list" | "pattern_list" => {
                Expr::Tuple(self.exprs(&named_children(node))?)
            }
            "set" => Expr::Set(self.exprs(&named_children(node))?),
            "dictionary" => {
                let mut items = Vec::new();
                for child in named_children(node) {
                    match child.kind() {
                        "pair" => items.push(DictItem::Pair(
                            self.expr(&self.field(&child, "key")?)?,
                            self.expr(&self.field(&child, "value")?)?,
                        )),
                        "dictionary_splat" => {
                            let inner = named_children(&child);
                            let first = inner.first().ok_or_else(|| self.unsupported(&child))?;
                            items.push(DictItem::Splat(self.expr(first)?));
                        }
                        _ => return Err(self.unsupported(&child)),
                    }
                }
                Expr::Dict(items)
            }
            "parenthesized_expression" => {
                let inner = named_children(node);
                let first = inner.first().ok_or_else(|| self.unsupported(node))?;
                self.expr(first)?
            }
            "list_splat" => {
                let inner = named_children(node);
                let first = inner.first().ok_or_else(|| self.unsupported(node))?;
                Expr::Starred(Box::new(self.expr(first)?))
            }
            "list_comprehension" | "generator_expression" => {
                let body = self.expr(&self.field(node, "body")?)?;
                Expr::ListComp(Box::new(body), self.comprehensions(node)?)
            }
            "set_comprehension" => {
                let body = self.expr(&self.field(node, "body")?)?;
                Expr::SetComp(Box::new(body), self.comprehensions(node)?)
            }
            "dictionary_comprehension" => {
                let pair = self.field(node, "body")?;
                Expr::DictComp(
                    Box::new(self.expr(&self.field(&pair, "key")?)?),
                    Box::new(self.expr(&self.field(&pair, "value")?)?),
                    self.comprehensions(node)?,
                )
            }
            "conditional_expression" => {
                let parts = named_children(node);
                if parts.len() != 3 {
                    return Err(self.unsupported(node));
                }
                Expr::IfExp(
                    Box::new(self.expr(&parts[1])?),
                    Box::new(self.expr(&parts[0])?),
                    Box::new(self.expr(&parts[2])?),
                )
            }
            "lambda" => {
                let params = node.child_by_field_name("parameters");
                let body_node = self.field(node, "body")?;
                let body = vec![Stmt {
                    line: line_of(&body_node),
                    kind: StmtKind::Return(Some(self.expr(&body_node)?)),
                }];
                Expr::Lambda(Rc::new(self.function("<lambda>".to_string(), params.as_ref(), body)?))
            }
            "named_expression" => Expr::Named(
                self.text(&self.field(node, "name")?).to_string(),
                Box::new(self.expr(&self.field(node, "value")?)?),
            ),
            _ => return Err(self.unsupported(node)),
        })
    }

    fn integer(&self, node: &Node) -> Eval<Expr> {
        let raw = self.text(node).replace('_', "");
        let lower = raw.to_ascii_lowercase();
        let lower = lower.trim_end_matches('l');
        if lower.ends_with('j') {
            return Err(self.unsupported(node));
        }
        let parsed = if let Some(hex) = lower.strip_prefix("0x") {
            i64::from_str_radix(hex, 16).ok()
        } else if let Some(oct) = lower.strip_prefix("0o") {
            i64::from_str_radix(oct, 8).ok()
        } else if let Some(bin) = lower.strip_prefix("0b") {
            i64::from_str_radix(bin, 2).ok()
        } else {
            lower.parse::<i64>().ok()
        };
        match parsed {
            Some(v) => Ok(Expr::Const(Const::Int(v))),
            // Past i64 range: degrade to a float rather than fail.
            None => lower
                .parse::<f64>()
                .map(|f| Expr::Const(Const::Float(f)))
                .map_err(|_| {
                    Fault::syntax(format!("invalid integer literal {}", raw), line_of(node))
                }),
        }
    }

    fn comparison(&self, node: &Node) -> Eval<Expr> {
        let mut operands = Vec::new();
        let mut operators = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "comment" {
                continue;
            }
            if child.is_named() {
                operands.push(self.expr(&child)?);
            } else {
                let symbol = child.kind();
                let op = CmpOp::from_symbol(symbol).ok_or_else(|| {
                    Fault::syntax(format!("unknown comparison {}", symbol), line_of(node))
                })?;
                operators.push(op);
            }
        }
        if operands.len() != operators.len() + 1 || operators.is_empty() {
            return Err(self.unsupported(node));
        }
        let mut operands = operands.into_iter();
        let first = operands.next().ok_or_else(|| self.unsupported(node))?;
        Ok(Expr::Compare(Box::new(first), operators.into_iter().zip(operands).collect()))
    }

    fn arguments(&self, node: &Node) -> Eval<Vec<Arg>> {
        let mut args = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "keyword_argument" => args.push(Arg::Kw(
                    self.text(&self.field(&child, "name")?).to_string(),
                    self.expr(&self.field(&child, "value")?)?,
                )),
                "list_splat" | "parenthesized_list_splat" => {
                    let inner = named_children(&child);
                    let first = inner.first().ok_or_else(|| self.unsupported(&child))?;
                    args.push(Arg::Star(self.expr(first)?));
                }
                "dictionary_splat" => {
                    let inner = named_children(&child);
                    let first = inner.first().ok_or_else(|| self.unsupported(&child))?;
                    args.push(Arg::DoubleStar(self.expr(first)?));
                }
                _ => args.push(Arg::Pos(self.expr(&child)?)),
            }
        }
        Ok(args)
    }

    fn slice(&self, node: &Node) -> Eval<Expr> {
        let mut parts: [Option<Box<Expr>>; 3] = [None, None, None];
        let mut index = 0;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == ":" {
                index += 1;
            } else if child.is_named() && child.kind() != "comment" && index < 3 {
                parts[index] = Some(Box::new(self.expr(&child)?));
            }
        }
        let [start, stop, step] = parts;
        Ok(Expr::Slice(start, stop, step))
    }

    fn comprehensions(&self, node: &Node) -> Eval<Vec<Comprehension>> {
        let mut out: Vec<Comprehension> = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "for_in_clause" => {
                    let target = self.target(&self.field(&child, "left")?)?;
                    let mut cursor = child.walk();
                    let rights: Vec<Node> =
                        child.children_by_field_name("right", &mut cursor).collect();
                    let iter = if rights.len() == 1 {
                        self.expr(&rights[0])?
                    } else {
                        Expr::Tuple(self.exprs(&rights)?)
                    };
                    out.push(Comprehension {
                        target,
                        iter,
                        ifs: Vec::new(),
                    });
                }
                "if_clause" => {
                    let inner = named_children(&child);
                    let cond = inner.first().ok_or_else(|| self.unsupported(&child))?;
                    let cond = self.expr(cond)?;
                    match out.last_mut() {
                        Some(last) => last.ifs.push(cond),
                        None => return Err(self.unsupported(&child)),
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    fn string(&self, node: &Node) -> Eval<Expr> {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();

        let prefix: String = children
            .iter()
            .find(|c| c.kind() == "string_start")
            .map(|c| {
                self.text(c)
                    .chars()
                    .take_while(|ch| *ch != '\'' && *ch != '"')
                    .collect::<String>()
                    .to_ascii_lowercase()
            })
            .unwrap_or_default();
        let raw = prefix.contains('r');
        let is_f = prefix.contains('f');

        let mut parts = Vec::new();
        for child in &children {
            match child.kind() {
                "string_start" | "string_end" => {}
                "interpolation" => parts.push(self.interpolation(child)?),
                _ => {
                    let mut text = self.text(child).to_string();
                    if is_f {
                        text = text.replace("{{", "{").replace("}}", "}");
                    }
                    if !raw {
                        text = decode_escapes(&text);
                    }
                    parts.push(FPart::Lit(text));
                }
            }
        }

        if is_f {
            Ok(collapse_fstring(parts))
        } else {
            let joined: String = parts
                .into_iter()
                .map(|p| match p {
                    FPart::Lit(s) => s,
                    FPart::Expr { .. } => String::new(),
                })
                .collect();
            Ok(Expr::Const(Const::Str(Rc::from(joined.as_str()))))
        }
    }

    fn interpolation(&self, node: &Node) -> Eval<FPart> {
        let expr_node = self.field(node, "expression")?;
        let expr = self.expr(&expr_node)?;

        let mut echo = None;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if !child.is_named() && child.kind() == "=" {
                echo = Some(format!("{}=", self.text(&expr_node)));
            }
        }

        let conversion = node
            .child_by_field_name("type_conversion")
            .and_then(|c| self.text(&c).trim_start_matches('!').chars().next());

        let mut spec = Vec::new();
        if let Some(format) = node.child_by_field_name("format_specifier") {
            let mut pos = format.start_byte() + 1;
            for child in named_children(&format) {
                if child.kind() != "format_expression" {
                    continue;
                }
                if child.start_byte() > pos {
                    spec.push(FPart::Lit(self.source[pos..child.start_byte()].to_string()));
                }
                let inner = child
                    .child_by_field_name("expression")
                    .or_else(|| named_children(&child).into_iter().next())
                    .ok_or_else(|| self.unsupported(&child))?;
                spec.push(FPart::Expr {
                    expr: Box::new(self.expr(&inner)?),
                    conversion: None,
                    spec: Vec::new(),
                    echo: None,
                });
                pos = child.end_byte();
            }
            if format.end_byte() > pos {
                spec.push(FPart::Lit(self.source[pos..format.end_byte()].to_string()));
            }
        }

        Ok(FPart::Expr {
            expr: Box::new(expr),
            conversion: conversion.or(if echo.is_some() && spec.is_empty() {
                Some('r')
            } else {
                None
            }),
            spec,
            echo,
        })
    }
}

/// Merge adjacent literals; a single literal collapses to a plain string.
fn collapse_fstring(parts: Vec<FPart>) -> Expr {
    let mut merged: Vec<FPart> = Vec::new();
    for part in parts {
        match (merged.last_mut(), part) {
            (Some(FPart::Lit(prev)), FPart::Lit(next)) => prev.push_str(&next),
            (_, part) => merged.push(part),
        }
    }
    match merged.as_slice() {
        [] => Expr::Const(Const::Str(Rc::from(""))),
        [FPart::Lit(s)] => Expr::Const(Const::Str(Rc::from(s.as_str()))),
        _ => Expr::FString(merged),
    }
}

/// Decode backslash escapes in a non-raw string literal.
fn decode_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            '\n' => {}
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = (0..width).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => {
                        out.push('\\');
                        out.push(next);
                        out.push_str(&digits);
                    }
                }
            }
            '0'..='7' => {
                let mut digits = next.to_string();
                while digits.len() < 3 {
                    match chars.peek() {
                        Some(c @ '0'..='7') => {
                            digits.push(*c);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => out.push_str(&digits),
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_expr(source: &str) -> Expr {
        let stmts = lower_module(source).unwrap();
        match stmts.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(e)) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_chained_assignment() {
        let stmts = lower_module("a = b = 3").unwrap();
        match &stmts[0].kind {
            StmtKind::Assign { targets, .. } => assert_eq!(targets.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_except_binds_alias() {
        let source = "try:\n    pass\n\
                      except (KeyError, ValueError) as err:\n    pass\n\
                      except ZeroDivisionError:\n    pass\n\
                      except:\n    pass\n";
        let stmts = lower_module(source).unwrap();
        match &stmts[0].kind {
            StmtKind::Try { handlers, .. } => {
                assert_eq!(handlers.len(), 3);
                assert!(matches!(handlers[0].kind, Some(Expr::Tuple(_))));
                assert_eq!(handlers[0].name.as_deref(), Some("err"));
                assert!(handlers[1].kind.is_some());
                assert_eq!(handlers[1].name, None);
                assert!(handlers[2].kind.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_elif_chain_nests() {
        let stmts =
            lower_module("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n").unwrap();
        match &stmts[0].kind {
            StmtKind::If { orelse, .. } => {
                assert_eq!(orelse.len(), 1);
                assert!(matches!(
                    &orelse[0].kind,
                    StmtKind::If { orelse, .. } if orelse.len() == 1
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fstring_parts() {
        match single_expr("f'total={x:.2f}!'") {
            Expr::FString(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(&parts[0], FPart::Lit(s) if s == "total="));
                match &parts[1] {
                    FPart::Expr { spec, .. } => {
                        assert!(matches!(spec.as_slice(), [FPart::Lit(s)] if s == ".2f"));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_plain_string_escapes() {
        match single_expr("'a\\tb\\n'") {
            Expr::Const(Const::Str(s)) => assert_eq!(&*s, "a\tb\n"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_raw_string_keeps_backslashes() {
        match single_expr("r'a\\d'") {
            Expr::Const(Const::Str(s)) => assert_eq!(&*s, "a\\d"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_not_in_comparison() {
        match single_expr("1 not in xs") {
            Expr::Compare(_, ops) => assert_eq!(ops[0].0, CmpOp::NotIn),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_slice_parts() {
        match single_expr("xs[1:]") {
            Expr::Subscript(_, index) => {
                assert!(matches!(*index, Expr::Slice(Some(_), None, None)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_class_definition_is_unsupported() {
        let err = lower_module("class A:\n    pass\n").unwrap_err();
        assert_eq!(err.kind, "SyntaxError");
        assert!(err.message.contains("class_definition"));
    }

    #[test]
    fn test_big_integer_degrades_to_float() {
        assert!(matches!(
            single_expr("123456789012345678901234567890"),
            Expr::Const(Const::Float(_))
        ));
    }
}
