//! Java-like rendering of syntax tree nodes
//!
//! Output is deterministic: two structurally equal sub-trees always print the
//! same text, which is what the condition solver relies on to name atoms.

use crate::tree::{simple_name, Literal, NodeId, NodeKind, Tree, UnaryOp, Visibility};

const INDENT: &str = "    ";

/// Renders a node (declaration, statement or expression) as source text.
pub fn render(tree: &Tree, id: NodeId) -> String {
    let mut printer = Printer {
        tree,
        out: String::new(),
        depth: 0,
    };
    if tree.kind(id).is_expression() {
        printer.expr(id);
    } else {
        printer.item(id);
    }
    printer.out.trim_end().to_string()
}

/// Renders every top-level type of the tree.
pub fn render_tree(tree: &Tree) -> String {
    tree.roots()
        .iter()
        .map(|root| render(tree, *root))
        .collect::<Vec<_>>()
        .join("\n\n")
}

struct Printer<'a> {
    tree: &'a Tree,
    out: String,
    depth: usize,
}

impl Printer<'_> {
    fn line_start(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn visibility(&mut self, vis: Visibility) {
        match vis {
            Visibility::Public => self.out.push_str("public "),
            Visibility::Protected => self.out.push_str("protected "),
            Visibility::Private => self.out.push_str("private "),
            Visibility::Package => {}
        }
    }

    /// Declarations and statements, each starting on a fresh indented line.
    fn item(&mut self, id: NodeId) {
        let tree = self.tree;
        match tree.kind(id) {
            NodeKind::Class(c) => {
                self.line_start();
                let keyword = if c.interface { "interface" } else { "class" };
                self.out
                    .push_str(&format!("{} {}", keyword, simple_name(&c.name)));
                if let Some(sup) = &c.superclass {
                    self.out.push_str(&format!(" extends {}", simple_name(sup)));
                }
                if !c.interfaces.is_empty() {
                    let names: Vec<&str> = c.interfaces.iter().map(|i| simple_name(i)).collect();
                    let keyword = if c.interface { "extends" } else { "implements" };
                    self.out
                        .push_str(&format!(" {} {}", keyword, names.join(", ")));
                }
                self.out.push(' ');
                self.class_body(&c.members);
                self.out.push('\n');
            }
            NodeKind::Field {
                name,
                ty,
                visibility,
                init,
            } => {
                self.line_start();
                self.visibility(*visibility);
                self.out.push_str(&format!("{} {}", simple_name(ty), name));
                if let Some(init) = init {
                    self.out.push_str(" = ");
                    self.expr(*init);
                }
                self.out.push_str(";\n");
            }
            NodeKind::Method(m) => {
                self.line_start();
                self.visibility(m.visibility);
                self.out
                    .push_str(&format!("{} {}(", simple_name(&m.return_type), m.name));
                self.params(&m.params);
                self.out.push(')');
                match m.body {
                    Some(body) => {
                        self.out.push(' ');
                        self.block(body);
                        self.out.push('\n');
                    }
                    None => self.out.push_str(";\n"),
                }
            }
            NodeKind::Constructor {
                params,
                body,
                implicit,
            } => {
                if *implicit {
                    return;
                }
                self.line_start();
                let name = tree
                    .enclosing_class(id)
                    .and_then(|c| tree.name_of(c))
                    .map(simple_name)
                    .unwrap_or("<init>");
                self.out.push_str(&format!("{}(", name));
                self.params(params);
                self.out.push_str(") ");
                match body {
                    Some(body) => self.block(*body),
                    None => self.out.push_str("{}"),
                }
                self.out.push('\n');
            }
            NodeKind::Parameter { name, ty } => {
                self.out.push_str(&format!("{} {}", simple_name(ty), name));
            }
            NodeKind::Block { .. } => {
                self.line_start();
                self.block(id);
                self.out.push('\n');
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.line_start();
                self.if_chain(*cond, *then_branch, *else_branch);
                self.out.push('\n');
            }
            NodeKind::Switch { selector, cases } => {
                self.line_start();
                self.out.push_str("switch (");
                self.expr(*selector);
                self.out.push_str(") {\n");
                self.depth += 1;
                for case in cases {
                    self.item(*case);
                }
                self.depth -= 1;
                self.line_start();
                self.out.push_str("}\n");
            }
            NodeKind::Case { label, stmts } => {
                self.line_start();
                match label {
                    Some(label) => {
                        self.out.push_str("case ");
                        self.expr(*label);
                        self.out.push_str(":\n");
                    }
                    None => self.out.push_str("default:\n"),
                }
                self.depth += 1;
                for stmt in stmts {
                    self.item(*stmt);
                }
                self.depth -= 1;
            }
            NodeKind::Return { expr } => {
                self.line_start();
                self.out.push_str("return");
                if let Some(expr) = expr {
                    self.out.push(' ');
                    self.expr(*expr);
                }
                self.out.push_str(";\n");
            }
            NodeKind::Break => {
                self.line_start();
                self.out.push_str("break;\n");
            }
            NodeKind::LocalVariable { name, ty, init } => {
                self.line_start();
                self.out.push_str(&format!("{} {}", simple_name(ty), name));
                if let Some(init) = init {
                    self.out.push_str(" = ");
                    self.expr(*init);
                }
                self.out.push_str(";\n");
            }
            NodeKind::Invocation { .. }
            | NodeKind::VariableAccess { .. }
            | NodeKind::Assignment { .. }
            | NodeKind::ThisAccess
            | NodeKind::TypeAccess { .. }
            | NodeKind::Literal { .. }
            | NodeKind::Unary { .. }
            | NodeKind::Binary { .. }
            | NodeKind::Lambda { .. }
            | NodeKind::NewClass { .. }
            | NodeKind::Opaque { .. } => {
                self.line_start();
                self.expr(id);
                self.out.push_str(";\n");
            }
        }
    }

    fn if_chain(&mut self, cond: NodeId, then_branch: Option<NodeId>, else_branch: Option<NodeId>) {
        self.out.push_str("if (");
        self.expr(cond);
        self.out.push_str(") ");
        self.branch(then_branch);
        if let Some(else_branch) = else_branch {
            self.out.push_str(" else ");
            if let NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } = self.tree.kind(else_branch)
            {
                self.if_chain(*cond, *then_branch, *else_branch);
            } else {
                self.branch(Some(else_branch));
            }
        }
    }

    fn branch(&mut self, branch: Option<NodeId>) {
        match branch {
            Some(b) if matches!(self.tree.kind(b), NodeKind::Block { .. }) => self.block(b),
            Some(b) => {
                self.out.push_str("{\n");
                self.depth += 1;
                self.item(b);
                self.depth -= 1;
                self.line_start();
                self.out.push('}');
            }
            None => self.out.push_str("{}"),
        }
    }

    /// `{ ... }` without leading indentation or trailing newline.
    fn block(&mut self, id: NodeId) {
        let stmts = self.tree.block_stmts(id);
        if stmts.is_empty() {
            self.out.push_str("{}");
            return;
        }
        self.out.push_str("{\n");
        self.depth += 1;
        for stmt in stmts {
            self.item(*stmt);
        }
        self.depth -= 1;
        self.line_start();
        self.out.push('}');
    }

    fn class_body(&mut self, members: &[NodeId]) {
        let visible: Vec<NodeId> = members
            .iter()
            .copied()
            .filter(|m| !matches!(self.tree.kind(*m), NodeKind::Constructor { implicit: true, .. }))
            .collect();
        if visible.is_empty() {
            self.out.push_str("{}");
            return;
        }
        self.out.push_str("{\n");
        self.depth += 1;
        for member in visible {
            self.item(member);
        }
        self.depth -= 1;
        self.line_start();
        self.out.push('}');
    }

    fn params(&mut self, params: &[NodeId]) {
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.item(*param);
        }
    }

    fn args(&mut self, args: &[NodeId]) {
        self.out.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(*arg);
        }
        self.out.push(')');
    }

    /// Operand of a unary or binary operator, parenthesised when it binds looser.
    fn operand(&mut self, id: NodeId, min_precedence: u8) {
        let needs_parens = match self.tree.kind(id) {
            NodeKind::Binary { op, .. } => op.precedence() < min_precedence,
            NodeKind::Assignment { .. } | NodeKind::Lambda { .. } => true,
            _ => false,
        };
        if needs_parens {
            self.out.push('(');
            self.expr(id);
            self.out.push(')');
        } else {
            self.expr(id);
        }
    }

    fn expr(&mut self, id: NodeId) {
        let tree = self.tree;
        match tree.kind(id) {
            NodeKind::Invocation {
                target,
                method,
                args,
            } => {
                if let Some(target) = target {
                    self.operand(*target, u8::MAX);
                    self.out.push('.');
                }
                self.out.push_str(&method.name);
                self.args(args);
            }
            NodeKind::VariableAccess { name, target, .. } => {
                if let Some(target) = target {
                    self.operand(*target, u8::MAX);
                    self.out.push('.');
                }
                self.out.push_str(name);
            }
            NodeKind::Assignment { target, value } => {
                self.expr(*target);
                self.out.push_str(" = ");
                self.expr(*value);
            }
            NodeKind::ThisAccess => self.out.push_str("this"),
            NodeKind::TypeAccess { ty } => self.out.push_str(simple_name(ty)),
            NodeKind::Literal { value } => self.literal(value),
            NodeKind::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    self.out.push('!');
                    self.operand(*operand, u8::MAX);
                }
                UnaryOp::Neg => {
                    self.out.push('-');
                    self.operand(*operand, u8::MAX);
                }
                UnaryOp::PreInc => {
                    self.out.push_str("++");
                    self.operand(*operand, u8::MAX);
                }
                UnaryOp::PreDec => {
                    self.out.push_str("--");
                    self.operand(*operand, u8::MAX);
                }
                UnaryOp::PostInc => {
                    self.operand(*operand, u8::MAX);
                    self.out.push_str("++");
                }
                UnaryOp::PostDec => {
                    self.operand(*operand, u8::MAX);
                    self.out.push_str("--");
                }
            },
            NodeKind::Binary { op, lhs, rhs } => {
                self.operand(*lhs, op.precedence());
                self.out.push_str(&format!(" {} ", op.symbol()));
                self.operand(*rhs, op.precedence() + 1);
            }
            NodeKind::Lambda { params, body } => {
                let names: Vec<&str> = params.iter().filter_map(|p| tree.name_of(*p)).collect();
                if names.len() == 1 {
                    self.out.push_str(names[0]);
                } else {
                    self.out.push_str(&format!("({})", names.join(", ")));
                }
                self.out.push_str(" -> ");
                if matches!(tree.kind(*body), NodeKind::Block { .. }) {
                    self.block(*body);
                } else {
                    self.expr(*body);
                }
            }
            NodeKind::NewClass {
                ty,
                args,
                anonymous,
            } => {
                self.out.push_str(&format!("new {}", simple_name(ty)));
                self.args(args);
                if let Some(NodeKind::Class(c)) = anonymous.map(|a| tree.kind(a)) {
                    self.out.push(' ');
                    self.class_body(&c.members);
                }
            }
            NodeKind::Opaque { text } => self.out.push_str(text),
            NodeKind::Class(_)
            | NodeKind::Field { .. }
            | NodeKind::Method(_)
            | NodeKind::Constructor { .. }
            | NodeKind::Parameter { .. }
            | NodeKind::Block { .. }
            | NodeKind::If { .. }
            | NodeKind::Switch { .. }
            | NodeKind::Case { .. }
            | NodeKind::Return { .. }
            | NodeKind::Break
            | NodeKind::LocalVariable { .. } => {
                // Statement in expression position: render it inline.
                let mut nested = Printer {
                    tree,
                    out: String::new(),
                    depth: self.depth,
                };
                nested.item(id);
                self.out.push_str(nested.out.trim());
            }
        }
    }

    fn literal(&mut self, value: &Literal) {
        match value {
            Literal::String(s) => {
                self.out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => self.out.push_str("\\\""),
                        '\\' => self.out.push_str("\\\\"),
                        '\n' => self.out.push_str("\\n"),
                        '\t' => self.out.push_str("\\t"),
                        _ => self.out.push(c),
                    }
                }
                self.out.push('"');
            }
            Literal::Int(i) => self.out.push_str(&i.to_string()),
            Literal::Float(f) => self.out.push_str(&format!("{:?}", f)),
            Literal::Bool(b) => self.out.push_str(&b.to_string()),
            Literal::Char(c) => self.out.push_str(&format!("'{}'", c)),
            Literal::Null => self.out.push_str("null"),
        }
    }
}
