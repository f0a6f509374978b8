//! Arena syntax tree of the analysed GUI program
//!
//! The front-end fills a [`Tree`] with [`Node`]s addressed by [`NodeId`]
//! handles. Every node kind is a variant of the closed [`NodeKind`] enum, so
//! traversal and rewriting code matches exhaustively instead of probing node
//! classes at runtime.
//!
//! Nodes are built bottom-up: children are added first and [`Tree::add`] links
//! them to their new parent. Deleting a node only detaches it; its handle stays
//! valid so that later passes can still read it (a detached statement can be
//! cloned, printed or compared).
//!
//! Ancestor queries never fail: a node with no parent simply yields `None`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::ModelError;

/// Handle of a node inside its owning [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source range of a node: file and inclusive line span.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePosition {
    pub file: String,
    pub line: usize,
    pub end_line: usize,
}

impl SourcePosition {
    pub fn new(file: impl Into<String>, line: usize, end_line: usize) -> Self {
        Self {
            file: file.into(),
            line,
            end_line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Protected,
    Private,
    #[default]
    Package,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    And,
    Or,
    BitAnd,
    BitOr,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    InstanceOf,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::InstanceOf => "instanceof",
        }
    }

    /// Binding strength used when printing; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::BitOr => 3,
            BinaryOp::Xor => 4,
            BinaryOp::BitAnd => 5,
            BinaryOp::Eq | BinaryOp::Ne => 6,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::InstanceOf => 7,
            BinaryOp::Add | BinaryOp::Sub => 8,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 9,
        }
    }
}

/// Reference to a called method as resolved by the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutableRef {
    pub name: String,
    /// Qualified name of the type declaring the method.
    #[serde(default)]
    pub declaring_type: Option<String>,
    /// Declared parameter types of the callee.
    #[serde(default)]
    pub param_types: Vec<String>,
    /// Declaration of the callee when it belongs to the analysed program.
    #[serde(default)]
    pub decl: Option<NodeId>,
}

impl ExecutableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn declared_by(mut self, ty: impl Into<String>) -> Self {
        self.declaring_type = Some(ty.into());
        self
    }

    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.param_types = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn resolved_to(mut self, decl: NodeId) -> Self {
        self.decl = Some(decl);
        self
    }
}

/// Class, anonymous class or interface declaration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassDecl {
    /// Qualified name (`app.MainFrame`, `app.MainFrame$1` for anonymous classes).
    pub name: String,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub members: Vec<NodeId>,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub interface: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<NodeId>,
    #[serde(default = "void_type")]
    pub return_type: String,
    #[serde(default)]
    pub visibility: Visibility,
    /// `None` for abstract and interface methods.
    #[serde(default)]
    pub body: Option<NodeId>,
}

fn void_type() -> String {
    "void".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Class(ClassDecl),
    Field {
        name: String,
        ty: String,
        #[serde(default)]
        visibility: Visibility,
        #[serde(default)]
        init: Option<NodeId>,
    },
    Method(MethodDecl),
    Constructor {
        #[serde(default)]
        params: Vec<NodeId>,
        #[serde(default)]
        body: Option<NodeId>,
        #[serde(default)]
        implicit: bool,
    },
    Parameter {
        name: String,
        ty: String,
    },
    Block {
        #[serde(default)]
        stmts: Vec<NodeId>,
    },
    If {
        cond: NodeId,
        #[serde(default)]
        then_branch: Option<NodeId>,
        #[serde(default)]
        else_branch: Option<NodeId>,
    },
    Switch {
        selector: NodeId,
        #[serde(default)]
        cases: Vec<NodeId>,
    },
    /// `case label:`; a `default:` case has no label.
    Case {
        #[serde(default)]
        label: Option<NodeId>,
        #[serde(default)]
        stmts: Vec<NodeId>,
    },
    Return {
        #[serde(default)]
        expr: Option<NodeId>,
    },
    Break,
    LocalVariable {
        name: String,
        ty: String,
        #[serde(default)]
        init: Option<NodeId>,
    },
    Invocation {
        #[serde(default)]
        target: Option<NodeId>,
        method: ExecutableRef,
        #[serde(default)]
        args: Vec<NodeId>,
    },
    /// Read of a local variable, parameter or field (`target.name` for
    /// qualified field reads).
    VariableAccess {
        name: String,
        #[serde(default)]
        target: Option<NodeId>,
        #[serde(default)]
        decl: Option<NodeId>,
    },
    Assignment {
        target: NodeId,
        value: NodeId,
    },
    ThisAccess,
    TypeAccess {
        ty: String,
    },
    Literal {
        value: Literal,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    /// Closure; `body` is a block or a bare expression.
    Lambda {
        #[serde(default)]
        params: Vec<NodeId>,
        body: NodeId,
    },
    NewClass {
        ty: String,
        #[serde(default)]
        args: Vec<NodeId>,
        #[serde(default)]
        anonymous: Option<NodeId>,
    },
    /// Construct the front-end could not map; kept verbatim.
    Opaque {
        text: String,
    },
}

impl NodeKind {
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
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
                | NodeKind::Opaque { .. }
        )
    }

    pub fn is_executable(&self) -> bool {
        matches!(
            self,
            NodeKind::Method(_) | NodeKind::Constructor { .. } | NodeKind::Lambda { .. }
        )
    }

    /// `return` or `break`: control-flow plumbing at the end of a listener.
    pub fn is_jump(&self) -> bool {
        matches!(self, NodeKind::Return { .. } | NodeKind::Break)
    }

    pub fn as_class(&self) -> Option<&ClassDecl> {
        match self {
            NodeKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&MethodDecl> {
        match self {
            NodeKind::Method(m) => Some(m),
            _ => None,
        }
    }

    /// Declaration referenced by a variable access.
    pub fn accessed_decl(&self) -> Option<NodeId> {
        match self {
            NodeKind::VariableAccess { decl, .. } => *decl,
            _ => None,
        }
    }

    pub fn string_value(&self) -> Option<&str> {
        match self {
            NodeKind::Literal {
                value: Literal::String(s),
            } => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    #[serde(skip)]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<SourcePosition>,
    /// Static type of an expression, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
}

/// Fails on the first node found on a parent cycle.
fn check_acyclic(parents: &[Option<NodeId>]) -> Result<(), ModelError> {
    let mut done = vec![false; parents.len()];
    let mut on_path = vec![false; parents.len()];
    for start in 0..parents.len() {
        let mut path = Vec::new();
        let mut current = Some(NodeId(start));
        while let Some(id) = current {
            if done[id.0] {
                break;
            }
            if on_path[id.0] {
                return Err(ModelError::Cycle(id));
            }
            on_path[id.0] = true;
            path.push(id);
            current = parents[id.0];
        }
        for id in path {
            on_path[id.0] = false;
            done[id.0] = true;
        }
    }
    Ok(())
}

/// Children of a node, in source order.
fn child_ids(kind: &NodeKind) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut push = |id: &Option<NodeId>| out.extend(id.iter().copied());
    match kind {
        NodeKind::Class(c) => return c.members.clone(),
        NodeKind::Field { init, .. } | NodeKind::LocalVariable { init, .. } => push(init),
        NodeKind::Method(m) => {
            let mut ids = m.params.clone();
            ids.extend(m.body);
            return ids;
        }
        NodeKind::Constructor { params, body, .. } => {
            let mut ids = params.clone();
            ids.extend(*body);
            return ids;
        }
        NodeKind::Block { stmts } => return stmts.clone(),
        NodeKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let mut ids = vec![*cond];
            ids.extend(*then_branch);
            ids.extend(*else_branch);
            return ids;
        }
        NodeKind::Switch { selector, cases } => {
            let mut ids = vec![*selector];
            ids.extend(cases.iter().copied());
            return ids;
        }
        NodeKind::Case { label, stmts } => {
            let mut ids: Vec<NodeId> = label.iter().copied().collect();
            ids.extend(stmts.iter().copied());
            return ids;
        }
        NodeKind::Return { expr } => push(expr),
        NodeKind::Invocation { target, args, .. } => {
            let mut ids: Vec<NodeId> = target.iter().copied().collect();
            ids.extend(args.iter().copied());
            return ids;
        }
        NodeKind::VariableAccess { target, .. } => push(target),
        NodeKind::Assignment { target, value } => return vec![*target, *value],
        NodeKind::Unary { operand, .. } => return vec![*operand],
        NodeKind::Binary { lhs, rhs, .. } => return vec![*lhs, *rhs],
        NodeKind::Lambda { params, body } => {
            let mut ids = params.clone();
            ids.push(*body);
            return ids;
        }
        NodeKind::NewClass {
            args, anonymous, ..
        } => {
            let mut ids = args.clone();
            ids.extend(*anonymous);
            return ids;
        }
        NodeKind::Parameter { .. }
        | NodeKind::Break
        | NodeKind::ThisAccess
        | NodeKind::TypeAccess { .. }
        | NodeKind::Literal { .. }
        | NodeKind::Opaque { .. } => {}
    }
    out
}

/// Applies `f` to every child slot of a node.
fn for_each_child_mut(kind: &mut NodeKind, mut f: impl FnMut(&mut NodeId)) {
    fn opt(slot: &mut Option<NodeId>, f: &mut impl FnMut(&mut NodeId)) {
        if let Some(id) = slot {
            f(id);
        }
    }
    match kind {
        NodeKind::Class(c) => c.members.iter_mut().for_each(f),
        NodeKind::Field { init, .. } | NodeKind::LocalVariable { init, .. } => opt(init, &mut f),
        NodeKind::Method(m) => {
            m.params.iter_mut().for_each(&mut f);
            opt(&mut m.body, &mut f);
        }
        NodeKind::Constructor { params, body, .. } => {
            params.iter_mut().for_each(&mut f);
            opt(body, &mut f);
        }
        NodeKind::Block { stmts } => stmts.iter_mut().for_each(f),
        NodeKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            f(cond);
            opt(then_branch, &mut f);
            opt(else_branch, &mut f);
        }
        NodeKind::Switch { selector, cases } => {
            f(selector);
            cases.iter_mut().for_each(f);
        }
        NodeKind::Case { label, stmts } => {
            opt(label, &mut f);
            stmts.iter_mut().for_each(f);
        }
        NodeKind::Return { expr } => opt(expr, &mut f),
        NodeKind::Invocation { target, args, .. } => {
            opt(target, &mut f);
            args.iter_mut().for_each(f);
        }
        NodeKind::VariableAccess { target, .. } => opt(target, &mut f),
        NodeKind::Assignment { target, value } => {
            f(target);
            f(value);
        }
        NodeKind::Unary { operand, .. } => f(operand),
        NodeKind::Binary { lhs, rhs, .. } => {
            f(lhs);
            f(rhs);
        }
        NodeKind::Lambda { params, body } => {
            params.iter_mut().for_each(&mut f);
            f(body);
        }
        NodeKind::NewClass {
            args, anonymous, ..
        } => {
            args.iter_mut().for_each(&mut f);
            opt(anonymous, &mut f);
        }
        NodeKind::Parameter { .. }
        | NodeKind::Break
        | NodeKind::ThisAccess
        | NodeKind::TypeAccess { .. }
        | NodeKind::Literal { .. }
        | NodeKind::Opaque { .. } => {}
    }
}

/// Rewrites the declaration links (not children) held by a node.
fn remap_decls(kind: &mut NodeKind, map: &HashMap<NodeId, NodeId>) {
    match kind {
        NodeKind::VariableAccess {
            decl: Some(decl), ..
        } => {
            if let Some(new) = map.get(decl) {
                *decl = *new;
            }
        }
        NodeKind::Invocation { method, .. } => {
            if let Some(new) = method.decl.and_then(|d| map.get(&d)) {
                method.decl = Some(*new);
            }
        }
        _ => {}
    }
}

fn remove_from(list: &mut Vec<NodeId>, id: NodeId) -> bool {
    match list.iter().position(|c| *c == id) {
        Some(pos) => {
            list.remove(pos);
            true
        }
        None => false,
    }
}

fn take_if(slot: &mut Option<NodeId>, id: NodeId) -> bool {
    if *slot == Some(id) {
        *slot = None;
        true
    } else {
        false
    }
}

#[derive(Serialize, Deserialize)]
struct TreeRepr {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

/// The whole program model: an arena of nodes plus its top-level types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "TreeRepr", into = "TreeRepr")]
pub struct Tree {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl From<Tree> for TreeRepr {
    fn from(tree: Tree) -> Self {
        TreeRepr {
            nodes: tree.nodes,
            roots: tree.roots,
        }
    }
}

impl TryFrom<TreeRepr> for Tree {
    type Error = ModelError;

    fn try_from(repr: TreeRepr) -> Result<Self, Self::Error> {
        Tree::from_parts(repr.nodes, repr.roots)
    }
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from raw nodes, checking every handle and linking parents.
    ///
    /// Every node has at most one parent slot and no node is its own
    /// ancestor; ancestor walks rely on both.
    pub fn from_parts(nodes: Vec<Node>, roots: Vec<NodeId>) -> Result<Self, ModelError> {
        let len = nodes.len();
        let check = |id: NodeId| {
            if id.0 < len {
                Ok(())
            } else {
                Err(ModelError::DanglingNode(id))
            }
        };
        let mut parents: Vec<Option<NodeId>> = vec![None; len];
        for (idx, node) in nodes.iter().enumerate() {
            for child in child_ids(&node.kind) {
                check(child)?;
                if let Some(first) = parents[child.0].replace(NodeId(idx)) {
                    return Err(ModelError::SharedNode {
                        node: child,
                        first,
                        second: NodeId(idx),
                    });
                }
            }
            match &node.kind {
                NodeKind::VariableAccess { decl: Some(d), .. } => check(*d)?,
                NodeKind::Invocation { method, .. } => {
                    if let Some(d) = method.decl {
                        check(d)?;
                    }
                }
                _ => {}
            }
        }
        for root in &roots {
            check(*root)?;
        }
        check_acyclic(&parents)?;
        let mut tree = Self { nodes, roots };
        tree.relink();
        Ok(tree)
    }

    /// Recomputes every parent link from the child slots.
    pub fn relink(&mut self) {
        for node in &mut self.nodes {
            node.parent = None;
        }
        for idx in 0..self.nodes.len() {
            for child in child_ids(&self.nodes[idx].kind) {
                self.nodes[child.0].parent = Some(NodeId(idx));
            }
        }
    }

    /// Allocates a node and links the children it names to it.
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        let children = child_ids(&kind);
        self.nodes.push(Node {
            kind,
            parent: None,
            position: None,
            ty: None,
        });
        for child in children {
            self.nodes[child.0].parent = Some(id);
        }
        id
    }

    pub fn add_root(&mut self, id: NodeId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    pub fn set_position(&mut self, id: NodeId, position: SourcePosition) {
        self.nodes[id.0].position = Some(position);
    }

    pub fn set_type(&mut self, id: NodeId, ty: impl Into<String>) {
        self.nodes[id.0].ty = Some(ty.into());
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// Mutable access for in-place edits that keep the child slots unchanged
    /// (renames, interface lists, modifiers).
    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn position(&self, id: NodeId) -> Option<&SourcePosition> {
        self.nodes[id.0].position.as_ref()
    }

    pub fn type_of(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].ty.as_deref()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        child_ids(self.kind(id))
    }

    /// Strict ancestors, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |p| self.parent(*p))
    }

    /// Nearest strict ancestor whose kind satisfies `pred`.
    pub fn parent_matching(&self, id: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        self.ancestors(id).find(|a| pred(self.kind(*a)))
    }

    /// The node and all its descendants, pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let children = self.children(current);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Sub-tree search: every node under `root` (inclusive) matching `pred`.
    pub fn filter(&self, root: NodeId, pred: impl Fn(NodeId, &NodeKind) -> bool) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| pred(*id, self.kind(*id)))
            .collect()
    }

    /// Whether `node` is `ancestor` itself or lies beneath it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Whether the node is still reachable from a root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let top = self.ancestors(id).last().unwrap_or(id);
        self.roots.contains(&top)
    }

    /// Every node reachable from the roots, in document order.
    pub fn attached_nodes(&self) -> Vec<NodeId> {
        self.roots
            .iter()
            .flat_map(|root| self.descendants(*root))
            .collect()
    }

    /// Whether the node sits in a statement slot (block or case body,
    /// if-branch).
    pub fn is_statement(&self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        match self.kind(parent) {
            NodeKind::Block { stmts } | NodeKind::Case { stmts, .. } => stmts.contains(&id),
            NodeKind::If {
                then_branch,
                else_branch,
                ..
            } => *then_branch == Some(id) || *else_branch == Some(id),
            _ => false,
        }
    }

    /// Nearest strict ancestor in statement position.
    pub fn enclosing_statement(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id).find(|a| self.is_statement(*a))
    }

    /// The access itself when it is a statement, otherwise its enclosing one.
    pub fn statement_of(&self, id: NodeId) -> Option<NodeId> {
        if self.is_statement(id) {
            Some(id)
        } else {
            self.enclosing_statement(id)
        }
    }

    pub fn enclosing_executable(&self, id: NodeId) -> Option<NodeId> {
        self.parent_matching(id, NodeKind::is_executable)
    }

    pub fn enclosing_class(&self, id: NodeId) -> Option<NodeId> {
        self.parent_matching(id, |k| matches!(k, NodeKind::Class(_)))
    }

    /// Nearest enclosing class that is not anonymous.
    pub fn enclosing_named_class(&self, id: NodeId) -> Option<NodeId> {
        self.parent_matching(id, |k| matches!(k, NodeKind::Class(c) if !c.anonymous))
    }

    /// Declared type of a field, local variable or parameter.
    pub fn declared_type(&self, decl: NodeId) -> Option<&str> {
        match self.kind(decl) {
            NodeKind::Field { ty, .. }
            | NodeKind::LocalVariable { ty, .. }
            | NodeKind::Parameter { ty, .. } => Some(ty),
            _ => None,
        }
    }

    /// Name of a named declaration.
    pub fn name_of(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Field { name, .. }
            | NodeKind::LocalVariable { name, .. }
            | NodeKind::Parameter { name, .. }
            | NodeKind::VariableAccess { name, .. } => Some(name),
            NodeKind::Method(m) => Some(&m.name),
            NodeKind::Class(c) => Some(&c.name),
            _ => None,
        }
    }

    /// Visibility of a declaration; locals and parameters are package level.
    pub fn visibility_of(&self, decl: NodeId) -> Visibility {
        match self.kind(decl) {
            NodeKind::Field { visibility, .. } => *visibility,
            NodeKind::Method(m) => m.visibility,
            _ => Visibility::Package,
        }
    }

    /// Attached reads of a declaration, in document order.
    pub fn accesses_of(&self, decl: NodeId) -> Vec<NodeId> {
        self.attached_nodes()
            .into_iter()
            .filter(|id| self.kind(*id).accessed_decl() == Some(decl))
            .collect()
    }

    /// Reads of a declaration beneath `root`.
    pub fn accesses_within(&self, root: NodeId, decl: NodeId) -> Vec<NodeId> {
        self.filter(root, |_, k| k.accessed_decl() == Some(decl))
    }

    /// Looks a class or interface up by qualified or simple name.
    pub fn find_class(&self, name: &str) -> Option<NodeId> {
        let simple = !name.contains('.');
        self.attached_nodes().into_iter().find(|id| match self.kind(*id) {
            NodeKind::Class(c) => c.name == name || (simple && simple_name(&c.name) == name),
            _ => false,
        })
    }

    pub fn methods_by_name(&self, class: NodeId, name: &str) -> Vec<NodeId> {
        match self.kind(class) {
            NodeKind::Class(c) => c
                .members
                .iter()
                .copied()
                .filter(|m| matches!(self.kind(*m), NodeKind::Method(md) if md.name == name))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn executable_params(&self, exec: NodeId) -> &[NodeId] {
        match self.kind(exec) {
            NodeKind::Method(m) => &m.params,
            NodeKind::Constructor { params, .. } | NodeKind::Lambda { params, .. } => params,
            _ => &[],
        }
    }

    /// Body of an executable (a block, or the expression of a closure).
    pub fn executable_body(&self, exec: NodeId) -> Option<NodeId> {
        match self.kind(exec) {
            NodeKind::Method(m) => m.body,
            NodeKind::Constructor { body, .. } => *body,
            NodeKind::Lambda { body, .. } => Some(*body),
            _ => None,
        }
    }

    /// Statements of a block body; empty for non-block nodes.
    pub fn block_stmts(&self, block: NodeId) -> &[NodeId] {
        match self.kind(block) {
            NodeKind::Block { stmts } | NodeKind::Case { stmts, .. } => stmts,
            _ => &[],
        }
    }

    /// `name(ParamType, ...)` of a method, constructor or closure.
    pub fn signature(&self, exec: NodeId) -> String {
        let params: Vec<&str> = self
            .executable_params(exec)
            .iter()
            .filter_map(|p| self.declared_type(*p))
            .collect();
        let name = match self.kind(exec) {
            NodeKind::Method(m) => m.name.clone(),
            NodeKind::Constructor { .. } => self
                .enclosing_class(exec)
                .and_then(|c| self.name_of(c))
                .map(|n| simple_name(n).to_string())
                .unwrap_or_default(),
            _ => format!("lambda${}", exec.0),
        };
        format!("{}({})", name, params.join(","))
    }

    /// Root slot, top-level handle and child indices from the top down to `id`.
    fn path(&self, id: NodeId) -> (usize, usize, Vec<usize>) {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            let index = self
                .children(parent)
                .iter()
                .position(|c| *c == current)
                .unwrap_or(usize::MAX);
            path.push(index);
            current = parent;
        }
        path.reverse();
        let root = self
            .roots
            .iter()
            .position(|r| *r == current)
            .unwrap_or(usize::MAX);
        (root, current.0, path)
    }

    /// Source order of two nodes; detached sub-trees sort after attached ones.
    pub fn cmp_document_order(&self, a: NodeId, b: NodeId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        self.path(a).cmp(&self.path(b))
    }

    pub fn sort_document_order(&self, ids: &mut [NodeId]) {
        ids.sort_by(|a, b| self.cmp_document_order(*a, *b));
    }

    /// Detaches a node from its parent (or from the roots).
    ///
    /// Returns `false` when the node occupies a mandatory slot (an `if`
    /// condition, a binary operand...) and cannot be removed on its own.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return remove_from(&mut self.roots, id);
        };
        let removed = match &mut self.nodes[parent.0].kind {
            NodeKind::Class(c) => remove_from(&mut c.members, id),
            NodeKind::Field { init, .. } | NodeKind::LocalVariable { init, .. } => {
                take_if(init, id)
            }
            NodeKind::Method(m) => remove_from(&mut m.params, id) || take_if(&mut m.body, id),
            NodeKind::Constructor { params, body, .. } => {
                remove_from(params, id) || take_if(body, id)
            }
            NodeKind::Block { stmts } => remove_from(stmts, id),
            NodeKind::If {
                then_branch,
                else_branch,
                ..
            } => take_if(then_branch, id) || take_if(else_branch, id),
            NodeKind::Switch { cases, .. } => remove_from(cases, id),
            NodeKind::Case { label, stmts } => take_if(label, id) || remove_from(stmts, id),
            NodeKind::Return { expr } => take_if(expr, id),
            NodeKind::Invocation { target, args, .. } => {
                take_if(target, id) || remove_from(args, id)
            }
            NodeKind::VariableAccess { target, .. } => take_if(target, id),
            NodeKind::Lambda { params, .. } => remove_from(params, id),
            NodeKind::NewClass {
                args, anonymous, ..
            } => remove_from(args, id) || take_if(anonymous, id),
            NodeKind::Assignment { .. }
            | NodeKind::Unary { .. }
            | NodeKind::Binary { .. }
            | NodeKind::Parameter { .. }
            | NodeKind::Break
            | NodeKind::ThisAccess
            | NodeKind::TypeAccess { .. }
            | NodeKind::Literal { .. }
            | NodeKind::Opaque { .. } => false,
        };
        if removed {
            self.nodes[id.0].parent = None;
        }
        removed
    }

    /// Puts `new` in the slot `old` occupies; `old` becomes detached.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> bool {
        let Some(parent) = self.parent(old) else {
            return false;
        };
        let mut replaced = false;
        for_each_child_mut(&mut self.nodes[parent.0].kind, |slot| {
            if *slot == old && !replaced {
                *slot = new;
                replaced = true;
            }
        });
        if replaced {
            if let Some(previous) = self.parent(new) {
                if previous != parent {
                    self.detach(new);
                }
            }
            self.nodes[old.0].parent = None;
            self.nodes[new.0].parent = Some(parent);
        }
        replaced
    }

    /// Turns `if (c) T else E` into `if (!c) { E }`, dropping `T`.
    ///
    /// Returns `false` when `id` is not an `if` with an else branch.
    pub fn invert_if(&mut self, id: NodeId) -> bool {
        let NodeKind::If {
            cond,
            then_branch,
            else_branch: Some(other),
        } = self.nodes[id.0].kind.clone()
        else {
            return false;
        };
        let negated = self.add(NodeKind::Unary {
            op: UnaryOp::Not,
            operand: cond,
        });
        self.nodes[negated.0].ty = Some("boolean".to_string());
        let body = match self.kind(other) {
            NodeKind::Block { .. } => other,
            _ => self.add(NodeKind::Block { stmts: vec![other] }),
        };
        if let Some(then) = then_branch {
            self.nodes[then.0].parent = None;
        }
        self.nodes[id.0].kind = NodeKind::If {
            cond: negated,
            then_branch: Some(body),
            else_branch: None,
        };
        self.nodes[negated.0].parent = Some(id);
        self.nodes[body.0].parent = Some(id);
        true
    }

    /// Appends a statement to a block or case body.
    pub fn push_stmt(&mut self, block: NodeId, stmt: NodeId) {
        if let NodeKind::Block { stmts } | NodeKind::Case { stmts, .. } = &mut self.nodes[block.0].kind
        {
            stmts.push(stmt);
            self.nodes[stmt.0].parent = Some(block);
        }
    }

    /// Appends a member to a class.
    pub fn push_member(&mut self, class: NodeId, member: NodeId) {
        if let NodeKind::Class(c) = &mut self.nodes[class.0].kind {
            c.members.push(member);
            self.nodes[member.0].parent = Some(class);
        }
    }

    /// Copies the sub-trees rooted at `roots` as detached nodes.
    ///
    /// Declaration links that point inside the copied set are redirected to
    /// the copies; links to outside declarations are kept. Returns the new
    /// roots (same order) and the old-to-new handle map.
    pub fn deep_clone(&mut self, roots: &[NodeId]) -> (Vec<NodeId>, HashMap<NodeId, NodeId>) {
        let mut map: HashMap<NodeId, NodeId> = HashMap::new();
        let mut order = Vec::new();
        for root in roots {
            for old in self.descendants(*root) {
                if let std::collections::hash_map::Entry::Vacant(e) = map.entry(old) {
                    let new = NodeId(self.nodes.len());
                    let mut copy = self.nodes[old.0].clone();
                    copy.parent = None;
                    self.nodes.push(copy);
                    e.insert(new);
                    order.push(old);
                }
            }
        }
        for old in &order {
            let new = map[old];
            let mut kind = std::mem::replace(&mut self.nodes[new.0].kind, NodeKind::Break);
            for_each_child_mut(&mut kind, |c| {
                if let Some(n) = map.get(c) {
                    *c = *n;
                }
            });
            remap_decls(&mut kind, &map);
            for child in child_ids(&kind) {
                self.nodes[child.0].parent = Some(new);
            }
            self.nodes[new.0].kind = kind;
        }
        let new_roots = roots.iter().map(|r| map[r]).collect();
        (new_roots, map)
    }

    /// Points every read of `from` beneath `root` at `to`.
    pub fn rebind(&mut self, root: NodeId, from: NodeId, to: NodeId) {
        for access in self.accesses_within(root, from) {
            if let NodeKind::VariableAccess { decl, .. } = &mut self.nodes[access.0].kind {
                *decl = Some(to);
            }
        }
    }

    /// Declarations (fields, locals, parameters) read beneath `root`.
    pub fn referenced_decls(&self, root: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.descendants(root)
            .into_iter()
            .filter_map(|id| self.kind(id).accessed_decl())
            .filter(|d| seen.insert(*d))
            .collect()
    }
}

/// Last segment of a qualified name.
pub fn simple_name(qualified: &str) -> &str {
    qualified
        .rsplit(|c| c == '.' || c == '$')
        .next()
        .unwrap_or(qualified)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new();
        let local = tree.add(NodeKind::LocalVariable {
            name: "x".into(),
            ty: "int".into(),
            init: None,
        });
        let read = tree.add(NodeKind::VariableAccess {
            name: "x".into(),
            target: None,
            decl: Some(local),
        });
        let ret = tree.add(NodeKind::Return { expr: Some(read) });
        let block = tree.add(NodeKind::Block {
            stmts: vec![local, ret],
        });
        let method = tree.add(NodeKind::Method(MethodDecl {
            name: "run".into(),
            body: Some(block),
            return_type: "int".into(),
            ..MethodDecl::default()
        }));
        let class = tree.add(NodeKind::Class(ClassDecl {
            name: "app.Main".into(),
            members: vec![method],
            ..ClassDecl::default()
        }));
        tree.add_root(class);
        (tree, local, read, ret)
    }

    #[test]
    fn test_parents_are_linked_bottom_up() {
        let (tree, local, read, ret) = sample();
        assert_eq!(tree.parent(read), Some(ret));
        assert!(tree.is_statement(local));
        assert!(!tree.is_statement(read));
        assert_eq!(tree.enclosing_statement(read), Some(ret));
        assert!(tree.enclosing_executable(read).is_some());
    }

    #[test]
    fn test_detach_keeps_handle_readable() {
        let (mut tree, local, read, ret) = sample();
        assert!(tree.detach(ret));
        assert!(!tree.is_attached(ret));
        assert!(tree.is_attached(local));
        assert!(tree.accesses_of(local).is_empty());
        assert_eq!(tree.accesses_within(ret, local), vec![read]);
    }

    #[test]
    fn test_mandatory_slot_cannot_be_detached() {
        let mut tree = Tree::new();
        let lhs = tree.add(NodeKind::Literal {
            value: Literal::Int(1),
        });
        let rhs = tree.add(NodeKind::Literal {
            value: Literal::Int(2),
        });
        tree.add(NodeKind::Binary {
            op: BinaryOp::Add,
            lhs,
            rhs,
        });
        assert!(!tree.detach(lhs));
    }

    #[test]
    fn test_deep_clone_remaps_internal_declarations() {
        let (mut tree, local, read, ret) = sample();
        let (copies, map) = tree.deep_clone(&[local, ret]);
        assert_eq!(copies.len(), 2);
        let new_read = map[&read];
        assert_eq!(tree.kind(new_read).accessed_decl(), Some(copies[0]));
        assert!(!tree.is_attached(copies[1]));
        // Cloning a lone statement keeps the link to the outside declaration.
        let (single, _) = tree.deep_clone(&[ret]);
        let inner = tree.children(single[0])[0];
        assert_eq!(tree.kind(inner).accessed_decl(), Some(local));
    }

    #[test]
    fn test_document_order() {
        let (tree, local, read, ret) = sample();
        assert_eq!(tree.cmp_document_order(local, ret), Ordering::Less);
        assert_eq!(tree.cmp_document_order(read, local), Ordering::Greater);
        let mut ids = vec![ret, read, local];
        tree.sort_document_order(&mut ids);
        assert_eq!(ids, vec![local, ret, read]);
    }

    #[test]
    fn test_replace_relinks() {
        let (mut tree, _, read, ret) = sample();
        let lit = tree.add(NodeKind::Literal {
            value: Literal::Int(3),
        });
        assert!(tree.replace(read, lit));
        assert_eq!(tree.parent(lit), Some(ret));
        assert_eq!(tree.parent(read), None);
    }

    #[test]
    fn test_serde_round_trip_relinks_parents() {
        let (tree, _, read, ret) = sample();
        let json = serde_json::to_string(&tree).unwrap();
        let back: Tree = serde_json::from_str(&json).unwrap();
        assert_eq!(back.parent(read), Some(ret));
        assert_eq!(back.len(), tree.len());
    }

    #[test]
    fn test_dangling_handle_is_rejected() {
        let json = r#"{"nodes":[{"kind":{"type":"block","stmts":[7]}}],"roots":[0]}"#;
        assert!(serde_json::from_str::<Tree>(json).is_err());
    }

    #[test]
    fn test_invert_if_keeps_else_branch() {
        let mut tree = Tree::new();
        let cond = tree.add(NodeKind::Opaque { text: "c".into() });
        let then = tree.add(NodeKind::Block { stmts: vec![] });
        let call = tree.add(NodeKind::Opaque { text: "b()".into() });
        let other = tree.add(NodeKind::Block { stmts: vec![call] });
        let guard = tree.add(NodeKind::If {
            cond,
            then_branch: Some(then),
            else_branch: Some(other),
        });
        let body = tree.add(NodeKind::Block { stmts: vec![guard] });
        tree.add_root(body);

        assert!(tree.invert_if(guard));
        let NodeKind::If {
            cond: negated,
            then_branch,
            else_branch,
        } = tree.kind(guard).clone()
        else {
            panic!("expected an if");
        };
        assert_eq!(then_branch, Some(other));
        assert_eq!(else_branch, None);
        assert_eq!(tree.parent(cond), Some(negated));
        assert_eq!(tree.parent(negated), Some(guard));
        assert!(tree.contains(body, call));
        assert!(!tree.is_attached(then));
        assert!(!tree.invert_if(guard));
    }

    #[test]
    fn test_self_parent_is_rejected() {
        let block = Node {
            kind: NodeKind::Block {
                stmts: vec![NodeId(0)],
            },
            parent: None,
            position: None,
            ty: None,
        };
        assert!(matches!(
            Tree::from_parts(vec![block], vec![NodeId(0)]),
            Err(ModelError::Cycle(NodeId(0)))
        ));
    }

    #[test]
    fn test_cycle_through_several_nodes_is_rejected() {
        let json = r#"{"nodes":[
            {"kind":{"type":"block","stmts":[1]}},
            {"kind":{"type":"block","stmts":[2]}},
            {"kind":{"type":"block","stmts":[0]}}
        ],"roots":[0]}"#;
        assert!(serde_json::from_str::<Tree>(json).is_err());
    }

    #[test]
    fn test_node_in_two_slots_is_rejected() {
        let mut tree = Tree::new();
        let stmt = tree.add(NodeKind::Break);
        let first = tree.add(NodeKind::Block { stmts: vec![stmt] });
        let second = tree.add(NodeKind::Block { stmts: vec![stmt] });
        let outer = tree.add(NodeKind::Block {
            stmts: vec![first, second],
        });
        tree.add_root(outer);
        let repr = TreeRepr::from(tree);
        assert!(matches!(
            Tree::from_parts(repr.nodes, repr.roots),
            Err(ModelError::SharedNode { node, first: f, second: s })
                if node == stmt && f == first && s == second
        ));
    }

    #[test]
    fn test_simple_name() {
        assert_eq!(simple_name("javax.swing.JButton"), "JButton");
        assert_eq!(simple_name("app.Main$1"), "1");
        assert_eq!(simple_name("int"), "int");
    }
}
