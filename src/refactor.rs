//! Listener refactorer
//!
//! Moves one command out of a multi-command listener into a dedicated
//! listener (a closure or an anonymous class) registered on the widget the
//! command was attributed to, then deletes the dead code the move leaves in
//! the original listener.
//!
//! Refactoring mutates the tree and must run one command at a time.

use serde::Serialize;
use std::collections::HashSet;

use crate::command::Command;
use crate::conditions::GuardSide;
use crate::error::{AnalysisError, AnalysisResult};
use crate::finder::WidgetFinderEntry;
use crate::toolkit::{erase_generics, ListenerMethod, Toolkit};
use crate::tree::{
    simple_name, ClassDecl, MethodDecl, NodeId, NodeKind, Tree, UnaryOp, Visibility,
};
use crate::widgets::{UsageId, WidgetRegistry};

/// A widget whose registration now receives the extracted listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedSplit {
    pub usage: UsageId,
    pub registration: NodeId,
    /// The closure or `new Listener() { ... }` expression.
    pub listener: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSplit {
    pub usage: UsageId,
    pub reason: String,
}

/// Outcome of refactoring one command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefactorReport {
    /// Signature of the original listener.
    pub listener: String,
    pub applied: Vec<AppliedSplit>,
    pub skipped: Vec<SkippedSplit>,
    /// Whether the original listener method ended up empty and was deleted.
    pub listener_removed: bool,
}

impl RefactorReport {
    pub fn is_applied(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Registration found for a widget usage, with the listener type it expects.
struct Registration {
    usage: UsageId,
    call: NodeId,
    iface: String,
    /// Callback to implement when building an anonymous class.
    callback: Option<ListenerMethod>,
}

/// Splits commands out of their listeners.
pub struct ListenerCommandRefactor<'a> {
    toolkit: &'a Toolkit,
    registry: &'a WidgetRegistry,
    as_lambda: bool,
}

impl<'a> ListenerCommandRefactor<'a> {
    /// # Arguments
    ///
    /// * `as_lambda` - build closures instead of anonymous classes
    pub fn new(toolkit: &'a Toolkit, registry: &'a WidgetRegistry, as_lambda: bool) -> Self {
        Self {
            toolkit,
            registry,
            as_lambda,
        }
    }

    /// Extracts `cmd` for every widget of `widgets`.
    ///
    /// A widget whose registration call cannot be identified uniquely is
    /// skipped and reported; the others proceed. When no widget qualifies the
    /// tree is left untouched.
    pub fn execute(
        &self,
        tree: &mut Tree,
        cmd: &Command,
        widgets: &WidgetFinderEntry,
    ) -> RefactorReport {
        let exec = cmd.executable();
        let mut report = RefactorReport {
            listener: tree.signature(exec),
            ..RefactorReport::default()
        };
        let exec_iface = self.toolkit.listener_interface_of(tree, exec);

        let mut registrations = Vec::new();
        for usage in widgets.widget_usages() {
            match self.registration_of(tree, usage, exec_iface.as_deref()) {
                Ok(found) => registrations.push(found),
                Err(err) => self.skip(&mut report, usage, err),
            }
        }

        // Anonymous classes need the callback to implement: look it up
        // before touching the tree.
        if !self.as_lambda {
            let hint = tree.kind(exec).as_method().map(|m| m.name.clone()).unwrap_or_default();
            let mut kept = Vec::new();
            for mut reg in registrations {
                match self.toolkit.abstract_method(tree, &reg.iface, &hint) {
                    Ok(callback) => {
                        reg.callback = Some(callback);
                        kept.push(reg);
                    }
                    Err(err) => self.skip(&mut report, reg.usage, err),
                }
            }
            registrations = kept;
        }
        if registrations.is_empty() {
            return report;
        }

        strip_trailing_jump(tree, exec);
        let local = cmd.local_statements_ordered(tree);
        let mut source = needed_locals(tree, exec, &local);
        source.extend(cmd.inlined_statements_ordered(tree));

        let mut old_args = Vec::new();
        for reg in &registrations {
            let NodeKind::Invocation { args, .. } = tree.kind(reg.call) else {
                continue;
            };
            let Some(&old_arg) = args.first() else {
                continue;
            };
            let listener = match &reg.callback {
                Some(callback) => self.build_anonymous_class(tree, exec, &source, reg, callback),
                None => self.build_lambda(tree, exec, &source, &reg.iface),
            };
            if !tree.replace(old_arg, listener) {
                self.skip(
                    &mut report,
                    reg.usage,
                    AnalysisError::StructuralPrecondition(format!(
                        "cannot replace the argument of registration {}",
                        reg.call
                    )),
                );
                continue;
            }
            tracing::debug!(
                "{}: {} now registers {}",
                report.listener,
                self.registry.name(tree, reg.usage),
                listener
            );
            old_args.push(old_arg);
            report.applied.push(AppliedSplit {
                usage: reg.usage,
                registration: reg.call,
                listener,
            });
        }

        if report.is_applied() {
            report.listener_removed = self.remove_old_command(tree, cmd, &local, exec_iface.as_deref());
            for old_arg in old_args {
                remove_dead_listener_variable(tree, old_arg);
            }
            self.remove_action_command_statements(tree, widgets);
        }
        report
    }

    fn skip(&self, report: &mut RefactorReport, usage: UsageId, err: AnalysisError) {
        tracing::error!(
            "{}: cannot split for widget {}: {}",
            report.listener,
            usage,
            err
        );
        report.skipped.push(SkippedSplit {
            usage,
            reason: err.to_string(),
        });
    }

    /// The unique registration call among the access statements of a widget:
    /// one argument typed with a listener interface (`iface` when known).
    fn registration_of(
        &self,
        tree: &Tree,
        usage: UsageId,
        iface: Option<&str>,
    ) -> AnalysisResult<Registration> {
        let mut calls: Vec<NodeId> = Vec::new();
        for stmt in self.registry.get(usage).access_statements(tree) {
            for call in tree.filter(stmt, |id, _| self.toolkit.registers_interface(tree, id, iface)) {
                if !calls.contains(&call) {
                    calls.push(call);
                }
            }
        }
        let name = self.registry.name(tree, usage);
        let call = match calls.as_slice() {
            [call] => *call,
            [] => {
                return Err(AnalysisError::UnresolvedReference(format!(
                    "no listener registration on `{}`",
                    name
                )))
            }
            _ => {
                return Err(AnalysisError::AmbiguousEvidence(format!(
                    "{} listener registrations on `{}`",
                    calls.len(),
                    name
                )))
            }
        };

        let declared = match tree.kind(call) {
            NodeKind::Invocation { method, .. } => method.param_types.first().cloned(),
            _ => None,
        };
        let iface = declared
            .map(|ty| erase_generics(&ty).to_string())
            .or_else(|| iface.map(str::to_string))
            .ok_or_else(|| {
                AnalysisError::StructuralPrecondition(format!(
                    "listener type of the registration on `{}` is unknown",
                    name
                ))
            })?;
        Ok(Registration {
            usage,
            call,
            iface,
            callback: None,
        })
    }

    /// Deletes the `setActionCommand(...)`-like statements of the attributed
    /// widgets, then the non-public constants they read that are used in
    /// fewer than two places, their declaration included. Runs on the final
    /// tree: a guard left in the listener still counts. Widget variables are
    /// kept.
    fn remove_action_command_statements(&self, tree: &mut Tree, widgets: &WidgetFinderEntry) {
        let mut removed = Vec::new();
        for usage in widgets.widget_usages() {
            for stmt in self.registry.get(usage).access_statements(tree) {
                let sets_command = !tree
                    .filter(stmt, |_, k| {
                        matches!(k, NodeKind::Invocation { method, .. }
                            if self.toolkit.is_action_command_method(&method.name))
                    })
                    .is_empty();
                if sets_command && tree.detach(stmt) {
                    removed.push(stmt);
                }
            }
        }

        let mut decls: Vec<NodeId> = Vec::new();
        for stmt in &removed {
            for decl in tree.referenced_decls(*stmt) {
                if !decls.contains(&decl) {
                    decls.push(decl);
                }
            }
        }
        for decl in decls {
            let is_variable = matches!(
                tree.kind(decl),
                NodeKind::Field { .. } | NodeKind::LocalVariable { .. }
            );
            if !is_variable
                || tree.visibility_of(decl) == Visibility::Public
                || self.registry.usage_of_decl(decl).is_some()
                || !tree.is_attached(decl)
            {
                continue;
            }
            if tree.accesses_of(decl).is_empty() && tree.detach(decl) {
                tracing::debug!("removed action command `{}`", tree.name_of(decl).unwrap_or("?"));
            }
        }
    }

    /// Clones the command statements and rebinds the listener parameters to
    /// `params`. Returns the cleaned clone.
    fn clone_body(&self, tree: &mut Tree, exec: NodeId, source: &[NodeId], params: &[NodeId]) -> Vec<NodeId> {
        let (mut stmts, _) = tree.deep_clone(source);
        strip_last_jump(tree, &mut stmts);
        let old_params = tree.executable_params(exec).to_vec();
        for (old, new) in old_params.iter().zip(params) {
            for stmt in &stmts {
                tree.rebind(*stmt, *old, *new);
            }
        }
        remove_unused_locals(tree, &mut stmts);
        stmts
    }

    fn build_lambda(&self, tree: &mut Tree, exec: NodeId, source: &[NodeId], iface: &str) -> NodeId {
        let copied: Vec<(String, String)> = tree
            .executable_params(exec)
            .iter()
            .filter_map(|p| match tree.kind(*p) {
                NodeKind::Parameter { name, ty } => Some((name.clone(), ty.clone())),
                _ => None,
            })
            .collect();
        let params: Vec<NodeId> = copied
            .into_iter()
            .map(|(name, ty)| tree.add(NodeKind::Parameter { name, ty }))
            .collect();
        let stmts = self.clone_body(tree, exec, source, &params);
        let body = match stmts.as_slice() {
            [single] if tree.kind(*single).is_expression() => *single,
            _ => tree.add(NodeKind::Block { stmts }),
        };
        let lambda = tree.add(NodeKind::Lambda { params, body });
        tree.set_type(lambda, iface);
        lambda
    }

    /// `new Iface() { public R callback(P e) { ... } }` with an implicit
    /// no-arg constructor.
    fn build_anonymous_class(
        &self,
        tree: &mut Tree,
        exec: NodeId,
        source: &[NodeId],
        reg: &Registration,
        callback: &ListenerMethod,
    ) -> NodeId {
        let first_name = tree
            .executable_params(exec)
            .first()
            .and_then(|p| tree.name_of(*p))
            .unwrap_or("e")
            .to_string();
        let params: Vec<NodeId> = callback
            .param_types
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                let name = if i == 0 {
                    first_name.clone()
                } else {
                    format!("arg{}", i)
                };
                tree.add(NodeKind::Parameter {
                    name,
                    ty: ty.clone(),
                })
            })
            .collect();
        let stmts = self.clone_body(tree, exec, source, &params);
        let body = tree.add(NodeKind::Block { stmts });
        let method = tree.add(NodeKind::Method(MethodDecl {
            name: callback.name.clone(),
            params,
            return_type: callback.return_type.clone(),
            visibility: Visibility::Public,
            body: Some(body),
        }));
        let ctor_body = tree.add(NodeKind::Block { stmts: Vec::new() });
        let ctor = tree.add(NodeKind::Constructor {
            params: Vec::new(),
            body: Some(ctor_body),
            implicit: true,
        });

        let outer = tree
            .enclosing_named_class(reg.call)
            .and_then(|c| tree.name_of(c))
            .unwrap_or("Anonymous")
            .to_string();
        let prefix = format!("{}$split", outer);
        let taken = tree
            .attached_nodes()
            .into_iter()
            .filter(|id| matches!(tree.kind(*id), NodeKind::Class(c) if c.name.starts_with(&prefix)))
            .count();
        let class = tree.add(NodeKind::Class(ClassDecl {
            name: format!("{}{}", prefix, taken + 1),
            superclass: None,
            interfaces: vec![reg.iface.clone()],
            members: vec![ctor, method],
            anonymous: true,
            interface: false,
        }));
        let new_class = tree.add(NodeKind::NewClass {
            ty: reg.iface.clone(),
            args: Vec::new(),
            anonymous: Some(class),
        });
        tree.set_type(new_class, reg.iface.clone());
        new_class
    }

    /// Deletes the command from its original listener, then the guards it
    /// leaves empty, the unused locals, and the listener method itself when
    /// its body is empty. Returns whether the method was deleted.
    fn remove_old_command(
        &self,
        tree: &mut Tree,
        cmd: &Command,
        local: &[NodeId],
        exec_iface: Option<&str>,
    ) -> bool {
        for stmt in local {
            tree.detach(*stmt);
        }

        for cond in cmd.conditions() {
            let construct = cond.construct(tree);
            if cond.side == GuardSide::Case && is_empty_statement(tree, cond.real) {
                tree.detach(cond.real);
            }
            let Some(construct) = construct else {
                continue;
            };
            if is_empty_statement(tree, construct) {
                tree.detach(construct);
            } else {
                collapse_empty_branch(tree, construct);
            }
        }

        let exec = cmd.executable();
        let Some(body) = tree.executable_body(exec) else {
            return false;
        };
        let mut roots = vec![body];
        remove_unused_locals(tree, &mut roots);

        let is_method = matches!(tree.kind(exec), NodeKind::Method(_));
        if !is_method || !tree.block_stmts(body).is_empty() {
            return false;
        }
        let class = tree.parent(exec);
        if !tree.detach(exec) {
            return false;
        }
        if let (Some(class), Some(iface)) = (class, exec_iface) {
            let still_implemented = tree.children(class).into_iter().any(|m| {
                self.toolkit.listener_interface_of(tree, m).as_deref() == Some(iface)
            });
            if !still_implemented {
                if let NodeKind::Class(decl) = tree.kind_mut(class) {
                    decl.interfaces.retain(|i| {
                        erase_generics(i) != erase_generics(iface)
                            && simple_name(erase_generics(i)) != simple_name(erase_generics(iface))
                    });
                }
            }
        }
        true
    }
}

/// Drops a trailing `return` / `break` of a listener body.
fn strip_trailing_jump(tree: &mut Tree, exec: NodeId) {
    let Some(body) = tree.executable_body(exec) else {
        return;
    };
    if let Some(&last) = tree.block_stmts(body).last() {
        if tree.kind(last).is_jump() {
            tree.detach(last);
        }
    }
}

/// Drops the last cloned statement when it is a jump; `return e;` keeps `e`.
fn strip_last_jump(tree: &mut Tree, stmts: &mut Vec<NodeId>) {
    let Some(&last) = stmts.last() else {
        return;
    };
    match tree.kind(last) {
        NodeKind::Return { expr: Some(expr) } => {
            let expr = *expr;
            tree.detach(expr);
            if let Some(slot) = stmts.last_mut() {
                *slot = expr;
            }
        }
        NodeKind::Return { expr: None } | NodeKind::Break => {
            stmts.pop();
        }
        _ => {}
    }
}

/// Local declarations of the listener, outside `stmts`, that `stmts` read
/// (directly or through the initializers of other such locals), in document
/// order.
fn needed_locals(tree: &Tree, exec: NodeId, stmts: &[NodeId]) -> Vec<NodeId> {
    let Some(body) = tree.executable_body(exec) else {
        return Vec::new();
    };
    let mut found: Vec<NodeId> = Vec::new();
    let mut pending: Vec<NodeId> = stmts.iter().flat_map(|s| tree.referenced_decls(*s)).collect();
    while let Some(decl) = pending.pop() {
        let local = matches!(tree.kind(decl), NodeKind::LocalVariable { .. })
            && tree.contains(body, decl)
            && !stmts.iter().any(|s| tree.contains(*s, decl));
        if !local || found.contains(&decl) {
            continue;
        }
        found.push(decl);
        pending.extend(tree.referenced_decls(decl));
    }
    tree.sort_document_order(&mut found);
    found
}

/// Whether an expression can be dropped without losing a side effect.
fn is_pure(tree: &Tree, expr: NodeId) -> bool {
    match tree.kind(expr) {
        NodeKind::Literal { .. }
        | NodeKind::ThisAccess
        | NodeKind::TypeAccess { .. }
        | NodeKind::Lambda { .. } => true,
        NodeKind::VariableAccess { target, .. } => target.map_or(true, |t| is_pure(tree, t)),
        NodeKind::Unary { op, operand } => {
            matches!(op, UnaryOp::Not | UnaryOp::Neg) && is_pure(tree, *operand)
        }
        NodeKind::Binary { lhs, rhs, .. } => is_pure(tree, *lhs) && is_pure(tree, *rhs),
        _ => false,
    }
}

/// Removes, until none is left, the local variables beneath `roots` that are
/// never read and whose initializer has no side effect. Top-level locals are
/// taken out of `roots`, nested ones are detached.
fn remove_unused_locals(tree: &mut Tree, roots: &mut Vec<NodeId>) -> usize {
    let mut removed = 0;
    let mut stuck: HashSet<NodeId> = HashSet::new();
    loop {
        let nodes: Vec<NodeId> = roots.iter().flat_map(|r| tree.descendants(*r)).collect();
        let read: HashSet<NodeId> = nodes
            .iter()
            .filter_map(|n| tree.kind(*n).accessed_decl())
            .collect();
        let unused = nodes.iter().copied().find(|id| {
            !stuck.contains(id)
                && !read.contains(id)
                && matches!(tree.kind(*id), NodeKind::LocalVariable { init, .. }
                    if init.map_or(true, |i| is_pure(tree, i)))
        });
        let Some(local) = unused else {
            return removed;
        };
        if let Some(pos) = roots.iter().position(|r| *r == local) {
            roots.remove(pos);
        } else if !tree.detach(local) {
            stuck.insert(local);
            continue;
        }
        removed += 1;
    }
}

/// `if (c) {} else E` becomes `if (!c) E`; `if (c) T else {}` loses its
/// else branch.
fn collapse_empty_branch(tree: &mut Tree, construct: NodeId) {
    let NodeKind::If {
        then_branch,
        else_branch: Some(other),
        ..
    } = *tree.kind(construct)
    else {
        return;
    };
    if is_empty_statement(tree, other) {
        tree.detach(other);
    } else if then_branch.map_or(true, |t| is_empty_statement(tree, t)) {
        tree.invert_if(construct);
    }
}

/// Whether a statement does nothing once the command is gone.
fn is_empty_statement(tree: &Tree, id: NodeId) -> bool {
    match tree.kind(id) {
        NodeKind::Block { stmts } => stmts.iter().all(|s| is_empty_statement(tree, *s)),
        NodeKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            then_branch.map_or(true, |b| is_empty_statement(tree, b))
                && else_branch.map_or(true, |b| is_empty_statement(tree, b))
        }
        NodeKind::Switch { cases, .. } => cases.iter().all(|c| is_empty_statement(tree, *c)),
        NodeKind::Case { stmts, .. } => stmts
            .iter()
            .all(|s| matches!(tree.kind(*s), NodeKind::Break) || is_empty_statement(tree, *s)),
        _ => false,
    }
}

/// `JButton.addActionListener(listener)` where `listener` was a local that is
/// no longer read: its declaration goes too.
fn remove_dead_listener_variable(tree: &mut Tree, old_arg: NodeId) {
    let NodeKind::VariableAccess { decl: Some(decl), .. } = tree.kind(old_arg) else {
        return;
    };
    let decl = *decl;
    if matches!(tree.kind(decl), NodeKind::LocalVariable { .. })
        && tree.accesses_of(decl).is_empty()
    {
        tree.detach(decl);
    }
}
