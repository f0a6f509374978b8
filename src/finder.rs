//! Widget attribution engine
//!
//! For every command, four independent heuristics propose the widgets that
//! may have produced it:
//!
//! 1. registration: the widgets the listener is registered on
//!    (`btn.addActionListener(this)`, `btn.addActionListener(e -> ...)`);
//! 2. widget class: the listener is declared by a widget subclass;
//! 3. condition type: widget variables read in the guards;
//! 4. cross references: widget configuration statements sharing a variable
//!    or a string literal with the guards
//!    (`btn.setActionCommand(FOO)` / `e.getActionCommand().equals(FOO)`).
//!
//! [`WidgetFinderEntry::widget_usages`] combines them by fixed precedence.
//! Commands are processed in parallel; each worker writes the slot of its
//! own command.

use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};

use crate::command::Command;
use crate::conditions::CommandConditionEntry;
use crate::error::{AnalysisError, AnalysisResult};
use crate::toolkit::Toolkit;
use crate::tree::{NodeId, NodeKind, Tree};
use crate::widgets::{UsageId, WidgetRegistry};

/// Widget whose configuration statements read variables of the guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarMatch {
    pub usage: UsageId,
    /// Declarations read both in the guards and near the widget.
    pub vars: Vec<NodeId>,
}

/// Widget whose configuration statements hold string literals of the guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLitMatch {
    pub usage: UsageId,
    pub literals: Vec<String>,
}

/// Attribution result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetFinderEntry {
    pub registered_widgets: BTreeSet<UsageId>,
    pub widgets_used_in_conditions: BTreeSet<UsageId>,
    pub widget_class: Option<NodeId>,
    pub widgets_from_shared_vars: Vec<VarMatch>,
    pub widgets_from_string_literals: Vec<StringLitMatch>,
}

impl WidgetFinderEntry {
    /// Widgets attributed to the command: string-literal matches, else
    /// shared-variable matches, else condition-type matches, else the
    /// registration widgets.
    pub fn widget_usages(&self) -> BTreeSet<UsageId> {
        if !self.widgets_from_string_literals.is_empty() {
            return self
                .widgets_from_string_literals
                .iter()
                .map(|m| m.usage)
                .collect();
        }
        if !self.widgets_from_shared_vars.is_empty() {
            return self.widgets_from_shared_vars.iter().map(|m| m.usage).collect();
        }
        if !self.widgets_used_in_conditions.is_empty() {
            return self.widgets_used_in_conditions.clone();
        }
        self.registered_widgets.clone()
    }

    /// Number of distinct widgets any heuristic found, the widget class
    /// counting for one.
    pub fn nb_distinct_widgets(&self) -> usize {
        let mut all: BTreeSet<UsageId> = self.registered_widgets.clone();
        all.extend(self.widgets_used_in_conditions.iter().copied());
        all.extend(self.widgets_from_shared_vars.iter().map(|m| m.usage));
        all.extend(self.widgets_from_string_literals.iter().map(|m| m.usage));
        all.len() + usize::from(self.widget_class.is_some())
    }

    /// Widgets found by evidence other than registration, without duplicates.
    pub fn distinct_used_widgets(&self) -> Vec<UsageId> {
        let mut out: Vec<UsageId> = Vec::new();
        let found = self
            .widgets_from_shared_vars
            .iter()
            .map(|m| m.usage)
            .chain(self.widgets_used_in_conditions.iter().copied())
            .chain(self.widgets_from_string_literals.iter().map(|m| m.usage));
        for usage in found {
            if !out.contains(&usage) {
                out.push(usage);
            }
        }
        out
    }

    /// Best guess of the command's widgets: the evidence when it names one
    /// widget, its intersection with the registrations when it names several.
    pub fn supposed_associated_widgets(&self) -> Vec<UsageId> {
        let used = self.distinct_used_widgets();
        match used.len() {
            0 => self.registered_widgets.iter().copied().collect(),
            1 => used,
            _ => {
                let registered: Vec<UsageId> = self
                    .registered_widgets
                    .iter()
                    .copied()
                    .filter(|w| used.contains(w))
                    .collect();
                if registered.is_empty() {
                    used
                } else {
                    registered
                }
            }
        }
    }

    /// Narrows an ambiguous registration (two widgets or more) to the widgets
    /// whose access statements carry the recorded variable or literal
    /// evidence. Without such evidence the registrations are kept.
    pub fn precise_widgets(&mut self, tree: &Tree, registry: &WidgetRegistry) {
        if self.registered_widgets.len() < 2 {
            return;
        }
        if self.widgets_from_shared_vars.is_empty() && self.widgets_from_string_literals.is_empty()
        {
            return;
        }
        let vars: HashSet<NodeId> = self
            .widgets_from_shared_vars
            .iter()
            .flat_map(|m| m.vars.iter().copied())
            .collect();
        let literals: HashSet<&str> = self
            .widgets_from_string_literals
            .iter()
            .flat_map(|m| m.literals.iter().map(String::as_str))
            .collect();

        self.registered_widgets.retain(|w| {
            registry.get(*w).access_statements(tree).iter().any(|stmt| {
                tree.descendants(*stmt).iter().any(|n| {
                    let kind = tree.kind(*n);
                    kind.accessed_decl().is_some_and(|d| vars.contains(&d))
                        || kind.string_value().is_some_and(|s| literals.contains(s))
                })
            })
        });
    }
}

/// Runs the attribution heuristics over a list of commands.
pub struct CommandWidgetFinder<'a> {
    tree: &'a Tree,
    toolkit: &'a Toolkit,
    registry: &'a WidgetRegistry,
}

impl<'a> CommandWidgetFinder<'a> {
    pub fn new(tree: &'a Tree, toolkit: &'a Toolkit, registry: &'a WidgetRegistry) -> Self {
        Self {
            tree,
            toolkit,
            registry,
        }
    }

    /// Attributes every command; slot `i` holds the entry of `commands[i]`.
    pub fn process(&self, commands: &[Command]) -> Vec<WidgetFinderEntry> {
        commands.par_iter().map(|cmd| self.process_one(cmd)).collect()
    }

    pub fn process_one(&self, cmd: &Command) -> WidgetFinderEntry {
        let tree = self.tree;
        let signature = tree.signature(cmd.executable());
        let listener_class = tree
            .parent(cmd.executable())
            .filter(|p| matches!(tree.kind(*p), NodeKind::Class(_)));

        let mut entry = WidgetFinderEntry {
            registered_widgets: self.or_log(&signature, self.registered_widgets(cmd)),
            widgets_used_in_conditions: self
                .or_log(&signature, self.widgets_used_in_conditions(cmd)),
            widget_class: self.or_log(&signature, self.widget_class(cmd)),
            widgets_from_shared_vars: self.check_listener_matching(
                listener_class,
                self.or_log(&signature, self.match_shared_vars(cmd)),
                |m| m.usage,
            ),
            widgets_from_string_literals: self.check_listener_matching(
                listener_class,
                self.or_log(&signature, self.match_string_literals(cmd)),
                |m| m.usage,
            ),
        };
        entry.precise_widgets(tree, self.registry);

        if entry.widget_usages().len() > 1 {
            tracing::warn!(
                "{}: {} candidate widgets",
                signature,
                entry.widget_usages().len()
            );
        }
        entry
    }

    fn or_log<T: Default>(&self, signature: &str, result: AnalysisResult<T>) -> T {
        result.unwrap_or_else(|err| {
            self.log(signature, &err);
            T::default()
        })
    }

    fn log(&self, signature: &str, err: &AnalysisError) {
        match err {
            AnalysisError::UnresolvedReference(_) => tracing::debug!("{}: {}", signature, err),
            AnalysisError::AmbiguousEvidence(_) | AnalysisError::StructuralPrecondition(_) => {
                tracing::warn!("{}: {}", signature, err)
            }
        }
    }

    /// Guards whose real and effective conditions agree: a negated `if`
    /// condition says nothing about the values the command expects.
    fn usable_conditions<'c>(&self, cmd: &'c Command) -> impl Iterator<Item = &'c CommandConditionEntry> {
        cmd.conditions().iter().filter(|c| !c.is_negated())
    }

    /// Registration call directly holding the listener: the call a closure
    /// or an anonymous listener object is passed to.
    fn registration_holding(&self, exec: NodeId) -> Option<NodeId> {
        let tree = self.tree;
        for ancestor in tree.ancestors(exec) {
            match tree.kind(ancestor) {
                NodeKind::Invocation { .. } => return Some(ancestor),
                NodeKind::Class(c) if !c.anonymous => return None,
                _ => {}
            }
        }
        None
    }

    /// Heuristic 1.
    fn registered_widgets(&self, cmd: &Command) -> AnalysisResult<BTreeSet<UsageId>> {
        let tree = self.tree;
        let exec = cmd.executable();
        if let Some(call) = self.registration_holding(exec) {
            return Ok(self.widget_of_registration(call)?.into_iter().collect());
        }
        let Some(class) = tree.parent(exec) else {
            return Err(AnalysisError::UnresolvedReference(format!(
                "listener {} is detached",
                exec
            )));
        };
        if !matches!(tree.kind(class), NodeKind::Class(_)) {
            return Ok(BTreeSet::new());
        }
        let iface = self.toolkit.listener_interface_of(tree, exec);
        let mut found = BTreeSet::new();
        let mut visited = HashSet::new();
        self.registered_through_class(class, iface.as_deref(), &mut found, &mut visited);
        Ok(found)
    }

    /// `widget.addXListener(this)` in the class and its superclasses.
    fn registered_through_class(
        &self,
        class: NodeId,
        iface: Option<&str>,
        found: &mut BTreeSet<UsageId>,
        visited: &mut HashSet<NodeId>,
    ) {
        let tree = self.tree;
        if !visited.insert(class) {
            return;
        }
        let self_refs = tree.filter(class, |id, k| {
            matches!(k, NodeKind::ThisAccess) && tree.enclosing_class(id) == Some(class)
        });
        for this in self_refs {
            let Some(call) = tree.parent(this) else {
                continue;
            };
            let is_sole_argument = matches!(
                tree.kind(call),
                NodeKind::Invocation { args, .. } if args.as_slice() == [this]
            );
            if !is_sole_argument || !self.toolkit.registers_interface(tree, call, iface) {
                continue;
            }
            match self.widget_of_registration(call) {
                Ok(Some(usage)) => {
                    found.insert(usage);
                }
                Ok(None) => {}
                Err(err) => self.log(tree.name_of(class).unwrap_or("?"), &err),
            }
        }

        let superclass = tree
            .kind(class)
            .as_class()
            .and_then(|c| c.superclass.as_deref())
            .and_then(|s| tree.find_class(s));
        if let Some(superclass) = superclass {
            self.registered_through_class(superclass, iface, found, visited);
        }
    }

    /// Widget usage targeted by a registration call.
    fn widget_of_registration(&self, call: NodeId) -> AnalysisResult<Option<UsageId>> {
        let tree = self.tree;
        let NodeKind::Invocation { target, method, .. } = tree.kind(call) else {
            return Ok(None);
        };
        if let Some(declaring) = &method.declaring_type {
            if !self.toolkit.is_widget_type(tree, declaring) {
                return Ok(None);
            }
        }
        let Some(target) = target else {
            // Implicit `this`: handled by the widget-class heuristic.
            return Ok(None);
        };
        match tree.kind(*target) {
            NodeKind::VariableAccess { decl, name, .. } => match decl {
                Some(decl) => Ok(self.registry.usage_of_decl(*decl)),
                None => Err(AnalysisError::UnresolvedReference(format!(
                    "declaration of `{}`",
                    name
                ))),
            },
            NodeKind::ThisAccess | NodeKind::TypeAccess { .. } => Ok(None),
            NodeKind::Invocation { method: getter, .. } => self.widget_of_accessor(getter),
            _ => Err(AnalysisError::UnresolvedReference(format!(
                "unsupported registration target in {}",
                tree.position(call)
                    .map(|p| format!("{}:{}", p.file, p.line))
                    .unwrap_or_else(|| call.to_string())
            ))),
        }
    }

    /// `getButton().addActionListener(...)`: one accessor returning one
    /// widget variable.
    fn widget_of_accessor(
        &self,
        getter: &crate::tree::ExecutableRef,
    ) -> AnalysisResult<Option<UsageId>> {
        let tree = self.tree;
        let class = match (&getter.decl, &getter.declaring_type) {
            (Some(decl), _) => tree.parent(*decl),
            (None, Some(ty)) => tree.find_class(ty),
            (None, None) => None,
        }
        .ok_or_else(|| {
            AnalysisError::UnresolvedReference(format!(
                "class declaring `{}`",
                getter.name
            ))
        })?;

        let methods = tree.methods_by_name(class, &getter.name);
        if methods.len() != 1 {
            return Err(AnalysisError::AmbiguousEvidence(format!(
                "{} methods named `{}`",
                methods.len(),
                getter.name
            )));
        }
        let body = tree.executable_body(methods[0]).ok_or_else(|| {
            AnalysisError::UnresolvedReference(format!("body of `{}`", getter.name))
        })?;
        let returns = tree.filter(body, |_, k| matches!(k, NodeKind::Return { .. }));
        if returns.len() != 1 {
            return Err(AnalysisError::AmbiguousEvidence(format!(
                "{} return statements in `{}`",
                returns.len(),
                getter.name
            )));
        }
        match tree.kind(returns[0]) {
            NodeKind::Return { expr: Some(expr) } => match tree.kind(*expr).accessed_decl() {
                Some(decl) => Ok(self.registry.usage_of_decl(decl)),
                None => Err(AnalysisError::UnresolvedReference(format!(
                    "`{}` does not return a variable",
                    getter.name
                ))),
            },
            _ => Err(AnalysisError::UnresolvedReference(format!(
                "`{}` returns nothing",
                getter.name
            ))),
        }
    }

    /// Heuristic 2.
    fn widget_class(&self, cmd: &Command) -> AnalysisResult<Option<NodeId>> {
        let tree = self.tree;
        let exec = cmd.executable();
        if self.registration_holding(exec).is_some() {
            return Ok(None);
        }
        let Some(class) = tree.parent(exec) else {
            return Ok(None);
        };
        if !matches!(tree.kind(class), NodeKind::Class(_)) {
            return Ok(None);
        }
        if self.toolkit.is_widget_class(tree, class) {
            return Ok(Some(class));
        }
        // `this.setText(...)` on an inherited widget method.
        let calls_widget_on_self = tree
            .filter(class, |id, k| {
                matches!(k, NodeKind::ThisAccess) && tree.enclosing_class(id) == Some(class)
            })
            .into_iter()
            .any(|this| match tree.parent(this).map(|p| tree.kind(p)) {
                Some(NodeKind::Invocation {
                    target: Some(target),
                    method,
                    ..
                }) => {
                    *target == this
                        && method
                            .declaring_type
                            .as_deref()
                            .is_some_and(|ty| self.toolkit.is_widget_type(tree, ty))
                }
                _ => false,
            });
        Ok(calls_widget_on_self.then_some(class))
    }

    /// Heuristic 3.
    fn widgets_used_in_conditions(&self, cmd: &Command) -> AnalysisResult<BTreeSet<UsageId>> {
        let tree = self.tree;
        let mut found = BTreeSet::new();
        for cond in cmd.conditions() {
            for expr in cond.expressions(tree) {
                for access in tree.filter(expr, |_, k| k.accessed_decl().is_some()) {
                    let Some(decl) = tree.kind(access).accessed_decl() else {
                        continue;
                    };
                    if let Some(usage) = self.registry.usage_of_decl(decl) {
                        found.insert(usage);
                    }
                }
            }
        }
        Ok(found)
    }

    /// Access statements of a usage, skipping those located in listener
    /// methods: these belong to other commands.
    fn configuration_statements(&self, usage: UsageId) -> Vec<NodeId> {
        let tree = self.tree;
        let mut out = Vec::new();
        for access in &self.registry.get(usage).accesses {
            if !tree.is_attached(*access) {
                continue;
            }
            let in_listener = tree
                .enclosing_executable(*access)
                .is_some_and(|e| self.toolkit.is_listener_method(tree, e));
            if in_listener {
                continue;
            }
            if let Some(stmt) = tree.statement_of(*access) {
                if !out.contains(&stmt) {
                    out.push(stmt);
                }
            }
        }
        out
    }

    /// Heuristic 4a: shared variables.
    fn match_shared_vars(&self, cmd: &Command) -> AnalysisResult<Vec<VarMatch>> {
        let tree = self.tree;
        let mut vars: Vec<NodeId> = Vec::new();
        for cond in self.usable_conditions(cmd) {
            for expr in cond.expressions(tree) {
                for decl in tree.referenced_decls(expr) {
                    if !vars.contains(&decl) {
                        vars.push(decl);
                    }
                }
            }
        }
        if vars.is_empty() {
            return Ok(Vec::new());
        }

        let matches = (0..self.registry.len())
            .into_par_iter()
            .filter_map(|i| {
                let usage = UsageId(i);
                let mut shared: Vec<NodeId> = Vec::new();
                for stmt in self.configuration_statements(usage) {
                    let read = tree.referenced_decls(stmt);
                    for var in &vars {
                        if read.contains(var) && !shared.contains(var) {
                            shared.push(*var);
                        }
                    }
                }
                (!shared.is_empty()).then_some(VarMatch {
                    usage,
                    vars: shared,
                })
            })
            .collect();
        Ok(matches)
    }

    /// Heuristic 4b: shared string literals.
    fn match_string_literals(&self, cmd: &Command) -> AnalysisResult<Vec<StringLitMatch>> {
        let tree = self.tree;
        let mut literals: Vec<String> = Vec::new();
        for cond in self.usable_conditions(cmd) {
            for expr in cond.expressions(tree) {
                for lit in tree.filter(expr, |_, k| k.string_value().is_some()) {
                    if let Some(value) = tree.kind(lit).string_value() {
                        if !literals.iter().any(|l| l == value) {
                            literals.push(value.to_string());
                        }
                    }
                }
            }
        }
        if literals.is_empty() {
            return Ok(Vec::new());
        }

        let matches = (0..self.registry.len())
            .into_par_iter()
            .filter_map(|i| {
                let usage = UsageId(i);
                let mut shared: Vec<String> = Vec::new();
                for stmt in self.configuration_statements(usage) {
                    for node in tree.descendants(stmt) {
                        if let Some(value) = tree.kind(node).string_value() {
                            if literals.iter().any(|l| l == value)
                                && !shared.iter().any(|s| s == value)
                            {
                                shared.push(value.to_string());
                            }
                        }
                    }
                }
                (!shared.is_empty()).then_some(StringLitMatch {
                    usage,
                    literals: shared,
                })
            })
            .collect();
        Ok(matches)
    }

    /// Keeps the matches whose widget has an access statement mentioning the
    /// listener class (typically its registration). Without a listener class
    /// (closures) the matches are kept as they are.
    fn check_listener_matching<T>(
        &self,
        listener_class: Option<NodeId>,
        matches: Vec<T>,
        usage_of: impl Fn(&T) -> UsageId,
    ) -> Vec<T> {
        let tree = self.tree;
        let Some(class) = listener_class else {
            return matches;
        };
        let class_name = tree.name_of(class).unwrap_or_default().to_string();
        matches
            .into_iter()
            .filter(|m| {
                self.registry
                    .get(usage_of(m))
                    .access_statements(tree)
                    .iter()
                    .any(|stmt| {
                        tree.contains(*stmt, class)
                            || tree
                                .descendants(*stmt)
                                .iter()
                                .any(|n| tree.type_of(*n) == Some(class_name.as_str()))
                    })
            })
            .collect()
    }
}
