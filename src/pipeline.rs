//! Analysis pipeline
//!
//! discovery → extraction → condition solving → local-dispatch inlining →
//! attribution → optional refactoring.
//!
//! Attribution runs in parallel over the commands; refactoring is applied one
//! command at a time since it rewrites the shared tree.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::command::Command;
use crate::conditions::ConditionSolver;
use crate::config::Config;
use crate::dispatch::LocalDispatchAnalyzer;
use crate::extract::extract_all;
use crate::finder::{CommandWidgetFinder, WidgetFinderEntry};
use crate::model::AnalysisModel;
use crate::refactor::{ListenerCommandRefactor, RefactorReport};
use crate::toolkit::Toolkit;
use crate::tree::{NodeId, Tree};
use crate::widgets::{discover, UsageId, WidgetRegistry};

/// Heuristic that decided the widgets of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Evidence {
    StringLiteral,
    SharedVariable,
    Condition,
    Registration,
    None,
}

impl Evidence {
    fn of(entry: &WidgetFinderEntry) -> Self {
        if !entry.widgets_from_string_literals.is_empty() {
            Evidence::StringLiteral
        } else if !entry.widgets_from_shared_vars.is_empty() {
            Evidence::SharedVariable
        } else if !entry.widgets_used_in_conditions.is_empty() {
            Evidence::Condition
        } else if !entry.registered_widgets.is_empty() {
            Evidence::Registration
        } else {
            Evidence::None
        }
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Evidence::StringLiteral => "string-literal",
            Evidence::SharedVariable => "shared-variable",
            Evidence::Condition => "condition",
            Evidence::Registration => "registration",
            Evidence::None => "none",
        };
        f.write_str(name)
    }
}

/// Attribution of one command, in printable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    /// `signature;lines;file:start-end...`
    pub summary: String,
    /// Solved guards, innermost first.
    pub conditions: Vec<String>,
    pub widgets: Vec<String>,
    pub evidence: Evidence,
    pub supposed_widgets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget_class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    pub commands: Vec<CommandReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub refactorings: Vec<RefactorReport>,
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cmd in &self.commands {
            writeln!(f, "{}", cmd.summary)?;
            for cond in &cmd.conditions {
                writeln!(f, "    if {}", cond)?;
            }
            writeln!(f, "    widgets [{}] via {}", cmd.widgets.join(", "), cmd.evidence)?;
            if let Some(class) = &cmd.widget_class {
                writeln!(f, "    widget class {}", class)?;
            }
        }
        for refactoring in &self.refactorings {
            writeln!(
                f,
                "split {}: {} applied, {} skipped{}",
                refactoring.listener,
                refactoring.applied.len(),
                refactoring.skipped.len(),
                if refactoring.listener_removed {
                    ", listener removed"
                } else {
                    ""
                }
            )?;
            for skipped in &refactoring.skipped {
                writeln!(f, "    {}: {}", skipped.usage, skipped.reason)?;
            }
        }
        Ok(())
    }
}

/// Runs the analysis stages over one model.
#[derive(Debug, Clone)]
pub struct Pipeline {
    toolkit: Toolkit,
    solver: ConditionSolver,
    inline_local_dispatch: bool,
    /// `Some(as_lambda)` when listeners are to be split.
    refactor: Option<bool>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Self {
        Self {
            toolkit: Toolkit::from_config(&config.toolkit),
            solver: ConditionSolver::new(config.analysis.max_solutions),
            inline_local_dispatch: config.analysis.inline_local_dispatch,
            refactor: config
                .analysis
                .refactor
                .then_some(config.analysis.as_lambda),
        }
    }

    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    /// Analyses the model and, in refactor mode, rewrites its tree.
    pub fn run(&self, model: &mut AnalysisModel) -> AnalysisReport {
        let registry = match &model.widget_usages {
            Some(registry) => registry.clone(),
            None => discover(&model.tree, &self.toolkit),
        };
        let mut commands = match model.build_commands(&self.solver) {
            Some(commands) => commands,
            None => extract_all(&mut model.tree, &self.toolkit, &self.solver),
        };
        tracing::debug!("{} command(s), {} widget(s)", commands.len(), registry.len());

        let tree = &mut model.tree;
        if self.inline_local_dispatch {
            let analyzer = LocalDispatchAnalyzer::new(tree);
            for cmd in &mut commands {
                analyzer.inline(cmd);
            }
        }

        let entries = CommandWidgetFinder::new(tree, &self.toolkit, &registry).process(&commands);
        let mut report = AnalysisReport {
            commands: commands
                .iter()
                .zip(&entries)
                .map(|(cmd, entry)| command_report(tree, &registry, cmd, entry))
                .collect(),
            refactorings: Vec::new(),
        };

        if let Some(as_lambda) = self.refactor {
            let refactorer = ListenerCommandRefactor::new(&self.toolkit, &registry, as_lambda);
            for index in splittable(&commands, &entries) {
                report
                    .refactorings
                    .push(refactorer.execute(tree, &commands[index], &entries[index]));
            }
        }
        report
    }
}

fn names(tree: &Tree, registry: &WidgetRegistry, ids: impl IntoIterator<Item = UsageId>) -> Vec<String> {
    ids.into_iter()
        .map(|id| registry.name(tree, id).to_string())
        .collect()
}

fn command_report(
    tree: &Tree,
    registry: &WidgetRegistry,
    cmd: &Command,
    entry: &WidgetFinderEntry,
) -> CommandReport {
    CommandReport {
        summary: cmd.summary(tree),
        conditions: cmd
            .conditions()
            .iter()
            .map(|c| c.solution.to_string())
            .collect(),
        widgets: names(tree, registry, entry.widget_usages()),
        evidence: Evidence::of(entry),
        supposed_widgets: names(tree, registry, entry.supposed_associated_widgets()),
        widget_class: entry
            .widget_class
            .and_then(|c| tree.name_of(c))
            .map(str::to_string),
    }
}

/// Commands to split, in order: those of listeners holding several commands,
/// when every command of the listener has its own widgets. Two commands
/// sharing a widget would overwrite each other's registration.
fn splittable(commands: &[Command], entries: &[WidgetFinderEntry]) -> Vec<usize> {
    let mut listeners: Vec<NodeId> = Vec::new();
    for cmd in commands {
        if !listeners.contains(&cmd.executable()) {
            listeners.push(cmd.executable());
        }
    }

    let mut out = Vec::new();
    for listener in listeners {
        let indices: Vec<usize> = (0..commands.len())
            .filter(|i| commands[*i].executable() == listener)
            .collect();
        if indices.len() < 2 {
            continue;
        }
        let mut seen: BTreeSet<UsageId> = BTreeSet::new();
        let mut disjoint = true;
        for i in &indices {
            let widgets = entries[*i].widget_usages();
            if widgets.is_empty() || widgets.iter().any(|w| !seen.insert(*w)) {
                disjoint = false;
                break;
            }
        }
        if disjoint {
            out.extend(indices);
        } else {
            tracing::warn!(
                "listener {} not split: its commands do not have distinct widgets",
                listener
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Builder, ACTION_EVENT, ACTION_LISTENER, JBUTTON};
    use crate::tree::NodeKind;

    /// `if ("X".equals(cmd)) save(); else if ("Y".equals(cmd)) load();`
    /// with `btn1` / `btn2` configured by action command.
    fn two_command_model() -> (AnalysisModel, NodeId, Vec<NodeId>) {
        let mut b = Builder::new("app.Main");
        b.implements(ACTION_LISTENER);
        let btn1 = b.field("btn1", JBUTTON);
        let btn2 = b.field("btn2", JBUTTON);
        let mut init = Vec::new();
        let mut registrations = Vec::new();
        for (button, command) in [(btn1, "X"), (btn2, "Y")] {
            let read = b.read(button);
            let lit = b.lit_str(command);
            init.push(b.call(Some(read), "setActionCommand", vec![lit]));
            let read = b.read(button);
            let this = b.this();
            let reg = b.register(read, this);
            registrations.push(reg);
            init.push(reg);
        }
        let init_body = b.block(init);
        b.method("init", vec![], init_body);

        let event = b.param("e", ACTION_EVENT);
        let is_x = b.action_command_equals(event, "X");
        let save = b.call(None, "save", vec![]);
        let save_block = b.block(vec![save]);
        let is_y = b.action_command_equals(event, "Y");
        let load = b.call(None, "load", vec![]);
        let load_block = b.block(vec![load]);
        let inner = b.if_(is_y, Some(load_block), None);
        let outer = b.if_(is_x, Some(save_block), Some(inner));
        let listener = b.action_performed(vec![outer], event);
        (AnalysisModel::new(b.finish()), listener, registrations)
    }

    #[test]
    fn test_attribution_report() {
        let (mut model, _, _) = two_command_model();
        let report = Pipeline::default().run(&mut model);
        assert_eq!(report.commands.len(), 2);
        assert_eq!(report.commands[0].widgets, vec!["btn1".to_string()]);
        assert_eq!(report.commands[0].evidence, Evidence::StringLiteral);
        assert_eq!(report.commands[1].widgets, vec!["btn2".to_string()]);
        assert_eq!(report.commands[1].conditions.len(), 2);
        assert!(report.refactorings.is_empty());
        assert!(report.to_string().contains("via string-literal"));
    }

    #[test]
    fn test_refactor_mode_splits_listener() {
        let (mut model, listener, registrations) = two_command_model();
        let mut config = Config::default();
        config.analysis.refactor = true;
        config.analysis.as_lambda = true;
        let report = Pipeline::from_config(&config).run(&mut model);

        assert_eq!(report.refactorings.len(), 2);
        assert!(report.refactorings.iter().all(|r| r.is_applied()));
        assert!(report.refactorings[1].listener_removed);
        let tree = &model.tree;
        assert!(!tree.is_attached(listener));
        for reg in registrations {
            let NodeKind::Invocation { args, .. } = tree.kind(reg) else {
                panic!("registration expected");
            };
            assert!(matches!(tree.kind(args[0]), NodeKind::Lambda { .. }));
        }
    }

    #[test]
    fn test_shared_widget_prevents_split() {
        let mut b = Builder::new("app.Main");
        b.implements(ACTION_LISTENER);
        let btn = b.field("btn", JBUTTON);
        let read = b.read(btn);
        let this = b.this();
        let reg = b.register(read, this);
        let init_body = b.block(vec![reg]);
        b.method("init", vec![], init_body);
        let event = b.param("e", ACTION_EVENT);
        let cond = b.opaque("flag");
        let a = b.call(None, "a", vec![]);
        let then = b.block(vec![a]);
        let c = b.call(None, "b", vec![]);
        let other = b.block(vec![c]);
        let guard = b.if_(cond, Some(then), Some(other));
        let listener = b.action_performed(vec![guard], event);
        let mut model = AnalysisModel::new(b.finish());

        let mut config = Config::default();
        config.analysis.refactor = true;
        let report = Pipeline::from_config(&config).run(&mut model);
        assert_eq!(report.commands.len(), 2);
        for cmd in &report.commands {
            assert_eq!(cmd.widgets, vec!["btn".to_string()]);
            assert_eq!(cmd.evidence, Evidence::Registration);
        }
        assert!(report.refactorings.is_empty());
        assert!(model.tree.is_attached(listener));
    }
}
