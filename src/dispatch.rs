//! Local dispatch detection
//!
//! Listeners often delegate to helper methods of the controller class
//! (`if (src == ok) { save(); }`). Those helper bodies are part of the
//! command and are added to it as extra statement entries.

use crate::command::{Command, CommandStatmtEntry};
use crate::tree::{NodeId, NodeKind, Tree};

/// Finds calls to local helper methods in the main entry of commands.
pub struct LocalDispatchAnalyzer<'t> {
    tree: &'t Tree,
}

impl<'t> LocalDispatchAnalyzer<'t> {
    pub fn new(tree: &'t Tree) -> Self {
        Self { tree }
    }

    /// Invocations, inside the main entry, of methods declared by the nearest
    /// named class of the listener that receive none of the listener's
    /// parameters.
    pub fn local_calls(&self, command: &Command) -> Vec<NodeId> {
        let tree = self.tree;
        let Some(main) = command.main_entry() else {
            return Vec::new();
        };
        let exec = command.executable();
        let Some(class) = tree.enclosing_named_class(exec) else {
            tracing::debug!("listener {} has no enclosing class", exec);
            return Vec::new();
        };
        let params = command.listener_params(tree);

        let mut calls = Vec::new();
        for stmt in &main.statmts {
            for inv in tree.filter(*stmt, |_, k| matches!(k, NodeKind::Invocation { .. })) {
                if self.is_local_dispatch(inv, class, exec, params) && !calls.contains(&inv) {
                    calls.push(inv);
                }
            }
        }
        calls
    }

    fn is_local_dispatch(&self, inv: NodeId, class: NodeId, exec: NodeId, params: &[NodeId]) -> bool {
        let tree = self.tree;
        let NodeKind::Invocation {
            target,
            method,
            args,
        } = tree.kind(inv)
        else {
            return false;
        };
        if let Some(target) = target {
            if !matches!(tree.kind(*target), NodeKind::ThisAccess) {
                return false;
            }
        }
        let Some(decl) = method.decl else {
            return false;
        };
        if decl == exec || tree.parent(decl) != Some(class) {
            return false;
        }
        if tree.executable_body(decl).is_none() || !matches!(tree.kind(decl), NodeKind::Method(_)) {
            return false;
        }
        !args.iter().any(|arg| {
            tree.referenced_decls(*arg)
                .iter()
                .any(|d| params.contains(d))
        })
    }

    /// Statements of the called helper's body.
    fn helper_statements(&self, call: NodeId) -> Vec<NodeId> {
        let tree = self.tree;
        match tree.kind(call) {
            NodeKind::Invocation { method, .. } => method
                .decl
                .and_then(|d| tree.executable_body(d))
                .map(|body| tree.block_stmts(body).to_vec())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Adds the bodies of the local helpers to the command.
    ///
    /// A single call that is the whole main entry replaces it; otherwise each
    /// helper body becomes a secondary entry. Returns the number of helpers
    /// inlined.
    pub fn inline(&self, command: &mut Command) -> usize {
        let calls = self.local_calls(command);
        if calls.is_empty() {
            return 0;
        }
        let single_statement = command
            .main_entry()
            .map(|m| m.statmts.len() == 1)
            .unwrap_or(false);

        if calls.len() == 1 && single_statement {
            let stmts = self.helper_statements(calls[0]);
            if stmts.is_empty() {
                return 0;
            }
            let mut entry = CommandStatmtEntry::helper(stmts, calls[0]);
            entry.main = true;
            command.replace_main(self.tree, entry);
            return 1;
        }

        let entries: Vec<CommandStatmtEntry> = calls
            .iter()
            .map(|call| CommandStatmtEntry::helper(self.helper_statements(*call), *call))
            .filter(|e| !e.statmts.is_empty())
            .collect();
        let count = entries.len();
        command.add_entries(self.tree, entries);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Builder, ACTION_EVENT};
    use crate::tree::ExecutableRef;

    struct Fixture {
        tree: crate::tree::Tree,
        listener: NodeId,
        save_body_stmt: NodeId,
        call_stmt: NodeId,
        log_stmt: NodeId,
        with_event: NodeId,
    }

    fn fixture() -> Fixture {
        let mut b = Builder::new("app.Controller");
        let save_body_stmt = b.call(None, "write", vec![]);
        let save_body = b.block(vec![save_body_stmt]);
        let save = b.method("save", vec![], save_body);

        let event_param = b.param("ev", ACTION_EVENT);
        let show_stmt = b.call(None, "print", vec![]);
        let show_body = b.block(vec![show_stmt]);
        let show = b.method("show", vec![event_param], show_body);

        let event = b.param("e", ACTION_EVENT);
        let this = b.this();
        let call_stmt = b.call_ref(
            Some(this),
            ExecutableRef::new("save").resolved_to(save),
            vec![],
        );
        let log_stmt = b.call(None, "log", vec![]);
        let arg = b.read(event);
        let with_event = b.call_ref(None, ExecutableRef::new("show").resolved_to(show), vec![arg]);
        let listener = b.action_performed(vec![call_stmt, log_stmt, with_event], event);
        Fixture {
            tree: b.finish(),
            listener,
            save_body_stmt,
            call_stmt,
            log_stmt,
            with_event,
        }
    }

    #[test]
    fn test_single_call_replaces_main_entry() {
        let f = fixture();
        let mut command = Command::new(f.listener, vec![f.call_stmt], vec![]);
        let analyzer = LocalDispatchAnalyzer::new(&f.tree);
        assert_eq!(analyzer.inline(&mut command), 1);
        let main = command.main_entry().unwrap();
        assert_eq!(main.statmts, vec![f.save_body_stmt]);
        assert_eq!(main.dispatched_from, Some(f.call_stmt));
        assert_eq!(command.local_statements_ordered(&f.tree), vec![f.call_stmt]);
    }

    #[test]
    fn test_calls_receiving_listener_params_are_ignored() {
        let f = fixture();
        let command = Command::new(
            f.listener,
            vec![f.call_stmt, f.log_stmt, f.with_event],
            vec![],
        );
        let analyzer = LocalDispatchAnalyzer::new(&f.tree);
        assert_eq!(analyzer.local_calls(&command), vec![f.call_stmt]);
    }

    #[test]
    fn test_several_statements_add_secondary_entries() {
        let f = fixture();
        let mut command = Command::new(f.listener, vec![f.call_stmt, f.log_stmt], vec![]);
        let analyzer = LocalDispatchAnalyzer::new(&f.tree);
        assert_eq!(analyzer.inline(&mut command), 1);
        assert_eq!(command.statements().len(), 2);
        assert!(!command.statements()[1].main);
        assert_eq!(
            command.inlined_statements_ordered(&f.tree),
            vec![f.save_body_stmt, f.log_stmt]
        );
    }
}
