//! Fallback command extraction
//!
//! Used when the front-end supplied no commands: each leaf branch of the
//! `if` / `else if` / `switch` structure of a listener body becomes one
//! command, the unguarded statements of a level form another.

use crate::command::Command;
use crate::conditions::ConditionSolver;
use crate::toolkit::Toolkit;
use crate::tree::{NodeId, NodeKind, Tree};

/// Listener methods and closures of the program, in document order.
pub fn listener_executables(tree: &Tree, toolkit: &Toolkit) -> Vec<NodeId> {
    tree.attached_nodes()
        .into_iter()
        .filter(|id| {
            matches!(tree.kind(*id), NodeKind::Method(_) | NodeKind::Lambda { .. })
                && tree.executable_body(*id).is_some()
                && toolkit.is_listener_method(tree, *id)
        })
        .collect()
}

/// Statements of a branch: the block's statements, or the branch itself.
fn branch_statements(tree: &Tree, branch: NodeId) -> Vec<NodeId> {
    match tree.kind(branch) {
        NodeKind::Block { stmts } => stmts.clone(),
        _ => vec![branch],
    }
}

/// Whether a group carries behavior (not only declarations and jumps).
fn has_behavior(tree: &Tree, group: &[NodeId]) -> bool {
    group
        .iter()
        .any(|s| !matches!(tree.kind(*s), NodeKind::LocalVariable { .. }) && !tree.kind(*s).is_jump())
}

fn segment(tree: &Tree, stmts: &[NodeId], groups: &mut Vec<Vec<NodeId>>) {
    let mut plain = Vec::new();
    let mut nested = Vec::new();
    for stmt in stmts {
        match tree.kind(*stmt) {
            NodeKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                for branch in then_branch.iter().chain(else_branch.iter()) {
                    let mut inner = Vec::new();
                    segment(tree, &branch_statements(tree, *branch), &mut inner);
                    nested.extend(inner);
                }
            }
            NodeKind::Switch { cases, .. } => {
                for case in cases {
                    let mut inner = Vec::new();
                    segment(tree, tree.block_stmts(*case), &mut inner);
                    nested.extend(inner);
                }
            }
            NodeKind::Block { stmts } => {
                let mut inner = Vec::new();
                segment(tree, stmts, &mut inner);
                nested.extend(inner);
            }
            _ => plain.push(*stmt),
        }
    }
    if has_behavior(tree, &plain) {
        groups.push(plain);
    }
    groups.extend(nested);
}

/// Segments one listener into commands.
pub fn extract_commands(
    tree: &mut Tree,
    solver: &ConditionSolver,
    executable: NodeId,
) -> Vec<Command> {
    let Some(body) = tree.executable_body(executable) else {
        return Vec::new();
    };
    if tree.kind(body).is_expression() {
        return vec![Command::new(executable, vec![body], Vec::new())];
    }

    let mut groups = Vec::new();
    let view: &Tree = tree;
    segment(view, view.block_stmts(body), &mut groups);
    groups
        .into_iter()
        .map(|group| {
            let conditions = solver.entries_for(tree, group[0], executable);
            Command::new(executable, group, conditions)
        })
        .collect()
}

/// Segments every listener of the program.
pub fn extract_all(tree: &mut Tree, toolkit: &Toolkit, solver: &ConditionSolver) -> Vec<Command> {
    let listeners = listener_executables(tree, toolkit);
    let mut commands = Vec::new();
    for listener in listeners {
        let found = extract_commands(tree, solver, listener);
        tracing::debug!(
            "{}: {} command(s)",
            tree.signature(listener),
            found.len()
        );
        commands.extend(found);
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::GuardSide;
    use crate::fixtures::{Builder, ACTION_EVENT, ACTION_LISTENER};

    #[test]
    fn test_if_else_gives_one_command_per_branch() {
        let mut b = Builder::new("app.Main");
        b.implements(ACTION_LISTENER);
        let event = b.param("e", ACTION_EVENT);
        let cond = b.opaque("cond");
        let a = b.call(None, "a", vec![]);
        let then = b.block(vec![a]);
        let c = b.call(None, "b", vec![]);
        let other = b.block(vec![c]);
        let stmt = b.if_(cond, Some(then), Some(other));
        let ret = b.ret(None);
        let listener = b.action_performed(vec![stmt, ret], event);
        let mut tree = b.finish();

        let toolkit = Toolkit::default();
        assert_eq!(listener_executables(&tree, &toolkit), vec![listener]);
        let commands = extract_all(&mut tree, &toolkit, &ConditionSolver::default());
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].main_entry().unwrap().statmts, vec![a]);
        assert_eq!(commands[0].conditions()[0].side, GuardSide::Then);
        assert_eq!(commands[1].main_entry().unwrap().statmts, vec![c]);
        assert_eq!(commands[1].conditions()[0].side, GuardSide::Else);
    }

    #[test]
    fn test_unguarded_statements_form_one_command() {
        let mut b = Builder::new("app.Main");
        b.implements(ACTION_LISTENER);
        let event = b.param("e", ACTION_EVENT);
        let a = b.call(None, "a", vec![]);
        let c = b.call(None, "b", vec![]);
        let listener = b.action_performed(vec![a, c], event);
        let mut tree = b.finish();

        let commands = extract_commands(&mut tree, &ConditionSolver::default(), listener);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].main_entry().unwrap().statmts, vec![a, c]);
        assert!(commands[0].conditions().is_empty());
    }

    #[test]
    fn test_non_listener_methods_are_skipped() {
        let mut b = Builder::new("app.Main");
        let a = b.call(None, "a", vec![]);
        let body = b.block(vec![a]);
        b.method("helper", vec![], body);
        let tree = b.finish();
        assert!(listener_executables(&tree, &Toolkit::default()).is_empty());
    }
}
