//! Command model
//!
//! A command is one unit of listener behavior: the statements it runs and the
//! guards that must hold to reach them.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::conditions::CommandConditionEntry;
use crate::tree::{NodeId, NodeKind, Tree};

/// A group of statements of a command.
///
/// The main entry holds the statements found in the listener; the other
/// entries are bodies of local helper methods the main entry calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatmtEntry {
    pub main: bool,
    pub statmts: Vec<NodeId>,
    /// Call site this entry was inlined from.
    pub dispatched_from: Option<NodeId>,
}

impl CommandStatmtEntry {
    pub fn main(statmts: Vec<NodeId>) -> Self {
        Self {
            main: true,
            statmts,
            dispatched_from: None,
        }
    }

    pub fn helper(statmts: Vec<NodeId>, call: NodeId) -> Self {
        Self {
            main: false,
            statmts,
            dispatched_from: Some(call),
        }
    }

    /// Whether every statement of `other` lies inside one of ours.
    pub fn contains(&self, tree: &Tree, other: &CommandStatmtEntry) -> bool {
        !other.statmts.is_empty()
            && other
                .statmts
                .iter()
                .all(|s| self.statmts.iter().any(|mine| tree.contains(*mine, *s)))
    }

    /// Line span of the entry.
    pub fn span(&self, tree: &Tree) -> Option<CodeBlockPos> {
        span_of(tree, &self.statmts)
    }
}

/// `file:start-end` range of a code region.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CodeBlockPos {
    pub file: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl CodeBlockPos {
    pub fn nb_lines(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

impl fmt::Display for CodeBlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.file, self.start_line, self.end_line)
    }
}

fn span_of(tree: &Tree, nodes: &[NodeId]) -> Option<CodeBlockPos> {
    let mut positions = nodes.iter().filter_map(|n| tree.position(*n));
    let first = positions.next()?;
    let mut block = CodeBlockPos {
        file: first.file.clone(),
        start_line: first.line,
        end_line: first.end_line,
    };
    for pos in positions.filter(|p| p.file == block.file) {
        block.start_line = block.start_line.min(pos.line);
        block.end_line = block.end_line.max(pos.end_line);
    }
    Some(block)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    executable: NodeId,
    statements: Vec<CommandStatmtEntry>,
    conditions: Vec<CommandConditionEntry>,
}

impl Command {
    pub fn new(
        executable: NodeId,
        statmts: Vec<NodeId>,
        conditions: Vec<CommandConditionEntry>,
    ) -> Self {
        Self {
            executable,
            statements: vec![CommandStatmtEntry::main(statmts)],
            conditions,
        }
    }

    /// The listener method or closure this command belongs to.
    pub fn executable(&self) -> NodeId {
        self.executable
    }

    pub fn statements(&self) -> &[CommandStatmtEntry] {
        &self.statements
    }

    pub fn conditions(&self) -> &[CommandConditionEntry] {
        &self.conditions
    }

    pub fn main_entry(&self) -> Option<&CommandStatmtEntry> {
        self.statements.iter().find(|e| e.main)
    }

    pub fn listener_params<'t>(&self, tree: &'t Tree) -> &'t [NodeId] {
        tree.executable_params(self.executable)
    }

    /// Appends helper entries and restores containment minimality.
    pub fn add_entries(&mut self, tree: &Tree, entries: Vec<CommandStatmtEntry>) {
        self.statements.extend(entries);
        self.optimise(tree);
    }

    /// Replaces the main entry by `entry`, which becomes the new main one.
    pub fn replace_main(&mut self, tree: &Tree, mut entry: CommandStatmtEntry) {
        entry.main = true;
        self.statements.retain(|e| !e.main);
        self.statements.insert(0, entry);
        self.optimise(tree);
    }

    /// Drops duplicate entries, entries contained in another one and
    /// statements nested inside another retained statement.
    pub fn optimise(&mut self, tree: &Tree) {
        let mut unique: Vec<CommandStatmtEntry> = Vec::new();
        for entry in self.statements.drain(..) {
            match unique.iter_mut().find(|e| e.statmts == entry.statmts) {
                Some(existing) => existing.main |= entry.main,
                None => unique.push(entry),
            }
        }

        let contained: Vec<bool> = unique
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                !entry.main
                    && unique
                        .iter()
                        .enumerate()
                        .any(|(j, other)| i != j && other.contains(tree, entry))
            })
            .collect();
        let mut kept: Vec<CommandStatmtEntry> = unique
            .into_iter()
            .zip(contained)
            .filter(|(_, c)| !c)
            .map(|(e, _)| e)
            .collect();

        let all: Vec<NodeId> = kept.iter().flat_map(|e| e.statmts.clone()).collect();
        for entry in &mut kept {
            entry.statmts.retain(|s| {
                !all.iter()
                    .any(|other| other != s && tree.contains(*other, *s))
            });
        }
        kept.retain(|e| e.main || !e.statmts.is_empty());
        self.statements = kept;
    }

    /// Every statement of every entry, without duplicates, in document order.
    pub fn all_statements(&self, tree: &Tree) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        for entry in &self.statements {
            for s in &entry.statmts {
                if !out.contains(s) {
                    out.push(*s);
                }
            }
        }
        tree.sort_document_order(&mut out);
        out
    }

    /// Statements of the command as they appear in the listener: main
    /// statements, and the call statements helper entries were inlined from.
    pub fn local_statements_ordered(&self, tree: &Tree) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        for entry in &self.statements {
            let local: Vec<NodeId> = match entry.dispatched_from {
                Some(call) => tree.statement_of(call).into_iter().collect(),
                None => entry.statmts.clone(),
            };
            for s in local {
                if !out.contains(&s) {
                    out.push(s);
                }
            }
        }
        let snapshot = out.clone();
        out.retain(|s| !snapshot.iter().any(|o| o != s && tree.contains(*o, *s)));
        tree.sort_document_order(&mut out);
        out
    }

    /// Local statements where bare helper calls are replaced by the helper
    /// bodies. Calls passing arguments stay calls: the helper body reads its
    /// own parameters.
    pub fn inlined_statements_ordered(&self, tree: &Tree) -> Vec<NodeId> {
        let mut out = Vec::new();
        for stmt in self.local_statements_ordered(tree) {
            let argless = matches!(tree.kind(stmt), NodeKind::Invocation { args, .. } if args.is_empty());
            let inlined = self
                .statements
                .iter()
                .filter(|_| argless)
                .find(|e| e.dispatched_from == Some(stmt) && !e.statmts.is_empty());
            match inlined {
                Some(entry) => out.extend(entry.statmts.iter().copied()),
                None => out.push(stmt),
            }
        }
        out
    }

    pub fn line_start(&self, tree: &Tree) -> Option<usize> {
        self.main_entry()?
            .statmts
            .iter()
            .filter_map(|s| tree.position(*s))
            .map(|p| p.line)
            .min()
    }

    pub fn line_end(&self, tree: &Tree) -> Option<usize> {
        self.main_entry()?
            .statmts
            .iter()
            .filter_map(|s| tree.position(*s))
            .map(|p| p.end_line)
            .max()
    }

    fn raw_blocks(&self, tree: &Tree) -> Vec<CodeBlockPos> {
        let statements = self.statements.iter().filter_map(|e| e.span(tree));
        let conditions = self
            .conditions
            .iter()
            .filter_map(|c| span_of(tree, &[c.real]));
        statements.chain(conditions).collect()
    }

    /// Code regions of the command, adjacent and overlapping ranges merged,
    /// sorted by file then line.
    pub fn optimal_code_blocks(&self, tree: &Tree) -> Vec<CodeBlockPos> {
        let mut by_file: BTreeMap<String, Vec<CodeBlockPos>> = BTreeMap::new();
        for block in self.raw_blocks(tree) {
            by_file.entry(block.file.clone()).or_default().push(block);
        }

        let mut out = Vec::new();
        for (_, mut blocks) in by_file {
            blocks.sort();
            let mut merged: Vec<CodeBlockPos> = Vec::new();
            for block in blocks {
                match merged.last_mut() {
                    Some(last) if block.start_line <= last.end_line + 1 => {
                        last.end_line = last.end_line.max(block.end_line);
                    }
                    _ => merged.push(block),
                }
            }
            out.extend(merged);
        }
        out
    }

    /// Lines covered by the statement entries and the guards.
    pub fn nb_lines(&self, tree: &Tree) -> usize {
        self.raw_blocks(tree).iter().map(CodeBlockPos::nb_lines).sum()
    }

    /// `signature;lines;file:start-end;...`
    pub fn summary(&self, tree: &Tree) -> String {
        let blocks: Vec<String> = self
            .optimal_code_blocks(tree)
            .iter()
            .map(ToString::to_string)
            .collect();
        format!(
            "{};{};{}",
            tree.signature(self.executable),
            self.nb_lines(tree),
            blocks.join(";")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{ConditionSolver, GuardSide};
    use crate::fixtures::{Builder, ACTION_EVENT};

    #[test]
    fn test_contained_statements_are_dropped() {
        let mut b = Builder::new("app.Main");
        let inner = b.call(None, "a", vec![]);
        let then = b.block(vec![inner]);
        let cond = b.opaque("c");
        let outer = b.if_(cond, Some(then), None);
        let body = b.block(vec![outer]);
        let exec = b.method("run", vec![], body);
        let tree = b.finish();

        let mut command = Command::new(exec, vec![outer, inner], vec![]);
        command.optimise(&tree);
        assert_eq!(command.main_entry().unwrap().statmts, vec![outer]);
    }

    #[test]
    fn test_helper_entry_contained_in_main_is_removed() {
        let mut b = Builder::new("app.Main");
        let a = b.call(None, "a", vec![]);
        let c = b.call(None, "c", vec![]);
        let body = b.block(vec![a, c]);
        let exec = b.method("run", vec![], body);
        let tree = b.finish();

        let mut command = Command::new(exec, vec![a, c], vec![]);
        command.add_entries(&tree, vec![CommandStatmtEntry::helper(vec![c], c)]);
        assert_eq!(command.statements().len(), 1);
        assert!(command.statements()[0].main);
    }

    #[test]
    fn test_code_blocks_merge_adjacent_ranges() {
        let mut b = Builder::new("app.Main");
        let event = b.param("e", ACTION_EVENT);
        let cond = b.opaque("flag");
        b.at(cond, 10, 10);
        let first = b.call(None, "a", vec![]);
        b.at(first, 11, 11);
        let second = b.call(None, "b", vec![]);
        b.at(second, 12, 13);
        let far = b.call(None, "far", vec![]);
        b.at(far, 20, 20);
        let then = b.block(vec![first, second, far]);
        let stmt = b.if_(cond, Some(then), None);
        let exec = b.action_performed(vec![stmt], event);
        let mut tree = b.finish();

        let conditions = ConditionSolver::default().entries_for(&mut tree, first, exec);
        assert_eq!(conditions[0].side, GuardSide::Then);
        let mut command = Command::new(exec, vec![first, second], conditions);
        command.add_entries(&tree, vec![CommandStatmtEntry::helper(vec![far], far)]);

        let blocks = command.optimal_code_blocks(&tree);
        assert_eq!(
            blocks.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["Main.java:10-13", "Main.java:20-20"]
        );
        assert_eq!(command.nb_lines(&tree), 5);
        assert_eq!(
            command.summary(&tree),
            "actionPerformed(java.awt.event.ActionEvent);5;Main.java:10-13;Main.java:20-20"
        );
        assert_eq!(command.line_start(&tree), Some(11));
        assert_eq!(command.line_end(&tree), Some(13));
    }

    #[test]
    fn test_missing_positions_are_tolerated() {
        let mut b = Builder::new("app.Main");
        let a = b.call(None, "a", vec![]);
        let body = b.block(vec![a]);
        let exec = b.method("run", vec![], body);
        let tree = b.finish();
        let command = Command::new(exec, vec![a], vec![]);
        assert_eq!(command.line_start(&tree), None);
        assert!(command.optimal_code_blocks(&tree).is_empty());
        assert_eq!(command.summary(&tree), "run();0;");
    }

    #[test]
    fn test_inlined_statements_substitute_bare_helper_calls() {
        let mut b = Builder::new("app.Main");
        let helper_stmt = b.call(None, "doWork", vec![]);
        let helper_body = b.block(vec![helper_stmt]);
        b.method("helper", vec![], helper_body);
        let call = b.call(None, "helper", vec![]);
        let other = b.call(None, "log", vec![]);
        let body = b.block(vec![call, other]);
        let exec = b.method("run", vec![], body);
        let tree = b.finish();

        let mut command = Command::new(exec, vec![call, other], vec![]);
        command.add_entries(&tree, vec![CommandStatmtEntry::helper(vec![helper_stmt], call)]);
        assert_eq!(command.local_statements_ordered(&tree), vec![call, other]);
        assert_eq!(
            command.inlined_statements_ordered(&tree),
            vec![helper_stmt, other]
        );
    }
}
