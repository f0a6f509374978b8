//! Condition solver
//!
//! Turns the guards of a command into the named-condition / boolean-value
//! assignments that reach it. Guards taken on the `else` side are negated;
//! switch cases become `selector == label` atoms.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::printer;
use crate::tree::{BinaryOp, Literal, NodeId, NodeKind, Tree, UnaryOp};

/// Default cap on the number of alternative assignments of one solution.
pub const DEFAULT_MAX_SOLUTIONS: usize = 64;

/// Where a statement sits relative to its guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardSide {
    Then,
    Else,
    Case,
}

/// One `(named condition, value)` pair.
pub type NamedValue = (String, bool);

/// Alternative assignments making a guard expression true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionalSolution {
    pub expression: String,
    /// One assignment per disjunct.
    pub solutions: Vec<Vec<NamedValue>>,
}

impl fmt::Display for ConditionalSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alternatives: Vec<String> = self
            .solutions
            .iter()
            .map(|assignment| {
                let pairs: Vec<String> = assignment
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect();
                format!("[{}]", pairs.join(", "))
            })
            .collect();
        write!(f, "{} => {}", self.expression, alternatives.join(" | "))
    }
}

/// A guard of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConditionEntry {
    /// Guard as it appears in source: the `if` condition, or the `case` node.
    pub real: NodeId,
    /// `real`, or a detached negation of it on the `else` side.
    pub effective: NodeId,
    pub side: GuardSide,
    pub solution: ConditionalSolution,
}

impl CommandConditionEntry {
    pub fn is_negated(&self) -> bool {
        self.real != self.effective
    }

    /// The `if` or `switch` construct this guard controls. An `if` whose
    /// condition got negated in place is still found.
    pub fn construct(&self, tree: &Tree) -> Option<NodeId> {
        tree.parent_matching(self.real, |k| {
            matches!(k, NodeKind::If { .. } | NodeKind::Switch { .. })
        })
    }

    /// Expressions to scan for evidence: the condition, or selector and label
    /// of a case.
    pub fn expressions(&self, tree: &Tree) -> Vec<NodeId> {
        match (self.side, tree.kind(self.real)) {
            (GuardSide::Case, NodeKind::Case { label, .. }) => {
                let mut out: Vec<NodeId> = self
                    .construct(tree)
                    .and_then(|s| match tree.kind(s) {
                        NodeKind::Switch { selector, .. } => Some(*selector),
                        _ => None,
                    })
                    .into_iter()
                    .collect();
                out.extend(*label);
                out
            }
            _ => vec![self.real],
        }
    }
}

/// Produces condition entries and their solutions.
#[derive(Debug, Clone, Copy)]
pub struct ConditionSolver {
    max_solutions: usize,
}

impl Default for ConditionSolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SOLUTIONS)
    }
}

impl ConditionSolver {
    pub fn new(max_solutions: usize) -> Self {
        Self {
            max_solutions: max_solutions.max(1),
        }
    }

    /// Builds the entry of a guard reached on `side`.
    ///
    /// For `GuardSide::Case`, `guard` is the `case` node.
    pub fn entry(&self, tree: &mut Tree, guard: NodeId, side: GuardSide) -> CommandConditionEntry {
        let effective = match side {
            GuardSide::Else => {
                let (copy, _) = tree.deep_clone(&[guard]);
                let not = tree.add(NodeKind::Unary {
                    op: UnaryOp::Not,
                    operand: copy[0],
                });
                tree.set_type(not, "boolean");
                not
            }
            GuardSide::Then | GuardSide::Case => guard,
        };
        let solution = self.solve(tree, effective);
        CommandConditionEntry {
            real: guard,
            effective,
            side,
            solution,
        }
    }

    /// Every guard between `statement` and `executable`, innermost first.
    pub fn guards_of(tree: &Tree, statement: NodeId, executable: NodeId) -> Vec<(NodeId, GuardSide)> {
        let mut out = Vec::new();
        let mut child = statement;
        for ancestor in tree.ancestors(statement) {
            if ancestor == executable {
                break;
            }
            match tree.kind(ancestor) {
                NodeKind::If {
                    cond,
                    then_branch,
                    else_branch,
                } => {
                    if *then_branch == Some(child) {
                        out.push((*cond, GuardSide::Then));
                    } else if *else_branch == Some(child) {
                        out.push((*cond, GuardSide::Else));
                    }
                }
                NodeKind::Case { stmts, .. } if stmts.contains(&child) => {
                    out.push((ancestor, GuardSide::Case));
                }
                _ => {}
            }
            child = ancestor;
        }
        out
    }

    /// Builds the entries of every guard of `statement`.
    pub fn entries_for(
        &self,
        tree: &mut Tree,
        statement: NodeId,
        executable: NodeId,
    ) -> Vec<CommandConditionEntry> {
        Self::guards_of(tree, statement, executable)
            .into_iter()
            .map(|(guard, side)| self.entry(tree, guard, side))
            .collect()
    }

    /// Solves a boolean expression (or a `case` node).
    pub fn solve(&self, tree: &Tree, expr: NodeId) -> ConditionalSolution {
        let expression = atom_name(tree, expr);
        let solutions = self.dnf(tree, expr, false).unwrap_or_else(|| {
            tracing::debug!("keeping `{}` as one condition", expression);
            vec![vec![(expression.clone(), true)]]
        });
        ConditionalSolution {
            expression,
            solutions,
        }
    }

    /// Disjunctive normal form of `expr`, negated when `negated` is set.
    /// `None` when an operator cannot be decomposed or when more than
    /// `max_solutions` alternatives show up at any level.
    fn dnf(&self, tree: &Tree, expr: NodeId, negated: bool) -> Option<Vec<Vec<NamedValue>>> {
        match tree.kind(expr) {
            NodeKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.dnf(tree, *operand, !negated),
            NodeKind::Literal {
                value: Literal::Bool(b),
            } => {
                if *b != negated {
                    Some(vec![Vec::new()])
                } else {
                    Some(Vec::new())
                }
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let conjunction = match op {
                    BinaryOp::And => !negated,
                    BinaryOp::Or => negated,
                    BinaryOp::BitAnd if is_boolean(tree, *lhs) => !negated,
                    BinaryOp::BitOr if is_boolean(tree, *lhs) => negated,
                    BinaryOp::Xor if is_boolean(tree, *lhs) => return None,
                    _ => return Some(vec![vec![(atom_name(tree, expr), !negated)]]),
                };
                let left = self.dnf(tree, *lhs, negated)?;
                let right = self.dnf(tree, *rhs, negated)?;
                if conjunction {
                    let mut product = Vec::new();
                    for l in &left {
                        for r in &right {
                            if let Some(merged) = merge(l, r) {
                                product.push(merged);
                            }
                            if product.len() > self.max_solutions {
                                return None;
                            }
                        }
                    }
                    Some(product)
                } else {
                    let mut union = left;
                    for r in right {
                        if !union.contains(&r) {
                            union.push(r);
                        }
                    }
                    (union.len() <= self.max_solutions).then_some(union)
                }
            }
            NodeKind::Case { label: None, .. } => Some(vec![vec![("default".to_string(), !negated)]]),
            _ => Some(vec![vec![(atom_name(tree, expr), !negated)]]),
        }
    }
}

/// Operands of `&`, `|` and `^` may be integers; only boolean ones are
/// decomposed.
fn is_boolean(tree: &Tree, expr: NodeId) -> bool {
    match tree.type_of(expr) {
        Some(ty) => ty == "boolean" || ty == "java.lang.Boolean",
        None => match tree.kind(expr) {
            NodeKind::Binary { op, .. } => matches!(
                op,
                BinaryOp::And
                    | BinaryOp::Or
                    | BinaryOp::Eq
                    | BinaryOp::Ne
                    | BinaryOp::Lt
                    | BinaryOp::Le
                    | BinaryOp::Gt
                    | BinaryOp::Ge
                    | BinaryOp::InstanceOf
            ),
            NodeKind::Unary {
                op: UnaryOp::Not, ..
            } => true,
            NodeKind::Literal {
                value: Literal::Bool(_),
            } => true,
            // Unknown: `&` and `|` on untyped operands are most often boolean in guards.
            _ => true,
        },
    }
}

/// Conjunction of two assignments; `None` when they contradict.
fn merge(left: &[NamedValue], right: &[NamedValue]) -> Option<Vec<NamedValue>> {
    let mut out = left.to_vec();
    for (name, value) in right {
        match out.iter().find(|(n, _)| n == name) {
            Some((_, v)) if v != value => return None,
            Some(_) => {}
            None => out.push((name.clone(), *value)),
        }
    }
    Some(out)
}

fn atom_name(tree: &Tree, expr: NodeId) -> String {
    if let NodeKind::Case { label, .. } = tree.kind(expr) {
        let selector = tree.parent(expr).and_then(|s| match tree.kind(s) {
            NodeKind::Switch { selector, .. } => Some(*selector),
            _ => None,
        });
        return match (selector, label) {
            (Some(selector), Some(label)) => format!(
                "{} == {}",
                printer::render(tree, selector),
                printer::render(tree, *label)
            ),
            _ => "default".to_string(),
        };
    }
    printer::render(tree, expr)
}
