//! Widget usage registry
//!
//! A widget usage is a widget-typed field or local variable together with all
//! its access sites. The registry is normally provided by the front-end; when
//! it is missing, [`discover`] rebuilds it from the tree.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::toolkit::Toolkit;
use crate::tree::{NodeId, NodeKind, Tree};

/// Index of a usage inside its [`WidgetRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageId(pub usize);

impl fmt::Display for UsageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetUsage {
    /// Field or local variable declaration.
    pub widget_var: NodeId,
    /// Reads of the variable, in document order.
    #[serde(default)]
    pub accesses: Vec<NodeId>,
}

impl WidgetUsage {
    pub fn name<'t>(&self, tree: &'t Tree) -> &'t str {
        tree.name_of(self.widget_var).unwrap_or("?")
    }

    /// Statements enclosing the attached access sites.
    pub fn access_statements(&self, tree: &Tree) -> Vec<NodeId> {
        let mut out = Vec::new();
        for access in &self.accesses {
            if !tree.is_attached(*access) {
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
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetRegistry {
    usages: Vec<WidgetUsage>,
}

impl WidgetRegistry {
    pub fn new(usages: Vec<WidgetUsage>) -> Self {
        Self { usages }
    }

    pub fn len(&self) -> usize {
        self.usages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usages.is_empty()
    }

    pub fn get(&self, id: UsageId) -> &WidgetUsage {
        &self.usages[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (UsageId, &WidgetUsage)> {
        self.usages.iter().enumerate().map(|(i, u)| (UsageId(i), u))
    }

    /// Usage declared by `decl`, if `decl` is a widget variable.
    pub fn usage_of_decl(&self, decl: NodeId) -> Option<UsageId> {
        self.usages
            .iter()
            .position(|u| u.widget_var == decl)
            .map(UsageId)
    }

    /// Usage one of whose access sites is `access`.
    pub fn usage_of_access(&self, access: NodeId) -> Option<UsageId> {
        self.usages
            .iter()
            .position(|u| u.accesses.contains(&access))
            .map(UsageId)
    }

    pub fn name<'t>(&self, tree: &'t Tree, id: UsageId) -> &'t str {
        self.get(id).name(tree)
    }
}

/// Builds the registry from the tree: every attached field or local variable
/// whose declared type is a widget, in declaration order.
pub fn discover(tree: &Tree, toolkit: &Toolkit) -> WidgetRegistry {
    let attached = tree.attached_nodes();
    let mut usages: Vec<WidgetUsage> = attached
        .iter()
        .copied()
        .filter(|id| match tree.kind(*id) {
            NodeKind::Field { ty, .. } | NodeKind::LocalVariable { ty, .. } => {
                toolkit.is_widget_type(tree, ty)
            }
            _ => false,
        })
        .map(|widget_var| WidgetUsage {
            widget_var,
            accesses: Vec::new(),
        })
        .collect();

    for id in &attached {
        if let Some(decl) = tree.kind(*id).accessed_decl() {
            if let Some(usage) = usages.iter_mut().find(|u| u.widget_var == decl) {
                usage.accesses.push(*id);
            }
        }
    }
    tracing::debug!("discovered {} widget usages", usages.len());
    WidgetRegistry::new(usages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Builder;

    #[test]
    fn test_discover_fields_and_accesses() {
        let mut b = Builder::new("app.Main");
        let button = b.field("ok", "javax.swing.JButton");
        b.field("title", "java.lang.String");
        let read = b.read(button);
        let call = b.call(Some(read), "setText", vec![]);
        let stmt_block = b.block(vec![call]);
        b.method("init", vec![], stmt_block);
        let tree = b.finish();

        let registry = discover(&tree, &Toolkit::default());
        assert_eq!(registry.len(), 1);
        let (id, usage) = registry.iter().next().unwrap();
        assert_eq!(usage.widget_var, button);
        assert_eq!(usage.accesses, vec![read]);
        assert_eq!(registry.name(&tree, id), "ok");
        assert_eq!(usage.access_statements(&tree), vec![call]);
        assert_eq!(registry.usage_of_access(read), Some(id));
    }
}
