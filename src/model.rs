//! Front-end model files
//!
//! The front-end writes one JSON document per analysed program: the syntax
//! tree, optionally the commands it segmented and the widget usages it found.
//! Missing parts are rebuilt by the pipeline.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::command::Command;
use crate::conditions::{ConditionSolver, GuardSide};
use crate::error::ModelError;
use crate::tree::{NodeId, Tree};
use crate::widgets::WidgetRegistry;

/// A guard of a command as recorded by the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardRecord {
    /// The `if` condition, or the `case` node.
    pub guard: NodeId,
    pub side: GuardSide,
}

/// A command as recorded by the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub executable: NodeId,
    pub statements: Vec<NodeId>,
    /// Guards, innermost first; recomputed from the tree when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<GuardRecord>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisModel {
    pub tree: Tree,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<CommandRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_usages: Option<WidgetRegistry>,
}

impl AnalysisModel {
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            commands: None,
            widget_usages: None,
        }
    }

    /// Reads and validates a model file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: AnalysisModel =
            serde_json::from_str(&contents).map_err(|source| ModelError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        model.validate()?;
        Ok(model)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ModelError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks that every handle of the commands and usages exists and that
    /// commands point at executables.
    pub fn validate(&self) -> Result<(), ModelError> {
        let len = self.tree.len();
        let check = |id: NodeId| {
            if id.0 < len {
                Ok(())
            } else {
                Err(ModelError::DanglingNode(id))
            }
        };
        for (index, record) in self.commands.iter().flatten().enumerate() {
            check(record.executable)?;
            if !self.tree.kind(record.executable).is_executable() {
                return Err(ModelError::NotAnExecutable {
                    index,
                    node: record.executable,
                });
            }
            for stmt in &record.statements {
                check(*stmt)?;
            }
            for guard in record.conditions.iter().flatten() {
                check(guard.guard)?;
            }
        }
        if let Some(registry) = &self.widget_usages {
            for (_, usage) in registry.iter() {
                check(usage.widget_var)?;
                for access in &usage.accesses {
                    check(*access)?;
                }
            }
        }
        Ok(())
    }

    /// Turns the recorded commands into [`Command`]s, solving their guards.
    ///
    /// Returns `None` when the front-end recorded no commands.
    pub fn build_commands(&mut self, solver: &ConditionSolver) -> Option<Vec<Command>> {
        let records = self.commands.as_ref()?;
        let tree = &mut self.tree;
        let commands = records
            .iter()
            .map(|record| {
                let conditions = match (&record.conditions, record.statements.first()) {
                    (Some(guards), _) => guards
                        .iter()
                        .map(|g| solver.entry(tree, g.guard, g.side))
                        .collect(),
                    (None, Some(first)) => solver.entries_for(tree, *first, record.executable),
                    (None, None) => Vec::new(),
                };
                Command::new(record.executable, record.statements.clone(), conditions)
            })
            .collect();
        Some(commands)
    }
}

/// Model files under the given inputs: `*.json` files found by walking
/// directories, plus the files given directly. Sorted, without duplicates.
pub fn discover_models(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for input in inputs {
        if input.is_file() {
            found.push(input.clone());
            continue;
        }
        for entry in WalkDir::new(input)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                found.push(path.to_path_buf());
            }
        }
    }
    found.sort();
    found.dedup();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Builder, ACTION_EVENT, ACTION_LISTENER};
    use crate::printer::render_tree;
    use std::env;

    fn sample() -> (Tree, NodeId, NodeId, NodeId) {
        let mut b = Builder::new("app.Main");
        b.implements(ACTION_LISTENER);
        let event = b.param("e", ACTION_EVENT);
        let cond = b.opaque("ready");
        let a = b.call(None, "a", vec![]);
        let then = b.block(vec![a]);
        let other = b.call(None, "b", vec![]);
        let other_block = b.block(vec![other]);
        let guard = b.if_(cond, Some(then), Some(other_block));
        let listener = b.action_performed(vec![guard], event);
        (b.finish(), listener, a, other)
    }

    #[test]
    fn test_model_file_round_trip_keeps_structure() {
        let (tree, listener, a, _) = sample();
        let mut model = AnalysisModel::new(tree);
        model.commands = Some(vec![CommandRecord {
            executable: listener,
            statements: vec![a],
            conditions: None,
        }]);

        let path = env::temp_dir().join("guisplit_model_round_trip.json");
        model.save_to_file(&path).unwrap();
        let loaded = AnalysisModel::from_file(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(render_tree(&loaded.tree), render_tree(&model.tree));
        assert_eq!(loaded.tree.parent(a), model.tree.parent(a));
        assert_eq!(loaded.commands, model.commands);
        assert!(loaded.widget_usages.is_none());
    }

    #[test]
    fn test_guards_are_solved_when_not_recorded() {
        let (tree, listener, _, other) = sample();
        let mut model = AnalysisModel::new(tree);
        model.commands = Some(vec![CommandRecord {
            executable: listener,
            statements: vec![other],
            conditions: None,
        }]);
        let commands = model.build_commands(&ConditionSolver::default()).unwrap();
        assert_eq!(commands.len(), 1);
        let conditions = commands[0].conditions();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].side, GuardSide::Else);
        assert_eq!(conditions[0].solution.solutions, vec![vec![("ready".to_string(), false)]]);
    }

    #[test]
    fn test_command_on_non_executable_is_rejected() {
        let (tree, _, a, _) = sample();
        let mut model = AnalysisModel::new(tree);
        model.commands = Some(vec![CommandRecord {
            executable: a,
            statements: vec![a],
            conditions: None,
        }]);
        assert!(matches!(
            model.validate(),
            Err(ModelError::NotAnExecutable { index: 0, .. })
        ));
    }

    #[test]
    fn test_dangling_handle_is_rejected() {
        let json = r#"{"tree": {"nodes": [{"kind": {"type": "block", "stmts": [7]}}], "roots": [0]}}"#;
        let path = env::temp_dir().join("guisplit_model_dangling.json");
        fs::write(&path, json).unwrap();
        let result = AnalysisModel::from_file(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(ModelError::Json { .. })));
    }

    #[test]
    fn test_self_containing_node_is_rejected() {
        let json = r#"{"tree": {"nodes": [{"kind": {"type": "block", "stmts": [0]}}], "roots": [0]}}"#;
        let path = env::temp_dir().join("guisplit_model_cycle.json");
        fs::write(&path, json).unwrap();
        let result = AnalysisModel::from_file(&path);
        let _ = fs::remove_file(&path);
        match result {
            Err(ModelError::Json { source, .. }) => {
                assert!(source.to_string().contains("its own ancestor"));
            }
            other => panic!("expected a rejected model, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_discover_models_walks_directories() {
        let root = env::temp_dir().join("guisplit_discover_models");
        let nested = root.join("sub");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join("a.json"), "{}").unwrap();
        fs::write(nested.join("b.json"), "{}").unwrap();
        fs::write(nested.join("notes.txt"), "").unwrap();

        let found = discover_models(&[root.clone(), root.join("a.json")]);
        assert_eq!(found, vec![root.join("a.json"), nested.join("b.json")]);

        let _ = fs::remove_dir_all(root);
    }
}
