//! Knowledge about GUI toolkits: widget classes, listener interfaces and
//! registration calls.
//!
//! The tables cover Swing/AWT, SWT and JavaFX out of the box and can be
//! extended from the `[toolkit]` section of `.guisplit.toml`.

use std::collections::HashSet;

use crate::config::ToolkitConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::tree::{simple_name, NodeId, NodeKind, Tree};

/// One callback of a listener interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerMethod {
    pub name: String,
    pub param_types: Vec<String>,
    pub return_type: String,
}

/// A listener interface and its abstract methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerInterface {
    pub name: String,
    pub methods: Vec<ListenerMethod>,
}

impl ListenerInterface {
    fn new(name: &str, event: &str, methods: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            methods: methods
                .iter()
                .map(|m| ListenerMethod {
                    name: (*m).to_string(),
                    param_types: vec![event.to_string()],
                    return_type: "void".to_string(),
                })
                .collect(),
        }
    }
}

const AWT_WIDGETS: &[&str] = &[
    "java.awt.Button",
    "java.awt.Checkbox",
    "java.awt.Choice",
    "java.awt.List",
    "java.awt.MenuItem",
    "java.awt.TextField",
    "java.awt.TextArea",
    "java.awt.Scrollbar",
    "java.awt.Component",
    "java.awt.Container",
    "javax.swing.AbstractButton",
    "javax.swing.text.JTextComponent",
];

const WIDGET_PREFIXES: &[&str] = &[
    "javax.swing.J",
    "org.eclipse.swt.widgets.",
    "javafx.scene.control.",
];

const LISTENER_PACKAGES: &[&str] = &[
    "java.awt.event",
    "javax.swing.event",
    "org.eclipse.swt.events",
    "javafx.beans.value",
];

const ACTION_COMMAND_METHODS: &[&str] = &["setActionCommand", "setName"];

pub fn default_widget_classes() -> Vec<String> {
    AWT_WIDGETS.iter().map(|s| s.to_string()).collect()
}

pub fn default_widget_prefixes() -> Vec<String> {
    WIDGET_PREFIXES.iter().map(|s| s.to_string()).collect()
}

pub fn default_listener_packages() -> Vec<String> {
    LISTENER_PACKAGES.iter().map(|s| s.to_string()).collect()
}

pub fn default_action_command_methods() -> Vec<String> {
    ACTION_COMMAND_METHODS.iter().map(|s| s.to_string()).collect()
}

fn builtin_listeners() -> Vec<ListenerInterface> {
    vec![
        ListenerInterface::new(
            "java.awt.event.ActionListener",
            "java.awt.event.ActionEvent",
            &["actionPerformed"],
        ),
        ListenerInterface::new(
            "java.awt.event.ItemListener",
            "java.awt.event.ItemEvent",
            &["itemStateChanged"],
        ),
        ListenerInterface::new(
            "java.awt.event.MouseListener",
            "java.awt.event.MouseEvent",
            &[
                "mouseClicked",
                "mousePressed",
                "mouseReleased",
                "mouseEntered",
                "mouseExited",
            ],
        ),
        ListenerInterface::new(
            "java.awt.event.KeyListener",
            "java.awt.event.KeyEvent",
            &["keyTyped", "keyPressed", "keyReleased"],
        ),
        ListenerInterface::new(
            "java.awt.event.FocusListener",
            "java.awt.event.FocusEvent",
            &["focusGained", "focusLost"],
        ),
        ListenerInterface::new(
            "javax.swing.event.ChangeListener",
            "javax.swing.event.ChangeEvent",
            &["stateChanged"],
        ),
        ListenerInterface::new(
            "javax.swing.event.ListSelectionListener",
            "javax.swing.event.ListSelectionEvent",
            &["valueChanged"],
        ),
        ListenerInterface::new(
            "javax.swing.event.CaretListener",
            "javax.swing.event.CaretEvent",
            &["caretUpdate"],
        ),
        ListenerInterface::new(
            "java.beans.PropertyChangeListener",
            "java.beans.PropertyChangeEvent",
            &["propertyChange"],
        ),
        ListenerInterface::new(
            "org.eclipse.swt.widgets.Listener",
            "org.eclipse.swt.widgets.Event",
            &["handleEvent"],
        ),
        ListenerInterface::new(
            "org.eclipse.swt.events.SelectionListener",
            "org.eclipse.swt.events.SelectionEvent",
            &["widgetSelected", "widgetDefaultSelected"],
        ),
        ListenerInterface::new("javafx.event.EventHandler", "javafx.event.Event", &["handle"]),
    ]
}

/// Strips generic arguments: `EventHandler<ActionEvent>` → `EventHandler`.
pub fn erase_generics(ty: &str) -> &str {
    ty.split('<').next().unwrap_or(ty).trim()
}

/// Compares a possibly unqualified type name against a qualified one.
fn same_type(candidate: &str, qualified: &str) -> bool {
    let candidate = erase_generics(candidate);
    candidate == qualified || (!candidate.contains('.') && simple_name(qualified) == candidate)
}

/// Widget and listener knowledge shared by every analysis stage.
#[derive(Debug, Clone)]
pub struct Toolkit {
    widget_classes: Vec<String>,
    widget_prefixes: Vec<String>,
    listeners: Vec<ListenerInterface>,
    listener_packages: Vec<String>,
    action_command_methods: Vec<String>,
}

impl Default for Toolkit {
    fn default() -> Self {
        Self::from_config(&ToolkitConfig::default())
    }
}

impl Toolkit {
    pub fn from_config(config: &ToolkitConfig) -> Self {
        let mut listeners = builtin_listeners();
        for extra in &config.listeners {
            listeners.retain(|l| l.name != extra.name);
            listeners.push(ListenerInterface {
                name: extra.name.clone(),
                methods: extra
                    .methods
                    .iter()
                    .map(|m| ListenerMethod {
                        name: m.clone(),
                        param_types: vec![extra.event_type.clone()],
                        return_type: "void".to_string(),
                    })
                    .collect(),
            });
        }
        Self {
            widget_classes: config.widget_classes.clone(),
            widget_prefixes: config.widget_prefixes.clone(),
            listeners,
            listener_packages: config.listener_packages.clone(),
            action_command_methods: config.action_command_methods.clone(),
        }
    }

    fn is_known_widget(&self, ty: &str) -> bool {
        let ty = erase_generics(ty);
        self.widget_classes.iter().any(|w| same_type(ty, w))
            || self.widget_prefixes.iter().any(|p| ty.starts_with(p.as_str()))
    }

    /// Whether `ty` is a toolkit widget class or a program class extending one.
    pub fn is_widget_type(&self, tree: &Tree, ty: &str) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(erase_generics(ty).to_string());
        while let Some(name) = current.take() {
            if self.is_known_widget(&name) {
                return true;
            }
            if !visited.insert(name.clone()) {
                return false;
            }
            current = tree
                .find_class(&name)
                .and_then(|c| tree.kind(c).as_class())
                .and_then(|c| c.superclass.clone());
        }
        false
    }

    /// Whether the class node is (a subtype of) a widget.
    pub fn is_widget_class(&self, tree: &Tree, class: NodeId) -> bool {
        match tree.kind(class) {
            NodeKind::Class(c) => self.is_widget_type(tree, &c.name),
            _ => false,
        }
    }

    fn builtin_listener(&self, name: &str) -> Option<&ListenerInterface> {
        self.listeners.iter().find(|l| same_type(name, &l.name))
    }

    fn in_listener_package(&self, name: &str) -> bool {
        let name = erase_generics(name);
        let Some((package, simple)) = name.rsplit_once('.') else {
            return false;
        };
        simple.ends_with("Listener") && self.listener_packages.iter().any(|p| p == package)
    }

    /// Whether `name` denotes a listener interface.
    pub fn is_listener_interface(&self, tree: &Tree, name: &str) -> bool {
        let mut visited = HashSet::new();
        self.is_listener_rec(tree, name, &mut visited)
    }

    fn is_listener_rec(&self, tree: &Tree, name: &str, visited: &mut HashSet<String>) -> bool {
        if self.builtin_listener(name).is_some() || self.in_listener_package(name) {
            return true;
        }
        if !visited.insert(erase_generics(name).to_string()) {
            return false;
        }
        let Some(decl) = tree
            .find_class(erase_generics(name))
            .and_then(|c| tree.kind(c).as_class())
        else {
            return false;
        };
        decl.interface
            && decl
                .interfaces
                .iter()
                .any(|parent| self.is_listener_rec(tree, parent, visited))
    }

    /// Callback names of a listener interface, from the tree when declared
    /// there and from the table otherwise.
    fn callback_names(&self, tree: &Tree, name: &str) -> Vec<String> {
        if let Some(class) = tree.find_class(erase_generics(name)) {
            if let NodeKind::Class(decl) = tree.kind(class) {
                let mut names: Vec<String> = decl
                    .members
                    .iter()
                    .filter_map(|m| tree.kind(*m).as_method())
                    .filter(|m| m.body.is_none())
                    .map(|m| m.name.clone())
                    .collect();
                for parent in &decl.interfaces {
                    names.extend(self.callback_names(tree, parent));
                }
                return names;
            }
        }
        match self.builtin_listener(name) {
            Some(l) => l.methods.iter().map(|m| m.name.clone()).collect(),
            None => Vec::new(),
        }
    }

    /// Listener interfaces a class implements, following superclasses
    /// declared in the tree.
    pub fn listener_interfaces_of_class(&self, tree: &Tree, class: NodeId) -> Vec<String> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(class);
        while let Some(id) = current.take() {
            if !visited.insert(id) {
                break;
            }
            let Some(decl) = tree.kind(id).as_class() else {
                break;
            };
            for iface in &decl.interfaces {
                if self.is_listener_interface(tree, iface) && !out.contains(iface) {
                    out.push(iface.clone());
                }
            }
            current = decl.superclass.as_deref().and_then(|s| tree.find_class(s));
        }
        out
    }

    /// The listener interface an executable implements, if it is a listener.
    ///
    /// Methods are matched against the listener interfaces of their class;
    /// closures against the declared parameter type of the registration call
    /// they are passed to.
    pub fn listener_interface_of(&self, tree: &Tree, exec: NodeId) -> Option<String> {
        match tree.kind(exec) {
            NodeKind::Method(m) => {
                let class = tree.parent(exec)?;
                self.listener_interfaces_of_class(tree, class)
                    .into_iter()
                    .find(|iface| self.callback_names(tree, iface).contains(&m.name))
            }
            NodeKind::Lambda { .. } => {
                let call = tree.parent(exec)?;
                let NodeKind::Invocation { method, args, .. } = tree.kind(call) else {
                    return None;
                };
                if args.len() != 1 {
                    return None;
                }
                match method.param_types.first() {
                    Some(ty) if self.is_listener_interface(tree, ty) => {
                        Some(erase_generics(ty).to_string())
                    }
                    Some(_) => None,
                    None => self.interface_from_registration_name(&method.name),
                }
            }
            _ => None,
        }
    }

    /// `addActionListener` → the table entry named `ActionListener`.
    fn interface_from_registration_name(&self, call: &str) -> Option<String> {
        let simple = call.strip_prefix("add")?;
        self.listeners
            .iter()
            .find(|l| simple_name(&l.name) == simple)
            .map(|l| l.name.clone())
    }

    pub fn is_listener_method(&self, tree: &Tree, exec: NodeId) -> bool {
        self.listener_interface_of(tree, exec).is_some()
    }

    /// Whether an invocation registers a listener: exactly one argument whose
    /// declared type is a listener interface. When the callee's parameter
    /// types are unknown, `add*Listener` calls qualify.
    pub fn is_registration_call(&self, tree: &Tree, inv: NodeId) -> bool {
        let NodeKind::Invocation { method, args, .. } = tree.kind(inv) else {
            return false;
        };
        if args.len() != 1 {
            return false;
        }
        match method.param_types.first() {
            Some(ty) => self.is_listener_interface(tree, ty),
            None => method.name.starts_with("add") && method.name.ends_with("Listener"),
        }
    }

    /// Registration calls for a given interface, when one is known.
    pub fn registers_interface(&self, tree: &Tree, inv: NodeId, iface: Option<&str>) -> bool {
        if !self.is_registration_call(tree, inv) {
            return false;
        }
        let (Some(iface), NodeKind::Invocation { method, .. }) = (iface, tree.kind(inv)) else {
            return true;
        };
        match method.param_types.first() {
            Some(ty) => same_type(ty, iface) || same_type(iface, erase_generics(ty)),
            None => method
                .name
                .strip_prefix("add")
                .is_some_and(|s| s == simple_name(erase_generics(iface))),
        }
    }

    pub fn is_action_command_method(&self, name: &str) -> bool {
        self.action_command_methods.iter().any(|m| m == name)
    }

    /// The callback to implement when building an anonymous listener class.
    ///
    /// The tree declaration of the interface wins over the built-in table.
    /// `hint` selects among several callbacks; a single callback is taken
    /// regardless of its name.
    pub fn abstract_method(
        &self,
        tree: &Tree,
        iface: &str,
        hint: &str,
    ) -> AnalysisResult<ListenerMethod> {
        let candidates: Vec<ListenerMethod> = match tree.find_class(erase_generics(iface)) {
            Some(class) => tree
                .children(class)
                .into_iter()
                .filter_map(|m| {
                    let decl = tree.kind(m).as_method()?;
                    if decl.body.is_some() {
                        return None;
                    }
                    Some(ListenerMethod {
                        name: decl.name.clone(),
                        param_types: decl
                            .params
                            .iter()
                            .filter_map(|p| tree.declared_type(*p).map(str::to_string))
                            .collect(),
                        return_type: decl.return_type.clone(),
                    })
                })
                .collect(),
            None => self
                .builtin_listener(iface)
                .map(|l| l.methods.clone())
                .unwrap_or_default(),
        };

        if let Some(found) = candidates.iter().find(|m| m.name == hint) {
            return Ok(found.clone());
        }
        match candidates.len() {
            0 => Err(AnalysisError::StructuralPrecondition(format!(
                "listener interface {} has no abstract method to implement",
                iface
            ))),
            1 => Ok(candidates[0].clone()),
            n => Err(AnalysisError::AmbiguousEvidence(format!(
                "{} abstract methods in {} and none named {}",
                n, iface, hint
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ClassDecl, MethodDecl};

    #[test]
    fn test_widget_recognition() {
        let toolkit = Toolkit::default();
        let tree = Tree::new();
        assert!(toolkit.is_widget_type(&tree, "javax.swing.JButton"));
        assert!(toolkit.is_widget_type(&tree, "org.eclipse.swt.widgets.Button"));
        assert!(toolkit.is_widget_type(&tree, "java.awt.TextField"));
        assert!(!toolkit.is_widget_type(&tree, "java.lang.String"));
    }

    #[test]
    fn test_widget_subclass_in_tree() {
        let mut tree = Tree::new();
        let class = tree.add(NodeKind::Class(ClassDecl {
            name: "app.FancyButton".into(),
            superclass: Some("javax.swing.JButton".into()),
            ..ClassDecl::default()
        }));
        tree.add_root(class);
        let toolkit = Toolkit::default();
        assert!(toolkit.is_widget_type(&tree, "app.FancyButton"));
        assert!(toolkit.is_widget_class(&tree, class));
    }

    #[test]
    fn test_listener_interfaces() {
        let toolkit = Toolkit::default();
        let tree = Tree::new();
        assert!(toolkit.is_listener_interface(&tree, "java.awt.event.ActionListener"));
        assert!(toolkit.is_listener_interface(&tree, "ActionListener"));
        assert!(toolkit.is_listener_interface(&tree, "java.awt.event.WindowListener"));
        assert!(toolkit.is_listener_interface(&tree, "javafx.event.EventHandler<ActionEvent>"));
        assert!(!toolkit.is_listener_interface(&tree, "java.lang.Runnable"));
    }

    #[test]
    fn test_abstract_method_prefers_tree_declaration() {
        let mut tree = Tree::new();
        let first = tree.add(NodeKind::Method(MethodDecl {
            name: "onClick".into(),
            ..MethodDecl::default()
        }));
        let second = tree.add(NodeKind::Method(MethodDecl {
            name: "onHover".into(),
            ..MethodDecl::default()
        }));
        let iface = tree.add(NodeKind::Class(ClassDecl {
            name: "app.ClickListener".into(),
            interfaces: vec!["java.util.EventListener".into()],
            members: vec![first, second],
            interface: true,
            ..ClassDecl::default()
        }));
        tree.add_root(iface);
        let toolkit = Toolkit::default();
        let picked = toolkit
            .abstract_method(&tree, "app.ClickListener", "onHover")
            .unwrap();
        assert_eq!(picked.name, "onHover");
        assert!(matches!(
            toolkit.abstract_method(&tree, "app.ClickListener", "other"),
            Err(AnalysisError::AmbiguousEvidence(_))
        ));
        let table = toolkit
            .abstract_method(&tree, "java.awt.event.ActionListener", "whatever")
            .unwrap();
        assert_eq!(table.name, "actionPerformed");
    }

    #[test]
    fn test_missing_abstract_method_is_structural() {
        let mut tree = Tree::new();
        let iface = tree.add(NodeKind::Class(ClassDecl {
            name: "app.Marker".into(),
            interface: true,
            ..ClassDecl::default()
        }));
        tree.add_root(iface);
        let result = Toolkit::default().abstract_method(&tree, "app.Marker", "x");
        assert!(matches!(
            result,
            Err(AnalysisError::StructuralPrecondition(_))
        ));
    }
}
