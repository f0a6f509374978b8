//! Test-only builder for small GUI programs.

use crate::tree::{
    BinaryOp, ClassDecl, ExecutableRef, Literal, MethodDecl, NodeId, NodeKind, SourcePosition,
    Tree, UnaryOp, Visibility,
};

pub const ACTION_LISTENER: &str = "java.awt.event.ActionListener";
pub const ACTION_EVENT: &str = "java.awt.event.ActionEvent";
pub const JBUTTON: &str = "javax.swing.JButton";

/// Builds one class whose members are collected as they are created.
pub struct Builder {
    tree: Tree,
    name: String,
    superclass: Option<String>,
    interfaces: Vec<String>,
    members: Vec<NodeId>,
}

impl Builder {
    pub fn new(class: &str) -> Self {
        Self {
            tree: Tree::new(),
            name: class.to_string(),
            superclass: None,
            interfaces: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn implements(&mut self, iface: &str) -> &mut Self {
        self.interfaces.push(iface.to_string());
        self
    }

    pub fn extends(&mut self, superclass: &str) -> &mut Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn at(&mut self, id: NodeId, line: usize, end_line: usize) -> NodeId {
        self.tree
            .set_position(id, SourcePosition::new("Main.java", line, end_line));
        id
    }

    pub fn field(&mut self, name: &str, ty: &str) -> NodeId {
        self.field_with(name, ty, Visibility::Private, None)
    }

    pub fn field_with(
        &mut self,
        name: &str,
        ty: &str,
        visibility: Visibility,
        init: Option<NodeId>,
    ) -> NodeId {
        let id = self.tree.add(NodeKind::Field {
            name: name.into(),
            ty: ty.into(),
            visibility,
            init,
        });
        self.members.push(id);
        id
    }

    pub fn param(&mut self, name: &str, ty: &str) -> NodeId {
        self.tree.add(NodeKind::Parameter {
            name: name.into(),
            ty: ty.into(),
        })
    }

    pub fn local(&mut self, name: &str, ty: &str, init: Option<NodeId>) -> NodeId {
        self.tree.add(NodeKind::LocalVariable {
            name: name.into(),
            ty: ty.into(),
            init,
        })
    }

    /// Read of a field, local or parameter, typed with its declared type.
    pub fn read(&mut self, decl: NodeId) -> NodeId {
        let name = self.tree.name_of(decl).unwrap_or("?").to_string();
        let ty = self.tree.declared_type(decl).map(str::to_string);
        let id = self.tree.add(NodeKind::VariableAccess {
            name,
            target: None,
            decl: Some(decl),
        });
        if let Some(ty) = ty {
            self.tree.set_type(id, ty);
        }
        id
    }

    pub fn this(&mut self) -> NodeId {
        let id = self.tree.add(NodeKind::ThisAccess);
        let name = self.name.clone();
        self.tree.set_type(id, name);
        id
    }

    pub fn opaque(&mut self, text: &str) -> NodeId {
        self.tree.add(NodeKind::Opaque { text: text.into() })
    }

    pub fn lit_str(&mut self, value: &str) -> NodeId {
        let id = self.tree.add(NodeKind::Literal {
            value: Literal::String(value.into()),
        });
        self.tree.set_type(id, "java.lang.String");
        id
    }

    pub fn lit_int(&mut self, value: i64) -> NodeId {
        self.tree.add(NodeKind::Literal {
            value: Literal::Int(value),
        })
    }

    pub fn lit_bool(&mut self, value: bool) -> NodeId {
        self.tree.add(NodeKind::Literal {
            value: Literal::Bool(value),
        })
    }

    pub fn not(&mut self, operand: NodeId) -> NodeId {
        self.tree.add(NodeKind::Unary {
            op: UnaryOp::Not,
            operand,
        })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.tree.add(NodeKind::Binary { op, lhs, rhs })
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.tree.add(NodeKind::Assignment { target, value })
    }

    pub fn call(&mut self, target: Option<NodeId>, name: &str, args: Vec<NodeId>) -> NodeId {
        self.call_ref(target, ExecutableRef::new(name), args)
    }

    pub fn call_ref(
        &mut self,
        target: Option<NodeId>,
        method: ExecutableRef,
        args: Vec<NodeId>,
    ) -> NodeId {
        self.tree.add(NodeKind::Invocation {
            target,
            method,
            args,
        })
    }

    /// `widget.addActionListener(listener)`.
    pub fn register(&mut self, widget: NodeId, listener: NodeId) -> NodeId {
        self.call_ref(
            Some(widget),
            ExecutableRef::new("addActionListener")
                .declared_by("javax.swing.AbstractButton")
                .with_params([ACTION_LISTENER]),
            vec![listener],
        )
    }

    /// `e.getActionCommand().equals(value)`.
    pub fn action_command_equals(&mut self, event: NodeId, value: &str) -> NodeId {
        let read = self.read(event);
        let get = self.call(Some(read), "getActionCommand", vec![]);
        self.tree.set_type(get, "java.lang.String");
        let lit = self.lit_str(value);
        let equals = self.call(Some(get), "equals", vec![lit]);
        self.tree.set_type(equals, "boolean");
        equals
    }

    pub fn block(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.tree.add(NodeKind::Block { stmts })
    }

    pub fn if_(&mut self, cond: NodeId, then: Option<NodeId>, other: Option<NodeId>) -> NodeId {
        self.tree.add(NodeKind::If {
            cond,
            then_branch: then,
            else_branch: other,
        })
    }

    pub fn switch(&mut self, selector: NodeId, cases: Vec<NodeId>) -> NodeId {
        self.tree.add(NodeKind::Switch { selector, cases })
    }

    pub fn case(&mut self, label: Option<NodeId>, stmts: Vec<NodeId>) -> NodeId {
        self.tree.add(NodeKind::Case { label, stmts })
    }

    pub fn ret(&mut self, expr: Option<NodeId>) -> NodeId {
        self.tree.add(NodeKind::Return { expr })
    }

    pub fn brk(&mut self) -> NodeId {
        self.tree.add(NodeKind::Break)
    }

    pub fn lambda(&mut self, params: Vec<NodeId>, body: NodeId) -> NodeId {
        self.tree.add(NodeKind::Lambda { params, body })
    }

    /// Public `void` method added to the class.
    pub fn method(&mut self, name: &str, params: Vec<NodeId>, body: NodeId) -> NodeId {
        self.method_with(name, params, "void", Visibility::Public, body)
    }

    pub fn method_with(
        &mut self,
        name: &str,
        params: Vec<NodeId>,
        return_type: &str,
        visibility: Visibility,
        body: NodeId,
    ) -> NodeId {
        let id = self.tree.add(NodeKind::Method(MethodDecl {
            name: name.into(),
            params,
            return_type: return_type.into(),
            visibility,
            body: Some(body),
        }));
        self.members.push(id);
        id
    }

    /// `public void actionPerformed(ActionEvent e) { stmts }`.
    pub fn action_performed(&mut self, stmts: Vec<NodeId>, event: NodeId) -> NodeId {
        let body = self.block(stmts);
        self.method("actionPerformed", vec![event], body)
    }

    /// Adds the class as a root and returns the finished tree.
    pub fn finish(self) -> Tree {
        self.finish_with_class().0
    }

    pub fn finish_with_class(mut self) -> (Tree, NodeId) {
        let class = self.tree.add(NodeKind::Class(ClassDecl {
            name: self.name,
            superclass: self.superclass,
            interfaces: self.interfaces,
            members: self.members,
            anonymous: false,
            interface: false,
        }));
        self.tree.add_root(class);
        (self.tree, class)
    }
}
