//! Compilation session.
//!
//! [`Program`] owns all state shared by one inference run: the expression
//! arena, the type table, the binding graph, the symbol table, globals,
//! constants and the macro expander cache. Nothing here is global; a new
//! session starts from `Program::new()`.

use crate::ast::{Ast, Expr, ExprId, ExprKind};
use crate::collab::MacroExpander;
use crate::error::FrozenTypeError;
use crate::inference::graph::{NodeId, TypeGraph, TypeMapping};
use crate::inference::lattice::{Builtins, ConstId, TypeId, TypeKind, TypeTable};
use crate::syntax::Location;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstState {
    Pending,
    Evaluating,
    Done,
}

/// A lazily inferred constant and the context it was declared in
#[derive(Debug, Clone)]
pub struct Const {
    pub owner: TypeId,
    pub name: String,
    pub value: ExprId,
    /// Enclosing type stack at the declaration
    pub types: Vec<TypeId>,
    pub scope: Option<TypeId>,
    pub state: ConstState,
}

/// What a call needs to be re-resolved outside the visit that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Type of `self` where the call was written
    pub scope: TypeId,
}

/// Macro identity plus the construct kind of every argument
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacroCacheKey {
    pub macro_def: ExprId,
    pub shapes: Vec<&'static str>,
}

pub struct Program {
    pub ast: Ast,
    pub types: TypeTable,
    pub graph: TypeGraph,
    pub symbols: IndexSet<String>,
    pub global_vars: IndexMap<String, NodeId>,
    consts: Vec<Const>,
    pub(crate) const_stack: Vec<ConstId>,
    pub(crate) macro_targets: HashMap<ExprId, ExprId>,
    pub(crate) while_breaks: IndexSet<ExprId>,
    pub(crate) block_breaks: HashMap<ExprId, NodeId>,
    pub(crate) call_sites: HashMap<ExprId, CallSite>,
    pub(crate) macro_cache: HashMap<MacroCacheKey, Rc<dyn MacroExpander>>,
    pub(crate) macro_depth: usize,
    temp_counter: usize,
    nil_var: NodeId,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    pub fn new() -> Self {
        let types = TypeTable::new();
        let mut graph = TypeGraph::new();
        let nil_var = graph.add_node(TypeMapping::Identity);
        graph.seed(nil_var, types.builtins().nil);
        Self {
            ast: Ast::new(),
            types,
            graph,
            symbols: IndexSet::new(),
            global_vars: IndexMap::new(),
            consts: Vec::new(),
            const_stack: Vec::new(),
            macro_targets: HashMap::new(),
            while_breaks: IndexSet::new(),
            block_breaks: HashMap::new(),
            call_sites: HashMap::new(),
            macro_cache: HashMap::new(),
            macro_depth: 0,
            temp_counter: 0,
            nil_var,
        }
    }

    pub fn builtins(&self) -> Builtins {
        *self.types.builtins()
    }

    pub fn root(&self) -> TypeId {
        self.types.root()
    }

    /// Node typed `Nil`, used for absent branches and missing values
    pub fn nil_var(&self) -> NodeId {
        self.nil_var
    }

    pub(crate) fn alloc_expr(&mut self, kind: ExprKind, location: Option<Location>) -> ExprId {
        let mapping = match kind {
            ExprKind::PointerOf(_) => TypeMapping::PointerOf,
            ExprKind::TypeMerge(_) => TypeMapping::Metaclass,
            _ => TypeMapping::Identity,
        };
        let node = self.graph.add_node(mapping);
        self.ast.push(Expr { kind, location, node })
    }

    pub fn node_of(&self, expr: ExprId) -> NodeId {
        self.ast.node(expr)
    }

    pub fn type_of(&self, expr: ExprId) -> Option<TypeId> {
        self.graph.type_of(self.ast.node(expr))
    }

    pub fn type_name(&self, ty: TypeId) -> String {
        self.types.name(ty)
    }

    /// Display name of an expression's type, if it has one
    pub fn expr_type_name(&self, expr: ExprId) -> Option<String> {
        self.type_of(expr).map(|ty| self.types.name(ty))
    }

    pub fn bind(&mut self, node: NodeId, deps: &[NodeId]) -> Result<(), FrozenTypeError> {
        self.graph.bind(&mut self.types, node, deps)
    }

    pub fn unbind(&mut self, node: NodeId, deps: &[NodeId]) {
        self.graph.unbind(node, deps)
    }

    pub fn set_type(&mut self, node: NodeId, ty: TypeId) -> Result<(), FrozenTypeError> {
        self.graph.set_type(&mut self.types, node, ty)
    }

    pub fn new_var(&mut self) -> NodeId {
        self.graph.add_node(TypeMapping::Identity)
    }

    /// Node standing for the value `ty`
    pub fn typed_var(&mut self, ty: TypeId) -> NodeId {
        let node = self.new_var();
        self.graph.seed(node, ty);
        node
    }

    pub fn add_symbol(&mut self, name: &str) {
        self.symbols.insert(name.to_string());
    }

    /// Generated expansion of a macro call, once it was inferred
    pub fn macro_expansion(&self, call: ExprId) -> Option<ExprId> {
        self.macro_targets.get(&call).copied()
    }

    /// Number of macro expansions currently being typed
    pub fn macro_depth(&self) -> usize {
        self.macro_depth
    }

    /// Fresh variable name for synthesized code
    pub fn temp_name(&mut self) -> String {
        self.temp_counter += 1;
        format!("#temp_{}", self.temp_counter)
    }

    /// Instance variable slot of `owner`.
    ///
    /// A variable not assigned by every `initialize` may be read before it
    /// is set, so its slot also carries `Nil`.
    pub fn lookup_instance_var(&mut self, owner: TypeId, name: &str) -> Result<NodeId, FrozenTypeError> {
        let existing = self.types.get(owner).instance_vars.get(name).copied();
        let var = match existing {
            Some(var) => var,
            None => {
                let var = self.new_var();
                self.types
                    .get_mut(owner)
                    .instance_vars
                    .insert(name.to_string(), var);
                var
            }
        };
        if !self.has_instance_var_in_initialize(owner, name) {
            let nil = self.nil_var;
            self.bind(var, &[nil])?;
        }
        Ok(var)
    }

    pub fn has_instance_var_in_initialize(&self, owner: TypeId, name: &str) -> bool {
        let base = match self.types.kind(owner) {
            TypeKind::Instance { generic, .. } => *generic,
            _ => owner,
        };
        std::iter::once(base)
            .chain(self.types.ancestors(base))
            .any(|ty| {
                self.types
                    .get(ty)
                    .initialize_ivars
                    .as_ref()
                    .is_some_and(|ivars| ivars.contains(name))
            })
    }

    /// Register a def, tracking what every `initialize` assigns
    pub fn add_def(&mut self, owner: TypeId, name: &str, arity: usize, def: ExprId) {
        self.types.add_def(owner, name, arity, def);
        if name != "initialize" {
            return;
        }
        let assigned = match self.ast.kind(def) {
            ExprKind::Def(def) => def
                .body
                .map(|body| self.ast.assigned_instance_vars(body))
                .unwrap_or_default(),
            _ => IndexSet::new(),
        };
        let data = self.types.get_mut(owner);
        data.initialize_ivars = Some(match data.initialize_ivars.take() {
            Some(previous) => previous.intersection(&assigned).cloned().collect(),
            None => assigned,
        });
    }

    /// Node receiving the values of `break` inside `block`
    pub fn block_break(&mut self, block: ExprId) -> NodeId {
        if let Some(node) = self.block_breaks.get(&block) {
            return *node;
        }
        let node = self.new_var();
        self.block_breaks.insert(block, node);
        node
    }

    pub fn add_const(&mut self, konst: Const) -> ConstId {
        let id = ConstId(self.consts.len() as u32);
        self.types.add_const(konst.owner, &konst.name, id);
        self.consts.push(konst);
        id
    }

    pub fn const_(&self, id: ConstId) -> &Const {
        &self.consts[id.0 as usize]
    }

    pub(crate) fn const_mut(&mut self, id: ConstId) -> &mut Const {
        &mut self.consts[id.0 as usize]
    }

    /// Constants whose value has not been inferred yet
    pub fn pending_consts(&self) -> Vec<ConstId> {
        self.consts
            .iter()
            .enumerate()
            .filter(|(_, konst)| konst.state == ConstState::Pending)
            .map(|(index, _)| ConstId(index as u32))
            .collect()
    }

    /// Qualified name such as `Foo::A`
    pub fn const_name(&self, id: ConstId) -> String {
        let konst = self.const_(id);
        if konst.owner == self.root() {
            konst.name.clone()
        } else {
            format!("{}::{}", self.types.name(konst.owner), konst.name)
        }
    }

    /// Type every node nothing ever bound as `NoReturn`
    pub fn fix_empty_types(&mut self) -> usize {
        let bottom = self.builtins().no_return;
        self.graph.fix_empty_types(bottom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Node;

    #[test]
    fn test_nil_var_is_typed() {
        let program = Program::new();
        assert_eq!(program.graph.type_of(program.nil_var()), Some(program.builtins().nil));
    }

    #[test]
    fn test_temp_names_are_unique() {
        let mut program = Program::new();
        assert_eq!(program.temp_name(), "#temp_1");
        assert_eq!(program.temp_name(), "#temp_2");
    }

    #[test]
    fn test_initialize_ivars_intersect() {
        let mut program = Program::new();
        let root = program.root();
        let first = program
            .lower(Node::def(
                "initialize",
                &[],
                Some(Node::expressions(vec![
                    Node::assign(Node::ivar("@a"), Node::int32(1)),
                    Node::assign(Node::ivar("@b"), Node::int32(2)),
                ])),
            ))
            .unwrap();
        let second = program
            .lower(Node::def(
                "initialize",
                &["x"],
                Some(Node::assign(Node::ivar("@a"), Node::var("x"))),
            ))
            .unwrap();
        program.add_def(root, "initialize", 0, first);
        assert!(program.has_instance_var_in_initialize(root, "@b"));
        program.add_def(root, "initialize", 1, second);
        assert!(program.has_instance_var_in_initialize(root, "@a"));
        assert!(!program.has_instance_var_in_initialize(root, "@b"));
    }

    #[test]
    fn test_ivar_outside_initialize_is_nilable() {
        let mut program = Program::new();
        let b = program.builtins();
        let string = b.string;
        let var = program.lookup_instance_var(string, "@x").unwrap();
        assert_eq!(program.graph.type_of(var), Some(b.nil));
        assert_eq!(program.lookup_instance_var(string, "@x").unwrap(), var);
    }

    #[test]
    fn test_typeof_expressions_map_to_metaclass() {
        let mut program = Program::new();
        let b = program.builtins();
        let value = program.lower(Node::int32(1)).unwrap();
        let merge = program.alloc_expr(ExprKind::TypeMerge(vec![value]), None);
        program.set_type(program.node_of(value), b.int32).unwrap();
        let node = program.node_of(merge);
        let value_node = program.node_of(value);
        program.bind(node, &[value_node]).unwrap();
        assert_eq!(program.expr_type_name(merge).as_deref(), Some("Int32:Class"));
    }
}
