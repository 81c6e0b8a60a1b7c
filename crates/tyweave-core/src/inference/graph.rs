//! Type-binding graph.
//!
//! Every typed node lives in an arena and is addressed by [`NodeId`].
//! Dependency and observer edges are index lists stored on each node, so
//! cycles (recursive methods, loops feeding a variable back into itself)
//! need no shared ownership. Propagation stops as soon as a node's type id
//! stops changing, which is what makes cyclic graphs converge.

use crate::ast::ExprId;
use crate::error::FrozenTypeError;
use crate::inference::filters::{FilterMap, TypeFilter};
use crate::inference::lattice::{TypeId, TypeTable};
use smallvec::SmallVec;
use std::collections::{HashSet, VecDeque};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Something notified when a node's type changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observer {
    Node(NodeId),
    /// A call to re-resolve once the driver drains the pending queue
    Call(ExprId),
}

/// How a node derives its own type from its dependencies' merge
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeMapping {
    #[default]
    Identity,
    PointerOf,
    Metaclass,
    Filter(TypeFilter),
}

#[derive(Debug, Clone, Default)]
pub struct TypedNode {
    pub ty: Option<TypeId>,
    dependencies: SmallVec<[NodeId; 2]>,
    observers: SmallVec<[Observer; 2]>,
    type_filters: Option<FilterMap>,
    frozen: bool,
    dirty: bool,
    mapping: TypeMapping,
}

impl TypedNode {
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    pub fn observers(&self) -> &[Observer] {
        &self.observers
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

#[derive(Debug, Default)]
pub struct TypeGraph {
    nodes: Vec<TypedNode>,
    pending: VecDeque<ExprId>,
    pending_set: HashSet<ExprId>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_node(&mut self, mapping: TypeMapping) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(TypedNode {
            mapping,
            ..TypedNode::default()
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &TypedNode {
        &self.nodes[id.index()]
    }

    pub fn type_of(&self, id: NodeId) -> Option<TypeId> {
        self.nodes[id.index()].ty
    }

    pub fn type_filters(&self, id: NodeId) -> Option<&FilterMap> {
        self.nodes[id.index()].type_filters.as_ref()
    }

    pub fn set_type_filters(&mut self, id: NodeId, filters: Option<FilterMap>) {
        self.nodes[id.index()].type_filters = filters;
    }

    pub fn freeze(&mut self, id: NodeId) {
        self.nodes[id.index()].frozen = true;
    }

    pub fn add_observer(&mut self, id: NodeId, observer: Observer) {
        let observers = &mut self.nodes[id.index()].observers;
        if !observers.contains(&observer) {
            observers.push(observer);
        }
    }

    pub fn remove_observer(&mut self, id: NodeId, observer: Observer) {
        self.nodes[id.index()].observers.retain(|o| *o != observer);
    }

    /// Assign a type directly and propagate it to observers
    pub fn set_type(&mut self, types: &mut TypeTable, id: NodeId, ty: TypeId) -> Result<(), FrozenTypeError> {
        if self.nodes[id.index()].ty == Some(ty) {
            return Ok(());
        }
        self.commit(types, id, ty)?;
        self.propagate(types, id)
    }

    /// Make `id` depend on `deps`.
    ///
    /// One dependency passes its type through unchanged; several are merged.
    pub fn bind(&mut self, types: &mut TypeTable, id: NodeId, deps: &[NodeId]) -> Result<(), FrozenTypeError> {
        for dep in deps {
            let node = &mut self.nodes[id.index()];
            if !node.dependencies.contains(dep) {
                node.dependencies.push(*dep);
            }
            self.add_observer(*dep, Observer::Node(id));
        }
        let Some(new_ty) = self.type_from_dependencies(types, id) else {
            return Ok(());
        };
        if self.nodes[id.index()].ty == Some(new_ty) {
            return Ok(());
        }
        self.commit(types, id, new_ty)?;
        self.propagate(types, id)
    }

    /// Drop edges to `deps`; the committed type stays as it is
    pub fn unbind(&mut self, id: NodeId, deps: &[NodeId]) {
        self.nodes[id.index()]
            .dependencies
            .retain(|dep| !deps.contains(dep));
        for dep in deps {
            self.remove_observer(*dep, Observer::Node(id));
        }
    }

    fn type_from_dependencies(&self, types: &mut TypeTable, id: NodeId) -> Option<TypeId> {
        let node = &self.nodes[id.index()];
        let merged = match node.dependencies.as_slice() {
            [] => None,
            [single] => self.type_of(*single),
            many => {
                let known: Vec<TypeId> = many.iter().filter_map(|dep| self.type_of(*dep)).collect();
                types.merge(&known)
            }
        }?;
        match &node.mapping {
            TypeMapping::Identity => Some(merged),
            TypeMapping::PointerOf => Some(types.pointer_of(merged)),
            TypeMapping::Metaclass => Some(types.metaclass_of(merged)),
            TypeMapping::Filter(filter) => filter.apply(types, merged),
        }
    }

    fn commit(&mut self, types: &TypeTable, id: NodeId, ty: TypeId) -> Result<(), FrozenTypeError> {
        let node = &mut self.nodes[id.index()];
        if node.frozen && node.ty != Some(ty) {
            return Err(FrozenTypeError {
                node: id,
                frozen: node.ty.map(|t| types.name(t)).unwrap_or_else(|| "(untyped)".to_string()),
                rejected: types.name(ty),
                location: None,
            });
        }
        trace!(node = id.0, ty = %types.name(ty), "type changed");
        node.ty = Some(ty);
        node.dirty = true;
        Ok(())
    }

    /// Notify every observer first, then let each changed one propagate in turn
    fn propagate(&mut self, types: &mut TypeTable, id: NodeId) -> Result<(), FrozenTypeError> {
        if !self.nodes[id.index()].dirty {
            return Ok(());
        }
        self.nodes[id.index()].dirty = false;
        let observers = self.nodes[id.index()].observers.clone();
        for observer in &observers {
            match observer {
                Observer::Node(node) => self.update(types, *node)?,
                Observer::Call(call) => {
                    if self.pending_set.insert(*call) {
                        self.pending.push_back(*call);
                    }
                }
            }
        }
        for observer in &observers {
            if let Observer::Node(node) = observer {
                self.propagate(types, *node)?;
            }
        }
        Ok(())
    }

    fn update(&mut self, types: &mut TypeTable, id: NodeId) -> Result<(), FrozenTypeError> {
        let Some(new_ty) = self.type_from_dependencies(types, id) else {
            return Ok(());
        };
        if self.nodes[id.index()].ty == Some(new_ty) {
            return Ok(());
        }
        self.commit(types, id, new_ty)
    }

    /// Type a fresh node without notifying anyone
    pub(crate) fn seed(&mut self, id: NodeId, ty: TypeId) {
        self.nodes[id.index()].ty = Some(ty);
    }

    /// Next call whose inputs changed since it was last resolved
    pub fn next_pending_call(&mut self) -> Option<ExprId> {
        let call = self.pending.pop_front()?;
        self.pending_set.remove(&call);
        Some(call)
    }

    /// Give every node nothing ever typed the `bottom` type
    pub fn fix_empty_types(&mut self, bottom: TypeId) -> usize {
        let mut fixed = 0;
        for node in &mut self.nodes {
            if node.ty.is_none() {
                node.ty = Some(bottom);
                fixed += 1;
            }
        }
        fixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (TypeGraph, TypeTable) {
        (TypeGraph::new(), TypeTable::new())
    }

    #[test]
    fn test_single_dependency_passes_type_through() {
        let (mut graph, mut types) = setup();
        let int32 = types.builtins().int32;
        let source = graph.add_node(TypeMapping::Identity);
        let target = graph.add_node(TypeMapping::Identity);
        graph.set_type(&mut types, source, int32).unwrap();
        graph.bind(&mut types, target, &[source]).unwrap();
        assert_eq!(graph.type_of(target), Some(int32));
    }

    #[test]
    fn test_multiple_dependencies_merge() {
        let (mut graph, mut types) = setup();
        let b = *types.builtins();
        let a = graph.add_node(TypeMapping::Identity);
        let c = graph.add_node(TypeMapping::Identity);
        let target = graph.add_node(TypeMapping::Identity);
        graph.bind(&mut types, target, &[a, c]).unwrap();
        assert_eq!(graph.type_of(target), None);
        graph.set_type(&mut types, a, b.int32).unwrap();
        assert_eq!(graph.type_of(target), Some(b.int32));
        graph.set_type(&mut types, c, b.float64).unwrap();
        let union = types.merge(&[b.int32, b.float64]);
        assert_eq!(graph.type_of(target), union);
    }

    #[test]
    fn test_propagation_reaches_transitive_observers() {
        let (mut graph, mut types) = setup();
        let b = *types.builtins();
        let root = graph.add_node(TypeMapping::Identity);
        let middle = graph.add_node(TypeMapping::Identity);
        let leaf = graph.add_node(TypeMapping::Identity);
        graph.bind(&mut types, middle, &[root]).unwrap();
        graph.bind(&mut types, leaf, &[middle]).unwrap();
        graph.set_type(&mut types, root, b.char).unwrap();
        assert_eq!(graph.type_of(leaf), Some(b.char));
    }

    #[test]
    fn test_cycle_converges() {
        let (mut graph, mut types) = setup();
        let b = *types.builtins();
        let seed = graph.add_node(TypeMapping::Identity);
        let var = graph.add_node(TypeMapping::Identity);
        let step = graph.add_node(TypeMapping::Identity);
        graph.bind(&mut types, step, &[var]).unwrap();
        graph.bind(&mut types, var, &[seed, step]).unwrap();
        graph.set_type(&mut types, seed, b.int32).unwrap();
        assert_eq!(graph.type_of(var), Some(b.int32));
        assert_eq!(graph.type_of(step), Some(b.int32));
    }

    #[test]
    fn test_frozen_node_rejects_other_type() {
        let (mut graph, mut types) = setup();
        let b = *types.builtins();
        let frozen = graph.add_node(TypeMapping::Identity);
        graph.set_type(&mut types, frozen, b.int32).unwrap();
        graph.freeze(frozen);
        let value = graph.add_node(TypeMapping::Identity);
        graph.set_type(&mut types, value, b.int32).unwrap();
        graph.bind(&mut types, frozen, &[value]).unwrap();
        let other = graph.add_node(TypeMapping::Identity);
        graph.set_type(&mut types, other, b.float64).unwrap();
        let err = graph.bind(&mut types, frozen, &[other]).unwrap_err();
        assert_eq!(err.to_string(), "type must be Int32, not Int32 | Float64");
        assert_eq!(graph.type_of(frozen), Some(b.int32));
    }

    #[test]
    fn test_unbind_keeps_committed_type() {
        let (mut graph, mut types) = setup();
        let b = *types.builtins();
        let source = graph.add_node(TypeMapping::Identity);
        let target = graph.add_node(TypeMapping::Identity);
        graph.set_type(&mut types, source, b.bool).unwrap();
        graph.bind(&mut types, target, &[source]).unwrap();
        graph.unbind(target, &[source]);
        graph.set_type(&mut types, source, b.char).unwrap();
        assert_eq!(graph.type_of(target), Some(b.bool));
        assert!(graph.node(source).observers().is_empty());
    }

    #[test]
    fn test_call_observers_are_queued_once() {
        let (mut graph, mut types) = setup();
        let b = *types.builtins();
        let arg = graph.add_node(TypeMapping::Identity);
        graph.add_observer(arg, Observer::Call(ExprId(9)));
        graph.add_observer(arg, Observer::Call(ExprId(9)));
        graph.set_type(&mut types, arg, b.int32).unwrap();
        graph.set_type(&mut types, arg, b.float64).unwrap();
        assert_eq!(graph.next_pending_call(), Some(ExprId(9)));
        assert_eq!(graph.next_pending_call(), None);
    }

    #[test]
    fn test_mappings() {
        let (mut graph, mut types) = setup();
        let b = *types.builtins();
        let source = graph.add_node(TypeMapping::Identity);
        let pointer = graph.add_node(TypeMapping::PointerOf);
        let meta = graph.add_node(TypeMapping::Metaclass);
        let filtered = graph.add_node(TypeMapping::Filter(TypeFilter::NotNil));
        graph.bind(&mut types, pointer, &[source]).unwrap();
        graph.bind(&mut types, meta, &[source]).unwrap();
        graph.bind(&mut types, filtered, &[source]).unwrap();
        let nilable = types.merge(&[b.int32, b.nil]).unwrap();
        graph.set_type(&mut types, source, nilable).unwrap();
        assert_eq!(graph.type_of(filtered), Some(b.int32));
        assert_eq!(graph.type_of(pointer).map(|t| types.name(t)), Some("Pointer(Int32 | Nil)".into()));
        assert_eq!(graph.type_of(meta).map(|t| types.name(t)), Some("Int32 | Nil:Class".into()));
    }

    #[test]
    fn test_fix_empty_types() {
        let (mut graph, mut types) = setup();
        let b = *types.builtins();
        let typed = graph.add_node(TypeMapping::Identity);
        graph.set_type(&mut types, typed, b.int32).unwrap();
        graph.add_node(TypeMapping::Identity);
        assert_eq!(graph.fix_empty_types(b.no_return), 1);
        assert_eq!(graph.fix_empty_types(b.no_return), 0);
    }
}
