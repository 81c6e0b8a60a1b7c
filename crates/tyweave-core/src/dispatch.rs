//! Default call resolver.
//!
//! [`SimpleDispatch`] resolves a call against each member of its receiver's
//! type and binds the call to the typed method instances it selected:
//!
//! - lookup is by name and argument count, walking superclasses and
//!   included modules
//! - every (owner, method, argument types, block) combination is typed
//!   once and cached, so recursion terminates
//! - `allocate` and `new` on a class, fun calls on a lib, and field access
//!   on C structs are built in
//!
//! There is no overload ranking by argument type; that belongs to a real
//! resolver plugged in through [`Collaborators`](crate::collab::Collaborators).

use crate::ast::{DefExpr, ExprId, ExprKind};
use crate::collab::CallResolver;
use crate::error::{InferError, InternalError, Result};
use crate::inference::graph::NodeId;
use crate::inference::lattice::{FunSignature, TypeId, TypeKind};
use crate::inference::program::Program;
use crate::inference::visitor::{TypeVisitor, VisitContext};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstanceKey {
    owner: TypeId,
    def: ExprId,
    args: Vec<TypeId>,
    block: Option<ExprId>,
}

#[derive(Debug, Default)]
pub struct SimpleDispatch {
    instances: RefCell<HashMap<InstanceKey, NodeId>>,
    targets: RefCell<HashMap<ExprId, Vec<NodeId>>>,
    /// One node per type, for results known up front
    values: RefCell<HashMap<TypeId, NodeId>>,
}

impl SimpleDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of method instances typed so far
    pub fn instance_count(&self) -> usize {
        self.instances.borrow().len()
    }

    fn value_node(&self, program: &mut Program, ty: TypeId) -> NodeId {
        if let Some(node) = self.values.borrow().get(&ty) {
            return *node;
        }
        let node = program.typed_var(ty);
        self.values.borrow_mut().insert(ty, node);
        node
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_one(
        &self,
        visitor: &mut TypeVisitor<'_>,
        call: ExprId,
        receiver: TypeId,
        name: &str,
        arg_types: &[TypeId],
        block: Option<ExprId>,
        implicit: bool,
    ) -> Result<NodeId> {
        let program = visitor.program();
        let types = &program.types;
        match types.kind(receiver).clone() {
            TypeKind::Metaclass { instance } => {
                if name == "allocate" && arg_types.is_empty() {
                    return self.allocate(visitor, call, instance);
                }
                if name == "new" && types.lookup_def(receiver, "new", arg_types.len()).is_none() {
                    return self.new_instance(visitor, call, instance, arg_types);
                }
                if matches!(types.kind(instance), TypeKind::Lib { .. }) {
                    if let Some(signature) = types.get(instance).funs.get(name).cloned() {
                        return self.call_fun(visitor, call, instance, name, &signature, arg_types);
                    }
                }
            }
            TypeKind::CStruct { fields } | TypeKind::CUnion { fields } => {
                if let Some(node) = self.field_access(visitor, call, receiver, &fields, name, arg_types)? {
                    return Ok(node);
                }
            }
            _ => {}
        }

        let program = visitor.program();
        let def = program
            .types
            .lookup_def(receiver, name, arg_types.len())
            .or_else(|| {
                implicit
                    .then(|| program.types.lookup_def(program.root(), name, arg_types.len()))
                    .flatten()
            });
        let Some(def) = def else {
            let message = format!(
                "undefined method '{name}' for {}",
                program.type_name(receiver)
            );
            return Err(visitor.error_at(call, message));
        };
        self.instantiate(visitor, call, receiver, def, arg_types, block)
    }

    fn allocate(&self, visitor: &mut TypeVisitor<'_>, call: ExprId, instance: TypeId) -> Result<NodeId> {
        visitor.check_allocatable(call, instance)?;
        Ok(self.value_node(visitor.program_mut(), instance))
    }

    fn new_instance(
        &self,
        visitor: &mut TypeVisitor<'_>,
        call: ExprId,
        instance: TypeId,
        arg_types: &[TypeId],
    ) -> Result<NodeId> {
        let node = self.allocate(visitor, call, instance)?;
        let initialize = visitor
            .program()
            .types
            .lookup_def(instance, "initialize", arg_types.len());
        match initialize {
            Some(def) => {
                self.instantiate(visitor, call, instance, def, arg_types, None)?;
            }
            None if !arg_types.is_empty() => {
                let message = format!(
                    "wrong number of arguments for '{}#initialize' ({} for 0)",
                    visitor.program().type_name(instance),
                    arg_types.len()
                );
                return Err(visitor.error_at(call, message));
            }
            None => {}
        }
        Ok(node)
    }

    fn call_fun(
        &self,
        visitor: &mut TypeVisitor<'_>,
        call: ExprId,
        lib: TypeId,
        name: &str,
        signature: &FunSignature,
        arg_types: &[TypeId],
    ) -> Result<NodeId> {
        let program = visitor.program();
        let label = format!("{}.{name}", program.type_name(lib));
        let arity_matches = if signature.varargs {
            arg_types.len() >= signature.args.len()
        } else {
            arg_types.len() == signature.args.len()
        };
        if !arity_matches {
            let message = format!(
                "wrong number of arguments for '{label}' ({} for {})",
                arg_types.len(),
                signature.args.len()
            );
            return Err(visitor.error_at(call, message));
        }
        for (index, (actual, expected)) in arg_types.iter().zip(&signature.args).enumerate() {
            if actual != expected {
                let message = format!(
                    "argument #{} of '{label}' must be {}, not {}",
                    index + 1,
                    program.type_name(*expected),
                    program.type_name(*actual)
                );
                return Err(visitor.error_at(call, message));
            }
        }
        Ok(self.value_node(visitor.program_mut(), signature.return_type))
    }

    /// `s.x` and `s.x = v` on a C struct or union
    fn field_access(
        &self,
        visitor: &mut TypeVisitor<'_>,
        call: ExprId,
        receiver: TypeId,
        fields: &IndexMap<String, TypeId>,
        name: &str,
        arg_types: &[TypeId],
    ) -> Result<Option<NodeId>> {
        if let (Some(field), []) = (fields.get(name), arg_types) {
            return Ok(Some(self.value_node(visitor.program_mut(), *field)));
        }
        let Some(field_name) = name.strip_suffix('=') else {
            return Ok(None);
        };
        let (Some(field), [actual]) = (fields.get(field_name), arg_types) else {
            return Ok(None);
        };
        if field != actual {
            let program = visitor.program();
            let message = format!(
                "field '{field_name}' of {} expects {}, not {}",
                program.type_name(receiver),
                program.type_name(*field),
                program.type_name(*actual)
            );
            return Err(visitor.error_at(call, message));
        }
        Ok(Some(self.value_node(visitor.program_mut(), *field)))
    }

    /// Typed node for `def` called on `owner` with `arg_types`
    fn instantiate(
        &self,
        visitor: &mut TypeVisitor<'_>,
        call: ExprId,
        owner: TypeId,
        def: ExprId,
        arg_types: &[TypeId],
        block: Option<ExprId>,
    ) -> Result<NodeId> {
        let key = InstanceKey {
            owner,
            def,
            args: arg_types.to_vec(),
            block,
        };
        if let Some(node) = self.instances.borrow().get(&key) {
            return Ok(*node);
        }
        let ExprKind::Def(def_expr) = visitor.program().ast.kind(def).clone() else {
            return Err(InternalError {
                message: "method table entry is not a def".to_string(),
                location: visitor.program().ast.location(def).cloned(),
            }
            .into());
        };

        let program = visitor.program_mut();
        let typed_def = program.new_var();
        self.instances.borrow_mut().insert(key, typed_def);

        let mut vars = IndexMap::new();
        vars.insert("self".to_string(), program.typed_var(owner));
        for (arg, ty) in def_expr.args.iter().zip(arg_types) {
            vars.insert(arg.clone(), program.typed_var(*ty));
        }
        let arg_names: Vec<String> = arg_types.iter().map(|ty| program.type_name(*ty)).collect();
        let label = format!(
            "instantiating '{}#{}({})'",
            program.type_name(owner),
            def_expr.name,
            arg_names.join(", ")
        );
        debug!(method = %label, "typing method instance");

        let ctx = VisitContext {
            vars,
            scope: Some(owner),
            typed_def: Some(typed_def),
            block,
            ..VisitContext::default()
        };
        let result = {
            let mut child = visitor.child(ctx);
            type_body(&mut child, &def_expr, typed_def)
        };
        result.map_err(|err| visitor.wrap_error(call, label, err))?;
        Ok(typed_def)
    }

    /// Bind `call` to `targets`, replacing the previous selection
    fn retarget(&self, program: &mut Program, call: ExprId, targets: Vec<NodeId>) -> Result<()> {
        let node = program.node_of(call);
        let previous = self.targets.borrow().get(&call).cloned();
        if previous.as_ref() == Some(&targets) {
            return Ok(());
        }
        if let Some(previous) = previous {
            trace!(call = call.0, "call targets changed");
            program.unbind(node, &previous);
        }
        self.targets.borrow_mut().insert(call, targets.clone());
        program
            .bind(node, &targets)
            .map_err(|err| InferError::from(err).with_location_fallback(program.ast.location(call)))
    }
}

fn type_body(child: &mut TypeVisitor<'_>, def: &DefExpr, typed_def: NodeId) -> Result<()> {
    if let Some(return_type) = def.return_type {
        let return_type = child.program_mut().deep_clone(return_type);
        child.visit(return_type)?;
        let program = child.program_mut();
        let Some(ty) = program.type_of(return_type) else {
            return Err(child.error_at(return_type, "return type is not a type"));
        };
        let ty = program.types.instance_type(ty);
        program.set_type(typed_def, ty)?;
        program.graph.freeze(typed_def);
    }

    if let Some(inputs) = &def.block_inputs {
        let mut yield_vars = Vec::with_capacity(inputs.len());
        for input in inputs {
            let input = child.program_mut().deep_clone(*input);
            child.visit(input)?;
            let program = child.program();
            let Some(ty) = program.type_of(input) else {
                return Err(child.error_at(input, "block input is not a type"));
            };
            yield_vars.push(program.types.instance_type(ty));
        }
        child.context_mut().yield_vars = Some(yield_vars);
    }

    let body = match def.body {
        Some(body) => {
            let body = child.program_mut().deep_clone(body);
            child.visit(body)?;
            child.program().node_of(body)
        }
        None => child.program().nil_var(),
    };
    let location = def.body.and_then(|body| child.program().ast.location(body).cloned());
    child
        .program_mut()
        .bind(typed_def, &[body])
        .map_err(|err| InferError::from(err).with_location_fallback(location.as_ref()))
}

impl CallResolver for SimpleDispatch {
    fn recalculate(&self, call: ExprId, visitor: &mut TypeVisitor<'_>) -> Result<()> {
        let program = visitor.program();
        if program.macro_expansion(call).is_some() {
            return Ok(());
        }
        let ExprKind::Call {
            obj,
            name,
            args,
            block,
        } = program.ast.kind(call).clone()
        else {
            return Ok(());
        };

        let mut arg_types = Vec::with_capacity(args.len());
        for arg in &args {
            match program.type_of(*arg) {
                Some(ty) => arg_types.push(ty),
                None => return Ok(()),
            }
        }
        let receivers = match obj {
            Some(obj) => {
                let Some(ty) = program.type_of(obj) else {
                    return Ok(());
                };
                match program.types.kind(ty) {
                    TypeKind::Union(members) => members.clone(),
                    TypeKind::NoReturn => Vec::new(),
                    _ => vec![ty],
                }
            }
            None => match program.call_sites.get(&call) {
                Some(site) => vec![site.scope],
                None => return Ok(()),
            },
        };
        if receivers.is_empty() {
            return Ok(());
        }
        debug!(call = %name, receivers = receivers.len(), "resolving call");

        let mut targets = Vec::with_capacity(receivers.len() + 1);
        for receiver in receivers {
            let target = self.dispatch_one(visitor, call, receiver, &name, &arg_types, block, obj.is_none())?;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        if let Some(block) = block {
            targets.push(visitor.program_mut().block_break(block));
        }
        self.retarget(visitor.program_mut(), call, targets)
    }
}
