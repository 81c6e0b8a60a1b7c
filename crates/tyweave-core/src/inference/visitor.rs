//! Traversal driver.
//!
//! [`TypeVisitor`] walks the arena AST once, depth first. For every
//! construct it creates or looks up the slots involved, binds the
//! expression's node into the graph and lets propagation do the rest.
//! Calls are handed to the [`CallResolver`](crate::collab::CallResolver);
//! whenever a call's inputs change type afterwards, the graph queues it and
//! the driver re-resolves it after the current expression.

use crate::ast::{DefExpr, ExprId, ExprKind, FunArg, MacroExpr};
use crate::collab::Collaborators;
use crate::config::InferOptions;
use crate::error::{InferError, InternalError, Result, TypeError};
use crate::inference::filters::{and_filters, not_nil, or_filters, FilterMap, FilterStack, TypeFilter};
use crate::inference::graph::{NodeId, Observer, TypeMapping};
use crate::inference::lattice::{
    ClassInfo, ConstId, FunSignature, Include, NamedEntry, TypeId, TypeKind, TypeVarBinding,
};
use crate::inference::program::{CallSite, Const, ConstState, Program};
use crate::syntax::{Binary, EnumConstant, NumberKind};
use indexmap::{IndexMap, IndexSet};
use std::mem;
use std::rc::Rc;
use tracing::debug;

/// State that changes at def, block and constant boundaries
#[derive(Debug, Clone, Default)]
pub struct VisitContext {
    pub vars: IndexMap<String, NodeId>,
    /// Type of `self` inside a method body
    pub scope: Option<TypeId>,
    /// Node collecting the return types of the method being typed
    pub typed_def: Option<NodeId>,
    /// Block passed to the method being typed
    pub block: Option<ExprId>,
    /// Declared block input types of the method being typed
    pub yield_vars: Option<Vec<TypeId>>,
    /// Block whose body is being visited, target of `break`
    pub block_context: Option<ExprId>,
}

pub struct TypeVisitor<'p> {
    pub(crate) program: &'p mut Program,
    pub(crate) collab: Collaborators,
    pub(crate) options: InferOptions,
    pub(crate) ctx: VisitContext,
    types: Vec<TypeId>,
    while_stack: Vec<ExprId>,
    filters: FilterStack,
}

impl<'p> TypeVisitor<'p> {
    pub fn new(program: &'p mut Program, collab: Collaborators, options: InferOptions) -> Self {
        let root = program.root();
        Self {
            program,
            collab,
            options,
            ctx: VisitContext::default(),
            types: vec![root],
            while_stack: Vec::new(),
            filters: FilterStack::new(),
        }
    }

    /// Visitor for a method body, sharing this visitor's program
    pub fn child(&mut self, ctx: VisitContext) -> TypeVisitor<'_> {
        let root = self.program.root();
        TypeVisitor {
            program: &mut *self.program,
            collab: self.collab.clone(),
            options: self.options.clone(),
            ctx,
            types: vec![root],
            while_stack: Vec::new(),
            filters: FilterStack::new(),
        }
    }

    pub fn program(&self) -> &Program {
        self.program
    }

    pub fn program_mut(&mut self) -> &mut Program {
        self.program
    }

    pub fn context(&self) -> &VisitContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut VisitContext {
        &mut self.ctx
    }

    pub fn filter_depth(&self) -> usize {
        self.filters.depth()
    }

    pub fn current_type(&self) -> TypeId {
        self.types.last().copied().unwrap_or_else(|| self.program.root())
    }

    /// Type of `self` at this point
    pub fn self_type(&mut self) -> TypeId {
        match self.ctx.scope {
            Some(scope) => scope,
            None => {
                let current = self.current_type();
                self.program.types.metaclass_of(current)
            }
        }
    }

    /// Namespace constant and type lookups start from
    pub(crate) fn lookup_scope(&self) -> TypeId {
        match self.ctx.scope {
            Some(scope) => self.program.types.instance_type(scope),
            None => self.current_type(),
        }
    }

    pub fn error_at(&self, id: ExprId, message: impl Into<String>) -> InferError {
        TypeError::new(message)
            .at(id, self.program.ast.location(id).cloned())
            .into()
    }

    /// Chain `inner` under a new message; internal errors stay unwrapped
    pub fn wrap_error(&self, id: ExprId, message: impl Into<String>, inner: InferError) -> InferError {
        if inner.is_internal() {
            return inner;
        }
        TypeError::new(message)
            .at(id, self.program.ast.location(id).cloned())
            .with_inner(inner)
            .into()
    }

    fn internal(&self, id: ExprId, message: impl Into<String>) -> InferError {
        InternalError {
            message: message.into(),
            location: self.program.ast.location(id).cloned(),
        }
        .into()
    }

    fn node(&self, id: ExprId) -> NodeId {
        self.program.node_of(id)
    }

    fn bind(&mut self, node: NodeId, deps: &[NodeId]) -> Result<()> {
        Ok(self.program.bind(node, deps)?)
    }

    fn bind_expr(&mut self, id: ExprId, deps: &[NodeId]) -> Result<()> {
        let node = self.node(id);
        self.bind(node, deps)
    }

    fn set_expr_type(&mut self, id: ExprId, ty: TypeId) -> Result<()> {
        let node = self.node(id);
        Ok(self.program.set_type(node, ty)?)
    }

    fn node_or_nil(&self, id: Option<ExprId>) -> NodeId {
        id.map(|id| self.node(id))
            .unwrap_or_else(|| self.program.nil_var())
    }

    /// Type an expression and everything below it
    pub fn visit(&mut self, id: ExprId) -> Result<()> {
        self.visit_kind(id).map_err(|err| {
            let location = self.program.ast.location(id);
            err.with_location_fallback(location)
        })?;
        self.flush_pending_calls()
    }

    fn flush_pending_calls(&mut self) -> Result<()> {
        while let Some(call) = self.program.graph.next_pending_call() {
            let resolver = Rc::clone(&self.collab.resolver);
            resolver.recalculate(call, self)?;
        }
        Ok(())
    }

    fn visit_kind(&mut self, id: ExprId) -> Result<()> {
        let b = self.program.builtins();
        let kind = self.program.ast.kind(id).clone();
        match kind {
            ExprKind::Nop | ExprKind::NilLiteral => self.set_expr_type(id, b.nil),
            ExprKind::BoolLiteral(_) => self.set_expr_type(id, b.bool),
            ExprKind::CharLiteral(_) => self.set_expr_type(id, b.char),
            ExprKind::NumberLiteral { kind, .. } => self.set_expr_type(id, self.number_type(kind)),
            ExprKind::StringLiteral(_) => self.set_expr_type(id, b.string),
            ExprKind::SymbolLiteral(value) => {
                self.program.add_symbol(&value);
                self.set_expr_type(id, b.symbol)
            }
            ExprKind::Expressions(exps) => self.visit_expressions(id, &exps),
            ExprKind::Var(name) => self.visit_var(id, &name),
            ExprKind::InstanceVar(name) => {
                let owner = self.instance_var_owner(id)?;
                let var = self.program.lookup_instance_var(owner, &name)?;
                self.bind_expr(id, &[var])
            }
            ExprKind::Global(name) => {
                let Some(var) = self.program.global_vars.get(&name).copied() else {
                    return Err(self.error_at(id, format!("uninitialized global {name}")));
                };
                self.bind_expr(id, &[var])
            }
            ExprKind::Ident { names, global } => self.visit_ident(id, &names, global),
            ExprKind::DeclareVar {
                name,
                declared_type,
            } => self.visit_declare_var(id, &name, declared_type),
            ExprKind::Assign { target, value } => self.visit_assign(id, target, value),
            ExprKind::MultiAssign { targets, values } => self.visit_multi_assign(id, &targets, &values),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
                binary,
            } => self.visit_if(id, cond, then_branch, else_branch, binary),
            ExprKind::While { cond, body } => self.visit_while(id, cond, body),
            ExprKind::Break(exps) => self.visit_break(id, &exps),
            ExprKind::Return(exps) => self.visit_return(id, &exps),
            ExprKind::Yield(exps) => self.visit_yield(id, &exps),
            ExprKind::Call {
                obj,
                name,
                args,
                block,
            } => self.visit_call(id, obj, &name, &args, block),
            ExprKind::Block { args, body } => self.visit_block(id, &args, body),
            ExprKind::Def(def) => self.visit_def(id, &def),
            ExprKind::Macro(mac) => self.visit_macro(id, &mac),
            ExprKind::ClassDef {
                name,
                superclass,
                type_vars,
                is_abstract,
                body,
            } => self.visit_class_def(id, &name, superclass, type_vars, is_abstract, body),
            ExprKind::ModuleDef {
                name,
                type_vars,
                body,
            } => self.visit_module_def(id, &name, type_vars, body),
            ExprKind::Include(name) => self.visit_include(id, name),
            ExprKind::LibDef {
                name,
                libname,
                body,
            } => self.visit_lib_def(id, &name, libname, body),
            ExprKind::FunDef(fun) => {
                let fun = *fun;
                self.visit_fun_def(id, fun.name, fun.real_name, &fun.args, fun.return_type, fun.varargs)
            }
            ExprKind::TypeDef { name, ty, ptr } => {
                let owner = self.check_undefined(id, &name)?;
                let aliased = self.lib_type(ty, ptr)?;
                self.program
                    .types
                    .add_type(owner, &name, TypeKind::Alias { aliased });
                self.set_expr_type(id, b.nil)
            }
            ExprKind::StructDef { name, fields } => {
                let owner = self.check_undefined(id, &name)?;
                let fields = self.lib_fields(&fields)?;
                self.program
                    .types
                    .add_type(owner, &name, TypeKind::CStruct { fields });
                self.set_expr_type(id, b.nil)
            }
            ExprKind::UnionDef { name, fields } => {
                let owner = self.check_undefined(id, &name)?;
                let fields = self.lib_fields(&fields)?;
                self.program
                    .types
                    .add_type(owner, &name, TypeKind::CUnion { fields });
                self.set_expr_type(id, b.nil)
            }
            ExprKind::EnumDef { name, constants } => self.visit_enum_def(id, &name, &constants),
            ExprKind::StructGet(name) | ExprKind::UnionGet(name) => {
                let field = self.field_type(id, &name)?;
                self.set_expr_type(id, field)
            }
            ExprKind::StructSet(name) | ExprKind::UnionSet(name) => {
                let field = self.field_type(id, &name)?;
                let value = self.arg_var(id, "value")?;
                if let Some(actual) = self.program.graph.type_of(value) {
                    if actual != field {
                        let message = format!(
                            "field '{name}' expects {}, not {}",
                            self.program.type_name(field),
                            self.program.type_name(actual)
                        );
                        return Err(self.error_at(id, message));
                    }
                }
                self.set_expr_type(id, field)
            }
            ExprKind::ClassMethod => {
                let scope = self.self_type();
                let metaclass = self.program.types.metaclass_of(scope);
                self.set_expr_type(id, metaclass)
            }
            ExprKind::Allocate => {
                let scope = self.self_type();
                let instance = self.program.types.instance_type(scope);
                self.check_allocatable(id, instance)?;
                self.set_expr_type(id, instance)
            }
            ExprKind::SimpleOr { left, right } => {
                self.visit(left)?;
                self.visit(right)?;
                let deps = [self.node(left), self.node(right)];
                self.bind_expr(id, &deps)
            }
            ExprKind::IdentUnion(idents) => {
                let mut members = Vec::with_capacity(idents.len());
                for ident in idents {
                    members.push(self.type_expr(ident)?);
                }
                let Some(union) = self.program.types.merge(&members) else {
                    return Err(self.internal(id, "empty type union"));
                };
                let metaclass = self.program.types.metaclass_of(union);
                self.set_expr_type(id, metaclass)
            }
            ExprKind::NewGenericClass { name, type_vars } => {
                let generic = self.type_expr(name)?;
                let mut args = Vec::with_capacity(type_vars.len());
                for var in type_vars {
                    args.push(self.type_expr(var)?);
                }
                let instance = self
                    .program
                    .types
                    .instantiate(generic, &args)
                    .map_err(|err| self.error_at(id, err.to_string()))?;
                let metaclass = self.program.types.metaclass_of(instance);
                self.set_expr_type(id, metaclass)
            }
            ExprKind::IsA { obj, const_ty } => {
                self.visit(obj)?;
                let target = self.type_expr(const_ty)?;
                self.set_expr_type(id, b.bool)?;
                if let ExprKind::Var(name) = self.program.ast.kind(obj) {
                    let mut filters = FilterMap::new();
                    filters.insert(name.clone(), TypeFilter::Simple(target));
                    let node = self.node(id);
                    self.program.graph.set_type_filters(node, Some(filters));
                }
                Ok(())
            }
            ExprKind::TypeMerge(exps) => {
                let mut deps = Vec::with_capacity(exps.len());
                for exp in exps {
                    self.visit(exp)?;
                    deps.push(self.node(exp));
                }
                self.bind_expr(id, &deps)
            }
            ExprKind::PointerOf(var) => self.visit_pointer_of(id, var),
            ExprKind::PointerMalloc | ExprKind::PointerRealloc | ExprKind::PointerAdd => {
                let (pointer, _) = self.pointer_scope(id)?;
                self.set_expr_type(id, pointer)
            }
            ExprKind::PointerGetValue => {
                let (_, element) = self.pointer_scope(id)?;
                self.set_expr_type(id, element)
            }
            ExprKind::PointerSetValue => {
                self.pointer_scope(id)?;
                let value = self.arg_var(id, "value")?;
                self.bind_expr(id, &[value])
            }
            ExprKind::PointerCast => {
                let target = self.arg_var(id, "type")?;
                let Some(target) = self.program.graph.type_of(target) else {
                    return Ok(());
                };
                let element = self.program.types.instance_type(target);
                let pointer = self.program.types.pointer_of(element);
                self.set_expr_type(id, pointer)
            }
        }
    }

    fn number_type(&self, kind: NumberKind) -> TypeId {
        let b = self.program.builtins();
        match kind {
            NumberKind::I8 => b.int8,
            NumberKind::I16 => b.int16,
            NumberKind::I32 => b.int32,
            NumberKind::I64 => b.int64,
            NumberKind::U8 => b.uint8,
            NumberKind::U16 => b.uint16,
            NumberKind::U32 => b.uint32,
            NumberKind::U64 => b.uint64,
            NumberKind::F32 => b.float32,
            NumberKind::F64 => b.float64,
        }
    }

    /// Visit a type expression and return the type it denotes
    fn type_expr(&mut self, id: ExprId) -> Result<TypeId> {
        self.visit(id)?;
        match self.program.type_of(id) {
            Some(ty) if matches!(self.program.types.kind(ty), TypeKind::Metaclass { .. }) => {
                Ok(self.program.types.instance_type(ty))
            }
            _ => Err(self.error_at(id, format!("{} is not a type", self.program.ast.path(id)))),
        }
    }

    /// Run `f` with `filters` pushed; the frame is popped on every path out
    pub fn with_type_filters<T>(
        &mut self,
        filters: Option<FilterMap>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let Some(filters) = filters else {
            return f(self);
        };
        self.filters.push(filters);
        let result = f(self);
        self.filters.pop();
        result
    }

    /// Run `f` with `ty` as the enclosing type
    pub fn with_type_scope<T>(&mut self, ty: TypeId, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.types.push(ty);
        let result = f(self);
        self.types.pop();
        result
    }

    fn visit_expressions(&mut self, id: ExprId, exps: &[ExprId]) -> Result<()> {
        let no_return = self.program.builtins().no_return;
        let mut last = None;
        for (index, exp) in exps.iter().enumerate() {
            self.visit(*exp)?;
            last = Some(*exp);
            if self.program.type_of(*exp) == Some(no_return) && index + 1 < exps.len() {
                if let ExprKind::Expressions(list) = self.program.ast.kind_mut(id) {
                    list.truncate(index + 1);
                }
                break;
            }
        }
        let last = self.node_or_nil(last);
        self.bind_expr(id, &[last])
    }

    fn lookup_var(&mut self, name: &str) -> NodeId {
        if let Some(var) = self.ctx.vars.get(name) {
            return *var;
        }
        let var = self.program.new_var();
        self.ctx.vars.insert(name.to_string(), var);
        var
    }

    fn visit_var(&mut self, id: ExprId, name: &str) -> Result<()> {
        let var = self.lookup_var(name);
        match self.filters.build_filter(name) {
            Some(filter) => {
                let filtered = self.program.graph.add_node(TypeMapping::Filter(filter));
                self.bind(filtered, &[var])?;
                self.bind_expr(id, &[filtered])?;
            }
            None => self.bind_expr(id, &[var])?,
        }
        let filters = and_filters(Some(&not_nil(name)), self.program.graph.type_filters(var));
        let node = self.node(id);
        self.program.graph.set_type_filters(node, filters);
        Ok(())
    }

    fn instance_var_owner(&mut self, id: ExprId) -> Result<TypeId> {
        let owner = self.self_type();
        if owner == self.program.root() {
            return Err(self.error_at(id, "can't use instance variables at the top level"));
        }
        if self.program.types.is_primitive_like(owner) {
            let message = format!(
                "can't use instance variables inside {}",
                self.program.type_name(owner)
            );
            return Err(self.error_at(id, message));
        }
        Ok(owner)
    }

    fn visit_ident(&mut self, id: ExprId, names: &[String], global: bool) -> Result<()> {
        let entry = if global {
            self.program.types.lookup_global(names)
        } else {
            let scope = self.lookup_scope();
            self.program.types.lookup_type(scope, names)
        };
        match entry {
            Some(NamedEntry::Type(ty)) => {
                let metaclass = self.program.types.metaclass_of(ty);
                self.set_expr_type(id, metaclass)
            }
            Some(NamedEntry::Const(konst)) => {
                self.evaluate_const(id, konst)?;
                let value = self.node(self.program.const_(konst).value);
                self.bind_expr(id, &[value])
            }
            None => Err(self.error_at(id, format!("uninitialized constant {}", names.join("::")))),
        }
    }

    /// Infer a constant's value in the context it was declared in
    fn evaluate_const(&mut self, reference: ExprId, konst: ConstId) -> Result<()> {
        match self.program.const_(konst).state {
            ConstState::Done => return Ok(()),
            ConstState::Evaluating => {
                let start = self
                    .program
                    .const_stack
                    .iter()
                    .position(|c| *c == konst)
                    .unwrap_or(0);
                let mut chain: Vec<String> = self.program.const_stack[start..]
                    .iter()
                    .map(|c| self.program.const_name(*c))
                    .collect();
                chain.push(self.program.const_name(konst));
                let message = format!(
                    "recursive dependency of constant {}: {}",
                    self.program.const_name(konst),
                    chain.join(" -> ")
                );
                return Err(self.error_at(reference, message));
            }
            ConstState::Pending => {}
        }

        let Const {
            value,
            types,
            scope,
            ..
        } = self.program.const_(konst).clone();
        let name = self.program.const_name(konst);
        debug!(constant = %name, "evaluating constant");
        self.program.const_mut(konst).state = ConstState::Evaluating;
        self.program.const_stack.push(konst);

        let saved_ctx = mem::replace(
            &mut self.ctx,
            VisitContext {
                scope,
                ..VisitContext::default()
            },
        );
        let saved_types = mem::replace(&mut self.types, types);
        let saved_while = mem::take(&mut self.while_stack);
        let saved_filters = mem::take(&mut self.filters);
        let result = self.visit(value);
        self.ctx = saved_ctx;
        self.types = saved_types;
        self.while_stack = saved_while;
        self.filters = saved_filters;

        self.program.const_stack.pop();
        self.program.const_mut(konst).state = ConstState::Done;
        result.map_err(|err| self.wrap_error(value, format!("evaluating constant {name}"), err))
    }

    /// Type every constant nothing has read yet
    pub fn infer_unread_constants(&mut self) -> Result<()> {
        for konst in self.program.pending_consts() {
            if self.program.const_(konst).state == ConstState::Pending {
                let value = self.program.const_(konst).value;
                self.evaluate_const(value, konst)?;
            }
        }
        Ok(())
    }

    fn visit_declare_var(&mut self, id: ExprId, name: &str, declared_type: ExprId) -> Result<()> {
        let ty = self.type_expr(declared_type)?;
        let declared = self.program.typed_var(ty);
        let var = self.lookup_var(name);
        self.bind(var, &[declared])?;
        self.program.graph.freeze(var);
        self.bind_expr(id, &[var])
    }

    fn visit_assign(&mut self, id: ExprId, target: ExprId, value: ExprId) -> Result<()> {
        if let ExprKind::Ident { names, .. } = self.program.ast.kind(target).clone() {
            return self.declare_const(id, target, &names, value);
        }
        self.visit(value)?;
        let value_node = self.node(value);
        let value_filters = self.program.graph.type_filters(value_node).cloned();
        let result = self.bind_expr(id, &[value_node]).and_then(|()| {
            let node = self.node(id);
            self.assign_target(target, node, value_filters.as_ref())
        });
        match result {
            Ok(filters) => {
                if filters.is_some() {
                    let node = self.node(id);
                    self.program.graph.set_type_filters(node, filters);
                }
                Ok(())
            }
            Err(err @ InferError::FrozenType(_)) => {
                let message = format!("assigning to {}", self.program.ast.path(target));
                Err(self.wrap_error(id, message, err))
            }
            Err(other) => Err(other),
        }
    }

    /// Bind a variable-like target to `source`. A local variable also takes
    /// `source_filters` joined with its own not-nil filter, which are
    /// returned for the assignment expression.
    fn assign_target(
        &mut self,
        target: ExprId,
        source: NodeId,
        source_filters: Option<&FilterMap>,
    ) -> Result<Option<FilterMap>> {
        let mut filters = None;
        let var = match self.program.ast.kind(target).clone() {
            ExprKind::Var(name) => {
                let var = self.lookup_var(&name);
                filters = and_filters(Some(&not_nil(&name)), source_filters);
                self.program.graph.set_type_filters(var, filters.clone());
                var
            }
            ExprKind::InstanceVar(name) => {
                let owner = self.instance_var_owner(target)?;
                self.program.lookup_instance_var(owner, &name)?
            }
            ExprKind::Global(name) => match self.program.global_vars.get(&name) {
                Some(var) => *var,
                None => {
                    let var = self.program.new_var();
                    self.program.global_vars.insert(name, var);
                    var
                }
            },
            other => {
                return Err(self.error_at(target, format!("can't assign to {}", other.shape())));
            }
        };
        self.bind_expr(target, &[var])?;
        self.bind(var, &[source])?;
        Ok(filters)
    }

    fn declare_const(&mut self, id: ExprId, target: ExprId, names: &[String], value: ExprId) -> Result<()> {
        let Some((name, path)) = names.split_last() else {
            return Err(self.internal(target, "empty constant path"));
        };
        let owner = if path.is_empty() {
            self.current_type()
        } else {
            let scope = self.lookup_scope();
            match self.program.types.lookup_type(scope, path) {
                Some(NamedEntry::Type(owner)) => owner,
                _ => {
                    return Err(self.error_at(target, format!("uninitialized constant {}", path.join("::"))));
                }
            }
        };
        if self.program.types.get(owner).types.contains_key(name) {
            return Err(self.error_at(id, format!("already initialized constant {}", names.join("::"))));
        }
        debug!(constant = %names.join("::"), "declared constant");
        self.program.add_const(Const {
            owner,
            name: name.clone(),
            value,
            types: self.types.clone(),
            scope: self.ctx.scope,
            state: ConstState::Pending,
        });
        let value_node = self.node(value);
        self.bind_expr(target, &[value_node])?;
        self.bind_expr(id, &[value_node])
    }

    fn visit_multi_assign(&mut self, id: ExprId, targets: &[ExprId], values: &[ExprId]) -> Result<()> {
        if targets.len() != values.len() {
            let message = format!(
                "multiple assignment count mismatch ({} targets for {} values)",
                targets.len(),
                values.len()
            );
            return Err(self.error_at(id, message));
        }
        for (target, value) in targets.iter().zip(values) {
            if !matches!(self.program.ast.kind(*target), ExprKind::Ident { .. }) {
                self.visit(*value)?;
            }
        }
        for (target, value) in targets.iter().zip(values) {
            match self.program.ast.kind(*target).clone() {
                ExprKind::Ident { names, .. } => self.declare_const(id, *target, &names, *value)?,
                _ => {
                    let source = self.node(*value);
                    let source_filters = self.program.graph.type_filters(source).cloned();
                    self.assign_target(*target, source, source_filters.as_ref())?;
                }
            }
        }
        let nil = self.program.builtins().nil;
        self.set_expr_type(id, nil)
    }

    fn visit_if(
        &mut self,
        id: ExprId,
        cond: ExprId,
        then_branch: Option<ExprId>,
        else_branch: Option<ExprId>,
        binary: Option<Binary>,
    ) -> Result<()> {
        self.visit(cond)?;
        let cond_filters = self.program.graph.type_filters(self.node(cond)).cloned();
        let before: IndexSet<String> = self.ctx.vars.keys().cloned().collect();

        if let Some(then_branch) = then_branch {
            self.with_type_filters(cond_filters.clone(), |v| v.visit(then_branch))?;
        }
        if let Some(else_branch) = else_branch {
            self.visit(else_branch)?;
        }

        let deps = [self.node_or_nil(then_branch), self.node_or_nil(else_branch)];
        self.bind_expr(id, &deps)?;

        // `a && b` arrives as `if a then b else a`
        let branch_filters = |v: &Self, branch: Option<ExprId>| {
            branch.and_then(|branch| v.program.graph.type_filters(v.node(branch)).cloned())
        };
        let then_filters = branch_filters(self, then_branch);
        let else_filters = branch_filters(self, else_branch);
        let combined = match binary {
            Some(Binary::And) => and_filters(then_filters.as_ref(), else_filters.as_ref()),
            Some(Binary::Or) => or_filters(then_filters.as_ref(), else_filters.as_ref()),
            None => None,
        };
        if combined.is_some() {
            let node = self.node(id);
            self.program.graph.set_type_filters(node, combined);
        }

        let no_return = self.program.builtins().no_return;
        if let (Some(_), Some(else_branch), Some(filters)) = (then_branch, else_branch, &cond_filters) {
            if self.program.type_of(else_branch) == Some(no_return) {
                self.filters.reassert(filters);
            }
        }

        self.merge_branch_vars(&before, &[then_branch, else_branch])
    }

    /// Locals first created inside one of `branches` are nil-merged for
    /// the code after the construct unless every completing path assigns
    /// them. `None` stands for a path that runs nothing.
    fn merge_branch_vars(&mut self, before: &IndexSet<String>, branches: &[Option<ExprId>]) -> Result<()> {
        let created: Vec<String> = self
            .ctx
            .vars
            .keys()
            .filter(|name| !before.contains(*name))
            .cloned()
            .collect();
        if created.is_empty() {
            return Ok(());
        }
        let no_return = self.program.builtins().no_return;
        let assigned: Vec<Option<IndexSet<String>>> = branches
            .iter()
            .map(|branch| match branch {
                None => Some(IndexSet::new()),
                Some(branch) if self.program.type_of(*branch) == Some(no_return) => None,
                Some(branch) => Some(self.program.ast.assigned_locals(*branch)),
            })
            .collect();
        let nil = self.program.nil_var();
        for name in created {
            let everywhere = assigned
                .iter()
                .all(|names| names.as_ref().is_none_or(|names| names.contains(&name)));
            if everywhere {
                continue;
            }
            let Some(old) = self.ctx.vars.get(&name).copied() else {
                continue;
            };
            let merged = self.program.new_var();
            self.bind(merged, &[old, nil])?;
            self.ctx.vars.insert(name, merged);
        }
        Ok(())
    }

    fn visit_while(&mut self, id: ExprId, cond: ExprId, body: Option<ExprId>) -> Result<()> {
        self.visit(cond)?;
        let cond_filters = self.program.graph.type_filters(self.node(cond)).cloned();
        let before: IndexSet<String> = self.ctx.vars.keys().cloned().collect();

        self.while_stack.push(id);
        let result = self.with_type_filters(cond_filters, |v| match body {
            Some(body) => v.visit(body),
            None => Ok(()),
        });
        self.while_stack.pop();
        result?;

        self.merge_branch_vars(&before, &[body, None])?;
        let b = self.program.builtins();
        let endless = matches!(self.program.ast.kind(cond), ExprKind::BoolLiteral(true))
            && !self.program.while_breaks.contains(&id);
        self.set_expr_type(id, if endless { b.no_return } else { b.nil })
    }

    fn visit_break(&mut self, id: ExprId, exps: &[ExprId]) -> Result<()> {
        for exp in exps {
            self.visit(*exp)?;
        }
        if let Some(container) = self.while_stack.last() {
            self.program.while_breaks.insert(*container);
        } else if let Some(block) = self.ctx.block_context {
            let target = self.program.block_break(block);
            let deps = self.value_nodes(exps);
            self.bind(target, &deps)?;
        } else {
            return Err(self.error_at(id, "Invalid break"));
        }
        let no_return = self.program.builtins().no_return;
        self.set_expr_type(id, no_return)
    }

    fn value_nodes(&self, exps: &[ExprId]) -> Vec<NodeId> {
        if exps.is_empty() {
            vec![self.program.nil_var()]
        } else {
            exps.iter().map(|exp| self.node(*exp)).collect()
        }
    }

    fn visit_return(&mut self, id: ExprId, exps: &[ExprId]) -> Result<()> {
        let Some(typed_def) = self.ctx.typed_def else {
            return Err(self.error_at(id, "can't return from top level"));
        };
        for exp in exps {
            self.visit(*exp)?;
        }
        let deps = self.value_nodes(exps);
        self.bind(typed_def, &deps)?;
        let no_return = self.program.builtins().no_return;
        self.set_expr_type(id, no_return)
    }

    fn visit_yield(&mut self, id: ExprId, exps: &[ExprId]) -> Result<()> {
        let Some(block) = self.ctx.block else {
            return Err(self.error_at(id, "no block given"));
        };
        for exp in exps {
            self.visit(*exp)?;
        }
        let ExprKind::Block { args, body } = self.program.ast.kind(block).clone() else {
            return Err(self.internal(id, "call block is not a block"));
        };

        if let Some(yield_vars) = self.ctx.yield_vars.clone() {
            for (index, expected) in yield_vars.iter().enumerate() {
                let Some(exp) = exps.get(index) else {
                    if *expected == self.program.builtins().nil {
                        continue;
                    }
                    let message = format!(
                        "missing argument #{} of yield with type {}",
                        index + 1,
                        self.program.type_name(*expected)
                    );
                    return Err(self.error_at(id, message));
                };
                match self.program.type_of(*exp) {
                    Some(actual) if actual != *expected => {
                        let message = format!(
                            "argument #{} of yield expected to be {}, not {}",
                            index + 1,
                            self.program.type_name(*expected),
                            self.program.type_name(actual)
                        );
                        return Err(self.error_at(*exp, message));
                    }
                    Some(_) => {
                        let node = self.node(*exp);
                        self.program.graph.freeze(node);
                    }
                    None => {}
                }
            }
        }

        for (index, arg) in args.iter().enumerate() {
            let source = self.node_or_nil(exps.get(index).copied());
            self.bind_expr(*arg, &[source])?;
        }
        let body = self.node_or_nil(body);
        self.bind_expr(id, &[body])
    }

    fn visit_call(
        &mut self,
        id: ExprId,
        obj: Option<ExprId>,
        name: &str,
        args: &[ExprId],
        block: Option<ExprId>,
    ) -> Result<()> {
        let scope = self.self_type();
        self.program.call_sites.insert(id, CallSite { scope });
        if self.expand_macro(id)? {
            return Ok(());
        }

        for input in obj.iter().chain(args) {
            let node = self.node(*input);
            self.program.graph.add_observer(node, Observer::Call(id));
        }
        let resolver = Rc::clone(&self.collab.resolver);
        resolver.recalculate(id, self)?;

        if let Some(obj) = obj {
            self.visit(obj)?;
        }
        for arg in args {
            self.visit(*arg)?;
        }
        if let Some(block) = block {
            self.visit(block)
                .map_err(|err| self.wrap_error(id, format!("instantiating '{name}'"), err))?;
        }
        Ok(())
    }

    fn visit_block(&mut self, id: ExprId, args: &[ExprId], body: Option<ExprId>) -> Result<()> {
        let mut vars = self.ctx.vars.clone();
        for arg in args {
            if let ExprKind::Var(name) = self.program.ast.kind(*arg) {
                vars.insert(name.clone(), self.node(*arg));
            }
        }
        let saved_vars = mem::replace(&mut self.ctx.vars, vars);
        let saved_block = self.ctx.block_context.replace(id);
        let saved_while = mem::take(&mut self.while_stack);
        let result = match body {
            Some(body) => self.visit(body),
            None => Ok(()),
        };
        self.ctx.vars = saved_vars;
        self.ctx.block_context = saved_block;
        self.while_stack = saved_while;
        result?;
        let body = self.node_or_nil(body);
        self.bind_expr(id, &[body])
    }

    /// Owner of a def or macro: the enclosing type, or the metaclass named
    /// by its receiver
    fn definition_owner(&mut self, receiver: Option<ExprId>) -> Result<TypeId> {
        let Some(receiver) = receiver else {
            return Ok(self.current_type());
        };
        if matches!(self.program.ast.kind(receiver), ExprKind::Var(name) if name == "self") {
            let current = self.current_type();
            return Ok(self.program.types.metaclass_of(current));
        }
        let ty = self.type_expr(receiver)?;
        Ok(self.program.types.metaclass_of(ty))
    }

    fn visit_def(&mut self, id: ExprId, def: &DefExpr) -> Result<()> {
        let owner = self.definition_owner(def.receiver)?;
        debug!(def = %def.name, owner = %self.program.type_name(owner), "declared def");
        self.program.add_def(owner, &def.name, def.args.len(), id);
        let nil = self.program.builtins().nil;
        self.set_expr_type(id, nil)
    }

    fn visit_macro(&mut self, id: ExprId, mac: &MacroExpr) -> Result<()> {
        let owner = self.definition_owner(mac.receiver)?;
        debug!(name = %mac.name, owner = %self.program.type_name(owner), "declared macro");
        self.program
            .types
            .add_macro(owner, &mac.name, mac.args.len(), id);
        let nil = self.program.builtins().nil;
        self.set_expr_type(id, nil)
    }

    fn visit_body_in(&mut self, ty: TypeId, body: Option<ExprId>) -> Result<()> {
        self.with_type_scope(ty, |v| match body {
            Some(body) => v.visit(body),
            None => Ok(()),
        })
    }

    fn visit_class_def(
        &mut self,
        id: ExprId,
        name: &str,
        superclass: Option<ExprId>,
        type_vars: Option<Vec<String>>,
        is_abstract: bool,
        body: Option<ExprId>,
    ) -> Result<()> {
        let current = self.current_type();
        let parent = match superclass {
            Some(superclass) => {
                let parent = self.type_expr(superclass)?;
                if !matches!(
                    self.program.types.kind(parent),
                    TypeKind::Class(_) | TypeKind::Instance { .. }
                ) {
                    let message = format!("{} is not a class", self.program.type_name(parent));
                    return Err(self.error_at(superclass, message));
                }
                Some(parent)
            }
            None => None,
        };

        let existing = self.program.types.get(current).types.get(name).copied();
        let class = match existing {
            Some(NamedEntry::Type(class)) => {
                if !matches!(self.program.types.kind(class), TypeKind::Class(_)) {
                    return Err(self.error_at(id, format!("{name} is not a class")));
                }
                let previous = self.program.types.superclass(class);
                if let Some(parent) = parent {
                    if previous != Some(parent) {
                        let previous = previous
                            .map(|ty| self.program.type_name(ty))
                            .unwrap_or_else(|| "nothing".to_string());
                        let message = format!(
                            "superclass mismatch for class {name} ({} for {previous})",
                            self.program.type_name(parent)
                        );
                        return Err(self.error_at(id, message));
                    }
                }
                class
            }
            Some(NamedEntry::Const(_)) => return Err(self.error_at(id, format!("{name} is not a class"))),
            None => {
                let reference = self.program.builtins().reference;
                let class = self.program.types.add_type(
                    current,
                    name,
                    TypeKind::Class(ClassInfo {
                        superclass: Some(parent.unwrap_or(reference)),
                        is_abstract,
                        type_vars,
                        primitive: false,
                    }),
                );
                debug!(class = %self.program.type_name(class), "declared class");
                class
            }
        };

        self.visit_body_in(class, body)?;
        let nil = self.program.builtins().nil;
        self.set_expr_type(id, nil)
    }

    fn visit_module_def(
        &mut self,
        id: ExprId,
        name: &str,
        type_vars: Option<Vec<String>>,
        body: Option<ExprId>,
    ) -> Result<()> {
        let current = self.current_type();
        let existing = self.program.types.get(current).types.get(name).copied();
        let module = match existing {
            Some(NamedEntry::Type(module)) if matches!(self.program.types.kind(module), TypeKind::Module { .. }) => {
                module
            }
            Some(_) => return Err(self.error_at(id, format!("{name} is not a module"))),
            None => {
                let module = self
                    .program
                    .types
                    .add_type(current, name, TypeKind::Module { type_vars });
                debug!(module = %self.program.type_name(module), "declared module");
                module
            }
        };
        self.visit_body_in(module, body)?;
        let nil = self.program.builtins().nil;
        self.set_expr_type(id, nil)
    }

    fn resolve_module(&mut self, id: ExprId) -> Result<TypeId> {
        let module = self.type_expr(id)?;
        if !matches!(self.program.types.kind(module), TypeKind::Module { .. }) {
            let message = format!("{} is not a module", self.program.type_name(module));
            return Err(self.error_at(id, message));
        }
        Ok(module)
    }

    fn visit_include(&mut self, id: ExprId, name: ExprId) -> Result<()> {
        let current = self.current_type();
        let include = match self.program.ast.kind(name).clone() {
            ExprKind::NewGenericClass {
                name: module_name,
                type_vars,
            } => {
                let module = self.resolve_module(module_name)?;
                let module_label = self.program.type_name(module);
                let Some(params) = self.program.types.type_vars(module).map(<[String]>::to_vec) else {
                    return Err(self.error_at(name, format!("{module_label} is not a generic module")));
                };
                if params.len() != type_vars.len() {
                    let message = format!(
                        "wrong number of type vars for {module_label} ({} for {})",
                        type_vars.len(),
                        params.len()
                    );
                    return Err(self.error_at(name, message));
                }
                let own_params: Vec<String> = self
                    .program
                    .types
                    .type_vars(current)
                    .map(<[String]>::to_vec)
                    .unwrap_or_default();
                let mut mapping = IndexMap::new();
                for (param, arg) in params.into_iter().zip(type_vars) {
                    let binding = match self.program.ast.kind(arg).clone() {
                        ExprKind::Ident { names, global: false }
                            if names.len() == 1 && own_params.contains(&names[0]) =>
                        {
                            TypeVarBinding::Param(names[0].clone())
                        }
                        _ => TypeVarBinding::Type(self.type_expr(arg)?),
                    };
                    mapping.insert(param, binding);
                }
                Include::Generic { module, mapping }
            }
            _ => {
                let module = self.resolve_module(name)?;
                if self.program.types.is_generic(module) {
                    let message = format!("{} is a generic module", self.program.type_name(module));
                    return Err(self.error_at(name, message));
                }
                Include::Module(module)
            }
        };
        self.program.types.include(current, include);
        let nil = self.program.builtins().nil;
        self.set_expr_type(id, nil)
    }

    fn visit_lib_def(&mut self, id: ExprId, name: &str, libname: Option<String>, body: Option<ExprId>) -> Result<()> {
        let current = self.current_type();
        let existing = self.program.types.get(current).types.get(name).copied();
        let lib = match existing {
            Some(NamedEntry::Type(lib)) if matches!(self.program.types.kind(lib), TypeKind::Lib { .. }) => lib,
            Some(_) => return Err(self.error_at(id, format!("{name} is not a lib"))),
            None => self
                .program
                .types
                .add_type(current, name, TypeKind::Lib { libname }),
        };
        self.visit_body_in(lib, body)?;
        let nil = self.program.builtins().nil;
        self.set_expr_type(id, nil)
    }

    /// Type usable in a lib declaration, wrapped in `ptr` pointers
    fn lib_type(&mut self, id: ExprId, ptr: u32) -> Result<TypeId> {
        let mut ty = self.type_expr(id)?;
        if !self.program.types.is_primitive_like(ty) {
            let b = self.program.builtins();
            let hint = if ty == b.int {
                " (did you mean Int32?)"
            } else if ty == b.float {
                " (did you mean Float64?)"
            } else {
                ""
            };
            return Err(self.error_at(
                id,
                format!("only primitive types and structs are allowed in lib declarations{hint}"),
            ));
        }
        for _ in 0..ptr {
            ty = self.program.types.pointer_of(ty);
        }
        Ok(ty)
    }

    fn lib_fields(&mut self, fields: &[FunArg]) -> Result<IndexMap<String, TypeId>> {
        let mut types = IndexMap::new();
        for field in fields {
            let ty = self.lib_type(field.ty, field.ptr)?;
            types.insert(field.name.clone(), ty);
        }
        Ok(types)
    }

    /// Enclosing type, failing when `name` is already taken there
    fn check_undefined(&self, id: ExprId, name: &str) -> Result<TypeId> {
        let current = self.current_type();
        if self.program.types.get(current).types.contains_key(name) {
            return Err(self.error_at(id, format!("{name} is already defined")));
        }
        Ok(current)
    }

    fn visit_fun_def(
        &mut self,
        id: ExprId,
        name: String,
        real_name: String,
        args: &[FunArg],
        return_type: Option<ExprId>,
        varargs: bool,
    ) -> Result<()> {
        let owner = self.current_type();
        let mut arg_types = Vec::with_capacity(args.len());
        for arg in args {
            arg_types.push(self.lib_type(arg.ty, arg.ptr)?);
        }
        let b = self.program.builtins();
        let return_type = match return_type {
            Some(return_type) => self.lib_type(return_type, 0)?,
            None => b.nil,
        };
        let signature = FunSignature {
            real_name,
            args: arg_types,
            return_type,
            varargs,
        };
        if let Some(previous) = self.program.types.get(owner).funs.get(&name) {
            if *previous != signature {
                let message = format!(
                    "fun redefinition with different signature (was {})",
                    self.describe_fun(&name, previous)
                );
                return Err(self.error_at(id, message));
            }
        }
        self.program.types.get_mut(owner).funs.insert(name, signature);
        self.set_expr_type(id, b.nil)
    }

    fn describe_fun(&self, name: &str, signature: &FunSignature) -> String {
        let mut args: Vec<String> = signature
            .args
            .iter()
            .map(|arg| self.program.type_name(*arg))
            .collect();
        if signature.varargs {
            args.push("...".to_string());
        }
        format!(
            "fun {name}({}) : {}",
            args.join(", "),
            self.program.type_name(signature.return_type)
        )
    }

    fn visit_enum_def(&mut self, id: ExprId, name: &str, constants: &[EnumConstant]) -> Result<()> {
        let owner = self.check_undefined(id, name)?;
        let mut values = IndexMap::new();
        let mut next = 0;
        for constant in constants {
            let value = constant.value.unwrap_or(next);
            values.insert(constant.name.clone(), value);
            next = value + 1;
        }
        self.program
            .types
            .add_type(owner, name, TypeKind::CEnum { constants: values });
        let nil = self.program.builtins().nil;
        self.set_expr_type(id, nil)
    }

    fn field_type(&mut self, id: ExprId, name: &str) -> Result<TypeId> {
        let scope = self.self_type();
        let field = match self.program.types.kind(scope) {
            TypeKind::CStruct { fields } | TypeKind::CUnion { fields } => fields.get(name).copied(),
            _ => None,
        };
        field.ok_or_else(|| {
            let message = format!("{name} is not a field of {}", self.program.type_name(scope));
            self.error_at(id, message)
        })
    }

    /// Argument slot a primitive body reads its operand from
    fn arg_var(&self, id: ExprId, name: &str) -> Result<NodeId> {
        self.ctx
            .vars
            .get(name)
            .copied()
            .ok_or_else(|| self.internal(id, format!("primitive without '{name}' argument")))
    }

    /// The `Pointer(T)` instance a pointer primitive runs in, and its `T`
    fn pointer_scope(&mut self, id: ExprId) -> Result<(TypeId, TypeId)> {
        let scope = self.self_type();
        let instance = self.program.types.instance_type(scope);
        let pointer = self.program.builtins().pointer;
        match self.program.types.kind(instance) {
            TypeKind::Instance { generic, args } if *generic == pointer => match args.first() {
                Some(element) => Ok((instance, *element)),
                None => Err(self.internal(id, "pointer instance without element type")),
            },
            _ => {
                let message = format!(
                    "{} can only be used inside Pointer(T), not {}",
                    self.program.ast.kind(id).shape(),
                    self.program.type_name(instance)
                );
                Err(self.error_at(id, message))
            }
        }
    }

    fn visit_pointer_of(&mut self, id: ExprId, var: ExprId) -> Result<()> {
        let slot = match self.program.ast.kind(var).clone() {
            ExprKind::Var(name) => self.lookup_var(&name),
            ExprKind::InstanceVar(name) => {
                let owner = self.instance_var_owner(var)?;
                self.program.lookup_instance_var(owner, &name)?
            }
            _ => {
                self.visit(var)?;
                self.node(var)
            }
        };
        self.bind_expr(var, &[slot])?;
        self.bind_expr(id, &[slot])
    }

    /// Fail for types that cannot be allocated as they are
    pub fn check_allocatable(&self, id: ExprId, ty: TypeId) -> Result<()> {
        if let TypeKind::Class(info) = self.program.types.kind(ty) {
            let name = self.program.type_name(ty);
            if info.type_vars.is_some() {
                return Err(self.error_at(
                    id,
                    format!("can't create instance of generic class {name} without specifying its type vars"),
                ));
            }
            if info.is_abstract {
                return Err(self.error_at(id, format!("can't instantiate abstract class {name}")));
            }
        }
        Ok(())
    }
}
