//! Arena AST the inference driver works on.
//!
//! Expressions are addressed by [`ExprId`] and own exactly one typed node in
//! the [`TypeGraph`](crate::inference::graph::TypeGraph). Only constructs that
//! are legal after normalization exist here: the sugar family of the syntax
//! tree is rejected while lowering, so every `match` over [`ExprKind`] is
//! exhaustive over real inputs.

use crate::error::InternalError;
use crate::inference::graph::NodeId;
use crate::inference::program::Program;
use crate::syntax::{self, Binary, EnumConstant, Location, Node, NodeKind, NumberKind};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefExpr {
    pub receiver: Option<ExprId>,
    pub name: String,
    pub args: Vec<String>,
    pub body: Option<ExprId>,
    pub return_type: Option<ExprId>,
    /// Declared block input types, used as yield types
    pub block_inputs: Option<Vec<ExprId>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroExpr {
    pub receiver: Option<ExprId>,
    pub name: String,
    pub args: Vec<String>,
    pub body: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunArg {
    pub name: String,
    pub ty: ExprId,
    pub ptr: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunExpr {
    pub name: String,
    pub real_name: String,
    pub args: Vec<FunArg>,
    pub return_type: Option<ExprId>,
    pub ptr: u32,
    pub varargs: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Nop,
    NilLiteral,
    BoolLiteral(bool),
    CharLiteral(char),
    NumberLiteral { value: String, kind: NumberKind },
    StringLiteral(String),
    SymbolLiteral(String),
    Expressions(Vec<ExprId>),
    Var(String),
    InstanceVar(String),
    Global(String),
    Ident { names: Vec<String>, global: bool },
    DeclareVar { name: String, declared_type: ExprId },
    Assign { target: ExprId, value: ExprId },
    MultiAssign { targets: Vec<ExprId>, values: Vec<ExprId> },
    If {
        cond: ExprId,
        then_branch: Option<ExprId>,
        else_branch: Option<ExprId>,
        binary: Option<Binary>,
    },
    While { cond: ExprId, body: Option<ExprId> },
    Break(Vec<ExprId>),
    Return(Vec<ExprId>),
    Yield(Vec<ExprId>),
    Call {
        obj: Option<ExprId>,
        name: String,
        args: Vec<ExprId>,
        block: Option<ExprId>,
    },
    Block { args: Vec<ExprId>, body: Option<ExprId> },
    Def(Box<DefExpr>),
    Macro(Box<MacroExpr>),
    ClassDef {
        name: String,
        superclass: Option<ExprId>,
        type_vars: Option<Vec<String>>,
        is_abstract: bool,
        body: Option<ExprId>,
    },
    ModuleDef {
        name: String,
        type_vars: Option<Vec<String>>,
        body: Option<ExprId>,
    },
    Include(ExprId),
    LibDef {
        name: String,
        libname: Option<String>,
        body: Option<ExprId>,
    },
    FunDef(Box<FunExpr>),
    TypeDef { name: String, ty: ExprId, ptr: u32 },
    StructDef { name: String, fields: Vec<FunArg> },
    UnionDef { name: String, fields: Vec<FunArg> },
    EnumDef { name: String, constants: Vec<EnumConstant> },
    StructGet(String),
    StructSet(String),
    UnionGet(String),
    UnionSet(String),
    ClassMethod,
    Allocate,
    SimpleOr { left: ExprId, right: ExprId },
    IdentUnion(Vec<ExprId>),
    NewGenericClass { name: ExprId, type_vars: Vec<ExprId> },
    IsA { obj: ExprId, const_ty: ExprId },
    TypeMerge(Vec<ExprId>),
    PointerOf(ExprId),
    PointerMalloc,
    PointerRealloc,
    PointerGetValue,
    PointerSetValue,
    PointerAdd,
    PointerCast,
}

impl ExprKind {
    /// Construct name; two arguments with the same shape share a macro expander
    pub fn shape(&self) -> &'static str {
        match self {
            ExprKind::Nop => "Nop",
            ExprKind::NilLiteral => "NilLiteral",
            ExprKind::BoolLiteral(_) => "BoolLiteral",
            ExprKind::CharLiteral(_) => "CharLiteral",
            ExprKind::NumberLiteral { .. } => "NumberLiteral",
            ExprKind::StringLiteral(_) => "StringLiteral",
            ExprKind::SymbolLiteral(_) => "SymbolLiteral",
            ExprKind::Expressions(_) => "Expressions",
            ExprKind::Var(_) => "Var",
            ExprKind::InstanceVar(_) => "InstanceVar",
            ExprKind::Global(_) => "Global",
            ExprKind::Ident { .. } => "Ident",
            ExprKind::DeclareVar { .. } => "DeclareVar",
            ExprKind::Assign { .. } => "Assign",
            ExprKind::MultiAssign { .. } => "MultiAssign",
            ExprKind::If { .. } => "If",
            ExprKind::While { .. } => "While",
            ExprKind::Break(_) => "Break",
            ExprKind::Return(_) => "Return",
            ExprKind::Yield(_) => "Yield",
            ExprKind::Call { .. } => "Call",
            ExprKind::Block { .. } => "Block",
            ExprKind::Def(_) => "Def",
            ExprKind::Macro(_) => "Macro",
            ExprKind::ClassDef { .. } => "ClassDef",
            ExprKind::ModuleDef { .. } => "ModuleDef",
            ExprKind::Include(_) => "Include",
            ExprKind::LibDef { .. } => "LibDef",
            ExprKind::FunDef(_) => "FunDef",
            ExprKind::TypeDef { .. } => "TypeDef",
            ExprKind::StructDef { .. } => "StructDef",
            ExprKind::UnionDef { .. } => "UnionDef",
            ExprKind::EnumDef { .. } => "EnumDef",
            ExprKind::StructGet(_) => "StructGet",
            ExprKind::StructSet(_) => "StructSet",
            ExprKind::UnionGet(_) => "UnionGet",
            ExprKind::UnionSet(_) => "UnionSet",
            ExprKind::ClassMethod => "ClassMethod",
            ExprKind::Allocate => "Allocate",
            ExprKind::SimpleOr { .. } => "SimpleOr",
            ExprKind::IdentUnion(_) => "IdentUnion",
            ExprKind::NewGenericClass { .. } => "NewGenericClass",
            ExprKind::IsA { .. } => "IsA",
            ExprKind::TypeMerge(_) => "TypeMerge",
            ExprKind::PointerOf(_) => "PointerOf",
            ExprKind::PointerMalloc => "PointerMalloc",
            ExprKind::PointerRealloc => "PointerRealloc",
            ExprKind::PointerGetValue => "PointerGetValue",
            ExprKind::PointerSetValue => "PointerSetValue",
            ExprKind::PointerAdd => "PointerAdd",
            ExprKind::PointerCast => "PointerCast",
        }
    }

    /// Rebuild this kind with every child id passed through `f`, in visit order
    pub fn map_ids(self, f: &mut impl FnMut(ExprId) -> ExprId) -> ExprKind {
        
        match self {
            ExprKind::Expressions(exps) => ExprKind::Expressions(exps.into_iter().map(&mut *f).collect()),
            ExprKind::DeclareVar {
                name,
                declared_type,
            } => ExprKind::DeclareVar {
                name,
                declared_type: f(declared_type),
            },
            ExprKind::Assign { target, value } => ExprKind::Assign {
                target: f(target),
                value: f(value),
            },
            ExprKind::MultiAssign { targets, values } => ExprKind::MultiAssign {
                targets: targets.into_iter().map(&mut *f).collect(),
                values: values.into_iter().map(&mut *f).collect(),
            },
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
                binary,
            } => ExprKind::If {
                cond: f(cond),
                then_branch: then_branch.map(&mut *f),
                else_branch: else_branch.map(&mut *f),
                binary,
            },
            ExprKind::While { cond, body } => ExprKind::While {
                cond: f(cond),
                body: body.map(&mut *f),
            },
            ExprKind::Break(exps) => ExprKind::Break(exps.into_iter().map(&mut *f).collect()),
            ExprKind::Return(exps) => ExprKind::Return(exps.into_iter().map(&mut *f).collect()),
            ExprKind::Yield(exps) => ExprKind::Yield(exps.into_iter().map(&mut *f).collect()),
            ExprKind::Call {
                obj,
                name,
                args,
                block,
            } => ExprKind::Call {
                obj: obj.map(&mut *f),
                name,
                args: args.into_iter().map(&mut *f).collect(),
                block: block.map(&mut *f),
            },
            ExprKind::Block { args, body } => ExprKind::Block {
                args: args.into_iter().map(&mut *f).collect(),
                body: body.map(&mut *f),
            },
            ExprKind::Def(def) => {
                let DefExpr {
                    receiver,
                    name,
                    args,
                    body,
                    return_type,
                    block_inputs,
                } = *def;
                ExprKind::Def(Box::new(DefExpr {
                    receiver: receiver.map(&mut *f),
                    name,
                    args,
                    body: body.map(&mut *f),
                    return_type: return_type.map(&mut *f),
                    block_inputs: block_inputs.map(|inputs| inputs.into_iter().map(&mut *f).collect()),
                }))
            }
            ExprKind::Macro(mac) => {
                let MacroExpr {
                    receiver,
                    name,
                    args,
                    body,
                } = *mac;
                ExprKind::Macro(Box::new(MacroExpr {
                    receiver: receiver.map(&mut *f),
                    name,
                    args,
                    body: body.map(&mut *f),
                }))
            }
            ExprKind::ClassDef {
                name,
                superclass,
                type_vars,
                is_abstract,
                body,
            } => ExprKind::ClassDef {
                name,
                superclass: superclass.map(&mut *f),
                type_vars,
                is_abstract,
                body: body.map(&mut *f),
            },
            ExprKind::ModuleDef {
                name,
                type_vars,
                body,
            } => ExprKind::ModuleDef {
                name,
                type_vars,
                body: body.map(&mut *f),
            },
            ExprKind::Include(name) => ExprKind::Include(f(name)),
            ExprKind::LibDef {
                name,
                libname,
                body,
            } => ExprKind::LibDef {
                name,
                libname,
                body: body.map(&mut *f),
            },
            ExprKind::FunDef(fun) => {
                let FunExpr {
                    name,
                    real_name,
                    args,
                    return_type,
                    ptr,
                    varargs,
                } = *fun;
                ExprKind::FunDef(Box::new(FunExpr {
                    name,
                    real_name,
                    args: map_fun_args(args, f),
                    return_type: return_type.map(&mut *f),
                    ptr,
                    varargs,
                }))
            }
            ExprKind::TypeDef { name, ty, ptr } => ExprKind::TypeDef {
                name,
                ty: f(ty),
                ptr,
            },
            ExprKind::StructDef { name, fields } => ExprKind::StructDef {
                name,
                fields: map_fun_args(fields, f),
            },
            ExprKind::UnionDef { name, fields } => ExprKind::UnionDef {
                name,
                fields: map_fun_args(fields, f),
            },
            ExprKind::SimpleOr { left, right } => ExprKind::SimpleOr {
                left: f(left),
                right: f(right),
            },
            ExprKind::IdentUnion(idents) => ExprKind::IdentUnion(idents.into_iter().map(&mut *f).collect()),
            ExprKind::NewGenericClass { name, type_vars } => ExprKind::NewGenericClass {
                name: f(name),
                type_vars: type_vars.into_iter().map(&mut *f).collect(),
            },
            ExprKind::IsA { obj, const_ty } => ExprKind::IsA {
                obj: f(obj),
                const_ty: f(const_ty),
            },
            ExprKind::TypeMerge(exps) => ExprKind::TypeMerge(exps.into_iter().map(&mut *f).collect()),
            ExprKind::PointerOf(var) => ExprKind::PointerOf(f(var)),
            leaf => leaf,
        }
    }

    pub fn children(&self) -> Vec<ExprId> {
        let mut children = Vec::new();
        self.clone().map_ids(&mut |id| {
            children.push(id);
            id
        });
        children
    }
}

fn map_fun_args(args: Vec<FunArg>, f: &mut impl FnMut(ExprId) -> ExprId) -> Vec<FunArg> {
    args.into_iter()
        .map(|arg| FunArg {
            name: arg.name,
            ty: f(arg.ty),
            ptr: arg.ptr,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Option<Location>,
    pub node: NodeId,
}

#[derive(Debug, Default)]
pub struct Ast {
    exprs: Vec<Expr>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub(crate) fn push(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.exprs[id.index()].kind
    }

    pub(crate) fn kind_mut(&mut self, id: ExprId) -> &mut ExprKind {
        &mut self.exprs[id.index()].kind
    }

    pub fn location(&self, id: ExprId) -> Option<&Location> {
        self.exprs[id.index()].location.as_ref()
    }

    pub fn node(&self, id: ExprId) -> NodeId {
        self.exprs[id.index()].node
    }

    /// Statements of an `Expressions` node, or the node itself
    pub fn statements(&self, id: ExprId) -> Vec<ExprId> {
        match self.kind(id) {
            ExprKind::Expressions(exps) => exps.clone(),
            _ => vec![id],
        }
    }

    /// `Foo::Bar` text of an identifier, or the construct name otherwise
    pub fn path(&self, id: ExprId) -> String {
        match self.kind(id) {
            ExprKind::Ident { names, global } => {
                let joined = names.join("::");
                if *global {
                    format!("::{joined}")
                } else {
                    joined
                }
            }
            ExprKind::Var(name) | ExprKind::InstanceVar(name) | ExprKind::Global(name) => name.clone(),
            ExprKind::NewGenericClass { name, type_vars } => {
                let vars: Vec<String> = type_vars.iter().map(|var| self.path(*var)).collect();
                format!("{}({})", self.path(*name), vars.join(", "))
            }
            other => other.shape().to_string(),
        }
    }

    /// Local variable names assigned anywhere under `id`, without entering
    /// nested definitions or blocks
    pub fn assigned_locals(&self, id: ExprId) -> IndexSet<String> {
        let mut names = IndexSet::new();
        self.collect_assignments(id, &mut names, &|kind| match kind {
            ExprKind::Var(name) => Some(name.clone()),
            _ => None,
        });
        names
    }

    /// Instance variable names assigned anywhere under `id`
    pub fn assigned_instance_vars(&self, id: ExprId) -> IndexSet<String> {
        let mut names = IndexSet::new();
        self.collect_assignments(id, &mut names, &|kind| match kind {
            ExprKind::InstanceVar(name) => Some(name.clone()),
            _ => None,
        });
        names
    }

    fn collect_assignments(
        &self,
        id: ExprId,
        names: &mut IndexSet<String>,
        select: &dyn Fn(&ExprKind) -> Option<String>,
    ) {
        match self.kind(id) {
            ExprKind::Def(_)
            | ExprKind::Macro(_)
            | ExprKind::ClassDef { .. }
            | ExprKind::ModuleDef { .. }
            | ExprKind::LibDef { .. }
            | ExprKind::Block { .. } => return,
            ExprKind::Assign { target, .. } => names.extend(select(self.kind(*target))),
            ExprKind::MultiAssign { targets, .. } => {
                names.extend(targets.iter().filter_map(|target| select(self.kind(*target))))
            }
            _ => {}
        }
        for child in self.kind(id).children() {
            self.collect_assignments(child, names, select);
        }
    }
}

impl Program {
    /// Move a normalized syntax tree into the arena.
    ///
    /// Fails on any construct the normalizer should have removed.
    pub fn lower(&mut self, node: Node) -> Result<ExprId, InternalError> {
        let Node { kind, location } = node;
        let kind = match kind {
            NodeKind::Nop => ExprKind::Nop,
            NodeKind::NilLiteral => ExprKind::NilLiteral,
            NodeKind::BoolLiteral { value } => ExprKind::BoolLiteral(value),
            NodeKind::CharLiteral { value } => ExprKind::CharLiteral(value),
            NodeKind::NumberLiteral { value, kind } => ExprKind::NumberLiteral { value, kind },
            NodeKind::StringLiteral { value } => ExprKind::StringLiteral(value),
            NodeKind::SymbolLiteral { value } => ExprKind::SymbolLiteral(value),
            NodeKind::Expressions { expressions } => ExprKind::Expressions(self.lower_all(expressions)?),
            NodeKind::Var { name } => ExprKind::Var(name),
            NodeKind::InstanceVar { name } => ExprKind::InstanceVar(name),
            NodeKind::Global { name } => ExprKind::Global(name),
            NodeKind::Ident { names, global } => ExprKind::Ident { names, global },
            NodeKind::DeclareVar {
                name,
                declared_type,
            } => ExprKind::DeclareVar {
                name,
                declared_type: self.lower(*declared_type)?,
            },
            NodeKind::Assign { target, value } => ExprKind::Assign {
                target: self.lower(*target)?,
                value: self.lower(*value)?,
            },
            NodeKind::MultiAssign { targets, values } => ExprKind::MultiAssign {
                targets: self.lower_all(targets)?,
                values: self.lower_all(values)?,
            },
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
                binary,
            } => ExprKind::If {
                cond: self.lower(*cond)?,
                then_branch: self.lower_opt(then_branch)?,
                else_branch: self.lower_opt(else_branch)?,
                binary,
            },
            NodeKind::While { cond, body, .. } => ExprKind::While {
                cond: self.lower(*cond)?,
                body: self.lower_opt(body)?,
            },
            NodeKind::Break { exps } => ExprKind::Break(self.lower_all(exps)?),
            NodeKind::Return { exps } => ExprKind::Return(self.lower_all(exps)?),
            NodeKind::Yield { exps } => ExprKind::Yield(self.lower_all(exps)?),
            NodeKind::Call {
                obj,
                name,
                args,
                block,
            } => ExprKind::Call {
                obj: self.lower_opt(obj)?,
                name,
                args: self.lower_all(args)?,
                block: self.lower_opt(block)?,
            },
            NodeKind::Block { args, body } => ExprKind::Block {
                args: self.lower_all(args)?,
                body: self.lower_opt(body)?,
            },
            NodeKind::Def {
                receiver,
                name,
                args,
                body,
                return_type,
                block_arg,
            } => ExprKind::Def(Box::new(DefExpr {
                receiver: self.lower_opt(receiver)?,
                name,
                args,
                body: self.lower_opt(body)?,
                return_type: self.lower_opt(return_type)?,
                block_inputs: match block_arg {
                    Some(block_arg) => Some(self.lower_all(block_arg.inputs)?),
                    None => None,
                },
            })),
            NodeKind::Macro {
                receiver,
                name,
                args,
                body,
            } => ExprKind::Macro(Box::new(MacroExpr {
                receiver: self.lower_opt(receiver)?,
                name,
                args,
                body: self.lower_opt(body)?,
            })),
            NodeKind::ClassDef {
                name,
                superclass,
                type_vars,
                is_abstract,
                body,
            } => ExprKind::ClassDef {
                name,
                superclass: self.lower_opt(superclass)?,
                type_vars,
                is_abstract,
                body: self.lower_opt(body)?,
            },
            NodeKind::ModuleDef {
                name,
                type_vars,
                body,
            } => ExprKind::ModuleDef {
                name,
                type_vars,
                body: self.lower_opt(body)?,
            },
            NodeKind::Include { name } => ExprKind::Include(self.lower(*name)?),
            NodeKind::LibDef {
                name,
                libname,
                body,
            } => ExprKind::LibDef {
                name,
                libname,
                body: self.lower_opt(body)?,
            },
            NodeKind::FunDef {
                name,
                real_name,
                args,
                return_type,
                ptr,
                varargs,
            } => ExprKind::FunDef(Box::new(FunExpr {
                name,
                real_name,
                args: self.lower_fun_args(args)?,
                return_type: self.lower_opt(return_type)?,
                ptr,
                varargs,
            })),
            NodeKind::TypeDef { name, ty, ptr } => ExprKind::TypeDef {
                name,
                ty: self.lower(*ty)?,
                ptr,
            },
            NodeKind::StructDef { name, fields } => ExprKind::StructDef {
                name,
                fields: self.lower_fun_args(fields)?,
            },
            NodeKind::UnionDef { name, fields } => ExprKind::UnionDef {
                name,
                fields: self.lower_fun_args(fields)?,
            },
            NodeKind::EnumDef { name, constants } => ExprKind::EnumDef { name, constants },
            NodeKind::StructGet { name } => ExprKind::StructGet(name),
            NodeKind::StructSet { name } => ExprKind::StructSet(name),
            NodeKind::UnionGet { name } => ExprKind::UnionGet(name),
            NodeKind::UnionSet { name } => ExprKind::UnionSet(name),
            NodeKind::ClassMethod => ExprKind::ClassMethod,
            NodeKind::Allocate => ExprKind::Allocate,
            NodeKind::SimpleOr { left, right } => ExprKind::SimpleOr {
                left: self.lower(*left)?,
                right: self.lower(*right)?,
            },
            NodeKind::IdentUnion { idents } => ExprKind::IdentUnion(self.lower_all(idents)?),
            NodeKind::NewGenericClass { name, type_vars } => ExprKind::NewGenericClass {
                name: self.lower(*name)?,
                type_vars: self.lower_all(type_vars)?,
            },
            NodeKind::IsA { obj, const_ty } => ExprKind::IsA {
                obj: self.lower(*obj)?,
                const_ty: self.lower(*const_ty)?,
            },
            NodeKind::TypeMerge { expressions } => ExprKind::TypeMerge(self.lower_all(expressions)?),
            NodeKind::PointerOf { var } => ExprKind::PointerOf(self.lower(*var)?),
            NodeKind::PointerMalloc => ExprKind::PointerMalloc,
            NodeKind::PointerRealloc => ExprKind::PointerRealloc,
            NodeKind::PointerGetValue => ExprKind::PointerGetValue,
            NodeKind::PointerSetValue => ExprKind::PointerSetValue,
            NodeKind::PointerAdd => ExprKind::PointerAdd,
            NodeKind::PointerCast => ExprKind::PointerCast,
            NodeKind::Sugar(sugar) => {
                let name = sugar.name();
                let source = Node {
                    kind: NodeKind::Sugar(sugar),
                    location: location.clone(),
                };
                let at = location
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown location".to_string());
                return Err(InternalError {
                    message: format!(
                        "{name} node '{source}' ({at}) should have been eliminated in normalize"
                    ),
                    location,
                });
            }
        };
        Ok(self.alloc_expr(kind, location))
    }

    fn lower_all(&mut self, nodes: Vec<Node>) -> Result<Vec<ExprId>, InternalError> {
        nodes.into_iter().map(|node| self.lower(node)).collect()
    }

    fn lower_opt(&mut self, node: Option<Box<Node>>) -> Result<Option<ExprId>, InternalError> {
        node.map(|node| self.lower(*node)).transpose()
    }

    fn lower_fun_args(&mut self, args: Vec<syntax::FunDefArg>) -> Result<Vec<FunArg>, InternalError> {
        args.into_iter()
            .map(|arg| {
                Ok(FunArg {
                    name: arg.name,
                    ty: self.lower(arg.ty)?,
                    ptr: arg.ptr,
                })
            })
            .collect()
    }

    /// Copy the subtree under `id` with fresh, untyped graph nodes
    pub fn deep_clone(&mut self, id: ExprId) -> ExprId {
        let expr = self.ast.get(id).clone();
        let kind = expr.kind.map_ids(&mut |child| self.deep_clone(child));
        self.alloc_expr(kind, expr.location)
    }
}
