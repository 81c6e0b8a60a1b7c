//! Type lattice
//!
//! Types are interned in a [`TypeTable`] and compared by [`TypeId`]. The
//! table canonicalizes unions and generic instantiations so that equal
//! member sets and equal argument lists always yield the same id:
//! - `merge` is the join (flattened, deduplicated, order-independent)
//! - `metaclass_of` is the type of a type, created on demand
//! - `instantiate` binds a generic class's type variables positionally

use crate::ast::ExprId;
use crate::inference::graph::NodeId;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a constant owned by [`Program`](crate::inference::program::Program)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstId(pub u32);

/// What a name inside a type's namespace refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedEntry {
    Type(TypeId),
    Const(ConstId),
}

/// Value of a generic module's type parameter as seen by an includer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeVarBinding {
    Type(TypeId),
    /// Forwarded to the including type's own parameter of this name
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Include {
    Module(TypeId),
    Generic {
        module: TypeId,
        mapping: IndexMap<String, TypeVarBinding>,
    },
}

impl Include {
    pub fn module(&self) -> TypeId {
        match self {
            Include::Module(module) | Include::Generic { module, .. } => *module,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassInfo {
    pub superclass: Option<TypeId>,
    pub is_abstract: bool,
    pub type_vars: Option<Vec<String>>,
    /// Value types without instance variables (numbers, pointers, ...)
    pub primitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Program,
    Class(ClassInfo),
    Module { type_vars: Option<Vec<String>> },
    Instance { generic: TypeId, args: Vec<TypeId> },
    Union(Vec<TypeId>),
    Metaclass { instance: TypeId },
    NoReturn,
    Lib { libname: Option<String> },
    Alias { aliased: TypeId },
    CStruct { fields: IndexMap<String, TypeId> },
    CUnion { fields: IndexMap<String, TypeId> },
    CEnum { constants: IndexMap<String, i64> },
}

/// External function declared inside a lib
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunSignature {
    pub real_name: String,
    pub args: Vec<TypeId>,
    pub return_type: TypeId,
    pub varargs: bool,
}

#[derive(Debug, Clone)]
pub struct TypeData {
    pub name: String,
    pub container: Option<TypeId>,
    pub kind: TypeKind,
    pub types: IndexMap<String, NamedEntry>,
    pub defs: IndexMap<(String, usize), ExprId>,
    pub macros: IndexMap<(String, usize), ExprId>,
    pub includes: Vec<Include>,
    pub instance_vars: IndexMap<String, NodeId>,
    pub funs: IndexMap<String, FunSignature>,
    /// Instance variables assigned by every `initialize` seen so far
    pub initialize_ivars: Option<IndexSet<String>>,
    metaclass: Option<TypeId>,
}

impl TypeData {
    fn new(name: impl Into<String>, container: Option<TypeId>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            container,
            kind,
            types: IndexMap::new(),
            defs: IndexMap::new(),
            macros: IndexMap::new(),
            includes: Vec::new(),
            instance_vars: IndexMap::new(),
            funs: IndexMap::new(),
            initialize_ivars: None,
            metaclass: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LatticeError {
    #[error("{0} is not a generic class")]
    NotGeneric(String),
    #[error("wrong number of type vars for {name} ({found} for {expected})")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// Ids of the built-in hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtins {
    pub program: TypeId,
    pub object: TypeId,
    pub reference: TypeId,
    pub value: TypeId,
    pub number: TypeId,
    pub int: TypeId,
    pub float: TypeId,
    pub int8: TypeId,
    pub int16: TypeId,
    pub int32: TypeId,
    pub int64: TypeId,
    pub uint8: TypeId,
    pub uint16: TypeId,
    pub uint32: TypeId,
    pub uint64: TypeId,
    pub float32: TypeId,
    pub float64: TypeId,
    pub bool: TypeId,
    pub char: TypeId,
    pub symbol: TypeId,
    pub nil: TypeId,
    pub string: TypeId,
    pub pointer: TypeId,
    pub no_return: TypeId,
}

#[derive(Debug, Clone)]
pub struct TypeTable {
    types: Vec<TypeData>,
    unions: HashMap<Vec<TypeId>, TypeId>,
    instances: HashMap<(TypeId, Vec<TypeId>), TypeId>,
    builtins: Builtins,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            types: vec![TypeData::new("<Program>", None, TypeKind::Program)],
            unions: HashMap::new(),
            instances: HashMap::new(),
            builtins: Builtins {
                program: TypeId(0),
                object: TypeId(0),
                reference: TypeId(0),
                value: TypeId(0),
                number: TypeId(0),
                int: TypeId(0),
                float: TypeId(0),
                int8: TypeId(0),
                int16: TypeId(0),
                int32: TypeId(0),
                int64: TypeId(0),
                uint8: TypeId(0),
                uint16: TypeId(0),
                uint32: TypeId(0),
                uint64: TypeId(0),
                float32: TypeId(0),
                float64: TypeId(0),
                bool: TypeId(0),
                char: TypeId(0),
                symbol: TypeId(0),
                nil: TypeId(0),
                string: TypeId(0),
                pointer: TypeId(0),
                no_return: TypeId(0),
            },
        };
        let root = TypeId(0);
        let class = |superclass: Option<TypeId>| {
            TypeKind::Class(ClassInfo {
                superclass,
                ..ClassInfo::default()
            })
        };
        let primitive = |superclass: TypeId| {
            TypeKind::Class(ClassInfo {
                superclass: Some(superclass),
                primitive: true,
                ..ClassInfo::default()
            })
        };
        let abstract_class = |superclass: TypeId| {
            TypeKind::Class(ClassInfo {
                superclass: Some(superclass),
                is_abstract: true,
                ..ClassInfo::default()
            })
        };

        let object = table.add_type(root, "Object", class(None));
        let reference = table.add_type(root, "Reference", class(Some(object)));
        let value = table.add_type(root, "Value", class(Some(object)));
        let number = table.add_type(root, "Number", abstract_class(value));
        let int = table.add_type(root, "Int", abstract_class(number));
        let float = table.add_type(root, "Float", abstract_class(number));
        let mut b = table.builtins;
        b.object = object;
        b.reference = reference;
        b.value = value;
        b.number = number;
        b.int = int;
        b.float = float;
        b.int8 = table.add_type(root, "Int8", primitive(int));
        b.int16 = table.add_type(root, "Int16", primitive(int));
        b.int32 = table.add_type(root, "Int32", primitive(int));
        b.int64 = table.add_type(root, "Int64", primitive(int));
        b.uint8 = table.add_type(root, "UInt8", primitive(int));
        b.uint16 = table.add_type(root, "UInt16", primitive(int));
        b.uint32 = table.add_type(root, "UInt32", primitive(int));
        b.uint64 = table.add_type(root, "UInt64", primitive(int));
        b.float32 = table.add_type(root, "Float32", primitive(float));
        b.float64 = table.add_type(root, "Float64", primitive(float));
        b.bool = table.add_type(root, "Bool", primitive(value));
        b.char = table.add_type(root, "Char", primitive(value));
        b.symbol = table.add_type(root, "Symbol", primitive(value));
        b.nil = table.add_type(root, "Nil", primitive(value));
        b.string = table.add_type(root, "String", class(Some(reference)));
        b.pointer = table.add_type(
            root,
            "Pointer",
            TypeKind::Class(ClassInfo {
                superclass: Some(value),
                type_vars: Some(vec!["T".to_string()]),
                primitive: true,
                ..ClassInfo::default()
            }),
        );
        b.no_return = table.push(TypeData::new("NoReturn", Some(root), TypeKind::NoReturn));
        table.builtins = b;
        table
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn root(&self) -> TypeId {
        self.builtins.program
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn push(&mut self, data: TypeData) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(data);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeData {
        &self.types[id.index()]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeData {
        &mut self.types[id.index()]
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.types[id.index()].kind
    }

    /// Declare a named type inside `container`
    pub fn add_type(&mut self, container: TypeId, name: &str, kind: TypeKind) -> TypeId {
        let id = self.push(TypeData::new(name, Some(container), kind));
        self.get_mut(container)
            .types
            .insert(name.to_string(), NamedEntry::Type(id));
        id
    }

    pub fn add_const(&mut self, container: TypeId, name: &str, id: ConstId) {
        self.get_mut(container)
            .types
            .insert(name.to_string(), NamedEntry::Const(id));
    }

    pub fn add_def(&mut self, owner: TypeId, name: &str, arity: usize, def: ExprId) {
        self.get_mut(owner).defs.insert((name.to_string(), arity), def);
    }

    pub fn add_macro(&mut self, owner: TypeId, name: &str, arity: usize, def: ExprId) {
        self.get_mut(owner).macros.insert((name.to_string(), arity), def);
    }

    pub fn include(&mut self, owner: TypeId, include: Include) {
        let includes = &mut self.get_mut(owner).includes;
        if !includes.contains(&include) {
            includes.push(include);
        }
    }

    /// Canonical join of `types`.
    ///
    /// Nested unions are flattened and `NoReturn` vanishes next to any
    /// other member. Returns `None` for an empty input.
    pub fn merge(&mut self, types: &[TypeId]) -> Option<TypeId> {
        let mut members = Vec::with_capacity(types.len());
        for ty in types {
            match self.kind(*ty) {
                TypeKind::Union(inner) => members.extend(inner.iter().copied()),
                _ => members.push(*ty),
            }
        }
        members.sort_unstable();
        members.dedup();
        if members.len() > 1 {
            let no_return = self.builtins.no_return;
            members.retain(|ty| *ty != no_return);
        }
        match members.len() {
            0 => None,
            1 => Some(members[0]),
            _ => {
                if let Some(existing) = self.unions.get(&members) {
                    return Some(*existing);
                }
                let root = self.root();
                let id = self.push(TypeData::new("", Some(root), TypeKind::Union(members.clone())));
                self.unions.insert(members, id);
                Some(id)
            }
        }
    }

    /// Singleton type of `ty` used as a value; the program is its own
    pub fn metaclass_of(&mut self, ty: TypeId) -> TypeId {
        if ty == self.root() {
            return ty;
        }
        if let Some(metaclass) = self.get(ty).metaclass {
            return metaclass;
        }
        let container = self.get(ty).container;
        let metaclass = self.push(TypeData::new("", container, TypeKind::Metaclass { instance: ty }));
        self.get_mut(ty).metaclass = Some(metaclass);
        metaclass
    }

    /// Bind a generic class's type variables positionally to `args`
    pub fn instantiate(&mut self, generic: TypeId, args: &[TypeId]) -> Result<TypeId, LatticeError> {
        let type_vars = match self.kind(generic) {
            TypeKind::Class(ClassInfo {
                type_vars: Some(vars),
                ..
            }) => vars.len(),
            _ => return Err(LatticeError::NotGeneric(self.name(generic))),
        };
        if type_vars != args.len() {
            return Err(LatticeError::Arity {
                name: self.name(generic),
                expected: type_vars,
                found: args.len(),
            });
        }
        Ok(self.intern_instance(generic, args))
    }

    fn intern_instance(&mut self, generic: TypeId, args: &[TypeId]) -> TypeId {
        let key = (generic, args.to_vec());
        if let Some(existing) = self.instances.get(&key) {
            return *existing;
        }
        let data = self.get(generic);
        let name = data.name.clone();
        let container = data.container;
        let id = self.push(TypeData::new(
            name,
            container,
            TypeKind::Instance {
                generic,
                args: args.to_vec(),
            },
        ));
        self.instances.insert(key, id);
        id
    }

    pub fn pointer_of(&mut self, ty: TypeId) -> TypeId {
        let pointer = self.builtins.pointer;
        self.intern_instance(pointer, &[ty])
    }

    /// The type a metaclass describes; any other type is its own instance type
    pub fn instance_type(&self, ty: TypeId) -> TypeId {
        match self.kind(ty) {
            TypeKind::Metaclass { instance } => *instance,
            _ => ty,
        }
    }

    pub fn superclass(&self, ty: TypeId) -> Option<TypeId> {
        match self.kind(ty) {
            TypeKind::Class(info) => info.superclass,
            TypeKind::Instance { generic, .. } => self.superclass(*generic),
            _ => None,
        }
    }

    /// Superclass chain, nearest first
    pub fn ancestors(&self, ty: TypeId) -> Vec<TypeId> {
        let mut chain = Vec::new();
        let mut current = self.superclass(ty);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.superclass(parent);
        }
        chain
    }

    pub fn type_vars(&self, ty: TypeId) -> Option<&[String]> {
        match self.kind(ty) {
            TypeKind::Class(info) => info.type_vars.as_deref(),
            TypeKind::Module { type_vars } => type_vars.as_deref(),
            _ => None,
        }
    }

    pub fn is_generic(&self, ty: TypeId) -> bool {
        self.type_vars(ty).is_some()
    }

    pub fn is_subtype(&self, ty: TypeId, of: TypeId) -> bool {
        if ty == of {
            return true;
        }
        match self.kind(ty) {
            TypeKind::Union(members) => members.iter().all(|member| self.is_subtype(*member, of)),
            TypeKind::NoReturn => true,
            TypeKind::Instance { generic, .. } if *generic == of => true,
            _ => {
                let mut chain = vec![ty];
                chain.extend(self.ancestors(ty));
                chain.iter().any(|t| *t == of || self.includes_module(*t, of))
            }
        }
    }

    fn includes_module(&self, ty: TypeId, module: TypeId) -> bool {
        let data = match self.kind(ty) {
            TypeKind::Instance { generic, .. } => self.get(*generic),
            _ => self.get(ty),
        };
        data.includes
            .iter()
            .any(|include| include.module() == module || self.includes_module(include.module(), module))
    }

    /// Types allowed in lib declarations
    pub fn is_primitive_like(&self, ty: TypeId) -> bool {
        match self.kind(ty) {
            TypeKind::Class(info) => info.primitive,
            TypeKind::Instance { generic, .. } => *generic == self.builtins.pointer,
            TypeKind::Alias { .. } | TypeKind::CStruct { .. } | TypeKind::CUnion { .. } | TypeKind::CEnum { .. } => {
                true
            }
            _ => false,
        }
    }

    /// Resolve a `Foo::Bar` path as seen from `from`.
    ///
    /// The first segment is searched in the nearest enclosing namespace
    /// first: `from` itself, its superclasses, then each container up to
    /// the program. Later segments are looked up directly inside the
    /// previous result.
    pub fn lookup_type(&self, from: TypeId, path: &[String]) -> Option<NamedEntry> {
        let (first, rest) = path.split_first()?;
        let mut entry = self.lookup_first(from, first)?;
        for name in rest {
            let NamedEntry::Type(ty) = entry else {
                return None;
            };
            entry = self.lookup_member(ty, name)?;
        }
        Some(entry)
    }

    pub fn lookup_global(&self, path: &[String]) -> Option<NamedEntry> {
        let (first, rest) = path.split_first()?;
        let mut entry = *self.get(self.root()).types.get(first)?;
        for name in rest {
            let NamedEntry::Type(ty) = entry else {
                return None;
            };
            entry = self.lookup_member(ty, name)?;
        }
        Some(entry)
    }

    fn lookup_first(&self, from: TypeId, name: &str) -> Option<NamedEntry> {
        let mut scope = Some(from);
        while let Some(current) = scope {
            if let Some(entry) = self.lookup_member(current, name) {
                return Some(entry);
            }
            scope = self.container(current);
        }
        None
    }

    fn container(&self, ty: TypeId) -> Option<TypeId> {
        match self.kind(ty) {
            TypeKind::Metaclass { instance } => self.container(*instance),
            _ => self.get(ty).container,
        }
    }

    /// Own namespace of `ty` and its superclasses, including type variables
    fn lookup_member(&self, ty: TypeId, name: &str) -> Option<NamedEntry> {
        match self.kind(ty) {
            TypeKind::Metaclass { instance } => self.lookup_member(*instance, name),
            TypeKind::Instance { generic, args } => {
                if let Some(bound) = self.type_var_value(*generic, args, name) {
                    return Some(NamedEntry::Type(bound));
                }
                self.lookup_member(*generic, name)
            }
            _ => {
                if let Some(entry) = self.get(ty).types.get(name) {
                    return Some(*entry);
                }
                for include in self.get(ty).includes.iter().rev() {
                    if let Include::Generic { mapping, .. } = include {
                        if let Some(TypeVarBinding::Type(bound)) = mapping.get(name) {
                            return Some(NamedEntry::Type(*bound));
                        }
                    }
                }
                self.superclass(ty)
                    .and_then(|parent| self.lookup_member(parent, name))
            }
        }
    }

    /// Value of `name` inside an instance of `generic`, looking through
    /// the type parameters of included generic modules as well.
    fn type_var_value(&self, generic: TypeId, args: &[TypeId], name: &str) -> Option<TypeId> {
        let own = self.type_vars(generic).unwrap_or(&[]);
        if let Some(position) = own.iter().position(|var| var == name) {
            return args.get(position).copied();
        }
        for include in self.get(generic).includes.iter().rev() {
            let Include::Generic { mapping, .. } = include else {
                continue;
            };
            match mapping.get(name) {
                Some(TypeVarBinding::Type(ty)) => return Some(*ty),
                Some(TypeVarBinding::Param(param)) => {
                    if let Some(position) = own.iter().position(|var| var == param) {
                        return args.get(position).copied();
                    }
                }
                None => {}
            }
        }
        None
    }

    pub fn lookup_def(&self, ty: TypeId, name: &str, arity: usize) -> Option<ExprId> {
        self.lookup_method(ty, &(name.to_string(), arity), |data| &data.defs)
    }

    pub fn lookup_macro(&self, ty: TypeId, name: &str, arity: usize) -> Option<ExprId> {
        self.lookup_method(ty, &(name.to_string(), arity), |data| &data.macros)
    }

    fn lookup_method(
        &self,
        ty: TypeId,
        key: &(String, usize),
        table: fn(&TypeData) -> &IndexMap<(String, usize), ExprId>,
    ) -> Option<ExprId> {
        if let Some(def) = table(self.get(ty)).get(key) {
            return Some(*def);
        }
        match self.kind(ty) {
            TypeKind::Instance { generic, .. } => self.lookup_method(*generic, key, table),
            TypeKind::Metaclass { instance } => {
                if let TypeKind::Instance { generic, .. } = self.kind(*instance) {
                    if let Some(def) = self
                        .get(*generic)
                        .metaclass
                        .and_then(|generic_metaclass| self.lookup_method(generic_metaclass, key, table))
                    {
                        return Some(def);
                    }
                }
                let parent = self.superclass(*instance)?;
                let parent_metaclass = self.get(parent).metaclass?;
                self.lookup_method(parent_metaclass, key, table)
            }
            _ => {
                for include in self.get(ty).includes.iter().rev() {
                    if let Some(def) = self.lookup_method(include.module(), key, table) {
                        return Some(def);
                    }
                }
                self.superclass(ty)
                    .and_then(|parent| self.lookup_method(parent, key, table))
            }
        }
    }

    /// Display name: `Foo::Bar`, `Array(Int32)`, `Foo:Class`, `Int32 | Nil`
    pub fn name(&self, ty: TypeId) -> String {
        let data = self.get(ty);
        match &data.kind {
            TypeKind::Program | TypeKind::NoReturn => data.name.clone(),
            TypeKind::Instance { generic, args } => {
                let args: Vec<String> = args.iter().map(|arg| self.name(*arg)).collect();
                format!("{}({})", self.name(*generic), args.join(", "))
            }
            TypeKind::Union(members) => {
                let members: Vec<String> = members.iter().map(|member| self.name(*member)).collect();
                members.join(" | ")
            }
            TypeKind::Metaclass { instance } => format!("{}:Class", self.name(*instance)),
            _ => match data.container {
                Some(container) if container != self.root() => {
                    format!("{}::{}", self.name(container), data.name)
                }
                _ => data.name.clone(),
            },
        }
    }
}
