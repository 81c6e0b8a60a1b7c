//! Syntax tree handed over by the parser and the normalizer.
//!
//! This is the owned, serializable form of a program. It still contains the
//! [`Sugar`] family of constructs (`&&`, `case`, array literals, ...) because
//! the parser produces them; the normalizer is expected to rewrite all of them
//! into primitive control flow before the tree is lowered into the arena
//! [`crate::ast`] form the inference driver works on.
//!
//! The JSON shape is one object per node, tagged by `"node"`:
//!
//! ```json
//! {"node": "assign", "target": {"node": "var", "name": "a"},
//!  "value": {"node": "number_literal", "value": "1", "kind": "i32"}}
//! ```

pub mod pretty;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Source position attached to a node by the parser
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: Option<&str>, line: u32, column: u32) -> Self {
        Self {
            file: file.map(str::to_string),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// Width and signedness of a number literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl NumberKind {
    pub fn suffix(self) -> &'static str {
        match self {
            NumberKind::I8 => "i8",
            NumberKind::I16 => "i16",
            NumberKind::I32 => "i32",
            NumberKind::I64 => "i64",
            NumberKind::U8 => "u8",
            NumberKind::U16 => "u16",
            NumberKind::U32 => "u32",
            NumberKind::U64 => "u64",
            NumberKind::F32 => "f32",
            NumberKind::F64 => "f64",
        }
    }

    /// `i32` and `f64` are what unsuffixed literals default to
    pub fn is_default(self) -> bool {
        matches!(self, NumberKind::I32 | NumberKind::F64)
    }
}

/// Which short-circuit operator an `if` was desugared from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binary {
    And,
    Or,
}

/// A typed field of a lib `fun`, `struct` or `union` declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunDefArg {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Node,
    #[serde(default)]
    pub ptr: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumConstant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}

/// `&block : A, B -> ` declaration on a def; the inputs become yield types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockArg {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    Nop,
    NilLiteral,
    BoolLiteral {
        value: bool,
    },
    CharLiteral {
        value: char,
    },
    NumberLiteral {
        value: String,
        kind: NumberKind,
    },
    StringLiteral {
        value: String,
    },
    SymbolLiteral {
        value: String,
    },
    Expressions {
        expressions: Vec<Node>,
    },
    Var {
        name: String,
    },
    InstanceVar {
        name: String,
    },
    Global {
        name: String,
    },
    Ident {
        names: Vec<String>,
        #[serde(default)]
        global: bool,
    },
    DeclareVar {
        name: String,
        declared_type: Box<Node>,
    },
    Assign {
        target: Box<Node>,
        value: Box<Node>,
    },
    MultiAssign {
        targets: Vec<Node>,
        values: Vec<Node>,
    },
    If {
        cond: Box<Node>,
        #[serde(rename = "then", default)]
        then_branch: Option<Box<Node>>,
        #[serde(rename = "else", default)]
        else_branch: Option<Box<Node>>,
        #[serde(default)]
        binary: Option<Binary>,
    },
    While {
        cond: Box<Node>,
        #[serde(default)]
        body: Option<Box<Node>>,
        #[serde(default)]
        run_once: bool,
    },
    Break {
        #[serde(default)]
        exps: Vec<Node>,
    },
    Return {
        #[serde(default)]
        exps: Vec<Node>,
    },
    Yield {
        #[serde(default)]
        exps: Vec<Node>,
    },
    Call {
        #[serde(default)]
        obj: Option<Box<Node>>,
        name: String,
        #[serde(default)]
        args: Vec<Node>,
        #[serde(default)]
        block: Option<Box<Node>>,
    },
    Block {
        #[serde(default)]
        args: Vec<Node>,
        #[serde(default)]
        body: Option<Box<Node>>,
    },
    Def {
        #[serde(default)]
        receiver: Option<Box<Node>>,
        name: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        body: Option<Box<Node>>,
        #[serde(default)]
        return_type: Option<Box<Node>>,
        #[serde(default)]
        block_arg: Option<BlockArg>,
    },
    Macro {
        #[serde(default)]
        receiver: Option<Box<Node>>,
        name: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        body: Option<Box<Node>>,
    },
    ClassDef {
        name: String,
        #[serde(default)]
        superclass: Option<Box<Node>>,
        #[serde(default)]
        type_vars: Option<Vec<String>>,
        #[serde(rename = "abstract", default)]
        is_abstract: bool,
        #[serde(default)]
        body: Option<Box<Node>>,
    },
    ModuleDef {
        name: String,
        #[serde(default)]
        type_vars: Option<Vec<String>>,
        #[serde(default)]
        body: Option<Box<Node>>,
    },
    Include {
        name: Box<Node>,
    },
    LibDef {
        name: String,
        #[serde(default)]
        libname: Option<String>,
        #[serde(default)]
        body: Option<Box<Node>>,
    },
    FunDef {
        name: String,
        real_name: String,
        #[serde(default)]
        args: Vec<FunDefArg>,
        #[serde(default)]
        return_type: Option<Box<Node>>,
        #[serde(default)]
        ptr: u32,
        #[serde(default)]
        varargs: bool,
    },
    TypeDef {
        name: String,
        #[serde(rename = "type")]
        ty: Box<Node>,
        #[serde(default)]
        ptr: u32,
    },
    StructDef {
        name: String,
        #[serde(default)]
        fields: Vec<FunDefArg>,
    },
    UnionDef {
        name: String,
        #[serde(default)]
        fields: Vec<FunDefArg>,
    },
    EnumDef {
        name: String,
        constants: Vec<EnumConstant>,
    },
    StructGet {
        name: String,
    },
    StructSet {
        name: String,
    },
    UnionGet {
        name: String,
    },
    UnionSet {
        name: String,
    },
    ClassMethod,
    Allocate,
    SimpleOr {
        left: Box<Node>,
        right: Box<Node>,
    },
    IdentUnion {
        idents: Vec<Node>,
    },
    NewGenericClass {
        name: Box<Node>,
        type_vars: Vec<Node>,
    },
    IsA {
        obj: Box<Node>,
        #[serde(rename = "const")]
        const_ty: Box<Node>,
    },
    TypeMerge {
        expressions: Vec<Node>,
    },
    PointerOf {
        var: Box<Node>,
    },
    PointerMalloc,
    PointerRealloc,
    PointerGetValue,
    PointerSetValue,
    PointerAdd,
    PointerCast,
    Sugar(Sugar),
}

/// Constructs the normalizer must rewrite away.
///
/// Lowering a tree that still contains one of these is an internal invariant
/// violation, never a user error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sugar", rename_all = "snake_case")]
pub enum Sugar {
    And {
        left: Box<Node>,
        right: Box<Node>,
    },
    Or {
        left: Box<Node>,
        right: Box<Node>,
    },
    Require {
        string: Box<Node>,
    },
    RangeLiteral {
        from: Box<Node>,
        to: Box<Node>,
        #[serde(default)]
        exclusive: bool,
    },
    Case {
        cond: Box<Node>,
        whens: Vec<Node>,
        #[serde(rename = "else", default)]
        else_branch: Option<Box<Node>>,
    },
    When {
        conds: Vec<Node>,
        #[serde(default)]
        body: Option<Box<Node>>,
    },
    RegexpLiteral {
        value: String,
    },
    ArrayLiteral {
        elements: Vec<Node>,
        #[serde(default)]
        of: Option<Box<Node>>,
    },
    HashLiteral {
        keys: Vec<Node>,
        values: Vec<Node>,
        #[serde(default)]
        of_key: Option<Box<Node>>,
        #[serde(default)]
        of_value: Option<Box<Node>>,
    },
    Unless {
        cond: Box<Node>,
        #[serde(rename = "then", default)]
        then_branch: Option<Box<Node>>,
        #[serde(rename = "else", default)]
        else_branch: Option<Box<Node>>,
    },
    StringInterpolation {
        expressions: Vec<Node>,
    },
}

impl Sugar {
    /// Construct name used in internal-invariant diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Sugar::And { .. } => "And",
            Sugar::Or { .. } => "Or",
            Sugar::Require { .. } => "Require",
            Sugar::RangeLiteral { .. } => "RangeLiteral",
            Sugar::Case { .. } => "Case",
            Sugar::When { .. } => "When",
            Sugar::RegexpLiteral { .. } => "RegexpLiteral",
            Sugar::ArrayLiteral { .. } => "ArrayLiteral",
            Sugar::HashLiteral { .. } => "HashLiteral",
            Sugar::Unless { .. } => "Unless",
            Sugar::StringInterpolation { .. } => "StringInterpolation",
        }
    }
}

fn boxed(node: Node) -> Box<Node> {
    Box::new(node)
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.location = Some(Location::new(None, line, column));
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn nop() -> Self {
        Self::new(NodeKind::Nop)
    }

    pub fn nil() -> Self {
        Self::new(NodeKind::NilLiteral)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(NodeKind::BoolLiteral { value })
    }

    pub fn char(value: char) -> Self {
        Self::new(NodeKind::CharLiteral { value })
    }

    pub fn number(value: impl Into<String>, kind: NumberKind) -> Self {
        Self::new(NodeKind::NumberLiteral {
            value: value.into(),
            kind,
        })
    }

    pub fn int32(value: i32) -> Self {
        Self::number(value.to_string(), NumberKind::I32)
    }

    pub fn float64(value: f64) -> Self {
        Self::number(format!("{value:?}"), NumberKind::F64)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(NodeKind::StringLiteral {
            value: value.into(),
        })
    }

    pub fn symbol(value: impl Into<String>) -> Self {
        Self::new(NodeKind::SymbolLiteral {
            value: value.into(),
        })
    }

    pub fn expressions(expressions: Vec<Node>) -> Self {
        Self::new(NodeKind::Expressions { expressions })
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Var { name: name.into() })
    }

    pub fn ivar(name: impl Into<String>) -> Self {
        Self::new(NodeKind::InstanceVar { name: name.into() })
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Global { name: name.into() })
    }

    /// Constant path such as `Foo::Bar`
    pub fn ident(path: &str) -> Self {
        let global = path.starts_with("::");
        let names = path
            .trim_start_matches("::")
            .split("::")
            .map(str::to_string)
            .collect();
        Self::new(NodeKind::Ident { names, global })
    }

    pub fn declare_var(name: impl Into<String>, declared_type: Node) -> Self {
        Self::new(NodeKind::DeclareVar {
            name: name.into(),
            declared_type: boxed(declared_type),
        })
    }

    pub fn assign(target: Node, value: Node) -> Self {
        Self::new(NodeKind::Assign {
            target: boxed(target),
            value: boxed(value),
        })
    }

    pub fn multi_assign(targets: Vec<Node>, values: Vec<Node>) -> Self {
        Self::new(NodeKind::MultiAssign { targets, values })
    }

    pub fn if_(cond: Node, then_branch: Option<Node>, else_branch: Option<Node>) -> Self {
        Self::new(NodeKind::If {
            cond: boxed(cond),
            then_branch: then_branch.map(boxed),
            else_branch: else_branch.map(boxed),
            binary: None,
        })
    }

    pub fn binary_if(
        binary: Binary,
        cond: Node,
        then_branch: Option<Node>,
        else_branch: Option<Node>,
    ) -> Self {
        Self::new(NodeKind::If {
            cond: boxed(cond),
            then_branch: then_branch.map(boxed),
            else_branch: else_branch.map(boxed),
            binary: Some(binary),
        })
    }

    pub fn while_(cond: Node, body: Option<Node>) -> Self {
        Self::new(NodeKind::While {
            cond: boxed(cond),
            body: body.map(boxed),
            run_once: false,
        })
    }

    pub fn break_(exps: Vec<Node>) -> Self {
        Self::new(NodeKind::Break { exps })
    }

    pub fn return_(exps: Vec<Node>) -> Self {
        Self::new(NodeKind::Return { exps })
    }

    pub fn yield_(exps: Vec<Node>) -> Self {
        Self::new(NodeKind::Yield { exps })
    }

    pub fn call(obj: Option<Node>, name: impl Into<String>, args: Vec<Node>) -> Self {
        Self::new(NodeKind::Call {
            obj: obj.map(boxed),
            name: name.into(),
            args,
            block: None,
        })
    }

    pub fn call_with_block(
        obj: Option<Node>,
        name: impl Into<String>,
        args: Vec<Node>,
        block: Node,
    ) -> Self {
        Self::new(NodeKind::Call {
            obj: obj.map(boxed),
            name: name.into(),
            args,
            block: Some(boxed(block)),
        })
    }

    pub fn block(args: &[&str], body: Option<Node>) -> Self {
        Self::new(NodeKind::Block {
            args: args.iter().map(|name| Node::var(*name)).collect(),
            body: body.map(boxed),
        })
    }

    pub fn def(name: impl Into<String>, args: &[&str], body: Option<Node>) -> Self {
        Self::new(NodeKind::Def {
            receiver: None,
            name: name.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            body: body.map(boxed),
            return_type: None,
            block_arg: None,
        })
    }

    pub fn macro_def(name: impl Into<String>, args: &[&str], body: Option<Node>) -> Self {
        Self::new(NodeKind::Macro {
            receiver: None,
            name: name.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            body: body.map(boxed),
        })
    }

    pub fn class_def(name: impl Into<String>, superclass: Option<Node>, body: Option<Node>) -> Self {
        Self::new(NodeKind::ClassDef {
            name: name.into(),
            superclass: superclass.map(boxed),
            type_vars: None,
            is_abstract: false,
            body: body.map(boxed),
        })
    }

    pub fn generic_class_def(name: impl Into<String>, type_vars: &[&str], body: Option<Node>) -> Self {
        Self::new(NodeKind::ClassDef {
            name: name.into(),
            superclass: None,
            type_vars: Some(type_vars.iter().map(|var| var.to_string()).collect()),
            is_abstract: false,
            body: body.map(boxed),
        })
    }

    pub fn module_def(name: impl Into<String>, type_vars: Option<&[&str]>, body: Option<Node>) -> Self {
        Self::new(NodeKind::ModuleDef {
            name: name.into(),
            type_vars: type_vars.map(|vars| vars.iter().map(|var| var.to_string()).collect()),
            body: body.map(boxed),
        })
    }

    pub fn include(name: Node) -> Self {
        Self::new(NodeKind::Include { name: boxed(name) })
    }

    pub fn new_generic_class(name: Node, type_vars: Vec<Node>) -> Self {
        Self::new(NodeKind::NewGenericClass {
            name: boxed(name),
            type_vars,
        })
    }

    pub fn is_a(obj: Node, const_ty: Node) -> Self {
        Self::new(NodeKind::IsA {
            obj: boxed(obj),
            const_ty: boxed(const_ty),
        })
    }

    pub fn type_merge(expressions: Vec<Node>) -> Self {
        Self::new(NodeKind::TypeMerge { expressions })
    }

    pub fn simple_or(left: Node, right: Node) -> Self {
        Self::new(NodeKind::SimpleOr {
            left: boxed(left),
            right: boxed(right),
        })
    }

    pub fn sugar(sugar: Sugar) -> Self {
        Self::new(NodeKind::Sugar(sugar))
    }

    /// Deserialize a tree from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid syntax tree JSON")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize syntax tree")
    }
}

/// Read a JSON syntax tree from disk
pub fn read_tree(path: &Path) -> Result<Node> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Node::from_json(&content).with_context(|| format!("in {}", path.display()))
}
