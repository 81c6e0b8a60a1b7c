//! Surface-syntax rendering of syntax trees, used in diagnostics.

use super::{BlockArg, FunDefArg, Node, NodeKind, Sugar};
use std::fmt;

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer::default();
        printer.print(self);
        f.write_str(printer.out.trim())
    }
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

fn is_alpha(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
}

impl Printer {
    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn append_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn with_indent(&mut self, f: impl FnOnce(&mut Self)) {
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    fn accept_with_indent(&mut self, node: Option<&Node>) {
        let Some(node) = node else { return };
        let is_expressions = matches!(node.kind, NodeKind::Expressions { .. });
        self.with_indent(|p| {
            if !is_expressions {
                p.append_indent();
            }
            p.print(node);
        });
        if !is_expressions {
            self.push("\n");
        }
    }

    fn comma_separated(&mut self, nodes: &[Node]) {
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.print(node);
        }
    }

    fn keyword_with_exps(&mut self, keyword: &str, exps: &[Node]) {
        self.push(keyword);
        if !exps.is_empty() {
            self.push(" ");
            self.comma_separated(exps);
        }
    }

    fn binary(&mut self, left: &Node, op: &str, right: &Node) {
        self.print(left);
        self.push(" ");
        self.push(op);
        self.push(" ");
        self.print(right);
    }

    fn type_vars(&mut self, type_vars: &Option<Vec<String>>) {
        if let Some(vars) = type_vars {
            self.push("(");
            self.push(&vars.join(", "));
            self.push(")");
        }
    }

    fn fun_arg(&mut self, arg: &FunDefArg) {
        self.push(&arg.name);
        self.push(" : ");
        self.print(&arg.ty);
        self.push(&"*".repeat(arg.ptr as usize));
    }

    fn fields(&mut self, keyword: &str, name: &str, fields: &[FunDefArg]) {
        self.push(keyword);
        self.push(" ");
        self.push(name);
        self.push("\n");
        self.with_indent(|p| {
            for field in fields {
                p.append_indent();
                p.fun_arg(field);
                p.push("\n");
            }
        });
        self.append_indent();
        self.push("end");
    }

    fn block_arg(&mut self, block_arg: &BlockArg) {
        self.push("&");
        self.push(&block_arg.name);
        if !block_arg.inputs.is_empty() {
            self.push(" : ");
            self.comma_separated(&block_arg.inputs);
            self.push(" ->");
        }
    }

    fn call(&mut self, obj: Option<&Node>, name: &str, args: &[Node], block: Option<&Node>) {
        match (obj, name, args) {
            (Some(obj), "[]", _) => {
                self.print(obj);
                self.push("[");
                self.comma_separated(args);
                self.push("]");
            }
            (Some(obj), "[]=", [index, value]) => {
                self.print(obj);
                self.push("[");
                self.print(index);
                self.push("] = ");
                self.print(value);
            }
            (Some(obj), _, []) if !is_alpha(name) => {
                self.push(name.strip_suffix('@').unwrap_or(name));
                self.push("(");
                self.print(obj);
                self.push(")");
            }
            (Some(obj), _, [arg]) if !is_alpha(name) => self.binary(obj, name, arg),
            _ => {
                if let Some(obj) = obj {
                    let parenthesize = matches!(obj.kind, NodeKind::Call { .. });
                    if parenthesize {
                        self.push("(");
                    }
                    self.print(obj);
                    if parenthesize {
                        self.push(")");
                    }
                    self.push(".");
                }
                if let Some(setter) = name.strip_suffix('=').filter(|s| !s.is_empty()) {
                    self.push(setter);
                    self.push(" = ");
                    self.comma_separated(args);
                } else {
                    let parens = obj.is_none() || !args.is_empty();
                    self.push(name);
                    if parens {
                        self.push("(");
                    }
                    self.comma_separated(args);
                    if parens {
                        self.push(")");
                    }
                }
            }
        }
        if let Some(block) = block {
            self.push(" ");
            self.print(block);
        }
    }

    fn print(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::Nop => {}
            NodeKind::NilLiteral => self.push("nil"),
            NodeKind::BoolLiteral { value } => self.push(if *value { "true" } else { "false" }),
            NodeKind::CharLiteral { value } => {
                let escaped = match value {
                    '\t' => "\\t".to_string(),
                    '\n' => "\\n".to_string(),
                    '\r' => "\\r".to_string(),
                    '\0' => "\\0".to_string(),
                    other => other.to_string(),
                };
                self.push("'");
                self.push(&escaped);
                self.push("'");
            }
            NodeKind::NumberLiteral { value, kind } => {
                self.push(value);
                if !kind.is_default() {
                    self.push("_");
                    self.push(kind.suffix());
                }
            }
            NodeKind::StringLiteral { value } => {
                self.push("\"");
                self.push(&value.replace('"', "\\\""));
                self.push("\"");
            }
            NodeKind::SymbolLiteral { value } => {
                self.push(":");
                self.push(value);
            }
            NodeKind::Expressions { expressions } => {
                for exp in expressions {
                    self.append_indent();
                    self.print(exp);
                    self.push("\n");
                }
            }
            NodeKind::Var { name } | NodeKind::InstanceVar { name } | NodeKind::Global { name } => {
                self.push(name)
            }
            NodeKind::Ident { names, global } => {
                for (i, name) in names.iter().enumerate() {
                    if i > 0 || *global {
                        self.push("::");
                    }
                    self.push(name);
                }
            }
            NodeKind::DeclareVar { name, declared_type } => {
                self.push(name);
                self.push(" :: ");
                self.print(declared_type);
            }
            NodeKind::Assign { target, value } => {
                self.print(target);
                self.push(" = ");
                if matches!(value.kind, NodeKind::Expressions { .. }) {
                    self.push("begin\n");
                    self.accept_with_indent(Some(value));
                    self.append_indent();
                    self.push("end");
                } else {
                    self.print(value);
                }
            }
            NodeKind::MultiAssign { targets, values } => {
                self.comma_separated(targets);
                self.push(" = ");
                self.comma_separated(values);
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => self.conditional("if", cond, then_branch.as_deref(), else_branch.as_deref()),
            NodeKind::While {
                cond,
                body,
                run_once,
            } => {
                if *run_once {
                    match body.as_deref() {
                        Some(body @ Node {
                            kind: NodeKind::Expressions { .. },
                            ..
                        }) => {
                            self.push("begin\n");
                            self.accept_with_indent(Some(body));
                            self.append_indent();
                            self.push("end while ");
                        }
                        Some(body) => {
                            self.print(body);
                            self.push(" while ");
                        }
                        None => self.push("begin\nend while "),
                    }
                    self.print(cond);
                } else {
                    self.push("while ");
                    self.print(cond);
                    self.push("\n");
                    self.accept_with_indent(body.as_deref());
                    self.append_indent();
                    self.push("end");
                }
            }
            NodeKind::Break { exps } => self.keyword_with_exps("break", exps),
            NodeKind::Return { exps } => self.keyword_with_exps("return", exps),
            NodeKind::Yield { exps } => self.keyword_with_exps("yield", exps),
            NodeKind::Call {
                obj,
                name,
                args,
                block,
            } => self.call(obj.as_deref(), name, args, block.as_deref()),
            NodeKind::Block { args, body } => {
                self.push("do");
                if !args.is_empty() {
                    self.push(" |");
                    self.comma_separated(args);
                    self.push("|");
                }
                self.push("\n");
                self.accept_with_indent(body.as_deref());
                self.append_indent();
                self.push("end");
            }
            NodeKind::Def {
                receiver,
                name,
                args,
                body,
                return_type,
                block_arg,
            } => {
                self.push("def ");
                if let Some(receiver) = receiver {
                    self.print(receiver);
                    self.push(".");
                }
                self.push(name);
                if !args.is_empty() || block_arg.is_some() {
                    self.push("(");
                    self.push(&args.join(", "));
                    if let Some(block_arg) = block_arg {
                        if !args.is_empty() {
                            self.push(", ");
                        }
                        self.block_arg(block_arg);
                    }
                    self.push(")");
                }
                if let Some(return_type) = return_type {
                    self.push(" : ");
                    self.print(return_type);
                }
                self.push("\n");
                self.accept_with_indent(body.as_deref());
                self.append_indent();
                self.push("end");
            }
            NodeKind::Macro {
                receiver,
                name,
                args,
                body,
            } => {
                self.push("macro ");
                if let Some(receiver) = receiver {
                    self.print(receiver);
                    self.push(".");
                }
                self.push(name);
                if !args.is_empty() {
                    self.push("(");
                    self.push(&args.join(", "));
                    self.push(")");
                }
                self.push("\n");
                self.accept_with_indent(body.as_deref());
                self.append_indent();
                self.push("end");
            }
            NodeKind::ClassDef {
                name,
                superclass,
                type_vars,
                is_abstract,
                body,
            } => {
                if *is_abstract {
                    self.push("abstract ");
                }
                self.push("class ");
                self.push(name);
                self.type_vars(type_vars);
                if let Some(superclass) = superclass {
                    self.push(" < ");
                    self.print(superclass);
                }
                self.push("\n");
                self.accept_with_indent(body.as_deref());
                self.append_indent();
                self.push("end");
            }
            NodeKind::ModuleDef {
                name,
                type_vars,
                body,
            } => {
                self.push("module ");
                self.push(name);
                self.type_vars(type_vars);
                self.push("\n");
                self.accept_with_indent(body.as_deref());
                self.append_indent();
                self.push("end");
            }
            NodeKind::Include { name } => {
                self.push("include ");
                self.print(name);
            }
            NodeKind::LibDef {
                name,
                libname,
                body,
            } => {
                self.push("lib ");
                self.push(name);
                if let Some(libname) = libname {
                    self.push("('");
                    self.push(libname);
                    self.push("')");
                }
                self.push("\n");
                self.accept_with_indent(body.as_deref());
                self.append_indent();
                self.push("end");
            }
            NodeKind::FunDef {
                name,
                real_name,
                args,
                return_type,
                ptr,
                varargs,
            } => {
                self.push("fun ");
                self.push(name);
                if name != real_name {
                    self.push(" = ");
                    self.push(real_name);
                }
                if !args.is_empty() {
                    self.push("(");
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.fun_arg(arg);
                    }
                    if *varargs {
                        self.push(", ...");
                    }
                    self.push(")");
                }
                if let Some(return_type) = return_type {
                    self.push(" : ");
                    self.print(return_type);
                    self.push(&"*".repeat(*ptr as usize));
                }
            }
            NodeKind::TypeDef { name, ty, ptr } => {
                self.push("type ");
                self.push(name);
                self.push(" : ");
                self.print(ty);
                self.push(&"*".repeat(*ptr as usize));
            }
            NodeKind::StructDef { name, fields } => self.fields("struct", name, fields),
            NodeKind::UnionDef { name, fields } => self.fields("union", name, fields),
            NodeKind::EnumDef { name, constants } => {
                self.push("enum ");
                self.push(name);
                self.push("\n");
                self.with_indent(|p| {
                    for constant in constants {
                        p.append_indent();
                        p.push(&constant.name);
                        if let Some(value) = constant.value {
                            p.push(" = ");
                            p.push(&value.to_string());
                        }
                        p.push("\n");
                    }
                });
                self.append_indent();
                self.push("end");
            }
            NodeKind::StructGet { name } | NodeKind::UnionGet { name } => {
                self.push("@");
                self.push(name);
            }
            NodeKind::StructSet { name } | NodeKind::UnionSet { name } => {
                self.push("@");
                self.push(name);
                self.push(" = value");
            }
            NodeKind::ClassMethod => self.push("class()"),
            NodeKind::Allocate => self.push("allocate()"),
            NodeKind::SimpleOr { left, right } => self.binary(left, "or", right),
            NodeKind::IdentUnion { idents } => {
                for (i, ident) in idents.iter().enumerate() {
                    if i > 0 {
                        self.push(" | ");
                    }
                    self.print(ident);
                }
            }
            NodeKind::NewGenericClass { name, type_vars } => {
                self.print(name);
                self.push("(");
                self.comma_separated(type_vars);
                self.push(")");
            }
            NodeKind::IsA { obj, const_ty } => {
                self.print(obj);
                self.push(".is_a?(");
                self.print(const_ty);
                self.push(")");
            }
            NodeKind::TypeMerge { expressions } => {
                self.push("<type_merge>(");
                self.comma_separated(expressions);
                self.push(")");
            }
            NodeKind::PointerOf { var } => {
                self.print(var);
                self.push(".ptr");
            }
            NodeKind::PointerMalloc => self.push("<pointer_malloc>"),
            NodeKind::PointerRealloc => self.push("<pointer_realloc>"),
            NodeKind::PointerGetValue => self.push("<pointer_get_value>"),
            NodeKind::PointerSetValue => self.push("<pointer_set_value>"),
            NodeKind::PointerAdd => self.push("<pointer_add>"),
            NodeKind::PointerCast => self.push("<pointer_cast>"),
            NodeKind::Sugar(sugar) => self.sugar(sugar),
        }
    }

    fn conditional(&mut self, keyword: &str, cond: &Node, then_branch: Option<&Node>, else_branch: Option<&Node>) {
        self.push(keyword);
        self.push(" ");
        self.print(cond);
        self.push("\n");
        self.accept_with_indent(then_branch);
        if let Some(else_branch) = else_branch {
            self.append_indent();
            self.push("else\n");
            self.accept_with_indent(Some(else_branch));
        }
        self.append_indent();
        self.push("end");
    }

    fn sugar(&mut self, sugar: &Sugar) {
        match sugar {
            Sugar::And { left, right } => self.binary(left, "&&", right),
            Sugar::Or { left, right } => self.binary(left, "||", right),
            Sugar::Require { string } => {
                self.push("require ");
                self.print(string);
            }
            Sugar::RangeLiteral {
                from,
                to,
                exclusive,
            } => {
                self.print(from);
                self.push(if *exclusive { "..." } else { ".." });
                self.print(to);
            }
            Sugar::Case {
                cond,
                whens,
                else_branch,
            } => {
                self.push("case ");
                self.print(cond);
                self.push("\n");
                for when in whens {
                    self.print(when);
                }
                if let Some(else_branch) = else_branch {
                    self.push("else\n");
                    self.accept_with_indent(Some(else_branch));
                }
                self.push("end");
            }
            Sugar::When { conds, body } => {
                self.push("when ");
                self.comma_separated(conds);
                self.push("\n");
                self.accept_with_indent(body.as_deref());
            }
            Sugar::RegexpLiteral { value } => {
                self.push("/");
                self.push(value);
                self.push("/");
            }
            Sugar::ArrayLiteral { elements, of } => {
                self.push("[");
                self.comma_separated(elements);
                self.push("]");
                if let Some(of) = of {
                    self.push(" of ");
                    self.print(of);
                }
            }
            Sugar::HashLiteral {
                keys,
                values,
                of_key,
                of_value,
            } => {
                self.push("{");
                for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.print(key);
                    self.push(" => ");
                    self.print(value);
                }
                self.push("}");
                if let (Some(of_key), Some(of_value)) = (of_key, of_value) {
                    self.push(" of ");
                    self.print(of_key);
                    self.push(" => ");
                    self.print(of_value);
                }
            }
            Sugar::Unless {
                cond,
                then_branch,
                else_branch,
            } => self.conditional("unless", cond, then_branch.as_deref(), else_branch.as_deref()),
            Sugar::StringInterpolation { expressions } => {
                self.push("\"");
                for exp in expressions {
                    if let NodeKind::StringLiteral { value } = &exp.kind {
                        self.push(&value.replace('"', "\\\""));
                    } else {
                        self.push("#{");
                        self.print(exp);
                        self.push("}");
                    }
                }
                self.push("\"");
            }
        }
    }
}
