#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tyweave_core::ast::ExprKind;
use tyweave_core::error::{SyntaxError, TypeError};
use tyweave_core::prelude::*;
use tyweave_core::{ExprId, Location, MacroBackend, MacroExpander};

/// Generated macro source is the JSON form of a syntax tree
pub fn parse_json(source: &str, filename: &str, _locals: &[String]) -> std::result::Result<Node, SyntaxError> {
    Node::from_json(source).map_err(|err| {
        SyntaxError::new(
            format!("{:#}", err),
            Some(Location::new(Some(filename), 1, 1)),
        )
    })
}

/// JSON parser that remembers the locals it was handed on every call
#[derive(Clone, Default)]
pub struct RecordingParser {
    pub locals: Rc<RefCell<Vec<Vec<String>>>>,
}

impl SourceParser for RecordingParser {
    fn parse(&self, source: &str, filename: &str, locals: &[String]) -> std::result::Result<Node, SyntaxError> {
        self.locals.borrow_mut().push(locals.to_vec());
        parse_json(source, filename, locals)
    }
}

type Template = Rc<dyn Fn(&Program, ExprId) -> String>;

/// Macro backend rendering registered templates by macro name, counting
/// how many expanders it had to build
#[derive(Clone, Default)]
pub struct TemplateMacros {
    templates: HashMap<String, Template>,
    builds: Rc<Cell<usize>>,
    expansions: Rc<Cell<usize>>,
}

impl TemplateMacros {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, template: impl Fn(&Program, ExprId) -> String + 'static) -> Self {
        self.templates.insert(name.to_string(), Rc::new(template));
        self
    }

    /// Template that always expands to `node`
    pub fn fixed(self, name: &str, node: Node) -> Self {
        let source = node.to_json().unwrap();
        self.with(name, move |_, _| source.clone())
    }

    pub fn builds(&self) -> usize {
        self.builds.get()
    }

    pub fn expansions(&self) -> usize {
        self.expansions.get()
    }
}

struct TemplateExpander {
    template: Option<Template>,
    expansions: Rc<Cell<usize>>,
}

impl MacroBackend for TemplateMacros {
    fn build(&self, program: &Program, macro_def: ExprId) -> Box<dyn MacroExpander> {
        self.builds.set(self.builds.get() + 1);
        let template = match program.ast.kind(macro_def) {
            ExprKind::Macro(mac) => self.templates.get(&mac.name).cloned(),
            _ => None,
        };
        Box::new(TemplateExpander {
            template,
            expansions: Rc::clone(&self.expansions),
        })
    }
}

impl MacroExpander for TemplateExpander {
    fn expand(&self, program: &Program, call: ExprId) -> Result<String> {
        self.expansions.set(self.expansions.get() + 1);
        match &self.template {
            Some(template) => Ok(template(program, call)),
            None => Err(TypeError::new("no template for macro").into()),
        }
    }
}

pub fn infer_with(node: Node, collaborators: Collaborators) -> (Program, Result<InferredProgram>) {
    let mut program = Program::new();
    let result = infer_type(&mut program, node, &collaborators, &InferOptions::default());
    (program, result)
}

pub fn infer(node: Node) -> (Program, Result<InferredProgram>) {
    infer_with(node, Collaborators::new())
}

/// Infer and fail the test with the rendered error
pub fn infer_ok(node: Node) -> (Program, InferredProgram) {
    let (program, result) = infer(node);
    match result {
        Ok(inferred) => (program, inferred),
        Err(err) => panic!("inference failed:\n{}", err.render(None)),
    }
}

pub fn infer_err(node: Node) -> InferError {
    match infer(node).1 {
        Ok(_) => panic!("expected inference to fail"),
        Err(err) => err,
    }
}

pub fn type_name(program: &Program, expr: ExprId) -> String {
    program
        .expr_type_name(expr)
        .unwrap_or_else(|| "(untyped)".to_string())
}

pub fn last_type(program: &Program, inferred: &InferredProgram) -> String {
    let statements = inferred.statements(program);
    let last = *statements.last().unwrap();
    type_name(program, last)
}

/// `then` branch of the `if` at `statement`
pub fn then_branch(program: &Program, inferred: &InferredProgram, statement: usize) -> ExprId {
    let id = inferred.statements(program)[statement];
    match program.ast.kind(id) {
        ExprKind::If { then_branch, .. } => then_branch.unwrap(),
        other => panic!("expected an if, found {}", other.shape()),
    }
}
