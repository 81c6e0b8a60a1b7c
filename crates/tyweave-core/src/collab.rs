//! Interfaces to the collaborators the driver calls out to.
//!
//! Parsing, desugaring, overload resolution and macro template expansion
//! all live outside this crate. The driver reaches them through the traits
//! below, bundled in [`Collaborators`]. Inference is single-threaded, so the
//! handles are plain `Rc`s.

use crate::ast::ExprId;
use crate::dispatch::SimpleDispatch;
use crate::error::{Result, SyntaxError, TypeError};
use crate::inference::program::Program;
use crate::inference::visitor::TypeVisitor;
use crate::syntax::Node;
use std::rc::Rc;

pub trait SourceParser {
    /// Parse `source`; `locals` are names already bound at the insertion point
    fn parse(&self, source: &str, filename: &str, locals: &[String]) -> std::result::Result<Node, SyntaxError>;
}

impl<F> SourceParser for F
where
    F: Fn(&str, &str, &[String]) -> std::result::Result<Node, SyntaxError>,
{
    fn parse(&self, source: &str, filename: &str, locals: &[String]) -> std::result::Result<Node, SyntaxError> {
        self(source, filename, locals)
    }
}

pub trait Normalizer {
    fn normalize(&self, program: &mut Program, node: Node) -> Node;
}

/// Overload resolution for calls
pub trait CallResolver {
    /// Select the targets of `call` and bind its type to them. Called again
    /// whenever the receiver or an argument of `call` changes type.
    fn recalculate(&self, call: ExprId, visitor: &mut TypeVisitor<'_>) -> Result<()>;
}

pub trait MacroBackend {
    fn build(&self, program: &Program, macro_def: ExprId) -> Box<dyn MacroExpander>;
}

pub trait MacroExpander {
    /// Generated source for `call`
    fn expand(&self, program: &Program, call: ExprId) -> Result<String>;
}

/// Passes trees through untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityNormalizer;

impl Normalizer for IdentityNormalizer {
    fn normalize(&self, _program: &mut Program, node: Node) -> Node {
        node
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct NoParser;

impl SourceParser for NoParser {
    fn parse(&self, _source: &str, filename: &str, _locals: &[String]) -> std::result::Result<Node, SyntaxError> {
        Err(SyntaxError::new(format!("no parser available for {filename}"), None))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct NoMacros;

struct Unexpandable;

impl MacroBackend for NoMacros {
    fn build(&self, _program: &Program, _macro_def: ExprId) -> Box<dyn MacroExpander> {
        Box::new(Unexpandable)
    }
}

impl MacroExpander for Unexpandable {
    fn expand(&self, _program: &Program, call: ExprId) -> Result<String> {
        Err(TypeError::new("no macro backend configured").at(call, None).into())
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub parser: Rc<dyn SourceParser>,
    pub normalizer: Rc<dyn Normalizer>,
    pub resolver: Rc<dyn CallResolver>,
    pub macros: Rc<dyn MacroBackend>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            parser: Rc::new(NoParser),
            normalizer: Rc::new(IdentityNormalizer),
            resolver: Rc::new(SimpleDispatch::new()),
            macros: Rc::new(NoMacros),
        }
    }
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser(mut self, parser: impl SourceParser + 'static) -> Self {
        self.parser = Rc::new(parser);
        self
    }

    pub fn with_normalizer(mut self, normalizer: impl Normalizer + 'static) -> Self {
        self.normalizer = Rc::new(normalizer);
        self
    }

    pub fn with_resolver(mut self, resolver: impl CallResolver + 'static) -> Self {
        self.resolver = Rc::new(resolver);
        self
    }

    pub fn with_macros(mut self, macros: impl MacroBackend + 'static) -> Self {
        self.macros = Rc::new(macros);
        self
    }
}
