//! Collaborators for programs stored as JSON syntax trees.
//!
//! Macro bodies hold a single string literal whose text is the JSON tree to
//! generate. There is no desugaring step, so input trees must already be
//! normalized.

use tyweave_core::ast::ExprKind;
use tyweave_core::error::{SyntaxError, TypeError};
use tyweave_core::{Collaborators, ExprId, Location, MacroBackend, MacroExpander, Node, Program, Result, SourceParser};

pub fn collaborators() -> Collaborators {
    Collaborators::new()
        .with_parser(JsonParser)
        .with_macros(StringMacros)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl SourceParser for JsonParser {
    fn parse(&self, source: &str, filename: &str, _locals: &[String]) -> std::result::Result<Node, SyntaxError> {
        serde_json::from_str(source).map_err(|err| {
            SyntaxError::new(
                err.to_string(),
                Some(Location::new(
                    Some(filename),
                    err.line() as u32,
                    err.column() as u32,
                )),
            )
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StringMacros;

impl MacroBackend for StringMacros {
    fn build(&self, program: &Program, macro_def: ExprId) -> Box<dyn MacroExpander> {
        let template = match program.ast.kind(macro_def) {
            ExprKind::Macro(mac) => mac.body.and_then(|body| match program.ast.kind(body) {
                ExprKind::StringLiteral(text) => Some(text.clone()),
                _ => None,
            }),
            _ => None,
        };
        Box::new(StringExpander { template })
    }
}

struct StringExpander {
    template: Option<String>,
}

impl MacroExpander for StringExpander {
    fn expand(&self, program: &Program, call: ExprId) -> Result<String> {
        match &self.template {
            Some(template) => Ok(template.clone()),
            None => Err(TypeError::new("macro body must be a single string literal")
                .at(call, program.ast.location(call).cloned())
                .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tyweave_core::{infer_type, InferOptions};

    fn macro_program(body: Node) -> Node {
        Node::expressions(vec![
            Node::macro_def("generated", &[], Some(body)),
            Node::call(None, "generated", vec![]),
        ])
    }

    #[test]
    fn test_parse_error_has_position() {
        let err = JsonParser.parse("{\n  \"node\": ", "expanded macro m", &[]).unwrap_err();
        let location = err.location.unwrap();
        assert_eq!(location.file.as_deref(), Some("expanded macro m"));
        assert_eq!(location.line, 2);
    }

    #[test]
    fn test_string_macro_expands_to_its_body() {
        let generated = Node::char('g').to_json().unwrap();
        let mut program = Program::new();
        let inferred = infer_type(
            &mut program,
            macro_program(Node::string(generated)),
            &collaborators(),
            &InferOptions::default(),
        )
        .unwrap();
        let last = *inferred.statements(&program).last().unwrap();
        assert_eq!(program.expr_type_name(last).as_deref(), Some("Char"));
    }

    #[test]
    fn test_macro_body_must_be_a_string() {
        let mut program = Program::new();
        let err = infer_type(
            &mut program,
            macro_program(Node::int32(1)),
            &collaborators(),
            &InferOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "macro body must be a single string literal");
    }
}
