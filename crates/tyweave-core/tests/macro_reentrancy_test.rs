mod common;

use common::*;
use tyweave_core::prelude::*;

fn collaborators(macros: &TemplateMacros) -> Collaborators {
    Collaborators::new()
        .with_parser(parse_json)
        .with_macros(macros.clone())
}

#[test]
fn test_call_takes_type_of_expansion() {
    let macros = TemplateMacros::new().fixed("answer", Node::int32(42));
    let (program, result) = infer_with(
        Node::expressions(vec![
            Node::macro_def("answer", &[], None),
            Node::call(None, "answer", vec![]),
        ]),
        collaborators(&macros),
    );
    let inferred = result.unwrap();
    assert_eq!(last_type(&program, &inferred), "Int32");
    assert_eq!(macros.expansions(), 1);
}

#[test]
fn test_expansion_sees_call_locals() {
    let parser = RecordingParser::default();
    let macros = TemplateMacros::new().fixed("read_total", Node::var("total"));
    let (program, result) = infer_with(
        Node::expressions(vec![
            Node::macro_def("read_total", &[], None),
            Node::assign(Node::var("total"), Node::float64(1.5)),
            Node::call(None, "read_total", vec![]),
        ]),
        Collaborators::new()
            .with_parser(parser.clone())
            .with_macros(macros.clone()),
    );
    let inferred = result.unwrap();
    assert_eq!(last_type(&program, &inferred), "Float64");
    assert_eq!(*parser.locals.borrow(), vec![vec!["total".to_string()]]);
}

#[test]
fn test_expansion_can_define_methods() {
    let macros = TemplateMacros::new().fixed("define_label", Node::def("label", &[], Some(Node::char('l'))));
    let (program, result) = infer_with(
        Node::expressions(vec![
            Node::macro_def("define_label", &[], None),
            Node::call(None, "define_label", vec![]),
            Node::call(None, "label", vec![]),
        ]),
        collaborators(&macros),
    );
    let inferred = result.unwrap();
    assert_eq!(last_type(&program, &inferred), "Char");
}

#[test]
fn test_macro_found_in_enclosing_class() {
    let macros = TemplateMacros::new().fixed("default_size", Node::string("big"));
    let (program, result) = infer_with(
        Node::expressions(vec![
            Node::class_def(
                "Shirt",
                None,
                Some(Node::expressions(vec![
                    Node::macro_def("default_size", &[], None),
                    Node::def("size", &[], Some(Node::call(None, "default_size", vec![]))),
                ])),
            ),
            Node::call(
                Some(Node::call(Some(Node::ident("Shirt")), "new", vec![])),
                "size",
                vec![],
            ),
        ]),
        collaborators(&macros),
    );
    let inferred = result.unwrap();
    assert_eq!(last_type(&program, &inferred), "String");
}

#[test]
fn test_expander_reused_for_same_argument_shapes() {
    let macros = TemplateMacros::new().fixed("wrap", Node::nil());
    let (_, result) = infer_with(
        Node::expressions(vec![
            Node::macro_def("wrap", &["value"], None),
            Node::call(None, "wrap", vec![Node::int32(1)]),
            Node::call(None, "wrap", vec![Node::int32(2)]),
        ]),
        collaborators(&macros),
    );
    assert!(result.is_ok());
    assert_eq!(macros.builds(), 1);
    assert_eq!(macros.expansions(), 2);
}

#[test]
fn test_new_expander_for_new_argument_shapes() {
    let macros = TemplateMacros::new().fixed("wrap", Node::nil());
    let (_, result) = infer_with(
        Node::expressions(vec![
            Node::macro_def("wrap", &["value"], None),
            Node::call(None, "wrap", vec![Node::int32(1)]),
            Node::call(None, "wrap", vec![Node::string("s")]),
        ]),
        collaborators(&macros),
    );
    assert!(result.is_ok());
    assert_eq!(macros.builds(), 2);
}

#[test]
fn test_invalid_expansion_lists_generated_source() {
    let macros = TemplateMacros::new().with("broken", |_, _| "{\"node\": \"Nope\"}".to_string());
    let (_, result) = infer_with(
        Node::expressions(vec![
            Node::macro_def("broken", &[], None),
            Node::call(None, "broken", vec![]).at(2, 1),
        ]),
        collaborators(&macros),
    );
    let err = result.unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("macro didn't expand to a valid program, it expanded to:"));
    assert!(message.contains("  1. {\"node\": \"Nope\"}"));
    assert_eq!(err.location().map(|loc| loc.line), Some(2));
}

#[test]
fn test_type_error_in_expansion_is_reported_at_call() {
    let macros = TemplateMacros::new().fixed("bad", Node::call(Some(Node::int32(1)), "missing", vec![]));
    let (_, result) = infer_with(
        Node::expressions(vec![
            Node::macro_def("bad", &[], None),
            Node::call(None, "bad", vec![]).at(4, 3),
        ]),
        collaborators(&macros),
    );
    let err = result.unwrap_err();
    assert!(err.to_string().contains("undefined method 'missing' for Int32"));
    assert_eq!(err.location().map(|loc| loc.line), Some(4));
}

#[test]
fn test_runaway_expansion_hits_depth_limit() {
    let macros = TemplateMacros::new().fixed("again", Node::call(None, "again", vec![]));
    let mut program = Program::new();
    let result = infer_type(
        &mut program,
        Node::expressions(vec![
            Node::macro_def("again", &[], None),
            Node::call(None, "again", vec![]),
        ]),
        &collaborators(&macros),
        &InferOptions::default().with_max_macro_depth(3),
    );
    let err = result.unwrap_err();
    assert!(err.to_string().contains("macro expansion too deep (limit 3)"));
    assert_eq!(macros.expansions(), 3);
    assert_eq!(program.macro_depth(), 0);
}

#[test]
fn test_ordinary_calls_are_not_expanded() {
    let macros = TemplateMacros::new().fixed("twice", Node::int32(2));
    let (program, result) = infer_with(
        Node::expressions(vec![
            Node::macro_def("twice", &[], None),
            Node::def("twice", &["x"], Some(Node::var("x"))),
            Node::call(None, "twice", vec![Node::char('t')]),
        ]),
        collaborators(&macros),
    );
    let inferred = result.unwrap();
    assert_eq!(last_type(&program, &inferred), "Char");
    assert_eq!(macros.expansions(), 0);
}
