mod common;

use common::*;
use tyweave_core::prelude::*;

fn foo_with_constant(value: Node) -> Node {
    Node::class_def(
        "Foo",
        None,
        Some(Node::expressions(vec![
            Node::assign(Node::ident("A"), value),
            Node::def("foo", &[], Some(Node::ident("A"))),
        ])),
    )
}

fn call_foo() -> Node {
    Node::call(
        Some(Node::call(Some(Node::ident("Foo")), "new", vec![])),
        "foo",
        vec![],
    )
}

#[test]
fn test_constant_reference_takes_value_type() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::assign(Node::ident("A"), Node::int32(1)),
        Node::ident("A"),
    ]));
    let statements = inferred.statements(&program);
    assert_eq!(type_name(&program, statements[0]), "Int32");
    assert_eq!(type_name(&program, statements[1]), "Int32");
}

#[test]
fn test_constant_resolved_in_defining_class() {
    let (program, inferred) = infer_ok(Node::expressions(vec![foo_with_constant(Node::int32(1)), call_foo()]));
    assert_eq!(last_type(&program, &inferred), "Int32");
}

#[test]
fn test_nearest_constant_shadows_top_level() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::assign(Node::ident("A"), Node::int32(1)),
        foo_with_constant(Node::float64(2.5)),
        call_foo(),
    ]));
    assert_eq!(last_type(&program, &inferred), "Float64");
}

#[test]
fn test_constant_read_before_declaration_order() {
    // B is only declared after the def reading it, but the def is typed
    // when called, after both assignments ran
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::def("read", &[], Some(Node::ident("B"))),
        Node::assign(Node::ident("B"), Node::char('b')),
        Node::call(None, "read", vec![]),
    ]));
    assert_eq!(last_type(&program, &inferred), "Char");
}

#[test]
fn test_constant_value_evaluated_once() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::assign(Node::ident("A"), Node::int32(1)),
        Node::ident("A"),
        Node::ident("A"),
    ]));
    assert_eq!(last_type(&program, &inferred), "Int32");
    assert!(program.pending_consts().is_empty());
}

#[test]
fn test_qualified_constant_path() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        foo_with_constant(Node::string("x")),
        Node::ident("Foo::A"),
    ]));
    assert_eq!(last_type(&program, &inferred), "String");
}

#[test]
fn test_already_initialized_constant() {
    let err = infer_err(Node::expressions(vec![
        Node::assign(Node::ident("A"), Node::int32(1)),
        Node::assign(Node::ident("A"), Node::int32(2)).at(2, 1),
    ]));
    assert_eq!(err.to_string(), "already initialized constant A");
    assert_eq!(err.location().map(|loc| loc.line), Some(2));
}

#[test]
fn test_uninitialized_constant() {
    let err = infer_err(Node::ident("Missing"));
    assert_eq!(err.to_string(), "uninitialized constant Missing");
}

#[test]
fn test_recursive_constant_dependency() {
    let err = infer_err(Node::expressions(vec![
        Node::assign(Node::ident("A"), Node::ident("B")),
        Node::assign(Node::ident("B"), Node::ident("A")),
        Node::ident("A"),
    ]));
    assert_eq!(
        err.root_cause().to_string(),
        "recursive dependency of constant A: A -> B -> A"
    );
}

#[test]
fn test_unread_constants_are_inferred_at_the_end() {
    let (program, inferred) = infer_ok(Node::assign(Node::ident("A"), Node::float64(1.0)));
    assert_eq!(type_name(&program, inferred.root), "Float64");
    assert!(program.pending_consts().is_empty());
}

#[test]
fn test_unread_constants_can_be_left_alone() {
    let mut program = Program::new();
    let inferred = TypeInferencer::new()
        .with_options(InferOptions {
            infer_unread_constants: false,
            ..InferOptions::default()
        })
        .infer(&mut program, Node::assign(Node::ident("A"), Node::float64(1.0)))
        .unwrap();
    assert_eq!(program.pending_consts().len(), 1);
    assert_eq!(type_name(&program, inferred.root), "NoReturn");
}
