mod common;

use common::*;
use tyweave_core::prelude::*;
use tyweave_core::syntax::{Binary, BlockArg, NodeKind};

/// `name = nil; name = value`, leaving `name` nilable
fn nilable(name: &str, value: Node) -> Vec<Node> {
    vec![
        Node::assign(Node::var(name), Node::nil()),
        Node::assign(Node::var(name), value),
    ]
}

fn endless_loop() -> Node {
    Node::while_(Node::bool(true), None)
}

// ============================================================================
// Branches
// ============================================================================

#[test]
fn test_variable_assigned_in_one_branch_is_nilable() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::if_(
            Node::bool(true),
            Some(Node::assign(Node::var("a"), Node::int32(1))),
            None,
        ),
        Node::var("a"),
    ]));
    assert_eq!(last_type(&program, &inferred), "Int32 | Nil");
}

#[test]
fn test_variable_assigned_in_both_branches() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::if_(
            Node::bool(true),
            Some(Node::assign(Node::var("a"), Node::int32(1))),
            Some(Node::assign(Node::var("a"), Node::char('c'))),
        ),
        Node::var("a"),
    ]));
    assert_eq!(last_type(&program, &inferred), "Int32 | Char");
}

#[test]
fn test_divergent_else_does_not_nil_merge() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::if_(
            Node::bool(true),
            Some(Node::assign(Node::var("a"), Node::int32(1))),
            Some(endless_loop()),
        ),
        Node::var("a"),
    ]));
    assert_eq!(last_type(&program, &inferred), "Int32");
}

#[test]
fn test_if_without_else_is_nilable() {
    let (program, inferred) = infer_ok(Node::if_(Node::bool(false), Some(Node::string("s")), None));
    assert_eq!(type_name(&program, inferred.root), "Nil | String");
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_truthiness_narrows_then_branch() {
    let mut statements = nilable("a", Node::int32(1));
    statements.push(Node::if_(Node::var("a"), Some(Node::var("a")), None));
    let (program, inferred) = infer_ok(Node::expressions(statements));

    let then = then_branch(&program, &inferred, 2);
    assert_eq!(type_name(&program, then), "Int32");
    assert_eq!(last_type(&program, &inferred), "Int32 | Nil");
}

#[test]
fn test_narrowing_does_not_change_the_variable() {
    let mut statements = nilable("a", Node::int32(1));
    statements.push(Node::if_(Node::var("a"), Some(Node::int32(0)), None));
    statements.push(Node::var("a"));
    let (program, inferred) = infer_ok(Node::expressions(statements));
    assert_eq!(last_type(&program, &inferred), "Int32 | Nil");
}

#[test]
fn test_is_a_narrowing() {
    let mut statements = nilable("a", Node::char('c'));
    statements.push(Node::if_(
        Node::is_a(Node::var("a"), Node::ident("Char")),
        Some(Node::var("a")),
        None,
    ));
    let (program, inferred) = infer_ok(Node::expressions(statements));
    assert_eq!(type_name(&program, then_branch(&program, &inferred, 2)), "Char");
}

#[test]
fn test_divergent_else_reasserts_condition() {
    let mut statements = nilable("a", Node::int32(1));
    statements.push(Node::if_(Node::var("a"), Some(Node::nop()), Some(endless_loop())));
    statements.push(Node::var("a"));
    let (program, inferred) = infer_ok(Node::expressions(statements));
    assert_eq!(last_type(&program, &inferred), "Int32");
}

#[test]
fn test_and_condition_narrows_both_operands() {
    let mut statements = nilable("a", Node::int32(1));
    statements.extend(nilable("b", Node::char('c')));
    statements.push(Node::if_(
        Node::binary_if(Binary::And, Node::var("a"), Some(Node::var("b")), Some(Node::var("a"))),
        Some(Node::type_merge(vec![Node::var("a"), Node::var("b")])),
        None,
    ));
    let (program, inferred) = infer_ok(Node::expressions(statements));
    assert_eq!(
        type_name(&program, then_branch(&program, &inferred, 4)),
        "Int32 | Char:Class"
    );
}

#[test]
fn test_and_condition_takes_filters_from_both_branches() {
    let mut statements = nilable("a", Node::int32(1));
    statements.extend(nilable("b", Node::char('c')));
    statements.push(Node::if_(
        Node::binary_if(Binary::And, Node::bool(true), Some(Node::var("b")), Some(Node::var("a"))),
        Some(Node::type_merge(vec![Node::var("a"), Node::var("b")])),
        None,
    ));
    let (program, inferred) = infer_ok(Node::expressions(statements));
    assert_eq!(
        type_name(&program, then_branch(&program, &inferred, 4)),
        "Int32 | Char:Class"
    );
}

#[test]
fn test_narrowing_flows_through_a_variable() {
    let mut statements = vec![
        Node::assign(Node::var("b"), Node::int32(1)),
        Node::assign(Node::var("b"), Node::char('c')),
        Node::assign(
            Node::var("ok"),
            Node::is_a(Node::var("b"), Node::ident("Int32")),
        ),
    ];
    statements.push(Node::if_(Node::var("ok"), Some(Node::var("b")), None));
    let (program, inferred) = infer_ok(Node::expressions(statements));
    assert_eq!(type_name(&program, then_branch(&program, &inferred, 3)), "Int32");
}

#[test]
fn test_assignment_condition_narrows_target() {
    let mut statements = nilable("x", Node::int32(1));
    statements.push(Node::if_(
        Node::assign(Node::var("a"), Node::var("x")),
        Some(Node::type_merge(vec![Node::var("a"), Node::var("x")])),
        None,
    ));
    let (program, inferred) = infer_ok(Node::expressions(statements));
    assert_eq!(
        type_name(&program, then_branch(&program, &inferred, 2)),
        "Int32:Class"
    );
}

#[test]
fn test_or_condition_does_not_narrow() {
    let mut statements = nilable("a", Node::int32(1));
    statements.extend(nilable("b", Node::char('c')));
    statements.push(Node::if_(
        Node::binary_if(Binary::Or, Node::var("a"), Some(Node::var("a")), Some(Node::var("b"))),
        Some(Node::var("a")),
        None,
    ));
    let (program, inferred) = infer_ok(Node::expressions(statements));
    assert_eq!(type_name(&program, then_branch(&program, &inferred, 4)), "Int32 | Nil");
}

// ============================================================================
// Loops
// ============================================================================

#[test]
fn test_while_body_variables_are_nilable() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::while_(
            Node::bool(false),
            Some(Node::assign(Node::var("x"), Node::float64(1.0))),
        ),
        Node::var("x"),
    ]));
    let statements = inferred.statements(&program);
    assert_eq!(type_name(&program, statements[0]), "Nil");
    assert_eq!(last_type(&program, &inferred), "Float64 | Nil");
}

#[test]
fn test_endless_while_diverges_unless_broken() {
    let (program, inferred) = infer_ok(endless_loop());
    assert_eq!(type_name(&program, inferred.root), "NoReturn");

    let (program, inferred) = infer_ok(Node::while_(Node::bool(true), Some(Node::break_(vec![]))));
    assert_eq!(type_name(&program, inferred.root), "Nil");
}

#[test]
fn test_code_after_divergence_is_dropped() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::int32(1),
        endless_loop(),
        Node::string("unreachable"),
    ]));
    assert_eq!(inferred.statements(&program).len(), 2);
}

// ============================================================================
// Blocks and methods
// ============================================================================

#[test]
fn test_block_sees_outer_variables() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::def("each", &[], Some(Node::yield_(vec![Node::int32(1)]))),
        Node::assign(Node::var("total"), Node::float64(0.0)),
        Node::call_with_block(
            None,
            "each",
            vec![],
            Node::block(&["x"], Some(Node::type_merge(vec![Node::var("total"), Node::var("x")]))),
        ),
    ]));
    assert_eq!(last_type(&program, &inferred), "Int32 | Float64:Class");
}

#[test]
fn test_yield_mirrors_block_body() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::def("twice", &[], Some(Node::yield_(vec![Node::int32(1)]))),
        Node::call_with_block(None, "twice", vec![], Node::block(&["x"], Some(Node::char('c')))),
    ]));
    assert_eq!(last_type(&program, &inferred), "Char");
}

/// `def name(&block : inputs)` whose body is `body`
fn yielding(name: &str, inputs: &[&str], body: Node) -> Node {
    Node::new(NodeKind::Def {
        receiver: None,
        name: name.to_string(),
        args: vec![],
        body: Some(Box::new(body)),
        return_type: None,
        block_arg: Some(BlockArg {
            name: "block".to_string(),
            inputs: inputs.iter().map(|input| Node::ident(*input)).collect(),
        }),
    })
}

#[test]
fn test_declared_yield_types() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        yielding("each", &["Int32"], Node::yield_(vec![Node::int32(1)])),
        Node::call_with_block(
            None,
            "each",
            vec![],
            Node::block(&["x"], Some(Node::var("x"))),
        ),
    ]));
    assert_eq!(last_type(&program, &inferred), "Int32");
}

#[test]
fn test_yield_type_mismatch() {
    let err = infer_err(Node::expressions(vec![
        yielding("each", &["Int32"], Node::yield_(vec![Node::char('c')])),
        Node::call_with_block(None, "each", vec![], Node::block(&["x"], None)),
    ]));
    assert_eq!(
        err.root_cause().to_string(),
        "argument #1 of yield expected to be Int32, not Char"
    );
}

#[test]
fn test_missing_yield_argument() {
    let err = infer_err(Node::expressions(vec![
        yielding("each", &["Int32"], Node::yield_(vec![])),
        Node::call_with_block(None, "each", vec![], Node::block(&["x"], None)),
    ]));
    assert_eq!(
        err.root_cause().to_string(),
        "missing argument #1 of yield with type Int32"
    );

    // a missing Nil argument is just nil
    let (program, inferred) = infer_ok(Node::expressions(vec![
        yielding("each", &["Int32", "Nil"], Node::yield_(vec![Node::int32(1)])),
        Node::call_with_block(
            None,
            "each",
            vec![],
            Node::block(&["x", "y"], Some(Node::var("y"))),
        ),
    ]));
    assert_eq!(last_type(&program, &inferred), "Nil");
}

#[test]
fn test_yielded_expression_is_frozen() {
    let err = infer_err(Node::expressions(vec![
        yielding(
            "each",
            &["Int32"],
            Node::expressions(vec![
                Node::assign(Node::var("x"), Node::int32(1)),
                Node::yield_(vec![Node::var("x")]),
                Node::assign(Node::var("x"), Node::char('c')),
            ]),
        ),
        Node::call_with_block(None, "each", vec![], Node::block(&["x"], None)),
    ]));
    assert!(matches!(err.root_cause(), InferError::FrozenType(_)));
    assert_eq!(
        err.root_cause().to_string(),
        "type must be Int32, not Int32 | Char"
    );
}

#[test]
fn test_break_in_block_joins_call_type() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::def("run", &[], Some(Node::yield_(vec![]))),
        Node::call_with_block(
            None,
            "run",
            vec![],
            Node::block(
                &[],
                Some(Node::if_(
                    Node::bool(true),
                    Some(Node::break_(vec![Node::string("early")])),
                    Some(Node::int32(1)),
                )),
            ),
        ),
    ]));
    assert_eq!(last_type(&program, &inferred), "Int32 | String");
}

#[test]
fn test_return_joins_final_expression() {
    let (program, inferred) = infer_ok(Node::expressions(vec![
        Node::def(
            "pick",
            &["flag"],
            Some(Node::expressions(vec![
                Node::if_(Node::var("flag"), Some(Node::return_(vec![Node::char('c')])), None),
                Node::int32(1),
            ])),
        ),
        Node::call(None, "pick", vec![Node::bool(true)]),
    ]));
    assert_eq!(last_type(&program, &inferred), "Int32 | Char");
}

// ============================================================================
// Declared types
// ============================================================================

#[test]
fn test_frozen_declaration_rejects_other_types() {
    let err = infer_err(Node::expressions(vec![
        Node::declare_var("count", Node::ident("Int32")),
        Node::assign(Node::var("count"), Node::int32(1)),
        Node::assign(Node::var("count"), Node::string("many")).at(3, 1),
    ]));
    assert_eq!(err.to_string(), "assigning to count");
    assert_eq!(err.location().map(|loc| loc.line), Some(3));
    assert_eq!(
        err.root_cause().to_string(),
        "type must be Int32, not Int32 | String"
    );
}
