//! Demo: show the types inferred for a small program

use tyweave_core::prelude::*;

fn program() -> Node {
    Node::expressions(vec![
        Node::def(
            "pick",
            &["flag"],
            Some(Node::if_(Node::var("flag"), Some(Node::int32(1)), Some(Node::char('c')))),
        ),
        Node::assign(Node::var("choice"), Node::call(None, "pick", vec![Node::bool(true)])),
        Node::if_(
            Node::bool(true),
            Some(Node::assign(Node::var("maybe"), Node::float64(0.5))),
            None,
        ),
        Node::var("maybe"),
        Node::while_(
            Node::bool(true),
            Some(Node::assign(Node::var("counter"), Node::int32(0))),
        ),
        Node::string("never reached"),
    ])
}

fn main() -> anyhow::Result<()> {
    let tree = program();
    let sources = match &tree.kind {
        tyweave_core::syntax::NodeKind::Expressions { expressions } => expressions.clone(),
        _ => vec![tree.clone()],
    };

    let mut program = Program::new();
    let inferred = TypeInferencer::new()
        .with_options(InferOptions::default().with_stats(true))
        .infer(&mut program, tree)
        .map_err(|err| anyhow::anyhow!(err.render(None)))?;

    println!("=== Inferred Types ===\n");
    let statements = inferred.statements(&program);
    for (source, statement) in sources.iter().zip(&statements) {
        let ty = program.expr_type_name(*statement).unwrap_or_default();
        println!("{source}\n  : {ty}\n");
    }
    if statements.len() < sources.len() {
        println!("({} unreachable statements dropped)", sources.len() - statements.len());
    }

    if let Some(stats) = inferred.stats {
        println!("\n=== Statistics ===");
        println!("  traverse: {:?}", stats.traverse);
        println!("  {} expressions, {} graph nodes, {} types", stats.expressions, stats.nodes, stats.types);
    }
    Ok(())
}
