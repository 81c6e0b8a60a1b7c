//! Whole-program entry point.
//!
//! [`TypeInferencer`] runs the pipeline on one tree:
//!
//! 1. lower the tree into the session's arena
//! 2. traverse it, typing every reachable expression
//! 3. infer constants nothing read
//! 4. type every node that never received a type as `NoReturn`

use crate::ast::ExprId;
use crate::collab::Collaborators;
use crate::config::InferOptions;
use crate::error::Result;
use crate::inference::program::Program;
use crate::inference::visitor::TypeVisitor;
use crate::syntax::Node;
use std::time::{Duration, Instant};
use tracing::info;

/// Timings and sizes of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseStats {
    pub lower: Duration,
    pub traverse: Duration,
    pub constants: Duration,
    pub fix_empty_types: Duration,
    pub expressions: usize,
    pub nodes: usize,
    pub types: usize,
    /// Nodes typed `NoReturn` by the final pass
    pub fixed_nodes: usize,
}

#[derive(Debug, Clone)]
pub struct InferredProgram {
    pub root: ExprId,
    pub stats: Option<PhaseStats>,
}

impl InferredProgram {
    /// Top-level statements, after unreachable ones were dropped
    pub fn statements(&self, program: &Program) -> Vec<ExprId> {
        program.ast.statements(self.root)
    }
}

#[derive(Clone, Default)]
pub struct TypeInferencer {
    collaborators: Collaborators,
    options: InferOptions,
}

impl TypeInferencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn with_options(mut self, options: InferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn infer(&self, program: &mut Program, node: Node) -> Result<InferredProgram> {
        let started = Instant::now();
        let root = program.lower(node)?;
        let lower = started.elapsed();

        let started = Instant::now();
        let mut visitor = TypeVisitor::new(program, self.collaborators.clone(), self.options.clone());
        visitor.visit(root)?;
        let traverse = started.elapsed();

        let started = Instant::now();
        if self.options.infer_unread_constants {
            visitor.infer_unread_constants()?;
        }
        let constants = started.elapsed();

        let started = Instant::now();
        let fixed_nodes = program.fix_empty_types();
        let fix_empty_types = started.elapsed();

        let stats = self.options.stats.then(|| {
            let stats = PhaseStats {
                lower,
                traverse,
                constants,
                fix_empty_types,
                expressions: program.ast.len(),
                nodes: program.graph.len(),
                types: program.types.len(),
                fixed_nodes,
            };
            info!(
                lower = ?stats.lower,
                traverse = ?stats.traverse,
                constants = ?stats.constants,
                fix_empty_types = ?stats.fix_empty_types,
                expressions = stats.expressions,
                nodes = stats.nodes,
                "inference finished"
            );
            stats
        });
        Ok(InferredProgram { root, stats })
    }
}

/// Infer `node` inside `program` with the given collaborators
pub fn infer_type(
    program: &mut Program,
    node: Node,
    collaborators: &Collaborators,
    options: &InferOptions,
) -> Result<InferredProgram> {
    TypeInferencer::new()
        .with_collaborators(collaborators.clone())
        .with_options(options.clone())
        .infer(program, node)
}
